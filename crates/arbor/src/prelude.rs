//! Convenience re-exports. `use arbor::prelude::*` for the common items.

pub use crate::classes::{core_registry, register_core_classes};
pub use crate::config::EngineConfig;
pub use crate::engine::{Engine, WeakEngine};
pub use crate::error::{Error, Result};
pub use crate::event::{EventChannel, ListenerHandle};
pub use crate::instance::{Instance, InstanceEvents};
pub use crate::logging::{LogMessage, LogSystem, init_logger};
pub use crate::reflect::{
    Class, ClassBuilder, ClassDescriptor, ClassId, ClassRegistry, PropertyFlags, PropertyId,
    Value, ValueType,
};
pub use crate::system::{OrderPolicy, Registration, System};
pub use crate::time::{ManualTime, StdTimeProvider, TimeProvider};
pub use crate::watcher::DirectorySubscription;

#[cfg(feature = "diagnostics")]
pub use crate::engine::SystemTiming;
