//! # Reflection — Runtime Class Metadata
//!
//! Every instance in the tree belongs to a class, and every class is
//! described at runtime by a [`ClassDescriptor`]: its properties, events,
//! methods, base classes, and a factory.
//!
//! ```text
//! ClassBuilder ──build──► ClassDescriptor ──register──► ClassRegistry
//!                                                           │
//!                          is_a / lookup / instantiate ◄────┘
//! ```
//!
//! ## Comparison
//!
//! - **bevy_reflect**: derives metadata from Rust types. Here the class table
//!   is built explicitly because classes are a runtime concept (a console can
//!   name a class that has no Rust type of its own).
//! - **Roblox-style object models**: same shape. Named classes, a single
//!   `Instance` root class, reflected properties with flags.

mod descriptor;
mod id;
mod registry;
mod value;

pub use descriptor::{
    AccessLevel, Argument, BaseClass, Class, ClassBuilder, ClassDescriptor, EventDescriptor,
    Factory, Getter, MethodDescriptor, PropertyDescriptor, PropertyFlags, Setter,
};
pub use id::{ClassId, EventId, MethodId, PropertyId, fnv1a64};
pub use registry::ClassRegistry;
pub use value::{Value, ValueType};
