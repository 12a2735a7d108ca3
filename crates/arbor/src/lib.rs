//! # Arbor — Reflected Object Tree and Subsystem Runtime
//!
//! A single-threaded object model: classes registered with runtime metadata,
//! instances arranged in a tree rooted at an [`Engine`], signal-style event
//! channels on every instance, and long-lived subsystems started in a
//! resolved dependency order.
//!
//! Start with `use arbor::prelude::*`, build a registry with
//! [`core_registry`](classes::core_registry), register your own classes, then
//! create an [`Engine`] and call [`initialize`](Engine::initialize).

pub mod classes;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod instance;
pub mod logging;
pub mod prelude;
pub mod reflect;
pub mod system;
pub mod time;
pub mod watcher;

pub use engine::{Engine, WeakEngine};
pub use error::{Error, Result};
pub use instance::Instance;
