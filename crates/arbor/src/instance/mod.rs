//! # Instances — The Object Tree
//!
//! Everything the engine knows about lives in one tree rooted at the
//! [`Engine`](crate::Engine) instance: subsystems, the world, and whatever
//! the application creates underneath.
//!
//! ```text
//! Engine (root)
//! ├── LogSystem
//! ├── World
//! │   ├── Part
//! │   └── Model
//! │       └── Part
//! └── ...
//! ```
//!
//! An [`Instance`] is a generational handle; the nodes themselves live in an
//! arena owned by the engine. All reads and mutations go through
//! [`Engine`](crate::Engine) methods, which validate the handle first.
//!
//! ## Comparison
//!
//! - **ECS `Parent`/`Children` components**: same links, but here the links
//!   are core node fields and every structural change fires
//!   `ChildAdded`/`DescendantRemoved`-style events.
//! - **DOM**: closest analogue. Named nodes, ordered children, bubbling
//!   descendant notifications.

mod events;
mod handle;
pub(crate) mod tree;

pub use events::InstanceEvents;
pub use handle::Instance;
