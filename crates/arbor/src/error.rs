//! Error type shared by the registry, the instance tree, and the engine.
//!
//! Everything here is a developer-facing contract violation: a misspelled
//! class name, a system looked up before the engine finished initializing,
//! a reparent that would loop the tree. They are returned immediately rather
//! than swallowed, so integration mistakes surface at the call site.

use crate::instance::Instance;
use crate::reflect::{ClassId, ValueType};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ── Registry / instantiation ─────────────────────────────────────
    #[error("class `{0}` is not registered")]
    ClassNotFound(String),

    #[error("class `{0}` is abstract and cannot be instantiated")]
    AbstractClassInstantiated(String),

    #[error("class `{class}` cannot be instantiated as `{expected}`")]
    ClassMismatch { class: String, expected: String },

    #[error("class `{0}` is already registered")]
    DuplicateClass(String),

    #[error("class `{name}` hashes to {id}, which is already used by `{existing}`")]
    ClassIdCollision {
        name: String,
        existing: String,
        id: ClassId,
    },

    #[error("class `{class}` declares property `{property}` twice")]
    DuplicateProperty { class: String, property: String },

    // ── Reflected properties ─────────────────────────────────────────
    #[error("class `{class}` has no property {property}")]
    InvalidPropertyId { class: String, property: String },

    #[error("property `{0}` is read-only")]
    ReadOnlyProperty(String),

    #[error("property `{0}` has no bound accessor")]
    MissingAccessor(String),

    #[error("property `{property}` expects {expected:?}, got {actual:?}")]
    PropertyTypeMismatch {
        property: String,
        expected: ValueType,
        actual: ValueType,
    },

    // ── Engine accessors ─────────────────────────────────────────────
    #[error("systems have not been initialized yet")]
    SystemNotInitialized,

    #[error("system `{0}` not found")]
    SystemNotFound(String),

    #[error("engine is already initialized")]
    AlreadyInitialized,

    #[error("system init order cannot be resolved for: {}", .0.join(", "))]
    UnresolvableOrder(Vec<String>),

    // ── Tree mutation ────────────────────────────────────────────────
    #[error("parenting {child:?} under {parent:?} would create a cycle")]
    WouldCreateCycle { child: Instance, parent: Instance },

    #[error("instance {0:?} has been destroyed")]
    InstanceDestroyed(Instance),

    #[error("the engine root instance cannot be destroyed or reparented")]
    RootInstance,

    // ── Configuration / metadata export ──────────────────────────────
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_property(class: &str, property: impl std::fmt::Display) -> Self {
        Error::InvalidPropertyId {
            class: class.to_string(),
            property: property.to_string(),
        }
    }
}

