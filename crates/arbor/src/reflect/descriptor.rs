//! Class, property, event, and method descriptors.
//!
//! Descriptors are plain data plus a few closures (factory, accessors).
//! They are built with [`ClassBuilder`] and handed to
//! [`ClassRegistry::register`](super::ClassRegistry::register).

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::id::{ClassId, EventId, MethodId, PropertyId};
use super::value::{Value, ValueType};
use crate::engine::Engine;
use crate::error::Result;
use crate::instance::Instance;
use crate::system::System;

/// Creates an instance of a class inside an engine's tree.
pub type Factory = Rc<dyn Fn(&Engine) -> Result<Instance>>;
/// Reads a reflected property off an instance.
pub type Getter = Rc<dyn Fn(&Engine, Instance) -> Result<Value>>;
/// Writes a reflected property on an instance.
pub type Setter = Rc<dyn Fn(&Engine, Instance, Value) -> Result<()>>;

/// Implemented by Rust types that stand for a registered class, so typed
/// APIs (`instantiate_as`, `get_system_as`) can name it.
pub trait Class {
    const CLASS_NAME: &'static str;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PropertyFlags: u8 {
        const READ_ONLY = 1 << 0;
        const HIDDEN = 1 << 1;
        const SERIALIZABLE = 1 << 2;
        const STORABLE = 1 << 3;
        const REPLICATED = 1 << 4;
    }
}

impl PropertyFlags {
    pub const DEFAULT: Self = Self::SERIALIZABLE.union(Self::STORABLE);
    pub const READ_ONLY_DEFAULT: Self = Self::READ_ONLY.union(Self::DEFAULT);
    pub const HIDDEN_DEFAULT: Self = Self::HIDDEN.union(Self::DEFAULT);
    pub const REPLICATED_DEFAULT: Self = Self::REPLICATED.union(Self::DEFAULT);
    /// Computed on demand, never stored.
    pub const ON_DEMAND: Self = Self::READ_ONLY;
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Who may see a member, or upcast through a base class, from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccessLevel {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Argument {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Argument {
    fn list(args: &[(&str, &str)]) -> Vec<Argument> {
        args.iter()
            .map(|(name, ty)| Argument {
                name: name.to_string(),
                type_name: ty.to_string(),
            })
            .collect()
    }
}

#[derive(Clone, Serialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub value_type: ValueType,
    pub id: PropertyId,
    pub flags: PropertyFlags,
    pub access: AccessLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip)]
    pub(crate) getter: Option<Getter>,
    #[serde(skip)]
    pub(crate) setter: Option<Setter>,
}

impl PropertyDescriptor {
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(PropertyFlags::READ_ONLY)
    }

    pub fn has_getter(&self) -> bool {
        self.getter.is_some()
    }

    pub fn has_setter(&self) -> bool {
        self.setter.is_some()
    }

    pub fn getter(&self) -> Option<&Getter> {
        self.getter.as_ref()
    }

    pub fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("access", &self.access)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventDescriptor {
    pub name: String,
    pub args: Vec<Argument>,
    pub id: EventId,
    pub access: AccessLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub return_type: String,
    pub args: Vec<Argument>,
    pub id: MethodId,
    pub access: AccessLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseClass {
    pub id: ClassId,
    pub name: String,
    pub visibility: AccessLevel,
}

/// Runtime metadata for one class.
#[derive(Clone, Serialize)]
pub struct ClassDescriptor {
    pub name: String,
    pub id: ClassId,
    pub properties: Vec<PropertyDescriptor>,
    pub events: Vec<EventDescriptor>,
    pub methods: Vec<MethodDescriptor>,
    /// Direct bases, in declaration order.
    pub bases: Vec<BaseClass>,
    /// Direct subclasses, filled in by the registry.
    pub derived: Vec<ClassId>,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip)]
    pub(crate) factory: Option<Factory>,
}

impl ClassDescriptor {
    pub fn property(&self, id: PropertyId) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.id == id)
    }

    pub fn property_named(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn event_named(&self, name: &str) -> Option<&EventDescriptor> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn method_named(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn factory(&self) -> Option<&Factory> {
        self.factory.as_ref()
    }

    /// Abstract classes and classes without a factory cannot be instantiated.
    pub fn is_instantiable(&self) -> bool {
        !self.is_abstract && self.factory.is_some()
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("bases", &self.bases)
            .field("properties", &self.properties.len())
            .field("events", &self.events.len())
            .field("methods", &self.methods.len())
            .field("abstract", &self.is_abstract)
            .finish()
    }
}

enum LastMember {
    Property,
    Event,
    Method,
}

/// Fluent construction of a [`ClassDescriptor`].
///
/// ```ignore
/// let part = ClassBuilder::new("Part")
///     .base("Instance")
///     .property("Anchored", ValueType::Bool, PropertyFlags::REPLICATED_DEFAULT)
///     .summary("Whether physics may move the part.")
///     .event("Touched", &[("Other", "Instance")])
///     .default_factory()
///     .build();
/// ```
pub struct ClassBuilder {
    class: ClassDescriptor,
    last: Option<LastMember>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            class: ClassDescriptor {
                name: name.to_string(),
                id: ClassId::of(name),
                properties: Vec::new(),
                events: Vec::new(),
                methods: Vec::new(),
                bases: Vec::new(),
                derived: Vec::new(),
                is_abstract: false,
                summary: None,
                factory: None,
            },
            last: None,
        }
    }

    /// Add a public base class.
    pub fn base(self, name: &str) -> Self {
        self.base_with(name, AccessLevel::Public)
    }

    pub fn base_with(mut self, name: &str, visibility: AccessLevel) -> Self {
        self.class.bases.push(BaseClass {
            id: ClassId::of(name),
            name: name.to_string(),
            visibility,
        });
        self
    }

    pub fn property(self, name: &str, value_type: ValueType, flags: PropertyFlags) -> Self {
        self.property_with(name, value_type, flags, AccessLevel::Public)
    }

    pub fn property_with(
        mut self,
        name: &str,
        value_type: ValueType,
        flags: PropertyFlags,
        access: AccessLevel,
    ) -> Self {
        self.class.properties.push(PropertyDescriptor {
            name: name.to_string(),
            value_type,
            id: PropertyId::of(&self.class.name, name),
            flags,
            access,
            summary: None,
            getter: None,
            setter: None,
        });
        self.last = Some(LastMember::Property);
        self
    }

    pub fn event(mut self, name: &str, args: &[(&str, &str)]) -> Self {
        self.class.events.push(EventDescriptor {
            name: name.to_string(),
            args: Argument::list(args),
            id: EventId::of(&self.class.name, name),
            access: AccessLevel::Public,
            summary: None,
        });
        self.last = Some(LastMember::Event);
        self
    }

    pub fn method(mut self, name: &str, return_type: &str, args: &[(&str, &str)]) -> Self {
        self.class.methods.push(MethodDescriptor {
            name: name.to_string(),
            return_type: return_type.to_string(),
            args: Argument::list(args),
            id: MethodId::of(&self.class.name, name),
            access: AccessLevel::Public,
            summary: None,
        });
        self.last = Some(LastMember::Method);
        self
    }

    /// Attach a summary to the most recently added member, or to the class
    /// itself if no member has been added yet.
    pub fn summary(mut self, text: &str) -> Self {
        let text = Some(text.to_string());
        match self.last {
            Some(LastMember::Property) => {
                if let Some(p) = self.class.properties.last_mut() {
                    p.summary = text;
                }
            }
            Some(LastMember::Event) => {
                if let Some(e) = self.class.events.last_mut() {
                    e.summary = text;
                }
            }
            Some(LastMember::Method) => {
                if let Some(m) = self.class.methods.last_mut() {
                    m.summary = text;
                }
            }
            None => self.class.summary = text,
        }
        self
    }

    /// Mark the class abstract (an interface): it can be queried and derived
    /// from, never instantiated.
    pub fn abstract_class(mut self) -> Self {
        self.class.is_abstract = true;
        self
    }

    pub fn factory(mut self, factory: impl Fn(&Engine) -> Result<Instance> + 'static) -> Self {
        self.class.factory = Some(Rc::new(factory));
        self
    }

    /// Factory that creates a bare instance of this class with no extra state.
    pub fn default_factory(self) -> Self {
        let id = self.class.id;
        self.factory(move |engine| engine.create_instance(id))
    }

    /// Factory for a subsystem class: each instantiation builds a fresh
    /// `S` and attaches it to the new instance.
    pub fn system_factory<S: System>(self, make: impl Fn() -> S + 'static) -> Self {
        let id = self.class.id;
        self.factory(move |engine| engine.create_system_instance(id, make()))
    }

    pub fn build(self) -> ClassDescriptor {
        self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_stable_ids() {
        let class = ClassBuilder::new("Part")
            .base("Instance")
            .property("Anchored", ValueType::Bool, PropertyFlags::DEFAULT)
            .event("Touched", &[("Other", "Instance")])
            .method("Explode", "void", &[])
            .build();

        assert_eq!(class.id, ClassId::of("Part"));
        assert_eq!(class.properties[0].id, PropertyId::of("Part", "Anchored"));
        assert_eq!(class.events[0].id, EventId::of("Part", "Touched"));
        assert_eq!(class.events[0].args[0].type_name, "Instance");
        assert_eq!(class.methods[0].id, MethodId::of("Part", "Explode"));
        assert_eq!(class.bases[0].id, ClassId::of("Instance"));
        assert_eq!(class.bases[0].visibility, AccessLevel::Public);
    }

    #[test]
    fn summary_attaches_to_last_member() {
        let class = ClassBuilder::new("Thing")
            .summary("A thing.")
            .property("Size", ValueType::Float, PropertyFlags::DEFAULT)
            .summary("How big.")
            .event("Grew", &[])
            .build();

        assert_eq!(class.summary.as_deref(), Some("A thing."));
        assert_eq!(class.properties[0].summary.as_deref(), Some("How big."));
        assert!(class.events[0].summary.is_none());
    }

    #[test]
    fn flag_presets() {
        assert!(PropertyFlags::READ_ONLY_DEFAULT.contains(PropertyFlags::STORABLE));
        assert!(PropertyFlags::REPLICATED_DEFAULT.contains(PropertyFlags::REPLICATED));
        assert!(!PropertyFlags::DEFAULT.contains(PropertyFlags::READ_ONLY));
        assert_eq!(PropertyFlags::default(), PropertyFlags::DEFAULT);
    }

    #[test]
    fn abstract_or_factoryless_is_not_instantiable() {
        let no_factory = ClassBuilder::new("A").build();
        assert!(!no_factory.is_instantiable());

        let abstract_with_factory = ClassBuilder::new("B")
            .abstract_class()
            .factory(|engine| engine.create_instance(ClassId::of("B")))
            .build();
        assert!(!abstract_with_factory.is_instantiable());
    }
}
