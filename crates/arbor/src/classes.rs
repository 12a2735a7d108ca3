//! Built-in classes every engine needs.
//!
//! [`register_core_classes`] is the explicit startup entry point: call it
//! once on a fresh [`ClassRegistry`], add your own classes, then hand the
//! registry to [`Engine::new`](crate::Engine::new).
//!
//! ```text
//! Instance (abstract)
//! ├── System (abstract)
//! │   └── LogSystem
//! ├── Engine          root, never instantiated through the registry
//! └── World
//! ```

use crate::error::{Error, Result};
use crate::logging::LogSystem;
use crate::reflect::{
    Class, ClassBuilder, ClassDescriptor, ClassRegistry, PropertyFlags, Value, ValueType,
};

pub const INSTANCE: &str = "Instance";
pub const SYSTEM: &str = "System";
pub const ENGINE: &str = "Engine";
pub const WORLD: &str = "World";

/// Register `Instance`, `System`, `Engine`, `World`, and `LogSystem`, and
/// bind the reflected `Instance` properties to the tree.
pub fn register_core_classes(registry: &mut ClassRegistry) -> Result<()> {
    registry.register(instance_class())?;
    registry.register(
        ClassBuilder::new(SYSTEM)
            .base(INSTANCE)
            .summary("A long-lived engine subsystem; one instance per class.")
            .abstract_class()
            .build(),
    )?;
    registry.register(
        ClassBuilder::new(ENGINE)
            .base(INSTANCE)
            .summary("Root of the instance tree.")
            .method("GetSystem", "System", &[("name", "string")])
            .build(),
    )?;
    registry.register(
        ClassBuilder::new(WORLD)
            .base(INSTANCE)
            .summary("Container for simulated content.")
            .default_factory()
            .build(),
    )?;
    registry.register(
        ClassBuilder::new(LogSystem::CLASS_NAME)
            .base(SYSTEM)
            .event("MessageLogged", &[("message", "string"), ("level", "LogLevel")])
            .method("Write", "void", &[("message", "string"), ("level", "LogLevel")])
            .method("Clear", "void", &[])
            .system_factory(LogSystem::new)
            .build(),
    )?;
    bind_instance_accessors(registry)
}

/// A registry with only the core classes in it.
pub fn core_registry() -> Result<ClassRegistry> {
    let mut registry = ClassRegistry::new();
    register_core_classes(&mut registry)?;
    Ok(registry)
}

fn instance_class() -> ClassDescriptor {
    let instance_arg = [("child", "Instance")];
    let descendant_args = [("descendant", "Instance"), ("parent", "Instance")];

    ClassBuilder::new(INSTANCE)
        .summary("Base class of every object in the tree.")
        .abstract_class()
        .property(
            "Id",
            ValueType::Uuid,
            PropertyFlags::HIDDEN_DEFAULT
                .union(PropertyFlags::READ_ONLY)
                .union(PropertyFlags::REPLICATED),
        )
        .property("Archivable", ValueType::Bool, PropertyFlags::DEFAULT)
        .summary("Whether the instance is saved with its parent.")
        .property("Name", ValueType::String, PropertyFlags::REPLICATED_DEFAULT)
        .property("Parent", ValueType::Instance, PropertyFlags::REPLICATED_DEFAULT)
        .property("Children", ValueType::Instances, PropertyFlags::ON_DEMAND)
        .event("ChildAdded", &instance_arg)
        .event("ChildRemoved", &instance_arg)
        .event("DescendantAdded", &descendant_args)
        .event("DescendantRemoved", &descendant_args)
        .event("PropertyChanged", &[("property", "PropertyId")])
        .event("Changed", &[("property", "string")])
        .summary("Name-based variant of PropertyChanged.")
        .method("FindFirstChild", "Instance", &[("name", "string")])
        .method(
            "FindFirstChildOfClass",
            "Instance",
            &[("className", "string"), ("allowSubClasses", "bool")],
        )
        .method("IsA", "bool", &[("className", "string")])
        .method("IsDescendantOf", "bool", &[("other", "Instance")])
        .method("IsAncestorOf", "bool", &[("other", "Instance")])
        .method("GetDescendants", "Instance[]", &[])
        .method("GetPath", "string", &[("relativeTo", "Instance")])
        .method("Destroy", "void", &[])
        .build()
}

fn bind_instance_accessors(registry: &mut ClassRegistry) -> Result<()> {
    registry.bind_getter(INSTANCE, "Id", |engine, i| engine.uuid(i).map(Value::Uuid))?;

    registry.bind_getter(INSTANCE, "Archivable", |engine, i| {
        engine.archivable(i).map(Value::Bool)
    })?;
    registry.bind_setter(INSTANCE, "Archivable", |engine, i, value| {
        let archivable = value
            .as_bool()
            .ok_or_else(|| mismatch("Archivable", ValueType::Bool, &value))?;
        engine.set_archivable(i, archivable)
    })?;

    registry.bind_getter(INSTANCE, "Name", |engine, i| engine.name(i).map(Value::String))?;
    registry.bind_setter(INSTANCE, "Name", |engine, i, value| match value {
        Value::String(name) => engine.set_name(i, name),
        other => Err(mismatch("Name", ValueType::String, &other)),
    })?;

    registry.bind_getter(INSTANCE, "Parent", |engine, i| {
        engine.parent(i).map(Value::Instance)
    })?;
    registry.bind_setter(INSTANCE, "Parent", |engine, i, value| match value {
        Value::Instance(parent) => engine.set_parent(i, parent),
        other => Err(mismatch("Parent", ValueType::Instance, &other)),
    })?;

    registry.bind_getter(INSTANCE, "Children", |engine, i| {
        engine.children(i).map(Value::Instances)
    })?;
    Ok(())
}

fn mismatch(property: &str, expected: ValueType, actual: &Value) -> Error {
    Error::PropertyTypeMismatch {
        property: property.to_string(),
        expected,
        actual: actual.value_type(),
    }
}
