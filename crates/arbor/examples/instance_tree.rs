//! Instance tree: build a small scene, watch its events, query it.
//!
//! Registers a `Part` class with a reflected `Size` property, builds
//! `Engine.World.{Floor, Model.Wheel}`, and prints every notification the
//! root sees while parts are reparented, renamed, and destroyed.
//!
//! Run with: `cargo run -p arbor --example instance_tree`

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use arbor::prelude::*;

// ── Part ─────────────────────────────────────────────────────────────────

type Sizes = Rc<RefCell<HashMap<Instance, f64>>>;

fn register_part(registry: &mut ClassRegistry, sizes: &Sizes) -> Result<()> {
    registry.register(
        ClassBuilder::new("Part")
            .base("Instance")
            .property("Size", ValueType::Float, PropertyFlags::DEFAULT)
            .default_factory()
            .build(),
    )?;
    registry.register(
        ClassBuilder::new("Model")
            .base("Instance")
            .default_factory()
            .build(),
    )?;

    let read = Rc::clone(sizes);
    registry.bind_getter("Part", "Size", move |_, part| {
        Ok(Value::Float(read.borrow().get(&part).copied().unwrap_or(1.0)))
    })?;
    let write = Rc::clone(sizes);
    registry.bind_setter("Part", "Size", move |engine, part, value| {
        let size = value.as_float().unwrap_or(1.0);
        write.borrow_mut().insert(part, size);
        engine.raise_property_changed(part, PropertyId::of("Part", "Size"))
    })?;
    Ok(())
}

fn main() -> Result<()> {
    init_logger();

    let sizes: Sizes = Rc::default();
    let mut registry = core_registry()?;
    register_part(&mut registry, &sizes)?;
    let engine = Engine::new(Rc::new(registry), EngineConfig::default())?;
    let root = engine.root();

    // ── Listen on the root ───────────────────────────────────────────
    let root_events = engine.events(root)?;
    let weak = engine.downgrade();
    root_events.descendant_added.connect(move |&(added, parent)| {
        if let Some(engine) = weak.upgrade() {
            let path = engine.path(added, None).unwrap_or_default();
            println!("+ {path} (under {parent})");
        }
    });
    root_events
        .descendant_removed
        .connect(|&(removed, parent)| println!("- {removed} (from {parent})"));

    // ── Build ────────────────────────────────────────────────────────
    let world = engine.instantiate("World")?;
    engine.set_parent(world, Some(root))?;

    let floor = engine.instantiate("Part")?;
    engine.set_name(floor, "Floor")?;
    engine.set_parent(floor, Some(world))?;

    let model = engine.instantiate("Model")?;
    let wheel = engine.instantiate("Part")?;
    engine.set_name(wheel, "Wheel")?;
    engine.set_parent(wheel, Some(model))?;
    engine.set_parent(model, Some(world))?;

    // ── Properties ───────────────────────────────────────────────────
    engine
        .events(wheel)?
        .changed
        .connect(|name: &String| println!("  wheel changed: {name}"));
    engine.set_property(wheel, "Size", Value::Float(0.5))?;
    engine.set_property(wheel, "Name", Value::from("FrontWheel"))?;
    println!("wheel size = {:?}", engine.get_property(wheel, "Size")?);

    // ── Queries ──────────────────────────────────────────────────────
    println!("path: {}", engine.path(wheel, None)?);
    println!("path from world: {}", engine.path(wheel, Some(world))?);
    println!(
        "first Part under world: {:?}",
        engine.find_first_child_of_class(world, "Part", false)?
    );
    println!("descendants of root: {}", engine.descendants(root)?.len());

    if let Err(e) = engine.set_parent(world, Some(wheel)) {
        println!("rejected: {e}");
    }

    // ── Destroy ──────────────────────────────────────────────────────
    engine.destroy(model)?;
    println!(
        "wheel after destroy: {}",
        match engine.name(wheel) {
            Ok(name) => name,
            Err(e) => e.to_string(),
        }
    );
    println!("live instances: {}", engine.instance_count());

    Ok(())
}
