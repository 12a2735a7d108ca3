//! # ClassRegistry — Runtime Class Table
//!
//! One table per process, filled once at startup by an explicit
//! registration pass ([`register_core_classes`](crate::classes::register_core_classes)
//! plus whatever the application adds), then frozen behind an `Rc` inside the
//! [`Engine`](crate::engine::Engine).
//!
//! ```text
//! by_name:  "Part" ──┐
//!                    ▼
//! classes:  ClassId ─► ClassDescriptor { bases: [(Instance, Public)], derived: [...] }
//!
//! order:    [Instance, System, Engine, Part, ...]   registration order
//! ```
//!
//! Registration is fallible: a duplicate name, or a different name that
//! hashes to an existing [`ClassId`], is an error instead of a silent
//! overwrite. Derived-class lists are maintained here so descriptors can be
//! registered in any order.
//!
//! ## IsA
//!
//! Ancestry is one ordered list of `(base, visibility)` per class. `is_a`
//! walks all of it depth-first; visibility only matters to
//! [`can_upcast`](ClassRegistry::can_upcast), which answers the narrower
//! question "may outside code treat this class as that base?".

use std::collections::{HashMap, HashSet, VecDeque};

use super::descriptor::{AccessLevel, Class, ClassDescriptor, PropertyDescriptor};
use super::id::{ClassId, PropertyId};
use super::value::Value;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::instance::Instance;

#[derive(Default)]
pub struct ClassRegistry {
    classes: HashMap<ClassId, ClassDescriptor>,
    by_name: HashMap<String, ClassId>,
    order: Vec<ClassId>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Insert a class by name and by id.
    pub fn register(&mut self, mut class: ClassDescriptor) -> Result<ClassId> {
        if self.by_name.contains_key(&class.name) {
            return Err(Error::DuplicateClass(class.name));
        }
        if let Some(existing) = self.classes.get(&class.id) {
            return Err(Error::ClassIdCollision {
                name: class.name,
                existing: existing.name.clone(),
                id: class.id,
            });
        }

        let mut seen = HashSet::new();
        for property in &class.properties {
            if !seen.insert(property.id) {
                return Err(Error::DuplicateProperty {
                    class: class.name,
                    property: property.name.clone(),
                });
            }
        }

        // Classes registered earlier that name this one as a base.
        class.derived = self
            .order
            .iter()
            .filter(|id| self.classes[*id].bases.iter().any(|b| b.id == class.id))
            .copied()
            .collect();

        for base in &class.bases {
            if let Some(base_class) = self.classes.get_mut(&base.id) {
                if !base_class.derived.contains(&class.id) {
                    base_class.derived.push(class.id);
                }
            }
        }

        let id = class.id;
        log::debug!("registered class `{}` ({})", class.name, id);
        self.by_name.insert(class.name.clone(), id);
        self.order.push(id);
        self.classes.insert(id, class);
        Ok(id)
    }

    /// Second registration phase: wire a getter to a property declared on
    /// `class` itself.
    pub fn bind_getter(
        &mut self,
        class: &str,
        property: &str,
        getter: impl Fn(&Engine, Instance) -> Result<Value> + 'static,
    ) -> Result<()> {
        self.own_property_mut(class, property)?.getter = Some(std::rc::Rc::new(getter));
        Ok(())
    }

    pub fn bind_setter(
        &mut self,
        class: &str,
        property: &str,
        setter: impl Fn(&Engine, Instance, Value) -> Result<()> + 'static,
    ) -> Result<()> {
        self.own_property_mut(class, property)?.setter = Some(std::rc::Rc::new(setter));
        Ok(())
    }

    fn own_property_mut(&mut self, class: &str, property: &str) -> Result<&mut PropertyDescriptor> {
        let id = *self
            .by_name
            .get(class)
            .ok_or_else(|| Error::ClassNotFound(class.to_string()))?;
        let descriptor = self
            .classes
            .get_mut(&id)
            .ok_or_else(|| Error::ClassNotFound(class.to_string()))?;
        descriptor
            .properties
            .iter_mut()
            .find(|p| p.name == property)
            .ok_or_else(|| Error::invalid_property(class, property))
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub fn lookup(&self, name: &str) -> Option<&ClassDescriptor> {
        self.by_name.get(name).and_then(|id| self.classes.get(id))
    }

    pub fn lookup_by_id(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.classes.get(&id)
    }

    pub(crate) fn require(&self, id: ClassId) -> Result<&ClassDescriptor> {
        self.classes
            .get(&id)
            .ok_or_else(|| Error::ClassNotFound(id.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All classes, in registration order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDescriptor> {
        self.order.iter().map(|id| &self.classes[id])
    }

    // ── Ancestry ─────────────────────────────────────────────────────

    /// `true` if `class` is `target` or derives from it through any base.
    pub fn is_a(&self, class: ClassId, target: &str) -> bool {
        self.is_a_id(class, ClassId::of(target))
    }

    pub fn is_a_id(&self, class: ClassId, target: ClassId) -> bool {
        self.walk_bases(class, target, false)
    }

    /// Like [`is_a_id`](Self::is_a_id), but only through public bases.
    pub fn can_upcast(&self, class: ClassId, target: ClassId) -> bool {
        self.walk_bases(class, target, true)
    }

    fn walk_bases(&self, from: ClassId, target: ClassId, public_only: bool) -> bool {
        let mut stack = vec![from];
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            let Some(class) = self.classes.get(&id) else {
                continue;
            };
            // Reverse so the first declared base is explored first.
            for base in class.bases.iter().rev() {
                if public_only && base.visibility != AccessLevel::Public {
                    continue;
                }
                stack.push(base.id);
            }
        }
        false
    }

    /// Every ancestor of `class`, closest first, without duplicates.
    pub fn base_classes(&self, class: ClassId) -> Vec<ClassId> {
        self.breadth_first(class, |c| c.bases.iter().map(|b| b.id).collect())
    }

    /// Every descendant class of `class`, closest first.
    pub fn derived_classes(&self, class: ClassId) -> Vec<ClassId> {
        self.breadth_first(class, |c| c.derived.clone())
    }

    fn breadth_first(
        &self,
        start: ClassId,
        next: impl Fn(&ClassDescriptor) -> Vec<ClassId>,
    ) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            let Some(class) = self.classes.get(&id) else {
                continue;
            };
            for neighbour in next(class) {
                if visited.insert(neighbour) {
                    out.push(neighbour);
                    queue.push_back(neighbour);
                }
            }
        }
        out
    }

    // ── Members ──────────────────────────────────────────────────────

    /// Find a property on `class` or any of its ancestors.
    pub fn find_property(&self, class: ClassId, property: PropertyId) -> Option<&PropertyDescriptor> {
        self.lineage(class).find_map(|c| c.property(property))
    }

    pub fn find_property_by_name(&self, class: ClassId, name: &str) -> Option<&PropertyDescriptor> {
        self.lineage(class).find_map(|c| c.property_named(name))
    }

    pub fn property_name(&self, class: ClassId, property: PropertyId) -> Result<&str> {
        self.find_property(class, property)
            .map(|p| p.name.as_str())
            .ok_or_else(|| Error::invalid_property(&self.class_name(class), property))
    }

    fn lineage(&self, class: ClassId) -> impl Iterator<Item = &ClassDescriptor> {
        std::iter::once(class)
            .chain(self.base_classes(class))
            .filter_map(|id| self.classes.get(&id))
    }

    pub(crate) fn class_name(&self, class: ClassId) -> String {
        self.classes
            .get(&class)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| class.to_string())
    }

    // ── Instantiation ────────────────────────────────────────────────

    /// Run the factory of `name` against `engine`.
    pub fn instantiate(&self, name: &str, engine: &Engine) -> Result<Instance> {
        let class = self
            .lookup(name)
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))?;
        let factory = match (&class.factory, class.is_abstract) {
            (Some(factory), false) => factory.clone(),
            _ => return Err(Error::AbstractClassInstantiated(name.to_string())),
        };
        factory(engine)
    }

    /// Instantiate `name`, requiring that it is a `T`.
    pub fn instantiate_as<T: Class>(&self, name: &str, engine: &Engine) -> Result<Instance> {
        let class = self
            .lookup(name)
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))?;
        if !self.is_a(class.id, T::CLASS_NAME) {
            return Err(Error::ClassMismatch {
                class: name.to_string(),
                expected: T::CLASS_NAME.to_string(),
            });
        }
        self.instantiate(name, engine)
    }

    // ── Export ───────────────────────────────────────────────────────

    /// Serialize every descriptor's metadata (closures excluded) as a JSON
    /// array in registration order.
    pub fn export_json(&self) -> Result<String> {
        let classes: Vec<&ClassDescriptor> = self.classes().collect();
        Ok(serde_json::to_string_pretty(&classes)?)
    }
}
