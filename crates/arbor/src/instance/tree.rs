//! # Tree — Instance Arena and Structural Operations
//!
//! All nodes live in one `Vec<Option<Node>>` owned by the engine. Parent and
//! child links are [`Instance`] handles, never references, so the tree has
//! no ownership cycles and a destroyed node can't leave a dangling pointer
//! behind: the stale handle just fails its generation check.
//!
//! ```text
//! slots:  [ Engine | World | Part | (free) | Part ]
//!            ▲ root   │        │              │
//!            └────────┘        │              │
//!                     ▲────────┘──────────────┘   (parent handles)
//! ```
//!
//! ## Notification plans
//!
//! Structural operations never fire events themselves. They mutate the
//! arena, then return a [`ReparentPlan`] holding clones of every channel that
//! needs to fire and the ancestor chains as they were at mutation time. The
//! engine drops its `RefCell` borrow before running the plan, so listeners
//! are free to reparent, rename, or destroy instances from inside a callback.

use std::collections::HashMap;

use uuid::Uuid;

use super::events::InstanceEvents;
use super::handle::{HandleAllocator, Instance};
use crate::classes::INSTANCE;
use crate::error::{Error, Result};
use crate::reflect::{ClassId, ClassRegistry, PropertyId};

pub(crate) struct Node {
    pub uuid: Uuid,
    pub name: String,
    pub archivable: bool,
    pub class: ClassId,
    pub parent: Option<Instance>,
    pub children: Vec<Instance>,
    pub events: InstanceEvents,
}

#[derive(Default)]
pub(crate) struct Tree {
    nodes: Vec<Option<Node>>,
    handles: HandleAllocator,
    by_uuid: HashMap<Uuid, Instance>,
}

impl Tree {
    pub fn insert(&mut self, class: ClassId, name: String) -> Instance {
        let handle = self.handles.allocate();
        let uuid = Uuid::now_v7();
        let node = Node {
            uuid,
            name,
            archivable: true,
            class,
            parent: None,
            children: Vec::new(),
            events: InstanceEvents::default(),
        };
        let slot = handle.index as usize;
        if slot == self.nodes.len() {
            self.nodes.push(Some(node));
        } else {
            self.nodes[slot] = Some(node);
        }
        self.by_uuid.insert(uuid, handle);
        handle
    }

    pub fn contains(&self, instance: Instance) -> bool {
        self.handles.is_live(instance)
    }

    pub fn len(&self) -> usize {
        self.handles.live_count()
    }

    #[cfg(feature = "diagnostics")]
    pub fn slot_count(&self) -> usize {
        self.handles.slot_count()
    }

    pub fn node(&self, instance: Instance) -> Result<&Node> {
        if !self.handles.is_live(instance) {
            return Err(Error::InstanceDestroyed(instance));
        }
        self.nodes[instance.index as usize]
            .as_ref()
            .ok_or(Error::InstanceDestroyed(instance))
    }

    pub fn node_mut(&mut self, instance: Instance) -> Result<&mut Node> {
        if !self.handles.is_live(instance) {
            return Err(Error::InstanceDestroyed(instance));
        }
        self.nodes[instance.index as usize]
            .as_mut()
            .ok_or(Error::InstanceDestroyed(instance))
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<Instance> {
        self.by_uuid.get(uuid).copied()
    }

    // ── Structure ────────────────────────────────────────────────────

    /// Move `child` under `new_parent` (or detach it with `None`).
    ///
    /// Returns `Ok(None)` when the parent is unchanged. Validation happens
    /// before any state is touched.
    pub fn reparent(
        &mut self,
        child: Instance,
        new_parent: Option<Instance>,
    ) -> Result<Option<ReparentPlan>> {
        let old_parent = self.node(child)?.parent;
        if let Some(parent) = new_parent {
            self.node(parent)?;
            if parent == child || self.is_descendant_of(parent, child)? {
                return Err(Error::WouldCreateCycle { child, parent });
            }
        }
        if old_parent == new_parent {
            return Ok(None);
        }

        if let Some(old) = old_parent {
            self.node_mut(old)?.children.retain(|&c| c != child);
        }
        if let Some(new) = new_parent {
            self.node_mut(new)?.children.push(child);
        }
        self.node_mut(child)?.parent = new_parent;

        let removed = old_parent.map(|p| self.side(p)).transpose()?;
        let added = new_parent.map(|p| self.side(p)).transpose()?;
        Ok(Some(ReparentPlan {
            child,
            child_events: self.node(child)?.events.clone(),
            removed,
            added,
        }))
    }

    fn side(&self, parent: Instance) -> Result<Side> {
        let mut chain = Vec::new();
        let mut current = Some(parent);
        while let Some(instance) = current {
            let node = self.node(instance)?;
            chain.push(node.events.clone());
            current = node.parent;
        }
        Ok(Side { parent, chain })
    }

    /// `true` if `other` appears on the parent chain of `instance`.
    pub fn is_descendant_of(&self, instance: Instance, other: Instance) -> Result<bool> {
        let mut current = self.node(instance)?.parent;
        while let Some(parent) = current {
            if parent == other {
                return Ok(true);
            }
            current = self.node(parent)?.parent;
        }
        Ok(false)
    }

    /// Every node below `instance`, pre-order.
    pub fn descendants(&self, instance: Instance) -> Result<Vec<Instance>> {
        let mut out = Vec::new();
        let mut stack: Vec<Instance> =
            self.node(instance)?.children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.node(next)?.children.iter().rev().copied());
        }
        Ok(out)
    }

    /// Dot-separated names from the top of the tree down to `instance`.
    ///
    /// With `relative_to` set to an ancestor, the path starts just below it.
    /// `relative_to == instance` yields the bare name.
    pub fn path(&self, instance: Instance, relative_to: Option<Instance>) -> Result<String> {
        let mut names = Vec::new();
        let mut current = Some(instance);
        while let Some(node_handle) = current {
            if Some(node_handle) == relative_to && node_handle != instance {
                break;
            }
            let node = self.node(node_handle)?;
            names.push(node.name.as_str());
            if Some(node_handle) == relative_to {
                break;
            }
            current = node.parent;
        }
        names.reverse();
        Ok(names.join("."))
    }

    pub fn find_first_child(&self, instance: Instance, name: &str) -> Result<Option<Instance>> {
        let node = self.node(instance)?;
        for &child in &node.children {
            if self.node(child)?.name == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    pub fn find_first_child_of_class(
        &self,
        instance: Instance,
        class: ClassId,
        allow_subclasses: bool,
        registry: &ClassRegistry,
    ) -> Result<Option<Instance>> {
        let node = self.node(instance)?;
        for &child in &node.children {
            let child_class = self.node(child)?.class;
            let matches = if allow_subclasses {
                registry.is_a_id(child_class, class)
            } else {
                child_class == class
            };
            if matches {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Free `instance` and everything below it. Returns the freed handles
    /// with their channels, pre-order, so the caller can clear them once the
    /// arena borrow is released.
    ///
    /// If `instance` still has a parent it is unlinked from that parent's
    /// children without notification, so no live node keeps a freed handle.
    pub fn remove_subtree(&mut self, instance: Instance) -> Result<Vec<(Instance, InstanceEvents)>> {
        if let Some(parent) = self.node(instance)?.parent {
            log::debug!("{instance:?} was re-attached under {parent:?} before being freed; unlinking");
            self.node_mut(parent)?.children.retain(|&c| c != instance);
        }

        let mut doomed = vec![instance];
        doomed.extend(self.descendants(instance)?);

        let mut freed = Vec::with_capacity(doomed.len());
        for handle in doomed {
            if let Some(node) = self.nodes[handle.index as usize].take() {
                self.by_uuid.remove(&node.uuid);
                self.handles.free(handle);
                freed.push((handle, node.events));
            }
        }
        Ok(freed)
    }
}

/// One side (losing or gaining parent) of a reparent.
struct Side {
    parent: Instance,
    /// The parent's channels first, then each ancestor's, nearest first.
    chain: Vec<InstanceEvents>,
}

/// Notifications owed by a completed reparent.
#[must_use = "a reparent plan does nothing until fired"]
pub(crate) struct ReparentPlan {
    child: Instance,
    child_events: InstanceEvents,
    removed: Option<Side>,
    added: Option<Side>,
}

impl ReparentPlan {
    pub fn fire(self) {
        let children = PropertyId::of(INSTANCE, "Children");

        if let Some(side) = &self.removed {
            if let Some(parent_events) = side.chain.first() {
                notify_property(parent_events, children, "Children");
                parent_events.child_removed.fire(self.child);
            }
            for events in &side.chain {
                events.descendant_removed.fire((self.child, side.parent));
            }
        }

        if let Some(side) = &self.added {
            if let Some(parent_events) = side.chain.first() {
                notify_property(parent_events, children, "Children");
                parent_events.child_added.fire(self.child);
            }
            for events in &side.chain {
                events.descendant_added.fire((self.child, side.parent));
            }
        }

        notify_property(
            &self.child_events,
            PropertyId::of(INSTANCE, "Parent"),
            "Parent",
        );
    }
}

/// Fire `property_changed`, and `changed` only if someone listens to it.
pub(crate) fn notify_property(events: &InstanceEvents, id: PropertyId, name: &str) {
    events.property_changed.fire(id);
    if events.changed.has_any_listeners() {
        events.changed.fire(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn tree_with(names: &[&str]) -> (Tree, Vec<Instance>) {
        let mut tree = Tree::default();
        let handles = names
            .iter()
            .map(|n| tree.insert(ClassId::of("Thing"), n.to_string()))
            .collect();
        (tree, handles)
    }

    fn record<T: 'static>(
        log: &Rc<RefCell<Vec<String>>>,
        tag: &'static str,
    ) -> impl FnMut(&T) + use<T> {
        let log = Rc::clone(log);
        move |_| log.borrow_mut().push(tag.to_string())
    }

    fn attach(tree: &mut Tree, child: Instance, parent: Instance) {
        if let Some(plan) = tree.reparent(child, Some(parent)).unwrap() {
            plan.fire();
        }
    }

    #[test]
    fn reparent_moves_membership() {
        let (mut tree, h) = tree_with(&["a", "b", "c"]);
        let (a, b, c) = (h[0], h[1], h[2]);

        attach(&mut tree, c, a);
        assert_eq!(tree.node(c).unwrap().parent, Some(a));
        assert_eq!(tree.node(a).unwrap().children, vec![c]);

        attach(&mut tree, c, b);
        assert_eq!(tree.node(c).unwrap().parent, Some(b));
        assert!(tree.node(a).unwrap().children.is_empty());
        assert_eq!(tree.node(b).unwrap().children, vec![c]);

        tree.reparent(c, None).unwrap().unwrap().fire();
        assert_eq!(tree.node(c).unwrap().parent, None);
        assert!(tree.node(b).unwrap().children.is_empty());
    }

    #[test]
    fn unchanged_parent_is_a_no_op() {
        let (mut tree, h) = tree_with(&["a", "b"]);
        attach(&mut tree, h[1], h[0]);
        assert!(tree.reparent(h[1], Some(h[0])).unwrap().is_none());
        assert!(tree.reparent(h[0], None).unwrap().is_none());
    }

    #[test]
    fn cycles_are_rejected_without_mutation() {
        let (mut tree, h) = tree_with(&["a", "b", "c"]);
        let (a, b, c) = (h[0], h[1], h[2]);
        attach(&mut tree, b, a);
        attach(&mut tree, c, b);

        assert!(matches!(
            tree.reparent(a, Some(a)),
            Err(Error::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            tree.reparent(a, Some(c)),
            Err(Error::WouldCreateCycle { child, parent }) if child == a && parent == c
        ));
        assert_eq!(tree.node(a).unwrap().parent, None);
        assert_eq!(tree.node(c).unwrap().children, Vec::<Instance>::new());
    }

    #[test]
    fn notifications_follow_documented_order() {
        let (mut tree, h) = tree_with(&["root", "old", "new", "child"]);
        let (root, old, new, child) = (h[0], h[1], h[2], h[3]);
        attach(&mut tree, old, root);
        attach(&mut tree, new, root);
        attach(&mut tree, child, old);

        let log = Rc::new(RefCell::new(Vec::<String>::new()));
        let ev = |i: Instance| tree.node(i).unwrap().events.clone();
        ev(old).property_changed.connect(record(&log, "old.PropertyChanged"));
        ev(old).child_removed.connect(record(&log, "old.ChildRemoved"));
        ev(old).descendant_removed.connect(record(&log, "old.DescendantRemoved"));
        ev(root).descendant_removed.connect(record(&log, "root.DescendantRemoved"));
        ev(new).property_changed.connect(record(&log, "new.PropertyChanged"));
        ev(new).child_added.connect(record(&log, "new.ChildAdded"));
        ev(new).descendant_added.connect(record(&log, "new.DescendantAdded"));
        ev(root).descendant_added.connect(record(&log, "root.DescendantAdded"));
        ev(child).property_changed.connect(record(&log, "child.PropertyChanged"));

        attach(&mut tree, child, new);

        assert_eq!(
            *log.borrow(),
            vec![
                "old.PropertyChanged",
                "old.ChildRemoved",
                "old.DescendantRemoved",
                "root.DescendantRemoved",
                "new.PropertyChanged",
                "new.ChildAdded",
                "new.DescendantAdded",
                "root.DescendantAdded",
                "child.PropertyChanged",
            ]
        );
    }

    #[test]
    fn descendant_events_carry_immediate_parent() {
        let (mut tree, h) = tree_with(&["root", "mid", "leaf"]);
        let (root, mid, leaf) = (h[0], h[1], h[2]);
        attach(&mut tree, mid, root);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        tree.node(root)
            .unwrap()
            .events
            .descendant_added
            .connect(move |pair| sink.borrow_mut().push(*pair));

        attach(&mut tree, leaf, mid);
        assert_eq!(*seen.borrow(), vec![(leaf, mid)]);
    }

    #[test]
    fn descendants_are_pre_order() {
        let (mut tree, h) = tree_with(&["p", "x", "y", "z"]);
        let (p, x, y, z) = (h[0], h[1], h[2], h[3]);
        attach(&mut tree, x, p);
        attach(&mut tree, y, p);
        attach(&mut tree, z, x);
        assert_eq!(tree.descendants(p).unwrap(), vec![x, z, y]);
    }

    #[test]
    fn ancestry_queries() {
        let (mut tree, h) = tree_with(&["a", "b", "c", "d"]);
        attach(&mut tree, h[1], h[0]);
        attach(&mut tree, h[2], h[1]);
        assert!(tree.is_descendant_of(h[2], h[0]).unwrap());
        assert!(!tree.is_descendant_of(h[0], h[2]).unwrap());
        assert!(!tree.is_descendant_of(h[3], h[0]).unwrap());
        assert!(!tree.is_descendant_of(h[0], h[0]).unwrap());
    }

    #[test]
    fn paths() {
        let (mut tree, h) = tree_with(&["Engine", "World", "Part"]);
        attach(&mut tree, h[1], h[0]);
        attach(&mut tree, h[2], h[1]);
        assert_eq!(tree.path(h[2], None).unwrap(), "Engine.World.Part");
        assert_eq!(tree.path(h[2], Some(h[0])).unwrap(), "World.Part");
        assert_eq!(tree.path(h[2], Some(h[2])).unwrap(), "Part");
    }

    #[test]
    fn find_first_child_by_name_returns_first_match() {
        let (mut tree, h) = tree_with(&["p", "dup", "dup"]);
        attach(&mut tree, h[1], h[0]);
        attach(&mut tree, h[2], h[0]);
        assert_eq!(tree.find_first_child(h[0], "dup").unwrap(), Some(h[1]));
        assert_eq!(tree.find_first_child(h[0], "nope").unwrap(), None);
    }

    #[test]
    fn removed_subtree_handles_go_stale() {
        let (mut tree, h) = tree_with(&["a", "b", "c"]);
        attach(&mut tree, h[1], h[0]);
        attach(&mut tree, h[2], h[1]);
        let uuid = tree.node(h[2]).unwrap().uuid;

        tree.reparent(h[1], None).unwrap().unwrap().fire();
        let freed = tree.remove_subtree(h[1]).unwrap();
        assert_eq!(freed.len(), 2);
        assert!(!tree.contains(h[1]));
        assert!(!tree.contains(h[2]));
        assert!(matches!(tree.node(h[2]), Err(Error::InstanceDestroyed(_))));
        assert_eq!(tree.find_by_uuid(&uuid), None);
        assert_eq!(tree.len(), 1);

        let reused = tree.insert(ClassId::of("Thing"), "new".into());
        assert!(reused != h[1] && reused != h[2]);
        assert!(!tree.contains(h[1]) && !tree.contains(h[2]));
    }

    #[test]
    fn uuids_are_unique_and_indexed() {
        let (tree, h) = tree_with(&["a", "b"]);
        let ua = tree.node(h[0]).unwrap().uuid;
        let ub = tree.node(h[1]).unwrap().uuid;
        assert_ne!(ua, ub);
        assert_eq!(tree.find_by_uuid(&ua), Some(h[0]));
    }

    #[test]
    fn remove_subtree_unlinks_from_a_live_parent() {
        let (mut tree, h) = tree_with(&["keep", "doomed", "leaf"]);
        attach(&mut tree, h[1], h[0]);
        attach(&mut tree, h[2], h[1]);

        let freed = tree.remove_subtree(h[1]).unwrap();
        let freed: Vec<Instance> = freed.into_iter().map(|(i, _)| i).collect();
        assert_eq!(freed, vec![h[1], h[2]]);
        assert!(tree.node(h[0]).unwrap().children.is_empty());
        assert_eq!(tree.descendants(h[0]).unwrap(), Vec::<Instance>::new());
        assert_eq!(tree.len(), 1);
    }
}
