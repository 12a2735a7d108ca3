//! Built-in channels every instance carries.

use crate::event::EventChannel;
use crate::reflect::PropertyId;

use super::Instance;

/// The per-instance channels fired by tree mutations and property writes.
///
/// Channels are reference-counted handles, so cloning an `InstanceEvents`
/// shares the underlying listener lists. The engine hands out clones and
/// fires on clones, never holding the arena borrow while listeners run.
#[derive(Clone, Default)]
pub struct InstanceEvents {
    /// `(child)` after a child is attached to this instance.
    pub child_added: EventChannel<Instance>,
    /// `(child)` after a child is detached from this instance.
    pub child_removed: EventChannel<Instance>,
    /// `(descendant, immediate_parent)` for any attach at or below this
    /// instance.
    pub descendant_added: EventChannel<(Instance, Instance)>,
    /// `(descendant, former_parent)` for any detach at or below this
    /// instance.
    pub descendant_removed: EventChannel<(Instance, Instance)>,
    /// Fired with the id of a reflected property that changed.
    pub property_changed: EventChannel<PropertyId>,
    /// Name-based twin of `property_changed`. Only resolved and fired when
    /// something is listening.
    pub changed: EventChannel<String>,
}

impl InstanceEvents {
    /// Drop every listener on every channel without invoking any of them.
    pub fn clear_all(&self) {
        self.child_added.clear();
        self.child_removed.clear();
        self.descendant_added.clear();
        self.descendant_removed.clear();
        self.property_changed.clear();
        self.changed.clear();
    }
}

impl std::fmt::Debug for InstanceEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceEvents")
            .field("child_added", &self.child_added.listener_count())
            .field("child_removed", &self.child_removed.listener_count())
            .field("descendant_added", &self.descendant_added.listener_count())
            .field("descendant_removed", &self.descendant_removed.listener_count())
            .field("property_changed", &self.property_changed.listener_count())
            .field("changed", &self.changed.listener_count())
            .finish()
    }
}
