//! # Systems — Long-Lived Engine Subsystems
//!
//! A system is a singleton service that hangs off the engine root: logging,
//! rendering, audio, UI. Every registered class that derives from `System`
//! gets exactly one instance when the engine initializes.
//!
//! ```text
//! Engine::initialize()
//!   for each class IsA("System"):  instantiate → parent under root → register()
//!   SystemInitOrder::resolve()
//!   for each system in order:      initialize()
//!
//! Engine::update(dt)
//!   for each system in order:      update(dt)
//!
//! Engine::shutdown()
//!   for each system in reverse:    shutdown()
//! ```
//!
//! ## Comparison
//!
//! - **Bevy plugins / resources**: closest analogue, but ordering there is
//!   per-schedule. Here a system only says where it wants to *start*, and the
//!   same order is reused for every frame.
//! - **Roblox services**: same idea (one per class, found by name).

mod scheduler;

pub use scheduler::{OrderPolicy, Relation, SystemInitOrder};

use crate::engine::Engine;
use crate::instance::Instance;

/// A subsystem driven by the engine.
///
/// The engine holds each system in a `RefCell` and borrows it mutably for
/// the duration of a hook. A hook may look up *other* systems through the
/// engine, but must not borrow itself again via
/// [`Engine::get_system_as`].
pub trait System: 'static {
    /// Declare where this system wants to start relative to others.
    /// The default has no preference.
    fn register(&self, order: &mut Registration<'_>) {
        order.add();
    }

    fn initialize(&mut self, _engine: &Engine) {}

    fn update(&mut self, _engine: &Engine, _delta: f64) {}

    fn shutdown(&mut self, _engine: &Engine) {}
}

/// The slice of a [`SystemInitOrder`] one system sees during
/// [`System::register`].
pub struct Registration<'a> {
    order: &'a mut SystemInitOrder<Instance>,
    system: Instance,
    class: &'a str,
}

impl<'a> Registration<'a> {
    pub(crate) fn new(
        order: &'a mut SystemInitOrder<Instance>,
        system: Instance,
        class: &'a str,
    ) -> Self {
        Self {
            order,
            system,
            class,
        }
    }

    /// Start before the system of class `other`.
    pub fn before(&mut self, other: &str) {
        self.order.before(self.system, self.class, other);
    }

    /// Start after the system of class `other`.
    pub fn after(&mut self, other: &str) {
        self.order.after(self.system, self.class, other);
    }

    /// Start anywhere.
    pub fn add(&mut self) {
        self.order.add(self.system, self.class);
    }

    pub fn class_name(&self) -> &str {
        self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;
    impl System for Quiet {}

    struct Late;
    impl System for Late {
        fn register(&self, order: &mut Registration<'_>) {
            order.after("Quiet");
        }
    }

    fn handle(index: u32) -> Instance {
        Instance {
            index,
            generation: 0,
        }
    }

    #[test]
    fn default_register_is_unconstrained_add() {
        let mut order = SystemInitOrder::new();
        Late.register(&mut Registration::new(&mut order, handle(1), "Late"));
        Quiet.register(&mut Registration::new(&mut order, handle(0), "Quiet"));

        let resolved = order.resolve(OrderPolicy::Strict).unwrap();
        let systems: Vec<Instance> = resolved.into_iter().map(|(_, s)| s).collect();
        assert_eq!(systems, vec![handle(0), handle(1)]);
    }
}
