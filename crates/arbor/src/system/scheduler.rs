//! # SystemInitOrder — Startup Ordering for Subsystems
//!
//! Each subsystem states, at most loosely, where it wants to start relative
//! to others: "before `Renderer`", "after `LogSystem`", or "anywhere". The
//! resolver turns those rules into one total order.
//!
//! ```text
//! rules (queue):   A:any   B:after A   C:before A
//!
//! pass 1:  A           → [A]
//!          B after A   → [A, B]
//!          C before A  → [C, A, B]
//! ```
//!
//! A rule whose relative is already placed is spliced directly next to it.
//! A rule whose relative hasn't been placed yet goes to the back of the
//! queue. A rule naming a class nobody registered is treated as
//! unconstrained. If a whole pass over the queue places nothing, the
//! remaining rules are waiting on each other; what happens next is the
//! caller's [`OrderPolicy`].
//!
//! Worst case is O(n²) in the number of rules, which is fine for the handful
//! of subsystems an engine has.

use std::collections::{HashSet, VecDeque};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Before,
    After,
    None,
}

/// What to do with rules that can never be satisfied (a before/after cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
pub enum OrderPolicy {
    /// Fail with [`Error::UnresolvableOrder`].
    #[default]
    Strict,
    /// Log a warning and append the stuck systems in queue order.
    Permissive,
}

#[derive(Debug, Clone)]
struct Rule<T> {
    system: T,
    class: String,
    relative_to: String,
    relation: Relation,
}

/// Queue of ordering rules. `T` is whatever the caller uses to refer to a
/// system; the engine uses the system's [`Instance`](crate::Instance).
#[derive(Debug)]
pub struct SystemInitOrder<T> {
    rules: Vec<Rule<T>>,
}

impl<T> Default for SystemInitOrder<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T: Clone> SystemInitOrder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(&mut self, system: T, class: &str, other: &str) {
        self.push(system, class, other, Relation::Before);
    }

    pub fn after(&mut self, system: T, class: &str, other: &str) {
        self.push(system, class, other, Relation::After);
    }

    pub fn add(&mut self, system: T, class: &str) {
        self.push(system, class, "", Relation::None);
    }

    fn push(&mut self, system: T, class: &str, relative_to: &str, relation: Relation) {
        self.rules.push(Rule {
            system,
            class: class.to_string(),
            relative_to: relative_to.to_string(),
            relation,
        });
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// `true` if any rule has been recorded for `class`.
    pub fn has_rule_for(&self, class: &str) -> bool {
        self.rules.iter().any(|r| r.class == class)
    }

    /// Produce the total order as `(class name, system)` pairs.
    ///
    /// A system with several rules is placed by whichever is satisfied
    /// first; its remaining rules are dropped.
    pub fn resolve(&self, policy: OrderPolicy) -> Result<Vec<(String, T)>> {
        let tracked: HashSet<&str> = self.rules.iter().map(|r| r.class.as_str()).collect();
        let mut ordered: Vec<(String, T)> = Vec::with_capacity(self.rules.len());
        let mut queue: VecDeque<&Rule<T>> = self.rules.iter().collect();

        // Rules examined since something was last placed.
        let mut stalled = 0;
        while let Some(rule) = queue.pop_front() {
            if position_of(&ordered, &rule.class).is_some() {
                log::debug!(
                    "`{}` already ordered, ignoring extra rule relative to `{}`",
                    rule.class,
                    rule.relative_to
                );
                stalled = 0;
                continue;
            }

            let entry = (rule.class.clone(), rule.system.clone());
            match rule.relation {
                Relation::None => ordered.push(entry),
                _ if !tracked.contains(rule.relative_to.as_str()) => {
                    log::debug!(
                        "`{}` is ordered relative to unknown system `{}`; treating as unconstrained",
                        rule.class,
                        rule.relative_to
                    );
                    ordered.push(entry);
                }
                relation => match position_of(&ordered, &rule.relative_to) {
                    Some(at) if relation == Relation::Before => ordered.insert(at, entry),
                    Some(at) => ordered.insert(at + 1, entry),
                    None => {
                        queue.push_back(rule);
                        stalled += 1;
                        if stalled >= queue.len() {
                            return self.unresolvable(policy, ordered, queue);
                        }
                        continue;
                    }
                },
            }
            stalled = 0;
        }

        Ok(ordered)
    }

    fn unresolvable(
        &self,
        policy: OrderPolicy,
        mut ordered: Vec<(String, T)>,
        queue: VecDeque<&Rule<T>>,
    ) -> Result<Vec<(String, T)>> {
        let mut stuck: Vec<&Rule<T>> = Vec::new();
        for rule in queue {
            if !stuck.iter().any(|r| r.class == rule.class) {
                stuck.push(rule);
            }
        }
        let names: Vec<String> = stuck.iter().map(|r| r.class.clone()).collect();

        match policy {
            OrderPolicy::Strict => Err(Error::UnresolvableOrder(names)),
            OrderPolicy::Permissive => {
                log::warn!(
                    "system init order has a cycle; appending in queue order: {}",
                    names.join(", ")
                );
                for rule in stuck {
                    ordered.push((rule.class.clone(), rule.system.clone()));
                }
                Ok(ordered)
            }
        }
    }
}

fn position_of<T>(ordered: &[(String, T)], class: &str) -> Option<usize> {
    ordered.iter().position(|(c, _)| c == class)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(order: &[(String, u32)]) -> Vec<&str> {
        order.iter().map(|(c, _)| c.as_str()).collect()
    }

    #[test]
    fn unconstrained_rules_keep_queue_order() {
        let mut order = SystemInitOrder::new();
        order.add(1, "A");
        order.add(2, "B");
        let out = order.resolve(OrderPolicy::Strict).unwrap();
        assert_eq!(names(&out), ["A", "B"]);
        assert_eq!(out[1].1, 2);
    }

    #[test]
    fn before_and_after_splice_next_to_relative() {
        let mut order = SystemInitOrder::new();
        order.add(1, "A");
        order.after(2, "B", "A");
        order.before(3, "C", "A");
        let out = order.resolve(OrderPolicy::Strict).unwrap();
        assert_eq!(names(&out), ["C", "A", "B"]);
    }

    #[test]
    fn after_splices_immediately_after_not_at_end() {
        let mut order = SystemInitOrder::new();
        order.add(1, "A");
        order.add(2, "B");
        order.after(3, "C", "A");
        let out = order.resolve(OrderPolicy::Strict).unwrap();
        assert_eq!(names(&out), ["A", "C", "B"]);
    }

    #[test]
    fn rule_waiting_on_later_system_is_requeued() {
        let mut order = SystemInitOrder::new();
        order.after(1, "B", "A");
        order.add(2, "A");
        let out = order.resolve(OrderPolicy::Strict).unwrap();
        assert_eq!(names(&out), ["A", "B"]);
    }

    #[test]
    fn unknown_relative_is_dropped_constraint() {
        let mut order = SystemInitOrder::new();
        order.add(1, "A");
        order.after(2, "B", "Missing");
        order.add(3, "C");
        let out = order.resolve(OrderPolicy::Strict).unwrap();
        assert_eq!(names(&out), ["A", "B", "C"]);
    }

    #[test]
    fn chain_resolves_across_passes() {
        let mut order = SystemInitOrder::new();
        order.after(1, "C", "B");
        order.after(2, "B", "A");
        order.add(3, "A");
        let out = order.resolve(OrderPolicy::Strict).unwrap();
        assert_eq!(names(&out), ["A", "B", "C"]);
    }

    #[test]
    fn cycle_is_an_error_under_strict() {
        let mut order = SystemInitOrder::new();
        order.add(1, "Root");
        order.after(2, "A", "B");
        order.after(3, "B", "A");
        match order.resolve(OrderPolicy::Strict) {
            Err(Error::UnresolvableOrder(stuck)) => assert_eq!(stuck, ["A", "B"]),
            other => panic!("expected UnresolvableOrder, got {other:?}"),
        }
    }

    #[test]
    fn cycle_is_appended_under_permissive() {
        let mut order = SystemInitOrder::new();
        order.add(1, "Root");
        order.after(2, "A", "B");
        order.after(3, "B", "A");
        let out = order.resolve(OrderPolicy::Permissive).unwrap();
        assert_eq!(names(&out), ["Root", "A", "B"]);
    }

    #[test]
    fn extra_rules_for_placed_system_are_ignored() {
        let mut order = SystemInitOrder::new();
        order.add(1, "A");
        order.after(2, "B", "A");
        order.before(2, "B", "A");
        let out = order.resolve(OrderPolicy::Strict).unwrap();
        assert_eq!(names(&out), ["A", "B"]);
    }

    #[test]
    fn empty_queue_resolves_to_nothing() {
        let order: SystemInitOrder<u32> = SystemInitOrder::new();
        assert!(order.resolve(OrderPolicy::Strict).unwrap().is_empty());
    }
}
