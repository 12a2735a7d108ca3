//! # EventChannel — Reentrancy-Safe Multicast Events
//!
//! An [`EventChannel<A>`] is a list of callbacks that all run, in the order
//! they were connected, every time the channel fires. The tree uses it for
//! `ChildAdded`/`DescendantRemoved`/`PropertyChanged`, subsystems use it for
//! their own notifications (e.g. `LogSystem::message_logged`).
//!
//! ## Reentrancy
//!
//! The hard part is that a listener may touch the very channel that is
//! calling it: connect a new listener, disconnect itself or a sibling, or
//! even fire the channel again. The channel never mutates the list it is
//! iterating. Instead:
//!
//! ```text
//! fire(args)
//!   depth += 1
//!   for listener in live (by index, list never reallocated mid-fire):
//!       skip if unbound
//!       call it
//!   depth -= 1
//!   if depth == 0: settle()
//!
//! connect() while depth > 0   → pushed onto `pending`
//! disconnect() while depth > 0 → listener marked unbound (skipped from now on)
//!
//! settle():
//!   live += pending      (new listeners eligible from the *next* fire)
//!   live.retain(bound)   (disconnected / fired-once listeners purged)
//! ```
//!
//! A listener that is already running further up the stack is not re-entered
//! by a nested fire; its `RefCell` is busy and it is simply skipped.
//!
//! ## Threading
//!
//! Channels are `Rc`-based and therefore `!Send`. Firing from a foreign
//! thread is a compile error rather than a convention. Cross-thread sources
//! hand off through a queue drained on the engine thread (see
//! [`FileWatcher`](crate::watcher::FileWatcher)).
//!
//! ## Handles
//!
//! [`EventChannel`] is a cheap `Clone` handle; clones share listeners. When the
//! last clone is dropped every listener is dropped without being invoked.
//! A listener that captures a strong clone of its own channel keeps the
//! channel alive forever; capture `Engine::downgrade()` or a handle you own
//! elsewhere instead.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<A> = Box<dyn FnMut(&A)>;

struct Listener<A> {
    callback: RefCell<Callback<A>>,
    bound: Cell<bool>,
    once: bool,
}

struct ChannelState<A> {
    /// Listeners eligible for the current fire.
    live: RefCell<Vec<Rc<Listener<A>>>>,
    /// Listeners connected mid-fire, merged at the next settle point.
    pending: RefCell<Vec<Rc<Listener<A>>>>,
    /// Nesting depth of in-progress fires.
    depth: Cell<u32>,
}

impl<A> ChannelState<A> {
    fn firing(&self) -> bool {
        self.depth.get() > 0
    }

    fn settle(&self) {
        if self.firing() {
            return;
        }
        let mut live = self.live.borrow_mut();
        live.append(&mut self.pending.borrow_mut());
        live.retain(|l| l.bound.get());
    }
}

/// Type-erased view used by [`ListenerHandle`] so handles are not generic.
trait Binding {
    fn unbind(&self);
    fn is_bound(&self) -> bool;
}

impl<A> Binding for Listener<A> {
    fn unbind(&self) {
        self.bound.set(false);
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }
}

trait Settle {
    fn settle(&self);
}

impl<A> Settle for ChannelState<A> {
    fn settle(&self) {
        ChannelState::settle(self);
    }
}

/// Returned by [`EventChannel::connect`] / [`EventChannel::once`].
///
/// Dropping the handle does **not** disconnect the listener; call
/// [`disconnect`](Self::disconnect).
pub struct ListenerHandle {
    listener: Weak<dyn Binding>,
    channel: Weak<dyn Settle>,
}

impl ListenerHandle {
    /// Unbind the listener. Takes effect immediately for any fire in
    /// progress; storage is reclaimed at the next settle point.
    pub fn disconnect(&self) {
        if let Some(listener) = self.listener.upgrade() {
            listener.unbind();
        }
        if let Some(channel) = self.channel.upgrade() {
            channel.settle();
        }
    }

    /// `true` while the listener is still bound and its channel is alive.
    pub fn is_connected(&self) -> bool {
        self.channel.strong_count() > 0
            && self.listener.upgrade().is_some_and(|l| l.is_bound())
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// A multicast event carrying arguments of type `A` (use a tuple for several).
pub struct EventChannel<A> {
    state: Rc<ChannelState<A>>,
}

impl<A: 'static> EventChannel<A> {
    pub fn new() -> Self {
        Self {
            state: Rc::new(ChannelState {
                live: RefCell::new(Vec::new()),
                pending: RefCell::new(Vec::new()),
                depth: Cell::new(0),
            }),
        }
    }

    /// Register a persistent listener.
    pub fn connect(&self, callback: impl FnMut(&A) + 'static) -> ListenerHandle {
        self.push(Box::new(callback), false)
    }

    /// Register a listener that unbinds itself after its first invocation.
    pub fn once(&self, callback: impl FnMut(&A) + 'static) -> ListenerHandle {
        self.push(Box::new(callback), true)
    }

    /// Equivalent to [`ListenerHandle::disconnect`].
    pub fn disconnect(&self, handle: &ListenerHandle) {
        handle.disconnect();
    }

    fn push(&self, callback: Callback<A>, once: bool) -> ListenerHandle {
        let listener = Rc::new(Listener {
            callback: RefCell::new(callback),
            bound: Cell::new(true),
            once,
        });
        if self.state.firing() {
            self.state.pending.borrow_mut().push(Rc::clone(&listener));
        } else {
            self.state.live.borrow_mut().push(Rc::clone(&listener));
        }
        let listener: Weak<dyn Binding> = Rc::downgrade(&listener) as Weak<Listener<A>>;
        let channel: Weak<dyn Settle> = Rc::downgrade(&self.state) as Weak<ChannelState<A>>;
        ListenerHandle { listener, channel }
    }

    /// Invoke every bound listener, in connection order, on this thread.
    pub fn fire(&self, args: A) {
        let _guard = FireGuard::enter(&self.state);

        let mut index = 0;
        loop {
            // Short borrow per step: listeners may connect/disconnect freely.
            let Some(listener) = self.state.live.borrow().get(index).cloned() else {
                break;
            };
            index += 1;

            if !listener.bound.get() {
                continue;
            }
            if listener.once {
                listener.bound.set(false);
            }
            match listener.callback.try_borrow_mut() {
                Ok(mut callback) => callback(&args),
                Err(_) => log::debug!("skipping listener already running in an outer fire"),
            }
        }
    }

    /// `true` if at least one bound listener is live. Listeners connected
    /// during an in-progress fire are not counted until it settles.
    pub fn has_any_listeners(&self) -> bool {
        self.state.live.borrow().iter().any(|l| l.bound.get())
    }

    /// Number of bound live listeners.
    pub fn listener_count(&self) -> usize {
        self.state.live.borrow().iter().filter(|l| l.bound.get()).count()
    }

    /// Drop every listener without invoking it.
    pub fn clear(&self) {
        for listener in self.state.live.borrow().iter() {
            listener.bound.set(false);
        }
        for listener in self.state.pending.borrow().iter() {
            listener.bound.set(false);
        }
        if !self.state.firing() {
            self.state.live.borrow_mut().clear();
            self.state.pending.borrow_mut().clear();
        }
    }
}

impl<A: 'static> Default for EventChannel<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for EventChannel<A> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<A> fmt::Debug for EventChannel<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("live", &self.state.live.borrow().len())
            .field("pending", &self.state.pending.borrow().len())
            .field("depth", &self.state.depth.get())
            .finish()
    }
}

/// Keeps `depth` balanced even if a listener panics.
struct FireGuard<'a, A> {
    state: &'a ChannelState<A>,
}

impl<'a, A> FireGuard<'a, A> {
    fn enter(state: &'a ChannelState<A>) -> Self {
        state.depth.set(state.depth.get() + 1);
        Self { state }
    }
}

impl<A> Drop for FireGuard<'_, A> {
    fn drop(&mut self) {
        self.state.depth.set(self.state.depth.get() - 1);
        self.state.settle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnMut(&())>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let log = Rc::clone(&log);
            move |tag: &'static str| {
                let log = Rc::clone(&log);
                Box::new(move |_: &()| log.borrow_mut().push(tag)) as Box<dyn FnMut(&())>
            }
        };
        (log, make)
    }

    #[test]
    fn fires_in_connection_order() {
        let channel = EventChannel::<()>::new();
        let (log, make) = recorder();
        channel.connect(make("first"));
        channel.connect(make("second"));
        channel.connect(make("third"));

        channel.fire(());
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn passes_arguments() {
        let channel = EventChannel::<(u32, String)>::new();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        channel.connect(move |(n, s): &(u32, String)| {
            *sink.borrow_mut() = Some(format!("{s}{n}"));
        });
        channel.fire((7, "x".to_string()));
        assert_eq!(seen.borrow().as_deref(), Some("x7"));
    }

    #[test]
    fn once_runs_a_single_time() {
        let channel = EventChannel::<()>::new();
        let (log, make) = recorder();
        channel.once(make("once"));
        channel.connect(make("always"));

        channel.fire(());
        channel.fire(());
        assert_eq!(*log.borrow(), vec!["once", "always", "always"]);
        assert_eq!(channel.listener_count(), 1);
    }

    #[test]
    fn disconnect_outside_fire_removes_immediately() {
        let channel = EventChannel::<()>::new();
        let (log, make) = recorder();
        let handle = channel.connect(make("a"));
        assert!(handle.is_connected());

        channel.disconnect(&handle);
        assert!(!handle.is_connected());
        assert!(!channel.has_any_listeners());
        channel.fire(());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn connect_during_fire_waits_for_next_fire() {
        let channel = EventChannel::<()>::new();
        let (log, make) = recorder();

        let inner = channel.clone();
        let late = RefCell::new(Some(make("late")));
        channel.connect(move |_| {
            if let Some(cb) = late.borrow_mut().take() {
                inner.connect(cb);
                // Queued, not yet live.
                assert_eq!(inner.listener_count(), 1);
            }
        });

        channel.fire(());
        assert!(log.borrow().is_empty());

        channel.fire(());
        assert_eq!(*log.borrow(), vec!["late"]);
    }

    #[test]
    fn disconnect_of_sibling_during_fire_is_safe() {
        let channel = EventChannel::<()>::new();
        let (log, make) = recorder();

        let victim: Rc<RefCell<Option<ListenerHandle>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&victim);
        channel.connect(move |_| {
            if let Some(handle) = slot.borrow().as_ref() {
                handle.disconnect();
            }
        });
        *victim.borrow_mut() = Some(channel.connect(make("victim")));
        channel.connect(make("bystander"));

        channel.fire(());
        // The disconnected sibling is skipped; nobody else is.
        assert_eq!(*log.borrow(), vec!["bystander"]);
        assert_eq!(channel.listener_count(), 2);
    }

    #[test]
    fn self_disconnect_during_fire() {
        let channel = EventChannel::<()>::new();
        let count = Rc::new(Cell::new(0));
        let me: Rc<RefCell<Option<ListenerHandle>>> = Rc::new(RefCell::new(None));

        let (c, slot) = (Rc::clone(&count), Rc::clone(&me));
        let handle = channel.connect(move |_| {
            c.set(c.get() + 1);
            if let Some(h) = slot.borrow().as_ref() {
                h.disconnect();
            }
        });
        *me.borrow_mut() = Some(handle);

        channel.fire(());
        channel.fire(());
        assert_eq!(count.get(), 1);
        assert!(!channel.has_any_listeners());
    }

    #[test]
    fn nested_fire_does_not_reenter_running_listener() {
        let channel = EventChannel::<u32>::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let inner = channel.clone();
        let c = Rc::clone(&calls);
        channel.connect(move |depth: &u32| {
            c.borrow_mut().push(("outer", *depth));
            if *depth == 0 {
                inner.fire(1);
            }
        });
        let c = Rc::clone(&calls);
        channel.connect(move |depth: &u32| c.borrow_mut().push(("second", *depth)));

        channel.fire(0);
        assert_eq!(
            *calls.borrow(),
            vec![("outer", 0), ("second", 1), ("second", 0)]
        );
    }

    #[test]
    fn has_any_listeners_ignores_pending() {
        let channel = EventChannel::<()>::new();
        let inner = channel.clone();
        let observed = Rc::new(Cell::new(true));
        let o = Rc::clone(&observed);
        let handle = channel.connect(move |_| {
            inner.connect(|_| {});
            o.set(inner.listener_count() == 1);
        });
        channel.fire(());
        assert!(observed.get());
        assert_eq!(channel.listener_count(), 2);
        handle.disconnect();
        assert_eq!(channel.listener_count(), 1);
    }

    #[test]
    fn clear_drops_without_invoking() {
        let channel = EventChannel::<()>::new();
        let (log, make) = recorder();
        let handle = channel.connect(make("a"));
        channel.clear();
        channel.fire(());
        assert!(log.borrow().is_empty());
        assert!(!handle.is_connected());
    }

    #[test]
    fn clear_during_fire_skips_remaining() {
        let channel = EventChannel::<()>::new();
        let (log, make) = recorder();
        let inner = channel.clone();
        channel.connect(move |_| inner.clear());
        channel.connect(make("after-clear"));

        channel.fire(());
        assert!(log.borrow().is_empty());
        assert!(!channel.has_any_listeners());
    }

    #[test]
    fn dropping_last_clone_drops_listeners() {
        let dropped = Rc::new(Cell::new(false));
        struct Flag(Rc<Cell<bool>>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let channel = EventChannel::<()>::new();
        let flag = Flag(Rc::clone(&dropped));
        let handle = channel.connect(move |_| {
            let _ = &flag;
        });
        drop(channel);
        assert!(dropped.get());
        assert!(!handle.is_connected());
    }
}
