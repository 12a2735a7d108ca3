//! # Engine — Tree Root and Subsystem Host
//!
//! [`Engine`] owns everything: the frozen class registry, the instance arena,
//! the subsystems, the clock, and the file watcher. It is a cheap `Rc`
//! handle; clone it into places that need it and [`downgrade`](Engine::downgrade)
//! it inside listeners.
//!
//! ```text
//! Engine (Rc<EngineInner>)
//!   registry: Rc<ClassRegistry>      read-only after startup
//!   tree:     RefCell<Tree>          borrowed only inside one method call
//!   systems:  RefCell<Systems>       by name + resolved order
//!   watcher:  RefCell<FileWatcher>   drained at the top of update()
//!   time:     Box<dyn TimeProvider>
//! ```
//!
//! ## Reentrancy
//!
//! No `RefCell` borrow is ever held while user code runs. Tree mutations
//! collect their notifications first and fire them after the borrow ends,
//! and subsystem hooks are called on a cloned list. A listener can therefore
//! call straight back into the engine: reparent, rename, destroy, look up a
//! system.
//!
//! ## Frame
//!
//! ```text
//! tick()
//!   delta = time.now_secs() - last_frame
//!   update(delta)
//!     watcher.poll() → fire directory subscriptions
//!     for system in resolved order: system.update(engine, delta)
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::{Rc, Weak};

use uuid::Uuid;

use crate::classes::{ENGINE, INSTANCE, SYSTEM};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::instance::tree::{Tree, notify_property};
use crate::instance::{Instance, InstanceEvents};
use crate::reflect::{Class, ClassId, ClassRegistry, PropertyId, Value};
use crate::system::{Registration, System, SystemInitOrder};
use crate::time::{StdTimeProvider, TimeProvider};
use crate::watcher::{DirectorySubscription, FileWatcher};

/// State attached to an instance whose class is a subsystem.
struct AttachedSystem {
    system: Rc<RefCell<dyn System>>,
    /// Same allocation as `system`, kept for typed downcasts.
    any: Rc<dyn Any>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Initializing,
    Running,
    ShutDown,
}

/// Per-system timing recorded during the last `update`.
#[cfg(feature = "diagnostics")]
#[derive(Debug, Clone)]
pub struct SystemTiming {
    pub name: String,
    pub duration_us: f64,
}

struct Systems {
    attached: HashMap<Instance, AttachedSystem>,
    by_name: HashMap<String, Instance>,
    /// Resolved order: `(class name, instance)`.
    ordered: Vec<(String, Instance)>,
    lifecycle: Lifecycle,
    #[cfg(feature = "diagnostics")]
    timings: Vec<SystemTiming>,
}

impl Systems {
    fn new() -> Self {
        Self {
            attached: HashMap::new(),
            by_name: HashMap::new(),
            ordered: Vec::new(),
            lifecycle: Lifecycle::Created,
            #[cfg(feature = "diagnostics")]
            timings: Vec::new(),
        }
    }

    fn ordered_handles(&self) -> Vec<(String, Rc<RefCell<dyn System>>)> {
        self.ordered
            .iter()
            .filter_map(|(name, instance)| {
                self.attached
                    .get(instance)
                    .map(|a| (name.clone(), Rc::clone(&a.system)))
            })
            .collect()
    }
}

struct EngineInner {
    registry: Rc<ClassRegistry>,
    config: EngineConfig,
    time: Box<dyn TimeProvider>,
    start_time: f64,
    last_frame: Cell<f64>,
    root: Instance,
    tree: RefCell<Tree>,
    systems: RefCell<Systems>,
    watcher: RefCell<FileWatcher>,
}

/// The engine root. See the [module docs](self).
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

/// A non-owning engine handle for capturing in listeners.
#[derive(Clone)]
pub struct WeakEngine {
    inner: Weak<EngineInner>,
}

impl WeakEngine {
    pub fn upgrade(&self) -> Option<Engine> {
        self.inner.upgrade().map(|inner| Engine { inner })
    }
}

impl Engine {
    /// Build an engine on the system clock. `registry` must contain the core
    /// classes (see [`register_core_classes`](crate::classes::register_core_classes)).
    pub fn new(registry: Rc<ClassRegistry>, config: EngineConfig) -> Result<Self> {
        Self::with_time_provider(registry, config, StdTimeProvider::new())
    }

    pub fn with_time_provider(
        registry: Rc<ClassRegistry>,
        config: EngineConfig,
        time: impl TimeProvider + 'static,
    ) -> Result<Self> {
        let root_class = registry
            .lookup(ENGINE)
            .ok_or_else(|| Error::ClassNotFound(ENGINE.to_string()))?
            .id;

        let mut tree = Tree::default();
        let root = tree.insert(root_class, ENGINE.to_string());

        let mut watcher = FileWatcher::new();
        for dir in &config.watch_dirs {
            watcher.subscribe(dir);
        }

        let start_time = time.now_secs();
        log::debug!("engine created with {} registered classes", registry.len());

        Ok(Self {
            inner: Rc::new(EngineInner {
                registry,
                config,
                time: Box::new(time),
                start_time,
                last_frame: Cell::new(start_time),
                root,
                tree: RefCell::new(tree),
                systems: RefCell::new(Systems::new()),
                watcher: RefCell::new(watcher),
            }),
        })
    }

    pub fn downgrade(&self) -> WeakEngine {
        WeakEngine {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The root instance (class `Engine`).
    pub fn root(&self) -> Instance {
        self.inner.root
    }

    /// Seconds since the engine was created, per its time provider.
    pub fn time(&self) -> f64 {
        self.inner.time.now_secs() - self.inner.start_time
    }

    // ── Instantiation ────────────────────────────────────────────────

    /// Instantiate a registered class by name through its factory.
    pub fn instantiate(&self, class: &str) -> Result<Instance> {
        self.inner.registry.instantiate(class, self)
    }

    /// Like [`instantiate`](Self::instantiate), but fails with
    /// [`Error::ClassMismatch`] unless `class` is a `T`.
    pub fn instantiate_as<T: Class>(&self, class: &str) -> Result<Instance> {
        self.inner.registry.instantiate_as::<T>(class, self)
    }

    /// Allocate a bare, detached instance of `class`. Factories call this;
    /// application code usually wants [`instantiate`](Self::instantiate).
    pub fn create_instance(&self, class: ClassId) -> Result<Instance> {
        let name = self.inner.registry.require(class)?.name.clone();
        let instance = self.inner.tree.borrow_mut().insert(class, name);
        log::trace!("created {instance:?} ({class})");
        Ok(instance)
    }

    /// Allocate an instance of a subsystem class and attach `system` to it.
    pub fn create_system_instance<S: System>(&self, class: ClassId, system: S) -> Result<Instance> {
        let instance = self.create_instance(class)?;
        let system = Rc::new(RefCell::new(system));
        self.inner.systems.borrow_mut().attached.insert(
            instance,
            AttachedSystem {
                system: Rc::clone(&system) as Rc<RefCell<dyn System>>,
                any: system,
            },
        );
        Ok(instance)
    }

    // ── Tree ─────────────────────────────────────────────────────────

    pub fn contains(&self, instance: Instance) -> bool {
        self.inner.tree.borrow().contains(instance)
    }

    /// Live instances, root included.
    pub fn instance_count(&self) -> usize {
        self.inner.tree.borrow().len()
    }

    /// Move `child` under `parent`, or detach it with `None`.
    ///
    /// Fails with [`Error::WouldCreateCycle`] if `parent` is `child` or one
    /// of its descendants, and with [`Error::RootInstance`] if `child` is the
    /// root. Notifications fire after the move completes.
    pub fn set_parent(&self, child: Instance, parent: Option<Instance>) -> Result<()> {
        if child == self.inner.root && parent.is_some() {
            return Err(Error::RootInstance);
        }
        let plan = self.inner.tree.borrow_mut().reparent(child, parent)?;
        if let Some(plan) = plan {
            plan.fire();
        }
        Ok(())
    }

    pub fn parent(&self, instance: Instance) -> Result<Option<Instance>> {
        Ok(self.inner.tree.borrow().node(instance)?.parent)
    }

    pub fn children(&self, instance: Instance) -> Result<Vec<Instance>> {
        Ok(self.inner.tree.borrow().node(instance)?.children.clone())
    }

    pub fn name(&self, instance: Instance) -> Result<String> {
        Ok(self.inner.tree.borrow().node(instance)?.name.clone())
    }

    pub fn set_name(&self, instance: Instance, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let events = {
            let mut tree = self.inner.tree.borrow_mut();
            let node = tree.node_mut(instance)?;
            if node.name == name {
                return Ok(());
            }
            node.name = name;
            node.events.clone()
        };
        notify_property(&events, instance_property("Name"), "Name");
        Ok(())
    }

    pub fn archivable(&self, instance: Instance) -> Result<bool> {
        Ok(self.inner.tree.borrow().node(instance)?.archivable)
    }

    pub fn set_archivable(&self, instance: Instance, archivable: bool) -> Result<()> {
        let events = {
            let mut tree = self.inner.tree.borrow_mut();
            let node = tree.node_mut(instance)?;
            if node.archivable == archivable {
                return Ok(());
            }
            node.archivable = archivable;
            node.events.clone()
        };
        notify_property(&events, instance_property("Archivable"), "Archivable");
        Ok(())
    }

    pub fn class_id(&self, instance: Instance) -> Result<ClassId> {
        Ok(self.inner.tree.borrow().node(instance)?.class)
    }

    pub fn class_name(&self, instance: Instance) -> Result<String> {
        let class = self.class_id(instance)?;
        Ok(self.inner.registry.require(class)?.name.clone())
    }

    /// `true` if the instance's class is `class` or derives from it.
    pub fn is_a(&self, instance: Instance, class: &str) -> Result<bool> {
        Ok(self.inner.registry.is_a(self.class_id(instance)?, class))
    }

    pub fn uuid(&self, instance: Instance) -> Result<Uuid> {
        Ok(self.inner.tree.borrow().node(instance)?.uuid)
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<Instance> {
        self.inner.tree.borrow().find_by_uuid(uuid)
    }

    /// First direct child named `name`.
    pub fn find_first_child(&self, instance: Instance, name: &str) -> Result<Option<Instance>> {
        self.inner.tree.borrow().find_first_child(instance, name)
    }

    /// First direct child whose class is exactly `class`, or with
    /// `allow_subclasses`, any child that `is_a(class)`.
    pub fn find_first_child_of_class(
        &self,
        instance: Instance,
        class: &str,
        allow_subclasses: bool,
    ) -> Result<Option<Instance>> {
        self.inner.tree.borrow().find_first_child_of_class(
            instance,
            ClassId::of(class),
            allow_subclasses,
            &self.inner.registry,
        )
    }

    pub fn is_descendant_of(&self, instance: Instance, other: Instance) -> Result<bool> {
        self.inner.tree.borrow().is_descendant_of(instance, other)
    }

    pub fn is_ancestor_of(&self, instance: Instance, other: Instance) -> Result<bool> {
        self.inner.tree.borrow().is_descendant_of(other, instance)
    }

    /// Snapshot of everything below `instance`, pre-order.
    pub fn descendants(&self, instance: Instance) -> Result<Vec<Instance>> {
        self.inner.tree.borrow().descendants(instance)
    }

    /// Dot-separated path, e.g. `Engine.World.Part`. Relative to
    /// `relative_to` when that is an ancestor.
    pub fn path(&self, instance: Instance, relative_to: Option<Instance>) -> Result<String> {
        self.inner.tree.borrow().path(instance, relative_to)
    }

    /// The instance's built-in channels. The returned value shares listeners
    /// with the instance.
    pub fn events(&self, instance: Instance) -> Result<InstanceEvents> {
        Ok(self.inner.tree.borrow().node(instance)?.events.clone())
    }

    /// Detach `instance` (firing the usual removal notifications), then free
    /// it and its whole subtree. Listeners on the freed instances are dropped
    /// without being called, and every handle into the subtree goes stale.
    pub fn destroy(&self, instance: Instance) -> Result<()> {
        if instance == self.inner.root {
            return Err(Error::RootInstance);
        }
        self.set_parent(instance, None)?;
        if !self.contains(instance) {
            // A removal listener got there first.
            return Ok(());
        }

        let freed = self.inner.tree.borrow_mut().remove_subtree(instance)?;
        {
            let mut systems = self.inner.systems.borrow_mut();
            for (handle, _) in &freed {
                if systems.attached.remove(handle).is_some() {
                    log::debug!("system instance {handle:?} destroyed");
                    systems.by_name.retain(|_, i| i != handle);
                    systems.ordered.retain(|(_, i)| i != handle);
                }
            }
        }
        for (_, events) in &freed {
            events.clear_all();
        }
        log::trace!("destroyed {instance:?} ({} instances)", freed.len());
        Ok(())
    }

    // ── Reflected properties ─────────────────────────────────────────

    /// Read a reflected property by name through its bound getter.
    pub fn get_property(&self, instance: Instance, property: &str) -> Result<Value> {
        let class = self.class_id(instance)?;
        let descriptor = self
            .inner
            .registry
            .find_property_by_name(class, property)
            .ok_or_else(|| Error::invalid_property(&self.inner.registry.class_name(class), property))?;
        let getter = descriptor
            .getter()
            .ok_or_else(|| Error::MissingAccessor(property.to_string()))?;
        getter(self, instance)
    }

    /// Write a reflected property by name through its bound setter.
    pub fn set_property(&self, instance: Instance, property: &str, value: Value) -> Result<()> {
        let class = self.class_id(instance)?;
        let descriptor = self
            .inner
            .registry
            .find_property_by_name(class, property)
            .ok_or_else(|| Error::invalid_property(&self.inner.registry.class_name(class), property))?;
        if descriptor.is_read_only() {
            return Err(Error::ReadOnlyProperty(property.to_string()));
        }
        if value.value_type() != descriptor.value_type {
            return Err(Error::PropertyTypeMismatch {
                property: property.to_string(),
                expected: descriptor.value_type,
                actual: value.value_type(),
            });
        }
        let setter = descriptor
            .setter()
            .ok_or_else(|| Error::MissingAccessor(property.to_string()))?;
        setter(self, instance, value)
    }

    /// Fire `PropertyChanged(property)` on `instance`, plus `Changed(name)`
    /// if anything listens for it. Custom setters call this.
    pub fn raise_property_changed(&self, instance: Instance, property: PropertyId) -> Result<()> {
        let (class, events) = {
            let tree = self.inner.tree.borrow();
            let node = tree.node(instance)?;
            (node.class, node.events.clone())
        };
        let name = if events.changed.has_any_listeners() {
            Some(self.inner.registry.property_name(class, property)?.to_string())
        } else {
            None
        };
        events.property_changed.fire(property);
        if let Some(name) = name {
            events.changed.fire(name);
        }
        Ok(())
    }

    // ── Systems ──────────────────────────────────────────────────────

    /// Create one instance of every registered `System` class, parent each
    /// under the root, resolve their start order, and initialize them in
    /// that order.
    ///
    /// If the order cannot be resolved (or a factory fails), every system
    /// instance created so far is destroyed and the engine returns to its
    /// uninitialized state, so `initialize` may be called again.
    pub fn initialize(&self) -> Result<()> {
        {
            let mut systems = self.inner.systems.borrow_mut();
            if systems.lifecycle != Lifecycle::Created {
                return Err(Error::AlreadyInitialized);
            }
            systems.lifecycle = Lifecycle::Initializing;
        }

        let mut created = Vec::new();
        let resolved = match self.create_systems(&mut created) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.discard_systems(&created);
                return Err(e);
            }
        };
        log::debug!(
            "system start order: {}",
            resolved.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(", ")
        );

        let handles = {
            let mut systems = self.inner.systems.borrow_mut();
            systems.ordered = resolved;
            systems.ordered_handles()
        };
        for (name, system) in handles {
            log::trace!("initializing `{name}`");
            system.borrow_mut().initialize(self);
        }

        self.inner.systems.borrow_mut().lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Instantiate, parent, and register every system class, then resolve
    /// the start order. Each instance is pushed to `created` as soon as it
    /// exists.
    fn create_systems(&self, created: &mut Vec<Instance>) -> Result<Vec<(String, Instance)>> {
        let registry = Rc::clone(&self.inner.registry);
        let system_class = ClassId::of(SYSTEM);
        let mut order = SystemInitOrder::new();

        for class in registry.classes() {
            if class.id == system_class || !registry.is_a_id(class.id, system_class) {
                continue;
            }
            if !class.is_instantiable() {
                log::debug!("skipping abstract system class `{}`", class.name);
                continue;
            }

            let instance = registry.instantiate(&class.name, self)?;
            created.push(instance);
            let Some(system) = self.attached_system(instance) else {
                log::warn!(
                    "`{}` derives from System but its factory attached no system state; skipping",
                    class.name
                );
                self.destroy(instance)?;
                continue;
            };
            self.set_parent(instance, Some(self.inner.root))?;
            self.inner
                .systems
                .borrow_mut()
                .by_name
                .insert(class.name.clone(), instance);

            system
                .borrow()
                .register(&mut Registration::new(&mut order, instance, &class.name));
            if !order.has_rule_for(&class.name) {
                log::warn!("`{}` registered no start-order rule; adding it unconstrained", class.name);
                order.add(instance, &class.name);
            }
        }

        order.resolve(self.inner.config.order_policy)
    }

    /// Undo a failed `initialize`.
    fn discard_systems(&self, created: &[Instance]) {
        for &instance in created {
            if let Err(e) = self.destroy(instance) {
                log::debug!("discarding {instance:?}: {e}");
            }
        }
        let mut systems = self.inner.systems.borrow_mut();
        systems.by_name.clear();
        systems.ordered.clear();
        systems.lifecycle = Lifecycle::Created;
    }

    /// Run one frame with an explicit delta (seconds).
    pub fn update(&self, delta: f64) {
        let dispatches = self.inner.watcher.borrow_mut().poll();
        for dispatch in dispatches {
            dispatch.fire();
        }

        let handles = {
            let systems = self.inner.systems.borrow();
            if systems.lifecycle != Lifecycle::Running {
                return;
            }
            systems.ordered_handles()
        };

        #[cfg(feature = "diagnostics")]
        let mut timings = Vec::with_capacity(handles.len());

        for (name, system) in handles {
            #[cfg(feature = "diagnostics")]
            let start = std::time::Instant::now();

            match system.try_borrow_mut() {
                Ok(mut system) => system.update(self, delta),
                Err(_) => log::warn!("`{name}` is already borrowed; skipping its update"),
            }

            #[cfg(feature = "diagnostics")]
            timings.push(SystemTiming {
                name,
                duration_us: start.elapsed().as_secs_f64() * 1_000_000.0,
            });
        }

        #[cfg(feature = "diagnostics")]
        {
            self.inner.systems.borrow_mut().timings = timings;
        }
    }

    /// Measure the time since the previous tick and run [`update`](Self::update)
    /// with it. Returns the delta.
    pub fn tick(&self) -> f64 {
        let now = self.inner.time.now_secs();
        let delta = now - self.inner.last_frame.replace(now);
        self.update(delta);
        delta
    }

    /// Shut subsystems down in reverse start order. Systems stay reachable
    /// through [`get_system`](Self::get_system) afterwards but are no longer
    /// updated.
    pub fn shutdown(&self) -> Result<()> {
        let handles = {
            let mut systems = self.inner.systems.borrow_mut();
            if systems.lifecycle != Lifecycle::Running {
                return Err(Error::SystemNotInitialized);
            }
            systems.lifecycle = Lifecycle::ShutDown;
            systems.ordered_handles()
        };
        for (name, system) in handles.into_iter().rev() {
            log::trace!("shutting down `{name}`");
            system.borrow_mut().shutdown(self);
        }
        Ok(())
    }

    /// The instance of subsystem class `name`.
    pub fn get_system(&self, name: &str) -> Result<Instance> {
        let systems = self.inner.systems.borrow();
        match systems.lifecycle {
            Lifecycle::Created | Lifecycle::Initializing => Err(Error::SystemNotInitialized),
            Lifecycle::Running | Lifecycle::ShutDown => systems
                .by_name
                .get(name)
                .copied()
                .ok_or_else(|| Error::SystemNotFound(name.to_string())),
        }
    }

    /// Typed access to a subsystem's state.
    ///
    /// ```ignore
    /// let log = engine.get_system_as::<LogSystem>()?;
    /// log.borrow_mut().write("hello", log::Level::Info);
    /// ```
    pub fn get_system_as<T: System + Class>(&self) -> Result<Rc<RefCell<T>>> {
        let instance = self.get_system(T::CLASS_NAME)?;
        let any = self
            .inner
            .systems
            .borrow()
            .attached
            .get(&instance)
            .map(|a| Rc::clone(&a.any))
            .ok_or_else(|| Error::SystemNotFound(T::CLASS_NAME.to_string()))?;
        any.downcast::<RefCell<T>>()
            .map_err(|_| Error::ClassMismatch {
                class: T::CLASS_NAME.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// Class names of the subsystems in resolved start order.
    pub fn ordered_systems(&self) -> Vec<String> {
        self.inner
            .systems
            .borrow()
            .ordered
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn attached_system(&self, instance: Instance) -> Option<Rc<RefCell<dyn System>>> {
        self.inner
            .systems
            .borrow()
            .attached
            .get(&instance)
            .map(|a| Rc::clone(&a.system))
    }

    // ── File watching ────────────────────────────────────────────────

    /// Subscribe to changes under `directory`. Events fire at the start of
    /// the next [`update`](Self::update).
    pub fn subscribe_directory(&self, directory: impl AsRef<Path>) -> DirectorySubscription {
        self.inner.watcher.borrow_mut().subscribe(directory)
    }

    pub fn unsubscribe_directory(&self, subscription: &DirectorySubscription) {
        self.inner.watcher.borrow_mut().unsubscribe(subscription);
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    /// Per-system update durations from the most recent frame.
    #[cfg(feature = "diagnostics")]
    pub fn system_timings(&self) -> Vec<SystemTiming> {
        self.inner.systems.borrow().timings.clone()
    }

    /// Arena slots ever allocated, live or free.
    #[cfg(feature = "diagnostics")]
    pub fn instance_slot_count(&self) -> usize {
        self.inner.tree.borrow().slot_count()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.inner.root)
            .field("instances", &self.inner.tree.borrow().len())
            .field("systems", &self.inner.systems.borrow().ordered.len())
            .finish()
    }
}

fn instance_property(name: &str) -> PropertyId {
    PropertyId::of(INSTANCE, name)
}
