//! # File Watcher — Directory Change Notifications
//!
//! Lets engine code react to files appearing, changing, or disappearing
//! under a directory (script hot-reload, content reimport).
//!
//! ```text
//! notify thread ──► mpsc::Sender ──► rx ──poll() once per frame──┐
//!                                                                 │ match dir prefix
//!                                                                 ▼
//!                        DirectorySubscription { file_changed, file_created, file_deleted }
//! ```
//!
//! The OS watcher is only started on the first [`subscribe`](FileWatcher::subscribe).
//! If it can't be started (inotify limits, unsupported platform) the engine
//! keeps running, subscriptions are still handed out, and they just never
//! fire. Failures are logged, not returned.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::event::EventChannel;

type RawEvent = notify::Result<notify::Event>;

/// Channels for one watched directory. Clones share listeners.
#[derive(Clone, Debug)]
pub struct DirectorySubscription {
    directory: PathBuf,
    pub file_changed: EventChannel<PathBuf>,
    pub file_created: EventChannel<PathBuf>,
    pub file_deleted: EventChannel<PathBuf>,
}

impl DirectorySubscription {
    fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            file_changed: EventChannel::new(),
            file_created: EventChannel::new(),
            file_deleted: EventChannel::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Changed,
    Created,
    Deleted,
}

fn classify(kind: &EventKind) -> Option<Change> {
    match kind {
        EventKind::Create(_) => Some(Change::Created),
        EventKind::Remove(_) => Some(Change::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Change::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Change::Created),
        EventKind::Modify(_) => Some(Change::Changed),
        _ => None,
    }
}

/// A notification that is ready to fire once the caller has released any
/// borrows it holds.
pub(crate) struct Dispatch {
    channel: EventChannel<PathBuf>,
    path: PathBuf,
}

impl Dispatch {
    pub fn fire(self) {
        self.channel.fire(self.path);
    }
}

pub struct FileWatcher {
    /// `None` until the first subscription, or if starting it failed.
    watcher: Option<RecommendedWatcher>,
    start_failed: bool,
    tx: mpsc::Sender<RawEvent>,
    rx: mpsc::Receiver<RawEvent>,
    subscriptions: Vec<DirectorySubscription>,
}

impl FileWatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            watcher: None,
            start_failed: false,
            tx,
            rx,
            subscriptions: Vec::new(),
        }
    }

    /// `true` once an OS watcher is running.
    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Watch `directory` recursively. Subscribing to the same directory twice
    /// returns the existing subscription.
    pub fn subscribe(&mut self, directory: impl AsRef<Path>) -> DirectorySubscription {
        let directory = directory.as_ref();
        let directory = directory
            .canonicalize()
            .unwrap_or_else(|_| directory.to_path_buf());

        if let Some(existing) = self.subscriptions.iter().find(|s| s.directory == directory) {
            return existing.clone();
        }

        if let Some(watcher) = self.os_watcher() {
            if let Err(e) = watcher.watch(&directory, RecursiveMode::Recursive) {
                log::warn!("failed to watch '{}': {e}", directory.display());
            }
        }

        let subscription = DirectorySubscription::new(directory);
        self.subscriptions.push(subscription.clone());
        subscription
    }

    /// Stop delivering events for `subscription`'s directory. Its listeners
    /// are left connected but will not fire again.
    pub fn unsubscribe(&mut self, subscription: &DirectorySubscription) {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.directory != subscription.directory);
        if self.subscriptions.len() == before {
            return;
        }
        if let Some(watcher) = &mut self.watcher {
            if let Err(e) = watcher.unwatch(&subscription.directory) {
                log::debug!("unwatch '{}': {e}", subscription.directory.display());
            }
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn os_watcher(&mut self) -> Option<&mut RecommendedWatcher> {
        if self.watcher.is_none() && !self.start_failed {
            let tx = self.tx.clone();
            match notify::recommended_watcher(move |res| {
                let _ = tx.send(res);
            }) {
                Ok(w) => self.watcher = Some(w),
                Err(e) => {
                    log::warn!(
                        "failed to create file watcher: {e}. Directory subscriptions will not fire."
                    );
                    self.start_failed = true;
                }
            }
        }
        self.watcher.as_mut()
    }

    /// Drain everything the OS watcher queued since the last call and pair
    /// each path with the channel it should fire on.
    pub(crate) fn poll(&mut self) -> Vec<Dispatch> {
        let mut out = Vec::new();
        while let Ok(res) = self.rx.try_recv() {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("file watcher error: {e}");
                    continue;
                }
            };
            let Some(change) = classify(&event.kind) else {
                continue;
            };
            for path in &event.paths {
                let matching = self
                    .subscriptions
                    .iter()
                    .filter(|s| path.starts_with(&s.directory));
                for sub in matching {
                    let channel = match change {
                        Change::Changed => &sub.file_changed,
                        Change::Created => &sub.file_created,
                        Change::Deleted => &sub.file_deleted,
                    };
                    out.push(Dispatch {
                        channel: channel.clone(),
                        path: path.clone(),
                    });
                }
            }
        }
        out
    }

    #[cfg(test)]
    fn inject(&self, event: notify::Event) {
        let _ = self.tx.send(Ok(event));
    }
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use notify::event::{CreateKind, DataChange, RemoveKind};

    use super::*;

    fn recorder(channel: &EventChannel<PathBuf>) -> Rc<RefCell<Vec<PathBuf>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        channel.connect(move |p: &PathBuf| sink.borrow_mut().push(p.clone()));
        seen
    }

    fn fire_all(watcher: &mut FileWatcher) {
        for dispatch in watcher.poll() {
            dispatch.fire();
        }
    }

    #[test]
    fn events_route_by_kind_and_directory() {
        let mut watcher = FileWatcher::new();
        let scripts = watcher.subscribe("/no/such/project/Scripts");
        let created = recorder(&scripts.file_created);
        let changed = recorder(&scripts.file_changed);
        let deleted = recorder(&scripts.file_deleted);

        let inside = PathBuf::from("/no/such/project/Scripts/main.lua");
        let outside = PathBuf::from("/no/such/project/Textures/a.png");
        watcher.inject(
            notify::Event::new(EventKind::Create(CreateKind::File)).add_path(inside.clone()),
        );
        watcher.inject(
            notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
                .add_path(inside.clone()),
        );
        watcher.inject(notify::Event::new(EventKind::Remove(RemoveKind::File)).add_path(outside));
        watcher.inject(
            notify::Event::new(EventKind::Remove(RemoveKind::File)).add_path(inside.clone()),
        );

        assert!(created.borrow().is_empty());
        fire_all(&mut watcher);

        assert_eq!(*created.borrow(), vec![inside.clone()]);
        assert_eq!(*changed.borrow(), vec![inside.clone()]);
        assert_eq!(*deleted.borrow(), vec![inside]);
    }

    #[test]
    fn renames_map_to_delete_then_create() {
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(Change::Deleted)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(Change::Created)
        );
        assert_eq!(classify(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }

    #[test]
    fn duplicate_subscribe_shares_channels() {
        let mut watcher = FileWatcher::new();
        let a = watcher.subscribe("/no/such/dir");
        let b = watcher.subscribe("/no/such/dir");
        assert_eq!(watcher.subscription_count(), 1);
        let seen = recorder(&a.file_created);
        b.file_created.fire(PathBuf::from("/no/such/dir/x"));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn unsubscribed_directory_stops_receiving() {
        let mut watcher = FileWatcher::new();
        let sub = watcher.subscribe("/no/such/dir");
        let seen = recorder(&sub.file_created);
        watcher.unsubscribe(&sub);
        assert_eq!(watcher.subscription_count(), 0);

        watcher.inject(
            notify::Event::new(EventKind::Create(CreateKind::File)).add_path("/no/such/dir/x".into()),
        );
        fire_all(&mut watcher);
        assert!(seen.borrow().is_empty());
    }
}
