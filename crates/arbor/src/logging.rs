//! # Logging — `log` Capture and the LogSystem Subsystem
//!
//! The crate logs through the `log` facade everywhere. [`init_logger`]
//! installs a logger that prints through `env_logger` (so `RUST_LOG` works as
//! usual) and also keeps the most recent records in a bounded ring:
//!
//! ```text
//! log::warn!(..) ─► CaptureLogger ─┬─► env_logger (stderr)
//!                                  └─► ring (500 entries, Mutex)
//!                                            │ drained once per frame
//!                                            ▼
//!                         LogSystem::update ─► message_logged.fire(msg)
//! ```
//!
//! The ring is the only state shared across threads; everything downstream
//! of the drain runs on the engine thread.

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use log::Log;

use crate::engine::Engine;
use crate::event::EventChannel;
use crate::reflect::Class;
use crate::system::System;

const RING_CAPACITY: usize = 500;

/// One log line as seen by `message_logged` listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub level: log::Level,
    pub target: String,
    pub message: String,
    /// Seconds since [`init_logger`] ran (0 for messages written directly
    /// to the [`LogSystem`]).
    pub timestamp_secs: f64,
}

// ── Capture ──────────────────────────────────────────────────────────────

struct LogRing {
    entries: VecDeque<LogMessage>,
}

impl LogRing {
    fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(RING_CAPACITY),
        }
    }

    fn push(&mut self, entry: LogMessage) {
        if self.entries.len() >= RING_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn drain(&mut self, max: usize) -> Vec<LogMessage> {
        let n = self.entries.len().min(max);
        self.entries.drain(..n).collect()
    }
}

static RING: Mutex<Option<LogRing>> = Mutex::new(None);
static START: OnceLock<Instant> = OnceLock::new();
static LOGGER: OnceLock<CaptureLogger> = OnceLock::new();

struct CaptureLogger {
    inner: env_logger::Logger,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata) || metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }

        let entry = LogMessage {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            timestamp_secs: START.get().map_or(0.0, |s| s.elapsed().as_secs_f64()),
        };
        if let Ok(mut guard) = RING.lock() {
            if let Some(ring) = guard.as_mut() {
                ring.push(entry);
            }
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the capturing logger. Call once, early, before anything logs.
///
/// If another logger is already installed, capture stays off and a warning
/// is written through that logger.
pub fn init_logger() {
    START.get_or_init(Instant::now);
    if let Ok(mut ring) = RING.lock() {
        ring.get_or_insert_with(LogRing::new);
    }

    let inner = env_logger::Builder::new().parse_default_env().build();
    let max_level = inner.filter();
    let logger = LOGGER.get_or_init(|| CaptureLogger { inner });

    if log::set_logger(logger).is_err() {
        log::warn!("a logger is already installed; log capture disabled");
        if let Ok(mut ring) = RING.lock() {
            *ring = None;
        }
        return;
    }
    log::set_max_level(max_level.max(log::LevelFilter::Info));
}

/// Take up to `max` captured records, oldest first.
pub fn drain_captured(max: usize) -> Vec<LogMessage> {
    match RING.lock() {
        Ok(mut guard) => guard.as_mut().map(|ring| ring.drain(max)).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

// ── LogSystem ────────────────────────────────────────────────────────────

/// Subsystem that republishes log lines on the engine thread.
///
/// Lines come from two places: records captured by [`init_logger`] (when
/// `EngineConfig::log_capture` is set) and direct [`write`](Self::write)
/// calls. Both are delivered through [`message_logged`](Self::message_logged)
/// during `update`, in that order.
///
/// `message_logged` fires while the engine holds this system borrowed, so
/// listeners must not borrow the `LogSystem` again.
pub struct LogSystem {
    pub message_logged: EventChannel<LogMessage>,
    pending: Vec<LogMessage>,
    level: log::Level,
    capture: bool,
}

impl Class for LogSystem {
    const CLASS_NAME: &'static str = "LogSystem";
}

impl LogSystem {
    pub fn new() -> Self {
        Self {
            message_logged: EventChannel::new(),
            pending: Vec::new(),
            level: log::Level::Info,
            capture: false,
        }
    }

    /// Queue a line for the next frame. Lines less severe than
    /// [`log_level`](Self::log_level) are discarded.
    pub fn write(&mut self, message: impl Into<String>, level: log::Level) {
        if level > self.level {
            return;
        }
        self.pending.push(LogMessage {
            level,
            target: Self::CLASS_NAME.to_string(),
            message: message.into(),
            timestamp_secs: 0.0,
        });
    }

    pub fn set_log_level(&mut self, level: log::Level) {
        self.level = level;
    }

    pub fn log_level(&self) -> log::Level {
        self.level
    }

    /// Drop queued lines without delivering them.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn deliver(&mut self, captured: Vec<LogMessage>) {
        let written = std::mem::take(&mut self.pending);
        for message in captured.into_iter().chain(written) {
            self.message_logged.fire(message);
        }
    }
}

impl Default for LogSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for LogSystem {
    fn initialize(&mut self, engine: &Engine) {
        self.capture = engine.config().log_capture;
    }

    fn update(&mut self, _engine: &Engine, _delta: f64) {
        let captured = if self.capture {
            drain_captured(RING_CAPACITY)
        } else {
            Vec::new()
        };
        self.deliver(captured);
    }

    fn shutdown(&mut self, _engine: &Engine) {
        self.message_logged.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn message(text: &str) -> LogMessage {
        LogMessage {
            level: log::Level::Info,
            target: "test".into(),
            message: text.into(),
            timestamp_secs: 0.0,
        }
    }

    #[test]
    fn ring_keeps_most_recent_entries() {
        let mut ring = LogRing::new();
        for i in 0..RING_CAPACITY + 3 {
            ring.push(message(&i.to_string()));
        }
        assert_eq!(ring.entries.len(), RING_CAPACITY);
        let first = ring.drain(2);
        assert_eq!(first[0].message, "3");
        assert_eq!(first[1].message, "4");
        assert_eq!(ring.entries.len(), RING_CAPACITY - 2);
    }

    #[test]
    fn write_is_delivered_on_next_update_and_filtered_by_level() {
        let mut system = LogSystem::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        system
            .message_logged
            .connect(move |m: &LogMessage| sink.borrow_mut().push((m.level, m.message.clone())));

        system.set_log_level(log::Level::Warn);
        system.write("kept", log::Level::Error);
        system.write("dropped", log::Level::Info);
        assert!(seen.borrow().is_empty());

        system.deliver(vec![message("captured")]);
        assert_eq!(
            *seen.borrow(),
            vec![
                (log::Level::Info, "captured".to_string()),
                (log::Level::Error, "kept".to_string()),
            ]
        );

        system.deliver(Vec::new());
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn clear_discards_pending() {
        let mut system = LogSystem::new();
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        system.message_logged.connect(move |_| *counter.borrow_mut() += 1);
        system.write("gone", log::Level::Error);
        system.clear();
        system.deliver(Vec::new());
        assert_eq!(*count.borrow(), 0);
    }
}
