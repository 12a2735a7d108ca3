//! Engine configuration.
//!
//! Everything has a default, so `EngineConfig::default()` is a working
//! setup. Fields can be set with the `with_*` builders or loaded from JSON:
//!
//! ```ignore
//! let config = EngineConfig::from_json_str(r#"{
//!     "content_dir": "Content",
//!     "watch_dirs": ["Content/Scripts"],
//!     "order_policy": "Permissive"
//! }"#)?;
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Result;
use crate::system::OrderPolicy;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where game content lives.
    pub content_dir: PathBuf,
    /// Where derived/cached assets are written.
    pub asset_cache_dir: PathBuf,
    /// Directories the file watcher starts watching when the engine is built.
    pub watch_dirs: Vec<PathBuf>,
    /// How subsystem ordering cycles are handled.
    pub order_policy: OrderPolicy,
    /// Forward records captured by [`init_logger`](crate::logging::init_logger)
    /// to `LogSystem::message_logged` each frame.
    pub log_capture: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("Content"),
            asset_cache_dir: PathBuf::from("AssetCache"),
            watch_dirs: Vec::new(),
            order_policy: OrderPolicy::Strict,
            log_capture: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_content_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.content_dir = dir.into();
        self
    }

    pub fn with_asset_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_cache_dir = dir.into();
        self
    }

    pub fn with_watch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.watch_dirs.push(dir.into());
        self
    }

    pub fn with_order_policy(mut self, policy: OrderPolicy) -> Self {
        self.order_policy = policy;
        self
    }

    pub fn with_log_capture(mut self, enabled: bool) -> Self {
        self.log_capture = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = EngineConfig::from_json_str(
            r#"{ "content_dir": "Game", "order_policy": "Permissive", "watch_dirs": ["Game/Scripts"] }"#,
        )
        .unwrap();
        assert_eq!(config.content_dir, PathBuf::from("Game"));
        assert_eq!(config.asset_cache_dir, PathBuf::from("AssetCache"));
        assert_eq!(config.order_policy, OrderPolicy::Permissive);
        assert_eq!(config.watch_dirs, vec![PathBuf::from("Game/Scripts")]);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ content_dir"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn builders_chain() {
        let config = EngineConfig::new()
            .with_content_dir("C")
            .with_watch_dir("C/a")
            .with_watch_dir("C/b")
            .with_log_capture(false);
        assert_eq!(config.watch_dirs.len(), 2);
        assert!(!config.log_capture);
    }
}
