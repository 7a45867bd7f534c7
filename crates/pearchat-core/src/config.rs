//! Service configuration
//!
//! All durations are milliseconds so a TOML file reads the same as the
//! defaults below:
//!
//! ```toml
//! display_name = "alice"
//! heartbeat_interval_ms = 500
//! liveness_timeout_ms = 3000
//! delivery_mode = "cursor"
//! ```
//!
//! Missing keys fall back to their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};
use crate::storage::{DEFAULT_MESSAGES_KEY, DEFAULT_PEERS_KEY};

/// Default name shown as the author of sent messages
pub const DEFAULT_DISPLAY_NAME: &str = "P2P User";

/// How the message poller decides which stored messages to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Every poll surfaces messages by others younger than the freshness
    /// window. A message can arrive several times or, if polling stalls
    /// longer than the window, never.
    #[default]
    FreshnessWindow,
    /// Each room keeps a delivered offset into its log. Every message by
    /// others appended after joining is surfaced once, whatever its age.
    Cursor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Name attached to sent messages
    pub display_name: String,
    /// Period of the heartbeat publisher
    pub heartbeat_interval_ms: u64,
    /// Period of the liveness scanner (and the garbage collector)
    pub scan_interval_ms: u64,
    /// Period of the message poller
    pub poll_interval_ms: u64,
    /// A peer is live while `now - lastSeen` is below this
    pub liveness_timeout_ms: u64,
    /// A message is fresh while `now - timestamp` is below this
    pub message_freshness_ms: u64,
    /// The local record is collected once older than this
    pub own_record_expiry_ms: u64,
    /// Other records are collected once older than this
    pub peer_record_expiry_ms: u64,
    /// Messages older than this are evicted at startup
    pub message_retention_ms: u64,
    pub delivery_mode: DeliveryMode,
    /// Also scan/poll whenever the shared store reports a change
    pub react_to_store_changes: bool,
    /// Store key of the peers table
    pub peers_key: String,
    /// Store key of the room -> messages map
    pub messages_key: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            heartbeat_interval_ms: 500,
            scan_interval_ms: 500,
            poll_interval_ms: 500,
            liveness_timeout_ms: 3_000,
            message_freshness_ms: 2_000,
            own_record_expiry_ms: 30_000,
            peer_record_expiry_ms: 4_000,
            message_retention_ms: 60 * 60 * 1000,
            delivery_mode: DeliveryMode::FreshnessWindow,
            react_to_store_changes: true,
            peers_key: DEFAULT_PEERS_KEY.to_string(),
            messages_key: DEFAULT_MESSAGES_KEY.to_string(),
        }
    }
}

impl ChatConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> ChatResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ChatError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ChatResult<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> ChatResult<String> {
        toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    pub fn with_store_reactions(mut self, enabled: bool) -> Self {
        self.react_to_store_changes = enabled;
        self
    }

    pub fn validate(&self) -> ChatResult<()> {
        let intervals = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("scan_interval_ms", self.scan_interval_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ChatError::Config(format!("{} must be positive", name)));
            }
        }
        if self.liveness_timeout_ms <= self.heartbeat_interval_ms {
            return Err(ChatError::Config(format!(
                "liveness_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.liveness_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        if self.peers_key.is_empty() || self.messages_key.is_empty() {
            return Err(ChatError::Config("store keys must not be empty".into()));
        }
        if self.peers_key == self.messages_key {
            return Err(ChatError::Config(
                "peers_key and messages_key must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn liveness_timeout(&self) -> i64 {
        as_millis(self.liveness_timeout_ms)
    }

    pub(crate) fn message_freshness(&self) -> i64 {
        as_millis(self.message_freshness_ms)
    }

    pub(crate) fn own_record_expiry(&self) -> i64 {
        as_millis(self.own_record_expiry_ms)
    }

    pub(crate) fn peer_record_expiry(&self) -> i64 {
        as_millis(self.peer_record_expiry_ms)
    }

    pub(crate) fn message_retention(&self) -> i64 {
        as_millis(self.message_retention_ms)
    }
}

fn as_millis(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(500));
        assert_eq!(config.liveness_timeout(), 3000);
        assert_eq!(config.message_freshness(), 2000);
        assert_eq!(config.own_record_expiry(), 30_000);
        assert_eq!(config.peer_record_expiry(), 4000);
        assert_eq!(config.message_retention(), 3_600_000);
        assert_eq!(config.display_name, "P2P User");
        assert_eq!(config.delivery_mode, DeliveryMode::FreshnessWindow);
        assert!(config.react_to_store_changes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ChatConfig::from_toml_str(
            r#"
            display_name = "alice"
            delivery_mode = "cursor"
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.display_name, "alice");
        assert_eq!(config.delivery_mode, DeliveryMode::Cursor);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.scan_interval_ms, 500);
        assert_eq!(config.peers_key, DEFAULT_PEERS_KEY);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ChatConfig::from_toml_str("heartbeat_interval_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = ChatConfig {
            scan_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_timeout_below_heartbeat() {
        let config = ChatConfig {
            liveness_timeout_ms: 500,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_keys() {
        let config = ChatConfig {
            messages_key: DEFAULT_PEERS_KEY.to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pearchat.toml");
        let config = ChatConfig::default()
            .with_display_name("bob")
            .with_delivery_mode(DeliveryMode::Cursor);
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(ChatConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ChatConfig::load("/nonexistent/pearchat.toml").unwrap_err();
        assert!(matches!(err, ChatError::Io(_)));
    }
}
