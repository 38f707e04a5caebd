//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

/// Default gateway URL (the local WhatsApp bot).
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:3000";

/// Default auto-reply text.
pub const DEFAULT_AUTO_REPLY_MESSAGE: &str = "Obrigado pelo feedback!";

/// Roster column names the bridge relies on.
#[derive(Debug, Clone)]
pub struct RosterColumns {
    /// Identifier column (the "SA" number).
    pub id: String,
    /// Phone number column.
    pub phone: String,
    /// Display name column used to personalize auto-replies.
    pub name: String,
}

impl Default for RosterColumns {
    fn default() -> Self {
        Self {
            id: "SA".to_string(),
            phone: "Telefone".to_string(),
            name: "Nome".to_string(),
        }
    }
}

/// What happens to an inbound file once it has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxDisposition {
    /// Move to `processed/` (or `failed/` when malformed).
    Archive,
    /// Remove the file.
    Delete,
}

impl InboxDisposition {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "archive" => Some(Self::Archive),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Inbox poller configuration.
#[derive(Debug, Clone)]
pub struct InboxConfig {
    /// Directory the gateway drops `received_*.json` files into.
    pub dir: PathBuf,
    pub poll_interval: Duration,
    pub disposition: InboxDisposition,
}

/// Mutable settings callers may change while the bridge runs.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub auto_reply_enabled: bool,
    pub auto_reply_message: String,
    /// Delay between consecutive bulk messages.
    pub bulk_delay: Duration,
    /// Pause before an auto-reply goes out.
    pub reply_pause: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            auto_reply_enabled: true,
            auto_reply_message: DEFAULT_AUTO_REPLY_MESSAGE.to_string(),
            bulk_delay: Duration::from_secs(90),
            reply_pause: Duration::from_secs(1),
        }
    }
}

/// Retention policy for finished task results.
#[derive(Debug, Clone, Copy)]
pub struct ResultRetention {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for ResultRetention {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
            capacity: 100,
        }
    }
}

/// Full bridge configuration, usually built with [`BridgeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub roster_path: PathBuf,
    /// Partition to activate at startup (first available when unset).
    pub roster_partition: Option<String>,
    pub columns: RosterColumns,
    pub storage_dir: PathBuf,
    pub inbox: InboxConfig,
    pub gateway_url: String,
    pub gateway_timeout: Duration,
    pub settings: RuntimeSettings,
    pub retention: ResultRetention,
    pub api_port: u16,
    pub log_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            roster_path: PathBuf::from("./data/roster.json"),
            roster_partition: None,
            columns: RosterColumns::default(),
            storage_dir: PathBuf::from("./storage"),
            inbox: InboxConfig {
                dir: PathBuf::from("./messages"),
                poll_interval: Duration::from_secs(5),
                disposition: InboxDisposition::Archive,
            },
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            gateway_timeout: Duration::from_secs(30),
            settings: RuntimeSettings::default(),
            retention: ResultRetention::default(),
            api_port: 5000,
            log_dir: PathBuf::from("./logs"),
        }
    }
}

impl BridgeConfig {
    /// Build configuration from `BRIDGE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let columns = RosterColumns {
            id: env_string("BRIDGE_ID_COLUMN").unwrap_or(defaults.columns.id),
            phone: env_string("BRIDGE_PHONE_COLUMN").unwrap_or(defaults.columns.phone),
            name: env_string("BRIDGE_NAME_COLUMN").unwrap_or(defaults.columns.name),
        };

        let disposition = match env_string("BRIDGE_INBOX_DISPOSITION") {
            Some(raw) => InboxDisposition::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Unknown BRIDGE_INBOX_DISPOSITION, using archive");
                InboxDisposition::Archive
            }),
            None => defaults.inbox.disposition,
        };

        let mut gateway_url = env_string("BRIDGE_GATEWAY_URL").unwrap_or(defaults.gateway_url);
        if let Some(port_file) = env_string("BRIDGE_GATEWAY_PORT_FILE") {
            if let Some(port) = detect_gateway_port(Path::new(&port_file)) {
                gateway_url = format!("http://localhost:{port}");
            }
        }

        let settings = RuntimeSettings {
            auto_reply_enabled: env_parse("BRIDGE_AUTO_REPLY_ENABLED")
                .unwrap_or(defaults.settings.auto_reply_enabled),
            auto_reply_message: env_string("BRIDGE_AUTO_REPLY_MESSAGE")
                .unwrap_or(defaults.settings.auto_reply_message),
            bulk_delay: env_parse("BRIDGE_BULK_DELAY_SECS")
                .map(|secs: u64| Duration::from_secs(secs.max(1)))
                .unwrap_or(defaults.settings.bulk_delay),
            reply_pause: env_parse("BRIDGE_REPLY_PAUSE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.settings.reply_pause),
        };

        Self {
            roster_path: env_path("BRIDGE_ROSTER_PATH").unwrap_or(defaults.roster_path),
            roster_partition: env_string("BRIDGE_ROSTER_PARTITION"),
            columns,
            storage_dir: env_path("BRIDGE_STORAGE_DIR").unwrap_or(defaults.storage_dir),
            inbox: InboxConfig {
                dir: env_path("BRIDGE_INBOX_DIR").unwrap_or(defaults.inbox.dir),
                poll_interval: env_parse("BRIDGE_POLL_INTERVAL_SECS")
                    .map(|secs: u64| Duration::from_secs(secs.max(1)))
                    .unwrap_or(defaults.inbox.poll_interval),
                disposition,
            },
            gateway_url,
            gateway_timeout: env_parse("BRIDGE_GATEWAY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.gateway_timeout),
            settings,
            retention: ResultRetention {
                ttl: env_parse("BRIDGE_RESULT_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.retention.ttl),
                capacity: env_parse("BRIDGE_RESULT_CAPACITY")
                    .unwrap_or(defaults.retention.capacity),
            },
            api_port: env_parse("BRIDGE_API_PORT").unwrap_or(defaults.api_port),
            log_dir: env_path("BRIDGE_LOG_DIR").unwrap_or(defaults.log_dir),
        }
    }
}

/// Read the port the WhatsApp bot's browser session is listening on.
///
/// The bot writes a `DevToolsActivePort` file whose first line is the port.
pub fn detect_gateway_port(path: &Path) -> Option<u16> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Gateway port file not readable");
            return None;
        }
    };
    let first = contents.lines().next()?.trim();
    if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
        warn!(path = %path.display(), line = first, "Gateway port file has no port");
        return None;
    }
    first.parse().ok()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_string(key).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}
