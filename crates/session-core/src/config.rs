//! Session manager configuration.
//!
//! All knobs come from the environment so deployments can tune retry and
//! eviction behavior without a rebuild. Missing or unparseable variables
//! fall back to the defaults below.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Total reconnect attempts allowed per disruption streak (minimum 1).
    pub max_retries: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Inactivity window after which an idle session is evicted.
    pub idle_timeout: Duration,
    /// Directory holding persisted credential blobs.
    pub sessions_dir: PathBuf,
    /// Webhook endpoint for inbound message notifications, if any.
    pub webhook_url: Option<String>,
    /// Shared secret echoed in every webhook payload.
    pub webhook_secret: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            reconnect_interval: Duration::ZERO,
            idle_timeout: Duration::from_secs(120),
            sessions_dir: PathBuf::from("sessions"),
            webhook_url: None,
            webhook_secret: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables:
    /// - `MAX_RETRIES`: reconnect attempts per disruption streak (clamped to >= 1)
    /// - `RECONNECT_INTERVAL`: delay between attempts, in milliseconds
    /// - `IDLE_TIMEOUT`: idle eviction window, in seconds
    /// - `SESSIONS_DIR`: credential storage directory
    /// - `WEBHOOK_URL` / `WEBHOOK_SECRET`: inbound message forwarding
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_parse::<u32>("MAX_RETRIES") {
            config.max_retries = n;
        }
        // A zero budget would drop every session on its first disconnect.
        config.max_retries = config.max_retries.max(1);

        if let Some(ms) = env_parse::<u64>("RECONNECT_INTERVAL") {
            config.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("IDLE_TIMEOUT") {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Ok(dir) = std::env::var("SESSIONS_DIR") {
            if !dir.is_empty() {
                config.sessions_dir = PathBuf::from(dir);
            }
        }
        config.webhook_url = std::env::var("WEBHOOK_URL").ok().filter(|v| !v.is_empty());
        config.webhook_secret = std::env::var("WEBHOOK_SECRET").ok();

        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
