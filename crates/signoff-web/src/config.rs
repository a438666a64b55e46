use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default listen port
pub const DEFAULT_PORT: u16 = 1994;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// SQLite database holding the signature ledger
    pub db_path: String,
    pub port: u16,
    /// When set, notifications are POSTed here instead of only logged
    #[serde(default)]
    pub webhook_url: Option<Url>,
    pub notify_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: "signoff.db".to_string(),
            port: DEFAULT_PORT,
            webhook_url: None,
            notify_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let port = match std::env::var("SIGNOFF_PORT") {
            Ok(v) => v.parse().with_context(|| format!("invalid SIGNOFF_PORT {v:?}"))?,
            Err(_) => defaults.port,
        };

        let webhook_url = std::env::var("SIGNOFF_WEBHOOK_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| Url::parse(&v).with_context(|| format!("invalid SIGNOFF_WEBHOOK_URL {v:?}")))
            .transpose()?;

        let notify_timeout_secs = match std::env::var("SIGNOFF_NOTIFY_TIMEOUT_SECS") {
            Ok(v) => v
                .parse()
                .with_context(|| format!("invalid SIGNOFF_NOTIFY_TIMEOUT_SECS {v:?}"))?,
            Err(_) => defaults.notify_timeout_secs,
        };

        Ok(Self {
            db_path: std::env::var("SIGNOFF_DB").unwrap_or(defaults.db_path),
            port,
            webhook_url,
            notify_timeout_secs,
        })
    }
}
