use std::sync::Arc;
use std::time::Duration;

use signoff_core::{Engine, LogNotifier, Notifier, Storage, WebhookNotifier};

use crate::config::ServerConfig;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub storage: Arc<Storage>,
    pub config: ServerConfig,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let storage = Storage::open(&config.db_path).await?;
        Self::with_storage(Arc::new(storage), config)
    }

    /// Backed by a throwaway in-memory database
    #[cfg(test)]
    pub async fn in_memory(config: ServerConfig) -> anyhow::Result<Self> {
        let storage = Storage::open_memory().await?;
        Self::with_storage(Arc::new(storage), config)
    }

    fn with_storage(storage: Arc<Storage>, config: ServerConfig) -> anyhow::Result<Self> {
        let notifier: Arc<dyn Notifier> = match &config.webhook_url {
            Some(url) => {
                tracing::info!(%url, "delivering notifications by webhook");
                Arc::new(WebhookNotifier::new(
                    url.clone(),
                    Duration::from_secs(config.notify_timeout_secs),
                )?)
            }
            None => Arc::new(LogNotifier),
        };

        let engine = Engine::new(storage.clone()).with_notifier(notifier);
        Ok(Self {
            engine: Arc::new(engine),
            storage,
            config,
        })
    }
}
