pub mod feedback;
pub mod policy;
pub mod status;
pub mod tickets;

use std::sync::Arc;

use anyhow::Context as _;
use hd_core::clock::{Clock, SystemClock};
use hd_core::config::Config;
use hd_core::store::{SqliteTicketStore, TicketStore};

/// Store and clock shared by every subcommand.
pub struct Context {
    pub store: Arc<dyn TicketStore>,
    pub clock: Arc<dyn Clock>,
}

impl Context {
    /// Open the configured database, creating it (and its directory) if needed.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let path = config.store.resolved_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let store = SqliteTicketStore::new(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?
            .with_claim_attempts(config.store.claim_attempts);
        let store: Arc<dyn TicketStore> = Arc::new(store);
        store.seed_settings(&config.agent.settings()).await?;
        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
        })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        Self {
            store: Arc::new(SqliteTicketStore::new_in_memory().await.unwrap()),
            clock: Arc::new(SystemClock),
        }
    }
}
