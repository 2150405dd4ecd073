// Runtime configuration shared by the CLI and the HTTP server.
//
// Every flag can also come from the environment, so a deployment only has to
// set `GYM_DB` / `GYM_DELETE_POLICY`.

use crate::access::GymAccess;
use crate::consistency::DeletePolicy;
use crate::store::{DocumentStore, MemoryStore, SqliteStore};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// SQLite database file (`:memory:` for a throwaway store)
    #[arg(long = "db", env = "GYM_DB", default_value = "gym.db")]
    pub db_path: PathBuf,

    /// What deleting a still-referenced branch does: reject or cascade
    #[arg(long, env = "GYM_DELETE_POLICY", default_value_t = DeletePolicy::Reject)]
    pub delete_policy: DeletePolicy,
}

impl StoreArgs {
    pub fn open_store(&self) -> Result<Arc<dyn DocumentStore>> {
        if self.db_path.as_os_str() == IN_MEMORY {
            tracing::info!("using in-memory store");
            return Ok(Arc::new(MemoryStore::new()));
        }

        let store = SqliteStore::open(&self.db_path)
            .with_context(|| format!("Failed to open database at {:?}", self.db_path))?;
        tracing::info!(path = ?self.db_path, "database opened");
        Ok(Arc::new(store))
    }

    pub fn open_access(&self) -> Result<GymAccess> {
        Ok(GymAccess::new(self.open_store()?).with_delete_policy(self.delete_policy))
    }
}

/// Install the `tracing` subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
