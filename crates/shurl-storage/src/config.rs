use crate::memory::MemoryLinkStore;
use crate::persistent::RedbLinkStore;
use serde::Deserialize;
use shurl_core::{Context, LinkStore, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use typed_builder::TypedBuilder;

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

fn default_open_timeout() -> Duration {
    DEFAULT_OPEN_TIMEOUT
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Settings of the redb-backed engine.
#[derive(Debug, Clone, TypedBuilder, Deserialize)]
pub struct PersistentConfig {
    /// Database file, created on first open.
    #[builder(setter(into))]
    pub path: PathBuf,
    /// How long to keep retrying while another handle holds the database lock.
    #[builder(default = DEFAULT_OPEN_TIMEOUT)]
    #[serde(default = "default_open_timeout")]
    pub open_timeout: Duration,
}

/// Settings of the in-memory engine.
#[derive(Debug, Clone, TypedBuilder, Deserialize)]
pub struct MemoryConfig {
    /// Where the snapshot is loaded from and saved to. `None` disables
    /// persistence.
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Capacity of the request channel in front of the worker.
    #[builder(default = DEFAULT_CHANNEL_CAPACITY)]
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Engine selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum StoreConfig {
    Persistent(PersistentConfig),
    Memory(MemoryConfig),
}

/// Opens the engine selected by `config`.
pub async fn open_store(ctx: &Context, config: StoreConfig) -> Result<Box<dyn LinkStore>> {
    match config {
        StoreConfig::Persistent(config) => {
            info!(path = %config.path.display(), "opening persistent link store");
            let store = RedbLinkStore::open(ctx, config).await?;
            Ok(Box::new(store))
        }
        StoreConfig::Memory(config) => {
            info!(
                snapshot = ?config.snapshot_path,
                "opening in-memory link store"
            );
            let store = MemoryLinkStore::open(ctx, config).await?;
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fill_defaults() {
        let persistent = PersistentConfig::builder().path("links.redb").build();
        assert_eq!(persistent.open_timeout, DEFAULT_OPEN_TIMEOUT);

        let memory = MemoryConfig::builder().build();
        assert!(memory.snapshot_path.is_none());
        assert_eq!(memory.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn deserializes_engine_selection() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"engine":"memory","snapshot_path":"links.json"}"#).unwrap();
        match config {
            StoreConfig::Memory(memory) => {
                assert_eq!(memory.snapshot_path, Some(PathBuf::from("links.json")));
                assert_eq!(memory.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
            }
            other => panic!("unexpected config: {other:?}"),
        }

        let config: StoreConfig =
            serde_json::from_str(r#"{"engine":"persistent","path":"links.redb"}"#).unwrap();
        assert!(matches!(config, StoreConfig::Persistent(_)));
    }

    #[tokio::test]
    async fn open_store_selects_memory_engine() {
        let ctx = Context::new();
        let store = open_store(&ctx, StoreConfig::Memory(MemoryConfig::builder().build()))
            .await
            .unwrap();

        let created = store.create(&ctx, "https://example.com", None).await.unwrap();
        assert_eq!(created.id, 1);
        store.close(&ctx).await.unwrap();
    }
}
