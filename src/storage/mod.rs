//! Storage layer
//!
//! # Architecture
//!
//! The catalog runs on a key-value store that only offers maps, sets and
//! scored sorted sets:
//!
//! ```text
//! Storage (bounded pool)
//!   └─→ KvStore (backend: memory | redis)
//!        └─→ KvConnection (ordered pipelines of Commands → Replies)
//! ```
//!
//! ## Key layout
//!
//! - `{ns}:{id}`: record map
//! - `{ns}:{id}:{ns2}`: link set of record `id` into namespace `ns2`
//! - `sync:{ns}`: change feed
//! - `idx:{ns}:{lang}:{tokens|facet|runes}`: search structures

pub mod engine;
pub mod glob;
pub mod key;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use engine::{Bound, Command, KvConnection, KvStore, Pipeline, PooledConnection, Reply, Storage};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use crate::config::{Backend, StoreConfig};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Open the configured backend behind a connection pool
///
/// The memory backend is returned alongside so callers can snapshot it.
pub fn open(config: &StoreConfig) -> Result<(Arc<Storage>, Option<MemoryStore>)> {
    let timeout = Duration::from_millis(config.acquire_timeout_ms);
    match config.backend {
        Backend::Memory => {
            let memory = match &config.snapshot {
                Some(path) => MemoryStore::from_snapshot(path)?,
                None => MemoryStore::new(),
            };
            info!(
                pool_size = config.pool_size,
                snapshot = ?config.snapshot,
                "Opened memory store"
            );
            let storage = Storage::new(Arc::new(memory.clone()), config.pool_size, timeout);
            Ok((Arc::new(storage), Some(memory)))
        }
        Backend::Redis => open_redis(config, timeout),
    }
}

#[cfg(feature = "redis")]
fn open_redis(config: &StoreConfig, timeout: Duration) -> Result<(Arc<Storage>, Option<MemoryStore>)> {
    let store = RedisStore::open(&config.url)?;
    info!(url = %config.url, pool_size = config.pool_size, "Opened Redis store");
    Ok((Arc::new(Storage::new(Arc::new(store), config.pool_size, timeout)), None))
}

#[cfg(not(feature = "redis"))]
fn open_redis(_config: &StoreConfig, _timeout: Duration) -> Result<(Arc<Storage>, Option<MemoryStore>)> {
    Err(crate::error::Error::Config(
        "store.backend = \"redis\" requires building with the `redis` feature".to_string(),
    ))
}
