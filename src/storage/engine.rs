//! Key-value store contract
//!
//! The catalog only needs maps, sets and scored sorted sets. Every primitive
//! it issues is a [`Command`]; every answer is a [`Reply`]. Backends implement
//! [`KvStore`] (connection factory) and [`KvConnection`] (ordered pipeline
//! execution).

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Score bound for range queries over sorted sets
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    NegInf,
    PosInf,
    Inclusive(f64),
    Exclusive(f64),
}

impl Bound {
    /// Whether `score` lies on the allowed side of this bound used as a minimum
    pub fn admits_min(&self, score: f64) -> bool {
        match *self {
            Bound::NegInf => true,
            Bound::PosInf => false,
            Bound::Inclusive(b) => score >= b,
            Bound::Exclusive(b) => score > b,
        }
    }

    /// Whether `score` lies on the allowed side of this bound used as a maximum
    pub fn admits_max(&self, score: f64) -> bool {
        match *self {
            Bound::NegInf => false,
            Bound::PosInf => true,
            Bound::Inclusive(b) => score <= b,
            Bound::Exclusive(b) => score < b,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-inf"),
            Bound::PosInf => write!(f, "+inf"),
            Bound::Inclusive(b) => write!(f, "{}", b),
            Bound::Exclusive(b) => write!(f, "({}", b),
        }
    }
}

/// A single store primitive
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Write field/value pairs into a map. Replies with the number of new fields.
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Read fields from a map. Replies with an array aligned with `fields`,
    /// `Nil` for every missing field (all `Nil` when the map is absent).
    HMGet { key: String, fields: Vec<String> },
    /// Remove keys. Replies with the number of keys that existed.
    Del { keys: Vec<String> },
    /// Replies 1 if the key exists, 0 otherwise.
    Exists { key: String },
    /// Replies with the number of members actually added.
    SAdd { key: String, members: Vec<String> },
    /// Replies with the number of members actually removed.
    SRem { key: String, members: Vec<String> },
    /// Replies with all members of a set, unordered.
    SMembers { key: String },
    /// Upsert scored members. With `changed` the reply counts updated
    /// members as well as added ones.
    ZAdd {
        key: String,
        entries: Vec<(f64, String)>,
        changed: bool,
    },
    /// Replies with the number of members removed.
    ZRem { key: String, members: Vec<String> },
    /// Increment a member score, creating it at 0 first. Replies with the new score.
    ZIncrBy {
        key: String,
        delta: f64,
        member: String,
    },
    /// Members with scores inside `[min, max]`, ordered by score then member.
    ZRangeByScore {
        key: String,
        min: Bound,
        max: Bound,
        with_scores: bool,
    },
    /// One page of a cursor scan over a sorted set.
    /// Replies `[cursor, [member, score, ...]]`.
    ZScan {
        key: String,
        cursor: u64,
        pattern: Option<String>,
        count: usize,
    },
    /// One page of a cursor scan over the keyspace. Replies `[cursor, [key, ...]]`.
    Scan {
        cursor: u64,
        pattern: Option<String>,
        count: usize,
    },
}

impl Command {
    /// Store command name, as issued on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::HSet { .. } => "HSET",
            Command::HMGet { .. } => "HMGET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SMembers { .. } => "SMEMBERS",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
            Command::ZIncrBy { .. } => "ZINCRBY",
            Command::ZRangeByScore { .. } => "ZRANGEBYSCORE",
            Command::ZScan { .. } => "ZSCAN",
            Command::Scan { .. } => "SCAN",
        }
    }

    /// Key addressed by the command, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::HSet { key, .. }
            | Command::HMGet { key, .. }
            | Command::Exists { key }
            | Command::SAdd { key, .. }
            | Command::SRem { key, .. }
            | Command::SMembers { key }
            | Command::ZAdd { key, .. }
            | Command::ZRem { key, .. }
            | Command::ZIncrBy { key, .. }
            | Command::ZRangeByScore { key, .. }
            | Command::ZScan { key, .. } => Some(key),
            Command::Del { keys } => keys.first().map(String::as_str),
            Command::Scan { .. } => None,
        }
    }
}

/// A store reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Int(i64),
    Data(String),
    Status(String),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn into_int(self) -> Result<i64> {
        match self {
            Reply::Int(n) => Ok(n),
            Reply::Data(s) => s
                .parse()
                .map_err(|_| Error::Store(format!("expected integer reply, got {:?}", s))),
            other => Err(Error::Store(format!("expected integer reply, got {:?}", other))),
        }
    }

    pub fn into_float(self) -> Result<f64> {
        match self {
            Reply::Int(n) => Ok(n as f64),
            Reply::Data(s) => parse_score(&s),
            other => Err(Error::Store(format!("expected score reply, got {:?}", other))),
        }
    }

    /// String payload; `Nil` maps to `None`
    pub fn into_opt_string(self) -> Result<Option<String>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Data(s) | Reply::Status(s) => Ok(Some(s)),
            Reply::Int(n) => Ok(Some(n.to_string())),
            other => Err(Error::Store(format!("expected string reply, got {:?}", other))),
        }
    }

    pub fn into_array(self) -> Result<Vec<Reply>> {
        match self {
            Reply::Array(items) => Ok(items),
            Reply::Nil => Ok(Vec::new()),
            other => Err(Error::Store(format!("expected array reply, got {:?}", other))),
        }
    }

    /// Array of non-nil strings
    pub fn into_strings(self) -> Result<Vec<String>> {
        self.into_array()?
            .into_iter()
            .map(|r| {
                r.into_opt_string()?
                    .ok_or_else(|| Error::Store("unexpected nil in array reply".to_string()))
            })
            .collect()
    }

    /// Flat `[member, score, member, score, ...]` array into pairs
    pub fn into_scored(self) -> Result<Vec<(String, f64)>> {
        let items = self.into_strings()?;
        if items.len() % 2 != 0 {
            return Err(Error::Store("odd-length scored reply".to_string()));
        }
        items
            .chunks(2)
            .map(|pair| Ok((pair[0].clone(), parse_score(&pair[1])?)))
            .collect()
    }

    /// `[cursor, [items...]]` scan page
    pub fn into_scan_page(self) -> Result<(u64, Vec<Reply>)> {
        let mut parts = self.into_array()?;
        if parts.len() != 2 {
            return Err(Error::Store(format!("malformed scan reply of {} parts", parts.len())));
        }
        let items = parts.pop().map(Reply::into_array).transpose()?.unwrap_or_default();
        let cursor = parts
            .pop()
            .map(Reply::into_int)
            .transpose()?
            .unwrap_or(0);
        Ok((cursor as u64, items))
    }
}

fn parse_score(s: &str) -> Result<f64> {
    match s {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => s
            .parse()
            .map_err(|_| Error::Store(format!("invalid score {:?}", s))),
    }
}

/// Ordered batch of commands sent in one round trip
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

impl From<Vec<Command>> for Pipeline {
    fn from(commands: Vec<Command>) -> Self {
        Self { commands }
    }
}

/// A single connection to the store. Not shared between tasks.
#[async_trait]
pub trait KvConnection: Send {
    /// Execute a pipeline. Replies come back in request order, one per command;
    /// any failure fails the whole call.
    async fn execute(&mut self, pipeline: Pipeline) -> Result<Vec<Reply>>;

    /// Execute a single command
    async fn query(&mut self, command: Command) -> Result<Reply> {
        let mut replies = self.execute(Pipeline::from(vec![command])).await?;
        replies
            .pop()
            .ok_or_else(|| Error::Store("empty reply to single command".to_string()))
    }

    /// Every key matching `pattern`, walking SCAN pages of `count` until the
    /// cursor comes back to zero
    async fn scan_keys(&mut self, pattern: &str, count: usize) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            let (next, items) = self
                .query(Command::Scan {
                    cursor,
                    pattern: Some(pattern.to_string()),
                    count,
                })
                .await?
                .into_scan_page()?;
            keys.extend(Reply::Array(items).into_strings()?);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

/// Connection factory for a store backend
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    async fn connect(&self) -> Result<Box<dyn KvConnection>>;
}

/// Pooled access to a store backend
///
/// Every task borrows its own connection through [`Storage::acquire`]; the
/// permit goes back to the pool when the guard drops, whatever the outcome.
pub struct Storage {
    engine: Arc<dyn KvStore>,
    permits: Arc<Semaphore>,
    pool_size: usize,
    acquire_timeout: Duration,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.engine.name())
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl Storage {
    pub fn new(engine: Arc<dyn KvStore>, pool_size: usize, acquire_timeout: Duration) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            engine,
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            acquire_timeout,
        }
    }

    /// Storage with a default pool of 16 and a 5 second acquisition timeout
    pub fn with_defaults(engine: Arc<dyn KvStore>) -> Self {
        Self::new(engine, 16, Duration::from_secs(5))
    }

    pub fn backend(&self) -> &'static str {
        self.engine.name()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Connections currently available without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Borrow a connection for the duration of the returned guard
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                warn!(
                    backend = self.engine.name(),
                    pool_size = self.pool_size,
                    "Timed out waiting for a store connection"
                );
                Error::Pool(format!(
                    "no connection available within {} ms",
                    self.acquire_timeout.as_millis()
                ))
            })?
            .map_err(|_| Error::Internal("connection pool closed".to_string()))?;

        let conn = self.engine.connect().await?;
        debug!(backend = self.engine.name(), available = self.available(), "Acquired store connection");
        Ok(PooledConnection {
            conn,
            _permit: permit,
        })
    }
}

/// Connection guard returned by [`Storage::acquire`]
pub struct PooledConnection {
    conn: Box<dyn KvConnection>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl KvConnection for PooledConnection {
    async fn execute(&mut self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        let started = std::time::Instant::now();
        let commands = pipeline.len();
        let result = self.conn.execute(pipeline).await;
        crate::metrics::observe_pipeline(commands, started.elapsed().as_secs_f64(), result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_bound_rendering_and_admission() {
        assert_eq!(Bound::NegInf.to_string(), "-inf");
        assert_eq!(Bound::Exclusive(5.0).to_string(), "(5");
        assert!(Bound::Inclusive(5.0).admits_min(5.0));
        assert!(!Bound::Exclusive(5.0).admits_min(5.0));
        assert!(Bound::PosInf.admits_max(f64::MAX));
        assert!(!Bound::NegInf.admits_max(0.0));
    }

    #[test]
    fn test_reply_accessors() -> Result<()> {
        assert_eq!(Reply::Data("42".into()).into_int()?, 42);
        assert_eq!(Reply::Nil.into_opt_string()?, None);
        let scored = Reply::Array(vec![
            Reply::Data("a".into()),
            Reply::Data("1.5".into()),
            Reply::Data("b".into()),
            Reply::Data("-inf".into()),
        ])
        .into_scored()?;
        assert_eq!(scored[0], ("a".to_string(), 1.5));
        assert_eq!(scored[1].1, f64::NEG_INFINITY);
        assert!(Reply::Int(1).into_array().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_pool_releases_permit_on_drop() -> Result<()> {
        let storage = Storage::new(Arc::new(MemoryStore::new()), 2, Duration::from_millis(50));
        assert_eq!(storage.available(), 2);
        {
            let _a = storage.acquire().await?;
            let _b = storage.acquire().await?;
            assert_eq!(storage.available(), 0);
            assert!(matches!(storage.acquire().await, Err(Error::Pool(_))));
        }
        assert_eq!(storage.available(), 2);
        Ok(())
    }
}
