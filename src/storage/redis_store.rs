//! Redis backend
//!
//! Each [`Command`] maps onto the Redis command of the same name and a
//! [`Pipeline`] onto a Redis pipeline over a multiplexed connection.

use crate::error::{Error, Result};
use crate::storage::engine::{Command, KvConnection, KvStore, Pipeline, Reply};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::debug;

/// Store backed by a Redis server
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Create a store for `url`, e.g. `redis://127.0.0.1:6379/0`
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn connect(&self) -> Result<Box<dyn KvConnection>> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(Box::new(RedisConnection { conn }))
    }
}

/// A connection to a Redis server
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

#[async_trait]
impl KvConnection for RedisConnection {
    async fn execute(&mut self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        if pipeline.is_empty() {
            return Ok(Vec::new());
        }
        let count = pipeline.len();
        let mut pipe = redis::pipe();
        for command in pipeline.into_commands() {
            pipe.add_command(to_redis(command));
        }
        let values: Vec<redis::Value> = pipe.query_async(&mut self.conn).await?;
        if values.len() != count {
            return Err(Error::Store(format!(
                "pipeline of {} commands produced {} replies",
                count,
                values.len()
            )));
        }
        debug!(commands = count, "Executed Redis pipeline");
        values.into_iter().map(from_redis).collect()
    }
}

fn to_redis(command: Command) -> redis::Cmd {
    match command {
        Command::HSet { key, fields } => {
            let mut cmd = redis::cmd("HSET");
            cmd.arg(key);
            for (field, value) in fields {
                cmd.arg(field).arg(value);
            }
            cmd
        }
        Command::HMGet { key, fields } => {
            let mut cmd = redis::cmd("HMGET");
            cmd.arg(key).arg(fields);
            cmd
        }
        Command::Del { keys } => {
            let mut cmd = redis::cmd("DEL");
            cmd.arg(keys);
            cmd
        }
        Command::Exists { key } => {
            let mut cmd = redis::cmd("EXISTS");
            cmd.arg(key);
            cmd
        }
        Command::SAdd { key, members } => {
            let mut cmd = redis::cmd("SADD");
            cmd.arg(key).arg(members);
            cmd
        }
        Command::SRem { key, members } => {
            let mut cmd = redis::cmd("SREM");
            cmd.arg(key).arg(members);
            cmd
        }
        Command::SMembers { key } => {
            let mut cmd = redis::cmd("SMEMBERS");
            cmd.arg(key);
            cmd
        }
        Command::ZAdd {
            key,
            entries,
            changed,
        } => {
            let mut cmd = redis::cmd("ZADD");
            cmd.arg(key);
            if changed {
                cmd.arg("CH");
            }
            for (score, member) in entries {
                cmd.arg(score).arg(member);
            }
            cmd
        }
        Command::ZRem { key, members } => {
            let mut cmd = redis::cmd("ZREM");
            cmd.arg(key).arg(members);
            cmd
        }
        Command::ZIncrBy { key, delta, member } => {
            let mut cmd = redis::cmd("ZINCRBY");
            cmd.arg(key).arg(delta).arg(member);
            cmd
        }
        Command::ZRangeByScore {
            key,
            min,
            max,
            with_scores,
        } => {
            let mut cmd = redis::cmd("ZRANGEBYSCORE");
            cmd.arg(key).arg(min.to_string()).arg(max.to_string());
            if with_scores {
                cmd.arg("WITHSCORES");
            }
            cmd
        }
        Command::ZScan {
            key,
            cursor,
            pattern,
            count,
        } => {
            let mut cmd = redis::cmd("ZSCAN");
            cmd.arg(key).arg(cursor);
            if let Some(pattern) = pattern {
                cmd.arg("MATCH").arg(pattern);
            }
            cmd.arg("COUNT").arg(count);
            cmd
        }
        Command::Scan {
            cursor,
            pattern,
            count,
        } => {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor);
            if let Some(pattern) = pattern {
                cmd.arg("MATCH").arg(pattern);
            }
            cmd.arg("COUNT").arg(count);
            cmd
        }
    }
}

fn from_redis(value: redis::Value) -> Result<Reply> {
    Ok(match value {
        redis::Value::Nil => Reply::Nil,
        redis::Value::Int(n) => Reply::Int(n),
        redis::Value::BulkString(bytes) => Reply::Data(
            String::from_utf8(bytes).map_err(|e| Error::Store(format!("non UTF-8 reply: {}", e)))?,
        ),
        redis::Value::SimpleString(s) => Reply::Status(s),
        redis::Value::Okay => Reply::Status("OK".to_string()),
        redis::Value::Double(d) => Reply::Data(d.to_string()),
        redis::Value::Boolean(b) => Reply::Int(b as i64),
        redis::Value::Array(items) | redis::Value::Set(items) => {
            Reply::Array(items.into_iter().map(from_redis).collect::<Result<_>>()?)
        }
        redis::Value::Map(pairs) => {
            let mut flat = Vec::with_capacity(pairs.len() * 2);
            for (k, v) in pairs {
                flat.push(from_redis(k)?);
                flat.push(from_redis(v)?);
            }
            Reply::Array(flat)
        }
        redis::Value::ServerError(e) => return Err(Error::Store(format!("{:?}", e))),
        other => return Err(Error::Store(format!("unsupported reply {:?}", other))),
    })
}
