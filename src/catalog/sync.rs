//! Change feed
//!
//! One sorted set per namespace (`sync:{ns}`), member = record id, score =
//! signed Unix time of the last mutation: positive for saves, negative for
//! deletions. Repeated mutations of one id overwrite its score, so the feed
//! never grows beyond one entry per id.

use crate::error::Result;
use crate::storage::{Bound, Command, KvConnection};
use serde::Serialize;
use tracing::debug;

const FEED_PREFIX: &str = "sync";

pub fn feed_key(namespace: &str) -> String {
    crate::key!(FEED_PREFIX, namespace)
}

/// Current Unix time in whole seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Record `ids` as updated at `at`; only reports entries whose score changed
pub fn touch<I: IntoIterator<Item = u64>>(namespace: &str, ids: I, at: i64) -> Command {
    Command::ZAdd {
        key: feed_key(namespace),
        entries: ids.into_iter().map(|id| (at as f64, id.to_string())).collect(),
        changed: true,
    }
}

/// Record `ids` as deleted at `at`, overwriting any previous entry
pub fn tombstone<I: IntoIterator<Item = u64>>(namespace: &str, ids: I, at: i64) -> Command {
    let score = -(at.abs()) as f64;
    Command::ZAdd {
        key: feed_key(namespace),
        entries: ids.into_iter().map(|id| (score, id.to_string())).collect(),
        changed: false,
    }
}

/// Append one entry; the sign of `signed_time` selects update or tombstone
pub async fn append(conn: &mut dyn KvConnection, namespace: &str, id: u64, signed_time: i64) -> Result<()> {
    let command = if signed_time < 0 {
        tombstone(namespace, [id], signed_time)
    } else {
        touch(namespace, [id], signed_time)
    };
    conn.query(command).await?;
    Ok(())
}

fn window(since: i64) -> (Bound, Bound) {
    if since >= 0 {
        (Bound::Inclusive(since as f64), Bound::PosInf)
    } else {
        (Bound::NegInf, Bound::Inclusive(since as f64))
    }
}

/// Ids changed since a cursor.
///
/// A cursor `>= 0` selects updates scored in `[since, +inf)`; a negative
/// cursor selects tombstones scored in `(-inf, since]`.
pub async fn poll(conn: &mut dyn KvConnection, namespace: &str, since: i64) -> Result<Vec<u64>> {
    let (min, max) = window(since);
    let members = conn
        .query(Command::ZRangeByScore {
            key: feed_key(namespace),
            min,
            max,
            with_scores: false,
        })
        .await?
        .into_strings()?;
    let ids = members.iter().filter_map(|m| m.parse().ok()).collect::<Vec<u64>>();
    debug!(namespace, since, count = ids.len(), "Polled change feed");
    Ok(ids)
}

/// One feed entry with its signed timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub id: u64,
    /// Unix seconds of the mutation
    pub at: i64,
    pub deleted: bool,
}

/// Like [`poll`], with timestamps
pub async fn changes(conn: &mut dyn KvConnection, namespace: &str, since: i64) -> Result<Vec<Change>> {
    let (min, max) = window(since);
    let scored = conn
        .query(Command::ZRangeByScore {
            key: feed_key(namespace),
            min,
            max,
            with_scores: true,
        })
        .await?
        .into_scored()?;
    Ok(scored
        .into_iter()
        .filter_map(|(member, score)| {
            let id = member.parse().ok()?;
            Some(Change {
                id,
                at: score.abs() as i64,
                deleted: score < 0.0,
            })
        })
        .collect())
}
