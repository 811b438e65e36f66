//! Link graph store
//!
//! Many-to-many relations between two namespaces, kept in plain sets keyed
//! `{owner_ns}:{owner_id}:{target_ns}`. Saving always adds the owner to
//! each target's set (the reverse index); a symmetric save also adds all
//! targets to the owner's set in the same round trip. Loads read the
//! owner's set. Set semantics make repeated links idempotent and leave
//! member order unspecified.
//!
//! An asymmetric save leaves no trace in the owner's own sets, so deleting
//! the owner has to find the target sets naming it by scanning
//! `{target_ns}:*:{owner_ns}` (see [`purge_inbound`]).

use crate::error::{Error, Result};
use crate::storage::{glob, Command, KvConnection, Pipeline, Reply};
use tracing::debug;

pub fn link_key(owner_ns: &str, owner: u64, target_ns: &str) -> String {
    crate::key!(owner_ns, owner, target_ns)
}

fn check_ids(owner: u64, targets: &[u64]) -> Result<()> {
    if owner == 0 || targets.contains(&0) {
        return Err(Error::InvalidArgument("link ids must be positive".to_string()));
    }
    Ok(())
}

fn members(ids: &[u64]) -> Vec<String> {
    ids.iter().map(u64::to_string).collect()
}

fn link_pipeline(
    owner_ns: &str,
    target_ns: &str,
    symmetric: bool,
    owner: u64,
    targets: &[u64],
    add: bool,
) -> Pipeline {
    let command = |key: String, members: Vec<String>| {
        if add {
            Command::SAdd { key, members }
        } else {
            Command::SRem { key, members }
        }
    };

    let mut pipeline = Pipeline::new();
    for &target in targets {
        pipeline.add(command(link_key(target_ns, target, owner_ns), vec![owner.to_string()]));
    }
    if symmetric {
        pipeline.add(command(link_key(owner_ns, owner, target_ns), members(targets)));
    }
    pipeline
}

/// Link `owner` in `owner_ns` to `targets` in `target_ns`
pub async fn save(
    conn: &mut dyn KvConnection,
    owner_ns: &str,
    target_ns: &str,
    symmetric: bool,
    owner: u64,
    targets: &[u64],
) -> Result<()> {
    check_ids(owner, targets)?;
    if targets.is_empty() {
        return Ok(());
    }
    conn.execute(link_pipeline(owner_ns, target_ns, symmetric, owner, targets, true))
        .await?;
    debug!(owner_ns, target_ns, owner, targets = targets.len(), symmetric, "Saved links");
    Ok(())
}

/// Remove links written by [`save`] with the same arguments
pub async fn free(
    conn: &mut dyn KvConnection,
    owner_ns: &str,
    target_ns: &str,
    symmetric: bool,
    owner: u64,
    targets: &[u64],
) -> Result<()> {
    check_ids(owner, targets)?;
    if targets.is_empty() {
        return Ok(());
    }
    conn.execute(link_pipeline(owner_ns, target_ns, symmetric, owner, targets, false))
        .await?;
    debug!(owner_ns, target_ns, owner, targets = targets.len(), symmetric, "Freed links");
    Ok(())
}

fn parse_ids(reply: Reply) -> Result<Vec<u64>> {
    let mut ids = reply
        .into_strings()?
        .iter()
        .map(|m| {
            m.parse::<u64>()
                .map_err(|_| Error::Store(format!("non-numeric link member {:?}", m)))
        })
        .collect::<Result<Vec<_>>>()?;
    ids.sort_unstable();
    Ok(ids)
}

/// Ids `owner` links to in `target_ns`, ascending
pub async fn load(conn: &mut dyn KvConnection, owner_ns: &str, target_ns: &str, owner: u64) -> Result<Vec<u64>> {
    let reply = conn
        .query(Command::SMembers {
            key: link_key(owner_ns, owner, target_ns),
        })
        .await?;
    parse_ids(reply)
}

/// Drop every link set owned by `id` and remove `id` from the sets of its
/// counterparts. Returns the number of links removed.
pub async fn purge(conn: &mut dyn KvConnection, namespace: &str, id: u64, target_namespaces: &[&str]) -> Result<usize> {
    if target_namespaces.is_empty() {
        return Ok(0);
    }

    let mut read = Pipeline::new();
    for target_ns in target_namespaces {
        read.add(Command::SMembers {
            key: link_key(namespace, id, target_ns),
        });
    }
    let replies = conn.execute(read).await?;

    let mut write = Pipeline::new();
    let mut removed = 0;
    for (target_ns, reply) in target_namespaces.iter().zip(replies) {
        let counterparts = parse_ids(reply)?;
        removed += counterparts.len();
        for other in counterparts {
            write.add(Command::SRem {
                key: link_key(target_ns, other, namespace),
                members: vec![id.to_string()],
            });
        }
        write.add(Command::Del {
            keys: vec![link_key(namespace, id, target_ns)],
        });
    }
    conn.execute(write).await?;

    debug!(namespace, id, removed, "Purged links");
    Ok(removed)
}

/// Remove `ids` of `namespace` from every set in `target_namespaces` that
/// names them, including sets written by asymmetric links. Returns the
/// number of memberships removed.
pub async fn purge_inbound(
    conn: &mut dyn KvConnection,
    namespace: &str,
    ids: &[u64],
    target_namespaces: &[&str],
    scan_count: usize,
) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut write = Pipeline::new();
    for target_ns in target_namespaces {
        let pattern = format!("{}:*:{}", glob::escape(target_ns), glob::escape(namespace));
        for key in conn.scan_keys(&pattern, scan_count).await? {
            write.add(Command::SRem {
                key,
                members: members(ids),
            });
        }
    }
    if write.is_empty() {
        return Ok(0);
    }

    let mut removed = 0;
    for reply in conn.execute(write).await? {
        removed += reply.into_int()? as usize;
    }
    debug!(namespace, ids = ids.len(), removed, "Purged inbound links");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KvStore, MemoryStore};

    #[tokio::test]
    async fn test_symmetric_links_are_visible_from_both_sides() -> Result<()> {
        let store = MemoryStore::new();
        let mut conn = store.connect().await?;

        save(conn.as_mut(), "drug", "inn", true, 5, &[7, 9]).await?;
        assert_eq!(load(conn.as_mut(), "drug", "inn", 5).await?, vec![7, 9]);
        assert_eq!(load(conn.as_mut(), "inn", "drug", 7).await?, vec![5]);
        assert_eq!(load(conn.as_mut(), "inn", "drug", 9).await?, vec![5]);

        // idempotent
        save(conn.as_mut(), "drug", "inn", true, 5, &[9]).await?;
        assert_eq!(load(conn.as_mut(), "drug", "inn", 5).await?, vec![7, 9]);
        Ok(())
    }

    #[tokio::test]
    async fn test_asymmetric_links_only_fill_the_reverse_index() -> Result<()> {
        let store = MemoryStore::new();
        let mut conn = store.connect().await?;

        save(conn.as_mut(), "spec-act", "drug", false, 3, &[11]).await?;
        assert!(load(conn.as_mut(), "spec-act", "drug", 3).await?.is_empty());
        assert_eq!(load(conn.as_mut(), "drug", "spec-act", 11).await?, vec![3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_free_and_purge() -> Result<()> {
        let store = MemoryStore::new();
        let mut conn = store.connect().await?;

        save(conn.as_mut(), "drug", "inn", true, 5, &[7, 9]).await?;
        save(conn.as_mut(), "drug", "maker", true, 5, &[2]).await?;

        free(conn.as_mut(), "drug", "inn", true, 5, &[7]).await?;
        assert_eq!(load(conn.as_mut(), "drug", "inn", 5).await?, vec![9]);
        assert!(load(conn.as_mut(), "inn", "drug", 7).await?.is_empty());

        let removed = purge(conn.as_mut(), "drug", 5, &["inn", "maker"]).await?;
        assert_eq!(removed, 2);
        assert!(load(conn.as_mut(), "inn", "drug", 9).await?.is_empty());
        assert!(load(conn.as_mut(), "maker", "drug", 2).await?.is_empty());
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_purge_inbound_finds_asymmetric_links() -> Result<()> {
        let store = MemoryStore::new();
        let mut conn = store.connect().await?;

        save(conn.as_mut(), "drug", "inn", false, 5, &[7, 9]).await?;
        save(conn.as_mut(), "drug", "inn", false, 6, &[7]).await?;
        save(conn.as_mut(), "drug", "maker", false, 5, &[2]).await?;
        // nothing in drug 5's own sets to follow
        assert_eq!(purge(conn.as_mut(), "drug", 5, &["inn", "maker"]).await?, 0);

        let removed = purge_inbound(conn.as_mut(), "drug", &[5], &["inn", "maker"], 1).await?;
        assert_eq!(removed, 3);
        assert_eq!(load(conn.as_mut(), "inn", "drug", 7).await?, vec![6]);
        assert!(load(conn.as_mut(), "inn", "drug", 9).await?.is_empty());
        assert!(load(conn.as_mut(), "maker", "drug", 2).await?.is_empty());

        assert_eq!(purge_inbound(conn.as_mut(), "drug", &[5], &["inn"], 10).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_ids_are_rejected() -> Result<()> {
        let store = MemoryStore::new();
        let mut conn = store.connect().await?;
        assert!(matches!(
            save(conn.as_mut(), "drug", "inn", true, 0, &[1]).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(save(conn.as_mut(), "drug", "inn", true, 1, &[0]).await.is_err());
        Ok(())
    }
}
