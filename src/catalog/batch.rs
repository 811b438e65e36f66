//! Batch store engine
//!
//! Generic load, save and delete of record lists against map storage. A
//! batch is a slice of slots; `None` slots are skipped but keep their
//! position, so callers can tell "not requested" from "not found". Replies
//! are matched to slots by position only.
//!
//! None of the operations retry. A transport error aborts the remaining
//! chunks; chunks already executed stay applied.

use crate::error::{Error, Result};
use crate::metrics;
use crate::model::schema::ID_FIELD;
use crate::model::{Hasher, Identifiable};
use crate::storage::{Command, KvConnection, Pipeline, Reply};
use tracing::{debug, instrument};

use super::sync;

/// How a save treats fields already stored for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Clear the stored map, then write every field
    #[default]
    Replace,
    /// Keep stored fields; only non-empty values overwrite
    Merge,
}

/// Key of a record map
pub fn record_key(namespace: &str, id: u64) -> String {
    crate::key!(namespace, id)
}

/// Pipelined record access, `batch_size` records per round trip
#[derive(Debug, Clone, Copy)]
pub struct BatchStore {
    batch_size: usize,
}

impl Default for BatchStore {
    fn default() -> Self {
        Self { batch_size: 256 }
    }
}

impl BatchStore {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Write records and mark them updated in the change feed.
    ///
    /// Every present slot must carry a non-zero id; the check runs before any
    /// store mutation. Feed entries are scored `now + delta`. Returns the number
    /// of records written.
    #[instrument(skip(self, conn, records), fields(count = records.len()))]
    pub async fn save<H: Hasher>(
        &self,
        conn: &mut dyn KvConnection,
        namespace: &str,
        records: &[Option<H>],
        mode: SaveMode,
        delta: i64,
    ) -> Result<usize> {
        if let Some(slot) = records.iter().position(|r| matches!(r, Some(r) if r.id() == 0)) {
            return Err(Error::InvalidArgument(format!(
                "{}: record in slot {} has no id",
                namespace, slot
            )));
        }

        let at = sync::now() + delta;
        let live: Vec<&H> = records.iter().flatten().collect();
        let mut written = 0;

        for chunk in live.chunks(self.batch_size) {
            let mut pipeline = Pipeline::new();
            for record in chunk {
                let key = record_key(namespace, record.id());
                let fields = map_fields(namespace, *record, mode)?;
                if mode == SaveMode::Replace {
                    pipeline.add(Command::Del {
                        keys: vec![key.clone()],
                    });
                }
                pipeline.add(Command::HSet { key, fields });
            }
            pipeline.add(sync::touch(namespace, chunk.iter().map(|r| r.id()), at));

            conn.execute(pipeline).await?;
            written += chunk.len();
        }

        metrics::record_written(namespace, written);
        debug!(namespace, written, ?mode, "Saved records");
        Ok(written)
    }

    /// Fill present slots from storage.
    ///
    /// Slots whose map does not exist become `None`. Returns the number of
    /// records found.
    #[instrument(skip(self, conn, records), fields(count = records.len()))]
    pub async fn load<H: Hasher>(
        &self,
        conn: &mut dyn KvConnection,
        namespace: &str,
        records: &mut [Option<H>],
    ) -> Result<usize> {
        let slots: Vec<usize> = records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|_| i))
            .collect();
        let mut found = 0;

        for chunk in slots.chunks(self.batch_size) {
            let mut pipeline = Pipeline::new();
            for &slot in chunk {
                if let Some(record) = &records[slot] {
                    pipeline.add(Command::HMGet {
                        key: record_key(namespace, record.id()),
                        fields: record.fields(true).into_iter().map(str::to_string).collect(),
                    });
                }
            }

            let replies = conn.execute(pipeline).await?;
            if replies.len() != chunk.len() {
                return Err(Error::Store(format!(
                    "expected {} replies, got {}",
                    chunk.len(),
                    replies.len()
                )));
            }

            for (&slot, reply) in chunk.iter().zip(replies) {
                let values = reply
                    .into_array()?
                    .into_iter()
                    .map(Reply::into_opt_string)
                    .collect::<Result<Vec<_>>>()?;
                let exists = match records[slot].as_mut() {
                    Some(record) => record
                        .set_values(true, values)
                        .map_err(|e| in_namespace(e, namespace))?,
                    None => false,
                };
                if exists {
                    found += 1;
                } else {
                    records[slot] = None;
                }
            }
        }

        metrics::record_loaded(namespace, found);
        debug!(namespace, requested = slots.len(), found, "Loaded records");
        Ok(found)
    }

    /// Remove record maps and tombstone the ones that existed.
    ///
    /// Returns the ids actually removed, in slot order.
    #[instrument(skip(self, conn, records), fields(count = records.len()))]
    pub async fn delete<H: Identifiable>(
        &self,
        conn: &mut dyn KvConnection,
        namespace: &str,
        records: &[Option<H>],
    ) -> Result<Vec<u64>> {
        let ids: Vec<u64> = records.iter().flatten().map(|r| r.id()).collect();
        let mut removed = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(self.batch_size) {
            let mut pipeline = Pipeline::new();
            for &id in chunk {
                pipeline.add(Command::Del {
                    keys: vec![record_key(namespace, id)],
                });
            }

            let replies = conn.execute(pipeline).await?;
            let mut gone = Vec::new();
            for (&id, reply) in chunk.iter().zip(replies) {
                if reply.into_int()? > 0 {
                    gone.push(id);
                }
            }

            if !gone.is_empty() {
                conn.query(sync::tombstone(namespace, gone.iter().copied(), sync::now()))
                    .await?;
                removed.extend(gone);
            }
        }

        metrics::record_deleted(namespace, removed.len());
        debug!(namespace, removed = removed.len(), "Deleted records");
        Ok(removed)
    }
}

/// Field/value pairs for one record, existence marker first
fn map_fields<H: Hasher>(namespace: &str, record: &H, mode: SaveMode) -> Result<Vec<(String, String)>> {
    let names = record.fields(false);
    let values = record.field_values()?;
    if names.len() != values.len() {
        return Err(Error::Corrupt {
            namespace: namespace.to_string(),
            id: record.id(),
            reason: format!("{} field names for {} values", names.len(), values.len()),
        });
    }

    let mut fields = Vec::with_capacity(names.len() + 1);
    fields.push((ID_FIELD.to_string(), record.id().to_string()));
    fields.extend(
        names
            .into_iter()
            .zip(values)
            .filter(|(_, value)| mode == SaveMode::Replace || !value.is_empty())
            .map(|(name, value)| (name.to_string(), value)),
    );
    Ok(fields)
}

/// Report decode failures under the namespace being loaded
fn in_namespace(e: Error, namespace: &str) -> Error {
    match e {
        Error::Corrupt { id, reason, .. } => Error::Corrupt {
            namespace: namespace.to_string(),
            id,
            reason,
        },
        other => other,
    }
}
