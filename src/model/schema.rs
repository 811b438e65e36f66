//! Declarative field schemas
//!
//! A [`Schema`] lists a record kind's fields in wire order, each with the
//! accessor used to read it for map storage and to write it back on load.
//! Encode and decode both walk the same list, so field order and count can
//! only disagree with the stored data, never between the two paths.

use crate::error::{Error, Result};
use crate::model::Identifiable;
use std::collections::HashSet;

/// Name of the existence marker placed first in list-mode field lists
pub const ID_FIELD: &str = "id";

/// How one field is read from and written into a record
pub enum Accessor<T> {
    /// Plain string
    Text {
        get: fn(&T) -> String,
        set: fn(&mut T, String),
    },
    /// Unsigned number, stored as decimal text; zero is stored empty
    Number {
        get: fn(&T) -> u64,
        set: fn(&mut T, u64),
    },
    /// Structured value carried as encoded text
    Blob {
        encode: fn(&T) -> Result<String>,
        decode: fn(&mut T, &str) -> Result<()>,
    },
}

/// One named field
pub struct Field<T> {
    pub name: &'static str,
    pub accessor: Accessor<T>,
}

impl<T> Field<T> {
    pub fn text(name: &'static str, get: fn(&T) -> String, set: fn(&mut T, String)) -> Self {
        Self {
            name,
            accessor: Accessor::Text { get, set },
        }
    }

    pub fn number(name: &'static str, get: fn(&T) -> u64, set: fn(&mut T, u64)) -> Self {
        Self {
            name,
            accessor: Accessor::Number { get, set },
        }
    }

    pub fn blob(
        name: &'static str,
        encode: fn(&T) -> Result<String>,
        decode: fn(&mut T, &str) -> Result<()>,
    ) -> Self {
        Self {
            name,
            accessor: Accessor::Blob { encode, decode },
        }
    }
}

/// `text_field!(Type, field)`
macro_rules! text_field {
    ($t:ty, $f:ident) => {
        $crate::model::schema::Field::text(
            stringify!($f),
            |r: &$t| r.$f.clone(),
            |r: &mut $t, v: String| r.$f = v,
        )
    };
}

/// `number_field!(Type, field)`
macro_rules! number_field {
    ($t:ty, $f:ident) => {
        $crate::model::schema::Field::number(
            stringify!($f),
            |r: &$t| r.$f,
            |r: &mut $t, v: u64| r.$f = v,
        )
    };
}

/// `slugs_field!(Type)` for a `slugs: Vec<Slug>` member
macro_rules! slugs_field {
    ($t:ty) => {
        $crate::model::schema::Field::blob(
            "slugs",
            |r: &$t| $crate::model::slug::encode_slugs(&r.slugs),
            |r: &mut $t, v: &str| {
                r.slugs = $crate::model::slug::decode_slugs(v)?;
                Ok(())
            },
        )
    };
}

pub(crate) use {number_field, slugs_field, text_field};

/// Ordered field list of one record kind
pub struct Schema<T> {
    record: &'static str,
    fields: Vec<Field<T>>,
}

impl<T: Identifiable> Schema<T> {
    pub fn new(record: &'static str, fields: Vec<Field<T>>) -> Self {
        Self { record, fields }
    }

    /// Record kind name used in error reports
    pub fn record(&self) -> &'static str {
        self.record
    }

    /// Number of data fields (marker excluded)
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names; list mode prepends the [`ID_FIELD`] marker
    pub fn names(&self, list_mode: bool) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(self.fields.len() + 1);
        if list_mode {
            names.push(ID_FIELD);
        }
        names.extend(self.fields.iter().map(|f| f.name));
        names
    }

    /// Values aligned with `names(false)`
    pub fn encode(&self, record: &T) -> Result<Vec<String>> {
        self.fields
            .iter()
            .map(|field| match &field.accessor {
                Accessor::Text { get, .. } => Ok(get(record)),
                Accessor::Number { get, .. } => Ok(match get(record) {
                    0 => String::new(),
                    n => n.to_string(),
                }),
                Accessor::Blob { encode, .. } => encode(record).map_err(|e| self.corrupt(record.id(), field.name, e)),
            })
            .collect()
    }

    /// Populate `record` from positional values.
    ///
    /// In list mode the first value is the id marker; a missing or zero marker
    /// means the map does not exist and yields `Ok(false)`.
    pub fn decode(&self, record: &mut T, list_mode: bool, values: Vec<Option<String>>) -> Result<bool> {
        let mut values = values.into_iter();
        if list_mode {
            let marker = values.next().flatten().unwrap_or_default();
            let id = match marker.as_str() {
                "" => 0,
                s => s.parse::<u64>().map_err(|_| Error::Corrupt {
                    namespace: self.record.to_string(),
                    id: record.id(),
                    reason: format!("invalid id marker {:?}", s),
                })?,
            };
            if id == 0 {
                return Ok(false);
            }
            record.set_id(id);
        }

        let values: Vec<Option<String>> = values.collect();
        if values.len() != self.fields.len() {
            return Err(Error::Corrupt {
                namespace: self.record.to_string(),
                id: record.id(),
                reason: format!("expected {} fields, got {}", self.fields.len(), values.len()),
            });
        }

        for (field, value) in self.fields.iter().zip(values) {
            let value = value.unwrap_or_default();
            match &field.accessor {
                Accessor::Text { set, .. } => set(record, value),
                Accessor::Number { set, .. } => {
                    let n = if value.is_empty() {
                        0
                    } else {
                        value.parse::<u64>().map_err(|_| Error::Corrupt {
                            namespace: self.record.to_string(),
                            id: record.id(),
                            reason: format!("field {} is not a number: {:?}", field.name, value),
                        })?
                    };
                    set(record, n);
                }
                Accessor::Blob { decode, .. } => {
                    decode(record, &value).map_err(|e| self.corrupt(record.id(), field.name, e))?
                }
            }
        }
        Ok(record.id() != 0)
    }

    /// Check the schema once before use
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::Config(format!("schema {} has no fields", self.record)));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name == ID_FIELD {
                return Err(Error::Config(format!(
                    "schema {} redeclares the reserved field {}",
                    self.record, ID_FIELD
                )));
            }
            if !seen.insert(field.name) {
                return Err(Error::Config(format!(
                    "schema {} declares field {} twice",
                    self.record, field.name
                )));
            }
        }
        Ok(())
    }

    fn corrupt(&self, id: u64, field: &str, e: Error) -> Error {
        Error::Corrupt {
            namespace: self.record.to_string(),
            id,
            reason: format!("field {}: {}", field, e),
        }
    }
}
