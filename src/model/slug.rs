//! Language-tagged URL slugs
//!
//! Stored in a record map as one JSON array field, or as an empty string
//! when the record has none.

use crate::error::Result;
use crate::model::Lang;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug {
    pub lang: Lang,
    pub value: String,
}

impl Slug {
    pub fn new(lang: Lang, value: impl Into<String>) -> Self {
        Self {
            lang,
            value: value.into(),
        }
    }
}

pub fn encode_slugs(slugs: &[Slug]) -> Result<String> {
    if slugs.is_empty() {
        return Ok(String::new());
    }
    Ok(serde_json::to_string(slugs)?)
}

pub fn decode_slugs(text: &str) -> Result<Vec<Slug>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(text)?)
}

/// Slug for `lang`, if the record carries one
pub fn slug_for(slugs: &[Slug], lang: Lang) -> Option<&str> {
    slugs.iter().find(|s| s.lang == lang).map(|s| s.value.as_str())
}
