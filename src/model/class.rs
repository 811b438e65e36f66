//! Taxonomy class
//!
//! One record type serves all eight classification systems; the namespace
//! tells them apart.

use crate::model::schema::{number_field, slugs_field, text_field, Schema};
use crate::model::{impl_record, is_zero, push_name, Lang, Searchable, Slug};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Class {
    #[serde(skip_serializing_if = "is_zero")]
    pub id: u64,
    /// Code within the taxonomy, e.g. `N02BA01`
    #[serde(skip_serializing_if = "String::is_empty")]
    pub code: String,
    /// Parent class id, zero for roots
    #[serde(skip_serializing_if = "is_zero")]
    pub parent: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_en: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_ru: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_uk: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slugs: Vec<Slug>,
}

lazy_static::lazy_static! {
    static ref SCHEMA: Schema<Class> = Schema::new("class", vec![
        text_field!(Class, code),
        number_field!(Class, parent),
        text_field!(Class, name_en),
        text_field!(Class, name_ru),
        text_field!(Class, name_uk),
        slugs_field!(Class),
    ]);
}

impl_record!(Class, SCHEMA);

impl Class {
    pub fn name(&self, lang: Lang) -> &str {
        lang.pick(&self.name_en, &self.name_ru, &self.name_uk)
    }
}

impl Searchable for Class {
    /// Localized name followed by the code, which is language independent
    fn search_names(&self, lang: Lang) -> Vec<String> {
        let mut names = Vec::new();
        push_name(&mut names, self.name(lang));
        push_name(&mut names, &self.code);
        names
    }

    fn primary_name(&self, lang: Lang) -> &str {
        self.name(lang)
    }
}
