//! Monograph
//!
//! Shared by the action notes, patient information and decree variants.
//! Decree texts only exist in Ukrainian, which [`Kind::languages`] reflects
//! for indexing.
//!
//! [`Kind::languages`]: crate::model::Kind::languages

use crate::model::schema::{number_field, slugs_field, text_field, Schema};
use crate::model::{impl_record, is_zero, push_name, Lang, Searchable, Slug};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spec {
    #[serde(skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_en: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_ru: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_uk: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text_en: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text_ru: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text_uk: String,
    /// Last revision, Unix seconds
    #[serde(skip_serializing_if = "is_zero")]
    pub updated: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slugs: Vec<Slug>,
}

lazy_static::lazy_static! {
    static ref SCHEMA: Schema<Spec> = Schema::new("spec", vec![
        text_field!(Spec, name_en),
        text_field!(Spec, name_ru),
        text_field!(Spec, name_uk),
        text_field!(Spec, text_en),
        text_field!(Spec, text_ru),
        text_field!(Spec, text_uk),
        number_field!(Spec, updated),
        slugs_field!(Spec),
    ]);
}

impl_record!(Spec, SCHEMA);

impl Spec {
    pub fn name(&self, lang: Lang) -> &str {
        lang.pick(&self.name_en, &self.name_ru, &self.name_uk)
    }
}

impl Searchable for Spec {
    fn search_names(&self, lang: Lang) -> Vec<String> {
        let mut names = Vec::new();
        push_name(&mut names, self.name(lang));
        names
    }

    fn primary_name(&self, lang: Lang) -> &str {
        self.name(lang)
    }
}
