//! Manufacturer or marketing authorisation holder

use crate::model::schema::{text_field, Schema};
use crate::model::{impl_record, is_zero, push_name, Lang, Searchable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Maker {
    #[serde(skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_en: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_ru: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_uk: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country_en: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country_ru: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country_uk: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub site: String,
}

lazy_static::lazy_static! {
    static ref SCHEMA: Schema<Maker> = Schema::new("maker", vec![
        text_field!(Maker, name_en),
        text_field!(Maker, name_ru),
        text_field!(Maker, name_uk),
        text_field!(Maker, country_en),
        text_field!(Maker, country_ru),
        text_field!(Maker, country_uk),
        text_field!(Maker, site),
    ]);
}

impl_record!(Maker, SCHEMA);

impl Maker {
    pub fn name(&self, lang: Lang) -> &str {
        lang.pick(&self.name_en, &self.name_ru, &self.name_uk)
    }
}

impl Searchable for Maker {
    fn search_names(&self, lang: Lang) -> Vec<String> {
        let mut names = Vec::new();
        push_name(&mut names, self.name(lang));
        names
    }

    fn primary_name(&self, lang: Lang) -> &str {
        self.name(lang)
    }
}
