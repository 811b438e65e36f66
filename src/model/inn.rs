//! International nonproprietary name (active ingredient)

use crate::model::schema::{slugs_field, text_field, Schema};
use crate::model::{impl_record, is_zero, push_name, Lang, Searchable, Slug};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inn {
    #[serde(skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_en: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_ru: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_uk: String,
    /// Latin pharmacopoeial name
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_la: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slugs: Vec<Slug>,
}

lazy_static::lazy_static! {
    static ref SCHEMA: Schema<Inn> = Schema::new("inn", vec![
        text_field!(Inn, name_en),
        text_field!(Inn, name_ru),
        text_field!(Inn, name_uk),
        text_field!(Inn, name_la),
        slugs_field!(Inn),
    ]);
}

impl_record!(Inn, SCHEMA);

impl Inn {
    pub fn name(&self, lang: Lang) -> &str {
        lang.pick(&self.name_en, &self.name_ru, &self.name_uk)
    }
}

impl Searchable for Inn {
    /// The Latin name is searchable alongside the English one
    fn search_names(&self, lang: Lang) -> Vec<String> {
        let mut names = Vec::new();
        push_name(&mut names, self.name(lang));
        if lang == Lang::En {
            push_name(&mut names, &self.name_la);
        }
        names
    }

    fn primary_name(&self, lang: Lang) -> &str {
        self.name(lang)
    }
}
