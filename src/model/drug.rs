//! Drug (registered medicinal product)

use crate::model::schema::{number_field, slugs_field, text_field, Schema};
use crate::model::{impl_record, is_zero, push_name, Lang, Searchable, Slug};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Drug {
    #[serde(skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_en: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_ru: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_uk: String,
    /// Dosage form, e.g. "tablets"
    #[serde(skip_serializing_if = "String::is_empty")]
    pub form_en: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub form_ru: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub form_uk: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dose: String,
    /// Units per pack
    #[serde(skip_serializing_if = "is_zero")]
    pub pack: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reg_number: String,
    /// Registration date, Unix seconds
    #[serde(skip_serializing_if = "is_zero")]
    pub reg_date: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slugs: Vec<Slug>,
}

lazy_static::lazy_static! {
    static ref SCHEMA: Schema<Drug> = Schema::new("drug", vec![
        text_field!(Drug, name_en),
        text_field!(Drug, name_ru),
        text_field!(Drug, name_uk),
        text_field!(Drug, form_en),
        text_field!(Drug, form_ru),
        text_field!(Drug, form_uk),
        text_field!(Drug, dose),
        number_field!(Drug, pack),
        text_field!(Drug, reg_number),
        number_field!(Drug, reg_date),
        slugs_field!(Drug),
    ]);
}

impl_record!(Drug, SCHEMA);

impl Drug {
    pub fn name(&self, lang: Lang) -> &str {
        lang.pick(&self.name_en, &self.name_ru, &self.name_uk)
    }
}

impl Searchable for Drug {
    fn search_names(&self, lang: Lang) -> Vec<String> {
        let mut names = Vec::new();
        push_name(&mut names, self.name(lang));
        names
    }

    fn primary_name(&self, lang: Lang) -> &str {
        self.name(lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::model::{Hasher, Identifiable};

    #[test]
    fn test_json_omits_empty_fields() -> Result<()> {
        let drug = Drug {
            id: 1,
            name_ru: "Парацетамол".into(),
            ..Drug::default()
        };
        let json = serde_json::to_string(&drug)?;
        assert_eq!(json, r#"{"id":1,"name_ru":"Парацетамол"}"#);

        let back: Drug = serde_json::from_str(&json)?;
        assert_eq!(back, drug);
        Ok(())
    }

    #[test]
    fn test_field_projection_round_trip() -> Result<()> {
        let drug = Drug {
            id: 4,
            name_en: "Nurofen".into(),
            form_en: "tablets".into(),
            dose: "200 mg".into(),
            pack: 24,
            slugs: vec![Slug::new(Lang::En, "nurofen")],
            ..Drug::default()
        };
        let mut values: Vec<Option<String>> = vec![Some(drug.id().to_string())];
        values.extend(drug.field_values()?.into_iter().map(Some));

        let mut back = Drug::default();
        assert!(back.set_values(true, values)?);
        assert_eq!(back, drug);
        Ok(())
    }

    #[test]
    fn test_search_names_follow_language() {
        let drug = Drug {
            id: 2,
            name_en: "Aspirin".into(),
            name_uk: "Аспірин".into(),
            ..Drug::default()
        };
        assert_eq!(drug.search_names(Lang::Uk), vec!["Аспірин"]);
        assert!(drug.search_names(Lang::Ru).is_empty());
    }
}
