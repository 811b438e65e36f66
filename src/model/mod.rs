//! Catalog data model
//!
//! Entity kinds, languages and the capability traits the storage
//! components work against:
//!
//! - [`Identifiable`]: a positive id assigned by the caller
//! - [`Hasher`]: object-safe projection onto an ordered field list
//! - [`Record`]: a concrete kind with a static [`Schema`] and a JSON form
//! - [`Searchable`]: name variants fed to the search index

pub mod class;
pub mod drug;
pub mod inn;
pub mod maker;
pub mod schema;
pub mod slug;
pub mod spec;

pub use class::Class;
pub use drug::Drug;
pub use inn::Inn;
pub use maker::Maker;
pub use schema::Schema;
pub use slug::Slug;
pub use spec::Spec;

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    Ru,
    #[serde(alias = "ua")]
    Uk,
}

impl Lang {
    pub const ALL: [Lang; 3] = [Lang::En, Lang::Ru, Lang::Uk];

    pub fn code(&self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Ru => "ru",
            Lang::Uk => "uk",
        }
    }

    /// Pick the variant of a localized value for this language
    pub fn pick<'a>(&self, en: &'a str, ru: &'a str, uk: &'a str) -> &'a str {
        match self {
            Lang::En => en,
            Lang::Ru => ru,
            Lang::Uk => uk,
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Lang {
    type Err = Error;

    /// Accepts bare codes and region-qualified tags (`uk-UA`, `en_US`)
    fn from_str(s: &str) -> Result<Self> {
        let primary = s
            .trim()
            .split(|c| c == '-' || c == '_')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" | "eng" => Ok(Lang::En),
            "ru" | "rus" => Ok(Lang::Ru),
            "uk" | "ua" | "ukr" => Ok(Lang::Uk),
            _ => Err(Error::InvalidArgument(format!("unsupported language: {}", s))),
        }
    }
}

/// Classification systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Taxonomy {
    /// Anatomical Therapeutic Chemical
    Atc,
    /// Nosological
    Nfc,
    /// Pharmacological
    Fsc,
    Bfc,
    Cfc,
    Mpc,
    Csc,
    /// International Classification of Diseases
    Icd,
}

/// Monograph variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecKind {
    /// Action notes
    Act,
    /// Patient information
    Inf,
    /// Decree text, Ukrainian only
    Dec,
}

/// Entity kind; each kind owns one namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Kind {
    Class(Taxonomy),
    Drug,
    Inn,
    Maker,
    Spec(SpecKind),
}

impl Kind {
    pub const ALL: [Kind; 14] = [
        Kind::Class(Taxonomy::Atc),
        Kind::Class(Taxonomy::Nfc),
        Kind::Class(Taxonomy::Fsc),
        Kind::Class(Taxonomy::Bfc),
        Kind::Class(Taxonomy::Cfc),
        Kind::Class(Taxonomy::Mpc),
        Kind::Class(Taxonomy::Csc),
        Kind::Class(Taxonomy::Icd),
        Kind::Drug,
        Kind::Inn,
        Kind::Maker,
        Kind::Spec(SpecKind::Act),
        Kind::Spec(SpecKind::Inf),
        Kind::Spec(SpecKind::Dec),
    ];

    /// Namespace prefix used in every key of this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            Kind::Class(Taxonomy::Atc) => "class-atc",
            Kind::Class(Taxonomy::Nfc) => "class-nfc",
            Kind::Class(Taxonomy::Fsc) => "class-fsc",
            Kind::Class(Taxonomy::Bfc) => "class-bfc",
            Kind::Class(Taxonomy::Cfc) => "class-cfc",
            Kind::Class(Taxonomy::Mpc) => "class-mpc",
            Kind::Class(Taxonomy::Csc) => "class-csc",
            Kind::Class(Taxonomy::Icd) => "class-icd",
            Kind::Drug => "drug",
            Kind::Inn => "inn",
            Kind::Maker => "maker",
            Kind::Spec(SpecKind::Act) => "spec-act",
            Kind::Spec(SpecKind::Inf) => "spec-inf",
            Kind::Spec(SpecKind::Dec) => "spec-dec",
        }
    }

    /// Whether records of the two kinds may be linked. Symmetric.
    pub fn may_link(self, other: Kind) -> bool {
        match (self, other) {
            (Kind::Spec(a), Kind::Spec(b)) => a != b,
            (Kind::Spec(_), _) | (_, Kind::Spec(_)) => true,
            (Kind::Drug, Kind::Inn) | (Kind::Inn, Kind::Drug) => true,
            (Kind::Drug, Kind::Maker) | (Kind::Maker, Kind::Drug) => true,
            (Kind::Drug, Kind::Class(_)) | (Kind::Class(_), Kind::Drug) => true,
            (Kind::Inn, Kind::Class(_)) | (Kind::Class(_), Kind::Inn) => true,
            _ => false,
        }
    }

    /// Every kind this kind may link to
    pub fn links(self) -> Vec<Kind> {
        Kind::ALL.iter().copied().filter(|k| self.may_link(*k)).collect()
    }

    /// Languages whose content is indexed for search
    pub fn languages(self) -> &'static [Lang] {
        match self {
            Kind::Spec(SpecKind::Dec) => &[Lang::Uk],
            _ => &Lang::ALL,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.prefix())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Kind::ALL
            .iter()
            .copied()
            .find(|k| k.prefix() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown namespace: {}", s)))
    }
}

impl TryFrom<String> for Kind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        kind.prefix().to_string()
    }
}

/// Entity with a caller-assigned id; zero means "no record"
pub trait Identifiable {
    fn id(&self) -> u64;
    fn set_id(&mut self, id: u64);
}

/// Projection of a record onto map storage
///
/// Object safe, so one batch may mix record kinds behind `Box<dyn Hasher>`.
pub trait Hasher: Identifiable + Send + Sync {
    /// Field names; list mode prepends the existence marker
    fn fields(&self, list_mode: bool) -> Vec<&'static str>;

    /// Values aligned with `fields(false)`
    fn field_values(&self) -> Result<Vec<String>>;

    /// Populate from positional values; `Ok(false)` when the stored map is absent
    fn set_values(&mut self, list_mode: bool, values: Vec<Option<String>>) -> Result<bool>;
}

/// A concrete entity kind
pub trait Record: Hasher + Searchable + Default + Clone + Serialize + DeserializeOwned + 'static {
    fn schema() -> &'static Schema<Self>;

    /// Empty record addressing `id`, used as a load slot
    fn with_id(id: u64) -> Self {
        let mut record = Self::default();
        record.set_id(id);
        record
    }
}

/// Name variants a record contributes to the search index
pub trait Searchable {
    fn search_names(&self, lang: Lang) -> Vec<String>;

    /// Localized display name filing the record under a letter. Empty when
    /// the record has no name in `lang`.
    fn primary_name(&self, lang: Lang) -> &str;
}

impl Identifiable for Box<dyn Hasher> {
    fn id(&self) -> u64 {
        (**self).id()
    }

    fn set_id(&mut self, id: u64) {
        (**self).set_id(id)
    }
}

impl Hasher for Box<dyn Hasher> {
    fn fields(&self, list_mode: bool) -> Vec<&'static str> {
        (**self).fields(list_mode)
    }

    fn field_values(&self) -> Result<Vec<String>> {
        (**self).field_values()
    }

    fn set_values(&mut self, list_mode: bool, values: Vec<Option<String>>) -> Result<bool> {
        (**self).set_values(list_mode, values)
    }
}

/// Implement [`Identifiable`], [`Hasher`] and [`Record`] for a struct with an
/// `id: u64` member and a static schema.
macro_rules! impl_record {
    ($t:ty, $schema:expr) => {
        impl $crate::model::Identifiable for $t {
            fn id(&self) -> u64 {
                self.id
            }

            fn set_id(&mut self, id: u64) {
                self.id = id;
            }
        }

        impl $crate::model::Hasher for $t {
            fn fields(&self, list_mode: bool) -> Vec<&'static str> {
                <$t as $crate::model::Record>::schema().names(list_mode)
            }

            fn field_values(&self) -> $crate::error::Result<Vec<String>> {
                <$t as $crate::model::Record>::schema().encode(self)
            }

            fn set_values(
                &mut self,
                list_mode: bool,
                values: Vec<Option<String>>,
            ) -> $crate::error::Result<bool> {
                <$t as $crate::model::Record>::schema().decode(self, list_mode, values)
            }
        }

        impl $crate::model::Record for $t {
            fn schema() -> &'static $crate::model::Schema<Self> {
                &$schema
            }
        }
    };
}

pub(crate) use impl_record;

/// Map a runtime [`Kind`] onto its record type:
///
/// ```ignore
/// dispatch!(kind, T => catalog.get::<T>(kind, &ids).await)
/// ```
#[macro_export]
macro_rules! dispatch {
    ($kind:expr, $t:ident => $body:expr) => {
        match $kind {
            $crate::model::Kind::Class(_) => {
                type $t = $crate::model::Class;
                $body
            }
            $crate::model::Kind::Drug => {
                type $t = $crate::model::Drug;
                $body
            }
            $crate::model::Kind::Inn => {
                type $t = $crate::model::Inn;
                $body
            }
            $crate::model::Kind::Maker => {
                type $t = $crate::model::Maker;
                $body
            }
            $crate::model::Kind::Spec(_) => {
                type $t = $crate::model::Spec;
                $body
            }
        }
    };
}

/// Check every record schema; run once at startup
pub fn validate_schemas() -> Result<()> {
    Class::schema().validate()?;
    Drug::schema().validate()?;
    Inn::schema().validate()?;
    Maker::schema().validate()?;
    Spec::schema().validate()?;
    Ok(())
}

/// Push a localized name onto `names` when present
pub(crate) fn push_name(names: &mut Vec<String>, name: &str) {
    let name = name.trim();
    if !name.is_empty() && !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

pub(crate) fn is_zero(n: &u64) -> bool {
    *n == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_parsing() -> Result<()> {
        assert_eq!("en".parse::<Lang>()?, Lang::En);
        assert_eq!("ua".parse::<Lang>()?, Lang::Uk);
        assert_eq!("uk-UA".parse::<Lang>()?, Lang::Uk);
        assert_eq!("RU".parse::<Lang>()?, Lang::Ru);
        assert!("de".parse::<Lang>().is_err());
        let lang: Lang = serde_json::from_str("\"ua\"")?;
        assert_eq!(lang, Lang::Uk);
        Ok(())
    }

    #[test]
    fn test_kind_prefix_round_trip() -> Result<()> {
        for kind in Kind::ALL {
            assert_eq!(kind.prefix().parse::<Kind>()?, kind);
        }
        assert!("pharmacy".parse::<Kind>().is_err());
        let kind: Kind = serde_json::from_str("\"spec-dec\"")?;
        assert_eq!(kind, Kind::Spec(SpecKind::Dec));
        assert_eq!(serde_json::to_string(&Kind::Drug)?, "\"drug\"");
        Ok(())
    }

    #[test]
    fn test_link_matrix_is_symmetric() {
        for a in Kind::ALL {
            for b in Kind::ALL {
                assert_eq!(a.may_link(b), b.may_link(a), "{} / {}", a, b);
            }
        }
        let act = Kind::Spec(SpecKind::Act);
        assert!(act.may_link(Kind::Spec(SpecKind::Inf)));
        assert!(!act.may_link(act));
        assert!(Kind::Drug.may_link(Kind::Class(Taxonomy::Atc)));
        assert!(!Kind::Maker.may_link(Kind::Inn));
        assert!(!Kind::Class(Taxonomy::Atc).may_link(Kind::Class(Taxonomy::Icd)));
        assert_eq!(act.links().len(), 13);
    }

    #[test]
    fn test_schemas_validate() -> Result<()> {
        validate_schemas()
    }

    #[test]
    fn test_boxed_hashers_share_one_batch() -> Result<()> {
        let mut batch: Vec<Box<dyn Hasher>> = vec![
            Box::new(Drug {
                id: 1,
                name_en: "Aspirin".into(),
                ..Drug::default()
            }),
            Box::new(Inn {
                id: 2,
                name_la: "Acidum acetylsalicylicum".into(),
                ..Inn::default()
            }),
        ];
        assert_eq!(batch[0].fields(true)[0], "id");
        assert_eq!(batch[1].field_values()?.len(), batch[1].fields(false).len());
        batch[0].set_id(9);
        assert_eq!(batch[0].id(), 9);
        Ok(())
    }
}
