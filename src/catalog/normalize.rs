//! Name normalization for the search index
//!
//! Both indexed names and user queries go through [`normalize`], so a
//! query matches regardless of case and diacritics.

use crate::storage::glob;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Separator between a name and its id inside token index entries
pub const ENTRY_SEPARATOR: char = '|';

/// Decompose, drop combining marks, lowercase and collapse whitespace.
/// The entry separator and control characters become spaces.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_whitespace() || c.is_control() || c == ENTRY_SEPARATOR {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// First character of a normalized name
pub fn leading_rune(normalized: &str) -> Option<char> {
    normalized.chars().next()
}

/// Token index entry for a normalized name
pub fn entry(normalized: &str, id: u64) -> String {
    format!("{}{}{}", normalized, ENTRY_SEPARATOR, id)
}

/// Split an entry into name and id
pub fn split_entry(entry: &str) -> Option<(&str, u64)> {
    let (name, id) = entry.rsplit_once(ENTRY_SEPARATOR)?;
    Some((name, id.parse().ok()?))
}

/// Substring glob for free user text: every whitespace separated token
/// becomes `*token*`, joined by spaces. Empty when nothing searchable is left.
pub fn substring_pattern(text: &str) -> String {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| format!("*{}*", glob::escape(t)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_marks_and_case() {
        assert_eq!(normalize("  Ácido   Acetilsalicílico "), "acido acetilsalicilico");
        assert_eq!(normalize("ПАРАЦЕТАМОЛ"), "парацетамол");
        assert_eq!(normalize("Ёлка"), "елка");
        assert_eq!(normalize("a|b\tc"), "a b c");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_entries_split_on_last_separator() {
        let e = entry("aspirin", 42);
        assert_eq!(e, "aspirin|42");
        assert_eq!(split_entry(&e), Some(("aspirin", 42)));
        assert_eq!(split_entry("no separator"), None);
        assert_eq!(split_entry("bad|id"), None);
    }

    #[test]
    fn test_substring_pattern() {
        assert_eq!(substring_pattern("Asp"), "*asp*");
        assert_eq!(substring_pattern("vit  C"), "*vit* *c*");
        assert_eq!(substring_pattern("50*"), "*50\\**");
        assert_eq!(substring_pattern("   "), "");
        assert_eq!(leading_rune("аспірин"), Some('а'));
    }
}
