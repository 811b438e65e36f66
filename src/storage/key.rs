//! Composite key construction
//!
//! Keys are a namespace prefix followed by components, joined by
//! [`SEPARATOR`]. The same logical arguments always produce the same key.

use std::fmt::Write;

/// Separator placed between key components
pub const SEPARATOR: char = ':';

/// A value usable as a key component
pub trait KeyPart {
    fn write_part(&self, out: &mut String);
}

impl KeyPart for str {
    fn write_part(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl KeyPart for String {
    fn write_part(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl KeyPart for [u8] {
    fn write_part(&self, out: &mut String) {
        out.push_str(&String::from_utf8_lossy(self));
    }
}

impl KeyPart for Vec<u8> {
    fn write_part(&self, out: &mut String) {
        self.as_slice().write_part(out);
    }
}

macro_rules! int_key_part {
    ($($t:ty),*) => {
        $(
            impl KeyPart for $t {
                fn write_part(&self, out: &mut String) {
                    // Writing into a String cannot fail
                    let _ = write!(out, "{}", self);
                }
            }
        )*
    };
}

int_key_part!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl<T: KeyPart + ?Sized> KeyPart for &T {
    fn write_part(&self, out: &mut String) {
        (**self).write_part(out);
    }
}

/// Join a prefix and components into one key
pub fn compose(prefix: &str, parts: &[&dyn KeyPart]) -> String {
    let mut key = String::with_capacity(prefix.len() + parts.len() * 12);
    key.push_str(prefix);
    for part in parts {
        key.push(SEPARATOR);
        part.write_part(&mut key);
    }
    key
}

/// `key!(prefix, part, ...)` builds a composite key
#[macro_export]
macro_rules! key {
    ($prefix:expr $(, $part:expr)* $(,)?) => {
        $crate::storage::key::compose($prefix, &[$(&$part as &dyn $crate::storage::key::KeyPart),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_mixed_parts() {
        let id: u64 = 42;
        assert_eq!(compose("drug", &[&id]), "drug:42");
        assert_eq!(compose("drug", &[&id, &"inn"]), "drug:42:inn");
        assert_eq!(compose("sync", &[]), "sync");
        assert_eq!(compose("raw", &[&b"ab".as_slice(), &-3i64]), "raw:ab:-3");
    }

    #[test]
    fn test_key_macro_is_deterministic() {
        let ns = String::from("class-atc");
        let a = key!("idx", ns, "uk", "tokens");
        let b = key!("idx", ns.as_str(), "uk", "tokens");
        assert_eq!(a, b);
        assert_eq!(a, "idx:class-atc:uk:tokens");
    }
}
