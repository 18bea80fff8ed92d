//! # Cache Keys
//!
//! A cache key is a value derived from the parsed request fields. Two requests
//! whose fields are equal produce equal keys, no matter which connection or
//! command instance they came from.

use std::fmt;

use isrv_common::protocol::FIELD_SEPARATOR;

/// Value-equality key for the response cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Box<str>);

impl CacheKey {
    /// Builds a key from an ordered sequence of request fields.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                joined.push(FIELD_SEPARATOR);
            }
            joined.push_str(field.as_ref());
        }
        CacheKey(joined.into_boxed_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        CacheKey(raw.into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::CacheKey;
    use std::collections::HashSet;

    #[test]
    fn equal_fields_give_equal_keys() {
        let a = CacheKey::from_fields(vec!["q".to_string(), "DEU".into(), "X".into()]);
        let b = CacheKey::from_fields(["q", "DEU", "X"]);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn field_order_matters() {
        assert_ne!(CacheKey::from_fields(["q", "A", "B"]), CacheKey::from_fields(["q", "B", "A"]));
    }

    #[test]
    fn joins_with_separator() {
        assert_eq!(CacheKey::from_fields(["r", "SP.POP.TOTL"]).as_str(), "r;SP.POP.TOTL");
    }
}
