//! Form and query-string parameters in the order the backend expects.
//!
//! Some form handlers read repeated fields (`href[]`, `title[]`, ...) row by
//! row, so the serialized order matters:
//!
//! 1. every single-valued pair, sorted by key;
//! 2. the multi-valued pairs, position by position across the sorted keys.
//!
//! `{a:[1], b:[x,y], c:[z,w]}` therefore becomes `a=1&b=x&c=z&b=y&c=w`.

use std::collections::BTreeMap;

/// A multimap of form parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, Vec<String>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every value of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), vec![value.into()]);
        self
    }

    /// Append `value` to the values of `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize as `k=v&k=v` in backend order.
    pub fn encode(&self) -> String {
        let mut pairs = Vec::new();
        let mut multi = Vec::new();
        let mut longest = 0;

        // BTreeMap iteration is already key-sorted.
        for (key, values) in &self.values {
            if values.len() == 1 {
                pairs.push(format!("{}={}", query_escape(key), query_escape(&values[0])));
                continue;
            }
            multi.push((key, values));
            longest = longest.max(values.len());
        }

        for i in 0..longest {
            for (key, values) in &multi {
                if let Some(value) = values.get(i) {
                    pairs.push(format!("{}={}", query_escape(key), query_escape(value)));
                }
            }
        }

        pairs.join("&")
    }
}

/// Escape a component for a query string: unreserved characters are kept,
/// spaces become `+`, everything else is percent-encoded.
pub fn query_escape(s: &str) -> String {
    urlencoding::encode(s).replace("%20", "+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_multi_ordering() {
        let mut p = Params::new();
        p.add("c", "z").add("c", "w");
        p.add("b", "x").add("b", "y");
        p.set("a", "1");
        assert_eq!(p.encode(), "a=1&b=x&c=z&b=y&c=w");
    }

    #[test]
    fn test_singles_sorted_by_key() {
        let mut p = Params::new();
        p.set("csrfToken", "abc").set("act", "ArticlePst").set("id", "9");
        assert_eq!(p.encode(), "act=ArticlePst&csrfToken=abc&id=9");
    }

    #[test]
    fn test_uneven_multi_values_are_skipped_not_padded() {
        let mut p = Params::new();
        p.add("x[]", "1").add("x[]", "2").add("x[]", "3");
        p.add("y[]", "a").add("y[]", "b");
        assert_eq!(
            p.encode(),
            "x%5B%5D=1&y%5B%5D=a&x%5B%5D=2&y%5B%5D=b&x%5B%5D=3"
        );
    }

    #[test]
    fn test_set_replaces_previous_values() {
        let mut p = Params::new();
        p.add("k", "1").add("k", "2");
        p.set("k", "3");
        assert_eq!(p.encode(), "k=3");
        assert_eq!(p.get("k"), Some("3"));
    }

    #[test]
    fn test_query_escape() {
        assert_eq!(query_escape("hello world"), "hello+world");
        assert_eq!(query_escape("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(query_escape("{%host%}post"), "%7B%25host%25%7Dpost");
        assert_eq!(query_escape("登录"), "%E7%99%BB%E5%BD%95");
    }

    #[test]
    fn test_empty() {
        assert_eq!(Params::new().encode(), "");
        assert!(Params::new().is_empty());
    }
}
