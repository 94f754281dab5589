//! Multi-valued query parameters, forwarded to the bridge exactly as received.

/// Key to one-or-many values. Keys keep first-seen order; values keep arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, Vec<String>)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw `application/x-www-form-urlencoded` query string (without the `?`).
    pub fn parse(raw: Option<&str>) -> Self {
        let mut params = QueryParams::new();
        if let Some(raw) = raw {
            for (k, v) in url::form_urlencoded::parse(raw.as_bytes()) {
                params.push(k.into_owned(), v.into_owned());
            }
        }
        params
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into()),
            None => self.entries.push((key, vec![value.into()])),
        }
    }

    /// All values for `key`, empty when absent.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_every_value_of_a_repeated_key() {
        let params = QueryParams::parse(Some("include=owner&include=parts&page%5Blimit%5D=10"));
        assert_eq!(params.get_all("include"), ["owner", "parts"]);
        assert_eq!(params.first("page[limit]"), Some("10"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn keeps_key_order() {
        let params = QueryParams::parse(Some("b=1&a=2&b=3"));
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn empty_and_missing_queries() {
        assert!(QueryParams::parse(None).is_empty());
        assert!(QueryParams::parse(Some("")).is_empty());
        assert_eq!(QueryParams::parse(Some("flag")).get_all("flag"), [""]);
        assert!(QueryParams::new().get_all("x").is_empty());
    }

    #[test]
    fn values_are_not_rewritten() {
        let params = QueryParams::parse(Some("filter%5Bname%5D=a%2Cb&sort=-id"));
        assert_eq!(params.first("filter[name]"), Some("a,b"));
        assert_eq!(params.first("sort"), Some("-id"));
    }
}
