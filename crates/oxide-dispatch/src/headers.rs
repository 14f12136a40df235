//! Case-insensitive, order-preserving header map.

/// HTTP header collection.
///
/// Names compare case-insensitively and keep the casing they were first
/// inserted with. Insertion order is preserved when writing to the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the first value for a header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces every value of a header with a single one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(idx) => {
                self.entries[idx].1 = value;
                let mut seen = 0usize;
                self.entries.retain(|(k, _)| {
                    if k.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Appends a value, keeping existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Read-modify-write of a single header value.
    ///
    /// `f` receives the current value (if any) and returns the new one.
    /// Handlers use this to extend a header the framework already set
    /// instead of replacing it.
    pub fn update<F>(&mut self, name: &str, f: F)
    where
        F: FnOnce(Option<&str>) -> String,
    {
        let value = f(self.get(name));
        self.set(name, value);
    }

    /// Removes a header, returning its first value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let first = self.get(name).map(str::to_string);
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        first
    }

    /// Iterates over all header pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of header entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "application/json");
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_set_replaces_all_values() {
        let mut headers = Headers::new();
        headers.append("Vary", "Accept");
        headers.append("vary", "Accept-Version");
        headers.set("VARY", "Origin");
        assert_eq!(headers.get_all("vary").collect::<Vec<_>>(), vec!["Origin"]);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_update_extends_existing_value() {
        let mut headers = Headers::new();
        headers.set("Access-Control-Allow-Headers", "Accept, Content-Type");
        headers.update("access-control-allow-headers", |current| {
            format!("{}, If-Match, If-None-Match", current.unwrap_or_default())
        });
        assert_eq!(
            headers.get("Access-Control-Allow-Headers"),
            Some("Accept, Content-Type, If-Match, If-None-Match")
        );
    }

    #[test]
    fn test_remove() {
        let mut headers: Headers = [("A", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(headers.remove("a"), Some("1".to_string()));
        assert_eq!(headers.remove("a"), None);
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec![("b", "2")]);
    }
}
