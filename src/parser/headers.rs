//! Ordered HTTP header collection.

use std::fmt;

/// A set of headers in an HTTP message.
///
/// Order is preserved and repeated names are allowed, so this is a list of
/// name/value pairs rather than a map. Names are stored exactly as given and
/// the lookup methods compare them exactly; use the `_ignore_case` variants
/// when matching names received from the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// The first value defined for `name`, if any.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values defined for `name`, in insertion order (possibly empty).
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The first value whose name matches `name` ignoring ASCII case.
    pub fn get_first_ignore_case(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values whose name matches `name` ignoring ASCII case.
    pub fn get_all_ignore_case(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether any entry is named `name` (exact comparison).
    pub fn contains(&self, name: &str) -> bool {
        self.get_first(name).is_some()
    }

    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.get_first_ignore_case(name).is_some()
    }

    /// Set the value of a header, replacing existing entries of that name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Add a value for a header, retaining existing entries.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove all values of a header.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| n != name);
    }

    /// Remove all occurrences of a header with a particular value.
    pub fn remove_value(&mut self, name: &str, value: &str) {
        self.entries.retain(|(n, v)| !(n == name && v == value));
    }

    /// Remove every entry whose name matches `name` ignoring ASCII case.
    pub fn remove_ignore_case(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Iterate over all entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Headers {
    /// Wire form: one `name: value` line per entry, each terminated by CRLF.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}
