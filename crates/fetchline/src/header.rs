use std::collections::BTreeMap;

/// One header line, name as sent and value unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Request or response headers in wire order.
///
/// Names may repeat and compare case-insensitively. [`set`](Self::set)
/// replaces every value of a name; [`insert`](Self::insert) appends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<Header>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a header, keeping any existing values for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Header::new(name, value));
    }

    /// Replace every value of `name` with a single `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push(Header::new(name, value));
    }

    /// Remove every header matching `name` (case-insensitive).
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    /// First value for `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Every value for `name` in wire order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlay `other` on top of `self`: every name present in `other`
    /// replaces the values `self` had for it.
    pub fn merged(&self, other: &HeaderMap) -> HeaderMap {
        let mut out: HeaderMap = self
            .entries
            .iter()
            .filter(|h| !other.contains(&h.name))
            .cloned()
            .collect();
        out.entries.extend(other.entries.iter().cloned());
        out
    }

    /// Flatten into a name → value mapping.
    ///
    /// Names are lowercased; repeated headers are joined with `", "`.
    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for h in &self.entries {
            map.entry(h.name.to_ascii_lowercase())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(&h.value);
                })
                .or_insert_with(|| h.value.clone());
        }
        map
    }
}

impl FromIterator<Header> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(n, v)| Header::new(n, v)).collect(),
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(n, v)| Header::new(n, v)).collect(),
        }
    }
}

impl From<&http::HeaderMap> for HeaderMap {
    fn from(headers: &http::HeaderMap) -> Self {
        headers
            .iter()
            .map(|(name, value)| {
                Header::new(
                    name.as_str(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

/// Read-only header lookup.
///
/// The classifier only needs "first value for this name", so both the
/// crate's [`HeaderMap`] and `http::HeaderMap` implement it.
pub trait HeaderAccess {
    /// First value of `name` (case-insensitive), if present and textual.
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderAccess for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

impl HeaderAccess for http::HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        // http::HeaderMap normalizes names to lowercase on insert.
        self.get(name.to_ascii_lowercase().as_str())
            .and_then(|v| v.to_str().ok())
    }
}
