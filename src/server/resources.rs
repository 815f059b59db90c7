//! Packaged resources compiled into the binary.

use std::collections::HashMap;

/// Named byte blobs (typically from `include_bytes!`) that handlers can serve
/// with [`Response::write_resource`](crate::server::Response::write_resource).
#[derive(Debug, Clone, Default)]
pub struct Resources {
    entries: HashMap<String, &'static [u8]>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource, builder style.
    pub fn with(mut self, name: impl Into<String>, bytes: &'static [u8]) -> Self {
        self.insert(name, bytes);
        self
    }

    /// Register a resource, replacing any previous one of the same name.
    pub fn insert(&mut self, name: impl Into<String>, bytes: &'static [u8]) {
        self.entries.insert(name.into(), bytes);
    }

    /// Look up a resource. A leading `/` in `name` is ignored.
    pub fn get(&self, name: &str) -> Option<&'static [u8]> {
        self.entries
            .get(name)
            .or_else(|| self.entries.get(name.trim_start_matches('/')))
            .copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
