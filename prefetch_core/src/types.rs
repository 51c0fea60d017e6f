use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one downloadable content unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ContentKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Ordered set of every key the content service knows about.
///
/// Duplicates collapse onto their first occurrence so iteration order stays
/// the order the service reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    keys: Vec<ContentKey>,
}

impl Catalog {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ContentKey>,
    {
        let mut seen = HashSet::new();
        let keys = keys
            .into_iter()
            .map(Into::into)
            .filter(|k: &ContentKey| seen.insert(k.clone()))
            .collect();
        Self { keys }
    }

    pub fn keys(&self) -> &[ContentKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContentKey> {
        self.keys.iter()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ContentKey;
    type IntoIter = std::slice::Iter<'a, ContentKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// One key that still needs bytes from the content service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanItem {
    pub key: ContentKey,
    pub size_bytes: u64,
}

/// Keys requiring a download, in catalog order. Every item has a nonzero size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadPlan {
    items: Vec<PlanItem>,
    total_bytes: u64,
}

impl DownloadPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `key` when `size_bytes > 0`; zero-sized keys are already local.
    /// Returns whether the key was added.
    pub fn push(&mut self, key: ContentKey, size_bytes: u64) -> bool {
        if size_bytes == 0 {
            return false;
        }
        self.total_bytes = self.total_bytes.saturating_add(size_bytes);
        self.items.push(PlanItem { key, size_bytes });
        true
    }

    pub fn items(&self) -> &[PlanItem] {
        &self.items
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-key result of one executed plan item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    pub key: ContentKey,
    pub succeeded: bool,
}
