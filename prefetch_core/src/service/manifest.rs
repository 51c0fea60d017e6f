use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::types::{Catalog, ContentKey};

/// Basic-auth credentials sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationInfo {
    pub username: String,
    pub password: String,
}

/// One downloadable key and where to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: ContentKey,
    pub url: String,
    /// Known size in bytes; probed over HTTP when absent.
    #[serde(default)]
    pub size: Option<u64>,
}

/// The JSON document the HTTP content service initializes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub auth: Option<AuthenticationInfo>,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Reads the manifest at `path`. A missing file yields `Ok(None)`.
    pub async fn load(path: &Path) -> Result<Option<Self>, ServiceError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ServiceError::Disk(e)),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.entries.iter().map(|e| e.key.clone()))
    }

    /// First entry for `key`, matching the catalog's first-occurrence rule.
    pub fn entry(&self, key: &ContentKey) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"entries": [{"key": "a", "url": "http://x/a"}, {"key": "b", "url": "http://x/b", "size": 12}]}"#,
        )
        .unwrap();
        assert!(manifest.headers.is_empty());
        assert!(manifest.auth.is_none());
        assert_eq!(manifest.entries[0].size, None);
        assert_eq!(manifest.entry(&ContentKey::new("b")).unwrap().size, Some(12));
        assert_eq!(manifest.catalog().len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Manifest::load(&dir.path().join("nope.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            Manifest::load(&path).await,
            Err(ServiceError::Manifest(_))
        ));
    }
}
