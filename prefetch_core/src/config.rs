use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default delay between two progress polls of an in-flight handle.
const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default connect timeout for the HTTP content service.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Tuning knobs for [`crate::ContentLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    #[serde(rename = "poll_interval_ms", deserialize_with = "millis::deserialize")]
    pub poll_interval: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl LoaderConfig {
    /// Defaults overridden by `PREFETCH_POLL_INTERVAL_MS` when it parses.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_u64("PREFETCH_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Where the HTTP content service finds its manifest and stores content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpServiceConfig {
    pub manifest_path: PathBuf,
    pub cache_dir: PathBuf,
    #[serde(default = "default_connect_timeout", deserialize_with = "secs::deserialize")]
    pub connect_timeout: Duration,
}

impl HttpServiceConfig {
    pub fn new(manifest_path: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            cache_dir: cache_dir.into(),
            connect_timeout: default_connect_timeout(),
        }
    }

    /// Priority: `$PREFETCH_MANIFEST` → `./manifest.json`,
    /// `$PREFETCH_CACHE_DIR` → `<temp dir>/prefetch`.
    pub fn from_env() -> Self {
        let manifest_path = std::env::var("PREFETCH_MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("manifest.json"));
        let cache_dir = std::env::var("PREFETCH_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("prefetch"));
        Self::new(manifest_path, cache_dir)
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
