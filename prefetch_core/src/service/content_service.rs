use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ServiceError;
use crate::types::{Catalog, ContentKey};

/// Terminal (or not yet terminal) state of a download handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Capability object for one in-flight or finished operation of the
/// content service.
///
/// The loader only ever reads these five things; whatever the service keeps
/// behind the handle stays private to the service. `release` must be
/// idempotent: the loader may reach it from both the executor and the run
/// teardown.
pub trait DownloadHandle: Send + Sync {
    fn is_done(&self) -> bool;

    /// Fraction of this operation completed, in `[0.0, 1.0]`.
    fn progress(&self) -> f32;

    fn status(&self) -> HandleStatus;

    fn error(&self) -> Option<String>;

    fn release(&self);
}

pub type HandleRef = Arc<dyn DownloadHandle>;

/// Result of a successful service initialization.
pub struct Initialized {
    pub catalog: Catalog,
    /// Handle the service wants released once the run is over, if any.
    pub handle: Option<HandleRef>,
}

impl Initialized {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog, handle: None }
    }

    pub fn with_handle(mut self, handle: HandleRef) -> Self {
        self.handle = Some(handle);
        self
    }
}

/// The content-addressing engine the loader drives.
///
/// Resolving keys to locations and moving the bytes is entirely the
/// implementor's business.
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Loads the catalog. `Ok(None)` means the service came up without one.
    async fn initialize(&self) -> Result<Option<Initialized>, ServiceError>;

    /// Bytes still required to make `key` available locally (0 if cached).
    async fn download_size(&self, key: &ContentKey) -> Result<u64, ServiceError>;

    /// Batch form of [`ContentService::download_size`].
    ///
    /// The default queries every key concurrently and sums the results.
    async fn total_download_size(&self, keys: &[ContentKey]) -> Result<u64, ServiceError> {
        let sizes =
            futures::future::try_join_all(keys.iter().map(|key| self.download_size(key))).await?;
        Ok(sizes.into_iter().fold(0u64, u64::saturating_add))
    }

    async fn begin_download(&self, key: &ContentKey) -> Result<HandleRef, ServiceError>;
}
