use tokio_util::sync::CancellationToken;

use crate::error::LoaderError;
use crate::progress::format_bytes;
use crate::service::content_service::ContentService;
use crate::types::{Catalog, DownloadPlan};

/// Queries the service for every catalog key, in order, and keeps the keys
/// that still need bytes.
///
/// Cancellation is checked before each query, so a long catalog holds off a
/// cancel for at most one query. Nothing on the service side is mutated.
pub async fn build_plan(
    service: &dyn ContentService,
    catalog: &Catalog,
    cancel: &CancellationToken,
) -> Result<DownloadPlan, LoaderError> {
    let mut plan = DownloadPlan::new();

    for key in catalog {
        if cancel.is_cancelled() {
            return Err(LoaderError::Cancelled);
        }

        let size = service.download_size(key).await?;
        if plan.push(key.clone(), size) {
            log::debug!("[plan] key={}: {} to download", key, format_bytes(size));
        } else {
            log::debug!("[plan] key={}: already available", key);
        }
    }

    log::info!(
        "[plan] {} of {} keys need downloading ({})",
        plan.len(),
        catalog.len(),
        format_bytes(plan.total_bytes())
    );
    Ok(plan)
}

/// Total bytes required for the whole catalog, without building a plan.
///
/// Goes through the service's batch query; used for pre-flight consent
/// prompts rather than by a run.
pub async fn total_download_size(
    service: &dyn ContentService,
    catalog: &Catalog,
    cancel: &CancellationToken,
) -> Result<u64, LoaderError> {
    if cancel.is_cancelled() {
        return Err(LoaderError::Cancelled);
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(LoaderError::Cancelled),
        total = service.total_download_size(catalog.keys()) => Ok(total?),
    }
}
