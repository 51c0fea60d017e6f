use async_trait::async_trait;

use crate::types::ContentKey;

/// Trait for anything that wants to follow a loader run.
///
/// The loader calls these on every registered observer, in this relative
/// order per run:
/// - `on_calculating_download_size` once, before the plan is built.
/// - `on_download_size_calculated` once, with the plan's total bytes.
/// - For each planned key: `on_key_started`, zero or more
///   `on_progress_changed`, then `on_key_completed`.
/// - A final `on_progress_changed(1.0)`.
///
/// Every method defaults to a no-op so observers only implement what they
/// render. Delivery order across observers is unspecified.
#[async_trait]
pub trait LoaderObserver: Send + Sync + 'static {
    async fn on_calculating_download_size(&self) {}

    async fn on_download_size_calculated(&self, _total_bytes: u64) {}

    async fn on_key_started(&self, _key: &ContentKey) {}

    /// Normalized run progress in `[0.0, 1.0]`, non-decreasing within a run.
    async fn on_progress_changed(&self, _progress: f32) {}

    async fn on_key_completed(&self, _key: &ContentKey, _succeeded: bool) {}
}
