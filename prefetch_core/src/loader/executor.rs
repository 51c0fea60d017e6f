use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::handles::ActiveHandles;
use crate::error::LoaderError;
use crate::progress::notifier::EventNotifier;
use crate::progress::ProgressAggregator;
use crate::service::content_service::{ContentService, HandleStatus};
use crate::types::{DownloadOutcome, DownloadPlan, PlanItem};

/// Drives a plan one item at a time.
///
/// A failed item is recorded and the batch moves on; a cancellation aborts
/// the batch and leaves the remaining items untouched. Each handle is leased
/// from the run's [`ActiveHandles`] and released before the next item starts.
pub struct DownloadExecutor<'a> {
    service: &'a dyn ContentService,
    notifier: &'a EventNotifier,
    handles: &'a ActiveHandles,
    poll_interval: Duration,
}

impl<'a> DownloadExecutor<'a> {
    pub fn new(
        service: &'a dyn ContentService,
        notifier: &'a EventNotifier,
        handles: &'a ActiveHandles,
        poll_interval: Duration,
    ) -> Self {
        Self {
            service,
            notifier,
            handles,
            poll_interval,
        }
    }

    /// Runs the whole plan; true only if every item succeeded.
    pub async fn execute_plan(
        &self,
        plan: &DownloadPlan,
        cancel: &CancellationToken,
    ) -> Result<bool, LoaderError> {
        let outcomes = self.execute(plan, cancel).await?;
        Ok(outcomes.iter().all(|o| o.succeeded))
    }

    /// Runs the whole plan and reports every item's outcome, in plan order.
    pub async fn execute(
        &self,
        plan: &DownloadPlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<DownloadOutcome>, LoaderError> {
        let mut progress = ProgressAggregator::new(plan.total_bytes());
        let mut outcomes = Vec::with_capacity(plan.len());

        for item in plan.items() {
            let outcome = self.download_item(item, &mut progress, cancel).await?;
            outcomes.push(outcome);
        }

        self.notifier.progress_changed(progress.finish()).await;

        let failed = outcomes.iter().filter(|o| !o.succeeded).count();
        if failed == 0 {
            log::info!("[executor] all {} keys downloaded", outcomes.len());
        } else {
            log::warn!(
                "[executor] {} of {} keys failed to download",
                failed,
                outcomes.len()
            );
        }
        Ok(outcomes)
    }

    async fn download_item(
        &self,
        item: &PlanItem,
        progress: &mut ProgressAggregator,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, LoaderError> {
        if cancel.is_cancelled() {
            return Err(LoaderError::Cancelled);
        }

        self.notifier.key_started(&item.key).await;
        let handle = self
            .handles
            .lease(self.service.begin_download(&item.key).await?);

        while !cancel.is_cancelled() && !handle.is_done() {
            let value = progress.update(handle.progress(), item.size_bytes);
            self.notifier.progress_changed(value).await;

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        if cancel.is_cancelled() {
            log::info!("[executor] key={}: cancelled mid-download", item.key);
            return Err(LoaderError::Cancelled);
        }

        let succeeded = match handle.status() {
            HandleStatus::Succeeded => {
                progress.complete_item(item.size_bytes);
                log::debug!("[executor] key={}: downloaded", item.key);
                true
            }
            status => {
                let failure = LoaderError::KeyDownloadFailed {
                    key: item.key.clone(),
                    reason: handle
                        .error()
                        .unwrap_or_else(|| format!("handle finished as {:?}", status)),
                };
                log::warn!("[executor] {}", failure);
                false
            }
        };
        drop(handle);

        self.notifier.key_completed(&item.key, succeeded).await;
        Ok(DownloadOutcome {
            key: item.key.clone(),
            succeeded,
        })
    }
}
