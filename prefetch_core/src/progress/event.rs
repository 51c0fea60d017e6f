use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use super::observer::LoaderObserver;
use crate::types::ContentKey;

/// One observable step of a loader run, in serializable form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoaderEvent {
    CalculatingDownloadSize,
    DownloadSizeCalculated { total_bytes: u64 },
    KeyStarted { key: ContentKey },
    ProgressChanged { progress: f32 },
    KeyCompleted { key: ContentKey, succeeded: bool },
}

/// Observes loader events and rebroadcasts them on a `broadcast` channel so
/// that any number of consumers can follow a run via `rx.recv().await`.
///
/// Slow receivers lag rather than stall the loader.
pub struct EventChannelObserver {
    tx: broadcast::Sender<LoaderEvent>,
}

impl EventChannelObserver {
    /// Creates the observer (to be registered with the loader) and a first
    /// receiver. More receivers come from [`EventChannelObserver::subscribe`].
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<LoaderEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: LoaderEvent) {
        // send() only fails when no receiver is alive; nobody is listening then.
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl LoaderObserver for EventChannelObserver {
    async fn on_calculating_download_size(&self) {
        self.publish(LoaderEvent::CalculatingDownloadSize);
    }

    async fn on_download_size_calculated(&self, total_bytes: u64) {
        self.publish(LoaderEvent::DownloadSizeCalculated { total_bytes });
    }

    async fn on_key_started(&self, key: &ContentKey) {
        self.publish(LoaderEvent::KeyStarted { key: key.clone() });
    }

    async fn on_progress_changed(&self, progress: f32) {
        self.publish(LoaderEvent::ProgressChanged { progress });
    }

    async fn on_key_completed(&self, key: &ContentKey, succeeded: bool) {
        self.publish(LoaderEvent::KeyCompleted {
            key: key.clone(),
            succeeded,
        });
    }
}
