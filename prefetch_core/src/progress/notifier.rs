use std::sync::Arc;

use super::observer::LoaderObserver;
use crate::types::ContentKey;

/// Fans loader events out to all registered observers.
///
/// Observers are awaited one after the other; a slow observer slows the run
/// down, it never reorders events for the others.
#[derive(Clone, Default)]
pub struct EventNotifier {
    observers: Vec<Arc<dyn LoaderObserver>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn LoaderObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub async fn calculating_download_size(&self) {
        for observer in &self.observers {
            observer.on_calculating_download_size().await;
        }
    }

    pub async fn download_size_calculated(&self, total_bytes: u64) {
        for observer in &self.observers {
            observer.on_download_size_calculated(total_bytes).await;
        }
    }

    pub async fn key_started(&self, key: &ContentKey) {
        for observer in &self.observers {
            observer.on_key_started(key).await;
        }
    }

    pub async fn progress_changed(&self, progress: f32) {
        for observer in &self.observers {
            observer.on_progress_changed(progress).await;
        }
    }

    pub async fn key_completed(&self, key: &ContentKey, succeeded: bool) {
        for observer in &self.observers {
            observer.on_key_completed(key, succeeded).await;
        }
    }
}
