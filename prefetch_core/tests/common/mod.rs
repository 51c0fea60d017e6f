//! Scripted content service shared by the loader, plan and executor tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use prefetch_core::{
    Catalog, ContentKey, ContentService, DownloadHandle, HandleRef, HandleStatus, Initialized,
    LoaderEvent, LoaderObserver, ServiceError,
};

/// How one key behaves once its download begins.
#[derive(Clone)]
pub struct KeyFixture {
    pub key: ContentKey,
    pub size: u64,
    /// Progress reported on successive polls; the handle completes once all
    /// of them have been read.
    pub steps: Vec<f32>,
    /// `Pending` means the handle never completes.
    pub outcome: HandleStatus,
}

impl KeyFixture {
    pub fn ok(key: &str, size: u64) -> Self {
        Self::scripted(key, size, vec![0.25, 0.5, 1.0], HandleStatus::Succeeded)
    }

    pub fn failing(key: &str, size: u64) -> Self {
        Self::scripted(key, size, vec![0.3, 0.6], HandleStatus::Failed)
    }

    pub fn stalled(key: &str, size: u64) -> Self {
        Self::scripted(key, size, vec![0.1], HandleStatus::Pending)
    }

    pub fn cached(key: &str) -> Self {
        Self::scripted(key, 0, vec![], HandleStatus::Succeeded)
    }

    pub fn scripted(key: &str, size: u64, steps: Vec<f32>, outcome: HandleStatus) -> Self {
        Self {
            key: ContentKey::new(key),
            size,
            steps,
            outcome,
        }
    }
}

pub struct FakeHandle {
    steps: Vec<f32>,
    outcome: HandleStatus,
    polls: AtomicUsize,
    releases: AtomicUsize,
}

impl FakeHandle {
    pub fn new(steps: Vec<f32>, outcome: HandleStatus) -> Self {
        Self {
            steps,
            outcome,
            polls: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.release_count() > 0
    }
}

impl DownloadHandle for FakeHandle {
    fn is_done(&self) -> bool {
        self.outcome != HandleStatus::Pending && self.polls.load(Ordering::SeqCst) >= self.steps.len()
    }

    fn progress(&self) -> f32 {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        self.steps
            .get(poll)
            .or_else(|| self.steps.last())
            .copied()
            .unwrap_or(0.0)
    }

    fn status(&self) -> HandleStatus {
        if self.is_done() {
            self.outcome
        } else {
            HandleStatus::Pending
        }
    }

    fn error(&self) -> Option<String> {
        (self.status() == HandleStatus::Failed).then(|| "scripted failure".to_string())
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeService {
    fixtures: Vec<KeyFixture>,
    no_catalog: bool,
    fail_size_query: bool,
    fail_begin: bool,
    init_handle: Option<Arc<FakeHandle>>,
    begun: Mutex<Vec<(ContentKey, Arc<FakeHandle>)>>,
    size_queries: AtomicUsize,
}

impl FakeService {
    pub fn with_keys(fixtures: Vec<KeyFixture>) -> Self {
        Self {
            fixtures,
            ..Self::default()
        }
    }

    /// `initialize` succeeds but reports no catalog.
    pub fn without_catalog() -> Self {
        Self {
            no_catalog: true,
            ..Self::default()
        }
    }

    pub fn failing_size_query(mut self) -> Self {
        self.fail_size_query = true;
        self
    }

    pub fn failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    /// `initialize` hands out this handle for the caller to release.
    pub fn with_init_handle(mut self, handle: Arc<FakeHandle>) -> Self {
        self.init_handle = Some(handle);
        self
    }

    pub fn begun_keys(&self) -> Vec<String> {
        self.begun
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.to_string())
            .collect()
    }

    /// Every handle handed out for `key`, oldest first.
    pub fn handles_for(&self, key: &str) -> Vec<Arc<FakeHandle>> {
        self.begun
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.as_str() == key)
            .map(|(_, h)| h.clone())
            .collect()
    }

    pub fn all_handles_released(&self) -> bool {
        self.begun
            .lock()
            .unwrap()
            .iter()
            .all(|(_, h)| h.is_released())
    }

    pub fn size_queries(&self) -> usize {
        self.size_queries.load(Ordering::SeqCst)
    }

    fn fixture(&self, key: &ContentKey) -> Result<&KeyFixture, ServiceError> {
        self.fixtures
            .iter()
            .find(|s| &s.key == key)
            .ok_or_else(|| ServiceError::UnknownKey(key.to_string()))
    }
}

#[async_trait]
impl ContentService for FakeService {
    async fn initialize(&self) -> Result<Option<Initialized>, ServiceError> {
        tokio::task::yield_now().await;
        if self.no_catalog {
            return Ok(None);
        }
        let mut initialized = Initialized::new(Catalog::new(self.fixtures.iter().map(|s| s.key.clone())));
        if let Some(handle) = &self.init_handle {
            initialized = initialized.with_handle(handle.clone());
        }
        Ok(Some(initialized))
    }

    async fn download_size(&self, key: &ContentKey) -> Result<u64, ServiceError> {
        self.size_queries.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_size_query {
            return Err(ServiceError::Other("size query failed".to_string()));
        }
        Ok(self.fixture(key)?.size)
    }

    async fn begin_download(&self, key: &ContentKey) -> Result<HandleRef, ServiceError> {
        if self.fail_begin {
            return Err(ServiceError::Other("cannot start download".to_string()));
        }
        let fixture = self.fixture(key)?;
        let handle = Arc::new(FakeHandle::new(fixture.steps.clone(), fixture.outcome));
        self.begun.lock().unwrap().push((key.clone(), handle.clone()));
        Ok(handle)
    }
}

/// Records every event in arrival order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LoaderEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<LoaderEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_values(&self) -> Vec<f32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LoaderEvent::ProgressChanged { progress } => Some(progress),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LoaderEvent::KeyCompleted { key, succeeded } => Some((key.to_string(), succeeded)),
                _ => None,
            })
            .collect()
    }

    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LoaderEvent::KeyStarted { key } => Some(key.to_string()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: LoaderEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl LoaderObserver for RecordingObserver {
    async fn on_calculating_download_size(&self) {
        self.push(LoaderEvent::CalculatingDownloadSize);
    }

    async fn on_download_size_calculated(&self, total_bytes: u64) {
        self.push(LoaderEvent::DownloadSizeCalculated { total_bytes });
    }

    async fn on_key_started(&self, key: &ContentKey) {
        self.push(LoaderEvent::KeyStarted { key: key.clone() });
    }

    async fn on_progress_changed(&self, progress: f32) {
        self.push(LoaderEvent::ProgressChanged { progress });
    }

    async fn on_key_completed(&self, key: &ContentKey, succeeded: bool) {
        self.push(LoaderEvent::KeyCompleted {
            key: key.clone(),
            succeeded,
        });
    }
}

/// Polls `cond` every millisecond until it holds; panics after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 5s");
}

pub fn assert_non_decreasing(values: &[f32]) {
    for pair in values.windows(2) {
        assert!(
            pair[0] <= pair[1],
            "progress went backwards: {} -> {} in {:?}",
            pair[0],
            pair[1],
            values
        );
    }
}
