use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::executor::DownloadExecutor;
use super::handles::ActiveHandles;
use super::plan_builder::{build_plan, total_download_size};
use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::progress::format_bytes;
use crate::progress::notifier::EventNotifier;
use crate::progress::observer::LoaderObserver;
use crate::service::content_service::{ContentService, Initialized};

/// Where the loader currently is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderPhase {
    Idle,
    Initializing,
    Planning,
    Executing,
}

/// State owned by the single live run.
#[derive(Clone)]
struct RunState {
    id: Uuid,
    cancel: CancellationToken,
    handles: Arc<ActiveHandles>,
}

/// Downloads every catalog key that is not yet available locally.
///
/// One run at a time: a `load_all` issued while another is in flight is
/// rejected without side effects. The loader is meant to be shared behind an
/// `Arc` so that `cancel_download` can be called from another task while
/// `load_all` is awaited.
///
/// # Lifecycle
///
/// | Phase          | Events emitted                                          |
/// |----------------|---------------------------------------------------------|
/// | `Initializing` | none                                                    |
/// | `Planning`     | `calculating_download_size`, `download_size_calculated` |
/// | `Executing`    | `key_started`, `progress_changed`, `key_completed`      |
/// | end of run     | final `progress_changed(1.0)` unless aborted            |
pub struct ContentLoader {
    service: Arc<dyn ContentService>,
    notifier: EventNotifier,
    config: LoaderConfig,
    is_loading: AtomicBool,
    phase: Mutex<LoaderPhase>,
    run: Mutex<Option<RunState>>,
}

impl ContentLoader {
    pub fn new(service: Arc<dyn ContentService>, config: LoaderConfig) -> Self {
        Self {
            service,
            notifier: EventNotifier::new(),
            config,
            is_loading: AtomicBool::new(false),
            phase: Mutex::new(LoaderPhase::Idle),
            run: Mutex::new(None),
        }
    }

    /// Register an observer. Must be called before the loader is shared.
    pub fn add_observer(&mut self, observer: Arc<dyn LoaderObserver>) {
        self.notifier.add_observer(observer);
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> LoaderPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles held by the active run (0 when idle).
    pub fn active_handle_count(&self) -> usize {
        self.run_slot().as_ref().map_or(0, |run| run.handles.len())
    }

    /// Initializes the service, plans and downloads every key that needs it.
    ///
    /// Returns true only if every planned key was downloaded. Cancellation
    /// (through `cancel` or [`ContentLoader::cancel_download`]), an
    /// initialization failure and any service error all end the run with
    /// false; they are told apart in the logs only.
    pub async fn load_all(&self, cancel: &CancellationToken) -> bool {
        if self
            .is_loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("[loader] load_all requested while a run is already in progress");
            return false;
        }

        let run = RunState {
            id: Uuid::new_v4(),
            cancel: cancel.child_token(),
            handles: Arc::new(ActiveHandles::new()),
        };
        *self.run_slot() = Some(run.clone());
        let _guard = RunGuard {
            loader: self,
            run: run.clone(),
        };

        log::info!("[loader] run={}: starting", run.id);
        match self.run_phases(&run).await {
            Ok(true) => {
                log::info!("[loader] run={}: all content available", run.id);
                true
            }
            Ok(false) => {
                log::warn!("[loader] run={}: finished with failed keys", run.id);
                false
            }
            Err(LoaderError::Cancelled) => {
                log::info!("[loader] run={}: cancelled", run.id);
                false
            }
            Err(LoaderError::InitializationFailed) => {
                log::error!("[loader] run={}: content service initialization failed", run.id);
                false
            }
            Err(e) => {
                log::error!("[loader] run={}: aborted: {:?}", run.id, e);
                false
            }
        }
    }

    async fn run_phases(&self, run: &RunState) -> Result<bool, LoaderError> {
        self.set_phase(LoaderPhase::Initializing);
        let catalog = {
            let initialized = self.initialize(&run.cancel).await?;
            if let Some(handle) = initialized.handle {
                run.handles.register(handle);
            }
            initialized.catalog
        };
        log::debug!("[loader] run={}: catalog has {} keys", run.id, catalog.len());

        self.set_phase(LoaderPhase::Planning);
        self.notifier.calculating_download_size().await;
        let plan = build_plan(self.service.as_ref(), &catalog, &run.cancel).await?;
        self.notifier.download_size_calculated(plan.total_bytes()).await;

        if plan.is_empty() {
            self.notifier.progress_changed(1.0).await;
            return Ok(true);
        }

        log::info!(
            "[loader] run={}: downloading {} keys ({})",
            run.id,
            plan.len(),
            format_bytes(plan.total_bytes())
        );
        self.set_phase(LoaderPhase::Executing);
        DownloadExecutor::new(
            self.service.as_ref(),
            &self.notifier,
            &run.handles,
            self.config.poll_interval,
        )
        .execute_plan(&plan, &run.cancel)
        .await
    }

    async fn initialize(&self, cancel: &CancellationToken) -> Result<Initialized, LoaderError> {
        if cancel.is_cancelled() {
            return Err(LoaderError::Cancelled);
        }
        let initialized = self.service.initialize().await?;
        if cancel.is_cancelled() {
            // the service may have handed out a handle we are not going to keep
            if let Some(handle) = initialized.as_ref().and_then(|i| i.handle.as_ref()) {
                handle.release();
            }
            return Err(LoaderError::Cancelled);
        }
        initialized.ok_or(LoaderError::InitializationFailed)
    }

    /// Requests cancellation of the active run. No-op when idle or already
    /// cancelled.
    pub fn cancel_download(&self) {
        let run = self.run_slot();
        if let Some(run) = run.as_ref() {
            if !run.cancel.is_cancelled() {
                log::info!("[loader] run={}: cancellation requested", run.id);
                run.cancel.cancel();
            }
        }
    }

    /// Bytes the next `load_all` would download.
    ///
    /// Runs its own initialize and batch size query without touching the
    /// active run, so it may be called at any time. Advisory only: every
    /// failure, cancellation included, is logged and reported as 0.
    pub async fn get_total_download_size(&self, cancel: &CancellationToken) -> u64 {
        match self.query_total_size(cancel).await {
            Ok(total) => total,
            Err(e) => {
                log::warn!("[loader] total download size unavailable: {}", e);
                0
            }
        }
    }

    async fn query_total_size(&self, cancel: &CancellationToken) -> Result<u64, LoaderError> {
        let initialized = self.initialize(cancel).await?;
        let handles = ActiveHandles::new();
        let _init_lease = initialized.handle.map(|h| handles.lease(h));
        total_download_size(self.service.as_ref(), &initialized.catalog, cancel).await
    }

    /// Cancels the active run, if any, and releases every handle it holds.
    /// Safe to call any number of times.
    pub fn shutdown(&self) {
        let run = self.run_slot().clone();
        if let Some(run) = run {
            if !run.cancel.is_cancelled() {
                run.cancel.cancel();
            }
            let released = run.handles.release_all();
            log::info!(
                "[loader] run={}: shut down, released {} handles",
                run.id,
                released
            );
        }
    }

    fn set_phase(&self, phase: LoaderPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn run_slot(&self) -> MutexGuard<'_, Option<RunState>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ContentLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Tears a run down on every exit path out of `load_all`, including the
/// future being dropped mid-run.
struct RunGuard<'a> {
    loader: &'a ContentLoader,
    run: RunState,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let released = self.run.handles.release_all();
        if released > 0 {
            log::debug!(
                "[loader] run={}: released {} leftover handles",
                self.run.id,
                released
            );
        }
        *self.loader.run_slot() = None;
        self.loader.set_phase(LoaderPhase::Idle);
        self.loader.is_loading.store(false, Ordering::Release);
    }
}
