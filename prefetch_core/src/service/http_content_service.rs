use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::cache_path::{cached_file, partial_file};
use super::content_service::{ContentService, DownloadHandle, HandleRef, HandleStatus, Initialized};
use super::manifest::{Manifest, ManifestEntry};
use crate::config::HttpServiceConfig;
use crate::error::ServiceError;
use crate::progress::format_bytes;
use crate::types::ContentKey;

/// Write buffer for streamed bodies.
const WRITE_BUFFER_BYTES: usize = 256 * 1024;

/// Content service that resolves keys through a JSON manifest and downloads
/// them over HTTP into a local cache directory.
///
/// A key whose file already exists in the cache needs 0 bytes. Each download
/// streams into its own partial file and is renamed into place once complete,
/// so a cached file is always whole.
pub struct HttpContentService {
    config: HttpServiceConfig,
    client: Client,
    manifest: RwLock<Option<Arc<Manifest>>>,
}

impl HttpContentService {
    pub fn new(config: HttpServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .build()?;
        Ok(Self {
            config,
            client,
            manifest: RwLock::new(None),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    fn manifest(&self) -> Result<Arc<Manifest>, ServiceError> {
        self.manifest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ServiceError::Other("content service is not initialized".to_string()))
    }

    fn lookup(&self, key: &ContentKey) -> Result<(Arc<Manifest>, ManifestEntry), ServiceError> {
        let manifest = self.manifest()?;
        let entry = manifest
            .entry(key)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownKey(key.to_string()))?;
        Ok((manifest, entry))
    }
}

#[async_trait]
impl ContentService for HttpContentService {
    /// Loads the manifest and makes sure the cache directory exists.
    async fn initialize(&self) -> Result<Option<Initialized>, ServiceError> {
        let Some(manifest) = Manifest::load(&self.config.manifest_path).await? else {
            log::warn!(
                "[http_service] manifest {:?} not found",
                self.config.manifest_path
            );
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.config.cache_dir).await?;

        let catalog = manifest.catalog();
        log::info!(
            "[http_service] manifest loaded: {} keys, cache at {:?}",
            catalog.len(),
            self.config.cache_dir
        );
        *self.manifest.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(manifest));
        Ok(Some(Initialized::new(catalog)))
    }

    async fn download_size(&self, key: &ContentKey) -> Result<u64, ServiceError> {
        let (manifest, entry) = self.lookup(key)?;

        if tokio::fs::try_exists(cached_file(&self.config.cache_dir, key.as_str())).await? {
            return Ok(0);
        }
        if let Some(size) = entry.size {
            return Ok(size);
        }

        let size = probe_size(&self.client, &manifest, &entry.url).await?;
        log::debug!("[http_service] key={}: probed {}", key, format_bytes(size));
        Ok(size)
    }

    async fn begin_download(&self, key: &ContentKey) -> Result<HandleRef, ServiceError> {
        let (manifest, entry) = self.lookup(key)?;
        Ok(Arc::new(HttpDownloadHandle::spawn(
            self.client.clone(),
            manifest,
            entry,
            self.config.cache_dir.clone(),
        )))
    }
}

/// Applies manifest headers and the precomputed auth value to a request.
///
/// Skips any `Range` header; probing sets its own.
fn apply_headers(
    mut builder: reqwest::RequestBuilder,
    headers: &HashMap<String, Vec<String>>,
    precomputed_auth: Option<&str>,
) -> reqwest::RequestBuilder {
    for (key, values) in headers {
        if key.eq_ignore_ascii_case("range") {
            continue;
        }
        for value in values {
            builder = builder.header(key, value);
        }
    }
    if let Some(auth_value) = precomputed_auth {
        builder = builder.header("Authorization", auth_value);
    }
    builder
}

/// Pre-computes the Basic auth header value, if authentication is configured.
fn precompute_auth(manifest: &Manifest) -> Option<String> {
    manifest.auth.as_ref().map(|auth| {
        let credentials = format!("{}:{}", auth.username, auth.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&credentials);
        format!("Basic {}", encoded)
    })
}

/// Determines the size of `url` with a `Range: bytes=0-0` request.
///
/// The size comes from `Content-Range` when the server honours the range,
/// otherwise from `Content-Length`.
async fn probe_size(client: &Client, manifest: &Manifest, url: &str) -> Result<u64, ServiceError> {
    let auth = precompute_auth(manifest);
    let response = apply_headers(client.get(url), &manifest.headers, auth.as_deref())
        .header("Range", "bytes=0-0")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ServiceError::Http {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    response
        .headers()
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.rsplit('/').next())
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| response.content_length())
        .ok_or_else(|| ServiceError::Other(format!("{} did not report a size", url)))
}

/// Shared between a handle and its transfer task.
#[derive(Default)]
struct TransferState {
    downloaded: AtomicU64,
    total: AtomicU64,
    /// `None` while the transfer runs.
    outcome: Mutex<Option<Result<(), String>>>,
}

impl TransferState {
    fn outcome(&self) -> Option<Result<(), String>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Records the outcome unless one is already set.
    fn finish(&self, outcome: Result<(), String>) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
        }
    }
}

/// Handle onto one background HTTP transfer.
///
/// Releasing cancels and aborts the transfer task. An unfinished partial file
/// is removed when the task is dropped, so an aborted write leaves nothing
/// behind.
pub struct HttpDownloadHandle {
    state: Arc<TransferState>,
    cancel: CancellationToken,
    task: AbortHandle,
}

impl HttpDownloadHandle {
    fn spawn(client: Client, manifest: Arc<Manifest>, entry: ManifestEntry, cache_dir: PathBuf) -> Self {
        let state = Arc::new(TransferState::default());
        let cancel = CancellationToken::new();

        let task_state = Arc::clone(&state);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let key = entry.key.clone();
            let part_path = partial_file(&cache_dir, key.as_str(), Uuid::new_v4());
            let result = fetch_to_cache(
                &client,
                &manifest,
                &entry,
                &cache_dir,
                &part_path,
                &task_state,
                &task_cancel,
            )
            .await;
            match result {
                Ok(()) => {
                    log::info!(
                        "[http_service] key={}: downloaded {}",
                        key,
                        format_bytes(task_state.downloaded.load(Ordering::Acquire))
                    );
                    task_state.finish(Ok(()));
                }
                Err(e) => {
                    log::warn!("[http_service] key={}: {}", key, e);
                    task_state.finish(Err(e.to_string()));
                }
            }
        });

        Self {
            state,
            cancel,
            task: task.abort_handle(),
        }
    }
}

impl DownloadHandle for HttpDownloadHandle {
    fn is_done(&self) -> bool {
        self.state.outcome().is_some()
    }

    fn progress(&self) -> f32 {
        if let Some(Ok(())) = self.state.outcome() {
            return 1.0;
        }
        let total = self.state.total.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        let downloaded = self.state.downloaded.load(Ordering::Acquire);
        (downloaded as f64 / total as f64).clamp(0.0, 1.0) as f32
    }

    fn status(&self) -> HandleStatus {
        match self.state.outcome() {
            None => HandleStatus::Pending,
            Some(Ok(())) => HandleStatus::Succeeded,
            Some(Err(_)) => HandleStatus::Failed,
        }
    }

    fn error(&self) -> Option<String> {
        self.state.outcome().and_then(Result::err)
    }

    fn release(&self) {
        self.cancel.cancel();
        self.task.abort();
        self.state.finish(Err(ServiceError::Released.to_string()));
    }
}

/// Removes a partial file on drop unless it was moved into the cache.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            keep: false,
        }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Streams `entry` into `part_path` and renames it into the cache.
async fn fetch_to_cache(
    client: &Client,
    manifest: &Manifest,
    entry: &ManifestEntry,
    cache_dir: &Path,
    part_path: &Path,
    state: &TransferState,
    cancel: &CancellationToken,
) -> Result<(), ServiceError> {
    let key = entry.key.as_str();
    let auth = precompute_auth(manifest);
    let request = apply_headers(client.get(&entry.url), &manifest.headers, auth.as_deref());

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ServiceError::Released),
        response = request.send() => response?,
    };
    if !response.status().is_success() {
        return Err(ServiceError::Http {
            url: entry.url.clone(),
            status: response.status().as_u16(),
        });
    }

    let total = entry.size.or_else(|| response.content_length()).unwrap_or(0);
    state.total.store(total, Ordering::Release);

    let mut partial = PartialFile::new(part_path);
    let file = tokio::fs::File::create(part_path).await?;
    let mut writer = tokio::io::BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    let mut stream = response.bytes_stream();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(ServiceError::Released),
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(chunk) => {
                let chunk = chunk?;
                writer.write_all(&chunk).await?;
                state.downloaded.fetch_add(chunk.len() as u64, Ordering::AcqRel);
            }
            None => break,
        }
    }

    writer.flush().await?;
    drop(writer);
    tokio::fs::rename(part_path, cached_file(cache_dir, key)).await?;
    partial.keep = true;
    Ok(())
}
