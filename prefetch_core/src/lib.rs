pub mod cancellation;
pub mod config;
pub mod error;
pub mod loader;
pub mod progress;
pub mod service;
pub mod types;

pub use config::{HttpServiceConfig, LoaderConfig};
pub use error::{LoaderError, ServiceError};
pub use loader::content_loader::{ContentLoader, LoaderPhase};
pub use progress::event::{EventChannelObserver, LoaderEvent};
pub use progress::observer::LoaderObserver;
pub use service::content_service::{ContentService, DownloadHandle, HandleRef, HandleStatus, Initialized};
pub use types::{Catalog, ContentKey, DownloadOutcome, DownloadPlan, PlanItem};
