pub mod cache_path;
pub mod content_service;
pub mod http_content_service;
pub mod manifest;
