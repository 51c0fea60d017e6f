pub mod content_loader;
pub mod executor;
pub mod handles;
pub mod plan_builder;
