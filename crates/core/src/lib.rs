//! Mergeline core library.
//!
//! This crate provides the components for sequential branch integration:
//! configuration, the repository gateway, conflict classification and
//! automatic resolution, the merge engine, report artifacts, and the
//! advisory shared-state digest.

pub mod config;
pub mod conflict;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod insight;
pub mod models;
pub mod report;

// Re-exports for convenience.
pub use config::EngineConfig;
pub use engine::MergeEngine;
pub use gateway::{GitGateway, RepositoryGateway};
pub use insight::InsightSummarizer;
pub use report::ReportEmitter;
