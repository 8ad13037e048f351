//! Shared types, error model, and configuration for Saturator.
//!
//! This crate is the foundation depended on by all other Saturator crates.
//! It provides:
//! - [`SaturatorError`] — the unified error type
//! - Domain types ([`Job`], [`JobDocument`], [`AccountRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchSection, PipelineConfig, PipelineSection, RotationSection, ServerConfig,
    load_config, load_config_from,
};
pub use error::{Result, SaturatorError};
pub use types::{AccountRecord, Job, JobDocument, RunId};
