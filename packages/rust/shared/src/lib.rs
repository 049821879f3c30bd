//! Shared types, error model, and configuration for the absorber.
//!
//! This crate is the foundation depended on by all other absorber crates.
//! It provides:
//! - [`AbsorberError`] — the unified error type
//! - Domain types ([`Input`], [`ExtractedDocument`], [`ConflictRecord`], [`PipelineResult`])
//! - Configuration ([`AppConfig`], runtime configs, browser path resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserConfig, ConflictConfig, DESKTOP_USER_AGENT, ExtractConfig, FetchConfig,
    PipelineConfig, browser_candidates, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_browser_executable, resolve_workers, save_config_to,
};
pub use error::{AbsorberError, Result};
pub use types::{
    Capability, ConflictKind, ConflictRecord, DocumentMeta, ExtractedDocument, FetchResult,
    FetchStrategy, Input, InputEntry, InputOutcome, InputSpec, PipelineResult, ResourceLoader,
    UnitError, UnitKind, UnitResult,
};
