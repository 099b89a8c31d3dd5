//! Shared types, error model, and configuration for the marketplace crates.
//!
//! This crate is the foundation depended on by all other workspace crates.
//! It provides:
//! - [`HybridCiError`], the unified error type
//! - Domain types ([`ConfigRecord`], [`ConfigPreview`], [`ConfigMetrics`], ...)
//! - Configuration ([`AppConfig`], [`MarketplaceSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GitHubConfig, MarketplaceConfig, MarketplaceSettings, config_dir,
    config_file_path, github_token, init_config, load_config, load_config_from,
};
pub use error::{HybridCiError, Result};
pub use types::{
    Author, ConfigCategory, ConfigMetrics, ConfigPreview, ConfigRecord, ConfigSource, ConfigType,
    Lineage, RawMetrics, TRENDING_DOWNLOAD_THRESHOLD,
};
