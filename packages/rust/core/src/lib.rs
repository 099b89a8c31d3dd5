//! Config marketplace and webhook processing for the Hybrid CI/CD platform.
//!
//! This crate wires the concrete stages into chains (config discovery,
//! webhook events) and wraps the discovery chain in an in-memory,
//! TTL-cached [`MarketplaceService`].

pub mod cache;
pub mod discovery_chain;
pub mod input;
pub mod links;
pub mod marketplace;
pub mod mock;
pub mod webhook;

pub use cache::TtlCache;
pub use discovery_chain::{
    BatchResult, ConfigDiscoveryChain, FailedConfig, ProcessResult, ProcessedConfig,
};
pub use input::ContributionInput;
pub use marketplace::{ConfigFilters, LoadSummary, MarketplaceService, MarketplaceStats, SortBy};
pub use webhook::{
    InMemoryWebhookStore, WebhookEvent, WebhookEventChain, WebhookEventStore, WebhookOutcome,
};
