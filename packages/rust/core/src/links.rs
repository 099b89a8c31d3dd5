//! Stages of the config discovery chain.
//!
//! parse → validate → enrich → build → preview. Each stage reads the keys
//! its predecessors inserted (see [`keys`]) and adds its own.

use chrono::Utc;
use hybridci_chain::{Context, Link};
use hybridci_shared::{
    ConfigCategory, ConfigMetrics, ConfigPreview, ConfigRecord, ConfigType, HybridCiError,
    Lineage, Result,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::input::ContributionInput;

/// Context keys used by the config discovery chain.
pub mod keys {
    /// [`ContributionInput`](crate::input::ContributionInput), set by the caller.
    pub const INPUT: &str = "input";
    /// Parsed manifest tree (`serde_json::Value`).
    pub const MANIFEST: &str = "manifest";
    /// `bool` validation verdict.
    pub const VALID: &str = "valid";
    /// `Vec<String>` validation errors, in check order.
    pub const ERRORS: &str = "errors";
    /// Canonical [`ConfigMetrics`](hybridci_shared::ConfigMetrics).
    pub const METRICS: &str = "metrics";
    /// Built [`ConfigRecord`](hybridci_shared::ConfigRecord).
    pub const RECORD: &str = "record";
    /// [`ConfigPreview`](hybridci_shared::ConfigPreview) projection.
    pub const PREVIEW: &str = "preview";
}

/// Version assumed when a manifest does not declare one.
const DEFAULT_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Deserializes the raw manifest text.
pub struct ParseConfigLink;

#[async_trait::async_trait]
impl Link for ParseConfigLink {
    async fn call(&self, ctx: Context) -> Result<Context> {
        let input = ctx.require::<ContributionInput>(keys::INPUT)?;

        let manifest: Value = serde_yaml::from_str(&input.yaml_content).map_err(|e| {
            HybridCiError::parse(format!("Failed to parse config {}: {e}", input.id))
        })?;

        debug!(id = %input.id, "manifest parsed");
        Ok(ctx.insert(keys::MANIFEST, manifest))
    }
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

/// Checks required fields; failures are recorded, never raised.
pub struct ValidateConfigLink;

/// Required `metadata` sub-fields, in check order.
const REQUIRED_METADATA_FIELDS: [&str; 3] = ["id", "name", "category"];

#[async_trait::async_trait]
impl Link for ValidateConfigLink {
    async fn call(&self, ctx: Context) -> Result<Context> {
        let manifest = ctx.require::<Value>(keys::MANIFEST)?;
        let errors = validate_manifest(manifest);

        debug!(valid = errors.is_empty(), errors = errors.len(), "manifest validated");
        Ok(ctx
            .insert(keys::VALID, errors.is_empty())
            .insert(keys::ERRORS, errors))
    }
}

/// Collect one message per missing required field.
fn validate_manifest(manifest: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let metadata = manifest.get("metadata").filter(|v| is_present(v));

    if metadata.is_none() {
        errors.push(missing("metadata"));
    }
    if !manifest.get("type").is_some_and(is_present) {
        errors.push(missing("type"));
    }
    if let Some(metadata) = metadata {
        for field in REQUIRED_METADATA_FIELDS {
            if !metadata.get(field).is_some_and(is_present) {
                errors.push(missing(&format!("metadata.{field}")));
            }
        }
    }
    errors
}

fn missing(field: &str) -> String {
    format!("Missing required field: {field}")
}

/// Null and empty strings count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Enrich
// ---------------------------------------------------------------------------

/// Normalizes externally supplied metrics, zero-filling absent counters.
pub struct EnrichMetricsLink;

#[async_trait::async_trait]
impl Link for EnrichMetricsLink {
    async fn call(&self, ctx: Context) -> Result<Context> {
        let input = ctx.require::<ContributionInput>(keys::INPUT)?;
        let metrics = ConfigMetrics::from(&input.metrics);
        Ok(ctx.insert(keys::METRICS, metrics))
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Assembles the canonical [`ConfigRecord`] from a validated manifest.
pub struct BuildRecordLink;

#[async_trait::async_trait]
impl Link for BuildRecordLink {
    async fn call(&self, ctx: Context) -> Result<Context> {
        if !*ctx.require::<bool>(keys::VALID)? {
            let errors = ctx.get::<Vec<String>>(keys::ERRORS).cloned().unwrap_or_default();
            return Err(HybridCiError::validation(format!(
                "cannot build record from invalid config: {}",
                errors.join(", ")
            )));
        }

        let input = ctx.require::<ContributionInput>(keys::INPUT)?;
        let manifest = ctx.require::<Value>(keys::MANIFEST)?;
        let metrics = *ctx.require::<ConfigMetrics>(keys::METRICS)?;
        let record = build_record(input, manifest, metrics);

        debug!(id = %record.id, category = %record.category, "record built");
        Ok(ctx.insert(keys::RECORD, record))
    }
}

fn build_record(
    input: &ContributionInput,
    manifest: &Value,
    metrics: ConfigMetrics,
) -> ConfigRecord {
    let metadata = &manifest["metadata"];
    let field = |name: &str| scalar_string(&metadata[name]);

    let mut author = input.author.clone();
    if author.login.is_empty() {
        author.login = field("author").unwrap_or_default();
    }

    let now = Utc::now();
    ConfigRecord {
        id: field("id").unwrap_or_else(|| input.id.clone()),
        name: field("name").unwrap_or_default(),
        description: field("description").unwrap_or_default(),
        category: ConfigCategory::coerce(&field("category").unwrap_or_default()),
        config_type: ConfigType::coerce(&scalar_string(&manifest["type"]).unwrap_or_default()),
        version: field("version").unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        tags: string_list(&metadata["tags"]),
        source: input.source.clone(),
        author,
        metrics,
        license: field("license").or_else(|| input.license.clone()),
        lineage: Lineage {
            forked_from: field("forked_from"),
            parent_version: field("parent_version"),
        },
        content_hash: content_hash(&input.yaml_content),
        is_featured: input.is_featured,
        quality_score: input.quality_score.clamp(0.0, 1.0),
        created_at: now,
        updated_at: now,
    }
}

/// Render a scalar YAML value as text; YAML happily reads `id: 42` as a number.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(scalar_string).collect())
        .unwrap_or_default()
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Projects the built record into its listing shape.
pub struct CreatePreviewLink;

#[async_trait::async_trait]
impl Link for CreatePreviewLink {
    async fn call(&self, ctx: Context) -> Result<Context> {
        let record = ctx.require::<ConfigRecord>(keys::RECORD)?;
        let preview = ConfigPreview::from(record);
        Ok(ctx.insert(keys::PREVIEW, preview))
    }
}
