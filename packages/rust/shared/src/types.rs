//! Core domain types for marketplace config contributions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A config counts as trending once its downloads pass this many.
pub const TRENDING_DOWNLOAD_THRESHOLD: u64 = 100;

// ---------------------------------------------------------------------------
// Closed-set enums
// ---------------------------------------------------------------------------

/// Marketplace category of a config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigCategory {
    CiCd,
    Deployment,
    Testing,
    Security,
    Monitoring,
    Infrastructure,
    Notifications,
    Other,
}

impl ConfigCategory {
    /// Every known category, in display order.
    pub const ALL: [ConfigCategory; 8] = [
        Self::CiCd,
        Self::Deployment,
        Self::Testing,
        Self::Security,
        Self::Monitoring,
        Self::Infrastructure,
        Self::Notifications,
        Self::Other,
    ];

    /// Wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CiCd => "ci-cd",
            Self::Deployment => "deployment",
            Self::Testing => "testing",
            Self::Security => "security",
            Self::Monitoring => "monitoring",
            Self::Infrastructure => "infrastructure",
            Self::Notifications => "notifications",
            Self::Other => "other",
        }
    }

    /// Map a manifest value onto the closed set, falling back to `Other`.
    pub fn coerce(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == value)
            .unwrap_or(Self::Other)
    }
}

impl std::fmt::Display for ConfigCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfigCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// Kind of artifact a config contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigType {
    Tool,
    Workflow,
    Template,
    Integration,
    Plugin,
}

impl ConfigType {
    /// Every known type.
    pub const ALL: [ConfigType; 5] = [
        Self::Tool,
        Self::Workflow,
        Self::Template,
        Self::Integration,
        Self::Plugin,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Workflow => "workflow",
            Self::Template => "template",
            Self::Integration => "integration",
            Self::Plugin => "plugin",
        }
    }

    /// Map a manifest value onto the closed set, falling back to `Tool`.
    pub fn coerce(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .unwrap_or(Self::Tool)
    }
}

impl std::fmt::Display for ConfigType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfigType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown config type '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// Where a contribution's manifest lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    /// Repository web URL.
    pub repo_url: String,
    /// `owner/name` slug, when the source is a GitHub repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Manifest path inside the repository.
    #[serde(default)]
    pub path: String,
    /// Branch the manifest was read from.
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".into()
}

/// Contributor identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

/// Metrics as supplied by an external source; any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetrics {
    #[serde(default)]
    pub stars: Option<u64>,
    #[serde(default)]
    pub forks: Option<u64>,
    #[serde(default)]
    pub issues: Option<u64>,
    #[serde(default)]
    pub watchers: Option<u64>,
    #[serde(default)]
    pub downloads: Option<u64>,
}

/// Canonical metrics shape with every counter present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMetrics {
    pub stars: u64,
    pub forks: u64,
    pub issues: u64,
    pub watchers: u64,
    pub downloads: u64,
}

impl From<&RawMetrics> for ConfigMetrics {
    fn from(raw: &RawMetrics) -> Self {
        Self {
            stars: raw.stars.unwrap_or(0),
            forks: raw.forks.unwrap_or(0),
            issues: raw.issues.unwrap_or(0),
            watchers: raw.watchers.unwrap_or(0),
            downloads: raw.downloads.unwrap_or(0),
        }
    }
}

/// Ancestry of a config (fork source, previous version).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<String>,
}

// ---------------------------------------------------------------------------
// ConfigRecord / ConfigPreview
// ---------------------------------------------------------------------------

/// Canonical internal representation of an ingested contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ConfigCategory,
    #[serde(rename = "type")]
    pub config_type: ConfigType,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: ConfigSource,
    pub author: Author,
    pub metrics: ConfigMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default)]
    pub lineage: Lineage,
    /// SHA-256 of the manifest text the record was built from.
    pub content_hash: String,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// UI-facing projection of a [`ConfigRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigPreview {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ConfigCategory,
    #[serde(rename = "type")]
    pub config_type: ConfigType,
    pub tags: Vec<String>,
    pub author: String,
    pub author_avatar: Option<String>,
    pub stars: u64,
    pub downloads: u64,
    pub quality_score: f64,
    pub is_featured: bool,
    pub is_trending: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&ConfigRecord> for ConfigPreview {
    fn from(record: &ConfigRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            category: record.category,
            config_type: record.config_type,
            tags: record.tags.clone(),
            author: record.author.login.clone(),
            author_avatar: record.author.avatar_url.clone(),
            stars: record.metrics.stars,
            downloads: record.metrics.downloads,
            quality_score: record.quality_score,
            is_featured: record.is_featured,
            is_trending: record.metrics.downloads > TRENDING_DOWNLOAD_THRESHOLD,
            updated_at: record.updated_at,
        }
    }
}
