//! GitHub REST response shapes used by discovery.

use serde::{Deserialize, Serialize};

/// `GET /search/repositories` response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<DiscoveredRepo>,
}

/// A repository returned by topic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredRepo {
    /// `owner/name`.
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    pub owner: RepoOwner,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    #[serde(default)]
    pub watchers_count: u64,
    #[serde(default)]
    pub license: Option<RepoLicense>,
    #[serde(default)]
    pub topics: Vec<String>,
}

fn default_branch() -> String {
    "main".into()
}

/// Owning account of a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoOwner {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// License summary attached to a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoLicense {
    #[serde(default)]
    pub spdx_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl DiscoveredRepo {
    /// SPDX identifier, skipping GitHub's `NOASSERTION` placeholder.
    pub fn spdx_license(&self) -> Option<&str> {
        self.license
            .as_ref()
            .and_then(|l| l.spdx_id.as_deref())
            .filter(|id| *id != "NOASSERTION")
    }
}
