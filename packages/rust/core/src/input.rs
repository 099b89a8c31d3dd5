//! Raw contribution handed to the config discovery chain.

use hybridci_discovery::DiscoveredRepo;
use hybridci_shared::{Author, ConfigSource, RawMetrics};
use serde::{Deserialize, Serialize};

/// A manifest plus the provenance and metrics known about it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionInput {
    /// Identifier of the contribution (repository slug, file stem, ...).
    pub id: String,
    /// Manifest text; YAML, or JSON since JSON is valid YAML.
    pub yaml_content: String,
    #[serde(default)]
    pub source: ConfigSource,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub metrics: RawMetrics,
    /// SPDX id reported by the hosting platform.
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    /// Curation score in `0.0..=1.0`.
    #[serde(default)]
    pub quality_score: f64,
}

impl ContributionInput {
    /// Build the input for a repository found by GitHub discovery.
    pub fn from_repo(repo: &DiscoveredRepo, manifest_path: &str, yaml_content: String) -> Self {
        Self {
            id: repo.full_name.clone(),
            yaml_content,
            source: ConfigSource {
                repo_url: repo.html_url.clone(),
                full_name: Some(repo.full_name.clone()),
                path: manifest_path.to_string(),
                branch: repo.default_branch.clone(),
            },
            author: Author {
                login: repo.owner.login.clone(),
                name: None,
                avatar_url: repo.owner.avatar_url.clone(),
                profile_url: repo.owner.html_url.clone(),
            },
            metrics: RawMetrics {
                stars: Some(repo.stargazers_count),
                forks: Some(repo.forks_count),
                issues: Some(repo.open_issues_count),
                watchers: Some(repo.watchers_count),
                downloads: None,
            },
            license: repo.spdx_license().map(str::to_string),
            is_featured: false,
            quality_score: repo_quality(repo),
        }
    }
}

/// Rough curation score for a discovered repository.
///
/// A quarter point each for a description, a recognised license, topics
/// beyond the marketplace one, and community traction (10+ stars).
fn repo_quality(repo: &DiscoveredRepo) -> f64 {
    let checks = [
        repo.description.as_deref().is_some_and(|d| !d.trim().is_empty()),
        repo.spdx_license().is_some(),
        repo.topics.len() > 1,
        repo.stargazers_count >= 10,
    ];
    checks.iter().filter(|ok| **ok).count() as f64 * 0.25
}
