//! In-memory marketplace of processed config contributions.
//!
//! The service owns a per-entry TTL cache of [`ProcessedConfig`]s, seeded
//! from mock contributions or imported from GitHub, and answers the listing
//! queries the dashboard makes (filters, sort orders, stats, counts).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use hybridci_discovery::{DiscoveredRepo, GitHubDiscovery};
use hybridci_shared::{
    ConfigCategory, ConfigPreview, ConfigRecord, ConfigType, HybridCiError, MarketplaceSettings,
    Result,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::cache::TtlCache;
use crate::discovery_chain::{BatchResult, ConfigDiscoveryChain, FailedConfig, ProcessedConfig};
use crate::input::ContributionInput;
use crate::mock;

/// Weight of one star against one download in the trending score.
const TRENDING_STAR_WEIGHT: u64 = 10;

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// Listing sort orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortBy {
    /// `downloads + 10 × stars`, descending.
    Trending,
    Downloads,
    Stars,
    Quality,
    /// Most recently updated first.
    RecentlyUpdated,
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "trending" => Ok(Self::Trending),
            "downloads" => Ok(Self::Downloads),
            "stars" => Ok(Self::Stars),
            "quality" => Ok(Self::Quality),
            "recently-updated" => Ok(Self::RecentlyUpdated),
            other => Err(format!(
                "unknown sort '{other}': expected trending, downloads, stars, quality, or recently-updated"
            )),
        }
    }
}

/// Listing filters; unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct ConfigFilters {
    pub category: Option<ConfigCategory>,
    pub config_type: Option<ConfigType>,
    /// Matches configs carrying at least one of these tags.
    pub tags: Vec<String>,
    pub min_stars: Option<u64>,
    pub min_quality_score: Option<f64>,
    /// Author login, compared case-insensitively.
    pub author: Option<String>,
    pub sort_by: Option<SortBy>,
}

impl ConfigFilters {
    fn matches(&self, preview: &ConfigPreview) -> bool {
        self.category.is_none_or(|c| preview.category == c)
            && self.config_type.is_none_or(|t| preview.config_type == t)
            && (self.tags.is_empty() || self.tags.iter().any(|t| preview.tags.contains(t)))
            && self.min_stars.is_none_or(|min| preview.stars >= min)
            && self
                .min_quality_score
                .is_none_or(|min| preview.quality_score >= min)
            && self
                .author
                .as_deref()
                .is_none_or(|a| preview.author.eq_ignore_ascii_case(a))
    }
}

/// Aggregate numbers for the marketplace header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketplaceStats {
    pub total_configs: usize,
    pub total_downloads: u64,
    pub total_stars: u64,
    pub featured: usize,
    pub trending: usize,
    pub average_quality_score: f64,
    pub authors: usize,
    pub last_refreshed: Option<DateTime<Utc>>,
}

/// Outcome of [`MarketplaceService::load_from_github`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub discovered: usize,
    pub loaded: usize,
    pub failed: Vec<FailedConfig>,
}

// ---------------------------------------------------------------------------
// MarketplaceService
// ---------------------------------------------------------------------------

struct Inventory {
    configs: TtlCache<String, ProcessedConfig>,
    /// Where GitHub-imported configs came from, for refreshes.
    sources: HashMap<String, DiscoveredRepo>,
    last_refreshed: Option<DateTime<Utc>>,
}

/// Marketplace backed by the config discovery chain.
pub struct MarketplaceService {
    chain: ConfigDiscoveryChain,
    discovery: Option<Arc<GitHubDiscovery>>,
    inventory: Mutex<Inventory>,
}

impl MarketplaceService {
    /// A service without GitHub access (mock data and direct ingestion only).
    pub fn new(settings: &MarketplaceSettings) -> Result<Self> {
        Ok(Self {
            chain: ConfigDiscoveryChain::with_concurrency(settings.batch_concurrency)?,
            discovery: None,
            inventory: Mutex::new(Inventory {
                configs: TtlCache::new(settings.cache_ttl),
                sources: HashMap::new(),
                last_refreshed: None,
            }),
        })
    }

    /// Attach a GitHub discovery client for imports and refreshes.
    pub fn with_discovery(mut self, discovery: GitHubDiscovery) -> Self {
        self.discovery = Some(Arc::new(discovery));
        self
    }

    pub fn chain(&self) -> &ConfigDiscoveryChain {
        &self.chain
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Store a processed config, carrying identity forward from any previous version.
    pub async fn ingest(&self, processed: ProcessedConfig) {
        let mut inv = self.inventory.lock().await;
        store(&mut inv, processed);
    }

    /// Run contributions through the chain and store the successes.
    pub async fn ingest_batch(&self, inputs: &[ContributionInput]) -> BatchResult {
        let batch = self.chain.process_batch(inputs).await;

        let mut inv = self.inventory.lock().await;
        for processed in &batch.successful {
            store(&mut inv, processed.clone());
        }
        batch
    }

    /// Seed `count` deterministic mock contributions.
    pub async fn seed_mock(&self, count: usize) -> BatchResult {
        let inputs = mock::mock_contributions(count);
        let batch = self.ingest_batch(&inputs).await;
        info!(seeded = batch.successful.len(), "mock configs loaded");
        batch
    }

    /// Discover contribution repositories on GitHub and import their manifests.
    ///
    /// Per-repository failures (fetch, parse, validation) are logged and
    /// reported in the summary; only a failed search aborts the import.
    /// Repositories are handled in discovery order: when two declare the
    /// same config id the later one is reported as failed. A repository
    /// whose manifest stopped validating, or now declares another id, has
    /// its previous config withdrawn.
    #[instrument(skip_all)]
    pub async fn load_from_github(&self) -> Result<LoadSummary> {
        let discovery = self.require_discovery()?;
        let repos = discovery.discover_repositories().await?;

        let outcomes: Vec<(DiscoveredRepo, Result<Option<ProcessedConfig>>, Vec<String>)> =
            stream::iter(repos.iter().cloned())
                .map(|repo| {
                    let discovery = Arc::clone(&discovery);
                    async move {
                        match self.import_repo(&discovery, &repo).await {
                            Ok((processed, errors)) => (repo, Ok(processed), errors),
                            Err(e) => (repo, Err(e), Vec::new()),
                        }
                    }
                })
                .buffered(self.chain.concurrency())
                .collect()
                .await;

        let mut summary = LoadSummary {
            discovered: repos.len(),
            ..LoadSummary::default()
        };
        // config id -> repository that supplied it in this import
        let mut claimed: HashMap<String, String> = HashMap::new();

        let mut inv = self.inventory.lock().await;
        for (repo, outcome, errors) in outcomes {
            let processed = match outcome {
                Ok(Some(processed)) => processed,
                Ok(None) => {
                    warn!(repo = %repo.full_name, ?errors, "manifest failed validation");
                    withdraw(&mut inv, &repo.full_name, None);
                    summary.failed.push(FailedConfig {
                        id: repo.full_name,
                        errors,
                    });
                    continue;
                }
                Err(e) => {
                    warn!(repo = %repo.full_name, error = %e, "failed to import repository");
                    summary.failed.push(FailedConfig {
                        id: repo.full_name,
                        errors: vec![e.to_string()],
                    });
                    continue;
                }
            };

            let id = processed.record.id.clone();
            if let Some(first) = claimed.get(&id) {
                warn!(repo = %repo.full_name, %id, %first, "duplicate config id");
                summary.failed.push(FailedConfig {
                    id: repo.full_name,
                    errors: vec![format!(
                        "duplicate config id '{id}' already imported from {first}"
                    )],
                });
                continue;
            }

            claimed.insert(id.clone(), repo.full_name.clone());
            withdraw(&mut inv, &repo.full_name, Some(&id));
            inv.sources.insert(id, repo);
            store(&mut inv, processed);
            summary.loaded += 1;
        }

        info!(
            discovered = summary.discovered,
            loaded = summary.loaded,
            failed = summary.failed.len(),
            "GitHub import complete"
        );
        Ok(summary)
    }

    async fn import_repo(
        &self,
        discovery: &GitHubDiscovery,
        repo: &DiscoveredRepo,
    ) -> Result<(Option<ProcessedConfig>, Vec<String>)> {
        let manifest = discovery.fetch_manifest(repo).await?;
        let input =
            ContributionInput::from_repo(repo, &discovery.options().manifest_path, manifest);
        let result = self.chain.process(&input).await?;
        let errors = result.errors.clone();
        Ok((result.into_processed(), errors))
    }

    fn require_discovery(&self) -> Result<Arc<GitHubDiscovery>> {
        self.discovery
            .clone()
            .ok_or_else(|| HybridCiError::config("GitHub discovery is not configured"))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Fresh previews matching `filters`, in the requested order.
    ///
    /// Without a sort order, configs come back in first-ingestion order.
    pub async fn get_configs(&self, filters: &ConfigFilters) -> Vec<ConfigPreview> {
        let inv = self.inventory.lock().await;
        let mut previews: Vec<ConfigPreview> = inv
            .configs
            .fresh_values()
            .into_iter()
            .map(|p| &p.preview)
            .filter(|p| filters.matches(p))
            .cloned()
            .collect();
        drop(inv);

        if let Some(sort_by) = filters.sort_by {
            sort_previews(&mut previews, sort_by);
        }
        previews
    }

    /// The record for `id`, refreshing it from GitHub once it has expired.
    ///
    /// Expired configs without a known GitHub source are dropped. The
    /// manifest is fetched without holding the inventory lock, so other
    /// queries keep being served while a refresh is in flight.
    pub async fn get_config(&self, id: &str) -> Result<Option<ConfigRecord>> {
        let key = id.to_string();
        let (repo, discovery) = {
            let mut inv = self.inventory.lock().await;
            if let Some(fresh) = inv.configs.get(&key) {
                return Ok(Some(fresh.record.clone()));
            }
            match (inv.sources.get(id).cloned(), self.discovery.clone()) {
                (Some(repo), Some(discovery)) => (repo, discovery),
                _ => {
                    inv.configs.invalidate(&key);
                    inv.sources.remove(id);
                    return Ok(None);
                }
            }
        };

        let fetched = self.refresh(&discovery, &repo, id).await?;

        // A concurrent refresh may have landed first; its fresh value wins.
        let mut inv = self.inventory.lock().await;
        let refreshed = inv
            .configs
            .get_or_refresh(key, |stale| async move {
                Ok(fetched.map(|fresh| carry_forward(stale.as_ref(), fresh)))
            })
            .await?;

        if refreshed.is_none() {
            inv.sources.remove(id);
        }
        Ok(refreshed.map(|p| p.record))
    }

    async fn refresh(
        &self,
        discovery: &GitHubDiscovery,
        repo: &DiscoveredRepo,
        id: &str,
    ) -> Result<Option<ProcessedConfig>> {
        info!(repo = %repo.full_name, %id, "refreshing expired config");

        let (processed, errors) = self.import_repo(discovery, repo).await?;
        match processed {
            Some(fresh) if fresh.record.id == id => Ok(Some(fresh)),
            Some(fresh) => {
                warn!(
                    repo = %repo.full_name,
                    %id,
                    now = %fresh.record.id,
                    "manifest changed config id"
                );
                Ok(None)
            }
            None => {
                warn!(repo = %repo.full_name, ?errors, "refreshed manifest no longer valid");
                Ok(None)
            }
        }
    }

    /// Aggregate stats over fresh configs.
    pub async fn get_stats(&self) -> MarketplaceStats {
        let inv = self.inventory.lock().await;
        let previews: Vec<&ConfigPreview> =
            inv.configs.fresh_values().into_iter().map(|p| &p.preview).collect();

        let total = previews.len();
        let quality_sum: f64 = previews.iter().map(|p| p.quality_score).sum();
        let mut authors: Vec<&str> = previews.iter().map(|p| p.author.as_str()).collect();
        authors.sort_unstable();
        authors.dedup();

        MarketplaceStats {
            total_configs: total,
            total_downloads: previews.iter().map(|p| p.downloads).sum(),
            total_stars: previews.iter().map(|p| p.stars).sum(),
            featured: previews.iter().filter(|p| p.is_featured).count(),
            trending: previews.iter().filter(|p| p.is_trending).count(),
            average_quality_score: if total == 0 {
                0.0
            } else {
                quality_sum / total as f64
            },
            authors: authors.len(),
            last_refreshed: inv.last_refreshed,
        }
    }

    /// Fresh config count per category; every category is present.
    pub async fn get_category_counts(&self) -> BTreeMap<ConfigCategory, usize> {
        let inv = self.inventory.lock().await;
        let mut counts: BTreeMap<ConfigCategory, usize> =
            ConfigCategory::ALL.into_iter().map(|c| (c, 0)).collect();
        for processed in inv.configs.fresh_values() {
            *counts.entry(processed.preview.category).or_default() += 1;
        }
        counts
    }

    /// Featured configs, best quality first.
    pub async fn get_featured(&self, limit: usize) -> Vec<ConfigPreview> {
        let mut featured: Vec<ConfigPreview> = self
            .get_configs(&ConfigFilters {
                sort_by: Some(SortBy::Quality),
                ..ConfigFilters::default()
            })
            .await
            .into_iter()
            .filter(|p| p.is_featured)
            .collect();
        featured.truncate(limit);
        featured
    }

    /// Top configs by trending score.
    pub async fn get_trending(&self, limit: usize) -> Vec<ConfigPreview> {
        let mut trending = self
            .get_configs(&ConfigFilters {
                sort_by: Some(SortBy::Trending),
                ..ConfigFilters::default()
            })
            .await;
        trending.truncate(limit);
        trending
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut inv = self.inventory.lock().await;
        let purged = inv.configs.purge_expired();
        let Inventory {
            configs, sources, ..
        } = &mut *inv;
        sources.retain(|id, _| configs.peek_stale(id).is_some());
        purged
    }

    /// Forget everything.
    pub async fn clear(&self) {
        let mut inv = self.inventory.lock().await;
        inv.configs.clear();
        inv.sources.clear();
        inv.last_refreshed = None;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn store(inv: &mut Inventory, processed: ProcessedConfig) {
    let id = processed.record.id.clone();
    let processed = carry_forward(inv.configs.peek_stale(&id), processed);
    inv.configs.insert(id, processed);
    inv.last_refreshed = Some(Utc::now());
}

/// Drop the configs `repo` supplied earlier, except `keep`.
fn withdraw(inv: &mut Inventory, repo: &str, keep: Option<&str>) {
    let withdrawn: Vec<String> = inv
        .sources
        .iter()
        .filter(|(id, source)| source.full_name == repo && keep != Some(id.as_str()))
        .map(|(id, _)| id.clone())
        .collect();

    for id in withdrawn {
        info!(%repo, %id, "withdrawing config");
        inv.sources.remove(&id);
        inv.configs.invalidate(&id);
    }
}

/// Keep `created_at` from the previous version of the same config, and
/// `updated_at` too when the manifest content has not changed.
fn carry_forward(
    previous: Option<&ProcessedConfig>,
    mut fresh: ProcessedConfig,
) -> ProcessedConfig {
    if let Some(prev) = previous.filter(|p| p.record.id == fresh.record.id) {
        fresh.record.created_at = prev.record.created_at;
        if prev.record.content_hash == fresh.record.content_hash {
            fresh.record.updated_at = prev.record.updated_at;
        }
        fresh.preview.updated_at = fresh.record.updated_at;
    }
    fresh
}

fn trending_score(preview: &ConfigPreview) -> u64 {
    preview
        .downloads
        .saturating_add(preview.stars.saturating_mul(TRENDING_STAR_WEIGHT))
}

/// Stable descending sort by the chosen key.
fn sort_previews(previews: &mut [ConfigPreview], sort_by: SortBy) {
    match sort_by {
        SortBy::Trending => previews.sort_by_key(|p| std::cmp::Reverse(trending_score(p))),
        SortBy::Downloads => previews.sort_by_key(|p| std::cmp::Reverse(p.downloads)),
        SortBy::Stars => previews.sort_by_key(|p| std::cmp::Reverse(p.stars)),
        SortBy::Quality => previews.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score)),
        SortBy::RecentlyUpdated => previews.sort_by_key(|p| std::cmp::Reverse(p.updated_at)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use hybridci_discovery::DiscoveryOptions;
    use hybridci_shared::RawMetrics;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(ttl: Duration) -> MarketplaceSettings {
        MarketplaceSettings {
            cache_ttl: ttl,
            batch_concurrency: 4,
        }
    }

    fn service() -> MarketplaceService {
        MarketplaceService::new(&settings(Duration::from_secs(300))).unwrap()
    }

    fn contribution(id: &str, category: &str, stars: u64, downloads: u64) -> ContributionInput {
        ContributionInput {
            id: id.into(),
            yaml_content: format!(
                "type: tool\nmetadata:\n  id: {id}\n  name: {id}\n  category: {category}\n  tags: [{category}]\n"
            ),
            author: hybridci_shared::Author {
                login: format!("{id}-author"),
                ..Default::default()
            },
            metrics: RawMetrics {
                stars: Some(stars),
                downloads: Some(downloads),
                ..RawMetrics::default()
            },
            quality_score: stars as f64 / 100.0,
            is_featured: stars >= 50,
            ..ContributionInput::default()
        }
    }

    async fn seeded() -> MarketplaceService {
        let svc = service();
        let batch = svc
            .ingest_batch(&[
                contribution("alpha", "ci-cd", 5, 500),
                contribution("beta", "security", 80, 20),
                contribution("gamma", "ci-cd", 30, 150),
            ])
            .await;
        assert_eq!(batch.successful.len(), 3);
        svc
    }

    fn ids(previews: &[ConfigPreview]) -> Vec<&str> {
        previews.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn sort_orders() {
        let svc = seeded().await;
        let by = |sort_by| ConfigFilters {
            sort_by: Some(sort_by),
            ..ConfigFilters::default()
        };

        // alpha 5★/500dl → 550, beta 80★/20dl → 820, gamma 30★/150dl → 450
        let trending = svc.get_configs(&by(SortBy::Trending)).await;
        assert_eq!(ids(&trending), vec!["beta", "alpha", "gamma"]);

        let downloads = svc.get_configs(&by(SortBy::Downloads)).await;
        assert!(downloads.windows(2).all(|w| w[0].downloads >= w[1].downloads));
        assert_eq!(ids(&downloads), vec!["alpha", "gamma", "beta"]);

        let stars = svc.get_configs(&by(SortBy::Stars)).await;
        assert_eq!(ids(&stars), vec!["beta", "gamma", "alpha"]);

        let quality = svc.get_configs(&by(SortBy::Quality)).await;
        assert_eq!(ids(&quality), vec!["beta", "gamma", "alpha"]);

        let unsorted = svc.get_configs(&ConfigFilters::default()).await;
        assert_eq!(ids(&unsorted), vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn filters_combine() {
        let svc = seeded().await;

        let ci = svc
            .get_configs(&ConfigFilters {
                category: Some(ConfigCategory::CiCd),
                min_stars: Some(10),
                ..ConfigFilters::default()
            })
            .await;
        assert_eq!(ids(&ci), vec!["gamma"]);

        let tagged = svc
            .get_configs(&ConfigFilters {
                tags: vec!["security".into(), "nope".into()],
                ..ConfigFilters::default()
            })
            .await;
        assert_eq!(ids(&tagged), vec!["beta"]);

        let by_author = svc
            .get_configs(&ConfigFilters {
                author: Some("ALPHA-author".into()),
                ..ConfigFilters::default()
            })
            .await;
        assert_eq!(ids(&by_author), vec!["alpha"]);

        let quality = svc
            .get_configs(&ConfigFilters {
                min_quality_score: Some(0.3),
                config_type: Some(ConfigType::Tool),
                ..ConfigFilters::default()
            })
            .await;
        assert_eq!(ids(&quality), vec!["beta", "gamma"]);
    }

    #[tokio::test]
    async fn stats_and_counts() {
        let svc = seeded().await;
        let stats = svc.get_stats().await;

        assert_eq!(stats.total_configs, 3);
        assert_eq!(stats.total_downloads, 670);
        assert_eq!(stats.total_stars, 115);
        assert_eq!(stats.featured, 1);
        assert_eq!(stats.trending, 2);
        assert_eq!(stats.authors, 3);
        assert!((stats.average_quality_score - 115.0 / 300.0).abs() < 1e-9);
        assert!(stats.last_refreshed.is_some());

        let counts = svc.get_category_counts().await;
        assert_eq!(counts[&ConfigCategory::CiCd], 2);
        assert_eq!(counts[&ConfigCategory::Security], 1);
        assert_eq!(counts[&ConfigCategory::Testing], 0);
        assert_eq!(counts.len(), ConfigCategory::ALL.len());

        assert_eq!(ids(&svc.get_featured(5).await), vec!["beta"]);
        assert_eq!(ids(&svc.get_trending(1).await), vec!["beta"]);
    }

    #[tokio::test]
    async fn empty_marketplace_stats() {
        let stats = service().get_stats().await;
        assert_eq!(stats.total_configs, 0);
        assert_eq!(stats.average_quality_score, 0.0);
        assert!(stats.last_refreshed.is_none());
    }

    #[tokio::test]
    async fn reingest_keeps_identity() {
        let svc = service();
        let first = svc
            .chain()
            .process(&contribution("alpha", "ci-cd", 1, 1))
            .await
            .unwrap()
            .into_processed()
            .unwrap();
        svc.ingest(first.clone()).await;

        let mut same = svc
            .chain()
            .process(&contribution("alpha", "ci-cd", 1, 1))
            .await
            .unwrap()
            .into_processed()
            .unwrap();
        same.record.created_at += chrono::Duration::seconds(10);
        same.record.updated_at += chrono::Duration::seconds(10);
        svc.ingest(same).await;

        let stored = svc.get_config("alpha").await.unwrap().unwrap();
        assert_eq!(stored.created_at, first.record.created_at);
        assert_eq!(stored.updated_at, first.record.updated_at);

        let mut changed = svc
            .chain()
            .process(&contribution("alpha", "testing", 1, 1))
            .await
            .unwrap()
            .into_processed()
            .unwrap();
        changed.record.updated_at += chrono::Duration::seconds(10);
        let changed_at = changed.record.updated_at;
        svc.ingest(changed).await;

        let stored = svc.get_config("alpha").await.unwrap().unwrap();
        assert_eq!(stored.created_at, first.record.created_at);
        assert_eq!(stored.updated_at, changed_at);
        assert_eq!(stored.category, ConfigCategory::Testing);
    }

    #[tokio::test]
    async fn expired_entries_disappear_without_source() {
        let svc = MarketplaceService::new(&settings(Duration::ZERO)).unwrap();
        svc.ingest_batch(&[contribution("alpha", "ci-cd", 1, 1)]).await;

        assert!(svc.get_configs(&ConfigFilters::default()).await.is_empty());
        assert!(svc.get_config("alpha").await.unwrap().is_none());
        assert_eq!(svc.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn seed_mock_populates() {
        let svc = service();
        let batch = svc.seed_mock(12).await;
        assert_eq!(batch.total, 12);
        assert!(batch.failed.is_empty());
        assert_eq!(svc.get_stats().await.total_configs, 12);

        svc.clear().await;
        assert_eq!(svc.get_stats().await.total_configs, 0);
    }

    #[tokio::test]
    async fn load_requires_discovery() {
        let err = service().load_from_github().await.unwrap_err();
        assert!(matches!(err, HybridCiError::Config { .. }));
    }

    fn repo_json(full_name: &str, stars: u64) -> serde_json::Value {
        serde_json::json!({
            "full_name": full_name,
            "html_url": format!("https://github.com/{full_name}"),
            "description": "a config",
            "default_branch": "main",
            "owner": { "login": full_name.split('/').next().unwrap() },
            "stargazers_count": stars,
            "forks_count": 1,
            "open_issues_count": 0,
            "watchers_count": stars
        })
    }

    async fn github_server() -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 3,
                "items": [
                    repo_json("acme/deploy-kit", 40),
                    repo_json("octo/half-done", 2),
                    repo_json("ghost/missing", 0)
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/raw/acme/deploy-kit/main/hybrid-config.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DEPLOY_KIT_YAML))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/raw/octo/half-done/main/hybrid-config.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("type: tool\n"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/raw/ghost/missing/main/hybrid-config.yaml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        server
    }

    fn discovery(server: &MockServer) -> GitHubDiscovery {
        GitHubDiscovery::new(DiscoveryOptions {
            api_base: Url::parse(&server.uri()).unwrap(),
            raw_base: Url::parse(&format!("{}/raw", server.uri())).unwrap(),
            topic: "hybrid-cicd-config".into(),
            manifest_path: "hybrid-config.yaml".into(),
            token: None,
            timeout_secs: 5,
            max_repos: 10,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn load_from_github_degrades_per_repo() {
        let server = github_server().await;
        let svc = service().with_discovery(discovery(&server));

        let summary = svc.load_from_github().await.unwrap();
        assert_eq!(summary.discovered, 3);
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.failed.len(), 2);

        let mut failed: Vec<_> = summary.failed.iter().map(|f| f.id.as_str()).collect();
        failed.sort_unstable();
        assert_eq!(failed, vec!["ghost/missing", "octo/half-done"]);

        let configs = svc.get_configs(&ConfigFilters::default()).await;
        assert_eq!(ids(&configs), vec!["deploy-kit"]);
        assert_eq!(configs[0].stars, 40);
        assert_eq!(configs[0].author, "acme");
    }

    #[tokio::test]
    async fn expired_github_config_is_refreshed() {
        let server = github_server().await;
        let svc = MarketplaceService::new(&settings(Duration::ZERO))
            .unwrap()
            .with_discovery(discovery(&server));

        svc.load_from_github().await.unwrap();
        let record = svc.get_config("deploy-kit").await.unwrap().expect("refreshed");
        assert_eq!(record.name, "Deploy Kit");
        assert_eq!(record.source.full_name.as_deref(), Some("acme/deploy-kit"));
    }

    const DEPLOY_KIT_YAML: &str =
        "type: workflow\nmetadata:\n  id: deploy-kit\n  name: Deploy Kit\n  category: deployment\n";

    async fn search_server(repos: &[&str]) -> MockServer {
        let server = MockServer::start().await;
        let items: Vec<serde_json::Value> = repos.iter().map(|r| repo_json(r, 10)).collect();

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": items.len(),
                "items": items
            })))
            .mount(&server)
            .await;

        server
    }

    #[tokio::test]
    async fn duplicate_ids_keep_first_repository() {
        let server = search_server(&["a/one", "b/two", "c/three"]).await;
        for repo in ["a/one", "b/two", "c/three"] {
            Mock::given(method("GET"))
                .and(path(format!("/raw/{repo}/main/hybrid-config.yaml")))
                .respond_with(ResponseTemplate::new(200).set_body_string(
                    "type: tool\nmetadata:\n  id: shared-id\n  name: Shared\n  category: testing\n",
                ))
                .mount(&server)
                .await;
        }
        let svc = service().with_discovery(discovery(&server));

        let summary = svc.load_from_github().await.unwrap();
        assert_eq!(summary.loaded, 1);
        let failed: Vec<_> = summary.failed.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, vec!["b/two", "c/three"]);
        assert!(summary.failed[0].errors[0].contains("duplicate config id 'shared-id'"));
        assert!(summary.failed[0].errors[0].contains("a/one"));

        let record = svc.get_config("shared-id").await.unwrap().unwrap();
        assert_eq!(record.source.full_name.as_deref(), Some("a/one"));
        assert_eq!(svc.get_stats().await.total_configs, 1);
    }

    #[tokio::test]
    async fn invalid_reimport_withdraws_config() {
        let server = search_server(&["acme/deploy-kit"]).await;
        Mock::given(method("GET"))
            .and(path("/raw/acme/deploy-kit/main/hybrid-config.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DEPLOY_KIT_YAML))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw/acme/deploy-kit/main/hybrid-config.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("type: workflow\n"))
            .mount(&server)
            .await;
        let svc = service().with_discovery(discovery(&server));

        assert_eq!(svc.load_from_github().await.unwrap().loaded, 1);
        assert!(svc.get_config("deploy-kit").await.unwrap().is_some());

        let summary = svc.load_from_github().await.unwrap();
        assert_eq!(summary.loaded, 0);
        assert!(svc.get_config("deploy-kit").await.unwrap().is_none());
        assert_eq!(svc.get_stats().await.total_configs, 0);
    }

    #[tokio::test]
    async fn refresh_does_not_block_other_queries() {
        let server = search_server(&["acme/deploy-kit"]).await;
        Mock::given(method("GET"))
            .and(path("/raw/acme/deploy-kit/main/hybrid-config.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DEPLOY_KIT_YAML))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw/acme/deploy-kit/main/hybrid-config.yaml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(DEPLOY_KIT_YAML)
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;
        let svc = MarketplaceService::new(&settings(Duration::ZERO))
            .unwrap()
            .with_discovery(discovery(&server));
        svc.load_from_github().await.unwrap();

        let (record, stats_elapsed) = tokio::join!(svc.get_config("deploy-kit"), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let started = std::time::Instant::now();
            svc.get_stats().await;
            svc.get_category_counts().await;
            started.elapsed()
        });

        assert!(stats_elapsed < Duration::from_millis(500), "{stats_elapsed:?}");
        assert_eq!(record.unwrap().unwrap().id, "deploy-kit");
    }

    #[tokio::test]
    async fn recently_updated_is_newest_first() {
        let svc = service();
        let now = Utc::now();
        for (id, age) in [("old", 300), ("tie-a", 60), ("new", 0), ("tie-b", 60)] {
            let mut processed = svc
                .chain()
                .process(&contribution(id, "ci-cd", 1, 1))
                .await
                .unwrap()
                .into_processed()
                .unwrap();
            let at = now - chrono::Duration::seconds(age);
            processed.record.updated_at = at;
            processed.preview.updated_at = at;
            svc.ingest(processed).await;
        }

        let recent = svc
            .get_configs(&ConfigFilters {
                sort_by: Some(SortBy::RecentlyUpdated),
                ..ConfigFilters::default()
            })
            .await;
        assert_eq!(ids(&recent), vec!["new", "tie-a", "tie-b", "old"]);
    }

    #[test]
    fn sort_by_parses_kebab_names() {
        assert_eq!("recently-updated".parse::<SortBy>(), Ok(SortBy::RecentlyUpdated));
        assert!("newest".parse::<SortBy>().is_err());
    }
}
