//! GitHub discovery of marketplace config contributions.
//!
//! Contributions are ordinary GitHub repositories tagged with a topic and
//! carrying a manifest at a well-known path. Discovery searches the topic,
//! then fetches each repository's manifest from the raw-content host.

mod github;
mod pagination;

use std::time::Duration;

use hybridci_shared::{AppConfig, HybridCiError, Result, github_token};
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK};
use tracing::{debug, info, instrument};
use url::Url;

pub use github::{DiscoveredRepo, RepoLicense, RepoOwner};

/// User-Agent string for GitHub requests (the API rejects requests without one).
const USER_AGENT: &str = concat!("hybridci/", env!("CARGO_PKG_VERSION"));

/// Largest page size the search API accepts.
const MAX_PER_PAGE: usize = 100;

/// Maximum manifest size we accept (1 MB).
const MAX_MANIFEST_SIZE: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Configuration for GitHub discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// REST API root (`https://api.github.com`).
    pub api_base: Url,
    /// Raw-content root (`https://raw.githubusercontent.com`).
    pub raw_base: Url,
    /// Topic marking contribution repositories.
    pub topic: String,
    /// Manifest path inside each repository.
    pub manifest_path: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
    /// Stop collecting after this many repositories.
    pub max_repos: usize,
}

impl DiscoveryOptions {
    /// Build options from the loaded app config, resolving the token env var.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            api_base: config.github.api_url()?,
            raw_base: config.github.raw_url()?,
            topic: config.github.topic.clone(),
            manifest_path: config.github.manifest_path.clone(),
            token: github_token(config),
            timeout_secs: config.github.timeout_secs,
            max_repos: config.github.max_repos,
        })
    }
}

// ---------------------------------------------------------------------------
// GitHubDiscovery
// ---------------------------------------------------------------------------

/// Client for topic search and manifest retrieval.
#[derive(Debug, Clone)]
pub struct GitHubDiscovery {
    client: Client,
    opts: DiscoveryOptions,
}

impl GitHubDiscovery {
    /// Build a client with the configured timeout and credentials.
    pub fn new(opts: DiscoveryOptions) -> Result<Self> {
        let client = build_client(&opts)?;
        Ok(Self { client, opts })
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.opts
    }

    /// Search repositories carrying the configured topic, most-starred first.
    ///
    /// Follows `Link: rel="next"` pages until `max_repos` repositories have
    /// been collected or the results run out.
    #[instrument(skip_all, fields(topic = %self.opts.topic))]
    pub async fn discover_repositories(&self) -> Result<Vec<DiscoveredRepo>> {
        let mut repos: Vec<DiscoveredRepo> = Vec::new();
        let mut next = Some(self.search_url()?.to_string());

        while let Some(page_url) = next.take() {
            if repos.len() >= self.opts.max_repos {
                break;
            }

            debug!(%page_url, "fetching search page");
            let response = self.get(&page_url).await?;

            next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(pagination::next_page_url);

            let page: github::SearchResponse = response.json().await.map_err(|e| {
                HybridCiError::Network(format!("{page_url}: invalid search response: {e}"))
            })?;

            debug!(total_count = page.total_count, items = page.items.len(), "search page");
            if page.items.is_empty() {
                break;
            }
            repos.extend(page.items);
        }

        repos.truncate(self.opts.max_repos);
        info!(repos = repos.len(), "repositories discovered");
        Ok(repos)
    }

    /// Fetch the raw manifest text of a discovered repository.
    #[instrument(skip_all, fields(repo = %repo.full_name))]
    pub async fn fetch_manifest(&self, repo: &DiscoveredRepo) -> Result<String> {
        let url = self.manifest_url(repo);
        let response = self.get(&url).await?;

        if let Some(len) = response.content_length() {
            if len > MAX_MANIFEST_SIZE as u64 {
                return Err(too_large(&url, len));
            }
        }

        read_capped(response, &url, MAX_MANIFEST_SIZE).await
    }

    /// Raw-content URL of a repository's manifest.
    pub fn manifest_url(&self, repo: &DiscoveredRepo) -> String {
        format!(
            "{}/{}/{}/{}",
            self.opts.raw_base.as_str().trim_end_matches('/'),
            repo.full_name,
            repo.default_branch,
            self.opts.manifest_path.trim_start_matches('/'),
        )
    }

    fn search_url(&self) -> Result<Url> {
        let base = format!(
            "{}/search/repositories",
            self.opts.api_base.as_str().trim_end_matches('/')
        );
        let mut url = Url::parse(&base)
            .map_err(|e| HybridCiError::config(format!("invalid search URL '{base}': {e}")))?;

        let per_page = self.opts.max_repos.clamp(1, MAX_PER_PAGE);
        url.query_pairs_mut()
            .append_pair("q", &format!("topic:{}", self.opts.topic))
            .append_pair("sort", "stars")
            .append_pair("order", "desc")
            .append_pair("per_page", &per_page.to_string());
        Ok(url)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HybridCiError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HybridCiError::Network(format!("{url}: HTTP {status}")));
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read a UTF-8 body chunk by chunk, failing once it grows past `limit` bytes.
///
/// Covers chunked responses that carry no `Content-Length`.
async fn read_capped(mut response: reqwest::Response, url: &str, limit: usize) -> Result<String> {
    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| HybridCiError::Network(format!("{url}: failed to read body: {e}")))?
    {
        if body.len() + chunk.len() > limit {
            return Err(too_large(url, (body.len() + chunk.len()) as u64));
        }
        body.extend_from_slice(&chunk);
    }

    String::from_utf8(body)
        .map_err(|e| HybridCiError::parse(format!("{url}: manifest is not UTF-8: {e}")))
}

fn too_large(url: &str, len: u64) -> HybridCiError {
    HybridCiError::validation(format!(
        "{url}: manifest too large ({len}+ bytes, max {MAX_MANIFEST_SIZE})"
    ))
}

/// Build a reqwest client with appropriate settings.
fn build_client(opts: &DiscoveryOptions) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

    if let Some(token) = &opts.token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| HybridCiError::config(format!("invalid GitHub token: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| HybridCiError::Network(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(server: &MockServer) -> DiscoveryOptions {
        DiscoveryOptions {
            api_base: Url::parse(&server.uri()).unwrap(),
            raw_base: Url::parse(&format!("{}/raw", server.uri())).unwrap(),
            topic: "hybrid-cicd-config".into(),
            manifest_path: "hybrid-config.yaml".into(),
            token: None,
            timeout_secs: 5,
            max_repos: 10,
        }
    }

    fn repo_json(full_name: &str, stars: u64) -> serde_json::Value {
        let owner = full_name.split('/').next().unwrap();
        serde_json::json!({
            "full_name": full_name,
            "html_url": format!("https://github.com/{full_name}"),
            "description": "a config",
            "default_branch": "main",
            "owner": { "login": owner, "avatar_url": null, "html_url": null },
            "stargazers_count": stars,
            "forks_count": 2,
            "open_issues_count": 1,
            "watchers_count": stars,
            "license": { "spdx_id": "MIT", "name": "MIT License" },
            "topics": ["hybrid-cicd-config"]
        })
    }

    #[tokio::test]
    async fn discovers_single_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("q", "topic:hybrid-cicd-config"))
            .and(query_param("sort", "stars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 2,
                "items": [repo_json("acme/deploy-kit", 40), repo_json("octo/lint-pack", 3)]
            })))
            .mount(&server)
            .await;

        let discovery = GitHubDiscovery::new(options(&server)).unwrap();
        let repos = discovery.discover_repositories().await.unwrap();

        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].full_name, "acme/deploy-kit");
        assert_eq!(repos[0].owner.login, "acme");
        assert_eq!(repos[0].spdx_license(), Some("MIT"));
    }

    #[tokio::test]
    async fn follows_next_link_until_max_repos() {
        let server = MockServer::start().await;
        let page2 = format!("{}/search/repositories?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 4,
                "items": [repo_json("c/three", 3), repo_json("d/four", 1)]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("per_page", "3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", format!("<{page2}>; rel=\"next\"").as_str())
                    .set_body_json(serde_json::json!({
                        "total_count": 4,
                        "items": [repo_json("a/one", 9), repo_json("b/two", 5)]
                    })),
            )
            .mount(&server)
            .await;

        let mut opts = options(&server);
        opts.max_repos = 3;
        let discovery = GitHubDiscovery::new(opts).unwrap();
        let repos = discovery.discover_repositories().await.unwrap();

        let names: Vec<_> = repos.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["a/one", "b/two", "c/three"]);
    }

    #[tokio::test]
    async fn search_error_status_is_network_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let discovery = GitHubDiscovery::new(options(&server)).unwrap();
        let err = discovery.discover_repositories().await.unwrap_err();
        assert!(matches!(err, HybridCiError::Network(_)));
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn sends_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 0,
                "items": []
            })))
            .mount(&server)
            .await;

        let mut opts = options(&server);
        opts.token = Some("s3cret".into());
        let discovery = GitHubDiscovery::new(opts).unwrap();
        assert!(discovery.discover_repositories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetches_manifest_from_raw_host() {
        let server = MockServer::start().await;
        let manifest = "type: tool\nmetadata:\n  id: deploy-kit\n";

        Mock::given(method("GET"))
            .and(path("/raw/acme/deploy-kit/main/hybrid-config.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(manifest))
            .mount(&server)
            .await;

        let discovery = GitHubDiscovery::new(options(&server)).unwrap();
        let repo: DiscoveredRepo =
            serde_json::from_value(repo_json("acme/deploy-kit", 40)).unwrap();

        assert_eq!(
            discovery.manifest_url(&repo),
            format!("{}/raw/acme/deploy-kit/main/hybrid-config.yaml", server.uri())
        );
        assert_eq!(discovery.fetch_manifest(&repo).await.unwrap(), manifest);
    }

    #[tokio::test]
    async fn missing_manifest_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let discovery = GitHubDiscovery::new(options(&server)).unwrap();
        let repo: DiscoveredRepo = serde_json::from_value(repo_json("acme/gone", 1)).unwrap();
        assert!(discovery.fetch_manifest(&repo).await.is_err());
    }

    #[tokio::test]
    async fn body_over_limit_is_rejected_while_reading() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/raw/acme/big/main/hybrid-config.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&server)
            .await;

        let discovery = GitHubDiscovery::new(options(&server)).unwrap();
        let repo: DiscoveredRepo = serde_json::from_value(repo_json("acme/big", 1)).unwrap();
        let url = discovery.manifest_url(&repo);

        let response = discovery.get(&url).await.unwrap();
        let err = read_capped(response, &url, 16).await.unwrap_err();
        assert!(matches!(err, HybridCiError::Validation { .. }));
        assert!(err.to_string().contains("too large"));

        let response = discovery.get(&url).await.unwrap();
        assert_eq!(read_capped(response, &url, 64).await.unwrap().len(), 64);
    }

    #[test]
    fn options_from_default_config() {
        let opts = DiscoveryOptions::from_config(&AppConfig::default()).unwrap();
        assert_eq!(opts.api_base.as_str(), "https://api.github.com/");
        assert_eq!(opts.max_repos, 50);
    }
}
