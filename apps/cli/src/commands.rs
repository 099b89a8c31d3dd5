//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use hybridci_chain::ChainHooks;
use hybridci_core::{
    ConfigDiscoveryChain, ConfigFilters, ContributionInput, InMemoryWebhookStore,
    MarketplaceService, SortBy, WebhookEvent, WebhookEventChain,
};
use hybridci_discovery::{DiscoveryOptions, GitHubDiscovery};
use hybridci_shared::{
    AppConfig, ConfigCategory, ConfigType, HybridCiError, MarketplaceSettings, init_config,
    load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Mock configs seeded when no source is chosen.
const DEFAULT_MOCK_COUNT: usize = 24;

/// Manifest extensions picked up by `batch`.
const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// hybridci: config marketplace and webhook tooling for the Hybrid CI/CD platform.
#[derive(Parser)]
#[command(
    name = "hybridci",
    version,
    about = "Process, browse, and import Hybrid CI/CD config contributions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.hybridci/hybridci.toml).
    #[arg(long, global = true, env = "HYBRIDCI_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one manifest through the config discovery chain.
    Process {
        /// Manifest file (YAML or JSON).
        file: PathBuf,

        /// Contribution id (defaults to the file stem).
        #[arg(long)]
        id: Option<String>,
    },

    /// Process every manifest in a directory.
    Batch {
        /// Directory containing *.yaml, *.yml, or *.json manifests.
        dir: PathBuf,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List marketplace configs.
    List {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// Maximum rows to print.
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show marketplace stats and category counts.
    Stats {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Run JSON webhook events through the webhook chain, in order.
    Webhook {
        /// Event files (one JSON object each).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Afterwards, print the stored events for this tool.
        #[arg(long, value_name = "TOOL")]
        list: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Where the marketplace gets its configs.
#[derive(Args)]
pub(crate) struct SourceArgs {
    /// Seed N deterministic mock configs.
    #[arg(long)]
    pub mock: Option<usize>,

    /// Import contributions from GitHub.
    #[arg(long)]
    pub github: bool,
}

/// Listing filters.
#[derive(Args)]
pub(crate) struct FilterArgs {
    #[arg(long)]
    pub category: Option<ConfigCategory>,

    #[arg(long = "type")]
    pub config_type: Option<ConfigType>,

    /// Match configs carrying any of these tags (repeatable).
    #[arg(long)]
    pub tag: Vec<String>,

    #[arg(long)]
    pub min_stars: Option<u64>,

    #[arg(long)]
    pub min_quality: Option<f64>,

    /// Author login (case-insensitive).
    #[arg(long)]
    pub author: Option<String>,

    /// trending, downloads, stars, quality, or recently-updated.
    #[arg(long)]
    pub sort: Option<SortBy>,
}

impl From<FilterArgs> for ConfigFilters {
    fn from(args: FilterArgs) -> Self {
        Self {
            category: args.category,
            config_type: args.config_type,
            tags: args.tag,
            min_stars: args.min_stars,
            min_quality_score: args.min_quality,
            author: args.author,
            sort_by: args.sort,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "hybridci=info",
        1 => "hybridci=debug",
        _ => "hybridci=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Process { file, id } => cmd_process(&file, id).await,
        Command::Batch { dir, json } => cmd_batch(config_path.as_deref(), &dir, json).await,
        Command::List {
            source,
            filters,
            limit,
        } => cmd_list(config_path.as_deref(), &source, filters.into(), limit).await,
        Command::Stats { source } => cmd_stats(config_path.as_deref(), &source).await,
        Command::Webhook { files, list } => cmd_webhook(&files, list.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

fn read_manifest(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| HybridCiError::io(path, e))
        .wrap_err("failed to read manifest")
}

fn file_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_process(file: &Path, id: Option<String>) -> Result<()> {
    let input = ContributionInput {
        id: id.unwrap_or_else(|| file_id(file)),
        yaml_content: read_manifest(file)?,
        ..ContributionInput::default()
    };

    info!(id = %input.id, file = %file.display(), "processing manifest");

    let chain = ConfigDiscoveryChain::new()?;
    let reporter = CliProgress::new();
    let outcome = chain.process_with_hooks(&input, &reporter).await;
    reporter.finish();

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.valid {
        return Err(eyre!("{} failed validation", result.id));
    }
    Ok(())
}

async fn cmd_batch(config_path: Option<&Path>, dir: &Path, json: bool) -> Result<()> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| HybridCiError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(eyre!("no manifests found in '{}'", dir.display()));
    }

    let inputs = files
        .iter()
        .map(|path| {
            Ok(ContributionInput {
                id: file_id(path),
                yaml_content: read_manifest(path)?,
                ..ContributionInput::default()
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let config = resolve_config(config_path)?;
    let settings = MarketplaceSettings::from(&config);
    let chain = ConfigDiscoveryChain::with_concurrency(settings.batch_concurrency)?;

    let spinner = spinner(format!("Processing {} manifests", inputs.len()));
    let batch = chain.process_batch(&inputs).await;
    spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
        return Ok(());
    }

    println!();
    println!("  Total:      {}", batch.total);
    println!("  Successful: {}", batch.successful.len());
    println!("  Failed:     {}", batch.failed.len());
    for failed in &batch.failed {
        println!();
        println!("  ✗ {}", failed.id);
        for error in &failed.errors {
            println!("      {error}");
        }
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Marketplace commands
// ---------------------------------------------------------------------------

/// Build the service and fill it from the chosen sources.
async fn marketplace(
    config_path: Option<&Path>,
    source: &SourceArgs,
) -> Result<MarketplaceService> {
    let config = resolve_config(config_path)?;
    let mut service = MarketplaceService::new(&MarketplaceSettings::from(&config))?;

    if source.github {
        let discovery = GitHubDiscovery::new(DiscoveryOptions::from_config(&config)?)?;
        service = service.with_discovery(discovery);

        let spinner = spinner(format!("Importing repositories tagged '{}'", config.github.topic));
        let summary = service.load_from_github().await;
        spinner.finish_and_clear();

        let summary = summary?;
        info!(
            discovered = summary.discovered,
            loaded = summary.loaded,
            failed = summary.failed.len(),
            "imported from GitHub"
        );
    }

    let mock = match (source.mock, source.github) {
        (Some(n), _) => n,
        (None, false) => DEFAULT_MOCK_COUNT,
        (None, true) => 0,
    };
    if mock > 0 {
        service.seed_mock(mock).await;
    }

    Ok(service)
}

async fn cmd_list(
    config_path: Option<&Path>,
    source: &SourceArgs,
    filters: ConfigFilters,
    limit: usize,
) -> Result<()> {
    let service = marketplace(config_path, source).await?;
    let configs = service.get_configs(&filters).await;

    if configs.is_empty() {
        println!("No configs match.");
        return Ok(());
    }

    println!(
        "{:<28} {:<16} {:<12} {:>6} {:>9} {:>7}  AUTHOR",
        "ID", "CATEGORY", "TYPE", "STARS", "DOWNLOADS", "QUALITY"
    );
    for preview in configs.iter().take(limit) {
        let mut flags = String::new();
        if preview.is_featured {
            flags.push('★');
        }
        if preview.is_trending {
            flags.push('↑');
        }
        println!(
            "{:<28} {:<16} {:<12} {:>6} {:>9} {:>7.2}  {} {flags}",
            preview.id,
            preview.category.as_str(),
            preview.config_type.as_str(),
            preview.stars,
            preview.downloads,
            preview.quality_score,
            preview.author,
        );
    }
    if configs.len() > limit {
        println!("... {} more", configs.len() - limit);
    }

    Ok(())
}

async fn cmd_stats(config_path: Option<&Path>, source: &SourceArgs) -> Result<()> {
    let service = marketplace(config_path, source).await?;
    let stats = service.get_stats().await;
    let counts = service.get_category_counts().await;

    println!();
    println!("  Configs:     {}", stats.total_configs);
    println!("  Authors:     {}", stats.authors);
    println!("  Downloads:   {}", stats.total_downloads);
    println!("  Stars:       {}", stats.total_stars);
    println!("  Featured:    {}", stats.featured);
    println!("  Trending:    {}", stats.trending);
    println!("  Avg quality: {:.2}", stats.average_quality_score);
    if let Some(at) = stats.last_refreshed {
        println!("  Refreshed:   {}", at.to_rfc3339());
    }
    println!();
    for (category, count) in counts {
        println!("  {:<16} {count}", category.as_str());
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Webhook command
// ---------------------------------------------------------------------------

async fn cmd_webhook(files: &[PathBuf], list: Option<&str>) -> Result<()> {
    let chain = WebhookEventChain::new(Arc::new(InMemoryWebhookStore::new()))?;

    for file in files {
        let event = read_event(file)?;
        let outcome = chain.run(event).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);

        if let Some(err) = &outcome.storage_error {
            return Err(eyre!("{}: event validated but not stored: {err}", file.display()));
        }
    }

    if let Some(tool) = list {
        let events = chain.recent_events(tool).await?;
        info!(%tool, count = events.len(), "stored events");
        println!("{}", serde_json::to_string_pretty(&events)?);
    }
    Ok(())
}

fn read_event(file: &Path) -> Result<WebhookEvent> {
    let raw = std::fs::read_to_string(file).map_err(|e| HybridCiError::io(file, e))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("'{}' is not valid JSON", file.display()))?;
    Ok(WebhookEvent::from_value(value)?)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    spinner
}

/// Reports each chain stage on a spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Starting".into()),
        }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ChainHooks for CliProgress {
    fn link_started(&self, name: &str) {
        self.spinner.set_message(format!("{name}..."));
    }

    fn link_finished(&self, name: &str, elapsed: Duration) {
        self.spinner
            .println(format!("  ✓ {name} ({:.1}ms)", elapsed.as_secs_f64() * 1000.0));
    }

    fn link_failed(&self, name: &str, error: &HybridCiError) {
        self.spinner.println(format!("  ✗ {name}: {error}"));
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_takes_several_files_and_a_tool_to_list() {
        let args = ["hybridci", "webhook", "push.json", "pr.json", "--list", "github"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Webhook { files, list } => {
                assert_eq!(files, vec![PathBuf::from("push.json"), PathBuf::from("pr.json")]);
                assert_eq!(list.as_deref(), Some("github"));
            }
            _ => panic!("expected webhook"),
        }
    }

    #[test]
    fn webhook_requires_a_file() {
        assert!(Cli::try_parse_from(["hybridci", "webhook", "--list", "github"]).is_err());
    }
}
