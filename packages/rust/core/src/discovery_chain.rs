//! The config discovery chain: raw contribution → validated record + preview.

use futures::StreamExt;
use futures::stream;
use hybridci_chain::{Chain, ChainHooks, Context, SilentHooks};
use hybridci_shared::{ConfigPreview, ConfigRecord, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::input::ContributionInput;
use crate::links::{
    BuildRecordLink, CreatePreviewLink, EnrichMetricsLink, ParseConfigLink, ValidateConfigLink,
    keys,
};

/// Default number of pipeline runs in flight during a batch.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Outcome of one pipeline run.
///
/// `record` and `preview` are present exactly when `valid` is true: the
/// build stages are never reached for an invalid manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub id: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub record: Option<ConfigRecord>,
    pub preview: Option<ConfigPreview>,
}

/// A successfully processed contribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedConfig {
    pub record: ConfigRecord,
    pub preview: ConfigPreview,
}

impl ProcessResult {
    /// The record/preview pair, when the run succeeded.
    pub fn into_processed(self) -> Option<ProcessedConfig> {
        match (self.valid, self.record, self.preview) {
            (true, Some(record), Some(preview)) => Some(ProcessedConfig { record, preview }),
            _ => None,
        }
    }
}

/// A contribution rejected during a batch, by validation or by a stage error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedConfig {
    pub id: String,
    pub errors: Vec<String>,
}

/// Settled outcome of [`ConfigDiscoveryChain::process_batch`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub successful: Vec<ProcessedConfig>,
    pub failed: Vec<FailedConfig>,
    pub total: usize,
}

/// parse → validate → (if valid) enrich → build → preview.
pub struct ConfigDiscoveryChain {
    chain: Chain,
    concurrency: usize,
}

impl ConfigDiscoveryChain {
    /// Wire the five stages with the default batch concurrency.
    pub fn new() -> Result<Self> {
        Self::with_concurrency(DEFAULT_BATCH_CONCURRENCY)
    }

    /// Wire the five stages, running at most `concurrency` inputs at once in a batch.
    pub fn with_concurrency(concurrency: usize) -> Result<Self> {
        let mut chain = Chain::new("config-discovery");
        chain
            .add_link("parse", ParseConfigLink)?
            .add_link("validate", ValidateConfigLink)?
            .add_link("enrich", EnrichMetricsLink)?
            .add_link("build", BuildRecordLink)?
            .add_link("preview", CreatePreviewLink)?;

        chain
            .then("parse", "validate")?
            .connect("validate", "enrich", |ctx| {
                ctx.get::<bool>(keys::VALID).copied().unwrap_or(false)
            })?
            .then("enrich", "build")?
            .then("build", "preview")?;

        Ok(Self {
            chain,
            concurrency: concurrency.max(1),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run one contribution through the chain.
    ///
    /// Validation failures come back as `valid: false`; an unparseable
    /// manifest is an `Err` naming the input id.
    pub async fn process(&self, input: &ContributionInput) -> Result<ProcessResult> {
        self.process_with_hooks(input, &SilentHooks).await
    }

    /// [`process`](Self::process), reporting each stage to `hooks`.
    #[instrument(skip_all, fields(chain = self.chain.name(), id = %input.id))]
    pub async fn process_with_hooks(
        &self,
        input: &ContributionInput,
        hooks: &dyn ChainHooks,
    ) -> Result<ProcessResult> {
        let ctx = Context::new().insert(keys::INPUT, input.clone());
        let out = self.chain.run_with_hooks(ctx, hooks).await?;

        Ok(ProcessResult {
            id: input.id.clone(),
            valid: out.get::<bool>(keys::VALID).copied().unwrap_or(false),
            errors: out.get::<Vec<String>>(keys::ERRORS).cloned().unwrap_or_default(),
            record: out.get::<ConfigRecord>(keys::RECORD).cloned(),
            preview: out.get::<ConfigPreview>(keys::PREVIEW).cloned(),
        })
    }

    /// Process many contributions concurrently and partition the outcomes.
    ///
    /// Every item settles on its own: a stage error fails only that item
    /// (its message becomes the item's error list). Results keep input order.
    #[instrument(skip_all, fields(batch_id = %Uuid::now_v7(), total = inputs.len()))]
    pub async fn process_batch(&self, inputs: &[ContributionInput]) -> BatchResult {
        let outcomes: Vec<(String, Result<ProcessResult>)> = stream::iter(inputs)
            .map(|input| async move { (input.id.clone(), self.process(input).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut successful = Vec::new();
        let mut failed = Vec::new();

        for (id, outcome) in outcomes {
            match outcome {
                Ok(result) if result.valid => match result.into_processed() {
                    Some(processed) => successful.push(processed),
                    None => failed.push(FailedConfig {
                        id,
                        errors: vec!["pipeline produced no record".into()],
                    }),
                },
                Ok(result) => failed.push(FailedConfig {
                    id,
                    errors: result.errors,
                }),
                Err(e) => {
                    warn!(%id, error = %e, "contribution failed");
                    failed.push(FailedConfig {
                        id,
                        errors: vec![e.to_string()],
                    });
                }
            }
        }

        info!(
            successful = successful.len(),
            failed = failed.len(),
            "batch processed"
        );

        BatchResult {
            successful,
            failed,
            total: inputs.len(),
        }
    }
}
