//! Guarded DAG of links with sequential execution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hybridci_shared::{HybridCiError, Result};
use tracing::{debug, instrument, warn};

use crate::context::Context;
use crate::link::Link;

type Predicate = Box<dyn Fn(&Context) -> bool + Send + Sync>;

/// Observer for per-link execution events.
pub trait ChainHooks: Send + Sync {
    /// Called before a link runs.
    fn link_started(&self, name: &str);
    /// Called after a link returns successfully.
    fn link_finished(&self, name: &str, elapsed: Duration);
    /// Called when a link returns an error; the run aborts afterwards.
    fn link_failed(&self, name: &str, error: &HybridCiError);
}

/// No-op hooks for headless/test usage.
pub struct SilentHooks;

impl ChainHooks for SilentHooks {
    fn link_started(&self, _name: &str) {}
    fn link_finished(&self, _name: &str, _elapsed: Duration) {}
    fn link_failed(&self, _name: &str, _error: &HybridCiError) {}
}

struct Edge {
    from: usize,
    to: usize,
    predicate: Predicate,
}

/// An ordered, conditionally branching composition of links.
///
/// Execution starts at the entry link (the first one added unless
/// [`Chain::set_entry`] says otherwise). After each link the chain follows
/// the first outgoing edge, in declaration order, whose predicate holds;
/// when none holds the run ends and the current context is returned.
pub struct Chain {
    name: String,
    links: Vec<(String, Arc<dyn Link>)>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    entry: Option<usize>,
}

impl Chain {
    /// Create an empty chain; `name` only shows up in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            links: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            entry: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a link under a unique name.
    pub fn add_link<L>(&mut self, name: impl Into<String>, link: L) -> Result<&mut Self>
    where
        L: Link + 'static,
    {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(HybridCiError::Chain(format!(
                "link '{name}' already registered in chain '{}'",
                self.name
            )));
        }

        let idx = self.links.len();
        self.index.insert(name.clone(), idx);
        self.links.push((name, Arc::new(link)));
        if self.entry.is_none() {
            self.entry = Some(idx);
        }
        Ok(self)
    }

    /// Choose which registered link runs first.
    pub fn set_entry(&mut self, name: &str) -> Result<&mut Self> {
        self.entry = Some(self.lookup(name)?);
        Ok(self)
    }

    /// Add a guarded edge `from → to`.
    ///
    /// Edges that would close a cycle are rejected.
    pub fn connect<P>(&mut self, from: &str, to: &str, predicate: P) -> Result<&mut Self>
    where
        P: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        let from_idx = self.lookup(from)?;
        let to_idx = self.lookup(to)?;

        if from_idx == to_idx || self.reachable(to_idx, from_idx) {
            return Err(HybridCiError::Chain(format!(
                "edge '{from}' -> '{to}' would create a cycle in chain '{}'",
                self.name
            )));
        }

        self.edges.push(Edge {
            from: from_idx,
            to: to_idx,
            predicate: Box::new(predicate),
        });
        Ok(self)
    }

    /// Add an edge that is always taken.
    pub fn then(&mut self, from: &str, to: &str) -> Result<&mut Self> {
        self.connect(from, to, |_| true)
    }

    /// Registered link names in registration order.
    pub fn link_names(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(|(name, _)| name.as_str())
    }

    /// Run the chain from its entry link.
    pub async fn run(&self, ctx: Context) -> Result<Context> {
        self.run_with_hooks(ctx, &SilentHooks).await
    }

    /// Run the chain, reporting each link to `hooks`.
    #[instrument(skip_all, fields(chain = %self.name))]
    pub async fn run_with_hooks(&self, ctx: Context, hooks: &dyn ChainHooks) -> Result<Context> {
        let Some(mut current) = self.entry else {
            return Err(HybridCiError::Chain(format!(
                "chain '{}' has no links",
                self.name
            )));
        };
        let mut ctx = ctx;

        loop {
            let (name, link) = &self.links[current];
            hooks.link_started(name);
            let started = Instant::now();

            ctx = match link.call(ctx).await {
                Ok(next) => next,
                Err(e) => {
                    warn!(link = %name, error = %e, "link failed, aborting chain");
                    hooks.link_failed(name, &e);
                    return Err(e);
                }
            };

            let elapsed = started.elapsed();
            debug!(link = %name, elapsed_us = elapsed.as_micros() as u64, "link complete");
            hooks.link_finished(name, elapsed);

            let next = self
                .edges
                .iter()
                .filter(|edge| edge.from == current)
                .find(|edge| (edge.predicate)(&ctx))
                .map(|edge| edge.to);

            match next {
                Some(idx) => current = idx,
                None => break,
            }
        }

        Ok(ctx)
    }

    fn lookup(&self, name: &str) -> Result<usize> {
        self.index.get(name).copied().ok_or_else(|| {
            HybridCiError::Chain(format!("unknown link '{name}' in chain '{}'", self.name))
        })
    }

    /// Whether `target` is reachable from `start` over existing edges.
    fn reachable(&self, start: usize, target: usize) -> bool {
        let mut stack = vec![start];
        let mut seen = vec![false; self.links.len()];

        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if std::mem::replace(&mut seen[node], true) {
                continue;
            }
            stack.extend(
                self.edges
                    .iter()
                    .filter(|edge| edge.from == node)
                    .map(|edge| edge.to),
            );
        }
        false
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges: Vec<(&str, &str)> = self
            .edges
            .iter()
            .map(|edge| (self.links[edge.from].0.as_str(), self.links[edge.to].0.as_str()))
            .collect();
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("links", &self.link_names().collect::<Vec<_>>())
            .field("edges", &edges)
            .field("entry", &self.entry.map(|idx| self.links[idx].0.as_str()))
            .finish()
    }
}
