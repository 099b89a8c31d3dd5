//! Webhook event chain: validate → store → route.
//!
//! Events arrive as loosely-typed JSON objects from CI tools. The chain
//! rejects events missing required fields, records the rest in a
//! [`WebhookEventStore`], and derives a `tool/event_type` route for them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hybridci_chain::{Chain, Context, Link};
use hybridci_shared::{HybridCiError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{error, info, instrument};

/// Fields every webhook event must carry, in check order.
pub const REQUIRED_EVENT_FIELDS: [&str; 6] = [
    "event_id",
    "tool",
    "event_type",
    "timestamp",
    "metadata",
    "payload",
];

const DEFAULT_LIST_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// WebhookEvent
// ---------------------------------------------------------------------------

/// A normalized webhook event as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookEvent(pub Map<String, Value>);

impl WebhookEvent {
    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(HybridCiError::validation(format!(
                "webhook event must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        self.str_field("event_id")
    }

    pub fn tool(&self) -> Option<&str> {
        self.str_field("tool")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.str_field("event_type")
    }

    /// RFC 3339 timestamp; sorts lexically.
    pub fn timestamp(&self) -> Option<&str> {
        self.str_field("timestamp")
    }

    /// Required fields this event does not carry.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_EVENT_FIELDS
            .into_iter()
            .filter(|f| !self.0.contains_key(*f))
            .collect()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Persistence for webhook events.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Save an event, returning its id.
    async fn save_event(&self, event: &WebhookEvent) -> Result<String>;

    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEvent>>;

    /// Events for `tool`, most recent first.
    async fn list_events(&self, tool: &str, limit: usize) -> Result<Vec<WebhookEvent>>;

    /// Events of `event_type`, most recent first.
    async fn list_events_by_type(&self, event_type: &str, limit: usize)
    -> Result<Vec<WebhookEvent>>;

    /// Returns `false` when no event had that id.
    async fn delete_event(&self, event_id: &str) -> Result<bool>;
}

/// Process-local event store.
#[derive(Default)]
pub struct InMemoryWebhookStore {
    events: RwLock<HashMap<String, WebhookEvent>>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.events.write().await.clear();
    }

    async fn list_where<F>(&self, limit: usize, keep: F) -> Vec<WebhookEvent>
    where
        F: Fn(&WebhookEvent) -> bool,
    {
        let events = self.events.read().await;
        let mut matching: Vec<WebhookEvent> =
            events.values().filter(|e| keep(e)).cloned().collect();
        matching.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        matching.truncate(limit);
        matching
    }
}

#[async_trait]
impl WebhookEventStore for InMemoryWebhookStore {
    async fn save_event(&self, event: &WebhookEvent) -> Result<String> {
        let id = event
            .event_id()
            .ok_or_else(|| HybridCiError::Store("event_id must be a string".into()))?
            .to_string();
        self.events.write().await.insert(id.clone(), event.clone());
        Ok(id)
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEvent>> {
        Ok(self.events.read().await.get(event_id).cloned())
    }

    async fn list_events(&self, tool: &str, limit: usize) -> Result<Vec<WebhookEvent>> {
        Ok(self.list_where(limit, |e| e.tool() == Some(tool)).await)
    }

    async fn list_events_by_type(
        &self,
        event_type: &str,
        limit: usize,
    ) -> Result<Vec<WebhookEvent>> {
        Ok(self
            .list_where(limit, |e| e.event_type() == Some(event_type))
            .await)
    }

    async fn delete_event(&self, event_id: &str) -> Result<bool> {
        Ok(self.events.write().await.remove(event_id).is_some())
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

mod keys {
    pub const EVENT: &str = "webhook_event";
    pub const VALIDATED: &str = "validated";
    pub const STORED_EVENT_ID: &str = "stored_event_id";
    pub const STORAGE_ERROR: &str = "storage_error";
    pub const ROUTE: &str = "route";
}

struct ValidateEventLink;

#[async_trait]
impl Link for ValidateEventLink {
    async fn call(&self, ctx: Context) -> Result<Context> {
        let event = ctx.require::<WebhookEvent>(keys::EVENT)?;
        let missing = event.missing_fields();
        if !missing.is_empty() {
            return Err(HybridCiError::validation(format!(
                "Missing required fields: [{}]",
                missing.join(", ")
            )));
        }
        Ok(ctx.insert(keys::VALIDATED, true))
    }
}

struct StoreEventLink {
    store: Arc<dyn WebhookEventStore>,
}

#[async_trait]
impl Link for StoreEventLink {
    async fn call(&self, ctx: Context) -> Result<Context> {
        let event = ctx.require::<WebhookEvent>(keys::EVENT)?;
        match self.store.save_event(event).await {
            Ok(id) => {
                info!(event_id = %id, "stored webhook event");
                Ok(ctx.insert(keys::STORED_EVENT_ID, id))
            }
            Err(e) => {
                error!(error = %e, "failed to store webhook event");
                Ok(ctx.insert(keys::STORAGE_ERROR, e.to_string()))
            }
        }
    }
}

struct RouteEventLink;

#[async_trait]
impl Link for RouteEventLink {
    async fn call(&self, ctx: Context) -> Result<Context> {
        let event = ctx.require::<WebhookEvent>(keys::EVENT)?;
        let route = format!(
            "{}/{}",
            event.tool().unwrap_or_default(),
            event.event_type().unwrap_or_default()
        );
        info!(%route, "routing webhook event");
        Ok(ctx.insert(keys::ROUTE, route))
    }
}

// ---------------------------------------------------------------------------
// WebhookEventChain
// ---------------------------------------------------------------------------

/// What the chain did with one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WebhookOutcome {
    pub validated: bool,
    pub stored_event_id: Option<String>,
    pub route: Option<String>,
    pub storage_error: Option<String>,
}

/// validate → store → route (route only once the event is stored).
pub struct WebhookEventChain {
    chain: Chain,
    store: Arc<dyn WebhookEventStore>,
}

impl WebhookEventChain {
    pub fn new(store: Arc<dyn WebhookEventStore>) -> Result<Self> {
        let mut chain = Chain::new("webhook-event");
        chain
            .add_link("validate", ValidateEventLink)?
            .add_link(
                "store",
                StoreEventLink {
                    store: Arc::clone(&store),
                },
            )?
            .add_link("route", RouteEventLink)?;

        chain
            .connect("validate", "store", |ctx| {
                ctx.get::<bool>(keys::VALIDATED).copied().unwrap_or(false)
            })?
            .connect("store", "route", |ctx| ctx.contains(keys::STORED_EVENT_ID))?;

        Ok(Self { chain, store })
    }

    pub fn store(&self) -> &Arc<dyn WebhookEventStore> {
        &self.store
    }

    /// Run one event. Missing required fields fail the run; a store failure
    /// is reported in the outcome instead.
    #[instrument(
        skip_all,
        fields(chain = self.chain.name(), event_id = event.event_id().unwrap_or("?"))
    )]
    pub async fn run(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        let ctx = Context::new().insert(keys::EVENT, event);
        let out = self.chain.run(ctx).await?;

        Ok(WebhookOutcome {
            validated: out.get::<bool>(keys::VALIDATED).copied().unwrap_or(false),
            stored_event_id: out.get::<String>(keys::STORED_EVENT_ID).cloned(),
            route: out.get::<String>(keys::ROUTE).cloned(),
            storage_error: out.get::<String>(keys::STORAGE_ERROR).cloned(),
        })
    }

    /// Most recent stored events for a tool.
    pub async fn recent_events(&self, tool: &str) -> Result<Vec<WebhookEvent>> {
        self.store.list_events(tool, DEFAULT_LIST_LIMIT).await
    }
}
