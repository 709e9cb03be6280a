//! Query descriptions and resolvers.
//!
//! A query resolves either immediately, by returning a value, or deferred, by
//! receiving a [`ResultSlot`] it fills later. Deferred resolution is bounded
//! by the configured query timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use messaging::Message;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

use crate::error::{EngineError, Result};

#[derive(Debug, Error)]
pub enum QueryError {
    /// The resolver did not fill its slot in time.
    #[error("query {query_name} timed out after {timeout:?}")]
    Timeout {
        query_name: String,
        timeout: Duration,
    },

    /// The resolver dropped its slot without filling it.
    #[error("query {0} was abandoned by its resolver")]
    Abandoned(String),

    #[error("query {query_name} rejected: {reason}")]
    Rejected { query_name: String, reason: String },
}

/// Loads live aggregate state on behalf of a resolver.
#[async_trait]
pub trait AggregateStateLoader: Send + Sync {
    async fn load_state(&self, aggregate_type: &str, aggregate_id: &str) -> Result<Value>;
}

/// What a resolver may read while answering a query.
#[derive(Clone)]
pub struct QueryContext {
    loader: Arc<dyn AggregateStateLoader>,
    events: broadcast::Sender<Message>,
}

impl QueryContext {
    pub(crate) fn new(
        loader: Arc<dyn AggregateStateLoader>,
        events: broadcast::Sender<Message>,
    ) -> Self {
        Self { loader, events }
    }

    /// Replays an aggregate and returns its serialized state.
    pub async fn aggregate_state(&self, aggregate_type: &str, aggregate_id: &str) -> Result<Value> {
        self.loader.load_state(aggregate_type, aggregate_id).await
    }

    /// Subscribes to events recorded from now on.
    pub fn watch(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("watchers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

/// One-shot destination for a deferred query result.
#[derive(Debug)]
pub struct ResultSlot {
    query_name: String,
    sender: oneshot::Sender<Result<Value>>,
}

impl ResultSlot {
    pub(crate) fn new(query_name: &str) -> (Self, oneshot::Receiver<Result<Value>>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                query_name: query_name.to_string(),
                sender,
            },
            receiver,
        )
    }

    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    pub fn fulfill(self, value: Value) {
        self.send(Ok(value));
    }

    pub fn reject(self, reason: impl Into<String>) {
        let err = QueryError::Rejected {
            query_name: self.query_name.clone(),
            reason: reason.into(),
        };
        self.send(Err(err.into()));
    }

    /// Fails the query with an engine error, e.g. from a state load.
    pub fn fail(self, err: EngineError) {
        self.send(Err(err));
    }

    fn send(self, result: Result<Value>) {
        if self.sender.send(result).is_err() {
            tracing::debug!(query = %self.query_name, "query result arrived after the caller gave up");
        }
    }
}

/// Resolves a query by returning its result.
#[async_trait]
pub trait QueryResolver: Send + Sync {
    async fn resolve(&self, query: &Message, context: &QueryContext) -> Result<Value>;
}

/// Resolves a query by filling a [`ResultSlot`], typically from a spawned task.
pub trait DeferredQueryResolver: Send + Sync {
    fn start(&self, query: Message, context: QueryContext, slot: ResultSlot);
}

impl<F> DeferredQueryResolver for F
where
    F: Fn(Message, QueryContext, ResultSlot) + Send + Sync,
{
    fn start(&self, query: Message, context: QueryContext, slot: ResultSlot) {
        self(query, context, slot)
    }
}

/// Answers with the live state of the aggregate whose id is in the query
/// payload under `identity_key`.
#[derive(Debug, Clone)]
pub struct AggregateStateResolver {
    aggregate_type: String,
    identity_key: String,
}

impl AggregateStateResolver {
    pub fn new(aggregate_type: impl Into<String>, identity_key: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            identity_key: identity_key.into(),
        }
    }
}

#[async_trait]
impl QueryResolver for AggregateStateResolver {
    async fn resolve(&self, query: &Message, context: &QueryContext) -> Result<Value> {
        let id = match query.get(&self.identity_key) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(EngineError::MissingAggregateIdentifier {
                    command_name: query.name().to_string(),
                    key: self.identity_key.clone(),
                });
            }
        };
        context.aggregate_state(&self.aggregate_type, &id).await
    }
}

#[derive(Clone)]
pub enum Resolver {
    Immediate(Arc<dyn QueryResolver>),
    Deferred(Arc<dyn DeferredQueryResolver>),
}

impl Resolver {
    pub fn immediate(resolver: impl QueryResolver + 'static) -> Self {
        Resolver::Immediate(Arc::new(resolver))
    }

    pub fn deferred(resolver: impl DeferredQueryResolver + 'static) -> Self {
        Resolver::Deferred(Arc::new(resolver))
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolver::Immediate(_) => f.write_str("Resolver::Immediate"),
            Resolver::Deferred(_) => f.write_str("Resolver::Deferred"),
        }
    }
}

/// Binds a registered query to its resolver.
#[derive(Debug, Clone)]
pub struct QueryDescription {
    query_name: String,
    resolver: Resolver,
}

impl QueryDescription {
    pub fn new(query_name: impl Into<String>, resolver: Resolver) -> Self {
        Self {
            query_name: query_name.into(),
            resolver,
        }
    }

    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    /// Runs the resolver, bounding deferred resolution by `timeout`.
    pub(crate) async fn run(
        &self,
        query: Message,
        context: QueryContext,
        timeout: Duration,
    ) -> Result<Value> {
        match &self.resolver {
            Resolver::Immediate(resolver) => resolver.resolve(&query, &context).await,
            Resolver::Deferred(resolver) => {
                let (slot, receiver) = ResultSlot::new(&self.query_name);
                resolver.start(query, context, slot);
                match tokio::time::timeout(timeout, receiver).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(QueryError::Abandoned(self.query_name.clone()).into()),
                    Err(_) => Err(QueryError::Timeout {
                        query_name: self.query_name.clone(),
                        timeout,
                    }
                    .into()),
                }
            }
        }
    }
}
