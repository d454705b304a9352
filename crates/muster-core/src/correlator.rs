//! Query correlation over the event bus.
//!
//! The gateway has no request ids: a command goes out, and some time later
//! events that happen to carry the right guild id come back, possibly split
//! across many events and interleaved with unrelated traffic. The
//! [`Correlator`] turns that into a single [`QueryHandle`] per logical query.
//!
//! ## Lifecycle
//!
//! ```text
//! begin(query)
//!   │  subscribe handler ──────────────┐
//!   │  query.start() → outbox → send   │
//!   ▼                                  ▼
//! QueryHandle ◀── resolve once ── handler: matches? → on_event()
//!                                      │ Pending → send outbox
//!                                      │ Done    → unsubscribe, resolve
//! ```
//!
//! Each query owns its state inside a slot guarded by a mutex. The result
//! goes through a oneshot sender that is taken out of the slot exactly once,
//! so a query cannot resolve twice no matter how events interleave with
//! aborts and deadlines. Commands produced while handling an event are sent
//! after the slot lock is released.

use crate::bus::{EventBus, Subscription};
use crate::metrics;
use crate::sender::{RequestSender, SendError};
use dashmap::DashMap;
use muster_protocol::{Command, GatewayEvent, Snowflake};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Identifier of an in-flight query.
pub type QueryId = u64;

/// What an in-flight query is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// Session-level events, not tied to a guild.
    Session,
    /// Events for one guild.
    Guild(Snowflake),
    /// Events for one channel of a guild.
    Channel {
        guild_id: Snowflake,
        channel_id: Snowflake,
    },
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationKey::Session => write!(f, "session"),
            CorrelationKey::Guild(guild_id) => write!(f, "guild:{guild_id}"),
            CorrelationKey::Channel {
                guild_id,
                channel_id,
            } => write!(f, "guild:{guild_id}/channel:{channel_id}"),
        }
    }
}

/// Query failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// No completing event arrived before the deadline.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The query was abandoned.
    #[error("Query cancelled")]
    Cancelled,

    /// The gateway session ended.
    #[error("Gateway disconnected")]
    Disconnected,

    /// A request could not be sent.
    #[error("Failed to send request: {0}")]
    Send(#[from] SendError),
}

impl QueryError {
    /// Short label for metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            QueryError::Timeout(_) => "timeout",
            QueryError::Cancelled => "cancelled",
            QueryError::Disconnected => "disconnected",
            QueryError::Send(_) => "send",
        }
    }
}

/// Outcome of feeding one event to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// Keep listening.
    Pending,
    /// Resolve with this result.
    Done(T),
}

/// Commands a query wants sent.
#[derive(Debug, Default)]
pub struct Outbox {
    commands: Vec<Command>,
}

impl Outbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queued commands, oldest first.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

impl IntoIterator for Outbox {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

/// Per-query state machine driven by the correlator.
///
/// Implementations hold everything a query accumulates. They never send
/// directly; commands go into the [`Outbox`].
pub trait Correlate: Send + 'static {
    /// Result type of the query.
    type Output: Send + 'static;

    /// What this query is waiting on.
    fn key(&self) -> CorrelationKey;

    /// Label for logs and metrics.
    fn kind(&self) -> &'static str {
        "query"
    }

    /// Whether an event belongs to this query. Non-matching events are
    /// never passed to [`Correlate::on_event`].
    fn matches(&self, event: &GatewayEvent) -> bool;

    /// Queue the initial request(s).
    fn start(&mut self, outbox: &mut Outbox);

    /// Consume a matching event.
    fn on_event(&mut self, event: &GatewayEvent, outbox: &mut Outbox) -> Step<Self::Output>;
}

type Resolver<T> = oneshot::Sender<Result<T, QueryError>>;
type Registry = DashMap<QueryId, Arc<dyn PendingQuery>>;

/// Type-erased view of a query slot, for supervision.
trait PendingQuery: Send + Sync {
    fn key(&self) -> CorrelationKey;
    fn abort(&self, error: QueryError) -> bool;
}

struct Inflight<Q: Correlate> {
    state: Q,
    resolver: Resolver<Q::Output>,
}

struct QuerySlot<Q: Correlate> {
    id: QueryId,
    key: CorrelationKey,
    kind: &'static str,
    started: Instant,
    inflight: Mutex<Option<Inflight<Q>>>,
    subscription: OnceLock<Subscription>,
    registry: Weak<Registry>,
    sender: Arc<dyn RequestSender>,
}

impl<Q: Correlate> QuerySlot<Q> {
    fn lock(&self) -> MutexGuard<'_, Option<Inflight<Q>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_settled(&self) -> bool {
        self.lock().is_none()
    }

    fn handle(&self, event: &GatewayEvent) {
        let mut outbox = Outbox::new();

        let finished = {
            let mut guard = self.lock();
            let Some(inflight) = guard.as_mut() else {
                return;
            };
            if !inflight.state.matches(event) {
                return;
            }
            match inflight.state.on_event(event, &mut outbox) {
                Step::Pending => None,
                Step::Done(output) => Some((guard.take(), output)),
            }
        };

        match finished {
            Some((inflight, output)) => {
                self.settle(inflight, Ok(output));
            }
            None => self.flush(outbox),
        }
    }

    fn flush(&self, outbox: Outbox) {
        for command in outbox {
            let op = command.opcode();
            if let Err(error) = self.sender.send(command) {
                warn!(query = self.id, key = %self.key, ?op, error = %error, "Failed to send query request");
                let inflight = self.lock().take();
                self.settle(inflight, Err(QueryError::Send(error)));
                return;
            }
        }
    }

    fn settle(&self, inflight: Option<Inflight<Q>>, outcome: Result<Q::Output, QueryError>) -> bool {
        self.detach();

        let Some(inflight) = inflight else {
            return false;
        };

        match &outcome {
            Ok(_) => {
                let elapsed = self.started.elapsed();
                debug!(query = self.id, key = %self.key, kind = self.kind, ?elapsed, "Query resolved");
                metrics::record_completed(self.kind, elapsed);
            }
            Err(error) => {
                debug!(query = self.id, key = %self.key, kind = self.kind, error = %error, "Query failed");
                metrics::record_failed(self.kind, error.reason());
            }
        }

        // The handle may already be gone; nobody is left to tell.
        let _ = inflight.resolver.send(outcome);
        true
    }

    fn detach(&self) {
        if let Some(subscription) = self.subscription.get() {
            subscription.cancel();
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
    }
}

impl<Q: Correlate> PendingQuery for QuerySlot<Q> {
    fn key(&self) -> CorrelationKey {
        self.key
    }

    fn abort(&self, error: QueryError) -> bool {
        let inflight = self.lock().take();
        self.settle(inflight, Err(error))
    }
}

/// Pending result of a query.
///
/// Await it directly for an unbounded wait, or use [`QueryHandle::wait`]
/// for a deadline. Dropping an unresolved handle cancels the query.
pub struct QueryHandle<T> {
    id: QueryId,
    key: CorrelationKey,
    receiver: oneshot::Receiver<Result<T, QueryError>>,
    control: Arc<dyn PendingQuery>,
}

impl<T> QueryHandle<T> {
    /// Get the query id.
    #[must_use]
    pub fn id(&self) -> QueryId {
        self.id
    }

    /// Get the correlation key.
    #[must_use]
    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    /// Force the query to fail with `error`, unsubscribing it.
    ///
    /// Returns `false` if the query had already resolved.
    pub fn abort(&self, error: QueryError) -> bool {
        self.control.abort(error)
    }

    /// Wait for the result, failing with [`QueryError::Timeout`] after
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the query's failure, or `Timeout` if the deadline passed first.
    pub async fn wait(mut self, timeout: Duration) -> Result<T, QueryError> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(result) => result.unwrap_or(Err(QueryError::Cancelled)),
            Err(_) => {
                self.control.abort(QueryError::Timeout(timeout));
                // Either the timeout just delivered, or a result that won the race.
                (&mut self.receiver)
                    .await
                    .unwrap_or(Err(QueryError::Cancelled))
            }
        }
    }
}

impl<T> Future for QueryHandle<T> {
    type Output = Result<T, QueryError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(QueryError::Cancelled)))
    }
}

impl<T> Drop for QueryHandle<T> {
    fn drop(&mut self) {
        if self.control.abort(QueryError::Cancelled) {
            debug!(query = self.id, key = %self.key, "Query handle dropped before resolution");
        }
    }
}

impl<T> fmt::Debug for QueryHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

/// Runs queries against an event bus and a request sender.
pub struct Correlator {
    bus: EventBus,
    sender: Arc<dyn RequestSender>,
    pending: Arc<Registry>,
    next_id: AtomicU64,
}

impl Correlator {
    /// Create a correlator.
    #[must_use]
    pub fn new(bus: EventBus, sender: Arc<dyn RequestSender>) -> Self {
        Self {
            bus,
            sender,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start a query.
    ///
    /// The handler is subscribed before the initial request is sent. A send
    /// failure resolves the handle with [`QueryError::Send`].
    pub fn begin<Q: Correlate>(&self, mut query: Q) -> QueryHandle<Q::Output> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = query.key();
        let kind = query.kind();
        let (resolver, receiver) = oneshot::channel();

        let mut outbox = Outbox::new();
        query.start(&mut outbox);

        // State is in place before the slot is reachable from the registry
        // or the bus, so an abort from another task always finds it.
        let slot = Arc::new(QuerySlot {
            id,
            key,
            kind,
            started: Instant::now(),
            inflight: Mutex::new(Some(Inflight {
                state: query,
                resolver,
            })),
            subscription: OnceLock::new(),
            registry: Arc::downgrade(&self.pending),
            sender: Arc::clone(&self.sender),
        });

        metrics::record_started(kind);
        self.pending
            .insert(id, Arc::clone(&slot) as Arc<dyn PendingQuery>);
        let handler = Arc::clone(&slot);
        let subscription = self.bus.subscribe(move |event| handler.handle(event));
        // The cell is fresh, so this cannot fail.
        let _ = slot.subscription.set(subscription);

        if slot.is_settled() {
            // Settled before the subscription existed; drop it now.
            slot.detach();
            debug!(query = id, key = %key, kind, "Query settled while starting");
        } else {
            debug!(query = id, key = %key, kind, requests = outbox.len(), "Query begun");
            slot.flush(outbox);
        }

        QueryHandle {
            id,
            key,
            receiver,
            control: slot,
        }
    }

    /// Number of unresolved queries.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Correlation keys of unresolved queries.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<CorrelationKey> {
        self.pending.iter().map(|entry| entry.value().key()).collect()
    }

    /// Fail one query.
    ///
    /// Returns `false` if it is unknown or already resolved.
    pub fn abort(&self, id: QueryId, error: QueryError) -> bool {
        let query = self.pending.get(&id).map(|entry| Arc::clone(entry.value()));
        query.map(|query| query.abort(error)).unwrap_or(false)
    }

    /// Fail every unresolved query with `error`.
    ///
    /// Returns the number of queries failed.
    pub fn abort_all(&self, error: QueryError) -> usize {
        let pending: Vec<Arc<dyn PendingQuery>> = self
            .pending
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let aborted = pending
            .iter()
            .filter(|query| query.abort(error.clone()))
            .count();

        if aborted > 0 {
            debug!(aborted, error = %error, "Aborted pending queries");
        }
        aborted
    }
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("bus", &self.bus)
            .field("pending", &self.pending.len())
            .finish()
    }
}
