use crate::compose::compose_query;
use crate::compose::strip_suppression_clauses;
use crate::config::DebugLogConfig;
use crate::error::DebugLogError;
use crate::error::Result;
use crate::gate::IncidentGate;
use crate::gate::TicketGate;
use crate::store::PipelineStore;
use debuglog_api::IncidentClient;
use debuglog_api::PipelineClient;
use debuglog_api::ReqwestTransport;
use indexmap::IndexMap;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// How long debug logs stay enabled after the most recent enable.
pub const DEFAULT_EXPIRY_WINDOW: Duration = Duration::from_secs(60 * 60);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Transitions that happen without a caller to report them to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    /// The window lapsed and the pipeline was updated without the identifier.
    Expired { identifier: String },
    /// The window lapsed and the identifier was dropped locally, but pushing
    /// the new query failed.
    ExpiryFailed { identifier: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFilter {
    pub identifier: String,
    pub remaining: Duration,
}

/// Registry of car ids with debug logging enabled.
///
/// Clones share one state. Enable, disable and expiry all take the same lock
/// and hold it across the pipeline read-modify-write, so concurrent
/// transitions are applied one at a time and the last write always reflects
/// the full membership.
#[derive(Clone)]
pub struct FilterRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    gate: Arc<dyn TicketGate>,
    store: Arc<dyn PipelineStore>,
    expiry_window: Duration,
    state: Mutex<RegistryState>,
    events: broadcast::Sender<FilterEvent>,
}

#[derive(Default)]
struct RegistryState {
    /// Insertion ordered; a re-enable keeps the identifier's position.
    active: IndexMap<String, ExpiryTimer>,
    /// Pipeline filter as it was before this process added any clause.
    base_query: Option<String>,
    next_generation: u64,
}

/// Pending expiry for one identifier. Dropping it cancels the task.
struct ExpiryTimer {
    generation: u64,
    deadline: Instant,
    cancel: CancellationToken,
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl FilterRegistry {
    pub fn new(gate: Arc<dyn TicketGate>, store: Arc<dyn PipelineStore>) -> Self {
        Self::with_expiry_window(gate, store, DEFAULT_EXPIRY_WINDOW)
    }

    pub fn with_expiry_window(
        gate: Arc<dyn TicketGate>,
        store: Arc<dyn PipelineStore>,
        expiry_window: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RegistryInner {
                gate,
                store,
                expiry_window,
                state: Mutex::new(RegistryState::default()),
                events,
            }),
        }
    }

    /// Wires the incident gate and pipeline client over a shared reqwest
    /// transport.
    pub fn from_config(config: &DebugLogConfig) -> Self {
        let transport = ReqwestTransport::default();
        let gate = IncidentGate::new(IncidentClient::new(
            transport.clone(),
            &config.ticketing.base_url,
            config.ticketing.auth.clone(),
        ));
        let store = PipelineClient::new(
            transport,
            &config.pipeline.api_base_url,
            &config.pipeline.pipeline_id,
            config.pipeline.auth.clone(),
        );
        Self::new(Arc::new(gate), Arc::new(store))
    }

    pub fn expiry_window(&self) -> Duration {
        self.inner.expiry_window
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FilterEvent> {
        self.inner.events.subscribe()
    }

    /// Lets debug logs through for `identifier` if `ticket` is open.
    ///
    /// Re-enabling an active identifier restarts its window. If the pipeline
    /// update fails the identifier stays active locally; the next successful
    /// transition brings the remote query back in line.
    pub async fn enable(&self, identifier: &str, ticket: &str) -> Result<()> {
        if !self.inner.gate.is_open(ticket).await? {
            return Err(DebugLogError::GateClosed {
                ticket: ticket.to_string(),
            });
        }

        let mut state = self.inner.state.lock().await;
        state.next_generation += 1;
        let timer = self.schedule_expiry(identifier, state.next_generation);
        let replaced = state.active.insert(identifier.to_string(), timer).is_some();
        info!(
            identifier,
            ticket,
            replaced,
            window_secs = self.inner.expiry_window.as_secs(),
            "debug logs enabled"
        );
        self.inner.apply_all(&mut state).await
    }

    /// Stops letting debug logs through for `identifier`.
    ///
    /// Tolerates identifiers that are not active: membership is unchanged and
    /// the current query is written again.
    pub async fn disable(&self, identifier: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.active.shift_remove(identifier).is_some() {
            info!(identifier, "debug logs disabled");
        } else {
            debug!(identifier, "disable requested for inactive identifier");
        }
        self.inner.apply_all(&mut state).await
    }

    pub async fn is_active(&self, identifier: &str) -> bool {
        self.inner.state.lock().await.active.contains_key(identifier)
    }

    /// Active identifiers in the order they were first enabled.
    pub async fn active_filters(&self) -> Vec<ActiveFilter> {
        let state = self.inner.state.lock().await;
        let now = Instant::now();
        state
            .active
            .iter()
            .map(|(identifier, timer)| ActiveFilter {
                identifier: identifier.clone(),
                remaining: timer.deadline.saturating_duration_since(now),
            })
            .collect()
    }

    /// The captured base query, once any transition has run.
    pub async fn base_query(&self) -> Option<String> {
        self.inner.state.lock().await.base_query.clone()
    }

    /// Cancels every pending expiry and writes the base query back.
    ///
    /// The write happens whenever any transition has run, even with nothing
    /// active locally, so a clause left behind by an earlier failed push is
    /// removed too.
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.active.is_empty() && state.base_query.is_none() {
            return Ok(());
        }
        let reverted = state.active.len();
        state.active.clear();
        info!(reverted, "reverting all debug log filters");
        self.inner.apply_all(&mut state).await
    }

    fn schedule_expiry(&self, identifier: &str, generation: u64) -> ExpiryTimer {
        let cancel = CancellationToken::new();
        let window = self.inner.expiry_window;
        let inner: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let identifier = identifier.to_string();
        let cancelled = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(window) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.expire(&identifier, generation).await;
                    }
                }
            }
        });
        ExpiryTimer {
            generation,
            deadline: Instant::now() + window,
            cancel,
        }
    }
}

impl RegistryInner {
    async fn expire(&self, identifier: &str, generation: u64) {
        let mut state = self.state.lock().await;
        // The entry may have been replaced or removed while this task waited
        // for the lock.
        if state.active.get(identifier).map(|timer| timer.generation) != Some(generation) {
            return;
        }
        state.active.shift_remove(identifier);
        info!(identifier, "debug log window expired");

        let event = match self.apply_all(&mut state).await {
            Ok(()) => FilterEvent::Expired {
                identifier: identifier.to_string(),
            },
            Err(err) => {
                warn!(identifier, error = %err, "failed to update pipeline after expiry");
                FilterEvent::ExpiryFailed {
                    identifier: identifier.to_string(),
                    message: err.to_string(),
                }
            }
        };
        drop(state);
        let _ = self.events.send(event);
    }

    /// Rewrites the remote filter from the base query and current membership.
    async fn apply_all(&self, state: &mut RegistryState) -> Result<()> {
        let pipeline = self.store.fetch_pipeline().await?;
        let base = state
            .base_query
            .get_or_insert_with(|| {
                let base = strip_suppression_clauses(pipeline.filter_query());
                debug!(base_query = %base, "captured base pipeline query");
                base
            })
            .clone();
        let query = compose_query(&base, state.active.keys());
        self.store.write_filter(pipeline, &query).await
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
