use super::*;
use assert_matches::assert_matches;
use async_trait::async_trait;
use debuglog_api::ApiError;
use debuglog_api::PipelineDocument;
use debuglog_api::TransportError;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);

struct FakeGate {
    open: HashMap<String, bool>,
    checks: AtomicUsize,
}

impl FakeGate {
    fn with(tickets: &[(&str, bool)]) -> Arc<Self> {
        Arc::new(Self {
            open: tickets
                .iter()
                .map(|(ticket, open)| ((*ticket).to_string(), *open))
                .collect(),
            checks: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TicketGate for FakeGate {
    async fn is_open(&self, ticket: &str) -> Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.open.get(ticket).copied().unwrap_or(false))
    }
}

/// In-memory pipeline that applies writes to its own document.
struct FakeStore {
    document: std::sync::Mutex<PipelineDocument>,
    writes: std::sync::Mutex<Vec<String>>,
    fetches: AtomicUsize,
    fail_writes: AtomicBool,
    /// Time each write spends between the fetch and the document update.
    write_delay: std::sync::Mutex<Duration>,
}

impl FakeStore {
    fn with_query(query: &str) -> Arc<Self> {
        Arc::new(Self {
            document: std::sync::Mutex::new(PipelineDocument::new(json!({
                "id": "pipe-1",
                "attributes": {"name": "vehicles", "filter": {"query": query}}
            }))),
            writes: std::sync::Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            write_delay: std::sync::Mutex::new(Duration::ZERO),
        })
    }

    fn set_remote_query(&self, query: &str) {
        self.document
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .set_filter_query(query);
    }

    fn remote_query(&self) -> String {
        self.document
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .filter_query()
            .to_string()
    }

    fn set_write_delay(&self, delay: Duration) {
        *self
            .write_delay
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}")) = delay;
    }

    fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .clone()
    }

    fn last_write(&self) -> Option<String> {
        self.writes().last().cloned()
    }
}

#[async_trait]
impl PipelineStore for FakeStore {
    async fn fetch_pipeline(&self) -> Result<PipelineDocument> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .document
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .clone())
    }

    async fn write_filter(&self, mut pipeline: PipelineDocument, query: &str) -> Result<()> {
        let delay = *self
            .write_delay
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DebugLogError::RemoteService(ApiError::Transport(
                TransportError::Network("connection reset".to_string()),
            )));
        }
        pipeline.set_filter_query(query);
        *self
            .document
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}")) = pipeline;
        self.writes
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
            .push(query.to_string());
        Ok(())
    }
}

fn registry(gate: Arc<FakeGate>, store: Arc<FakeStore>) -> FilterRegistry {
    FilterRegistry::new(gate, store)
}

async fn active_ids(registry: &FilterRegistry) -> Vec<String> {
    registry
        .active_filters()
        .await
        .into_iter()
        .map(|filter| filter.identifier)
        .collect()
}

#[tokio::test]
async fn enable_disable_scenario_rewrites_query() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(
        FakeGate::with(&[("INC100", true), ("INC200", true)]),
        Arc::clone(&store),
    );

    registry.enable("car-42", "INC100").await?;
    registry.enable("car-7", "INC200").await?;
    registry.disable("car-42").await?;

    assert_eq!(
        store.writes(),
        vec![
            "env:prod !(@status:debug && @car_id:car-42)".to_string(),
            "env:prod !(@status:debug && @car_id:car-42) !(@status:debug && @car_id:car-7)"
                .to_string(),
            "env:prod !(@status:debug && @car_id:car-7)".to_string(),
        ]
    );
    assert_eq!(active_ids(&registry).await, vec!["car-7".to_string()]);
    Ok(())
}

#[tokio::test]
async fn re_enable_keeps_a_single_entry() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let gate = FakeGate::with(&[("INC100", true)]);
    let registry = registry(Arc::clone(&gate), Arc::clone(&store));

    registry.enable("car-42", "INC100").await?;
    registry.enable("car-42", "INC100").await?;

    assert_eq!(active_ids(&registry).await, vec!["car-42".to_string()]);
    assert_eq!(
        store.last_write().as_deref(),
        Some("env:prod !(@status:debug && @car_id:car-42)")
    );
    // The gate is consulted on every enable.
    assert_eq!(gate.checks.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn closed_ticket_is_rejected_without_mutation() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(
        FakeGate::with(&[("INC100", true), ("INC300", false)]),
        Arc::clone(&store),
    );
    registry.enable("car-42", "INC100").await?;
    let before = active_ids(&registry).await;
    let writes_before = store.writes().len();

    let err = registry
        .enable("car-7", "INC300")
        .await
        .expect_err("closed ticket must be rejected");

    assert_matches!(err, DebugLogError::GateClosed { ref ticket } if ticket == "INC300");
    assert_eq!(active_ids(&registry).await, before);
    assert_eq!(store.writes().len(), writes_before);
    Ok(())
}

#[tokio::test]
async fn disabling_inactive_identifier_reasserts_current_query() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(FakeGate::with(&[]), Arc::clone(&store));

    registry.disable("car-99").await?;

    assert_eq!(store.last_write().as_deref(), Some("env:prod"));
    assert!(!registry.is_active("car-99").await);
    Ok(())
}

#[tokio::test]
async fn base_query_is_captured_once() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(
        FakeGate::with(&[("INC100", true), ("INC200", true)]),
        Arc::clone(&store),
    );

    registry.enable("car-1", "INC100").await?;
    store.set_remote_query("env:staging");
    registry.enable("car-2", "INC200").await?;

    assert_eq!(registry.base_query().await.as_deref(), Some("env:prod"));
    assert_eq!(
        store.last_write().as_deref(),
        Some("env:prod !(@status:debug && @car_id:car-1) !(@status:debug && @car_id:car-2)")
    );
    Ok(())
}

#[tokio::test]
async fn leftover_clauses_are_stripped_from_base() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod !(@status:debug && @car_id:old-car)");
    let registry = registry(FakeGate::with(&[("INC100", true)]), Arc::clone(&store));

    registry.enable("car-1", "INC100").await?;

    assert_eq!(registry.base_query().await.as_deref(), Some("env:prod"));
    assert_eq!(
        store.last_write().as_deref(),
        Some("env:prod !(@status:debug && @car_id:car-1)")
    );
    Ok(())
}

#[tokio::test]
async fn failed_push_keeps_local_membership() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(
        FakeGate::with(&[("INC100", true), ("INC200", true)]),
        Arc::clone(&store),
    );

    store.fail_writes.store(true, Ordering::SeqCst);
    let err = registry
        .enable("car-1", "INC100")
        .await
        .expect_err("write failure surfaces");
    assert_matches!(err, DebugLogError::RemoteService(_));
    assert!(registry.is_active("car-1").await);
    assert_eq!(store.writes(), Vec::<String>::new());

    // The next successful transition carries the earlier change with it.
    store.fail_writes.store(false, Ordering::SeqCst);
    registry.enable("car-2", "INC200").await?;
    assert_eq!(
        store.last_write().as_deref(),
        Some("env:prod !(@status:debug && @car_id:car-1) !(@status:debug && @car_id:car-2)")
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn identifier_expires_after_window() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(FakeGate::with(&[("INC100", true)]), Arc::clone(&store));
    let mut events = registry.subscribe();
    let started = Instant::now();

    registry.enable("car-42", "INC100").await?;
    let event = events.recv().await?;

    assert_eq!(
        event,
        FilterEvent::Expired {
            identifier: "car-42".to_string()
        }
    );
    assert!(started.elapsed() >= DEFAULT_EXPIRY_WINDOW);
    assert!(!registry.is_active("car-42").await);
    assert_eq!(store.last_write().as_deref(), Some("env:prod"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn re_enable_restarts_the_window() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(FakeGate::with(&[("INC100", true)]), Arc::clone(&store));
    let mut events = registry.subscribe();
    let started = Instant::now();

    registry.enable("car-42", "INC100").await?;
    tokio::time::sleep(30 * MINUTE).await;
    registry.enable("car-42", "INC100").await?;
    tokio::time::sleep(45 * MINUTE).await;

    // Past the first deadline, still inside the second.
    assert!(registry.is_active("car-42").await);
    let remaining = registry.active_filters().await[0].remaining;
    assert!(remaining <= 15 * MINUTE && remaining > 14 * MINUTE, "{remaining:?}");

    let event = events.recv().await?;
    assert_eq!(
        event,
        FilterEvent::Expired {
            identifier: "car-42".to_string()
        }
    );
    assert!(started.elapsed() >= 90 * MINUTE);
    assert!(!registry.is_active("car-42").await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn explicit_disable_cancels_expiry() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(FakeGate::with(&[("INC100", true)]), Arc::clone(&store));
    let mut events = registry.subscribe();

    registry.enable("car-42", "INC100").await?;
    registry.disable("car-42").await?;
    tokio::time::sleep(2 * DEFAULT_EXPIRY_WINDOW).await;

    assert_matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    );
    assert_eq!(store.writes().len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expiry_push_failure_is_reported_as_event() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(FakeGate::with(&[("INC100", true)]), Arc::clone(&store));
    let mut events = registry.subscribe();

    registry.enable("car-42", "INC100").await?;
    store.fail_writes.store(true, Ordering::SeqCst);

    let event = events.recv().await?;
    assert_matches!(
        event,
        FilterEvent::ExpiryFailed { ref identifier, .. } if identifier == "car-42"
    );
    assert!(!registry.is_active("car-42").await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn custom_window_is_honoured() -> anyhow::Result<()> {
    let store = FakeStore::with_query("");
    let registry = FilterRegistry::with_expiry_window(
        FakeGate::with(&[("INC100", true)]),
        Arc::clone(&store) as Arc<dyn PipelineStore>,
        5 * MINUTE,
    );
    let mut events = registry.subscribe();
    let started = Instant::now();

    registry.enable("car-1", "INC100").await?;
    assert_eq!(
        store.last_write().as_deref(),
        Some("!(@status:debug && @car_id:car-1)")
    );
    events.recv().await?;

    assert!(started.elapsed() >= 5 * MINUTE);
    assert!(started.elapsed() < DEFAULT_EXPIRY_WINDOW);
    assert_eq!(store.last_write().as_deref(), Some(""));
    Ok(())
}

#[tokio::test]
async fn shutdown_reverts_to_base_query() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(
        FakeGate::with(&[("INC100", true), ("INC200", true)]),
        Arc::clone(&store),
    );
    registry.enable("car-1", "INC100").await?;
    registry.enable("car-2", "INC200").await?;

    registry.shutdown().await?;

    assert_eq!(store.last_write().as_deref(), Some("env:prod"));
    assert_eq!(active_ids(&registry).await, Vec::<String>::new());
    Ok(())
}

#[tokio::test]
async fn shutdown_with_nothing_active_skips_remote_calls() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(FakeGate::with(&[]), Arc::clone(&store));

    registry.shutdown().await?;

    assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn shutdown_reverts_clause_left_by_failed_disable() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(FakeGate::with(&[("INC100", true)]), Arc::clone(&store));
    registry.enable("car-1", "INC100").await?;

    store.fail_writes.store(true, Ordering::SeqCst);
    let err = registry
        .disable("car-1")
        .await
        .expect_err("write failure surfaces");
    assert_matches!(err, DebugLogError::RemoteService(_));
    assert_eq!(
        store.remote_query(),
        "env:prod !(@status:debug && @car_id:car-1)"
    );

    store.fail_writes.store(false, Ordering::SeqCst);
    registry.shutdown().await?;

    assert_eq!(store.remote_query(), "env:prod");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expiry_that_loses_the_race_to_a_re_enable_is_ignored() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    let registry = registry(
        FakeGate::with(&[("INC100", true), ("INC200", true)]),
        Arc::clone(&store),
    );
    let mut events = registry.subscribe();

    registry.enable("car-42", "INC100").await?;
    tokio::time::sleep(DEFAULT_EXPIRY_WINDOW - 2 * SECOND).await;

    // A slow transition holds the lock across car-42's deadline.
    store.set_write_delay(10 * SECOND);
    let slow = tokio::spawn({
        let registry = registry.clone();
        async move { registry.enable("car-7", "INC200").await }
    });
    tokio::time::sleep(SECOND).await;

    // The re-enable queues on the lock ahead of the expiry, which fires while
    // the slow write is still running.
    let renew = tokio::spawn({
        let registry = registry.clone();
        async move { registry.enable("car-42", "INC100").await }
    });
    tokio::time::sleep(5 * SECOND).await;

    slow.await??;
    renew.await??;
    tokio::time::sleep(SECOND).await;

    assert!(registry.is_active("car-42").await);
    let remaining = registry
        .active_filters()
        .await
        .into_iter()
        .find(|filter| filter.identifier == "car-42")
        .map(|filter| filter.remaining)
        .unwrap_or_default();
    assert!(remaining > 59 * MINUTE, "{remaining:?}");
    assert_matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    );
    assert_eq!(
        store.remote_query(),
        "env:prod !(@status:debug && @car_id:car-42) !(@status:debug && @car_id:car-7)"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transitions_keep_every_active_clause() -> anyhow::Result<()> {
    let store = FakeStore::with_query("env:prod");
    store.set_write_delay(Duration::from_millis(2));
    let registry = registry(FakeGate::with(&[("INC100", true)]), Arc::clone(&store));
    let ids: Vec<String> = (0..8).map(|n| format!("car-{n}")).collect();

    let enables: Vec<_> = ids
        .iter()
        .map(|id| {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.enable(&id, "INC100").await })
        })
        .collect();
    for handle in enables {
        handle.await??;
    }

    let query = store.remote_query();
    for id in &ids {
        assert!(query.contains(&crate::suppression_clause(id)), "{id}: {query}");
    }

    let (dropped, kept) = ids.split_at(4);
    let disables: Vec<_> = dropped
        .iter()
        .map(|id| {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.disable(&id).await })
        })
        .collect();
    for handle in disables {
        handle.await??;
    }

    let query = store.remote_query();
    for id in kept {
        assert!(query.contains(&crate::suppression_clause(id)), "{id}: {query}");
    }
    for id in dropped {
        assert!(!query.contains(&crate::suppression_clause(id)), "{id}: {query}");
    }
    assert_eq!(store.writes().len(), ids.len() + dropped.len());
    Ok(())
}
