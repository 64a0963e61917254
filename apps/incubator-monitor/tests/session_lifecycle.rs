//! Session Lifecycle Integration Tests
//!
//! Drives the session engine through the full connection lifecycle over
//! scripted in-process ports: startup probing, interactive connect,
//! historical seeding, live appends, identity changes, degradation and
//! teardown.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Semaphore, broadcast, mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use incubator_monitor::{
    AccountAddress, AgentError, AgentEvent, ChainId, ConnectionState, ContractDescriptor,
    DEFAULT_CHART_WINDOW, FeedError, FeedEvent, FeedHandle, LedgerChannels, LedgerConnectorPort,
    LiveFeedPort, MonitorEngine, QueryError, ReadingQueryPort, ReadingRecord, SessionCommand,
    SessionError, SessionExit, SessionSnapshot, SigningAgentPort,
};

/// Upper bound for any single awaited condition.
const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Scripted Ports
// =============================================================================

/// Signing agent with scripted answers and a push channel for
/// notifications.
struct ScriptedAgent {
    current: Mutex<Vec<AccountAddress>>,
    granted: Mutex<Result<Vec<AccountAddress>, AgentError>>,
    chain: Mutex<ChainId>,
    probe_fails: AtomicBool,
    request_calls: AtomicUsize,
    events: broadcast::Sender<AgentEvent>,
}

impl ScriptedAgent {
    fn new(current: &[&str], granted: &[&str]) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            current: Mutex::new(current.iter().map(ToString::to_string).collect()),
            granted: Mutex::new(Ok(granted.iter().map(ToString::to_string).collect())),
            chain: Mutex::new("0x539".to_string()),
            probe_fails: AtomicBool::new(false),
            request_calls: AtomicUsize::new(0),
            events,
        })
    }

    fn refuse_grants(&self, err: AgentError) {
        *self.granted.lock().unwrap() = Err(err);
    }

    fn fail_probe(&self) {
        self.probe_fails.store(true, Ordering::SeqCst);
    }

    fn notify(&self, event: AgentEvent) {
        self.events.send(event).unwrap();
    }

    fn request_count(&self) -> usize {
        self.request_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningAgentPort for ScriptedAgent {
    async fn current_accounts(&self) -> Result<Vec<AccountAddress>, AgentError> {
        if self.probe_fails.load(Ordering::SeqCst) {
            return Err(AgentError::Unavailable {
                message: "connection refused".to_string(),
            });
        }
        Ok(self.current.lock().unwrap().clone())
    }

    async fn request_accounts(&self) -> Result<Vec<AccountAddress>, AgentError> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        self.granted.lock().unwrap().clone()
    }

    async fn chain_id(&self) -> Result<ChainId, AgentError> {
        Ok(self.chain.lock().unwrap().clone())
    }

    fn notifications(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }
}

/// Query channel answering from a mutable in-memory dataset.
struct StaticQuery {
    records: Mutex<Vec<ReadingRecord>>,
    fail: AtomicBool,
}

impl StaticQuery {
    fn with_records(records: Vec<ReadingRecord>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            fail: AtomicBool::new(false),
        })
    }

    fn set_records(&self, records: Vec<ReadingRecord>) {
        *self.records.lock().unwrap() = records;
    }

    fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReadingQueryPort for StaticQuery {
    async fn fetch_all_readings(&self) -> Result<Vec<ReadingRecord>, QueryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QueryError::Transport {
                message: "gateway down".to_string(),
            });
        }
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Query channel that parks every fetch on a gate until released. Each
/// call pops the next scripted dataset on entry, so the dataset maps to
/// the session epoch that launched the call.
struct GatedQuery {
    gate: Semaphore,
    datasets: Mutex<VecDeque<Vec<ReadingRecord>>>,
    entered: AtomicUsize,
}

impl GatedQuery {
    fn with_datasets(datasets: Vec<Vec<ReadingRecord>>) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            datasets: Mutex::new(datasets.into()),
            entered: AtomicUsize::new(0),
        })
    }

    fn release(&self, fetches: usize) {
        self.gate.add_permits(fetches);
    }

    async fn wait_entered(&self, n: usize) {
        let deadline = Instant::now() + WAIT;
        while self.entered.load(Ordering::SeqCst) < n {
            assert!(Instant::now() < deadline, "fetch {n} never started");
            sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ReadingQueryPort for GatedQuery {
    async fn fetch_all_readings(&self) -> Result<Vec<ReadingRecord>, QueryError> {
        let dataset = self.datasets.lock().unwrap().pop_front().unwrap_or_default();
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.map_err(|_| QueryError::Transport {
            message: "gate closed".to_string(),
        })?;
        permit.forget();
        Ok(dataset)
    }
}

/// Live feed handing out sinks the test can push through.
struct ScriptedFeed {
    refuse: AtomicBool,
    sinks: Mutex<Vec<mpsc::Sender<FeedEvent>>>,
}

impl ScriptedFeed {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            refuse: AtomicBool::new(false),
            sinks: Mutex::new(Vec::new()),
        })
    }

    fn refuse_subscriptions(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    fn subscription_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    async fn push(&self, event: FeedEvent) {
        let sink = {
            let sinks = self.sinks.lock().unwrap();
            sinks.last().cloned().expect("no active subscription")
        };
        sink.send(event).await.expect("engine dropped the feed receiver");
    }
}

#[async_trait]
impl LiveFeedPort for ScriptedFeed {
    async fn subscribe(&self, sink: mpsc::Sender<FeedEvent>) -> Result<FeedHandle, FeedError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(FeedError::Handshake {
                message: "subscription refused".to_string(),
            });
        }
        self.sinks.lock().unwrap().push(sink);
        Ok(FeedHandle::new(CancellationToken::new()))
    }
}

/// Connector pairing any query fake with the scripted feed.
struct FakeConnector {
    query: Arc<dyn ReadingQueryPort>,
    feed: Arc<ScriptedFeed>,
    fail_bind: AtomicBool,
    binds: AtomicUsize,
}

impl FakeConnector {
    fn new(query: Arc<dyn ReadingQueryPort>, feed: Arc<ScriptedFeed>) -> Arc<Self> {
        Arc::new(Self {
            query,
            feed,
            fail_bind: AtomicBool::new(false),
            binds: AtomicUsize::new(0),
        })
    }

    fn fail_binding(&self) {
        self.fail_bind.store(true, Ordering::SeqCst);
    }

    fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerConnectorPort for FakeConnector {
    async fn bind(&self, _descriptor: &ContractDescriptor) -> Result<LedgerChannels, QueryError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(QueryError::Transport {
                message: "gateway refused".to_string(),
            });
        }
        Ok(LedgerChannels {
            query: self.query.clone(),
            feed: self.feed.clone(),
        })
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    engine: tokio::task::JoinHandle<SessionExit>,
}

impl Harness {
    async fn wait_until(
        &mut self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        timeout(WAIT, self.snapshots.wait_for(predicate))
            .await
            .expect("snapshot condition not reached in time")
            .expect("snapshot channel closed")
            .clone()
    }

    async fn send(&self, command: SessionCommand) {
        self.commands.send(command).await.expect("engine gone");
    }

    async fn stop(self) -> SessionExit {
        self.cancel.cancel();
        timeout(WAIT, self.engine)
            .await
            .expect("engine did not stop")
            .expect("engine panicked")
    }
}

fn start_engine(
    agent: Arc<ScriptedAgent>,
    connector: Arc<FakeConnector>,
    chart_window: usize,
) -> Harness {
    let (command_tx, mut command_rx) = mpsc::channel(8);
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
    let cancel = CancellationToken::new();

    let descriptor = ContractDescriptor {
        address: "0xfeedbeef".to_string(),
        abi: serde_json::json!([]),
    };

    let mut engine = MonitorEngine::new(
        agent,
        connector,
        descriptor,
        chart_window,
        snapshot_tx,
        cancel.clone(),
    );
    let engine = tokio::spawn(async move { engine.run(&mut command_rx).await });

    Harness {
        commands: command_tx,
        snapshots: snapshot_rx,
        cancel,
        engine,
    }
}

fn record(timestamp: i64, temperature: f64) -> ReadingRecord {
    ReadingRecord {
        timestamp,
        temperature,
        humidity: 60.0,
        sensor_id: "dht22-1".to_string(),
        location: "box-a".to_string(),
        process_stage: "Hari ke-1".to_string(),
    }
}

/// Three readings in gateway order, oldest first.
fn seed_trio() -> Vec<ReadingRecord> {
    vec![
        record(1_700_000_100, 1.0),
        record(1_700_000_200, 2.0),
        record(1_700_000_300, 3.0),
    ]
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_startup_probe_connects_without_prompting() {
    let agent = ScriptedAgent::new(&["0xa11ce00000000001"], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent.clone(), connector, DEFAULT_CHART_WINDOW);

    let snapshot = harness.wait_until(|s| s.projection.table.len() == 3).await;
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.chain.as_deref(), Some("0x539"));
    assert_eq!(agent.request_count(), 0);

    let temps: Vec<f64> = snapshot
        .projection
        .table
        .iter()
        .map(|r| r.temperature)
        .collect();
    assert_eq!(temps, vec![3.0, 2.0, 1.0]);
    assert_eq!(snapshot.projection.chart.temperature, vec![1.0, 2.0, 3.0]);
    assert_eq!(snapshot.projection.chart.labels.len(), 3);
}

#[tokio::test]
async fn test_startup_without_identity_stays_disconnected() {
    let agent = ScriptedAgent::new(&[], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    let snapshot = harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    assert!(snapshot.identity.is_none());
    assert!(snapshot.current_error.is_none());
    assert!(snapshot.projection.table.is_empty());
}

#[tokio::test]
async fn test_unreachable_agent_at_startup_is_silent() {
    let agent = ScriptedAgent::new(&["0xa11ce00000000001"], &[]);
    agent.fail_probe();
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    let snapshot = harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    assert!(snapshot.current_error.is_none());
}

// =============================================================================
// Interactive Connect
// =============================================================================

#[tokio::test]
async fn test_connect_binds_identity_and_seeds_history() {
    let agent = ScriptedAgent::new(&[], &["0xaabbccddeeff0011"]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed.clone());
    let mut harness = start_engine(agent.clone(), connector.clone(), DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    harness.send(SessionCommand::Connect).await;

    let snapshot = harness
        .wait_until(|s| s.state == ConnectionState::Connected && s.projection.table.len() == 3)
        .await;
    assert_eq!(
        snapshot.identity.as_ref().map(|id| id.account.as_str()),
        Some("0xaabbccddeeff0011")
    );
    assert_eq!(snapshot.chain.as_deref(), Some("0x539"));
    assert!(snapshot.current_error.is_none());
    assert_eq!(agent.request_count(), 1);
    assert_eq!(connector.bind_count(), 1);
    assert_eq!(feed.subscription_count(), 1);
}

#[tokio::test]
async fn test_denied_connect_reports_denial() {
    let agent = ScriptedAgent::new(&[], &[]);
    agent.refuse_grants(AgentError::Denied);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    harness.send(SessionCommand::Connect).await;

    let snapshot = harness
        .wait_until(|s| s.current_error == Some(SessionError::AgentDenied))
        .await;
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(snapshot.identity.is_none());
}

#[tokio::test]
async fn test_empty_grant_counts_as_denied() {
    let agent = ScriptedAgent::new(&[], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    harness.send(SessionCommand::Connect).await;

    let snapshot = harness
        .wait_until(|s| s.current_error == Some(SessionError::AgentDenied))
        .await;
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unreachable_agent_on_connect_reports_unavailable() {
    let agent = ScriptedAgent::new(&[], &[]);
    agent.refuse_grants(AgentError::Unavailable {
        message: "bridge down".to_string(),
    });
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    harness.send(SessionCommand::Connect).await;

    let snapshot = harness
        .wait_until(|s| {
            matches!(s.current_error, Some(SessionError::AgentUnavailable { .. }))
        })
        .await;
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    match snapshot.current_error {
        Some(SessionError::AgentUnavailable { message }) => {
            assert!(message.contains("bridge down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_bind_failure_reports_query_failed() {
    let agent = ScriptedAgent::new(&[], &["0xaabbccddeeff0011"]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    connector.fail_binding();
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    harness.send(SessionCommand::Connect).await;

    let snapshot = harness
        .wait_until(|s| matches!(s.current_error, Some(SessionError::QueryFailed { .. })))
        .await;
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(snapshot.identity.is_none());
}

#[tokio::test]
async fn test_reconnect_with_same_identity_is_a_no_op() {
    let agent = ScriptedAgent::new(&[], &["0xaabbccddeeff0011"]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed.clone());
    let mut harness = start_engine(agent.clone(), connector.clone(), DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    harness.send(SessionCommand::Connect).await;
    harness
        .wait_until(|s| s.state == ConnectionState::Connected && s.projection.table.len() == 3)
        .await;

    harness.snapshots.mark_unchanged();
    harness.send(SessionCommand::Connect).await;

    let deadline = Instant::now() + WAIT;
    while agent.request_count() < 2 {
        assert!(Instant::now() < deadline, "second identity request never happened");
        sleep(Duration::from_millis(10)).await;
    }
    sleep(Duration::from_millis(50)).await;

    assert!(!harness.snapshots.has_changed().unwrap());
    assert_eq!(connector.bind_count(), 1);
    assert_eq!(feed.subscription_count(), 1);
}

// =============================================================================
// Live Feed
// =============================================================================

#[tokio::test]
async fn test_live_readings_roll_the_chart_window() {
    let agent = ScriptedAgent::new(&["0xa11ce00000000001"], &[]);
    let query = StaticQuery::with_records(vec![
        record(1_700_000_010, 10.0),
        record(1_700_000_020, 20.0),
        record(1_700_000_030, 30.0),
    ]);
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed.clone());
    let mut harness = start_engine(agent, connector, 2);

    let seeded = harness.wait_until(|s| s.projection.table.len() == 3).await;
    assert_eq!(seeded.projection.chart.temperature, vec![20.0, 30.0]);

    feed.push(FeedEvent::Reading(record(1_700_000_040, 40.0))).await;

    let appended = harness.wait_until(|s| s.projection.table.len() == 4).await;
    assert_eq!(appended.projection.chart.temperature, vec![30.0, 40.0]);
    assert_eq!(appended.projection.chart.labels.len(), 2);

    let temps: Vec<f64> = appended
        .projection
        .table
        .iter()
        .map(|r| r.temperature)
        .collect();
    assert_eq!(temps, vec![40.0, 30.0, 20.0, 10.0]);
}

#[tokio::test]
async fn test_duplicate_live_readings_are_suppressed() {
    let agent = ScriptedAgent::new(&["0xa11ce00000000001"], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed.clone());
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    harness.wait_until(|s| s.projection.table.len() == 3).await;

    feed.push(FeedEvent::Reading(record(1_700_000_400, 4.0))).await;
    feed.push(FeedEvent::Reading(record(1_700_000_400, 4.0))).await;
    feed.push(FeedEvent::Reading(record(1_700_000_500, 5.0))).await;

    let snapshot = harness.wait_until(|s| s.projection.table.len() == 5).await;
    let repeats = snapshot
        .projection
        .table
        .iter()
        .filter(|r| r.timestamp.timestamp() == 1_700_000_400)
        .count();
    assert_eq!(repeats, 1);
}

#[tokio::test]
async fn test_feed_loss_degrades_and_refresh_still_works() {
    let agent = ScriptedAgent::new(&["0xa11ce00000000001"], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query.clone(), feed.clone());
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Connected && s.projection.table.len() == 3)
        .await;

    feed.push(FeedEvent::Lost {
        reason: "socket dropped".to_string(),
    })
    .await;

    let degraded = harness
        .wait_until(|s| s.state == ConnectionState::Degraded)
        .await;
    assert_eq!(
        degraded.current_error,
        Some(SessionError::SubscriptionDegraded {
            reason: "socket dropped".to_string(),
        })
    );

    let mut refreshed_set = seed_trio();
    refreshed_set.push(record(1_700_000_400, 4.0));
    query.set_records(refreshed_set);
    harness.send(SessionCommand::RefreshHistory).await;

    let refreshed = harness.wait_until(|s| s.projection.table.len() == 4).await;
    assert_eq!(refreshed.state, ConnectionState::Degraded);
}

#[tokio::test]
async fn test_subscription_failure_degrades_but_history_seeds() {
    let agent = ScriptedAgent::new(&["0xa11ce00000000001"], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    feed.refuse_subscriptions();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    let degraded = harness
        .wait_until(|s| s.state == ConnectionState::Degraded)
        .await;
    assert!(matches!(
        degraded.current_error,
        Some(SessionError::SubscriptionDegraded { .. })
    ));

    let seeded = harness.wait_until(|s| s.projection.table.len() == 3).await;
    assert_eq!(seeded.state, ConnectionState::Degraded);
}

// =============================================================================
// Historical Query
// =============================================================================

#[tokio::test]
async fn test_query_failure_surfaces_and_manual_refresh_recovers() {
    let agent = ScriptedAgent::new(&["0xa11ce00000000001"], &[]);
    let query = StaticQuery::with_records(seed_trio());
    query.set_fail(true);
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query.clone(), feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    let failed = harness
        .wait_until(|s| matches!(s.current_error, Some(SessionError::QueryFailed { .. })))
        .await;
    assert_eq!(failed.state, ConnectionState::Connected);
    assert!(failed.projection.table.is_empty());

    query.set_fail(false);
    harness.send(SessionCommand::RefreshHistory).await;

    let recovered = harness.wait_until(|s| s.projection.table.len() == 3).await;
    assert!(recovered.current_error.is_none());
}

#[tokio::test]
async fn test_refresh_without_session_reports_not_ready() {
    let agent = ScriptedAgent::new(&[], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    harness.send(SessionCommand::RefreshHistory).await;

    let snapshot = harness.wait_until(|s| s.current_error.is_some()).await;
    assert_eq!(snapshot.current_error, Some(SessionError::NotReady));
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(snapshot.projection.table.is_empty());
}

#[tokio::test]
async fn test_stale_history_results_are_discarded() {
    let agent = ScriptedAgent::new(&["0xfirst0000000001"], &[]);
    let query = GatedQuery::with_datasets(vec![
        vec![record(1_700_000_111, 11.0)],
        vec![record(1_700_000_222, 22.0)],
    ]);
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query.clone(), feed);
    let mut harness = start_engine(agent.clone(), connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Connected)
        .await;
    query.wait_entered(1).await;

    // Switch identities while the first fetch is still in flight.
    agent.notify(AgentEvent::AccountsChanged(vec![
        "0xsecond000000002".to_string(),
    ]));
    harness
        .wait_until(|s| {
            s.identity.as_ref().is_some_and(|id| id.account == "0xsecond000000002")
        })
        .await;
    query.wait_entered(2).await;

    query.release(2);
    let seeded = harness
        .wait_until(|s| !s.projection.table.is_empty())
        .await;
    assert_eq!(seeded.projection.table.len(), 1);
    assert_eq!(seeded.projection.table[0].temperature, 22.0);

    // The stale first result must never surface later either.
    sleep(Duration::from_millis(50)).await;
    let current = harness.snapshots.borrow().clone();
    assert_eq!(current.projection.table.len(), 1);
    assert_eq!(current.projection.table[0].temperature, 22.0);
}

// =============================================================================
// Agent Notifications
// =============================================================================

#[tokio::test]
async fn test_revoked_accounts_clear_everything_at_once() {
    let agent = ScriptedAgent::new(&["0xa11ce00000000001"], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent.clone(), connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Connected && s.projection.table.len() == 3)
        .await;

    agent.notify(AgentEvent::AccountsChanged(vec![]));

    // The first disconnected snapshot must already be fully cleared.
    let snapshot = harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;
    assert!(snapshot.projection.table.is_empty());
    assert!(snapshot.projection.chart.is_empty());
    assert!(snapshot.identity.is_none());
    assert!(snapshot.chain.is_none());
    assert_eq!(snapshot.current_error, Some(SessionError::AgentDisconnected));
}

#[tokio::test]
async fn test_account_switch_rebinds_and_reseeds() {
    let agent = ScriptedAgent::new(&["0xfirst0000000001"], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed.clone());
    let mut harness = start_engine(agent.clone(), connector.clone(), DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Connected && s.projection.table.len() == 3)
        .await;

    agent.notify(AgentEvent::AccountsChanged(vec![
        "0xsecond000000002".to_string(),
    ]));

    let snapshot = harness
        .wait_until(|s| {
            s.state == ConnectionState::Connected
                && s.identity.as_ref().is_some_and(|id| id.account == "0xsecond000000002")
        })
        .await;
    assert!(snapshot.current_error.is_none());

    let deadline = Instant::now() + WAIT;
    while feed.subscription_count() < 2 {
        assert!(Instant::now() < deadline, "no fresh subscription after switch");
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(connector.bind_count(), 2);
}

#[tokio::test]
async fn test_chain_change_stops_the_engine_for_rebuild() {
    let agent = ScriptedAgent::new(&["0xa11ce00000000001"], &[]);
    let query = StaticQuery::with_records(seed_trio());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent.clone(), connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Connected)
        .await;

    agent.notify(AgentEvent::ChainChanged("0x2a".to_string()));

    let exit = timeout(WAIT, harness.engine)
        .await
        .expect("engine did not stop")
        .expect("engine panicked");
    assert_eq!(exit, SessionExit::ChainChanged("0x2a".to_string()));
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_cancellation_stops_the_engine() {
    let agent = ScriptedAgent::new(&[], &[]);
    let query = StaticQuery::with_records(Vec::new());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;

    let exit = harness.stop().await;
    assert_eq!(exit, SessionExit::Shutdown);
}

#[tokio::test]
async fn test_closed_command_channel_stops_the_engine() {
    let agent = ScriptedAgent::new(&[], &[]);
    let query = StaticQuery::with_records(Vec::new());
    let feed = ScriptedFeed::new();
    let connector = FakeConnector::new(query, feed);
    let mut harness = start_engine(agent, connector, DEFAULT_CHART_WINDOW);

    harness
        .wait_until(|s| s.state == ConnectionState::Disconnected)
        .await;

    drop(harness.commands);
    let exit = timeout(WAIT, harness.engine)
        .await
        .expect("engine did not stop")
        .expect("engine panicked");
    assert_eq!(exit, SessionExit::Shutdown);
}
