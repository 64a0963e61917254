//! Session Engine
//!
//! Single-actor owner of the connection lifecycle and the reading
//! series. Every stimulus reaches the engine through a channel: operator
//! commands, signing agent notifications, live feed events and the
//! completions of historical fetches. The engine processes one stimulus
//! at a time, so state and series are never touched concurrently.
//!
//! Historical fetches run as separate tasks tagged with the session
//! epoch that launched them. The epoch rotates on every identity change
//! and teardown, and a completion whose epoch no longer matches is
//! dropped without touching the series.
//!
//! A ledger network change cannot be absorbed in place. The engine
//! stops and reports it; the supervisor in `main` rebuilds descriptor,
//! adapters and engine from scratch.

use std::future::pending;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::history;
use crate::application::ports::{
    AgentError, AgentEvent, ContractDescriptor, FeedEvent, FeedHandle, LedgerChannels,
    LedgerConnectorPort, QueryError, SigningAgentPort,
};
use crate::domain::connection::{AccountAddress, ChainId, ConnectionState, SessionIdentity};
use crate::domain::reading::Reading;
use crate::domain::series::{SeriesProjection, SeriesReconciler};

/// Buffered live feed events before the adapter blocks.
const FEED_EVENT_BUFFER: usize = 256;

/// Buffered historical completions; more than one only during epoch races.
const HISTORY_OUTCOME_BUFFER: usize = 4;

// =============================================================================
// Error Type
// =============================================================================

/// Operator-facing error classes, one slot in the snapshot at a time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The signing agent endpoint could not be reached or misbehaved.
    #[error("Signing agent unavailable: {message}")]
    AgentUnavailable {
        /// Error details.
        message: String,
    },

    /// The operator rejected the request, or the agent granted nothing.
    #[error("Connection request denied by the signing agent")]
    AgentDenied,

    /// The agent revoked every account bound to this session.
    #[error("Signing agent disconnected; readings cleared")]
    AgentDisconnected,

    /// The operation needs a bound identity first.
    #[error("Not connected; connect to the signing agent first")]
    NotReady,

    /// Channel binding or the historical query failed.
    #[error("Ledger query failed: {message}")]
    QueryFailed {
        /// Error details.
        message: String,
    },

    /// Live updates stopped; historical refresh still works.
    #[error("Live feed degraded: {reason}")]
    SubscriptionDegraded {
        /// What killed the feed.
        reason: String,
    },
}

impl SessionError {
    fn from_agent(err: AgentError) -> Self {
        match err {
            AgentError::Denied => Self::AgentDenied,
            AgentError::Unavailable { message } | AgentError::Protocol { message } => {
                Self::AgentUnavailable { message }
            }
        }
    }
}

// =============================================================================
// Commands, Exit and Snapshot
// =============================================================================

/// Operator command into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Bind an identity interactively and bring both channels up.
    Connect,
    /// Re-run the historical backfill.
    RefreshHistory,
}

/// Why the engine stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// Shutdown was requested or every command sender went away.
    Shutdown,
    /// The agent moved to another ledger network. The whole session
    /// world must be rebuilt before reconnecting.
    ChainChanged(ChainId),
}

/// What the presentation layer sees. Published on every observable
/// change; the latest snapshot always fully describes the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Connection lifecycle state.
    pub state: ConnectionState,
    /// Bound identity, if any.
    pub identity: Option<SessionIdentity>,
    /// Ledger network the agent reported at bind time.
    pub chain: Option<ChainId>,
    /// Error currently worth showing, if any.
    pub current_error: Option<SessionError>,
    /// Table and chart projections of the series.
    pub projection: SeriesProjection,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Unresolved,
            identity: None,
            chain: None,
            current_error: None,
            projection: SeriesProjection::default(),
        }
    }
}

/// Epoch-tagged completion of one historical fetch task.
#[derive(Debug)]
struct HistoryOutcome {
    epoch: Uuid,
    result: Result<Vec<Reading>, QueryError>,
}

// =============================================================================
// Engine
// =============================================================================

/// Owner of connection state, identity and the series reconciler.
pub struct MonitorEngine {
    agent: Arc<dyn SigningAgentPort>,
    connector: Arc<dyn LedgerConnectorPort>,
    descriptor: ContractDescriptor,

    state: ConnectionState,
    identity: Option<SessionIdentity>,
    chain: Option<ChainId>,
    error: Option<SessionError>,
    series: SeriesReconciler,
    epoch: Uuid,

    channels: Option<LedgerChannels>,
    feed_handle: Option<FeedHandle>,
    feed_rx: Option<mpsc::Receiver<FeedEvent>>,

    agent_rx: Option<broadcast::Receiver<AgentEvent>>,
    history_tx: mpsc::Sender<HistoryOutcome>,
    history_rx: mpsc::Receiver<HistoryOutcome>,

    snapshots: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
}

impl MonitorEngine {
    /// Build an engine around the given ports.
    ///
    /// Snapshots go to `snapshots`; the caller keeps the receivers and
    /// the command sender, so both survive an engine rebuild.
    #[must_use]
    pub fn new(
        agent: Arc<dyn SigningAgentPort>,
        connector: Arc<dyn LedgerConnectorPort>,
        descriptor: ContractDescriptor,
        chart_window: usize,
        snapshots: watch::Sender<SessionSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        let (history_tx, history_rx) = mpsc::channel(HISTORY_OUTCOME_BUFFER);
        let agent_rx = Some(agent.notifications());
        Self {
            agent,
            connector,
            descriptor,
            state: ConnectionState::Unresolved,
            identity: None,
            chain: None,
            error: None,
            series: SeriesReconciler::new(chart_window),
            epoch: Uuid::new_v4(),
            channels: None,
            feed_handle: None,
            feed_rx: None,
            agent_rx,
            history_tx,
            history_rx,
            snapshots,
            cancel,
        }
    }

    /// Drive the session until shutdown or a network change.
    ///
    /// `commands` stays with the caller between engine generations; the
    /// engine only borrows it.
    pub async fn run(&mut self, commands: &mut mpsc::Receiver<SessionCommand>) -> SessionExit {
        tracing::info!(
            contract = %self.descriptor.address,
            window = self.series.window(),
            "Session engine started"
        );
        self.publish();
        self.startup_probe().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Shutdown requested");
                    self.teardown();
                    return SessionExit::Shutdown;
                }
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Connect) => self.handle_connect().await,
                        Some(SessionCommand::RefreshHistory) => self.handle_refresh(),
                        None => {
                            tracing::info!("Command channel closed; stopping");
                            self.teardown();
                            return SessionExit::Shutdown;
                        }
                    }
                }
                event = Self::next_agent_event(&mut self.agent_rx) => {
                    match event {
                        Ok(event) => {
                            if let Some(exit) = self.on_agent_event(event).await {
                                self.teardown();
                                return exit;
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "Agent notifications lagged");
                        }
                        Err(RecvError::Closed) => {
                            tracing::warn!("Agent notification stream closed");
                            self.agent_rx = None;
                        }
                    }
                }
                event = Self::next_feed_event(&mut self.feed_rx) => {
                    match event {
                        Some(event) => self.on_feed_event(event),
                        None => self.on_feed_closed(),
                    }
                }
                Some(outcome) = self.history_rx.recv() => self.on_history(outcome),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Stimulus handlers
    // -------------------------------------------------------------------------

    /// Probe for an identity the agent already exposes. Silent: probe
    /// failures leave no error in the snapshot.
    async fn startup_probe(&mut self) {
        let probed = self.agent.current_accounts().await;
        match probed {
            Ok(accounts) if !accounts.is_empty() => {
                tracing::info!(count = accounts.len(), "Agent already holds an identity");
                self.establish(accounts).await;
            }
            Ok(_) => {
                self.set_state(ConnectionState::Disconnected);
                self.publish();
            }
            Err(err) => {
                tracing::info!(error = %err, "Signing agent not reachable at startup");
                self.set_state(ConnectionState::Disconnected);
                self.publish();
            }
        }
    }

    async fn handle_connect(&mut self) {
        let had_identity = self.state.has_identity();
        if !had_identity {
            self.set_state(ConnectionState::Connecting);
            self.error = None;
            self.publish();
        }

        let granted = self.agent.request_accounts().await;
        match granted {
            Ok(accounts) => self.establish(accounts).await,
            Err(err) => {
                tracing::warn!(error = %err, "Identity request failed");
                self.error = Some(SessionError::from_agent(err));
                if !had_identity {
                    self.set_state(ConnectionState::Disconnected);
                }
                self.publish();
            }
        }
    }

    fn handle_refresh(&mut self) {
        if !self.state.can_query() {
            self.error = Some(SessionError::NotReady);
            self.publish();
            return;
        }
        tracing::info!("Historical refresh requested");
        self.launch_history_fetch();
    }

    /// Bind the given accounts and bring the session up.
    ///
    /// Shared by the interactive connect, the startup probe and agent
    /// account-change notifications; by the time this runs the accounts
    /// are already granted, so nothing here prompts.
    async fn establish(&mut self, accounts: Vec<AccountAddress>) {
        let Some(primary) = accounts.first().cloned() else {
            tracing::warn!("Agent granted no accounts");
            self.error = Some(SessionError::AgentDenied);
            if !self.state.has_identity() {
                self.set_state(ConnectionState::Disconnected);
            }
            self.publish();
            return;
        };

        if self.state.has_identity()
            && self.identity.as_ref().is_some_and(|id| id.account == primary)
        {
            tracing::debug!(account = %primary, "Already connected with this identity");
            return;
        }

        self.rotate_epoch();
        self.drop_feed();
        self.identity = Some(SessionIdentity::new(primary.clone()));
        self.set_state(ConnectionState::Connecting);
        self.error = None;
        self.publish();

        let bound = self.connector.bind(&self.descriptor).await;
        match bound {
            Ok(channels) => self.channels = Some(channels),
            Err(err) => {
                tracing::error!(error = %err, "Ledger channel binding failed");
                self.channels = None;
                self.identity = None;
                self.error = Some(SessionError::QueryFailed {
                    message: err.to_string(),
                });
                self.set_state(ConnectionState::Disconnected);
                self.publish();
                return;
            }
        }

        self.chain = self.agent.chain_id().await.ok();
        tracing::info!(account = %primary, chain = ?self.chain, "Session established");
        self.set_state(ConnectionState::Connected);
        self.publish();

        self.launch_history_fetch();
        self.open_feed().await;
    }

    async fn on_agent_event(&mut self, event: AgentEvent) -> Option<SessionExit> {
        match event {
            AgentEvent::ChainChanged(chain) => {
                tracing::warn!(chain = %chain, "Ledger network changed; rebuilding session");
                Some(SessionExit::ChainChanged(chain))
            }
            AgentEvent::AccountsChanged(accounts) => {
                if accounts.is_empty() {
                    self.on_identity_revoked();
                } else {
                    tracing::info!("Agent accounts changed");
                    self.establish(accounts).await;
                }
                None
            }
        }
    }

    /// The agent pulled every account. Tear the session down and clear
    /// the series before anything is published, so no observer ever
    /// sees a disconnected state with stale rows.
    fn on_identity_revoked(&mut self) {
        if self.identity.is_none() {
            tracing::debug!("Account revocation with no bound identity");
            return;
        }
        tracing::warn!("Agent revoked all accounts");
        self.rotate_epoch();
        self.drop_feed();
        self.channels = None;
        self.identity = None;
        self.chain = None;
        self.series.clear();
        self.error = Some(SessionError::AgentDisconnected);
        self.set_state(ConnectionState::Disconnected);
        self.publish();
    }

    fn on_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Reading(record) => {
                if !self.state.has_identity() {
                    tracing::debug!("Dropping live reading without a session identity");
                    return;
                }
                if self.series.append(record.into_reading()) {
                    self.publish();
                } else {
                    tracing::debug!("Suppressed duplicate live reading");
                }
            }
            FeedEvent::Lost { reason } => self.on_feed_lost(&reason),
        }
    }

    fn on_feed_lost(&mut self, reason: &str) {
        self.feed_rx = None;
        self.feed_handle = None;
        if self.state == ConnectionState::Connected {
            tracing::warn!(reason, "Live feed lost; entering degraded mode");
            self.set_state(ConnectionState::Degraded);
            self.error = Some(SessionError::SubscriptionDegraded {
                reason: reason.to_string(),
            });
            self.publish();
        } else {
            tracing::debug!(reason, "Live feed lost outside an active session");
        }
    }

    /// The feed channel closed without a `Lost` event. Expected after a
    /// cancel; anything else is treated as a loss.
    fn on_feed_closed(&mut self) {
        self.feed_rx = None;
        let unexpected = self
            .feed_handle
            .take()
            .is_some_and(|handle| !handle.is_cancelled());
        if unexpected {
            self.on_feed_lost("live feed channel closed");
        }
    }

    fn on_history(&mut self, outcome: HistoryOutcome) {
        if outcome.epoch != self.epoch {
            tracing::debug!(
                stale = %outcome.epoch,
                current = %self.epoch,
                "Discarding stale historical result"
            );
            return;
        }
        if !self.state.has_identity() {
            tracing::debug!("Discarding historical result without a session identity");
            return;
        }
        match outcome.result {
            Ok(readings) => {
                tracing::info!(count = readings.len(), "Historical series seeded");
                self.series.seed(readings);
                if self.state != ConnectionState::Degraded {
                    self.error = None;
                }
                self.publish();
            }
            Err(err) => {
                tracing::error!(error = %err, "Historical fetch failed");
                self.error = Some(SessionError::QueryFailed {
                    message: err.to_string(),
                });
                self.publish();
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn launch_history_fetch(&self) {
        let Some(channels) = self.channels.clone() else {
            tracing::debug!("No bound channels; skipping historical fetch");
            return;
        };
        let epoch = self.epoch;
        let outcome_tx = self.history_tx.clone();
        tokio::spawn(async move {
            let result = history::fetch_all(channels.query.as_ref()).await;
            if outcome_tx.send(HistoryOutcome { epoch, result }).await.is_err() {
                tracing::debug!("Session gone before the historical fetch completed");
            }
        });
    }

    async fn open_feed(&mut self) {
        let Some(channels) = self.channels.clone() else {
            return;
        };
        let (tx, rx) = mpsc::channel(FEED_EVENT_BUFFER);
        let subscribed = channels.feed.subscribe(tx).await;
        match subscribed {
            Ok(handle) => {
                tracing::info!("Live feed subscribed");
                self.feed_handle = Some(handle);
                self.feed_rx = Some(rx);
            }
            Err(err) => {
                tracing::warn!(error = %err, "Live feed subscription failed; degraded mode");
                self.feed_handle = None;
                self.feed_rx = None;
                self.set_state(ConnectionState::Degraded);
                self.error = Some(SessionError::SubscriptionDegraded {
                    reason: err.to_string(),
                });
                self.publish();
            }
        }
    }

    fn drop_feed(&mut self) {
        if let Some(handle) = self.feed_handle.take() {
            handle.cancel();
        }
        self.feed_rx = None;
    }

    fn rotate_epoch(&mut self) {
        self.epoch = Uuid::new_v4();
        tracing::debug!(epoch = %self.epoch, "Session epoch rotated");
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "Connection state changed");
            self.state = next;
        }
    }

    fn teardown(&mut self) {
        self.rotate_epoch();
        self.drop_feed();
        tracing::info!("Session engine stopped");
    }

    fn publish(&self) {
        self.snapshots.send_replace(SessionSnapshot {
            state: self.state,
            identity: self.identity.clone(),
            chain: self.chain.clone(),
            current_error: self.error.clone(),
            projection: self.series.project(),
        });
    }

    async fn next_agent_event(
        slot: &mut Option<broadcast::Receiver<AgentEvent>>,
    ) -> Result<AgentEvent, RecvError> {
        match slot {
            Some(rx) => rx.recv().await,
            None => pending().await,
        }
    }

    async fn next_feed_event(slot: &mut Option<mpsc::Receiver<FeedEvent>>) -> Option<FeedEvent> {
        match slot {
            Some(rx) => rx.recv().await,
            None => pending().await,
        }
    }
}
