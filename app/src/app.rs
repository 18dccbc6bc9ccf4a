//! Application state machine.
//!
//! `App` is the single writer of all UI state. Remote work runs in spawned
//! tasks that report back through [`AppMessage`]s, so a poll tick racing a
//! start or stop can only ever land as another message on the same queue.

use crate::{
    amount,
    client::AgentClient,
    config::AppConfig,
    dedup::OpportunityDeduplicator,
    error::{FetchError, RemoteError, StepFailure},
    identity::{lookup_caller_process, Identity},
    lifecycle::{probe_status, BotLifecycleState, LifecycleController, StartConfig},
    poller::{PollConditions, PollEvent, Poller},
    reveal::{RevealView, TranscriptRevealer},
    screens::{dashboard::DashboardScreen, details::DetailsDialog, Screen},
    snapshot::{AgentSnapshot, ParsedSnapshot, SnapshotParser, StatusReport},
};
use anyhow::Result;
use crossterm::event::KeyCode;
use ratatui::Frame;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Messages for async operations.
#[derive(Debug, Clone)]
pub enum AppMessage {
    /// Registry lookup of the operator's own process finished
    SessionResolved(Result<Option<String>, FetchError>),
    /// Initial status probe finished
    ProbeCompleted(Result<StatusReport, RemoteError>),
    /// Start sequence finished
    StartFinished(Result<(), StepFailure>),
    /// Stop finished
    StopFinished(Result<(), StepFailure>),
    /// Poller produced a snapshot
    Snapshot(PollEvent),
}

impl From<PollEvent> for AppMessage {
    fn from(event: PollEvent) -> Self {
        AppMessage::Snapshot(event)
    }
}

/// Action returned from screen handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenAction {
    None,
    Start,
    Stop,
    OpenDetails,
    CloseDetails,
}

/// Main application state.
pub struct App {
    pub config: AppConfig,
    pub identity: Identity,
    pub client: AgentClient,
    pub parser: SnapshotParser,
    pub lifecycle: LifecycleController,
    poller: Poller<AppMessage>,
    revealer: TranscriptRevealer,
    reveal_rx: watch::Receiver<RevealView>,
    dedup: OpportunityDeduplicator,

    // Screen states
    pub dashboard: DashboardScreen,
    pub details: DetailsDialog,
    pub detail_open: bool,

    // Latest agent view
    pub snapshot: Option<AgentSnapshot>,
    pub transcript: Vec<String>,
    pub profit_display: String,

    // Transient state
    pub status_message: Option<String>,
    pub error_message: Option<String>,

    dirty: bool,
    pub quit: bool,
}

impl App {
    pub fn new(
        config: AppConfig,
        identity: Identity,
        client: AgentClient,
        tx: mpsc::Sender<AppMessage>,
    ) -> Self {
        let parser = SnapshotParser::default();
        let lifecycle = LifecycleController::new(config.agent_process_id.clone());
        let poller = Poller::new(
            client.clone(),
            parser.clone(),
            config.agent_process_id.clone(),
            config.poll_interval(),
            tx,
        );
        let revealer = TranscriptRevealer::new(config.reveal_interval());
        let reveal_rx = revealer.subscribe();
        let dashboard = DashboardScreen::new(parser.registry(), &config.default_slippage);

        Self {
            config,
            identity,
            client,
            parser,
            lifecycle,
            poller,
            revealer,
            reveal_rx,
            dedup: OpportunityDeduplicator::new(),
            dashboard,
            details: DetailsDialog,
            detail_open: false,
            snapshot: None,
            transcript: Vec::new(),
            profit_display: amount::to_display(0).unwrap_or_default(),
            status_message: None,
            error_message: None,
            dirty: true,
            quit: false,
        }
    }

    /// Look up the operator's process, then probe the agent once to learn
    /// whether it is already running.
    pub fn init_session(&mut self, tx: mpsc::Sender<AppMessage>) {
        if !self.lifecycle.begin_probe(&self.identity) {
            self.status_message = Some("DeltaFi requires your wallet to continue".to_string());
            return;
        }
        self.status_message = Some("Fetching arbitrage data...".to_string());

        // A caller given on the command line skips the lookup.
        let lookup = match (&self.identity.caller_process_id, self.identity.active_address()) {
            (None, Some(wallet)) => Some((self.config.main_process_id.clone(), wallet.to_string())),
            _ => None,
        };
        let client = self.client.clone();
        let parser = self.parser.clone();
        let agent = self.lifecycle.agent_process_id().to_string();
        tokio::spawn(async move {
            if let Some((main_process, wallet)) = lookup {
                let found = lookup_caller_process(&client, &main_process, &wallet).await;
                let _ = tx.send(AppMessage::SessionResolved(found)).await;
            }
            let result = probe_status(&client, &agent, &parser).await;
            let _ = tx.send(AppMessage::ProbeCompleted(result)).await;
        });
    }

    pub fn reveal_view(&self) -> RevealView {
        self.reveal_rx.borrow().clone()
    }

    pub fn state(&self) -> BotLifecycleState {
        self.lifecycle.state()
    }

    fn poll_conditions(&self) -> PollConditions {
        PollConditions {
            lifecycle: self.lifecycle.state(),
            detail_open: self.detail_open,
            identity_present: self.identity.is_connected(),
        }
    }

    fn sync_poller(&mut self) {
        let conditions = self.poll_conditions();
        self.poller.update(conditions);
    }

    pub fn needs_redraw(&self) -> bool {
        self.dirty || self.reveal_rx.has_changed().unwrap_or(false)
    }

    pub fn render(&mut self, frame: &mut Frame) {
        self.dirty = false;
        self.reveal_rx.borrow_and_update();

        let area = frame.area();
        self.dashboard.render(frame, area, self);
        if self.detail_open {
            self.details.render(frame, area, self);
        }
    }

    pub async fn handle_key(&mut self, key: KeyCode, tx: mpsc::Sender<AppMessage>) -> Result<()> {
        // Clear error message on any key
        self.error_message = None;
        self.dirty = true;

        let action = if self.detail_open {
            self.details.handle_key(key)
        } else {
            self.dashboard.handle_key(key, self.parser.registry())
        };
        self.handle_screen_action(action, tx);
        Ok(())
    }

    fn handle_screen_action(&mut self, action: ScreenAction, tx: mpsc::Sender<AppMessage>) {
        match action {
            ScreenAction::None => {}
            ScreenAction::Start => self.start_arbitrage(tx),
            ScreenAction::Stop => self.stop_arbitrage(tx),
            ScreenAction::OpenDetails => self.open_details(),
            ScreenAction::CloseDetails => self.close_details(),
        }
    }

    fn start_arbitrage(&mut self, tx: mpsc::Sender<AppMessage>) {
        let allowance = match amount::parse_display(&self.dashboard.allowance) {
            Ok(v) => v,
            Err(_) => {
                self.error_message = Some("Please enter a valid allowance amount".to_string());
                return;
            }
        };
        let config = StartConfig {
            input_token: self.dashboard.input_token(self.parser.registry()).address,
            target_token: self.dashboard.target_token(self.parser.registry()).address,
            slippage_percent: self.dashboard.slippage.clone(),
            allowance_base_units: allowance,
            min_profit_threshold_base_units: self.config.default_min_profit_threshold,
            caller_process_id: None,
        };

        let plan = match self.lifecycle.begin_start(&self.identity, config) {
            Ok(plan) => plan,
            Err(e) => {
                self.error_message = Some(e.to_string());
                return;
            }
        };
        self.status_message = Some("Starting arbitrage bot...".to_string());
        self.sync_poller();

        let client = self.client.clone();
        tokio::spawn(async move {
            let result = plan.execute(&client).await;
            let _ = tx.send(AppMessage::StartFinished(result)).await;
        });
    }

    fn stop_arbitrage(&mut self, tx: mpsc::Sender<AppMessage>) {
        let plan = match self.lifecycle.begin_stop(&self.identity) {
            Ok(plan) => plan,
            Err(e) => {
                self.error_message = Some(e.to_string());
                return;
            }
        };
        self.status_message = Some("Stopping arbitrage bot...".to_string());
        self.sync_poller();

        let client = self.client.clone();
        tokio::spawn(async move {
            let result = plan.execute(&client).await;
            let _ = tx.send(AppMessage::StopFinished(result)).await;
        });
    }

    fn open_details(&mut self) {
        self.detail_open = true;
        self.sync_poller();
        self.revealer.open(self.transcript.clone());
    }

    fn close_details(&mut self) {
        self.revealer.close();
        self.detail_open = false;
        // Resuming the poller fetches immediately.
        self.sync_poller();
    }

    pub async fn handle_message(&mut self, msg: AppMessage) -> Result<()> {
        if !matches!(msg, AppMessage::Snapshot(_)) {
            self.dirty = true;
        }
        match msg {
            AppMessage::SessionResolved(result) => match result {
                Ok(Some(process_id)) => self.identity.caller_process_id = Some(process_id),
                Ok(None) => {
                    self.error_message =
                        Some("No DeltaFi process is registered for this wallet".to_string());
                }
                Err(e) => {
                    warn!(error = %e, "caller process lookup failed");
                    self.error_message = Some(format!("Failed to fetch your process ID: {}", e));
                }
            },
            AppMessage::ProbeCompleted(result) => {
                let state = self.lifecycle.finish_probe(&result);
                match result {
                    Ok(report) => {
                        if report.enabled {
                            self.transcript = report.transcript();
                        }
                        self.status_message = Some(format!("Agent is {}", state));
                    }
                    Err(e) => {
                        self.status_message = None;
                        self.error_message =
                            Some(format!("Failed to initialize arbitrage process: {}", e));
                    }
                }
                self.sync_poller();
            }
            AppMessage::StartFinished(result) => {
                match self.lifecycle.finish_start(result) {
                    Ok(()) => {
                        self.dedup.reset();
                        self.status_message =
                            Some("Arbitrage bot started successfully!".to_string());
                    }
                    Err(e) => {
                        self.status_message = None;
                        self.error_message = Some(e.to_string());
                    }
                }
                self.sync_poller();
            }
            AppMessage::StopFinished(result) => {
                match self.lifecycle.finish_stop(result) {
                    Ok(()) => {
                        self.dedup.reset();
                        self.status_message =
                            Some("Arbitrage bot stopped successfully".to_string());
                    }
                    Err(e) => {
                        self.status_message = None;
                        self.error_message = Some(e.to_string());
                    }
                }
                self.sync_poller();
            }
            AppMessage::Snapshot(event) => {
                if event.generation != self.poller.generation() || !self.lifecycle.is_running() {
                    debug!(generation = event.generation, "dropping stale snapshot");
                    return Ok(());
                }
                self.apply_snapshot(event.snapshot);
            }
        }
        Ok(())
    }

    fn apply_snapshot(&mut self, parsed: ParsedSnapshot) {
        let mut announced = false;
        if let Some(opportunity) = &parsed.snapshot.last_opportunity {
            if self.dedup.observe(opportunity) {
                info!(timestamp = opportunity.timestamp_seconds, "new arbitrage opportunity");
                self.status_message = Some("New arbitrage opportunity found!".to_string());
                announced = true;
            }
        }
        // Same data as last cycle: nothing to redraw.
        if !announced && self.snapshot.as_ref() == Some(&parsed.snapshot) {
            return;
        }
        self.dirty = true;
        if let Some(profit) = parsed.snapshot.total_profit_display() {
            self.profit_display = profit;
        }
        self.transcript = parsed.transcript;
        self.snapshot = Some(parsed.snapshot);
    }

    pub fn can_quit(&self) -> bool {
        !self.detail_open
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }
}
