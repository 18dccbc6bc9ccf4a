//! Full operator session against a scripted agent: lookup, probe, start,
//! poll, details, stop.

use async_trait::async_trait;
use crossterm::event::KeyCode;
use deltafi_arbitrage::{
    client::{AgentClient, Transport},
    config::AppConfig,
    error::RemoteError,
    identity::Identity,
    lifecycle::BotLifecycleState,
    poller::PollEvent,
    protocol::{RawResponse, Tag},
    snapshot::SnapshotParser,
    App, AppMessage,
};
use ratatui::{backend::TestBackend, Terminal};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{sync::mpsc, time::Instant};

const AGENT: &str = "agent-pid";
const CALLER: &str = "caller-pid";
const MAIN: &str = "main-pid";

const SNAPSHOT: &str = r#"{
    "status": "running",
    "inputToken": "T57pzUiE2jbkgRPgmW9bugDz75F8gPiFq_iqUBDYdJg",
    "targetToken": "KRGomAeGRC4m9QJlP2LsulmwyVuYPE0mfsTR2B8m-Ro",
    "balance": "2000000000000",
    "totalProfit": "1500000000000",
    "slippage": "0.3",
    "dexCount": 2,
    "lastOpportunity": {
        "timestamp": 1700000000,
        "inputAmount": "1000000000000",
        "outputAmount": "1100000000000",
        "profit": "100000000000"
    },
    "dexPrices": { "dex-a": "1.01", "dex-b": "0.99" }
}"#;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    DryRun(String),
    Message { process: String, action: String },
}

/// Agent that is idle until told otherwise and always has data to serve.
struct ScriptedAgent {
    calls: Mutex<Vec<Call>>,
    fail_setup: bool,
}

impl ScriptedAgent {
    fn new(fail_setup: bool) -> Arc<Self> {
        Arc::new(Self { calls: Mutex::new(Vec::new()), fail_setup })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn data_queries(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::DryRun("GetArbitrageData".into()))
            .count()
    }

    fn messages(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Message { process, action } => Some((process, action)),
                Call::DryRun(_) => None,
            })
            .collect()
    }
}

fn action(tags: &[Tag]) -> String {
    tags.iter()
        .find(|t| t.name == "Action")
        .map(|t| t.value.clone())
        .unwrap_or_default()
}

#[async_trait]
impl Transport for ScriptedAgent {
    async fn dry_run(&self, _process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError> {
        let action = action(tags);
        self.calls.lock().unwrap().push(Call::DryRun(action.clone()));
        Ok(match action.as_str() {
            "getUser" => RawResponse::with_data(format!(r#"[{{"Process_ID":"{}"}}]"#, CALLER)),
            "Status" => RawResponse::with_tags(vec![Tag::new("Enabled", "false")]),
            _ => RawResponse::with_data(SNAPSHOT),
        })
    }

    async fn message(&self, process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError> {
        let action = action(tags);
        self.calls.lock().unwrap().push(Call::Message {
            process: process_id.to_string(),
            action: action.clone(),
        });
        if self.fail_setup && action == "Setup" {
            return Ok(RawResponse::with_error("insufficient allowance"));
        }
        Ok(RawResponse::default())
    }
}

fn setup(agent: &Arc<ScriptedAgent>) -> (App, mpsc::Sender<AppMessage>, mpsc::Receiver<AppMessage>) {
    let config = AppConfig {
        agent_process_id: AGENT.to_string(),
        main_process_id: MAIN.to_string(),
        wallet_address: Some("wallet-address".to_string()),
        ..AppConfig::default()
    };
    let identity = Identity::from_config(&config);
    let client = AgentClient::new(agent.clone(), config.request_timeout());
    let (tx, rx) = mpsc::channel(32);
    let app = App::new(config, identity, client, tx.clone());
    (app, tx, rx)
}

/// Feed messages to the app until one matches `done`.
async fn pump_until(
    app: &mut App,
    rx: &mut mpsc::Receiver<AppMessage>,
    done: impl Fn(&AppMessage) -> bool,
) {
    loop {
        let msg = rx.recv().await.unwrap();
        let finished = done(&msg);
        app.handle_message(msg).await.unwrap();
        if finished {
            return;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn probe_start_poll_stop() {
    let agent = ScriptedAgent::new(false);
    let (mut app, tx, mut rx) = setup(&agent);

    // Probe reports not enabled
    app.init_session(tx.clone());
    assert_eq!(app.state(), BotLifecycleState::Initializing);
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::ProbeCompleted(_))).await;
    assert_eq!(app.state(), BotLifecycleState::Idle);
    assert_eq!(
        agent.calls(),
        vec![Call::DryRun("getUser".into()), Call::DryRun("Status".into())]
    );
    assert_eq!(app.identity.caller_process_id.as_deref(), Some(CALLER));

    // Start with a valid configuration
    app.dashboard.allowance = "2".to_string();
    app.handle_key(KeyCode::Char('s'), tx.clone()).await.unwrap();
    assert_eq!(app.state(), BotLifecycleState::Starting);
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::StartFinished(_))).await;
    assert_eq!(app.state(), BotLifecycleState::Running);
    assert_eq!(
        agent.messages(),
        vec![
            (AGENT.to_string(), "Setup".to_string()),
            (AGENT.to_string(), "Start".to_string()),
            (CALLER.to_string(), "Start".to_string()),
        ]
    );

    // Poller fetches right away, then every five seconds
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::Snapshot(_))).await;
    let first = Instant::now();
    assert_eq!(agent.data_queries(), 1);
    assert_eq!(app.profit_display, "1.500000");
    assert_eq!(app.transcript.first().map(String::as_str), Some("Status: Running"));
    assert_eq!(
        app.status_message.as_deref(),
        Some("New arbitrage opportunity found!")
    );

    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::Snapshot(_))).await;
    let elapsed = first.elapsed();
    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
    assert_eq!(agent.data_queries(), 2);

    // Stop returns to idle and polling ends
    app.handle_key(KeyCode::Char('x'), tx.clone()).await.unwrap();
    assert_eq!(app.state(), BotLifecycleState::Stopping);
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::StopFinished(_))).await;
    assert_eq!(app.state(), BotLifecycleState::Idle);
    assert_eq!(
        agent.messages().last(),
        Some(&(AGENT.to_string(), "Stop".to_string()))
    );

    let queries = agent.data_queries();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(agent.data_queries(), queries);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn failed_setup_surfaces_step_and_stays_idle() {
    let agent = ScriptedAgent::new(true);
    let (mut app, tx, mut rx) = setup(&agent);

    app.init_session(tx.clone());
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::ProbeCompleted(_))).await;

    app.dashboard.allowance = "2".to_string();
    app.handle_key(KeyCode::Char('s'), tx.clone()).await.unwrap();
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::StartFinished(_))).await;

    assert_eq!(app.state(), BotLifecycleState::Idle);
    assert_eq!(agent.messages(), vec![(AGENT.to_string(), "Setup".to_string())]);
    let error = app.error_message.clone().unwrap();
    assert!(error.starts_with("Setup failed"), "{}", error);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(agent.data_queries(), 0);
}

#[tokio::test]
async fn invalid_start_never_reaches_the_agent() {
    let agent = ScriptedAgent::new(false);
    let (mut app, tx, mut rx) = setup(&agent);

    app.init_session(tx.clone());
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::ProbeCompleted(_))).await;

    // Empty allowance
    app.handle_key(KeyCode::Char('s'), tx.clone()).await.unwrap();
    assert!(app.error_message.is_some());

    // Same token on both sides
    app.dashboard.allowance = "2".to_string();
    app.dashboard.target_index = app.dashboard.input_index;
    app.handle_key(KeyCode::Char('s'), tx.clone()).await.unwrap();
    assert_eq!(
        app.error_message.as_deref(),
        Some("Input and target tokens must be different")
    );

    assert_eq!(app.state(), BotLifecycleState::Idle);
    assert!(agent.messages().is_empty());
}

/// Probe, then start with a valid form, leaving the poller running.
async fn start_running(
    app: &mut App,
    tx: &mpsc::Sender<AppMessage>,
    rx: &mut mpsc::Receiver<AppMessage>,
) {
    app.init_session(tx.clone());
    pump_until(app, rx, |m| matches!(m, AppMessage::ProbeCompleted(_))).await;
    app.dashboard.allowance = "2".to_string();
    app.handle_key(KeyCode::Char('s'), tx.clone()).await.unwrap();
    pump_until(app, rx, |m| matches!(m, AppMessage::StartFinished(_))).await;
    assert_eq!(app.state(), BotLifecycleState::Running);
}

fn parsed(payload: &str) -> deltafi_arbitrage::snapshot::ParsedSnapshot {
    SnapshotParser::default()
        .parse(&RawResponse::with_data(payload))
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn snapshots_from_an_old_poll_session_are_dropped() {
    let agent = ScriptedAgent::new(false);
    let (mut app, tx, mut rx) = setup(&agent);
    start_running(&mut app, &tx, &mut rx).await;
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::Snapshot(_))).await;
    assert_eq!(app.profit_display, "1.500000");

    let richer = SNAPSHOT.replace("1500000000000", "9000000000000");
    let before = app.transcript.clone();
    app.handle_message(AppMessage::Snapshot(PollEvent {
        generation: 0,
        snapshot: parsed(&richer),
    }))
    .await
    .unwrap();

    assert_eq!(app.profit_display, "1.500000");
    assert_eq!(app.transcript, before);
}

#[tokio::test(start_paused = true)]
async fn identical_snapshot_does_not_redraw() {
    let agent = ScriptedAgent::new(false);
    let (mut app, tx, mut rx) = setup(&agent);
    start_running(&mut app, &tx, &mut rx).await;
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::Snapshot(_))).await;

    let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
    terminal.draw(|f| app.render(f)).unwrap();
    assert!(!app.needs_redraw());

    // Next tick carries the same data and the same opportunity.
    let msg = rx.recv().await.unwrap();
    assert!(matches!(msg, AppMessage::Snapshot(_)));
    app.handle_message(msg).await.unwrap();
    assert!(!app.needs_redraw());

    // A changed snapshot does redraw.
    let generation = match rx.recv().await.unwrap() {
        AppMessage::Snapshot(event) => event.generation,
        other => panic!("unexpected message {:?}", other),
    };
    let richer = SNAPSHOT.replace("1500000000000", "9000000000000");
    app.handle_message(AppMessage::Snapshot(PollEvent {
        generation,
        snapshot: parsed(&richer),
    }))
    .await
    .unwrap();
    assert!(app.needs_redraw());
    assert_eq!(app.profit_display, "9.000000");
}

#[tokio::test(start_paused = true)]
async fn details_dialog_pauses_polling_and_refreshes_on_close() {
    let agent = ScriptedAgent::new(false);
    let (mut app, tx, mut rx) = setup(&agent);
    start_running(&mut app, &tx, &mut rx).await;
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::Snapshot(_))).await;
    assert_eq!(agent.data_queries(), 1);

    app.handle_key(KeyCode::Char('d'), tx.clone()).await.unwrap();
    assert!(app.detail_open);
    assert!(!app.can_quit());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(agent.data_queries(), 1);
    let view = app.reveal_view();
    assert_eq!(view.lines, app.transcript);
    assert_eq!(view.lines.first().map(String::as_str), Some("Status: Running"));

    app.handle_key(KeyCode::Esc, tx.clone()).await.unwrap();
    assert!(!app.detail_open);
    assert!(app.reveal_view().lines.is_empty());

    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::Snapshot(_))).await;
    let closed = Instant::now();
    assert_eq!(agent.data_queries(), 2);

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(agent.data_queries(), 2);
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::Snapshot(_))).await;
    assert!(closed.elapsed() >= Duration::from_secs(5));
    assert_eq!(agent.data_queries(), 3);
}

#[tokio::test]
async fn caller_given_for_the_run_skips_registry_lookup() {
    let agent = ScriptedAgent::new(false);
    let config = AppConfig {
        agent_process_id: AGENT.to_string(),
        wallet_address: Some("wallet-address".to_string()),
        ..AppConfig::default()
    };
    let mut identity = Identity::from_config(&config);
    identity.caller_process_id = Some("override-pid".to_string());
    let client = AgentClient::new(agent.clone(), config.request_timeout());
    let (tx, mut rx) = mpsc::channel(32);
    let mut app = App::new(config, identity, client, tx.clone());

    app.init_session(tx.clone());
    pump_until(&mut app, &mut rx, |m| matches!(m, AppMessage::ProbeCompleted(_))).await;
    assert_eq!(agent.calls(), vec![Call::DryRun("Status".into())]);
    assert_eq!(app.identity.caller_process_id.as_deref(), Some("override-pid"));
}
