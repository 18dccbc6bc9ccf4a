//! Agent lifecycle: status probe, start sequence and stop.
//!
//! Each operation is split in two phases so a single owner can drive the
//! state while the remote calls run elsewhere:
//!
//! 1. `begin_*` checks the guards and claims the transitional state. It never
//!    touches the network, and it refuses while another operation is pending.
//! 2. The returned plan's `execute` issues the remote calls.
//! 3. `finish_*` applies the outcome. On failure the state goes back to what
//!    it was before the attempt.
//!
//! `initialize`, `start` and `stop` chain the three phases for callers that
//! can hold `&mut self` across the await.

use crate::{
    client::AgentClient,
    error::{LifecycleError, LifecycleStep, RemoteError, StepFailure, ValidationError},
    identity::Identity,
    protocol::{Action, Tag},
    snapshot::{SnapshotParser, StatusReport},
};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotLifecycleState {
    Idle,
    Initializing,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for BotLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotLifecycleState::Idle => write!(f, "Idle"),
            BotLifecycleState::Initializing => write!(f, "Initializing"),
            BotLifecycleState::Starting => write!(f, "Starting"),
            BotLifecycleState::Running => write!(f, "Running"),
            BotLifecycleState::Stopping => write!(f, "Stopping"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOperation {
    Probe,
    Start,
    Stop,
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingOperation::Probe => write!(f, "status check"),
            PendingOperation::Start => write!(f, "start"),
            PendingOperation::Stop => write!(f, "stop"),
        }
    }
}

/// Operator-chosen parameters for a start attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartConfig {
    /// Token process addresses
    pub input_token: String,
    pub target_token: String,
    /// Percent, sent verbatim
    pub slippage_percent: String,
    pub allowance_base_units: i128,
    pub min_profit_threshold_base_units: i128,
    /// Falls back to the identity's caller process when unset.
    pub caller_process_id: Option<String>,
}

/// Validated start sequence, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartPlan {
    pub agent_process_id: String,
    pub caller_process_id: String,
    pub config: StartConfig,
}

impl StartPlan {
    pub fn setup_tags(&self) -> Vec<Tag> {
        vec![
            Tag::action(Action::Setup),
            Tag::new("InputToken", &self.config.input_token),
            Tag::new("TargetToken", &self.config.target_token),
            Tag::new("Slippage", &self.config.slippage_percent),
            Tag::new("InputTokenAmount", self.config.allowance_base_units.to_string()),
            Tag::new("OriginalSender", &self.caller_process_id),
            Tag::new(
                "MinProfitThreshold",
                self.config.min_profit_threshold_base_units.to_string(),
            ),
        ]
    }

    pub fn start_agent_tags(&self) -> Vec<Tag> {
        vec![
            Tag::action(Action::Start),
            Tag::new("inputToken", &self.config.input_token),
            Tag::new("targetToken", &self.config.target_token),
        ]
    }

    pub fn start_caller_tags(&self) -> Vec<Tag> {
        vec![
            Tag::action(Action::Start),
            Tag::new("Target", &self.agent_process_id),
        ]
    }

    /// Run Setup, Start (agent), Start (caller), strictly in order.
    ///
    /// Stops at the first failing step. A successful Setup is not rolled
    /// back when a later step fails.
    pub async fn execute(&self, client: &AgentClient) -> Result<(), StepFailure> {
        let steps = [
            (LifecycleStep::Setup, &self.agent_process_id, self.setup_tags()),
            (LifecycleStep::StartAgent, &self.agent_process_id, self.start_agent_tags()),
            (LifecycleStep::StartCaller, &self.caller_process_id, self.start_caller_tags()),
        ];

        for (step, process_id, tags) in steps {
            client
                .send(process_id, &tags)
                .await
                .map_err(|source| StepFailure { step, source })?;
            info!(%step, "lifecycle step succeeded");
        }
        Ok(())
    }
}

/// Validated stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopPlan {
    pub agent_process_id: String,
}

impl StopPlan {
    pub async fn execute(&self, client: &AgentClient) -> Result<(), StepFailure> {
        client
            .send(&self.agent_process_id, &[Tag::action(Action::Stop)])
            .await
            .map(|_| ())
            .map_err(|source| StepFailure { step: LifecycleStep::Stop, source })
    }
}

/// One-shot `Status` dry-run.
pub async fn probe_status(
    client: &AgentClient,
    agent_process_id: &str,
    parser: &SnapshotParser,
) -> Result<StatusReport, RemoteError> {
    let raw = client
        .query(agent_process_id, &[Tag::action(Action::Status)])
        .await?;
    Ok(parser.parse_status(&raw))
}

/// Sole owner of the lifecycle state.
#[derive(Debug, Clone)]
pub struct LifecycleController {
    agent_process_id: String,
    state: BotLifecycleState,
    pending: Option<PendingOperation>,
}

impl LifecycleController {
    pub fn new(agent_process_id: impl Into<String>) -> Self {
        Self {
            agent_process_id: agent_process_id.into(),
            state: BotLifecycleState::Idle,
            pending: None,
        }
    }

    pub fn agent_process_id(&self) -> &str {
        &self.agent_process_id
    }

    pub fn state(&self) -> BotLifecycleState {
        self.state
    }

    pub fn pending(&self) -> Option<PendingOperation> {
        self.pending
    }

    pub fn is_running(&self) -> bool {
        self.state == BotLifecycleState::Running
    }

    fn transition(&mut self, next: BotLifecycleState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "lifecycle transition");
            self.state = next;
        }
    }

    fn claim(&mut self, operation: PendingOperation) -> Result<(), ValidationError> {
        match self.pending {
            Some(current) => Err(ValidationError::OperationPending(current.to_string())),
            None => {
                self.pending = Some(operation);
                Ok(())
            }
        }
    }

    fn require_state(
        &self,
        expected: BotLifecycleState,
        action: &str,
    ) -> Result<(), ValidationError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ValidationError::InvalidState {
                expected: expected.to_string(),
                action: action.to_string(),
            })
        }
    }

    /// Enter `Initializing` if an identity is present. Returns false when no
    /// probe should run.
    pub fn begin_probe(&mut self, identity: &Identity) -> bool {
        if !identity.is_connected()
            || self.pending.is_some()
            || self.state != BotLifecycleState::Idle
        {
            return false;
        }
        self.pending = Some(PendingOperation::Probe);
        self.transition(BotLifecycleState::Initializing);
        true
    }

    pub fn finish_probe(&mut self, result: &Result<StatusReport, RemoteError>) -> BotLifecycleState {
        if self.pending != Some(PendingOperation::Probe) {
            return self.state;
        }
        self.pending = None;
        match result {
            Ok(report) if report.enabled => self.transition(BotLifecycleState::Running),
            Ok(_) => self.transition(BotLifecycleState::Idle),
            Err(e) => {
                warn!(error = %e, "status probe failed");
                self.transition(BotLifecycleState::Idle);
            }
        }
        self.state
    }

    pub fn begin_start(
        &mut self,
        identity: &Identity,
        config: StartConfig,
    ) -> Result<StartPlan, ValidationError> {
        if let Some(current) = self.pending {
            return Err(ValidationError::OperationPending(current.to_string()));
        }
        self.require_state(BotLifecycleState::Idle, "start")?;
        if !identity.is_connected() {
            return Err(ValidationError::NotConnected);
        }
        let caller_process_id = config
            .caller_process_id
            .clone()
            .or_else(|| identity.caller_process_id.clone())
            .filter(|p| !p.is_empty())
            .ok_or(ValidationError::NoSession)?;
        if config.allowance_base_units <= 0 {
            return Err(ValidationError::NonPositiveAllowance);
        }
        if config.input_token == config.target_token {
            return Err(ValidationError::SameToken);
        }

        self.claim(PendingOperation::Start)?;
        self.transition(BotLifecycleState::Starting);
        Ok(StartPlan {
            agent_process_id: self.agent_process_id.clone(),
            caller_process_id,
            config,
        })
    }

    pub fn finish_start(&mut self, result: Result<(), StepFailure>) -> Result<(), LifecycleError> {
        if self.pending == Some(PendingOperation::Start) {
            self.pending = None;
        }
        match result {
            Ok(()) => {
                self.transition(BotLifecycleState::Running);
                Ok(())
            }
            Err(failure) => {
                warn!(step = %failure.step, error = %failure.source, "start sequence failed");
                self.transition(BotLifecycleState::Idle);
                Err(failure.into())
            }
        }
    }

    pub fn begin_stop(&mut self, identity: &Identity) -> Result<StopPlan, ValidationError> {
        if let Some(current) = self.pending {
            return Err(ValidationError::OperationPending(current.to_string()));
        }
        self.require_state(BotLifecycleState::Running, "stop")?;
        if !identity.is_connected() {
            return Err(ValidationError::NotConnected);
        }
        if !identity.has_session() {
            return Err(ValidationError::NoSession);
        }

        self.claim(PendingOperation::Stop)?;
        self.transition(BotLifecycleState::Stopping);
        Ok(StopPlan { agent_process_id: self.agent_process_id.clone() })
    }

    pub fn finish_stop(&mut self, result: Result<(), StepFailure>) -> Result<(), LifecycleError> {
        if self.pending == Some(PendingOperation::Stop) {
            self.pending = None;
        }
        match result {
            Ok(()) => {
                self.transition(BotLifecycleState::Idle);
                Ok(())
            }
            Err(failure) => {
                warn!(error = %failure.source, "stop failed");
                self.transition(BotLifecycleState::Running);
                Err(failure.into())
            }
        }
    }

    /// Run the status probe in place.
    pub async fn initialize(
        &mut self,
        client: &AgentClient,
        parser: &SnapshotParser,
        identity: &Identity,
    ) -> Option<StatusReport> {
        if !self.begin_probe(identity) {
            return None;
        }
        let result = probe_status(client, &self.agent_process_id, parser).await;
        self.finish_probe(&result);
        result.ok()
    }

    pub async fn start(
        &mut self,
        client: &AgentClient,
        identity: &Identity,
        config: StartConfig,
    ) -> Result<(), LifecycleError> {
        let plan = self.begin_start(identity, config)?;
        let result = plan.execute(client).await;
        self.finish_start(result)
    }

    pub async fn stop(
        &mut self,
        client: &AgentClient,
        identity: &Identity,
    ) -> Result<(), LifecycleError> {
        let plan = self.begin_stop(identity)?;
        let result = plan.execute(client).await;
        self.finish_stop(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::Transport,
        error::RemoteErrorKind,
        protocol::RawResponse,
    };
    use async_trait::async_trait;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
        time::Duration,
    };

    const AGENT: &str = "agent-pid";
    const CALLER: &str = "caller-pid";

    #[derive(Default)]
    struct ScriptedTransport {
        sent: Mutex<Vec<(String, Vec<Tag>)>>,
        replies: Mutex<VecDeque<RawResponse>>,
    }

    impl ScriptedTransport {
        fn with_replies(replies: Vec<RawResponse>) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into()),
            })
        }

        fn sent(&self) -> Vec<(String, Vec<Tag>)> {
            self.sent.lock().unwrap().clone()
        }

        fn next(&self, process_id: &str, tags: &[Tag]) -> RawResponse {
            self.sent
                .lock()
                .unwrap()
                .push((process_id.to_string(), tags.to_vec()));
            self.replies.lock().unwrap().pop_front().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn dry_run(&self, process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError> {
            Ok(self.next(process_id, tags))
        }

        async fn message(&self, process_id: &str, tags: &[Tag]) -> Result<RawResponse, RemoteError> {
            Ok(self.next(process_id, tags))
        }
    }

    fn client(transport: &Arc<ScriptedTransport>) -> AgentClient {
        AgentClient::new(transport.clone(), Duration::from_secs(5))
    }

    fn identity() -> Identity {
        Identity {
            wallet_address: Some("wallet".into()),
            caller_process_id: Some(CALLER.into()),
        }
    }

    fn config() -> StartConfig {
        StartConfig {
            input_token: "token-a".into(),
            target_token: "token-b".into(),
            slippage_percent: "0.3".into(),
            allowance_base_units: 2_000_000_000_000,
            min_profit_threshold_base_units: 100_000_000_000,
            caller_process_id: None,
        }
    }

    fn action(tags: &[Tag]) -> &str {
        tags.iter().find(|t| t.name == "Action").map(|t| t.value.as_str()).unwrap()
    }

    #[tokio::test]
    async fn start_runs_three_steps_in_order() {
        let transport = ScriptedTransport::with_replies(vec![]);
        let mut controller = LifecycleController::new(AGENT);

        controller.start(&client(&transport), &identity(), config()).await.unwrap();

        assert_eq!(controller.state(), BotLifecycleState::Running);
        assert_eq!(controller.pending(), None);
        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!((sent[0].0.as_str(), action(&sent[0].1)), (AGENT, "Setup"));
        assert_eq!((sent[1].0.as_str(), action(&sent[1].1)), (AGENT, "Start"));
        assert_eq!((sent[2].0.as_str(), action(&sent[2].1)), (CALLER, "Start"));
        assert!(sent[0].1.contains(&Tag::new("InputTokenAmount", "2000000000000")));
        assert!(sent[0].1.contains(&Tag::new("OriginalSender", CALLER)));
        assert!(sent[0].1.contains(&Tag::new("MinProfitThreshold", "100000000000")));
        assert!(sent[1].1.contains(&Tag::new("inputToken", "token-a")));
        assert!(sent[2].1.contains(&Tag::new("Target", AGENT)));
    }

    #[tokio::test]
    async fn setup_failure_aborts_before_other_calls() {
        let transport =
            ScriptedTransport::with_replies(vec![RawResponse::with_error("bad config")]);
        let mut controller = LifecycleController::new(AGENT);

        let err = controller
            .start(&client(&transport), &identity(), config())
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some(LifecycleStep::Setup));
        match err {
            LifecycleError::Step(failure) => {
                assert!(failure.is_setup_failed());
                assert_eq!(failure.source.kind, RemoteErrorKind::RemoteRejected);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(controller.state(), BotLifecycleState::Idle);
    }

    #[tokio::test]
    async fn later_step_failure_reports_step_without_rollback() {
        let transport = ScriptedTransport::with_replies(vec![
            RawResponse::default(),
            RawResponse::with_error("agent busy"),
        ]);
        let mut controller = LifecycleController::new(AGENT);

        let err = controller
            .start(&client(&transport), &identity(), config())
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some(LifecycleStep::StartAgent));
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, tags)| action(tags) != "Stop"));
        assert_eq!(controller.state(), BotLifecycleState::Idle);
    }

    #[tokio::test]
    async fn same_token_rejected_before_network() {
        let transport = ScriptedTransport::with_replies(vec![]);
        let mut controller = LifecycleController::new(AGENT);
        let mut cfg = config();
        cfg.target_token = cfg.input_token.clone();

        let err = controller
            .start(&client(&transport), &identity(), cfg)
            .await
            .unwrap_err();

        assert_eq!(err, LifecycleError::Validation(ValidationError::SameToken));
        assert!(transport.sent().is_empty());
        assert_eq!(controller.state(), BotLifecycleState::Idle);
    }

    #[test]
    fn start_guards_fail_fast() {
        let mut controller = LifecycleController::new(AGENT);

        let mut cfg = config();
        cfg.allowance_base_units = 0;
        assert_eq!(
            controller.begin_start(&identity(), cfg),
            Err(ValidationError::NonPositiveAllowance)
        );
        assert_eq!(
            controller.begin_start(&Identity::default(), config()),
            Err(ValidationError::NotConnected)
        );
        let no_caller = Identity { wallet_address: Some("w".into()), caller_process_id: None };
        assert_eq!(
            controller.begin_start(&no_caller, config()),
            Err(ValidationError::NoSession)
        );
        assert_eq!(controller.state(), BotLifecycleState::Idle);
        assert_eq!(controller.pending(), None);
    }

    #[test]
    fn second_operation_cannot_claim_transitional_state() {
        let mut controller = LifecycleController::new(AGENT);
        controller.begin_start(&identity(), config()).unwrap();
        assert_eq!(controller.state(), BotLifecycleState::Starting);

        assert!(matches!(
            controller.begin_start(&identity(), config()),
            Err(ValidationError::OperationPending(_))
        ));
        assert!(matches!(
            controller.begin_stop(&identity()),
            Err(ValidationError::OperationPending(_))
        ));
        assert_eq!(controller.state(), BotLifecycleState::Starting);
    }

    #[tokio::test]
    async fn stop_failure_stays_running() {
        let transport = ScriptedTransport::with_replies(vec![
            RawResponse::default(),
            RawResponse::default(),
            RawResponse::default(),
            RawResponse::with_error("cannot stop"),
        ]);
        let client = client(&transport);
        let mut controller = LifecycleController::new(AGENT);
        controller.start(&client, &identity(), config()).await.unwrap();

        let err = controller.stop(&client, &identity()).await.unwrap_err();
        match err {
            LifecycleError::Step(failure) => assert!(failure.is_stop_failed()),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(controller.state(), BotLifecycleState::Running);

        controller.stop(&client, &identity()).await.unwrap();
        assert_eq!(controller.state(), BotLifecycleState::Idle);
    }

    #[test]
    fn stop_requires_running() {
        let mut controller = LifecycleController::new(AGENT);
        assert!(matches!(
            controller.begin_stop(&identity()),
            Err(ValidationError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn probe_sets_initial_state() {
        let parser = SnapshotParser::default();
        let enabled = ScriptedTransport::with_replies(vec![RawResponse::with_tags(vec![
            Tag::new("Enabled", "true"),
        ])]);
        let mut controller = LifecycleController::new(AGENT);
        let report = controller.initialize(&client(&enabled), &parser, &identity()).await;
        assert!(report.unwrap().enabled);
        assert_eq!(controller.state(), BotLifecycleState::Running);
        assert_eq!(action(&enabled.sent()[0].1), "Status");

        let disabled = ScriptedTransport::with_replies(vec![RawResponse::default()]);
        let mut controller = LifecycleController::new(AGENT);
        controller.initialize(&client(&disabled), &parser, &identity()).await;
        assert_eq!(controller.state(), BotLifecycleState::Idle);
    }

    #[tokio::test]
    async fn probe_skipped_without_identity() {
        let transport = ScriptedTransport::with_replies(vec![]);
        let mut controller = LifecycleController::new(AGENT);
        let report = controller
            .initialize(&client(&transport), &SnapshotParser::default(), &Identity::default())
            .await;
        assert_eq!(report, None);
        assert!(transport.sent().is_empty());
        assert_eq!(controller.state(), BotLifecycleState::Idle);
    }

    #[tokio::test]
    async fn failed_probe_returns_to_idle() {
        let transport =
            ScriptedTransport::with_replies(vec![RawResponse::with_error("unavailable")]);
        let mut controller = LifecycleController::new(AGENT);
        controller
            .initialize(&client(&transport), &SnapshotParser::default(), &identity())
            .await;
        assert_eq!(controller.state(), BotLifecycleState::Idle);
        assert_eq!(controller.pending(), None);
    }
}
