//! Periodic snapshot refresh while the agent is running.
//!
//! Whether the poller runs is a pure function of [`PollConditions`]. Every
//! change of conditions goes through [`Poller::update`], which starts or
//! aborts the background task. A fresh task fetches immediately and then on
//! every interval, so resuming after the details view closes gives one
//! out-of-band refresh before the regular cadence picks up again.

use crate::{
    client::AgentClient,
    error::FetchError,
    lifecycle::BotLifecycleState,
    protocol::{Action, Tag},
    snapshot::{ParsedSnapshot, SnapshotParser},
};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConditions {
    pub lifecycle: BotLifecycleState,
    pub detail_open: bool,
    pub identity_present: bool,
}

pub fn should_poll(conditions: &PollConditions) -> bool {
    conditions.lifecycle == BotLifecycleState::Running
        && !conditions.detail_open
        && conditions.identity_present
}

/// A snapshot produced by poll session `generation`.
#[derive(Debug, Clone)]
pub struct PollEvent {
    pub generation: u64,
    pub snapshot: ParsedSnapshot,
}

/// One `GetArbitrageData` dry-run, parsed.
pub async fn fetch_snapshot(
    client: &AgentClient,
    parser: &SnapshotParser,
    agent_process_id: &str,
) -> Result<ParsedSnapshot, FetchError> {
    let raw = client
        .query(agent_process_id, &[Tag::action(Action::GetArbitrageData)])
        .await?;
    Ok(parser.parse(&raw)?)
}

pub struct Poller<M> {
    client: AgentClient,
    parser: SnapshotParser,
    agent_process_id: String,
    interval: Duration,
    events: mpsc::Sender<M>,
    conditions: Option<PollConditions>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl<M> Poller<M>
where
    M: From<PollEvent> + Send + 'static,
{
    pub fn new(
        client: AgentClient,
        parser: SnapshotParser,
        agent_process_id: impl Into<String>,
        interval: Duration,
        events: mpsc::Sender<M>,
    ) -> Self {
        Self {
            client,
            parser,
            agent_process_id: agent_process_id.into(),
            interval,
            events,
            conditions: None,
            generation: 0,
            task: None,
        }
    }

    /// Current poll session. Events from other generations are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Recompute the enabled predicate and start or stop accordingly.
    /// Returns whether the poller is active afterwards.
    pub fn update(&mut self, conditions: PollConditions) -> bool {
        if self.conditions == Some(conditions) {
            return self.is_active();
        }
        self.conditions = Some(conditions);

        match (should_poll(&conditions), self.is_active()) {
            (true, false) => self.resume(),
            (false, true) => self.suspend(),
            _ => {}
        }
        self.is_active()
    }

    fn resume(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let client = self.client.clone();
        let parser = self.parser.clone();
        let agent_process_id = self.agent_process_id.clone();
        let period = self.interval;
        let events = self.events.clone();
        debug!(generation, "poller resumed");

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match fetch_snapshot(&client, &parser, &agent_process_id).await {
                    Ok(snapshot) => {
                        let event = PollEvent { generation, snapshot };
                        if events.send(event.into()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(generation, error = %e, "poll cycle skipped"),
                }
            }
        }));
    }

    fn suspend(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(generation = self.generation, "poller suspended");
        }
    }
}

impl<M> Drop for Poller<M> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
