//! Line-by-line reveal of a transcript in the details view.

use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    Idle,
    /// Number of lines revealed so far.
    Revealing(usize),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealView {
    /// Bumped on every open and close. A reveal task only writes while the
    /// view still carries the epoch it was started with.
    pub epoch: u64,
    pub state: RevealState,
    pub lines: Vec<String>,
}

impl RevealView {
    fn idle(epoch: u64) -> Self {
        Self { epoch, state: RevealState::Idle, lines: Vec::new() }
    }
}

/// Reveals one line per tick, starting on open. Closing cancels the timer
/// and clears what was shown.
pub struct TranscriptRevealer {
    cadence: Duration,
    epoch: u64,
    view: Arc<watch::Sender<RevealView>>,
    task: Option<JoinHandle<()>>,
}

impl TranscriptRevealer {
    pub fn new(cadence: Duration) -> Self {
        let (tx, _rx) = watch::channel(RevealView::idle(0));
        Self { cadence, epoch: 0, view: Arc::new(tx), task: None }
    }

    pub fn subscribe(&self) -> watch::Receiver<RevealView> {
        self.view.subscribe()
    }

    /// Snapshot of what is currently shown.
    pub fn view(&self) -> RevealView {
        self.view.borrow().clone()
    }

    /// Restart from an empty view and reveal `transcript` from its first line.
    pub fn open(&mut self, transcript: Vec<String>) {
        let epoch = self.cancel();

        if transcript.is_empty() {
            self.view.send_replace(RevealView {
                epoch,
                state: RevealState::Done,
                lines: Vec::new(),
            });
            return;
        }
        self.view.send_replace(RevealView {
            epoch,
            state: RevealState::Revealing(0),
            lines: Vec::new(),
        });

        let view = self.view.clone();
        let cadence = self.cadence;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let total = transcript.len();
            for (index, line) in transcript.into_iter().enumerate() {
                ticker.tick().await;
                // abort() cannot interrupt a write already under way, so a
                // superseded task must check before touching the view.
                let current = view.send_if_modified(|v| {
                    if v.epoch != epoch {
                        return false;
                    }
                    v.lines.push(line);
                    v.state = if index + 1 == total {
                        RevealState::Done
                    } else {
                        RevealState::Revealing(index + 1)
                    };
                    true
                });
                if !current {
                    return;
                }
            }
        }));
    }

    pub fn close(&mut self) {
        let epoch = self.cancel();
        self.view.send_replace(RevealView::idle(epoch));
    }

    /// Stop the running reveal and start a new epoch.
    fn cancel(&mut self) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.epoch += 1;
        self.epoch
    }
}

impl Drop for TranscriptRevealer {
    fn drop(&mut self) {
        self.cancel();
    }
}
