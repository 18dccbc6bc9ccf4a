//! Opportunity deduplication by timestamp.

use crate::snapshot::Opportunity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acceptance {
    pub is_new: bool,
}

/// An opportunity is new only if it is strictly later than the previous one.
/// Equal or older timestamps are repeats and must not notify.
pub fn accept(candidate: &Opportunity, previous: Option<&Opportunity>) -> Acceptance {
    let is_new = match previous {
        None => true,
        Some(prev) => candidate.timestamp_seconds > prev.timestamp_seconds,
    };
    Acceptance { is_new }
}

/// Keeps exactly the last accepted opportunity of a polling session.
#[derive(Debug, Clone, Default)]
pub struct OpportunityDeduplicator {
    last: Option<Opportunity>,
}

impl OpportunityDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `candidate` should be announced, and remembers it.
    pub fn observe(&mut self, candidate: &Opportunity) -> bool {
        let Acceptance { is_new } = accept(candidate, self.last.as_ref());
        if is_new {
            self.last = Some(candidate.clone());
        }
        is_new
    }

    /// Forget the session's history.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
