//! Per-attempt sync state machine.
//!
//! ```text
//! Idle -> Comparing -> Pushing -> Repairing -> Done
//!                  |          \-------------> Done
//!                  |-> Pulling -------------> Done
//!                  \------------------------> Done      (no-op)
//! any non-terminal phase ------------------> Failed
//! ```
//!
//! `Failed` is terminal. The engine never retries on its own.

use crate::error::SyncError;
use carelink_types::EntityUuid;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Phase of one sync attempt for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    Comparing,
    Pushing,
    Pulling,
    Repairing,
    Done,
    Failed,
}

impl SyncPhase {
    /// Whether the attempt can move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: SyncPhase) -> bool {
        use SyncPhase::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Idle, Comparing) => true,
            (Comparing, Pushing | Pulling | Done) => true,
            (Pushing, Repairing | Done) => true,
            (Pulling | Repairing, Done) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncPhase::Done | SyncPhase::Failed)
    }
}

/// The phase history of one attempt.
#[derive(Debug, Clone)]
pub struct SyncAttempt {
    uuid: EntityUuid,
    phases: Vec<SyncPhase>,
}

impl SyncAttempt {
    pub fn new(uuid: EntityUuid) -> Self {
        Self {
            uuid,
            phases: vec![SyncPhase::Idle],
        }
    }

    pub fn uuid(&self) -> EntityUuid {
        self.uuid
    }

    pub fn current(&self) -> SyncPhase {
        self.phases.last().copied().unwrap_or(SyncPhase::Idle)
    }

    /// Every phase entered so far, starting with `Idle`.
    pub fn phases(&self) -> &[SyncPhase] {
        &self.phases
    }

    /// Moves to the next phase.
    pub fn advance(&mut self, next: SyncPhase) {
        let from = self.current();
        debug_assert!(
            from.can_transition_to(next),
            "illegal sync transition {from:?} -> {next:?}"
        );
        debug!("sync {}: {:?} -> {:?}", self.uuid, from, next);
        self.phases.push(next);
    }

    /// Ends the attempt with the error that stopped it.
    pub fn fail(&mut self, err: &SyncError) {
        if self.current().is_terminal() {
            return;
        }
        warn!("sync {} failed in {:?}: {}", self.uuid, self.current(), err);
        self.phases.push(SyncPhase::Failed);
    }
}
