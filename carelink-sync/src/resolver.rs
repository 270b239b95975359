//! Decision rules for reconciling a local record with its cloud copy.
//!
//! Two comparison modes exist and an engine uses exactly one of them for its
//! whole lifetime:
//!
//! - **Timestamp**: compares wall-clock `updated_date`. A missing date on
//!   either side is a fatal precondition failure, not a conflict.
//! - **Clock**: compares `logical_clock`. Equal clocks are the steady state
//!   after a successful sync. A cloud clock above the local clock outside a
//!   pull is a protocol violation and is reported, never guessed around.

use crate::error::{SyncError, SyncResult};
use carelink_types::{Entity, LogicalClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::debug;

/// How two copies of a record are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Wall-clock `updated_date` ordering (non-causal).
    Timestamp,
    /// Logical clock ordering (causal).
    #[default]
    Clock,
}

/// Why a comparison could not pick a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    CloudClockExceedsLocal {
        local: LogicalClock,
        remote: LogicalClock,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::CloudClockExceedsLocal { .. } => {
                f.write_str("cloud clock exceeds local clock")
            }
        }
    }
}

/// Outcome of comparing a local record with its cloud copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Write the local copy to the remote, stamped with the local clock.
    PushLocalToRemote,
    /// Apply the remote copy locally.
    PullRemoteToLocal,
    /// Both sides agree; no write.
    NoOp,
    /// Neither side can be trusted; surface to the caller.
    Conflict(ConflictReason),
}

impl Decision {
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Decision::PushLocalToRemote | Decision::PullRemoteToLocal)
    }
}

/// Applies the comparison rules of one mode.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    mode: ComparisonMode,
}

impl ConflictResolver {
    pub fn new(mode: ComparisonMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ComparisonMode {
        self.mode
    }

    /// Decides how a local update reaches the cloud copy.
    ///
    /// `overwrite_remote` forces a push in timestamp mode. In clock mode the
    /// clocks alone decide, and the flag is ignored: two copies at the same
    /// clock must never cause a write, and a copy whose clock is below the
    /// cloud's must never be written over it, whatever the caller asks for.
    /// A lower local clock is therefore always a conflict.
    pub fn compare_update(
        &self,
        local: &Entity,
        remote: &Entity,
        overwrite_remote: bool,
    ) -> SyncResult<Decision> {
        let decision = match self.mode {
            ComparisonMode::Timestamp => {
                let local_date = required_date(local.updated_date, "updatedDate", "local", local)?;
                let remote_date =
                    required_date(remote.updated_date, "updatedDate", "cloud", remote)?;
                by_date(local_date, remote_date, overwrite_remote)
            }
            ComparisonMode::Clock => by_clock(local.logical_clock, remote.logical_clock),
        };
        debug!(
            "compare_update {} ({:?}): {:?}",
            local.entity_id, self.mode, decision
        );
        Ok(decision)
    }

    /// Decides how a local tombstone reaches the cloud copy.
    ///
    /// In timestamp mode the local `deleted_date` is compared with the cloud
    /// copy's `updated_date`, so a cloud edit made after the delete wins.
    pub fn compare_delete(&self, local: &Entity, remote: &Entity) -> SyncResult<Decision> {
        let decision = match self.mode {
            ComparisonMode::Timestamp => {
                let local_date = required_date(local.deleted_date, "deletedDate", "local", local)?;
                let remote_date =
                    required_date(remote.updated_date, "updatedDate", "cloud", remote)?;
                by_date(local_date, remote_date, false)
            }
            ComparisonMode::Clock => by_clock(local.logical_clock, remote.logical_clock),
        };
        debug!(
            "compare_delete {} ({:?}): {:?}",
            local.entity_id, self.mode, decision
        );
        Ok(decision)
    }

    /// Decides how a pulled cloud copy is applied locally.
    ///
    /// During a pull a cloud clock above the local one is the normal case, so
    /// this never yields [`Decision::Conflict`]. `PushLocalToRemote` here means
    /// the local copy holds an unpushed change and must be kept.
    pub fn compare_incoming(&self, local: &Entity, remote: &Entity) -> SyncResult<Decision> {
        let decision = match self.mode {
            ComparisonMode::Timestamp => {
                let local_date = required_date(local.updated_date, "updatedDate", "local", local)?;
                let remote_date =
                    required_date(remote.updated_date, "updatedDate", "cloud", remote)?;
                by_date(local_date, remote_date, false)
            }
            ComparisonMode::Clock => match local.logical_clock.cmp(&remote.logical_clock) {
                Ordering::Less => Decision::PullRemoteToLocal,
                Ordering::Equal => Decision::NoOp,
                Ordering::Greater => Decision::PushLocalToRemote,
            },
        };
        Ok(decision)
    }
}

fn required_date(
    date: Option<DateTime<Utc>>,
    field: &str,
    side: &str,
    entity: &Entity,
) -> SyncResult<DateTime<Utc>> {
    date.ok_or_else(|| {
        SyncError::RequiredValueMissing(format!(
            "{field} on {side} copy of {} ({})",
            entity.entity_id, entity.kind
        ))
    })
}

fn by_date(local: DateTime<Utc>, remote: DateTime<Utc>, overwrite_remote: bool) -> Decision {
    if overwrite_remote || remote < local {
        Decision::PushLocalToRemote
    } else if remote > local {
        Decision::PullRemoteToLocal
    } else {
        Decision::NoOp
    }
}

fn by_clock(local: LogicalClock, remote: LogicalClock) -> Decision {
    match local.cmp(&remote) {
        Ordering::Greater => Decision::PushLocalToRemote,
        Ordering::Equal => Decision::NoOp,
        Ordering::Less => Decision::Conflict(ConflictReason::CloudClockExceedsLocal { local, remote }),
    }
}
