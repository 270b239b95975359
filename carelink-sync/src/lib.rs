//! Revision sync engine for CareLink.
//!
//! Reconciles the on-device store with the cloud copy so both converge
//! despite concurrent, possibly offline edits on several devices.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Resolver**: decides push, pull, no-op or conflict for a record pair,
//!   by wall-clock timestamp or by logical clock
//! - **Version link**: repairs the doubly-linked chain of record versions
//!   after a write
//! - **Pusher**: writes a record, binds its remote id and reconciles child
//!   values by identity
//! - **Puller**: yields remote changes newer than a knowledge point, one
//!   merge at a time
//! - **Engine**: runs each record through the sync state machine under a
//!   per-record lock
//!
//! ## Sync Process
//!
//! 1. **Compare**: fetch the cloud copy and apply the resolver rules
//! 2. **Push or pull**: write whichever side wins
//! 3. **Bind**: record the cloud's remote id on the local copy
//! 4. **Repair**: link chain siblings the write exposed
//!
//! # Example
//!
//! ```
//! use carelink_store::memory::{MemoryLocalStore, MemoryRemoteStore};
//! use carelink_sync::{SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! let engine = SyncEngine::new(
//!     Arc::new(MemoryLocalStore::new()),
//!     Arc::new(MemoryRemoteStore::new()),
//!     SyncConfig::default(),
//! );
//! ```

mod engine;
mod error;
pub mod lock;
pub mod puller;
pub mod pusher;
pub mod resolver;
pub mod state;
pub mod version_link;

pub use engine::{PullReport, PushContention, PushReport, SyncConfig, SyncEngine, SyncOutcome};
pub use error::{SyncError, SyncResult};
pub use lock::{KeyedGuard, KeyedLock};
pub use puller::{Change, PendingChange, RevisionCursor, RevisionPuller};
pub use pusher::{reconcile_children, PushOutcome, RevisionPusher};
pub use resolver::{ComparisonMode, ConflictReason, ConflictResolver, Decision};
pub use state::{SyncAttempt, SyncPhase};
pub use version_link::{RepairReport, VersionLink};
