//! Core type definitions for CareLink sync.
//!
//! This crate defines the record-agnostic types shared by the stores and
//! the sync engine:
//! - Record identifiers (UUID v7) and remote foreign keys
//! - Logical clocks and knowledge vectors
//! - The versioned [`Entity`] record with its version-chain pointers
//!
//! Per-kind field layouts (patients, plans, tasks, ...) are opaque here and
//! travel in [`Entity::payload`].

mod clock;
mod entity;
mod ids;

pub use clock::{KnowledgeVector, LogicalClock};
pub use entity::{Entity, EntityKind, Link};
pub use ids::{EntityUuid, RemoteId, ScopeId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
