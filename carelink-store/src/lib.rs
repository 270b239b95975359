//! Store capabilities consumed by CareLink sync.
//!
//! The sync engine never talks to a database or a network directly. It is
//! handed two narrow capabilities:
//!
//! - [`LocalStore`]: the on-device store (fetch by uuid or tag, update,
//!   enumerate pending revisions)
//! - [`RemoteStore`]: the cloud copy (query, create, update, tombstone)
//!
//! Every operation resolves to a definitive success or [`StoreError`].
//! The [`memory`] module provides in-process implementations of both.

mod error;
mod filter;
mod local;
pub mod memory;
mod remote;

pub use error::{StoreError, StoreResult};
pub use filter::RecordFilter;
pub use local::LocalStore;
pub use remote::RemoteStore;
