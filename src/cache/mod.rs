//! Local mirror of the FishFish registry
//!
//! The store holds both record families in memory. Three background tasks keep
//! it current: the credential refresher renews the session token, the full
//! sync periodically replaces each family wholesale, and the stream consumer
//! applies change events as they arrive. [`SyncCoordinator`] owns their
//! lifecycle and serves reads.

pub mod consumer;
pub mod coordinator;
pub mod credential;
pub mod full_sync;
pub mod store;

pub use consumer::EventConsumer;
pub use coordinator::SyncCoordinator;
pub use credential::{CredentialRefresher, CredentialStore};
pub use full_sync::{FullSync, SyncReport};
pub use store::{ApplyOutcome, RecordCache, RecordStore};
