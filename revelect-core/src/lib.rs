//! # Revelect Core - Revision-Aware Leader Election
//!
//! Core building blocks for electing a single leader among replicas that may be
//! running different software revisions during a rollout.
//!
//! ## Components
//!
//! - **ElectionIdentity**: static identity of one participant (namespace,
//!   instance name, election key, revision, lease TTL)
//! - **LockRecord / VersionToken**: the shared leadership record and the
//!   optimistic concurrency token that guards it
//! - **LockStore Trait**: versioned create/read/update of lock records
//! - **RevisionOracle Trait**: source of the operator-designated default revision
//! - **Priority Rule**: [`allow_preemption`], deciding when a default-revision
//!   contender may unseat a live holder
//! - **Stop Signals**: closable signals used for shutdown and per-term cancellation
//! - **Error Handling**: [`ElectionError`] with retry classification
//!
//! ## Priority Rule
//!
//! ```rust
//! use revelect_core::{allow_preemption, prioritized_check, DefaultRevisionWatcher};
//! use std::sync::Arc;
//!
//! let oracle = Arc::new(DefaultRevisionWatcher::new("red"));
//! let check = prioritized_check("red", oracle.clone());
//!
//! // A "red" contender may take over from a "green" holder
//! assert!(check("green"));
//!
//! // After a rollback to "green", the same contender yields
//! oracle.set_default("green");
//! assert!(!check("green"));
//! assert!(!allow_preemption("red", "green", "green"));
//! ```

pub mod error;
pub mod revision;
pub mod signal;
pub mod store;
pub mod types;

pub use error::*;
pub use revision::{
    allow_preemption, prioritized_check, DefaultHandler, DefaultRevisionWatcher, PreemptionCheck,
    RevisionOracle, StaticDefaultRevision,
};
pub use signal::{stop_channel, StopHandle, StopSignal};
pub use store::LockStore;
pub use types::*;
