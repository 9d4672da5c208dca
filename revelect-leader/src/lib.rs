//! # Revelect Leader
//!
//! Lease coordination and revision-aware leader election.
//!
//! This crate provides:
//! - [`LeaseCoordinator`]: acquires a TTL lease through a [`LockStore`],
//!   renews it, and reports term boundaries to a [`LeadershipHandler`]
//! - [`LeaderElection`]: restarts lease cycles after failures and runs the
//!   registered run functions for as long as each term lasts
//! - [`ElectionEventBus`]: broadcast of election lifecycle events
//!
//! In the default [`ElectionMode::Prioritized`] mode a contender running the
//! default revision takes over from a holder that does not, so leadership
//! follows rollouts and rollbacks.
//!
//! ```rust,no_run
//! use revelect_core::{stop_channel, ElectionIdentity, StaticDefaultRevision, StopSignal};
//! use revelect_leader::LeaderElection;
//! use revelect_store::InMemoryLockStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> revelect_core::ElectionResult<()> {
//! let identity = ElectionIdentity::new("istio-system", "pod-1", "ingress-controller")
//!     .with_revision("canary");
//! let mut election = LeaderElection::new(
//!     identity,
//!     Arc::new(InMemoryLockStore::new()),
//!     Arc::new(StaticDefaultRevision::new("canary")),
//! )?;
//! election.add_run_function(|term: StopSignal| async move {
//!     // singleton work until the term ends
//!     term.stopped().await;
//! });
//!
//! let (stop_handle, stop) = stop_channel();
//! # drop(stop_handle);
//! election.run(stop).await
//! # }
//! ```
//!
//! [`LockStore`]: revelect_core::LockStore

pub mod config;
pub mod election;
pub mod lease;
pub mod notifications;

pub use config::{ElectionConfig, ElectionMode, LeaseTimings};
pub use election::{ElectionStatus, LeaderElection, RunFunction};
pub use lease::{AttemptOutcome, LeadershipHandler, LeaseConfig, LeaseCoordinator};
pub use notifications::{ElectionEvent, ElectionEventBus, EventStats};

#[cfg(test)]
mod tests {
    use super::*;
    use revelect_core::{ElectionIdentity, StaticDefaultRevision};
    use revelect_store::InMemoryLockStore;
    use std::sync::Arc;

    #[test]
    fn test_leader_election_creation() {
        let identity = ElectionIdentity::new("ns", "pod1", "key");
        let election = LeaderElection::new(
            identity,
            Arc::new(InMemoryLockStore::new()),
            Arc::new(StaticDefaultRevision::default()),
        );
        assert!(election.is_ok());
    }
}
