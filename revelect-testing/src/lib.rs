//! Test harness for revision-aware leader election.
//!
//! An [`ElectionHarness`] owns one in-memory lock store and one default
//! revision watcher. Every [`Contender`] it spawns runs a real
//! [`LeaderElection`](revelect_leader::LeaderElection) against them, with a
//! run function that reports each start and cancellation.

pub mod harness;

pub use harness::{
    eventually, Contender, ElectionHarness, LeaderGauge, FOLLOWER_WAIT, LEADER_WAIT, TEST_TTL,
};

/// Install a WARN-level fmt subscriber once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}
