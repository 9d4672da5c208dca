//! # Revelect Store
//!
//! Lock store implementations for revision-aware leader election.
//!
//! The election only talks to storage through the
//! [`LockStore`](revelect_core::LockStore) trait, so production deployments
//! plug in their own backend. This crate provides the in-process store used by
//! tests, demos and single-host deployments.
//!
//! ## Implementations
//!
//! - [`InMemoryLockStore`] - versioned records in memory, with fault injection
//!
//! ## Example
//!
//! ```rust
//! use revelect_core::{LockRecord, LockStore};
//! use revelect_store::InMemoryLockStore;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryLockStore::new();
//! let record = LockRecord::new("pod1", "red", Duration::from_secs(30), 0);
//! let version = store.create("ns", "lock", &record).await.unwrap();
//!
//! // Writers holding a stale version lose the race
//! store.update("ns", "lock", &record, version).await.unwrap();
//! assert!(store.update("ns", "lock", &record, version).await.is_err());
//! # });
//! ```

pub mod in_memory;

pub use in_memory::{InMemoryLockStore, StoreStats};
