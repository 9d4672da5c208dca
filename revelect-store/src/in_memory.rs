use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use revelect_core::{ElectionError, ElectionResult, LockRecord, LockStore, VersionToken};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Operation counters for an [`InMemoryLockStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub creates: u64,
    pub updates: u64,
    pub lost_races: u64,
    pub denied_writes: u64,
    pub failed_reads: u64,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    data: Vec<u8>,
    version: VersionToken,
}

type Slot = (String, String);

fn slot(namespace: &str, key: &str) -> Slot {
    (namespace.to_string(), key.to_string())
}

/// In-memory lock store shared by every contender holding a clone.
///
/// Records are kept serialized, and every write bumps a store-wide version
/// counter, so stale updates are rejected just as a remote store would reject
/// them. The store also offers fault injection for exercising failure paths:
/// refusing writes, failing reads, and deleting records behind the holder's back.
///
/// # Examples
///
/// ```rust
/// use revelect_core::{LockRecord, LockStore};
/// use revelect_store::InMemoryLockStore;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryLockStore::new();
/// let record = LockRecord::new("pod1", "", Duration::from_secs(1), 0);
///
/// let version = store.create("ns", "lock", &record).await.unwrap();
/// assert!(store.create("ns", "lock", &record).await.is_err());
///
/// let (stored, current) = store.get("ns", "lock").await.unwrap().unwrap();
/// assert_eq!(stored, record);
/// assert_eq!(current, version);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    records: Arc<DashMap<Slot, StoredRecord>>,
    version: Arc<AtomicU64>,
    deny_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    stats: Arc<RwLock<StoreStats>>,
}

impl InMemoryLockStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (or allow again) every create and update.
    pub fn set_deny_writes(&self, deny: bool) {
        debug!("Lock store write denial set to {}", deny);
        self.deny_writes.store(deny, Ordering::SeqCst);
    }

    /// Fail (or serve again) every read with a transient error.
    pub fn set_fail_reads(&self, fail: bool) {
        debug!("Lock store read failure set to {}", fail);
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Remove a record out of band, returning whether it existed.
    pub fn delete(&self, namespace: &str, key: &str) -> bool {
        let removed = self.records.remove(&slot(namespace, key)).is_some();
        debug!(
            "Deleted lock record {}/{}: existed={}",
            namespace, key, removed
        );
        removed
    }

    /// Write a record unconditionally, bypassing version checks and fault injection.
    pub fn seed(
        &self,
        namespace: &str,
        key: &str,
        record: &LockRecord,
    ) -> ElectionResult<VersionToken> {
        let data = record.to_bytes()?;
        let version = self.next_version();
        self.records
            .insert(slot(namespace, key), StoredRecord { data, version });
        Ok(version)
    }

    /// Peek at a record without counting a read or honouring fault injection.
    pub fn peek(&self, namespace: &str, key: &str) -> Option<LockRecord> {
        self.records
            .get(&slot(namespace, key))
            .and_then(|stored| LockRecord::from_bytes(&stored.data).ok())
    }

    /// Keys of all records in a namespace, sorted.
    pub fn keys(&self, namespace: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.read().clone()
    }

    fn next_version(&self) -> VersionToken {
        VersionToken::new(self.version.fetch_add(1, Ordering::AcqRel) + 1)
    }

    fn check_writable(&self, namespace: &str, key: &str) -> ElectionResult<()> {
        if self.deny_writes.load(Ordering::SeqCst) {
            self.stats.write().denied_writes += 1;
            return Err(ElectionError::permission_denied(
                namespace,
                key,
                "writes to lock records are forbidden",
            ));
        }
        Ok(())
    }

    fn lost_race(&self, error: ElectionError) -> ElectionError {
        self.stats.write().lost_races += 1;
        error
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> ElectionResult<Option<(LockRecord, VersionToken)>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            self.stats.write().failed_reads += 1;
            return Err(ElectionError::unavailable(format!(
                "failed to read lock record {}/{}",
                namespace, key
            )));
        }
        self.stats.write().reads += 1;

        let stored = self
            .records
            .get(&slot(namespace, key))
            .map(|entry| entry.value().clone());

        match stored {
            Some(stored) => {
                let record = LockRecord::from_bytes(&stored.data)?;
                Ok(Some((record, stored.version)))
            }
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        namespace: &str,
        key: &str,
        record: &LockRecord,
    ) -> ElectionResult<VersionToken> {
        self.check_writable(namespace, key)?;
        let data = record.to_bytes()?;

        match self.records.entry(slot(namespace, key)) {
            Entry::Occupied(_) => Err(self.lost_race(ElectionError::AlreadyExists {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })),
            Entry::Vacant(vacant) => {
                let version = self.next_version();
                vacant.insert(StoredRecord { data, version });
                self.stats.write().creates += 1;
                debug!(
                    "Created lock record {}/{} for {} at version {}",
                    namespace, key, record.holder_identity, version
                );
                Ok(version)
            }
        }
    }

    async fn update(
        &self,
        namespace: &str,
        key: &str,
        record: &LockRecord,
        version: VersionToken,
    ) -> ElectionResult<VersionToken> {
        self.check_writable(namespace, key)?;
        let data = record.to_bytes()?;

        let Some(mut stored) = self.records.get_mut(&slot(namespace, key)) else {
            return Err(self.lost_race(ElectionError::NotFound {
                namespace: namespace.to_string(),
                key: key.to_string(),
            }));
        };

        if stored.version != version {
            let actual = stored.version.value();
            drop(stored);
            return Err(self.lost_race(ElectionError::Conflict {
                namespace: namespace.to_string(),
                key: key.to_string(),
                expected: version.value(),
                actual,
            }));
        }

        let next = self.next_version();
        stored.data = data;
        stored.version = next;
        drop(stored);

        self.stats.write().updates += 1;
        Ok(next)
    }
}
