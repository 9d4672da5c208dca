use crate::{ElectionResult, LockRecord, VersionToken};
use async_trait::async_trait;

/// Versioned storage for election lock records.
///
/// Each `(namespace, key)` pair holds at most one [`LockRecord`]. Writes are
/// guarded by optimistic concurrency: `create` fails if a record exists and
/// `update` fails unless the caller presents the current [`VersionToken`].
/// The store is the only thing contenders share, so it alone enforces mutual
/// exclusion between processes.
///
/// The election never deletes records. A record that disappears between a read
/// and an update surfaces as `NotFound` and is simply recreated on the next
/// attempt.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Read the current record and its version.
    ///
    /// # Returns
    /// * `Ok(Some((record, version)))` if the record exists
    /// * `Ok(None)` if no record exists for the key
    /// * `Err(ElectionError::Unavailable)` if the store could not be read
    async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> ElectionResult<Option<(LockRecord, VersionToken)>>;

    /// Create the record if it does not exist yet.
    ///
    /// # Returns
    /// * `Ok(version)` with the version of the new record
    /// * `Err(ElectionError::AlreadyExists)` if another writer created it first
    /// * `Err(ElectionError::PermissionDenied)` if writes are refused
    async fn create(
        &self,
        namespace: &str,
        key: &str,
        record: &LockRecord,
    ) -> ElectionResult<VersionToken>;

    /// Replace the record, provided it is still at `version`.
    ///
    /// # Returns
    /// * `Ok(version)` with the version of the replaced record
    /// * `Err(ElectionError::Conflict)` if the record moved past `version`
    /// * `Err(ElectionError::NotFound)` if the record was removed
    /// * `Err(ElectionError::PermissionDenied)` if writes are refused
    async fn update(
        &self,
        namespace: &str,
        key: &str,
        record: &LockRecord,
        version: VersionToken,
    ) -> ElectionResult<VersionToken>;
}
