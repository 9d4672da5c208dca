//! # Core Types
//!
//! Identity, lock record and version types shared by every election crate.

use crate::{ElectionError, ElectionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Default lease TTL for an election.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Milliseconds since the Unix epoch.
///
/// Lock records carry wall-clock timestamps so that independent processes
/// can judge expiry of each other's leases.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Static identity of one election participant.
///
/// An identity names the instance (`name`, used as the holder identity in the
/// lock record), the election it takes part in (`namespace` + `election_id`),
/// the software revision it runs and the TTL of the leases it writes. It is
/// fixed for the lifetime of the election that owns it.
///
/// # Examples
///
/// ```rust
/// use revelect_core::ElectionIdentity;
/// use std::time::Duration;
///
/// let identity = ElectionIdentity::new("istio-system", "pod-1", "ingress-controller")
///     .with_revision("canary")
///     .with_ttl(Duration::from_secs(10));
/// assert!(identity.validate().is_ok());
/// assert_eq!(identity.revision, "canary");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionIdentity {
    /// Namespace the lock record lives in
    pub namespace: String,
    /// Instance name, written as the holder identity
    pub name: String,
    /// Election key identifying the lock record
    pub election_id: String,
    /// Revision this instance runs; empty means unversioned
    pub revision: String,
    /// Lease duration written into every record this instance holds
    pub ttl: Duration,
}

impl ElectionIdentity {
    /// Creates an unversioned identity with the default TTL.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        election_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            election_id: election_id.into(),
            revision: String::new(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Creates an identity whose instance name is a random UUID.
    pub fn anonymous(namespace: impl Into<String>, election_id: impl Into<String>) -> Self {
        Self::new(
            namespace,
            format!("instance-{}", Uuid::new_v4()),
            election_id,
        )
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Lock key for an election where each revision elects its own leader.
    ///
    /// Unversioned identities share the plain election key.
    pub fn per_revision_key(&self) -> String {
        if self.revision.is_empty() {
            self.election_id.clone()
        } else {
            format!("{}-{}", self.election_id, self.revision)
        }
    }

    /// Validates the identity.
    pub fn validate(&self) -> ElectionResult<()> {
        if self.namespace.is_empty() {
            return Err(ElectionError::invalid_config("namespace cannot be empty"));
        }
        if self.name.is_empty() {
            return Err(ElectionError::invalid_config(
                "instance name cannot be empty",
            ));
        }
        if self.election_id.is_empty() {
            return Err(ElectionError::invalid_config("election id cannot be empty"));
        }
        if self.ttl.is_zero() {
            return Err(ElectionError::invalid_config(
                "ttl must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ElectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.revision.is_empty() {
            write!(f, "{}/{}@{}", self.namespace, self.election_id, self.name)
        } else {
            write!(
                f,
                "{}/{}@{} (revision {})",
                self.namespace, self.election_id, self.name, self.revision
            )
        }
    }
}

/// Optimistic concurrency token assigned by the lock store.
///
/// Every successful create or update yields a new, larger token. An update
/// only succeeds when it presents the token of the record it read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub u64);

impl VersionToken {
    pub fn new(version: u64) -> Self {
        Self(version)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The shared leadership record stored under an election key.
///
/// The election reads and writes the holder identity, holder revision,
/// renew time and lease duration. `acquire_time` and `leader_transitions`
/// are bookkeeping that is carried forward on renewal and bumped on takeover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub holder_identity: String,
    pub holder_revision: String,
    pub lease_duration_ms: u64,
    pub acquire_time_ms: u64,
    pub renew_time_ms: u64,
    pub leader_transitions: u32,
}

impl LockRecord {
    /// Creates a freshly acquired record stamped with `now_ms`.
    pub fn new(
        holder_identity: impl Into<String>,
        holder_revision: impl Into<String>,
        lease_duration: Duration,
        now_ms: u64,
    ) -> Self {
        Self {
            holder_identity: holder_identity.into(),
            holder_revision: holder_revision.into(),
            lease_duration_ms: lease_duration.as_millis() as u64,
            acquire_time_ms: now_ms,
            renew_time_ms: now_ms,
            leader_transitions: 0,
        }
    }

    /// Instant (in epoch milliseconds) after which the lease is abandoned.
    pub fn expires_at_ms(&self) -> u64 {
        self.renew_time_ms.saturating_add(self.lease_duration_ms)
    }

    /// Returns `true` once the holder stopped renewing for a full lease.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms()
    }

    /// Returns `true` if nobody holds the record.
    pub fn is_released(&self) -> bool {
        self.holder_identity.is_empty()
    }

    pub fn is_held_by(&self, identity: &str) -> bool {
        self.holder_identity == identity
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    /// Serialize the record for storage.
    pub fn to_bytes(&self) -> ElectionResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(ElectionError::from)
    }

    /// Deserialize a stored record.
    pub fn from_bytes(data: &[u8]) -> ElectionResult<Self> {
        serde_json::from_slice(data).map_err(ElectionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_defaults() {
        let identity = ElectionIdentity::new("ns", "pod1", "test-lock");
        assert_eq!(identity.revision, "");
        assert_eq!(identity.ttl, DEFAULT_TTL);
        assert!(identity.validate().is_ok());
        assert_eq!(identity.to_string(), "ns/test-lock@pod1");
    }

    #[test]
    fn test_identity_validation() {
        let blanks = [("", "pod1", "id"), ("ns", "", "id"), ("ns", "pod1", "")];
        for (namespace, name, election_id) in blanks {
            let identity = ElectionIdentity::new(namespace, name, election_id);
            assert!(identity.validate().is_err(), "{}", identity);
        }

        let zero_ttl = ElectionIdentity::new("ns", "pod1", "lock").with_ttl(Duration::ZERO);
        assert!(matches!(
            zero_ttl.validate(),
            Err(ElectionError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_anonymous_identities_are_unique() {
        let a = ElectionIdentity::anonymous("ns", "lock");
        let b = ElectionIdentity::anonymous("ns", "lock");
        assert_ne!(a.name, b.name);
        assert!(a.name.starts_with("instance-"));
    }

    #[test]
    fn test_per_revision_key() {
        let plain = ElectionIdentity::new("ns", "pod1", "lock");
        assert_eq!(plain.per_revision_key(), "lock");

        let versioned = plain.with_revision("canary");
        assert_eq!(versioned.per_revision_key(), "lock-canary");
    }

    #[test]
    fn test_record_expiry() {
        let record = LockRecord::new("pod1", "red", Duration::from_secs(1), 10_000);
        assert_eq!(record.expires_at_ms(), 11_000);
        assert!(!record.is_expired(10_999));
        assert!(record.is_expired(11_000));
        assert!(record.is_held_by("pod1"));
        assert!(!record.is_released());
    }

    #[test]
    fn test_record_bytes_preserve_bookkeeping() {
        let mut record = LockRecord::new("pod1", "", Duration::from_millis(1500), 42);
        record.leader_transitions = 3;

        let decoded = LockRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.lease_duration(), Duration::from_millis(1500));
    }

    #[test]
    fn test_record_from_garbage_fails() {
        let err = LockRecord::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, ElectionError::Serialization(_)));
    }

    #[test]
    fn test_version_token_ordering() {
        let v1 = VersionToken::new(1);
        let v2 = v1.next();
        assert!(v2 > v1);
        assert_eq!(v2.value(), 2);
    }
}
