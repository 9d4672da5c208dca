//! # Error Types
//!
//! Error handling for revision-aware leader election.

use thiserror::Error;

/// Error types that can occur while electing, holding or renewing leadership.
///
/// The variants follow the failure taxonomy of the election: store failures
/// that are worth retrying, store failures that end the current term, lost
/// races that are not failures at all, and configuration mistakes.
///
/// # Error Categories
///
/// - **Transient Errors**: the lock store could not be reached or read
/// - **Permission Errors**: the lock store refused a write
/// - **Race Outcomes**: version conflicts, duplicate creates, records removed
///   underneath an update. The lease coordinator folds these into a lost race
/// - **Term Errors**: leadership was taken over or could not be renewed in time
/// - **Configuration Errors**: invalid identity or timing settings
///
/// # Examples
///
/// ```rust
/// use revelect_core::ElectionError;
///
/// let error = ElectionError::unavailable("connection reset");
/// if error.is_retryable() {
///     println!("This error can be retried");
/// }
/// ```
#[derive(Error, Debug)]
pub enum ElectionError {
    /// The lock store was unreachable or failed to serve a read
    #[error("Lock store unavailable: {message}")]
    Unavailable { message: String },

    /// The lock store denied a write
    #[error("Permission denied on {namespace}/{key}: {message}")]
    PermissionDenied {
        namespace: String,
        key: String,
        message: String,
    },

    /// An update carried a stale version token
    #[error("Version conflict on {namespace}/{key}: expected {expected}, found {actual}")]
    Conflict {
        namespace: String,
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A create found an existing record
    #[error("Lock record {namespace}/{key} already exists")]
    AlreadyExists { namespace: String, key: String },

    /// An update targeted a record that no longer exists
    #[error("Lock record {namespace}/{key} not found")]
    NotFound { namespace: String, key: String },

    /// Another identity now holds the lease
    #[error("Leadership lost to {holder} (revision '{revision}')")]
    LeadershipLost { holder: String, revision: String },

    /// Renewal kept failing until the renew deadline passed
    #[error("Failed to renew lease within {deadline_ms}ms")]
    RenewDeadlineExceeded { deadline_ms: u64 },

    /// Identity or timing configuration is invalid
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// `run` was entered while a previous call is still active
    #[error("Election {key} is already running")]
    AlreadyRunning { key: String },

    /// JSON serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used across the election crates.
///
/// # Examples
///
/// ```rust
/// use revelect_core::ElectionResult;
///
/// fn check() -> ElectionResult<bool> {
///     Ok(true)
/// }
/// ```
pub type ElectionResult<T> = std::result::Result<T, ElectionError>;

impl ElectionError {
    /// Creates a new transient store error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use revelect_core::ElectionError;
    ///
    /// let error = ElectionError::unavailable("read timed out");
    /// assert!(error.is_retryable());
    /// ```
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new permission error for a lock record.
    pub fn permission_denied(
        namespace: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::PermissionDenied {
            namespace: namespace.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Determines if this error is worth retrying within the same term.
    ///
    /// Only transient store failures qualify. A permission denial ends the
    /// term and is retried by the next election cycle instead.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use revelect_core::ElectionError;
    ///
    /// assert!(ElectionError::unavailable("timeout").is_retryable());
    /// assert!(!ElectionError::permission_denied("ns", "lock", "forbidden").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns `true` when the error only means another writer got there first.
    ///
    /// Conflicting versions, duplicate creates and records deleted between a
    /// read and an update all resolve by polling the record again.
    pub fn is_lost_race(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::AlreadyExists { .. } | Self::NotFound { .. }
        )
    }
}
