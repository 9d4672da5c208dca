//! # Revision Priority
//!
//! The default-revision oracle contract and the rule deciding when a contender
//! may unseat a live leaseholder.
//!
//! Leadership converges on whatever revision the oracle names as default:
//! a contender running the default revision may take over from a holder that
//! does not. Equal-priority contenders never unseat each other, and a holder
//! running the default revision is never preempted.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Callback invoked with the new default revision.
pub type DefaultHandler = Box<dyn Fn(&str) + Send + Sync>;

type SharedHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Decides whether the caller may preempt a live holder running the given revision.
pub type PreemptionCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Source of the operator-designated default revision.
pub trait RevisionOracle: Send + Sync {
    /// Current default revision. Called at every preemption decision.
    fn get_default(&self) -> String;

    /// Register a callback for default revision changes.
    ///
    /// Elections poll [`get_default`](RevisionOracle::get_default) and do not
    /// rely on these notifications.
    fn add_handler(&self, handler: DefaultHandler);
}

/// Returns `true` if a contender may forcibly take the lease from its holder.
///
/// # Examples
///
/// ```rust
/// use revelect_core::allow_preemption;
///
/// // The default revision takes over from a non-default one
/// assert!(allow_preemption("red", "green", "red"));
/// // but never from another default-revision holder
/// assert!(!allow_preemption("red", "red", "red"));
/// // and a non-default contender never preempts
/// assert!(!allow_preemption("green", "blue", "red"));
/// ```
pub fn allow_preemption(contender: &str, holder: &str, default: &str) -> bool {
    contender == default && holder != default
}

/// Builds the preemption check for a contender running `revision`.
///
/// The oracle is consulted on every call, so a change of default takes effect
/// at the next acquisition attempt.
pub fn prioritized_check(
    revision: impl Into<String>,
    oracle: Arc<dyn RevisionOracle>,
) -> PreemptionCheck {
    let revision = revision.into();
    Arc::new(move |holder_revision: &str| {
        allow_preemption(&revision, holder_revision, &oracle.get_default())
    })
}

/// Oracle with a fixed default revision.
#[derive(Debug, Clone, Default)]
pub struct StaticDefaultRevision {
    revision: String,
}

impl StaticDefaultRevision {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
        }
    }
}

impl RevisionOracle for StaticDefaultRevision {
    fn get_default(&self) -> String {
        self.revision.clone()
    }

    fn add_handler(&self, _handler: DefaultHandler) {}
}

/// Oracle whose default revision can be changed at runtime.
///
/// Changes are pushed to registered handlers and to [`subscribe`](Self::subscribe)
/// receivers. Setting the value it already holds notifies nobody.
///
/// # Examples
///
/// ```rust
/// use revelect_core::{DefaultRevisionWatcher, RevisionOracle};
///
/// let watcher = DefaultRevisionWatcher::new("green");
/// assert_eq!(watcher.get_default(), "green");
///
/// assert!(watcher.set_default("red"));
/// assert!(!watcher.set_default("red"));
/// assert_eq!(watcher.get_default(), "red");
/// ```
pub struct DefaultRevisionWatcher {
    tx: watch::Sender<String>,
    handlers: RwLock<Vec<SharedHandler>>,
}

impl DefaultRevisionWatcher {
    pub fn new(initial: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(initial.into());
        Self {
            tx,
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Changes the default revision, returning `true` if it differed.
    pub fn set_default(&self, revision: impl Into<String>) -> bool {
        let revision = revision.into();
        let changed = self.tx.send_if_modified(|current| {
            if *current == revision {
                false
            } else {
                *current = revision.clone();
                true
            }
        });

        if changed {
            debug!("Default revision changed to '{}'", revision);
            // Handlers run without the lock held so they may register more handlers
            let handlers = self.handlers.read().clone();
            for handler in handlers {
                handler(&revision);
            }
        }

        changed
    }

    /// Receiver that observes every default revision change.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for DefaultRevisionWatcher {
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Debug for DefaultRevisionWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultRevisionWatcher")
            .field("default", &*self.tx.borrow())
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

impl RevisionOracle for DefaultRevisionWatcher {
    fn get_default(&self) -> String {
        self.tx.borrow().clone()
    }

    fn add_handler(&self, handler: DefaultHandler) {
        self.handlers.write().push(Arc::from(handler));
    }
}
