//! Lease acquisition and renewal over a [`LockStore`].
//!
//! A [`LeaseCoordinator`] drives one attempt sequence: it polls the shared
//! record until it can write itself in as holder, reports the start of the
//! term, renews until it is stopped or fails, and reports the end of the term.
//! It never retries a lost term itself. Restarting is left to the caller.

use crate::LeaseTimings;
use async_trait::async_trait;
use rand::Rng;
use revelect_core::{
    now_millis, stop_channel, ElectionError, ElectionResult, LockRecord, LockStore, PreemptionCheck,
    StopSignal, VersionToken,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Callbacks invoked at the boundaries of a leadership term.
#[async_trait]
pub trait LeadershipHandler: Send + Sync {
    /// Called once when the lease is acquired.
    ///
    /// `term` closes when the term ends. Implementations should start their
    /// work and return promptly.
    async fn started_leading(&self, term: StopSignal);

    /// Called once when the term ends, after `term` has been closed.
    ///
    /// The coordinator returns only after this completes.
    async fn stopped_leading(&self);
}

/// Result of a single acquire-or-renew attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The record now names this identity as holder.
    ///
    /// `preempted` is set when the write replaced a live lease of another holder.
    Acquired {
        version: VersionToken,
        preempted: bool,
    },
    /// A live holder that may not be preempted owns the record
    Held(LockRecord),
    /// Another writer changed the record between our read and write
    LostRace,
}

/// Everything a [`LeaseCoordinator`] needs to contend for one lock record.
#[derive(Clone)]
pub struct LeaseConfig {
    pub store: Arc<dyn LockStore>,
    pub namespace: String,
    pub key: String,
    /// Holder identity written into the record
    pub identity: String,
    /// Holder revision written into the record
    pub revision: String,
    pub timings: LeaseTimings,
    /// Random extra fraction of the retry period between acquisition attempts
    pub jitter_factor: f64,
    /// Consulted when a live record belongs to someone else
    pub preemption: Option<PreemptionCheck>,
}

impl LeaseConfig {
    pub fn new(
        store: Arc<dyn LockStore>,
        namespace: impl Into<String>,
        key: impl Into<String>,
        identity: impl Into<String>,
        timings: LeaseTimings,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            key: key.into(),
            identity: identity.into(),
            revision: String::new(),
            timings,
            jitter_factor: 0.0,
            preemption: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    pub fn with_preemption(mut self, preemption: PreemptionCheck) -> Self {
        self.preemption = Some(preemption);
        self
    }

    pub fn validate(&self) -> ElectionResult<()> {
        if self.identity.is_empty() {
            return Err(ElectionError::invalid_config(
                "lease identity cannot be empty",
            ));
        }
        if self.key.is_empty() {
            return Err(ElectionError::invalid_config("lease key cannot be empty"));
        }
        if !self.jitter_factor.is_finite() || self.jitter_factor < 0.0 {
            return Err(ElectionError::invalid_config(
                "jitter_factor must be a non-negative number",
            ));
        }
        self.timings.validate()
    }
}

impl fmt::Debug for LeaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseConfig")
            .field("namespace", &self.namespace)
            .field("key", &self.key)
            .field("identity", &self.identity)
            .field("revision", &self.revision)
            .field("timings", &self.timings)
            .field("jitter_factor", &self.jitter_factor)
            .field("preemption", &self.preemption.is_some())
            .finish()
    }
}

/// Acquires, renews and loses one lease term.
pub struct LeaseCoordinator {
    config: LeaseConfig,
    handler: Arc<dyn LeadershipHandler>,
    leading: AtomicBool,
}

impl LeaseCoordinator {
    pub fn new(config: LeaseConfig, handler: Arc<dyn LeadershipHandler>) -> ElectionResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            handler,
            leading: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Check if this coordinator currently holds the lease
    pub fn is_leader(&self) -> bool {
        self.leading.load(Ordering::SeqCst)
    }

    /// Contend for the lease until `stop` closes or a held term fails.
    ///
    /// Returns `Ok(())` when stopped, whether or not the lease was held.
    /// Returns the error that ended the term otherwise. In both cases
    /// [`LeadershipHandler::stopped_leading`] has completed if the term started.
    ///
    /// After preempting a live holder the lease is renewed for
    /// `retry_period + renew_deadline` before the term starts. By then the
    /// previous holder has either seen the takeover at a renewal or given up
    /// on its renew deadline.
    pub async fn run(&self, stop: StopSignal) -> ElectionResult<()> {
        let Some(preempted) = self.acquire(&stop).await else {
            debug!(
                "Stopped before acquiring {}/{}",
                self.config.namespace, self.config.key
            );
            return Ok(());
        };

        if preempted && !self.hold_off(&stop).await? {
            return Ok(());
        }

        let (term_handle, term) = stop_channel();
        self.leading.store(true, Ordering::SeqCst);
        self.handler.started_leading(term).await;

        let result = self.renew(&stop, None).await.map(|_| ());

        self.leading.store(false, Ordering::SeqCst);
        term_handle.stop();
        self.handler.stopped_leading().await;

        if let Err(e) = &result {
            warn!(
                "Lost lease {}/{} held by {}: {}",
                self.config.namespace, self.config.key, self.config.identity, e
            );
        }
        result
    }

    /// Keep a freshly preempted lease renewed until the previous holder has
    /// ended its term. Returns `Ok(false)` if stopped first.
    async fn hold_off(&self, stop: &StopSignal) -> ElectionResult<bool> {
        let timings = self.config.timings;
        let wait = timings.retry_period + timings.renew_deadline;
        info!(
            "{} holding {}/{} for {:?} before leading",
            self.config.identity, self.config.namespace, self.config.key, wait
        );

        let result = self.renew(stop, Some(Instant::now() + wait)).await;
        if let Err(e) = &result {
            warn!(
                "Lost lease {}/{} before {} started leading: {}",
                self.config.namespace, self.config.key, self.config.identity, e
            );
        }
        result
    }

    /// Read the record once and try to make this identity its holder.
    pub async fn try_acquire_or_renew(&self) -> ElectionResult<AttemptOutcome> {
        let config = &self.config;
        let now = now_millis();
        let mut desired = LockRecord::new(
            &config.identity,
            &config.revision,
            config.timings.lease_duration,
            now,
        );

        let Some((existing, version)) = config.store.get(&config.namespace, &config.key).await?
        else {
            let created = config
                .store
                .create(&config.namespace, &config.key, &desired)
                .await;
            return Self::outcome(created, false);
        };

        let mut preempted = false;
        if existing.is_held_by(&config.identity) {
            desired.acquire_time_ms = existing.acquire_time_ms;
            desired.leader_transitions = existing.leader_transitions;
        } else {
            let live = !existing.is_released() && !existing.is_expired(now);
            if live {
                if !self.may_preempt(&existing) {
                    return Ok(AttemptOutcome::Held(existing));
                }
                info!(
                    "{} (revision '{}') preempting {} (revision '{}') on {}/{}",
                    config.identity,
                    config.revision,
                    existing.holder_identity,
                    existing.holder_revision,
                    config.namespace,
                    config.key
                );
                preempted = true;
            }
            desired.leader_transitions = existing.leader_transitions.saturating_add(1);
        }

        let updated = config
            .store
            .update(&config.namespace, &config.key, &desired, version)
            .await;
        Self::outcome(updated, preempted)
    }

    fn outcome(
        result: ElectionResult<VersionToken>,
        preempted: bool,
    ) -> ElectionResult<AttemptOutcome> {
        match result {
            Ok(version) => Ok(AttemptOutcome::Acquired { version, preempted }),
            Err(e) if e.is_lost_race() => Ok(AttemptOutcome::LostRace),
            Err(e) => Err(e),
        }
    }

    fn may_preempt(&self, existing: &LockRecord) -> bool {
        self.config
            .preemption
            .as_ref()
            .is_some_and(|check| check(&existing.holder_revision))
    }

    /// Poll until the lease is acquired.
    ///
    /// Returns whether a live holder was preempted, or `None` if stopped first.
    async fn acquire(&self, stop: &StopSignal) -> Option<bool> {
        let config = &self.config;
        debug!(
            "{} attempting to acquire {}/{}",
            config.identity, config.namespace, config.key
        );

        loop {
            if stop.is_stopped() {
                return None;
            }

            let attempt = tokio::select! {
                biased;
                _ = stop.stopped() => return None,
                attempt = self.try_acquire_or_renew() => attempt,
            };

            match attempt {
                Ok(AttemptOutcome::Acquired { version, preempted }) => {
                    info!(
                        "{} acquired {}/{} at version {}",
                        config.identity, config.namespace, config.key, version
                    );
                    return Some(preempted);
                }
                Ok(AttemptOutcome::Held(record)) => {
                    debug!(
                        "{}/{} is held by {} (revision '{}')",
                        config.namespace,
                        config.key,
                        record.holder_identity,
                        record.holder_revision
                    );
                }
                Ok(AttemptOutcome::LostRace) => {
                    debug!(
                        "{} lost the race for {}/{}",
                        config.identity, config.namespace, config.key
                    );
                }
                Err(e) => {
                    warn!(
                        "{} failed to acquire {}/{}: {}",
                        config.identity, config.namespace, config.key, e
                    );
                }
            }

            tokio::select! {
                biased;
                _ = stop.stopped() => return None,
                _ = sleep(self.jittered_retry_period()) => {}
            }
        }
    }

    /// Renew every retry period until the term is lost (`Err`).
    ///
    /// Returns `Ok(false)` when stopped and `Ok(true)` after the first
    /// successful renewal at or past `until`.
    async fn renew(&self, stop: &StopSignal, until: Option<Instant>) -> ElectionResult<bool> {
        let timings = self.config.timings;

        loop {
            let pause = match until {
                Some(until) => {
                    let left = until.saturating_duration_since(Instant::now());
                    left.min(timings.retry_period)
                }
                None => timings.retry_period,
            };
            tokio::select! {
                biased;
                _ = stop.stopped() => return Ok(false),
                _ = sleep(pause) => {}
            }

            let deadline = Instant::now() + timings.renew_deadline;
            loop {
                let attempt = tokio::select! {
                    biased;
                    _ = stop.stopped() => return Ok(false),
                    attempt = self.try_acquire_or_renew() => attempt,
                };

                match attempt {
                    Ok(AttemptOutcome::Acquired { .. }) => break,
                    Ok(AttemptOutcome::Held(record)) => {
                        return Err(ElectionError::LeadershipLost {
                            holder: record.holder_identity,
                            revision: record.holder_revision,
                        });
                    }
                    Ok(AttemptOutcome::LostRace) => {
                        debug!(
                            "Renewal of {} raced another writer, retrying",
                            self.config.key
                        );
                    }
                    Err(e) if e.is_retryable() => {
                        debug!("Renewal of {} failed, retrying: {}", self.config.key, e);
                    }
                    Err(e) => return Err(e),
                }

                let now = Instant::now();
                if now >= deadline {
                    return Err(ElectionError::RenewDeadlineExceeded {
                        deadline_ms: timings.renew_deadline.as_millis() as u64,
                    });
                }
                tokio::select! {
                    biased;
                    _ = stop.stopped() => return Ok(false),
                    _ = sleep((deadline - now).min(timings.retry_period)) => {}
                }
            }

            if until.is_some_and(|until| Instant::now() >= until) {
                return Ok(true);
            }
        }
    }

    fn jittered_retry_period(&self) -> Duration {
        let base = self.config.timings.retry_period;
        if self.config.jitter_factor <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.0..self.config.jitter_factor);
        base + base.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use revelect_store::InMemoryLockStore;
    use std::sync::atomic::AtomicUsize;

    const NS: &str = "ns";
    const KEY: &str = "test-lock";

    #[derive(Default)]
    struct RecordingHandler {
        started: AtomicUsize,
        stopped: AtomicUsize,
        term: Mutex<Option<StopSignal>>,
    }

    #[async_trait]
    impl LeadershipHandler for RecordingHandler {
        async fn started_leading(&self, term: StopSignal) {
            self.started.fetch_add(1, Ordering::SeqCst);
            *self.term.lock() = Some(term);
        }

        async fn stopped_leading(&self) {
            // The term must already be closed when this runs
            let closed = self.term.lock().as_ref().map(|t| t.is_stopped());
            assert_eq!(closed, Some(true));
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn timings() -> LeaseTimings {
        LeaseTimings::from_ttl(Duration::from_millis(400))
    }

    fn coordinator(
        store: &InMemoryLockStore,
        identity: &str,
        revision: &str,
        handler: Arc<RecordingHandler>,
    ) -> LeaseCoordinator {
        let config = LeaseConfig::new(Arc::new(store.clone()), NS, KEY, identity, timings())
            .with_revision(revision);
        LeaseCoordinator::new(config, handler).unwrap()
    }

    fn holder(store: &InMemoryLockStore) -> Option<String> {
        store.peek(NS, KEY).map(|record| record.holder_identity)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_acquires_absent_record() {
        let store = InMemoryLockStore::new();
        let coordinator = coordinator(&store, "pod1", "red", Arc::default());

        let outcome = coordinator.try_acquire_or_renew().await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Acquired { .. }));

        let record = store.peek(NS, KEY).unwrap();
        assert_eq!(record.holder_identity, "pod1");
        assert_eq!(record.holder_revision, "red");
        assert_eq!(record.lease_duration(), Duration::from_millis(400));
        assert_eq!(record.leader_transitions, 0);
    }

    #[tokio::test]
    async fn test_live_holder_blocks_without_preemption() {
        let store = InMemoryLockStore::new();
        let holder = LockRecord::new("pod1", "green", Duration::from_secs(60), now_millis());
        store.seed(NS, KEY, &holder).unwrap();

        let coordinator = coordinator(&store, "pod2", "red", Arc::default());
        let outcome = coordinator.try_acquire_or_renew().await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Held(holder));
    }

    #[tokio::test]
    async fn test_preemption_check_allows_takeover() {
        let store = InMemoryLockStore::new();
        let holder = LockRecord::new("pod1", "green", Duration::from_secs(60), now_millis());
        store.seed(NS, KEY, &holder).unwrap();

        let config = LeaseConfig::new(Arc::new(store.clone()), NS, KEY, "pod2", timings())
            .with_revision("red")
            .with_preemption(Arc::new(|holder_revision: &str| holder_revision == "green"));
        let handler = Arc::new(RecordingHandler::default());
        let coordinator = LeaseCoordinator::new(config, handler).unwrap();

        let outcome = coordinator.try_acquire_or_renew().await.unwrap();
        let AttemptOutcome::Acquired { preempted, .. } = outcome else {
            panic!("unexpected outcome: {:?}", outcome);
        };
        assert!(preempted);

        let record = store.peek(NS, KEY).unwrap();
        assert_eq!(record.holder_identity, "pod2");
        assert_eq!(record.leader_transitions, 1);
    }

    #[tokio::test]
    async fn test_expired_record_is_taken_over() {
        let store = InMemoryLockStore::new();
        let stale = LockRecord::new("pod1", "red", Duration::from_millis(10), 1_000);
        store.seed(NS, KEY, &stale).unwrap();

        let coordinator = coordinator(&store, "pod2", "green", Arc::default());
        let outcome = coordinator.try_acquire_or_renew().await.unwrap();
        let AttemptOutcome::Acquired { preempted, .. } = outcome else {
            panic!("unexpected outcome: {:?}", outcome);
        };
        // An expired lease is free to take
        assert!(!preempted);
        assert_eq!(store.peek(NS, KEY).unwrap().holder_identity, "pod2");
    }

    #[tokio::test]
    async fn test_released_record_is_taken_over() {
        let store = InMemoryLockStore::new();
        let released = LockRecord::new("", "", Duration::from_secs(60), now_millis());
        store.seed(NS, KEY, &released).unwrap();

        let coordinator = coordinator(&store, "pod1", "", Arc::default());
        let outcome = coordinator.try_acquire_or_renew().await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Acquired { .. }));
    }

    #[tokio::test]
    async fn test_self_held_record_keeps_acquire_time() {
        let store = InMemoryLockStore::new();
        let mut own = LockRecord::new("pod1", "", Duration::from_secs(60), 5_000);
        own.leader_transitions = 4;
        store.seed(NS, KEY, &own).unwrap();

        let coordinator = coordinator(&store, "pod1", "", Arc::default());
        coordinator.try_acquire_or_renew().await.unwrap();

        let record = store.peek(NS, KEY).unwrap();
        assert_eq!(record.acquire_time_ms, 5_000);
        assert_eq!(record.leader_transitions, 4);
        assert!(record.renew_time_ms > 5_000);
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces_as_error() {
        let store = InMemoryLockStore::new();
        store.set_deny_writes(true);

        let coordinator = coordinator(&store, "pod1", "", Arc::default());
        let err = coordinator.try_acquire_or_renew().await.unwrap_err();
        assert!(matches!(err, ElectionError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_stop_before_acquiring() {
        let store = InMemoryLockStore::new();
        let holder = LockRecord::new("pod1", "", Duration::from_secs(60), now_millis());
        store.seed(NS, KEY, &holder).unwrap();

        let handler = Arc::new(RecordingHandler::default());
        let coordinator = coordinator(&store, "pod2", "", handler.clone());

        let (stop_handle, stop) = stop_channel();
        let run = tokio::spawn(async move { coordinator.run(stop).await });
        sleep(Duration::from_millis(150)).await;
        stop_handle.stop();

        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(handler.started.load(Ordering::SeqCst), 0);
        assert_eq!(handler.stopped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_while_leading_runs_callbacks() {
        let store = InMemoryLockStore::new();
        let handler = Arc::new(RecordingHandler::default());
        let coordinator = Arc::new(coordinator(&store, "pod1", "", handler.clone()));

        let (stop_handle, stop) = stop_channel();
        let runner = coordinator.clone();
        let run = tokio::spawn(async move { runner.run(stop).await });

        wait_until(|| handler.started.load(Ordering::SeqCst) == 1).await;
        assert!(coordinator.is_leader());

        stop_handle.stop();
        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(handler.stopped.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_leader());

        // The record is left in place for the lease to expire
        assert_eq!(store.peek(NS, KEY).unwrap().holder_identity, "pod1");
    }

    #[tokio::test]
    async fn test_renewal_denied_ends_term() {
        let store = InMemoryLockStore::new();
        let handler = Arc::new(RecordingHandler::default());
        let coordinator = coordinator(&store, "pod1", "", handler.clone());

        let (_stop_handle, stop) = stop_channel();
        let run = tokio::spawn(async move { coordinator.run(stop).await });

        wait_until(|| handler.started.load(Ordering::SeqCst) == 1).await;
        store.set_deny_writes(true);

        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            Err(ElectionError::PermissionDenied { .. })
        ));
        assert_eq!(handler.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preempted_leader_loses_term() {
        let store = InMemoryLockStore::new();
        let handler = Arc::new(RecordingHandler::default());
        let coordinator = coordinator(&store, "pod1", "green", handler.clone());

        let (_stop_handle, stop) = stop_channel();
        let run = tokio::spawn(async move { coordinator.run(stop).await });
        wait_until(|| handler.started.load(Ordering::SeqCst) == 1).await;

        // A default-revision contender writes itself in over the live lease
        let preemptor = LockRecord::new("pod2", "red", Duration::from_secs(60), now_millis());
        store.seed(NS, KEY, &preemptor).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        match result {
            Err(ElectionError::LeadershipLost { holder, revision }) => {
                assert_eq!(holder, "pod2");
                assert_eq!(revision, "red");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    fn preempting_coordinator(
        store: &InMemoryLockStore,
        handler: Arc<RecordingHandler>,
    ) -> Arc<LeaseCoordinator> {
        let holder = LockRecord::new("pod1", "green", Duration::from_secs(60), now_millis());
        store.seed(NS, KEY, &holder).unwrap();

        let config = LeaseConfig::new(Arc::new(store.clone()), NS, KEY, "pod2", timings())
            .with_revision("red")
            .with_preemption(Arc::new(|holder_revision: &str| holder_revision == "green"));
        Arc::new(LeaseCoordinator::new(config, handler).unwrap())
    }

    #[tokio::test]
    async fn test_preemption_delays_term_until_old_holder_is_gone() {
        let store = InMemoryLockStore::new();
        let handler = Arc::new(RecordingHandler::default());
        let coordinator = preempting_coordinator(&store, handler.clone());

        let (stop_handle, stop) = stop_channel();
        let runner = coordinator.clone();
        let began = Instant::now();
        let run = tokio::spawn(async move { runner.run(stop).await });

        wait_until(|| holder(&store).as_deref() == Some("pod2")).await;

        // The record is taken but the old holder may still be inside its term
        sleep(Duration::from_millis(100)).await;
        assert_eq!(handler.started.load(Ordering::SeqCst), 0);
        assert!(!coordinator.is_leader());

        // Renewals continue while the start is held back
        let renewed = store.peek(NS, KEY).unwrap().renew_time_ms;
        wait_until(|| store.peek(NS, KEY).unwrap().renew_time_ms > renewed).await;

        // retry_period (100ms) + renew_deadline (200ms)
        wait_until(|| handler.started.load(Ordering::SeqCst) == 1).await;
        assert!(began.elapsed() >= Duration::from_millis(300));
        assert!(coordinator.is_leader());
        assert_eq!(store.peek(NS, KEY).unwrap().holder_identity, "pod2");

        stop_handle.stop();
        assert!(run.await.unwrap().is_ok());
        assert_eq!(handler.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_while_holding_off_skips_callbacks() {
        let store = InMemoryLockStore::new();
        let handler = Arc::new(RecordingHandler::default());
        let coordinator = preempting_coordinator(&store, handler.clone());

        let (stop_handle, stop) = stop_channel();
        let run = tokio::spawn(async move { coordinator.run(stop).await });

        wait_until(|| holder(&store).as_deref() == Some("pod2")).await;
        stop_handle.stop();

        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(handler.started.load(Ordering::SeqCst), 0);
        assert_eq!(handler.stopped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_reads_exceed_renew_deadline() {
        let store = InMemoryLockStore::new();
        let handler = Arc::new(RecordingHandler::default());
        let coordinator = coordinator(&store, "pod1", "", handler.clone());

        let (_stop_handle, stop) = stop_channel();
        let run = tokio::spawn(async move { coordinator.run(stop).await });
        wait_until(|| handler.started.load(Ordering::SeqCst) == 1).await;

        store.set_fail_reads(true);
        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            Err(ElectionError::RenewDeadlineExceeded { deadline_ms: 200 })
        ));
        assert_eq!(handler.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deleted_record_is_recreated_by_holder() {
        let store = InMemoryLockStore::new();
        let handler = Arc::new(RecordingHandler::default());
        let coordinator = coordinator(&store, "pod1", "", handler.clone());

        let (stop_handle, stop) = stop_channel();
        let run = tokio::spawn(async move { coordinator.run(stop).await });
        wait_until(|| handler.started.load(Ordering::SeqCst) == 1).await;

        assert!(store.delete(NS, KEY));
        wait_until(|| store.peek(NS, KEY).is_some()).await;
        assert_eq!(store.keys(NS), vec![KEY.to_string()]);
        assert_eq!(store.peek(NS, KEY).unwrap().holder_identity, "pod1");

        // Still the same term
        assert_eq!(handler.stopped.load(Ordering::SeqCst), 0);
        stop_handle.stop();
        assert!(run.await.unwrap().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let store: Arc<dyn LockStore> = Arc::new(InMemoryLockStore::new());
        let config = LeaseConfig::new(store.clone(), NS, KEY, "", timings());
        assert!(config.validate().is_err());

        let config = LeaseConfig::new(store.clone(), NS, "", "pod1", timings());
        assert!(config.validate().is_err());

        let config = LeaseConfig::new(store, NS, KEY, "pod1", timings()).with_jitter_factor(-1.0);
        assert!(config.validate().is_err());
    }
}
