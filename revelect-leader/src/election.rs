//! Supervisory election loop with revision priority and run functions.

use crate::{
    ElectionConfig, ElectionEvent, ElectionEventBus, ElectionMode, LeadershipHandler, LeaseConfig,
    LeaseCoordinator, LeaseTimings,
};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use revelect_core::{
    prioritized_check, ElectionError, ElectionIdentity, ElectionResult, LockStore, RevisionOracle,
    StopSignal,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Work executed while holding leadership.
///
/// Receives a signal that closes when the term ends.
pub type RunFunction = Arc<dyn Fn(StopSignal) -> BoxFuture<'static, ()> + Send + Sync>;

/// Point-in-time view of a [`LeaderElection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionStatus {
    pub identity: String,
    pub revision: String,
    pub lock_key: String,
    pub mode: ElectionMode,
    pub cycle: u64,
    pub is_leader: bool,
    pub running: bool,
    pub consecutive_failures: u32,
}

/// Elects one leader per key among instances that may run different revisions.
///
/// Each call to [`run`](Self::run) drives lease cycles until stopped. Whenever
/// this instance holds the lease, every registered run function is started with
/// a term signal, and the term only ends after all of them returned.
pub struct LeaderElection {
    identity: ElectionIdentity,
    config: ElectionConfig,
    store: Arc<dyn LockStore>,
    oracle: Arc<dyn RevisionOracle>,
    run_fns: Vec<RunFunction>,
    cycle: Arc<AtomicU64>,
    leading: Arc<AtomicBool>,
    running: AtomicBool,
    consecutive_failures: AtomicU32,
    events: ElectionEventBus,
}

impl LeaderElection {
    /// Create an election with the default configuration
    pub fn new(
        identity: ElectionIdentity,
        store: Arc<dyn LockStore>,
        oracle: Arc<dyn RevisionOracle>,
    ) -> ElectionResult<Self> {
        Self::with_config(identity, ElectionConfig::default(), store, oracle)
    }

    pub fn with_config(
        identity: ElectionIdentity,
        config: ElectionConfig,
        store: Arc<dyn LockStore>,
        oracle: Arc<dyn RevisionOracle>,
    ) -> ElectionResult<Self> {
        identity.validate()?;
        config.validate()?;
        LeaseTimings::from_ttl(identity.ttl).validate()?;

        let events = ElectionEventBus::new(config.event_capacity);
        Ok(Self {
            identity,
            config,
            store,
            oracle,
            run_fns: Vec::new(),
            cycle: Arc::new(AtomicU64::new(0)),
            leading: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            events,
        })
    }

    /// Register work to run while leading. Functions start in registration order.
    pub fn add_run_function<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(StopSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let run_fn: RunFunction = Arc::new(move |stop: StopSignal| f(stop).boxed());
        self.run_fns.push(run_fn);
        self
    }

    pub fn identity(&self) -> &ElectionIdentity {
        &self.identity
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Key of the lock record this instance contends for
    pub fn lock_key(&self) -> String {
        match self.config.mode {
            ElectionMode::PerRevision => self.identity.per_revision_key(),
            ElectionMode::Prioritized | ElectionMode::Unprioritized => {
                self.identity.election_id.clone()
            }
        }
    }

    /// Number of lease cycles started so far
    pub fn cycle(&self) -> u64 {
        self.cycle.load(Ordering::SeqCst)
    }

    /// Check if this instance currently leads
    pub fn is_leader(&self) -> bool {
        self.leading.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ElectionStatus {
        ElectionStatus {
            identity: self.identity.name.clone(),
            revision: self.identity.revision.clone(),
            lock_key: self.lock_key(),
            mode: self.config.mode,
            cycle: self.cycle(),
            is_leader: self.is_leader(),
            running: self.is_running(),
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ElectionEvent> {
        self.events.subscribe()
    }

    /// Contend for leadership until `stop` closes.
    ///
    /// Failed cycles are restarted after a backoff. When this returns, every
    /// run function of the last term has returned. The lock record is left in
    /// place and expires once renewals stop.
    pub async fn run(&self, stop: StopSignal) -> ElectionResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ElectionError::AlreadyRunning {
                key: self.lock_key(),
            });
        }
        let _running = RunningGuard(&self.running);

        info!("Starting leader election for {}", self.identity);

        while !stop.is_stopped() {
            let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
            self.events.publish(ElectionEvent::cycle_started(cycle));
            debug!(
                "Leader election cycle {} started for {}",
                cycle, self.identity
            );

            let term = Arc::new(TermRunner::new(
                cycle,
                self.identity.name.clone(),
                self.run_fns.clone(),
                self.leading.clone(),
                self.events.clone(),
            ));
            let coordinator = LeaseCoordinator::new(self.lease_config(), term.clone())?;

            match coordinator.run(stop.clone()).await {
                Ok(()) => break,
                Err(e) => {
                    let failures = if term.held_for_at_least(self.identity.ttl) {
                        1
                    } else {
                        self.consecutive_failures
                            .load(Ordering::SeqCst)
                            .saturating_add(1)
                    };
                    self.consecutive_failures.store(failures, Ordering::SeqCst);

                    let delay = self.config.backoff(failures);
                    warn!(
                        "Leader election cycle {} lost ({}). Trying again in {:?}",
                        cycle, e, delay
                    );
                    self.events
                        .publish(ElectionEvent::cycle_failed(cycle, e.to_string()));

                    tokio::select! {
                        biased;
                        _ = stop.stopped() => break,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        let cycles = self.cycle();
        info!(
            "Leader election for {} stopped after {} cycles",
            self.identity, cycles
        );
        self.events.publish(ElectionEvent::shutdown(cycles));
        Ok(())
    }

    fn lease_config(&self) -> LeaseConfig {
        let config = LeaseConfig::new(
            self.store.clone(),
            self.identity.namespace.clone(),
            self.lock_key(),
            self.identity.name.clone(),
            LeaseTimings::from_ttl(self.identity.ttl),
        )
        .with_revision(self.identity.revision.clone())
        .with_jitter_factor(self.config.jitter_factor);

        match self.config.mode {
            ElectionMode::Prioritized => config.with_preemption(prioritized_check(
                self.identity.revision.clone(),
                self.oracle.clone(),
            )),
            ElectionMode::Unprioritized | ElectionMode::PerRevision => config,
        }
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ActiveTerm {
    id: Uuid,
    started_at: Instant,
    tasks: JoinSet<()>,
}

/// Starts and joins the run functions of one cycle's term.
struct TermRunner {
    cycle: u64,
    holder: String,
    run_fns: Vec<RunFunction>,
    leading: Arc<AtomicBool>,
    events: ElectionEventBus,
    active: Mutex<Option<ActiveTerm>>,
    held_since: Mutex<Option<Instant>>,
    held_until: Mutex<Option<Instant>>,
}

impl TermRunner {
    fn new(
        cycle: u64,
        holder: String,
        run_fns: Vec<RunFunction>,
        leading: Arc<AtomicBool>,
        events: ElectionEventBus,
    ) -> Self {
        Self {
            cycle,
            holder,
            run_fns,
            leading,
            events,
            active: Mutex::new(None),
            held_since: Mutex::new(None),
            held_until: Mutex::new(None),
        }
    }

    /// Whether the term of this cycle lasted at least `duration`
    fn held_for_at_least(&self, duration: std::time::Duration) -> bool {
        let since = *self.held_since.lock();
        let until = *self.held_until.lock();
        match (since, until) {
            (Some(since), Some(until)) => until.duration_since(since) >= duration,
            _ => false,
        }
    }
}

#[async_trait]
impl LeadershipHandler for TermRunner {
    async fn started_leading(&self, term: StopSignal) {
        let id = Uuid::new_v4();
        let started_at = Instant::now();

        let mut tasks = JoinSet::new();
        for run_fn in &self.run_fns {
            tasks.spawn((**run_fn)(term.clone()));
        }

        *self.held_since.lock() = Some(started_at);
        *self.active.lock() = Some(ActiveTerm {
            id,
            started_at,
            tasks,
        });
        self.leading.store(true, Ordering::SeqCst);

        info!(
            "{} became leader in cycle {} (term {}, {} run functions)",
            self.holder,
            self.cycle,
            id,
            self.run_fns.len()
        );
        self.events
            .publish(ElectionEvent::started_leading(self.cycle, id));
    }

    async fn stopped_leading(&self) {
        self.leading.store(false, Ordering::SeqCst);
        *self.held_until.lock() = Some(Instant::now());

        let active = self.active.lock().take();
        let Some(mut active) = active else {
            return;
        };

        while let Some(joined) = active.tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Run function of term {} failed: {}", active.id, e);
            }
        }

        info!(
            "{} stopped leading in cycle {} after {:?}",
            self.holder,
            self.cycle,
            active.started_at.elapsed()
        );
        self.events
            .publish(ElectionEvent::stopped_leading(self.cycle, active.id));
    }
}
