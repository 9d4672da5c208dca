use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use revelect_core::{
    stop_channel, DefaultRevisionWatcher, ElectionIdentity, ElectionResult, LockRecord, StopHandle,
    StopSignal,
};
use revelect_leader::{ElectionConfig, ElectionEvent, ElectionMode, ElectionStatus, LeaderElection};
use revelect_store::InMemoryLockStore;

/// How long an expected leader may take to start its run function
pub const LEADER_WAIT: Duration = Duration::from_secs(15);

/// How long an expected follower is watched for an unexpected start
pub const FOLLOWER_WAIT: Duration = Duration::from_secs(1);

/// Lease TTL used by harness contenders
pub const TEST_TTL: Duration = Duration::from_secs(1);

/// Counts contenders whose run functions are active at the same time.
#[derive(Debug, Clone, Default)]
pub struct LeaderGauge {
    active: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl LeaderGauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously active leaders observed
    pub fn max_active(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Shared store, oracle and settings for a group of contenders on one key.
pub struct ElectionHarness {
    pub store: InMemoryLockStore,
    pub oracle: Arc<DefaultRevisionWatcher>,
    pub gauge: LeaderGauge,
    namespace: String,
    election_id: String,
    ttl: Duration,
    config: ElectionConfig,
}

impl ElectionHarness {
    pub fn new(election_id: impl Into<String>, default_revision: impl Into<String>) -> Self {
        Self {
            store: InMemoryLockStore::new(),
            oracle: Arc::new(DefaultRevisionWatcher::new(default_revision)),
            gauge: LeaderGauge::default(),
            namespace: "istio-system".to_string(),
            election_id: election_id.into(),
            ttl: TEST_TTL,
            config: ElectionConfig::new()
                .with_backoff(Duration::from_millis(50), Duration::from_secs(1)),
        }
    }

    pub fn with_mode(mut self, mode: ElectionMode) -> Self {
        self.config = self.config.with_mode(mode);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn election_id(&self) -> &str {
        &self.election_id
    }

    /// Start a contender without waiting for any outcome.
    pub fn spawn(&self, name: &str, revision: &str) -> ElectionResult<Contender> {
        let identity = ElectionIdentity::new(&self.namespace, name, &self.election_id)
            .with_revision(revision)
            .with_ttl(self.ttl);
        let mut election = LeaderElection::with_config(
            identity,
            self.config.clone(),
            Arc::new(self.store.clone()),
            self.oracle.clone(),
        )?;

        let (started_tx, started_rx) = mpsc::unbounded_channel();
        let runs = Arc::new(AtomicUsize::new(0));
        let cancellations = Arc::new(AtomicUsize::new(0));
        {
            let runs = runs.clone();
            let cancellations = cancellations.clone();
            let gauge = self.gauge.clone();
            election.add_run_function(move |term: StopSignal| {
                let started_tx = started_tx.clone();
                let runs = runs.clone();
                let cancellations = cancellations.clone();
                let gauge = gauge.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    gauge.enter();
                    let _ = started_tx.send(());

                    term.stopped().await;

                    gauge.exit();
                    cancellations.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let election = Arc::new(election);
        let events = election.subscribe();
        let (stop_handle, stop) = stop_channel();
        let runner = election.clone();
        let task = tokio::spawn(async move { runner.run(stop).await });

        debug!("Spawned contender {} (revision '{}')", name, revision);
        Ok(Contender {
            name: name.to_string(),
            revision: revision.to_string(),
            election,
            stop_handle,
            started_rx,
            events,
            runs,
            cancellations,
            task,
        })
    }

    /// Start a contender and check whether it leads.
    ///
    /// An expected leader must start its run function within [`LEADER_WAIT`].
    /// Any other contender must not start it within [`FOLLOWER_WAIT`].
    pub async fn create_election(
        &self,
        name: &str,
        revision: &str,
        expect_leader: bool,
    ) -> anyhow::Result<Contender> {
        let mut contender = self.spawn(name, revision)?;

        if expect_leader {
            if !contender.wait_for_leadership(LEADER_WAIT).await {
                bail!(
                    "{} (revision '{}') did not become leader within {:?}",
                    name,
                    revision,
                    LEADER_WAIT
                );
            }
        } else if contender.wait_for_leadership(FOLLOWER_WAIT).await {
            bail!(
                "{} (revision '{}') unexpectedly became leader",
                name,
                revision
            );
        }

        info!(
            "Contender {} (revision '{}') leading={}",
            name,
            revision,
            contender.is_leader()
        );
        Ok(contender)
    }

    /// Record under the plain election key
    pub fn holder(&self) -> Option<LockRecord> {
        self.store.peek(&self.namespace, &self.election_id)
    }

    /// Record under an arbitrary key in the harness namespace
    pub fn record(&self, key: &str) -> Option<LockRecord> {
        self.store.peek(&self.namespace, key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys(&self.namespace)
    }
}

/// One running election plus the observations of its run function.
pub struct Contender {
    pub name: String,
    pub revision: String,
    election: Arc<LeaderElection>,
    stop_handle: StopHandle,
    started_rx: mpsc::UnboundedReceiver<()>,
    events: broadcast::Receiver<ElectionEvent>,
    runs: Arc<AtomicUsize>,
    cancellations: Arc<AtomicUsize>,
    task: JoinHandle<ElectionResult<()>>,
}

impl Contender {
    /// Wait for the next start of the run function
    pub async fn wait_for_leadership(&mut self, within: Duration) -> bool {
        matches!(timeout(within, self.started_rx.recv()).await, Ok(Some(())))
    }

    pub fn election(&self) -> &Arc<LeaderElection> {
        &self.election
    }

    pub fn is_leader(&self) -> bool {
        self.election.is_leader()
    }

    pub fn cycle(&self) -> u64 {
        self.election.cycle()
    }

    pub fn status(&self) -> ElectionStatus {
        self.election.status()
    }

    /// Times the run function was started
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Times the run function observed the end of its term
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    /// Events received so far, oldest first
    pub fn drain_events(&mut self) -> Vec<ElectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Close the stop signal and wait for the election to return.
    pub async fn stop(self) -> anyhow::Result<()> {
        debug!("Stopping contender {}", self.name);
        self.stop_handle.stop();
        self.task.await??;
        Ok(())
    }
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    timeout(within, async {
        while !condition() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}
