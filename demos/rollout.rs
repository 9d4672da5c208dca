//! Walks a red/green rollout and rollback through prioritized leader election.
//!
//! Three replicas contend for one key. Two run the "green" revision, which
//! starts as the default. A "red" replica joins, the default is switched to
//! "red" and leadership moves to it. Rolling back to "green" moves it back.

use revelect_core::{
    stop_channel, DefaultRevisionWatcher, ElectionIdentity, RevisionOracle, StopHandle, StopSignal,
};
use revelect_leader::{ElectionEvent, LeaderElection};
use revelect_store::InMemoryLockStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{info, warn};

const NAMESPACE: &str = "istio-system";
const ELECTION_ID: &str = "rollout-controller";

struct Replica {
    name: String,
    election: Arc<LeaderElection>,
    stop: StopHandle,
    task: JoinHandle<()>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting rollout example");

    let store = InMemoryLockStore::new();
    let oracle = Arc::new(DefaultRevisionWatcher::new("green"));
    oracle.add_handler(Box::new(|revision: &str| {
        info!("Default revision is now '{}'", revision);
    }));

    let mut replicas = vec![
        start_replica(&store, &oracle, "green-0", "green")?,
        start_replica(&store, &oracle, "green-1", "green")?,
    ];
    sleep(Duration::from_secs(3)).await;
    report(&store, &replicas);

    info!("Deploying the red revision");
    replicas.push(start_replica(&store, &oracle, "red-0", "red")?);
    sleep(Duration::from_secs(2)).await;
    report(&store, &replicas);

    info!("Promoting red to default");
    oracle.set_default("red");
    sleep(Duration::from_secs(3)).await;
    report(&store, &replicas);

    info!("Rolling back to green");
    oracle.set_default("green");
    sleep(Duration::from_secs(3)).await;
    report(&store, &replicas);

    for replica in replicas {
        info!("Stopping {}", replica.name);
        replica.stop.stop();
        replica.task.await?;
    }

    info!("Rollout example completed");
    Ok(())
}

fn start_replica(
    store: &InMemoryLockStore,
    oracle: &Arc<DefaultRevisionWatcher>,
    name: &str,
    revision: &str,
) -> Result<Replica, Box<dyn std::error::Error>> {
    let identity = ElectionIdentity::new(NAMESPACE, name, ELECTION_ID)
        .with_revision(revision)
        .with_ttl(Duration::from_secs(1));
    let mut election = LeaderElection::new(identity, Arc::new(store.clone()), oracle.clone())?;

    let worker = name.to_string();
    election.add_run_function(move |term: StopSignal| reconcile(worker.clone(), term));

    let election = Arc::new(election);
    let mut events = election.subscribe();
    let watched = name.to_string();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ElectionEvent::StartedLeading { cycle, term_id, .. } => {
                    info!(
                        "{} started leading (cycle {}, term {})",
                        watched, cycle, term_id
                    )
                }
                ElectionEvent::StoppedLeading { cycle, .. } => {
                    info!("{} stopped leading (cycle {})", watched, cycle)
                }
                ElectionEvent::CycleFailed { cycle, reason, .. } => {
                    warn!("{} cycle {} failed: {}", watched, cycle, reason)
                }
                ElectionEvent::Shutdown { cycles, .. } => {
                    info!("{} shut down after {} cycles", watched, cycles);
                    break;
                }
                ElectionEvent::CycleStarted { .. } => {}
            }
        }
    });

    let (stop, signal) = stop_channel();
    let runner = election.clone();
    let replica_name = name.to_string();
    let task = tokio::spawn(async move {
        if let Err(e) = runner.run(signal).await {
            warn!("Election for {} failed: {}", replica_name, e);
        }
    });

    Ok(Replica {
        name: name.to_string(),
        election,
        stop,
        task,
    })
}

/// Singleton work: runs until the term ends.
async fn reconcile(worker: String, term: StopSignal) {
    let mut ticker = interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = term.stopped() => break,
            _ = ticker.tick() => info!("{} reconciling", worker),
        }
    }
    info!("{} handed off reconciliation", worker);
}

fn report(store: &InMemoryLockStore, replicas: &[Replica]) {
    if let Some(record) = store.peek(NAMESPACE, ELECTION_ID) {
        info!(
            "Lock held by {} (revision '{}', {} transitions)",
            record.holder_identity, record.holder_revision, record.leader_transitions
        );
    }
    for replica in replicas {
        let status = replica.election.status();
        info!(
            "  {}: leader={} cycle={} failures={}",
            replica.name, status.is_leader, status.cycle, status.consecutive_failures
        );
    }
}
