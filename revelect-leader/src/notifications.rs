//! Notification system for election lifecycle changes.

use parking_lot::RwLock;
use revelect_core::now_millis;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle events emitted by a [`LeaderElection`](crate::LeaderElection)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionEvent {
    /// A new lease cycle started
    CycleStarted { cycle: u64, timestamp: u64 },

    /// The lease was acquired and run functions were started
    StartedLeading {
        cycle: u64,
        term_id: Uuid,
        timestamp: u64,
    },

    /// The term ended and every run function returned
    StoppedLeading {
        cycle: u64,
        term_id: Uuid,
        timestamp: u64,
    },

    /// The cycle ended with an error and will be restarted
    CycleFailed {
        cycle: u64,
        reason: String,
        timestamp: u64,
    },

    /// The election loop exited
    Shutdown { cycles: u64, timestamp: u64 },
}

impl ElectionEvent {
    pub fn cycle_started(cycle: u64) -> Self {
        Self::CycleStarted {
            cycle,
            timestamp: now_millis(),
        }
    }

    pub fn started_leading(cycle: u64, term_id: Uuid) -> Self {
        Self::StartedLeading {
            cycle,
            term_id,
            timestamp: now_millis(),
        }
    }

    pub fn stopped_leading(cycle: u64, term_id: Uuid) -> Self {
        Self::StoppedLeading {
            cycle,
            term_id,
            timestamp: now_millis(),
        }
    }

    pub fn cycle_failed(cycle: u64, reason: impl Into<String>) -> Self {
        Self::CycleFailed {
            cycle,
            reason: reason.into(),
            timestamp: now_millis(),
        }
    }

    pub fn shutdown(cycles: u64) -> Self {
        Self::Shutdown {
            cycles,
            timestamp: now_millis(),
        }
    }

    /// Cycle the event belongs to
    pub fn cycle(&self) -> u64 {
        match self {
            Self::CycleStarted { cycle, .. }
            | Self::StartedLeading { cycle, .. }
            | Self::StoppedLeading { cycle, .. }
            | Self::CycleFailed { cycle, .. } => *cycle,
            Self::Shutdown { cycles, .. } => *cycles,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Self::CycleStarted { timestamp, .. }
            | Self::StartedLeading { timestamp, .. }
            | Self::StoppedLeading { timestamp, .. }
            | Self::CycleFailed { timestamp, .. }
            | Self::Shutdown { timestamp, .. } => *timestamp,
        }
    }
}

/// Statistics about event delivery
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventStats {
    pub events_published: u64,
    pub events_delivered: u64,
    pub events_unobserved: u64,
}

/// Broadcast bus for [`ElectionEvent`]s.
///
/// Publishing never blocks. Subscribers that fall more than the channel
/// capacity behind observe a lag error and skip ahead.
#[derive(Debug, Clone)]
pub struct ElectionEventBus {
    broadcast_tx: broadcast::Sender<ElectionEvent>,
    stats: Arc<RwLock<EventStats>>,
}

impl Default for ElectionEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ElectionEventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);

        Self {
            broadcast_tx,
            stats: Arc::new(RwLock::new(EventStats::default())),
        }
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ElectionEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: ElectionEvent) -> usize {
        let delivered = self.broadcast_tx.send(event.clone()).unwrap_or(0);

        {
            let mut stats = self.stats.write();
            stats.events_published += 1;
            stats.events_delivered += delivered as u64;
            if delivered == 0 {
                stats.events_unobserved += 1;
            }
        }

        debug!("Published {:?} to {} subscribers", event, delivered);
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }

    pub fn stats(&self) -> EventStats {
        self.stats.read().clone()
    }
}
