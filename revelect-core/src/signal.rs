//! Closable stop signals.
//!
//! A [`StopHandle`] closes every [`StopSignal`] cloned from it, either through
//! [`StopHandle::stop`] or by being dropped. Signals are observed by polling
//! [`StopSignal::is_stopped`] or awaiting [`StopSignal::stopped`].

use tokio::sync::watch;

/// Creates a connected stop handle and signal.
///
/// # Examples
///
/// ```rust
/// use revelect_core::stop_channel;
///
/// # tokio_test::block_on(async {
/// let (handle, signal) = stop_channel();
/// assert!(!signal.is_stopped());
///
/// handle.stop();
/// signal.stopped().await;
/// assert!(signal.is_stopped());
/// # });
/// ```
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx: Some(rx) })
}

/// Owner side of a stop signal.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Closes the signal. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns another signal connected to this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: Some(self.tx.subscribe()),
        }
    }
}

/// Observer side of a stop signal.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Returns `true` once the handle stopped or was dropped.
    pub fn is_stopped(&self) -> bool {
        match &self.rx {
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
            None => false,
        }
    }

    /// Completes once the handle stopped or was dropped.
    pub async fn stopped(&self) {
        match &self.rx {
            Some(rx) => {
                let mut rx = rx.clone();
                // An error means the handle is gone, which closes the signal too.
                let _ = rx.wait_for(|stopped| *stopped).await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_wakes_all_clones() {
        let (handle, signal) = stop_channel();
        let other = signal.clone();
        let late = handle.signal();

        let waiter = tokio::spawn(async move { other.stopped().await });
        handle.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("clone was not woken")
            .unwrap();
        assert!(signal.is_stopped());
        assert!(late.is_stopped());
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn test_dropping_handle_stops() {
        let (handle, signal) = stop_channel();
        drop(handle);

        assert!(signal.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), signal.stopped())
            .await
            .expect("dropped handle did not close the signal");
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let signal = StopSignal::never();
        assert!(!signal.is_stopped());

        let result = tokio::time::timeout(Duration::from_millis(50), signal.stopped()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (handle, signal) = stop_channel();
        handle.stop();
        handle.stop();
        signal.stopped().await;
        assert!(signal.is_stopped());
    }
}
