use crate::audio::CompletionSignal;
use crate::config::MonitorConfig;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    TrackFinished { load_id: u64 },
}

/// Background watcher for the engine's "finished" signal.
///
/// It only reads the [`CompletionSignal`] and posts one [`MonitorEvent`] per
/// completed load; the receiving loop is the one that touches the session.
pub struct EndOfTrackMonitor {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl EndOfTrackMonitor {
    /// Spawns the polling task on the current tokio runtime.
    pub fn spawn(
        signal: CompletionSignal,
        events: mpsc::UnboundedSender<MonitorEvent>,
        config: &MonitorConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
        // Anything finished before the spawn is not ours to report.
        let baseline = signal.last_finished();
        let handle = tokio::spawn(watch(signal, baseline, events, shutdown_rx, poll_interval));

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Asks the task to stop and waits up to the configured timeout.
    /// Returns false if it had to be aborted instead.
    pub async fn shutdown(mut self) -> bool {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let Some(mut handle) = self.handle.take() else {
            return true;
        };

        match time::timeout(self.shutdown_timeout, &mut handle).await {
            Ok(_) => {
                debug!("End-of-track monitor stopped");
                true
            }
            Err(_) => {
                warn!(
                    "End-of-track monitor did not stop within {:?}, aborting",
                    self.shutdown_timeout
                );
                handle.abort();
                false
            }
        }
    }
}

impl Drop for EndOfTrackMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn watch(
    signal: CompletionSignal,
    mut last_seen: u64,
    events: mpsc::UnboundedSender<MonitorEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    poll_interval: Duration,
) {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                let finished = signal.last_finished();
                if finished == last_seen {
                    continue;
                }
                last_seen = finished;
                debug!("Load #{} finished", finished);
                if events.send(MonitorEvent::TrackFinished { load_id: finished }).is_err() {
                    debug!("Monitor receiver dropped, stopping");
                    break;
                }
            }
        }
    }
}
