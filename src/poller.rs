//! Job poller.
//!
//! A cancellable repeating task that fetches the full job collection on a
//! fixed cadence and republishes it newest-first. Each tick carries a
//! monotonically increasing sequence number; a result is only published if
//! nothing newer has been published and the poller has not been stopped, so
//! slow responses can never clobber fresher state or land after `stop()`.

use crate::api::ApiClient;
use crate::model::Job;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// What to do with jobs that were published before but are absent from a
/// newer snapshot. The server gives no explicit deletion signal; absence is
/// the only hint, so the policy is explicit here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingJobs {
    /// Treat absence as deletion: each snapshot fully replaces the last.
    #[default]
    Drop,
    /// Keep vanished jobs around with their last observed state, appended
    /// after the jobs the server still reports.
    Retain,
}

struct Gate {
    stopped: bool,
    last_seq: u64,
}

pub struct JobPoller {
    api: Arc<ApiClient>,
    missing: MissingJobs,
    jobs: Arc<watch::Sender<Vec<Job>>>,
}

/// Handle for one polling run. Dropping it does not stop the poller; call
/// [`PollerHandle::stop`].
pub struct PollerHandle {
    gate: Arc<Mutex<Gate>>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Cooperative cancellation: no further ticks are scheduled and nothing
    /// is published after this returns, even if a dispatched fetch is still
    /// in flight.
    pub fn stop(&self) {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stopped = true;
        self.stop_tx.send_replace(true);
    }

    /// Wait for the scheduling loop to exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl JobPoller {
    pub fn new(api: Arc<ApiClient>, missing: MissingJobs) -> Self {
        Self {
            api,
            missing,
            jobs: Arc::new(watch::channel(Vec::new()).0),
        }
    }

    /// Observe published job collections. Each value is a full replacement,
    /// newest job first.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Job>> {
        self.jobs.subscribe()
    }

    /// Issue one fetch immediately, then keep fetching every `interval`
    /// until stopped. Fetches are dispatched concurrently so a slow response
    /// never delays the next tick.
    pub fn start(&self, interval: Duration) -> PollerHandle {
        let gate = Arc::new(Mutex::new(Gate {
            stopped: false,
            last_seq: 0,
        }));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let api = self.api.clone();
        let jobs = self.jobs.clone();
        let missing = self.missing;
        let loop_gate = gate.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut seq: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }
                seq += 1;
                let api = api.clone();
                let jobs = jobs.clone();
                let gate = loop_gate.clone();
                tokio::spawn(async move {
                    match api.list_jobs().await {
                        Ok(snapshot) => publish(&gate, &jobs, missing, seq, snapshot),
                        Err(err) => {
                            // Skip the tick; the displayed collection simply
                            // isn't refreshed until the next one succeeds.
                            warn!(seq, error = %err, "job poll failed");
                        }
                    }
                });
            }
            debug!("job poller stopped");
        });

        PollerHandle {
            gate,
            stop_tx,
            task,
        }
    }
}

fn publish(
    gate: &Mutex<Gate>,
    jobs_tx: &watch::Sender<Vec<Job>>,
    missing: MissingJobs,
    seq: u64,
    mut snapshot: Vec<Job>,
) {
    // Server order is oldest-first; observers want the newest on top.
    snapshot.reverse();

    let mut gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
    if gate.stopped || seq <= gate.last_seq {
        debug!(seq, last = gate.last_seq, "suppressing stale poll result");
        return;
    }
    gate.last_seq = seq;

    if missing == MissingJobs::Retain {
        let previous = jobs_tx.borrow().clone();
        for prev in previous {
            if !snapshot.iter().any(|j| j.external_id == prev.external_id) {
                snapshot.push(prev);
            }
        }
    }

    // Send while holding the gate so stop() strictly orders with publishes.
    jobs_tx.send_replace(snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;

    fn job(id: &str, status: JobStatus) -> Job {
        Job {
            external_id: id.to_string(),
            original_url: None,
            status,
            progress: 0,
        }
    }

    #[test]
    fn stale_sequence_numbers_are_suppressed() {
        let gate = Mutex::new(Gate {
            stopped: false,
            last_seq: 0,
        });
        let (tx, rx) = watch::channel(Vec::new());

        publish(&gate, &tx, MissingJobs::Drop, 2, vec![job("new", JobStatus::Completed)]);
        assert_eq!(rx.borrow()[0].external_id, "new");

        // Tick 1 resolving after tick 2 must not overwrite it.
        publish(&gate, &tx, MissingJobs::Drop, 1, vec![job("old", JobStatus::Pending)]);
        assert_eq!(rx.borrow()[0].external_id, "new");
    }

    #[test]
    fn nothing_is_published_after_stop() {
        let gate = Mutex::new(Gate {
            stopped: true,
            last_seq: 0,
        });
        let (tx, rx) = watch::channel(Vec::new());
        publish(&gate, &tx, MissingJobs::Drop, 1, vec![job("a", JobStatus::Pending)]);
        assert!(rx.borrow().is_empty());
    }

    #[test]
    fn published_order_reverses_server_order() {
        let gate = Mutex::new(Gate {
            stopped: false,
            last_seq: 0,
        });
        let (tx, rx) = watch::channel(Vec::new());
        publish(
            &gate,
            &tx,
            MissingJobs::Drop,
            1,
            vec![job("oldest", JobStatus::Completed), job("newest", JobStatus::Pending)],
        );
        let published = rx.borrow().clone();
        assert_eq!(published[0].external_id, "newest");
        assert_eq!(published[1].external_id, "oldest");
    }

    #[test]
    fn retain_policy_keeps_vanished_jobs() {
        let gate = Mutex::new(Gate {
            stopped: false,
            last_seq: 0,
        });
        let (tx, rx) = watch::channel(Vec::new());
        publish(
            &gate,
            &tx,
            MissingJobs::Retain,
            1,
            vec![job("a", JobStatus::Completed), job("b", JobStatus::Pending)],
        );
        // "a" disappears from the next snapshot but is retained at the tail.
        publish(&gate, &tx, MissingJobs::Retain, 2, vec![job("b", JobStatus::Completed)]);
        let published = rx.borrow().clone();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].external_id, "b");
        assert_eq!(published[0].status, JobStatus::Completed);
        assert_eq!(published[1].external_id, "a");
    }
}
