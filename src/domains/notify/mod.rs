//! Job-scoped status notifications. Every export job gets its own broadcast
//! channel keyed by job id; subscribers of one job never see another job's
//! events. Channels are torn down when the job reaches a terminal status.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures::Stream;
use log::debug;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domains::batch::types::JobStatusSnapshot;

const CHANNEL_CAPACITY: usize = 32;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct NotificationHub {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<JobStatusSnapshot>>>,
    idle_timeout: Duration,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

impl NotificationHub {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Subscribes to one job's updates. Creates the channel if this is the
    /// first interest in the job.
    pub fn subscribe(&self, job_id: Uuid) -> JobSubscription {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Subscriptions to jobs that never publish (unknown ids, jobs that
        // already finished) would otherwise pin their entry forever.
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let sender = channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        JobSubscription {
            receiver: sender.subscribe(),
            idle_timeout: self.idle_timeout,
        }
    }

    /// Publishes a snapshot to the job's subscribers. A terminal snapshot
    /// closes the channel afterwards.
    pub fn publish(&self, snapshot: JobStatusSnapshot) {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let terminal = snapshot.status.is_terminal();
        let job_id = snapshot.job_id;
        if let Some(sender) = channels.get(&job_id) {
            // send only fails when nobody is listening, which is fine
            let _ = sender.send(snapshot);
        }
        if terminal {
            channels.remove(&job_id);
            debug!("Closed notification channel for job {}", job_id);
        }
        channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Number of live channels. Exposed for diagnostics.
    pub fn channel_count(&self) -> usize {
        let channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels.len()
    }
}

pub struct JobSubscription {
    receiver: broadcast::Receiver<JobStatusSnapshot>,
    idle_timeout: Duration,
}

impl JobSubscription {
    /// Waits for the next snapshot. Returns None when the channel closes or
    /// nothing arrives within the idle timeout. Lagged subscribers skip the
    /// overwritten events and keep receiving.
    pub async fn next(&mut self) -> Option<JobStatusSnapshot> {
        loop {
            match tokio::time::timeout(self.idle_timeout, self.receiver.recv()).await {
                Ok(Ok(snapshot)) => return Some(snapshot),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_) => return None,
            }
        }
    }

    /// Stream view of the subscription, for callers that forward the updates
    /// (a server-sent-events endpoint, for instance).
    pub fn into_stream(self) -> impl Stream<Item = JobStatusSnapshot> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|snapshot| (snapshot, sub))
        })
    }
}
