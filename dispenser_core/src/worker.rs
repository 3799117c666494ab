//! Single actuation worker.
//!
//! Spawns one thread that owns the `CommandRouter` (and therefore the relay
//! bank). Inbound messages are queued on a bounded channel and handled strictly
//! one at a time, so two actuations can never interleave.
//!
//! Safety: the thread is shut down when the `ActuationWorker` is dropped. An
//! actuation in progress is never cut short; shutdown waits for it.
use crossbeam_channel as xch;
use dispenser_traits::{Clock, RelayBank};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::router::{CommandRouter, Publisher, RouteOutcome};

const POLL: Duration = Duration::from_millis(100);

/// One raw message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
enum Job {
    Message(Inbound),
    /// Publish the registration payload (after every new broker connection).
    Announce,
}

/// Cloneable producer side handed to the transport thread.
#[derive(Debug, Clone)]
pub struct Submitter {
    tx: xch::Sender<Job>,
}

impl Submitter {
    /// Enqueue a message; blocks while the queue is full. Fails once the worker is gone.
    pub fn submit(&self, msg: Inbound) -> Result<(), Inbound> {
        match self.tx.send(Job::Message(msg)) {
            Err(xch::SendError(Job::Message(msg))) => Err(msg),
            _ => Ok(()),
        }
    }

    /// Queue a registration announcement behind any pending messages.
    /// Returns false once the worker is gone.
    pub fn announce(&self) -> bool {
        self.tx.send(Job::Announce).is_ok()
    }
}

pub struct ActuationWorker {
    tx: xch::Sender<Job>,
    handled: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ActuationWorker {
    pub fn spawn<B, C, P>(router: CommandRouter<B, C, P>, queue_depth: usize) -> Self
    where
        B: RelayBank + Send + 'static,
        C: Clock + Send + 'static,
        P: Publisher + Send + 'static,
    {
        Self::spawn_observed(router, queue_depth, |_| {})
    }

    /// Like `spawn`, calling `observe` with every outcome (after the response, if any, was published).
    pub fn spawn_observed<B, C, P, F>(
        mut router: CommandRouter<B, C, P>,
        queue_depth: usize,
        mut observe: F,
    ) -> Self
    where
        B: RelayBank + Send + 'static,
        C: Clock + Send + 'static,
        P: Publisher + Send + 'static,
        F: FnMut(&RouteOutcome) + Send + 'static,
    {
        let (tx, rx) = xch::bounded::<Job>(queue_depth.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handled = Arc::new(AtomicU64::new(0));
        let handled_clone = handled.clone();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!(pending = rx.len(), "worker received shutdown signal");
                    break;
                }
                match rx.recv_timeout(POLL) {
                    Ok(Job::Announce) => {
                        if let Err(e) = router.announce() {
                            tracing::error!(error = %e, "registration not published");
                        }
                    }
                    Ok(Job::Message(msg)) => {
                        tracing::info!(topic = %msg.topic, bytes = msg.payload.len(), "message received");
                        let outcome = router.handle(&msg.topic, &msg.payload);
                        tracing::debug!(?outcome, "message handled");
                        handled_clone.fetch_add(1, Ordering::Relaxed);
                        observe(&outcome);
                    }
                    Err(xch::RecvTimeoutError::Timeout) => continue,
                    Err(xch::RecvTimeoutError::Disconnected) => break,
                }
            }
            // Dropping the router drops the engine, which releases every relay.
            drop(router);
            tracing::trace!("worker thread exiting cleanly");
        });

        Self {
            tx,
            handled,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn submitter(&self) -> Submitter {
        Submitter {
            tx: self.tx.clone(),
        }
    }

    /// Messages fully handled so far.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Messages waiting behind the one currently being handled.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    /// Stop after the current message and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for ActuationWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
