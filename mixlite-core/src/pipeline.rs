//! Ordered delivery of queued transactions
//!
//! A drain snapshots the queue, sends every transaction strictly in order
//! (one request in flight at a time), and afterwards removes only the ids the
//! endpoint accepted. Failed transactions stay queued for the next drain,
//! with no retry ceiling.
//!
//! At most one drain runs per pipeline. A drain requested while another is
//! in flight sets a single re-drain flag and returns
//! [`DrainOutcome::Deferred`]; the running drain then waits the coalescing
//! delay and runs one more cycle, however many requests piled up.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::environment::Environment;
use crate::queue::TransactionQueue;
use crate::transport::{Endpoints, OutboundRequest, Transport};

/// Default wait before a coalesced follow-up cycle.
pub const DEFAULT_REDRAIN_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Draining,
}

#[derive(Debug)]
struct DrainState {
    phase: Phase,
    redrain_requested: bool,
}

/// Counts for one completed drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Cycles run, including the coalesced follow-ups
    pub cycles: usize,
    /// Requests issued
    pub attempted: usize,
    /// Transactions accepted and removed from the queue
    pub delivered: usize,
    /// Transactions left queued after a failed request
    pub failed: usize,
}

/// What a call to [`DeliveryPipeline::drain`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// This call ran the drain to completion
    Completed(DrainReport),
    /// Another drain was in flight; it will run a follow-up cycle
    Deferred,
    /// The environment is offline; nothing was sent
    Offline,
}

/// Cumulative delivery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Drains run to completion
    pub drains: usize,
    /// Cycles run
    pub cycles: usize,
    /// Requests issued
    pub requests: usize,
    /// Transactions delivered
    pub delivered: usize,
    /// Failed requests
    pub failed: usize,
    /// Calls collapsed into a running drain
    pub deferred: usize,
    /// Calls skipped because the environment was offline
    pub offline: usize,
}

/// Drains a [`TransactionQueue`] through a [`Transport`].
pub struct DeliveryPipeline {
    queue: Arc<TransactionQueue>,
    transport: Arc<dyn Transport>,
    environment: Arc<dyn Environment>,
    endpoints: Mutex<Endpoints>,
    redrain_delay: Duration,
    state: Mutex<DrainState>,
    idle: Notify,
    stats: Mutex<DeliveryStats>,
}

/// Returns the pipeline to idle if a drain future is dropped mid-flight.
struct DrainingGuard<'a> {
    state: &'a Mutex<DrainState>,
    idle: &'a Notify,
    active: bool,
}

impl Drop for DrainingGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            {
                let mut state = lock(self.state);
                state.phase = Phase::Idle;
                state.redrain_requested = false;
            }
            self.idle.notify_waiters();
        }
    }
}

impl DeliveryPipeline {
    pub fn new(
        queue: Arc<TransactionQueue>,
        transport: Arc<dyn Transport>,
        environment: Arc<dyn Environment>,
        redrain_delay: Duration,
    ) -> Self {
        Self {
            queue,
            transport,
            environment,
            endpoints: Mutex::new(Endpoints::default()),
            redrain_delay,
            state: Mutex::new(DrainState {
                phase: Phase::Idle,
                redrain_requested: false,
            }),
            idle: Notify::new(),
            stats: Mutex::new(DeliveryStats::default()),
        }
    }

    pub fn queue(&self) -> &Arc<TransactionQueue> {
        &self.queue
    }

    /// Route subsequent requests to `endpoints`.
    pub fn set_endpoints(&self, endpoints: Endpoints) {
        *lock(&self.endpoints) = endpoints;
    }

    pub fn endpoints(&self) -> Endpoints {
        lock(&self.endpoints).clone()
    }

    pub fn stats(&self) -> DeliveryStats {
        lock(&self.stats).clone()
    }

    pub fn is_draining(&self) -> bool {
        lock(&self.state).phase == Phase::Draining
    }

    /// Resolves once no drain is in flight.
    pub async fn wait_idle(&self) {
        loop {
            // registered before the check so a concurrent transition is not missed
            let notified = self.idle.notified();
            if !self.is_draining() {
                return;
            }
            notified.await;
        }
    }

    /// Deliver everything currently queued.
    pub async fn drain(&self) -> DrainOutcome {
        if !self.environment.is_online() {
            lock(&self.stats).offline += 1;
            debug!("Offline, drain skipped");
            return DrainOutcome::Offline;
        }

        {
            let mut state = lock(&self.state);
            if state.phase == Phase::Draining {
                state.redrain_requested = true;
                drop(state);
                lock(&self.stats).deferred += 1;
                debug!("Drain in flight, follow-up requested");
                return DrainOutcome::Deferred;
            }
            state.phase = Phase::Draining;
            state.redrain_requested = false;
        }

        let mut guard = DrainingGuard {
            state: &self.state,
            idle: &self.idle,
            active: true,
        };
        let mut report = DrainReport::default();

        loop {
            self.run_cycle(&mut report).await;

            let redrain = {
                let mut state = lock(&self.state);
                if state.redrain_requested {
                    state.redrain_requested = false;
                    true
                } else {
                    state.phase = Phase::Idle;
                    guard.active = false;
                    false
                }
            };
            if !redrain {
                self.idle.notify_waiters();
                break;
            }

            if !self.redrain_delay.is_zero() {
                tokio::time::sleep(self.redrain_delay).await;
            }
        }

        lock(&self.stats).drains += 1;
        if report.attempted > 0 {
            info!(
                cycles = report.cycles,
                delivered = report.delivered,
                failed = report.failed,
                "Drain finished"
            );
        }
        DrainOutcome::Completed(report)
    }

    async fn run_cycle(&self, report: &mut DrainReport) {
        report.cycles += 1;
        lock(&self.stats).cycles += 1;

        let mut items = self.queue.all();
        if items.is_empty() {
            return;
        }

        let endpoints = self.endpoints();
        debug!(pending = items.len(), "Drain cycle started");

        for item in items.iter_mut() {
            report.attempted += 1;

            let result = match OutboundRequest::new(item, &endpoints) {
                Ok(request) => {
                    lock(&self.stats).requests += 1;
                    self.transport.send(&request).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    item.completed = true;
                    report.delivered += 1;
                    lock(&self.stats).delivered += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    lock(&self.stats).failed += 1;
                    warn!(id = %item.id, kind = %item.kind(), error = %e, "Delivery failed, keeping transaction queued");
                }
            }
        }

        let completed: HashSet<String> = items
            .iter()
            .filter(|item| item.completed)
            .map(|item| item.id.clone())
            .collect();

        if let Err(e) = self.queue.remove(&completed) {
            warn!(error = %e, delivered = completed.len(), "Failed to remove delivered transactions");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
