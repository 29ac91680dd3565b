//! Owner of every background task the controller starts.
//!
//! The poll timer lives in a `PollGuard` whose drop aborts the task, so the
//! timer can never outlive the session that started it. Reconciliation tasks
//! are tracked here as well and aborted together on disconnect/shutdown.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::inventory::InventoryPoller;
use crate::state::{new_state, Shared};

pub struct PollGuard {
    handle: JoinHandle<()>,
}

impl PollGuard {
    fn spawn(period: Duration, inventory: InventoryPoller) -> Self {
        let handle = tokio::spawn(async move {
            // premier tick après une période : connect() a déjà rafraîchi
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!("poll tick");
                // l'échec est déjà reporté dans l'état, la boucle continue
                let _ = inventory.refresh().await;
            }
        });
        Self { handle }
    }
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Clone)]
pub struct Scheduler {
    period: Duration,
    poll: Shared<Option<PollGuard>>,
    tasks: Shared<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            poll: new_state(None),
            tasks: new_state(Vec::new()),
        }
    }

    /// Démarre le timer de polling s'il ne tourne pas déjà
    pub fn start_polling(&self, inventory: InventoryPoller) -> bool {
        let mut slot = self.poll.lock();
        if slot.is_some() {
            return false;
        }
        info!(period_secs = self.period.as_secs(), "starting inventory polling");
        *slot = Some(PollGuard::spawn(self.period, inventory));
        true
    }

    pub fn stop_polling(&self) {
        if self.poll.lock().take().is_some() {
            info!("inventory polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll.lock().is_some()
    }

    pub fn spawn_tracked<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(tokio::spawn(fut));
    }

    pub fn tracked_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.len()
    }

    /// Arrête le polling et abandonne toutes les tâches suivies
    pub fn cancel_all(&self) {
        self.stop_polling();
        let drained: Vec<_> = self.tasks.lock().drain(..).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "aborting background tasks");
        }
        for handle in drained {
            handle.abort();
        }
    }
}
