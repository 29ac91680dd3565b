/**
 * MUTATION COORDINATOR - Actions utilisateur sur les VMs
 *
 * RÔLE :
 * Alimentation et snapshots (création / retour / suppression). Le backend
 * répond avant que vSphere n'ait réellement appliqué le changement, donc
 * chaque succès est suivi d'un rafraîchissement différé.
 *
 * FONCTIONNEMENT :
 * - toggle_power : écriture optimiste AVANT la requête, pas de rollback
 * - snapshots : rien de spéculatif en local, on attend l'inventaire
 * - succès → marqueur pending + réconciliation (délai puis backoff borné)
 * - échec → notice bloquante, aucune réconciliation, aucun retry
 */

use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::api::VcApi;
use crate::config::ReconcileConf;
use crate::errors::{ErrorReporter, Operation, ReportedError, TransportError};
use crate::inventory::InventoryPoller;
use crate::models::{PowerAction, VirtualMachine};
use crate::pending::{Epoch, Intent, PendingOp, PendingSet};
use crate::scheduler::Scheduler;
use crate::state::{Notice, SnapshotDraft, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub delay: Duration,
    pub max_attempts: u32,
    pub backoff_factor: u32,
}

impl ReconcilePolicy {
    /// Attente avant la tentative `attempt` (0 = premier rafraîchissement)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1).saturating_pow(attempt);
        self.delay.saturating_mul(factor)
    }
}

impl From<&ReconcileConf> for ReconcilePolicy {
    fn from(conf: &ReconcileConf) -> Self {
        Self {
            delay: Duration::from_millis(conf.delay_ms),
            max_attempts: conf.max_attempts.max(1),
            backoff_factor: conf.backoff_factor,
        }
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self::from(&ReconcileConf::default())
    }
}

/// Nom utilisé par le backend quand aucun nom n'est fourni
pub fn default_snapshot_name(now: OffsetDateTime) -> String {
    match now.format(&Rfc3339) {
        Ok(stamp) => format!("Snapshot-{}", stamp),
        Err(_) => format!("Snapshot-{}", now.unix_timestamp()),
    }
}

#[derive(Clone)]
pub struct MutationCoordinator {
    api: VcApi,
    store: Store,
    inventory: InventoryPoller,
    pending: PendingSet,
    scheduler: Scheduler,
    epoch: Epoch,
    policy: ReconcilePolicy,
}

impl MutationCoordinator {
    pub fn new(
        api: VcApi,
        store: Store,
        inventory: InventoryPoller,
        pending: PendingSet,
        scheduler: Scheduler,
        epoch: Epoch,
        policy: ReconcilePolicy,
    ) -> Self {
        Self { api, store, inventory, pending, scheduler, epoch, policy }
    }

    pub async fn toggle_power(&self, vm: &VirtualMachine) -> Result<PowerAction, ReportedError> {
        let action = vm.power_state.toggle_action();
        let target = action.target_state();

        let generation = self.epoch.advance();
        let op = PendingOp::new(&vm.name, Intent::Power(target), generation);
        let op_id = op.id;
        self.pending.insert(op.clone());
        self.store.update(|s| {
            if let Some(local) = s.vm_mut(&vm.name) {
                local.power_state = target;
            }
        });
        debug!(vm = %vm.name, %action, generation, "optimistic power state written");

        match self.api.power(&vm.name, action).await {
            Ok(()) => {
                info!(vm = %vm.name, %action, "power request accepted");
                self.schedule_reconcile(op);
                Ok(action)
            }
            Err(e) => {
                // l'état optimiste reste affiché, le prochain poll tranchera
                self.pending.remove(op_id);
                Err(self.fail(Operation::Power(action), &e))
            }
        }
    }

    pub async fn create_snapshot(&self, vm: &str, name: &str, description: &str) -> Result<String, ReportedError> {
        let name = if name.trim().is_empty() {
            default_snapshot_name(OffsetDateTime::now_utc())
        } else {
            name.to_string()
        };
        let known_ids = self.store.read(|s| s.vm(vm).map(|v| v.snapshot_ids()).unwrap_or_default());
        let generation = self.epoch.advance();

        if let Err(e) = self.api.create_snapshot(vm, &name, description).await {
            return Err(self.fail(Operation::CreateSnapshot, &e));
        }

        info!(%vm, snapshot = %name, "snapshot creation accepted");
        let op = PendingOp::new(vm, Intent::CreateSnapshot { name: name.clone(), known_ids }, generation);
        self.pending.insert(op.clone());
        self.store.update(|s| {
            s.snapshot_draft = SnapshotDraft::default();
            s.notice = Some(Notice::info("Snapshot creation initiated"));
        });
        self.schedule_reconcile(op);
        Ok(name)
    }

    pub async fn revert_snapshot(&self, vm: &str, snapshot_id: &str) -> Result<(), ReportedError> {
        let generation = self.epoch.advance();
        if let Err(e) = self.api.revert_snapshot(vm, snapshot_id).await {
            return Err(self.fail(Operation::RevertSnapshot, &e));
        }

        info!(%vm, snapshot_id, "snapshot revert accepted");
        let op = PendingOp::new(vm, Intent::RevertSnapshot { id: snapshot_id.to_string() }, generation);
        self.pending.insert(op.clone());
        self.store.update(|s| s.notice = Some(Notice::info("Revert to snapshot initiated")));
        self.schedule_reconcile(op);
        Ok(())
    }

    /// Le snapshot reste affiché jusqu'à ce que l'inventaire confirme sa disparition
    pub async fn delete_snapshot(&self, vm: &str, snapshot_id: &str) -> Result<(), ReportedError> {
        let generation = self.epoch.advance();
        if let Err(e) = self.api.delete_snapshot(vm, snapshot_id).await {
            return Err(self.fail(Operation::DeleteSnapshot, &e));
        }

        info!(%vm, snapshot_id, "snapshot deletion accepted");
        let op = PendingOp::new(vm, Intent::DeleteSnapshot { id: snapshot_id.to_string() }, generation);
        self.pending.insert(op.clone());
        self.store.update(|s| s.notice = Some(Notice::info("Snapshot deletion initiated")));
        self.schedule_reconcile(op);
        Ok(())
    }

    fn fail(&self, operation: Operation, err: &TransportError) -> ReportedError {
        let reported = ErrorReporter::report(operation, err);
        self.store.update(|s| s.notice = Some(Notice::error(reported.message.clone())));
        reported
    }

    fn schedule_reconcile(&self, op: PendingOp) {
        let this = self.clone();
        self.scheduler.spawn_tracked(async move { this.reconcile(op).await });
    }

    async fn reconcile(&self, op: PendingOp) {
        for attempt in 0..self.policy.max_attempts {
            tokio::time::sleep(self.policy.delay_for(attempt)).await;
            if !self.pending.contains(op.id) {
                // déjà confirmé par un poll, ou remplacé par une action plus récente
                return;
            }
            match self.inventory.refresh().await {
                Ok(None) => {
                    self.pending.remove(op.id);
                    return;
                }
                Ok(Some(_)) | Err(_) => {}
            }
            if !self.pending.contains(op.id) {
                debug!(vm = %op.vm, attempt, "reconciliation complete");
                return;
            }
            debug!(vm = %op.vm, attempt, intent = ?op.intent, "state not converged yet");
        }

        let Some(stale) = self.pending.remove(op.id) else { return };
        warn!(
            vm = %stale.vm,
            intent = ?stale.intent,
            attempts = self.policy.max_attempts,
            "server never confirmed operation, accepting server state"
        );
        if let (Intent::Power(_), Some(observed)) = (&stale.intent, stale.observed) {
            self.store.update(|s| {
                if let Some(local) = s.vm_mut(&stale.vm) {
                    local.power_state = observed;
                }
            });
        }
    }
}
