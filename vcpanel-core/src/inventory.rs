//! Inventory refresh: the only full writer of the VM collection.

use tracing::{debug, info};

use crate::api::VcApi;
use crate::errors::{ErrorReporter, Operation, ReportedError};
use crate::models::VirtualMachine;
use crate::pending::{Epoch, PendingSet};
use crate::state::Store;

#[derive(Clone)]
pub struct InventoryPoller {
    api: VcApi,
    store: Store,
    pending: PendingSet,
    epoch: Epoch,
}

impl InventoryPoller {
    pub fn new(api: VcApi, store: Store, pending: PendingSet, epoch: Epoch) -> Self {
        Self { api, store, pending, epoch }
    }

    /// Récupère l'inventaire complet et remplace la collection locale.
    ///
    /// `Ok(None)` quand aucune session n'est active : aucune requête n'est
    /// émise. Les appels concurrents ne sont pas dédupliqués, la dernière
    /// réponse arrivée gagne.
    pub async fn refresh(&self) -> Result<Option<Vec<VirtualMachine>>, ReportedError> {
        if !self.store.read(|s| s.connected) {
            debug!("refresh skipped, not connected");
            return Ok(None);
        }

        let issued = self.epoch.advance();
        self.store.update(|s| {
            s.loading = true;
            s.error = None;
        });

        match self.api.list_vms().await {
            Ok(mut vms) => {
                let settled = self.pending.apply_to(&mut vms, issued);
                for op in &settled {
                    info!(vm = %op.vm, intent = ?op.intent, "pending operation confirmed by inventory");
                }
                let pending = &self.pending;
                let applied = self.store.update(|s| {
                    s.loading = false;
                    // une réponse arrivée après la déconnexion ne ressuscite pas le cache
                    if s.connected {
                        // fetch antérieur à une écriture optimiste : l'alimentation affichée reste
                        for vm in vms.iter_mut() {
                            if pending.predates_power_write(&vm.name, issued) {
                                if let Some(local) = s.vm(&vm.name) {
                                    vm.power_state = local.power_state;
                                }
                            }
                        }
                        s.vms = vms.clone();
                        true
                    } else {
                        false
                    }
                });
                if !applied {
                    debug!("inventory response discarded, session closed meanwhile");
                    return Ok(None);
                }
                debug!(count = vms.len(), "inventory replaced");
                Ok(Some(vms))
            }
            Err(e) => {
                let reported = ErrorReporter::report(Operation::FetchInventory, &e);
                self.store.update(|s| {
                    s.loading = false;
                    if s.connected {
                        s.error = Some(reported.clone());
                    }
                });
                Err(reported)
            }
        }
    }
}
