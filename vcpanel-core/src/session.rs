/**
 * SESSION MANAGER - Cycle de vie de la connexion au vCenter
 *
 * RÔLE :
 * Disconnected → (connect OK) → Connected → (disconnect / status KO) → Disconnected.
 * Connected est ré-entrant : reconnecter confirme simplement l'état.
 *
 * FONCTIONNEMENT :
 * - connect : rien n'est committé tant que le backend n'a pas répondu "success"
 * - disconnect : purge immédiate du cache VM + arrêt du polling et des réconciliations
 * - check_status : appelé au démarrage, l'absence de session n'est pas une erreur
 */

use tracing::info;

use crate::api::{RemoteStatus, VcApi};
use crate::errors::{ErrorCategory, ErrorReporter, Operation, ReportedError};
use crate::inventory::InventoryPoller;
use crate::models::{Credentials, Session};
use crate::pending::PendingSet;
use crate::scheduler::Scheduler;
use crate::state::Store;

#[derive(Clone)]
pub struct SessionManager {
    api: VcApi,
    store: Store,
    inventory: InventoryPoller,
    scheduler: Scheduler,
    pending: PendingSet,
}

impl SessionManager {
    pub fn new(api: VcApi, store: Store, inventory: InventoryPoller, scheduler: Scheduler, pending: PendingSet) -> Self {
        Self { api, store, inventory, scheduler, pending }
    }

    pub async fn connect(&self, credentials: Credentials) -> Result<(), ReportedError> {
        if !credentials.is_complete() {
            let reported = ErrorReporter::reject(ErrorCategory::Connection, "Missing connection details");
            self.store.update(|s| s.error = Some(reported.clone()));
            return Err(reported);
        }

        let host = credentials.host.clone();
        let user = credentials.user.clone();
        if let Err(e) = self.api.connect(credentials).await {
            let reported = ErrorReporter::report(Operation::Connect, &e);
            self.store.update(|s| s.error = Some(reported.clone()));
            return Err(reported);
        }

        info!(%host, %user, "connected to vCenter");
        self.store.update(|s| {
            s.connected = true;
            s.host = Some(host);
            s.user = Some(user);
            s.error = None;
        });
        self.on_session_established().await;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ReportedError> {
        if let Err(e) = self.api.disconnect().await {
            let reported = ErrorReporter::report(Operation::Disconnect, &e);
            self.store.update(|s| s.error = Some(reported.clone()));
            return Err(reported);
        }

        self.tear_down();
        self.store.update(|s| s.error = None);
        info!("disconnected from vCenter");
        Ok(())
    }

    pub async fn check_status(&self) -> Result<Session, ReportedError> {
        match self.api.status().await {
            Ok(RemoteStatus::Connected { host }) => {
                info!(%host, "existing vCenter session found");
                self.store.update(|s| {
                    s.connected = true;
                    s.host = Some(host);
                    s.error = None;
                });
                self.on_session_established().await;
            }
            Ok(RemoteStatus::Disconnected) => {
                info!("no active vCenter session");
                self.tear_down();
            }
            Err(e) => {
                let reported = ErrorReporter::report(Operation::CheckStatus, &e);
                self.tear_down();
                self.store.update(|s| s.error = Some(reported.clone()));
                return Err(reported);
            }
        }
        Ok(self.store.read(|s| s.session()))
    }

    async fn on_session_established(&self) {
        self.scheduler.start_polling(self.inventory.clone());
        // un échec de fetch est déjà dans l'état, la session reste valide
        let _ = self.inventory.refresh().await;
    }

    fn tear_down(&self) {
        self.scheduler.cancel_all();
        self.pending.clear();
        self.store.update(|s| {
            s.connected = false;
            s.host = None;
            s.user = None;
            s.loading = false;
            s.vms.clear();
            s.selected_vm = None;
        });
    }
}
