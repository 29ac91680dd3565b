//! Point d'entrée unique : possède l'état, les tâches de fond et les
//! services. Aucune variable globale, un `Controller` par vCenter piloté.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::api::VcApi;
use crate::config::ControllerConfig;
use crate::errors::{ErrorCategory, ErrorReporter, ReportedError, TransportError};
use crate::inventory::InventoryPoller;
use crate::models::{Credentials, PowerAction, Session, VirtualMachine};
use crate::mutations::{MutationCoordinator, ReconcilePolicy};
use crate::pending::{Epoch, PendingSet};
use crate::scheduler::Scheduler;
use crate::session::SessionManager;
use crate::state::{AppState, DetailTab, Notice, SnapshotDraft, Store};
use crate::transport::{HttpTransport, Transport};

pub struct Controller {
    store: Store,
    scheduler: Scheduler,
    pending: PendingSet,
    session: SessionManager,
    inventory: InventoryPoller,
    mutations: MutationCoordinator,
}

impl Controller {
    pub fn new(config: &ControllerConfig, transport: Arc<dyn Transport>) -> Self {
        let api = VcApi::new(transport);
        let store = Store::new();
        let pending = PendingSet::new();
        let epoch = Epoch::default();
        let scheduler = Scheduler::new(config.poll_interval());

        let inventory = InventoryPoller::new(api.clone(), store.clone(), pending.clone(), epoch.clone());
        let session = SessionManager::new(
            api.clone(),
            store.clone(),
            inventory.clone(),
            scheduler.clone(),
            pending.clone(),
        );
        let mutations = MutationCoordinator::new(
            api,
            store.clone(),
            inventory.clone(),
            pending.clone(),
            scheduler.clone(),
            epoch,
            ReconcilePolicy::from(&config.reconcile),
        );

        Self { store, scheduler, pending, session, inventory, mutations }
    }

    pub fn with_http(config: &ControllerConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config.base_url, config.request_timeout())?;
        info!(base_url = %config.base_url, "using HTTP transport");
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn state(&self) -> AppState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.store.subscribe()
    }

    /// Vérifie si le backend a déjà une session ouverte
    pub async fn start(&self) -> Result<Session, ReportedError> {
        self.session.check_status().await
    }

    pub async fn connect(&self, host: &str, user: &str, password: &str) -> Result<(), ReportedError> {
        self.session.connect(Credentials::new(host, user, password)).await
    }

    pub async fn disconnect(&self) -> Result<(), ReportedError> {
        self.session.disconnect().await
    }

    pub async fn refresh(&self) -> Result<Option<Vec<VirtualMachine>>, ReportedError> {
        self.inventory.refresh().await
    }

    pub async fn toggle_power(&self, vm_name: &str) -> Result<PowerAction, ReportedError> {
        let vm = self
            .store
            .read(|s| s.vm(vm_name).cloned())
            .ok_or_else(|| self.reject(format!("Unknown VM: {}", vm_name)))?;
        self.mutations.toggle_power(&vm).await
    }

    pub fn select_vm(&self, vm_name: Option<&str>) {
        self.store.update(|s| {
            s.selected_vm = vm_name.map(str::to_string);
            s.selected_tab = DetailTab::General;
        });
    }

    pub fn selected_vm(&self) -> Option<VirtualMachine> {
        self.store.read(|s| s.selected().cloned())
    }

    pub fn set_snapshot_draft(&self, name: &str, description: &str) {
        self.store.update(|s| {
            s.snapshot_draft = SnapshotDraft {
                name: name.to_string(),
                description: description.to_string(),
            }
        });
    }

    pub fn select_tab(&self, tab: DetailTab) {
        self.store.update(|s| s.selected_tab = tab);
    }

    /// Ferme la notice bloquante courante
    pub fn acknowledge(&self) {
        self.store.update(|s| s.notice = None);
    }

    /// Crée un snapshot du VM sélectionné à partir du brouillon
    pub async fn create_snapshot(&self) -> Result<String, ReportedError> {
        let vm = self.require_selection()?;
        let draft = self.store.read(|s| s.snapshot_draft.clone());
        self.mutations.create_snapshot(&vm.name, &draft.name, &draft.description).await
    }

    pub async fn revert_snapshot(&self, snapshot_id: &str) -> Result<(), ReportedError> {
        let vm = self.require_selection()?;
        self.mutations.revert_snapshot(&vm.name, snapshot_id).await
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), ReportedError> {
        let vm = self.require_selection()?;
        self.mutations.delete_snapshot(&vm.name, snapshot_id).await
    }

    pub fn pending_operations(&self) -> usize {
        self.pending.len()
    }

    pub fn is_polling(&self) -> bool {
        self.scheduler.is_polling()
    }

    pub fn shutdown(&self) {
        info!("controller shutting down");
        self.scheduler.cancel_all();
        self.store.update(|s| s.loading = false);
    }

    fn require_selection(&self) -> Result<VirtualMachine, ReportedError> {
        self.selected_vm().ok_or_else(|| self.reject("No VM selected"))
    }

    fn reject(&self, message: impl Into<String>) -> ReportedError {
        let reported = ErrorReporter::reject(ErrorCategory::Mutation, message);
        self.store.update(|s| s.notice = Some(Notice::error(reported.message.clone())));
        reported
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        debug!("controller dropped, cancelling background tasks");
        self.scheduler.cancel_all();
    }
}
