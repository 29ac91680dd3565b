use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::errors::ReportedError;
use crate::models::{Session, VirtualMachine};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailTab {
    #[default]
    General,
    Snapshots,
    Networks,
    Datastores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Message qui attend un acquittement explicite de l'utilisateur
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDraft {
    pub name: String,
    pub description: String,
}

/// État réactif exposé à la couche présentation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppState {
    pub vms: Vec<VirtualMachine>,
    pub connected: bool,
    pub host: Option<String>,
    pub user: Option<String>,
    pub loading: bool,
    pub error: Option<ReportedError>,
    pub notice: Option<Notice>,
    pub selected_vm: Option<String>,
    pub snapshot_draft: SnapshotDraft,
    pub selected_tab: DetailTab,
}

impl AppState {
    pub fn vm(&self, name: &str) -> Option<&VirtualMachine> {
        self.vms.iter().find(|vm| vm.name == name)
    }

    pub fn vm_mut(&mut self, name: &str) -> Option<&mut VirtualMachine> {
        self.vms.iter_mut().find(|vm| vm.name == name)
    }

    pub fn selected(&self) -> Option<&VirtualMachine> {
        self.selected_vm.as_deref().and_then(|name| self.vm(name))
    }

    pub fn session(&self) -> Session {
        Session {
            host: self.host.clone(),
            user: self.user.clone(),
            connected: self.connected,
        }
    }
}

/// Single owner of `AppState`. Writers go through `update`, observers
/// through `subscribe`.
#[derive(Clone)]
pub struct Store {
    tx: Arc<watch::Sender<AppState>>,
}

impl Store {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AppState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> AppState {
        self.tx.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut out = None;
        self.tx.send_modify(|state| out = Some(f(state)));
        // send_modify appelle toujours la closure
        out.expect("send_modify runs the closure exactly once")
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
