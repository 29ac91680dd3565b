//! Typed inventory entities handed to the presentation layer.
//!
//! Wire shapes live in `api`; everything here has already been validated.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PowerState {
    #[serde(rename = "poweredOn")]
    PoweredOn,
    #[serde(rename = "poweredOff")]
    PoweredOff,
    #[serde(rename = "suspended")]
    Suspended,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::PoweredOn => "poweredOn",
            PowerState::PoweredOff => "poweredOff",
            PowerState::Suspended => "suspended",
        }
    }

    /// Action qui inverse l'état courant (suspended repart en "on")
    pub fn toggle_action(self) -> PowerAction {
        match self {
            PowerState::PoweredOn => PowerAction::Off,
            PowerState::PoweredOff | PowerState::Suspended => PowerAction::On,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action token sent in the body of `POST /api/vm/{name}/power`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    On,
    Off,
}

impl PowerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerAction::On => "on",
            PowerAction::Off => "off",
        }
    }

    pub fn target_state(self) -> PowerState {
        match self {
            PowerAction::On => PowerState::PoweredOn,
            PowerAction::Off => PowerState::PoweredOff,
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub creation_time: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub name: String,
    pub accessible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatastoreInfo {
    pub name: String,
    pub capacity: Option<u64>,
    pub free_space: Option<u64>,
}

/// Informations descriptives remontées par le backend, toutes optionnelles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VmDetails {
    pub cpu: Option<u32>,
    pub memory_mb: Option<u64>,
    pub guest_os: Option<String>,
    pub ip_address: Option<String>,
    pub tools_status: Option<String>,
    pub tools_version: Option<String>,
    pub uuid: Option<String>,
    pub networks: Vec<NetworkInfo>,
    pub datastores: Vec<DatastoreInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualMachine {
    pub name: String,
    pub power_state: PowerState,
    pub snapshots: Vec<Snapshot>,
    pub details: VmDetails,
}

impl VirtualMachine {
    pub fn snapshot(&self, id: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.id == id)
    }

    pub fn snapshot_ids(&self) -> Vec<String> {
        self.snapshots.iter().map(|s| s.id.clone()).collect()
    }
}

/// Vue de la session courante. N'existe que tant que `connected` est vrai.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub host: Option<String>,
    pub user: Option<String>,
    pub connected: bool,
}

/// Connection details. The password is moved into the connect request and
/// never kept afterwards.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty() && !self.user.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
