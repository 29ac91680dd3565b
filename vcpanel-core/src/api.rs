//! Typed endpoints of the vCenter management backend.
//!
//! Every response is decoded into an explicit schema here, at the transport
//! boundary, then converted to the entities of `models`.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::errors::TransportError;
use crate::models::{
    Credentials, DatastoreInfo, NetworkInfo, PowerAction, PowerState, Snapshot, VirtualMachine, VmDetails,
};
use crate::transport::{ApiRequest, Method, Transport};

#[derive(Debug, Deserialize)]
struct ConnectReply {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    status: String,
    #[serde(default)]
    host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Ack {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// vSphere expose les ids de snapshot en entier, on accepte les deux formes
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(id: RawId) -> Self {
        match id {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotRecord {
    id: RawId,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    creation_time: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NetworkRecord {
    name: String,
    #[serde(default)]
    accessible: bool,
}

#[derive(Debug, Deserialize)]
struct DatastoreRecord {
    name: String,
    #[serde(default)]
    capacity: Option<u64>,
    #[serde(default, rename = "freeSpace")]
    free_space: Option<u64>,
}

#[derive(Debug, Deserialize)]
enum PowerStateRecord {
    #[serde(rename = "poweredOn")]
    PoweredOn,
    #[serde(rename = "poweredOff")]
    PoweredOff,
    #[serde(rename = "suspended")]
    Suspended,
}

#[derive(Debug, Deserialize)]
struct VmRecord {
    name: String,
    power_state: PowerStateRecord,
    #[serde(default)]
    snapshots: Vec<SnapshotRecord>,
    #[serde(default)]
    cpu: Option<u32>,
    #[serde(default)]
    memory: Option<u64>,
    #[serde(default)]
    guest_os: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    tools_status: Option<String>,
    #[serde(default)]
    tools_version: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    networks: Vec<NetworkRecord>,
    #[serde(default)]
    datastores: Vec<DatastoreRecord>,
}

impl From<VmRecord> for VirtualMachine {
    fn from(rec: VmRecord) -> Self {
        let power_state = match rec.power_state {
            PowerStateRecord::PoweredOn => PowerState::PoweredOn,
            PowerStateRecord::PoweredOff => PowerState::PoweredOff,
            PowerStateRecord::Suspended => PowerState::Suspended,
        };
        VirtualMachine {
            name: rec.name,
            power_state,
            snapshots: rec
                .snapshots
                .into_iter()
                .map(|s| Snapshot {
                    id: s.id.into(),
                    name: s.name,
                    description: s.description.unwrap_or_default(),
                    creation_time: s.creation_time,
                    state: s.state,
                })
                .collect(),
            details: VmDetails {
                cpu: rec.cpu,
                memory_mb: rec.memory,
                guest_os: rec.guest_os,
                ip_address: rec.ip_address,
                tools_status: rec.tools_status,
                tools_version: rec.tools_version,
                uuid: rec.uuid,
                networks: rec
                    .networks
                    .into_iter()
                    .map(|n| NetworkInfo { name: n.name, accessible: n.accessible })
                    .collect(),
                datastores: rec
                    .datastores
                    .into_iter()
                    .map(|d| DatastoreInfo { name: d.name, capacity: d.capacity, free_space: d.free_space })
                    .collect(),
            },
        }
    }
}

/// Session state as reported by `GET /api/vcstatus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Connected { host: String },
    Disconnected,
}

/// Client typé au-dessus d'un `Transport`
#[derive(Clone)]
pub struct VcApi {
    transport: Arc<dyn Transport>,
}

impl VcApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call(&self, request: ApiRequest) -> Result<Value, TransportError> {
        Ok(self.transport.exchange(request).await?.body)
    }

    /// Any 2xx body counts, unless it carries `status: "error"`.
    async fn acknowledged(&self, request: ApiRequest) -> Result<(), TransportError> {
        let body = self.call(request).await?;
        let ack: Ack = if body.is_null() {
            Ack::default()
        } else {
            serde_json::from_value(body)?
        };
        match ack.status.as_deref() {
            Some("error") => Err(TransportError::Rejected(
                ack.message.unwrap_or_else(|| "unspecified error".to_string()),
            )),
            _ => Ok(()),
        }
    }

    pub async fn connect(&self, credentials: Credentials) -> Result<(), TransportError> {
        let body = serde_json::to_value(&credentials)?;
        drop(credentials);
        let reply: ConnectReply =
            serde_json::from_value(self.call(ApiRequest::new(Method::Post, ["api", "vcconnect"]).with_body(body)).await?)?;
        if reply.status == "success" {
            Ok(())
        } else {
            Err(TransportError::Rejected(
                reply.message.unwrap_or_else(|| format!("connect answered status {}", reply.status)),
            ))
        }
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.acknowledged(ApiRequest::new(Method::Post, ["api", "vcdisconnect"])).await
    }

    pub async fn status(&self) -> Result<RemoteStatus, TransportError> {
        let reply: StatusReply = serde_json::from_value(self.call(ApiRequest::new(Method::Get, ["api", "vcstatus"])).await?)?;
        match (reply.status.as_str(), reply.host) {
            ("connected", Some(host)) => Ok(RemoteStatus::Connected { host }),
            ("connected", None) => Err(TransportError::Rejected("connected status without host".to_string())),
            _ => Ok(RemoteStatus::Disconnected),
        }
    }

    pub async fn list_vms(&self) -> Result<Vec<VirtualMachine>, TransportError> {
        let records: Vec<VmRecord> = serde_json::from_value(self.call(ApiRequest::new(Method::Get, ["api", "vms"])).await?)?;
        Ok(records.into_iter().map(VirtualMachine::from).collect())
    }

    pub async fn power(&self, vm: &str, action: PowerAction) -> Result<(), TransportError> {
        let request = ApiRequest::new(Method::Post, ["api", "vm", vm, "power"]).with_body(json!({ "action": action }));
        self.acknowledged(request).await
    }

    pub async fn create_snapshot(&self, vm: &str, name: &str, description: &str) -> Result<(), TransportError> {
        let request = ApiRequest::new(Method::Post, ["api", "vm", vm, "snapshot"])
            .with_body(json!({ "name": name, "description": description }));
        self.acknowledged(request).await
    }

    pub async fn revert_snapshot(&self, vm: &str, snapshot_id: &str) -> Result<(), TransportError> {
        self.acknowledged(ApiRequest::new(Method::Post, ["api", "vm", vm, "snapshot", snapshot_id, "revert"]))
            .await
    }

    pub async fn delete_snapshot(&self, vm: &str, snapshot_id: &str) -> Result<(), TransportError> {
        self.acknowledged(ApiRequest::new(Method::Delete, ["api", "vm", vm, "snapshot", snapshot_id]))
            .await
    }
}
