/*!
Fixtures JSON au format du backend

Construit les payloads tels que le backend les renvoie (inventaire,
acquittements, statut de session) pour alimenter le `StubTransport`.
*/

use serde_json::{json, Map, Value};

/// Construit un enregistrement VM tel que renvoyé par `GET /api/vms`
#[derive(Debug, Clone)]
pub struct VmBuilder {
    fields: Map<String, Value>,
    snapshots: Vec<Value>,
}

impl VmBuilder {
    pub fn new(name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(name));
        fields.insert("power_state".into(), json!("poweredOff"));
        fields.insert("cpu".into(), json!(2));
        fields.insert("memory".into(), json!(4096));
        fields.insert("guest_os".into(), json!("Ubuntu Linux (64-bit)"));
        Self { fields, snapshots: Vec::new() }
    }

    pub fn powered_on(self) -> Self {
        self.power("poweredOn")
    }

    pub fn powered_off(self) -> Self {
        self.power("poweredOff")
    }

    pub fn suspended(self) -> Self {
        self.power("suspended")
    }

    pub fn power(mut self, state: &str) -> Self {
        self.fields.insert("power_state".into(), json!(state));
        self
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.fields.insert("ip_address".into(), json!(ip));
        self
    }

    /// Ajoute un champ arbitraire (ex: `tools_status`, `networks`)
    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn snapshot(mut self, id: &str, name: &str) -> Self {
        self.snapshots.push(snapshot_json(json!(id), name, ""));
        self
    }

    /// vSphere renvoie des ids numériques
    pub fn numeric_snapshot(mut self, id: i64, name: &str) -> Self {
        self.snapshots.push(snapshot_json(json!(id), name, ""));
        self
    }

    pub fn build(mut self) -> Value {
        self.fields.insert("snapshots".into(), Value::Array(self.snapshots));
        Value::Object(self.fields)
    }
}

fn snapshot_json(id: Value, name: &str, description: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": description,
        "creation_time": chrono::Utc::now().to_rfc3339(),
        "state": "poweredOff"
    })
}

pub fn inventory(vms: Vec<VmBuilder>) -> Value {
    Value::Array(vms.into_iter().map(VmBuilder::build).collect())
}

pub fn connect_success() -> Value {
    json!({"status": "success", "message": "Connected to vCenter"})
}

pub fn status_connected(host: &str) -> Value {
    json!({"status": "connected", "host": host})
}

pub fn status_disconnected() -> Value {
    json!({"status": "disconnected"})
}

pub fn ack(message: &str) -> Value {
    json!({"status": "success", "message": message})
}

pub fn ack_error(message: &str) -> Value {
    json!({"status": "error", "message": message})
}
