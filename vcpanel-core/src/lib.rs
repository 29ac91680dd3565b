//! vcpanel core - client-side controller for a vCenter management backend
//!
//! - Session lifecycle (connect / disconnect / startup status check)
//! - Inventory cache refreshed on demand and every poll interval
//! - Optimistic power and snapshot mutations reconciled against the server
//! - Reactive `AppState` exposed through a `watch` channel

pub mod api;
pub mod config;
pub mod controller;
pub mod errors;
pub mod inventory;
pub mod models;
pub mod mutations;
pub mod pending;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod transport;

pub use config::{load_config, ControllerConfig, ReconcileConf};
pub use controller::Controller;
pub use errors::{ErrorCategory, ReportedError, TransportError};
pub use models::{PowerAction, PowerState, Snapshot, VirtualMachine};
pub use state::{AppState, DetailTab, Notice, NoticeLevel};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
