/**
 * ERROR REPORTER - Classification des échecs en catégories visibles
 *
 * RÔLE :
 * Transforme un échec de transport en `ReportedError` : une catégorie
 * (connexion, lecture inventaire, mutation) + un message fixe par opération.
 *
 * FONCTIONNEMENT :
 * - Le détail transport (code HTTP, payload) part dans les logs `tracing`
 * - L'appelant ne reçoit que le message générique
 * - Aucun échec n'est fatal : tout est récupéré au point d'appel
 */

use serde::Serialize;
use tracing::warn;

use crate::models::PowerAction;

/// Échec d'un échange requête/réponse avec le backend
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("backend answered HTTP {status}")]
    Status { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    /// Session establishment or teardown failed
    Connection,
    /// Inventory read failed
    Fetch,
    /// Power or snapshot write failed
    Mutation,
}

/// Opération à l'origine d'un échec, porte le message utilisateur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Disconnect,
    CheckStatus,
    FetchInventory,
    Power(PowerAction),
    CreateSnapshot,
    RevertSnapshot,
    DeleteSnapshot,
}

impl Operation {
    pub fn category(self) -> ErrorCategory {
        match self {
            Operation::Connect | Operation::Disconnect | Operation::CheckStatus => ErrorCategory::Connection,
            Operation::FetchInventory => ErrorCategory::Fetch,
            Operation::Power(_)
            | Operation::CreateSnapshot
            | Operation::RevertSnapshot
            | Operation::DeleteSnapshot => ErrorCategory::Mutation,
        }
    }

    pub fn user_message(self) -> String {
        match self {
            Operation::Connect => {
                "Failed to connect to vCenter. Please check your credentials and try again.".to_string()
            }
            Operation::Disconnect => "Failed to disconnect from vCenter.".to_string(),
            Operation::CheckStatus => "Failed to check vCenter connection status.".to_string(),
            Operation::FetchInventory => "Failed to fetch VMs. Please try again.".to_string(),
            Operation::Power(action) => format!("Failed to power {} VM. Please try again.", action),
            Operation::CreateSnapshot => "Failed to create snapshot. Please try again.".to_string(),
            Operation::RevertSnapshot => "Failed to revert snapshot. Please try again.".to_string(),
            Operation::DeleteSnapshot => "Failed to delete snapshot. Please try again.".to_string(),
        }
    }
}

/// Erreur telle que vue par la couche présentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ReportedError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ReportedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

pub struct ErrorReporter;

impl ErrorReporter {
    /// Classifie un échec transport ; le détail reste dans les logs
    pub fn report(operation: Operation, err: &TransportError) -> ReportedError {
        let reported = ReportedError::new(operation.category(), operation.user_message());
        match err {
            TransportError::Status { status, body } => {
                warn!(?operation, status, body = %body, "backend exchange failed");
            }
            other => {
                warn!(?operation, error = %other, "backend exchange failed");
            }
        }
        reported
    }

    /// Rejet local, aucune requête n'a été émise
    pub fn reject(category: ErrorCategory, message: impl Into<String>) -> ReportedError {
        let reported = ReportedError::new(category, message);
        warn!(?category, message = %reported.message, "action rejected before any request");
        reported
    }
}
