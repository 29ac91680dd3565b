/*!
Transport simulé pour tester le controller sans backend

Remplace `HttpTransport` : chaque requête est enregistrée, et la réponse est
tirée d'un script par (méthode, chemin). Un script peut être une file de
réponses consommées dans l'ordre, ou une réponse par défaut rejouée.
*/

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vcpanel_core::transport::{ApiRequest, ApiResponse, Method, Transport};
use vcpanel_core::TransportError;

/// Réponse scriptée
#[derive(Debug, Clone)]
pub enum StubReply {
    /// Réponse HTTP ; non-2xx devient `TransportError::Status`
    Json { status: u16, body: Value },
    /// Échec réseau (connexion refusée, timeout...)
    Unreachable(String),
}

impl StubReply {
    pub fn ok(body: Value) -> Self {
        StubReply::Json { status: 200, body }
    }

    pub fn status(status: u16, body: Value) -> Self {
        StubReply::Json { status, body }
    }

    pub fn unreachable() -> Self {
        StubReply::Unreachable("connection refused".to_string())
    }
}

#[derive(Debug, Clone)]
struct Scripted {
    reply: StubReply,
    delay: Duration,
}

#[derive(Debug, Default)]
struct Route {
    queue: VecDeque<Scripted>,
    fallback: Option<Scripted>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Clone, Default)]
pub struct StubTransport {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    routes: Arc<Mutex<HashMap<(Method, String), Route>>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Réponse rejouée à chaque appel quand la file est vide
    pub fn on(&self, method: Method, path: &str, reply: StubReply) -> &Self {
        self.on_delayed(method, path, reply, Duration::ZERO)
    }

    pub fn on_delayed(&self, method: Method, path: &str, reply: StubReply, delay: Duration) -> &Self {
        self.script(method, path, |route| route.fallback = Some(Scripted { reply, delay }));
        self
    }

    /// Réponse consommée une seule fois, avant le défaut
    pub fn once(&self, method: Method, path: &str, reply: StubReply) -> &Self {
        self.once_delayed(method, path, reply, Duration::ZERO)
    }

    pub fn once_delayed(&self, method: Method, path: &str, reply: StubReply, delay: Duration) -> &Self {
        self.script(method, path, |route| route.queue.push_back(Scripted { reply, delay }));
        self
    }

    fn script(&self, method: Method, path: &str, edit: impl FnOnce(&mut Route)) {
        let mut routes = self.routes.lock().unwrap();
        edit(routes.entry((method, path.to_string())).or_default());
    }

    fn next_reply(&self, method: Method, path: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock().unwrap();
        let route = routes.get_mut(&(method, path.to_string()))?;
        route.queue.pop_front().or_else(|| route.fallback.clone())
    }

    /// Toutes les requêtes reçues (pour assertions de tests)
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn find_requests(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.find_requests(method, path).len()
    }

    /// Oublie les requêtes enregistrées, garde les scripts
    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn exchange(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let path = request.path();
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            path: path.clone(),
            body: request.body.clone(),
        });
        log::info!("📤 [STUB] {} {}", request.method, path);

        let Some(scripted) = self.next_reply(request.method, &path) else {
            log::warn!("⚠️ [STUB] no script for {} {}", request.method, path);
            return Err(TransportError::Status {
                status: 404,
                body: format!("no stub route for {} {}", request.method, path),
            });
        };

        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }

        match scripted.reply {
            StubReply::Json { status, body } if (200..300).contains(&status) => Ok(ApiResponse { status, body }),
            StubReply::Json { status, body } => Err(TransportError::Status {
                status,
                body: body.to_string(),
            }),
            StubReply::Unreachable(reason) => Err(TransportError::Request(reason)),
        }
    }
}
