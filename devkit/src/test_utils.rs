/*!
Test Harness pour le controller vcpanel

Facilite l'écriture de tests avec:
- Controller branché sur un `StubTransport`
- Session ouverte en une ligne
- Assertions sur les requêtes émises et sur l'état réactif
*/

use crate::fixtures::{self, VmBuilder};
use crate::transport_stub::{StubReply, StubTransport};
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use vcpanel_core::transport::Method;
use vcpanel_core::{AppState, Controller, ControllerConfig};

/// Harness de test complet pour le controller
pub struct TestHarness {
    pub transport: StubTransport,
    pub controller: Controller,
    pub config: ControllerConfig,
}

impl TestHarness {
    /// Harness avec la configuration par défaut (poll 30s, réconciliation 2s)
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        let transport = StubTransport::new();
        let controller = Controller::new(&config, Arc::new(transport.clone()));
        Self { transport, controller, config }
    }

    /// Réponse par défaut de `GET /api/vms`
    pub fn serve_inventory(&self, vms: Vec<VmBuilder>) -> &Self {
        self.transport.on(Method::Get, "/api/vms", StubReply::ok(fixtures::inventory(vms)));
        self
    }

    /// Ouvre une session "vc1"/"admin" avec l'inventaire donné
    pub async fn connected(&self, vms: Vec<VmBuilder>) -> Result<()> {
        self.transport.on(Method::Post, "/api/vcconnect", StubReply::ok(fixtures::connect_success()));
        self.serve_inventory(vms);
        self.controller
            .connect("vc1", "admin", "p")
            .await
            .map_err(|e| anyhow::anyhow!("connect failed: {}", e))?;
        log::info!("🔌 Harness connected");
        Ok(())
    }

    pub fn state(&self) -> AppState {
        self.controller.state()
    }

    /// Attend un état satisfaisant le prédicat (le temps virtuel avance tout seul)
    pub async fn wait_for_state<F>(&self, within: Duration, pred: F) -> Result<AppState>
    where
        F: FnMut(&AppState) -> bool,
    {
        let mut rx = self.controller.subscribe();
        let out = match timeout(within, rx.wait_for(pred)).await {
            Ok(Ok(state)) => Ok(state.clone()),
            Ok(Err(e)) => Err(anyhow::anyhow!("state channel closed: {}", e)),
            Err(_) => {
                log::warn!("⏰ Timeout waiting for state");
                Err(anyhow::anyhow!("no matching state within {:?}", within))
            }
        };
        out
    }

    /// Assert qu'un nombre exact de requêtes a été émis sur une route
    pub fn assert_requests(&self, method: Method, path: &str, expected: usize) -> Result<()> {
        let actual = self.transport.count(method, path);
        if actual != expected {
            anyhow::bail!("{} {}: expected {} requests, got {}", method, path, expected, actual);
        }
        log::info!("✅ {} {}: {} requests as expected", method, path, actual);
        Ok(())
    }

    /// Assert sur le corps de la dernière requête d'une route
    pub fn assert_last_body(&self, method: Method, path: &str, expected: &Value) -> Result<()> {
        let requests = self.transport.find_requests(method, path);
        let Some(last) = requests.last() else {
            anyhow::bail!("no request sent to {} {}", method, path);
        };
        match &last.body {
            Some(body) if body == expected => Ok(()),
            other => anyhow::bail!("{} {}: expected body {}, got {:?}", method, path, expected, other),
        }
    }

    /// Stats sur les requêtes collectées
    pub fn get_stats(&self) -> TestStats {
        let requests = self.transport.requests();
        let mut route_counts = HashMap::new();
        for req in &requests {
            *route_counts.entry(format!("{} {}", req.method, req.path)).or_insert(0) += 1;
        }
        TestStats {
            total_requests: requests.len(),
            route_counts,
        }
    }

    /// Oublie les requêtes déjà émises
    pub fn reset(&self) {
        self.transport.clear();
        log::info!("🧹 Test harness reset");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub total_requests: usize,
    pub route_counts: HashMap<String, usize>,
}

impl TestStats {
    pub fn print(&self) {
        println!("📊 Test Statistics:");
        println!("  Total requests: {}", self.total_requests);
        for (route, count) in &self.route_counts {
            println!("    {}: {}", route, count);
        }
    }
}

/// Macro pour écrire un test en temps virtuel avec un harness prêt
#[macro_export]
macro_rules! controller_test {
    ($name:ident, |$harness:ident| $body:block) => {
        #[tokio::test(start_paused = true)]
        async fn $name() {
            let $harness = $crate::test_utils::TestHarness::new();
            let result: $crate::anyhow::Result<()> = async { $body }.await;
            match result {
                Ok(_) => {
                    $harness.get_stats().print();
                    println!("✅ Test '{}' passed", stringify!($name));
                }
                Err(e) => {
                    eprintln!("❌ Test '{}' failed: {}", stringify!($name), e);
                    panic!("Test failed: {}", e);
                }
            }
        }
    };
}
