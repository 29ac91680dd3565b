/**
 * VCPANEL WATCH - Observateur en ligne de commande
 *
 * RÔLE : Démarre un Controller contre le backend configuré, reprend la
 * session existante ou se connecte via VCENTER_HOST / VCENTER_USER /
 * VCENTER_PASSWORD, puis journalise chaque changement d'état.
 *
 * UTILITÉ : Vérifier le backend et le polling sans interface graphique.
 */

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vcpanel_core::{load_config, AppState, Controller, PowerState};

fn summarize(state: &AppState) {
    let powered_on = state.vms.iter().filter(|vm| vm.power_state == PowerState::PoweredOn).count();
    info!(
        connected = state.connected,
        host = state.host.as_deref().unwrap_or("-"),
        vms = state.vms.len(),
        powered_on,
        loading = state.loading,
        "state changed"
    );
    if let Some(err) = &state.error {
        warn!(category = ?err.category, "{}", err.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vcpanel_core=info,vcpanel_watch=info")),
        )
        .init();

    let cfg = load_config().await;
    let controller = Controller::with_http(&cfg).context("failed to build HTTP transport")?;

    let session = match controller.start().await {
        Ok(session) => session,
        Err(e) => {
            warn!("status check failed: {}", e);
            controller.state().session()
        }
    };

    if !session.connected {
        let host = std::env::var("VCENTER_HOST").unwrap_or_default();
        let user = std::env::var("VCENTER_USER").unwrap_or_default();
        let password = std::env::var("VCENTER_PASSWORD").unwrap_or_default();
        if host.is_empty() {
            info!("no active session and VCENTER_HOST unset, waiting for an external connect");
        } else if let Err(e) = controller.connect(&host, &user, &password).await {
            error!("connect to {} failed: {}", host, e);
        }
    }

    let mut rx = controller.subscribe();
    summarize(&rx.borrow_and_update());

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                summarize(&state);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received");
                break;
            }
        }
    }

    controller.shutdown();
    Ok(())
}
