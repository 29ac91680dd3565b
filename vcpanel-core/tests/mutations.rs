//! Optimistic power changes, snapshot actions and their reconciliation.

use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use vcpanel_core::transport::Method;
use vcpanel_core::{ErrorCategory, NoticeLevel, PowerAction, PowerState};
use vcpanel_devkit::fixtures::{self, VmBuilder};
use vcpanel_devkit::{StubReply, TestHarness};

const POWER: &str = "/api/vm/web-01/power";

fn power_of(h: &TestHarness, name: &str) -> Option<PowerState> {
    h.state().vm(name).map(|vm| vm.power_state)
}

async fn web_on() -> TestHarness {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("web-01").powered_on().snapshot("snap-1", "base")])
        .await
        .unwrap();
    h.transport.on(Method::Post, POWER, StubReply::ok(fixtures::ack("Power operation started")));
    h.reset();
    h
}

#[tokio::test(start_paused = true)]
async fn test_toggle_power_is_optimistic() {
    let h = web_on().await;
    h.transport.once_delayed(
        Method::Post,
        POWER,
        StubReply::ok(fixtures::ack("Power operation started")),
        Duration::from_secs(1),
    );

    let (action, during) = tokio::join!(h.controller.toggle_power("web-01"), async {
        sleep(Duration::from_millis(200)).await;
        power_of(&h, "web-01")
    });
    assert_eq!(action.unwrap(), PowerAction::Off);
    assert_eq!(during, Some(PowerState::PoweredOff));
    h.assert_requests(Method::Post, POWER, 1).unwrap();
    h.assert_last_body(Method::Post, POWER, &json!({"action": "off"})).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconciliation_refresh_after_delay() {
    let h = web_on().await;
    h.controller.toggle_power("web-01").await.unwrap();
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOff));
    assert_eq!(h.controller.pending_operations(), 1);

    h.serve_inventory(vec![VmBuilder::new("web-01").powered_off()]);
    sleep(Duration::from_millis(1900)).await;
    h.assert_requests(Method::Get, "/api/vms", 0).unwrap();
    sleep(Duration::from_millis(200)).await;
    h.assert_requests(Method::Get, "/api/vms", 1).unwrap();

    assert_eq!(h.controller.pending_operations(), 0);
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOff));

    // confirmé : plus de tentative avant le prochain poll
    sleep(Duration::from_secs(20)).await;
    h.assert_requests(Method::Get, "/api/vms", 1).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_suspended_vm_powers_on() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("web-01").suspended()]).await.unwrap();
    h.transport.on(Method::Post, POWER, StubReply::ok(fixtures::ack("ok")));

    assert_eq!(h.controller.toggle_power("web-01").await.unwrap(), PowerAction::On);
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOn));
    h.assert_last_body(Method::Post, POWER, &json!({"action": "on"})).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stale_poll_does_not_regress_optimistic_state() {
    let h = web_on().await;
    // fetch émis avant le toggle, résolu après, serveur encore allumé
    h.transport.once_delayed(
        Method::Get,
        "/api/vms",
        StubReply::ok(fixtures::inventory(vec![VmBuilder::new("web-01").powered_on()])),
        Duration::from_secs(3),
    );

    let (stale, toggled) = tokio::join!(h.controller.refresh(), async {
        sleep(Duration::from_secs(1)).await;
        h.controller.toggle_power("web-01").await
    });
    stale.unwrap();
    toggled.unwrap();
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOff));
    assert_eq!(h.controller.pending_operations(), 1);

    h.serve_inventory(vec![VmBuilder::new("web-01").powered_off()]);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.controller.pending_operations(), 0);
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOff));
}

#[tokio::test(start_paused = true)]
async fn test_stale_fetch_after_confirmation_keeps_power() {
    let h = web_on().await;
    // fetch lent émis avant le toggle, serveur encore allumé
    h.transport.once_delayed(
        Method::Get,
        "/api/vms",
        StubReply::ok(fixtures::inventory(vec![VmBuilder::new("web-01").powered_on()])),
        Duration::from_secs(5),
    );

    let (stale, confirmed) = tokio::join!(h.controller.refresh(), async {
        sleep(Duration::from_secs(1)).await;
        h.controller.toggle_power("web-01").await.unwrap();
        // un fetch plus récent confirme et lève le marqueur
        h.serve_inventory(vec![VmBuilder::new("web-01").powered_off()]);
        h.controller.refresh().await.unwrap();
        (power_of(&h, "web-01"), h.controller.pending_operations())
    });
    assert_eq!(confirmed, (Some(PowerState::PoweredOff), 0));

    assert!(stale.unwrap().is_some());
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOff));
}

#[tokio::test(start_paused = true)]
async fn test_outstanding_power_survives_fresh_fetch() {
    let h = web_on().await;
    h.controller.toggle_power("web-01").await.unwrap();

    // vSphere n'a pas encore appliqué : l'état optimiste reste affiché
    h.controller.refresh().await.unwrap();
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOff));
    assert_eq!(h.controller.pending_operations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_then_accepts_server_state() {
    let h = web_on().await;
    h.controller.toggle_power("web-01").await.unwrap();

    // tentatives à 2s, 6s puis 14s (2 + 4 + 8)
    sleep(Duration::from_millis(2500)).await;
    h.assert_requests(Method::Get, "/api/vms", 1).unwrap();
    sleep(Duration::from_secs(4)).await;
    h.assert_requests(Method::Get, "/api/vms", 2).unwrap();
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOff));

    sleep(Duration::from_secs(8)).await;
    h.assert_requests(Method::Get, "/api/vms", 3).unwrap();
    assert_eq!(h.controller.pending_operations(), 0);
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOn));
}

#[tokio::test(start_paused = true)]
async fn test_power_failure_surfaces_notice_without_refresh() {
    let h = web_on().await;
    h.transport
        .on(Method::Post, POWER, StubReply::status(500, json!({"error": "InvalidPowerState"})));

    let err = h.controller.toggle_power("web-01").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Mutation);
    assert_eq!(err.message, "Failed to power off VM. Please try again.");

    let state = h.state();
    let notice = state.notice.clone().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.message, err.message);
    // pas de rollback
    assert_eq!(power_of(&h, "web-01"), Some(PowerState::PoweredOff));
    assert_eq!(h.controller.pending_operations(), 0);

    sleep(Duration::from_secs(10)).await;
    h.assert_requests(Method::Get, "/api/vms", 0).unwrap();
    h.assert_requests(Method::Post, POWER, 1).unwrap();

    h.controller.acknowledge();
    assert_eq!(h.state().notice, None);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_ack_is_a_failure() {
    let h = web_on().await;
    h.transport
        .on(Method::Post, POWER, StubReply::ok(fixtures::ack_error("VM is locked")));

    let err = h.controller.toggle_power("web-01").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Mutation);
    assert!(!err.message.contains("locked"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_vm_is_rejected_locally() {
    let h = web_on().await;
    let err = h.controller.toggle_power("nope").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Mutation);
    assert!(h.transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_snapshot_success() {
    let h = web_on().await;
    h.controller.select_vm(Some("web-01"));
    h.transport.on(
        Method::Delete,
        "/api/vm/web-01/snapshot/snap-1",
        StubReply::ok(fixtures::ack("Snapshot deletion started")),
    );

    h.controller.delete_snapshot("snap-1").await.unwrap();
    h.assert_requests(Method::Delete, "/api/vm/web-01/snapshot/snap-1", 1).unwrap();

    let state = h.state();
    assert!(state.vm("web-01").unwrap().snapshot("snap-1").is_some());
    assert_eq!(state.notice.as_ref().unwrap().message, "Snapshot deletion initiated");
    h.assert_requests(Method::Get, "/api/vms", 0).unwrap();

    h.serve_inventory(vec![VmBuilder::new("web-01").powered_on()]);
    sleep(Duration::from_millis(2100)).await;
    h.assert_requests(Method::Get, "/api/vms", 1).unwrap();
    assert!(h.state().vm("web-01").unwrap().snapshots.is_empty());
    assert_eq!(h.controller.pending_operations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete_snapshot_failure() {
    let h = web_on().await;
    h.controller.select_vm(Some("web-01"));
    h.transport.on(
        Method::Delete,
        "/api/vm/web-01/snapshot/snap-1",
        StubReply::status(500, json!({"error": "snapshot busy"})),
    );

    let err = h.controller.delete_snapshot("snap-1").await.unwrap_err();
    assert_eq!(err.message, "Failed to delete snapshot. Please try again.");
    assert_eq!(h.state().notice.unwrap().level, NoticeLevel::Error);

    sleep(Duration::from_secs(10)).await;
    h.assert_requests(Method::Get, "/api/vms", 0).unwrap();
    assert_eq!(h.controller.pending_operations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_create_snapshot_from_draft() {
    let h = web_on().await;
    h.controller.select_vm(Some("web-01"));
    h.controller.set_snapshot_draft("nightly", "before patch");
    h.transport.on(
        Method::Post,
        "/api/vm/web-01/snapshot",
        StubReply::ok(fixtures::ack("Snapshot creation started")),
    );

    let name = h.controller.create_snapshot().await.unwrap();
    assert_eq!(name, "nightly");
    h.assert_last_body(
        Method::Post,
        "/api/vm/web-01/snapshot",
        &json!({"name": "nightly", "description": "before patch"}),
    )
    .unwrap();

    let state = h.state();
    assert_eq!(state.snapshot_draft.name, "");
    assert_eq!(state.snapshot_draft.description, "");
    assert_eq!(state.notice.as_ref().unwrap().message, "Snapshot creation initiated");
    // rien de spéculatif côté local
    assert_eq!(state.vm("web-01").unwrap().snapshots.len(), 1);

    h.serve_inventory(vec![VmBuilder::new("web-01")
        .powered_on()
        .snapshot("snap-1", "base")
        .numeric_snapshot(7, "nightly")]);
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.controller.pending_operations(), 0);
    assert_eq!(h.state().vm("web-01").unwrap().snapshots[1].id, "7");
}

#[tokio::test(start_paused = true)]
async fn test_create_snapshot_default_name() {
    let h = web_on().await;
    h.controller.select_vm(Some("web-01"));
    h.transport.on(Method::Post, "/api/vm/web-01/snapshot", StubReply::ok(fixtures::ack("ok")));

    let name = h.controller.create_snapshot().await.unwrap();
    assert!(name.starts_with("Snapshot-"));
    let sent = h.transport.find_requests(Method::Post, "/api/vm/web-01/snapshot");
    assert_eq!(sent[0].body.as_ref().unwrap()["name"], json!(name));
}

#[tokio::test(start_paused = true)]
async fn test_create_snapshot_failure_keeps_draft() {
    let h = web_on().await;
    h.controller.select_vm(Some("web-01"));
    h.controller.set_snapshot_draft("nightly", "");
    h.transport.on(Method::Post, "/api/vm/web-01/snapshot", StubReply::unreachable());

    let err = h.controller.create_snapshot().await.unwrap_err();
    assert_eq!(err.message, "Failed to create snapshot. Please try again.");
    assert_eq!(h.state().snapshot_draft.name, "nightly");
}

#[tokio::test(start_paused = true)]
async fn test_revert_snapshot() {
    let h = web_on().await;
    h.controller.select_vm(Some("web-01"));
    h.transport.on(
        Method::Post,
        "/api/vm/web-01/snapshot/snap-1/revert",
        StubReply::ok(fixtures::ack("Revert started")),
    );

    h.controller.revert_snapshot("snap-1").await.unwrap();
    h.assert_requests(Method::Post, "/api/vm/web-01/snapshot/snap-1/revert", 1).unwrap();
    assert_eq!(h.state().notice.unwrap().message, "Revert to snapshot initiated");

    sleep(Duration::from_millis(2100)).await;
    h.assert_requests(Method::Get, "/api/vms", 1).unwrap();
    assert_eq!(h.controller.pending_operations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_actions_need_a_selection() {
    let h = web_on().await;
    for err in [
        h.controller.create_snapshot().await.unwrap_err(),
        h.controller.revert_snapshot("snap-1").await.unwrap_err(),
        h.controller.delete_snapshot("snap-1").await.unwrap_err(),
    ] {
        assert_eq!(err.category, ErrorCategory::Mutation);
    }
    assert!(h.transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_reconciliation() {
    let h = web_on().await;
    h.transport
        .on(Method::Post, "/api/vcdisconnect", StubReply::ok(fixtures::ack("Disconnected from vCenter")));
    h.controller.toggle_power("web-01").await.unwrap();
    h.controller.disconnect().await.unwrap();
    assert_eq!(h.controller.pending_operations(), 0);

    sleep(Duration::from_secs(40)).await;
    h.assert_requests(Method::Get, "/api/vms", 0).unwrap();
}
