//! Inventory refresh, polling and response ordering.

use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use vcpanel_core::transport::Method;
use vcpanel_core::{ErrorCategory, PowerState};
use vcpanel_devkit::fixtures::{self, VmBuilder};
use vcpanel_devkit::{StubReply, TestHarness};

fn names(h: &TestHarness) -> Vec<String> {
    h.state().vms.into_iter().map(|vm| vm.name).collect()
}

#[tokio::test(start_paused = true)]
async fn test_refresh_while_disconnected_sends_nothing() {
    let h = TestHarness::new();
    h.serve_inventory(vec![VmBuilder::new("web-01")]);

    assert_eq!(h.controller.refresh().await.unwrap(), None);
    assert!(h.transport.requests().is_empty());
    assert!(h.state().vms.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_successful_fetch_replaces_collection() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("a"), VmBuilder::new("b").powered_on()]).await.unwrap();
    assert_eq!(names(&h), vec!["a", "b"]);

    h.serve_inventory(vec![VmBuilder::new("c").suspended().snapshot("snap-1", "base")]);
    let fetched = h.controller.refresh().await.unwrap().unwrap();

    let state = h.state();
    assert_eq!(state.vms, fetched);
    assert_eq!(names(&h), vec!["c"]);
    assert_eq!(state.vms[0].power_state, PowerState::Suspended);
    assert_eq!(state.vms[0].snapshots[0].id, "snap-1");
    assert!(!state.loading);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_keeps_previous_collection() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("web-01"), VmBuilder::new("db-01")]).await.unwrap();
    let before = h.state().vms;

    h.transport
        .once(Method::Get, "/api/vms", StubReply::status(500, json!({"error": "Not connected to vCenter"})));
    let err = h.controller.refresh().await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Fetch);
    assert_eq!(err.message, "Failed to fetch VMs. Please try again.");

    let state = h.state();
    assert_eq!(state.vms, before);
    assert_eq!(state.error, Some(err));
    assert!(!state.loading);
    assert!(state.connected);

    // le fetch suivant efface l'erreur
    h.controller.refresh().await.unwrap();
    assert_eq!(h.state().error, None);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_inventory_is_a_fetch_error() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("web-01")]).await.unwrap();
    h.transport
        .once(Method::Get, "/api/vms", StubReply::ok(json!([{"name": "x", "power_state": "melted"}])));

    let err = h.controller.refresh().await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Fetch);
    assert_eq!(names(&h), vec!["web-01"]);
}

#[tokio::test(start_paused = true)]
async fn test_loading_flag_during_fetch() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("web-01")]).await.unwrap();
    h.transport.once_delayed(
        Method::Get,
        "/api/vms",
        StubReply::ok(fixtures::inventory(vec![VmBuilder::new("web-01")])),
        Duration::from_secs(2),
    );

    let (_, during) = tokio::join!(h.controller.refresh(), async {
        sleep(Duration::from_millis(500)).await;
        h.state().loading
    });
    assert!(during);
    assert!(!h.state().loading);
}

#[tokio::test(start_paused = true)]
async fn test_poll_fires_every_interval() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("web-01")]).await.unwrap();
    h.reset();

    sleep(Duration::from_secs(29)).await;
    h.assert_requests(Method::Get, "/api/vms", 0).unwrap();
    sleep(Duration::from_secs(2)).await;
    h.assert_requests(Method::Get, "/api/vms", 1).unwrap();
    sleep(Duration::from_secs(30)).await;
    h.assert_requests(Method::Get, "/api/vms", 2).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_poll_survives_fetch_failures() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("web-01")]).await.unwrap();
    h.transport.on(Method::Get, "/api/vms", StubReply::unreachable());
    h.reset();

    sleep(Duration::from_secs(61)).await;
    h.assert_requests(Method::Get, "/api/vms", 2).unwrap();
    let state = h.state();
    assert_eq!(state.error.map(|e| e.category), Some(ErrorCategory::Fetch));
    assert_eq!(state.vms.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_last_response_wins() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("initial")]).await.unwrap();
    h.transport
        .once_delayed(
            Method::Get,
            "/api/vms",
            StubReply::ok(fixtures::inventory(vec![VmBuilder::new("slow")])),
            Duration::from_secs(5),
        )
        .once_delayed(
            Method::Get,
            "/api/vms",
            StubReply::ok(fixtures::inventory(vec![VmBuilder::new("fast")])),
            Duration::from_secs(1),
        );

    let (slow, fast) = tokio::join!(h.controller.refresh(), h.controller.refresh());
    assert!(slow.unwrap().is_some());
    assert!(fast.unwrap().is_some());
    assert_eq!(names(&h), vec!["slow"]);
}

#[tokio::test(start_paused = true)]
async fn test_response_after_disconnect_is_discarded() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("web-01")]).await.unwrap();
    h.transport
        .on(Method::Post, "/api/vcdisconnect", StubReply::ok(fixtures::ack("Disconnected from vCenter")))
        .once_delayed(
            Method::Get,
            "/api/vms",
            StubReply::ok(fixtures::inventory(vec![VmBuilder::new("ghost")])),
            Duration::from_secs(3),
        );

    let (late, disconnected) = tokio::join!(h.controller.refresh(), async {
        sleep(Duration::from_secs(1)).await;
        h.controller.disconnect().await
    });
    disconnected.unwrap();
    assert_eq!(late.unwrap(), None);

    let state = h.state();
    assert!(!state.connected);
    assert!(state.vms.is_empty());
    assert!(!state.loading);
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_replacement() {
    let h = TestHarness::new();
    h.connected(vec![VmBuilder::new("web-01")]).await.unwrap();
    h.serve_inventory(vec![VmBuilder::new("web-01"), VmBuilder::new("web-02")]);

    // le prochain tick de polling apporte la nouvelle VM
    let state = h.wait_for_state(Duration::from_secs(40), |s| s.vms.len() == 2).await;
    assert_eq!(state.unwrap().vms[1].name, "web-02");
}
