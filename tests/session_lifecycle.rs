//! Integration tests for the sandbox session lifecycle.
//!
//! These tests verify that:
//! - Advancing onto a start-bound step publishes a start event and the
//!   dispatcher provisions the session end to end
//! - The readiness gate opens once the session's address is published
//! - Stop-bound steps and watchdog deadlines reclaim every resource
//!
//! The workflow service, dispatcher, and providers share one in-process
//! bus, exactly as the server assembles them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use waypoint::config::Config;
use waypoint::dispatch::Dispatcher;
use waypoint::providers::address::SimAddressDirectory;
use waypoint::providers::bus::LocalBus;
use waypoint::providers::compute::SimCompute;
use waypoint::providers::dns::{DnsProvider, SimDns};
use waypoint::providers::storage::MemoryStore;
use waypoint::providers::watchdog::TimerWatchdog;
use waypoint::provision::Provisioner;
use waypoint::registry::{Registry, REGISTRY_KEY};
use waypoint::teardown::Teardown;
use waypoint::workflow::WorkflowService;

// ─── Test Harness ─────────────────────────────────────────────────────────────

struct LifecycleHarness {
    workflow: Arc<WorkflowService>,
    compute: Arc<SimCompute>,
    dns: Arc<SimDns>,
    watchdog: Arc<TimerWatchdog>,
}

impl LifecycleHarness {
    /// Wire the full service graph onto one bus and start the dispatcher,
    /// mirroring the server assembly.
    fn new(max_runtime: u64) -> Self {
        let mut config = Config::default();
        config.retry.delay_ms = 0;
        config.session.root_domain = "sandbox.test".to_string();

        let store = Arc::new(MemoryStore::new());
        store.seed(
            &config.storage.bucket,
            REGISTRY_KEY,
            json!({"projects": [{
                "id": "maze",
                "name": "Maze Study",
                "live": true,
                "task_template": "maze-server:4",
                "steps": {
                    "1": "intro.html",
                    "2": "prep.html",
                    "3": "game",
                    "4": "outro.html",
                    "final_step": "outro.html"
                },
                "events": {"start_server_step": 2, "stop_server_step": 4},
                "max_runtime": max_runtime
            }]})
            .to_string()
            .as_bytes(),
        );
        for doc in ["intro", "prep", "outro"] {
            store.seed(
                &config.storage.bucket,
                &format!("maze/{doc}.html"),
                doc.as_bytes(),
            );
        }

        let (bus, events) = LocalBus::new();
        let bus = Arc::new(bus);

        let compute = Arc::new(SimCompute::new());
        let addresses = Arc::new(SimAddressDirectory::new());
        let dns = Arc::new(SimDns::new());
        let watchdog = Arc::new(TimerWatchdog::new(bus.clone()));

        let registry = Arc::new(Registry::new(store.clone(), &config.storage.bucket));
        let workflow = Arc::new(WorkflowService::new(
            &config,
            registry.clone(),
            store,
            bus,
            dns.clone(),
        ));
        let provisioner = Arc::new(Provisioner::new(
            &config,
            registry,
            compute.clone(),
            addresses,
            dns.clone(),
            watchdog.clone(),
        ));
        let teardown = Arc::new(Teardown::new(
            &config,
            compute.clone(),
            dns.clone(),
            watchdog.clone(),
        ));

        let dispatcher = Dispatcher::new(provisioner, teardown);
        tokio::spawn(async move { dispatcher.run(events).await });

        Self {
            workflow,
            compute,
            dns,
            watchdog,
        }
    }

    async fn advance(&self, user: &str) -> String {
        self.workflow
            .next_step("maze", user, json!({"userId": user}))
            .await
            .expect("advance failed")
    }

    fn session_is_up(&self, user: &str) -> bool {
        self.compute.has_cluster(user) && self.watchdog.has_rule(user)
    }
}

/// Give dispatched tasks time to complete
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ─── Test Cases ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_session_arc_from_start_to_stop() {
    let h = LifecycleHarness::new(45);

    assert_eq!(h.advance("4f3a").await, "intro");

    // Step 2 is start-bound: the page comes back immediately while the
    // dispatcher provisions in the background.
    assert_eq!(h.advance("4f3a").await, "prep");
    settle().await;
    assert!(h.session_is_up("4f3a"), "start event must provision");
    assert_eq!(h.dns.record_count(), 1);

    // Step 3 gates on the published address.
    assert_eq!(h.advance("4f3a").await, "show_game_page");

    // Step 4 is stop-bound: page first, teardown follows.
    assert_eq!(h.advance("4f3a").await, "outro");
    settle().await;
    assert!(!h.session_is_up("4f3a"), "stop event must reclaim");
    assert_eq!(h.dns.record_count(), 0);

    // Past the last numbered step the final page repeats.
    assert_eq!(h.advance("4f3a").await, "outro");
}

#[tokio::test]
async fn test_gate_waits_while_the_session_is_still_coming_up() {
    let h = LifecycleHarness::new(45);
    // Hold the public address back so provisioning cannot finish yet.
    h.compute.defer_interfaces(usize::MAX);

    assert_eq!(h.advance("4f3a").await, "intro");
    assert_eq!(h.advance("4f3a").await, "prep");
    settle().await;

    // The gate keeps answering wait and rewinding until the address shows.
    assert_eq!(h.advance("4f3a").await, "wait");
    assert_eq!(h.advance("4f3a").await, "wait");

    h.dns
        .create_record("4f3a.sandbox.test", "203.0.113.9", 60)
        .await
        .unwrap();
    assert_eq!(h.advance("4f3a").await, "show_game_page");
}

#[tokio::test]
async fn test_stop_for_an_unknown_session_is_harmless() {
    let h = LifecycleHarness::new(45);

    h.workflow.relay_stop("ghost").await.unwrap();
    settle().await;

    assert!(!h.compute.has_cluster("ghost"));
    assert_eq!(h.dns.record_count(), 0);
}

#[tokio::test]
async fn test_watchdog_deadline_reclaims_an_expired_session() {
    let h = LifecycleHarness::new(45);

    h.advance("4f3a").await;
    h.advance("4f3a").await;
    settle().await;
    assert!(h.session_is_up("4f3a"));

    // The 45-minute rule is armed but not yet due.
    let fired = h.watchdog.fire_due(Utc::now()).await;
    assert_eq!(fired, 0, "rule must not fire before its deadline");

    let fired = h
        .watchdog
        .fire_due(Utc::now() + chrono::Duration::minutes(46))
        .await;
    assert_eq!(fired, 1, "expired rule must fire");
    settle().await;

    assert!(!h.session_is_up("4f3a"), "deadline must reclaim the session");
    assert_eq!(h.dns.record_count(), 0);
}
