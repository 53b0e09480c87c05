//! Session event dispatcher.
//!
//! Consumes JSON messages from the session bus and drives provisioning
//! or teardown. Each event runs on its own task so a slow provision
//! never holds up the rest of the queue.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::providers::bus::SessionEvent;
use crate::provision::Provisioner;
use crate::teardown::Teardown;

pub struct Dispatcher {
    provisioner: Arc<Provisioner>,
    teardown: Arc<Teardown>,
}

impl Dispatcher {
    pub fn new(provisioner: Arc<Provisioner>, teardown: Arc<Teardown>) -> Self {
        Self {
            provisioner,
            teardown,
        }
    }

    /// Consume bus messages until the channel closes.
    pub async fn run(&self, mut rx: UnboundedReceiver<String>) {
        while let Some(raw) = rx.recv().await {
            match serde_json::from_str::<SessionEvent>(&raw) {
                Ok(event) => self.dispatch(event),
                Err(e) => {
                    warn!(error = %e, raw, "Dropping unparseable session event");
                }
            }
        }
        debug!("Session bus closed, dispatcher exiting");
    }

    /// Handle one event on its own task.
    ///
    /// Failures are logged, never propagated; the shutdown watchdog backstops
    /// any session a failed provision leaves half-built.
    fn dispatch(&self, event: SessionEvent) {
        debug!(user = event.user_id(), ?event, "Session event received");
        match event {
            SessionEvent::Start {
                project_id,
                user_id,
            } => {
                let provisioner = self.provisioner.clone();
                tokio::spawn(async move {
                    if let Err(e) = provisioner.provision(&project_id, &user_id).await {
                        warn!(
                            project = project_id,
                            user = user_id,
                            error = format!("{e:#}"),
                            "Session provisioning failed"
                        );
                    }
                });
            }
            SessionEvent::Stop { user_id } => {
                let teardown = self.teardown.clone();
                tokio::spawn(async move {
                    teardown.teardown(&user_id).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::Config;
    use crate::providers::address::SimAddressDirectory;
    use crate::providers::bus::{EventBus, LocalBus, RecordingBus};
    use crate::providers::compute::SimCompute;
    use crate::providers::dns::SimDns;
    use crate::providers::storage::MemoryStore;
    use crate::providers::watchdog::TimerWatchdog;
    use crate::registry::{Registry, REGISTRY_KEY};

    struct Harness {
        dispatcher: Dispatcher,
        compute: Arc<SimCompute>,
        dns: Arc<SimDns>,
        watchdog: Arc<TimerWatchdog>,
    }

    fn harness() -> Harness {
        let mut config = Config::default();
        config.retry.delay_ms = 0;
        config.session.root_domain = "sandbox.test".to_string();

        let store = Arc::new(MemoryStore::new());
        store.seed(
            &config.storage.bucket,
            REGISTRY_KEY,
            json!({"projects": [{
                "id": "maze-study",
                "name": "Maze Study",
                "live": true,
                "task_template": "maze-server:4",
                "steps": {"1": "intro.html", "final_step": "done.html"},
                "events": {"start_server_step": 1, "stop_server_step": null}
            }]})
            .to_string()
            .as_bytes(),
        );
        let registry = Arc::new(Registry::new(store, config.storage.bucket.clone()));

        let compute = Arc::new(SimCompute::new());
        let addresses = Arc::new(SimAddressDirectory::new());
        let dns = Arc::new(SimDns::new());
        let watchdog = Arc::new(TimerWatchdog::new(Arc::new(RecordingBus::new())));

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

        Harness {
            dispatcher: Dispatcher::new(provisioner, teardown),
            compute,
            dns,
            watchdog,
        }
    }

    async fn settle() {
        // Give spawned tasks time to complete
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn start_events_drive_provisioning() {
        let h = harness();
        let (bus, rx) = LocalBus::new();
        bus.publish(SessionEvent::Start {
            project_id: "maze-study".to_string(),
            user_id: "4f3a".to_string(),
        })
        .await
        .unwrap();
        drop(bus);

        h.dispatcher.run(rx).await;
        settle().await;

        assert!(h.compute.has_cluster("4f3a"));
        assert_eq!(h.dns.record_count(), 1);
        assert!(h.watchdog.has_rule("4f3a"));
    }

    #[tokio::test]
    async fn stop_events_drive_teardown() {
        let h = harness();

        // Provision first so the stop has something to reclaim.
        let (bus, rx) = LocalBus::new();
        bus.publish(SessionEvent::Start {
            project_id: "maze-study".to_string(),
            user_id: "4f3a".to_string(),
        })
        .await
        .unwrap();
        drop(bus);
        h.dispatcher.run(rx).await;
        settle().await;
        assert!(h.compute.has_cluster("4f3a"));

        let (bus, rx) = LocalBus::new();
        bus.publish(SessionEvent::Stop {
            user_id: "4f3a".to_string(),
        })
        .await
        .unwrap();
        drop(bus);
        h.dispatcher.run(rx).await;
        settle().await;

        assert!(!h.compute.has_cluster("4f3a"));
        assert_eq!(h.dns.record_count(), 0);
        assert!(!h.watchdog.has_rule("4f3a"));
    }

    #[tokio::test]
    async fn unparseable_messages_are_dropped() {
        let h = harness();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("not a session event".to_string()).unwrap();
        drop(tx);

        h.dispatcher.run(rx).await;
        settle().await;

        assert!(!h.compute.has_cluster("4f3a"));
        assert_eq!(h.dns.record_count(), 0);
    }
}
