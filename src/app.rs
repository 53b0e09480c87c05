//! Service assembly for the server process.
//!
//! Everything is wired against the local backends: a filesystem object
//! store under the configured storage root, an in-process session bus,
//! and simulated compute, address, and DNS providers. The watchdog tick
//! loop and the event dispatcher run as background tasks beside the
//! REST server.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::providers::address::SimAddressDirectory;
use crate::providers::bus::LocalBus;
use crate::providers::compute::SimCompute;
use crate::providers::dns::SimDns;
use crate::providers::storage::FsStore;
use crate::providers::watchdog::TimerWatchdog;
use crate::provision::Provisioner;
use crate::registry::Registry;
use crate::rest::{self, ApiState};
use crate::teardown::Teardown;
use crate::workflow::WorkflowService;

/// Assemble the full service graph and serve until shutdown.
pub async fn run(config: Config) -> Result<()> {
    let store = Arc::new(FsStore::new(config.storage_root()));
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
        registry.clone(),
        compute.clone(),
        addresses,
        dns.clone(),
        watchdog.clone(),
    ));
    let teardown = Arc::new(Teardown::new(&config, compute, dns, watchdog.clone()));

    spawn_watchdog_ticker(watchdog, config.watchdog.tick());

    let dispatcher = Dispatcher::new(provisioner, teardown);
    tokio::spawn(async move { dispatcher.run(events).await });

    let port = config.server.port;
    let state = ApiState::new(workflow, registry, config);
    rest::serve(state, port).await
}

/// Republish stop events for sessions past their deadline.
fn spawn_watchdog_ticker(watchdog: Arc<TimerWatchdog>, tick: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            let fired = watchdog.fire_due(Utc::now()).await;
            if fired > 0 {
                debug!(fired, "Expired session rules fired");
            }
        }
    });
}
