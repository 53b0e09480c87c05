//! Session provisioning.
//!
//! Runs on every start event. The order is load-bearing: the shutdown
//! watchdog is installed before any compute exists so a crash mid-way
//! still gets cleaned up at the deadline, and the DNS record is
//! published last because its presence is what the readiness gate
//! treats as "session up". A DNS failure deliberately leaves compute
//! running; the watchdog or a later stop event reclaims it.

use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use backon::{ConstantBuilder, Retryable};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::providers::address::AddressDirectory;
use crate::providers::bus::SessionEvent;
use crate::providers::compute::{ClusterSpec, ComputeProvider, TaskNetwork};
use crate::providers::dns::{session_host, DnsProvider};
use crate::providers::watchdog::WatchdogScheduler;
use crate::registry::Registry;

pub struct Provisioner {
    registry: Arc<Registry>,
    compute: Arc<dyn ComputeProvider>,
    addresses: Arc<dyn AddressDirectory>,
    dns: Arc<dyn DnsProvider>,
    watchdog: Arc<dyn WatchdogScheduler>,
    network: TaskNetwork,
    root_domain: String,
    dns_ttl: u32,
    global_max_runtime: u64,
    max_attempts: usize,
    delay: std::time::Duration,
}

impl Provisioner {
    pub fn new(
        config: &Config,
        registry: Arc<Registry>,
        compute: Arc<dyn ComputeProvider>,
        addresses: Arc<dyn AddressDirectory>,
        dns: Arc<dyn DnsProvider>,
        watchdog: Arc<dyn WatchdogScheduler>,
    ) -> Self {
        Self {
            registry,
            compute,
            addresses,
            dns,
            watchdog,
            network: TaskNetwork::from(&config.network),
            root_domain: config.session.root_domain.clone(),
            dns_ttl: config.session.dns_ttl,
            global_max_runtime: config.session.max_runtime_minutes,
            max_attempts: config.retry.max_attempts,
            delay: config.retry.delay(),
        }
    }

    /// Stand a session up end to end. Success means the session's DNS
    /// record is published; any earlier failure aborts the remaining
    /// stages and surfaces the cause.
    #[instrument(skip(self))]
    pub async fn provision(&self, project_id: &str, user_id: &str) -> Result<()> {
        let project = self
            .registry
            .find(project_id)
            .await
            .context("loading project registry")?
            .with_context(|| format!("project '{project_id}' is not registered"))?;
        let template = project
            .task_template
            .clone()
            .with_context(|| format!("project '{project_id}' has no task template"))?;
        let runtime = project.effective_runtime(self.global_max_runtime);

        self.install_watchdog(user_id, runtime).await?;

        self.compute
            .create_cluster(ClusterSpec::for_session(project_id, user_id))
            .await
            .with_context(|| format!("creating cluster for '{user_id}'"))?;

        let task = self.launch_task(user_id, &template).await?;
        let address = self.discover_address(user_id, &task).await?;
        self.publish_address(user_id, address).await?;

        info!(project = project_id, user = user_id, %address, "session provisioned");
        Ok(())
    }

    fn retry_strategy(&self) -> ConstantBuilder {
        // max_times counts retries after the first attempt
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }

    /// One-shot shutdown rule named for the user: rule first, then the
    /// stop event it republishes at the deadline.
    async fn install_watchdog(&self, user_id: &str, runtime_minutes: u64) -> Result<()> {
        let fire_at = Utc::now()
            + chrono::Duration::minutes(i64::try_from(runtime_minutes).unwrap_or(i64::MAX));
        self.watchdog
            .put_rule(user_id, fire_at)
            .await
            .with_context(|| format!("installing shutdown rule for '{user_id}'"))?;
        self.watchdog
            .put_target(
                user_id,
                SessionEvent::Stop {
                    user_id: user_id.to_string(),
                },
            )
            .await
            .with_context(|| format!("binding shutdown target for '{user_id}'"))?;
        debug!(user = user_id, %fire_at, "shutdown watchdog installed");
        Ok(())
    }

    async fn launch_task(&self, user_id: &str, template: &str) -> Result<String> {
        let op = || async { self.compute.run_task(user_id, template, &self.network).await };

        op.retry(self.retry_strategy())
            .notify(|err, dur| {
                warn!("retrying task launch after {:?}: {}", dur, err);
            })
            .await
            .with_context(|| format!("launching task from template '{template}'"))
    }

    /// Poll for the task's public address, sleeping before each attempt
    /// because the interface is never attached immediately after launch.
    async fn discover_address(&self, cluster: &str, task: &str) -> Result<Ipv4Addr> {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.delay).await;
            match self.try_address(cluster, task).await {
                Ok(Some(address)) => return Ok(address),
                Ok(None) => debug!(attempt, task, "public address not ready"),
                Err(e) => warn!(attempt, task, error = %e, "address discovery attempt failed"),
            }
        }
        bail!(
            "no public address for task '{task}' after {} attempts",
            self.max_attempts
        )
    }

    async fn try_address(&self, cluster: &str, task: &str) -> Result<Option<Ipv4Addr>> {
        let Some(interface) = self.compute.task_interface(cluster, task).await? else {
            return Ok(None);
        };
        Ok(self.addresses.public_address(&interface).await?)
    }

    async fn publish_address(&self, user_id: &str, address: Ipv4Addr) -> Result<()> {
        let name = session_host(user_id, &self.root_domain);
        self.dns
            .create_record(&name, &address.to_string(), self.dns_ttl)
            .await
            .with_context(|| format!("publishing session address '{name}'"))?;
        info!(%name, %address, ttl = self.dns_ttl, "session address published");
        Ok(())
    }
}
