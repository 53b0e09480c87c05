//! Session teardown.
//!
//! Runs on every stop event, including the ones the watchdog fires.
//! Provisioning may have died at any stage, so any subset of the
//! session's resources can exist; the four phases run unconditionally
//! and in isolation, each recording its own outcome. Teardown never
//! returns an error, only the report.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use backon::{ConstantBuilder, Retryable};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::providers::compute::{ComputeError, ComputeProvider};
use crate::providers::dns::{session_host, DnsProvider};
use crate::providers::watchdog::WatchdogScheduler;

/// Stop reason attached to the session task
const STOP_REASON: &str = "Done";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    Failed(String),
}

impl PhaseOutcome {
    pub fn completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Per-phase results of one teardown run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub user_id: String,
    pub task: PhaseOutcome,
    pub cluster: PhaseOutcome,
    pub dns: PhaseOutcome,
    pub watchdog: PhaseOutcome,
}

impl TeardownReport {
    pub fn fully_clean(&self) -> bool {
        self.task.completed()
            && self.cluster.completed()
            && self.dns.completed()
            && self.watchdog.completed()
    }
}

pub struct Teardown {
    compute: Arc<dyn ComputeProvider>,
    dns: Arc<dyn DnsProvider>,
    watchdog: Arc<dyn WatchdogScheduler>,
    root_domain: String,
    max_attempts: usize,
    delay: std::time::Duration,
}

impl Teardown {
    pub fn new(
        config: &Config,
        compute: Arc<dyn ComputeProvider>,
        dns: Arc<dyn DnsProvider>,
        watchdog: Arc<dyn WatchdogScheduler>,
    ) -> Self {
        Self {
            compute,
            dns,
            watchdog,
            root_domain: config.session.root_domain.clone(),
            max_attempts: config.retry.max_attempts,
            delay: config.retry.delay(),
        }
    }

    /// Reclaim everything a session may have left behind.
    #[instrument(skip(self))]
    pub async fn teardown(&self, user_id: &str) -> TeardownReport {
        let report = TeardownReport {
            user_id: user_id.to_string(),
            task: self.phase(user_id, "stop_task", self.stop_first_task(user_id).await),
            cluster: self.phase(user_id, "delete_cluster", self.delete_cluster(user_id).await),
            dns: self.phase(user_id, "remove_address", self.remove_address(user_id).await),
            watchdog: self.phase(user_id, "cancel_watchdog", self.cancel_watchdog(user_id).await),
        };

        if report.fully_clean() {
            info!(user = user_id, "session torn down");
        } else {
            warn!(user = user_id, ?report, "session teardown left residue");
        }
        report
    }

    fn phase(&self, user_id: &str, name: &str, result: Result<()>) -> PhaseOutcome {
        match result {
            Ok(()) => {
                debug!(user = user_id, phase = name, "teardown phase complete");
                PhaseOutcome::Completed
            }
            Err(e) => {
                warn!(user = user_id, phase = name, error = format!("{e:#}"), "teardown phase failed");
                PhaseOutcome::Failed(format!("{e:#}"))
            }
        }
    }

    async fn stop_first_task(&self, user_id: &str) -> Result<()> {
        let tasks = self
            .compute
            .list_tasks(user_id)
            .await
            .with_context(|| format!("listing tasks on cluster '{user_id}'"))?;
        let Some(task) = tasks.first() else {
            bail!("no tasks on cluster '{user_id}'");
        };
        self.compute
            .stop_task(user_id, task, STOP_REASON)
            .await
            .with_context(|| format!("stopping task '{task}'"))?;
        Ok(())
    }

    /// The cluster refuses deletion while its task is still draining;
    /// only that condition is retried.
    async fn delete_cluster(&self, user_id: &str) -> Result<()> {
        let op = || async { self.compute.delete_cluster(user_id).await };

        op.retry(
            ConstantBuilder::default()
                .with_delay(self.delay)
                .with_max_times(self.max_attempts.saturating_sub(1)),
        )
        .when(ComputeError::is_cluster_not_empty)
        .notify(|err, dur| {
            warn!("retrying cluster deletion after {:?}: {}", dur, err);
        })
        .await
        .with_context(|| format!("deleting cluster '{user_id}'"))?;
        Ok(())
    }

    /// Deletion needs the record's exact value and TTL, so the current
    /// record is read back first.
    async fn remove_address(&self, user_id: &str) -> Result<()> {
        let name = session_host(user_id, &self.root_domain);
        let record = self
            .dns
            .lookup(&name)
            .await
            .with_context(|| format!("looking up '{name}'"))?
            .with_context(|| format!("no address record for '{name}'"))?;
        self.dns
            .delete_record(&name, &record.value, record.ttl)
            .await
            .with_context(|| format!("deleting address record '{name}'"))?;
        Ok(())
    }

    async fn cancel_watchdog(&self, user_id: &str) -> Result<()> {
        self.watchdog
            .remove_target(user_id)
            .await
            .with_context(|| format!("detaching shutdown target for '{user_id}'"))?;
        self.watchdog
            .delete_rule(user_id)
            .await
            .with_context(|| format!("deleting shutdown rule for '{user_id}'"))?;
        Ok(())
    }
}
