//! Compute scheduling abstraction.
//!
//! Sessions run as single tasks on per-user clusters. The trait models
//! the handful of scheduler operations the orchestrator needs: cluster
//! create/delete, task launch/list/stop, and network-interface discovery
//! for a launched task. Cluster deletion distinguishes "still contains
//! tasks" from other failures because teardown retries only that case.
//!
//! The in-memory simulator is the only backend in this crate; a real
//! scheduler adapter implements the same trait out of tree.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::config::NetworkConfig;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("cluster '{0}' not found")]
    ClusterNotFound(String),

    #[error("cluster '{0}' still contains tasks")]
    ClusterNotEmpty(String),

    #[error("task '{task}' not found on cluster '{cluster}'")]
    TaskNotFound { cluster: String, task: String },

    #[error("no capacity for template '{0}'")]
    CapacityUnavailable(String),
}

impl ComputeError {
    /// Teardown retries cluster deletion only while tasks are draining.
    pub fn is_cluster_not_empty(&self) -> bool {
        matches!(self, Self::ClusterNotEmpty(_))
    }
}

/// Capacity pools a cluster can draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityPool {
    /// Preemptible capacity, cheaper but reclaimable
    Spot,
    /// Standard on-demand capacity
    Standard,
}

/// One entry of a cluster's default placement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityEntry {
    pub pool: CapacityPool,
    /// Guaranteed task count placed on this pool before others are used
    pub base: u32,
}

/// Everything needed to create a session cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub name: String,
    pub project_id: String,
    pub user_id: String,
    /// Pools attached to the cluster
    pub pools: Vec<CapacityPool>,
    /// Default placement strategy
    pub strategy: Vec<CapacityEntry>,
}

impl ClusterSpec {
    /// Session cluster named for the user: one guaranteed task on spot
    /// capacity, standard pool attached as fallback.
    pub fn for_session(project_id: &str, user_id: &str) -> Self {
        Self {
            name: user_id.to_string(),
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            pools: vec![CapacityPool::Spot, CapacityPool::Standard],
            strategy: vec![CapacityEntry {
                pool: CapacityPool::Spot,
                base: 1,
            }],
        }
    }
}

/// Network placement for a launched task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNetwork {
    pub subnet: String,
    pub security_group: String,
    pub assign_public_address: bool,
}

impl From<&NetworkConfig> for TaskNetwork {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            subnet: config.subnet.clone(),
            security_group: config.security_group.clone(),
            assign_public_address: config.assign_public_address,
        }
    }
}

#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn create_cluster(&self, spec: ClusterSpec) -> Result<(), ComputeError>;

    /// Fails with `ClusterNotEmpty` while tasks remain on the cluster.
    async fn delete_cluster(&self, name: &str) -> Result<(), ComputeError>;

    /// Launch one task from `template`, returning its id.
    async fn run_task(
        &self,
        cluster: &str,
        template: &str,
        network: &TaskNetwork,
    ) -> Result<String, ComputeError>;

    /// Ids of the tasks currently running on `cluster`.
    async fn list_tasks(&self, cluster: &str) -> Result<Vec<String>, ComputeError>;

    async fn stop_task(&self, cluster: &str, task_id: &str, reason: &str)
        -> Result<(), ComputeError>;

    /// The task's network interface id, or `None` while the interface is
    /// still attaching.
    async fn task_interface(
        &self,
        cluster: &str,
        task_id: &str,
    ) -> Result<Option<String>, ComputeError>;
}

struct SimTask {
    template: String,
    network: TaskNetwork,
    interface_id: String,
    /// `task_interface` calls to answer `None` before the id is visible
    defer_describes: usize,
}

struct SimCluster {
    spec: ClusterSpec,
    tasks: BTreeMap<String, SimTask>,
    stopped: Vec<(String, String)>,
}

/// In-memory scheduler with scriptable failures.
#[derive(Default)]
pub struct SimCompute {
    clusters: Mutex<BTreeMap<String, SimCluster>>,
    interface_seq: AtomicUsize,
    /// Launches to refuse before accepting one
    fail_launches: AtomicUsize,
    /// `task_interface` calls per new task that report "still attaching"
    defer_interfaces: AtomicUsize,
    /// Cluster deletions to refuse as not-empty regardless of contents
    deny_deletes: AtomicUsize,
    launch_attempts: AtomicUsize,
}

impl SimCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` task launches with `CapacityUnavailable`.
    pub fn fail_launches(&self, n: usize) {
        self.fail_launches.store(n, Ordering::SeqCst);
    }

    /// Make each subsequently launched task report no interface for its
    /// first `n` describes.
    pub fn defer_interfaces(&self, n: usize) {
        self.defer_interfaces.store(n, Ordering::SeqCst);
    }

    /// Report the next `n` cluster deletions as not-empty.
    pub fn deny_deletes(&self, n: usize) {
        self.deny_deletes.store(n, Ordering::SeqCst);
    }

    /// Total `run_task` calls, accepted or refused.
    pub fn launch_attempts(&self) -> usize {
        self.launch_attempts.load(Ordering::SeqCst)
    }

    pub fn cluster_spec(&self, name: &str) -> Option<ClusterSpec> {
        self.clusters
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.spec.clone())
    }

    pub fn has_cluster(&self, name: &str) -> bool {
        self.clusters.lock().unwrap().contains_key(name)
    }

    /// Template and network a running task was launched with.
    pub fn task_launch(&self, cluster: &str, task_id: &str) -> Option<(String, TaskNetwork)> {
        self.clusters.lock().unwrap().get(cluster).and_then(|c| {
            c.tasks
                .get(task_id)
                .map(|t| (t.template.clone(), t.network.clone()))
        })
    }

    /// `(task_id, reason)` pairs stopped on `name`, in stop order.
    pub fn stopped_tasks(&self, name: &str) -> Vec<(String, String)> {
        self.clusters
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.stopped.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ComputeProvider for SimCompute {
    async fn create_cluster(&self, spec: ClusterSpec) -> Result<(), ComputeError> {
        let mut clusters = self.clusters.lock().unwrap();
        clusters.insert(
            spec.name.clone(),
            SimCluster {
                spec,
                tasks: BTreeMap::new(),
                stopped: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_cluster(&self, name: &str) -> Result<(), ComputeError> {
        let denied = self.deny_deletes.load(Ordering::SeqCst);
        if denied > 0 {
            self.deny_deletes.store(denied - 1, Ordering::SeqCst);
            return Err(ComputeError::ClusterNotEmpty(name.to_string()));
        }

        let mut clusters = self.clusters.lock().unwrap();
        let cluster = clusters
            .get(name)
            .ok_or_else(|| ComputeError::ClusterNotFound(name.to_string()))?;
        if !cluster.tasks.is_empty() {
            return Err(ComputeError::ClusterNotEmpty(name.to_string()));
        }
        clusters.remove(name);
        Ok(())
    }

    async fn run_task(
        &self,
        cluster: &str,
        template: &str,
        network: &TaskNetwork,
    ) -> Result<String, ComputeError> {
        self.launch_attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self.fail_launches.load(Ordering::SeqCst);
        if failing > 0 {
            self.fail_launches.store(failing - 1, Ordering::SeqCst);
            return Err(ComputeError::CapacityUnavailable(template.to_string()));
        }

        let mut clusters = self.clusters.lock().unwrap();
        let entry = clusters
            .get_mut(cluster)
            .ok_or_else(|| ComputeError::ClusterNotFound(cluster.to_string()))?;

        let task_id = format!("task-{}", Uuid::new_v4());
        let interface_id = format!(
            "iface-{:08x}",
            self.interface_seq.fetch_add(1, Ordering::SeqCst) + 1
        );
        entry.tasks.insert(
            task_id.clone(),
            SimTask {
                template: template.to_string(),
                network: network.clone(),
                interface_id,
                defer_describes: self.defer_interfaces.load(Ordering::SeqCst),
            },
        );
        Ok(task_id)
    }

    async fn list_tasks(&self, cluster: &str) -> Result<Vec<String>, ComputeError> {
        let clusters = self.clusters.lock().unwrap();
        let entry = clusters
            .get(cluster)
            .ok_or_else(|| ComputeError::ClusterNotFound(cluster.to_string()))?;
        Ok(entry.tasks.keys().cloned().collect())
    }

    async fn stop_task(
        &self,
        cluster: &str,
        task_id: &str,
        reason: &str,
    ) -> Result<(), ComputeError> {
        let mut clusters = self.clusters.lock().unwrap();
        let entry = clusters
            .get_mut(cluster)
            .ok_or_else(|| ComputeError::ClusterNotFound(cluster.to_string()))?;
        if entry.tasks.remove(task_id).is_none() {
            return Err(ComputeError::TaskNotFound {
                cluster: cluster.to_string(),
                task: task_id.to_string(),
            });
        }
        entry
            .stopped
            .push((task_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn task_interface(
        &self,
        cluster: &str,
        task_id: &str,
    ) -> Result<Option<String>, ComputeError> {
        let mut clusters = self.clusters.lock().unwrap();
        let entry = clusters
            .get_mut(cluster)
            .ok_or_else(|| ComputeError::ClusterNotFound(cluster.to_string()))?;
        let task = entry
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ComputeError::TaskNotFound {
                cluster: cluster.to_string(),
                task: task_id.to_string(),
            })?;

        if task.defer_describes > 0 {
            task.defer_describes -= 1;
            return Ok(None);
        }
        Ok(Some(task.interface_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> TaskNetwork {
        TaskNetwork {
            subnet: "subnet-1".to_string(),
            security_group: "sg-1".to_string(),
            assign_public_address: true,
        }
    }

    #[test]
    fn session_cluster_prefers_spot_capacity() {
        let spec = ClusterSpec::for_session("maze-study", "4f3a");
        assert_eq!(spec.name, "4f3a");
        assert_eq!(spec.pools, vec![CapacityPool::Spot, CapacityPool::Standard]);
        assert_eq!(spec.strategy.len(), 1);
        assert_eq!(spec.strategy[0].pool, CapacityPool::Spot);
        assert_eq!(spec.strategy[0].base, 1);
    }

    #[tokio::test]
    async fn launch_stop_delete_round_trip() {
        let sim = SimCompute::new();
        sim.create_cluster(ClusterSpec::for_session("p", "u-1"))
            .await
            .unwrap();

        let task = sim.run_task("u-1", "maze-server:4", &network()).await.unwrap();
        assert_eq!(sim.list_tasks("u-1").await.unwrap(), vec![task.clone()]);
        let (template, net) = sim.task_launch("u-1", &task).unwrap();
        assert_eq!(template, "maze-server:4");
        assert_eq!(net.subnet, "subnet-1");

        let err = sim.delete_cluster("u-1").await.unwrap_err();
        assert!(err.is_cluster_not_empty());

        sim.stop_task("u-1", &task, "Done").await.unwrap();
        assert_eq!(sim.stopped_tasks("u-1"), vec![(task, "Done".to_string())]);

        sim.delete_cluster("u-1").await.unwrap();
        assert!(!sim.has_cluster("u-1"));
    }

    #[tokio::test]
    async fn scripted_launch_failures_count_attempts() {
        let sim = SimCompute::new();
        sim.create_cluster(ClusterSpec::for_session("p", "u-1"))
            .await
            .unwrap();
        sim.fail_launches(2);

        assert!(sim.run_task("u-1", "t", &network()).await.is_err());
        assert!(sim.run_task("u-1", "t", &network()).await.is_err());
        assert!(sim.run_task("u-1", "t", &network()).await.is_ok());
        assert_eq!(sim.launch_attempts(), 3);
    }

    #[tokio::test]
    async fn interface_visible_after_deferred_describes() {
        let sim = SimCompute::new();
        sim.create_cluster(ClusterSpec::for_session("p", "u-1"))
            .await
            .unwrap();
        sim.defer_interfaces(2);
        let task = sim.run_task("u-1", "t", &network()).await.unwrap();

        assert_eq!(sim.task_interface("u-1", &task).await.unwrap(), None);
        assert_eq!(sim.task_interface("u-1", &task).await.unwrap(), None);
        assert!(sim.task_interface("u-1", &task).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn operations_on_missing_cluster_fail() {
        let sim = SimCompute::new();
        assert!(matches!(
            sim.list_tasks("ghost").await.unwrap_err(),
            ComputeError::ClusterNotFound(_)
        ));
        assert!(matches!(
            sim.run_task("ghost", "t", &network()).await.unwrap_err(),
            ComputeError::ClusterNotFound(_)
        ));
        assert!(matches!(
            sim.delete_cluster("ghost").await.unwrap_err(),
            ComputeError::ClusterNotFound(_)
        ));
    }
}
