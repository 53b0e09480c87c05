//! Capability traits for the external systems the orchestrator drives,
//! with local backends.
//!
//! Every collaborator that can fail independently sits behind its own
//! trait: object storage, the session event bus, the compute scheduler,
//! the address directory, name resolution, and the shutdown watchdog.
//! Handles are `Arc<dyn Trait>`, constructed once at startup and passed
//! into each service, so orchestration code never names a backend.

pub mod address;
pub mod bus;
pub mod compute;
pub mod dns;
pub mod storage;
pub mod watchdog;

pub use address::{AddressDirectory, AddressError, SimAddressDirectory};
pub use bus::{BusError, EventBus, LocalBus, RecordingBus, SessionEvent};
pub use compute::{
    CapacityPool, ClusterSpec, ComputeError, ComputeProvider, SimCompute, TaskNetwork,
};
pub use dns::{session_host, DnsError, DnsProvider, DnsRecord, SimDns};
pub use storage::{FsStore, MemoryStore, ObjectStore, StoreError};
pub use watchdog::{TimerWatchdog, WatchdogError, WatchdogRule, WatchdogScheduler};
