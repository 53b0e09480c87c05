//! Public address directory.
//!
//! Maps a task's network interface id to its public address. An
//! interface can exist before an address is associated with it, so the
//! lookup returns `None` during that window and callers poll.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),
}

#[async_trait]
pub trait AddressDirectory: Send + Sync {
    /// Public address associated with `interface_id`, or `None` while no
    /// association exists yet.
    async fn public_address(&self, interface_id: &str)
        -> Result<Option<Ipv4Addr>, AddressError>;
}

/// In-memory directory. By default every interface id resolves to a
/// deterministic TEST-NET-3 address derived from the id, so provisioning
/// works end-to-end without registration; explicit registrations and a
/// withhold counter cover the remaining test cases.
pub struct SimAddressDirectory {
    registered: Mutex<HashMap<String, Ipv4Addr>>,
    auto_assign: bool,
    /// Lookups to answer `None` before resolving normally
    withhold: AtomicUsize,
}

impl SimAddressDirectory {
    pub fn new() -> Self {
        Self {
            registered: Mutex::new(HashMap::new()),
            auto_assign: true,
            withhold: AtomicUsize::new(0),
        }
    }

    /// Directory that only answers for explicitly registered interfaces.
    pub fn strict() -> Self {
        Self {
            registered: Mutex::new(HashMap::new()),
            auto_assign: false,
            withhold: AtomicUsize::new(0),
        }
    }

    pub fn register(&self, interface_id: &str, address: Ipv4Addr) {
        self.registered
            .lock()
            .unwrap()
            .insert(interface_id.to_string(), address);
    }

    /// Answer `None` for the next `n` lookups, simulating the window
    /// before an address is associated.
    pub fn withhold(&self, n: usize) {
        self.withhold.store(n, Ordering::SeqCst);
    }

    fn derived(interface_id: &str) -> Ipv4Addr {
        let sum: u32 = interface_id.bytes().map(u32::from).sum();
        Ipv4Addr::new(203, 0, 113, u8::try_from(1 + sum % 254).unwrap_or(1))
    }
}

impl Default for SimAddressDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressDirectory for SimAddressDirectory {
    async fn public_address(
        &self,
        interface_id: &str,
    ) -> Result<Option<Ipv4Addr>, AddressError> {
        let withheld = self.withhold.load(Ordering::SeqCst);
        if withheld > 0 {
            self.withhold.store(withheld - 1, Ordering::SeqCst);
            return Ok(None);
        }

        if let Some(addr) = self.registered.lock().unwrap().get(interface_id) {
            return Ok(Some(*addr));
        }
        if self.auto_assign {
            return Ok(Some(Self::derived(interface_id)));
        }
        Err(AddressError::InterfaceNotFound(interface_id.to_string()))
    }
}
