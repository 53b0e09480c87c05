//! Shutdown watchdog.
//!
//! Every session gets a one-shot rule named for its user that fires a
//! stop event at the session's deadline, so an abandoned session cannot
//! outlive its runtime budget. Rule and target are separate operations,
//! mirrored by teardown in reverse: a rule cannot be deleted while its
//! target is still attached. Fired rules stay in place until teardown
//! removes them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::providers::bus::{EventBus, SessionEvent};

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("watchdog rule '{0}' not found")]
    RuleNotFound(String),

    #[error("watchdog rule '{0}' still has a target attached")]
    RuleHasTargets(String),
}

/// One scheduled shutdown, as visible to tests and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogRule {
    pub name: String,
    pub fire_at: DateTime<Utc>,
    pub target: Option<SessionEvent>,
    pub fired: bool,
}

#[async_trait]
pub trait WatchdogScheduler: Send + Sync {
    /// Create or update the one-shot rule `name` firing at `fire_at`.
    /// Re-putting an existing rule rearms it.
    async fn put_rule(&self, name: &str, fire_at: DateTime<Utc>) -> Result<(), WatchdogError>;

    /// Attach the event published when the rule fires. The rule must
    /// already exist.
    async fn put_target(&self, name: &str, payload: SessionEvent) -> Result<(), WatchdogError>;

    /// Detach the rule's target. Detaching when nothing is attached is
    /// not an error.
    async fn remove_target(&self, name: &str) -> Result<(), WatchdogError>;

    /// Delete the rule. Fails while a target is still attached.
    async fn delete_rule(&self, name: &str) -> Result<(), WatchdogError>;
}

/// Local scheduler driven by the app's tick loop. Due targets are
/// republished on the event bus.
pub struct TimerWatchdog {
    rules: Mutex<HashMap<String, WatchdogRule>>,
    bus: Arc<dyn EventBus>,
}

impl TimerWatchdog {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            rules: Mutex::new(HashMap::new()),
            bus,
        }
    }

    pub fn rule(&self, name: &str) -> Option<WatchdogRule> {
        self.rules.lock().unwrap().get(name).cloned()
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.lock().unwrap().contains_key(name)
    }

    /// Publish every unfired, due target and mark it fired. Returns the
    /// number fired. A publish failure leaves its rule unfired so the
    /// next tick retries it.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<(String, SessionEvent)> = {
            let rules = self.rules.lock().unwrap();
            rules
                .values()
                .filter(|r| !r.fired && r.fire_at <= now)
                .filter_map(|r| r.target.clone().map(|t| (r.name.clone(), t)))
                .collect()
        };

        let mut fired = 0;
        for (name, payload) in due {
            match self.bus.publish(payload).await {
                Ok(()) => {
                    if let Some(rule) = self.rules.lock().unwrap().get_mut(&name) {
                        rule.fired = true;
                    }
                    fired += 1;
                }
                Err(e) => {
                    warn!(rule = %name, error = %e, "watchdog target publish failed");
                }
            }
        }
        fired
    }
}

#[async_trait]
impl WatchdogScheduler for TimerWatchdog {
    async fn put_rule(&self, name: &str, fire_at: DateTime<Utc>) -> Result<(), WatchdogError> {
        let mut rules = self.rules.lock().unwrap();
        let target = rules.get(name).and_then(|r| r.target.clone());
        rules.insert(
            name.to_string(),
            WatchdogRule {
                name: name.to_string(),
                fire_at,
                target,
                fired: false,
            },
        );
        Ok(())
    }

    async fn put_target(&self, name: &str, payload: SessionEvent) -> Result<(), WatchdogError> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .get_mut(name)
            .ok_or_else(|| WatchdogError::RuleNotFound(name.to_string()))?;
        rule.target = Some(payload);
        Ok(())
    }

    async fn remove_target(&self, name: &str) -> Result<(), WatchdogError> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .get_mut(name)
            .ok_or_else(|| WatchdogError::RuleNotFound(name.to_string()))?;
        rule.target = None;
        Ok(())
    }

    async fn delete_rule(&self, name: &str) -> Result<(), WatchdogError> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .get(name)
            .ok_or_else(|| WatchdogError::RuleNotFound(name.to_string()))?;
        if rule.target.is_some() {
            return Err(WatchdogError::RuleHasTargets(name.to_string()));
        }
        rules.remove(name);
        Ok(())
    }
}
