//! Moderation State Machine
//!
//! Pure transition table. Effects are returned, not performed, so the
//! pipeline decides when and how each side effect runs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Disabled,
    EnabledBackendUp,
    EnabledBackendDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// User toggled moderation on or off
    Toggle(bool),
    /// Backend reachability observed by a health check, a host message or a failed call
    BackendStatus(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ResumeDiscovery,
    SweepNow,
    RestoreAll,
    HaltDiscovery,
    /// Tell the user once that filtering runs in degraded local mode
    NotifyDegraded,
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    enabled: bool,
    backend_reachable: bool,
    degraded_notified: bool,
}

impl StateMachine {
    /// Start from the persisted preference; the backend is assumed up until
    /// something says otherwise.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            backend_reachable: true,
            degraded_notified: false,
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.enabled, self.backend_reachable) {
            (false, _) => Phase::Disabled,
            (true, true) => Phase::EnabledBackendUp,
            (true, false) => Phase::EnabledBackendDown,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn backend_reachable(&self) -> bool {
        self.backend_reachable
    }

    pub fn handle(&mut self, signal: Signal) -> Vec<Effect> {
        let before = self.phase();
        let mut effects = Vec::new();

        match signal {
            Signal::Toggle(on) if on == self.enabled => {}
            Signal::Toggle(true) => {
                self.enabled = true;
                effects.push(Effect::ResumeDiscovery);
                effects.push(Effect::SweepNow);
            }
            Signal::Toggle(false) => {
                self.enabled = false;
                effects.push(Effect::RestoreAll);
                effects.push(Effect::HaltDiscovery);
            }
            Signal::BackendStatus(up) if up == self.backend_reachable => {}
            Signal::BackendStatus(up) => {
                self.backend_reachable = up;
                if !up && !self.degraded_notified {
                    self.degraded_notified = true;
                    effects.push(Effect::NotifyDegraded);
                }
            }
        }

        let after = self.phase();
        if before != after {
            log::info!("moderation state {:?} -> {:?}", before, after);
        }
        effects
    }
}
