//! Navigation watcher - decides when the host page has settled
//!
//! Fed with mutation records and location changes, polled with the current
//! time. It never touches the page itself except through `HostPage`.
//!
//! ```text
//!            activity              quiet period / max wait
//!   Idle ──────────────> Observing ───────────────────────> Settled
//!    ^                     │  ^ activity (extends window)       │
//!    │                     └──┘                                 │
//!    └──────────────────────── next poll ───────────────────────┘
//! ```

use std::time::Duration;

use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::config::WatcherSettings;
use super::document::{MutationOrigin, MutationRecord};
use super::error::WatcherError;
use super::io_traits::HostPage;

// =============================================================================
// EVENTS
// =============================================================================

/// Why a debounce window closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleReason {
    /// No host activity for the quiet period
    Quiet,
    /// Activity kept going until the maximum wait
    MaxWait,
}

/// The host finished a batch of re-renders or a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettledEvent {
    pub at_ms: u64,
    pub reason: SettleReason,
    /// Host mutations seen in the closed window
    pub mutations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    ContainerFound,
    ContainerLost,
    LocationChanged { from: String, to: String },
    Settled(SettledEvent),
    HostIncompatible(WatcherError),
}

// =============================================================================
// SETTLE STATE MACHINE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleState {
    Idle,
    Observing { first_ms: u64, last_ms: u64, mutations: u32 },
    Settled { at_ms: u64 },
}

#[derive(Debug)]
pub struct SettleMachine {
    state: SettleState,
    quiet_ms: u64,
    max_wait_ms: u64,
}

impl SettleMachine {
    pub fn new(quiet_ms: u64, max_wait_ms: u64) -> Self {
        Self {
            state: SettleState::Idle,
            quiet_ms,
            max_wait_ms: max_wait_ms.max(quiet_ms),
        }
    }

    pub fn state(&self) -> SettleState {
        self.state
    }

    /// Host activity opens a debounce window or extends the open one
    pub fn on_activity(&mut self, now_ms: u64) {
        self.state = match self.state {
            SettleState::Idle | SettleState::Settled { .. } => SettleState::Observing {
                first_ms: now_ms,
                last_ms: now_ms,
                mutations: 1,
            },
            SettleState::Observing {
                first_ms,
                last_ms,
                mutations,
            } => SettleState::Observing {
                first_ms,
                last_ms: last_ms.max(now_ms),
                mutations: mutations.saturating_add(1),
            },
        };
    }

    /// Advance the clock. Returns the event when the open window closes.
    pub fn poll(&mut self, now_ms: u64) -> Option<SettledEvent> {
        match self.state {
            SettleState::Idle => None,
            SettleState::Settled { .. } => {
                self.state = SettleState::Idle;
                None
            }
            SettleState::Observing {
                first_ms,
                last_ms,
                mutations,
            } => {
                let reason = if now_ms.saturating_sub(last_ms) >= self.quiet_ms {
                    SettleReason::Quiet
                } else if now_ms.saturating_sub(first_ms) >= self.max_wait_ms {
                    SettleReason::MaxWait
                } else {
                    return None;
                };
                self.state = SettleState::Settled { at_ms: now_ms };
                Some(SettledEvent {
                    at_ms: now_ms,
                    reason,
                    mutations,
                })
            }
        }
    }
}

// =============================================================================
// CONTAINER PROBE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Searching { next_at_ms: u64 },
    Present,
    /// Gave up; reported once
    Incompatible,
    /// Lost after having been present. Re-probed at the max delay, never fatal.
    Dormant { next_at_ms: u64 },
}

#[derive(Debug)]
pub struct ContainerProbe {
    state: ProbeState,
    backoff: Backoff,
    max_delay_ms: u64,
    started_at_ms: Option<u64>,
}

impl ContainerProbe {
    pub fn new(backoff: Backoff, max_delay_ms: u64) -> Self {
        Self {
            state: ProbeState::Searching { next_at_ms: 0 },
            backoff,
            max_delay_ms,
            started_at_ms: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.state == ProbeState::Present
    }

    pub fn is_incompatible(&self) -> bool {
        self.state == ProbeState::Incompatible
    }

    /// Probe the host if a probe is due
    pub fn poll<H: HostPage + ?Sized>(&mut self, host: &H, now_ms: u64) -> Option<WatchEvent> {
        let started = *self.started_at_ms.get_or_insert(now_ms);

        match self.state {
            ProbeState::Incompatible => None,
            ProbeState::Present => {
                if host.has_container() {
                    return None;
                }
                warn!("[WATCHER] Host container disappeared");
                self.state = ProbeState::Dormant {
                    next_at_ms: now_ms + self.max_delay_ms,
                };
                Some(WatchEvent::ContainerLost)
            }
            ProbeState::Dormant { next_at_ms } => {
                if now_ms < next_at_ms {
                    return None;
                }
                if host.has_container() {
                    info!("[WATCHER] Host container is back");
                    self.state = ProbeState::Present;
                    return Some(WatchEvent::ContainerFound);
                }
                self.state = ProbeState::Dormant {
                    next_at_ms: now_ms + self.max_delay_ms,
                };
                None
            }
            ProbeState::Searching { next_at_ms } => {
                if now_ms < next_at_ms {
                    return None;
                }
                if host.has_container() {
                    info!(
                        attempts = self.backoff.attempts() + 1,
                        waited_ms = now_ms - started,
                        "[WATCHER] Host container found"
                    );
                    self.state = ProbeState::Present;
                    self.backoff.reset();
                    return Some(WatchEvent::ContainerFound);
                }
                match self.backoff.next() {
                    Some(delay) => {
                        debug!(
                            attempt = self.backoff.attempts(),
                            retry_in_ms = delay.as_millis() as u64,
                            "[WATCHER] Host container not present yet"
                        );
                        self.state = ProbeState::Searching {
                            next_at_ms: now_ms + delay.as_millis() as u64,
                        };
                        None
                    }
                    None => {
                        let error = WatcherError::HostIncompatible {
                            attempts: self.backoff.attempts(),
                            waited_ms: now_ms - started,
                        };
                        warn!(error = %error, "[WATCHER] Giving up on host page");
                        self.state = ProbeState::Incompatible;
                        Some(WatchEvent::HostIncompatible(error))
                    }
                }
            }
        }
    }

    /// A navigation may bring the container back; probe on the next poll
    pub fn on_navigation(&mut self, now_ms: u64) {
        if let ProbeState::Dormant { .. } = self.state {
            self.state = ProbeState::Dormant { next_at_ms: now_ms };
        }
    }
}

// =============================================================================
// NAVIGATION WATCHER
// =============================================================================

pub struct NavigationWatcher {
    settle: SettleMachine,
    probe: ContainerProbe,
    last_location: Option<String>,
    overlay_mutations_ignored: u64,
    outside_mutations_ignored: u64,
    host_mutations: u64,
}

impl NavigationWatcher {
    pub fn new(settings: &WatcherSettings) -> Self {
        let backoff = Backoff::new(
            Duration::from_millis(settings.probe_initial_ms),
            Duration::from_millis(settings.probe_max_delay_ms),
            settings.probe_max_attempts,
        );
        Self {
            settle: SettleMachine::new(settings.quiet_ms, settings.max_wait_ms),
            probe: ContainerProbe::new(backoff, settings.probe_max_delay_ms),
            last_location: None,
            overlay_mutations_ignored: 0,
            outside_mutations_ignored: 0,
            host_mutations: 0,
        }
    }

    /// Feed one mutation record. Only records inside the host container open
    /// a debounce window; overlay and outside records are counted and dropped.
    pub fn record_mutation(&mut self, record: MutationRecord, now_ms: u64) {
        match record.origin {
            MutationOrigin::Overlay => self.overlay_mutations_ignored += 1,
            MutationOrigin::Outside => self.outside_mutations_ignored += 1,
            MutationOrigin::Host => {
                self.host_mutations += 1;
                self.settle.on_activity(now_ms);
            }
        }
    }

    /// Compare against the last seen location. A change opens a debounce window.
    pub fn observe_location(&mut self, location: &str, now_ms: u64) -> Option<WatchEvent> {
        match &self.last_location {
            Some(last) if last == location => None,
            None => {
                self.last_location = Some(location.to_string());
                None
            }
            Some(last) => {
                let from = last.clone();
                info!(from = %from, to = %location, "[WATCHER] Location changed");
                self.last_location = Some(location.to_string());
                self.settle.on_activity(now_ms);
                self.probe.on_navigation(now_ms);
                Some(WatchEvent::LocationChanged {
                    from,
                    to: location.to_string(),
                })
            }
        }
    }

    pub fn poll<H: HostPage + ?Sized>(&mut self, host: &H, now_ms: u64) -> Vec<WatchEvent> {
        let mut events = Vec::new();

        if let Some(event) = self.observe_location(&host.location(), now_ms) {
            events.push(event);
        }
        if let Some(event) = self.probe.poll(host, now_ms) {
            events.push(event);
        }
        if let Some(settled) = self.settle.poll(now_ms) {
            debug!(
                reason = ?settled.reason,
                mutations = settled.mutations,
                "[WATCHER] Page settled"
            );
            events.push(WatchEvent::Settled(settled));
        }

        events
    }

    pub fn container_present(&self) -> bool {
        self.probe.is_present()
    }

    pub fn is_incompatible(&self) -> bool {
        self.probe.is_incompatible()
    }

    pub fn settle_state(&self) -> SettleState {
        self.settle.state()
    }

    pub fn overlay_mutations_ignored(&self) -> u64 {
        self.overlay_mutations_ignored
    }

    pub fn outside_mutations_ignored(&self) -> u64 {
        self.outside_mutations_ignored
    }

    pub fn host_mutations(&self) -> u64 {
        self.host_mutations
    }
}
