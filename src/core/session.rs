//! Dashboard session - orchestrates watcher, extractor, store and renderer
//!
//! DashboardSession owns every engine component and is driven from outside
//! with the current time: mutation records as they arrive, and `update` on
//! every timer tick. It is platform-independent and tested with mocks.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::document::{HostDocument, MutationRecord};
use crate::core::error::{ConfigError, ExtractionError, RenderError, WatcherError};
use crate::core::extractor::Extractor;
use crate::core::io_traits::HostPage;
use crate::core::overlay::Theme;
use crate::core::persistence::{KeyValueStore, OverlayPrefs};
use crate::core::renderer::{OverlaySurface, RenderOutcome, Renderer};
use crate::core::store::{PublishOutcome, StateStore, Subscription};
use crate::core::view::{project, OverlayViewModel, ViewInput, ViewSettings};
use crate::core::watcher::{NavigationWatcher, SettledEvent, WatchEvent};

pub const INCOMPATIBLE_MESSAGE: &str = "Alliance page not recognised. The game layout may have changed.";

// =============================================================================
// SESSION EVENTS
// =============================================================================

/// What started an extraction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTrigger {
    ContainerFound,
    Settled,
    Poll,
    Manual,
}

/// Events emitted by DashboardSession for logging and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ContainerFound,
    ContainerLost,
    LocationChanged { to: String },
    Settled(SettledEvent),
    /// Fatal for this page load; the overlay shows a degraded message
    HostIncompatible(WatcherError),
    ExtractionStarted { sequence: u64, trigger: ExtractionTrigger },
    Published { version: u64 },
    /// Extracted, but the store refused it
    Rejected { version: u64, outcome: PublishOutcome },
    ExtractionFailed(ExtractionError),
    /// A newer extraction was started before this one completed
    Discarded { sequence: u64, latest: u64 },
    Rendered(RenderOutcome),
    RenderFailed(RenderError),
}

/// Handle for one in-flight extraction. Only the most recently issued
/// ticket may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionTicket {
    sequence: u64,
    trigger: ExtractionTrigger,
}

impl ExtractionTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn trigger(&self) -> ExtractionTrigger {
        self.trigger
    }
}

// =============================================================================
// DASHBOARD SESSION
// =============================================================================

pub struct DashboardSession<S: OverlaySurface, K: KeyValueStore> {
    extractor: Extractor,
    store: StateStore,
    watcher: NavigationWatcher,
    renderer: Renderer<S>,
    prefs_store: K,
    prefs: OverlayPrefs,
    view_settings: ViewSettings,
    poll_interval_ms: u64,
    next_sequence: u64,
    /// Sequence of the most recently issued ticket
    latest_ticket: Option<u64>,
    last_extraction_at_ms: Option<u64>,
    degraded: Option<String>,
    notice: Option<String>,
    /// Set by the store subscription on every accepted snapshot
    snapshot_changed: Rc<Cell<bool>>,
    _subscription: Subscription,
    view: Option<OverlayViewModel>,
    /// Clock second of the last projection (age and countdown resolution)
    view_second: Option<u64>,
    dirty: bool,
}

impl<S: OverlaySurface, K: KeyValueStore> DashboardSession<S, K> {
    pub fn new(config: &Config, surface: S, prefs_store: K) -> Result<Self, ConfigError> {
        let extractor = Extractor::new(config.field_table()?);
        let store = StateStore::new();
        let snapshot_changed = Rc::new(Cell::new(false));
        let flag = snapshot_changed.clone();
        let subscription = store.subscribe(move |_| flag.set(true));
        let prefs = OverlayPrefs::load(&prefs_store);

        let renderer = Renderer::new(
            surface,
            Theme::from(&config.overlay),
            Duration::from_millis(config.overlay.mount_retry_initial_ms),
            Duration::from_millis(config.overlay.mount_retry_max_ms),
        );

        info!(
            fields = extractor.fields().len(),
            collapsed = prefs.collapsed,
            "[SESSION] Created"
        );

        Ok(Self {
            extractor,
            store,
            watcher: NavigationWatcher::new(&config.watcher),
            renderer,
            prefs_store,
            prefs,
            view_settings: ViewSettings::from(&config.overlay),
            poll_interval_ms: config.watcher.poll_interval_ms,
            next_sequence: 1,
            latest_ticket: None,
            last_extraction_at_ms: None,
            degraded: None,
            notice: None,
            snapshot_changed,
            _subscription: subscription,
            view: None,
            view_second: None,
            dirty: true,
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn watcher(&self) -> &NavigationWatcher {
        &self.watcher
    }

    pub fn renderer(&self) -> &Renderer<S> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<S> {
        &mut self.renderer
    }

    /// Last projected view model
    pub fn view(&self) -> Option<&OverlayViewModel> {
        self.view.as_ref()
    }

    pub fn prefs(&self) -> OverlayPrefs {
        self.prefs
    }

    /// Last extraction problem, cleared by the next successful publish
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn record_mutation(&mut self, record: MutationRecord, now_ms: u64) {
        self.watcher.record_mutation(record, now_ms);
    }

    /// Advance the session. Call on every timer tick.
    ///
    /// 1. Polls the watcher (container probe, location, settle machine)
    /// 2. Runs at most one extraction if the container appeared, the page
    ///    settled, or the poll interval elapsed
    /// 3. Re-projects the view and patches the overlay if anything changed
    pub fn update<H: HostPage + ?Sized>(&mut self, host: &H, now_ms: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let mut trigger = None;

        for event in self.watcher.poll(host, now_ms) {
            match event {
                WatchEvent::ContainerFound => {
                    trigger = Some(ExtractionTrigger::ContainerFound);
                    events.push(SessionEvent::ContainerFound);
                }
                WatchEvent::ContainerLost => events.push(SessionEvent::ContainerLost),
                WatchEvent::LocationChanged { to, .. } => {
                    events.push(SessionEvent::LocationChanged { to });
                }
                WatchEvent::Settled(settled) => {
                    if trigger.is_none() && self.watcher.container_present() {
                        trigger = Some(ExtractionTrigger::Settled);
                    }
                    events.push(SessionEvent::Settled(settled));
                }
                WatchEvent::HostIncompatible(error) => {
                    self.degraded = Some(INCOMPATIBLE_MESSAGE.to_string());
                    self.dirty = true;
                    events.push(SessionEvent::HostIncompatible(error));
                }
            }
        }

        if trigger.is_none() && self.poll_due(now_ms) {
            trigger = Some(ExtractionTrigger::Poll);
        }

        if let Some(trigger) = trigger {
            let ticket = self.begin_extraction(trigger);
            events.push(SessionEvent::ExtractionStarted {
                sequence: ticket.sequence,
                trigger,
            });
            let doc = host.capture(ticket.sequence, now_ms);
            events.extend(self.complete_extraction(ticket, &doc));
        }

        events.extend(self.refresh(now_ms));
        events
    }

    fn poll_due(&self, now_ms: u64) -> bool {
        self.poll_interval_ms > 0
            && self.watcher.container_present()
            && self
                .last_extraction_at_ms
                .is_some_and(|at| now_ms.saturating_sub(at) >= self.poll_interval_ms)
    }

    /// Issue a ticket for a new extraction. Any ticket issued earlier can no
    /// longer publish.
    pub fn begin_extraction(&mut self, trigger: ExtractionTrigger) -> ExtractionTicket {
        let ticket = ExtractionTicket {
            sequence: self.next_sequence,
            trigger,
        };
        self.next_sequence += 1;
        self.latest_ticket = Some(ticket.sequence);
        debug!(sequence = ticket.sequence, trigger = ?trigger, "[SESSION] Extraction started");
        ticket
    }

    /// Extract from a capture taken for `ticket` and publish the result
    pub fn complete_extraction(&mut self, ticket: ExtractionTicket, doc: &HostDocument) -> Vec<SessionEvent> {
        let latest = self.latest_ticket.unwrap_or(ticket.sequence);
        if ticket.sequence != latest {
            debug!(
                sequence = ticket.sequence,
                latest, "[SESSION] Discarding superseded extraction"
            );
            return vec![SessionEvent::Discarded {
                sequence: ticket.sequence,
                latest,
            }];
        }
        self.last_extraction_at_ms = Some(doc.captured_at_ms());

        match self.extractor.extract(doc) {
            Ok(snapshot) => {
                let version = snapshot.version();
                match self.store.publish(snapshot) {
                    PublishOutcome::Accepted => {
                        if self.notice.take().is_some() {
                            self.dirty = true;
                        }
                        debug!(version, trigger = ?ticket.trigger, "[SESSION] Published snapshot");
                        vec![SessionEvent::Published { version }]
                    }
                    outcome => vec![SessionEvent::Rejected { version, outcome }],
                }
            }
            Err(error) => {
                warn!(error = %error, "[SESSION] Extraction failed, keeping current snapshot");
                let notice = format!("Could not read {}", error.field);
                if self.notice.as_deref() != Some(notice.as_str()) {
                    self.notice = Some(notice);
                    self.dirty = true;
                }
                vec![SessionEvent::ExtractionFailed(error)]
            }
        }
    }

    /// Flip and persist the collapsed preference
    pub fn toggle_collapsed(&mut self) -> bool {
        self.prefs.collapsed = !self.prefs.collapsed;
        if let Err(e) = self.prefs.save(&self.prefs_store) {
            warn!(error = %e, "[SESSION] Could not persist preferences");
        }
        self.dirty = true;
        self.prefs.collapsed
    }

    /// Re-project and render when the snapshot, health, preferences or the
    /// displayed clock second changed, or the overlay needs (re)mounting.
    fn refresh(&mut self, now_ms: u64) -> Vec<SessionEvent> {
        if !self.renderer.can_render(now_ms) {
            return Vec::new();
        }
        let second = now_ms / 1000;
        let snapshot_changed = self.snapshot_changed.replace(false);
        if !(snapshot_changed
            || self.dirty
            || self.view_second != Some(second)
            || !self.renderer.is_current())
        {
            return Vec::new();
        }

        let snapshot = self.store.current();
        let view = project(
            ViewInput {
                snapshot: snapshot.as_deref(),
                degraded: self.degraded.as_deref(),
                notice: self.notice.as_deref(),
                collapsed: self.prefs.collapsed,
                now_ms,
            },
            &self.view_settings,
        );
        self.view_second = Some(second);
        self.dirty = false;

        let mut events = Vec::new();
        match self.renderer.render(&view, now_ms) {
            Ok(RenderOutcome::Unchanged) => {}
            Ok(outcome) => events.push(SessionEvent::Rendered(outcome)),
            Err(e) => {
                debug!(error = %e, "[SESSION] Render deferred");
                events.push(SessionEvent::RenderFailed(e));
            }
        }
        self.view = Some(view);
        events
    }
}

// =============================================================================
// TESTS
// =============================================================================
