//! Replay of recorded host-page frames through a full session
//!
//! A fixture is a timeline of host states. The replay advances a simulated
//! clock in fixed steps, applies every frame that became due, delivers its
//! mutation records and ticks the session, exactly like the web layer does
//! with a live page.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::config::Config;
use crate::core::document::{HostDocument, HostNode, MutationKind, MutationRecord};
use crate::core::error::ConfigError;
use crate::core::io_traits::HostPage;
use crate::core::persistence::MemoryStore;
use crate::core::renderer::MemorySurface;
use crate::core::session::{DashboardSession, SessionEvent};
use crate::core::types::Snapshot;
use crate::core::view::OverlayViewModel;

/// Simulated clock resolution
pub const STEP_MS: u64 = 100;

/// Time the replay keeps running after the last frame
const TAIL_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFixture {
    /// Page clock at offset 0, in ms since the Unix epoch
    #[serde(default)]
    pub start_ms: u64,
    /// Total length; defaults to the last frame plus a short tail
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub location: String,
    pub frames: Vec<ReplayFrame>,
}

/// Host changes at one instant. Fields left out keep their previous value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFrame {
    /// Offset from the start of the replay
    pub at_ms: u64,
    #[serde(default)]
    pub container: Option<HostNode>,
    #[serde(default)]
    pub remove_container: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub payloads: BTreeMap<String, serde_json::Value>,
    /// Host mutation records delivered with this frame
    #[serde(default)]
    pub mutations: u32,
}

impl ReplayFixture {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn end_ms(&self) -> u64 {
        self.duration_ms.unwrap_or_else(|| {
            self.frames.iter().map(|f| f.at_ms).max().unwrap_or(0) + TAIL_MS
        })
    }
}

#[derive(Debug, Default)]
struct ReplayState {
    container: Option<HostNode>,
    location: String,
    payloads: BTreeMap<String, serde_json::Value>,
}

/// HostPage backed by the fixture's current frame
#[derive(Debug, Default)]
pub struct ReplayHost {
    state: RefCell<ReplayState>,
}

impl ReplayHost {
    pub fn new(location: &str) -> Self {
        Self {
            state: RefCell::new(ReplayState {
                location: location.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn apply(&self, frame: &ReplayFrame) {
        let mut state = self.state.borrow_mut();
        if frame.remove_container {
            state.container = None;
        }
        if let Some(container) = &frame.container {
            state.container = Some(container.clone());
        }
        if let Some(location) = &frame.location {
            state.location = location.clone();
        }
        for (channel, value) in &frame.payloads {
            state.payloads.insert(channel.clone(), value.clone());
        }
    }
}

impl HostPage for ReplayHost {
    fn has_container(&self) -> bool {
        self.state.borrow().container.is_some()
    }

    fn location(&self) -> String {
        self.state.borrow().location.clone()
    }

    fn capture(&self, sequence: u64, now_ms: u64) -> HostDocument {
        let state = self.state.borrow();
        let root = state.container.clone().unwrap_or_default();
        state.payloads.iter().fold(
            HostDocument::new(sequence, now_ms, &state.location, root),
            |doc, (channel, value)| doc.with_payload(channel, value.clone()),
        )
    }
}

/// A session event stamped with the replay offset it happened at
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub at_ms: u64,
    pub event: SessionEvent,
}

#[derive(Debug)]
pub struct ReplayReport {
    pub events: Vec<TimedEvent>,
    pub snapshot: Option<Arc<Snapshot>>,
    pub view: Option<OverlayViewModel>,
    /// Final overlay markup
    pub html: Option<String>,
}

pub fn run_replay(fixture: &ReplayFixture, config: &Config) -> Result<ReplayReport, ConfigError> {
    let mut session = DashboardSession::new(config, MemorySurface::new(), MemoryStore::new())?;
    let host = ReplayHost::new(&fixture.location);

    let mut frames: Vec<&ReplayFrame> = fixture.frames.iter().collect();
    frames.sort_by_key(|f| f.at_ms);
    let mut frames = frames.into_iter().peekable();

    let end = fixture.end_ms();
    let mut events = Vec::new();
    let mut offset = 0;
    while offset <= end {
        let now = fixture.start_ms + offset;
        while let Some(frame) = frames.next_if(|f| f.at_ms <= offset) {
            host.apply(frame);
            for _ in 0..frame.mutations {
                session.record_mutation(MutationRecord::host(MutationKind::ChildList), now);
            }
        }
        events.extend(
            session
                .update(&host, now)
                .into_iter()
                .map(|event| TimedEvent { at_ms: offset, event }),
        );
        offset += STEP_MS;
    }

    info!(
        frames = fixture.frames.len(),
        events = events.len(),
        "[REPLAY] Finished"
    );

    Ok(ReplayReport {
        events,
        snapshot: session.store().current(),
        view: session.view().cloned(),
        html: session.renderer().surface().tree().map(|tree| tree.to_html()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fields::RESOURCE_LEVEL;
    use crate::core::io_traits::mocks::alliance_page;

    fn fixture() -> ReplayFixture {
        ReplayFixture {
            start_ms: 1_700_000_000_000,
            duration_ms: None,
            location: "https://game.example/alliance".to_string(),
            frames: vec![
                ReplayFrame {
                    at_ms: 600,
                    container: Some(alliance_page(2, 100)),
                    ..Default::default()
                },
                ReplayFrame {
                    at_ms: 2_000,
                    container: Some(alliance_page(2, 250)),
                    mutations: 3,
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_replay_publishes_latest_state() {
        let report = run_replay(&fixture(), &Config::default()).unwrap();
        let snapshot = report.snapshot.unwrap();
        assert_eq!(snapshot.integer(RESOURCE_LEVEL), Some(250));
        assert!(report.html.unwrap().contains("250"));
        assert!(matches!(report.view, Some(OverlayViewModel::Ready(_))));
    }

    #[test]
    fn test_replay_event_timeline() {
        let report = run_replay(&fixture(), &Config::default()).unwrap();
        let found = report
            .events
            .iter()
            .find(|e| e.event == SessionEvent::ContainerFound)
            .unwrap();
        // Probes at 0, 300 and 800; the container shows up at 600
        assert_eq!(found.at_ms, 800);

        let published: Vec<u64> = report
            .events
            .iter()
            .filter_map(|e| match e.event {
                SessionEvent::Published { version } => Some(version),
                _ => None,
            })
            .collect();
        assert_eq!(published, vec![1, 2]);
    }

    #[test]
    fn test_fixture_from_json() {
        let json = r#"{
            "location": "https://game.example/alliance",
            "frames": [
                {"at_ms": 0, "container": {"tag": "main", "children": [
                    {"tag": "span", "attrs": {"data-alliance-name": ""}, "text": "Iron Wolves"},
                    {"tag": "span", "attrs": {"data-member-count": ""}, "text": "3"},
                    {"tag": "span", "attrs": {"data-resource-level": ""}, "text": "1.5K"}
                ]}},
                {"at_ms": 1000, "location": "https://game.example/alliance?tab=2"}
            ]
        }"#;
        let fixture = ReplayFixture::from_json(json).unwrap();
        assert_eq!(fixture.frames.len(), 2);

        let report = run_replay(&fixture, &Config::default()).unwrap();
        assert_eq!(report.snapshot.unwrap().integer(RESOURCE_LEVEL), Some(1_500));
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e.event, SessionEvent::LocationChanged { .. })));
    }
}
