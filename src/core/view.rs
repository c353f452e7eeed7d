//! Overlay view model - what the dashboard shows, derived from a snapshot
//!
//! Projection is a pure function of the current snapshot, the session's
//! health, UI preferences and the clock. Nothing here is written back.

use std::time::Duration;

use serde::Serialize;

use super::config::OverlaySettings;
use super::fields::{ALLIANCE_NAME, ALLIANCE_TAG, EVENT_TIMER, MEMBER_COUNT, RESOURCE_LEVEL, ROSTER, TOTAL_POWER};
use super::format::{format_age, format_countdown, format_number};
use super::status_template::{render_template, RenderedLine, TemplateContext};
use super::types::Snapshot;

pub const LOADING_TEXT: &str = "Loading alliance data…";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatRow {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterRow {
    pub name: String,
    pub rank: Option<String>,
    pub power: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub version: u64,
    #[serde(skip)]
    pub header: Vec<RenderedLine>,
    pub stats: Vec<StatRow>,
    pub roster: Vec<RosterRow>,
    /// Roster rows hidden by the row cap
    pub roster_overflow: usize,
    pub stale: bool,
    pub age_text: String,
    pub collapsed: bool,
    /// Last extraction problem, shown under the data that is still current
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OverlayViewModel {
    Loading { notice: Option<String> },
    Degraded { message: String },
    Ready(DashboardView),
}

impl OverlayViewModel {
    pub fn version(&self) -> Option<u64> {
        match self {
            OverlayViewModel::Ready(view) => Some(view.version),
            _ => None,
        }
    }
}

/// Settings used by the projection
#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub status_template: String,
    pub stale_after_ms: u64,
    pub max_roster_rows: usize,
}

impl From<&OverlaySettings> for ViewSettings {
    fn from(settings: &OverlaySettings) -> Self {
        Self {
            status_template: settings.status_template.clone(),
            stale_after_ms: settings.stale_after_secs.saturating_mul(1000),
            max_roster_rows: settings.max_roster_rows,
        }
    }
}

/// Everything the projection reads
#[derive(Debug, Clone, Copy)]
pub struct ViewInput<'a> {
    pub snapshot: Option<&'a Snapshot>,
    /// Fatal host problem; overrides everything else
    pub degraded: Option<&'a str>,
    pub notice: Option<&'a str>,
    pub collapsed: bool,
    pub now_ms: u64,
}

pub fn project(input: ViewInput<'_>, settings: &ViewSettings) -> OverlayViewModel {
    if let Some(message) = input.degraded {
        return OverlayViewModel::Degraded {
            message: message.to_string(),
        };
    }
    let Some(snapshot) = input.snapshot else {
        return OverlayViewModel::Loading {
            notice: input.notice.map(str::to_string),
        };
    };

    let age_ms = input.now_ms.saturating_sub(snapshot.captured_at_ms());

    let header = render_template(
        &settings.status_template,
        &TemplateContext {
            alliance: snapshot.text(ALLIANCE_NAME).map(str::to_string),
            tag: snapshot.text(ALLIANCE_TAG).map(str::to_string),
            members: snapshot.integer(MEMBER_COUNT),
            resources: snapshot.integer(RESOURCE_LEVEL),
            power: snapshot.integer(TOTAL_POWER),
        },
    );

    let mut stats = Vec::new();
    if let Some(members) = snapshot.integer(MEMBER_COUNT) {
        stats.push(stat("Members", members.to_string()));
    }
    if let Some(resources) = snapshot.integer(RESOURCE_LEVEL) {
        stats.push(stat("Resources", format_number(resources)));
    }
    if let Some(power) = snapshot.integer(TOTAL_POWER) {
        stats.push(stat("Power", format_number(power)));
    }
    if let Some(timer) = snapshot.duration(EVENT_TIMER) {
        let remaining = timer.saturating_sub(Duration::from_millis(age_ms));
        let value = if remaining.is_zero() {
            "ended".to_string()
        } else {
            format_countdown(remaining)
        };
        stats.push(stat("Event", value));
    }

    let members = snapshot.roster(ROSTER).unwrap_or_default();
    let roster = members
        .iter()
        .take(settings.max_roster_rows)
        .map(|m| RosterRow {
            name: m.name.clone(),
            rank: m.rank.clone(),
            power: m.power.map(format_number),
        })
        .collect();

    OverlayViewModel::Ready(DashboardView {
        version: snapshot.version(),
        header,
        stats,
        roster,
        roster_overflow: members.len().saturating_sub(settings.max_roster_rows),
        stale: age_ms > settings.stale_after_ms,
        age_text: format!("updated {}", format_age(age_ms)),
        collapsed: input.collapsed,
        notice: input.notice.map(str::to_string),
    })
}

fn stat(label: &str, value: String) -> StatRow {
    StatRow {
        label: label.to_string(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{timestamp_from_ms, FieldValue, Member};
    use std::collections::BTreeMap;

    const CAPTURED: u64 = 1_700_000_000_000;

    fn settings() -> ViewSettings {
        ViewSettings::from(&OverlaySettings {
            max_roster_rows: 2,
            ..Default::default()
        })
    }

    fn snapshot(members: usize) -> Snapshot {
        let mut fields = BTreeMap::new();
        fields.insert(ALLIANCE_NAME.to_string(), FieldValue::Text("Iron Wolves".into()));
        fields.insert(MEMBER_COUNT.to_string(), FieldValue::Integer(members as i64));
        fields.insert(RESOURCE_LEVEL.to_string(), FieldValue::Integer(12_500));
        fields.insert(EVENT_TIMER.to_string(), FieldValue::Duration(Duration::from_secs(90)));
        fields.insert(
            ROSTER.to_string(),
            FieldValue::Roster(
                (0..members)
                    .map(|i| Member {
                        name: format!("P{}", i),
                        rank: None,
                        power: Some(1_000),
                    })
                    .collect(),
            ),
        );
        Snapshot::new(3, timestamp_from_ms(CAPTURED), fields, true, Vec::new())
    }

    fn input(snapshot: Option<&Snapshot>, now_ms: u64) -> ViewInput<'_> {
        ViewInput {
            snapshot,
            degraded: None,
            notice: None,
            collapsed: false,
            now_ms,
        }
    }

    fn ready(model: OverlayViewModel) -> DashboardView {
        match model {
            OverlayViewModel::Ready(view) => view,
            other => panic!("expected ready view, got {:?}", other),
        }
    }

    #[test]
    fn test_loading_without_snapshot() {
        let model = project(input(None, 0), &settings());
        assert_eq!(model, OverlayViewModel::Loading { notice: None });
    }

    #[test]
    fn test_degraded_wins() {
        let snap = snapshot(1);
        let model = project(
            ViewInput {
                degraded: Some("Alliance page not recognised"),
                ..input(Some(&snap), CAPTURED)
            },
            &settings(),
        );
        assert!(matches!(model, OverlayViewModel::Degraded { .. }));
    }

    #[test]
    fn test_ready_view_contents() {
        let snap = snapshot(2);
        let view = ready(project(input(Some(&snap), CAPTURED + 30_000), &settings()));

        assert_eq!(view.version, 3);
        assert_eq!(view.header[0].text(), "Iron Wolves");
        assert_eq!(view.header[1].text(), "2 members");
        assert_eq!(
            view.stats,
            vec![
                stat("Members", "2".into()),
                stat("Resources", "12,500".into()),
                stat("Event", "1:00".into()),
            ]
        );
        assert_eq!(view.roster.len(), 2);
        assert_eq!(view.roster[0].power.as_deref(), Some("1,000"));
        assert!(!view.stale);
        assert_eq!(view.age_text, "updated 30s ago");
    }

    #[test]
    fn test_countdown_floors_at_zero() {
        let snap = snapshot(1);
        let view = ready(project(input(Some(&snap), CAPTURED + 600_000), &settings()));
        assert_eq!(view.stats.last().unwrap().value, "ended");
    }

    #[test]
    fn test_roster_overflow() {
        let snap = snapshot(5);
        let view = ready(project(input(Some(&snap), CAPTURED), &settings()));
        assert_eq!(view.roster.len(), 2);
        assert_eq!(view.roster_overflow, 3);
    }

    #[test]
    fn test_stale_after_threshold() {
        let snap = snapshot(1);
        let fresh = ready(project(input(Some(&snap), CAPTURED + 120_000), &settings()));
        let stale = ready(project(input(Some(&snap), CAPTURED + 120_001), &settings()));
        assert!(!fresh.stale);
        assert!(stale.stale);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let snap = snapshot(2);
        let a = project(input(Some(&snap), CAPTURED + 5_000), &settings());
        let b = project(input(Some(&snap), CAPTURED + 5_000), &settings());
        assert_eq!(a, b);
    }
}
