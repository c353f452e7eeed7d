//! Extractor - turns a captured host document into a Snapshot
//!
//! Pure: it only reads the owned capture. A missing or invalid required
//! field fails the whole pass with an explicit error instead of producing a
//! partially filled snapshot.

use std::collections::BTreeMap;

use tracing::debug;

use super::document::HostDocument;
use super::error::ExtractionError;
use super::fields::{FieldDescriptor, MEMBER_COUNT, ROSTER};
use super::types::{timestamp_from_ms, FieldValue, Snapshot};

pub struct Extractor {
    fields: Vec<FieldDescriptor>,
}

impl Extractor {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Extract one snapshot. Its version is the capture sequence number.
    pub fn extract(&self, doc: &HostDocument) -> Result<Snapshot, ExtractionError> {
        let mut values = BTreeMap::new();
        let mut missing = Vec::new();

        for field in &self.fields {
            let located = field.locator.all(doc);
            match field.parse(&located) {
                Ok(value) => {
                    values.insert(field.name.clone(), value);
                }
                Err(reason) if field.required => {
                    debug!(
                        field = %field.name,
                        locator = %field.locator,
                        reason = %reason,
                        "[EXTRACT] Required field failed"
                    );
                    return Err(ExtractionError::new(field.name.as_str(), reason));
                }
                Err(reason) => {
                    debug!(field = %field.name, reason = %reason, "[EXTRACT] Optional field skipped");
                    missing.push(field.name.clone());
                }
            }
        }

        let valid = is_consistent(&values);
        if !valid {
            debug!(sequence = doc.sequence(), "[EXTRACT] Inconsistent capture");
        }

        Ok(Snapshot::new(
            doc.sequence(),
            timestamp_from_ms(doc.captured_at_ms()),
            values,
            valid,
            missing,
        ))
    }
}

/// Cross-field checks that catch a capture taken mid-render
fn is_consistent(values: &BTreeMap<String, FieldValue>) -> bool {
    let count = values.get(MEMBER_COUNT).and_then(FieldValue::as_integer);
    let roster = values.get(ROSTER).and_then(FieldValue::as_roster);
    match (count, roster) {
        (Some(count), Some(rows)) => rows.len() as i64 <= count,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::HostNode;
    use crate::core::error::ExtractionFailure;
    use crate::core::fields::{alliance_fields, ALLIANCE_NAME, EVENT_TIMER, RESOURCE_LEVEL, TOTAL_POWER};
    use crate::core::io_traits::mocks::alliance_page;
    use std::time::Duration;

    fn extractor() -> Extractor {
        Extractor::new(alliance_fields().unwrap())
    }

    fn doc(sequence: u64, root: HostNode) -> HostDocument {
        HostDocument::new(sequence, 1_700_000_000_000, "https://game.example/alliance", root)
    }

    #[test]
    fn test_extract_full_page() {
        let snap = extractor().extract(&doc(4, alliance_page(2, 12_500))).unwrap();
        assert_eq!(snap.version(), 4);
        assert!(snap.is_valid());
        assert_eq!(snap.text(ALLIANCE_NAME), Some("Iron Wolves"));
        assert_eq!(snap.integer(MEMBER_COUNT), Some(2));
        assert_eq!(snap.integer(RESOURCE_LEVEL), Some(12_500));
        assert_eq!(snap.integer(TOTAL_POWER), Some(2_050_000));
        assert_eq!(snap.duration(EVENT_TIMER), Some(Duration::from_secs(3_725)));
        assert_eq!(snap.roster(ROSTER).unwrap().len(), 2);
        assert!(snap.missing().is_empty());
        assert_eq!(snap.captured_at_ms(), 1_700_000_000_000);
    }

    #[test]
    fn test_missing_resource_level_is_an_error() {
        let mut page = alliance_page(2, 12_500);
        strip_class(&mut page, "alliance-resources");

        let err = extractor().extract(&doc(1, page)).unwrap_err();
        assert_eq!(err.field, "resourceLevel");
        assert_eq!(err.reason, ExtractionFailure::NotFound);
    }

    #[test]
    fn test_invalid_required_value_is_an_error() {
        let page = HostNode::element("main")
            .with_child(HostNode::element("h2").with_attr("data-alliance-name", "").with_text("Iron Wolves"))
            .with_child(HostNode::element("span").with_attr("data-member-count", "").with_text("900"))
            .with_child(HostNode::element("span").with_attr("data-resource-level", "").with_text("10"));
        let err = extractor().extract(&doc(1, page)).unwrap_err();
        assert_eq!(err.field, MEMBER_COUNT);
        assert!(matches!(err.reason, ExtractionFailure::Invalid { .. }));
    }

    #[test]
    fn test_optional_fields_are_reported_missing() {
        let page = HostNode::element("main")
            .with_child(HostNode::element("h2").with_attr("data-alliance-name", "").with_text("Iron Wolves"))
            .with_child(HostNode::element("span").with_attr("data-member-count", "").with_text("12"))
            .with_child(HostNode::element("span").with_attr("data-resource-level", "").with_text("3.4K"));
        let snap = extractor().extract(&doc(1, page)).unwrap();
        assert!(snap.is_valid());
        assert_eq!(snap.integer(RESOURCE_LEVEL), Some(3_400));
        assert!(snap.missing().contains(&ROSTER.to_string()));
        assert!(snap.missing().contains(&EVENT_TIMER.to_string()));
    }

    #[test]
    fn test_roster_longer_than_member_count_is_inconsistent() {
        let mut page = alliance_page(3, 100);
        set_member_count(&mut page, "2");
        let snap = extractor().extract(&doc(1, page)).unwrap();
        assert!(!snap.is_valid());
    }

    #[test]
    fn test_oversized_event_timer_is_dropped() {
        let mut page = alliance_page(2, 100);
        set_timer(&mut page, "999999999999999d");
        let snap = extractor().extract(&doc(1, page)).unwrap();
        assert!(snap.is_valid());
        assert_eq!(snap.duration(EVENT_TIMER), None);
        assert!(snap.missing().contains(&EVENT_TIMER.to_string()));
    }

    #[test]
    fn test_extract_does_not_touch_input() {
        let page = alliance_page(2, 100);
        let captured = doc(1, page.clone());
        let _ = extractor().extract(&captured);
        assert_eq!(captured.root(), &page);
    }

    #[test]
    fn test_extract_from_payload() {
        let table = crate::core::fields::apply_overrides(
            alliance_fields().unwrap(),
            &[crate::core::fields::FieldOverride {
                name: RESOURCE_LEVEL.to_string(),
                locator: Some("payload:alliance:/stats/resources".to_string()),
                ..Default::default()
            }],
        )
        .unwrap();
        let mut page = alliance_page(2, 1);
        strip_class(&mut page, "alliance-resources");
        let captured = doc(1, page).with_payload(
            "alliance",
            serde_json::json!({"stats": {"resources": 98765}}),
        );
        let snap = Extractor::new(table).extract(&captured).unwrap();
        assert_eq!(snap.integer(RESOURCE_LEVEL), Some(98_765));
    }

    fn strip_class(node: &mut HostNode, class: &str) {
        node.children.retain(|c| !c.has_class(class));
        for child in &mut node.children {
            strip_class(child, class);
        }
    }

    fn set_timer(node: &mut HostNode, value: &str) {
        if node.has_class("timer") {
            node.text = value.to_string();
        }
        for child in &mut node.children {
            set_timer(child, value);
        }
    }

    fn set_member_count(node: &mut HostNode, value: &str) {
        if node.has_class("count") {
            node.text = value.to_string();
        }
        for child in &mut node.children {
            set_member_count(child, value);
        }
    }
}
