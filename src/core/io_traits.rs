//! I/O traits for host page access
//!
//! The live page is only reachable from the wasm layer. Everything the
//! session needs from it goes through `HostPage`, so the engine runs
//! unchanged against mocks and recorded replays on any host.

use crate::core::document::HostDocument;

// =============================================================================
// HOST PAGE TRAIT
// =============================================================================

/// Read-only access to the host game page
pub trait HostPage {
    /// Whether the host's alliance container is currently present
    fn has_container(&self) -> bool;

    /// Current page location (URL, including the SPA route)
    fn location(&self) -> String;

    /// Copy the container subtree and intercepted payloads into an owned
    /// document. Called only after `has_container()` returned true.
    fn capture(&self, sequence: u64, now_ms: u64) -> HostDocument;
}

// =============================================================================
// MOCK IMPLEMENTATIONS (for testing)
// =============================================================================

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::core::document::HostNode;
    use crate::core::format::format_number;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    /// Mock host page for testing
    ///
    /// Tests swap the container tree between calls to simulate the host's
    /// own re-renders and count how often the session captured it.
    pub struct MockHostPage {
        /// `None` means the container is absent
        pub container: RefCell<Option<HostNode>>,
        pub location: RefCell<String>,
        pub payloads: RefCell<BTreeMap<String, serde_json::Value>>,
        /// Number of captures taken
        pub captures: Cell<u32>,
    }

    impl MockHostPage {
        pub fn new(container: HostNode) -> Self {
            Self {
                container: RefCell::new(Some(container)),
                location: RefCell::new("https://game.example/alliance".to_string()),
                payloads: RefCell::new(BTreeMap::new()),
                captures: Cell::new(0),
            }
        }

        /// A page where the container never shows up
        pub fn empty() -> Self {
            let page = Self::new(HostNode::element("main"));
            *page.container.borrow_mut() = None;
            page
        }

        pub fn set_container(&self, container: Option<HostNode>) {
            *self.container.borrow_mut() = container;
        }

        pub fn set_location(&self, location: &str) {
            *self.location.borrow_mut() = location.to_string();
        }

        pub fn set_payload(&self, channel: &str, value: serde_json::Value) {
            self.payloads.borrow_mut().insert(channel.to_string(), value);
        }
    }

    impl HostPage for MockHostPage {
        fn has_container(&self) -> bool {
            self.container.borrow().is_some()
        }

        fn location(&self) -> String {
            self.location.borrow().clone()
        }

        fn capture(&self, sequence: u64, now_ms: u64) -> HostDocument {
            self.captures.set(self.captures.get() + 1);
            let root = self.container.borrow().clone().unwrap_or_default();
            let mut doc = HostDocument::new(sequence, now_ms, &self.location.borrow(), root);
            for (channel, value) in self.payloads.borrow().iter() {
                doc = doc.with_payload(channel, value.clone());
            }
            doc
        }
    }

    fn member_power(index: usize) -> i64 {
        (1_200_000 - 350_000 * index as i64).max(50_000)
    }

    /// Alliance panel markup as the game renders it
    pub fn alliance_page(members: usize, resources: i64) -> HostNode {
        let total_power: i64 = (0..members).map(member_power).sum();

        let mut list = HostNode::element("ul").with_class("member-list");
        for i in 0..members {
            let rank = if i == 0 { "Leader" } else { "Member" };
            list = list.with_child(
                HostNode::element("li")
                    .with_class("member-row")
                    .with_attr("data-member-id", &(100 + i).to_string())
                    .with_child(
                        HostNode::element("span")
                            .with_class("member-name")
                            .with_text(&format!("Player {}", i + 1)),
                    )
                    .with_child(HostNode::element("span").with_class("member-rank").with_text(rank))
                    .with_child(
                        HostNode::element("span")
                            .with_class("member-power")
                            .with_text(&format_number(member_power(i))),
                    ),
            );
        }

        let panel = HostNode::element("section")
            .with_class("alliance-panel")
            .with_child(
                HostNode::element("header")
                    .with_class("alliance-header")
                    .with_child(HostNode::element("h2").with_class("alliance-name").with_text(" Iron  Wolves "))
                    .with_child(HostNode::element("span").with_class("alliance-tag").with_text("IW")),
            )
            .with_child(
                HostNode::element("div").with_class("alliance-members").with_child(
                    HostNode::element("span")
                        .with_class("count")
                        .with_text(&members.to_string()),
                ),
            )
            .with_child(
                HostNode::element("div").with_class("alliance-resources").with_child(
                    HostNode::element("span")
                        .with_class("level")
                        .with_text(&format_number(resources)),
                ),
            )
            .with_child(
                HostNode::element("div").with_class("alliance-power").with_child(
                    HostNode::element("span")
                        .with_class("value")
                        .with_text(&format_number(total_power)),
                ),
            )
            .with_child(
                HostNode::element("div")
                    .with_class("alliance-event")
                    .with_child(HostNode::element("span").with_class("timer").with_text("01:02:05")),
            )
            .with_child(list);

        HostNode::element("main").with_attr("id", "game-root").with_child(panel)
    }

    #[test]
    fn test_mock_capture_counts_and_copies() {
        let page = MockHostPage::new(alliance_page(2, 10));
        page.set_payload("alliance", serde_json::json!({"id": 7}));

        let doc = page.capture(3, 1_000);
        assert_eq!(page.captures.get(), 1);
        assert_eq!(doc.sequence(), 3);
        assert_eq!(doc.root().id(), Some("game-root"));
        assert_eq!(doc.payload("alliance"), Some(&serde_json::json!({"id": 7})));
    }

    #[test]
    fn test_empty_page_has_no_container() {
        let page = MockHostPage::empty();
        assert!(!page.has_container());
        page.set_container(Some(alliance_page(1, 1)));
        assert!(page.has_container());
    }

    #[test]
    fn test_alliance_page_totals() {
        let page = alliance_page(2, 12_500);
        let text = page.text_content();
        assert!(text.contains("2,050,000"));
        assert!(text.contains("12,500"));
    }
}
