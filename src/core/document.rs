//! Host document capture
//!
//! The live host page is a shared, externally mutated resource. Extraction
//! never reads it directly: the platform layer copies the host container
//! subtree into an owned [`HostDocument`] in one synchronous pass, and the
//! extractor works on that copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute marking the overlay's own host element in the page.
pub const OVERLAY_ROOT_ATTR: &str = "data-adp-overlay";

// =============================================================================
// HOST NODE
// =============================================================================

/// One element of the captured host tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNode {
    /// Lower-case tag name
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Direct text before the first child element
    #[serde(default)]
    pub text: String,
    /// Parent's text that follows this element, up to the next sibling element
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tail: String,
    #[serde(default)]
    pub children: Vec<HostNode>,
}

impl HostNode {
    pub fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_class(self, class: &str) -> Self {
        self.with_attr("class", class)
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_tail(mut self, tail: &str) -> Self {
        self.tail = tail.to_string();
        self
    }

    pub fn with_child(mut self, child: HostNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// Text of this node and all descendants in document order,
    /// whitespace-normalised
    pub fn text_content(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, out: &mut String) {
        out.push(' ');
        out.push_str(&self.text);
        for child in &self.children {
            child.collect_text(out);
            out.push(' ');
            out.push_str(&child.tail);
        }
    }

    /// Pre-order iterator over this node and every descendant
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a HostNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a HostNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

// =============================================================================
// HOST DOCUMENT
// =============================================================================

/// Owned capture of the host page at one instant.
///
/// `sequence` is assigned by the session when the capture is requested and
/// becomes the version of any snapshot extracted from it.
#[derive(Debug, Clone, PartialEq)]
pub struct HostDocument {
    sequence: u64,
    captured_at_ms: u64,
    location: String,
    root: HostNode,
    payloads: BTreeMap<String, serde_json::Value>,
}

impl HostDocument {
    pub fn new(sequence: u64, captured_at_ms: u64, location: &str, root: HostNode) -> Self {
        Self {
            sequence,
            captured_at_ms,
            location: location.to_string(),
            root,
            payloads: BTreeMap::new(),
        }
    }

    /// Attach an observed in-page data payload under a channel name
    pub fn with_payload(mut self, channel: &str, value: serde_json::Value) -> Self {
        self.payloads.insert(channel.to_string(), value);
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at_ms
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn root(&self) -> &HostNode {
        &self.root
    }

    pub fn payload(&self, channel: &str) -> Option<&serde_json::Value> {
        self.payloads.get(channel)
    }
}

// =============================================================================
// MUTATION RECORDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

/// Where a mutation happened relative to the host container and the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOrigin {
    /// Inside the host container, or inserting a new container
    Host,
    /// Inside the overlay's own subtree; never counts as host activity
    Overlay,
    /// Elsewhere on the page (chat panes, ads, clocks)
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub origin: MutationOrigin,
}

impl MutationRecord {
    pub fn host(kind: MutationKind) -> Self {
        Self {
            kind,
            origin: MutationOrigin::Host,
        }
    }

    pub fn overlay(kind: MutationKind) -> Self {
        Self {
            kind,
            origin: MutationOrigin::Overlay,
        }
    }

    pub fn outside(kind: MutationKind) -> Self {
        Self {
            kind,
            origin: MutationOrigin::Outside,
        }
    }
}
