//! Live DOM access for the session

use js_sys::{Reflect, JSON};
use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, Node, Window};

use crate::core::config::{Config, PayloadSource};
use crate::core::document::{HostDocument, HostNode, OVERLAY_ROOT_ATTR};
use crate::core::io_traits::HostPage;

/// Elements whose content is never alliance data
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "svg", "template"];

/// Host subtrees deeper than this are cut off
const MAX_DEPTH: usize = 48;

pub struct DomHost {
    window: Window,
    document: Document,
    selectors: Vec<String>,
    payloads: Vec<PayloadSource>,
}

impl DomHost {
    pub fn new(window: Window, document: Document, config: &Config) -> Self {
        Self {
            window,
            document,
            selectors: config.watcher.container_selectors(),
            payloads: config.payloads.clone(),
        }
    }

    /// First selector that matches wins
    pub fn container(&self) -> Option<Element> {
        self.selectors
            .iter()
            .find_map(|selector| self.document.query_selector(selector).ok().flatten())
    }

    fn read_payload(&self, source: &PayloadSource) -> Option<serde_json::Value> {
        let mut value: JsValue = self.window.clone().into();
        for key in source.global.split('.') {
            value = Reflect::get(&value, &JsValue::from_str(key)).ok()?;
            if value.is_undefined() || value.is_null() {
                return None;
            }
        }
        let json: String = JSON::stringify(&value).ok()?.into();
        match serde_json::from_str(&json) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(channel = %source.channel, error = %e, "[EXTRACT] Payload is not JSON");
                None
            }
        }
    }
}

fn copy_element(el: &Element, depth: usize) -> HostNode {
    let mut node = HostNode::element(&el.tag_name());
    for name in el.get_attribute_names().iter().filter_map(|n| n.as_string()) {
        if let Some(value) = el.get_attribute(&name) {
            node.attrs.insert(name, value);
        }
    }

    let children = el.child_nodes();
    for i in 0..children.length() {
        let Some(child) = children.get(i) else {
            continue;
        };
        match child.node_type() {
            Node::TEXT_NODE => {
                if let Some(text) = child.text_content() {
                    // Text after a child element belongs to that child's tail
                    let slot = match node.children.last_mut() {
                        Some(previous) => &mut previous.tail,
                        None => &mut node.text,
                    };
                    if !slot.is_empty() {
                        slot.push(' ');
                    }
                    slot.push_str(&text);
                }
            }
            Node::ELEMENT_NODE if depth < MAX_DEPTH => {
                let Ok(child) = child.dyn_into::<Element>() else {
                    continue;
                };
                let tag = child.tag_name().to_ascii_lowercase();
                if child.has_attribute(OVERLAY_ROOT_ATTR) || SKIPPED_TAGS.contains(&tag.as_str()) {
                    continue;
                }
                node.children.push(copy_element(&child, depth + 1));
            }
            _ => {}
        }
    }
    node
}

impl HostPage for DomHost {
    fn has_container(&self) -> bool {
        self.container().is_some()
    }

    fn location(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn capture(&self, sequence: u64, now_ms: u64) -> HostDocument {
        let root = self
            .container()
            .map(|el| copy_element(&el, 0))
            .unwrap_or_default();
        debug!(sequence, nodes = root.descendants().count(), "[EXTRACT] Captured host");

        let location = self.location();
        self.payloads.iter().fold(
            HostDocument::new(sequence, now_ms, &location, root),
            |doc, source| match self.read_payload(source) {
                Some(value) => doc.with_payload(&source.channel, value),
                None => doc,
            },
        )
    }
}
