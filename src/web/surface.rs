//! Shadow-root overlay surface
//!
//! The overlay lives in a shadow root attached to its own host element under
//! `<body>`, outside the game's container, so host styles don't leak in and
//! host re-renders don't wipe it.

use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Node, ShadowRoot, ShadowRootInit, ShadowRootMode};

use crate::core::document::OVERLAY_ROOT_ATTR;
use crate::core::error::RenderError;
use crate::core::overlay::OverlayNode;
use crate::core::renderer::{OverlaySurface, Patch};

pub struct ShadowSurface {
    document: Document,
    host: Element,
    shadow: ShadowRoot,
}

fn js_error(context: &str, value: wasm_bindgen::JsValue) -> RenderError {
    RenderError::Surface(format!("{context}: {value:?}"))
}

impl ShadowSurface {
    /// Create the (still detached) host element and its shadow root
    pub fn new(document: Document) -> Result<Self, RenderError> {
        let host = document
            .create_element("div")
            .map_err(|e| js_error("create host", e))?;
        host.set_attribute(OVERLAY_ROOT_ATTR, "")
            .map_err(|e| js_error("mark host", e))?;
        let shadow = host
            .attach_shadow(&ShadowRootInit::new(ShadowRootMode::Open))
            .map_err(|e| js_error("attach shadow", e))?;
        Ok(Self {
            document,
            host,
            shadow,
        })
    }

    pub fn host(&self) -> &Element {
        &self.host
    }

    pub fn shadow_root(&self) -> &ShadowRoot {
        &self.shadow
    }

    fn create(&self, node: &OverlayNode) -> Result<Node, RenderError> {
        match node {
            OverlayNode::Text(text) => Ok(self.document.create_text_node(text).into()),
            OverlayNode::Element {
                tag,
                attrs,
                children,
            } => {
                let el = self
                    .document
                    .create_element(tag)
                    .map_err(|e| js_error("create element", e))?;
                for (name, value) in attrs {
                    el.set_attribute(name, value)
                        .map_err(|e| js_error("set attribute", e))?;
                }
                for child in children {
                    el.append_child(&self.create(child)?)
                        .map_err(|e| js_error("append", e))?;
                }
                Ok(el.into())
            }
        }
    }

    fn root(&self) -> Option<Node> {
        self.shadow.first_child()
    }

    fn node_at(&self, path: &[usize]) -> Result<Node, RenderError> {
        let target = || RenderError::PatchTarget {
            path: path.to_vec(),
        };
        let mut node = self.root().ok_or_else(target)?;
        for &i in path {
            node = node.child_nodes().get(i as u32).ok_or_else(target)?;
        }
        Ok(node)
    }

    fn element_at(&self, path: &[usize]) -> Result<Element, RenderError> {
        self.node_at(path)?
            .dyn_into::<Element>()
            .map_err(|_| RenderError::PatchTarget {
                path: path.to_vec(),
            })
    }

    fn apply_one(&self, patch: &Patch) -> Result<(), RenderError> {
        match patch {
            Patch::Replace { path, node } => {
                let old = self.node_at(path)?;
                let parent = old.parent_node().ok_or_else(|| RenderError::PatchTarget {
                    path: path.clone(),
                })?;
                parent
                    .replace_child(&self.create(node)?, &old)
                    .map_err(|e| js_error("replace", e))?;
            }
            Patch::SetText { path, text } => {
                self.node_at(path)?.set_text_content(Some(text.as_str()));
            }
            Patch::SetAttr { path, name, value } => {
                self.element_at(path)?
                    .set_attribute(name, value)
                    .map_err(|e| js_error("set attribute", e))?;
            }
            Patch::RemoveAttr { path, name } => {
                self.element_at(path)?
                    .remove_attribute(name)
                    .map_err(|e| js_error("remove attribute", e))?;
            }
            Patch::Append { path, node } => {
                self.node_at(path)?
                    .append_child(&self.create(node)?)
                    .map_err(|e| js_error("append", e))?;
            }
            Patch::Truncate { path, len } => {
                let parent = self.node_at(path)?;
                while parent.child_nodes().length() as usize > *len {
                    let Some(last) = parent.last_child() else {
                        break;
                    };
                    parent
                        .remove_child(&last)
                        .map_err(|e| js_error("truncate", e))?;
                }
            }
        }
        Ok(())
    }
}

impl OverlaySurface for ShadowSurface {
    fn is_mounted(&self) -> bool {
        self.host.is_connected() && self.root().is_some()
    }

    fn mount(&mut self, root: &OverlayNode) -> Result<(), RenderError> {
        if !self.host.is_connected() {
            // Body can be missing while the SPA swaps documents
            let body = self
                .document
                .body()
                .ok_or(RenderError::MountUnavailable { retry_in_ms: 0 })?;
            body.append_child(&self.host)
                .map_err(|_| RenderError::MountUnavailable { retry_in_ms: 0 })?;
        }
        self.shadow.set_inner_html("");
        self.shadow
            .append_child(&self.create(root)?)
            .map_err(|e| js_error("mount", e))?;
        Ok(())
    }

    fn apply(&mut self, patches: &[Patch]) -> Result<(), RenderError> {
        patches.iter().try_for_each(|patch| self.apply_one(patch))
    }
}
