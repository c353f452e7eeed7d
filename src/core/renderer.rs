//! Overlay renderer - diffs view trees and patches the mounted overlay
//!
//! The renderer keeps the last tree it rendered. A render with identical
//! content produces no patches and therefore no surface mutations.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::error::RenderError;
use super::overlay::{build, OverlayNode, Theme};
use super::view::OverlayViewModel;

// =============================================================================
// PATCHES
// =============================================================================

/// One surface mutation. Paths are child indices from the overlay root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    Replace { path: Vec<usize>, node: OverlayNode },
    SetText { path: Vec<usize>, text: String },
    SetAttr { path: Vec<usize>, name: String, value: String },
    RemoveAttr { path: Vec<usize>, name: String },
    Append { path: Vec<usize>, node: OverlayNode },
    /// Drop children from index `len` onward
    Truncate { path: Vec<usize>, len: usize },
}

/// Minimal patch list turning `old` into `new`
pub fn diff(old: &OverlayNode, new: &OverlayNode) -> Vec<Patch> {
    let mut patches = Vec::new();
    let mut path = Vec::new();
    diff_node(old, new, &mut path, &mut patches);
    patches
}

fn diff_node(old: &OverlayNode, new: &OverlayNode, path: &mut Vec<usize>, out: &mut Vec<Patch>) {
    match (old, new) {
        (OverlayNode::Text(a), OverlayNode::Text(b)) => {
            if a != b {
                out.push(Patch::SetText {
                    path: path.clone(),
                    text: b.clone(),
                });
            }
        }
        (
            OverlayNode::Element {
                tag: old_tag,
                attrs: old_attrs,
                children: old_children,
            },
            OverlayNode::Element {
                tag: new_tag,
                attrs: new_attrs,
                children: new_children,
            },
        ) if old_tag == new_tag => {
            for (name, value) in new_attrs {
                if old_attrs.get(name) != Some(value) {
                    out.push(Patch::SetAttr {
                        path: path.clone(),
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
            for name in old_attrs.keys().filter(|k| !new_attrs.contains_key(*k)) {
                out.push(Patch::RemoveAttr {
                    path: path.clone(),
                    name: name.clone(),
                });
            }

            for (i, (a, b)) in old_children.iter().zip(new_children).enumerate() {
                path.push(i);
                diff_node(a, b, path, out);
                path.pop();
            }
            if new_children.len() > old_children.len() {
                for node in &new_children[old_children.len()..] {
                    out.push(Patch::Append {
                        path: path.clone(),
                        node: node.clone(),
                    });
                }
            } else if old_children.len() > new_children.len() {
                out.push(Patch::Truncate {
                    path: path.clone(),
                    len: new_children.len(),
                });
            }
        }
        _ => out.push(Patch::Replace {
            path: path.clone(),
            node: new.clone(),
        }),
    }
}

/// Apply one patch to an in-memory tree
pub fn apply_patch(root: &mut OverlayNode, patch: &Patch) -> Result<(), RenderError> {
    let target = |path: &Vec<usize>| RenderError::PatchTarget { path: path.clone() };
    match patch {
        Patch::Replace { path, node } => {
            *root.at_mut(path).ok_or_else(|| target(path))? = node.clone();
        }
        Patch::SetText { path, text } => match root.at_mut(path) {
            Some(OverlayNode::Text(current)) => *current = text.clone(),
            _ => return Err(target(path)),
        },
        Patch::SetAttr { path, name, value } => match root.at_mut(path) {
            Some(OverlayNode::Element { attrs, .. }) => {
                attrs.insert(name.clone(), value.clone());
            }
            _ => return Err(target(path)),
        },
        Patch::RemoveAttr { path, name } => match root.at_mut(path) {
            Some(OverlayNode::Element { attrs, .. }) => {
                attrs.remove(name);
            }
            _ => return Err(target(path)),
        },
        Patch::Append { path, node } => match root.at_mut(path) {
            Some(OverlayNode::Element { children, .. }) => children.push(node.clone()),
            _ => return Err(target(path)),
        },
        Patch::Truncate { path, len } => match root.at_mut(path) {
            Some(OverlayNode::Element { children, .. }) => children.truncate(*len),
            _ => return Err(target(path)),
        },
    }
    Ok(())
}

// =============================================================================
// SURFACE
// =============================================================================

/// Where the overlay lives. The web layer implements this over a shadow
/// root outside the host container.
pub trait OverlaySurface {
    /// Whether the previously mounted overlay is still attached
    fn is_mounted(&self) -> bool;

    /// Attach the overlay, replacing anything left from an earlier mount
    fn mount(&mut self, root: &OverlayNode) -> Result<(), RenderError>;

    /// Apply patches in order
    fn apply(&mut self, patches: &[Patch]) -> Result<(), RenderError>;
}

/// In-memory surface (tests and replay)
#[derive(Debug, Default)]
pub struct MemorySurface {
    tree: Option<OverlayNode>,
    /// Total mutations: one per mount, one per applied patch
    pub mutations: usize,
    pub mounts: usize,
    /// Upcoming mounts that fail with `MountUnavailable`
    pub fail_mounts: u32,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> Option<&OverlayNode> {
        self.tree.as_ref()
    }

    /// Simulate the host wiping the overlay
    pub fn unmount(&mut self) {
        self.tree = None;
    }
}

impl OverlaySurface for MemorySurface {
    fn is_mounted(&self) -> bool {
        self.tree.is_some()
    }

    fn mount(&mut self, root: &OverlayNode) -> Result<(), RenderError> {
        if self.fail_mounts > 0 {
            self.fail_mounts -= 1;
            return Err(RenderError::MountUnavailable { retry_in_ms: 0 });
        }
        self.tree = Some(root.clone());
        self.mounts += 1;
        self.mutations += 1;
        Ok(())
    }

    fn apply(&mut self, patches: &[Patch]) -> Result<(), RenderError> {
        let tree = self
            .tree
            .as_mut()
            .ok_or_else(|| RenderError::Surface("not mounted".to_string()))?;
        for patch in patches {
            apply_patch(tree, patch)?;
            self.mutations += 1;
        }
        Ok(())
    }
}

// =============================================================================
// RENDERER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Full mount (first render or after the surface was wiped)
    Mounted,
    Patched(usize),
    Unchanged,
}

pub struct Renderer<S: OverlaySurface> {
    surface: S,
    theme: Theme,
    /// Last tree known to be on the surface
    rendered: Option<OverlayNode>,
    mount_backoff: Backoff,
    next_mount_at_ms: u64,
}

impl<S: OverlaySurface> Renderer<S> {
    pub fn new(surface: S, theme: Theme, retry_initial: Duration, retry_max: Duration) -> Self {
        Self {
            surface,
            theme,
            rendered: None,
            mount_backoff: Backoff::new(retry_initial, retry_max, u32::MAX),
            next_mount_at_ms: 0,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// True when the surface shows the last rendered tree
    pub fn is_current(&self) -> bool {
        self.rendered.is_some() && self.surface.is_mounted()
    }

    /// False while waiting out a mount retry delay
    pub fn can_render(&self, now_ms: u64) -> bool {
        self.surface.is_mounted() || now_ms >= self.next_mount_at_ms
    }

    pub fn render(&mut self, model: &OverlayViewModel, now_ms: u64) -> Result<RenderOutcome, RenderError> {
        let tree = build(model, &self.theme);

        if !self.surface.is_mounted() {
            return self.mount(tree, now_ms);
        }

        let patches = match &self.rendered {
            Some(previous) => diff(previous, &tree),
            // Mounted but contents unknown after a failed apply
            None => vec![Patch::Replace {
                path: Vec::new(),
                node: tree.clone(),
            }],
        };
        if patches.is_empty() {
            return Ok(RenderOutcome::Unchanged);
        }

        match self.surface.apply(&patches) {
            Ok(()) => {
                debug!(patches = patches.len(), "[RENDER] Patched overlay");
                self.rendered = Some(tree);
                Ok(RenderOutcome::Patched(patches.len()))
            }
            Err(e) => {
                warn!(error = %e, "[RENDER] Patch failed, next render replaces the tree");
                self.rendered = None;
                Err(e)
            }
        }
    }

    fn mount(&mut self, tree: OverlayNode, now_ms: u64) -> Result<RenderOutcome, RenderError> {
        if now_ms < self.next_mount_at_ms {
            return Err(RenderError::MountUnavailable {
                retry_in_ms: self.next_mount_at_ms - now_ms,
            });
        }
        if self.rendered.is_some() {
            info!("[RENDER] Overlay was removed from the page, remounting");
        }

        match self.surface.mount(&tree) {
            Ok(()) => {
                debug!(nodes = tree.node_count(), "[RENDER] Mounted overlay");
                self.rendered = Some(tree);
                self.mount_backoff.reset();
                self.next_mount_at_ms = 0;
                Ok(RenderOutcome::Mounted)
            }
            Err(e) => {
                let retry_in_ms = self
                    .mount_backoff
                    .next()
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or_default();
                warn!(error = %e, retry_in_ms, "[RENDER] Mount failed");
                self.rendered = None;
                self.next_mount_at_ms = now_ms + retry_in_ms;
                Err(RenderError::MountUnavailable { retry_in_ms })
            }
        }
    }
}
