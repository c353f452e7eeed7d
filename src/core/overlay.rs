//! Overlay tree - the retained virtual DOM of the dashboard
//!
//! `build` turns a view model into a tree; the renderer diffs consecutive
//! trees. Trees only contain sanitized attribute values and escape all text
//! when serialized.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::color::{css_hex, css_rgba};
use super::config::{Corner, OverlaySettings};
use super::document::OVERLAY_ROOT_ATTR;
use super::status_template::{RenderedLine, TemplateColor};
use super::view::{DashboardView, OverlayViewModel, LOADING_TEXT};

pub const TOGGLE_ACTION: &str = "toggle";

// =============================================================================
// TREE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayNode {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        children: Vec<OverlayNode>,
    },
    Text(String),
}

impl OverlayNode {
    pub fn element(tag: &str) -> Self {
        OverlayNode::Element {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        OverlayNode::Text(text.into())
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        if let OverlayNode::Element { attrs, .. } = &mut self {
            attrs.insert(name.to_string(), value.into());
        }
        self
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    pub fn child(mut self, node: OverlayNode) -> Self {
        if let OverlayNode::Element { children, .. } = &mut self {
            children.push(node);
        }
        self
    }

    pub fn children(&self) -> &[OverlayNode] {
        match self {
            OverlayNode::Element { children, .. } => children,
            OverlayNode::Text(_) => &[],
        }
    }

    /// Node at a child-index path from this node
    pub fn at(&self, path: &[usize]) -> Option<&OverlayNode> {
        path.iter().try_fold(self, |node, &i| node.children().get(i))
    }

    pub fn at_mut(&mut self, path: &[usize]) -> Option<&mut OverlayNode> {
        let mut node = self;
        for &i in path {
            node = match node {
                OverlayNode::Element { children, .. } => children.get_mut(i)?,
                OverlayNode::Text(_) => return None,
            };
        }
        Some(node)
    }

    /// Concatenated text of this subtree
    pub fn text_content(&self) -> String {
        match self {
            OverlayNode::Text(text) => text.clone(),
            OverlayNode::Element { children, .. } => children.iter().map(Self::text_content).collect(),
        }
    }

    /// First element carrying `class` in pre-order
    pub fn find_class(&self, class: &str) -> Option<&OverlayNode> {
        if let OverlayNode::Element { attrs, children, .. } = self {
            if attrs
                .get("class")
                .is_some_and(|c| c.split_whitespace().any(|c| c == class))
            {
                return Some(self);
            }
            return children.iter().find_map(|c| c.find_class(class));
        }
        None
    }

    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(Self::node_count).sum::<usize>()
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            OverlayNode::Text(text) => out.push_str(&escape(text)),
            OverlayNode::Element { tag, attrs, children } => {
                let _ = write!(out, "<{}", tag);
                for (name, value) in attrs {
                    let _ = write!(out, " {}=\"{}\"", name, escape(value));
                }
                out.push('>');
                for child in children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{}>", tag);
            }
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// THEME
// =============================================================================

/// Sanitized CSS values derived from the overlay settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub background: String,
    pub text: String,
    pub muted: String,
    pub stale: String,
    pub position: String,
}

impl From<&OverlaySettings> for Theme {
    fn from(settings: &OverlaySettings) -> Self {
        let offset = settings.offset_px;
        let position = match settings.corner {
            Corner::TopRight => format!("top:{}px;right:{}px", offset, offset),
            Corner::TopLeft => format!("top:{}px;left:{}px", offset, offset),
            Corner::BottomRight => format!("bottom:{}px;right:{}px", offset, offset),
            Corner::BottomLeft => format!("bottom:{}px;left:{}px", offset, offset),
        };
        Self {
            background: css_rgba(&settings.background_color, settings.background_opacity),
            text: css_hex(&settings.text_color),
            muted: css_hex(&settings.muted_color),
            stale: css_hex(&settings.stale_color),
            position,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Theme::from(&OverlaySettings::default())
    }
}

// =============================================================================
// BUILD
// =============================================================================

pub fn build(model: &OverlayViewModel, theme: &Theme) -> OverlayNode {
    let (state, body) = match model {
        OverlayViewModel::Loading { notice } => {
            let mut body = OverlayNode::element("div")
                .class("adp-body")
                .child(status_line(LOADING_TEXT, "adp-status"));
            if let Some(notice) = notice {
                body = body.child(notice_line(notice, theme));
            }
            ("loading", Some(body))
        }
        OverlayViewModel::Degraded { message } => (
            "degraded",
            Some(
                OverlayNode::element("div")
                    .class("adp-body")
                    .child(status_line(message, "adp-status adp-error")),
            ),
        ),
        OverlayViewModel::Ready(view) => ("ready", (!view.collapsed).then(|| ready_body(view, theme))),
    };

    let collapsed = matches!(model, OverlayViewModel::Ready(v) if v.collapsed);
    let mut root = OverlayNode::element("div")
        .attr(OVERLAY_ROOT_ATTR, "")
        .attr("data-state", state)
        .class("adp-panel")
        .attr(
            "style",
            format!(
                "position:fixed;{};z-index:2147483000;background:{};color:{};\
                 font:12px/1.4 sans-serif;padding:8px 10px;border-radius:6px;min-width:200px",
                theme.position, theme.background, theme.text
            ),
        )
        .child(title_bar(model, collapsed, theme));
    if let Some(body) = body {
        root = root.child(body);
    }
    if let OverlayViewModel::Ready(view) = model {
        root = root.child(
            OverlayNode::element("div")
                .class("adp-footer")
                .attr("style", format!("color:{}", theme.muted))
                .child(OverlayNode::text(view.age_text.clone())),
        );
    }
    root
}

fn title_bar(model: &OverlayViewModel, collapsed: bool, theme: &Theme) -> OverlayNode {
    let mut bar = OverlayNode::element("div")
        .class("adp-titlebar")
        .child(
            OverlayNode::element("span")
                .class("adp-title")
                .attr("style", "font-weight:bold")
                .child(OverlayNode::text("Alliance")),
        );
    if let OverlayViewModel::Ready(view) = model {
        if view.stale {
            bar = bar.child(
                OverlayNode::element("span")
                    .class("adp-badge")
                    .attr("style", format!("color:{};margin-left:6px", theme.stale))
                    .child(OverlayNode::text("stale")),
            );
        }
        bar = bar.child(
            OverlayNode::element("button")
                .attr("type", "button")
                .attr("data-action", TOGGLE_ACTION)
                .attr("aria-expanded", if collapsed { "false" } else { "true" })
                .attr(
                    "style",
                    "float:right;background:none;border:0;color:inherit;cursor:pointer",
                )
                .child(OverlayNode::text(if collapsed { "+" } else { "–" })),
        );
    }
    bar
}

fn status_line(text: &str, class: &str) -> OverlayNode {
    OverlayNode::element("div")
        .class(class)
        .child(OverlayNode::text(text))
}

fn notice_line(notice: &str, theme: &Theme) -> OverlayNode {
    OverlayNode::element("div")
        .class("adp-notice")
        .attr("style", format!("color:{}", theme.stale))
        .child(OverlayNode::text(notice))
}

fn header_line(line: &RenderedLine, theme: &Theme) -> OverlayNode {
    line.spans.iter().fold(
        OverlayNode::element("div").class("adp-line"),
        |div, span| {
            let color = match &span.color {
                TemplateColor::Default => None,
                TemplateColor::Muted => Some(theme.muted.as_str()),
                TemplateColor::Hex(hex) => Some(hex.as_str()),
            };
            let mut node = OverlayNode::element("span");
            if let Some(color) = color {
                node = node.attr("style", format!("color:{}", color));
            }
            div.child(node.child(OverlayNode::text(span.text.clone())))
        },
    )
}

fn ready_body(view: &DashboardView, theme: &Theme) -> OverlayNode {
    let header = view
        .header
        .iter()
        .fold(OverlayNode::element("div").class("adp-header"), |div, line| {
            div.child(header_line(line, theme))
        });

    let stats = view.stats.iter().fold(OverlayNode::element("table").class("adp-stats"), |table, row| {
        table.child(
            OverlayNode::element("tr")
                .child(
                    OverlayNode::element("td")
                        .attr("style", format!("color:{};padding-right:8px", theme.muted))
                        .child(OverlayNode::text(row.label.clone())),
                )
                .child(OverlayNode::element("td").child(OverlayNode::text(row.value.clone()))),
        )
    });

    let mut roster = view.roster.iter().fold(OverlayNode::element("ul").class("adp-roster"), |list, row| {
        let mut item = OverlayNode::element("li")
            .child(OverlayNode::element("span").class("adp-name").child(OverlayNode::text(row.name.clone())));
        if let Some(rank) = &row.rank {
            item = item.child(
                OverlayNode::element("span")
                    .class("adp-rank")
                    .attr("style", format!("color:{};margin-left:4px", theme.muted))
                    .child(OverlayNode::text(rank.clone())),
            );
        }
        if let Some(power) = &row.power {
            item = item.child(
                OverlayNode::element("span")
                    .class("adp-power")
                    .attr("style", "float:right")
                    .child(OverlayNode::text(power.clone())),
            );
        }
        list.child(item)
    });
    if view.roster_overflow > 0 {
        roster = roster.child(
            OverlayNode::element("li")
                .class("adp-more")
                .attr("style", format!("color:{}", theme.muted))
                .child(OverlayNode::text(format!("+ {} more", view.roster_overflow))),
        );
    }

    let mut body = OverlayNode::element("div")
        .class("adp-body")
        .child(header)
        .child(stats)
        .child(roster.attr("style", "list-style:none;margin:4px 0;padding:0"));
    if let Some(notice) = &view.notice {
        body = body.child(notice_line(notice, theme));
    }
    body
}
