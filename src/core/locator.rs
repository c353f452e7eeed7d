//! Locators - how a field is found in a captured host document
//!
//! Two strategies exist:
//!
//! - **CSS**: a small CSS subset matched against the captured tree. Several
//!   selectors can be chained with `||`; the first one that matches anything
//!   wins, which keeps a field alive across minor host markup changes.
//! - **Payload**: `payload:<channel>:<json-pointer>` reads a value out of an
//!   in-page data payload observed by the platform layer.
//!
//! Supported selector syntax: `tag`, `*`, `#id`, `.class`, `[attr]`,
//! `[attr=v]`, `[attr^=v]`, `[attr*=v]`, the descendant combinator
//! (whitespace) and the child combinator (`>`).

use std::fmt;

use super::document::{HostDocument, HostNode};
use super::error::LocatorError;

// =============================================================================
// SELECTOR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
    Contains(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    op: AttrOp,
}

impl AttrTest {
    fn matches(&self, node: &HostNode) -> bool {
        let Some(value) = node.attr(&self.name) else {
            return false;
        };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(expected) => value == expected,
            AttrOp::Prefix(prefix) => value.starts_with(prefix.as_str()),
            AttrOp::Contains(needle) => value.contains(needle.as_str()),
        }
    }
}

/// One compound selector (`div.row[data-id]`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

impl Compound {
    fn matches(&self, node: &HostNode) -> bool {
        if let Some(tag) = &self.tag {
            if &node.tag != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.id() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| node.has_class(c)) && self.attrs.iter().all(|a| a.matches(node))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// A parsed selector, matched relative to a captured root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    steps: Vec<(Combinator, Compound)>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, LocatorError> {
        let source = source.trim();
        let chars: Vec<char> = source.chars().collect();
        let mut steps = Vec::new();
        let mut pending = Combinator::Descendant;
        let mut pos = 0;

        loop {
            while pos < chars.len() && chars[pos].is_whitespace() {
                pos += 1;
            }
            if pos >= chars.len() {
                break;
            }
            if chars[pos] == '>' {
                if steps.is_empty() || pending == Combinator::Child {
                    return Err(unexpected(source, pos, '>'));
                }
                pending = Combinator::Child;
                pos += 1;
                continue;
            }
            let (compound, next) = parse_compound(source, &chars, pos)?;
            steps.push((pending, compound));
            pending = Combinator::Descendant;
            pos = next;
        }

        if steps.is_empty() {
            return Err(LocatorError::Empty);
        }
        if pending == Combinator::Child {
            return Err(unexpected(source, chars.len().saturating_sub(1), '>'));
        }

        Ok(Self {
            source: source.to_string(),
            steps,
        })
    }

    /// All matching nodes in document order (the root itself included)
    pub fn select_all<'a>(&self, root: &'a HostNode) -> Vec<&'a HostNode> {
        let mut out = Vec::new();
        let mut ancestors = Vec::new();
        self.walk(root, &mut ancestors, &mut out);
        out
    }

    pub fn select_first<'a>(&self, root: &'a HostNode) -> Option<&'a HostNode> {
        self.select_all(root).into_iter().next()
    }

    fn walk<'a>(
        &self,
        node: &'a HostNode,
        ancestors: &mut Vec<&'a HostNode>,
        out: &mut Vec<&'a HostNode>,
    ) {
        if self.matches_at(self.steps.len() - 1, node, ancestors.as_slice()) {
            out.push(node);
        }
        ancestors.push(node);
        for child in &node.children {
            self.walk(child, ancestors, out);
        }
        ancestors.pop();
    }

    fn matches_at(&self, idx: usize, node: &HostNode, ancestors: &[&HostNode]) -> bool {
        let (combinator, compound) = &self.steps[idx];
        if !compound.matches(node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => match ancestors.split_last() {
                Some((parent, rest)) => self.matches_at(idx - 1, parent, rest),
                None => false,
            },
            Combinator::Descendant => (0..ancestors.len())
                .rev()
                .any(|k| self.matches_at(idx - 1, ancestors[k], &ancestors[..k])),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn unexpected(source: &str, offset: usize, found: char) -> LocatorError {
    LocatorError::Unexpected {
        selector: source.to_string(),
        offset,
        found,
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &[char], mut pos: usize) -> (String, usize) {
    let start = pos;
    while pos < chars.len() && is_ident_char(chars[pos]) {
        pos += 1;
    }
    (chars[start..pos].iter().collect(), pos)
}

fn parse_compound(
    source: &str,
    chars: &[char],
    start: usize,
) -> Result<(Compound, usize), LocatorError> {
    let mut compound = Compound::default();
    let mut pos = start;

    if chars[pos] == '*' {
        pos += 1;
    } else {
        let (tag, next) = read_ident(chars, pos);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
        pos = next;
    }

    while pos < chars.len() && !chars[pos].is_whitespace() && chars[pos] != '>' {
        match chars[pos] {
            '#' | '.' => {
                let marker = chars[pos];
                let (ident, next) = read_ident(chars, pos + 1);
                if ident.is_empty() {
                    return Err(unexpected(source, pos, marker));
                }
                if marker == '#' {
                    compound.id = Some(ident);
                } else {
                    compound.classes.push(ident);
                }
                pos = next;
            }
            '[' => {
                let (test, next) = parse_attr(source, chars, pos + 1)?;
                compound.attrs.push(test);
                pos = next;
            }
            other => return Err(unexpected(source, pos, other)),
        }
    }

    Ok((compound, pos))
}

/// Parse the inside of `[...]`, `pos` pointing just after the bracket
fn parse_attr(source: &str, chars: &[char], pos: usize) -> Result<(AttrTest, usize), LocatorError> {
    let unterminated = || LocatorError::UnterminatedAttribute(source.to_string());

    let (name, mut pos) = read_ident(chars, pos);
    if name.is_empty() {
        return match chars.get(pos) {
            Some(&c) => Err(unexpected(source, pos, c)),
            None => Err(unterminated()),
        };
    }

    let op_kind = match chars.get(pos) {
        Some(']') => {
            return Ok((
                AttrTest {
                    name,
                    op: AttrOp::Exists,
                },
                pos + 1,
            ))
        }
        Some('=') => {
            pos += 1;
            '='
        }
        Some(&(c @ ('^' | '*'))) if chars.get(pos + 1) == Some(&'=') => {
            pos += 2;
            c
        }
        Some(&c) => return Err(unexpected(source, pos, c)),
        None => return Err(unterminated()),
    };

    let value: String = match chars.get(pos) {
        Some(&(quote @ ('"' | '\''))) => {
            let rest = &chars[pos + 1..];
            let len = rest.iter().position(|&c| c == quote).ok_or_else(unterminated)?;
            pos += len + 2;
            rest[..len].iter().collect()
        }
        _ => {
            let rest = &chars[pos..];
            let len = rest.iter().position(|&c| c == ']').ok_or_else(unterminated)?;
            let value = rest[..len].iter().collect::<String>().trim().to_string();
            pos += len;
            value
        }
    };

    if chars.get(pos) != Some(&']') {
        return Err(unterminated());
    }

    let op = match op_kind {
        '^' => AttrOp::Prefix(value),
        '*' => AttrOp::Contains(value),
        _ => AttrOp::Equals(value),
    };
    Ok((AttrTest { name, op }, pos + 1))
}

// =============================================================================
// READ MODE
// =============================================================================

/// Which part of a located node holds the raw value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadFrom {
    #[default]
    Text,
    Attr(String),
}

// =============================================================================
// LOCATOR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Selectors tried in order; the first one with any match wins
    Css(Vec<Selector>),
    /// JSON pointer into an intercepted payload
    Payload { channel: String, pointer: String },
}

/// A located value: a captured node or a payload value
#[derive(Debug, Clone, Copy)]
pub enum Located<'a> {
    Node(&'a HostNode),
    Value(&'a serde_json::Value),
}

impl Located<'_> {
    /// Raw string value, or None if nothing readable is there
    pub fn read(&self, read: &ReadFrom) -> Option<String> {
        match (self, read) {
            (Located::Node(node), ReadFrom::Text) => Some(node.text_content()),
            (Located::Node(node), ReadFrom::Attr(name)) => node.attr(name).map(str::to_string),
            (Located::Value(value), ReadFrom::Text) => scalar_to_string(value),
            (Located::Value(value), ReadFrom::Attr(key)) => value.get(key).and_then(scalar_to_string),
        }
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl Locator {
    /// Parse `sel-a || sel-b` or `payload:<channel>:<pointer>`
    pub fn parse(spec: &str) -> Result<Self, LocatorError> {
        let spec = spec.trim();
        if let Some(rest) = spec.strip_prefix("payload:") {
            let (channel, pointer) = rest
                .split_once(':')
                .ok_or_else(|| LocatorError::Payload(spec.to_string()))?;
            if channel.is_empty() || !(pointer.is_empty() || pointer.starts_with('/')) {
                return Err(LocatorError::Payload(spec.to_string()));
            }
            return Ok(Locator::Payload {
                channel: channel.to_string(),
                pointer: pointer.to_string(),
            });
        }

        let selectors = spec
            .split("||")
            .map(Selector::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Locator::Css(selectors))
    }

    /// First located value
    pub fn first<'a>(&self, doc: &'a HostDocument) -> Option<Located<'a>> {
        match self {
            Locator::Css(selectors) => selectors
                .iter()
                .find_map(|s| s.select_first(doc.root()))
                .map(Located::Node),
            Locator::Payload { channel, pointer } => doc
                .payload(channel)
                .and_then(|p| p.pointer(pointer))
                .map(Located::Value),
        }
    }

    /// Every located value. A payload array yields its elements.
    pub fn all<'a>(&self, doc: &'a HostDocument) -> Vec<Located<'a>> {
        match self {
            Locator::Css(selectors) => selectors
                .iter()
                .map(|s| s.select_all(doc.root()))
                .find(|found| !found.is_empty())
                .unwrap_or_default()
                .into_iter()
                .map(Located::Node)
                .collect(),
            Locator::Payload { channel, pointer } => {
                match doc.payload(channel).and_then(|p| p.pointer(pointer)) {
                    Some(serde_json::Value::Array(items)) => items.iter().map(Located::Value).collect(),
                    Some(value) => vec![Located::Value(value)],
                    None => Vec::new(),
                }
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selectors) => {
                let joined: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();
                f.write_str(&joined.join(" || "))
            }
            Locator::Payload { channel, pointer } => write!(f, "payload:{}:{}", channel, pointer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> HostNode {
        HostNode::element("main").with_attr("id", "game-root").with_child(
            HostNode::element("section")
                .with_class("alliance-panel")
                .with_child(
                    HostNode::element("div")
                        .with_class("alliance-header")
                        .with_child(HostNode::element("h2").with_class("alliance-name").with_text("Iron Wolves"))
                        .with_child(HostNode::element("span").with_class("alliance-tag").with_text("IW")),
                )
                .with_child(
                    HostNode::element("ul")
                        .with_class("member-list")
                        .with_child(HostNode::element("li").with_attr("data-member-id", "m-1").with_text("Ana"))
                        .with_child(HostNode::element("li").with_attr("data-member-id", "m-2").with_text("Bo"))
                        .with_child(HostNode::element("li").with_attr("data-role", "leader-officer").with_text("Cy")),
                ),
        )
    }

    fn texts(nodes: Vec<&HostNode>) -> Vec<String> {
        nodes.into_iter().map(|n| n.text_content()).collect()
    }

    #[test]
    fn test_class_and_descendant() {
        let root = page();
        let sel = Selector::parse(".alliance-header .alliance-name").unwrap();
        assert_eq!(texts(sel.select_all(&root)), vec!["Iron Wolves"]);
    }

    #[test]
    fn test_child_combinator_requires_direct_parent() {
        let root = page();
        let direct = Selector::parse("ul.member-list > li").unwrap();
        assert_eq!(direct.select_all(&root).len(), 3);

        let not_direct = Selector::parse("section > li").unwrap();
        assert!(not_direct.select_all(&root).is_empty());
    }

    #[test]
    fn test_attribute_operators() {
        let root = page();
        assert_eq!(Selector::parse("[data-member-id]").unwrap().select_all(&root).len(), 2);
        assert_eq!(
            texts(Selector::parse("[data-member-id='m-2']").unwrap().select_all(&root)),
            vec!["Bo"]
        );
        assert_eq!(
            texts(Selector::parse("li[data-role^=leader]").unwrap().select_all(&root)),
            vec!["Cy"]
        );
        assert_eq!(
            texts(Selector::parse("[data-role*=\"officer\"]").unwrap().select_all(&root)),
            vec!["Cy"]
        );
    }

    #[test]
    fn test_root_is_matchable() {
        let root = page();
        let sel = Selector::parse("#game-root").unwrap();
        assert_eq!(sel.select_all(&root).len(), 1);
    }

    #[test]
    fn test_universal_selector() {
        let root = page();
        let sel = Selector::parse(".member-list > *").unwrap();
        assert_eq!(sel.select_all(&root).len(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Selector::parse("  "), Err(LocatorError::Empty)));
        assert!(matches!(Selector::parse("> li"), Err(LocatorError::Unexpected { .. })));
        assert!(matches!(Selector::parse("ul >"), Err(LocatorError::Unexpected { .. })));
        assert!(matches!(Selector::parse("li,div"), Err(LocatorError::Unexpected { found: ',', .. })));
        assert!(matches!(
            Selector::parse("[data-x=1"),
            Err(LocatorError::UnterminatedAttribute(_))
        ));
        assert!(matches!(Selector::parse("div."), Err(LocatorError::Unexpected { .. })));
    }

    #[test]
    fn test_locator_fallback_chain() {
        let doc = HostDocument::new(1, 0, "", page());
        let loc = Locator::parse("#missing || .alliance-tag").unwrap();
        let found = loc.first(&doc).unwrap();
        assert_eq!(found.read(&ReadFrom::Text).as_deref(), Some("IW"));
    }

    #[test]
    fn test_locator_all_uses_first_matching_selector() {
        let doc = HostDocument::new(1, 0, "", page());
        let loc = Locator::parse(".nothing || [data-member-id] || li").unwrap();
        assert_eq!(loc.all(&doc).len(), 2);
    }

    #[test]
    fn test_payload_locator() {
        let doc = HostDocument::new(1, 0, "", HostNode::default()).with_payload(
            "alliance",
            serde_json::json!({"stats": {"resources": 12500}, "members": [{"name": "Ana"}, {"name": "Bo"}]}),
        );
        let loc = Locator::parse("payload:alliance:/stats/resources").unwrap();
        assert_eq!(loc.first(&doc).unwrap().read(&ReadFrom::Text).as_deref(), Some("12500"));

        let roster = Locator::parse("payload:alliance:/members").unwrap();
        let rows = roster.all(&doc);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].read(&ReadFrom::Attr("name".into())).as_deref(), Some("Bo"));
    }

    #[test]
    fn test_payload_locator_parse_errors() {
        assert!(Locator::parse("payload:alliance").is_err());
        assert!(Locator::parse("payload::/x").is_err());
        assert!(Locator::parse("payload:alliance:stats").is_err());
    }

    #[test]
    fn test_locator_display_round_trip() {
        let loc = Locator::parse(".a .b ||  #c").unwrap();
        assert_eq!(loc.to_string(), ".a .b || #c");
    }

    #[test]
    fn test_attr_read_on_node() {
        let doc = HostDocument::new(1, 0, "", page());
        let loc = Locator::parse("li[data-member-id]").unwrap();
        let found = loc.first(&doc).unwrap();
        assert_eq!(found.read(&ReadFrom::Attr("data-member-id".into())).as_deref(), Some("m-1"));
        assert_eq!(found.read(&ReadFrom::Attr("nope".into())), None);
    }
}
