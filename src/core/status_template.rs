//! Header template rendering
//!
//! # Template syntax
//!
//! - Variables: `{alliance}`, `{tag}`, `{members}`, `{resources}`, `{power}`
//! - Colors: `{variable:color}` where color is a name, a hex code or `muted`
//! - Markers: `$n` (newline)
//!
//! A variable without a value renders as nothing. If it was wrapped in a
//! bracket pair (`[{tag}]`, `({power})`) the brackets go too.
//!
//! # Examples
//!
//! ```
//! use alliance_dashboard_player::core::status_template::{render_template, TemplateContext};
//!
//! let ctx = TemplateContext {
//!     alliance: Some("Iron Wolves".to_string()),
//!     members: Some(42),
//!     ..Default::default()
//! };
//! let lines = render_template("{alliance} [{tag}]$n{members} members", &ctx);
//! assert_eq!(lines[0].text(), "Iron Wolves");
//! assert_eq!(lines[1].text(), "42 members");
//! ```

use super::color::parse_hex_color;
use super::format::format_number;

/// Color specification for template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateColor {
    /// Overlay text color
    Default,
    /// Overlay secondary color
    Muted,
    /// Normalized "#RRGGBB"
    Hex(String),
}

/// Parse a color name, `muted`, or a hex code
pub fn parse_template_color(color_str: &str) -> Option<TemplateColor> {
    let named = match color_str.to_lowercase().as_str() {
        "muted" => return Some(TemplateColor::Muted),
        "red" => "#FF5050",
        "green" => "#60E060",
        "blue" => "#6699FF",
        "yellow" => "#FFE040",
        "orange" => "#FFA500",
        "cyan" => "#40E0E0",
        "magenta" | "purple" => "#E060E0",
        "gray" | "grey" => "#808080",
        "white" => "#FFFFFF",
        _ => color_str,
    };
    parse_hex_color(named).map(|[r, g, b]| TemplateColor::Hex(format!("#{:02X}{:02X}{:02X}", r, g, b)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub color: TemplateColor,
}

/// A single rendered line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub spans: Vec<TextSpan>,
}

impl RenderedLine {
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Context for template variable substitution
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub alliance: Option<String>,
    pub tag: Option<String>,
    pub members: Option<i64>,
    pub resources: Option<i64>,
    pub power: Option<i64>,
}

fn variable_value(name: &str, ctx: &TemplateContext) -> Option<String> {
    let value = match name {
        "alliance" => ctx.alliance.clone(),
        "tag" => ctx.tag.clone(),
        "members" => ctx.members.map(|n| n.to_string()),
        "resources" => ctx.resources.map(format_number),
        "power" => ctx.power.map(format_number),
        _ => return None,
    };
    Some(value.unwrap_or_default())
}

/// Render a template into lines. Lines that end up blank are dropped.
pub fn render_template(template: &str, ctx: &TemplateContext) -> Vec<RenderedLine> {
    template
        .split("$n")
        .map(|line| RenderedLine {
            spans: substitute_variables(line, ctx),
        })
        .filter(|line| !line.text().trim().is_empty())
        .collect()
}

fn closing_bracket(open: char) -> Option<char> {
    match open {
        '[' => Some(']'),
        '(' => Some(')'),
        _ => None,
    }
}

fn flush(literal: &mut String, spans: &mut Vec<TextSpan>) {
    if !literal.is_empty() {
        spans.push(TextSpan {
            text: std::mem::take(literal),
            color: TemplateColor::Default,
        });
    }
}

fn substitute_variables(template: &str, ctx: &TemplateContext) -> Vec<TextSpan> {
    let chars: Vec<char> = template.chars().collect();
    let mut spans = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let Some(len) = (chars[i] == '{')
            .then(|| chars[i..].iter().position(|&c| c == '}'))
            .flatten()
        else {
            literal.push(chars[i]);
            i += 1;
            continue;
        };
        let end = i + len;
        let content: String = chars[i + 1..end].iter().collect();
        let (name, color) = match content.split_once(':') {
            Some((name, color)) => (
                name.to_string(),
                parse_template_color(color).unwrap_or(TemplateColor::Default),
            ),
            None => (content, TemplateColor::Default),
        };

        match variable_value(&name, ctx) {
            Some(value) if value.is_empty() => {
                // Drop a bracket pair hugging the empty value
                let closer = literal.chars().last().and_then(closing_bracket);
                if closer.is_some() && chars.get(end + 1).copied() == closer {
                    literal.pop();
                    literal.truncate(literal.trim_end().len());
                    i = end + 2;
                    continue;
                }
            }
            Some(value) => {
                flush(&mut literal, &mut spans);
                spans.push(TextSpan { text: value, color });
            }
            // Unknown variable - keep it as literal
            None => literal.extend(&chars[i..=end]),
        }
        i = end + 1;
    }

    flush(&mut literal, &mut spans);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TemplateContext {
        TemplateContext {
            alliance: Some("Iron Wolves".to_string()),
            tag: Some("IW".to_string()),
            members: Some(42),
            resources: Some(12_500),
            power: None,
        }
    }

    #[test]
    fn test_simple_substitution() {
        let lines = render_template("{alliance} [{tag}]", &ctx());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text(), "Iron Wolves [IW]");
    }

    #[test]
    fn test_multiline() {
        let lines = render_template("{alliance}$n{members} members$n{resources}", &ctx());
        let texts: Vec<String> = lines.iter().map(RenderedLine::text).collect();
        assert_eq!(texts, vec!["Iron Wolves", "42 members", "12,500"]);
    }

    #[test]
    fn test_empty_variable_drops_brackets() {
        let lines = render_template("{alliance} ({power}) done", &ctx());
        assert_eq!(lines[0].text(), "Iron Wolves done");
    }

    #[test]
    fn test_blank_line_is_dropped() {
        let lines = render_template("{alliance}$n{power}", &ctx());
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_colored_variable() {
        let lines = render_template("{members:green} members", &ctx());
        assert_eq!(
            lines[0].spans[0],
            TextSpan {
                text: "42".to_string(),
                color: TemplateColor::Hex("#60E060".to_string())
            }
        );
        assert_eq!(lines[0].spans[1].color, TemplateColor::Default);
    }

    #[test]
    fn test_unknown_variable_kept_literally() {
        let lines = render_template("{zone} {alliance}", &ctx());
        assert_eq!(lines[0].text(), "{zone} Iron Wolves");
    }

    #[test]
    fn test_unclosed_brace_is_literal() {
        let lines = render_template("{alliance", &ctx());
        assert_eq!(lines[0].text(), "{alliance");
    }

    #[test]
    fn test_parse_template_color() {
        assert_eq!(parse_template_color("muted"), Some(TemplateColor::Muted));
        assert_eq!(parse_template_color("#e0a030"), Some(TemplateColor::Hex("#E0A030".into())));
        assert_eq!(parse_template_color("GREY"), Some(TemplateColor::Hex("#808080".into())));
        assert_eq!(parse_template_color("chartreuse"), None);
    }
}
