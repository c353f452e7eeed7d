//! Color utilities
//!
//! Configured colors end up inside inline `style` attributes, so every value
//! is parsed and re-emitted instead of being copied through.

/// Parse hex color "#RRGGBB" (or "RRGGBB") into RGB bytes
pub fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

/// Normalized "#RRGGBB", falling back to white if the input is invalid
pub fn css_hex(hex: &str) -> String {
    let [r, g, b] = parse_hex_color(hex).unwrap_or([255, 255, 255]);
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

/// CSS `rgba()` value; alpha is clamped to [0, 1]
pub fn css_rgba(hex: &str, alpha: f32) -> String {
    let [r, g, b] = parse_hex_color(hex).unwrap_or([255, 255, 255]);
    let alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 1.0 };
    format!("rgba({}, {}, {}, {})", r, g, b, (alpha * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color_basic() {
        assert_eq!(parse_hex_color("#FF0000"), Some([255, 0, 0]));
        assert_eq!(parse_hex_color("00ff00"), Some([0, 255, 0]));
        assert_eq!(parse_hex_color("#0000FF"), Some([0, 0, 255]));
    }

    #[test]
    fn test_parse_hex_color_invalid() {
        assert_eq!(parse_hex_color("#FFF"), None);
        assert_eq!(parse_hex_color("#GG0000"), None);
        assert_eq!(parse_hex_color("red; background:url(x)"), None);
    }

    #[test]
    fn test_css_hex_normalizes() {
        assert_eq!(css_hex("#e0a030"), "#E0A030");
        assert_eq!(css_hex("bogus"), "#FFFFFF");
    }

    #[test]
    fn test_css_rgba() {
        assert_eq!(css_rgba("#141414", 0.85), "rgba(20, 20, 20, 0.85)");
        assert_eq!(css_rgba("#000000", 2.0), "rgba(0, 0, 0, 1)");
        assert_eq!(css_rgba("nope", 0.5), "rgba(255, 255, 255, 0.5)");
    }
}
