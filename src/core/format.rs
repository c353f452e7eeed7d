//! Formatting utilities for dashboard display.

use std::time::Duration;

/// Format a countdown as `M:SS`, `H:MM:SS` or `Nd HH:MM:SS`.
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    let days = secs / 86_400;
    let hours = (secs / 3600) % 24;
    let mins = (secs / 60) % 60;
    let s = secs % 60;
    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}", days, hours, mins, s)
    } else if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, s)
    } else {
        format!("{}:{:02}", mins, s)
    }
}

/// Human-readable age of a snapshot: `just now`, `42s ago`, `3m ago`, `2h ago`.
pub fn format_age(age_ms: u64) -> String {
    let secs = age_ms / 1000;
    if secs < 5 {
        "just now".to_string()
    } else if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}

/// Integer with comma thousand separators.
pub fn format_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
