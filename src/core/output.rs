//! Terminal rendering helpers for CLI summaries.
//!
//! Stdout carries guidance text and JSON envelopes; these helpers keep the
//! human-facing summary lines bounded.

use colored::Colorize;

/// Collapse whitespace and bound length for a single terminal line.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Up to `max_items` entries joined with ` | `, with an overflow count.
pub fn preview_list(items: &[String], max_items: usize, max_chars: usize) -> String {
    if items.is_empty() {
        return String::new();
    }
    let shown = items
        .iter()
        .take(max_items)
        .map(|m| compact_line(m, max_chars))
        .collect::<Vec<_>>()
        .join(" | ");
    if items.len() > max_items {
        format!("{} (+{} more)", shown, items.len() - max_items)
    } else {
        shown
    }
}

/// `✓ label` / `✗ label` status line.
pub fn status_line(ok: bool, label: &str) -> String {
    if ok {
        format!("{} {}", "✓".bright_green(), label)
    } else {
        format!("{} {}", "✗".bright_red(), label.bright_red())
    }
}
