// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Color helpers respect the NO_COLOR environment variable.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize a record id (cyan)
pub fn colorize_source(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a similarity score (yellow, three decimals)
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let text = format!("{:.3}", score);
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize a section heading (bold)
pub fn colorize_heading(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize supporting text such as chunk previews (dimmed)
pub fn colorize_context(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// First line of `text`, cut to `max_chars` characters with an ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Print a value as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_without_color() {
        assert_eq!(colorize_source("faq-1", false), "faq-1");
        assert_eq!(colorize_score(0.51234, false), "0.512");
    }

    #[test]
    fn preview_truncates_first_line() {
        assert_eq!(preview("Question: short\nAnswer: x", 40), "Question: short");
        assert_eq!(preview("abcdefghij", 5), "abcd…");
    }
}
