use chrono::{DateTime, Utc};
use crossterm::style::Color;
use std::time::Duration;

/// Cut a string to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Parse durations like `30m`, `1h`, `2d`, `1h30m` or `500ms`. A bare number is seconds.
pub fn parse_duration(input: &str) -> anyhow::Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("empty duration");
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            anyhow::bail!("invalid duration '{}': expected a number", input);
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid duration '{}': {}", input, e))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        total += match unit {
            "ms" => Duration::from_millis(value),
            "" | "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "d" => Duration::from_secs(value * 86400),
            other => anyhow::bail!("unknown duration unit '{}' in '{}'", other, input),
        };
    }
    Ok(total)
}

/// Human age of a timestamp, kubectl style.
pub fn format_age(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    created
        .map(|t| {
            let total_secs = now.signed_duration_since(t).num_seconds().max(0);
            if total_secs < 60 {
                format!("{}s", total_secs)
            } else if total_secs < 3600 {
                format!("{}m", total_secs / 60)
            } else if total_secs < 86400 {
                format!("{}h", total_secs / 3600)
            } else {
                format!("{}d", total_secs / 86400)
            }
        })
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// Render rows as a left-aligned, space-padded table.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let format_row = |cells: Vec<&str>| {
        let line = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = width)
            })
            .collect::<Vec<_>>()
            .join("   ");
        line.trim_end().to_string()
    };

    let mut lines = vec![format_row(headers.to_vec())];
    for row in rows {
        lines.push(format_row(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

/// Pick a highlight color for a digest line when printing to a terminal.
pub fn line_color(line: &str) -> Option<Color> {
    if line.starts_with("--- ") {
        if line.ends_with("(ISSUES FOUND) ---") {
            Some(Color::Red)
        } else if line.ends_with("(ERROR) ---") || line.ends_with("(TIMEOUT) ---") {
            Some(Color::Yellow)
        } else {
            Some(Color::Green)
        }
    } else if line.starts_with("=== ") {
        Some(Color::Cyan)
    } else {
        None
    }
}
