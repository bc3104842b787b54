//! Table formatting helpers for CLI output.

use std::collections::HashMap;

use comfy_table::{ContentArrangement, Table};
use serde::Serialize;
use strata_core::snapshot::MountSpec;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print mount descriptors as a table, or JSON when `json` is set.
pub fn print_mounts(mounts: &[MountSpec], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        return print_json(mounts);
    }
    let mut table = new_table(&["SOURCE", "TYPE", "OPTIONS"]);
    for mount in mounts {
        table.add_row(&[
            mount.source.display().to_string(),
            mount.fs_type.clone(),
            mount.options.join(","),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a chrono timestamp as a relative "ago" string.
pub fn format_ago(dt: &chrono::DateTime<chrono::Utc>) -> String {
    let secs = chrono::Utc::now().signed_duration_since(*dt).num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }

    match secs {
        0..=59 => format!("{secs} seconds ago"),
        60..=3599 => format!("{} minutes ago", secs / 60),
        3600..=86_399 => format!("{} hours ago", secs / 3600),
        _ => {
            let days = secs / 86_400;
            if days < 30 {
                format!("{days} days ago")
            } else if days < 365 {
                format!("{} months ago", days / 30)
            } else {
                format!("{} years ago", days / 365)
            }
        }
    }
}

/// Render labels as `k=v` pairs sorted by key.
pub fn format_labels(labels: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(",")
}
