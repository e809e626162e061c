//! Output formatting for the CLI.
//!
//! Every command supports human-readable tables and JSON. Tables use
//! comfy-table; sizes are shown in MB for individual items and GB for totals.

use std::borrow::Cow;

use clap::ValueEnum;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use overlay_gc::units::{human_size, to_gb, to_mb};
use overlay_gc::{Outcome, ReclaimConfig, ReclaimReport, UsageReport, VolumeSize};
use serde::Serialize;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// Machine-parseable JSON format.
    Json,
}

/// Format a byte count in megabytes, e.g. `"12.50 MB"`.
pub fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", to_mb(bytes))
}

/// Format a byte count in gigabytes, e.g. `"1.25 GB"`.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.2} GB", to_gb(bytes))
}

/// Truncate an ID to 12 characters for display.
///
/// A `-init` suffix is kept so an init layer stays distinguishable from the
/// layer it belongs to.
pub fn truncate_id(id: &str) -> Cow<'_, str> {
    let (base, suffix) = match id.strip_suffix("-init") {
        Some(base) => (base, "-init"),
        None => (id, ""),
    };
    match base.char_indices().nth(12) {
        Some((idx, _)) => Cow::Owned(format!("{}{}", &base[..idx], suffix)),
        None => Cow::Borrowed(id),
    }
}

/// Create a styled table with consistent formatting.
pub fn create_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn size_cell(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Print the outcome of a reclaim pass (or a dry run).
pub fn print_reclaim(
    report: &ReclaimReport,
    config: &ReclaimConfig,
    dry_run: bool,
    format: OutputFormat,
) -> Result<(), serde_json::Error> {
    if let OutputFormat::Json = format {
        return print_json(report);
    }

    if report.records.is_empty() {
        println!(
            "No orphaned directories found ({} scanned, {} in use).",
            report.scanned, report.retained
        );
        return Ok(());
    }

    let mut table = create_styled_table();
    table.set_header(vec!["LAYER", "SIZE", "OUTCOME"]);
    for record in &report.records {
        let size = record
            .size
            .map(human_size)
            .unwrap_or_else(|| "N/A".to_string());
        table.add_row(vec![
            Cell::new(truncate_id(&record.identifier)),
            size_cell(size),
            Cell::new(record.outcome.to_string()),
        ]);
    }
    println!("{}", table);

    let skipped = report.skipped().count();
    let failed = report.failed().count();
    if dry_run {
        let planned = report
            .records
            .iter()
            .filter(|r| r.outcome == Outcome::Planned)
            .count();
        println!(
            "{} orphaned directories ({}) would be deleted; {} skipped.",
            planned,
            human_size(report.planned_bytes()),
            skipped
        );
    } else {
        let deleted = report.deleted().count();
        println!(
            "Deleted {} orphaned directories ({}); {} skipped, {} failed.",
            deleted,
            human_size(report.reclaimed_bytes()),
            skipped,
            failed
        );
        if let Some(err) = &report.audit_error {
            println!(
                "Audit log {} was NOT written ({}). Deleted:",
                config.audit_log.display(),
                err
            );
            for record in report.deleted() {
                println!("{}", record.audit_line());
            }
        } else if deleted > 0 {
            println!("Logged to {}", config.audit_log.display());
        }
    }

    Ok(())
}

/// Print the disk usage report.
pub fn print_usage(report: &UsageReport, format: OutputFormat) -> Result<(), serde_json::Error> {
    if let OutputFormat::Json = format {
        return print_json(report);
    }

    println!("Container Sizes:");
    if report.containers.is_empty() {
        println!(" - No containers with measurable virtual size.");
    } else {
        let mut table = create_styled_table();
        table.set_header(vec!["CONTAINER NAME", "SIZE"]);
        for (name, bytes) in &report.containers {
            table.add_row(vec![Cell::new(name), size_cell(format_mb(*bytes))]);
        }
        table.add_row(vec![
            Cell::new("Total container size"),
            size_cell(format_gb(report.containers_total())),
        ]);
        println!("{}", table);
    }

    println!("\nImages:");
    let mut table = create_styled_table();
    table.set_header(vec!["IMAGE TYPE", "SIZE"]);
    table.add_row(vec![Cell::new("Used images"), size_cell(format_gb(report.images_used))]);
    table.add_row(vec![
        Cell::new("Unused images"),
        size_cell(format_gb(report.images_unused)),
    ]);
    println!("{}", table);

    println!("\nBuild Cache:");
    let mut table = create_styled_table();
    table.add_row(vec![
        Cell::new("Build cache size"),
        size_cell(format_gb(report.build_cache)),
    ]);
    println!("{}", table);

    println!("\nVolumes:");
    if report.volumes.is_empty() {
        println!(" - No volumes with valid paths found.");
    } else {
        let mut table = create_styled_table();
        table.set_header(vec!["VOLUME NAME", "SIZE"]);
        for volume in &report.volumes {
            let size = match &volume.size {
                VolumeSize::Bytes(n) => format_mb(*n),
                VolumeSize::PermissionDenied => "Permission Denied".to_string(),
                VolumeSize::Failed(e) => format!("Error: {}", e),
            };
            table.add_row(vec![Cell::new(&volume.name), size_cell(size)]);
        }
        table.add_row(vec![
            Cell::new("Total volume size"),
            size_cell(format_gb(report.volumes_total())),
        ]);
        println!("{}", table);
    }

    println!("\nTotal Disk Usage:");
    let mut table = create_styled_table();
    table.add_row(vec![
        Cell::new("TOTAL SPACE USED"),
        size_cell(format_gb(report.grand_total())),
    ]);
    println!("{}", table);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mb_gb() {
        assert_eq!(format_mb(0), "0.00 MB");
        assert_eq!(format_mb(1024 * 1024 * 3 / 2), "1.50 MB");
        assert_eq!(format_gb(1024 * 1024 * 1024), "1.00 GB");
        assert_eq!(format_gb(1024 * 1024 * 1024 / 4), "0.25 GB");
    }

    #[test]
    fn test_truncate_id() {
        assert_eq!(truncate_id("abc"), "abc");
        assert_eq!(truncate_id("123456789012"), "123456789012");
        assert_eq!(truncate_id("1234567890123"), "123456789012");
        assert_eq!(truncate_id("0b7a3e9f21c4-init"), "0b7a3e9f21c4-init");
        assert_eq!(
            truncate_id("0b7a3e9f21c4d5e6f7a8-init"),
            "0b7a3e9f21c4-init"
        );
        assert_ne!(
            truncate_id("0b7a3e9f21c4d5e6f7a8-init"),
            truncate_id("0b7a3e9f21c4d5e6f7a8")
        );
    }

    #[test]
    fn test_create_styled_table() {
        let table = create_styled_table();
        let _ = table.to_string();
    }
}
