//! Output formatting utilities

use crate::sync::{CompareReport, DownloadResult, UploadResult};
use std::time::Duration;

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    format_duration_secs(duration.as_secs_f64())
}

/// Format duration from seconds
pub fn format_duration_secs(secs: f64) -> String {
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining = secs - mins * 60.0;
        format!("{}m {:.0}s", mins as u64, remaining)
    } else {
        let hours = (secs / 3600.0).floor();
        let remaining = secs - hours * 3600.0;
        let mins = (remaining / 60.0).floor();
        format!("{}h {}m", hours as u64, mins as u64)
    }
}

/// Format transfer rate in human-readable format
pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", human_bytes::human_bytes(bytes_per_sec))
}

/// Format percentage
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Format a count with a unit
pub fn format_count(count: u64, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

fn format_blocks(count: usize) -> String {
    format_count(count as u64, "block", "blocks")
}

fn push_rate(lines: &mut Vec<String>, bytes: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    lines.push(format!("Duration:     {}", format_duration(elapsed)));
    if secs > 0.0 && bytes > 0 {
        lines.push(format!("Rate:         {}", format_rate(bytes as f64 / secs)));
    }
}

/// Upload session summary
pub fn format_upload(result: &UploadResult, elapsed: Duration) -> String {
    let mut lines = Vec::new();

    lines.push("=== Upload Complete ===".to_string());
    lines.push(String::new());
    lines.push(format!(
        "Mode:         {}",
        if result.delta { "delta" } else { "full" }
    ));
    lines.push(format!("File size:    {}", format_size(result.file_size)));
    lines.push(format!(
        "Transferred:  {} in {}",
        format_size(result.bytes_transferred),
        format_blocks(result.blocks_staged)
    ));
    if result.blocks_reused > 0 {
        lines.push(format!(
            "Reused:       {} in {}",
            format_size(result.bytes_reused),
            format_blocks(result.blocks_reused)
        ));
    }
    if result.duplicates > 0 {
        lines.push(format!("Duplicates:   {}", format_blocks(result.duplicates)));
    }
    lines.push(format!("Saved:        {}", format_percent(result.savings_percent())));
    push_rate(&mut lines, result.bytes_transferred, elapsed);

    lines.join("\n")
}

/// Download session summary
pub fn format_download(result: &DownloadResult, elapsed: Duration) -> String {
    let mut lines = Vec::new();

    lines.push("=== Download Complete ===".to_string());
    lines.push(String::new());
    if result.unchanged {
        lines.push(format!("Up to date:   {}", format_size(result.file_size)));
        return lines.join("\n");
    }

    lines.push(format!(
        "Mode:         {}",
        if result.delta { "delta" } else { "full" }
    ));
    lines.push(format!("File size:    {}", format_size(result.file_size)));
    lines.push(format!(
        "Downloaded:   {} in {}",
        format_size(result.bytes_downloaded),
        format_count(result.range_requests as u64, "request", "requests")
    ));
    if result.bytes_reused > 0 {
        lines.push(format!("Reused:       {}", format_size(result.bytes_reused)));
    }
    lines.push(format!("Saved:        {}", format_percent(result.savings_percent())));
    push_rate(&mut lines, result.bytes_downloaded, elapsed);

    lines.join("\n")
}

/// Per-size match table for the compare command
pub fn format_compare(report: &CompareReport) -> String {
    let mut lines = Vec::new();

    for size in &report.sizes {
        lines.push(format!(
            "Size {:>10}: {} of {} matched",
            size.block_size,
            size.matched,
            format_blocks(size.baseline_blocks)
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "Reusable:     {} ({})",
        format_size(report.bytes_reused()),
        format_percent(report.results.savings_percent())
    ));
    lines.push(format!(
        "To transfer:  {} in {}",
        format_size(report.bytes_to_transfer()),
        format_count(report.results.to_transfer.len() as u64, "range", "ranges")
    ));

    lines.join("\n")
}
