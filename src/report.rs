//! Plain-text rendering of results and run diagnostics for the terminal.

use std::fmt::Write as _;

use itertools::Itertools;

use crate::{pipeline::IngestReport, topn::ProcessedResult};

const RESULT_HEADERS: [&str; 7] = [
    "category", "pos", "athlete", "club", "result", "user", "club id",
];

pub fn render_results(results: &[ProcessedResult]) -> String {
    let rows = results
        .iter()
        .map(|r| {
            vec![
                r.category_name.clone(),
                r.position.to_string(),
                r.athlete_name.clone(),
                r.club_name.clone(),
                r.result.clone(),
                r.user_id.clone().unwrap_or_default(),
                r.club_id.clone().unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&RESULT_HEADERS, &rows)
}

pub fn render_diagnostics(report: &IngestReport) -> String {
    let diagnostics = &report.diagnostics;
    let mut out = String::new();
    let verb = if report.dry_run { "would store" } else { "stored" };
    let _ = writeln!(
        out,
        "event {}: {} row(s) read, {} result(s) {verb}",
        report.event_id,
        diagnostics.rows_read,
        report.results.len()
    );
    for category in &diagnostics.categories {
        let via = if category.containment_match {
            " (partial match)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "  {} -> {}{via}: kept {} of {}",
            category.label, category.category_id, category.kept_rows, category.source_rows
        );
    }
    if !diagnostics.unresolved.is_empty() {
        let labels = diagnostics
            .unresolved
            .iter()
            .map(|u| format!("'{}' ({} row(s))", u.label, u.row_count))
            .join(", ");
        let _ = writeln!(out, "  unresolved categories: {labels}");
    }
    if !diagnostics.unmapped_fields.is_empty() {
        let _ = writeln!(
            out,
            "  no column found for: {}",
            diagnostics.unmapped_fields.join(", ")
        );
    }
    let enrichment = &diagnostics.enrichment;
    let _ = writeln!(
        out,
        "  linked {} athlete(s), {} club(s); {} lookup failure(s)",
        enrichment.people_linked, enrichment.clubs_linked, enrichment.lookup_failures
    );
    if !report.dry_run {
        let _ = writeln!(
            out,
            "  replaced {} previous result(s); {} stale row(s) dropped; {} insert failure(s)",
            diagnostics.replaced, diagnostics.dropped_stale_category, diagnostics.failed_inserts
        );
    }
    out
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count())
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let _ = writeln!(out, "{}", format_row(&header_cells, &widths));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(out, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(out, "{}", format_row(row, &widths));
    }
    out
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let clean = cell.replace(['\n', '\r', '\t'], " ");
            let padding = width.saturating_sub(clean.chars().count());
            format!("{clean}{}", " ".repeat(padding))
        })
        .join("  ")
        .trim_end()
        .to_string()
}
