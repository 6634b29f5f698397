//! Multi-record audit report: executive summary plus a paginated grid table.
//!
//! The header band and summary appear on the first page only. The table head
//! and the footer repeat on every page.

use std::convert::Infallible;
use std::ops::Range;

use tracing::debug;

use crate::error::ReportError;
use crate::model::{RiskLevel, Rgb, ThreatRecord};
use crate::report::layout::{
    Align, AuditSummary, BODY_BOTTOM, CONTENT_WIDTH, CONTINUED_TOP, Decoration, Document, DrawOp,
    FOOTER_BASELINE, Layout, MARGIN_X, MUTED, PAGE_WIDTH, PRIMARY, PT_TO_MM, ReportKind, Section,
    WHITE, line_height, wrap_text,
};
use crate::report::{CancelFlag, ReportOptions};

pub const AUDIT_FILE_NAME: &str = "threat-audit-report.pdf";

const TITLE: &str = "Security Threat Report";
const HEADER_HEIGHT: f64 = 40.0;
const SUMMARY_TEXT: Rgb = Rgb(50, 50, 50);
const TABLE_TOP: f64 = 80.0;

const HEADINGS: [&str; 5] = ["Timestamp", "Risk Level", "Threat Type", "Score", "Conf."];
const FIXED_WIDTHS: f64 = 45.0 + 25.0 + 20.0 + 20.0;
const COLUMN_WIDTHS: [f64; 5] = [45.0, 25.0, CONTENT_WIDTH - FIXED_WIDTHS, 20.0, 20.0];
const CELL_PADDING: f64 = 3.0;
const CELL_SIZE: f64 = 9.0;
const CELL_TEXT: Rgb = Rgb(30, 41, 59);
const GRID: Rgb = Rgb(200, 200, 200);
/// Body height below the repeated head on a continuation page.
const PAGE_TABLE_CAPACITY: f64 =
    BODY_BOTTOM - CONTINUED_TOP - (2.0 * CELL_PADDING + CELL_SIZE * PT_TO_MM * 1.15);

/// Lay out the audit report for `records`, in input order.
pub fn render_audit_report(records: &[ThreatRecord], options: &ReportOptions) -> Document {
    match build(records, options, |_| Ok::<(), Infallible>(())) {
        Ok(document) => document,
        Err(never) => match never {},
    }
}

/// Like [`render_audit_report`], but gives up at the next page boundary once
/// `cancel` is set.
pub fn render_audit_report_cancellable(
    records: &[ThreatRecord],
    options: &ReportOptions,
    cancel: &CancelFlag,
) -> Result<Document, ReportError> {
    build(records, options, |pages| {
        if cancel.is_cancelled() {
            debug!(pages, "Audit render cancelled");
            Err(ReportError::Cancelled { pages })
        } else {
            Ok(())
        }
    })
}

/// Count the summary numbers from scratch.
pub fn summarize(records: &[ThreatRecord]) -> AuditSummary {
    AuditSummary {
        total: records.len(),
        critical: records
            .iter()
            .filter(|r| r.risk_level == RiskLevel::Critical)
            .count(),
        high: records
            .iter()
            .filter(|r| r.risk_level == RiskLevel::High)
            .count(),
    }
}

/// `at_boundary` runs before the first page and before every page break with
/// the number of pages laid out so far.
fn build<E>(
    records: &[ThreatRecord],
    options: &ReportOptions,
    mut at_boundary: impl FnMut(usize) -> Result<(), E>,
) -> Result<Document, E> {
    at_boundary(0)?;

    let summary = summarize(records);
    let mut layout = Layout::new();

    draw_header(&mut layout, options);
    draw_summary(&mut layout, &summary);

    layout.set_y(TABLE_TOP);
    draw_table_head(&mut layout);
    let mut fresh_page = true;

    for record in records {
        let cells = row_cells(record, options);
        let wrapped: Vec<Vec<String>> = cells
            .iter()
            .zip(COLUMN_WIDTHS)
            .map(|(text, width)| wrap_text(text, width - 2.0 * CELL_PADDING, CELL_SIZE))
            .collect();
        let lines = wrapped.iter().map(Vec::len).max().unwrap_or(1);
        let color = record.risk_level.color();

        // A row taller than the free space is split line-wise; the head
        // repeats on every continuation page.
        let mut start = 0;
        loop {
            let rest = lines - start;
            if layout.fits(row_height(rest)) {
                draw_row(&mut layout, &wrapped, start..lines, color);
                fresh_page = false;
                break;
            }

            let room = lines_that_fit(&layout);
            let move_whole = start == 0 && row_height(rest) <= PAGE_TABLE_CAPACITY;
            if !fresh_page && (move_whole || room == 0) {
                at_boundary(layout.page_count())?;
                layout.break_page();
                draw_table_head(&mut layout);
                fresh_page = true;
                continue;
            }

            let take = room.clamp(1, rest);
            draw_row(&mut layout, &wrapped, start..start + take, color);
            start += take;
            at_boundary(layout.page_count())?;
            layout.break_page();
            draw_table_head(&mut layout);
            fresh_page = true;
        }
    }

    let attribution = options.attribution.clone();
    let pages = layout.finish(|number, total| Decoration {
        behind: None,
        above: Some((Section::Footer, footer(&attribution, number, total))),
    });

    debug!(rows = records.len(), pages = pages.len(), "Audit report laid out");

    Ok(Document {
        kind: ReportKind::Audit,
        title: TITLE.to_string(),
        file_name: AUDIT_FILE_NAME.to_string(),
        pages,
        summary: Some(summary),
        table_rows: records.len(),
    })
}

fn draw_header(layout: &mut Layout, options: &ReportOptions) {
    let s = Section::Header;
    layout.draw(s, DrawOp::fill_rect(0.0, 0.0, PAGE_WIDTH, HEADER_HEIGHT, PRIMARY));
    layout.draw(s, DrawOp::text(MARGIN_X, 20.0, TITLE, 22.0, WHITE).bold());
    layout.draw(
        s,
        DrawOp::text(
            MARGIN_X,
            30.0,
            format!("Generated on: {}", options.localize(options.generated_at)),
            10.0,
            WHITE,
        ),
    );
    layout.draw(
        s,
        DrawOp::text(PAGE_WIDTH - MARGIN_X, 20.0, "Confidential Security Audit", 10.0, WHITE)
            .aligned(Align::Right),
    );
}

fn draw_summary(layout: &mut Layout, summary: &AuditSummary) {
    let s = Section::Summary;
    layout.draw(
        s,
        DrawOp::text(MARGIN_X, 50.0, "Executive Summary", 14.0, SUMMARY_TEXT).bold(),
    );
    let lines = [
        (60.0, format!("Total Threats Detected: {}", summary.total)),
        (66.0, format!("Critical Incidents: {}", summary.critical)),
        (72.0, format!("High Priority Risks: {}", summary.high)),
    ];
    for (y, line) in lines {
        layout.draw(s, DrawOp::text(MARGIN_X, y, line, 10.0, SUMMARY_TEXT));
    }
}

fn row_cells(record: &ThreatRecord, options: &ReportOptions) -> [String; 5] {
    let score = match record.risk_score {
        Some(score) => format!("{}/100", score),
        None => "-".to_string(),
    };
    let confidence = match record.confidence {
        Some(_) => format!("{}%", record.confidence_label()),
        None => "-".to_string(),
    };
    [
        options.localize_opt(record.timestamp),
        record.risk_level.label().to_string(),
        record.scenario_type().unwrap_or("Unknown").to_string(),
        score,
        confidence,
    ]
}

fn row_height(lines: usize) -> f64 {
    2.0 * CELL_PADDING + lines as f64 * line_height(CELL_SIZE)
}

/// Whole cell lines that fit below the cursor on the current page.
fn lines_that_fit(layout: &Layout) -> usize {
    let free = layout.remaining() - 2.0 * CELL_PADDING;
    (free / line_height(CELL_SIZE)).floor().max(0.0) as usize
}

fn first_baseline(top: f64) -> f64 {
    top + CELL_PADDING + line_height(CELL_SIZE) * 0.75
}

fn cell_anchor(column: usize, left: f64) -> (f64, Align) {
    match column {
        3 | 4 => (left + COLUMN_WIDTHS[column] / 2.0, Align::Center),
        _ => (left + CELL_PADDING, Align::Left),
    }
}

fn draw_table_head(layout: &mut Layout) {
    let s = Section::Table;
    let top = layout.y();
    let height = row_height(1);
    layout.draw(s, DrawOp::fill_rect(MARGIN_X, top, CONTENT_WIDTH, height, PRIMARY));

    let mut left = MARGIN_X;
    for (column, heading) in HEADINGS.iter().enumerate() {
        let (x, align) = cell_anchor(column, left);
        layout.draw(
            s,
            DrawOp::text(x, first_baseline(top), *heading, CELL_SIZE, WHITE)
                .bold()
                .aligned(align),
        );
        left += COLUMN_WIDTHS[column];
    }
    layout.advance(height);
}

/// Draw lines `range` of a wrapped row as one band of cells.
fn draw_row(layout: &mut Layout, cells: &[Vec<String>], range: Range<usize>, level_color: Rgb) {
    let s = Section::Table;
    let top = layout.y();
    let lh = line_height(CELL_SIZE);
    let height = row_height(range.len());

    let mut left = MARGIN_X;
    for (column, lines) in cells.iter().enumerate() {
        let width = COLUMN_WIDTHS[column];
        layout.draw(s, DrawOp::stroke_rect(left, top, width, height, GRID, 0.1));

        let (x, align) = cell_anchor(column, left);
        let shown = lines.get(range.start.min(lines.len())..range.end.min(lines.len()));
        for (i, line) in shown.unwrap_or_default().iter().enumerate() {
            let mut op = DrawOp::text(
                x,
                first_baseline(top) + i as f64 * lh,
                line.as_str(),
                CELL_SIZE,
                if column == 1 { level_color } else { CELL_TEXT },
            )
            .aligned(align);
            if column == 1 {
                op = op.bold();
            }
            layout.draw(s, op);
        }
        left += width;
    }
    layout.advance(height);
}

fn footer(attribution: &str, number: usize, total: usize) -> Vec<DrawOp> {
    vec![
        DrawOp::text(MARGIN_X, FOOTER_BASELINE, attribution, 8.0, MUTED),
        DrawOp::text(
            PAGE_WIDTH - MARGIN_X,
            FOOTER_BASELINE,
            format!("Page {} of {}", number, total),
            8.0,
            MUTED,
        )
        .aligned(Align::Right),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

    fn options() -> ReportOptions {
        ReportOptions::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn records(n: usize) -> Vec<ThreatRecord> {
        let levels = [RiskLevel::Critical, RiskLevel::High, RiskLevel::Medium, RiskLevel::Low];
        (0..n)
            .map(|i| {
                ThreatRecord::new(&format!("rec-{}", i), levels[i % 4], t(i as i64))
                    .with_score(50 + (i % 50) as u32)
                    .with_confidence(90.0)
                    .with_scenario("Port Scan", "", "")
            })
            .collect()
    }

    #[test]
    fn test_empty_audit_report() {
        let doc = render_audit_report(&[], &options());

        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.table_rows, 0);
        assert_eq!(doc.summary, Some(AuditSummary::default()));
        assert!(doc.contains_text("Total Threats Detected: 0"));
        assert!(doc.contains_text("Timestamp"));
        assert!(doc.contains_text("Page 1 of 1"));
        assert_eq!(doc.file_name, AUDIT_FILE_NAME);
    }

    #[test]
    fn test_summary_matches_input() {
        let input = records(10);

        let doc = render_audit_report(&input, &options());

        let summary = doc.summary.unwrap();
        assert_eq!(summary.total, 10);
        assert_eq!(summary.critical, 3);
        assert_eq!(summary.high, 3);
        assert!(doc.contains_text("Critical Incidents: 3"));
        assert!(doc.contains_text("Generated on: 6/1/2025, 9:00:00 AM"));
    }

    #[test]
    fn test_rows_in_input_order_with_placeholders() {
        let mut bare = ThreatRecord::new("bare", RiskLevel::Unknown, t(0));
        bare.timestamp = None;
        let input = vec![
            ThreatRecord::new("first", RiskLevel::Low, t(0))
                .with_score(12)
                .with_confidence(97.0)
                .with_scenario("Malware Beacon", "", ""),
            bare,
        ];

        let doc = render_audit_report(&input, &options());

        let texts: Vec<&str> = doc.pages[0].texts().collect();
        let beacon = texts.iter().position(|t| *t == "Malware Beacon").unwrap();
        let unknown = texts.iter().position(|t| *t == "Unknown").unwrap();
        assert!(beacon < unknown);
        assert!(doc.contains_text("12/100"));
        assert!(doc.contains_text("97%"));
        assert!(doc.contains_text("UNKNOWN"));
    }

    #[test]
    fn test_risk_level_cell_uses_severity_color() {
        let input = vec![ThreatRecord::new("x", RiskLevel::Medium, t(0))];

        let doc = render_audit_report(&input, &options());

        let color = doc.pages[0].ops.iter().find_map(|op| match op {
            DrawOp::Text { text, color, .. } if text == "MEDIUM" => Some(*color),
            _ => None,
        });
        assert_eq!(color, Some(Rgb::AMBER));
    }

    #[test]
    fn test_pagination_repeats_head_and_footer() {
        let input = records(80);

        let doc = render_audit_report(&input, &options());

        assert!(doc.page_count() > 1);
        let total = doc.page_count();
        for page in &doc.pages {
            assert!(page.texts().any(|t| t == "Risk Level"));
            assert!(page.texts().any(|t| t == format!("Page {} of {}", page.number, total)));
        }
        assert!(!doc.pages[1].sections.contains(&Section::Summary));
        assert!(!doc.pages[1].sections.contains(&Section::Header));

        let rows: usize = doc
            .pages
            .iter()
            .map(|p| p.texts().filter(|t| *t == "Port Scan").count())
            .sum();
        assert_eq!(rows, 80);
    }

    /// Text baselines below the body area that are not the footer line.
    fn overflowing_texts(page: &crate::report::layout::Page) -> usize {
        page.ops
            .iter()
            .filter(|op| match op {
                DrawOp::Text { y, .. } => *y > BODY_BOTTOM && *y != FOOTER_BASELINE,
                _ => false,
            })
            .count()
    }

    #[test]
    fn test_oversized_row_is_split_across_pages() {
        let long = vec!["lorem"; 400].join(" ");
        let input = vec![ThreatRecord::new("long", RiskLevel::High, t(0)).with_scenario(&long, "", "")];

        let doc = render_audit_report(&input, &options());

        assert!(doc.page_count() > 1);
        let words: usize = doc
            .pages
            .iter()
            .flat_map(|p| p.texts())
            .map(|t| t.matches("lorem").count())
            .sum();
        assert_eq!(words, 400);
        assert!(doc.pages[0].texts().any(|t| t.contains("lorem")));
        for page in &doc.pages {
            assert!(page.texts().any(|t| t == "Risk Level"));
            assert_eq!(overflowing_texts(page), 0);
            for op in &page.ops {
                if let DrawOp::Rect { y, height, .. } = op {
                    assert!(y + height <= BODY_BOTTOM + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_row_after_oversized_row_starts_below_it() {
        let long = vec!["lorem"; 400].join(" ");
        let input = vec![
            ThreatRecord::new("long", RiskLevel::High, t(0)).with_scenario(&long, "", ""),
            ThreatRecord::new("next", RiskLevel::Low, t(1)).with_scenario("Port Scan", "", ""),
        ];

        let doc = render_audit_report(&input, &options());

        let last = doc.pages.last().unwrap();
        let texts: Vec<&str> = last.texts().collect();
        let lorem = texts.iter().rposition(|t| t.contains("lorem"));
        let scan = texts.iter().position(|t| *t == "Port Scan");
        assert!(scan.is_some());
        assert!(lorem.is_none() || lorem < scan);
    }

    #[test]
    fn test_section_order() {
        let doc = render_audit_report(&records(3), &options());

        assert_eq!(
            doc.section_order(),
            vec![Section::Header, Section::Summary, Section::Table, Section::Footer]
        );
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let input = records(40);

        assert_eq!(
            render_audit_report(&input, &options()),
            render_audit_report(&input, &options())
        );
    }

    #[test]
    fn test_cancelled_render_stops_at_page_boundary() {
        let flag = CancelFlag::new();
        flag.cancel();

        let result = render_audit_report_cancellable(&records(80), &options(), &flag);

        assert!(matches!(result, Err(ReportError::Cancelled { pages: 0 })));
    }

    #[test]
    fn test_uncancelled_render_matches_plain_render() {
        let input = records(80);

        let doc = render_audit_report_cancellable(&input, &options(), &CancelFlag::new()).unwrap();

        assert_eq!(doc, render_audit_report(&input, &options()));
    }
}
