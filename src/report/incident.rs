//! Single-incident report.
//!
//! Section order, top to bottom: header band, scenario block, metrics row,
//! risk factors table, recommendations, automated response (only when the
//! producer executed actions). Every page carries the diagonal watermark
//! behind the body and the footer.

use crate::model::{Rgb, ThreatRecord};
use crate::report::ReportOptions;
use crate::report::layout::{
    Align, BODY_BOTTOM, BODY_TEXT, CONTENT_WIDTH, Decoration, Document, DrawOp, FOOTER_BASELINE,
    Layout, MARGIN_X, MUTED, PAGE_WIDTH, PRIMARY, ReportKind, Section, WHITE, line_height,
    wrap_text,
};

const TITLE: &str = "Incident Verification Report";
const UNKNOWN_THREAT: &str = "Unknown Threat";
const NO_DESCRIPTION: &str = "No detailed description available.";
pub const NO_RECOMMENDATIONS: &str = "No specific recommendations provided.";
const RESTRICTED: &str = "Strictly for authorized personnel only.";
const WATERMARK: &str = "CONFIDENTIAL";

const HEADER_HEIGHT: f64 = 50.0;
const SUBTLE: Rgb = Rgb(200, 200, 200);
const LABEL: Rgb = Rgb(100, 100, 100);
const BOX_FILL: Rgb = Rgb(248, 250, 252);
const BOX_BORDER: Rgb = Rgb(226, 232, 240);
const WATERMARK_TINT: Rgb = Rgb(240, 240, 240);

const SCENARIO_TOP: f64 = 65.0;
const DESCRIPTION_SIZE: f64 = 11.0;
const DESCRIPTION_WIDTH: f64 = 170.0;
const BOX_MIN_HEIGHT: f64 = 30.0;
const BOX_FIRST_BASELINE: f64 = 10.0;
const BOX_BOTTOM_PADDING: f64 = 6.0;

const METRIC_BOX_WIDTH: f64 = 85.0;
const METRIC_BOX_HEIGHT: f64 = 40.0;

const FACTOR_TABLE_WIDTH: f64 = 86.0;
const FACTOR_NAME_WIDTH: f64 = 56.0;
const FACTOR_ROW_HEIGHT: f64 = 8.0;
const FACTOR_HEAD_FILL: Rgb = Rgb(51, 65, 85);
const STRIPE: Rgb = Rgb(241, 245, 249);

const BULLET_INDENT: f64 = 20.0;
const BULLET_TEXT_SIZE: f64 = 11.0;
const BULLET_STEP: f64 = 8.0;

/// Suggested file name: `incident-report-<first 8 chars of id>.pdf`.
pub fn incident_file_name(id: &str) -> String {
    let key: String = id
        .chars()
        .take(8)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("incident-report-{}.pdf", key)
}

/// Lay out the detailed report for one record.
pub fn render_incident_report(record: &ThreatRecord, options: &ReportOptions) -> Document {
    let mut layout = Layout::new();

    draw_header(&mut layout, record, options);
    layout.set_y(SCENARIO_TOP);
    draw_scenario(&mut layout, record);
    draw_metrics(&mut layout, record);
    let factor_rows = draw_risk_factors(&mut layout, record);
    draw_recommendations(&mut layout, record);
    if !record.automated_actions.is_empty() {
        draw_automated_actions(&mut layout, record);
    }

    let attribution = format!("Report generated by {}", options.attribution);
    let pages = layout.finish(|number, total| Decoration {
        behind: Some((Section::Watermark, vec![watermark()])),
        above: Some((Section::Footer, footer(&attribution, number, total))),
    });

    Document {
        kind: ReportKind::Incident,
        title: format!("{} - {}", TITLE, record.id),
        file_name: incident_file_name(&record.id),
        pages,
        summary: None,
        table_rows: factor_rows,
    }
}

fn draw_header(layout: &mut Layout, record: &ThreatRecord, options: &ReportOptions) {
    let accent = record.risk_level.color();
    let s = Section::Header;

    layout.draw(s, DrawOp::fill_rect(0.0, 0.0, PAGE_WIDTH, HEADER_HEIGHT, PRIMARY));
    layout.draw(s, DrawOp::text(MARGIN_X, 25.0, TITLE, 24.0, WHITE).bold());

    // Severity badge
    layout.draw(s, DrawOp::fill_rect(160.0, 15.0, 36.0, 12.0, accent).rounded(3.0));
    layout.draw(
        s,
        DrawOp::text(178.0, 22.0, record.risk_level.label(), 10.0, WHITE)
            .bold()
            .aligned(Align::Center),
    );

    layout.draw(
        s,
        DrawOp::text(MARGIN_X, 38.0, format!("Incident ID: {}", record.id), 10.0, SUBTLE),
    );
    layout.draw(
        s,
        DrawOp::text(
            MARGIN_X,
            44.0,
            format!("Detected: {}", options.localize_opt(record.timestamp)),
            10.0,
            SUBTLE,
        ),
    );
}

fn draw_scenario(layout: &mut Layout, record: &ThreatRecord) {
    let s = Section::Scenario;
    let heading = record.scenario_type().unwrap_or(UNKNOWN_THREAT);
    layout.draw(s, DrawOp::text(MARGIN_X, layout.y(), heading, 18.0, PRIMARY).bold());
    layout.advance(10.0);

    let description = match record.scenario.description.trim() {
        "" => NO_DESCRIPTION,
        d => d,
    };
    let lines = wrap_text(description, DESCRIPTION_WIDTH, DESCRIPTION_SIZE);
    let lh = line_height(DESCRIPTION_SIZE);

    // The box keeps its origin and width; it grows downwards and continues on
    // the next page when the description outruns the body area.
    let mut pending: &[String] = &lines;
    let mut first_segment = true;
    loop {
        let top = layout.y();
        let room = BODY_BOTTOM - top - BOX_FIRST_BASELINE - BOX_BOTTOM_PADDING;
        let capacity = if room < 0.0 {
            0
        } else {
            (room / lh).floor() as usize + 1
        };
        if capacity == 0 {
            layout.break_page();
            continue;
        }

        let take = capacity.min(pending.len());
        let (chunk, rest) = pending.split_at(take);
        let mut height =
            BOX_FIRST_BASELINE + take.saturating_sub(1) as f64 * lh + BOX_BOTTOM_PADDING;
        if first_segment && rest.is_empty() {
            height = height.max(BOX_MIN_HEIGHT);
        }

        layout.draw(
            s,
            DrawOp::fill_rect(MARGIN_X, top, CONTENT_WIDTH, height, BOX_FILL)
                .rounded(2.0)
                .with_stroke(BOX_BORDER, 0.3),
        );
        for (i, line) in chunk.iter().enumerate() {
            layout.draw(
                s,
                DrawOp::text(
                    MARGIN_X + 6.0,
                    top + BOX_FIRST_BASELINE + i as f64 * lh,
                    line.as_str(),
                    DESCRIPTION_SIZE,
                    BODY_TEXT,
                ),
            );
        }

        pending = rest;
        first_segment = false;
        if pending.is_empty() {
            layout.set_y(top + height + 15.0);
            break;
        }
        layout.break_page();
    }
}

fn draw_metrics(layout: &mut Layout, record: &ThreatRecord) {
    let s = Section::Metrics;
    let accent = record.risk_level.color();
    layout.ensure(METRIC_BOX_HEIGHT);
    let top = layout.y();

    let left = MARGIN_X;
    let right = PAGE_WIDTH - MARGIN_X - METRIC_BOX_WIDTH;
    let left_center = left + METRIC_BOX_WIDTH / 2.0;
    let right_center = right + METRIC_BOX_WIDTH / 2.0;

    let score = record.score_label();
    let confidence = record
        .confidence
        .map(|_| format!("{}%", record.confidence_label()))
        .unwrap_or_default();

    layout.draw(
        s,
        DrawOp::stroke_rect(left, top, METRIC_BOX_WIDTH, METRIC_BOX_HEIGHT, accent, 1.0).rounded(3.0),
    );
    layout.draw(
        s,
        DrawOp::text(left_center, top + 12.0, "Risk Score", 12.0, LABEL).aligned(Align::Center),
    );
    layout.draw(
        s,
        DrawOp::text(left_center, top + 28.0, score, 28.0, accent)
            .bold()
            .aligned(Align::Center),
    );

    layout.draw(
        s,
        DrawOp::stroke_rect(right, top, METRIC_BOX_WIDTH, METRIC_BOX_HEIGHT, LABEL, 1.0).rounded(3.0),
    );
    layout.draw(
        s,
        DrawOp::text(right_center, top + 12.0, "AI Confidence", 12.0, LABEL)
            .aligned(Align::Center),
    );
    layout.draw(
        s,
        DrawOp::text(right_center, top + 28.0, confidence, 28.0, PRIMARY)
            .bold()
            .aligned(Align::Center),
    );

    layout.advance(METRIC_BOX_HEIGHT + 15.0);
}

/// Returns the number of body rows drawn.
fn draw_risk_factors(layout: &mut Layout, record: &ThreatRecord) -> usize {
    let s = Section::RiskFactors;
    layout.ensure(10.0 + 2.0 * FACTOR_ROW_HEIGHT);
    layout.draw(
        s,
        DrawOp::text(MARGIN_X, layout.y(), "Risk Factors Analysis", 14.0, PRIMARY).bold(),
    );
    layout.advance(6.0);
    draw_factor_head(layout);

    for (index, (name, value)) in record.risk_factors.iter().enumerate() {
        if layout.ensure(FACTOR_ROW_HEIGHT) {
            draw_factor_head(layout);
        }
        let top = layout.y();
        if index % 2 == 1 {
            layout.draw(
                s,
                DrawOp::fill_rect(MARGIN_X, top, FACTOR_TABLE_WIDTH, FACTOR_ROW_HEIGHT, STRIPE),
            );
        }
        layout.draw(
            s,
            DrawOp::text(MARGIN_X + 2.0, top + 5.5, factor_label(name), 10.0, BODY_TEXT),
        );
        layout.draw(
            s,
            DrawOp::text(
                MARGIN_X + FACTOR_NAME_WIDTH + 2.0,
                top + 5.5,
                format!("{}/5", value),
                10.0,
                BODY_TEXT,
            ),
        );
        layout.advance(FACTOR_ROW_HEIGHT);
    }

    layout.advance(14.0);
    record.risk_factors.len()
}

fn draw_factor_head(layout: &mut Layout) {
    let s = Section::RiskFactors;
    let top = layout.y();
    layout.draw(
        s,
        DrawOp::fill_rect(MARGIN_X, top, FACTOR_TABLE_WIDTH, FACTOR_ROW_HEIGHT, FACTOR_HEAD_FILL),
    );
    layout.draw(s, DrawOp::text(MARGIN_X + 2.0, top + 5.5, "Factor", 10.0, WHITE).bold());
    layout.draw(
        s,
        DrawOp::text(MARGIN_X + FACTOR_NAME_WIDTH + 2.0, top + 5.5, "Severity", 10.0, WHITE).bold(),
    );
    layout.advance(FACTOR_ROW_HEIGHT);
}

/// `network_anomaly` -> `NETWORK ANOMALY`.
pub fn factor_label(name: &str) -> String {
    name.replace('_', " ").to_uppercase()
}

fn draw_recommendations(layout: &mut Layout, record: &ThreatRecord) {
    let s = Section::Recommendations;
    layout.ensure(10.0 + BULLET_STEP);
    layout.draw(
        s,
        DrawOp::text(MARGIN_X, layout.y(), "Recommended Actions", 14.0, PRIMARY).bold(),
    );
    layout.advance(10.0);

    if record.recommendations.is_empty() {
        draw_bullet(layout, s, NO_RECOMMENDATIONS, Rgb::RED, BODY_TEXT);
    } else {
        for rec in &record.recommendations {
            draw_bullet(layout, s, rec, Rgb::RED, BODY_TEXT);
        }
    }
}

fn draw_automated_actions(layout: &mut Layout, record: &ThreatRecord) {
    let s = Section::AutomatedActions;
    layout.advance(4.0);
    layout.ensure(10.0 + BULLET_STEP);
    layout.draw(
        s,
        DrawOp::text(MARGIN_X, layout.y(), "AUTOMATED RESPONSE ENABLED", 14.0, Rgb::RED).bold(),
    );
    layout.advance(10.0);

    for action in &record.automated_actions {
        draw_bullet(layout, s, &action.replace('_', " "), Rgb::RED, PRIMARY);
    }

    layout.ensure(BULLET_STEP);
    layout.draw(
        s,
        DrawOp::text(
            MARGIN_X,
            layout.y(),
            "* System has automatically executed these containment protocols.",
            9.0,
            Rgb::RED,
        ),
    );
    layout.advance(BULLET_STEP);
}

fn draw_bullet(layout: &mut Layout, section: Section, text: &str, bullet: Rgb, color: Rgb) {
    let width = PAGE_WIDTH - MARGIN_X - BULLET_INDENT;
    let lines = wrap_text(text, width, BULLET_TEXT_SIZE);
    let lh = line_height(BULLET_TEXT_SIZE);
    let height = ((lines.len() - 1) as f64 * lh + 3.5).max(BULLET_STEP);

    layout.ensure(height);
    let top = layout.y();
    layout.draw(section, DrawOp::text(MARGIN_X, top, "•", BULLET_TEXT_SIZE, bullet));
    for (i, line) in lines.iter().enumerate() {
        layout.draw(
            section,
            DrawOp::text(BULLET_INDENT, top + i as f64 * lh, line.as_str(), BULLET_TEXT_SIZE, color),
        );
    }
    layout.advance(height);
}

fn watermark() -> DrawOp {
    DrawOp::text(PAGE_WIDTH / 2.0, 150.0, WATERMARK, 60.0, WATERMARK_TINT)
        .bold()
        .aligned(Align::Center)
        .rotated(45.0)
}

fn footer(attribution: &str, number: usize, total: usize) -> Vec<DrawOp> {
    vec![
        DrawOp::text(MARGIN_X, FOOTER_BASELINE, attribution, 8.0, MUTED),
        DrawOp::text(
            PAGE_WIDTH / 2.0,
            FOOTER_BASELINE,
            format!("Page {} of {}", number, total),
            8.0,
            MUTED,
        )
        .aligned(Align::Center),
        DrawOp::text(PAGE_WIDTH - MARGIN_X, FOOTER_BASELINE, RESTRICTED, 8.0, MUTED)
            .aligned(Align::Right),
    ]
}
