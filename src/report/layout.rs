//! Page geometry and the laid-out document model.
//!
//! A [`Document`] is a list of A4 pages, each holding positioned drawing
//! operations in millimetres with the origin at the top-left corner. Text
//! positions are baselines. The model is backend-agnostic: the PDF backend
//! only replays it.

use serde::Serialize;

use crate::model::Rgb;

pub const PAGE_WIDTH: f64 = 210.0;
pub const PAGE_HEIGHT: f64 = 297.0;
pub const MARGIN_X: f64 = 14.0;
pub const CONTENT_WIDTH: f64 = PAGE_WIDTH - 2.0 * MARGIN_X;
/// Top of the body area on continuation pages.
pub const CONTINUED_TOP: f64 = 20.0;
/// Body content must end above this line; the footer lives below it.
pub const BODY_BOTTOM: f64 = 272.0;
pub const FOOTER_BASELINE: f64 = 285.0;

pub const PT_TO_MM: f64 = 0.3528;
/// Average Helvetica glyph advance as a fraction of the em.
const AVG_GLYPH_EM: f64 = 0.52;
const AVG_GLYPH_EM_BOLD: f64 = 0.56;

pub const PRIMARY: Rgb = Rgb(15, 23, 42);
pub const WHITE: Rgb = Rgb(255, 255, 255);
pub const MUTED: Rgb = Rgb(150, 150, 150);
pub const BODY_TEXT: Rgb = Rgb(70, 80, 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    Left,
    Center,
    Right,
}

/// A named region of a report, used to check section ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Watermark,
    Header,
    Scenario,
    Metrics,
    RiskFactors,
    Recommendations,
    AutomatedActions,
    Summary,
    Table,
    Footer,
}

/// A single drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        radius: f64,
        fill: Option<Rgb>,
        stroke: Option<Rgb>,
        line_width: f64,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        /// Font size in points.
        size: f64,
        bold: bool,
        color: Rgb,
        align: Align,
        /// Counter-clockwise rotation in degrees.
        angle: f64,
    },
}

impl DrawOp {
    pub fn text(x: f64, y: f64, text: impl Into<String>, size: f64, color: Rgb) -> Self {
        DrawOp::Text {
            x,
            y,
            text: text.into(),
            size,
            bold: false,
            color,
            align: Align::Left,
            angle: 0.0,
        }
    }

    pub fn bold(mut self) -> Self {
        if let DrawOp::Text { bold, .. } = &mut self {
            *bold = true;
        }
        self
    }

    pub fn aligned(mut self, to: Align) -> Self {
        if let DrawOp::Text { align, .. } = &mut self {
            *align = to;
        }
        self
    }

    pub fn rotated(mut self, degrees: f64) -> Self {
        if let DrawOp::Text { angle, .. } = &mut self {
            *angle = degrees;
        }
        self
    }

    pub fn fill_rect(x: f64, y: f64, width: f64, height: f64, fill: Rgb) -> Self {
        DrawOp::Rect {
            x,
            y,
            width,
            height,
            radius: 0.0,
            fill: Some(fill),
            stroke: None,
            line_width: 0.0,
        }
    }

    pub fn stroke_rect(x: f64, y: f64, width: f64, height: f64, stroke: Rgb, line_width: f64) -> Self {
        DrawOp::Rect {
            x,
            y,
            width,
            height,
            radius: 0.0,
            fill: None,
            stroke: Some(stroke),
            line_width,
        }
    }

    pub fn rounded(mut self, r: f64) -> Self {
        if let DrawOp::Rect { radius, .. } = &mut self {
            *radius = r;
        }
        self
    }

    pub fn with_stroke(mut self, color: Rgb, width: f64) -> Self {
        if let DrawOp::Rect {
            stroke, line_width, ..
        } = &mut self
        {
            *stroke = Some(color);
            *line_width = width;
        }
        self
    }

    /// The text payload, if this is a text operation.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DrawOp::Text { text, .. } => Some(text),
            DrawOp::Rect { .. } => None,
        }
    }
}

/// One laid-out page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// 1-based page number.
    pub number: usize,
    pub ops: Vec<DrawOp>,
    /// Sections in the order their first operation landed on this page.
    pub sections: Vec<Section>,
}

impl Page {
    fn new(number: usize) -> Self {
        Self {
            number,
            ops: Vec::new(),
            sections: Vec::new(),
        }
    }

    fn mark(&mut self, section: Section) {
        if !self.sections.contains(&section) {
            self.sections.push(section);
        }
    }

    /// Every text run on the page, in drawing order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(DrawOp::as_text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Incident,
    Audit,
}

/// Executive summary numbers of an audit report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
}

/// A fully laid-out report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub kind: ReportKind,
    pub title: String,
    /// Suggested file name for persistence by the caller.
    pub file_name: String,
    pub pages: Vec<Page>,
    /// Audit reports only.
    pub summary: Option<AuditSummary>,
    /// Body rows of the main table (audit records or risk factors).
    pub table_rows: usize,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Sections in order of first appearance across the whole document.
    pub fn section_order(&self) -> Vec<Section> {
        let mut order = Vec::new();
        for section in self.pages.iter().flat_map(|p| p.sections.iter()) {
            if !order.contains(section) {
                order.push(*section);
            }
        }
        order
    }

    /// Whether any page carries the given text run verbatim.
    pub fn contains_text(&self, needle: &str) -> bool {
        self.pages.iter().flat_map(Page::texts).any(|t| t == needle)
    }
}

/// Vertical cursor over a growing list of pages.
#[derive(Debug)]
pub struct Layout {
    pages: Vec<Page>,
    y: f64,
}

impl Layout {
    pub fn new() -> Self {
        Self {
            pages: vec![Page::new(1)],
            y: 0.0,
        }
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn set_y(&mut self, y: f64) {
        self.y = y;
    }

    pub fn advance(&mut self, dy: f64) {
        self.y += dy;
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether a block of `height` fits between the cursor and the body bottom.
    pub fn fits(&self, height: f64) -> bool {
        self.y + height <= BODY_BOTTOM
    }

    pub fn remaining(&self) -> f64 {
        (BODY_BOTTOM - self.y).max(0.0)
    }

    /// Start a new page and move the cursor to its body top.
    pub fn break_page(&mut self) {
        let number = self.pages.len() + 1;
        self.pages.push(Page::new(number));
        self.y = CONTINUED_TOP;
    }

    /// Break only when `height` does not fit. Returns whether a break happened.
    pub fn ensure(&mut self, height: f64) -> bool {
        if self.fits(height) {
            false
        } else {
            self.break_page();
            true
        }
    }

    pub fn draw(&mut self, section: Section, op: DrawOp) {
        let page = self.current();
        page.mark(section);
        page.ops.push(op);
    }

    fn current(&mut self) -> &mut Page {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Run `decorate` on every page once layout is final.
    ///
    /// `prepend` operations are drawn before the body, so they sit behind it.
    pub fn finish<F>(mut self, mut decorate: F) -> Vec<Page>
    where
        F: FnMut(usize, usize) -> Decoration,
    {
        let total = self.pages.len();
        for page in &mut self.pages {
            let decoration = decorate(page.number, total);
            if let Some((section, ops)) = decoration.behind {
                let body = std::mem::replace(&mut page.ops, ops);
                page.ops.extend(body);
                page.sections.insert(0, section);
            }
            if let Some((section, ops)) = decoration.above {
                page.ops.extend(ops);
                page.mark(section);
            }
        }
        self.pages
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-page operations added after layout.
#[derive(Debug, Default)]
pub struct Decoration {
    pub behind: Option<(Section, Vec<DrawOp>)>,
    pub above: Option<(Section, Vec<DrawOp>)>,
}

/// Line height in millimetres for a font size in points.
pub fn line_height(size_pt: f64) -> f64 {
    size_pt * PT_TO_MM * 1.15
}

/// Estimated rendered width of `text` in millimetres.
pub fn text_width(text: &str, size_pt: f64, bold: bool) -> f64 {
    let em = if bold { AVG_GLYPH_EM_BOLD } else { AVG_GLYPH_EM };
    text.chars().count() as f64 * size_pt * PT_TO_MM * em
}

/// Greedy word wrap to `max_width` millimetres.
///
/// Never drops text: words longer than a line are split across lines.
/// Always returns at least one line.
pub fn wrap_text(text: &str, max_width: f64, size_pt: f64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if text_width(&candidate, size_pt, false) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        // Split an over-long word by characters.
        for ch in word.chars() {
            current.push(ch);
            if text_width(&current, size_pt, false) > max_width && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(ch);
            }
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_keeps_every_word() {
        let text = "Anomalous outbound traffic pattern detected matching C2 communication \
                    profile across several hosts in the finance segment overnight.";

        let lines = wrap_text(text, 60.0, 11.0);

        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), text.split_whitespace().collect::<Vec<_>>().join(" "));
        for line in &lines {
            assert!(text_width(line, 11.0, false) <= 60.0);
        }
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let word = "x".repeat(200);

        let lines = wrap_text(&word, 30.0, 11.0);

        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
    }

    #[test]
    fn test_wrap_empty_text_yields_one_line() {
        assert_eq!(wrap_text("", 50.0, 10.0), vec![String::new()]);
    }

    #[test]
    fn test_layout_breaks_when_block_does_not_fit() {
        let mut layout = Layout::new();
        layout.set_y(BODY_BOTTOM - 5.0);

        assert!(!layout.ensure(5.0));
        assert!(layout.ensure(5.1));
        assert_eq!(layout.page_count(), 2);
        assert_eq!(layout.y(), CONTINUED_TOP);
    }

    #[test]
    fn test_finish_places_background_first() {
        let mut layout = Layout::new();
        layout.draw(Section::Header, DrawOp::text(10.0, 10.0, "Title", 12.0, PRIMARY));
        layout.break_page();
        layout.draw(Section::Table, DrawOp::text(10.0, 30.0, "Row", 9.0, PRIMARY));

        let pages = layout.finish(|number, total| Decoration {
            behind: Some((
                Section::Watermark,
                vec![DrawOp::text(0.0, 0.0, "BG", 60.0, WHITE)],
            )),
            above: Some((
                Section::Footer,
                vec![DrawOp::text(0.0, 0.0, format!("Page {} of {}", number, total), 8.0, MUTED)],
            )),
        });

        assert_eq!(pages.len(), 2);
        for page in &pages {
            assert_eq!(page.ops.first().and_then(DrawOp::as_text), Some("BG"));
            assert_eq!(page.sections.first(), Some(&Section::Watermark));
            assert_eq!(page.sections.last(), Some(&Section::Footer));
        }
        assert_eq!(pages[1].texts().last(), Some("Page 2 of 2"));
    }
}
