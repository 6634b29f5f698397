//! PDF backend.
//!
//! Replays a laid-out [`Document`] onto `genpdf` pages. Each page becomes one
//! custom element followed by a page break. `genpdf` has no filled shapes, no
//! line widths and no rotated text: every stroke is the PDF default width, so
//! fills are drawn as overlapping horizontal strokes, thick borders as nested
//! outlines, and rotated text glyph by glyph along its baseline.

use std::path::{Path, PathBuf};

use genpdf::elements::PageBreak;
use genpdf::fonts::{self, FontData, FontFamily};
use genpdf::render::Area;
use genpdf::style::{Color, Style};
use genpdf::{Context, Element, Mm, Position, RenderResult, SimplePageDecorator};
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::model::Rgb;
use crate::report::layout::{Align, Document, DrawOp, PT_TO_MM};

/// Font directories searched after the configured one.
const FONT_DIRS: &[&str] = &[
    "./fonts",
    "/usr/share/fonts/liberation",
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/liberation-sans",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/dejavu",
    "/System/Library/Fonts/Supplemental",
    "/Library/Fonts",
];

const FONT_NAME: &str = "LiberationSans";

/// DejaVu ships `Oblique` rather than `Italic` faces.
const DEJAVU_FILES: [&str; 4] = [
    "DejaVuSans.ttf",
    "DejaVuSans-Bold.ttf",
    "DejaVuSans-Oblique.ttf",
    "DejaVuSans-BoldOblique.ttf",
];

/// Width of every stroke `genpdf` draws: the PDF default of one point.
pub const STROKE_WIDTH: f64 = PT_TO_MM;

/// Spacing between the strokes that make up a fill. Below [`STROKE_WIDTH`]
/// so that neighbouring strokes overlap.
pub const FILL_STEP: f64 = 0.3;

/// Cap height of the font relative to its size; converts baselines to the
/// top-left positions `genpdf` expects.
const ASCENT_EM: f64 = 0.8;

/// Serialises documents to PDF bytes.
#[derive(Clone)]
pub struct PdfRenderer {
    family: Option<FontFamily<FontData>>,
    searched: Vec<PathBuf>,
}

impl PdfRenderer {
    /// Look for fonts in `fonts_dir` first, then in the usual system places.
    pub fn new(fonts_dir: Option<PathBuf>) -> Self {
        let mut dirs: Vec<PathBuf> = fonts_dir.into_iter().collect();
        dirs.extend(FONT_DIRS.iter().map(PathBuf::from));
        Self::with_dirs(dirs)
    }

    /// Search exactly `dirs`, in order.
    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        let family = dirs
            .iter()
            .filter(|dir| dir.exists())
            .find_map(|dir| load_family(dir));

        match &family {
            Some(_) => debug!(dirs = dirs.len(), "PDF fonts loaded"),
            None => warn!(searched = ?dirs, "No PDF fonts found; PDF output disabled"),
        }

        Self {
            family,
            searched: dirs,
        }
    }

    /// Use a single TrueType face for every style.
    pub fn with_font_file(path: &Path) -> Self {
        let family = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontData::new(bytes, None).map_err(|e| e.to_string()));

        let family = match family {
            Ok(face) => Some(FontFamily {
                regular: face.clone(),
                bold: face.clone(),
                italic: face.clone(),
                bold_italic: face,
            }),
            Err(error) => {
                warn!(path = %path.display(), %error, "Unreadable PDF font");
                None
            }
        };

        Self {
            family,
            searched: vec![path.to_path_buf()],
        }
    }

    /// Whether PDF output is possible.
    pub fn is_available(&self) -> bool {
        self.family.is_some()
    }

    pub fn render(&self, document: &Document) -> Result<Vec<u8>, ReportError> {
        let family = self
            .family
            .clone()
            .ok_or_else(|| ReportError::FontsUnavailable {
                searched: self
                    .searched
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        let mut pdf = genpdf::Document::new(family);
        pdf.set_title(document.title.clone());
        pdf.set_minimal_conformance();

        let mut decorator = SimplePageDecorator::new();
        decorator.set_margins(0);
        pdf.set_page_decorator(decorator);

        let last = document.pages.len().saturating_sub(1);
        for (index, page) in document.pages.iter().enumerate() {
            pdf.push(PageElement {
                ops: page.ops.clone(),
            });
            if index < last {
                pdf.push(PageBreak::new());
            }
        }

        let mut buffer = Vec::new();
        pdf.render(&mut buffer)?;

        debug!(
            file = %document.file_name,
            pages = document.page_count(),
            bytes = buffer.len(),
            "PDF rendered"
        );
        Ok(buffer)
    }
}

impl std::fmt::Debug for PdfRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfRenderer")
            .field("available", &self.is_available())
            .field("searched", &self.searched)
            .finish()
    }
}

fn load_family(dir: &Path) -> Option<FontFamily<FontData>> {
    fonts::from_files(dir, FONT_NAME, None)
        .ok()
        .or_else(|| load_dejavu(dir))
}

fn load_dejavu(dir: &Path) -> Option<FontFamily<FontData>> {
    let [regular, bold, italic, bold_italic] = DEJAVU_FILES.map(|file| {
        std::fs::read(dir.join(file))
            .ok()
            .and_then(|bytes| FontData::new(bytes, None).ok())
    });
    Some(FontFamily {
        regular: regular?,
        bold: bold?,
        italic: italic?,
        bold_italic: bold_italic?,
    })
}

/// One laid-out page, drawn in a single pass.
struct PageElement {
    ops: Vec<DrawOp>,
}

impl Element for PageElement {
    fn render(
        &mut self,
        context: &Context,
        area: Area<'_>,
        _style: Style,
    ) -> Result<RenderResult, genpdf::error::Error> {
        for op in &self.ops {
            match op {
                DrawOp::Rect {
                    x,
                    y,
                    width,
                    height,
                    fill,
                    stroke,
                    line_width,
                    ..
                } => {
                    if let Some(fill) = fill {
                        fill_rect(&area, *x, *y, *width, *height, *fill);
                    }
                    if let Some(stroke) = stroke {
                        for inset in outline_insets(*line_width) {
                            stroke_rect(
                                &area,
                                *x + inset,
                                *y + inset,
                                *width - 2.0 * inset,
                                *height - 2.0 * inset,
                                *stroke,
                            );
                        }
                    }
                }
                DrawOp::Text {
                    x,
                    y,
                    text,
                    size,
                    bold,
                    color,
                    align,
                    angle,
                } => {
                    let mut style = Style::new()
                        .with_font_size(size.round().clamp(1.0, 255.0) as u8)
                        .with_color(color_of(*color));
                    if *bold {
                        style = style.bold();
                    }
                    if *angle == 0.0 {
                        draw_text(context, &area, *x, *y, text, *align, style)?;
                    } else {
                        draw_rotated(context, &area, *x, *y, text, *angle, style)?;
                    }
                }
            }
        }
        // Zero size keeps the following page break on this page.
        Ok(RenderResult::default())
    }
}

fn color_of(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

fn pos(x: impl Into<Mm>, y: impl Into<Mm>) -> Position {
    Position::new(x, y)
}

/// Baselines of the strokes filling a band from `y` to `y + height`.
fn fill_rows(y: f64, height: f64) -> Vec<f64> {
    let top = y + STROKE_WIDTH / 2.0;
    let bottom = y + height - STROKE_WIDTH / 2.0;
    if bottom <= top {
        return vec![y + height / 2.0];
    }

    let mut rows = Vec::new();
    let mut row = top;
    while row < bottom {
        rows.push(row);
        row += FILL_STEP;
    }
    rows.push(bottom);
    rows
}

/// Insets of the nested outlines that make up a border of `line_width`.
fn outline_insets(line_width: f64) -> Vec<f64> {
    let count = (line_width / FILL_STEP).ceil().max(1.0) as usize;
    (0..count).map(|i| i as f64 * FILL_STEP).collect()
}

fn line_style(color: Rgb) -> Style {
    Style::new().with_color(color_of(color))
}

fn fill_rect(area: &Area<'_>, x: f64, y: f64, width: f64, height: f64, color: Rgb) {
    let style = line_style(color);
    for row in fill_rows(y, height) {
        area.draw_line(vec![pos(x, row), pos(x + width, row)], style);
    }
}

fn stroke_rect(area: &Area<'_>, x: f64, y: f64, width: f64, height: f64, color: Rgb) {
    area.draw_line(
        vec![
            pos(x, y),
            pos(x + width, y),
            pos(x + width, y + height),
            pos(x, y + height),
            pos(x, y),
        ],
        line_style(color),
    );
}

fn text_top(baseline: f64, style: &Style) -> f64 {
    baseline - f64::from(style.font_size()) * PT_TO_MM * ASCENT_EM
}

fn draw_text(
    context: &Context,
    area: &Area<'_>,
    x: f64,
    y: f64,
    text: &str,
    align: Align,
    style: Style,
) -> Result<(), genpdf::error::Error> {
    let width = style.str_width(&context.font_cache, text);
    let left = match align {
        Align::Left => Mm::from(x),
        Align::Center => Mm::from(x) - width / 2.0,
        Align::Right => Mm::from(x) - width,
    };
    area.print_str(&context.font_cache, pos(left, text_top(y, &style)), style, text)?;
    Ok(())
}

/// Centre `text` on `(x, y)` and lay its glyphs along a baseline rotated
/// `angle` degrees counter-clockwise.
fn draw_rotated(
    context: &Context,
    area: &Area<'_>,
    x: f64,
    y: f64,
    text: &str,
    angle: f64,
    style: Style,
) -> Result<(), genpdf::error::Error> {
    let (sin, cos) = angle.to_radians().sin_cos();
    let top = text_top(y, &style);

    let mut offset = style.str_width(&context.font_cache, text) * -0.5;
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        let glyph: &str = ch.encode_utf8(&mut buf);
        // Page y grows downwards, so a counter-clockwise baseline rises.
        let gx = Mm::from(x) + offset * cos;
        let gy = Mm::from(top) - offset * sin;
        area.print_str(&context.font_cache, pos(gx, gy), style, glyph)?;
        offset += style.str_width(&context.font_cache, glyph);
    }
    Ok(())
}
