// Dashboard image: the composed status table drawn with plotters onto an
// RGB buffer and encoded as PNG.
use crate::error::{ReportError, ReportResult};
use crate::types::{Composition, ReportTable, RowLevel};
use crate::util::{format_int, format_long_date};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontStyle;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

// Path of the font currently registered under the style's family.
static REGISTERED_FONT: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

#[derive(Debug, Clone)]
pub struct RenderStyle {
    pub font_family: String,
    pub font_size: u32,
    pub row_height: u32,
    pub title_height: u32,
    pub padding: u32,
    /// Rough advance of one glyph, used to size columns.
    pub char_width: u32,
    pub indent: u32,
    pub min_count_width: u32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        RenderStyle {
            font_family: "report-sans".to_string(),
            font_size: 16,
            row_height: 28,
            title_height: 44,
            padding: 12,
            char_width: 10,
            indent: 18,
            min_count_width: 64,
        }
    }
}

/// Register a TTF for regular and bold text. Loading the same path again is a
/// no-op; a different path is read and replaces the previous registration.
pub fn register_font(path: &Path, style: &RenderStyle) -> ReportResult<()> {
    let mut current = REGISTERED_FONT
        .lock()
        .map_err(|_| ReportError::Render("font registry poisoned".into()))?;
    if current.as_deref() == Some(path) {
        return Ok(());
    }
    let bytes: &'static [u8] = Box::leak(std::fs::read(path)?.into_boxed_slice());
    for font_style in [FontStyle::Normal, FontStyle::Bold] {
        plotters::style::register_font(&style.font_family, font_style, bytes)
            .map_err(|_| ReportError::Render(format!("invalid font file {}", path.display())))?;
    }
    *current = Some(path.to_path_buf());
    debug!(font = %path.display(), "dashboard font registered");
    Ok(())
}

/// Pixel geometry of a table image; independent of any drawing backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub label_width: u32,
    pub count_width: u32,
    /// Area columns plus the total column.
    pub count_columns: u32,
    /// Header row plus one row per report row.
    pub rows: u32,
    pub width: u32,
    pub height: u32,
    title_height: u32,
    row_height: u32,
    padding: u32,
}

impl TableLayout {
    pub fn compute(table: &ReportTable, style: &RenderStyle) -> Self {
        let text_px = |s: &str| s.chars().count() as u32 * style.char_width;
        let indent_of = |level: RowLevel| level.depth().saturating_sub(1) as u32 * style.indent;

        let label_width = table
            .rows
            .iter()
            .map(|r| text_px(r.label.as_str()) + indent_of(r.level))
            .chain(std::iter::once(text_px("Status")))
            .max()
            .unwrap_or(0)
            + 2 * style.padding;

        let widest_count = table
            .rows
            .iter()
            .flat_map(|r| r.counts.iter().chain(std::iter::once(&r.total)))
            .map(|c| text_px(format_int(*c).as_str()))
            .chain(table.areas.iter().map(|a| text_px(a.as_str())))
            .chain(std::iter::once(text_px("Total")))
            .max()
            .unwrap_or(0);
        let count_width = (widest_count + 2 * style.padding).max(style.min_count_width);

        let count_columns = table.areas.len() as u32 + 1;
        let rows = table.rows.len() as u32 + 1;
        TableLayout {
            label_width,
            count_width,
            count_columns,
            rows,
            width: 2 * style.padding + label_width + count_columns * count_width,
            height: 2 * style.padding + style.title_height + rows * style.row_height,
            title_height: style.title_height,
            row_height: style.row_height,
            padding: style.padding,
        }
    }

    /// Top edge of table row `i` (0 is the header).
    pub fn row_y(&self, i: u32) -> u32 {
        self.padding + self.title_height + i * self.row_height
    }

    /// Left edge of count column `c` (0 is the first area).
    pub fn column_x(&self, c: u32) -> u32 {
        self.padding + self.label_width + c * self.count_width
    }
}

fn draw_err<E: std::fmt::Debug>(e: E) -> ReportError {
    ReportError::Render(format!("{e:?}"))
}

fn fill_for(level: RowLevel) -> (RGBColor, RGBColor) {
    match level {
        RowLevel::GrandTotal => (RGBColor(31, 56, 100), WHITE),
        RowLevel::Status => (RGBColor(221, 235, 247), BLACK),
        RowLevel::ErrorCode => (RGBColor(252, 228, 214), BLACK),
        RowLevel::SubErrorCode => (RGBColor(255, 245, 238), RGBColor(64, 64, 64)),
    }
}

pub fn render_png(table: &ReportTable, title: &str, style: &RenderStyle) -> ReportResult<Vec<u8>> {
    let layout = TableLayout::compute(table, style);
    let (w, h) = (layout.width, layout.height);
    let mut buf = vec![255u8; (w * h * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let family = style.font_family.as_str();
        let size = style.font_size as f64;
        let text_dy = ((style.row_height.saturating_sub(style.font_size)) / 2) as i32;
        let centered = Pos::new(HPos::Center, VPos::Top);

        root.draw(&Text::new(
            title.to_string(),
            (style.padding as i32, style.padding as i32),
            (family, size + 4.0).into_font().style(FontStyle::Bold).color(&BLACK),
        ))
        .map_err(draw_err)?;

        // header row
        let header_y = layout.row_y(0) as i32;
        let right = (layout.column_x(layout.count_columns)) as i32;
        let bottom_of = |y: i32| y + style.row_height as i32;
        root.draw(&Rectangle::new(
            [(style.padding as i32, header_y), (right, bottom_of(header_y))],
            RGBColor(68, 84, 106).filled(),
        ))
        .map_err(draw_err)?;
        let header_font = (family, size).into_font().style(FontStyle::Bold).color(&WHITE);
        root.draw(&Text::new(
            "Status".to_string(),
            ((style.padding * 2) as i32, header_y + text_dy),
            header_font.clone(),
        ))
        .map_err(draw_err)?;
        let headers = table.areas.iter().map(String::as_str).chain(std::iter::once("Total"));
        for (c, name) in headers.enumerate() {
            let cx = layout.column_x(c as u32) as i32 + layout.count_width as i32 / 2;
            root.draw(&Text::new(
                name.to_string(),
                (cx, header_y + text_dy),
                header_font.clone().pos(centered),
            ))
            .map_err(draw_err)?;
        }

        for (i, row) in table.rows.iter().enumerate() {
            let y = layout.row_y(i as u32 + 1) as i32;
            let (fill, ink) = fill_for(row.level);
            root.draw(&Rectangle::new(
                [(style.padding as i32, y), (right, bottom_of(y))],
                fill.filled(),
            ))
            .map_err(draw_err)?;
            root.draw(&Rectangle::new(
                [(style.padding as i32, y), (right, bottom_of(y))],
                RGBColor(200, 200, 200).stroke_width(1),
            ))
            .map_err(draw_err)?;

            let weight = match row.level {
                RowLevel::GrandTotal | RowLevel::Status => FontStyle::Bold,
                _ => FontStyle::Normal,
            };
            let font = (family, size).into_font().style(weight).color(&ink);
            let indent = row.level.depth().saturating_sub(1) as u32 * style.indent;
            root.draw(&Text::new(
                row.label.clone(),
                ((style.padding * 2 + indent) as i32, y + text_dy),
                font.clone(),
            ))
            .map_err(draw_err)?;

            let values = row.counts.iter().chain(std::iter::once(&row.total));
            for (c, value) in values.enumerate() {
                let cx = layout.column_x(c as u32) as i32 + layout.count_width as i32 / 2;
                root.draw(&Text::new(
                    format_int(*value),
                    (cx, y + text_dy),
                    font.clone().pos(centered),
                ))
                .map_err(draw_err)?;
            }
        }

        root.present().map_err(draw_err)?;
    }
    encode_png(buf, w, h)
}

/// Small image carrying only a message, used when there is nothing to tabulate.
pub fn render_placeholder(message: &str, style: &RenderStyle) -> ReportResult<Vec<u8>> {
    let w = (message.chars().count() as u32 * style.char_width + 4 * style.padding).max(320);
    let h = style.title_height + 2 * style.padding;
    let mut buf = vec![255u8; (w * h * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
        root.fill(&RGBColor(245, 245, 245)).map_err(draw_err)?;
        root.draw(&Text::new(
            message.to_string(),
            ((w / 2) as i32, (h / 2) as i32),
            (style.font_family.as_str(), style.font_size as f64)
                .into_font()
                .color(&RGBColor(90, 90, 90))
                .pos(Pos::new(HPos::Center, VPos::Center)),
        ))
        .map_err(draw_err)?;
        root.present().map_err(draw_err)?;
    }
    encode_png(buf, w, h)
}

/// Dashboard for one day: the status table, or a placeholder when the
/// composition came back empty.
pub fn render_dashboard(
    composition: &Composition,
    day: NaiveDate,
    font_path: &Path,
    style: &RenderStyle,
) -> ReportResult<Vec<u8>> {
    register_font(font_path, style)?;
    match composition {
        Composition::Table(table) => {
            let orders = table.grand_total().map(|r| r.total).unwrap_or(0);
            let title = format!("Work order status, {} ({} orders)", format_long_date(day), format_int(orders));
            render_png(table, &title, style)
        }
        Composition::NoRelevantData => {
            render_placeholder(&format!("No relevant data for {}", format_long_date(day)), style)
        }
    }
}

fn encode_png(buf: Vec<u8>, w: u32, h: u32) -> ReportResult<Vec<u8>> {
    let img = image::RgbImage::from_raw(w, h, buf)
        .ok_or_else(|| ReportError::Render("pixel buffer does not match image size".into()))?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| ReportError::Render(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReportRow;

    fn table() -> ReportTable {
        ReportTable {
            day: None,
            areas: vec!["CID".into(), "CPP".into()],
            rows: vec![
                ReportRow::new(RowLevel::Status, "WORKFAIL", vec![1, 2]),
                ReportRow::new(RowLevel::ErrorCode, "KENDALA TEKNIK", vec![1, 2]),
                ReportRow::new(RowLevel::SubErrorCode, "ODP FULL", vec![0, 2]),
                ReportRow::new(RowLevel::GrandTotal, "Grand Total", vec![1, 2]),
            ],
        }
    }

    #[test]
    fn layout_sizes_columns_from_content() {
        let style = RenderStyle::default();
        let layout = TableLayout::compute(&table(), &style);

        // "KENDALA TEKNIK" is 14 chars at depth 2, "ODP FULL" is 8 at depth 3
        let expected_label = 14 * style.char_width + style.indent + 2 * style.padding;
        assert_eq!(layout.label_width, expected_label);
        // the "Total" header is the widest count cell
        assert_eq!(layout.count_width, 5 * style.char_width + 2 * style.padding);
        assert_eq!(layout.count_columns, 3);
        assert_eq!(layout.rows, 5);
        assert_eq!(
            layout.width,
            2 * style.padding + layout.label_width + 3 * layout.count_width
        );
        assert_eq!(
            layout.height,
            2 * style.padding + style.title_height + 5 * style.row_height
        );
    }

    #[test]
    fn rows_and_columns_do_not_overlap() {
        let style = RenderStyle::default();
        let layout = TableLayout::compute(&table(), &style);
        assert_eq!(layout.row_y(1) - layout.row_y(0), style.row_height);
        assert_eq!(layout.column_x(1) - layout.column_x(0), layout.count_width);
        assert!(layout.column_x(layout.count_columns) <= layout.width);
        assert!(layout.row_y(layout.rows) <= layout.height);
    }

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    // Rendering needs a real TTF; machines without one skip these checks.
    fn installed_font() -> Option<PathBuf> {
        let path = std::env::var("REPORT_FONT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"));
        path.exists().then_some(path)
    }

    fn png_size(png: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory_with_format(png, image::ImageFormat::Png).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn table_renders_to_png_of_layout_size() {
        let Some(font) = installed_font() else {
            return;
        };
        let style = RenderStyle::default();
        let day = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        let png = render_dashboard(&Composition::Table(table()), day, &font, &style).unwrap();

        assert!(png.starts_with(&PNG_SIGNATURE));
        let layout = TableLayout::compute(&table(), &style);
        assert_eq!(png_size(&png), (layout.width, layout.height));
    }

    #[test]
    fn empty_composition_renders_placeholder() {
        let Some(font) = installed_font() else {
            return;
        };
        let style = RenderStyle::default();
        let day = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        let png = render_dashboard(&Composition::NoRelevantData, day, &font, &style).unwrap();

        assert!(png.starts_with(&PNG_SIGNATURE));
        assert_eq!(png_size(&png).1, style.title_height + 2 * style.padding);
    }

    #[test]
    fn missing_font_fails_even_after_a_good_one() {
        let style = RenderStyle::default();
        if let Some(font) = installed_font() {
            register_font(&font, &style).unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let err = register_font(&dir.path().join("missing.ttf"), &style).unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }

    #[test]
    fn wide_counts_grow_the_count_column() {
        let style = RenderStyle::default();
        let mut t = table();
        t.rows[0] = ReportRow::new(RowLevel::Status, "WORKFAIL", vec![123_456_789, 1]);
        let layout = TableLayout::compute(&t, &style);
        // "123,456,790" total is 11 chars
        assert_eq!(layout.count_width, 11 * style.char_width + 2 * style.padding);
    }
}
