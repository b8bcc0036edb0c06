//! Printable blank answer sheets.
//!
//! The code sits in the top strip read by OCR. Everything except the code value and
//! the bubbles is printed grey so it falls above the binarization threshold; a black
//! colon would otherwise be picked up as two bubbles.

use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, Greyscale, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference,
    Point, Polygon,
};
use thiserror::Error;

use crate::db::models::option_letters;
use crate::services::sheet_vision::layout::TemplateLayout;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 20.0;
const CODE_BASELINE: f32 = 283.0;
const CODE_FONT_SIZE: f32 = 24.0;
const TITLE_BASELINE: f32 = 272.0;
const NAME_BASELINE: f32 = 262.0;
const LETTERS_BASELINE: f32 = 251.0;
const FIRST_ROW_Y: f32 = 245.0;
const ROW_PITCH: f32 = 7.0;
const LAST_ROW_MIN_Y: f32 = 15.0;
const FIRST_BUBBLE_X: f32 = 32.0;
const OPTION_PITCH: f32 = 6.5;
/// Ring centre-line radius in mm; with the stroke the ring stays inside the detector's
/// area window over the supported render resolutions.
const BUBBLE_RADIUS: f32 = 1.0;
/// Stroke width in points.
const BUBBLE_STROKE: f32 = 0.8;
const LABEL_GREY: f32 = 0.75;
/// Darker than the other labels for OCR, still lighter than the binarization threshold.
const CODE_LABEL_GREY: f32 = 0.65;
const TEMPLATE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Error)]
pub(crate) enum SheetPdfError {
    #[error("Failed to render answer sheet PDF: {0}")]
    Render(String),
}

impl From<printpdf::Error> for SheetPdfError {
    fn from(err: printpdf::Error) -> Self {
        Self::Render(err.to_string())
    }
}

pub(crate) fn rows_per_page() -> usize {
    ((FIRST_ROW_Y - LAST_ROW_MIN_Y) / ROW_PITCH) as usize + 1
}

fn row_y(row_on_page: usize) -> f32 {
    FIRST_ROW_Y - ROW_PITCH * row_on_page as f32
}

fn bubble_x(option: usize) -> f32 {
    FIRST_BUBBLE_X + OPTION_PITCH * option as f32
}

/// Bubble centres of the first page as page fractions, matching the printed grid.
pub(crate) fn template_layout(num_questions: i32, num_options: i32) -> TemplateLayout {
    let questions = usize::try_from(num_questions).unwrap_or(0).min(rows_per_page());
    let options = option_letters(num_options).len();

    let slots = (0..questions)
        .map(|row| {
            let y = f64::from(PAGE_HEIGHT - row_y(row)) / f64::from(PAGE_HEIGHT);
            (0..options).map(|option| (f64::from(bubble_x(option)) / f64::from(PAGE_WIDTH), y)).collect()
        })
        .collect();

    TemplateLayout::new(slots, TEMPLATE_TOLERANCE)
}

/// One A4 sheet (plus overflow pages) per code.
pub(crate) fn render_answer_sheets(
    subject: &str,
    num_questions: i32,
    num_options: i32,
    codes: &[String],
) -> Result<Vec<u8>, SheetPdfError> {
    let letters = option_letters(num_options);
    let questions = usize::try_from(num_questions).unwrap_or(0);
    let pages_per_sheet = questions.div_ceil(rows_per_page()).max(1);

    let (doc, first_page, first_layer) =
        PdfDocument::new(format!("Answer sheets - {subject}"), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Sheet");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    let mut first = Some((first_page, first_layer));
    for code in codes {
        for page in 0..pages_per_sheet {
            let (page_index, layer_index) = match first.take() {
                Some(indices) => indices,
                None => doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Sheet"),
            };
            let layer = doc.get_page(page_index).get_layer(layer_index);

            draw_header(&layer, &regular, &bold, subject, code, page, pages_per_sheet);

            let start = page * rows_per_page();
            let end = questions.min(start + rows_per_page());
            draw_letters(&layer, &regular, &letters);
            for question in start..end {
                draw_question_row(&layer, &regular, question, question - start, letters.len());
            }
        }
    }

    Ok(doc.save_to_bytes()?)
}

fn grey(level: f32) -> Color {
    Color::Greyscale(Greyscale::new(level, None))
}

fn draw_header(
    layer: &PdfLayerReference,
    regular: &IndirectFontRef,
    bold: &IndirectFontRef,
    subject: &str,
    code: &str,
    page: usize,
    pages: usize,
) {
    layer.begin_text_section();
    layer.set_font(bold, CODE_FONT_SIZE);
    layer.set_text_cursor(Mm(MARGIN_LEFT), Mm(CODE_BASELINE));
    layer.set_fill_color(grey(CODE_LABEL_GREY));
    layer.write_text("CODE: ", bold);
    layer.set_fill_color(grey(0.0));
    layer.write_text(code, bold);
    layer.end_text_section();

    layer.set_fill_color(grey(LABEL_GREY));
    let title = if pages > 1 {
        format!("{subject} ({}/{pages})", page + 1)
    } else {
        subject.to_string()
    };
    layer.use_text(title, 12.0, Mm(MARGIN_LEFT), Mm(TITLE_BASELINE), regular);
    layer.use_text("Name:", 10.0, Mm(MARGIN_LEFT), Mm(NAME_BASELINE), regular);

    layer.set_outline_color(grey(LABEL_GREY));
    layer.set_outline_thickness(0.5);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN_LEFT + 12.0), Mm(NAME_BASELINE - 0.5)), false),
            (Point::new(Mm(PAGE_WIDTH - MARGIN_LEFT), Mm(NAME_BASELINE - 0.5)), false),
        ],
        is_closed: false,
    });
}

fn draw_letters(layer: &PdfLayerReference, regular: &IndirectFontRef, letters: &[String]) {
    layer.set_fill_color(grey(LABEL_GREY));
    for (option, letter) in letters.iter().enumerate() {
        layer.use_text(letter.as_str(), 7.0, Mm(bubble_x(option) - 1.0), Mm(LETTERS_BASELINE), regular);
    }
}

fn draw_question_row(
    layer: &PdfLayerReference,
    regular: &IndirectFontRef,
    question: usize,
    row_on_page: usize,
    options: usize,
) {
    let y = row_y(row_on_page);

    layer.set_fill_color(grey(LABEL_GREY));
    layer.use_text(format!("{}.", question + 1), 8.0, Mm(MARGIN_LEFT), Mm(y - 1.0), regular);

    layer.set_outline_color(grey(0.0));
    layer.set_outline_thickness(BUBBLE_STROKE);
    for option in 0..options {
        let ring = printpdf::utils::calculate_points_for_circle(
            Mm(BUBBLE_RADIUS),
            Mm(bubble_x(option)),
            Mm(y),
        );
        layer.add_polygon(Polygon {
            rings: vec![ring],
            mode: PaintMode::Stroke,
            winding_order: WindingOrder::NonZero,
        });
    }
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    use super::*;
    use crate::core::config::{DEFAULT_PDF_RENDER_DPI, PDF_RENDER_DPI_RANGE};
    use crate::db::models::AnswerMap;
    use crate::services::sheet_vision::layout::RowMajorLayout;
    use crate::services::sheet_vision::{detect_answers, DetectionParams};

    const PT_TO_MM: f32 = 25.4 / 72.0;

    fn px_per_mm(dpi: u32) -> f32 {
        dpi as f32 / 25.4
    }

    fn outer_radius_px(dpi: u32) -> f32 {
        (BUBBLE_RADIUS + BUBBLE_STROKE * PT_TO_MM / 2.0) * px_per_mm(dpi)
    }

    fn grey_pixel(level: f32) -> Luma<u8> {
        Luma([(level * 255.0).round() as u8])
    }

    /// Raster of a printed sheet's first page with `marks[q]` filled in by the student.
    fn printed_page(dpi: u32, num_options: usize, marks: &[usize]) -> GrayImage {
        let scale = px_per_mm(dpi);
        let to_px = |mm: f32| (mm * scale).round() as i32;
        let mut page =
            GrayImage::from_pixel(to_px(PAGE_WIDTH) as u32, to_px(PAGE_HEIGHT) as u32, Luma([255]));

        // Colon of the code label, dot-sized squares at the label's grey.
        let dot = to_px(1.15) as u32;
        for rise in [0.3, 4.5] {
            let top = to_px(PAGE_HEIGHT - CODE_BASELINE - rise) - dot as i32;
            draw_filled_rect_mut(
                &mut page,
                Rect::at(to_px(MARGIN_LEFT + 14.0), top).of_size(dot, dot),
                grey_pixel(CODE_LABEL_GREY),
            );
        }

        let outer = outer_radius_px(dpi).round() as i32;
        let inner = ((BUBBLE_RADIUS - BUBBLE_STROKE * PT_TO_MM / 2.0) * scale).round() as i32;
        for (row, mark) in marks.iter().enumerate() {
            let y = to_px(PAGE_HEIGHT - row_y(row));
            for option in 0..num_options {
                let center = (to_px(bubble_x(option)), y);
                draw_filled_circle_mut(&mut page, center, outer, Luma([0]));
                if option != *mark {
                    draw_filled_circle_mut(&mut page, center, inner, Luma([255]));
                }
            }
        }
        page
    }

    fn expected(entries: &[(&str, &str)]) -> AnswerMap {
        entries.iter().map(|(q, a)| (q.to_string(), a.to_string())).collect()
    }

    fn codes(count: usize) -> Vec<String> {
        (0..count).map(|index| format!("C{index:04}")).collect()
    }

    #[test]
    fn renders_pdf_document() {
        let bytes = render_answer_sheets("Chemistry", 10, 5, &codes(3)).expect("pdf");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_exams_overflow_to_more_pages() {
        let short = render_answer_sheets("History", 5, 4, &codes(1)).expect("pdf");
        let long = render_answer_sheets("History", 120, 4, &codes(1)).expect("pdf");
        assert!(long.len() > short.len());
    }

    #[test]
    fn template_matches_printed_grid() {
        let layout = template_layout(3, 4);
        assert_eq!(layout.question_count(), 3);

        let first_row = &layout.slots()[0];
        assert_eq!(first_row.len(), 4);
        assert!(first_row.windows(2).all(|pair| pair[0].0 < pair[1].0));
        assert!(layout.slots()[1][0].1 > first_row[0].1);
        for (x, y) in layout.slots().iter().flatten() {
            assert!((0.0..1.0).contains(x) && (0.0..1.0).contains(y));
        }
    }

    #[test]
    fn template_covers_first_page_only() {
        assert_eq!(template_layout(200, 4).question_count(), rows_per_page());
        assert_eq!(template_layout(-1, 4).question_count(), 0);
    }

    #[test]
    fn widest_exam_fits_on_page() {
        assert!(bubble_x(25) + BUBBLE_RADIUS < PAGE_WIDTH - 10.0);
    }

    #[test]
    fn printed_bubbles_fit_detector_window_over_render_range() {
        let params = DetectionParams::default();
        for dpi in [*PDF_RENDER_DPI_RANGE.start(), DEFAULT_PDF_RENDER_DPI, *PDF_RENDER_DPI_RANGE.end()] {
            let radius = f64::from(outer_radius_px(dpi));
            let area = std::f64::consts::PI * radius * radius;
            assert!(area > params.min_area && area < params.max_area, "{dpi} dpi gives area {area}");
        }
    }

    #[test]
    fn printed_sheet_reads_back_with_row_major_layout() {
        let page = printed_page(DEFAULT_PDF_RENDER_DPI, 4, &[1, 3, 0]);

        let reading = detect_answers(&page, 3, 4, &RowMajorLayout, &DetectionParams::default());

        assert_eq!(reading.candidates, 12);
        assert_eq!(reading.answers, expected(&[("1", "B"), ("2", "D"), ("3", "A")]));
    }

    #[test]
    fn printed_sheet_reads_back_with_template_layout() {
        let page = printed_page(DEFAULT_PDF_RENDER_DPI, 5, &[4, 0, 2, 1]);
        let layout = template_layout(4, 5);

        let reading = detect_answers(&page, 4, 5, &layout, &DetectionParams::default());

        assert_eq!(reading.answers, expected(&[("1", "E"), ("2", "A"), ("3", "C"), ("4", "B")]));
    }

    #[test]
    fn black_colon_would_be_read_as_bubbles() {
        let scale = px_per_mm(DEFAULT_PDF_RENDER_DPI);
        let dot = (1.15 * scale).round() as u32;
        let mut page = GrayImage::from_pixel(400, 200, Luma([255]));
        draw_filled_rect_mut(&mut page, Rect::at(100, 60).of_size(dot, dot), Luma([0]));
        draw_filled_rect_mut(&mut page, Rect::at(100, 100).of_size(dot, dot), Luma([0]));
        let black = detect_answers(&page, 1, 2, &RowMajorLayout, &DetectionParams::default());
        assert_eq!(black.candidates, 2);

        let mut page = GrayImage::from_pixel(400, 200, Luma([255]));
        draw_filled_rect_mut(&mut page, Rect::at(100, 60).of_size(dot, dot), grey_pixel(CODE_LABEL_GREY));
        let grey = detect_answers(&page, 1, 2, &RowMajorLayout, &DetectionParams::default());
        assert_eq!(grey.candidates, 0);
    }
}
