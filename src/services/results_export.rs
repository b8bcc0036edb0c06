//! Exam results as spreadsheets.
//!
//! [`build_report`] produces a writer-independent [`ResultsReport`]; [`render_xlsx`]
//! lays it out with `rust_xlsxwriter`.

use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};
use thiserror::Error;

use crate::db::models::{AnswerMap, Exam, StudentAnswerSheet};
use crate::services::scoring::{answer_matches, round2};

pub(crate) const SUMMARY_SHEET: &str = "Results";
pub(crate) const DETAIL_SHEET: &str = "Detailed answers";
const HEADER_COLOR: u32 = 0x4472C4;
const TITLE_FONT_SIZE: f64 = 14.0;
const CODE_COLUMN_WIDTH: f64 = 20.0;
const SUMMARY_COLUMN_WIDTH: f64 = 15.0;
const QUESTION_COLUMN_WIDTH: f64 = 8.0;
const TOTALS_COLUMN_WIDTH: f64 = 12.0;
const MISSING: &str = "-";

#[derive(Debug, Error)]
pub(crate) enum ReportError {
    #[error("Failed to write spreadsheet: {0}")]
    Xlsx(#[from] XlsxError),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReportSheet {
    pub(crate) name: &'static str,
    pub(crate) title: String,
    /// Merge the title across the header columns.
    pub(crate) merge_title: bool,
    pub(crate) headers: Vec<String>,
    pub(crate) rows: Vec<Vec<Cell>>,
    /// Rows after a blank separator; the first one is rendered bold.
    pub(crate) footer: Vec<Vec<Cell>>,
    pub(crate) column_widths: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResultsReport {
    pub(crate) sheets: Vec<ReportSheet>,
}

impl ResultsReport {
    pub(crate) fn sheet(&self, name: &str) -> Option<&ReportSheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }
}

/// `sheets` must already be ordered for display.
pub(crate) fn build_report(
    exam: &Exam,
    key: Option<&AnswerMap>,
    sheets: &[StudentAnswerSheet],
    detailed: bool,
) -> ResultsReport {
    let mut report = ResultsReport { sheets: vec![summary_sheet(exam, sheets)] };
    if detailed {
        report.sheets.push(detail_sheet(exam, key, sheets));
    }
    report
}

fn summary_sheet(exam: &Exam, sheets: &[StudentAnswerSheet]) -> ReportSheet {
    let rows = sheets
        .iter()
        .map(|sheet| {
            vec![
                Cell::text(&sheet.sheet_code),
                Cell::Number(f64::from(sheet.correct_items)),
                Cell::Number(f64::from(sheet.incorrect_items)),
                Cell::Text(format_percentage(sheet.accuracy_percentage)),
            ]
        })
        .collect();

    let mut footer = Vec::new();
    if !sheets.is_empty() {
        let total = sheets.len() as f64;
        let average_correct =
            sheets.iter().map(|sheet| f64::from(sheet.correct_items)).sum::<f64>() / total;
        let average_percentage =
            sheets.iter().map(|sheet| sheet.accuracy_percentage).sum::<f64>() / total;

        footer.push(vec![Cell::text("STATISTICS")]);
        footer.push(vec![Cell::text("Total students"), Cell::Number(total)]);
        footer.push(vec![
            Cell::text("Average correct items"),
            Cell::Text(format!("{:.2}", round2(average_correct))),
        ]);
        footer.push(vec![
            Cell::text("Average percentage"),
            Cell::Text(format_percentage(average_percentage)),
        ]);
    }

    ReportSheet {
        name: SUMMARY_SHEET,
        title: format!("EXAM: {}", exam.subject_name),
        merge_title: true,
        headers: ["Code", "Correct items", "Incorrect items", "Accuracy"]
            .into_iter()
            .map(str::to_string)
            .collect(),
        rows,
        footer,
        column_widths: vec![
            CODE_COLUMN_WIDTH,
            SUMMARY_COLUMN_WIDTH,
            SUMMARY_COLUMN_WIDTH,
            SUMMARY_COLUMN_WIDTH,
        ],
    }
}

fn detail_sheet(exam: &Exam, key: Option<&AnswerMap>, sheets: &[StudentAnswerSheet]) -> ReportSheet {
    let questions: Vec<String> = (1..=exam.num_questions.max(0)).map(|q| q.to_string()).collect();

    let mut headers = vec!["Code".to_string()];
    headers.extend(questions.iter().map(|q| format!("Q{q}")));
    headers.extend(["Correct", "Incorrect", "%"].map(str::to_string));

    let rows = sheets
        .iter()
        .map(|sheet| {
            let mut row = vec![Cell::text(&sheet.sheet_code)];
            let answers = sheet.student_answers.as_ref().map(|answers| &answers.0);
            for question in &questions {
                row.push(Cell::Text(answer_cell(answers, key, question)));
            }
            row.push(Cell::Number(f64::from(sheet.correct_items)));
            row.push(Cell::Number(f64::from(sheet.incorrect_items)));
            row.push(Cell::Text(format_percentage(sheet.accuracy_percentage)));
            row
        })
        .collect();

    let mut column_widths = vec![CODE_COLUMN_WIDTH];
    column_widths.extend(std::iter::repeat(QUESTION_COLUMN_WIDTH).take(questions.len()));
    column_widths.extend([TOTALS_COLUMN_WIDTH; 3]);

    ReportSheet {
        name: DETAIL_SHEET,
        title: format!("Answer details - {}", exam.subject_name),
        merge_title: false,
        headers,
        rows,
        footer: Vec::new(),
        column_widths,
    }
}

fn answer_cell(answers: Option<&AnswerMap>, key: Option<&AnswerMap>, question: &str) -> String {
    let Some(answer) = answers.and_then(|answers| answers.get(question)) else {
        return MISSING.to_string();
    };

    match key {
        None => answer.clone(),
        Some(key) if answer_matches(answer, key.get(question).map(String::as_str)) => {
            format!("{answer} ✓")
        }
        Some(_) => format!("{answer} ✗"),
    }
}

fn format_percentage(value: f64) -> String {
    format!("{value:.2}%")
}

pub(crate) fn render_xlsx(report: &ResultsReport) -> Result<Vec<u8>, ReportError> {
    let mut workbook = Workbook::new();

    let title_format = Format::new().set_bold().set_font_size(TITLE_FONT_SIZE);
    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_COLOR))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let bold = Format::new().set_bold();

    for sheet in &report.sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name)?;

        let last_column = sheet.headers.len().saturating_sub(1) as u16;
        if sheet.merge_title && last_column > 0 {
            worksheet.merge_range(0, 0, 0, last_column, &sheet.title, &title_format)?;
        } else {
            worksheet.write_string_with_format(0, 0, &sheet.title, &title_format)?;
        }

        for (column, header) in sheet.headers.iter().enumerate() {
            worksheet.write_string_with_format(2, column as u16, header, &header_format)?;
        }

        let mut row_index: u32 = 3;
        for row in &sheet.rows {
            for (column, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(text) => worksheet.write_string(row_index, column as u16, text)?,
                    Cell::Number(number) => worksheet.write_number(row_index, column as u16, *number)?,
                };
            }
            row_index += 1;
        }

        if !sheet.footer.is_empty() {
            row_index += 1;
            for (position, row) in sheet.footer.iter().enumerate() {
                for (column, cell) in row.iter().enumerate() {
                    match (cell, position) {
                        (Cell::Text(text), 0) => {
                            worksheet.write_string_with_format(row_index, column as u16, text, &bold)?
                        }
                        (Cell::Text(text), _) => worksheet.write_string(row_index, column as u16, text)?,
                        (Cell::Number(number), _) => {
                            worksheet.write_number(row_index, column as u16, *number)?
                        }
                    };
                }
                row_index += 1;
            }
        }

        for (column, width) in sheet.column_widths.iter().enumerate() {
            worksheet.set_column_width(column as u16, *width)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}
