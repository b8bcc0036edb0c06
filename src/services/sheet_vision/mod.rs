//! Classic answer-sheet reading: thresholding, circle detection and fill scoring.

pub(crate) mod bubbles;
pub(crate) mod layout;
pub(crate) mod ocr;
pub(crate) mod quality;

use image::GrayImage;

use crate::db::models::{option_letters, AnswerMap};

use self::bubbles::{binarize, find_bubble_candidates, fill_score};
use self::layout::LayoutStrategy;

/// Numeric thresholds of the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DetectionParams {
    /// Pixels at or below this intensity become foreground.
    pub(crate) threshold: u8,
    pub(crate) min_circularity: f64,
    pub(crate) min_area: f64,
    pub(crate) max_area: f64,
    /// Half-size of the square window used to measure fill.
    pub(crate) fill_window: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self { threshold: 150, min_circularity: 0.7, min_area: 50.0, max_area: 500.0, fill_window: 10 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BubbleReading {
    pub(crate) answers: AnswerMap,
    pub(crate) candidates: usize,
}

/// Reads the marked option of every question from a grayscale sheet image.
pub(crate) fn detect_answers(
    gray: &GrayImage,
    num_questions: i32,
    num_options: i32,
    layout: &dyn LayoutStrategy,
    params: &DetectionParams,
) -> BubbleReading {
    let letters = option_letters(num_options);
    let binary = binarize(gray, params.threshold);
    let candidates = find_bubble_candidates(&binary, params);

    let rows = layout.rows(
        &candidates,
        binary.dimensions(),
        usize::try_from(num_questions).unwrap_or(0),
        letters.len(),
    );

    let mut answers = AnswerMap::new();
    for row in rows {
        let mut best_fill = 0;
        let mut marked = None;

        for (index, slot) in row.options.iter().enumerate() {
            let Some(candidate) = slot else {
                continue;
            };
            let fill = fill_score(&binary, candidate, params.fill_window);
            if fill > best_fill {
                best_fill = fill;
                marked = letters.get(index);
            }
        }

        if let Some(letter) = marked {
            answers.insert(row.question.to_string(), letter.clone());
        }
    }

    tracing::debug!(
        candidates = candidates.len(),
        answered = answers.len(),
        "Classic bubble detection finished"
    );

    BubbleReading { answers, candidates: candidates.len() }
}
