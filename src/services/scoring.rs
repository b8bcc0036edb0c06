use thiserror::Error;

use crate::db::models::AnswerMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScoreSummary {
    pub(crate) correct_items: i32,
    pub(crate) incorrect_items: i32,
    pub(crate) accuracy_percentage: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum AnswerMapError {
    #[error("'{0}' is not a question number")]
    InvalidQuestion(String),
    #[error("Question {question} is outside 1..={max}")]
    QuestionOutOfRange { question: u32, max: i32 },
    #[error("'{value}' is not a valid option for question {question}")]
    InvalidOption { question: u32, value: String },
}

/// Compares detected answers with the key.
///
/// Every detected entry counts: it is correct only when the key holds the same
/// letter for that question, so answers to questions missing from the key are
/// incorrect. Unanswered questions count neither way.
pub(crate) fn score_answers(detected: &AnswerMap, key: &AnswerMap, num_questions: i32) -> ScoreSummary {
    let mut correct_items = 0;
    let mut incorrect_items = 0;

    for (question, answer) in detected {
        if answer_matches(answer, key.get(question).map(String::as_str)) {
            correct_items += 1;
        } else {
            incorrect_items += 1;
        }
    }

    ScoreSummary {
        correct_items,
        incorrect_items,
        accuracy_percentage: accuracy_percentage(correct_items, num_questions),
    }
}

pub(crate) fn answer_matches(answer: &str, expected: Option<&str>) -> bool {
    expected == Some(answer)
}

pub(crate) fn accuracy_percentage(correct_items: i32, num_questions: i32) -> f64 {
    if num_questions <= 0 {
        return 0.0;
    }
    round2(f64::from(correct_items) / f64::from(num_questions) * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Checks a question -> letter mapping against the exam shape.
///
/// Question keys are canonicalised (`"01"` becomes `"1"`), letters upper-cased and
/// blank values dropped.
pub(crate) fn normalize_answers<I, K, V>(
    raw: I,
    num_questions: i32,
    letters: &[String],
) -> Result<AnswerMap, AnswerMapError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut answers = AnswerMap::new();

    for (question, value) in raw {
        let question = question.as_ref().trim();
        let number: u32 = question
            .parse()
            .map_err(|_| AnswerMapError::InvalidQuestion(question.to_string()))?;
        if number == 0 || i64::from(number) > i64::from(num_questions) {
            return Err(AnswerMapError::QuestionOutOfRange { question: number, max: num_questions });
        }

        let value = value.as_ref().trim().to_uppercase();
        if value.is_empty() {
            continue;
        }
        if !letters.iter().any(|letter| *letter == value) {
            return Err(AnswerMapError::InvalidOption { question: number, value });
        }

        answers.insert(number.to_string(), value);
    }

    Ok(answers)
}
