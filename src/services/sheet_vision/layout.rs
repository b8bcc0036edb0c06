use super::bubbles::BubbleCandidate;

/// Bubbles of one question, indexed by option (A, B, ...).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionRow {
    pub(crate) question: usize,
    pub(crate) options: Vec<Option<BubbleCandidate>>,
}

/// Groups detected bubbles into question rows.
pub(crate) trait LayoutStrategy: Send + Sync {
    fn rows(
        &self,
        candidates: &[BubbleCandidate],
        frame: (u32, u32),
        num_questions: usize,
        num_options: usize,
    ) -> Vec<QuestionRow>;
}

/// Assumes every bubble on the page belongs to the grid, read top to bottom.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RowMajorLayout;

impl LayoutStrategy for RowMajorLayout {
    fn rows(
        &self,
        candidates: &[BubbleCandidate],
        _frame: (u32, u32),
        num_questions: usize,
        num_options: usize,
    ) -> Vec<QuestionRow> {
        if num_options == 0 {
            return Vec::new();
        }

        let mut sorted = candidates.to_vec();
        sorted.sort_by_key(|candidate| (candidate.y, candidate.x));
        sorted.truncate(num_questions.saturating_mul(num_options));

        sorted
            .chunks(num_options)
            .enumerate()
            .map(|(index, chunk)| {
                let mut group = chunk.to_vec();
                group.sort_by_key(|candidate| candidate.x);
                QuestionRow { question: index + 1, options: group.into_iter().map(Some).collect() }
            })
            .collect()
    }
}

/// Fixed slot positions as fractions of the page width and height.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TemplateLayout {
    slots: Vec<Vec<(f64, f64)>>,
    /// Match radius as a fraction of the page width.
    tolerance: f64,
}

impl TemplateLayout {
    pub(crate) fn new(slots: Vec<Vec<(f64, f64)>>, tolerance: f64) -> Self {
        Self { slots, tolerance }
    }

    pub(crate) fn question_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slots(&self) -> &[Vec<(f64, f64)>] {
        &self.slots
    }
}

impl LayoutStrategy for TemplateLayout {
    fn rows(
        &self,
        candidates: &[BubbleCandidate],
        frame: (u32, u32),
        num_questions: usize,
        num_options: usize,
    ) -> Vec<QuestionRow> {
        let (width, height) = (f64::from(frame.0), f64::from(frame.1));
        let max_distance = self.tolerance * width;

        self.slots
            .iter()
            .take(num_questions)
            .enumerate()
            .map(|(index, row)| {
                let options = row
                    .iter()
                    .take(num_options)
                    .map(|&(fx, fy)| {
                        nearest(candidates, fx * width, fy * height)
                            .filter(|(_, distance)| *distance <= max_distance)
                            .map(|(candidate, _)| candidate)
                    })
                    .collect();
                QuestionRow { question: index + 1, options }
            })
            .collect()
    }
}

fn nearest(candidates: &[BubbleCandidate], x: f64, y: f64) -> Option<(BubbleCandidate, f64)> {
    candidates
        .iter()
        .map(|candidate| {
            let dx = f64::from(candidate.x) - x;
            let dy = f64::from(candidate.y) - y;
            (*candidate, (dx * dx + dy * dy).sqrt())
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
