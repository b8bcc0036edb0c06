mod handlers;
mod sheets_pdf;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_exam).get(handlers::list_exams))
        .route(
            "/:exam_id",
            get(handlers::get_exam)
                .put(handlers::replace_exam)
                .patch(handlers::update_exam)
                .delete(handlers::delete_exam),
        )
        .route("/:exam_id/answer-sheets-pdf", post(sheets_pdf::generate_answer_sheets))
}

#[cfg(test)]
mod tests;
