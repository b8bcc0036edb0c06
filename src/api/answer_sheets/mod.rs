mod crud;
mod export;
mod upload;

use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Router};

use crate::core::state::AppState;

/// Multipart overhead allowed on top of the configured file size.
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

pub(crate) fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(crud::list_answer_sheets).post(crud::create_answer_sheet))
        .route("/export", get(export::export_results))
        .route(
            "/upload",
            post(upload::upload_answer_sheet)
                .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_SLACK_BYTES)),
        )
        .route(
            "/:sheet_id",
            get(crud::get_answer_sheet)
                .put(crud::update_answer_sheet)
                .patch(crud::update_answer_sheet)
                .delete(crud::delete_answer_sheet),
        )
}
