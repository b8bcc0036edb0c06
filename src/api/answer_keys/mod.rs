mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_answer_key).get(handlers::list_answer_keys))
        .route(
            "/:key_id",
            get(handlers::get_answer_key)
                .put(handlers::replace_answer_key)
                .patch(handlers::patch_answer_key)
                .delete(handlers::delete_answer_key),
        )
}
