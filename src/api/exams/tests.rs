use axum::body::to_bytes;
use axum::http::{header, Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::repositories;
use crate::test_support;

#[tokio::test]
async fn exam_crud_round_trip() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(json!({"subject_name": "  Geography ", "num_questions": 20, "num_options": 5})),
        ))
        .await
        .expect("create exam");
    let status = response.status();
    let created = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["subject_name"], "Geography");
    assert_eq!(created["option_letters"], json!(["A", "B", "C", "D", "E"]));
    let exam_id = created["id"].as_str().expect("exam id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/exams", None))
        .await
        .expect("list exams");
    let list = test_support::read_json(response).await;
    assert_eq!(list["total_count"], 1);
    assert_eq!(list["items"][0]["id"], exam_id);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &format!("/api/v1/exams/{exam_id}"),
            Some(json!({"num_options": 4})),
        ))
        .await
        .expect("patch exam");
    let status = response.status();
    let patched = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {patched}");
    assert_eq!(patched["num_options"], 4);
    assert_eq!(patched["num_questions"], 20);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/exams/{exam_id}"),
            None,
        ))
        .await
        .expect("delete exam");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/exams/{exam_id}"),
            None,
        ))
        .await
        .expect("get deleted exam");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_rejects_invalid_shape() {
    let ctx = test_support::setup_test_context().await;

    for payload in [
        json!({"subject_name": "Math", "num_questions": 10, "num_options": 27}),
        json!({"subject_name": "Math", "num_questions": -1, "num_options": 4}),
        json!({"subject_name": "   ", "num_questions": 10, "num_options": 4}),
    ] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::POST, "/api/v1/exams", Some(payload.clone())))
            .await
            .expect("create exam");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "payload: {payload}");
    }
}

#[tokio::test]
async fn question_count_change_rescores_sheets() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "History", 3, 4).await;
    test_support::insert_answer_key(ctx.state.db(), &exam.id, &[("1", "A"), ("2", "B"), ("3", "C")])
        .await;
    let sheet = test_support::insert_sheet(ctx.state.db(), &exam.id, "A1B2C").await;
    test_support::record_sheet_answers(&ctx.state, &exam, &sheet.id, &[("1", "A"), ("2", "B"), ("3", "D")])
        .await;

    let stored = repositories::answer_sheets::find_by_id(ctx.state.db(), &sheet.id)
        .await
        .expect("fetch sheet")
        .expect("sheet exists");
    assert_eq!(stored.accuracy_percentage, 66.67);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &format!("/api/v1/exams/{}", exam.id),
            Some(json!({"num_questions": 4})),
        ))
        .await
        .expect("patch exam");
    assert_eq!(response.status(), StatusCode::OK);

    let stored = repositories::answer_sheets::find_by_id(ctx.state.db(), &sheet.id)
        .await
        .expect("fetch sheet")
        .expect("sheet exists");
    assert_eq!(stored.correct_items, 2);
    assert_eq!(stored.incorrect_items, 1);
    assert_eq!(stored.accuracy_percentage, 50.0);
}

#[tokio::test]
async fn shrinking_below_the_key_is_rejected() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "History", 3, 4).await;
    test_support::insert_answer_key(ctx.state.db(), &exam.id, &[("1", "A"), ("3", "D")]).await;

    for payload in [json!({"num_questions": 2}), json!({"num_options": 3})] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PATCH,
                &format!("/api/v1/exams/{}", exam.id),
                Some(payload.clone()),
            ))
            .await
            .expect("patch exam");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "payload: {payload}");
    }

    let unchanged = repositories::exams::find_by_id(ctx.state.db(), &exam.id)
        .await
        .expect("fetch exam")
        .expect("exam exists");
    assert_eq!(unchanged.num_questions, 3);
    assert_eq!(unchanged.num_options, 4);
}

#[tokio::test]
async fn generated_sheets_are_registered_and_rendered() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "Physics", 10, 4).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{}/answer-sheets-pdf", exam.id),
            Some(json!({"quantity": 3})),
        ))
        .await
        .expect("generate sheets");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("application/pdf")
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).and_then(|v| v.to_str().ok()),
        Some("attachment; filename=\"answer_sheets_Physics.pdf\"")
    );
    let codes: Vec<String> = response
        .headers()
        .get("x-sheet-codes")
        .and_then(|v| v.to_str().ok())
        .expect("codes header")
        .split(',')
        .map(str::to_string)
        .collect();
    assert_eq!(codes.len(), 3);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert!(bytes.starts_with(b"%PDF"));

    for code in &codes {
        let sheet = repositories::answer_sheets::find_by_code(ctx.state.db(), code)
            .await
            .expect("fetch sheet")
            .expect("sheet registered");
        assert_eq!(sheet.exam_id, exam.id);
        assert!(sheet.student_answers.is_none());
    }
}

#[tokio::test]
async fn sheet_quantity_is_bounded() {
    let ctx = test_support::setup_test_context().await;
    let exam = test_support::insert_exam(ctx.state.db(), "Physics", 10, 4).await;
    let too_many = ctx.state.settings().sheets().max_sheets_per_batch + 1;

    for quantity in [0, too_many] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/exams/{}/answer-sheets-pdf", exam.id),
                Some(json!({ "quantity": quantity })),
            ))
            .await
            .expect("generate sheets");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "quantity: {quantity}");
    }

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/missing/answer-sheets-pdf",
            None,
        ))
        .await
        .expect("generate sheets");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
