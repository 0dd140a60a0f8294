mod common;

use serde_json::json;

use common::{client, empty, json_response, timeout, ScriptedTransport, GATEWAY};
use exam_portal_client::api::error::FORBIDDEN_MESSAGE;
use exam_portal_client::api::models::AuthTokens;
use exam_portal_client::api::services::{ChatApi, CourseService, ExamService, FeedbackService};
use exam_portal_client::api::transport::{Body, FormPart, Method};
use exam_portal_client::api::{ApiError, ApiRequest};

#[tokio::test]
async fn gateway_server_error_retries_once_on_direct_base() {
    let t = ScriptedTransport::new(|req| {
        if req.url.starts_with(GATEWAY) {
            json_response(500, json!({ "message": "upstream down" }))
        } else {
            json_response(200, json!({ "data": [{ "id": 1, "title": "Toán 12" }] }))
        }
    });
    let (api, _) = client(t.clone(), None);

    let courses = CourseService::new(api).list().await.unwrap();

    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0].title, "Toán 12");
    assert_eq!(t.urls(), vec!["http://gateway.test/api/Courses", "http://courses.test/api/Courses"]);
}

#[tokio::test]
async fn gateway_timeout_falls_back() {
    let t = ScriptedTransport::new(|req| {
        if req.url.starts_with(GATEWAY) { timeout(req) } else { json_response(200, json!([{ "id": 9, "title": "Giữa kỳ" }])) }
    });
    let (api, _) = client(t.clone(), None);

    let exams = ExamService::new(api).list().await.unwrap();

    assert_eq!(exams[0].id, 9);
    assert_eq!(t.urls(), vec!["http://gateway.test/api/Exams", "http://exams.test/api/Exams"]);
}

#[tokio::test]
async fn route_miss_404_retries_but_json_404_does_not() {
    let t = ScriptedTransport::new(|req| match (req.url.starts_with(GATEWAY), req.url.contains("/Courses/7")) {
        (true, true) => empty(404),
        (false, true) => json_response(200, json!({ "id": 7, "title": "Lý" })),
        _ => json_response(404, json!({ "message": "Không tìm thấy khóa học" })),
    });
    let (api, _) = client(t.clone(), None);
    let courses = CourseService::new(api);

    assert_eq!(courses.get(7).await.unwrap().title, "Lý");
    assert_eq!(t.count("/Courses/7"), 2);

    let err = courses.get(8).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.user_message(), "Không tìm thấy khóa học");
    assert_eq!(t.count("/Courses/8"), 1);
}

#[tokio::test]
async fn fallback_failure_is_reported_after_one_retry() {
    let t = ScriptedTransport::new(|req| timeout(req));
    let (api, _) = client(t.clone(), None);

    let err = api.get("/Materials/lesson/3").await.unwrap_err();

    assert!(matches!(err, ApiError::Transport(_)));
    assert_eq!(t.urls(), vec!["http://gateway.test/api/Materials/lesson/3", "http://materials.test/api/Materials/lesson/3"]);
}

#[tokio::test]
async fn chat_requests_fall_back_to_the_chat_service() {
    let t = ScriptedTransport::new(|req| {
        if req.url.starts_with(GATEWAY) { json_response(502, json!({})) } else { json_response(200, json!([{ "id": 4, "type": "Support" }])) }
    });
    let (api, _) = client(t.clone(), Some(("a", None)));

    let rooms = ChatApi::new(api).rooms().await.unwrap();

    assert_eq!(rooms.len(), 1);
    assert_eq!(t.urls()[1], "http://chat.test/api/Chat/rooms");
}

fn refreshing_backend(refresh_ok: bool) -> std::sync::Arc<ScriptedTransport> {
    ScriptedTransport::new(move |req| {
        if req.url.ends_with("/Auth/refresh-token") {
            return if refresh_ok {
                json_response(200, json!({ "data": { "accessToken": "fresh", "refreshToken": "r2" } }))
            } else {
                json_response(400, json!({ "message": "invalid refresh token" }))
            };
        }
        match req.header("Authorization") {
            Some("Bearer fresh") => json_response(200, json!([{ "id": 1, "title": "Cuối kỳ" }])),
            _ => empty(401),
        }
    })
}

#[tokio::test]
async fn unauthorized_refreshes_once_and_replays_once() {
    let t = refreshing_backend(true);
    let (api, store) = client(t.clone(), Some(("stale", Some("r1"))));

    let exams = ExamService::new(api.clone()).list().await.unwrap();

    assert_eq!(exams[0].title, "Cuối kỳ");
    assert_eq!(t.count("/Auth/refresh-token"), 1);
    assert_eq!(t.count("/Exams"), 2);
    assert_eq!(
        store.tokens().unwrap(),
        Some(AuthTokens { access_token: "fresh".into(), refresh_token: Some("r2".into()) })
    );
    assert_eq!(api.access_token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn failed_refresh_requires_login_without_looping() {
    let t = refreshing_backend(false);
    let (api, store) = client(t.clone(), Some(("stale", Some("r1"))));

    let err = ExamService::new(api.clone()).list().await.unwrap_err();

    assert!(matches!(err, ApiError::AuthenticationRequired));
    assert_eq!(t.count("/Auth/refresh-token"), 1);
    assert_eq!(t.count("/Exams"), 1);
    assert_eq!(store.tokens().unwrap(), None);
    assert!(api.access_token().is_none());
}

#[tokio::test]
async fn unauthorized_without_refresh_token_skips_refresh() {
    let t = refreshing_backend(true);
    let (api, _) = client(t.clone(), Some(("stale", None)));

    let err = api.get("/Exams").await.unwrap_err();

    assert!(matches!(err, ApiError::AuthenticationRequired));
    assert_eq!(t.count("/Auth/refresh-token"), 0);
}

#[tokio::test]
async fn replay_rejected_again_stops_after_one_refresh() {
    let t = ScriptedTransport::new(|req| {
        if req.url.ends_with("/Auth/refresh-token") {
            json_response(200, json!({ "accessToken": "fresh" }))
        } else {
            empty(401)
        }
    });
    let (api, store) = client(t.clone(), Some(("stale", Some("r1"))));

    let err = api.get("/Exams").await.unwrap_err();

    assert!(matches!(err, ApiError::AuthenticationRequired));
    assert_eq!(t.count("/Auth/refresh-token"), 1);
    assert_eq!(t.count("/Exams"), 2);
    assert_eq!(store.tokens().unwrap(), None);
}

#[tokio::test]
async fn forbidden_maps_to_fixed_message() {
    let t = ScriptedTransport::new(|_| json_response(403, json!({ "message": "nope" })));
    let (api, _) = client(t.clone(), Some(("a", None)));

    let err = api.delete("/Exams/1").await.unwrap_err();

    assert!(matches!(err, ApiError::Forbidden));
    assert_eq!(err.user_message(), FORBIDDEN_MESSAGE);
    assert_eq!(t.count("/Exams/1"), 1);
}

#[tokio::test]
async fn bearer_and_content_type_headers() {
    let t = ScriptedTransport::new(|_| json_response(200, json!({ "success": true })));
    let (api, _) = client(t.clone(), Some(("tok", None)));

    api.post("/Feedback", json!({ "content": "hay" })).await.unwrap();
    let upload = ApiRequest::new(Method::Post, "/Materials/upload")
        .form(vec![FormPart::Text { name: "title".into(), value: "Slide".into() }])
        .header("Content-Type", "application/json");
    api.execute(upload).await.unwrap();

    let sent = t.requests();
    assert_eq!(sent[0].header("Authorization"), Some("Bearer tok"));
    assert_eq!(sent[0].header("Content-Type"), Some("application/json"));
    assert_eq!(sent[1].header("Content-Type"), None);
    assert_eq!(sent[1].header("Authorization"), Some("Bearer tok"));
}

#[tokio::test]
async fn plain_text_success_is_wrapped() {
    let t = ScriptedTransport::new(|_| {
        Ok(exam_portal_client::api::transport::HttpResponse {
            status: 200,
            content_type: Some("text/plain".into()),
            body: "Đã gửi".into(),
        })
    });
    let (api, _) = client(t, None);

    let value = api.post("/Feedback", json!({})).await.unwrap();

    assert_eq!(value, json!({ "success": true, "data": "Đã gửi" }));
}

#[tokio::test]
async fn feedback_submit_posts_content_and_rating() {
    let t = ScriptedTransport::new(|_| json_response(200, json!({ "success": true })));
    let (api, _) = client(t.clone(), Some(("tok", None)));

    FeedbackService::new(api).submit("Bài giảng rất hay", Some(5)).await.unwrap();

    let sent = t.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, Method::Post);
    assert_eq!(sent[0].url, "http://gateway.test/api/Feedback");
    let Body::Json(body) = &sent[0].body else { panic!("expected a JSON body") };
    assert_eq!(body, &json!({ "content": "Bài giảng rất hay", "rating": 5 }));
}
