//! Thin typed wrappers, one per backend resource.
//!
//! Each method maps one user action to one request, normalizes the response
//! into a DTO and logs failures before handing them back to the caller.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::client::{ApiClient, ApiRequest};
use crate::api::error::ApiError;
use crate::api::models::{
    decode, decode_list, AuthTokens, ChatMessage, ChatRoom, ContactInfo, Course, Enrollment, Exam,
    ExamDraft, Feedback, Lesson, Material, PaymentLink, PaymentRequest, PaymentStatus, Question,
    QuestionDraft, Report, RoomType, SendMessagePayload, UserProfile,
};

fn logged<T>(context: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if let Err(e) = &result {
        log::error!("{context}: {e}");
    }
    result
}

#[derive(Clone)]
pub struct AuthService {
    api: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Logs in, persists the token pair, then fetches and caches the profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let body = json!({ "email": email, "password": password });
        let resp = logged("login", self.api.post("/Auth/login", body).await)?;
        let tokens = AuthTokens::from_response(resp.clone())
            .ok_or_else(|| ApiError::Decode("login response carried no access token".into()))?;
        self.api.set_tokens(tokens)?;

        let embedded = crate::utils::unwrap_data(resp);
        let from_login = embedded
            .get("user")
            .or_else(|| embedded.get("User"))
            .cloned()
            .and_then(|u| serde_json::from_value::<UserProfile>(u).ok())
            .filter(|p| !p.id.is_empty());
        match from_login {
            Some(profile) => {
                self.api.store().save_user_profile(&profile)?;
                Ok(profile)
            }
            None => self.current_profile().await,
        }
    }

    /// Best-effort server-side logout; the local session is always cleared.
    pub async fn logout(&self) {
        if self.api.access_token().is_some() {
            if let Err(e) = self.api.post("/Auth/logout", json!({})).await {
                log::warn!("Server-side logout failed: {e}");
            }
        }
        self.api.clear_session();
    }

    pub async fn refresh(&self) -> Result<AuthTokens, ApiError> {
        logged("refresh", self.api.refresh_session().await)
    }

    pub async fn current_profile(&self) -> Result<UserProfile, ApiError> {
        let profile: UserProfile = logged("profile", self.api.get_as("/Users/profile").await)?;
        self.api.store().save_user_profile(&profile)?;
        Ok(profile)
    }

    pub fn cached_profile(&self) -> Option<UserProfile> {
        self.api.store().user_profile().unwrap_or_else(|e| {
            log::warn!("Cached profile unreadable: {e}");
            None
        })
    }
}

#[derive(Clone)]
pub struct ChatApi {
    api: Arc<ApiClient>,
}

impl ChatApi {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub async fn rooms(&self) -> Result<Vec<ChatRoom>, ApiError> {
        let resp = logged("chat rooms", self.api.get("/Chat/rooms").await)?;
        Ok(decode_list(resp))
    }

    pub async fn create_room(&self, room_type: RoomType, participant_ids: &[String]) -> Result<ChatRoom, ApiError> {
        let body = json!({ "type": room_type, "participantIds": participant_ids });
        decode(logged("create room", self.api.post("/Chat/rooms", body).await)?)
    }

    pub async fn history(&self, room_id: i64, page: u32, page_size: u32) -> Result<Vec<ChatMessage>, ApiError> {
        let path = format!("/Chat/rooms/{room_id}/messages?page={page}&pageSize={page_size}");
        let resp = logged("chat history", self.api.get(&path).await)?;
        Ok(decode_list::<ChatMessage>(resp)
            .into_iter()
            .map(|mut m| {
                if m.room_id == 0 {
                    m.room_id = room_id;
                }
                m
            })
            .collect())
    }

    pub async fn send(&self, room_id: i64, payload: &SendMessagePayload) -> Result<ChatMessage, ApiError> {
        let mut body = serde_json::to_value(payload).map_err(|e| ApiError::Decode(e.to_string()))?;
        body["roomId"] = json!(room_id);
        let path = format!("/Chat/rooms/{room_id}/messages");
        let mut message: ChatMessage = decode(logged("send message", self.api.post(&path, body).await)?)?;
        if message.room_id == 0 {
            message.room_id = room_id;
        }
        Ok(message)
    }
}

#[derive(Clone)]
pub struct ExamService {
    api: Arc<ApiClient>,
}

impl ExamService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Exam>, ApiError> {
        Ok(decode_list(logged("list exams", self.api.get("/Exams").await)?))
    }

    pub async fn get(&self, id: i64) -> Result<Exam, ApiError> {
        logged("get exam", self.api.get_as(&format!("/Exams/{id}")).await)
    }

    pub async fn create(&self, draft: &ExamDraft) -> Result<Exam, ApiError> {
        let body = to_body(draft)?;
        decode(logged("create exam", self.api.post("/Exams", body).await)?)
    }

    pub async fn update(&self, id: i64, draft: &ExamDraft) -> Result<Value, ApiError> {
        logged("update exam", self.api.put(&format!("/Exams/{id}"), to_body(draft)?).await)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        logged("delete exam", self.api.delete(&format!("/Exams/{id}")).await).map(|_| ())
    }

    pub async fn statistics(&self) -> Result<Value, ApiError> {
        logged("statistics", self.api.get("/Statistics/overview").await).map(crate::utils::unwrap_data)
    }
}

#[derive(Clone)]
pub struct QuestionBankService {
    api: Arc<ApiClient>,
}

impl QuestionBankService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self, subject: Option<&str>) -> Result<Vec<Question>, ApiError> {
        let path = match subject {
            Some(s) => format!("/question-bank?subject={}", url_encode(s)),
            None => "/question-bank".to_string(),
        };
        Ok(decode_list(logged("list questions", self.api.get(&path).await)?))
    }

    pub async fn create(&self, draft: &QuestionDraft) -> Result<Question, ApiError> {
        decode(logged("create question", self.api.post("/question-bank", to_body(draft)?).await)?)
    }

    pub async fn update(&self, id: i64, draft: &QuestionDraft) -> Result<Value, ApiError> {
        logged("update question", self.api.put(&format!("/question-bank/{id}"), to_body(draft)?).await)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        logged("delete question", self.api.delete(&format!("/question-bank/{id}")).await).map(|_| ())
    }
}

#[derive(Clone)]
pub struct CourseService {
    api: Arc<ApiClient>,
}

impl CourseService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Course>, ApiError> {
        Ok(decode_list(logged("list courses", self.api.get("/Courses").await)?))
    }

    pub async fn get(&self, id: i64) -> Result<Course, ApiError> {
        logged("get course", self.api.get_as(&format!("/Courses/{id}")).await)
    }

    pub async fn lessons(&self, course_id: i64) -> Result<Vec<Lesson>, ApiError> {
        let resp = logged("list lessons", self.api.get(&format!("/Courses/{course_id}/lessons")).await)?;
        let mut lessons: Vec<Lesson> = decode_list(resp);
        lessons.sort_by_key(|l| (l.order_index, l.id));
        Ok(lessons)
    }

    pub async fn enroll(&self, course_id: i64, contact: &ContactInfo) -> Result<Value, ApiError> {
        let path = format!("/Courses/{course_id}/enroll");
        logged("enroll", self.api.post(&path, to_body(contact)?).await)
    }

    pub async fn enrollments(&self, course_id: Option<i64>) -> Result<Vec<Enrollment>, ApiError> {
        let path = match course_id {
            Some(id) => format!("/Courses/{id}/enrollments"),
            None => "/Courses/enrollments".to_string(),
        };
        Ok(decode_list(logged("list enrollments", self.api.get(&path).await)?))
    }
}

#[derive(Clone)]
pub struct MaterialService {
    api: Arc<ApiClient>,
}

impl MaterialService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn by_lesson(&self, lesson_id: i64) -> Result<Vec<Material>, ApiError> {
        let resp = logged("list materials", self.api.get(&format!("/Materials/lesson/{lesson_id}")).await)?;
        Ok(decode_list(resp))
    }
}

#[derive(Clone)]
pub struct FeedbackService {
    api: Arc<ApiClient>,
}

impl FeedbackService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Feedback>, ApiError> {
        Ok(decode_list(logged("list feedback", self.api.get("/Feedback").await)?))
    }

    pub async fn submit(&self, content: &str, rating: Option<u8>) -> Result<Value, ApiError> {
        let body = json!({ "content": content, "rating": rating });
        logged("submit feedback", self.api.post("/Feedback", body).await)
    }

    pub async fn update_status(&self, id: i64, status: &str) -> Result<Value, ApiError> {
        let body = json!({ "status": status });
        logged("update feedback", self.api.put(&format!("/Feedback/{id}/status"), body).await)
    }
}

#[derive(Clone)]
pub struct ReportService {
    api: Arc<ApiClient>,
}

impl ReportService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Report>, ApiError> {
        Ok(decode_list(logged("list reports", self.api.get("/Reports").await)?))
    }

    pub async fn resolve(&self, id: i64, note: &str) -> Result<Value, ApiError> {
        let body = json!({ "note": note });
        logged("resolve report", self.api.put(&format!("/Reports/{id}/resolve"), body).await)
    }
}

#[derive(Clone)]
pub struct PaymentService {
    api: Arc<ApiClient>,
}

impl PaymentService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn create_link(&self, req: &PaymentRequest) -> Result<PaymentLink, ApiError> {
        let request = ApiRequest::post("/Payments/create-link", to_body(req)?);
        let link: PaymentLink = decode(logged("create payment link", self.api.execute(request).await)?)?;
        if link.checkout_url.is_empty() {
            return Err(ApiError::Decode("payment link response carried no checkout URL".into()));
        }
        Ok(link)
    }

    pub async fn status(&self, order_code: i64) -> Result<PaymentStatus, ApiError> {
        logged("payment status", self.api.get_as(&format!("/Payments/{order_code}")).await)
    }

    pub async fn cancel(&self, order_code: i64) -> Result<Value, ApiError> {
        logged("cancel payment", self.api.post(&format!("/Payments/{order_code}/cancel"), json!({})).await)
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
