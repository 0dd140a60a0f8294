//! View models mirrored from backend JSON.
//!
//! The services answer in camelCase or PascalCase depending on who wrote the
//! endpoint, so every DTO accepts both casings through serde aliases and is
//! always serialized back out as camelCase.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::utils::{de_id, de_null_default, de_opt_id, de_string_id};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    #[serde(alias = "AccessToken", alias = "token", alias = "Token", deserialize_with = "de_null_default")]
    pub access_token: String,
    #[serde(default, alias = "RefreshToken")]
    pub refresh_token: Option<String>,
}

impl AuthTokens {
    /// Reads a token pair out of a login/refresh response, unwrapping envelopes.
    pub fn from_response(value: Value) -> Option<Self> {
        let inner = crate::utils::unwrap_data(value);
        let tokens: AuthTokens = serde_json::from_value(inner).ok()?;
        if tokens.access_token.is_empty() {
            return None;
        }
        Some(tokens)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    #[serde(alias = "Id", alias = "userId", alias = "UserId", deserialize_with = "de_string_id")]
    pub id: String,
    #[serde(alias = "FullName", deserialize_with = "de_null_default")]
    pub full_name: String,
    #[serde(alias = "Email", deserialize_with = "de_null_default")]
    pub email: String,
    #[serde(alias = "PhoneNumber", deserialize_with = "de_null_default")]
    pub phone_number: String,
    #[serde(alias = "Address", deserialize_with = "de_null_default")]
    pub address: String,
    #[serde(alias = "AvatarUrl")]
    pub avatar_url: Option<String>,
    #[serde(alias = "Role", deserialize_with = "de_null_default")]
    pub role: String,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }

    pub fn is_teacher(&self) -> bool {
        self.role.eq_ignore_ascii_case("teacher")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    #[default]
    Private,
    Support,
    Group,
}

impl<'de> Deserialize<'de> for RoomType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match &raw {
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "support" => RoomType::Support,
                "group" => RoomType::Group,
                _ => RoomType::Private,
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => RoomType::Support,
                Some(2) => RoomType::Group,
                _ => RoomType::Private,
            },
            _ => RoomType::Private,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomParticipant {
    #[serde(alias = "UserId", deserialize_with = "de_string_id")]
    pub user_id: String,
    #[serde(alias = "FullName", deserialize_with = "de_null_default")]
    pub full_name: String,
    #[serde(alias = "Role", deserialize_with = "de_null_default")]
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRoom {
    #[serde(alias = "Id", deserialize_with = "de_id")]
    pub id: i64,
    #[serde(alias = "Name")]
    pub name: Option<String>,
    #[serde(rename = "type", alias = "Type", alias = "roomType", alias = "RoomType")]
    pub room_type: RoomType,
    #[serde(alias = "Participants", deserialize_with = "de_null_default")]
    pub participants: Vec<RoomParticipant>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatMessage {
    #[serde(alias = "Id", deserialize_with = "de_string_id")]
    pub id: String,
    #[serde(alias = "RoomId", deserialize_with = "de_id")]
    pub room_id: i64,
    #[serde(alias = "SenderId", deserialize_with = "de_string_id")]
    pub sender_id: String,
    #[serde(alias = "SenderName")]
    pub sender_name: Option<String>,
    #[serde(alias = "Content", deserialize_with = "de_null_default")]
    pub content: String,
    #[serde(alias = "MessageType")]
    pub message_type: Option<String>,
    #[serde(alias = "SentAt", deserialize_with = "de_opt_datetime")]
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub content: String,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
}

impl SendMessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), message_type: "text".into(), attachment_url: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Exam {
    #[serde(alias = "Id", deserialize_with = "de_id")]
    pub id: i64,
    #[serde(alias = "Title", deserialize_with = "de_null_default")]
    pub title: String,
    #[serde(alias = "Description")]
    pub description: Option<String>,
    #[serde(alias = "DurationMinutes", deserialize_with = "de_null_default")]
    pub duration_minutes: u32,
    #[serde(alias = "TotalQuestions", deserialize_with = "de_null_default")]
    pub total_questions: u32,
    #[serde(alias = "Status")]
    pub status: Option<String>,
    #[serde(alias = "CourseId", deserialize_with = "de_opt_id")]
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Question {
    #[serde(alias = "Id", deserialize_with = "de_id")]
    pub id: i64,
    #[serde(alias = "ExamId", deserialize_with = "de_opt_id")]
    pub exam_id: Option<i64>,
    #[serde(alias = "Content", deserialize_with = "de_null_default")]
    pub content: String,
    #[serde(alias = "Options", deserialize_with = "de_null_default")]
    pub options: Vec<String>,
    #[serde(alias = "CorrectAnswer")]
    pub correct_answer: Option<usize>,
    #[serde(alias = "Difficulty")]
    pub difficulty: Option<String>,
    #[serde(alias = "Subject")]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Course {
    #[serde(alias = "Id", deserialize_with = "de_id")]
    pub id: i64,
    #[serde(alias = "Title", deserialize_with = "de_null_default")]
    pub title: String,
    #[serde(alias = "Description")]
    pub description: Option<String>,
    #[serde(alias = "Price", deserialize_with = "de_null_default")]
    pub price: f64,
    #[serde(alias = "IsFree", deserialize_with = "de_null_default")]
    pub is_free: bool,
    #[serde(alias = "ThumbnailUrl")]
    pub thumbnail_url: Option<String>,
    #[serde(alias = "TeacherName")]
    pub teacher_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lesson {
    #[serde(alias = "Id", deserialize_with = "de_id")]
    pub id: i64,
    #[serde(alias = "CourseId", deserialize_with = "de_id")]
    pub course_id: i64,
    #[serde(alias = "Title", deserialize_with = "de_null_default")]
    pub title: String,
    #[serde(alias = "VideoUrl")]
    pub video_url: Option<String>,
    #[serde(alias = "OrderIndex", deserialize_with = "de_null_default")]
    pub order_index: i32,
    #[serde(alias = "DurationMinutes")]
    pub duration_minutes: Option<u32>,
    #[serde(alias = "Content")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Material {
    #[serde(alias = "Id", deserialize_with = "de_id")]
    pub id: i64,
    #[serde(alias = "LessonId", deserialize_with = "de_id")]
    pub lesson_id: i64,
    #[serde(alias = "Title", deserialize_with = "de_null_default")]
    pub title: String,
    #[serde(alias = "FileUrl", deserialize_with = "de_null_default")]
    pub file_url: String,
    #[serde(alias = "FileType")]
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Feedback {
    #[serde(alias = "Id", deserialize_with = "de_id")]
    pub id: i64,
    #[serde(alias = "UserName")]
    pub user_name: Option<String>,
    #[serde(alias = "Content", deserialize_with = "de_null_default")]
    pub content: String,
    #[serde(alias = "Rating")]
    pub rating: Option<u8>,
    #[serde(alias = "Status")]
    pub status: Option<String>,
    #[serde(alias = "CreatedAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Report {
    #[serde(alias = "Id", deserialize_with = "de_id")]
    pub id: i64,
    #[serde(alias = "ReporterName")]
    pub reporter_name: Option<String>,
    #[serde(alias = "TargetType")]
    pub target_type: Option<String>,
    #[serde(alias = "TargetId", deserialize_with = "de_opt_id")]
    pub target_id: Option<i64>,
    #[serde(alias = "Reason", deserialize_with = "de_null_default")]
    pub reason: String,
    #[serde(alias = "Status")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Enrollment {
    #[serde(alias = "Id", deserialize_with = "de_id")]
    pub id: i64,
    #[serde(alias = "UserName")]
    pub user_name: Option<String>,
    #[serde(alias = "CourseId", deserialize_with = "de_id")]
    pub course_id: i64,
    #[serde(alias = "CourseTitle")]
    pub course_title: Option<String>,
    #[serde(alias = "EnrolledAt")]
    pub enrolled_at: Option<String>,
    #[serde(alias = "Status")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentLink {
    #[serde(alias = "CheckoutUrl", deserialize_with = "de_null_default")]
    pub checkout_url: String,
    #[serde(alias = "OrderCode", deserialize_with = "de_id")]
    pub order_code: i64,
    #[serde(alias = "PaymentLinkId")]
    pub payment_link_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentStatus {
    #[serde(alias = "OrderCode", deserialize_with = "de_id")]
    pub order_code: i64,
    #[serde(alias = "Status", deserialize_with = "de_null_default")]
    pub status: String,
    #[serde(alias = "Amount", deserialize_with = "de_null_default")]
    pub amount: f64,
}

impl PaymentStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self.status.to_ascii_uppercase().as_str(), "PAID" | "SUCCESS" | "COMPLETED")
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.eq_ignore_ascii_case("CANCELLED")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDraft {
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: u32,
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub exam_id: Option<i64>,
    pub content: String,
    pub options: Vec<String>,
    pub correct_answer: Option<usize>,
    pub difficulty: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub course_id: i64,
    pub amount: f64,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
    #[serde(flatten)]
    pub buyer: ContactInfo,
}

/// Decodes one DTO from an already unwrapped payload.
pub fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, crate::api::error::ApiError> {
    serde_json::from_value(crate::utils::unwrap_data(value))
        .map_err(|e| crate::api::error::ApiError::Decode(e.to_string()))
}

/// Decodes a list of DTOs, skipping entries that do not match the expected shape.
pub fn decode_list<T: serde::de::DeserializeOwned>(value: Value) -> Vec<T> {
    crate::utils::unwrap_list(value)
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(v) => Some(v),
            Err(e) => {
                log::debug!("Skipping malformed list entry: {e}");
                None
            }
        })
        .collect()
}

/// Timestamps arrive as RFC 3339, as zone-less ISO strings (treated as UTC),
/// or as epoch milliseconds.
fn de_opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_accepts_pascal_case() {
        let m: ChatMessage = serde_json::from_value(json!({
            "Id": 42,
            "RoomId": "7",
            "SenderId": "u-1",
            "Content": "Xin chào",
            "SentAt": "2024-05-01T08:30:00"
        }))
        .unwrap();
        assert_eq!(m.id, "42");
        assert_eq!(m.room_id, 7);
        assert_eq!(m.content, "Xin chào");
        assert_eq!(m.sent_at.unwrap().to_rfc3339(), "2024-05-01T08:30:00+00:00");
    }

    #[test]
    fn message_accepts_camel_case_and_epoch_millis() {
        let m: ChatMessage = serde_json::from_value(json!({
            "id": "m-1", "roomId": 3, "senderId": 9, "content": "hi", "sentAt": 1_700_000_000_000_i64
        }))
        .unwrap();
        assert_eq!(m.sender_id, "9");
        assert!(m.sent_at.is_some());
    }

    #[test]
    fn room_type_from_string_or_number() {
        let r: ChatRoom = serde_json::from_value(json!({"Id": 5, "Type": "Support"})).unwrap();
        assert_eq!(r.room_type, RoomType::Support);
        let r: ChatRoom = serde_json::from_value(json!({"id": 6, "type": 1})).unwrap();
        assert_eq!(r.room_type, RoomType::Support);
        let r: ChatRoom = serde_json::from_value(json!({"id": 7})).unwrap();
        assert_eq!(r.room_type, RoomType::Private);
    }

    #[test]
    fn tokens_unwrap_envelope() {
        let t = AuthTokens::from_response(json!({
            "success": true,
            "data": {"AccessToken": "a1", "RefreshToken": "r1"}
        }))
        .unwrap();
        assert_eq!(t.access_token, "a1");
        assert_eq!(t.refresh_token.as_deref(), Some("r1"));
        assert!(AuthTokens::from_response(json!({"data": {"accessToken": ""}})).is_none());
    }

    #[test]
    fn decode_list_skips_bad_entries() {
        let list: Vec<Course> = decode_list(json!({"items": [{"id": 1, "title": "Toán"}, "oops"]}));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Toán");
    }

    #[test]
    fn explicit_nulls_keep_the_record() {
        let messages: Vec<ChatMessage> = decode_list(json!([
            {"id": 1, "roomId": 5, "content": null, "messageType": "image"},
            {"id": 2, "roomId": 5, "content": "hi"}
        ]));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "");
        assert_eq!(messages[0].message_type.as_deref(), Some("image"));

        let courses: Vec<Course> = decode_list(json!([{"Id": 3, "Title": "Lý", "Price": null, "IsFree": null}]));
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].price, 0.0);

        let lessons: Vec<Lesson> = decode_list(json!([{"id": 4, "courseId": 3, "orderIndex": null, "title": null}]));
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].order_index, 0);

        let q: Question = serde_json::from_value(json!({"id": 8, "options": null, "content": "?"})).unwrap();
        assert!(q.options.is_empty());
    }

    #[test]
    fn roles_compare_case_insensitively() {
        let p: UserProfile = serde_json::from_value(json!({"Id": 3, "Role": "Admin"})).unwrap();
        assert!(p.is_admin());
        assert!(!p.is_teacher());
        let p: UserProfile = serde_json::from_value(json!({"id": "t", "role": "TEACHER"})).unwrap();
        assert!(p.is_teacher());
        let p: UserProfile = serde_json::from_value(json!({"id": "s", "role": null})).unwrap();
        assert!(!p.is_admin() && !p.is_teacher());
    }

    #[test]
    fn payment_status_flags() {
        let s = PaymentStatus { status: "paid".into(), ..Default::default() };
        assert!(s.is_paid());
        let s = PaymentStatus { status: "CANCELLED".into(), ..Default::default() };
        assert!(s.is_cancelled());
    }
}
