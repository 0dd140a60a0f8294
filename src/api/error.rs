use serde_json::Value;
use thiserror::Error;

pub const FORBIDDEN_MESSAGE: &str = "Bạn không có quyền thực hiện thao tác này.";
pub const AUTH_REQUIRED_MESSAGE: &str = "Phiên đăng nhập đã hết hạn, vui lòng đăng nhập lại.";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("could not reach {url}: {detail}")]
    Connect { url: String, detail: String },
    #[error("invalid request for {url}: {detail}")]
    Request { url: String, detail: String },
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{}", AUTH_REQUIRED_MESSAGE)]
    AuthenticationRequired,
    #[error("{}", FORBIDDEN_MESSAGE)]
    Forbidden,
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        body: Option<Value>,
        raw: String,
        message: String,
    },
    #[error("unexpected response shape: {0}")]
    Decode(String),
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
}

impl ApiError {
    pub fn from_response(status: u16, raw: String) -> Self {
        let body = serde_json::from_str::<Value>(&raw).ok();
        let message = body
            .as_ref()
            .and_then(|b| {
                crate::utils::pick_str(b, &["message", "Message", "title", "Title", "error", "Error"])
            })
            .map(str::to_string)
            .unwrap_or_else(|| {
                if raw.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    crate::utils::truncate(raw.trim(), 200)
                }
            });
        ApiError::Status { status, body, raw, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::AuthenticationRequired => Some(401),
            ApiError::Forbidden => Some(403),
            _ => None,
        }
    }

    /// Message suitable for a toast.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Transport(_) => "Không thể kết nối tới máy chủ.".to_string(),
            other => other.to_string(),
        }
    }

    /// Backend business errors that several flows treat as success.
    pub fn is_already_enrolled(&self) -> bool {
        let text = match self {
            ApiError::Status { message, raw, .. } => format!("{} {}", message, raw),
            _ => return false,
        }
        .to_lowercase();
        ["already registered", "already enrolled", "đã đăng ký", "đã ghi danh"]
            .iter()
            .any(|needle| text.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_extracted_from_either_casing() {
        let e = ApiError::from_response(400, r#"{"Message":"Thiếu tiêu đề"}"#.into());
        assert_eq!(e.user_message(), "Thiếu tiêu đề");
        assert_eq!(e.status(), Some(400));
    }

    #[test]
    fn raw_text_is_used_when_body_is_not_json() {
        let e = ApiError::from_response(502, "Bad Gateway".into());
        assert_eq!(e.user_message(), "Bad Gateway");
        let e = ApiError::from_response(500, String::new());
        assert_eq!(e.user_message(), "HTTP 500");
    }

    #[test]
    fn already_enrolled_matches_substrings() {
        let e = ApiError::from_response(400, r#"{"message":"User is Already Enrolled in this course"}"#.into());
        assert!(e.is_already_enrolled());
        let e = ApiError::from_response(409, r#"{"message":"Bạn đã đăng ký khóa học này"}"#.into());
        assert!(e.is_already_enrolled());
        assert!(!ApiError::Forbidden.is_already_enrolled());
    }
}
