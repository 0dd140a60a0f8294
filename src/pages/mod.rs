//! Screen controllers. Each one turns a user action into service calls and
//! hands back plain view state; rendering is left to whichever front end
//! drives them.

pub mod admin;
pub mod lesson;
pub mod payment;

use std::fmt;
use thiserror::Error;

use crate::api::error::{ApiError, AUTH_REQUIRED_MESSAGE, FORBIDDEN_MESSAGE};

pub const LOAD_FAILED_BANNER: &str = "Không thể tải dữ liệu, thử lại";

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    /// Inline banner with a retry action.
    Failed { message: String },
    /// Full-page state for a target that does not exist.
    NotFound(String),
}

impl<T> ViewState<T> {
    pub fn from_result(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(value) => ViewState::Ready(value),
            Err(e) => {
                log::warn!("Load failed: {e}");
                let message = match e {
                    ApiError::Forbidden => FORBIDDEN_MESSAGE,
                    ApiError::AuthenticationRequired => AUTH_REQUIRED_MESSAGE,
                    _ => LOAD_FAILED_BANNER,
                };
                ViewState::Failed { message: message.to_string() }
            }
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ViewState::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ViewState::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Validation,
}

/// A toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Success, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Error, text: text.into() }
    }

    pub fn validation(text: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Validation, text: text.into() }
    }

    pub fn from_error(e: &ApiError) -> Self {
        Self::error(e.user_message())
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Vui lòng nhập {0}.")]
    Missing(&'static str),
    #[error("{0}")]
    Invalid(String),
}

impl From<ValidationError> for Notice {
    fn from(e: ValidationError) -> Self {
        Notice::validation(e.to_string())
    }
}

pub(crate) fn require(value: &str, label: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Missing(label))
    } else {
        Ok(())
    }
}
