use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend service that owns a path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Auth,
    Exams,
    Courses,
    Materials,
    Chat,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Auth => write!(f, "auth"),
            Service::Exams => write!(f, "exams"),
            Service::Courses => write!(f, "courses"),
            Service::Materials => write!(f, "materials"),
            Service::Chat => write!(f, "chat"),
        }
    }
}

const PREFIXES: &[(&str, Service)] = &[
    ("/Auth", Service::Auth),
    ("/Users", Service::Auth),
    ("/Admin", Service::Auth),
    ("/Exams", Service::Exams),
    ("/question-bank", Service::Exams),
    ("/Statistics", Service::Exams),
    ("/Feedback", Service::Exams),
    ("/Reports", Service::Exams),
    ("/Courses", Service::Courses),
    ("/Lessons", Service::Courses),
    ("/Payments", Service::Courses),
    ("/Materials", Service::Materials),
    ("/Chat", Service::Chat),
];

/// Service owning `path`, matched case-insensitively on whole segments.
/// Absolute URLs and unknown prefixes have no owner and therefore no fallback.
pub fn service_for_path(path: &str) -> Option<Service> {
    if crate::utils::is_absolute_url(path) {
        return None;
    }
    let path = if path.starts_with('/') { path.to_string() } else { format!("/{}", path) };
    PREFIXES.iter().find_map(|(prefix, service)| {
        let head = path.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        match path[prefix.len()..].chars().next() {
            None | Some('/') | Some('?') | Some('#') => Some(*service),
            _ => None,
        }
    })
}

/// How a 404 from the gateway is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotFoundPolicy {
    /// Retry only when the 404 carries no JSON body, i.e. the gateway had no route.
    #[default]
    RouteMiss,
    Always,
    Never,
}

impl NotFoundPolicy {
    pub fn should_retry(&self, body: &str) -> bool {
        match self {
            NotFoundPolicy::Always => true,
            NotFoundPolicy::Never => false,
            NotFoundPolicy::RouteMiss => {
                let trimmed = body.trim();
                trimmed.is_empty() || serde_json::from_str::<serde_json::Value>(trimmed).is_err()
            }
        }
    }
}
