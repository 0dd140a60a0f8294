use url::Url;

use crate::api::error::ApiError;
use crate::api::models::{Course, Lesson, Material};
use crate::api::services::{CourseService, MaterialService};
use crate::pages::ViewState;

const COURSE_NOT_FOUND: &str = "Không tìm thấy khóa học.";
const LESSON_NOT_FOUND: &str = "Không tìm thấy bài học.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    YouTube { video_id: String },
    Vimeo { video_id: String },
    GoogleDrive { file_id: String },
    Hls { url: String },
    File { url: String },
    Unknown { url: String },
    Missing,
}

impl VideoSource {
    /// URL a player or iframe should load.
    pub fn playable_url(&self) -> Option<String> {
        match self {
            VideoSource::YouTube { video_id } => Some(format!("https://www.youtube.com/embed/{video_id}")),
            VideoSource::Vimeo { video_id } => Some(format!("https://player.vimeo.com/video/{video_id}")),
            VideoSource::GoogleDrive { file_id } => {
                Some(format!("https://drive.google.com/file/d/{file_id}/preview"))
            }
            VideoSource::Hls { url } | VideoSource::File { url } | VideoSource::Unknown { url } => Some(url.clone()),
            VideoSource::Missing => None,
        }
    }

    pub fn is_embed(&self) -> bool {
        matches!(self, VideoSource::YouTube { .. } | VideoSource::Vimeo { .. } | VideoSource::GoogleDrive { .. })
    }
}

/// Makes a stored media reference absolute: protocol-relative and bare-host
/// forms get https, server-relative paths are resolved against `media_base`.
pub fn normalize_media_url(raw: &str, media_base: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if crate::utils::is_absolute_url(raw) {
        return Some(raw.to_string());
    }
    let looks_like_host = raw.starts_with("www.")
        || ["youtube.com", "youtu.be", "vimeo.com", "drive.google.com"]
            .iter()
            .any(|h| raw.starts_with(h));
    if looks_like_host {
        return Some(format!("https://{raw}"));
    }
    let base = Url::parse(media_base).ok()?;
    let origin = base.origin().ascii_serialization();
    Some(crate::utils::join_url(&origin, raw))
}

pub fn detect_video(raw: &str, media_base: &str) -> VideoSource {
    let Some(normalized) = normalize_media_url(raw, media_base) else {
        return VideoSource::Missing;
    };
    let Ok(url) = Url::parse(&normalized) else {
        return VideoSource::Unknown { url: normalized };
    };
    let host = url.host_str().unwrap_or_default().trim_start_matches("www.").trim_start_matches("m.");
    let segments: Vec<&str> = url.path_segments().map(|s| s.filter(|p| !p.is_empty()).collect()).unwrap_or_default();

    match host {
        "youtube.com" | "youtube-nocookie.com" => {
            let id = url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned())
                .or_else(|| match segments.as_slice() {
                    ["embed" | "shorts" | "live" | "v", id, ..] => Some(id.to_string()),
                    _ => None,
                });
            if let Some(video_id) = id.filter(|i| !i.is_empty()) {
                return VideoSource::YouTube { video_id };
            }
        }
        "youtu.be" => {
            if let Some(id) = segments.first() {
                return VideoSource::YouTube { video_id: id.to_string() };
            }
        }
        "vimeo.com" | "player.vimeo.com" => {
            if let Some(id) = segments.iter().find(|s| s.chars().all(|c| c.is_ascii_digit())) {
                return VideoSource::Vimeo { video_id: id.to_string() };
            }
        }
        "drive.google.com" => {
            let id = match segments.as_slice() {
                ["file", "d", id, ..] => Some(id.to_string()),
                _ => url.query_pairs().find(|(k, _)| k == "id").map(|(_, v)| v.into_owned()),
            };
            if let Some(file_id) = id {
                return VideoSource::GoogleDrive { file_id };
            }
        }
        _ => {}
    }

    let path = url.path().to_ascii_lowercase();
    if path.ends_with(".m3u8") {
        VideoSource::Hls { url: normalized }
    } else if [".mp4", ".webm", ".ogg", ".ogv", ".mov", ".m4v"].iter().any(|ext| path.ends_with(ext)) {
        VideoSource::File { url: normalized }
    } else {
        VideoSource::Unknown { url: normalized }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessonView {
    pub course: Course,
    pub lessons: Vec<Lesson>,
    pub current: Lesson,
    pub video: VideoSource,
    pub materials: ViewState<Vec<Material>>,
    pub previous_lesson_id: Option<i64>,
    pub next_lesson_id: Option<i64>,
}

pub struct StudyLessonController {
    courses: CourseService,
    materials: MaterialService,
    media_base: String,
}

impl StudyLessonController {
    pub fn new(courses: CourseService, materials: MaterialService, media_base: &str) -> Self {
        Self { courses, materials, media_base: media_base.to_string() }
    }

    /// Opens `lesson_id` (or the first lesson) of `course_id`. A failing
    /// materials list degrades only that panel.
    pub async fn open(&self, course_id: i64, lesson_id: Option<i64>) -> ViewState<LessonView> {
        let course = match self.courses.get(course_id).await {
            Ok(c) => c,
            Err(e) if is_not_found(&e) => return ViewState::NotFound(COURSE_NOT_FOUND.into()),
            Err(e) => return ViewState::from_result(Err(e)),
        };
        let lessons = match self.courses.lessons(course_id).await {
            Ok(l) => l,
            Err(e) => return ViewState::from_result(Err(e)),
        };
        let position = match lesson_id {
            Some(id) => lessons.iter().position(|l| l.id == id),
            None if lessons.is_empty() => None,
            None => Some(0),
        };
        let Some(position) = position else {
            return ViewState::NotFound(LESSON_NOT_FOUND.into());
        };

        let current = lessons[position].clone();
        let video = detect_video(current.video_url.as_deref().unwrap_or_default(), &self.media_base);
        let materials = ViewState::from_result(self.materials.by_lesson(current.id).await);
        let previous_lesson_id = position.checked_sub(1).map(|p| lessons[p].id);
        let next_lesson_id = lessons.get(position + 1).map(|l| l.id);

        ViewState::Ready(LessonView { course, lessons, current, video, materials, previous_lesson_id, next_lesson_id })
    }
}

fn is_not_found(e: &ApiError) -> bool {
    e.status() == Some(404)
}
