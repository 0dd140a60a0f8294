//! Admin and teacher dashboard tables.

use crate::api::error::ApiError;
use crate::api::models::{Enrollment, Exam, ExamDraft, Feedback, Question, QuestionDraft, Report};
use crate::api::services::{CourseService, ExamService, FeedbackService, QuestionBankService, ReportService};
use crate::pages::{require, Notice, ValidationError, ViewState};

pub const DEFAULT_PAGE_SIZE: usize = 10;

pub fn validate_exam(draft: &ExamDraft) -> Result<(), ValidationError> {
    require(&draft.title, "tên đề thi")?;
    if draft.duration_minutes == 0 {
        return Err(ValidationError::Invalid("Thời gian làm bài phải lớn hơn 0.".into()));
    }
    Ok(())
}

pub fn validate_question(draft: &QuestionDraft) -> Result<(), ValidationError> {
    require(&draft.content, "nội dung câu hỏi")?;
    let filled = draft.options.iter().filter(|o| !o.trim().is_empty()).count();
    if filled < 2 || filled != draft.options.len() {
        return Err(ValidationError::Invalid("Cần ít nhất 2 đáp án và không để trống đáp án.".into()));
    }
    match draft.correct_answer {
        Some(i) if i < draft.options.len() => Ok(()),
        Some(_) => Err(ValidationError::Invalid("Đáp án đúng không hợp lệ.".into())),
        None => Err(ValidationError::Missing("đáp án đúng")),
    }
}

/// Text the table search box matches against.
pub trait Searchable {
    fn haystack(&self) -> String;
}

impl Searchable for Exam {
    fn haystack(&self) -> String {
        format!("{} {}", self.title, self.description.as_deref().unwrap_or_default())
    }
}

impl Searchable for Question {
    fn haystack(&self) -> String {
        format!("{} {}", self.content, self.subject.as_deref().unwrap_or_default())
    }
}

impl Searchable for Feedback {
    fn haystack(&self) -> String {
        format!("{} {}", self.content, self.user_name.as_deref().unwrap_or_default())
    }
}

impl Searchable for Report {
    fn haystack(&self) -> String {
        format!("{} {}", self.reason, self.reporter_name.as_deref().unwrap_or_default())
    }
}

impl Searchable for Enrollment {
    fn haystack(&self) -> String {
        format!(
            "{} {}",
            self.user_name.as_deref().unwrap_or_default(),
            self.course_title.as_deref().unwrap_or_default()
        )
    }
}

/// One page of a filtered table.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePage<'a, T> {
    pub rows: Vec<&'a T>,
    pub page: usize,
    pub total_pages: usize,
    pub total_rows: usize,
}

/// Case-insensitive search followed by 1-based pagination; out-of-range pages clamp.
pub fn table_page<'a, T: Searchable>(items: &'a [T], query: &str, page: usize, per_page: usize) -> TablePage<'a, T> {
    let needle = query.trim().to_lowercase();
    let matching: Vec<&T> = items
        .iter()
        .filter(|item| needle.is_empty() || item.haystack().to_lowercase().contains(&needle))
        .collect();
    let per_page = per_page.max(1);
    let total_rows = matching.len();
    let total_pages = total_rows.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let rows = matching.into_iter().skip((page - 1) * per_page).take(per_page).collect();
    TablePage { rows, page, total_pages, total_rows }
}

pub struct AdminDashboard {
    exams: ExamService,
    questions: QuestionBankService,
    courses: CourseService,
    feedback: FeedbackService,
    reports: ReportService,
}

impl AdminDashboard {
    pub fn new(
        exams: ExamService,
        questions: QuestionBankService,
        courses: CourseService,
        feedback: FeedbackService,
        reports: ReportService,
    ) -> Self {
        Self { exams, questions, courses, feedback, reports }
    }

    pub async fn load_exams(&self) -> ViewState<Vec<Exam>> {
        ViewState::from_result(self.exams.list().await)
    }

    pub async fn save_exam(&self, id: Option<i64>, draft: &ExamDraft) -> Notice {
        if let Err(e) = validate_exam(draft) {
            return e.into();
        }
        let result = match id {
            Some(id) => self.exams.update(id, draft).await.map(|_| ()),
            None => self.exams.create(draft).await.map(|_| ()),
        };
        mutation_notice(result, "Đã lưu đề thi.")
    }

    pub async fn delete_exam(&self, id: i64) -> Notice {
        mutation_notice(self.exams.delete(id).await, "Đã xóa đề thi.")
    }

    pub async fn load_questions(&self, subject: Option<&str>) -> ViewState<Vec<Question>> {
        ViewState::from_result(self.questions.list(subject).await)
    }

    pub async fn save_question(&self, id: Option<i64>, draft: &QuestionDraft) -> Notice {
        if let Err(e) = validate_question(draft) {
            return e.into();
        }
        let result = match id {
            Some(id) => self.questions.update(id, draft).await.map(|_| ()),
            None => self.questions.create(draft).await.map(|_| ()),
        };
        mutation_notice(result, "Đã lưu câu hỏi.")
    }

    pub async fn delete_question(&self, id: i64) -> Notice {
        mutation_notice(self.questions.delete(id).await, "Đã xóa câu hỏi.")
    }

    pub async fn load_feedback(&self) -> ViewState<Vec<Feedback>> {
        ViewState::from_result(self.feedback.list().await)
    }

    pub async fn set_feedback_status(&self, id: i64, status: &str) -> Notice {
        if status.trim().is_empty() {
            return ValidationError::Missing("trạng thái").into();
        }
        mutation_notice(self.feedback.update_status(id, status).await.map(|_| ()), "Đã cập nhật phản hồi.")
    }

    pub async fn load_reports(&self) -> ViewState<Vec<Report>> {
        ViewState::from_result(self.reports.list().await)
    }

    pub async fn resolve_report(&self, id: i64, note: &str) -> Notice {
        mutation_notice(self.reports.resolve(id, note).await.map(|_| ()), "Đã xử lý báo cáo.")
    }

    pub async fn load_enrollments(&self, course_id: Option<i64>) -> ViewState<Vec<Enrollment>> {
        ViewState::from_result(self.courses.enrollments(course_id).await)
    }

    pub async fn load_statistics(&self) -> ViewState<serde_json::Value> {
        ViewState::from_result(self.exams.statistics().await)
    }
}

fn mutation_notice<T>(result: Result<T, ApiError>, success: &str) -> Notice {
    match result {
        Ok(_) => Notice::success(success),
        Err(e) => Notice::from_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(options: &[&str], correct: Option<usize>) -> QuestionDraft {
        QuestionDraft {
            content: "2 + 2 = ?".into(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_answer: correct,
            ..Default::default()
        }
    }

    #[test]
    fn question_needs_two_filled_options_and_valid_answer() {
        assert!(validate_question(&question(&["3", "4"], Some(1))).is_ok());
        assert!(validate_question(&question(&["4"], Some(0))).is_err());
        assert!(validate_question(&question(&["3", " "], Some(0))).is_err());
        assert!(validate_question(&question(&["3", "4"], Some(2))).is_err());
        assert_eq!(
            validate_question(&question(&["3", "4"], None)),
            Err(ValidationError::Missing("đáp án đúng"))
        );
    }

    #[test]
    fn exam_needs_title_and_duration() {
        let mut d = ExamDraft { title: "Giữa kỳ".into(), duration_minutes: 45, ..Default::default() };
        assert!(validate_exam(&d).is_ok());
        d.duration_minutes = 0;
        assert!(validate_exam(&d).is_err());
        d.title.clear();
        assert_eq!(validate_exam(&d), Err(ValidationError::Missing("tên đề thi")));
    }

    #[test]
    fn table_page_filters_and_clamps() {
        let exams: Vec<Exam> = (1..=23)
            .map(|i| Exam { id: i, title: if i % 2 == 0 { format!("Toán {i}") } else { format!("Văn {i}") }, ..Default::default() })
            .collect();
        let all = table_page(&exams, "", 3, 10);
        assert_eq!((all.page, all.total_pages, all.rows.len()), (3, 3, 3));
        let toan = table_page(&exams, "TOÁN", 99, 10);
        assert_eq!(toan.total_rows, 11);
        assert_eq!(toan.page, 2);
        assert_eq!(toan.rows.len(), 1);
        let none = table_page(&exams, "hóa", 1, 10);
        assert_eq!((none.total_pages, none.rows.len()), (1, 0));
    }
}
