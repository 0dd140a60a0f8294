use std::sync::Arc;

use crate::api::models::{ContactInfo, Course, PaymentRequest, UserProfile};
use crate::api::services::{CourseService, PaymentService};
use crate::pages::{require, Notice, ValidationError};
use crate::storage::Store;

/// PayOS rejects descriptions longer than this.
const DESCRIPTION_MAX: usize = 25;

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentForm {
    pub course_id: i64,
    pub course_title: String,
    pub amount: f64,
    pub is_free: bool,
    pub contact: ContactInfo,
}

impl PaymentForm {
    /// Pre-fills contact fields from the cached profile.
    pub fn for_course(course: &Course, profile: Option<&UserProfile>) -> Self {
        let contact = profile
            .map(|p| ContactInfo {
                full_name: p.full_name.clone(),
                email: p.email.clone(),
                phone_number: p.phone_number.clone(),
                address: p.address.clone(),
            })
            .unwrap_or_default();
        Self {
            course_id: course.id,
            course_title: course.title.clone(),
            amount: course.price,
            is_free: course.is_free || course.price <= 0.0,
            contact,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let c = &self.contact;
        require(&c.full_name, "họ tên")?;
        require(&c.email, "email")?;
        if self.is_free {
            require(&c.phone_number, "số điện thoại")?;
            require(&c.address, "địa chỉ")?;
        }
        if !c.email.contains('@') || c.email.trim().ends_with('@') {
            return Err(ValidationError::Invalid("Email không hợp lệ.".into()));
        }
        if !c.phone_number.trim().is_empty() {
            let digits = c.phone_number.chars().filter(char::is_ascii_digit).count();
            let clean = c.phone_number.chars().all(|ch| ch.is_ascii_digit() || " +-.".contains(ch));
            if !clean || !(9..=11).contains(&digits) {
                return Err(ValidationError::Invalid("Số điện thoại không hợp lệ.".into()));
            }
        }
        if !self.is_free && self.amount <= 0.0 {
            return Err(ValidationError::Invalid("Số tiền thanh toán không hợp lệ.".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Enrolled { already: bool },
    /// Send the browser to `checkout_url`.
    Redirect { checkout_url: String, order_code: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentResult {
    Paid { order_code: i64 },
    Cancelled { order_code: i64 },
    Pending { order_code: i64 },
}

pub struct PaymentController {
    courses: CourseService,
    payments: PaymentService,
    store: Arc<Store>,
    site_origin: String,
}

impl PaymentController {
    pub fn new(courses: CourseService, payments: PaymentService, store: Arc<Store>, site_origin: &str) -> Self {
        Self { courses, payments, store, site_origin: site_origin.trim_end_matches('/').to_string() }
    }

    pub fn return_url(&self, course_id: i64) -> String {
        format!("{}/payment/success?courseId={}", self.site_origin, course_id)
    }

    pub fn cancel_url(&self, course_id: i64) -> String {
        format!("{}/payment/cancel?courseId={}", self.site_origin, course_id)
    }

    /// Validates locally, then either enrolls directly (free) or creates a
    /// checkout link and remembers its order code.
    pub async fn submit(&self, form: &PaymentForm) -> Result<PaymentOutcome, Notice> {
        form.validate()?;

        if form.is_free {
            return match self.courses.enroll(form.course_id, &form.contact).await {
                Ok(_) => Ok(PaymentOutcome::Enrolled { already: false }),
                Err(e) if e.is_already_enrolled() => {
                    log::info!("Course {} already enrolled; treating as success", form.course_id);
                    Ok(PaymentOutcome::Enrolled { already: true })
                }
                Err(e) => Err(Notice::from_error(&e)),
            };
        }

        let request = PaymentRequest {
            course_id: form.course_id,
            amount: form.amount,
            description: crate::utils::truncate(&format!("KH{} {}", form.course_id, form.course_title), DESCRIPTION_MAX - 1),
            return_url: self.return_url(form.course_id),
            cancel_url: self.cancel_url(form.course_id),
            buyer: form.contact.clone(),
        };
        match self.payments.create_link(&request).await {
            Ok(link) => {
                if let Err(e) = self.store.set_last_payment_order_code(link.order_code) {
                    log::warn!("Could not remember order code {}: {e}", link.order_code);
                }
                Ok(PaymentOutcome::Redirect { checkout_url: link.checkout_url, order_code: link.order_code })
            }
            Err(e) if e.is_already_enrolled() => Ok(PaymentOutcome::Enrolled { already: true }),
            Err(e) => Err(Notice::from_error(&e)),
        }
    }

    /// Reconciles the query string PayOS appends to the return/cancel URL with
    /// the remembered order code and the backend's view of the payment.
    pub async fn handle_return(&self, query: &str) -> Result<PaymentResult, Notice> {
        let params = ReturnParams::parse(query);
        let stored = self.store.last_payment_order_code().unwrap_or_else(|e| {
            log::warn!("Stored order code unreadable: {e}");
            None
        });
        let order_code = match (params.order_code, stored) {
            (Some(q), Some(s)) if q != s => {
                log::warn!("Return order code {q} differs from remembered {s}; using {q}");
                q
            }
            (Some(q), _) => q,
            (None, Some(s)) => s,
            (None, None) => return Err(Notice::error("Không tìm thấy mã đơn hàng.")),
        };

        let result = match self.payments.status(order_code).await {
            Ok(status) if status.is_paid() => PaymentResult::Paid { order_code },
            Ok(status) if status.is_cancelled() || params.cancelled => PaymentResult::Cancelled { order_code },
            Ok(_) => PaymentResult::Pending { order_code },
            Err(e) if e.is_already_enrolled() => PaymentResult::Paid { order_code },
            Err(_) if params.cancelled => PaymentResult::Cancelled { order_code },
            Err(e) => return Err(Notice::from_error(&e)),
        };
        if !matches!(result, PaymentResult::Pending { .. }) {
            if let Err(e) = self.store.clear_last_payment_order_code() {
                log::warn!("Could not clear order code: {e}");
            }
        }
        Ok(result)
    }

    /// Abandons the remembered checkout: asks the backend to cancel the order
    /// and forgets its code.
    pub async fn cancel_pending(&self) -> Result<i64, Notice> {
        let order_code = match self.store.last_payment_order_code() {
            Ok(Some(code)) => code,
            Ok(None) => return Err(Notice::error("Không tìm thấy mã đơn hàng.")),
            Err(e) => {
                log::warn!("Stored order code unreadable: {e}");
                return Err(Notice::error("Không tìm thấy mã đơn hàng."));
            }
        };
        self.payments.cancel(order_code).await.map_err(|e| Notice::from_error(&e))?;
        if let Err(e) = self.store.clear_last_payment_order_code() {
            log::warn!("Could not clear order code: {e}");
        }
        Ok(order_code)
    }
}

#[derive(Debug, Default, PartialEq)]
struct ReturnParams {
    order_code: Option<i64>,
    cancelled: bool,
}

impl ReturnParams {
    fn parse(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let mut out = ReturnParams::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "orderCode" | "OrderCode" => out.order_code = value.trim().parse().ok(),
                "cancel" => out.cancelled |= value.eq_ignore_ascii_case("true"),
                "status" => out.cancelled |= value.eq_ignore_ascii_case("CANCELLED"),
                _ => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(is_free: bool) -> PaymentForm {
        PaymentForm {
            course_id: 1,
            course_title: "Toán 12".into(),
            amount: 199000.0,
            is_free,
            contact: ContactInfo {
                full_name: "Nguyễn Văn A".into(),
                email: "a@example.vn".into(),
                phone_number: "0901 234 567".into(),
                address: "Hà Nội".into(),
            },
        }
    }

    #[test]
    fn free_enrollment_requires_every_contact_field() {
        let mut f = form(true);
        assert!(f.validate().is_ok());
        f.contact.address.clear();
        assert_eq!(f.validate(), Err(ValidationError::Missing("địa chỉ")));
    }

    #[test]
    fn paid_enrollment_allows_missing_address() {
        let mut f = form(false);
        f.contact.address.clear();
        f.contact.phone_number.clear();
        assert!(f.validate().is_ok());
    }

    #[test]
    fn bad_email_and_phone_are_rejected() {
        let mut f = form(false);
        f.contact.email = "a.example.vn".into();
        assert!(matches!(f.validate(), Err(ValidationError::Invalid(_))));
        let mut f = form(false);
        f.contact.phone_number = "12ab".into();
        assert!(matches!(f.validate(), Err(ValidationError::Invalid(_))));
    }

    #[test]
    fn autofill_uses_profile() {
        let course = Course { id: 4, title: "Lý".into(), price: 0.0, ..Default::default() };
        let profile = UserProfile { full_name: "Bình".into(), email: "b@x.vn".into(), ..Default::default() };
        let f = PaymentForm::for_course(&course, Some(&profile));
        assert!(f.is_free);
        assert_eq!(f.contact.full_name, "Bình");
    }

    #[test]
    fn return_params_parse_payos_query() {
        let p = ReturnParams::parse("?code=00&id=abc&cancel=true&status=CANCELLED&orderCode=171234");
        assert_eq!(p, ReturnParams { order_code: Some(171234), cancelled: true });
        let p = ReturnParams::parse("status=PAID&orderCode=5");
        assert_eq!(p, ReturnParams { order_code: Some(5), cancelled: false });
    }
}
