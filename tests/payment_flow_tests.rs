mod common;

use std::sync::Arc;

use serde_json::json;

use common::{client, json_response, ScriptedTransport};
use exam_portal_client::api::models::ContactInfo;
use exam_portal_client::api::services::{CourseService, PaymentService};
use exam_portal_client::api::transport::Body;
use exam_portal_client::pages::payment::{PaymentController, PaymentForm, PaymentOutcome, PaymentResult};
use exam_portal_client::pages::NoticeKind;
use exam_portal_client::storage::Store;

fn controller(transport: Arc<ScriptedTransport>) -> (PaymentController, Arc<Store>) {
    let (api, store) = client(transport, Some(("tok", None)));
    let controller = PaymentController::new(
        CourseService::new(api.clone()),
        PaymentService::new(api),
        store.clone(),
        "https://hoc.example.vn/",
    );
    (controller, store)
}

fn form(course_id: i64, is_free: bool) -> PaymentForm {
    PaymentForm {
        course_id,
        course_title: "Hóa học 11".into(),
        amount: if is_free { 0.0 } else { 199_000.0 },
        is_free,
        contact: ContactInfo {
            full_name: "Trần Thị B".into(),
            email: "b@example.vn".into(),
            phone_number: "0912345678".into(),
            address: "Đà Nẵng".into(),
        },
    }
}

#[tokio::test]
async fn incomplete_free_enrollment_never_reaches_the_network() {
    let transport = ScriptedTransport::new(|_| json_response(200, json!({})));
    let (payments, _) = controller(transport.clone());
    let mut f = form(1, true);
    f.contact.phone_number.clear();

    let notice = payments.submit(&f).await.unwrap_err();

    assert_eq!(notice.kind, NoticeKind::Validation);
    assert_eq!(notice.text, "Vui lòng nhập số điện thoại.");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn free_course_enrolls_directly() {
    let transport = ScriptedTransport::new(|_| json_response(200, json!({ "success": true })));
    let (payments, _) = controller(transport.clone());

    let outcome = payments.submit(&form(1, true)).await.unwrap();

    assert_eq!(outcome, PaymentOutcome::Enrolled { already: false });
    assert_eq!(transport.urls(), vec!["http://gateway.test/api/Courses/1/enroll"]);
}

#[tokio::test]
async fn already_enrolled_counts_as_success() {
    let transport =
        ScriptedTransport::new(|_| json_response(400, json!({ "message": "Bạn đã đăng ký khóa học này rồi" })));
    let (payments, _) = controller(transport);

    let outcome = payments.submit(&form(1, true)).await.unwrap();

    assert_eq!(outcome, PaymentOutcome::Enrolled { already: true });
}

#[tokio::test]
async fn paid_course_redirects_and_remembers_order_code() {
    let transport = ScriptedTransport::new(|_| {
        json_response(
            200,
            json!({ "data": { "checkoutUrl": "https://pay.payos.vn/web/abc", "orderCode": 171234, "paymentLinkId": "abc" } }),
        )
    });
    let (payments, store) = controller(transport.clone());

    let outcome = payments.submit(&form(2, false)).await.unwrap();

    assert_eq!(
        outcome,
        PaymentOutcome::Redirect { checkout_url: "https://pay.payos.vn/web/abc".into(), order_code: 171234 }
    );
    assert_eq!(store.last_payment_order_code().unwrap(), Some(171234));
    let sent = transport.requests();
    assert!(sent[0].url.ends_with("/Payments/create-link"));
    let Body::Json(body) = &sent[0].body else { panic!("expected a JSON body") };
    assert_eq!(body["returnUrl"], "https://hoc.example.vn/payment/success?courseId=2");
    assert_eq!(body["cancelUrl"], "https://hoc.example.vn/payment/cancel?courseId=2");
    assert_eq!(body["email"], "b@example.vn");
}

#[tokio::test]
async fn return_with_paid_status_clears_order_code() {
    let transport = ScriptedTransport::new(|req| {
        assert!(req.url.ends_with("/Payments/171234"));
        json_response(200, json!({ "data": { "orderCode": 171234, "status": "PAID", "amount": 199000 } }))
    });
    let (payments, store) = controller(transport);
    store.set_last_payment_order_code(171234).unwrap();

    let result = payments.handle_return("?code=00&id=abc&cancel=false&status=PAID&orderCode=171234").await.unwrap();

    assert_eq!(result, PaymentResult::Paid { order_code: 171234 });
    assert_eq!(store.last_payment_order_code().unwrap(), None);
}

#[tokio::test]
async fn cancel_return_uses_remembered_code_and_pending_keeps_it() {
    let transport = ScriptedTransport::new(|req| {
        if req.url.ends_with("/Payments/5") {
            json_response(200, json!({ "orderCode": 5, "status": "CANCELLED" }))
        } else {
            json_response(200, json!({ "orderCode": 6, "status": "PENDING" }))
        }
    });
    let (payments, store) = controller(transport);

    store.set_last_payment_order_code(5).unwrap();
    let result = payments.handle_return("cancel=true&status=CANCELLED").await.unwrap();
    assert_eq!(result, PaymentResult::Cancelled { order_code: 5 });
    assert_eq!(store.last_payment_order_code().unwrap(), None);

    store.set_last_payment_order_code(6).unwrap();
    let result = payments.handle_return("").await.unwrap();
    assert_eq!(result, PaymentResult::Pending { order_code: 6 });
    assert_eq!(store.last_payment_order_code().unwrap(), Some(6));
}

#[tokio::test]
async fn return_without_any_order_code_is_an_error() {
    let transport = ScriptedTransport::new(|_| json_response(200, json!({})));
    let (payments, _) = controller(transport.clone());

    let notice = payments.handle_return("status=PAID").await.unwrap_err();

    assert_eq!(notice.kind, NoticeKind::Error);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn cancelling_a_pending_checkout_forgets_the_order() {
    let transport = ScriptedTransport::new(|_| json_response(200, json!({ "success": true })));
    let (payments, store) = controller(transport.clone());
    store.set_last_payment_order_code(171234).unwrap();

    let cancelled = payments.cancel_pending().await.unwrap();

    assert_eq!(cancelled, 171234);
    assert_eq!(transport.urls(), vec![format!("{}/Payments/171234/cancel", common::GATEWAY)]);
    assert_eq!(store.last_payment_order_code().unwrap(), None);

    let notice = payments.cancel_pending().await.unwrap_err();
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn failed_cancel_keeps_the_order_code() {
    let transport = ScriptedTransport::new(|_| json_response(400, json!({ "message": "Đơn đã thanh toán" })));
    let (payments, store) = controller(transport);
    store.set_last_payment_order_code(9).unwrap();

    let notice = payments.cancel_pending().await.unwrap_err();

    assert_eq!(notice.text, "Đơn đã thanh toán");
    assert_eq!(store.last_payment_order_code().unwrap(), Some(9));
}
