//! Message bodies for the workflow notifications.

use crate::domain::course::User;
use crate::domain::money::Price;
use crate::domain::notification::Email;
use crate::domain::payment::Payment;
use chrono::{DateTime, FixedOffset, Utc};
use pulldown_cmark::{Options, Parser, html};

const TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

pub fn new_payment_chat(course_title: &str, price: Price) -> String {
    format!("New payment for course {course_title}, price {price}")
}

pub fn acceptance_email(
    payment: &Payment,
    course_title: &str,
    payer: &User,
    offset: &FixedOffset,
) -> Email {
    let name = payer.display_name();
    let approved_at = payment
        .status_changed_at
        .map(|at| format_time(at, offset))
        .unwrap_or_default();
    let text = format!(
        "Hello {name},\n\n\
         This email confirms that your payment for the course \"{course_title}\" has been approved. \
         You can sign in and start learning \"{course_title}\" right away.\n\n\
         Payment ID: {id}\n\n\
         Course: {course_title}\n\n\
         Amount: {price}\n\n\
         Paid at: {paid_at}\n\n\
         Approved at: {approved_at}\n\n\
         Payer name: {name}\n\n\
         Payer email: {email}\n\n\
         ----------------------\n\n\
         Thank you for learning with us.",
        id = payment.id,
        price = payment.price,
        paid_at = format_time(payment.created_at, offset),
        email = payer.email,
    );

    Email {
        to: payer.email.clone(),
        subject: format!("Payment confirmed for course {course_title}"),
        html_body: render_html(&text),
    }
}

pub fn rejection_email(course_title: &str, payer: &User, message: &str) -> Email {
    Email {
        to: payer.email.clone(),
        subject: format!("Your enrollment request for course {course_title} was rejected"),
        html_body: render_html(message),
    }
}

/// Body sent when the reviewer rejects a payment without writing a message.
pub fn default_rejection_message(
    payment: &Payment,
    course_title: &str,
    payer: &User,
    offset: &FixedOffset,
) -> String {
    format!(
        "Hello {name},\n\n\
         Regarding the file you uploaded on {uploaded_at} to enroll in the course \"{course_title}\", \
         your request was rejected. This is usually for one of the following reasons:\n\n\
         1. The image does not show what the course requires. For a free course, upload a \
         screenshot of the course link shared on your timeline. For other courses, check the \
         image requirements on the course page.\n\
         2. The amount on the slip does not match the amount transferred. If the course was \
         discounted, state the amount you actually transferred, not the full price. For a \
         third-party ticket, state the ticket price without fees.\n\n\
         If you have any questions, reply to this email.\n\n\
         Thank you,\n\n\
         The course team",
        name = payer.display_name(),
        uploaded_at = format_time(payment.created_at, offset),
    )
}

fn format_time(at: DateTime<Utc>, offset: &FixedOffset) -> String {
    at.with_timezone(offset).format(TIME_FORMAT).to_string()
}

/// Renders Markdown to HTML and strips anything unsafe from the result.
/// Links open in a new tab.
pub fn render_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);

    let mut unsafe_html = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut unsafe_html, parser);

    ammonia::Builder::default()
        .set_tag_attribute_value("a", "target", "_blank")
        .clean(&unsafe_html)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::utc_offset_hours;
    use crate::domain::payment::{NewPayment, PaymentId};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn payer() -> User {
        User {
            id: "u1".into(),
            username: "alice".to_string(),
            name: String::new(),
            email: "alice@example.com".to_string(),
        }
    }

    #[test]
    fn test_render_html_escapes_markup() {
        let html = render_html("Hi <b>there</b>\n\nnext & last");
        assert!(html.contains("<p>next &amp; last</p>"));
        assert!(html.contains("there"));
        assert!(!html.contains("<script"));
    }

    #[test]
    fn test_render_html_formats_markdown() {
        let html = render_html(
            "**Note:** see [the FAQ](https://example.com/faq)\n\n\
             1. first\n\
             2. second\n\n\
             <script>alert(1)</script>",
        );
        assert!(html.contains("<strong>Note:</strong>"));
        assert!(html.contains("href=\"https://example.com/faq\""));
        assert!(html.contains("target=\"_blank\""));
        assert!(html.contains("<ol>"));
        assert!(html.contains("<li>second</li>"));
        assert!(!html.contains("<script"));
        assert!(!html.contains("alert(1)"));
    }

    #[test]
    fn test_render_html_drops_unsafe_links() {
        let html = render_html("[click](javascript:alert(1))");
        assert!(html.contains("click"));
        assert!(!html.contains("javascript:"));
    }

    #[test]
    fn test_new_payment_chat_text() {
        let text = new_payment_chat("Rust 101", Price::new(dec!(500)).unwrap());
        assert_eq!(text, "New payment for course Rust 101, price 500.00");
    }

    #[test]
    fn test_acceptance_email_contents() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();
        let approved = Utc.with_ymd_and_hms(2024, 3, 2, 17, 30, 5).unwrap();
        let mut payment = Payment::pending(
            PaymentId(42),
            NewPayment {
                user: "u1".into(),
                course: "c1".into(),
                price: Price::new(dec!(500)).unwrap(),
                original_price: Price::new(dec!(500)).unwrap(),
                evidence: "slip.jpg".to_string(),
            },
            created,
        );
        payment.accept(approved).unwrap();

        let offset = utc_offset_hours(7).unwrap();
        let email = acceptance_email(&payment, "Rust 101", &payer(), &offset);

        assert_eq!(email.to, "alice@example.com");
        assert_eq!(email.subject, "Payment confirmed for course Rust 101");
        assert!(email.html_body.contains("Hello alice,"));
        assert!(email.html_body.contains("Payment ID: 42"));
        assert!(email.html_body.contains("Amount: 500.00"));
        assert!(email.html_body.contains("Paid at: 01/03/2024 10:00:00"));
        assert!(email.html_body.contains("Approved at: 03/03/2024 00:30:05"));
        assert!(email.html_body.contains("\"Rust 101\""));
        assert!(email.html_body.contains("<hr>"));
    }

    #[test]
    fn test_rejection_email_uses_admin_message() {
        let email = rejection_email("Rust 101", &payer(), "Amount 200 < 500 does not match");
        assert_eq!(email.to, "alice@example.com");
        assert!(email.subject.contains("Rust 101"));
        assert!(
            email
                .html_body
                .contains("<p>Amount 200 &lt; 500 does not match</p>")
        );
    }

    #[test]
    fn test_default_rejection_message_lists_reasons() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();
        let payment = Payment::pending(
            PaymentId(7),
            NewPayment {
                user: "u1".into(),
                course: "c1".into(),
                price: Price::new(dec!(500)).unwrap(),
                original_price: Price::new(dec!(800)).unwrap(),
                evidence: "slip.jpg".to_string(),
            },
            created,
        );
        let offset = utc_offset_hours(7).unwrap();

        let text = default_rejection_message(&payment, "Rust 101", &payer(), &offset);
        assert!(text.starts_with("Hello alice,"));
        assert!(text.contains("\"Rust 101\""));
        assert!(text.contains("01/03/2024 10:00:00"));

        let html = render_html(&text);
        assert_eq!(html.matches("<li>").count(), 2);
        assert!(html.contains("amount you actually transferred"));
    }
}
