mod common;

use common::{FULL_PRICE, PAID, paid_request, recording_engine};
use coursepay::application::engine::EnrollmentEngine;
use coursepay::application::enrollment::EnrollmentOutcome;
use coursepay::domain::payment::{Payment, PaymentId, PaymentStatus};
use coursepay::domain::ports::LedgerStore;
use coursepay::error::WorkflowError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn submit(engine: &EnrollmentEngine, user: &str, course: &str, price: Decimal) -> Payment {
    match engine
        .enrollment()
        .request_enrollment(paid_request(user, course, price))
        .await
        .unwrap()
    {
        EnrollmentOutcome::PaymentCreated(payment) => payment,
        other => panic!("expected a pending payment, got {other:?}"),
    }
}

#[tokio::test]
async fn test_accept_enrolls_and_emails_payer() {
    let (engine, mailer, _) = recording_engine().await;
    let payment = submit(&engine, "alice", PAID, dec!(500)).await;

    let accepted = engine.review().accept(payment.id).await.unwrap();
    assert_eq!(accepted.status, PaymentStatus::Accepted);
    assert!(accepted.status_changed_at.is_some());
    assert!(
        engine
            .enrollment()
            .is_enrolled(&"alice".into(), &PAID.into())
            .await
            .unwrap()
    );
    assert_eq!(engine.review().count_pending().await.unwrap(), 0);

    engine.shutdown().await;
    let emails = mailer.emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "alice@example.com");
    assert_eq!(emails[0].subject, "Payment confirmed for course Rust 101");
    assert!(emails[0].html_body.contains(&format!("Payment ID: {}", payment.id)));
    assert!(emails[0].html_body.contains("Amount: 500.00"));
    assert!(emails[0].html_body.contains("Hello ALICE"));
}

#[tokio::test]
async fn test_reaccept_is_not_pending() {
    let (engine, mailer, _) = recording_engine().await;
    let payment = submit(&engine, "bob", PAID, dec!(500)).await;

    engine.review().accept(payment.id).await.unwrap();
    let again = engine.review().accept(payment.id).await;
    assert!(matches!(
        again,
        Err(WorkflowError::NotPending {
            status: PaymentStatus::Accepted,
            ..
        })
    ));
    let reject_after_accept = engine.review().reject(payment.id, "late".to_string()).await;
    assert!(matches!(reject_after_accept, Err(WorkflowError::NotPending { .. })));

    assert_eq!(engine.ledger().enrollments().await.unwrap().len(), 1);
    engine.shutdown().await;
    assert_eq!(mailer.emails().len(), 1);
}

#[tokio::test]
async fn test_reject_keeps_user_out() {
    let (engine, mailer, _) = recording_engine().await;
    let payment = submit(&engine, "carol", FULL_PRICE, dec!(200)).await;

    let message = "The transferred amount <200> does not match the price.\n\nPlease upload a new slip.";
    let rejected = engine
        .review()
        .reject(payment.id, message.to_string())
        .await
        .unwrap();
    assert_eq!(rejected.status, PaymentStatus::Rejected);
    assert!(
        !engine
            .enrollment()
            .is_enrolled(&"carol".into(), &FULL_PRICE.into())
            .await
            .unwrap()
    );

    let accept_after_reject = engine.review().accept(payment.id).await;
    assert!(matches!(
        accept_after_reject,
        Err(WorkflowError::NotPending {
            status: PaymentStatus::Rejected,
            ..
        })
    ));

    engine.shutdown().await;
    let emails = mailer.emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(
        emails[0].subject,
        "Your enrollment request for course Async Deep Dive was rejected"
    );
    let body = &emails[0].html_body;
    assert!(body.contains("<p>The transferred amount &lt;200&gt; does not match the price.</p>"));
    assert!(body.contains("<p>Please upload a new slip.</p>"));
}

#[tokio::test]
async fn test_reject_without_message_sends_standard_explanation() {
    let (engine, mailer, _) = recording_engine().await;
    let payment = submit(&engine, "bob", PAID, dec!(500)).await;

    engine.review().reject(payment.id, "  ".to_string()).await.unwrap();

    engine.shutdown().await;
    let emails = mailer.emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "bob@example.com");
    let body = &emails[0].html_body;
    assert!(body.contains("Hello BOB,"));
    assert!(body.contains("\"Rust 101\""));
    assert!(body.contains("<ol>"));
    assert!(body.contains("does not match the amount transferred"));
}

#[tokio::test]
async fn test_unknown_payment_is_not_found() {
    let (engine, _, _) = recording_engine().await;
    assert!(matches!(
        engine.review().accept(PaymentId(404)).await,
        Err(WorkflowError::NotFound(_))
    ));
    assert!(matches!(
        engine.review().reject(PaymentId(404), "no".to_string()).await,
        Err(WorkflowError::NotFound(_))
    ));
    assert!(engine.review().payment(PaymentId(404)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_payer_without_email_still_accepted() {
    let (engine, mailer, _) = recording_engine().await;
    let payment = submit(&engine, "mute", PAID, dec!(500)).await;

    let accepted = engine.review().accept(payment.id).await.unwrap();
    assert_eq!(accepted.status, PaymentStatus::Accepted);

    engine.shutdown().await;
    assert!(mailer.emails().is_empty());
}

#[tokio::test]
async fn test_pending_and_history_listings() {
    let (engine, _, _) = recording_engine().await;
    let alice = submit(&engine, "alice", PAID, dec!(500)).await;
    let bob = submit(&engine, "bob", PAID, dec!(500)).await;
    let carol = submit(&engine, "carol", FULL_PRICE, dec!(250)).await;

    engine.review().accept(alice.id).await.unwrap();
    engine.review().reject(bob.id, "no".to_string()).await.unwrap();

    let review = engine.review();
    assert_eq!(review.count_pending().await.unwrap(), 1);
    assert_eq!(review.count_history().await.unwrap(), 2);

    let pending = review.pending(10, 0).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, carol.id);

    let history = review.history(10, 0).await.unwrap();
    let ids: Vec<PaymentId> = history.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![bob.id, alice.id]);

    let page = review.history(1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, alice.id);
    assert!(review.history(10, 5).await.unwrap().is_empty());

    let stored = review.payment(alice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Accepted);
}
