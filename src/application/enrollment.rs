use super::messages;
use super::orchestrator::{UnitOfWork, WorkflowOrchestrator};
use crate::domain::course::{CourseId, UserId};
use crate::domain::enrollment::Enrollment;
use crate::domain::money::Price;
use crate::domain::notification::Notification;
use crate::domain::payment::{NewPayment, Payment};
use crate::error::{Result, WorkflowError};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// A user asking for a seat in a course.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRequest {
    pub user: UserId,
    pub course: CourseId,
    /// Amount the user says they paid. Ignored for free courses.
    pub price: Decimal,
    /// Reference to the already uploaded proof-of-payment image.
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentOutcome {
    /// The user owns the course or is already enrolled. Nothing was written.
    AlreadyEnrolled,
    /// A payment for this pair is already waiting for review. Nothing was written.
    PaymentPending,
    PaymentCreated(Payment),
    EnrollmentCreated(Enrollment),
}

/// Decides between auto-enrollment and a pending payment, and keeps at most
/// one of each per (user, course).
#[derive(Clone)]
pub struct EnrollmentService {
    orchestrator: Arc<WorkflowOrchestrator>,
}

impl EnrollmentService {
    pub fn new(orchestrator: Arc<WorkflowOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn request_enrollment(&self, request: EnrollmentRequest) -> Result<EnrollmentOutcome> {
        let user = request.user.clone();
        let course = request.course.clone();

        let result = self
            .orchestrator
            .run_transactional(move |uow| Box::pin(enroll(uow, request)))
            .await;

        match result {
            Ok(outcome) => {
                match &outcome {
                    EnrollmentOutcome::PaymentCreated(payment) => {
                        info!(payment = %payment.id, %user, %course, price = %payment.price, "payment submitted for review");
                    }
                    EnrollmentOutcome::EnrollmentCreated(_) => {
                        info!(%user, %course, "enrolled in free course");
                    }
                    EnrollmentOutcome::AlreadyEnrolled | EnrollmentOutcome::PaymentPending => {
                        debug!(%user, %course, ?outcome, "enrollment request was a no-op");
                    }
                }
                Ok(outcome)
            }
            // Lost a race the pair lock could not see, e.g. against another
            // engine sharing the store. The winner's state is the answer.
            Err(WorkflowError::Conflict(reason)) => {
                debug!(%user, %course, %reason, "duplicate enrollment request absorbed");
                self.current_state(&user, &course).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn is_enrolled(&self, user: &UserId, course: &CourseId) -> Result<bool> {
        self.orchestrator.ledger().is_enrolled(user, course).await
    }

    pub async fn pending_payment(&self, user: &UserId, course: &CourseId) -> Result<Option<Payment>> {
        self.orchestrator.ledger().pending_payment(user, course).await
    }

    async fn current_state(&self, user: &UserId, course: &CourseId) -> Result<EnrollmentOutcome> {
        if self.is_enrolled(user, course).await? {
            return Ok(EnrollmentOutcome::AlreadyEnrolled);
        }
        if self.pending_payment(user, course).await?.is_some() {
            return Ok(EnrollmentOutcome::PaymentPending);
        }
        Err(WorkflowError::TransactionError(format!(
            "enrollment of user {user} in course {course} conflicted but left no state"
        )))
    }
}

async fn enroll(uow: &mut UnitOfWork, request: EnrollmentRequest) -> Result<EnrollmentOutcome> {
    let EnrollmentRequest {
        user,
        course: course_id,
        price,
        evidence,
    } = request;

    let course = uow
        .course(&course_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("course {course_id}")))?;

    if course.is_owned_by(&user) {
        return Ok(EnrollmentOutcome::AlreadyEnrolled);
    }

    uow.lock_pair(&user, &course.id).await;

    if uow.is_enrolled(&user, &course.id).await? {
        return Ok(EnrollmentOutcome::AlreadyEnrolled);
    }
    if uow.has_pending_payment(&user, &course.id).await? {
        return Ok(EnrollmentOutcome::PaymentPending);
    }

    let original_price = course.effective_price();
    let now = Utc::now();

    if original_price.is_zero() {
        let enrollment = Enrollment::new(user, course.id, now);
        uow.insert_enrollment(enrollment.clone());
        return Ok(EnrollmentOutcome::EnrollmentCreated(enrollment));
    }

    let price = Price::new(price)?;
    let evidence = evidence
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            WorkflowError::ValidationError(
                "A payment evidence image is required for paid courses".to_string(),
            )
        })?;

    let payment = uow
        .insert_payment(
            NewPayment {
                user,
                course: course.id,
                price,
                original_price,
                evidence,
            },
            now,
        )
        .await?;

    let title = course.title;
    uow.on_committed(move |_| {
        Some(Notification::AdminChat {
            text: messages::new_payment_chat(&title, price),
        })
    });

    Ok(EnrollmentOutcome::PaymentCreated(payment))
}
