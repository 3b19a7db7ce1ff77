use super::messages;
use super::orchestrator::{UnitOfWork, WorkflowOrchestrator};
use crate::domain::course::User;
use crate::domain::enrollment::Enrollment;
use crate::domain::notification::Notification;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::error::{Result, WorkflowError};
use chrono::{FixedOffset, Utc};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Accept,
    Reject,
}

/// Administrator review of pending payments. Authorization is the caller's
/// concern.
#[derive(Clone)]
pub struct PaymentReviewService {
    orchestrator: Arc<WorkflowOrchestrator>,
    utc_offset: FixedOffset,
}

impl PaymentReviewService {
    pub fn new(orchestrator: Arc<WorkflowOrchestrator>, utc_offset: FixedOffset) -> Self {
        Self {
            orchestrator,
            utc_offset,
        }
    }

    /// Accepts a pending payment and enrolls the payer. Returns the payment
    /// as committed.
    pub async fn accept(&self, id: PaymentId) -> Result<Payment> {
        let offset = self.utc_offset;
        let payment = self
            .orchestrator
            .run_transactional(move |uow| {
                Box::pin(async move {
                    let (payment, course_title, payer) = decide(uow, id, Decision::Accept).await?;
                    uow.insert_enrollment(Enrollment::new(
                        payment.user.clone(),
                        payment.course.clone(),
                        payment.updated_at,
                    ));
                    uow.on_committed(move |snapshot| {
                        let committed = snapshot.payment(id)?;
                        let payer = recipient(payer, id)?;
                        Some(Notification::Email(messages::acceptance_email(
                            committed,
                            &course_title,
                            &payer,
                            &offset,
                        )))
                    });
                    Ok(payment)
                })
            })
            .await?;

        info!(payment = %payment.id, user = %payment.user, course = %payment.course, "payment accepted");
        Ok(payment)
    }

    /// Rejects a pending payment. `message` becomes the body of the email sent
    /// to the payer; a blank one is replaced by the standard explanation.
    pub async fn reject(&self, id: PaymentId, message: String) -> Result<Payment> {
        let offset = self.utc_offset;
        let payment = self
            .orchestrator
            .run_transactional(move |uow| {
                Box::pin(async move {
                    let (payment, course_title, payer) = decide(uow, id, Decision::Reject).await?;
                    uow.on_committed(move |snapshot| {
                        let committed = snapshot.payment(id)?;
                        let payer = recipient(payer, id)?;
                        let message = if message.trim().is_empty() {
                            messages::default_rejection_message(
                                committed,
                                &course_title,
                                &payer,
                                &offset,
                            )
                        } else {
                            message
                        };
                        Some(Notification::Email(messages::rejection_email(
                            &course_title,
                            &payer,
                            &message,
                        )))
                    });
                    Ok(payment)
                })
            })
            .await?;

        info!(payment = %payment.id, user = %payment.user, course = %payment.course, "payment rejected");
        Ok(payment)
    }

    pub async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.orchestrator.ledger().payment(id).await
    }

    /// Payments waiting for review, newest first.
    pub async fn pending(&self, limit: usize, offset: usize) -> Result<Vec<Payment>> {
        self.orchestrator
            .ledger()
            .payments(&[PaymentStatus::Pending], limit, offset)
            .await
    }

    /// Reviewed and refunded payments, newest first.
    pub async fn history(&self, limit: usize, offset: usize) -> Result<Vec<Payment>> {
        self.orchestrator
            .ledger()
            .payments(&PaymentStatus::HISTORY, limit, offset)
            .await
    }

    pub async fn count_pending(&self) -> Result<u64> {
        self.orchestrator
            .ledger()
            .count_payments(&[PaymentStatus::Pending])
            .await
    }

    pub async fn count_history(&self) -> Result<u64> {
        self.orchestrator
            .ledger()
            .count_payments(&PaymentStatus::HISTORY)
            .await
    }
}

/// Loads the payment under its pair lock, applies the decision and stages the
/// update. Returns the updated payment, the course title and the payer.
async fn decide(
    uow: &mut UnitOfWork,
    id: PaymentId,
    decision: Decision,
) -> Result<(Payment, String, Option<User>)> {
    let not_found = || WorkflowError::NotFound(format!("payment {id}"));

    let payment = uow.payment(id).await?.ok_or_else(not_found)?;
    uow.lock_pair(&payment.user, &payment.course).await;
    // Re-read under the lock; a concurrent review may have finished meanwhile.
    let mut payment = uow.payment(id).await?.ok_or_else(not_found)?;

    let now = Utc::now();
    match decision {
        Decision::Accept => payment.accept(now)?,
        Decision::Reject => payment.reject(now)?,
    }
    uow.update_payment(payment.clone(), PaymentStatus::Pending);

    let course_title = uow
        .course(&payment.course)
        .await?
        .map(|c| c.title)
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| payment.course.to_string());
    let payer = uow.user(&payment.user).await?;

    Ok((payment, course_title, payer))
}

fn recipient(payer: Option<User>, id: PaymentId) -> Option<User> {
    match payer {
        Some(user) if !user.email.is_empty() => Some(user),
        _ => {
            warn!(payment = %id, "payer has no email address, skipping notification");
            None
        }
    }
}
