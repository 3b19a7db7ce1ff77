use super::course::{CourseId, UserId};
use super::money::Price;
use crate::error::WorkflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub u64);

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Accepted,
    Rejected,
    /// Set out-of-band; never produced by the review workflow.
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Accepted, Self::Rejected, Self::Refunded];
    /// Statuses shown in the admin payment history.
    pub const HISTORY: [Self; 3] = [Self::Accepted, Self::Rejected, Self::Refunded];
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// A manually reviewed payment backing an enrollment request.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub user: UserId,
    pub course: CourseId,
    /// Amount the buyer says they paid.
    pub price: Price,
    /// Effective course price at the time of submission.
    pub original_price: Price,
    /// Reference to the uploaded proof-of-payment image.
    pub evidence: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: Option<DateTime<Utc>>,
}

/// Fields supplied by the enrollment service for a new payment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub user: UserId,
    pub course: CourseId,
    pub price: Price,
    pub original_price: Price,
    pub evidence: String,
}

impl Payment {
    pub fn pending(id: PaymentId, new: NewPayment, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user: new.user,
            course: new.course,
            price: new.price,
            original_price: new.original_price,
            evidence: new.evidence,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            status_changed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    pub fn is_for(&self, user: &UserId, course: &CourseId) -> bool {
        &self.user == user && &self.course == course
    }

    /// Pending -> Accepted
    pub fn accept(&mut self, at: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.transition(PaymentStatus::Accepted, at)
    }

    /// Pending -> Rejected
    pub fn reject(&mut self, at: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.transition(PaymentStatus::Rejected, at)
    }

    fn transition(&mut self, to: PaymentStatus, at: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.status != PaymentStatus::Pending {
            return Err(WorkflowError::NotPending {
                id: self.id,
                status: self.status,
            });
        }
        self.status = to;
        self.updated_at = at;
        self.status_changed_at = Some(at);
        Ok(())
    }
}
