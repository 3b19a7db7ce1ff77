use super::course::{Course, CourseId, User, UserId};
use super::enrollment::Enrollment;
use super::notification::Email;
use super::payment::{Payment, PaymentId, PaymentStatus};
use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A single write staged by a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerChange {
    InsertEnrollment(Enrollment),
    InsertPayment(Payment),
    /// Replace a payment, provided its stored status still equals `expected`.
    UpdatePayment {
        payment: Payment,
        expected: PaymentStatus,
    },
}

pub type ChangeSet = Vec<LedgerChange>;

/// Durable state of the workflow: courses, users, enrollments and payments.
///
/// `apply` is the only mutation path used by the workflow. It must apply every
/// change or none, and reject with `WorkflowError::Conflict` any change that
/// would create a second enrollment or a second pending payment for the same
/// (user, course) pair, or update a payment whose status moved on.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn course(&self, id: &CourseId) -> Result<Option<Course>>;
    async fn user(&self, id: &UserId) -> Result<Option<User>>;
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn pending_payment(&self, user: &UserId, course: &CourseId) -> Result<Option<Payment>>;
    async fn is_enrolled(&self, user: &UserId, course: &CourseId) -> Result<bool>;
    /// Payments with one of `statuses`, newest first.
    async fn payments(
        &self,
        statuses: &[PaymentStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Payment>>;
    async fn count_payments(&self, statuses: &[PaymentStatus]) -> Result<u64>;
    async fn enrollments(&self) -> Result<Vec<Enrollment>>;
    /// Allocates the next payment id. Ids of rolled back payments are not reused.
    async fn next_payment_id(&self) -> Result<PaymentId>;
    async fn apply(&self, changes: ChangeSet) -> Result<()>;

    // Catalog maintenance, outside the workflow.
    async fn put_course(&self, course: Course) -> Result<()>;
    async fn put_user(&self, user: User) -> Result<()>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> std::result::Result<(), NotifyError>;
}

#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn notify(&self, text: &str) -> std::result::Result<(), NotifyError>;
}

pub type SharedLedger = Arc<dyn LedgerStore>;
pub type SharedMailer = Arc<dyn Mailer>;
pub type SharedChat = Arc<dyn ChatNotifier>;
