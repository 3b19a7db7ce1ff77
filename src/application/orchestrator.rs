//! Transaction boundary of the workflow.
//!
//! A [`UnitOfWork`] stages writes on top of the committed ledger state and
//! collects post-commit hooks. Dropping it without committing discards
//! everything, which is how errors, panics, timeouts and cancelled requests
//! roll back. [`WorkflowOrchestrator::commit`] applies the staged changes
//! atomically and only then runs the hooks.

use super::locks::{PairGuard, PairLocks};
use super::notifications::NotificationSender;
use crate::config::WorkflowConfig;
use crate::domain::course::{Course, CourseId, User, UserId};
use crate::domain::enrollment::Enrollment;
use crate::domain::notification::Notification;
use crate::domain::payment::{NewPayment, Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{ChangeSet, LedgerChange, SharedLedger};
use crate::error::{Result, WorkflowError};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::debug;

/// Callback fired with the committed snapshot. Returns the notification to
/// schedule, if any.
pub type CommitHook = Box<dyn FnOnce(&CommitSnapshot) -> Option<Notification> + Send + Sync>;

/// What a unit of work wrote, as committed.
#[derive(Debug, Clone, Default)]
pub struct CommitSnapshot {
    pub payments: Vec<Payment>,
    pub enrollments: Vec<Enrollment>,
}

impl CommitSnapshot {
    fn from_changes(changes: &ChangeSet) -> Self {
        let mut snapshot = Self::default();
        for change in changes {
            match change {
                LedgerChange::InsertEnrollment(enrollment) => {
                    snapshot.enrollments.push(enrollment.clone());
                }
                LedgerChange::InsertPayment(payment)
                | LedgerChange::UpdatePayment { payment, .. } => {
                    snapshot.payments.retain(|p| p.id != payment.id);
                    snapshot.payments.push(payment.clone());
                }
            }
        }
        snapshot
    }

    pub fn payment(&self, id: PaymentId) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == id)
    }
}

/// The transaction handle passed to workflow steps.
///
/// Reads see committed ledger state overlaid with this unit's own staged
/// writes (read-committed plus read-your-writes).
pub struct UnitOfWork {
    ledger: SharedLedger,
    locks: PairLocks,
    guards: Vec<PairGuard>,
    changes: ChangeSet,
    hooks: Vec<CommitHook>,
}

impl UnitOfWork {
    fn new(ledger: SharedLedger, locks: PairLocks) -> Self {
        Self {
            ledger,
            locks,
            guards: Vec::new(),
            changes: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Serializes this unit of work with every other one touching the same
    /// (user, course) pair until commit or rollback. Re-entrant.
    pub async fn lock_pair(&mut self, user: &UserId, course: &CourseId) {
        let held = self
            .guards
            .iter()
            .any(|g| &g.key().0 == user && &g.key().1 == course);
        if !held {
            let guard = self.locks.acquire(user, course).await;
            self.guards.push(guard);
        }
    }

    pub async fn course(&self, id: &CourseId) -> Result<Option<Course>> {
        self.ledger.course(id).await
    }

    pub async fn user(&self, id: &UserId) -> Result<Option<User>> {
        self.ledger.user(id).await
    }

    fn staged_payment(&self, id: PaymentId) -> Option<&Payment> {
        self.changes.iter().rev().find_map(|change| match change {
            LedgerChange::InsertPayment(p) | LedgerChange::UpdatePayment { payment: p, .. }
                if p.id == id =>
            {
                Some(p)
            }
            _ => None,
        })
    }

    pub async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        if let Some(staged) = self.staged_payment(id) {
            return Ok(Some(staged.clone()));
        }
        self.ledger.payment(id).await
    }

    pub async fn is_enrolled(&self, user: &UserId, course: &CourseId) -> Result<bool> {
        let staged = self.changes.iter().any(|change| {
            matches!(change, LedgerChange::InsertEnrollment(e) if &e.user == user && &e.course == course)
        });
        if staged {
            return Ok(true);
        }
        self.ledger.is_enrolled(user, course).await
    }

    pub async fn has_pending_payment(&self, user: &UserId, course: &CourseId) -> Result<bool> {
        // Latest staged version of each payment wins over older ones.
        let mut superseded = Vec::new();
        for change in self.changes.iter().rev() {
            if let LedgerChange::InsertPayment(p) | LedgerChange::UpdatePayment { payment: p, .. } =
                change
                && p.is_for(user, course)
                && !superseded.contains(&p.id)
            {
                if p.is_pending() {
                    return Ok(true);
                }
                superseded.push(p.id);
            }
        }
        match self.ledger.pending_payment(user, course).await? {
            Some(committed) => Ok(!superseded.contains(&committed.id)),
            None => Ok(false),
        }
    }

    pub fn insert_enrollment(&mut self, enrollment: Enrollment) {
        self.changes.push(LedgerChange::InsertEnrollment(enrollment));
    }

    /// Stages a new pending payment with a freshly allocated id.
    pub async fn insert_payment(&mut self, new: NewPayment, now: DateTime<Utc>) -> Result<Payment> {
        let id = self.ledger.next_payment_id().await?;
        let payment = Payment::pending(id, new, now);
        self.changes
            .push(LedgerChange::InsertPayment(payment.clone()));
        Ok(payment)
    }

    /// Stages a payment update that only commits if the stored status is
    /// still `expected`.
    pub fn update_payment(&mut self, payment: Payment, expected: PaymentStatus) {
        self.changes
            .push(LedgerChange::UpdatePayment { payment, expected });
    }

    /// Registers a hook that runs only after this unit of work commits.
    pub fn on_committed<F>(&mut self, hook: F)
    where
        F: FnOnce(&CommitSnapshot) -> Option<Notification> + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
    }
}

/// Owns transaction boundaries and the commit / post-commit split. Holds no
/// business rules.
pub struct WorkflowOrchestrator {
    ledger: SharedLedger,
    locks: PairLocks,
    notifications: NotificationSender,
    transaction_timeout: Duration,
}

impl WorkflowOrchestrator {
    pub fn new(ledger: SharedLedger, notifications: NotificationSender, config: &WorkflowConfig) -> Self {
        Self {
            ledger,
            locks: PairLocks::new(),
            notifications,
            transaction_timeout: config.transaction_timeout,
        }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::new(self.ledger.clone(), self.locks.clone())
    }

    /// Runs `f` inside a unit of work and commits it when `f` succeeds.
    ///
    /// An error from `f`, a panic inside it, the transaction timeout, or the
    /// caller dropping this future all discard the staged writes.
    pub async fn run_transactional<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'u> FnOnce(&'u mut UnitOfWork) -> BoxFuture<'u, Result<T>> + Send,
    {
        let mut uow = self.begin();
        let value = match tokio::time::timeout(self.transaction_timeout, f(&mut uow)).await {
            Ok(result) => result?,
            Err(_) => return Err(WorkflowError::Timeout),
        };
        self.commit(uow).await?;
        Ok(value)
    }

    /// Applies the staged changes and schedules the post-commit hooks.
    ///
    /// Runs on a detached task: once called, a cancelled caller can neither
    /// undo the commit nor suppress its notifications. Pair locks are held
    /// until the changes are applied.
    pub async fn commit(&self, uow: UnitOfWork) -> Result<CommitSnapshot> {
        let UnitOfWork {
            guards,
            changes,
            hooks,
            ..
        } = uow;
        if changes.is_empty() && hooks.is_empty() {
            return Ok(CommitSnapshot::default());
        }

        let ledger = self.ledger.clone();
        let notifications = self.notifications.clone();
        let task = tokio::spawn(async move {
            let snapshot = CommitSnapshot::from_changes(&changes);
            if !changes.is_empty() {
                ledger.apply(changes).await?;
            }
            drop(guards);
            debug!(
                payments = snapshot.payments.len(),
                enrollments = snapshot.enrollments.len(),
                "unit of work committed"
            );
            for hook in hooks {
                if let Some(notification) = hook(&snapshot) {
                    notifications.dispatch(notification);
                }
            }
            Ok::<_, WorkflowError>(snapshot)
        });

        task.await
            .map_err(|e| WorkflowError::InternalError(Box::new(e)))?
    }
}
