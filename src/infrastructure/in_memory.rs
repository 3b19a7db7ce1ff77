use crate::domain::course::{Course, CourseId, User, UserId};
use crate::domain::enrollment::Enrollment;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{ChangeSet, LedgerChange, LedgerStore};
use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

type PairKey = (UserId, CourseId);

#[derive(Default)]
struct LedgerState {
    courses: HashMap<CourseId, Course>,
    users: HashMap<UserId, User>,
    payments: BTreeMap<PaymentId, Payment>,
    enrollments: BTreeMap<PairKey, Enrollment>,
    /// The single pending payment of each pair, kept in step with `payments`.
    pending: HashMap<PairKey, PaymentId>,
}

/// Inverse of an applied change, used to unwind a partially applied set.
enum Undo {
    RemoveEnrollment(PairKey),
    RemovePayment(PaymentId),
    RestorePayment(Payment),
}

impl LedgerState {
    fn pending_payment(&self, user: &UserId, course: &CourseId) -> Option<&Payment> {
        self.pending
            .get(&(user.clone(), course.clone()))
            .and_then(|id| self.payments.get(id))
    }

    fn put_payment(&mut self, payment: Payment) -> Option<Payment> {
        let key = (payment.user.clone(), payment.course.clone());
        if payment.is_pending() {
            self.pending.insert(key, payment.id);
        } else if self.pending.get(&key) == Some(&payment.id) {
            self.pending.remove(&key);
        }
        self.payments.insert(payment.id, payment)
    }

    fn take_payment(&mut self, id: PaymentId) -> Option<Payment> {
        let payment = self.payments.remove(&id)?;
        let key = (payment.user.clone(), payment.course.clone());
        if self.pending.get(&key) == Some(&id) {
            self.pending.remove(&key);
        }
        Some(payment)
    }

    fn apply_change(&mut self, change: LedgerChange) -> Result<Undo> {
        match change {
            LedgerChange::InsertEnrollment(enrollment) => {
                let key = enrollment.key();
                if self.enrollments.contains_key(&key) {
                    return Err(WorkflowError::Conflict(format!(
                        "user {} is already enrolled in course {}",
                        key.0, key.1
                    )));
                }
                self.enrollments.insert(key.clone(), enrollment);
                Ok(Undo::RemoveEnrollment(key))
            }
            LedgerChange::InsertPayment(payment) => {
                if self.payments.contains_key(&payment.id) {
                    return Err(WorkflowError::Conflict(format!(
                        "payment {} already exists",
                        payment.id
                    )));
                }
                if payment.is_pending()
                    && self.pending_payment(&payment.user, &payment.course).is_some()
                {
                    return Err(WorkflowError::Conflict(format!(
                        "user {} already has a pending payment for course {}",
                        payment.user, payment.course
                    )));
                }
                let id = payment.id;
                self.put_payment(payment);
                Ok(Undo::RemovePayment(id))
            }
            LedgerChange::UpdatePayment { payment, expected } => {
                let current = self
                    .payments
                    .get(&payment.id)
                    .ok_or_else(|| WorkflowError::NotFound(format!("payment {}", payment.id)))?;
                if current.status != expected {
                    return Err(WorkflowError::Conflict(format!(
                        "payment {} is {}, expected {}",
                        payment.id, current.status, expected
                    )));
                }
                match self.put_payment(payment) {
                    Some(previous) => Ok(Undo::RestorePayment(previous)),
                    None => Err(WorkflowError::TransactionError(
                        "payment vanished during update".to_string(),
                    )),
                }
            }
        }
    }

    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::RemoveEnrollment(key) => {
                self.enrollments.remove(&key);
            }
            Undo::RemovePayment(id) => {
                self.take_payment(id);
            }
            Undo::RestorePayment(payment) => {
                self.put_payment(payment);
            }
        }
    }
}

/// A thread-safe in-memory ledger.
///
/// Uses `Arc<RwLock<..>>` so clones share the same state. `apply` holds the
/// write lock for the whole change set and unwinds already applied changes
/// when a later one violates a constraint.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn course(&self, id: &CourseId) -> Result<Option<Course>> {
        let state = self.state.read().await;
        Ok(state.courses.get(id).cloned())
    }

    async fn user(&self, id: &UserId) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(id).cloned())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.get(&id).cloned())
    }

    async fn pending_payment(&self, user: &UserId, course: &CourseId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.pending_payment(user, course).cloned())
    }

    async fn is_enrolled(&self, user: &UserId, course: &CourseId) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .enrollments
            .contains_key(&(user.clone(), course.clone())))
    }

    async fn payments(
        &self,
        statuses: &[PaymentStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let mut matching: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| statuses.contains(&p.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_payments(&self, statuses: &[PaymentStatus]) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .filter(|p| statuses.contains(&p.status))
            .count() as u64)
    }

    async fn enrollments(&self) -> Result<Vec<Enrollment>> {
        let state = self.state.read().await;
        Ok(state.enrollments.values().cloned().collect())
    }

    async fn next_payment_id(&self) -> Result<PaymentId> {
        Ok(PaymentId(self.sequence.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut state = self.state.write().await;
        let mut applied = Vec::with_capacity(changes.len());
        for change in changes {
            match state.apply_change(change) {
                Ok(undo) => applied.push(undo),
                Err(e) => {
                    for undo in applied.into_iter().rev() {
                        state.revert(undo);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn put_course(&self, course: Course) -> Result<()> {
        let mut state = self.state.write().await;
        state.courses.insert(course.id.clone(), course);
        Ok(())
    }

    async fn put_user(&self, user: User) -> Result<()> {
        let mut state = self.state.write().await;
        state.users.insert(user.id.clone(), user);
        Ok(())
    }
}
