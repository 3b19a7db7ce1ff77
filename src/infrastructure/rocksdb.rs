use crate::domain::course::{Course, CourseId, User, UserId};
use crate::domain::enrollment::Enrollment;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{ChangeSet, LedgerChange, LedgerStore};
use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Column Family for course catalog entries.
pub const CF_COURSES: &str = "courses";
/// Column Family for users.
pub const CF_USERS: &str = "users";
/// Column Family for payments, keyed by big-endian payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for enrollments, keyed by (user, course).
pub const CF_ENROLLMENTS: &str = "enrollments";
/// Index of pending payments: (user, course) -> payment id.
pub const CF_PENDING: &str = "pending";
/// Column Family for bookkeeping such as the payment id sequence.
pub const CF_META: &str = "meta";

const SEQUENCE_KEY: &[u8] = b"payment_sequence";

/// A persistent ledger using RocksDB.
///
/// Every table lives in its own Column Family. `apply` checks the uniqueness
/// constraints under a commit mutex and writes all changes in one
/// `WriteBatch`, so a change set lands completely or not at all. The checks
/// back up the per-engine pair locks when several engines share one handle.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    commit: Arc<Mutex<()>>,
    sequence: Arc<AtomicU64>,
}

fn pair_key(user: &UserId, course: &CourseId) -> Vec<u8> {
    let mut key = Vec::with_capacity(user.0.len() + course.0.len() + 1);
    key.extend_from_slice(user.0.as_bytes());
    key.push(0);
    key.extend_from_slice(course.0.as_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        WorkflowError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {e}"),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        WorkflowError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {e}"),
        )))
    })
}

impl RocksDbLedger {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all column families exist and restores the payment id
    /// sequence.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_COURSES, CF_USERS, CF_PAYMENTS, CF_ENROLLMENTS, CF_PENDING, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        let ledger = Self {
            db: Arc::new(db),
            commit: Arc::new(Mutex::new(())),
            sequence: Arc::new(AtomicU64::new(0)),
        };

        let last = match ledger.db.get_cf(ledger.cf(CF_META)?, SEQUENCE_KEY)? {
            Some(bytes) => decode::<u64>(&bytes)?,
            None => 0,
        };
        ledger.sequence.store(last, Ordering::SeqCst);
        Ok(ledger)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            WorkflowError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn all<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(decode(&value)?);
        }
        Ok(values)
    }

    fn pending_id(&self, user: &UserId, course: &CourseId) -> Result<Option<PaymentId>> {
        self.get(CF_PENDING, &pair_key(user, course))
    }
}

/// Constraint bookkeeping for one change set, layered over the stored state.
#[derive(Default)]
struct Staging {
    enrollments: HashMap<Vec<u8>, bool>,
    pending: HashMap<Vec<u8>, Option<PaymentId>>,
    payments: HashMap<PaymentId, Payment>,
}

#[async_trait]
impl LedgerStore for RocksDbLedger {
    async fn course(&self, id: &CourseId) -> Result<Option<Course>> {
        self.get(CF_COURSES, id.0.as_bytes())
    }

    async fn user(&self, id: &UserId) -> Result<Option<User>> {
        self.get(CF_USERS, id.0.as_bytes())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get(CF_PAYMENTS, &id.0.to_be_bytes())
    }

    async fn pending_payment(&self, user: &UserId, course: &CourseId) -> Result<Option<Payment>> {
        match self.pending_id(user, course)? {
            Some(id) => self.payment(id).await,
            None => Ok(None),
        }
    }

    async fn is_enrolled(&self, user: &UserId, course: &CourseId) -> Result<bool> {
        let found = self
            .db
            .get_pinned_cf(self.cf(CF_ENROLLMENTS)?, pair_key(user, course))?;
        Ok(found.is_some())
    }

    async fn payments(
        &self,
        statuses: &[PaymentStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Payment>> {
        let mut matching: Vec<Payment> = self
            .all::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| statuses.contains(&p.status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_payments(&self, statuses: &[PaymentStatus]) -> Result<u64> {
        Ok(self
            .all::<Payment>(CF_PAYMENTS)?
            .iter()
            .filter(|p| statuses.contains(&p.status))
            .count() as u64)
    }

    async fn enrollments(&self) -> Result<Vec<Enrollment>> {
        self.all(CF_ENROLLMENTS)
    }

    async fn next_payment_id(&self) -> Result<PaymentId> {
        // Persisted values must never go backwards.
        let _commit = self.commit.lock().await;
        let id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.db.put_cf(self.cf(CF_META)?, SEQUENCE_KEY, encode(&id)?)?;
        Ok(PaymentId(id))
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let _commit = self.commit.lock().await;
        let mut staging = Staging::default();
        let mut batch = WriteBatch::default();

        for change in changes {
            match change {
                LedgerChange::InsertEnrollment(enrollment) => {
                    let key = pair_key(&enrollment.user, &enrollment.course);
                    let exists = match staging.enrollments.get(&key) {
                        Some(staged) => *staged,
                        None => self.is_enrolled(&enrollment.user, &enrollment.course).await?,
                    };
                    if exists {
                        return Err(WorkflowError::Conflict(format!(
                            "user {} is already enrolled in course {}",
                            enrollment.user, enrollment.course
                        )));
                    }
                    batch.put_cf(self.cf(CF_ENROLLMENTS)?, &key, encode(&enrollment)?);
                    staging.enrollments.insert(key, true);
                }
                LedgerChange::InsertPayment(payment) => {
                    let exists = staging.payments.contains_key(&payment.id)
                        || self.payment(payment.id).await?.is_some();
                    if exists {
                        return Err(WorkflowError::Conflict(format!(
                            "payment {} already exists",
                            payment.id
                        )));
                    }
                    let key = pair_key(&payment.user, &payment.course);
                    if payment.is_pending() {
                        let pending = match staging.pending.get(&key) {
                            Some(staged) => *staged,
                            None => self.pending_id(&payment.user, &payment.course)?,
                        };
                        if pending.is_some() {
                            return Err(WorkflowError::Conflict(format!(
                                "user {} already has a pending payment for course {}",
                                payment.user, payment.course
                            )));
                        }
                        batch.put_cf(self.cf(CF_PENDING)?, &key, encode(&payment.id)?);
                        staging.pending.insert(key, Some(payment.id));
                    }
                    batch.put_cf(
                        self.cf(CF_PAYMENTS)?,
                        payment.id.0.to_be_bytes(),
                        encode(&payment)?,
                    );
                    staging.payments.insert(payment.id, payment);
                }
                LedgerChange::UpdatePayment { payment, expected } => {
                    let current = match staging.payments.get(&payment.id) {
                        Some(staged) => Some(staged.clone()),
                        None => self.payment(payment.id).await?,
                    }
                    .ok_or_else(|| WorkflowError::NotFound(format!("payment {}", payment.id)))?;
                    if current.status != expected {
                        return Err(WorkflowError::Conflict(format!(
                            "payment {} is {}, expected {}",
                            payment.id, current.status, expected
                        )));
                    }
                    let key = pair_key(&payment.user, &payment.course);
                    if current.is_pending() && !payment.is_pending() {
                        batch.delete_cf(self.cf(CF_PENDING)?, &key);
                        staging.pending.insert(key, None);
                    }
                    batch.put_cf(
                        self.cf(CF_PAYMENTS)?,
                        payment.id.0.to_be_bytes(),
                        encode(&payment)?,
                    );
                    staging.payments.insert(payment.id, payment);
                }
            }
        }

        self.db.write(batch)?;
        Ok(())
    }

    async fn put_course(&self, course: Course) -> Result<()> {
        self.db
            .put_cf(self.cf(CF_COURSES)?, course.id.0.as_bytes(), encode(&course)?)?;
        Ok(())
    }

    async fn put_user(&self, user: User) -> Result<()> {
        self.db
            .put_cf(self.cf(CF_USERS)?, user.id.0.as_bytes(), encode(&user)?)?;
        Ok(())
    }
}
