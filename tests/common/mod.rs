#![allow(dead_code)]

use async_trait::async_trait;
use coursepay::application::engine::{EnrollmentEngine, WorkflowDeps};
use coursepay::application::enrollment::EnrollmentRequest;
use coursepay::config::WorkflowConfig;
use coursepay::domain::course::{Course, CourseId, User, UserId};
use coursepay::domain::enrollment::Enrollment;
use coursepay::domain::money::Price;
use coursepay::domain::notification::Email;
use coursepay::domain::payment::{Payment, PaymentId, PaymentStatus};
use coursepay::domain::ports::{
    ChangeSet, ChatNotifier, LedgerStore, Mailer, SharedChat, SharedLedger, SharedMailer,
};
use coursepay::error::{NotifyError, Result, WorkflowError};
use coursepay::infrastructure::in_memory::InMemoryLedger;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PAID: &str = "rust-101";
pub const FREE: &str = "intro";
pub const FULL_PRICE: &str = "async-deep-dive";
pub const OWNER: &str = "instructor";

pub fn users() -> Vec<User> {
    ["alice", "bob", "carol", OWNER]
        .into_iter()
        .map(|name| User {
            id: name.into(),
            username: name.to_string(),
            name: name.to_uppercase(),
            email: format!("{name}@example.com"),
        })
        .chain(std::iter::once(User {
            id: "mute".into(),
            username: "mute".to_string(),
            name: String::new(),
            email: String::new(),
        }))
        .collect()
}

pub fn courses() -> Vec<Course> {
    vec![
        Course {
            id: PAID.into(),
            owner: OWNER.into(),
            title: "Rust 101".to_string(),
            price: Price::new(dec!(1000)).unwrap(),
            discount: Some(Price::new(dec!(500)).unwrap()),
        },
        Course {
            id: FREE.into(),
            owner: OWNER.into(),
            title: "Intro".to_string(),
            price: Price::ZERO,
            discount: None,
        },
        Course {
            id: FULL_PRICE.into(),
            owner: OWNER.into(),
            title: "Async Deep Dive".to_string(),
            price: Price::new(dec!(250)).unwrap(),
            discount: None,
        },
    ]
}

pub async fn seeded_ledger() -> InMemoryLedger {
    let ledger = InMemoryLedger::new();
    for user in users() {
        ledger.put_user(user).await.unwrap();
    }
    for course in courses() {
        ledger.put_course(course).await.unwrap();
    }
    ledger
}

pub fn engine_with(
    ledger: SharedLedger,
    mailer: SharedMailer,
    chat: SharedChat,
    config: WorkflowConfig,
) -> EnrollmentEngine {
    EnrollmentEngine::new(WorkflowDeps {
        ledger,
        mailer,
        chat,
        config,
    })
}

/// Engine over a seeded in-memory ledger with recording notifiers.
pub async fn recording_engine() -> (EnrollmentEngine, Arc<RecordingMailer>, Arc<RecordingChat>) {
    let mailer = Arc::new(RecordingMailer::default());
    let chat = Arc::new(RecordingChat::default());
    let engine = engine_with(
        Arc::new(seeded_ledger().await),
        mailer.clone(),
        chat.clone(),
        WorkflowConfig::default(),
    );
    (engine, mailer, chat)
}

pub fn paid_request(user: &str, course: &str, price: Decimal) -> EnrollmentRequest {
    EnrollmentRequest {
        user: user.into(),
        course: course.into(),
        price,
        evidence: Some(format!("https://cdn.example.com/slips/{user}-{course}.jpg")),
    }
}

pub fn free_request(user: &str, course: &str) -> EnrollmentRequest {
    EnrollmentRequest {
        user: user.into(),
        course: course.into(),
        price: Decimal::ZERO,
        evidence: None,
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    pub fn emails(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> std::result::Result<(), NotifyError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingChat {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatNotifier for RecordingChat {
    async fn notify(&self, text: &str) -> std::result::Result<(), NotifyError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// A notifier whose every delivery fails.
pub struct Unreachable;

#[async_trait]
impl Mailer for Unreachable {
    async fn send(&self, _email: &Email) -> std::result::Result<(), NotifyError> {
        Err(NotifyError::Rejected("smtp relay unreachable".to_string()))
    }
}

#[async_trait]
impl ChatNotifier for Unreachable {
    async fn notify(&self, _text: &str) -> std::result::Result<(), NotifyError> {
        Err(NotifyError::Status(503))
    }
}

/// A notifier that never answers in time.
pub struct Hanging;

#[async_trait]
impl Mailer for Hanging {
    async fn send(&self, _email: &Email) -> std::result::Result<(), NotifyError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[async_trait]
impl ChatNotifier for Hanging {
    async fn notify(&self, _text: &str) -> std::result::Result<(), NotifyError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Every `apply` fails, as if the store went away mid-request.
    ApplyFails,
    /// Course lookups stall for the given duration.
    SlowReads(Duration),
    /// Every `apply` stalls for the given duration, then goes through.
    SlowApply(Duration),
}

/// Wraps an in-memory ledger and injects a storage fault.
pub struct FaultyLedger {
    pub inner: InMemoryLedger,
    pub fault: Fault,
}

#[async_trait]
impl LedgerStore for FaultyLedger {
    async fn course(&self, id: &CourseId) -> Result<Option<Course>> {
        if let Fault::SlowReads(delay) = self.fault {
            tokio::time::sleep(delay).await;
        }
        self.inner.course(id).await
    }

    async fn user(&self, id: &UserId) -> Result<Option<User>> {
        self.inner.user(id).await
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.inner.payment(id).await
    }

    async fn pending_payment(&self, user: &UserId, course: &CourseId) -> Result<Option<Payment>> {
        self.inner.pending_payment(user, course).await
    }

    async fn is_enrolled(&self, user: &UserId, course: &CourseId) -> Result<bool> {
        self.inner.is_enrolled(user, course).await
    }

    async fn payments(
        &self,
        statuses: &[PaymentStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Payment>> {
        self.inner.payments(statuses, limit, offset).await
    }

    async fn count_payments(&self, statuses: &[PaymentStatus]) -> Result<u64> {
        self.inner.count_payments(statuses).await
    }

    async fn enrollments(&self) -> Result<Vec<Enrollment>> {
        self.inner.enrollments().await
    }

    async fn next_payment_id(&self) -> Result<PaymentId> {
        self.inner.next_payment_id().await
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        match self.fault {
            Fault::ApplyFails => Err(WorkflowError::TransactionError(
                "storage unavailable".to_string(),
            )),
            Fault::SlowReads(_) => self.inner.apply(changes).await,
            Fault::SlowApply(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.apply(changes).await
            }
        }
    }

    async fn put_course(&self, course: Course) -> Result<()> {
        self.inner.put_course(course).await
    }

    async fn put_user(&self, user: User) -> Result<()> {
        self.inner.put_user(user).await
    }
}

/// Writes the catalog used by the CLI tests.
pub fn write_catalog(path: &Path) -> std::result::Result<(), Error> {
    let catalog = serde_json::json!({
        "users": users(),
        "courses": courses(),
    });
    serde_json::to_writer_pretty(File::create(path)?, &catalog)?;
    Ok(())
}

/// Writes a random mix of enroll, accept and reject commands over the seeded
/// users and courses. Payment ids referenced by reviews may not exist.
pub fn generate_commands_csv(path: &Path, rows: usize) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    let mut rng = rand::thread_rng();

    let buyers = ["alice", "bob", "carol", "mute"];
    let catalog = [PAID, FREE, FULL_PRICE];

    wtr.write_record(["type", "user", "course", "payment", "price", "evidence", "message"])?;

    for _ in 0..rows {
        let payment = rng.gen_range(1..=(rows as u64).max(1)).to_string();
        match rng.gen_range(0..10) {
            0..=5 => {
                let user = buyers[rng.gen_range(0..buyers.len())];
                let course = catalog[rng.gen_range(0..catalog.len())];
                let price = rng.gen_range(0..=1000).to_string();
                let evidence = if rng.gen_bool(0.9) {
                    format!("https://cdn.example.com/{user}.jpg")
                } else {
                    String::new()
                };
                wtr.write_record(["enroll", user, course, "", &price, &evidence, ""])?;
            }
            6..=8 => wtr.write_record(["accept", "", "", &payment, "", "", ""])?,
            _ => wtr.write_record(["reject", "", "", &payment, "", "", "Blurry slip"])?,
        }
    }

    wtr.flush()?;
    Ok(())
}
