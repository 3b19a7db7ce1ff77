use crate::application::engine::WorkflowCommand;
use crate::application::enrollment::EnrollmentRequest;
use crate::domain::course::{CourseId, UserId};
use crate::domain::payment::PaymentId;
use crate::error::{Result, WorkflowError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Enroll,
    Accept,
    Reject,
}

/// One row of a command file: `type, user, course, payment, price, evidence, message`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRecord {
    pub r#type: CommandType,
    #[serde(default)]
    pub user: Option<UserId>,
    #[serde(default)]
    pub course: Option<CourseId>,
    #[serde(default)]
    pub payment: Option<PaymentId>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn required<T>(value: Option<T>, field: &str, kind: &str) -> Result<T> {
    value.ok_or_else(|| WorkflowError::ValidationError(format!("{kind} command requires `{field}`")))
}

impl TryFrom<CommandRecord> for WorkflowCommand {
    type Error = WorkflowError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        match record.r#type {
            CommandType::Enroll => Ok(Self::Enroll(EnrollmentRequest {
                user: required(record.user, "user", "enroll")?,
                course: required(record.course, "course", "enroll")?,
                price: record.price.unwrap_or(Decimal::ZERO),
                evidence: record.evidence,
            })),
            CommandType::Accept => Ok(Self::Accept(required(record.payment, "payment", "accept")?)),
            CommandType::Reject => Ok(Self::Reject {
                payment: required(record.payment, "payment", "reject")?,
                message: record.message.unwrap_or_default(),
            }),
        }
    }
}

/// Reads workflow commands from a CSV source.
///
/// Wraps `csv::Reader`, trimming whitespace and accepting short rows, and
/// yields one `Result<WorkflowCommand>` per row.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads, deserializes and validates commands.
    pub fn commands(self) -> impl Iterator<Item = Result<WorkflowCommand>> {
        self.reader.into_deserialize().map(|result| {
            let record: CommandRecord = result.map_err(WorkflowError::from)?;
            WorkflowCommand::try_from(record)
        })
    }
}
