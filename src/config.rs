use chrono::{FixedOffset, Offset, Utc};
use std::time::Duration;

/// Runtime settings of the workflow, passed explicitly at construction time.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Upper bound on a single unit of work, from begin to commit.
    pub transaction_timeout: Duration,
    /// Per-message delivery timeout of the notification dispatcher.
    pub notify_timeout: Duration,
    /// Capacity of the notification queue. Overflow is dropped with a warning.
    pub notification_queue: usize,
    /// Offset used to print timestamps in emails.
    pub utc_offset: FixedOffset,
}

pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;

pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Outgoing mail relay. Port 465 uses implicit TLS, anything else STARTTLS.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Sender mailbox, e.g. `Course Team <noreply@example.com>`.
    pub from: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(5),
            notification_queue: 256,
            utc_offset: utc_offset_hours(DEFAULT_UTC_OFFSET_HOURS)
                .unwrap_or_else(|| Utc.fix()),
        }
    }
}

/// Builds a fixed offset from whole hours, `None` when out of range.
pub fn utc_offset_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}
