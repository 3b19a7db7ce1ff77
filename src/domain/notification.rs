use serde::Serialize;

/// A rendered transactional email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Work scheduled after a commit. Delivered best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Message for the internal admin chat channel.
    AdminChat { text: String },
    Email(Email),
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdminChat { .. } => "admin_chat",
            Self::Email(_) => "email",
        }
    }
}
