use crate::domain::course::{Course, User};
use crate::domain::ports::SharedLedger;
use crate::error::Result;
use serde::Deserialize;
use std::io::Read;
use tracing::info;

/// Users and courses the workflow reads from but never writes.
///
/// ```json
/// {
///   "users": [{"id": "u1", "username": "alice", "name": "Alice", "email": "a@example.com"}],
///   "courses": [{"id": "c1", "owner": "u9", "title": "Rust", "price": "1000", "discount": "500"}]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub courses: Vec<Course>,
}

impl Catalog {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    /// Upserts every user and course into the ledger.
    pub async fn seed(self, ledger: &SharedLedger) -> Result<()> {
        let (users, courses) = (self.users.len(), self.courses.len());
        for user in self.users {
            ledger.put_user(user).await?;
        }
        for course in self.courses {
            ledger.put_course(course).await?;
        }
        info!(users, courses, "catalog seeded");
        Ok(())
    }
}
