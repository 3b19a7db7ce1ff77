use super::course::{CourseId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A seat held by `user` in `course`. Unique per pair.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Enrollment {
    pub user: UserId,
    pub course: CourseId,
    pub created_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn new(user: UserId, course: CourseId, created_at: DateTime<Utc>) -> Self {
        Self {
            user,
            course,
            created_at,
        }
    }

    pub fn key(&self) -> (UserId, CourseId) {
        (self.user.clone(), self.course.clone())
    }
}
