use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimal account record owning a preferences row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}
