use chrono::{DateTime, Utc};

/// Login account. Never serialized: the password hash stays server-side.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
