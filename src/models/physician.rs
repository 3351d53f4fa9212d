use chrono::{DateTime, Utc};
use serde::Serialize;

use super::enums::Degree;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicianFields {
    pub name: String,
    pub degree: Degree,
}

#[derive(Debug, Clone, Serialize)]
pub struct Physician {
    pub id: i64,
    #[serde(rename = "user")]
    pub user_id: i64,
    #[serde(flatten)]
    pub fields: PhysicianFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
