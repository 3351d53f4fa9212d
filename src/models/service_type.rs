use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceTypeFields {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceType {
    pub id: i64,
    #[serde(flatten)]
    pub fields: ServiceTypeFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
