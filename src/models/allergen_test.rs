use chrono::{DateTime, Utc};
use serde::Serialize;

use super::enums::AllergenCategory;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllergenTestFields {
    #[serde(rename = "patient")]
    pub patient_id: i64,
    pub allergen_name: String,
    pub category: AllergenCategory,
    pub reaction_level: Option<String>,
    pub custom_size: Option<String>,
    pub test_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllergenTest {
    pub id: i64,
    #[serde(flatten)]
    pub fields: AllergenTestFields,
}
