//! Missed-injections report.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::models::{full_name, LastInjection};

pub const DEFAULT_LOOKBACK_WEEKS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissedInjection {
    pub patient_id: i64,
    pub patient_name: String,
    pub phone: String,
    pub last_injection_date: NaiveDate,
    pub weeks_since_last_injection: i64,
}

/// Patients whose latest injection falls strictly before `today - weeks`.
/// Input order is preserved. A lookback reaching past the calendar's start
/// matches nobody.
pub fn missed_injections(today: NaiveDate, weeks: u32, latest: &[LastInjection]) -> Vec<MissedInjection> {
    let threshold = today
        .checked_sub_signed(Duration::weeks(i64::from(weeks)))
        .unwrap_or(NaiveDate::MIN);

    latest
        .iter()
        .filter(|row| row.last_injection < threshold)
        .map(|row| MissedInjection {
            patient_id: row.patient_id,
            patient_name: full_name(&row.first_name, row.middle_name.as_deref(), &row.last_name),
            phone: row.phone.clone(),
            last_injection_date: row.last_injection,
            weeks_since_last_injection: (today - row.last_injection).num_days().div_euclid(7),
        })
        .collect()
}
