#[derive(Debug, Default)]
pub struct VialFilter {
    pub patient_id: Option<i64>,
}

/// Templates are owned by vials, so the patient filter walks through them.
#[derive(Debug, Default)]
pub struct AllergyTemplateFilter {
    pub patient_id: Option<i64>,
}
