//! Authorization intake: decodes bracket-indexed multipart fields such as
//! `entries[0].drug_name` and `entries[0].procedures[1].units` into nested
//! drafts.
//!
//! Indices are zero-based and must be contiguous. Entries are counted by
//! looking up `entries[i].drug_name` and procedures by looking up
//! `entries[i].procedures[j].code`; the first missing key ends the sequence.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// One file part of a multipart submission.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A multipart submission flattened into text fields and file parts.
#[derive(Debug, Default)]
pub struct FlatForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl FlatForm {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDraft {
    pub code: String,
    pub units: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub frequency: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub drug_name: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
    pub insurance: Option<String>,
    pub auth_number: Option<String>,
    pub expiration_date: Option<String>,
    pub at_home: bool,
    pub cost_estimate: Option<String>,
    pub visit_history: Option<String>,
    pub icd10_codes: String,
    pub procedure_codes: String,
    pub doc: Option<UploadedFile>,
    pub procedures: Vec<ProcedureDraft>,
}

/// Only these spellings mean "administered at home".
fn truthy(raw: Option<&str>) -> bool {
    matches!(raw, Some("true" | "True" | "1"))
}

pub fn parse_entries(mut form: FlatForm) -> Vec<EntryDraft> {
    let mut entries = Vec::new();

    for i in 0.. {
        let prefix = format!("entries[{i}]");
        let key = |name: &str| format!("{prefix}.{name}");
        let text = |name: &str| form.field(&key(name)).map(str::to_string);

        let Some(drug_name) = text("drug_name") else {
            break;
        };

        let mut procedures = Vec::new();
        for j in 0.. {
            let proc_key = |name: &str| format!("{prefix}.procedures[{j}].{name}");
            let proc_text = |name: &str| form.field(&proc_key(name)).map(str::to_string);
            let Some(code) = proc_text("code") else {
                break;
            };
            procedures.push(ProcedureDraft {
                code,
                units: proc_text("units"),
                start_date: proc_text("start_date"),
                end_date: proc_text("end_date"),
                frequency: proc_text("frequency"),
                description: proc_text("description"),
            });
        }

        let draft = EntryDraft {
            drug_name,
            dose: text("dose"),
            frequency: text("frequency"),
            insurance: text("insurance"),
            auth_number: text("auth_number"),
            expiration_date: text("expiration_date"),
            at_home: truthy(form.field(&key("at_home"))),
            cost_estimate: text("cost_estimate"),
            visit_history: text("visit_history"),
            icd10_codes: text("icd10_codes").unwrap_or_default(),
            procedure_codes: text("procedure_codes").unwrap_or_default(),
            doc: None,
            procedures,
        };
        let doc = form.files.remove(&key("docs"));
        entries.push(EntryDraft { doc, ..draft });
    }

    entries
}

impl EntryDraft {
    /// The JSON object the authorization validator reads. Absent parts stay
    /// absent so the validator reports them.
    pub fn to_payload(&self, patient_id: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("patient".into(), Value::from(patient_id));
        map.insert("drug_name".into(), Value::from(self.drug_name.as_str()));
        put(&mut map, "dose", &self.dose);
        put(&mut map, "frequency", &self.frequency);
        put(&mut map, "insurance", &self.insurance);
        put(&mut map, "auth_number", &self.auth_number);
        put(&mut map, "expiration_date", &self.expiration_date);
        map.insert("at_home".into(), Value::Bool(self.at_home));
        put(&mut map, "cost_estimate", &self.cost_estimate);
        put(&mut map, "visit_history", &self.visit_history);
        map.insert("icd10_codes".into(), Value::from(self.icd10_codes.as_str()));
        map.insert("procedure_codes".into(), Value::from(self.procedure_codes.as_str()));
        map.insert(
            "procedures".into(),
            Value::Array(
                self.procedures
                    .iter()
                    .map(|p| Value::Object(p.to_payload()))
                    .collect(),
            ),
        );
        map
    }
}

impl ProcedureDraft {
    fn to_payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("code".into(), Value::from(self.code.as_str()));
        put(&mut map, "units", &self.units);
        put(&mut map, "start_date", &self.start_date);
        put(&mut map, "end_date", &self.end_date);
        put(&mut map, "frequency", &self.frequency);
        put(&mut map, "description", &self.description);
        map
    }
}

fn put(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        map.insert(key.to_string(), Value::from(v.as_str()));
    }
}
