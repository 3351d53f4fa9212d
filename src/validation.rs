//! Field-level validation of JSON payloads.
//!
//! A [`Form`] reads one object and accumulates every problem it sees instead
//! of stopping at the first. Extractors return `Option<T>`; `None` from a
//! required extractor always means an error was recorded, so builders can
//! read every field first and assemble the record with `?` afterwards.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use crate::db::DatabaseError;

/// Field name to messages. `non_field_errors` holds record-level problems.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const BLANK: &str = "This field may not be blank.";
const BAD_DATE: &str = "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.";
const BAD_DATETIME: &str = "Datetime has wrong format. Use one of these formats instead: \
     YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].";

static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid decimal regex"));
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex")
});

pub fn field_error(field: &str, message: impl Into<String>) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert(field.to_string(), vec![message.into()]);
    errors
}

pub struct Form<'a> {
    data: &'a Map<String, Value>,
    /// Values optional fields fall back to when `data` leaves them out.
    stored: Option<&'a Map<String, Value>>,
    errors: FieldErrors,
}

impl<'a> Form<'a> {
    pub fn new(data: &'a Map<String, Value>) -> Self {
        Self {
            data,
            stored: None,
            errors: FieldErrors::new(),
        }
    }

    /// A full replacement of `stored`: required fields must come from
    /// `data`, optional and defaulted ones keep their stored value unless
    /// `data` names them (an explicit null still clears).
    pub fn over(data: &'a Map<String, Value>, stored: &'a Map<String, Value>) -> Self {
        Self {
            data,
            stored: Some(stored),
            errors: FieldErrors::new(),
        }
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Nest another form's errors under `prefix`, e.g. `procedures[1].code`.
    pub fn absorb(&mut self, prefix: &str, errors: FieldErrors) {
        for (field, messages) in errors {
            self.errors
                .entry(format!("{prefix}.{field}"))
                .or_default()
                .extend(messages);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    fn provided(&self, field: &str) -> Option<&'a Value> {
        self.data
            .get(field)
            .or_else(|| self.stored.and_then(|stored| stored.get(field)))
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        match self.provided(field) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    fn present_non_empty(&self, field: &str) -> Option<&'a Value> {
        match self.present(field) {
            Some(Value::String(s)) if s.is_empty() => None,
            other => other,
        }
    }

    /// Required, must not be blank.
    pub fn required_str(&mut self, field: &str, max_len: usize) -> Option<String> {
        let s = self.text(field, max_len, true)?;
        if s.trim().is_empty() {
            self.error(field, BLANK);
            return None;
        }
        Some(s)
    }

    /// Absent becomes `default`; blank is allowed.
    pub fn blank_str(&mut self, field: &str, max_len: usize, default: &str) -> Option<String> {
        if self.present(field).is_none() {
            return Some(default.to_string());
        }
        self.text(field, max_len, false)
    }

    /// Absent or null becomes `None`.
    pub fn optional_str(&mut self, field: &str, max_len: usize) -> Option<String> {
        self.present(field)?;
        self.text(field, max_len, false)
    }

    fn text(&mut self, field: &str, max_len: usize, required: bool) -> Option<String> {
        let raw = if required {
            self.data.get(field)
        } else {
            self.provided(field)
        };
        let s = match raw {
            None => {
                if required {
                    self.error(field, REQUIRED);
                }
                return None;
            }
            Some(Value::Null) => {
                if required {
                    self.error(field, NOT_NULL);
                }
                return None;
            }
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(_) => {
                self.error(field, "Not a valid string.");
                return None;
            }
        };
        if s.chars().count() > max_len {
            self.error(
                field,
                format!("Ensure this field has no more than {max_len} characters."),
            );
            return None;
        }
        Some(s)
    }

    pub fn optional_email(&mut self, field: &str, max_len: usize) -> Option<String> {
        let s = self.optional_str(field, max_len)?;
        if s.is_empty() {
            return Some(s);
        }
        if !EMAIL_RE.is_match(&s) {
            self.error(field, "Enter a valid email address.");
            return None;
        }
        Some(s)
    }

    pub fn required_date(&mut self, field: &str) -> Option<NaiveDate> {
        match self.data.get(field) {
            None => {
                self.error(field, REQUIRED);
                None
            }
            Some(Value::Null) => {
                self.error(field, NOT_NULL);
                None
            }
            Some(v) => self.date_value(field, v),
        }
    }

    /// Absent, null or empty becomes `None`.
    pub fn optional_date(&mut self, field: &str) -> Option<NaiveDate> {
        let v = self.present_non_empty(field)?;
        self.date_value(field, v)
    }

    fn date_value(&mut self, field: &str, v: &Value) -> Option<NaiveDate> {
        let parsed = v
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());
        if parsed.is_none() {
            self.error(field, BAD_DATE);
        }
        parsed
    }

    /// RFC 3339, or a naive `YYYY-MM-DDTHH:MM[:SS[.f]]` read as UTC. Absent
    /// becomes the current instant.
    pub fn datetime_or_now(&mut self, field: &str) -> Option<DateTime<Utc>> {
        let Some(v) = self.present_non_empty(field) else {
            return Some(Utc::now());
        };
        let parsed = v.as_str().and_then(parse_datetime);
        if parsed.is_none() {
            self.error(field, BAD_DATETIME);
        }
        parsed
    }

    pub fn required_choice<E: FromStr>(&mut self, field: &str) -> Option<E> {
        let raw = match self.data.get(field) {
            None => {
                self.error(field, REQUIRED);
                return None;
            }
            Some(Value::Null) => {
                self.error(field, NOT_NULL);
                return None;
            }
            Some(v) => v,
        };
        let parsed = raw.as_str().and_then(|s| E::from_str(s).ok());
        if parsed.is_none() {
            let shown = raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());
            self.error(field, format!("\"{shown}\" is not a valid choice."));
        }
        parsed
    }

    /// Accepts JSON booleans and the usual form spellings.
    pub fn bool_or(&mut self, field: &str, default: bool) -> Option<bool> {
        let Some(v) = self.present_non_empty(field) else {
            return Some(default);
        };
        let parsed = match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::String(s) => match s.as_str() {
                "true" | "True" | "TRUE" | "1" | "yes" | "on" => Some(true),
                "false" | "False" | "FALSE" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            self.error(field, "Must be a valid boolean.");
        }
        parsed
    }

    pub fn required_pk(&mut self, field: &str) -> Option<i64> {
        match self.data.get(field) {
            None => {
                self.error(field, REQUIRED);
                None
            }
            Some(Value::Null) => {
                self.error(field, NOT_NULL);
                None
            }
            Some(v) => self.pk_value(field, v),
        }
    }

    /// Absent, null or empty becomes `None`.
    pub fn optional_pk(&mut self, field: &str) -> Option<i64> {
        let v = self.present_non_empty(field)?;
        self.pk_value(field, v)
    }

    fn pk_value(&mut self, field: &str, v: &Value) -> Option<i64> {
        let parsed = match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.error(
                field,
                format!("Incorrect type. Expected pk value, received {}.", json_type(v)),
            );
        }
        parsed
    }

    /// Checks that a referenced row exists. Does nothing when `id` is `None`.
    pub fn existing<F>(&mut self, field: &str, id: Option<i64>, exists: F) -> Result<Option<i64>, DatabaseError>
    where
        F: FnOnce(i64) -> Result<bool, DatabaseError>,
    {
        let Some(id) = id else {
            return Ok(None);
        };
        if exists(id)? {
            Ok(Some(id))
        } else {
            self.error(field, format!("Invalid pk \"{id}\" - object does not exist."));
            Ok(None)
        }
    }

    pub fn required_u32(&mut self, field: &str) -> Option<u32> {
        let v = match self.data.get(field) {
            None => {
                self.error(field, REQUIRED);
                return None;
            }
            Some(Value::Null) => {
                self.error(field, NOT_NULL);
                return None;
            }
            Some(v) => v,
        };
        let parsed = match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match parsed {
            None => {
                self.error(field, "A valid integer is required.");
                None
            }
            Some(n) if n < 0 => {
                self.error(field, "Ensure this value is greater than or equal to 0.");
                None
            }
            Some(n) => match u32::try_from(n) {
                Ok(n) => Some(n),
                Err(_) => {
                    self.error(field, "Ensure this value is less than or equal to 4294967295.");
                    None
                }
            },
        }
    }

    /// Decimal kept as its canonical string, e.g. `25.50`.
    pub fn optional_decimal(&mut self, field: &str, max_digits: usize, places: usize) -> Option<String> {
        let v = self.present_non_empty(field)?;
        let raw = match v {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => String::new(),
        };
        if !DECIMAL_RE.is_match(&raw) {
            self.error(field, "A valid number is required.");
            return None;
        }
        let unsigned = raw.trim_start_matches('-');
        let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let whole = whole.trim_start_matches('0');
        let frac = frac.trim_end_matches('0');
        if frac.len() > places {
            self.error(
                field,
                format!("Ensure that there are no more than {places} decimal places."),
            );
            return None;
        }
        if whole.len() > max_digits - places {
            self.error(
                field,
                format!(
                    "Ensure that there are no more than {} digits before the decimal point.",
                    max_digits - places
                ),
            );
            return None;
        }
        let sign = if raw.starts_with('-') { "-" } else { "" };
        let whole = if whole.is_empty() { "0" } else { whole };
        Some(format!("{sign}{whole}.{frac:0<places$}"))
    }

    /// A JSON array of strings; absent becomes empty.
    pub fn string_list(&mut self, field: &str) -> Option<Vec<String>> {
        let Some(v) = self.present(field) else {
            return Some(Vec::new());
        };
        let list = v.as_array().and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        });
        if list.is_none() {
            self.error(field, "Expected a list of strings.");
        }
        list
    }

    /// The raw list of nested objects under `field`.
    pub fn object_list(&mut self, field: &str) -> Option<Vec<&'a Map<String, Value>>> {
        let Some(v) = self.data.get(field).filter(|v| !v.is_null()) else {
            self.error(field, REQUIRED);
            return None;
        };
        let list = v
            .as_array()
            .and_then(|items| items.iter().map(Value::as_object).collect::<Option<Vec<_>>>());
        if list.is_none() {
            self.error(field, "Expected a list of items.");
        }
        list
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Overlay `patch` onto `base`, key by key.
pub fn merge_patch(mut base: Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
    base
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn collects_every_error() {
        let data = obj(json!({"name": "", "dose": 5, "when": "03/02/2024"}));
        let mut form = Form::new(&data);
        assert!(form.required_str("name", 10).is_none());
        assert!(form.required_str("missing", 10).is_none());
        assert_eq!(form.required_str("dose", 10).as_deref(), Some("5"));
        assert!(form.required_date("when").is_none());

        let errors = form.finish().unwrap_err();
        assert_eq!(errors["name"], vec![BLANK]);
        assert_eq!(errors["missing"], vec![REQUIRED]);
        assert_eq!(errors["when"], vec![BAD_DATE]);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn max_length_counts_characters() {
        let data = obj(json!({"code": "ÄÄÄ", "long": "abcdef"}));
        let mut form = Form::new(&data);
        assert!(form.required_str("code", 3).is_some());
        assert!(form.required_str("long", 5).is_none());
        assert!(form.finish().unwrap_err()["long"][0].contains("no more than 5"));
    }

    #[test]
    fn blank_and_optional_strings() {
        let data = obj(json!({"blank": "", "nothing": null}));
        let mut form = Form::new(&data);
        assert_eq!(form.blank_str("blank", 10, "x").as_deref(), Some(""));
        assert_eq!(form.blank_str("absent", 10, "").as_deref(), Some(""));
        assert_eq!(form.optional_str("nothing", 10), None);
        assert!(form.finish().is_ok());
    }

    #[test]
    fn choices_report_the_rejected_value() {
        use crate::models::enums::Arm;
        let data = obj(json!({"arm": "X"}));
        let mut form = Form::new(&data);
        assert!(form.required_choice::<Arm>("arm").is_none());
        assert_eq!(form.finish().unwrap_err()["arm"], vec!["\"X\" is not a valid choice."]);
    }

    #[test]
    fn booleans_accept_form_spellings() {
        let data = obj(json!({"a": "True", "b": 0, "c": "maybe"}));
        let mut form = Form::new(&data);
        assert_eq!(form.bool_or("a", false), Some(true));
        assert_eq!(form.bool_or("b", true), Some(false));
        assert_eq!(form.bool_or("absent", true), Some(true));
        assert_eq!(form.bool_or("c", false), None);
        assert!(form.finish().is_err());
    }

    #[test]
    fn units_must_be_non_negative() {
        let data = obj(json!({"a": "4", "b": -1, "c": "four"}));
        let mut form = Form::new(&data);
        assert_eq!(form.required_u32("a"), Some(4));
        assert_eq!(form.required_u32("b"), None);
        assert_eq!(form.required_u32("c"), None);
        let errors = form.finish().unwrap_err();
        assert_eq!(errors["b"], vec!["Ensure this value is greater than or equal to 0."]);
        assert_eq!(errors["c"], vec!["A valid integer is required."]);
    }

    #[test]
    fn decimal_is_normalized_and_bounded() {
        let data = obj(json!({"a": 25.5, "b": "1.234", "c": "123456789", "d": "abc"}));
        let mut form = Form::new(&data);
        assert_eq!(form.optional_decimal("a", 10, 2).as_deref(), Some("25.50"));
        assert_eq!(form.optional_decimal("b", 10, 2), None);
        assert_eq!(form.optional_decimal("c", 10, 2), None);
        assert_eq!(form.optional_decimal("d", 10, 2), None);
        assert_eq!(form.optional_decimal("absent", 10, 2), None);
        assert_eq!(form.finish().unwrap_err().len(), 3);
    }

    #[test]
    fn datetimes_accept_naive_and_offset_forms() {
        let data = obj(json!({"a": "2024-04-02T10:30:00Z", "b": "2024-04-02T10:30", "c": "yesterday"}));
        let mut form = Form::new(&data);
        let a = form.datetime_or_now("a").unwrap();
        let b = form.datetime_or_now("b").unwrap();
        assert_eq!(a, b);
        assert!(form.datetime_or_now("c").is_none());
        assert!(form.datetime_or_now("absent").is_some());
    }

    #[test]
    fn existence_check_reports_missing_pk() {
        let data = obj(json!({"patient": 7}));
        let mut form = Form::new(&data);
        let id = form.required_pk("patient");
        let checked = form.existing("patient", id, |_| Ok(false)).unwrap();
        assert!(checked.is_none());
        assert_eq!(
            form.finish().unwrap_err()["patient"],
            vec!["Invalid pk \"7\" - object does not exist."]
        );
    }

    #[test]
    fn absorbed_errors_are_prefixed() {
        let data = Map::new();
        let mut form = Form::new(&data);
        form.absorb("procedures[1]", field_error("code", REQUIRED));
        assert!(form.finish().unwrap_err().contains_key("procedures[1].code"));
    }

    #[test]
    fn replacement_keeps_stored_optionals_but_not_required() {
        let stored = obj(json!({
            "name": "Old", "note": "kept", "label": "x", "tags": ["a"],
            "when": "2024-04-02T10:30:00Z", "active": false, "gone": "old"
        }));
        let data = obj(json!({"gone": null}));
        let mut form = Form::over(&data, &stored);
        assert!(form.required_str("name", 10).is_none());
        assert_eq!(form.optional_str("note", 10).as_deref(), Some("kept"));
        assert_eq!(form.blank_str("label", 10, "").as_deref(), Some("x"));
        assert_eq!(form.string_list("tags"), Some(vec!["a".to_string()]));
        assert_eq!(form.datetime_or_now("when").unwrap().to_rfc3339(), "2024-04-02T10:30:00+00:00");
        assert_eq!(form.bool_or("active", true), Some(false));
        assert_eq!(form.optional_str("gone", 10), None);

        let errors = form.finish().unwrap_err();
        assert_eq!(errors["name"], vec![REQUIRED]);
        assert_eq!(errors.len(), 1);
    }
}
