//! Series metadata form: schema, URL-encoded payload codec and validation.
//!
//! Used on both sides of the wire. The endpoint validates submitted payloads
//! with [`validate`]; the table controller runs [`check_field`] on every input
//! before it serializes a modal form with [`encode_form_body`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const FIELD_COURSE_ID: &str = "courseid";
pub const FIELD_SERIES_ID: &str = "seriesid";
pub const FIELD_TITLE: &str = "title";

/// Key the edit flow uses to ask for a pre-populated form.
pub const EDIT_SERIES_KEY: &str = "series";

const TEXT_MAX_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Hidden,
    Text,
    Textarea,
    Select,
    Autocomplete,
    Datetime,
}

impl FieldType {
    fn is_multi(self) -> bool {
        matches!(self, FieldType::Autocomplete)
    }
}

/// One form field. Metadata catalogs are stored as arrays of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub datatype: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl FieldDef {
    pub fn new(name: &str, datatype: FieldType) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            required: false,
            readonly: false,
            options: BTreeMap::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multi(Vec<String>),
}

impl FieldValue {
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Single(s) => s.trim().is_empty(),
            FieldValue::Multi(v) => v.iter().all(|s| s.trim().is_empty()),
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            FieldValue::Single(s) => Some(s),
            FieldValue::Multi(_) => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Single(s) => serde_json::Value::String(s.trim().to_string()),
            FieldValue::Multi(v) => serde_json::Value::Array(
                v.iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| serde_json::Value::String(s.to_string()))
                    .collect(),
            ),
        }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => FieldValue::Single(s.clone()),
            serde_json::Value::Array(items) => FieldValue::Multi(
                items
                    .iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            serde_json::Value::Null => FieldValue::Single(String::new()),
            other => FieldValue::Single(other.to_string()),
        }
    }
}

pub type RawFields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSchema {
    pub fields: Vec<FieldDef>,
}

impl FormSchema {
    /// Series form for a metadata catalog: the hidden ids, a required title,
    /// then the catalog fields in catalog order.
    pub fn series_form(catalog: &[FieldDef]) -> Self {
        let mut fields = vec![
            FieldDef::new(FIELD_COURSE_ID, FieldType::Hidden),
            FieldDef::new(FIELD_SERIES_ID, FieldType::Hidden),
        ];
        let title = catalog
            .iter()
            .find(|f| f.name == FIELD_TITLE)
            .cloned()
            .map(|mut f| {
                f.required = true;
                f.readonly = false;
                f
            })
            .unwrap_or_else(|| FieldDef::new(FIELD_TITLE, FieldType::Text).required());
        fields.push(title);
        fields.extend(
            catalog
                .iter()
                .filter(|f| {
                    f.name != FIELD_TITLE && f.name != FIELD_COURSE_ID && f.name != FIELD_SERIES_ID
                })
                .cloned(),
        );
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Decode an `application/x-www-form-urlencoded` body. `name[]` keys collect
/// into a multi value; for plain keys the last occurrence wins.
pub fn decode_form_body(encoded: &str) -> RawFields {
    let mut out = RawFields::new();
    for (key, value) in url::form_urlencoded::parse(encoded.trim().as_bytes()) {
        if let Some(name) = key.strip_suffix("[]") {
            match out
                .entry(name.to_string())
                .or_insert_with(|| FieldValue::Multi(Vec::new()))
            {
                FieldValue::Multi(v) => v.push(value.into_owned()),
                single => *single = FieldValue::Multi(vec![value.into_owned()]),
            }
        } else {
            out.insert(key.into_owned(), FieldValue::Single(value.into_owned()));
        }
    }
    out
}

pub fn encode_form_body<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a FieldValue)>,
{
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in values {
        match value {
            FieldValue::Single(s) => {
                ser.append_pair(name, s);
            }
            FieldValue::Multi(items) => {
                let key = format!("{name}[]");
                for item in items {
                    ser.append_pair(&key, item);
                }
            }
        }
    }
    ser.finish()
}

/// Field-level check, the same one the client fires on change.
pub fn check_field(def: &FieldDef, value: Option<&FieldValue>) -> Result<(), String> {
    if def.datatype == FieldType::Hidden || def.readonly {
        return Ok(());
    }
    let blank = value.map(FieldValue::is_blank).unwrap_or(true);
    if blank {
        return if def.required {
            Err("Required".to_string())
        } else {
            Ok(())
        };
    }
    let Some(value) = value else {
        return Ok(());
    };

    if def.datatype.is_multi() {
        return Ok(());
    }
    let Some(s) = value.as_single() else {
        return Err("Expected a single value".to_string());
    };
    let s = s.trim();
    match def.datatype {
        FieldType::Text if s.chars().count() > TEXT_MAX_CHARS => {
            Err(format!("Maximum of {TEXT_MAX_CHARS} characters"))
        }
        FieldType::Select if !def.options.contains_key(s) => Err("Invalid selection".to_string()),
        FieldType::Datetime if !is_valid_datetime(s) => Err("Invalid date".to_string()),
        _ => Ok(()),
    }
}

fn is_valid_datetime(s: &str) -> bool {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || chrono::DateTime::parse_from_rfc3339(s).is_ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub id: String,
    pub value: serde_json::Value,
}

/// Validated form fields in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedData {
    fields: Vec<(String, serde_json::Value)>,
}

impl ValidatedData {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn series_id(&self) -> Option<&str> {
        self.get(FIELD_SERIES_ID)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Every field except the course and series ids.
    pub fn metadata(&self) -> Vec<MetadataEntry> {
        self.fields
            .iter()
            .filter(|(n, _)| n != FIELD_COURSE_ID && n != FIELD_SERIES_ID)
            .map(|(n, v)| MetadataEntry {
                id: n.clone(),
                value: v.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("missing or invalid fields: {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
pub struct FieldErrors(pub BTreeMap<String, String>);

pub fn validate(schema: &FormSchema, raw: &RawFields) -> Result<ValidatedData, FieldErrors> {
    let mut errors = BTreeMap::new();
    let mut fields = Vec::new();
    for def in &schema.fields {
        if def.readonly {
            continue;
        }
        let value = raw.get(&def.name);
        if let Err(msg) = check_field(def, value) {
            errors.insert(def.name.clone(), msg);
            continue;
        }
        let json = match value {
            Some(v) if def.datatype.is_multi() => match v {
                FieldValue::Single(s) => FieldValue::Multi(vec![s.clone()]).to_json(),
                multi => multi.to_json(),
            },
            Some(v) => v.to_json(),
            None if def.datatype.is_multi() => serde_json::Value::Array(Vec::new()),
            None => serde_json::Value::String(String::new()),
        };
        fields.push((def.name.clone(), json));
    }
    if errors.is_empty() {
        Ok(ValidatedData { fields })
    } else {
        Err(FieldErrors(errors))
    }
}

/// Structured modal body: the schema, current values and field errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormContent {
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub values: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

pub fn values_from_metadata(entries: &[MetadataEntry]) -> BTreeMap<String, FieldValue> {
    entries
        .iter()
        .map(|e| (e.id.clone(), FieldValue::from_json(&e.value)))
        .collect()
}
