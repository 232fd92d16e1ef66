//! Declared parameter schemas, checked before anything else runs.

use super::error::EndpointError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    /// Any string, passed through untouched.
    Raw,
    /// Letters, digits, `_` and `-`; must not be empty.
    AlphanumExt,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub required: bool,
}

const fn required(name: &'static str, kind: ParamType) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: ParamType) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
    }
}

pub const SUBMIT_SERIES_FORM: &[ParamSpec] = &[
    required("contextId", ParamType::Int),
    required("instanceId", ParamType::Int),
    required("formDataEncoded", ParamType::Raw),
];

pub const GET_SERIES_TITLES: &[ParamSpec] = &[
    required("contextId", ParamType::Int),
    required("instanceId", ParamType::Int),
    required("seriesIdsJson", ParamType::Raw),
];

pub const IMPORT_SERIES: &[ParamSpec] = &[
    required("contextId", ParamType::Int),
    required("instanceId", ParamType::Int),
    required("seriesId", ParamType::AlphanumExt),
];

pub const SERIES_FORM_CONTENT: &[ParamSpec] = &[
    required("contextId", ParamType::Int),
    required("instanceId", ParamType::Int),
    optional("formDataEncoded", ParamType::Raw),
];

pub const LIST_COURSE_SERIES: &[ParamSpec] = &[
    required("contextId", ParamType::Int),
    required("instanceId", ParamType::Int),
];

pub const SAVE_SERIES_SELECTION: &[ParamSpec] = &[
    required("contextId", ParamType::Int),
    required("instanceId", ParamType::Int),
    required("selection", ParamType::Raw),
];

#[derive(Debug, Default)]
pub struct ValidatedParams {
    ints: BTreeMap<&'static str, i64>,
    strings: BTreeMap<&'static str, String>,
}

impl ValidatedParams {
    pub fn int(&self, name: &str) -> i64 {
        self.ints.get(name).copied().unwrap_or_default()
    }

    pub fn string(&self, name: &str) -> &str {
        self.strings.get(name).map(String::as_str).unwrap_or("")
    }
}

pub fn validate_params(
    schema: &[ParamSpec],
    params: &serde_json::Value,
) -> Result<ValidatedParams, EndpointError> {
    if !params.is_object() && !params.is_null() {
        return Err(EndpointError::invalid("params", "expected an object"));
    }
    let mut out = ValidatedParams::default();
    for spec in schema {
        let value = params.get(spec.name).filter(|v| !v.is_null());
        let Some(value) = value else {
            if spec.required {
                return Err(EndpointError::invalid(spec.name, "missing"));
            }
            if spec.kind != ParamType::Int {
                out.strings.insert(spec.name, String::new());
            }
            continue;
        };
        match spec.kind {
            ParamType::Int => {
                let n = value
                    .as_i64()
                    .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                    .ok_or_else(|| EndpointError::invalid(spec.name, "expected an integer"))?;
                out.ints.insert(spec.name, n);
            }
            ParamType::Raw => {
                let s = value
                    .as_str()
                    .ok_or_else(|| EndpointError::invalid(spec.name, "expected a string"))?;
                out.strings.insert(spec.name, s.to_string());
            }
            ParamType::AlphanumExt => {
                let s = value
                    .as_str()
                    .ok_or_else(|| EndpointError::invalid(spec.name, "expected a string"))?;
                if s.is_empty() {
                    return Err(EndpointError::invalid(spec.name, "must not be empty"));
                }
                if !s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(EndpointError::invalid(
                        spec.name,
                        "only letters, digits, '_' and '-' are allowed",
                    ));
                }
                out.strings.insert(spec.name, s.to_string());
            }
        }
    }
    Ok(out)
}
