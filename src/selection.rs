//! Table rows and the serialized selection kept in the page's hidden field.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRow {
    #[serde(default)]
    pub series: String,
    #[serde(default)]
    pub seriesname: String,
    #[serde(default, deserialize_with = "de_flag")]
    pub isdefault: i64,
}

impl SeriesRow {
    pub fn new(series: impl Into<String>, seriesname: impl Into<String>, isdefault: i64) -> Self {
        Self {
            series: series.into(),
            seriesname: seriesname.into(),
            isdefault,
        }
    }
}

/// Identifier -> default flag. Rows without an identifier never make it in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionState(pub BTreeMap<String, i64>);

impl SelectionState {
    pub fn from_rows(rows: &[SeriesRow]) -> Self {
        Self(
            rows.iter()
                .filter(|r| !r.series.is_empty())
                .map(|r| (r.series.clone(), r.isdefault))
                .collect(),
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn parse(value: &str) -> Result<Self, serde_json::Error> {
        let rows = parse_hidden_rows(value)?;
        Ok(Self::from_rows(&rows))
    }

    pub fn entries(&self) -> Vec<(String, i64)> {
        self.0.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HiddenValue {
    Rows(Vec<SeriesRow>),
    Mapping(BTreeMap<String, Flag>),
}

#[derive(Deserialize)]
struct Flag(#[serde(deserialize_with = "de_flag")] i64);

/// Insert `row`, or overwrite the row already holding its identifier.
/// Keeps one row per identifier.
pub fn upsert_row(rows: &mut Vec<SeriesRow>, row: SeriesRow) {
    match rows.iter_mut().find(|r| r.series == row.series) {
        Some(existing) => *existing = row,
        None => rows.push(row),
    }
}

/// Rows from a hidden field value. Accepts the mapping this module writes and
/// the row array a page renders on first load; blank means no rows. A repeated
/// identifier keeps its first position and its last values.
pub fn parse_hidden_rows(value: &str) -> Result<Vec<SeriesRow>, serde_json::Error> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }
    Ok(match serde_json::from_str::<HiddenValue>(value)? {
        HiddenValue::Rows(parsed) => {
            let mut rows = Vec::with_capacity(parsed.len());
            for row in parsed {
                upsert_row(&mut rows, row);
            }
            rows
        }
        HiddenValue::Mapping(map) => map
            .into_iter()
            .map(|(series, flag)| SeriesRow::new(series, "", flag.0))
            .collect(),
    })
}

/// Lenient default flag: booleans, numbers and `"0"`/`"1"` style strings.
pub(crate) fn de_flag<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(match v {
        serde_json::Value::Bool(b) => i64::from(b),
        serde_json::Value::Number(n) => i64::from(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        serde_json::Value::String(s) => i64::from(!matches!(s.trim(), "" | "0" | "false")),
        _ => 0,
    })
}
