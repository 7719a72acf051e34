//! Row parsing and reporting for batch facility import.
//!
//! The upload endpoint receives rows already extracted from a spreadsheet, so
//! cells arrive loosely typed: numbers as strings, blank cells as `""`, sports
//! as either an array or one comma-separated cell. Each row is decoded and
//! checked on its own; a bad row is reported and skipped, never fatal.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt::Display;
use ts_rs::TS;

use crate::data::json::from_value_with_path;
use crate::data::models::{DEFAULT_COUNTRY, FacilityInput};
use crate::data::region::Region;

pub const MAX_BATCH_ROWS: usize = 5_000;
pub const MAX_REPORTED_ERRORS: usize = 10;

/// One uploaded row, as loosely typed as the spreadsheet it came from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRow {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub reviews: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub facility_type: Option<String>,
    #[serde(default, deserialize_with = "sport_list")]
    pub sports: Vec<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub ministry_of_sports: bool,
}

/// A row that passed shape validation; names are not resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub name: String,
    pub region: Region,
    pub country: String,
    pub address: String,
    pub rating: Option<f64>,
    pub reviews: Option<i32>,
    pub url: Option<String>,
    pub facility_type: String,
    pub sports: Vec<String>,
    pub ministry_of_sports: bool,
}

impl ValidatedRow {
    pub fn into_input(self, facility_type_id: i32, mut sport_ids: Vec<i32>) -> FacilityInput {
        sport_ids.sort_unstable();
        sport_ids.dedup();
        FacilityInput {
            name: self.name,
            region: self.region,
            country: self.country,
            address: self.address,
            rating: self.rating,
            reviews: self.reviews,
            url: self.url,
            facility_type_id,
            ministry_of_sports: self.ministry_of_sports,
            sport_ids,
        }
    }
}

/// Name used to identify a row in error messages.
pub fn row_label(raw: &Value) -> String {
    raw.get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("Unnamed")
        .to_owned()
}

/// Decode and shape-check one raw row.
pub fn parse_row(raw: Value) -> Result<ValidatedRow, String> {
    let row: BatchRow = from_value_with_path(raw)?;
    validate(row)
}

fn required(value: Option<String>, field: &str) -> Result<String, String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing required field '{field}'"))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub fn validate(row: BatchRow) -> Result<ValidatedRow, String> {
    let name = required(row.name, "name")?;
    let region_raw = required(row.region, "region")?;
    let address = required(row.address, "address")?;
    let facility_type = required(row.facility_type, "facilityType")?;

    let region = Region::parse_any(&region_raw).map_err(|e| e.to_string())?;

    let reviews = match row.reviews {
        None => None,
        Some(r) if r.fract() != 0.0 || r < f64::from(i32::MIN) || r > f64::from(i32::MAX) => {
            return Err(format!("reviews must be a whole number, got {r}"));
        }
        Some(r) => Some(r as i32),
    };

    let mut sports: Vec<String> = row
        .sports
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect();
    sports.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

    Ok(ValidatedRow {
        name,
        region,
        country: optional(row.country).unwrap_or_else(|| DEFAULT_COUNTRY.to_owned()),
        address,
        rating: row.rating,
        reviews,
        url: optional(row.url),
        facility_type,
        sports,
        ministry_of_sports: row.ministry_of_sports,
    })
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("number out of range")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("'{s}' is not a number"))),
        Some(other) => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(Value::Number(n)) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "no" | "n" | "0" => Ok(false),
            "true" | "yes" | "y" | "1" => Ok(true),
            _ => Err(D::Error::custom(format!("'{s}' is not a boolean"))),
        },
        Some(other) => Err(D::Error::custom(format!("expected a boolean, got {other}"))),
    }
}

fn sport_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SportList {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Option::<SportList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(SportList::List(list)) => list,
        Some(SportList::Joined(joined)) => joined.split(',').map(str::to_owned).collect(),
    })
}

/// Outcome of a batch import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BatchReport {
    pub successful: usize,
    pub failed: usize,
    /// First [`MAX_REPORTED_ERRORS`] failures, formatted `Row {n} ({name}): {reason}`.
    pub errors: Vec<String>,
    pub created_facility_types: usize,
    pub created_sports: usize,
}

impl BatchReport {
    pub fn record_success(&mut self) {
        self.successful += 1;
    }

    /// `row` is 1-based.
    pub fn record_failure(&mut self, row: usize, label: &str, reason: impl Display) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(format!("Row {row} ({label}): {reason}"));
        }
    }
}
