//! Domain records and write inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::data::region::Region;

pub const DEFAULT_COUNTRY: &str = "Saudi Arabia";

/// A physical sports venue, hydrated with its type name and sports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Facility {
    pub id: i32,
    pub name: String,
    pub region: Region,
    pub country: String,
    pub address: String,
    pub rating: Option<f64>,
    pub reviews: Option<i32>,
    pub url: Option<String>,
    pub facility_type_id: i32,
    /// Display name of the facility type.
    pub facility_type: String,
    pub ministry_of_sports: bool,
    /// Sorted ascending.
    pub sport_ids: Vec<i32>,
    /// Sport names, sorted alphabetically.
    pub sports: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FacilityType {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Sport {
    pub id: i32,
    pub name: String,
    pub facility_type_id: i32,
    pub facility_type: String,
    pub description: Option<String>,
    /// Facilities offering this sport, derived from the association table.
    pub facility_ids: Vec<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChartTitle {
    pub id: String,
    pub name: String,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Full replacement payload for a facility (create and update share it).
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityInput {
    pub name: String,
    pub region: Region,
    pub country: String,
    pub address: String,
    pub rating: Option<f64>,
    pub reviews: Option<i32>,
    pub url: Option<String>,
    pub facility_type_id: i32,
    pub ministry_of_sports: bool,
    pub sport_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityTypeInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SportInput {
    pub name: String,
    pub facility_type_id: i32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartTitleInput {
    pub name: String,
    pub notes: Option<String>,
}

/// How many rows still reference a facility type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeUsage {
    pub sports: i64,
    pub facilities: i64,
}

impl TypeUsage {
    pub fn is_unused(&self) -> bool {
        self.sports == 0 && self.facilities == 0
    }
}
