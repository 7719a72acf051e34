//! Dashboard aggregation: one fan-out of store queries per filter, reshaped into
//! chart-ready groups.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use ts_rs::TS;

use crate::data::filter::{NormalizedFilter, Page, ResolvedFilter};
use crate::data::models::{Facility, FacilityType, Sport};
use crate::data::region::Region;
use crate::data::store::{FacilityStore, GroupCount, StoreError};
use crate::utils::Timed;

/// Number of sports shown in the "top sports" chart.
pub const TOP_SPORTS: usize = 8;

const SLOW_AGGREGATION: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NamedCount {
    pub id: i32,
    pub name: String,
    #[ts(type = "number")]
    pub count: i64,
    /// `count / total * 100`; `null` when the total is zero.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegionCount {
    pub region: Region,
    pub code: String,
    pub name: String,
    #[ts(type = "number")]
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DashboardStats {
    /// Facilities matching the filter.
    #[ts(type = "number")]
    pub total_facilities: i64,
    /// Distinct sports offered by matching facilities.
    #[ts(type = "number")]
    pub total_sports: i64,
    /// Distinct regions among matching facilities.
    #[ts(type = "number")]
    pub total_regions: i64,
    /// Rounded to one decimal place; `None` when no matching facility is rated.
    pub average_rating: Option<f64>,
    /// Every sport in the catalogue, ignoring the filter.
    #[ts(type = "number")]
    pub catalog_sports: i64,
    #[ts(type = "number")]
    pub catalog_facility_types: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Pagination {
    #[ts(type = "number")]
    pub page: i64,
    #[ts(type = "number")]
    pub limit: i64,
    #[ts(type = "number")]
    pub total: i64,
    #[ts(type = "number")]
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: Page, total: i64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total,
            total_pages: page.total_pages(total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DashboardDebug {
    pub cache_key: String,
    pub generated_at: DateTime<Utc>,
    pub applied_filters: NormalizedFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DashboardResponse {
    pub success: bool,
    pub facility_types: Vec<NamedCount>,
    pub sports: Vec<NamedCount>,
    pub regions: Vec<RegionCount>,
    pub top_sports: Vec<NamedCount>,
    pub stats: DashboardStats,
    pub facilities: Vec<Facility>,
    pub pagination: Pagination,
    pub debug: DashboardDebug,
}

/// Raw query results, before reshaping.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub facilities: Vec<Facility>,
    pub by_facility_type: Vec<GroupCount<i32>>,
    pub by_sport: Vec<GroupCount<i32>>,
    pub by_region: Vec<GroupCount<Region>>,
    pub total: i64,
    pub average_rating: Option<f64>,
    pub facility_types: Vec<FacilityType>,
    pub sports: Vec<Sport>,
}

/// Run every dashboard query for `resolved` concurrently and reshape the results.
pub async fn aggregate(
    store: &dyn FacilityStore,
    resolved: &ResolvedFilter,
    cache_key: String,
) -> Result<DashboardResponse, StoreError> {
    let timed = Timed::start("dashboard aggregation", SLOW_AGGREGATION);
    let filter = &resolved.filter;

    let (
        facilities,
        by_facility_type,
        by_sport,
        by_region,
        total,
        average_rating,
        facility_types,
        sports,
    ) = tokio::try_join!(
        store.list_facilities(filter, resolved.sort(), resolved.page()),
        store.count_by_facility_type(filter),
        store.count_by_sport(filter),
        store.count_by_region(filter),
        store.count_facilities(filter),
        store.average_rating(filter),
        store.list_facility_types(),
        store.list_sports(None),
    )?;

    timed.finish(&cache_key);

    let aggregates = Aggregates {
        facilities,
        by_facility_type,
        by_sport,
        by_region,
        total,
        average_rating,
        facility_types,
        sports,
    };
    Ok(reshape(aggregates, &resolved.normalized, cache_key, Utc::now()))
}

pub fn percentage(count: i64, total: i64) -> f64 {
    count as f64 / total as f64 * 100.0
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn named_counts(
    groups: &[GroupCount<i32>],
    names: &HashMap<i32, &str>,
    total: i64,
) -> Vec<NamedCount> {
    let mut counts: Vec<NamedCount> = groups
        .iter()
        .filter_map(|(id, count)| {
            let name = names.get(id)?;
            Some(NamedCount {
                id: *id,
                name: (*name).to_owned(),
                count: *count,
                percentage: percentage(*count, total),
            })
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    counts
}

/// Translate ids to names, compute percentages and stats.
pub fn reshape(
    aggregates: Aggregates,
    applied: &NormalizedFilter,
    cache_key: String,
    generated_at: DateTime<Utc>,
) -> DashboardResponse {
    let total = aggregates.total;

    let type_names: HashMap<i32, &str> = aggregates
        .facility_types
        .iter()
        .map(|t| (t.id, t.name.as_str()))
        .collect();
    let sport_names: HashMap<i32, &str> = aggregates
        .sports
        .iter()
        .map(|s| (s.id, s.name.as_str()))
        .collect();

    let facility_types = named_counts(&aggregates.by_facility_type, &type_names, total);
    let sports = named_counts(&aggregates.by_sport, &sport_names, total);
    let top_sports: Vec<NamedCount> = sports.iter().take(TOP_SPORTS).cloned().collect();

    let mut regions: Vec<RegionCount> = aggregates
        .by_region
        .iter()
        .map(|(region, count)| RegionCount {
            region: *region,
            code: region.code().to_owned(),
            name: region.display_name().to_owned(),
            count: *count,
            percentage: percentage(*count, total),
        })
        .collect();
    regions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

    let stats = DashboardStats {
        total_facilities: total,
        total_sports: aggregates.by_sport.iter().filter(|(_, c)| *c > 0).count() as i64,
        total_regions: aggregates.by_region.iter().filter(|(_, c)| *c > 0).count() as i64,
        average_rating: aggregates.average_rating.map(round_to_tenth),
        catalog_sports: aggregates.sports.len() as i64,
        catalog_facility_types: aggregates.facility_types.len() as i64,
    };

    DashboardResponse {
        success: true,
        facility_types,
        sports,
        regions,
        top_sports,
        stats,
        facilities: aggregates.facilities,
        pagination: Pagination::new(applied.page, total),
        debug: DashboardDebug {
            cache_key,
            generated_at,
            applied_filters: applied.clone(),
        },
    }
}
