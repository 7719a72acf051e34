//! Translation of request query parameters into a facility filter.
//!
//! Every endpoint that narrows the facility collection goes through the same
//! three steps:
//!
//! 1. [`FilterParams::normalize`] validates the raw strings (region codes, sort
//!    fields, id lists) and canonicalizes list parameters (split on commas,
//!    trimmed, lowercased, sorted, deduplicated). The result,
//!    [`NormalizedFilter`], doubles as the dashboard cache key.
//! 2. [`resolve`] looks sport and facility-type names up in the store.
//! 3. [`NormalizedFilter::build`] produces a [`FacilityFilter`]: a conjunction of
//!    [`Condition`]s. A name list that resolves to nothing becomes
//!    [`Condition::Never`] so the filter matches no rows instead of being ignored.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::data::models::Facility;
use crate::data::region::{Region, UnknownRegion};
use crate::data::store::{FacilityStore, StoreError};

/// Default and maximum page size for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl PageLimits {
    /// The dashboard map plots every matching facility at once.
    pub const DASHBOARD: PageLimits = PageLimits {
        default_limit: 10_000,
        max_limit: 10_000,
    };
    pub const FACILITY_LIST: PageLimits = PageLimits {
        default_limit: 50,
        max_limit: 1_000,
    };
}

/// Raw, unvalidated filter parameters as they arrive on the query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterParams {
    pub region: Option<String>,
    pub sports: Vec<String>,
    pub facility_types: Vec<String>,
    pub location_types: Vec<String>,
    pub ministry_of_sports: bool,
    pub search: Option<String>,
    pub facility_type_id: Option<i32>,
    pub sport_ids: Vec<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error(transparent)]
    InvalidRegion(#[from] UnknownRegion),
    #[error("unknown sort field '{0}'")]
    InvalidSortField(String),
    #[error("sort order must be 'asc' or 'desc', got '{0}'")]
    InvalidSortOrder(String),
    #[error("malformed identifier '{0}'")]
    InvalidId(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum SortColumn {
    Name,
    Region,
    Rating,
    Reviews,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortColumn {
    /// Accepts `createdAt`, `created_at` and `createdat` alike.
    pub fn parse(input: &str) -> Option<SortColumn> {
        let key: String = input
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "name" => Some(SortColumn::Name),
            "region" => Some(SortColumn::Region),
            "rating" => Some(SortColumn::Rating),
            "reviews" => Some(SortColumn::Reviews),
            "createdat" => Some(SortColumn::CreatedAt),
            "updatedat" => Some(SortColumn::UpdatedAt),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SortColumn::Name => "name",
            SortColumn::Region => "region",
            SortColumn::Rating => "rating",
            SortColumn::Reviews => "reviews",
            SortColumn::CreatedAt => "createdAt",
            SortColumn::UpdatedAt => "updatedAt",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(input: &str) -> Option<SortDirection> {
        match input.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, TS)]
#[ts(export)]
pub struct Sort {
    pub column: SortColumn,
    pub direction: SortDirection,
}

/// 1-indexed page with a clamped page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[ts(export)]
pub struct Page {
    #[ts(type = "number")]
    pub page: i64,
    #[ts(type = "number")]
    pub limit: i64,
}

impl Page {
    pub fn new(page: Option<i64>, limit: Option<i64>, limits: PageLimits) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(limits.default_limit)
                .clamp(1, limits.max_limit),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.limit - 1) / self.limit
        }
    }
}

/// Validated, canonical form of [`FilterParams`].
///
/// Two logically equal parameter sets (same sports in a different order, mixed
/// case, comma-joined vs. repeated) normalize to equal values and therefore
/// to the same [`cache_key`](NormalizedFilter::cache_key).
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NormalizedFilter {
    pub region: Option<Region>,
    pub sports: Vec<String>,
    pub facility_types: Vec<String>,
    pub location_types: Vec<String>,
    pub ministry_of_sports: bool,
    pub search: Option<String>,
    pub facility_type_id: Option<i32>,
    pub sport_ids: Vec<i32>,
    pub page: Page,
    pub sort: Sort,
}

impl FilterParams {
    pub fn normalize(&self, limits: PageLimits) -> Result<NormalizedFilter, FilterError> {
        let region = match self.region.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(code) => Some(Region::parse_any(code)?),
        };

        let column = match self.sort_by.as_deref().map(str::trim) {
            None | Some("") => SortColumn::default(),
            Some(field) => SortColumn::parse(field)
                .ok_or_else(|| FilterError::InvalidSortField(field.to_owned()))?,
        };
        let direction = match self.sort_order.as_deref().map(str::trim) {
            None | Some("") => SortDirection::default(),
            Some(order) => SortDirection::parse(order)
                .ok_or_else(|| FilterError::InvalidSortOrder(order.to_owned()))?,
        };

        let mut sport_ids = split_list(&self.sport_ids)
            .map(|raw| {
                raw.parse::<i32>()
                    .map_err(|_| FilterError::InvalidId(raw.to_owned()))
            })
            .collect::<Result<Vec<i32>, _>>()?;
        sport_ids.sort_unstable();
        sport_ids.dedup();

        let search = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        Ok(NormalizedFilter {
            region,
            sports: normalize_names(&self.sports),
            facility_types: normalize_names(&self.facility_types),
            location_types: normalize_names(&self.location_types),
            ministry_of_sports: self.ministry_of_sports,
            search,
            facility_type_id: self.facility_type_id,
            sport_ids,
            page: Page::new(self.page, self.limit, limits),
            sort: Sort { column, direction },
        })
    }
}

/// Split comma-joined entries, trimming and dropping empties.
fn split_list(values: &[String]) -> impl Iterator<Item = &str> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn normalize_names(values: &[String]) -> Vec<String> {
    let mut names: Vec<String> = split_list(values).map(str::to_lowercase).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Identifiers found for the name lists of a [`NormalizedFilter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameResolution {
    pub sport_ids: Vec<i32>,
    pub facility_type_ids: Vec<i32>,
}

impl NormalizedFilter {
    /// Canonical cache key. Field order is fixed and strings are quoted, so
    /// distinct filters cannot collide.
    pub fn cache_key(&self) -> String {
        format!(
            "region={:?};page={};limit={};sports={:?};facilityTypes={:?};locationTypes={:?};ministry={};search={:?};facilityTypeId={:?};sportIds={:?};sort={}:{}",
            self.region.map(Region::as_str),
            self.page.page,
            self.page.limit,
            self.sports,
            self.facility_types,
            self.location_types,
            self.ministry_of_sports,
            self.search,
            self.facility_type_id,
            self.sport_ids,
            self.sort.column.as_str(),
            self.sort.direction.as_str(),
        )
    }

    pub fn build(&self, resolved: &NameResolution) -> FacilityFilter {
        let mut filter = FacilityFilter::all();

        if let Some(region) = self.region {
            filter.push(Condition::Region(region));
        }

        if !self.location_types.is_empty() {
            let mut regions: Vec<Region> = self
                .location_types
                .iter()
                .filter_map(|name| Region::parse_any(name).ok())
                .collect();
            regions.sort_unstable();
            regions.dedup();
            filter.push(if regions.is_empty() {
                Condition::Never
            } else {
                Condition::RegionIn(regions)
            });
        }

        if !self.sports.is_empty() {
            filter.push(if resolved.sport_ids.is_empty() {
                Condition::Never
            } else {
                Condition::AnySport(resolved.sport_ids.clone())
            });
        }

        if !self.facility_types.is_empty() {
            filter.push(if resolved.facility_type_ids.is_empty() {
                Condition::Never
            } else {
                Condition::FacilityTypeIn(resolved.facility_type_ids.clone())
            });
        }

        if let Some(id) = self.facility_type_id {
            filter.push(Condition::FacilityTypeIn(vec![id]));
        }

        if !self.sport_ids.is_empty() {
            filter.push(Condition::AnySport(self.sport_ids.clone()));
        }

        if self.ministry_of_sports {
            filter.push(Condition::MinistryOfSports);
        }

        if let Some(search) = &self.search {
            filter.push(Condition::Search(search.clone()));
        }

        filter
    }
}

/// A single predicate over facilities.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Region(Region),
    RegionIn(Vec<Region>),
    /// The facility offers at least one of these sports.
    AnySport(Vec<i32>),
    FacilityTypeIn(Vec<i32>),
    MinistryOfSports,
    /// Case-insensitive substring of name or address. Stored lowercased.
    Search(String),
    /// Matches nothing.
    Never,
}

impl Condition {
    pub fn matches(&self, facility: &Facility) -> bool {
        match self {
            Condition::Region(region) => facility.region == *region,
            Condition::RegionIn(regions) => regions.contains(&facility.region),
            Condition::AnySport(ids) => facility.sport_ids.iter().any(|id| ids.contains(id)),
            Condition::FacilityTypeIn(ids) => ids.contains(&facility.facility_type_id),
            Condition::MinistryOfSports => facility.ministry_of_sports,
            Condition::Search(needle) => {
                facility.name.to_lowercase().contains(needle.as_str())
                    || facility.address.to_lowercase().contains(needle.as_str())
            }
            Condition::Never => false,
        }
    }
}

/// Conjunction of [`Condition`]s. Empty means "every facility".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacilityFilter {
    conditions: Vec<Condition>,
}

impl FacilityFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.push(condition);
        self
    }

    fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.conditions.contains(&Condition::Never)
    }

    pub fn matches(&self, facility: &Facility) -> bool {
        self.conditions.iter().all(|c| c.matches(facility))
    }
}

/// A filter ready to run, together with the canonical parameters it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    pub normalized: NormalizedFilter,
    pub filter: FacilityFilter,
}

impl ResolvedFilter {
    pub fn page(&self) -> Page {
        self.normalized.page
    }

    pub fn sort(&self) -> Sort {
        self.normalized.sort
    }
}

/// Look up sport and facility-type names, then build the filter.
pub async fn resolve(
    store: &dyn FacilityStore,
    normalized: NormalizedFilter,
) -> Result<ResolvedFilter, StoreError> {
    let (sports, facility_types) = tokio::try_join!(
        async {
            if normalized.sports.is_empty() {
                Ok(Vec::new())
            } else {
                store.find_sports_by_names(&normalized.sports).await
            }
        },
        async {
            if normalized.facility_types.is_empty() {
                Ok(Vec::new())
            } else {
                store
                    .find_facility_types_by_names(&normalized.facility_types)
                    .await
            }
        },
    )?;

    let mut resolution = NameResolution {
        sport_ids: sports.iter().map(|s| s.id).collect(),
        facility_type_ids: facility_types.iter().map(|t| t.id).collect(),
    };
    resolution.sport_ids.sort_unstable();
    resolution.sport_ids.dedup();
    resolution.facility_type_ids.sort_unstable();
    resolution.facility_type_ids.dedup();

    let filter = normalized.build(&resolution);
    Ok(ResolvedFilter { normalized, filter })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn params() -> FilterParams {
        FilterParams::default()
    }

    fn facility(region: Region, sport_ids: Vec<i32>) -> Facility {
        Facility {
            id: 1,
            name: "King Fahd Stadium".into(),
            region,
            country: "Saudi Arabia".into(),
            address: "Al Malaz, Riyadh".into(),
            rating: Some(4.2),
            reviews: Some(10),
            url: None,
            facility_type_id: 3,
            facility_type: "Stadium".into(),
            ministry_of_sports: true,
            sport_ids,
            sports: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_params_impose_no_constraint() {
        let normalized = params().normalize(PageLimits::DASHBOARD).unwrap();
        let filter = normalized.build(&NameResolution::default());
        assert!(filter.conditions().is_empty());
        assert_eq!(normalized.page, Page { page: 1, limit: 10_000 });
        assert_eq!(normalized.sort, Sort::default());
    }

    #[test]
    fn region_code_is_mapped_to_enum() {
        let p = FilterParams {
            region: Some("SA-01".into()),
            ..params()
        };
        let normalized = p.normalize(PageLimits::DASHBOARD).unwrap();
        assert_eq!(normalized.region, Some(Region::Riyadh));
        let filter = normalized.build(&NameResolution::default());
        assert_eq!(filter.conditions(), &[Condition::Region(Region::Riyadh)]);
    }

    #[test]
    fn unknown_region_code_is_rejected() {
        let p = FilterParams {
            region: Some("SA-99".into()),
            ..params()
        };
        assert_eq!(
            p.normalize(PageLimits::DASHBOARD).unwrap_err(),
            FilterError::InvalidRegion(UnknownRegion("SA-99".into()))
        );
    }

    #[test]
    fn blank_region_is_ignored() {
        let p = FilterParams {
            region: Some("  ".into()),
            ..params()
        };
        assert_eq!(p.normalize(PageLimits::DASHBOARD).unwrap().region, None);
    }

    #[test]
    fn unresolved_sports_match_nothing() {
        let p = FilterParams {
            sports: vec!["Curling".into()],
            ..params()
        };
        let filter = p
            .normalize(PageLimits::DASHBOARD)
            .unwrap()
            .build(&NameResolution::default());
        assert!(filter.is_unsatisfiable());
        assert!(!filter.matches(&facility(Region::Riyadh, vec![1])));
    }

    #[test]
    fn resolved_sports_require_intersection() {
        let p = FilterParams {
            sports: vec!["Football".into()],
            ..params()
        };
        let filter = p.normalize(PageLimits::DASHBOARD).unwrap().build(&NameResolution {
            sport_ids: vec![7, 9],
            facility_type_ids: Vec::new(),
        });
        assert!(filter.matches(&facility(Region::Riyadh, vec![1, 9])));
        assert!(!filter.matches(&facility(Region::Riyadh, vec![1, 2])));
        assert!(!filter.matches(&facility(Region::Riyadh, vec![])));
    }

    #[test]
    fn location_types_restrict_regions() {
        let p = FilterParams {
            location_types: vec!["Eastern Province,Makkah".into(), "nowhere".into()],
            ..params()
        };
        let filter = p
            .normalize(PageLimits::DASHBOARD)
            .unwrap()
            .build(&NameResolution::default());
        assert_eq!(
            filter.conditions(),
            &[Condition::RegionIn(vec![Region::Makkah, Region::EasternProvince])]
        );

        let p = FilterParams {
            location_types: vec!["nowhere".into()],
            ..params()
        };
        let filter = p
            .normalize(PageLimits::DASHBOARD)
            .unwrap()
            .build(&NameResolution::default());
        assert!(filter.is_unsatisfiable());
    }

    #[test]
    fn list_order_and_case_do_not_change_cache_key() {
        let a = FilterParams {
            sports: vec!["Tennis".into(), "football".into()],
            facility_types: vec!["Stadium".into()],
            ..params()
        };
        let b = FilterParams {
            sports: vec!["Football, tennis".into()],
            facility_types: vec!["stadium".into(), "STADIUM".into()],
            ..params()
        };
        let ka = a.normalize(PageLimits::DASHBOARD).unwrap().cache_key();
        let kb = b.normalize(PageLimits::DASHBOARD).unwrap().cache_key();
        assert_eq!(ka, kb);
    }

    #[test]
    fn different_filters_produce_different_keys() {
        let base = params().normalize(PageLimits::DASHBOARD).unwrap().cache_key();
        let ministry = FilterParams {
            ministry_of_sports: true,
            ..params()
        }
        .normalize(PageLimits::DASHBOARD)
        .unwrap()
        .cache_key();
        let paged = FilterParams {
            page: Some(2),
            ..params()
        }
        .normalize(PageLimits::DASHBOARD)
        .unwrap()
        .cache_key();
        assert_ne!(base, ministry);
        assert_ne!(base, paged);
        assert_ne!(ministry, paged);
    }

    #[test]
    fn pagination_is_clamped() {
        let p = FilterParams {
            page: Some(0),
            limit: Some(5_000),
            ..params()
        };
        let page = p.normalize(PageLimits::FACILITY_LIST).unwrap().page;
        assert_eq!(page, Page { page: 1, limit: 1_000 });
        assert_eq!(page.offset(), 0);

        let page = Page::new(Some(3), Some(20), PageLimits::FACILITY_LIST);
        assert_eq!(page.offset(), 40);
        assert_eq!(page.total_pages(41), 3);
        assert_eq!(page.total_pages(0), 0);
    }

    #[test]
    fn sort_parsing() {
        let p = FilterParams {
            sort_by: Some("created_at".into()),
            sort_order: Some("ASC".into()),
            ..params()
        };
        assert_eq!(
            p.normalize(PageLimits::FACILITY_LIST).unwrap().sort,
            Sort {
                column: SortColumn::CreatedAt,
                direction: SortDirection::Asc
            }
        );

        let bad = FilterParams {
            sort_by: Some("password".into()),
            ..params()
        };
        assert_eq!(
            bad.normalize(PageLimits::FACILITY_LIST).unwrap_err(),
            FilterError::InvalidSortField("password".into())
        );

        let bad = FilterParams {
            sort_order: Some("sideways".into()),
            ..params()
        };
        assert!(matches!(
            bad.normalize(PageLimits::FACILITY_LIST),
            Err(FilterError::InvalidSortOrder(_))
        ));
    }

    #[test]
    fn sport_id_lists_are_parsed_and_validated() {
        let p = FilterParams {
            sport_ids: vec!["3,1".into(), "3".into()],
            ..params()
        };
        assert_eq!(
            p.normalize(PageLimits::FACILITY_LIST).unwrap().sport_ids,
            vec![1, 3]
        );

        let bad = FilterParams {
            sport_ids: vec!["1,abc".into()],
            ..params()
        };
        assert_eq!(
            bad.normalize(PageLimits::FACILITY_LIST).unwrap_err(),
            FilterError::InvalidId("abc".into())
        );
    }

    #[test]
    fn conditions_are_conjoined() {
        let filter = FacilityFilter::all()
            .with(Condition::Region(Region::Riyadh))
            .with(Condition::MinistryOfSports)
            .with(Condition::Search("malaz".into()));
        assert!(filter.matches(&facility(Region::Riyadh, vec![])));
        assert!(!filter.matches(&facility(Region::Jazan, vec![])));

        let mut not_ministry = facility(Region::Riyadh, vec![]);
        not_ministry.ministry_of_sports = false;
        assert!(!filter.matches(&not_ministry));
    }
}
