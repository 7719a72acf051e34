//! Business rules over a [`FacilityStore`], and the only place that writes to it.
//!
//! Reads delegate to the store. Every successful write that can change a
//! dashboard aggregate ends in [`Catalog::committed`], which invalidates the
//! dashboard cache, so a read after a write never sees pre-write aggregates.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use ts_rs::TS;

use crate::data::batch::{self, BatchReport, MAX_BATCH_ROWS};
use crate::data::dashboard::{self, DashboardResponse, Pagination};
use crate::data::dashboard_cache::DashboardCache;
use crate::data::filter::{self, FilterError, FilterParams, PageLimits};
use crate::data::models::{
    ChartTitle, ChartTitleInput, Facility, FacilityInput, FacilityType, FacilityTypeInput, Sport,
    SportInput,
};
use crate::data::store::{FacilityStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Store(StoreError),
}

impl CatalogError {
    fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CatalogError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => CatalogError::Conflict(msg),
            StoreError::InvalidReference(msg) => CatalogError::Validation(msg),
            other => CatalogError::Store(other),
        }
    }
}

/// How a dashboard response was obtained; reported in the `X-Cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Expired entry served while another request rebuilds it.
    Stale,
}

impl CacheStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Stale => "STALE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FacilityPage {
    pub facilities: Vec<Facility>,
    pub pagination: Pagination,
}

/// Releases a singleflight slot when the computation ends, including on cancellation.
struct SlotGuard<'a> {
    cache: &'a DashboardCache,
    key: String,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.cache.release(&self.key);
    }
}

#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn FacilityStore>,
    cache: DashboardCache,
}

impl Catalog {
    pub fn new(store: Arc<dyn FacilityStore>, cache: DashboardCache) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &DashboardCache {
        &self.cache
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    fn committed(&self, what: &str) {
        debug!(what, "write committed, invalidating dashboard cache");
        self.cache.invalidate_all();
    }

    /// Drop every cached dashboard response. Returns how many were dropped.
    pub fn clear_cache(&self) -> usize {
        let dropped = self.cache.len();
        self.cache.invalidate_all();
        info!(dropped, "dashboard cache cleared on request");
        dropped
    }

    // -- dashboard --

    pub async fn dashboard(
        &self,
        params: &FilterParams,
    ) -> Result<(Arc<DashboardResponse>, CacheStatus), CatalogError> {
        let normalized = params.normalize(PageLimits::DASHBOARD)?;
        let key = normalized.cache_key();

        if let Some(hit) = self.cache.get(&key) {
            return Ok((hit, CacheStatus::Hit));
        }

        let _slot = if self.cache.try_claim(&key) {
            Some(SlotGuard {
                cache: &self.cache,
                key: key.clone(),
            })
        } else if let Some(stale) = self.cache.get_stale(&key) {
            return Ok((stale, CacheStatus::Stale));
        } else {
            // Nothing to fall back on: build it too. Singleflight is best-effort.
            None
        };

        let generation = self.cache.generation();
        let resolved = filter::resolve(self.store.as_ref(), normalized).await?;
        let response =
            Arc::new(dashboard::aggregate(self.store.as_ref(), &resolved, key.clone()).await?);
        self.cache.put_if_current(key, response.clone(), generation);

        Ok((response, CacheStatus::Miss))
    }

    // -- facilities --

    pub async fn list_facilities(&self, params: &FilterParams) -> Result<FacilityPage, CatalogError> {
        let normalized = params.normalize(PageLimits::FACILITY_LIST)?;
        let resolved = filter::resolve(self.store.as_ref(), normalized).await?;
        let (facilities, total) = tokio::try_join!(
            self.store
                .list_facilities(&resolved.filter, resolved.sort(), resolved.page()),
            self.store.count_facilities(&resolved.filter),
        )?;
        Ok(FacilityPage {
            facilities,
            pagination: Pagination::new(resolved.page(), total),
        })
    }

    pub async fn get_facility(&self, id: i32) -> Result<Facility, CatalogError> {
        self.store
            .get_facility(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Facility", id))
    }

    async fn validate_facility(&self, input: &mut FacilityInput) -> Result<(), CatalogError> {
        input.name = input.name.trim().to_owned();
        input.address = input.address.trim().to_owned();
        if input.name.is_empty() {
            return Err(CatalogError::Validation("name must not be empty".into()));
        }
        if input.address.is_empty() {
            return Err(CatalogError::Validation("address must not be empty".into()));
        }
        if let Some(rating) = input.rating
            && !(0.0..=5.0).contains(&rating)
        {
            return Err(CatalogError::Validation(format!(
                "rating must be between 0 and 5, got {rating}"
            )));
        }
        if let Some(reviews) = input.reviews
            && reviews < 0
        {
            return Err(CatalogError::Validation(format!(
                "reviews must not be negative, got {reviews}"
            )));
        }
        if self
            .store
            .get_facility_type(input.facility_type_id)
            .await?
            .is_none()
        {
            return Err(CatalogError::Validation(format!(
                "facility type {} does not exist",
                input.facility_type_id
            )));
        }
        input.sport_ids.sort_unstable();
        input.sport_ids.dedup();
        for sport_id in &input.sport_ids {
            if self.store.get_sport(*sport_id).await?.is_none() {
                return Err(CatalogError::Validation(format!(
                    "sport {sport_id} does not exist"
                )));
            }
        }
        Ok(())
    }

    /// Validate and insert without invalidating; batch import invalidates once at the end.
    async fn insert_facility(&self, mut input: FacilityInput) -> Result<Facility, CatalogError> {
        self.validate_facility(&mut input).await?;
        Ok(self.store.create_facility(&input).await?)
    }

    pub async fn create_facility(&self, input: FacilityInput) -> Result<Facility, CatalogError> {
        let created = self.insert_facility(input).await?;
        self.committed("facility created");
        info!(id = created.id, name = %created.name, "facility created");
        Ok(created)
    }

    pub async fn update_facility(
        &self,
        id: i32,
        mut input: FacilityInput,
    ) -> Result<Facility, CatalogError> {
        self.validate_facility(&mut input).await?;
        let updated = self
            .store
            .update_facility(id, &input)
            .await?
            .ok_or_else(|| CatalogError::not_found("Facility", id))?;
        self.committed("facility updated");
        Ok(updated)
    }

    pub async fn delete_facility(&self, id: i32) -> Result<(), CatalogError> {
        if !self.store.delete_facility(id).await? {
            return Err(CatalogError::not_found("Facility", id));
        }
        self.committed("facility deleted");
        Ok(())
    }

    pub async fn delete_all_facilities(&self) -> Result<u64, CatalogError> {
        let deleted = self.store.delete_all_facilities().await?;
        self.committed("all facilities deleted");
        info!(deleted, "all facilities deleted");
        Ok(deleted)
    }

    // -- facility types --

    pub async fn list_facility_types(&self) -> Result<Vec<FacilityType>, CatalogError> {
        Ok(self.store.list_facility_types().await?)
    }

    pub async fn get_facility_type(&self, id: i32) -> Result<FacilityType, CatalogError> {
        self.store
            .get_facility_type(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Facility type", id))
    }

    fn clean_type_input(mut input: FacilityTypeInput) -> Result<FacilityTypeInput, CatalogError> {
        input.name = input.name.trim().to_owned();
        if input.name.is_empty() {
            return Err(CatalogError::Validation("name must not be empty".into()));
        }
        Ok(input)
    }

    pub async fn create_facility_type(
        &self,
        input: FacilityTypeInput,
    ) -> Result<FacilityType, CatalogError> {
        let input = Self::clean_type_input(input)?;
        let created = self.store.create_facility_type(&input).await?;
        self.committed("facility type created");
        Ok(created)
    }

    pub async fn update_facility_type(
        &self,
        id: i32,
        input: FacilityTypeInput,
    ) -> Result<FacilityType, CatalogError> {
        let input = Self::clean_type_input(input)?;
        let updated = self
            .store
            .update_facility_type(id, &input)
            .await?
            .ok_or_else(|| CatalogError::not_found("Facility type", id))?;
        self.committed("facility type updated");
        Ok(updated)
    }

    pub async fn delete_facility_type(&self, id: i32) -> Result<(), CatalogError> {
        self.get_facility_type(id).await?;
        let usage = self.store.facility_type_usage(id).await?;
        if !usage.is_unused() {
            return Err(CatalogError::Conflict(format!(
                "facility type {id} is still used by {} sport(s) and {} facilit(ies)",
                usage.sports, usage.facilities
            )));
        }
        match self.store.delete_facility_type(id).await {
            Ok(true) => {}
            Ok(false) => return Err(CatalogError::not_found("Facility type", id)),
            // A reference appeared between the usage check and the delete.
            Err(StoreError::InvalidReference(msg)) => return Err(CatalogError::Conflict(msg)),
            Err(err) => return Err(err.into()),
        }
        self.committed("facility type deleted");
        Ok(())
    }

    // -- sports --

    pub async fn list_sports(&self, facility_type_id: Option<i32>) -> Result<Vec<Sport>, CatalogError> {
        Ok(self.store.list_sports(facility_type_id).await?)
    }

    pub async fn get_sport(&self, id: i32) -> Result<Sport, CatalogError> {
        self.store
            .get_sport(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Sport", id))
    }

    async fn clean_sport_input(&self, mut input: SportInput) -> Result<SportInput, CatalogError> {
        input.name = input.name.trim().to_owned();
        if input.name.is_empty() {
            return Err(CatalogError::Validation("name must not be empty".into()));
        }
        if self
            .store
            .get_facility_type(input.facility_type_id)
            .await?
            .is_none()
        {
            return Err(CatalogError::Validation(format!(
                "facility type {} does not exist",
                input.facility_type_id
            )));
        }
        Ok(input)
    }

    pub async fn create_sport(&self, input: SportInput) -> Result<Sport, CatalogError> {
        let input = self.clean_sport_input(input).await?;
        let created = self.store.create_sport(&input).await?;
        self.committed("sport created");
        Ok(created)
    }

    pub async fn update_sport(&self, id: i32, input: SportInput) -> Result<Sport, CatalogError> {
        let input = self.clean_sport_input(input).await?;
        let updated = self
            .store
            .update_sport(id, &input)
            .await?
            .ok_or_else(|| CatalogError::not_found("Sport", id))?;
        self.committed("sport updated");
        Ok(updated)
    }

    pub async fn delete_sport(&self, id: i32) -> Result<(), CatalogError> {
        if !self.store.delete_sport(id).await? {
            return Err(CatalogError::not_found("Sport", id));
        }
        self.committed("sport deleted");
        Ok(())
    }

    // -- chart titles --

    pub async fn get_chart_title(&self, id: &str) -> Result<ChartTitle, CatalogError> {
        self.store
            .get_chart_title(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Chart title", id))
    }

    /// Chart titles are labels only; no dashboard aggregate depends on them.
    pub async fn set_chart_title(
        &self,
        id: &str,
        mut input: ChartTitleInput,
    ) -> Result<ChartTitle, CatalogError> {
        input.name = input.name.trim().to_owned();
        if id.trim().is_empty() || input.name.is_empty() {
            return Err(CatalogError::Validation(
                "chart title id and name must not be empty".into(),
            ));
        }
        Ok(self.store.upsert_chart_title(id, &input).await?)
    }

    // -- batch import --

    /// Import uploaded rows, creating missing facility types and sports by name.
    ///
    /// Rows fail independently; the report lists the first few failures. The
    /// cache is invalidated once at the end if anything was written.
    pub async fn import_batch(&self, rows: Vec<Value>) -> Result<BatchReport, CatalogError> {
        if rows.len() > MAX_BATCH_ROWS {
            return Err(CatalogError::Validation(format!(
                "batch of {} rows exceeds the limit of {MAX_BATCH_ROWS}",
                rows.len()
            )));
        }

        let (facility_types, sports) =
            tokio::try_join!(self.store.list_facility_types(), self.store.list_sports(None))?;
        let mut names = NameCache {
            facility_types: facility_types
                .into_iter()
                .map(|t| (t.name.to_lowercase(), t.id))
                .collect(),
            sports: sports
                .into_iter()
                .map(|s| ((s.name.to_lowercase(), s.facility_type_id), s.id))
                .collect(),
        };

        let mut report = BatchReport::default();
        for (index, raw) in rows.into_iter().enumerate() {
            let row_number = index + 1;
            let label = batch::row_label(&raw);
            match self.import_row(raw, &mut names, &mut report).await {
                Ok(_) => report.record_success(),
                Err(reason) => report.record_failure(row_number, &label, reason),
            }
        }

        if report.successful > 0 || report.created_facility_types > 0 || report.created_sports > 0
        {
            self.committed("batch import");
        }
        info!(
            successful = report.successful,
            failed = report.failed,
            "batch import finished"
        );
        Ok(report)
    }

    async fn import_row(
        &self,
        raw: Value,
        names: &mut NameCache,
        report: &mut BatchReport,
    ) -> Result<Facility, String> {
        let row = batch::parse_row(raw)?;

        let type_key = row.facility_type.to_lowercase();
        let facility_type_id = match names.facility_types.get(&type_key) {
            Some(id) => *id,
            None => {
                let created = self
                    .store
                    .create_facility_type(&FacilityTypeInput {
                        name: row.facility_type.clone(),
                        description: None,
                    })
                    .await
                    .map_err(|e| e.to_string())?;
                report.created_facility_types += 1;
                names.facility_types.insert(type_key, created.id);
                created.id
            }
        };

        let mut sport_ids = Vec::with_capacity(row.sports.len());
        for sport in &row.sports {
            let key = (sport.to_lowercase(), facility_type_id);
            let id = match names.sports.get(&key) {
                Some(id) => *id,
                None => {
                    let created = self
                        .store
                        .create_sport(&SportInput {
                            name: sport.clone(),
                            facility_type_id,
                            description: None,
                        })
                        .await
                        .map_err(|e| e.to_string())?;
                    report.created_sports += 1;
                    names.sports.insert(key, created.id);
                    created.id
                }
            };
            sport_ids.push(id);
        }

        self.insert_facility(row.into_input(facility_type_id, sport_ids))
            .await
            .map_err(|e| e.to_string())
    }
}

/// Lowercased name → id lookups built once per batch.
struct NameCache {
    facility_types: HashMap<String, i32>,
    sports: HashMap<(String, i32), i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;
    use crate::data::region::Region;
    use serde_json::json;

    fn catalog() -> (Catalog, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            Catalog::new(store.clone(), DashboardCache::default()),
            store,
        )
    }

    fn facility(type_id: i32) -> FacilityInput {
        FacilityInput {
            name: " Arena ".into(),
            region: Region::Makkah,
            country: "Saudi Arabia".into(),
            address: "Jeddah".into(),
            rating: Some(4.0),
            reviews: Some(3),
            url: None,
            facility_type_id: type_id,
            ministry_of_sports: false,
            sport_ids: Vec::new(),
        }
    }

    async fn stadium(catalog: &Catalog) -> FacilityType {
        catalog
            .create_facility_type(FacilityTypeInput {
                name: "Stadium".into(),
                description: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn second_dashboard_read_is_a_hit_without_store_reads() {
        let (catalog, store) = catalog();
        let params = FilterParams::default();
        let (first, status) = catalog.dashboard(&params).await.unwrap();
        assert_eq!(status, CacheStatus::Miss);

        let reads = store.reads();
        let (second, status) = catalog.dashboard(&params).await.unwrap();
        assert_eq!(status, CacheStatus::Hit);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.reads(), reads);
    }

    #[tokio::test]
    async fn expired_entry_is_served_stale_while_another_request_builds() {
        let store = Arc::new(MemoryStore::new());
        let catalog = Catalog::new(
            store.clone(),
            DashboardCache::new(std::time::Duration::from_millis(20)),
        );
        let params = FilterParams::default();
        let key = params
            .normalize(PageLimits::DASHBOARD)
            .unwrap()
            .cache_key();

        let (first, status) = catalog.dashboard(&params).await.unwrap();
        assert_eq!(status, CacheStatus::Miss);
        // The guard released the slot once the miss completed.
        assert!(catalog.cache().try_claim(&key));

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        let reads = store.reads();
        let (stale, status) = catalog.dashboard(&params).await.unwrap();
        assert_eq!(status, CacheStatus::Stale);
        assert!(Arc::ptr_eq(&first, &stale));
        assert_eq!(store.reads(), reads);

        catalog.cache().release(&key);
        let (_, status) = catalog.dashboard(&params).await.unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert!(catalog.cache().try_claim(&key));
        catalog.cache().release(&key);
    }

    #[tokio::test]
    async fn writes_invalidate_the_dashboard() {
        let (catalog, _) = catalog();
        let kind = stadium(&catalog).await;
        catalog.dashboard(&FilterParams::default()).await.unwrap();
        assert_eq!(catalog.cache().len(), 1);

        catalog.create_facility(facility(kind.id)).await.unwrap();
        assert!(catalog.cache().is_empty());

        let (response, status) = catalog.dashboard(&FilterParams::default()).await.unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(response.stats.total_facilities, 1);
    }

    #[tokio::test]
    async fn facility_validation() {
        let (catalog, _) = catalog();
        let kind = stadium(&catalog).await;

        let created = catalog.create_facility(facility(kind.id)).await.unwrap();
        assert_eq!(created.name, "Arena");

        let mut bad = facility(kind.id);
        bad.rating = Some(5.5);
        assert!(matches!(
            catalog.create_facility(bad).await,
            Err(CatalogError::Validation(_))
        ));

        let mut bad = facility(kind.id);
        bad.sport_ids = vec![404];
        assert!(matches!(
            catalog.create_facility(bad).await,
            Err(CatalogError::Validation(_))
        ));

        assert!(matches!(
            catalog.create_facility(facility(kind.id + 100)).await,
            Err(CatalogError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn referenced_facility_type_cannot_be_deleted() {
        let (catalog, _) = catalog();
        let kind = stadium(&catalog).await;
        let created = catalog.create_facility(facility(kind.id)).await.unwrap();

        assert!(matches!(
            catalog.delete_facility_type(kind.id).await,
            Err(CatalogError::Conflict(_))
        ));

        catalog.delete_facility(created.id).await.unwrap();
        catalog.delete_facility_type(kind.id).await.unwrap();
        assert!(matches!(
            catalog.get_facility_type(kind.id).await,
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let (catalog, _) = catalog();
        let kind = stadium(&catalog).await;
        assert!(matches!(
            catalog
                .create_facility_type(FacilityTypeInput {
                    name: "stadium".into(),
                    description: None,
                })
                .await,
            Err(CatalogError::Conflict(_))
        ));

        let sport = SportInput {
            name: "Football".into(),
            facility_type_id: kind.id,
            description: None,
        };
        catalog.create_sport(sport.clone()).await.unwrap();
        assert!(matches!(
            catalog.create_sport(sport).await,
            Err(CatalogError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn batch_import_creates_names_once() {
        let (catalog, _) = catalog();
        let rows = vec![
            json!({"name": "A", "region": "SA-01", "address": "x", "facilityType": "Gym", "sports": "Boxing, Judo"}),
            json!({"name": "B", "region": "RIYADH", "address": "y", "facilityType": "gym", "sports": ["judo"]}),
            json!({"region": "SA-01", "address": "z", "facilityType": "Gym"}),
        ];
        let report = catalog.import_batch(rows).await.unwrap();
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.created_facility_types, 1);
        assert_eq!(report.created_sports, 2);
        assert_eq!(
            report.errors,
            vec!["Row 3 (Unnamed): missing required field 'name'"]
        );

        let judo = catalog
            .list_sports(None)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.name == "Judo")
            .unwrap();
        assert_eq!(judo.facility_ids.len(), 2);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let (catalog, _) = catalog();
        let rows = vec![json!({}); MAX_BATCH_ROWS + 1];
        assert!(matches!(
            catalog.import_batch(rows).await,
            Err(CatalogError::Validation(_))
        ));
    }
}
