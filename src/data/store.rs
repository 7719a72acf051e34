//! Persistence port for facilities, sports, facility types and chart titles.
//!
//! Two implementations exist: [`PgStore`](crate::data::pg::PgStore) for
//! production and [`MemoryStore`](crate::data::memory::MemoryStore) for local
//! runs without a database and for tests. Handlers never talk to a store
//! directly; they go through [`Catalog`](crate::data::catalog::Catalog), which
//! owns cache invalidation on writes.

use async_trait::async_trait;

use crate::data::filter::{FacilityFilter, Page, Sort};
use crate::data::models::{
    ChartTitle, ChartTitleInput, Facility, FacilityInput, FacilityType, FacilityTypeInput, Sport,
    SportInput, TypeUsage,
};
use crate::data::region::Region;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint was violated.
    #[error("{0}")]
    Conflict(String),
    /// A referenced row does not exist.
    #[error("{0}")]
    InvalidReference(String),
    /// A persisted value could not be mapped back into the domain.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    /// Classify constraint violations so callers can map them to 409/400.
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(match db_err.constraint() {
                    Some(constraint) => format!("duplicate value violates '{constraint}'"),
                    None => "duplicate value".to_owned(),
                });
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::InvalidReference(match db_err.constraint() {
                    Some(constraint) => format!("referenced row missing for '{constraint}'"),
                    None => "referenced row missing".to_owned(),
                });
            }
        }
        StoreError::Database(err)
    }
}

/// Facility count per group, before display-name translation.
pub type GroupCount<K> = (K, i64);

#[async_trait]
pub trait FacilityStore: Send + Sync {
    /// Short backend label for status output.
    fn kind(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    // -- facility types --

    async fn list_facility_types(&self) -> Result<Vec<FacilityType>, StoreError>;
    async fn get_facility_type(&self, id: i32) -> Result<Option<FacilityType>, StoreError>;
    /// Case-insensitive exact match on any of `names`.
    async fn find_facility_types_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<FacilityType>, StoreError>;
    async fn create_facility_type(
        &self,
        input: &FacilityTypeInput,
    ) -> Result<FacilityType, StoreError>;
    async fn update_facility_type(
        &self,
        id: i32,
        input: &FacilityTypeInput,
    ) -> Result<Option<FacilityType>, StoreError>;
    async fn delete_facility_type(&self, id: i32) -> Result<bool, StoreError>;
    async fn facility_type_usage(&self, id: i32) -> Result<TypeUsage, StoreError>;

    // -- sports --

    async fn list_sports(&self, facility_type_id: Option<i32>) -> Result<Vec<Sport>, StoreError>;
    async fn get_sport(&self, id: i32) -> Result<Option<Sport>, StoreError>;
    /// Case-insensitive exact match on any of `names`, across all facility types.
    async fn find_sports_by_names(&self, names: &[String]) -> Result<Vec<Sport>, StoreError>;
    async fn create_sport(&self, input: &SportInput) -> Result<Sport, StoreError>;
    async fn update_sport(&self, id: i32, input: &SportInput) -> Result<Option<Sport>, StoreError>;
    async fn delete_sport(&self, id: i32) -> Result<bool, StoreError>;

    // -- facilities --

    async fn list_facilities(
        &self,
        filter: &FacilityFilter,
        sort: Sort,
        page: Page,
    ) -> Result<Vec<Facility>, StoreError>;
    async fn count_facilities(&self, filter: &FacilityFilter) -> Result<i64, StoreError>;
    async fn get_facility(&self, id: i32) -> Result<Option<Facility>, StoreError>;
    /// Inserts the facility and its sport associations atomically.
    async fn create_facility(&self, input: &FacilityInput) -> Result<Facility, StoreError>;
    /// Replaces the facility and reconciles its sport associations atomically.
    async fn update_facility(
        &self,
        id: i32,
        input: &FacilityInput,
    ) -> Result<Option<Facility>, StoreError>;
    async fn delete_facility(&self, id: i32) -> Result<bool, StoreError>;
    async fn delete_all_facilities(&self) -> Result<u64, StoreError>;

    // -- aggregates --

    async fn count_by_facility_type(
        &self,
        filter: &FacilityFilter,
    ) -> Result<Vec<GroupCount<i32>>, StoreError>;
    /// Facilities per sport; a facility offering several sports counts once for each.
    async fn count_by_sport(
        &self,
        filter: &FacilityFilter,
    ) -> Result<Vec<GroupCount<i32>>, StoreError>;
    async fn count_by_region(
        &self,
        filter: &FacilityFilter,
    ) -> Result<Vec<GroupCount<Region>>, StoreError>;
    /// Mean rating over matching facilities that have one; `None` if none do.
    async fn average_rating(&self, filter: &FacilityFilter) -> Result<Option<f64>, StoreError>;

    // -- chart titles --

    async fn get_chart_title(&self, id: &str) -> Result<Option<ChartTitle>, StoreError>;
    async fn upsert_chart_title(
        &self,
        id: &str,
        input: &ChartTitleInput,
    ) -> Result<ChartTitle, StoreError>;
}
