//! Process-local [`FacilityStore`] used when no `DATABASE_URL` is configured
//! and by the test suite.
//!
//! State lives behind one `tokio::sync::RwLock`, so each write (including the
//! facility/sport association reconciliation) is atomic with respect to readers.
//! Every read method bumps a counter that tests use to prove cache hits skip the
//! store entirely.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::data::filter::{FacilityFilter, Page, Sort, SortColumn, SortDirection};
use crate::data::models::{
    ChartTitle, ChartTitleInput, Facility, FacilityInput, FacilityType, FacilityTypeInput, Sport,
    SportInput, TypeUsage,
};
use crate::data::region::Region;
use crate::data::store::{FacilityStore, GroupCount, StoreError};

#[derive(Debug, Clone)]
struct FacilityRecord {
    name: String,
    region: Region,
    country: String,
    address: String,
    rating: Option<f64>,
    reviews: Option<i32>,
    url: Option<String>,
    facility_type_id: i32,
    ministry_of_sports: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FacilityRecord {
    fn from_input(input: &FacilityInput, created_at: DateTime<Utc>) -> Self {
        Self {
            name: input.name.clone(),
            region: input.region,
            country: input.country.clone(),
            address: input.address.clone(),
            rating: input.rating,
            reviews: input.reviews,
            url: input.url.clone(),
            facility_type_id: input.facility_type_id,
            ministry_of_sports: input.ministry_of_sports,
            created_at,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
struct SportRecord {
    name: String,
    facility_type_id: i32,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i32,
    facility_types: BTreeMap<i32, FacilityType>,
    sports: BTreeMap<i32, SportRecord>,
    facilities: BTreeMap<i32, FacilityRecord>,
    /// (facility_id, sport_id)
    links: BTreeSet<(i32, i32)>,
    chart_titles: HashMap<String, ChartTitle>,
}

impl Tables {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn type_name(&self, id: i32) -> String {
        self.facility_types
            .get(&id)
            .map(|t| t.name.clone())
            .unwrap_or_default()
    }

    fn hydrate_facility(&self, id: i32, record: &FacilityRecord) -> Facility {
        let sport_ids: Vec<i32> = self
            .links
            .range((id, i32::MIN)..=(id, i32::MAX))
            .map(|(_, sport_id)| *sport_id)
            .collect();
        let mut sports: Vec<String> = sport_ids
            .iter()
            .filter_map(|sid| self.sports.get(sid).map(|s| s.name.clone()))
            .collect();
        sports.sort();
        Facility {
            id,
            name: record.name.clone(),
            region: record.region,
            country: record.country.clone(),
            address: record.address.clone(),
            rating: record.rating,
            reviews: record.reviews,
            url: record.url.clone(),
            facility_type_id: record.facility_type_id,
            facility_type: self.type_name(record.facility_type_id),
            ministry_of_sports: record.ministry_of_sports,
            sport_ids,
            sports,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn hydrate_sport(&self, id: i32, record: &SportRecord) -> Sport {
        Sport {
            id,
            name: record.name.clone(),
            facility_type_id: record.facility_type_id,
            facility_type: self.type_name(record.facility_type_id),
            description: record.description.clone(),
            facility_ids: self
                .links
                .iter()
                .filter(|(_, sport_id)| *sport_id == id)
                .map(|(facility_id, _)| *facility_id)
                .collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn matching(&self, filter: &FacilityFilter) -> Vec<Facility> {
        if filter.is_unsatisfiable() {
            return Vec::new();
        }
        self.facilities
            .iter()
            .map(|(id, record)| self.hydrate_facility(*id, record))
            .filter(|f| filter.matches(f))
            .collect()
    }

    fn check_facility_refs(&self, input: &FacilityInput) -> Result<(), StoreError> {
        if !self.facility_types.contains_key(&input.facility_type_id) {
            return Err(StoreError::InvalidReference(format!(
                "facility type {} does not exist",
                input.facility_type_id
            )));
        }
        if let Some(missing) = input
            .sport_ids
            .iter()
            .find(|id| !self.sports.contains_key(id))
        {
            return Err(StoreError::InvalidReference(format!(
                "sport {missing} does not exist"
            )));
        }
        Ok(())
    }

    fn replace_links(&mut self, facility_id: i32, sport_ids: &[i32]) {
        self.links.retain(|(fid, _)| *fid != facility_id);
        self.links
            .extend(sport_ids.iter().map(|sport_id| (facility_id, *sport_id)));
    }

    fn facility_type_name_taken(&self, name: &str, except: Option<i32>) -> bool {
        self.facility_types
            .values()
            .any(|t| Some(t.id) != except && t.name.eq_ignore_ascii_case(name))
    }

    fn sport_name_taken(&self, input: &SportInput, except: Option<i32>) -> bool {
        self.sports.iter().any(|(id, s)| {
            Some(*id) != except
                && s.facility_type_id == input.facility_type_id
                && s.name == input.name
        })
    }
}

fn compare(a: &Facility, b: &Facility, sort: Sort) -> CmpOrdering {
    // Missing ratings/reviews sort last in both directions, as in Postgres with NULLS LAST.
    fn nulls_last<T: PartialOrd>(a: Option<T>, b: Option<T>, dir: SortDirection) -> CmpOrdering {
        match (a, b) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal);
                match dir {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
            (Some(_), None) => CmpOrdering::Less,
            (None, Some(_)) => CmpOrdering::Greater,
            (None, None) => CmpOrdering::Equal,
        }
    }

    let directed = |ord: CmpOrdering| match sort.direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    };

    let primary = match sort.column {
        SortColumn::Name => directed(a.name.cmp(&b.name)),
        SortColumn::Region => directed(a.region.as_str().cmp(b.region.as_str())),
        SortColumn::Rating => nulls_last(a.rating, b.rating, sort.direction),
        SortColumn::Reviews => nulls_last(a.reviews, b.reviews, sort.direction),
        SortColumn::CreatedAt => directed(a.created_at.cmp(&b.created_at)),
        SortColumn::UpdatedAt => directed(a.updated_at.cmp(&b.updated_at)),
    };
    primary.then_with(|| directed(a.id.cmp(&b.id)))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    reads: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read operations served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl FacilityStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_facility_types(&self) -> Result<Vec<FacilityType>, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        let mut types: Vec<FacilityType> = tables.facility_types.values().cloned().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn get_facility_type(&self, id: i32) -> Result<Option<FacilityType>, StoreError> {
        self.count_read();
        Ok(self.tables.read().await.facility_types.get(&id).cloned())
    }

    async fn find_facility_types_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<FacilityType>, StoreError> {
        self.count_read();
        let wanted: Vec<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();
        let tables = self.tables.read().await;
        Ok(tables
            .facility_types
            .values()
            .filter(|t| wanted.contains(&t.name.to_lowercase()))
            .cloned()
            .collect())
    }

    async fn create_facility_type(
        &self,
        input: &FacilityTypeInput,
    ) -> Result<FacilityType, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.facility_type_name_taken(&input.name, None) {
            return Err(StoreError::Conflict(format!(
                "facility type '{}' already exists",
                input.name
            )));
        }
        let id = tables.allocate_id();
        let now = Utc::now();
        let created = FacilityType {
            id,
            name: input.name.clone(),
            description: input.description.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.facility_types.insert(id, created.clone());
        Ok(created)
    }

    async fn update_facility_type(
        &self,
        id: i32,
        input: &FacilityTypeInput,
    ) -> Result<Option<FacilityType>, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.facility_types.contains_key(&id) {
            return Ok(None);
        }
        if tables.facility_type_name_taken(&input.name, Some(id)) {
            return Err(StoreError::Conflict(format!(
                "facility type '{}' already exists",
                input.name
            )));
        }
        let Some(existing) = tables.facility_types.get_mut(&id) else {
            return Ok(None);
        };
        existing.name = input.name.clone();
        existing.description = input.description.clone();
        existing.updated_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn delete_facility_type(&self, id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let referenced = tables.sports.values().any(|s| s.facility_type_id == id)
            || tables.facilities.values().any(|f| f.facility_type_id == id);
        if referenced {
            return Err(StoreError::InvalidReference(format!(
                "facility type {id} is still referenced"
            )));
        }
        Ok(tables.facility_types.remove(&id).is_some())
    }

    async fn facility_type_usage(&self, id: i32) -> Result<TypeUsage, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        Ok(TypeUsage {
            sports: tables
                .sports
                .values()
                .filter(|s| s.facility_type_id == id)
                .count() as i64,
            facilities: tables
                .facilities
                .values()
                .filter(|f| f.facility_type_id == id)
                .count() as i64,
        })
    }

    async fn list_sports(&self, facility_type_id: Option<i32>) -> Result<Vec<Sport>, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        let mut sports: Vec<Sport> = tables
            .sports
            .iter()
            .filter(|(_, s)| facility_type_id.is_none_or(|tid| s.facility_type_id == tid))
            .map(|(id, s)| tables.hydrate_sport(*id, s))
            .collect();
        sports.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(sports)
    }

    async fn get_sport(&self, id: i32) -> Result<Option<Sport>, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        Ok(tables.sports.get(&id).map(|s| tables.hydrate_sport(id, s)))
    }

    async fn find_sports_by_names(&self, names: &[String]) -> Result<Vec<Sport>, StoreError> {
        self.count_read();
        let wanted: Vec<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();
        let tables = self.tables.read().await;
        Ok(tables
            .sports
            .iter()
            .filter(|(_, s)| wanted.contains(&s.name.to_lowercase()))
            .map(|(id, s)| tables.hydrate_sport(*id, s))
            .collect())
    }

    async fn create_sport(&self, input: &SportInput) -> Result<Sport, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.facility_types.contains_key(&input.facility_type_id) {
            return Err(StoreError::InvalidReference(format!(
                "facility type {} does not exist",
                input.facility_type_id
            )));
        }
        if tables.sport_name_taken(input, None) {
            return Err(StoreError::Conflict(format!(
                "sport '{}' already exists for this facility type",
                input.name
            )));
        }
        let id = tables.allocate_id();
        let now = Utc::now();
        let record = SportRecord {
            name: input.name.clone(),
            facility_type_id: input.facility_type_id,
            description: input.description.clone(),
            created_at: now,
            updated_at: now,
        };
        let sport = tables.hydrate_sport(id, &record);
        tables.sports.insert(id, record);
        Ok(sport)
    }

    async fn update_sport(&self, id: i32, input: &SportInput) -> Result<Option<Sport>, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.sports.contains_key(&id) {
            return Ok(None);
        }
        if !tables.facility_types.contains_key(&input.facility_type_id) {
            return Err(StoreError::InvalidReference(format!(
                "facility type {} does not exist",
                input.facility_type_id
            )));
        }
        if tables.sport_name_taken(input, Some(id)) {
            return Err(StoreError::Conflict(format!(
                "sport '{}' already exists for this facility type",
                input.name
            )));
        }
        let Some(record) = tables.sports.get_mut(&id) else {
            return Ok(None);
        };
        record.name = input.name.clone();
        record.facility_type_id = input.facility_type_id;
        record.description = input.description.clone();
        record.updated_at = Utc::now();
        let record = record.clone();
        Ok(Some(tables.hydrate_sport(id, &record)))
    }

    async fn delete_sport(&self, id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let removed = tables.sports.remove(&id).is_some();
        if removed {
            tables.links.retain(|(_, sport_id)| *sport_id != id);
        }
        Ok(removed)
    }

    async fn list_facilities(
        &self,
        filter: &FacilityFilter,
        sort: Sort,
        page: Page,
    ) -> Result<Vec<Facility>, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        let mut matching = tables.matching(filter);
        matching.sort_by(|a, b| compare(a, b, sort));
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(0);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_facilities(&self, filter: &FacilityFilter) -> Result<i64, StoreError> {
        self.count_read();
        Ok(self.tables.read().await.matching(filter).len() as i64)
    }

    async fn get_facility(&self, id: i32) -> Result<Option<Facility>, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        Ok(tables
            .facilities
            .get(&id)
            .map(|record| tables.hydrate_facility(id, record)))
    }

    async fn create_facility(&self, input: &FacilityInput) -> Result<Facility, StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_facility_refs(input)?;
        let id = tables.allocate_id();
        let record = FacilityRecord::from_input(input, Utc::now());
        tables.replace_links(id, &input.sport_ids);
        let facility = tables.hydrate_facility(id, &record);
        tables.facilities.insert(id, record);
        Ok(facility)
    }

    async fn update_facility(
        &self,
        id: i32,
        input: &FacilityInput,
    ) -> Result<Option<Facility>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(created_at) = tables.facilities.get(&id).map(|f| f.created_at) else {
            return Ok(None);
        };
        tables.check_facility_refs(input)?;
        let record = FacilityRecord::from_input(input, created_at);
        tables.replace_links(id, &input.sport_ids);
        let facility = tables.hydrate_facility(id, &record);
        tables.facilities.insert(id, record);
        Ok(Some(facility))
    }

    async fn delete_facility(&self, id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let removed = tables.facilities.remove(&id).is_some();
        if removed {
            tables.replace_links(id, &[]);
        }
        Ok(removed)
    }

    async fn delete_all_facilities(&self) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let count = tables.facilities.len() as u64;
        tables.facilities.clear();
        tables.links.clear();
        Ok(count)
    }

    async fn count_by_facility_type(
        &self,
        filter: &FacilityFilter,
    ) -> Result<Vec<GroupCount<i32>>, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        let mut counts: BTreeMap<i32, i64> = BTreeMap::new();
        for facility in tables.matching(filter) {
            *counts.entry(facility.facility_type_id).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn count_by_sport(
        &self,
        filter: &FacilityFilter,
    ) -> Result<Vec<GroupCount<i32>>, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        let mut counts: BTreeMap<i32, i64> = BTreeMap::new();
        for facility in tables.matching(filter) {
            for sport_id in facility.sport_ids {
                *counts.entry(sport_id).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn count_by_region(
        &self,
        filter: &FacilityFilter,
    ) -> Result<Vec<GroupCount<Region>>, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        let mut counts: BTreeMap<Region, i64> = BTreeMap::new();
        for facility in tables.matching(filter) {
            *counts.entry(facility.region).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn average_rating(&self, filter: &FacilityFilter) -> Result<Option<f64>, StoreError> {
        self.count_read();
        let tables = self.tables.read().await;
        let ratings: Vec<f64> = tables
            .matching(filter)
            .into_iter()
            .filter_map(|f| f.rating)
            .collect();
        if ratings.is_empty() {
            return Ok(None);
        }
        Ok(Some(ratings.iter().sum::<f64>() / ratings.len() as f64))
    }

    async fn get_chart_title(&self, id: &str) -> Result<Option<ChartTitle>, StoreError> {
        self.count_read();
        Ok(self.tables.read().await.chart_titles.get(id).cloned())
    }

    async fn upsert_chart_title(
        &self,
        id: &str,
        input: &ChartTitleInput,
    ) -> Result<ChartTitle, StoreError> {
        let mut tables = self.tables.write().await;
        let title = ChartTitle {
            id: id.to_owned(),
            name: input.name.clone(),
            notes: input.notes.clone(),
            updated_at: Utc::now(),
        };
        tables.chart_titles.insert(id.to_owned(), title.clone());
        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::{Condition, PageLimits};

    async fn seeded() -> (MemoryStore, i32, i32, i32) {
        let store = MemoryStore::new();
        let stadium = store
            .create_facility_type(&FacilityTypeInput {
                name: "Stadium".into(),
                description: None,
            })
            .await
            .unwrap();
        let football = store
            .create_sport(&SportInput {
                name: "Football".into(),
                facility_type_id: stadium.id,
                description: None,
            })
            .await
            .unwrap();
        let athletics = store
            .create_sport(&SportInput {
                name: "Athletics".into(),
                facility_type_id: stadium.id,
                description: None,
            })
            .await
            .unwrap();
        (store, stadium.id, football.id, athletics.id)
    }

    fn input(name: &str, type_id: i32, sports: Vec<i32>, rating: Option<f64>) -> FacilityInput {
        FacilityInput {
            name: name.into(),
            region: Region::Riyadh,
            country: "Saudi Arabia".into(),
            address: "Riyadh".into(),
            rating,
            reviews: None,
            url: None,
            facility_type_id: type_id,
            ministry_of_sports: false,
            sport_ids: sports,
        }
    }

    #[tokio::test]
    async fn association_is_kept_on_both_sides() {
        let (store, stadium, football, athletics) = seeded().await;
        let facility = store
            .create_facility(&input("Arena", stadium, vec![football, athletics], None))
            .await
            .unwrap();
        assert_eq!(facility.sport_ids, vec![football, athletics]);
        assert_eq!(facility.sports, vec!["Athletics", "Football"]);

        let sport = store.get_sport(football).await.unwrap().unwrap();
        assert_eq!(sport.facility_ids, vec![facility.id]);

        store
            .update_facility(facility.id, &input("Arena", stadium, vec![athletics], None))
            .await
            .unwrap();
        let sport = store.get_sport(football).await.unwrap().unwrap();
        assert!(sport.facility_ids.is_empty());
        let sport = store.get_sport(athletics).await.unwrap().unwrap();
        assert_eq!(sport.facility_ids, vec![facility.id]);
    }

    #[tokio::test]
    async fn unknown_sport_reference_is_rejected() {
        let (store, stadium, _, _) = seeded().await;
        let err = store
            .create_facility(&input("Arena", stadium, vec![999], None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn list_sorts_and_paginates() {
        let (store, stadium, _, _) = seeded().await;
        for (name, rating) in [("B", Some(3.0)), ("A", None), ("C", Some(5.0))] {
            store
                .create_facility(&input(name, stadium, vec![], rating))
                .await
                .unwrap();
        }
        let sort = Sort {
            column: SortColumn::Rating,
            direction: SortDirection::Desc,
        };
        let page = Page::new(Some(1), Some(10), PageLimits::FACILITY_LIST);
        let names: Vec<String> = store
            .list_facilities(&FacilityFilter::all(), sort, page)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["C", "B", "A"]);

        let page = Page::new(Some(2), Some(2), PageLimits::FACILITY_LIST);
        let second = store
            .list_facilities(&FacilityFilter::all(), sort, page)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "A");
    }

    #[tokio::test]
    async fn aggregates_respect_filter() {
        let (store, stadium, football, athletics) = seeded().await;
        store
            .create_facility(&input("A", stadium, vec![football], Some(4.0)))
            .await
            .unwrap();
        store
            .create_facility(&input("B", stadium, vec![football, athletics], Some(5.0)))
            .await
            .unwrap();
        store
            .create_facility(&input("C", stadium, vec![], None))
            .await
            .unwrap();

        let all = FacilityFilter::all();
        assert_eq!(store.count_facilities(&all).await.unwrap(), 3);
        assert_eq!(store.average_rating(&all).await.unwrap(), Some(4.5));
        assert_eq!(
            store.count_by_sport(&all).await.unwrap(),
            vec![(football, 2), (athletics, 1)]
        );

        let only_athletics = FacilityFilter::all().with(Condition::AnySport(vec![athletics]));
        assert_eq!(store.count_facilities(&only_athletics).await.unwrap(), 1);

        let nothing = FacilityFilter::all().with(Condition::Never);
        assert_eq!(store.count_facilities(&nothing).await.unwrap(), 0);
        assert_eq!(store.average_rating(&nothing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reads_are_counted() {
        let (store, _, _, _) = seeded().await;
        let before = store.reads();
        store.list_facility_types().await.unwrap();
        store.count_facilities(&FacilityFilter::all()).await.unwrap();
        assert_eq!(store.reads(), before + 2);
    }
}
