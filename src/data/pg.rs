//! Postgres-backed [`FacilityStore`].
//!
//! Filters are rendered with [`QueryBuilder`] so every user-supplied value is a
//! bind parameter. The facility/sport relation lives only in `facility_sports`;
//! writes that touch it run in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::data::filter::{Condition, FacilityFilter, Page, Sort, SortColumn, SortDirection};
use crate::data::models::{
    ChartTitle, ChartTitleInput, Facility, FacilityInput, FacilityType, FacilityTypeInput, Sport,
    SportInput, TypeUsage,
};
use crate::data::region::Region;
use crate::data::store::{FacilityStore, GroupCount, StoreError};

const FACILITY_SELECT: &str = "SELECT f.id, f.name, f.region, f.country, f.address, f.rating, f.reviews, f.url, \
            f.facility_type_id, ft.name AS facility_type, f.ministry_of_sports, f.created_at, f.updated_at, \
            ARRAY(SELECT fs.sport_id FROM facility_sports fs WHERE fs.facility_id = f.id ORDER BY fs.sport_id) AS sport_ids, \
            ARRAY(SELECT s.name FROM facility_sports fs JOIN sports s ON s.id = fs.sport_id \
                  WHERE fs.facility_id = f.id ORDER BY s.name) AS sports \
     FROM facilities f \
     JOIN facility_types ft ON ft.id = f.facility_type_id";

const SPORT_SELECT: &str = "SELECT s.id, s.name, s.facility_type_id, ft.name AS facility_type, s.description, \
            s.created_at, s.updated_at, \
            ARRAY(SELECT fs.facility_id FROM facility_sports fs WHERE fs.sport_id = s.id ORDER BY fs.facility_id) AS facility_ids \
     FROM sports s \
     JOIN facility_types ft ON ft.id = s.facility_type_id";

const FACILITY_TYPE_COLUMNS: &str = "id, name, description, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FacilityRow {
    id: i32,
    name: String,
    region: String,
    country: String,
    address: String,
    rating: Option<f64>,
    reviews: Option<i32>,
    url: Option<String>,
    facility_type_id: i32,
    facility_type: String,
    ministry_of_sports: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sport_ids: Vec<i32>,
    sports: Vec<String>,
}

impl TryFrom<FacilityRow> for Facility {
    type Error = StoreError;

    fn try_from(row: FacilityRow) -> Result<Self, Self::Error> {
        let region = row
            .region
            .parse::<Region>()
            .map_err(|e| StoreError::Corrupt(format!("facility {}: {e}", row.id)))?;
        Ok(Facility {
            id: row.id,
            name: row.name,
            region,
            country: row.country,
            address: row.address,
            rating: row.rating,
            reviews: row.reviews,
            url: row.url,
            facility_type_id: row.facility_type_id,
            facility_type: row.facility_type,
            ministry_of_sports: row.ministry_of_sports,
            sport_ids: row.sport_ids,
            sports: row.sports,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Append `WHERE` plus one `AND` clause per condition. Facilities are aliased `f`.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &FacilityFilter) {
    qb.push(" WHERE TRUE");
    for condition in filter.conditions() {
        match condition {
            Condition::Region(region) => {
                qb.push(" AND f.region = ").push_bind(region.as_str());
            }
            Condition::RegionIn(regions) => {
                let values: Vec<String> = regions.iter().map(|r| r.as_str().to_owned()).collect();
                qb.push(" AND f.region = ANY(").push_bind(values).push(")");
            }
            Condition::AnySport(ids) => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM facility_sports fsx \
                     WHERE fsx.facility_id = f.id AND fsx.sport_id = ANY(",
                )
                .push_bind(ids.clone())
                .push("))");
            }
            Condition::FacilityTypeIn(ids) => {
                qb.push(" AND f.facility_type_id = ANY(")
                    .push_bind(ids.clone())
                    .push(")");
            }
            Condition::MinistryOfSports => {
                qb.push(" AND f.ministry_of_sports");
            }
            Condition::Search(needle) => {
                let pattern = like_pattern(needle);
                qb.push(" AND (f.name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR f.address ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
            Condition::Never => {
                qb.push(" AND FALSE");
            }
        }
    }
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn order_clause(sort: Sort) -> String {
    let column = match sort.column {
        SortColumn::Name => "f.name",
        SortColumn::Region => "f.region",
        SortColumn::Rating => "f.rating",
        SortColumn::Reviews => "f.reviews",
        SortColumn::CreatedAt => "f.created_at",
        SortColumn::UpdatedAt => "f.updated_at",
    };
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    format!(" ORDER BY {column} {direction} NULLS LAST, f.id {direction}")
}

/// Replace the sport set of one facility. Caller owns the transaction.
async fn replace_sports(
    conn: &mut PgConnection,
    facility_id: i32,
    sport_ids: &[i32],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM facility_sports WHERE facility_id = $1")
        .bind(facility_id)
        .execute(&mut *conn)
        .await?;

    if sport_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO facility_sports (facility_id, sport_id)
        SELECT $1, UNNEST($2::int[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(facility_id)
    .bind(sport_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn lowercase_all(names: &[String]) -> Vec<String> {
    names.iter().map(|n| n.trim().to_lowercase()).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn require_facility(&self, id: i32) -> Result<Facility, StoreError> {
        self.get_facility(id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("facility {id} vanished after write")))
    }

    async fn require_sport(&self, id: i32) -> Result<Sport, StoreError> {
        self.get_sport(id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("sport {id} vanished after write")))
    }
}

#[async_trait]
impl FacilityStore for PgStore {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_facility_types(&self) -> Result<Vec<FacilityType>, StoreError> {
        let rows = sqlx::query_as::<_, FacilityType>(&format!(
            "SELECT {FACILITY_TYPE_COLUMNS} FROM facility_types ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_facility_type(&self, id: i32) -> Result<Option<FacilityType>, StoreError> {
        let row = sqlx::query_as::<_, FacilityType>(&format!(
            "SELECT {FACILITY_TYPE_COLUMNS} FROM facility_types WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_facility_types_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<FacilityType>, StoreError> {
        let rows = sqlx::query_as::<_, FacilityType>(&format!(
            "SELECT {FACILITY_TYPE_COLUMNS} FROM facility_types WHERE lower(name) = ANY($1) ORDER BY name"
        ))
        .bind(lowercase_all(names))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_facility_type(
        &self,
        input: &FacilityTypeInput,
    ) -> Result<FacilityType, StoreError> {
        let row = sqlx::query_as::<_, FacilityType>(&format!(
            "INSERT INTO facility_types (name, description) VALUES ($1, $2) RETURNING {FACILITY_TYPE_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_facility_type(
        &self,
        id: i32,
        input: &FacilityTypeInput,
    ) -> Result<Option<FacilityType>, StoreError> {
        let row = sqlx::query_as::<_, FacilityType>(&format!(
            "UPDATE facility_types SET name = $2, description = $3, updated_at = now() \
             WHERE id = $1 RETURNING {FACILITY_TYPE_COLUMNS}"
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_facility_type(&self, id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM facility_types WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn facility_type_usage(&self, id: i32) -> Result<TypeUsage, StoreError> {
        let (sports, facilities): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM sports WHERE facility_type_id = $1),
                (SELECT COUNT(*) FROM facilities WHERE facility_type_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(TypeUsage { sports, facilities })
    }

    async fn list_sports(&self, facility_type_id: Option<i32>) -> Result<Vec<Sport>, StoreError> {
        let rows = sqlx::query_as::<_, Sport>(&format!(
            "{SPORT_SELECT} WHERE ($1::int IS NULL OR s.facility_type_id = $1) ORDER BY s.name, s.id"
        ))
        .bind(facility_type_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_sport(&self, id: i32) -> Result<Option<Sport>, StoreError> {
        let row = sqlx::query_as::<_, Sport>(&format!("{SPORT_SELECT} WHERE s.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_sports_by_names(&self, names: &[String]) -> Result<Vec<Sport>, StoreError> {
        let rows = sqlx::query_as::<_, Sport>(&format!(
            "{SPORT_SELECT} WHERE lower(s.name) = ANY($1) ORDER BY s.name, s.id"
        ))
        .bind(lowercase_all(names))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_sport(&self, input: &SportInput) -> Result<Sport, StoreError> {
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO sports (name, facility_type_id, description) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&input.name)
        .bind(input.facility_type_id)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await?;
        self.require_sport(id).await
    }

    async fn update_sport(&self, id: i32, input: &SportInput) -> Result<Option<Sport>, StoreError> {
        let updated: Option<i32> = sqlx::query_scalar(
            "UPDATE sports SET name = $2, facility_type_id = $3, description = $4, updated_at = now() \
             WHERE id = $1 RETURNING id",
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.facility_type_id)
        .bind(&input.description)
        .fetch_optional(&self.pool)
        .await?;
        match updated {
            Some(id) => Ok(Some(self.require_sport(id).await?)),
            None => Ok(None),
        }
    }

    async fn delete_sport(&self, id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_facilities(
        &self,
        filter: &FacilityFilter,
        sort: Sort,
        page: Page,
    ) -> Result<Vec<Facility>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(FACILITY_SELECT);
        push_filter(&mut qb, filter);
        qb.push(order_clause(sort));
        qb.push(" LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<FacilityRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Facility::try_from).collect()
    }

    async fn count_facilities(&self, filter: &FacilityFilter) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM facilities f");
        push_filter(&mut qb, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn get_facility(&self, id: i32) -> Result<Option<Facility>, StoreError> {
        let row = sqlx::query_as::<_, FacilityRow>(&format!("{FACILITY_SELECT} WHERE f.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Facility::try_from).transpose()
    }

    async fn create_facility(&self, input: &FacilityInput) -> Result<Facility, StoreError> {
        let mut tx = self.pool.begin().await?;
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO facilities
                (name, region, country, address, rating, reviews, url, facility_type_id, ministry_of_sports)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&input.name)
        .bind(input.region.as_str())
        .bind(&input.country)
        .bind(&input.address)
        .bind(input.rating)
        .bind(input.reviews)
        .bind(&input.url)
        .bind(input.facility_type_id)
        .bind(input.ministry_of_sports)
        .fetch_one(&mut *tx)
        .await?;
        replace_sports(&mut tx, id, &input.sport_ids).await?;
        tx.commit().await?;

        self.require_facility(id).await
    }

    async fn update_facility(
        &self,
        id: i32,
        input: &FacilityInput,
    ) -> Result<Option<Facility>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE facilities SET
                name = $2, region = $3, country = $4, address = $5, rating = $6, reviews = $7,
                url = $8, facility_type_id = $9, ministry_of_sports = $10, updated_at = now()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.region.as_str())
        .bind(&input.country)
        .bind(&input.address)
        .bind(input.rating)
        .bind(input.reviews)
        .bind(&input.url)
        .bind(input.facility_type_id)
        .bind(input.ministry_of_sports)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Ok(None);
        }
        replace_sports(&mut tx, id, &input.sport_ids).await?;
        tx.commit().await?;

        Ok(Some(self.require_facility(id).await?))
    }

    async fn delete_facility(&self, id: i32) -> Result<bool, StoreError> {
        // facility_sports rows cascade.
        let result = sqlx::query("DELETE FROM facilities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_facilities(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM facilities")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_by_facility_type(
        &self,
        filter: &FacilityFilter,
    ) -> Result<Vec<GroupCount<i32>>, StoreError> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT f.facility_type_id, COUNT(*) FROM facilities f");
        push_filter(&mut qb, filter);
        qb.push(" GROUP BY f.facility_type_id");
        let rows: Vec<(i32, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn count_by_sport(
        &self,
        filter: &FacilityFilter,
    ) -> Result<Vec<GroupCount<i32>>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT fs.sport_id, COUNT(*) FROM facilities f \
             JOIN facility_sports fs ON fs.facility_id = f.id",
        );
        push_filter(&mut qb, filter);
        qb.push(" GROUP BY fs.sport_id");
        let rows: Vec<(i32, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn count_by_region(
        &self,
        filter: &FacilityFilter,
    ) -> Result<Vec<GroupCount<Region>>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT f.region, COUNT(*) FROM facilities f");
        push_filter(&mut qb, filter);
        qb.push(" GROUP BY f.region");
        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(region, count)| {
                region
                    .parse::<Region>()
                    .map(|r| (r, count))
                    .map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .collect()
    }

    async fn average_rating(&self, filter: &FacilityFilter) -> Result<Option<f64>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT AVG(f.rating) FROM facilities f");
        push_filter(&mut qb, filter);
        let avg: Option<f64> = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(avg)
    }

    async fn get_chart_title(&self, id: &str) -> Result<Option<ChartTitle>, StoreError> {
        let row = sqlx::query_as::<_, ChartTitle>(
            "SELECT id, name, notes, updated_at FROM chart_titles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_chart_title(
        &self,
        id: &str,
        input: &ChartTitleInput,
    ) -> Result<ChartTitle, StoreError> {
        let row = sqlx::query_as::<_, ChartTitle>(
            r#"
            INSERT INTO chart_titles (id, name, notes)
            VALUES ($1, $2, $3)
            ON CONFLICT (id)
            DO UPDATE SET name = EXCLUDED.name, notes = EXCLUDED.notes, updated_at = now()
            RETURNING id, name, notes, updated_at
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("stadium"), "%stadium%");
        assert_eq!(like_pattern("100%_x"), "%100\\%\\_x%");
    }

    #[test]
    fn filter_renders_bind_parameters() {
        let filter = FacilityFilter::all()
            .with(Condition::Region(Region::Riyadh))
            .with(Condition::AnySport(vec![1, 2]))
            .with(Condition::MinistryOfSports)
            .with(Condition::Never);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM facilities f");
        push_filter(&mut qb, &filter);
        let sql = qb.sql();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM facilities f WHERE TRUE AND f.region = $1 \
             AND EXISTS (SELECT 1 FROM facility_sports fsx WHERE fsx.facility_id = f.id AND fsx.sport_id = ANY($2)) \
             AND f.ministry_of_sports AND FALSE"
        );
    }

    #[test]
    fn order_clause_breaks_ties_by_id() {
        let sort = Sort {
            column: SortColumn::Rating,
            direction: SortDirection::Desc,
        };
        assert_eq!(
            order_clause(sort),
            " ORDER BY f.rating DESC NULLS LAST, f.id DESC"
        );
    }
}
