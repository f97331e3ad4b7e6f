//! Query builders for forecasts and locations.
//!
//! Both builders exclude soft-deleted rows unconditionally.
//!
//! # Example
//!
//! ```
//! use stratus_store::{ForecastQuery, LocationQuery, Store};
//! use stratus_types::{Granularity, LocationSort};
//!
//! let store = Store::open_in_memory()?;
//!
//! // Second page of ten, newest forecast first
//! let query = ForecastQuery::new().location(1).limit(10).offset(10);
//! let rows = store.query_forecasts(&query)?;
//! assert!(rows.is_empty());
//!
//! // Hourly entries only, in chronological order
//! let hourly = ForecastQuery::new()
//!     .location(1)
//!     .granularity(Granularity::Hour)
//!     .oldest_first();
//! let _ = store.query_forecasts(&hourly)?;
//!
//! let locations = store.get_locations(
//!     &LocationQuery::new().name_like("jak").sort(LocationSort::NameAsc).limit(5),
//! )?;
//! assert!(locations.is_empty());
//! # Ok::<(), stratus_store::Error>(())
//! ```

use time::OffsetDateTime;

use stratus_types::{Granularity, LocationSort};

/// Fluent query builder for stored forecasts.
///
/// By default results are ordered by `forecast_time` descending (newest
/// first); entries sharing a timestamp list the day aggregate first.
#[derive(Debug, Default, Clone)]
pub struct ForecastQuery {
    /// Filter by location.
    pub location_id: Option<i64>,
    /// Filter by granularity.
    pub granularity: Option<Granularity>,
    /// Forecast time at or after.
    pub since: Option<OffsetDateTime>,
    /// Forecast time at or before.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by forecast_time descending.
    pub newest_first: bool,
}

impl ForecastQuery {
    /// Create a query over all live forecasts, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    pub fn location(mut self, location_id: i64) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results. Use with `limit()` for pagination.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order by `forecast_time` ascending.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["deleted_at IS NULL"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(location_id) = self.location_id {
            conditions.push("location_id = ?");
            params.push(Box::new(location_id));
        }

        if let Some(granularity) = self.granularity {
            conditions.push("granularity = ?");
            params.push(Box::new(granularity.as_str()));
        }

        if let Some(since) = self.since {
            conditions.push("forecast_time >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("forecast_time <= ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, location_id, temperature_c, temperature_f, humidity, wind_speed_kph, \
             condition_text, condition_icon, forecast_time, granularity, created_at, last_modified_at \
             FROM weathers {} ORDER BY forecast_time {}, granularity ASC",
            where_clause, order
        );
        push_paging(&mut sql, self.limit, self.offset);
        sql
    }
}

/// Fluent query builder for the location registry.
#[derive(Debug, Default, Clone)]
pub struct LocationQuery {
    /// Exact id match.
    pub id: Option<i64>,
    /// Case-insensitive substring of the name.
    pub name_like: Option<String>,
    /// Result ordering.
    pub sort: LocationSort,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl LocationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Match names containing `fragment`, ignoring case. Empty is ignored.
    pub fn name_like(mut self, fragment: &str) -> Self {
        if !fragment.is_empty() {
            self.name_like = Some(fragment.to_string());
        }
        self
    }

    pub fn sort(mut self, sort: LocationSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["deleted_at IS NULL"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(id) = self.id {
            conditions.push("id = ?");
            params.push(Box::new(id));
        }

        if let Some(ref fragment) = self.name_like {
            conditions.push("name LIKE ? ESCAPE '\\'");
            params.push(Box::new(format!("%{}%", escape_like(fragment))));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let mut sql = format!(
            "SELECT id, name, region, country, latitude, longitude, created_at, last_modified_at, deleted_at \
             FROM locations {} ORDER BY {}",
            where_clause,
            self.sort.order_clause()
        );
        push_paging(&mut sql, self.limit, self.offset);
        sql
    }
}

fn push_paging(sql: &mut String, limit: Option<u32>, offset: Option<u32>) {
    match (limit, offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
        // SQLite requires LIMIT before OFFSET; -1 means unbounded.
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
        (None, None) => {}
    }
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
