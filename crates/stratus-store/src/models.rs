//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use stratus_types::{Condition, ForecastRecord, Granularity};

/// A forecast row as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredForecast {
    /// Database row ID.
    pub id: i64,
    pub location_id: i64,
    pub temperature_c: f64,
    pub temperature_f: f64,
    pub humidity: i32,
    pub wind_speed_kph: f64,
    pub condition: Condition,
    #[serde(with = "time::serde::rfc3339")]
    pub forecast_time: OffsetDateTime,
    pub granularity: Granularity,
    /// First insert of this natural key.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Set on every overwrite by a later upsert.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified_at: Option<OffsetDateTime>,
}

impl StoredForecast {
    /// The forecast values without storage metadata.
    pub fn to_record(&self) -> ForecastRecord {
        ForecastRecord {
            location_id: self.location_id,
            temperature_c: self.temperature_c,
            temperature_f: self.temperature_f,
            humidity: self.humidity,
            wind_speed_kph: self.wind_speed_kph,
            condition: self.condition.clone(),
            forecast_time: self.forecast_time,
            granularity: self.granularity,
        }
    }
}
