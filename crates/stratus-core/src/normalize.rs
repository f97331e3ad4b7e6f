//! Flattening of provider day/hour forecasts into keyed records.
//!
//! [`normalize`] is pure: no I/O, no clock. A malformed day date only drops
//! that day's aggregate record; its hours are still processed. A malformed
//! hour time only drops that hour. Nothing aborts the whole payload.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, warn};

use stratus_types::{Condition, ForecastRecord, Granularity};

use crate::payload::{DayAggregate, ForecastPayload, HourEntry, ProviderCondition};

/// Format of `forecastday[].date`.
pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Format of `forecastday[].hour[].time`.
pub const HOUR_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// A day or hour entry whose timestamp could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("malformed {granularity} entry {value:?}: {source}")]
pub struct MalformedEntry {
    pub granularity: Granularity,
    pub value: String,
    #[source]
    pub source: time::error::Parse,
}

/// Parse a `YYYY-MM-DD` date into midnight of that day.
pub fn parse_day(value: &str) -> Result<OffsetDateTime, MalformedEntry> {
    Date::parse(value, DATE_FORMAT)
        .map(|d| d.midnight().assume_utc())
        .map_err(|source| MalformedEntry {
            granularity: Granularity::Day,
            value: value.to_string(),
            source,
        })
}

/// Parse a `YYYY-MM-DD HH:MM` timestamp.
pub fn parse_hour(value: &str) -> Result<OffsetDateTime, MalformedEntry> {
    PrimitiveDateTime::parse(value, HOUR_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|source| MalformedEntry {
            granularity: Granularity::Hour,
            value: value.to_string(),
            source,
        })
}

/// Flatten one provider response into records for `location_id`.
///
/// Output order is each day's DAY record followed by its HOUR records, in
/// the payload's day order. Fractional humidity is truncated.
pub fn normalize(location_id: i64, payload: &ForecastPayload) -> Vec<ForecastRecord> {
    let mut records = Vec::with_capacity(payload.day_count() + payload.hour_count());
    let mut skipped = 0usize;

    for day in &payload.forecast.forecastday {
        match parse_day(&day.date) {
            Ok(forecast_time) => records.push(day_record(location_id, forecast_time, &day.day)),
            Err(e) => {
                warn!("Skipping day entry for location {}: {}", location_id, e);
                skipped += 1;
            }
        }

        for hour in &day.hour {
            match parse_hour(&hour.time) {
                Ok(forecast_time) => records.push(hour_record(location_id, forecast_time, hour)),
                Err(e) => {
                    warn!("Skipping hour entry for location {}: {}", location_id, e);
                    skipped += 1;
                }
            }
        }
    }

    debug!(
        "Normalized {} records for location {} ({} skipped)",
        records.len(),
        location_id,
        skipped
    );
    records
}

fn day_record(location_id: i64, forecast_time: OffsetDateTime, day: &DayAggregate) -> ForecastRecord {
    ForecastRecord {
        location_id,
        temperature_c: day.avgtemp_c,
        temperature_f: day.avgtemp_f,
        humidity: day.avghumidity as i32,
        wind_speed_kph: day.maxwind_kph,
        condition: condition(&day.condition),
        forecast_time,
        granularity: Granularity::Day,
    }
}

fn hour_record(location_id: i64, forecast_time: OffsetDateTime, hour: &HourEntry) -> ForecastRecord {
    ForecastRecord {
        location_id,
        temperature_c: hour.temp_c,
        temperature_f: hour.temp_f,
        humidity: hour.humidity as i32,
        wind_speed_kph: hour.wind_kph,
        condition: condition(&hour.condition),
        forecast_time,
        granularity: Granularity::Hour,
    }
}

fn condition(c: &ProviderCondition) -> Condition {
    Condition {
        text: c.text.clone(),
        icon: c.icon.clone(),
    }
}
