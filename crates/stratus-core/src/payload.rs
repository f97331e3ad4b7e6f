//! Wire format of the WeatherAPI `forecast.json` response.
//!
//! Only the fields the normalizer reads are modelled. Every struct is
//! `#[serde(default)]` so a missing block degrades to zero values instead of
//! failing the whole decode.

use serde::{Deserialize, Serialize};

/// Top-level `forecast.json` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastPayload {
    pub location: ProviderLocation,
    pub forecast: ForecastBlock,
}

impl ForecastPayload {
    /// Total number of day entries.
    pub fn day_count(&self) -> usize {
        self.forecast.forecastday.len()
    }

    /// Total number of hour entries across all days.
    pub fn hour_count(&self) -> usize {
        self.forecast
            .forecastday
            .iter()
            .map(|d| d.hour.len())
            .sum()
    }
}

/// Location as resolved by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderLocation {
    pub name: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub tz_id: String,
    pub localtime: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastBlock {
    pub forecastday: Vec<ForecastDay>,
}

/// One day of forecast with its nested hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastDay {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub day: DayAggregate,
    pub hour: Vec<HourEntry>,
}

/// Day-level aggregate values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayAggregate {
    pub avgtemp_c: f64,
    pub avgtemp_f: f64,
    pub maxwind_kph: f64,
    pub avghumidity: f64,
    pub condition: ProviderCondition,
}

/// Single hour of forecast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HourEntry {
    /// `YYYY-MM-DD HH:MM`.
    pub time: String,
    pub temp_c: f64,
    pub temp_f: f64,
    pub humidity: f64,
    pub wind_kph: f64,
    pub condition: ProviderCondition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCondition {
    pub text: String,
    pub icon: String,
    pub code: i64,
}
