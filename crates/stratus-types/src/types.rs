//! Core types for forecast data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Whether a forecast record is a full-day aggregate or a single-hour reading.
///
/// Serialized and stored as the lowercase labels `"day"` and `"hour"`.
///
/// ```
/// use stratus_types::Granularity;
///
/// assert_eq!(Granularity::Day.as_str(), "day");
/// assert_eq!("hour".parse::<Granularity>(), Ok(Granularity::Hour));
/// assert!("minute".parse::<Granularity>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Granularity {
    /// Aggregate for a whole calendar day.
    Day,
    /// Reading for a single hour.
    Hour,
}

impl Granularity {
    /// Storage label for this granularity.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Hour => "hour",
        }
    }
}

impl FromStr for Granularity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Granularity::Day),
            "hour" => Ok(Granularity::Hour),
            other => Err(ParseError::UnknownGranularity(other.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weather condition as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Condition {
    /// Human-readable condition, e.g. "Partly cloudy".
    pub text: String,
    /// Icon reference (usually a protocol-relative URL).
    pub icon: String,
}

/// A tracked location.
///
/// The `name` doubles as the provider query key when syncing forecasts.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Location {
    /// Registry identifier.
    pub id: i64,
    /// Display name, sent as `q=` to the provider.
    pub name: String,
    /// Region or state.
    pub region: String,
    /// Country.
    pub country: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// When the location was registered.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
    /// Last update, if any.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub last_modified_at: Option<OffsetDateTime>,
    /// Soft-delete marker. Deleted locations are invisible to sync and queries.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Location {
    /// Whether the location has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for registering a new location.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NewLocation {
    pub name: String,
    pub region: String,
    pub country: String,
    #[cfg_attr(feature = "serde", serde(rename = "lat", default))]
    pub latitude: f64,
    #[cfg_attr(feature = "serde", serde(rename = "lon", default))]
    pub longitude: f64,
}

impl NewLocation {
    /// Check that the descriptive fields are present.
    ///
    /// ```
    /// use stratus_types::NewLocation;
    ///
    /// let loc = NewLocation {
    ///     name: "Jakarta".into(),
    ///     region: "Jakarta Raya".into(),
    ///     country: "Indonesia".into(),
    ///     ..Default::default()
    /// };
    /// assert!(loc.validate().is_ok());
    /// assert!(NewLocation::default().validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ParseError> {
        let fields = [
            ("name", &self.name),
            ("region", &self.region),
            ("country", &self.country),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ParseError::InvalidField {
                    field,
                    message: "please check your parameter".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Sort order for location listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocationSort {
    #[default]
    CreatedAtAsc,
    CreatedAtDesc,
    NameAsc,
    NameDesc,
}

impl LocationSort {
    /// SQL `ORDER BY` fragment for this sort.
    #[must_use]
    pub fn order_clause(&self) -> &'static str {
        match self {
            LocationSort::CreatedAtAsc => "created_at ASC, id ASC",
            LocationSort::CreatedAtDesc => "created_at DESC, id DESC",
            LocationSort::NameAsc => "name ASC",
            LocationSort::NameDesc => "name DESC",
        }
    }
}

impl FromStr for LocationSort {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at_ascend" => Ok(LocationSort::CreatedAtAsc),
            "created_at_descend" => Ok(LocationSort::CreatedAtDesc),
            "name_ascend" => Ok(LocationSort::NameAsc),
            "name_descend" => Ok(LocationSort::NameDesc),
            other => Err(ParseError::UnknownSort(other.to_string())),
        }
    }
}

/// One normalized forecast entry, ready to be upserted.
///
/// The tuple `(location_id, forecast_time, granularity)` is the natural key:
/// persisting a second record with the same key overwrites the first.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForecastRecord {
    /// Owning location.
    pub location_id: i64,
    /// Temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Temperature in degrees Fahrenheit.
    pub temperature_f: f64,
    /// Relative humidity percentage.
    pub humidity: i32,
    /// Wind speed in km/h.
    pub wind_speed_kph: f64,
    /// Condition text and icon.
    pub condition: Condition,
    /// Start of the day or hour this record describes.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub forecast_time: OffsetDateTime,
    /// Day aggregate or hourly reading.
    pub granularity: Granularity,
}

impl ForecastRecord {
    /// The natural key used for upserts.
    #[must_use]
    pub fn natural_key(&self) -> (i64, i64, Granularity) {
        (
            self.location_id,
            self.forecast_time.unix_timestamp(),
            self.granularity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_round_trip_labels() {
        for g in [Granularity::Day, Granularity::Hour] {
            assert_eq!(g.as_str().parse::<Granularity>().unwrap(), g);
            assert_eq!(g.to_string(), g.as_str());
        }
    }

    #[test]
    fn test_location_sort_parse() {
        assert_eq!(
            "name_descend".parse::<LocationSort>().unwrap(),
            LocationSort::NameDesc
        );
        let err = "size_ascend".parse::<LocationSort>().unwrap_err();
        assert!(err.to_string().contains("Invalid sort_by"));
    }

    #[test]
    fn test_new_location_validate_reports_field() {
        let loc = NewLocation {
            name: "Bandung".into(),
            region: "".into(),
            country: "Indonesia".into(),
            ..Default::default()
        };
        let err = loc.validate().unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_new_location_uses_short_coordinate_names() {
        let loc: NewLocation = serde_json::from_str(
            r#"{"name":"Oslo","region":"Oslo","country":"Norway","lat":59.91,"lon":10.75}"#,
        )
        .unwrap();
        assert_eq!(loc.latitude, 59.91);
        assert_eq!(loc.longitude, 10.75);
    }
}
