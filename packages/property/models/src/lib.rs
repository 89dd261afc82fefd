#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Shared data types for the property enrichment pipeline.
//!
//! This crate defines the plain records exchanged between the spatial index,
//! the transit router, the case-data merger, and the enrichment pipeline.
//! Reference types ([`Region`], [`Station`], [`CaseRecord`]) are read-only
//! after load; [`EnrichedProperty`] is the single mutable record the pipeline
//! writes derived fields into, one stage per field.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Granularity of an administrative region.
///
/// Suburbs partition the study area; LGAs (local government areas) partition
/// it at a coarser granularity, with each suburb belonging to exactly one LGA.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RegionKind {
    /// Fine-grained locality polygon.
    Suburb,
    /// Local government area, coarser than a suburb.
    Lga,
}

/// A derived field value together with how it was obtained.
///
/// Downstream consumers must be able to tell an exactly-computed value from
/// one produced by a fallback (nearest-boundary region, coarser-granularity
/// case count, fuzzy name match) and both from a value that could not be
/// computed at all. Zero is a valid value and is never conflated with
/// [`Resolved::Missing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolved<T> {
    /// Computed directly, no fallback involved.
    Exact(T),
    /// Computed through a fallback or approximation.
    Approximate(T),
    /// Could not be computed.
    #[default]
    Missing,
}

impl<T> Resolved<T> {
    /// Wraps `value`, choosing the variant from an `approximate` flag.
    pub fn flagged(value: T, approximate: bool) -> Self {
        if approximate {
            Self::Approximate(value)
        } else {
            Self::Exact(value)
        }
    }

    /// Returns the contained value, if any.
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Exact(v) | Self::Approximate(v) => Some(v),
            Self::Missing => None,
        }
    }

    /// Consumes the wrapper, returning the contained value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Exact(v) | Self::Approximate(v) => Some(v),
            Self::Missing => None,
        }
    }

    /// Whether the value was computed without any fallback.
    pub const fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// Whether the value came from a fallback or approximation.
    pub const fn is_approximate(&self) -> bool {
        matches!(self, Self::Approximate(_))
    }

    /// Whether no value could be computed.
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Converts from `&Resolved<T>` to `Resolved<&T>`.
    pub const fn as_ref(&self) -> Resolved<&T> {
        match self {
            Self::Exact(v) => Resolved::Exact(v),
            Self::Approximate(v) => Resolved::Approximate(v),
            Self::Missing => Resolved::Missing,
        }
    }

    /// Maps the contained value, preserving provenance.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Self::Exact(v) => Resolved::Exact(f(v)),
            Self::Approximate(v) => Resolved::Approximate(f(v)),
            Self::Missing => Resolved::Missing,
        }
    }
}

/// A raw property row as produced by the upstream parsing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Stable property identifier.
    pub id: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Pre-filled suburb name, if the source already knew it.
    #[serde(default)]
    pub suburb: Option<String>,
    /// Pre-filled LGA name, if the source already knew it.
    #[serde(default)]
    pub lga: Option<String>,
}

/// An administrative region boundary (suburb or LGA).
///
/// The boundary is an ordered ring of `(lat, lng)` vertices. The ring may be
/// open (first vertex not repeated); the spatial index closes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Region name as it appears in the reference dataset.
    pub name: String,
    /// Ordered boundary ring of `(lat, lng)` vertices.
    pub boundary: Vec<(f64, f64)>,
    /// Resident population, when the dataset carries it.
    #[serde(default)]
    pub population: Option<u64>,
}

/// A train station and its adjacency in the transit network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Station name, unique within the dataset.
    pub name: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Adjacent stations as `(station_name, travel_minutes)` edges.
    #[serde(default)]
    pub neighbors: Vec<(String, f64)>,
}

/// One scraped case-count observation for a region on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Region name as reported by the scraped source.
    pub region: String,
    /// Granularity the source reports at.
    pub kind: RegionKind,
    /// Observation date.
    pub date: NaiveDate,
    /// Case count on that date. Non-negative by construction.
    pub count: u32,
}

/// A property with every derived field the pipeline computes.
///
/// Each enrichment stage writes exactly one field; fields left
/// [`Resolved::Missing`] record a per-property stage failure without
/// aborting the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedProperty {
    /// The input row this record was derived from.
    pub property: Property,
    /// Containing (or nearest, when approximate) suburb.
    pub suburb: Resolved<String>,
    /// Containing (or nearest, when approximate) LGA.
    pub lga: Resolved<String>,
    /// Name of the nearest station by great-circle distance.
    pub nearest_station: Resolved<String>,
    /// Great-circle distance to the nearest station, kilometres.
    pub station_distance_km: Resolved<f64>,
    /// Minimum travel time from the nearest station to the fixed
    /// destination, minutes.
    pub travel_time_minutes: Resolved<f64>,
    /// Case count for the property's region as of the pipeline's as-of date.
    pub case_count: Resolved<u32>,
    /// Which granularity supplied `case_count`, when one did.
    pub case_granularity: Option<RegionKind>,
    /// One-step trend forecast for the day after the as-of date.
    pub forecast_case_count: Resolved<f64>,
}

impl EnrichedProperty {
    /// Creates an enriched record with every derived field missing.
    #[must_use]
    pub const fn new(property: Property) -> Self {
        Self {
            property,
            suburb: Resolved::Missing,
            lga: Resolved::Missing,
            nearest_station: Resolved::Missing,
            station_distance_km: Resolved::Missing,
            travel_time_minutes: Resolved::Missing,
            case_count: Resolved::Missing,
            case_granularity: None,
            forecast_case_count: Resolved::Missing,
        }
    }

    /// Flattens this record into the export row shape, substituting the
    /// configured defaults for missing fields.
    #[must_use]
    pub fn to_export(&self, defaults: &FieldDefaults) -> ExportRecord {
        ExportRecord {
            id: self.property.id.clone(),
            lat: round6(self.property.lat),
            lng: round6(self.property.lng),
            suburb: self
                .suburb
                .value()
                .cloned()
                .unwrap_or_else(|| defaults.suburb.clone()),
            suburb_approximate: self.suburb.is_approximate(),
            lga: self
                .lga
                .value()
                .cloned()
                .unwrap_or_else(|| defaults.lga.clone()),
            lga_approximate: self.lga.is_approximate(),
            nearest_station: self
                .nearest_station
                .value()
                .cloned()
                .unwrap_or_else(|| defaults.nearest_station.clone()),
            station_distance_km: self.station_distance_km.value().copied(),
            travel_time_minutes: self
                .travel_time_minutes
                .value()
                .copied()
                .unwrap_or(defaults.travel_time_minutes),
            case_count: self.case_count.value().copied().or(defaults.case_count),
            case_count_approximate: self.case_count.is_approximate(),
            forecast_case_count: self.forecast_case_count.value().copied(),
        }
    }
}

/// Flat output row handed to the export stage.
///
/// Field names are a stable contract with downstream consumers; the
/// `*_approximate` flags distinguish fallback-derived values from exact ones,
/// and `Option` fields distinguish missing from present (including zero).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub suburb: String,
    pub suburb_approximate: bool,
    pub lga: String,
    pub lga_approximate: bool,
    pub nearest_station: String,
    pub station_distance_km: Option<f64>,
    pub travel_time_minutes: f64,
    pub case_count: Option<u32>,
    pub case_count_approximate: bool,
    pub forecast_case_count: Option<f64>,
}

/// Explicit default-value policy for derived fields.
///
/// Applied once at export time; stages never fill defaults inline. The
/// stock values mirror the placeholders the upstream consumers expect
/// (`"not available"` region names, `-1` travel minutes, absent case count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDefaults {
    /// Placeholder for an unresolved suburb.
    pub suburb: String,
    /// Placeholder for an unresolved LGA.
    pub lga: String,
    /// Placeholder for an unresolved nearest station.
    pub nearest_station: String,
    /// Sentinel for an unresolved travel time, minutes.
    pub travel_time_minutes: f64,
    /// Value exported for a missing case count. `None` keeps the field
    /// empty rather than inventing a zero.
    pub case_count: Option<u32>,
}

impl Default for FieldDefaults {
    fn default() -> Self {
        Self {
            suburb: "not available".to_string(),
            lga: "not available".to_string(),
            nearest_station: "not available".to_string(),
            travel_time_minutes: -1.0,
            case_count: None,
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property() -> Property {
        Property {
            id: "P1".to_string(),
            lat: -37.810_272_9,
            lng: 144.962_567_1,
            suburb: None,
            lga: None,
        }
    }

    #[test]
    fn resolved_defaults_to_missing() {
        let value: Resolved<u32> = Resolved::default();
        assert!(value.is_missing());
        assert_eq!(value.value(), None);
    }

    #[test]
    fn resolved_flagged_picks_variant() {
        assert!(Resolved::flagged(1, false).is_exact());
        assert!(Resolved::flagged(1, true).is_approximate());
    }

    #[test]
    fn resolved_map_preserves_provenance() {
        let approx = Resolved::Approximate(2).map(|v| v * 10);
        assert_eq!(approx, Resolved::Approximate(20));
    }

    #[test]
    fn zero_count_is_not_missing() {
        let count = Resolved::Exact(0u32);
        assert!(!count.is_missing());
        assert_eq!(count.value(), Some(&0));
    }

    #[test]
    fn export_applies_defaults_to_missing_fields() {
        let enriched = EnrichedProperty::new(property());
        let row = enriched.to_export(&FieldDefaults::default());

        assert_eq!(row.suburb, "not available");
        assert_eq!(row.lga, "not available");
        assert!((row.travel_time_minutes - -1.0).abs() < f64::EPSILON);
        assert_eq!(row.case_count, None);
        assert!(!row.case_count_approximate);
    }

    #[test]
    fn export_rounds_coordinates_to_six_places() {
        let enriched = EnrichedProperty::new(property());
        let row = enriched.to_export(&FieldDefaults::default());

        assert!((row.lat - -37.810_273).abs() < 1e-9);
        assert!((row.lng - 144.962_567).abs() < 1e-9);
    }

    #[test]
    fn export_field_names_are_stable() {
        let mut enriched = EnrichedProperty::new(property());
        enriched.suburb = Resolved::Exact("Carlton".to_string());
        enriched.case_count = Resolved::Approximate(12);

        let json = serde_json::to_value(enriched.to_export(&FieldDefaults::default()))
            .expect("export record serializes");

        for key in [
            "suburb",
            "lga",
            "nearest_station",
            "station_distance_km",
            "travel_time_minutes",
            "case_count",
            "case_count_approximate",
            "forecast_case_count",
        ] {
            assert!(json.get(key).is_some(), "missing export field {key}");
        }
        assert_eq!(json["case_count"], 12);
        assert_eq!(json["case_count_approximate"], true);
    }

    #[test]
    fn region_kind_string_forms() {
        assert_eq!(RegionKind::Suburb.to_string(), "SUBURB");
        assert_eq!(RegionKind::Lga.to_string(), "LGA");
        assert_eq!("LGA".parse::<RegionKind>().ok(), Some(RegionKind::Lga));
    }
}
