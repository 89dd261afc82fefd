//! Enrichment run configuration.
//!
//! Every knob the pipeline consults is explicit here: the as-of date the
//! case counts are read at, the forecast window length, the fuzzy-match
//! threshold, and the default-value policy applied to fields that could
//! not be computed.

use chrono::NaiveDate;
use property_map_property_models::FieldDefaults;
use serde::{Deserialize, Serialize};

/// Configuration for one enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Case counts are read at the most recent date on or before this;
    /// the forecast targets the following day.
    pub as_of: NaiveDate,

    /// Number of trailing observations the trend is fitted on.
    #[serde(default = "default_forecast_window")]
    pub forecast_window: usize,

    /// Minimum similarity for fuzzy region-name matches.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Default-value policy for derived fields that stay missing.
    #[serde(default)]
    pub defaults: FieldDefaults,
}

const fn default_forecast_window() -> usize {
    14
}

const fn default_similarity_threshold() -> f64 {
    property_map_cases::SIMILARITY_THRESHOLD
}

impl EnrichmentConfig {
    /// Creates a configuration with stock values for everything but the
    /// as-of date.
    #[must_use]
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            forecast_window: default_forecast_window(),
            similarity_threshold: default_similarity_threshold(),
            defaults: FieldDefaults::default(),
        }
    }

    /// Parses a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns the TOML deserialization error for malformed input.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = EnrichmentConfig::from_toml_str(r#"as_of = "2021-09-30""#)
            .expect("valid config");

        assert_eq!(
            config.as_of,
            NaiveDate::from_ymd_opt(2021, 9, 30).expect("valid date")
        );
        assert_eq!(config.forecast_window, 14);
        assert!(
            (config.similarity_threshold - property_map_cases::SIMILARITY_THRESHOLD).abs()
                < f64::EPSILON
        );
        assert_eq!(config.defaults.suburb, "not available");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = EnrichmentConfig::from_toml_str(
            r#"
            as_of = "2021-09-30"
            forecast_window = 30
            similarity_threshold = 0.9

            [defaults]
            suburb = "unknown"
            lga = "unknown"
            nearest_station = "unknown"
            travel_time_minutes = -1.0
            "#,
        )
        .expect("valid config");

        assert_eq!(config.forecast_window, 30);
        assert!((config.similarity_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.defaults.suburb, "unknown");
        assert_eq!(config.defaults.case_count, None);
    }

    #[test]
    fn missing_as_of_is_rejected() {
        assert!(EnrichmentConfig::from_toml_str("forecast_window = 7").is_err());
    }
}
