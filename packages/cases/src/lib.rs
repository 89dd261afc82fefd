#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Case-history table and region reconciliation.
//!
//! Holds scraped per-region daily case counts keyed by normalized region
//! name and attaches them to property records. Suburb-level data is
//! preferred; LGA-level totals are used as a coarser fallback and flagged
//! as such. Name mismatches between the scraped source and the boundary
//! reference data are bridged by normalization and, failing that, by a
//! fuzzy match above a fixed similarity threshold.

pub mod normalize;
pub mod synonyms;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use property_map_property_models::{CaseRecord, RegionKind};

pub use normalize::SIMILARITY_THRESHOLD;

/// Errors from case-count attachment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaseError {
    /// The property has no resolved suburb or LGA to match against.
    #[error("property has no resolved region to match")]
    NoRegion,

    /// No table region matched the property's names above the threshold.
    #[error("no case data region matched '{0}'")]
    UnmatchedRegion(String),

    /// A region matched but holds no observation on or before the date.
    #[error("region '{region}' has no observations on or before {as_of}")]
    NoObservations {
        /// Normalized name of the matched region.
        region: String,
        /// Requested as-of date.
        as_of: NaiveDate,
    },
}

/// A case count successfully attached to a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseAttachment {
    /// Case count at the most recent date on or before the as-of date.
    pub count: u32,
    /// Normalized name of the region that supplied the count.
    pub region: String,
    /// Granularity of the matched region.
    pub granularity: RegionKind,
    /// Whether the name match was fuzzy rather than exact.
    pub fuzzy: bool,
}

impl CaseAttachment {
    /// Whether the count should be flagged approximate: fuzzy-matched, or
    /// served at coarser granularity than suburb.
    #[must_use]
    pub fn is_approximate(&self) -> bool {
        self.fuzzy || self.granularity == RegionKind::Lga
    }
}

/// One region's date-ordered observation series.
#[derive(Debug, Clone)]
struct RegionSeries {
    observations: Vec<(NaiveDate, u32)>,
}

/// Scraped case counts indexed by normalized region name and granularity.
///
/// Built once from already-parsed records and read-only afterwards, so the
/// table can be shared freely across the run.
pub struct CaseTable {
    suburbs: BTreeMap<String, RegionSeries>,
    lgas: BTreeMap<String, RegionSeries>,
    similarity_threshold: f64,
}

impl CaseTable {
    /// Builds the table from scraped records.
    ///
    /// Observations are sorted by date per region; duplicate region/date
    /// rows keep the last value with a warning. Date gaps are preserved.
    #[must_use]
    pub fn from_records(records: &[CaseRecord]) -> Self {
        let mut suburbs: BTreeMap<String, RegionSeries> = BTreeMap::new();
        let mut lgas: BTreeMap<String, RegionSeries> = BTreeMap::new();

        for record in records {
            let key = normalize::normalize(&record.region);
            if key.is_empty() {
                log::warn!("Skipping case record with blank region name");
                continue;
            }

            let map = match record.kind {
                RegionKind::Suburb => &mut suburbs,
                RegionKind::Lga => &mut lgas,
            };
            map.entry(key)
                .or_insert_with(|| RegionSeries {
                    observations: Vec::new(),
                })
                .observations
                .push((record.date, record.count));
        }

        for (name, series) in suburbs.iter_mut().chain(lgas.iter_mut()) {
            series.observations.sort_by_key(|&(date, _)| date);
            let before = series.observations.len();
            // Last write wins on duplicate dates.
            series.observations.reverse();
            series.observations.dedup_by_key(|&mut (date, _)| date);
            series.observations.reverse();
            if series.observations.len() < before {
                log::warn!(
                    "Region '{name}' had {} duplicate-date case rows, keeping latest",
                    before - series.observations.len()
                );
            }
        }

        log::info!(
            "Built case table: {} suburb series, {} LGA series",
            suburbs.len(),
            lgas.len()
        );

        Self {
            suburbs,
            lgas,
            similarity_threshold: SIMILARITY_THRESHOLD,
        }
    }

    /// Overrides the fuzzy-match acceptance threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Attaches a case count for a property's resolved regions.
    ///
    /// Tries the suburb name against suburb-level series first, then the
    /// LGA name against LGA-level series. The count is the value at the
    /// most recent date on or before `as_of`. Zero is a valid count; a
    /// missing match is an error, never a zero.
    ///
    /// # Errors
    ///
    /// [`CaseError::NoRegion`] when neither name is given,
    /// [`CaseError::UnmatchedRegion`] when nothing matches above the
    /// threshold, [`CaseError::NoObservations`] when the matched series
    /// has no data on or before `as_of`.
    pub fn attach(
        &self,
        suburb: Option<&str>,
        lga: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<CaseAttachment, CaseError> {
        if suburb.is_none() && lga.is_none() {
            return Err(CaseError::NoRegion);
        }

        let attempts = [
            (suburb, RegionKind::Suburb, &self.suburbs),
            (lga, RegionKind::Lga, &self.lgas),
        ];

        let mut matched: Option<(String, RegionKind, bool, &RegionSeries)> = None;
        for (name, kind, map) in attempts {
            let Some(name) = name else {
                continue;
            };
            if let Some((key, fuzzy, series)) = Self::lookup(map, name, self.similarity_threshold) {
                matched = Some((key, kind, fuzzy, series));
                break;
            }
        }

        let Some((region, granularity, fuzzy, series)) = matched else {
            let requested = suburb.or(lga).unwrap_or_default();
            return Err(CaseError::UnmatchedRegion(requested.to_string()));
        };

        let upto = series
            .observations
            .partition_point(|&(date, _)| date <= as_of);
        if upto == 0 {
            return Err(CaseError::NoObservations { region, as_of });
        }
        let (_, count) = series.observations[upto - 1];

        Ok(CaseAttachment {
            count,
            region,
            granularity,
            fuzzy,
        })
    }

    /// Date-ordered observations for a region matched by [`Self::attach`]
    /// (keyed by the normalized name it returned).
    #[must_use]
    pub fn history(&self, kind: RegionKind, region: &str) -> Option<&[(NaiveDate, u32)]> {
        let map = match kind {
            RegionKind::Suburb => &self.suburbs,
            RegionKind::Lga => &self.lgas,
        };
        map.get(region).map(|series| series.observations.as_slice())
    }

    /// Number of distinct regions at the given granularity.
    #[must_use]
    pub fn region_count(&self, kind: RegionKind) -> usize {
        match kind {
            RegionKind::Suburb => self.suburbs.len(),
            RegionKind::Lga => self.lgas.len(),
        }
    }

    /// Finds the series for `name`: exact normalized match first, then the
    /// best fuzzy match at or above `threshold`. Fuzzy ties break to the
    /// lexicographically smallest region so lookups are deterministic.
    fn lookup<'t>(
        map: &'t BTreeMap<String, RegionSeries>,
        name: &str,
        threshold: f64,
    ) -> Option<(String, bool, &'t RegionSeries)> {
        let key = normalize::normalize(name);
        if let Some(series) = map.get(&key) {
            return Some((key, false, series));
        }

        let mut best: Option<(f64, &String)> = None;
        for candidate in map.keys() {
            let score = normalize::similarity(&key, candidate);
            if score < threshold {
                continue;
            }
            let better = best.is_none_or(|(best_score, best_key)| {
                score > best_score
                    || ((score - best_score).abs() < f64::EPSILON && candidate < best_key)
            });
            if better {
                best = Some((score, candidate));
            }
        }

        best.map(|(score, matched)| {
            log::debug!("Fuzzy-matched region '{name}' to '{matched}' (score {score:.3})");
            (matched.clone(), true, &map[matched])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 9, day).expect("valid date")
    }

    fn record(region: &str, kind: RegionKind, day: u32, count: u32) -> CaseRecord {
        CaseRecord {
            region: region.to_string(),
            kind,
            date: date(day),
            count,
        }
    }

    fn table() -> CaseTable {
        CaseTable::from_records(&[
            record("Carlton", RegionKind::Suburb, 1, 5),
            record("Carlton", RegionKind::Suburb, 3, 9),
            record("St Kilda", RegionKind::Suburb, 2, 0),
            record("MELBOURNE", RegionKind::Lga, 1, 40),
            record("MELBOURNE", RegionKind::Lga, 2, 44),
            record("Mornington Peninsula", RegionKind::Lga, 2, 7),
        ])
    }

    #[test]
    fn exact_suburb_match_is_not_approximate() {
        let attachment = table()
            .attach(Some("Carlton"), Some("MELBOURNE"), date(3))
            .expect("suburb data present");

        assert_eq!(attachment.count, 9);
        assert_eq!(attachment.granularity, RegionKind::Suburb);
        assert!(!attachment.fuzzy);
        assert!(!attachment.is_approximate());
    }

    #[test]
    fn normalization_bridges_spelling_differences() {
        let attachment = table()
            .attach(Some("ST. KILDA"), None, date(2))
            .expect("normalized match");

        assert_eq!(attachment.count, 0);
        assert!(!attachment.fuzzy, "normalized match is exact, not fuzzy");
    }

    #[test]
    fn zero_count_is_a_value_not_missing() {
        let attachment = table()
            .attach(Some("St Kilda"), None, date(2))
            .expect("zero is valid data");
        assert_eq!(attachment.count, 0);
    }

    #[test]
    fn lga_fallback_is_flagged_approximate() {
        let attachment = table()
            .attach(Some("Docklands"), Some("Melbourne"), date(2))
            .expect("LGA data present");

        assert_eq!(attachment.count, 44);
        assert_eq!(attachment.granularity, RegionKind::Lga);
        assert!(attachment.is_approximate());
    }

    #[test]
    fn fuzzy_match_above_threshold_is_flagged() {
        let attachment = table()
            .attach(None, Some("Mornington Peninsular"), date(2))
            .expect("fuzzy match");

        assert_eq!(attachment.count, 7);
        assert!(attachment.fuzzy);
        assert!(attachment.is_approximate());
    }

    #[test]
    fn below_threshold_is_unmatched_not_zero() {
        let result = table().attach(Some("Ballarat"), None, date(2));
        assert_eq!(
            result,
            Err(CaseError::UnmatchedRegion("Ballarat".to_string()))
        );
    }

    #[test]
    fn no_region_names_is_an_error() {
        assert_eq!(table().attach(None, None, date(2)), Err(CaseError::NoRegion));
    }

    #[test]
    fn uses_most_recent_date_before_gap() {
        // Carlton has observations on the 1st and 3rd only.
        let attachment = table()
            .attach(Some("Carlton"), None, date(2))
            .expect("gap reads back to the 1st");
        assert_eq!(attachment.count, 5);
    }

    #[test]
    fn date_before_first_observation_is_no_observations() {
        let result = table().attach(Some("St Kilda"), None, date(1));
        assert!(matches!(result, Err(CaseError::NoObservations { .. })));
    }

    #[test]
    fn attachment_is_idempotent() {
        let table = table();
        let first = table.attach(Some("Docklands"), Some("Melbourne"), date(2));
        let second = table.attach(Some("Docklands"), Some("Melbourne"), date(2));
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_dates_keep_the_last_row() {
        let table = CaseTable::from_records(&[
            record("Carlton", RegionKind::Suburb, 1, 5),
            record("Carlton", RegionKind::Suburb, 1, 8),
        ]);

        let attachment = table
            .attach(Some("Carlton"), None, date(1))
            .expect("data present");
        assert_eq!(attachment.count, 8);
    }

    #[test]
    fn history_is_date_ordered() {
        let table = table();
        let history = table
            .history(RegionKind::Suburb, "carlton")
            .expect("series exists");
        assert_eq!(history, &[(date(1), 5), (date(3), 9)]);
    }
}
