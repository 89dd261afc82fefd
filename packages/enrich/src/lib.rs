#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Property enrichment pipeline.
//!
//! Orchestrates the fixed stage sequence over a property dataset: suburb
//! resolution, LGA resolution, nearest-station lookup, travel-time lookup,
//! case-count attachment, and the one-step forecast. Stages run
//! independently per property; a stage failure downgrades exactly that
//! property's field to missing (or approximate) and never aborts the run.
//! Output order always matches input order.

pub mod config;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use property_map_cases::CaseTable;
use property_map_property_models::{
    EnrichedProperty, ExportRecord, Property, RegionKind, Resolved,
};
use property_map_spatial::GeoIndex;
use property_map_transit::RouteGraph;

pub use config::EnrichmentConfig;

/// Run-level (as opposed to per-property) pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Every reference dataset is empty; nothing can be enriched. Surfaced
    /// once instead of repeating per property.
    #[error("no reference data loaded: suburbs, LGAs, and stations are all empty")]
    NoReferenceData,
}

/// Which region series supplied a property's case count.
type Attachment = Option<(RegionKind, String, bool)>;

/// The enrichment pipeline and the read-only reference data it runs over.
///
/// Reference structures are owned exclusively and never mutated after
/// construction; per-property stages share them freely.
pub struct EnrichmentPipeline {
    geo: GeoIndex,
    routes: RouteGraph,
    cases: CaseTable,
    config: EnrichmentConfig,
}

impl EnrichmentPipeline {
    /// Assembles a pipeline from pre-built reference structures.
    #[must_use]
    pub fn new(
        geo: GeoIndex,
        routes: RouteGraph,
        cases: CaseTable,
        config: EnrichmentConfig,
    ) -> Self {
        let cases = cases.with_threshold(config.similarity_threshold);
        Self {
            geo,
            routes,
            cases,
            config,
        }
    }

    /// The configuration this pipeline runs with.
    #[must_use]
    pub const fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Enriches every property, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoReferenceData`] when suburbs, LGAs, and
    /// stations are all empty. Individual empty datasets merely degrade the
    /// affected fields.
    pub fn run(&self, properties: &[Property]) -> Result<Vec<EnrichedProperty>, PipelineError> {
        let suburb_count = self.geo.region_count(RegionKind::Suburb);
        let lga_count = self.geo.region_count(RegionKind::Lga);
        let station_count = self.geo.station_count();

        if suburb_count == 0 && lga_count == 0 && station_count == 0 {
            return Err(PipelineError::NoReferenceData);
        }
        if suburb_count == 0 {
            log::warn!("No suburb polygons loaded; suburb fields will be missing");
        }
        if lga_count == 0 {
            log::warn!("No LGA polygons loaded; LGA containment fallback unavailable");
        }
        if station_count == 0 {
            log::warn!("No stations loaded; station and travel fields will be missing");
        }

        let mut enriched: Vec<EnrichedProperty> = properties
            .iter()
            .cloned()
            .map(EnrichedProperty::new)
            .collect();
        let mut attachments: Vec<Attachment> = vec![None; enriched.len()];

        for record in &mut enriched {
            record.suburb = self.resolve_suburb(&record.property);
            record.lga = self.resolve_lga(&record.property, &record.suburb);

            match self
                .geo
                .nearest_station(record.property.lat, record.property.lng)
            {
                Ok((station, km)) => {
                    record.nearest_station = Resolved::Exact(station.name.clone());
                    record.station_distance_km = Resolved::Exact(km);
                }
                Err(e) => {
                    log::debug!("No station for property {}: {e}", record.property.id);
                }
            }
        }

        self.fill_travel_times(&mut enriched);
        self.attach_case_counts(&mut enriched, &mut attachments);
        self.fill_forecasts(&mut enriched, &attachments);

        log_summary(&enriched);
        Ok(enriched)
    }

    /// Flattens enriched records into export rows, applying the configured
    /// default-value policy to fields that stayed missing.
    #[must_use]
    pub fn export(&self, enriched: &[EnrichedProperty]) -> Vec<ExportRecord> {
        enriched
            .iter()
            .map(|record| record.to_export(&self.config.defaults))
            .collect()
    }

    fn resolve_suburb(&self, property: &Property) -> Resolved<String> {
        if let Some(hint) = &property.suburb {
            return Resolved::Exact(hint.clone());
        }

        match self
            .geo
            .resolve_region(property.lat, property.lng, RegionKind::Suburb)
        {
            Ok(matched) => Resolved::flagged(matched.name, matched.approximate),
            Err(e) => {
                log::debug!("Suburb unresolved for property {}: {e}", property.id);
                Resolved::Missing
            }
        }
    }

    fn resolve_lga(&self, property: &Property, suburb: &Resolved<String>) -> Resolved<String> {
        if let Some(hint) = &property.lga {
            return Resolved::Exact(hint.clone());
        }

        // The crosswalk is authoritative when the suburb is known: each
        // suburb belongs to exactly one LGA. An approximate suburb keeps
        // its approximation when carried through.
        if let Some(name) = suburb.value()
            && let Some(lga) = self.geo.lga_for_suburb(name)
        {
            return Resolved::flagged(lga.to_string(), suburb.is_approximate());
        }

        match self
            .geo
            .resolve_region(property.lat, property.lng, RegionKind::Lga)
        {
            Ok(matched) => Resolved::flagged(matched.name, matched.approximate),
            Err(e) => {
                log::debug!("LGA unresolved for property {}: {e}", property.id);
                Resolved::Missing
            }
        }
    }

    /// Computes travel times once per distinct origin station, then fills
    /// every property from that table.
    fn fill_travel_times(&self, enriched: &mut [EnrichedProperty]) {
        let origins: BTreeSet<String> = enriched
            .iter()
            .filter_map(|record| record.nearest_station.value().cloned())
            .collect();

        let mut travel: BTreeMap<String, Option<f64>> = BTreeMap::new();
        for origin in origins {
            let minutes = match self.routes.min_travel_time(&origin) {
                Ok(minutes) => Some(minutes),
                Err(e) => {
                    log::debug!("No travel time from '{origin}': {e}");
                    None
                }
            };
            travel.insert(origin, minutes);
        }

        for record in enriched {
            if let Some(origin) = record.nearest_station.value()
                && let Some(Some(minutes)) = travel.get(origin)
            {
                record.travel_time_minutes = Resolved::Exact(*minutes);
            }
        }
    }

    fn attach_case_counts(&self, enriched: &mut [EnrichedProperty], attachments: &mut [Attachment]) {
        for (record, slot) in enriched.iter_mut().zip(attachments.iter_mut()) {
            let result = self.cases.attach(
                record.suburb.value().map(String::as_str),
                record.lga.value().map(String::as_str),
                self.config.as_of,
            );
            match result {
                Ok(attachment) => {
                    let approximate = attachment.is_approximate();
                    record.case_count = Resolved::flagged(attachment.count, approximate);
                    record.case_granularity = Some(attachment.granularity);
                    *slot = Some((attachment.granularity, attachment.region, approximate));
                }
                Err(e) => {
                    log::debug!("No case count for property {}: {e}", record.property.id);
                }
            }
        }
    }

    /// Fits one trend per distinct attached region series and broadcasts
    /// the prediction to every property holding that series.
    fn fill_forecasts(&self, enriched: &mut [EnrichedProperty], attachments: &[Attachment]) {
        let regions: BTreeSet<(RegionKind, String)> = attachments
            .iter()
            .flatten()
            .map(|(kind, region, _)| (*kind, region.clone()))
            .collect();

        let mut forecasts: BTreeMap<(RegionKind, String), Option<f64>> = BTreeMap::new();
        for (kind, region) in regions {
            let value = self.forecast_region(kind, &region);
            forecasts.insert((kind, region), value);
        }

        for (record, slot) in enriched.iter_mut().zip(attachments) {
            if let Some((kind, region, approximate)) = slot
                && let Some(Some(value)) = forecasts.get(&(*kind, region.clone()))
            {
                record.forecast_case_count = Resolved::flagged(*value, *approximate);
            }
        }
    }

    fn forecast_region(&self, kind: RegionKind, region: &str) -> Option<f64> {
        let history = self.cases.history(kind, region)?;
        let observed: Vec<(NaiveDate, u32)> = history
            .iter()
            .copied()
            .filter(|&(date, _)| date <= self.config.as_of)
            .collect();

        match property_map_forecast::forecast(&observed, self.config.forecast_window) {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("No forecast for {kind} '{region}': {e}");
                None
            }
        }
    }
}

fn log_summary(enriched: &[EnrichedProperty]) {
    let total = enriched.len();
    let present = |f: fn(&EnrichedProperty) -> bool| enriched.iter().filter(|r| f(r)).count();

    log::info!(
        "Enriched {total} properties: {}/{total} suburbs, {}/{total} LGAs, \
         {}/{total} stations, {}/{total} travel times, {}/{total} case counts, \
         {}/{total} forecasts",
        present(|r| !r.suburb.is_missing()),
        present(|r| !r.lga.is_missing()),
        present(|r| !r.nearest_station.is_missing()),
        present(|r| !r.travel_time_minutes.is_missing()),
        present(|r| !r.case_count.is_missing()),
        present(|r| !r.forecast_case_count.is_missing()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use property_map_property_models::{CaseRecord, Region, Station};
    use property_map_transit::Destination;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 9, day).expect("valid date")
    }

    fn square(name: &str, lat0: f64, lng0: f64, size: f64) -> Region {
        Region {
            name: name.to_string(),
            boundary: vec![
                (lat0, lng0),
                (lat0, lng0 + size),
                (lat0 + size, lng0 + size),
                (lat0 + size, lng0),
            ],
            population: None,
        }
    }

    fn station(name: &str, lat: f64, lng: f64, neighbors: &[(&str, f64)]) -> Station {
        Station {
            name: name.to_string(),
            lat,
            lng,
            neighbors: neighbors
                .iter()
                .map(|&(n, m)| (n.to_string(), m))
                .collect(),
        }
    }

    fn property(id: &str, lat: f64, lng: f64) -> Property {
        Property {
            id: id.to_string(),
            lat,
            lng,
            suburb: None,
            lga: None,
        }
    }

    fn geo_index() -> GeoIndex {
        GeoIndex::build(
            &[
                square("Carlton", 0.0, 0.0, 1.0),
                square("Fitzroy", 0.0, 1.0, 1.0),
            ],
            &[square("Melbourne", 0.0, 0.0, 1.0), square("Yarra", 0.0, 1.0, 1.0)],
            &[
                station("Alpha", 0.5, 0.55, &[("Beta", 5.0)]),
                station("Beta", 0.5, 0.7, &[("Alpha", 5.0)]),
                station("Isolated", 10.0, 10.0, &[]),
            ],
        )
        .with_crosswalk(BTreeMap::from([
            ("Carlton".to_string(), "Melbourne".to_string()),
            ("Fitzroy".to_string(), "Yarra".to_string()),
        ]))
    }

    fn route_graph() -> RouteGraph {
        RouteGraph::build(
            &[
                station("Alpha", 0.5, 0.55, &[("Beta", 5.0)]),
                station("Beta", 0.5, 0.7, &[("Alpha", 5.0)]),
                station("Isolated", 10.0, 10.0, &[]),
            ],
            &Destination {
                name: "Melbourne Central".to_string(),
                access: vec![("Beta".to_string(), 3.0)],
            },
        )
        .expect("non-negative edges")
    }

    fn case_table() -> CaseTable {
        let mut records = Vec::new();
        for (day, count) in [(1, 10), (2, 20), (3, 30), (4, 40)] {
            records.push(CaseRecord {
                region: "Carlton".to_string(),
                kind: RegionKind::Suburb,
                date: date(day),
                count,
            });
        }
        for (day, count) in [(1, 100), (2, 90), (3, 80), (4, 70)] {
            records.push(CaseRecord {
                region: "Yarra".to_string(),
                kind: RegionKind::Lga,
                date: date(day),
                count,
            });
        }
        CaseTable::from_records(&records)
    }

    fn pipeline() -> EnrichmentPipeline {
        EnrichmentPipeline::new(
            geo_index(),
            route_graph(),
            case_table(),
            EnrichmentConfig::new(date(4)),
        )
    }

    #[test]
    fn centroid_property_enriches_fully_exact() {
        let enriched = pipeline()
            .run(&[property("P1", 0.5, 0.5)])
            .expect("reference data present");
        let record = &enriched[0];

        assert_eq!(record.suburb, Resolved::Exact("Carlton".to_string()));
        assert_eq!(record.lga, Resolved::Exact("Melbourne".to_string()));
        assert_eq!(record.nearest_station, Resolved::Exact("Alpha".to_string()));
        assert!(record.station_distance_km.is_exact());
        assert_eq!(record.travel_time_minutes, Resolved::Exact(8.0));
        assert_eq!(record.case_count, Resolved::Exact(40));
        assert_eq!(record.case_granularity, Some(RegionKind::Suburb));
        assert_eq!(record.forecast_case_count, Resolved::Exact(50.0));
    }

    #[test]
    fn outside_point_gets_approximate_region_fields() {
        let enriched = pipeline()
            .run(&[property("P1", -0.2, 0.5)])
            .expect("reference data present");
        let record = &enriched[0];

        assert_eq!(record.suburb, Resolved::Approximate("Carlton".to_string()));
        // Crosswalk carries the suburb's approximation into the LGA.
        assert_eq!(record.lga, Resolved::Approximate("Melbourne".to_string()));
    }

    #[test]
    fn lga_level_case_data_is_flagged_approximate() {
        let enriched = pipeline()
            .run(&[property("P1", 0.5, 1.5)])
            .expect("reference data present");
        let record = &enriched[0];

        assert_eq!(record.suburb, Resolved::Exact("Fitzroy".to_string()));
        // No suburb-level series for Fitzroy; the Yarra LGA total is used.
        assert_eq!(record.case_count, Resolved::Approximate(70));
        assert_eq!(record.case_granularity, Some(RegionKind::Lga));
        // Falling series: 100, 90, 80, 70 forecasts 60, still approximate.
        assert_eq!(record.forecast_case_count, Resolved::Approximate(60.0));
    }

    #[test]
    fn unmatched_case_region_stays_missing_not_zero() {
        let mut p = property("P1", 0.5, 0.5);
        p.suburb = Some("Ballarat".to_string());
        p.lga = Some("Central Goldfields".to_string());

        let enriched = pipeline().run(&[p]).expect("reference data present");
        let record = &enriched[0];

        assert!(record.case_count.is_missing());
        assert_eq!(record.case_granularity, None);
        assert!(record.forecast_case_count.is_missing());
    }

    #[test]
    fn disconnected_station_leaves_travel_missing() {
        let enriched = pipeline()
            .run(&[property("P1", 10.0, 10.01)])
            .expect("reference data present");
        let record = &enriched[0];

        assert_eq!(record.nearest_station, Resolved::Exact("Isolated".to_string()));
        assert!(record.travel_time_minutes.is_missing());
    }

    #[test]
    fn hints_bypass_spatial_resolution() {
        let mut p = property("P1", 0.5, 0.5);
        p.suburb = Some("Carlton".to_string());
        p.lga = Some("Melbourne".to_string());

        let pipeline = EnrichmentPipeline::new(
            GeoIndex::build(&[], &[], &[station("Alpha", 0.5, 0.55, &[])]),
            route_graph(),
            case_table(),
            EnrichmentConfig::new(date(4)),
        );

        let enriched = pipeline.run(&[p]).expect("stations still loaded");
        let record = &enriched[0];

        assert_eq!(record.suburb, Resolved::Exact("Carlton".to_string()));
        assert_eq!(record.lga, Resolved::Exact("Melbourne".to_string()));
        assert_eq!(record.case_count, Resolved::Exact(40));
    }

    #[test]
    fn forecast_is_shared_across_properties_of_one_region() {
        let enriched = pipeline()
            .run(&[property("P1", 0.4, 0.4), property("P2", 0.6, 0.6)])
            .expect("reference data present");

        assert_eq!(enriched[0].forecast_case_count, Resolved::Exact(50.0));
        assert_eq!(
            enriched[0].forecast_case_count,
            enriched[1].forecast_case_count
        );
    }

    #[test]
    fn output_order_matches_input_order() {
        let properties = vec![
            property("P3", 0.5, 1.5),
            property("P1", 0.5, 0.5),
            property("P2", 10.0, 10.01),
        ];
        let enriched = pipeline().run(&properties).expect("reference data present");

        let ids: Vec<&str> = enriched.iter().map(|r| r.property.id.as_str()).collect();
        assert_eq!(ids, vec!["P3", "P1", "P2"]);
    }

    #[test]
    fn entirely_absent_reference_data_is_fatal_once() {
        let pipeline = EnrichmentPipeline::new(
            GeoIndex::build(&[], &[], &[]),
            route_graph(),
            case_table(),
            EnrichmentConfig::new(date(4)),
        );

        assert_eq!(
            pipeline.run(&[property("P1", 0.5, 0.5)]),
            Err(PipelineError::NoReferenceData)
        );
    }

    #[test]
    fn export_applies_default_policy() {
        let mut p = property("P1", 10.0, 10.01);
        p.suburb = Some("Ballarat".to_string());
        p.lga = Some("Central Goldfields".to_string());

        let pipeline = pipeline();
        let enriched = pipeline.run(&[p]).expect("reference data present");
        let rows = pipeline.export(&enriched);
        let row = &rows[0];

        // Unreachable station takes the travel sentinel; the unmatched case
        // region exports as absent, never zero.
        assert!((row.travel_time_minutes - -1.0).abs() < f64::EPSILON);
        assert_eq!(row.case_count, None);
        assert_eq!(row.nearest_station, "Isolated");
    }

    #[test]
    fn travel_times_are_memoized_across_properties() {
        let pipeline = pipeline();
        let _ = pipeline
            .run(&[property("P1", 0.5, 0.5), property("P2", 0.5, 0.6)])
            .expect("reference data present");

        assert!(pipeline.routes.is_cached("Alpha"));
    }
}
