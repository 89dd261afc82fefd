#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for property attribution.
//!
//! Builds R-tree indexes over suburb and LGA boundary polygons at load time
//! and answers point-in-polygon and nearest-station queries for the
//! enrichment pipeline. Reference data is owned exclusively by the index and
//! read-only after construction.

use std::collections::BTreeMap;

use geo::{
    BoundingRect, Contains, Distance, Euclidean, Haversine, LineString, MultiPolygon, Point,
    Polygon,
};
use geojson::GeoJson;
use property_map_property_models::{Region, RegionKind, Station};
use rstar::{AABB, RTree, RTreeObject};

/// Errors from spatial lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeoIndexError {
    /// The index holds zero polygons of the requested kind.
    #[error("no {0} reference polygons loaded")]
    NoReferenceData(RegionKind),

    /// The index holds zero stations.
    #[error("no station reference data loaded")]
    NoStations,
}

/// Result of resolving a point against a set of region polygons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMatch {
    /// Name of the containing (or nearest) region.
    pub name: String,
    /// `true` when no polygon contained the point and the nearest boundary
    /// was used as a fallback.
    pub approximate: bool,
}

/// A boundary polygon stored in the R-tree with its metadata.
struct RegionEntry {
    name: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial indexes for suburbs, LGAs, and stations.
///
/// Constructed once and shared across the whole run. Lookups never mutate
/// the index, so it can be freely shared between worker threads.
pub struct GeoIndex {
    suburbs: RTree<RegionEntry>,
    lgas: RTree<RegionEntry>,
    /// Stations sorted by name so distance ties resolve deterministically.
    stations: Vec<Station>,
    /// lowercased suburb name -> LGA name
    suburb_to_lga: BTreeMap<String, String>,
}

impl GeoIndex {
    /// Builds R-tree indexes from already-parsed reference datasets.
    ///
    /// Degenerate boundaries (fewer than three distinct vertices) are
    /// skipped with a warning. Empty datasets are allowed here and surface
    /// as [`GeoIndexError::NoReferenceData`] at query time.
    #[must_use]
    pub fn build(suburbs: &[Region], lgas: &[Region], stations: &[Station]) -> Self {
        let suburb_tree = load_regions(suburbs, RegionKind::Suburb);
        log::info!(
            "Loaded {} suburb polygons into spatial index",
            suburb_tree.size()
        );

        let lga_tree = load_regions(lgas, RegionKind::Lga);
        log::info!("Loaded {} LGA polygons into spatial index", lga_tree.size());

        let mut stations = stations.to_vec();
        stations.sort_by(|a, b| a.name.cmp(&b.name));
        stations.dedup_by(|a, b| a.name == b.name);
        log::info!("Loaded {} stations into spatial index", stations.len());

        Self {
            suburbs: suburb_tree,
            lgas: lga_tree,
            stations,
            suburb_to_lga: BTreeMap::new(),
        }
    }

    /// Attaches a suburb → LGA crosswalk used as the fast path for LGA
    /// resolution. Keys are matched case-insensitively.
    #[must_use]
    pub fn with_crosswalk(mut self, crosswalk: BTreeMap<String, String>) -> Self {
        self.suburb_to_lga = crosswalk
            .into_iter()
            .map(|(suburb, lga)| (suburb.trim().to_lowercase(), lga))
            .collect();
        log::info!(
            "Loaded {} suburb->LGA crosswalk entries",
            self.suburb_to_lga.len()
        );
        self
    }

    /// Resolves the region of the given kind containing the point.
    ///
    /// Regions of one kind tile the area without overlap, so containment is
    /// unambiguous away from boundaries; a point on a shared boundary
    /// resolves to the lexicographically smallest candidate so repeated
    /// calls agree. When no polygon contains the point (coordinate noise,
    /// seams in the source file), the region with the nearest boundary is
    /// returned with `approximate` set.
    ///
    /// # Errors
    ///
    /// Returns [`GeoIndexError::NoReferenceData`] if the index holds zero
    /// polygons of `kind`.
    pub fn resolve_region(
        &self,
        lat: f64,
        lng: f64,
        kind: RegionKind,
    ) -> Result<RegionMatch, GeoIndexError> {
        let tree = self.tree(kind);
        if tree.size() == 0 {
            return Err(GeoIndexError::NoReferenceData(kind));
        }

        let point = Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        let mut containing: Option<&RegionEntry> = None;
        for entry in tree.locate_in_envelope_intersecting(&query_env) {
            if entry.polygon.contains(&point) {
                match containing {
                    None => containing = Some(entry),
                    Some(current) if entry.name < current.name => containing = Some(entry),
                    Some(_) => {}
                }
            }
        }

        if let Some(entry) = containing {
            return Ok(RegionMatch {
                name: entry.name.clone(),
                approximate: false,
            });
        }

        // Point is outside every polygon; fall back to the nearest boundary.
        let mut best: Option<(f64, &RegionEntry)> = None;
        for entry in tree.iter() {
            let distance = Euclidean.distance(&point, &entry.polygon);
            let closer = best.is_none_or(|(best_distance, best_entry)| {
                distance < best_distance
                    || ((distance - best_distance).abs() < f64::EPSILON
                        && entry.name < best_entry.name)
            });
            if closer {
                best = Some((distance, entry));
            }
        }

        best.map_or(Err(GeoIndexError::NoReferenceData(kind)), |(_, entry)| {
            log::debug!(
                "Point ({lat}, {lng}) outside all {kind} polygons, using nearest: {}",
                entry.name
            );
            Ok(RegionMatch {
                name: entry.name.clone(),
                approximate: true,
            })
        })
    }

    /// Returns the station nearest to the point by great-circle distance,
    /// along with that distance in kilometres.
    ///
    /// Ties are broken by station name so results are deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`GeoIndexError::NoStations`] if no stations are loaded.
    pub fn nearest_station(&self, lat: f64, lng: f64) -> Result<(&Station, f64), GeoIndexError> {
        let point = Point::new(lng, lat);

        let mut best: Option<(f64, &Station)> = None;
        for station in &self.stations {
            let km = Haversine.distance(point, Point::new(station.lng, station.lat)) / 1000.0;
            // Stations are name-sorted, so strict improvement keeps the
            // lexicographically smallest name on ties.
            if best.is_none_or(|(best_km, _)| km < best_km) {
                best = Some((km, station));
            }
        }

        best.map(|(km, station)| (station, km))
            .ok_or(GeoIndexError::NoStations)
    }

    /// Looks up the LGA for a suburb via the crosswalk, if one was attached.
    #[must_use]
    pub fn lga_for_suburb(&self, suburb: &str) -> Option<&str> {
        self.suburb_to_lga
            .get(&suburb.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Number of loaded polygons of the given kind.
    #[must_use]
    pub fn region_count(&self, kind: RegionKind) -> usize {
        self.tree(kind).size()
    }

    /// Number of loaded stations.
    #[must_use]
    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    const fn tree(&self, kind: RegionKind) -> &RTree<RegionEntry> {
        match kind {
            RegionKind::Suburb => &self.suburbs,
            RegionKind::Lga => &self.lgas,
        }
    }
}

fn load_regions(regions: &[Region], kind: RegionKind) -> RTree<RegionEntry> {
    let mut entries = Vec::with_capacity(regions.len());

    for region in regions {
        let Some(polygon) = polygon_from_ring(&region.boundary) else {
            log::warn!("Skipping degenerate {kind} boundary: {}", region.name);
            continue;
        };

        let envelope = compute_envelope(&polygon);

        entries.push(RegionEntry {
            name: region.name.clone(),
            envelope,
            polygon,
        });
    }

    RTree::bulk_load(entries)
}

/// Converts an ordered `(lat, lng)` boundary ring into a [`MultiPolygon`].
///
/// Accepts open or closed rings; returns `None` for rings with fewer than
/// three distinct vertices.
fn polygon_from_ring(boundary: &[(f64, f64)]) -> Option<MultiPolygon<f64>> {
    let mut coords: Vec<(f64, f64)> = boundary.iter().map(|&(lat, lng)| (lng, lat)).collect();

    // Drop an explicit closing vertex; Polygon::new re-closes the ring.
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    coords.dedup();

    if coords.len() < 3 {
        return None;
    }

    let exterior = LineString::from(coords);
    Some(MultiPolygon(vec![Polygon::new(exterior, vec![])]))
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(polygon: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    polygon.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

/// Extracts a boundary ring from a `GeoJSON` geometry string.
///
/// Handles both `Polygon` and `MultiPolygon` geometry types; for a
/// `MultiPolygon` the exterior ring with the most vertices is used. Returns
/// vertices as `(lat, lng)` pairs ready for [`Region::boundary`].
#[must_use]
pub fn boundary_from_geojson(geojson_str: &str) -> Option<Vec<(f64, f64)>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    let GeoJson::Geometry(geometry) = geojson else {
        return None;
    };
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;

    let polygon = match geo_geom {
        geo::Geometry::Polygon(p) => p,
        geo::Geometry::MultiPolygon(mp) => {
            mp.0.into_iter().max_by_key(|p| p.exterior().0.len())?
        }
        _ => return None,
    };

    Some(
        polygon
            .exterior()
            .0
            .iter()
            .map(|coord| (coord.y, coord.x))
            .collect(),
    )
}
