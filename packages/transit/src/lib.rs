#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Station-to-station travel-time graph.
//!
//! Holds a directed, weighted graph of stations plus a single fixed
//! destination node, and answers minimum-travel-time queries from any
//! origin station to that destination. The destination is fixed for the
//! lifetime of the graph, so each origin's shortest path is computed once
//! and memoized.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::RwLock;

use property_map_property_models::Station;

/// Errors from travel-time queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The origin station does not exist in the graph.
    #[error("unknown origin station: {0}")]
    UnknownOrigin(String),

    /// No path connects the origin to the destination.
    #[error("no route from {0} to the destination")]
    NoRoute(String),

    /// An edge with a negative travel time was supplied at build time.
    #[error("negative travel time on edge {from} -> {to}")]
    NegativeWeight {
        /// Edge origin station.
        from: String,
        /// Edge target station.
        to: String,
    },
}

/// The fixed terminal node of the graph and its access edges.
///
/// Access edges link nearby stations to the destination with a fixed
/// travel time; a weight of 0 models a destination co-located with a
/// station.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    /// Display name of the destination node.
    pub name: String,
    /// `(station_name, minutes)` access edges into the destination.
    pub access: Vec<(String, f64)>,
}

/// Min-heap entry: ordering is reversed on cost so `BinaryHeap` pops the
/// cheapest frontier node first.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    cost: f64,
    node: usize,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Directed travel-time graph over stations plus one destination node.
///
/// Read-only after build; the memoization cache is interior-mutable and
/// populated at most once per origin (first writer wins, later computations
/// of the same origin produce identical values by determinism).
pub struct RouteGraph {
    /// Node names; stations first, destination last.
    names: Vec<String>,
    /// station name -> node index
    index: BTreeMap<String, usize>,
    /// Adjacency lists of `(target, minutes)`.
    adjacency: Vec<Vec<(usize, f64)>>,
    destination: usize,
    cache: RwLock<BTreeMap<usize, Option<f64>>>,
}

impl RouteGraph {
    /// Builds the graph from station adjacency and the destination's access
    /// edges.
    ///
    /// Edges referencing unknown stations are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NegativeWeight`] if any edge carries a
    /// negative travel time.
    pub fn build(stations: &[Station], destination: &Destination) -> Result<Self, RouteError> {
        let mut names: Vec<String> = stations.iter().map(|s| s.name.clone()).collect();
        names.sort();
        names.dedup();

        let index: BTreeMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let destination_idx = names.len();
        names.push(destination.name.clone());

        let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); names.len()];

        let mut dropped = 0usize;
        for station in stations {
            let Some(&from) = index.get(&station.name) else {
                continue;
            };
            for (neighbor, minutes) in &station.neighbors {
                if *minutes < 0.0 {
                    return Err(RouteError::NegativeWeight {
                        from: station.name.clone(),
                        to: neighbor.clone(),
                    });
                }
                if let Some(&to) = index.get(neighbor) {
                    adjacency[from].push((to, *minutes));
                } else {
                    dropped += 1;
                }
            }
        }

        for (station, minutes) in &destination.access {
            if *minutes < 0.0 {
                return Err(RouteError::NegativeWeight {
                    from: station.clone(),
                    to: destination.name.clone(),
                });
            }
            if let Some(&from) = index.get(station) {
                adjacency[from].push((destination_idx, *minutes));
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            log::warn!("Dropped {dropped} edges referencing unknown stations");
        }
        log::info!(
            "Built route graph: {} stations, destination '{}' with {} access edges",
            index.len(),
            destination.name,
            destination.access.len()
        );

        Ok(Self {
            names,
            index,
            adjacency,
            destination: destination_idx,
            cache: RwLock::new(BTreeMap::new()),
        })
    }

    /// Minimum travel time in minutes from `origin` to the destination.
    ///
    /// The first query per origin runs Dijkstra; the result (including a
    /// no-route outcome) is memoized for subsequent queries.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::UnknownOrigin`] for a station not in the
    /// graph, or [`RouteError::NoRoute`] when the origin's component does
    /// not reach the destination.
    pub fn min_travel_time(&self, origin: &str) -> Result<f64, RouteError> {
        let &origin_idx = self
            .index
            .get(origin)
            .ok_or_else(|| RouteError::UnknownOrigin(origin.to_string()))?;

        let cached = self
            .cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&origin_idx)
            .copied();
        if let Some(cached) = cached {
            return cached.ok_or_else(|| RouteError::NoRoute(origin.to_string()));
        }

        let computed = self.dijkstra(origin_idx);

        // First writer wins; a concurrent computation of the same origin
        // produced the same value.
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(origin_idx)
            .or_insert(computed);

        computed.ok_or_else(|| RouteError::NoRoute(origin.to_string()))
    }

    /// Whether a travel time for `origin` is already memoized.
    #[must_use]
    pub fn is_cached(&self, origin: &str) -> bool {
        self.index.get(origin).is_some_and(|idx| {
            self.cache
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .contains_key(idx)
        })
    }

    /// Names of all stations in the graph, sorted.
    #[must_use]
    pub fn station_names(&self) -> &[String] {
        &self.names[..self.index.len()]
    }

    /// Single-source shortest path with early exit at the destination.
    fn dijkstra(&self, origin: usize) -> Option<f64> {
        let mut dist = vec![f64::INFINITY; self.names.len()];
        let mut heap = BinaryHeap::new();

        dist[origin] = 0.0;
        heap.push(Frontier {
            cost: 0.0,
            node: origin,
        });

        while let Some(Frontier { cost, node }) = heap.pop() {
            if node == self.destination {
                return Some(cost);
            }
            if cost > dist[node] {
                continue;
            }
            for &(next, minutes) in &self.adjacency[node] {
                let candidate = cost + minutes;
                if candidate < dist[next] {
                    dist[next] = candidate;
                    heap.push(Frontier {
                        cost: candidate,
                        node: next,
                    });
                }
            }
        }

        None
    }
}
