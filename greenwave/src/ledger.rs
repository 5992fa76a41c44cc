// src/ledger.rs
//
// Per-vehicle, per-lane waiting-time ledger.
//
// The simulator reports waiting time accumulated over a vehicle's whole trip.
// To attribute waiting to the lane a vehicle is on now, the ledger remembers
// how much was already attributed to the lanes it visited before:
//
//   attributed[v][L] = cumulative(v) - sum(attributed[v][other lanes])
//
// One ledger is shared by every controller in a network. The handle is cheap
// to clone and serialises updates behind a mutex, so a vehicle's entry is
// never written by two controllers at once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BackendError;
use crate::io::SimulationBackend;
use crate::types::{LaneId, VehicleId};

type Entries = HashMap<VehicleId, HashMap<LaneId, f64>>;

/// Shared handle to the waiting-time ledger.
#[derive(Debug, Clone, Default)]
pub struct WaitingLedger {
    entries: Arc<Mutex<Entries>>,
}

impl WaitingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `cumulative` waiting for `vehicle` now on `lane` and return the
    /// share attributed to `lane`.
    pub fn attribute(&self, vehicle: &VehicleId, lane: &LaneId, cumulative: f64) -> f64 {
        let mut entries = self.entries.lock();
        let lanes = entries.entry(vehicle.clone()).or_default();
        let elsewhere: f64 = lanes
            .iter()
            .filter(|(l, _)| *l != lane)
            .map(|(_, w)| *w)
            .sum();
        let here = cumulative - elsewhere;
        lanes.insert(lane.clone(), here);
        here
    }

    /// Attributed waiting of `vehicle` on `lane`, if recorded.
    pub fn get(&self, vehicle: &VehicleId, lane: &LaneId) -> Option<f64> {
        self.entries
            .lock()
            .get(vehicle)
            .and_then(|lanes| lanes.get(lane))
            .copied()
    }

    /// Seed an entry directly (replays and tests).
    pub fn insert(&self, vehicle: VehicleId, lane: LaneId, waiting: f64) {
        self.entries
            .lock()
            .entry(vehicle)
            .or_default()
            .insert(lane, waiting);
    }

    /// Forget a vehicle that has left the network.
    pub fn remove_vehicle(&self, vehicle: &VehicleId) -> bool {
        self.entries.lock().remove(vehicle).is_some()
    }

    /// Drop every vehicle for which `present` returns false. Returns the count dropped.
    pub fn retain_vehicles<F>(&self, mut present: F) -> usize
    where
        F: FnMut(&VehicleId) -> bool,
    {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|v, _| present(v));
        before - entries.len()
    }

    /// Forget every tracked vehicle the backend no longer knows about.
    ///
    /// Backend queries run outside the ledger lock. Returns the count dropped.
    pub fn prune_departed<B>(&self, backend: &B) -> Result<usize, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        let tracked: Vec<VehicleId> = self.entries.lock().keys().cloned().collect();
        let mut departed = HashSet::new();
        for vehicle in tracked {
            match backend.vehicle_lane(&vehicle) {
                Ok(_) => {}
                Err(err) if err.is_stale_vehicle() => {
                    departed.insert(vehicle);
                }
                Err(err) => return Err(err),
            }
        }
        if departed.is_empty() {
            return Ok(0);
        }
        Ok(self.retain_vehicles(|v| !departed.contains(v)))
    }

    pub fn vehicle_count(&self) -> usize {
        self.entries.lock().len()
    }
}
