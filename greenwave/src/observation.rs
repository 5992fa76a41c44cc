// src/observation.rs
//
// Versioned observation of local traffic state.
//
// Layout (approach order fixed at construction):
//   [density_0 .. density_{n-1}, queue_0 .. queue_{n-1}]
// where density = vehicles / lane capacity and queue = halted / lane
// capacity, capacity = lane length / vehicle footprint, all clipped to [0, 1].
// Recomputed from scratch on every call.

use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::geometry::{occupancy_ratio, ApproachGeometry};
use crate::io::SimulationBackend;
use crate::types::SimTime;

/// Current observation schema version.
/// Increment when adding/removing/changing fields.
pub const OBS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Schema version for forwards/backwards compatibility.
    pub obs_version: u32,
    /// Simulation time the observation was taken at.
    pub sim_time: SimTime,
    /// Per-approach occupancy density in [0, 1].
    pub density: Vec<f64>,
    /// Per-approach queue ratio in [0, 1].
    pub queue: Vec<f64>,
}

impl Observation {
    /// Build an observation for the approaches in `geometry`.
    pub fn from_backend<B>(
        backend: &B,
        geometry: &ApproachGeometry,
        footprint: f64,
    ) -> Result<Self, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        let mut density = Vec::with_capacity(geometry.len());
        let mut queue = Vec::with_capacity(geometry.len());

        for approach in geometry.approaches() {
            let count = backend.lane_vehicle_count(&approach.lane)?;
            let halted = backend.lane_halting_count(&approach.lane)?;
            density.push(occupancy_ratio(count, approach.length, footprint));
            queue.push(occupancy_ratio(halted, approach.length, footprint));
        }

        Ok(Observation {
            obs_version: OBS_VERSION,
            sim_time: backend.current_time(),
            density,
            queue,
        })
    }

    /// Flat vector `density ++ queue` for policy input.
    pub fn to_vector(&self) -> Vec<f32> {
        self.density
            .iter()
            .chain(self.queue.iter())
            .map(|v| *v as f32)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.density.len() + self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to JSON bytes for deterministic comparison.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Sum of queue ratios over all approaches.
    pub fn total_queue_ratio(&self) -> f64 {
        self.queue.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::scripted::{four_way_network, ScriptedBackend, VehicleState};
    use crate::types::{Position, SignalId};

    fn setup() -> (ScriptedBackend, ApproachGeometry) {
        let backend = ScriptedBackend::new(four_way_network());
        let geo = ApproachGeometry::load(&backend, &SignalId::new("J")).unwrap();
        (backend, geo)
    }

    #[test]
    fn empty_junction_observes_zeros() {
        let (backend, geo) = setup();
        let obs = Observation::from_backend(&backend, &geo, 7.5).unwrap();
        assert_eq!(obs.len(), 16);
        assert!(obs.to_vector().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn density_and_queue_follow_slot_order() {
        let (backend, geo) = setup();
        // Lane e_0 is slot 1: one moving and two halted vehicles.
        backend.place_vehicle(VehicleState::new("a", "e_0", Position::new(50.0, 0.0)).with_speed(9.0));
        backend.place_vehicle(VehicleState::new("b", "e_0", Position::new(20.0, 0.0)));
        backend.place_vehicle(VehicleState::new("c", "e_0", Position::new(12.0, 0.0)));

        let obs = Observation::from_backend(&backend, &geo, 7.5).unwrap();
        let cap = 100.0 / 7.5;
        assert!((obs.density[1] - 3.0 / cap).abs() < 1e-12);
        assert!((obs.queue[1] - 2.0 / cap).abs() < 1e-12);
        assert_eq!(obs.density[0], 0.0);

        let flat = obs.to_vector();
        assert!((flat[1] as f64 - 3.0 / cap).abs() < 1e-6);
        assert!((flat[8 + 1] as f64 - 2.0 / cap).abs() < 1e-6);
    }

    #[test]
    fn saturated_lane_clips_to_one() {
        let (backend, geo) = setup();
        for i in 0..40 {
            backend.place_vehicle(VehicleState::new(&format!("v{i}"), "s_1", Position::new(0.0, -(i as f64))));
        }
        let obs = Observation::from_backend(&backend, &geo, 7.5).unwrap();
        assert_eq!(obs.density[6], 1.0);
        assert_eq!(obs.queue[6], 1.0);
        assert!(obs.to_vector().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn canonical_json_is_stable() {
        let (backend, geo) = setup();
        let a = Observation::from_backend(&backend, &geo, 7.5).unwrap();
        let b = Observation::from_backend(&backend, &geo, 7.5).unwrap();
        assert_eq!(a.to_canonical_json().unwrap(), b.to_canonical_json().unwrap());
    }
}
