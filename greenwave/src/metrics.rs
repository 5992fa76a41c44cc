// src/metrics.rs
//
// Read-only traffic metrics around one junction.
//
// These feed the alternate reward modes and per-decision telemetry. All of
// them are read-only; the running emergency-brake total lives in
// IncidentCounter and is advanced once per step.

use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::geometry::{occupancy_ratio, ApproachGeometry};
use crate::io::SimulationBackend;

/// Radius around the junction within which a collision is attributed to it.
pub const COLLISION_RADIUS: f64 = 30.0;

/// |vehicles on controlled approaches - vehicles on outgoing lanes|.
pub fn pressure<B>(backend: &B, geometry: &ApproachGeometry) -> Result<f64, BackendError>
where
    B: SimulationBackend + ?Sized,
{
    let mut incoming = 0usize;
    for approach in geometry.approaches() {
        incoming += backend.lane_vehicle_count(&approach.lane)?;
    }
    let mut outgoing = 0usize;
    for lane in geometry.outgoing_lanes() {
        outgoing += backend.lane_vehicle_count(lane)?;
    }
    Ok((incoming as f64 - outgoing as f64).abs())
}

/// Mean of speed / allowed speed over vehicles on controlled approaches.
///
/// Zero when no vehicle is present. Vehicles that vanish mid-query are skipped.
pub fn average_speed_ratio<B>(backend: &B, geometry: &ApproachGeometry) -> Result<f64, BackendError>
where
    B: SimulationBackend + ?Sized,
{
    let mut total = 0.0;
    let mut count = 0usize;
    for approach in geometry.approaches() {
        for vehicle in backend.lane_vehicles(&approach.lane)? {
            let speeds = backend
                .vehicle_speed(&vehicle)
                .and_then(|s| Ok((s, backend.vehicle_allowed_speed(&vehicle)?)));
            match speeds {
                Ok((speed, allowed)) => {
                    if allowed > 0.0 {
                        total += speed / allowed;
                    }
                    count += 1;
                }
                Err(err) if err.is_stale_vehicle() => continue,
                Err(err) => return Err(err),
            }
        }
    }
    if count == 0 {
        return Ok(0.0);
    }
    Ok(total / count as f64)
}

/// Halted vehicles over all controlled approaches.
pub fn total_halting<B>(backend: &B, geometry: &ApproachGeometry) -> Result<usize, BackendError>
where
    B: SimulationBackend + ?Sized,
{
    let mut total = 0;
    for approach in geometry.approaches() {
        total += backend.lane_halting_count(&approach.lane)?;
    }
    Ok(total)
}

/// Occupancy density of each outgoing lane, lane order.
pub fn outgoing_density<B>(
    backend: &B,
    geometry: &ApproachGeometry,
    footprint: f64,
) -> Result<Vec<f64>, BackendError>
where
    B: SimulationBackend + ?Sized,
{
    geometry
        .outgoing_lanes()
        .iter()
        .map(|lane| {
            let count = backend.lane_vehicle_count(lane)?;
            let length = backend.lane_length(lane)?;
            Ok(occupancy_ratio(count, length, footprint))
        })
        .collect()
}

/// Emergency-stopping vehicles currently on a controlled approach.
pub fn emergency_brakes<B>(backend: &B, geometry: &ApproachGeometry) -> Result<u64, BackendError>
where
    B: SimulationBackend + ?Sized,
{
    let mut count = 0u64;
    for vehicle in backend.emergency_stopping_vehicles() {
        match backend.vehicle_lane(&vehicle) {
            Ok(lane) if geometry.controls(&lane) => count += 1,
            Ok(_) => {}
            Err(err) if err.is_stale_vehicle() => {}
            Err(err) => return Err(err),
        }
    }
    Ok(count)
}

/// Counts safety incidents around one junction.
///
/// Meant to be fed once per simulation step; the total is only as complete as
/// the steps recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentCounter {
    total_emergency_brakes: u64,
}

impl IncidentCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds this step's emergency brakes to the running total and returns them.
    pub fn record_emergency_brakes<B>(
        &mut self,
        backend: &B,
        geometry: &ApproachGeometry,
    ) -> Result<u64, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        let count = emergency_brakes(backend, geometry)?;
        if count > 0 {
            self.total_emergency_brakes += count;
            tracing::debug!(signal = %geometry.signal(), count, "emergency brakes on approaches");
        }
        Ok(count)
    }

    pub fn total_emergency_brakes(&self) -> u64 {
        self.total_emergency_brakes
    }
}

/// Collisions within `COLLISION_RADIUS` of the junction.
///
/// Each collision lists both vehicles involved, hence the halving.
pub fn nearby_collisions<B>(backend: &B, geometry: &ApproachGeometry) -> Result<f64, BackendError>
where
    B: SimulationBackend + ?Sized,
{
    let mut count = 0usize;
    for vehicle in backend.colliding_vehicles() {
        match geometry.distance_to_junction(backend, &vehicle) {
            Ok(d) if d < COLLISION_RADIUS => count += 1,
            Ok(_) => {}
            Err(err) if err.is_stale_vehicle() => {}
            Err(err) => return Err(err),
        }
    }
    if count > 0 {
        tracing::warn!(signal = %geometry.signal(), vehicles = count, "collision near junction");
    }
    Ok(count as f64 / 2.0)
}

/// Snapshot of the junction metrics, for telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficMetrics {
    pub pressure: f64,
    pub average_speed_ratio: f64,
    pub total_halting: usize,
    pub outgoing_density: Vec<f64>,
    pub emergency_brakes: u64,
    pub total_emergency_brakes: u64,
    pub nearby_collisions: f64,
}
