// src/geometry.rs
//
// Approach geometry for one signal, read once from the backend at
// construction and immutable afterwards.

use serde::{Deserialize, Serialize};

use crate::actions::ApproachSlot;
use crate::error::{BackendError, ControllerError};
use crate::io::SimulationBackend;
use crate::types::{EdgeId, LaneId, Position, SignalId, VehicleId};

/// One controlled approach lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approach {
    pub lane: LaneId,
    /// Stop-line length used for density normalisation.
    pub length: f64,
    pub edge: EdgeId,
}

/// Static geometry of a signalised junction and its surroundings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproachGeometry {
    signal: SignalId,
    approaches: Vec<Approach>,
    outgoing: Vec<LaneId>,
    junction: Position,
    /// Every lane controlled by any signal in the network.
    network_lanes: Vec<LaneId>,
}

impl ApproachGeometry {
    /// Read the geometry of `signal` from `backend`.
    ///
    /// Duplicate lanes (a lane feeding several links) are collapsed, keeping
    /// the first occurrence so approach order follows signal link order.
    pub fn load<B>(backend: &B, signal: &SignalId) -> Result<Self, ControllerError>
    where
        B: SimulationBackend + ?Sized,
    {
        let lanes = dedup_in_order(backend.controlled_lanes(signal)?);
        if lanes.is_empty() {
            return Err(ControllerError::NoControlledLanes(signal.clone()));
        }

        let approaches = lanes
            .into_iter()
            .map(|lane| {
                Ok(Approach {
                    length: backend.lane_length(&lane)?,
                    edge: backend.lane_edge(&lane)?,
                    lane,
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        let outgoing = dedup_in_order(backend.outgoing_lanes(signal)?);
        let junction = backend.junction_position(signal)?;

        let mut network_lanes = Vec::new();
        for other in backend.signal_ids() {
            network_lanes.extend(backend.controlled_lanes(&other)?);
        }
        let network_lanes = dedup_in_order(network_lanes);

        Ok(Self {
            signal: signal.clone(),
            approaches,
            outgoing,
            junction,
            network_lanes,
        })
    }

    pub fn signal(&self) -> &SignalId {
        &self.signal
    }

    pub fn approaches(&self) -> &[Approach] {
        &self.approaches
    }

    /// Approach bound to `slot`, if the junction has that many approaches.
    pub fn approach(&self, slot: ApproachSlot) -> Option<&Approach> {
        self.approaches.get(slot.index())
    }

    pub fn len(&self) -> usize {
        self.approaches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approaches.is_empty()
    }

    pub fn controls(&self, lane: &LaneId) -> bool {
        self.approaches.iter().any(|a| &a.lane == lane)
    }

    pub fn outgoing_lanes(&self) -> &[LaneId] {
        &self.outgoing
    }

    pub fn network_lanes(&self) -> &[LaneId] {
        &self.network_lanes
    }

    /// Edges of the controlled approaches, approach order.
    pub fn edges(&self) -> Vec<EdgeId> {
        self.approaches.iter().map(|a| a.edge.clone()).collect()
    }

    pub fn junction(&self) -> Position {
        self.junction
    }

    /// Vehicle nearest the stop line on the approach at `slot`.
    pub fn lead_vehicle<B>(
        &self,
        backend: &B,
        slot: ApproachSlot,
    ) -> Result<Option<VehicleId>, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        let Some(approach) = self.approach(slot) else {
            return Ok(None);
        };
        Ok(backend.lane_vehicles(&approach.lane)?.pop())
    }

    /// Straight-line distance from `vehicle` to the junction reference point.
    pub fn distance_to_junction<B>(&self, backend: &B, vehicle: &VehicleId) -> Result<f64, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        Ok(backend.vehicle_position(vehicle)?.distance_to(&self.junction))
    }
}

/// `count` relative to how many vehicles fit on a lane of `length`, in [0, 1].
///
/// A degenerate lane (zero, negative or non-finite length) yields 0.
pub fn occupancy_ratio(count: usize, length: f64, footprint: f64) -> f64 {
    if !(length.is_finite() && length > 0.0 && footprint > 0.0) {
        return 0.0;
    }
    let capacity = length / footprint;
    (count as f64 / capacity).clamp(0.0, 1.0)
}

fn dedup_in_order<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
