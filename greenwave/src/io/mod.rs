// src/io/mod.rs
//
// Simulation boundary layer.
//
// The controller never talks to a process-wide simulation handle. Instead a
// SimulationBackend capability is injected at construction:
// - Queries are synchronous point-in-time reads of the current step
// - Commands take effect at the next physics step
// - Implementations can be swapped (live simulator / scripted test double)

pub mod scripted;

use std::sync::Arc;

use crate::error::BackendError;
use crate::types::{EdgeId, LaneId, Position, SignalId, SimTime, VehicleId};

/// Query and command surface the controller needs from the simulator.
///
/// All methods take `&self`; implementations that mutate simulator state on
/// commands are expected to use interior mutability so one backend can be
/// shared by every controller in a network.
pub trait SimulationBackend {
    // ----- Network topology -----

    /// All traffic signals in the network.
    fn signal_ids(&self) -> Vec<SignalId>;

    /// Lanes controlled by `signal`, in signal link order (may repeat).
    fn controlled_lanes(&self, signal: &SignalId) -> Result<Vec<LaneId>, BackendError>;

    /// Lanes leaving the junction controlled by `signal` (may repeat).
    fn outgoing_lanes(&self, signal: &SignalId) -> Result<Vec<LaneId>, BackendError>;

    fn lane_length(&self, lane: &LaneId) -> Result<f64, BackendError>;

    fn lane_edge(&self, lane: &LaneId) -> Result<EdgeId, BackendError>;

    /// Fixed reference position of the junction controlled by `signal`.
    fn junction_position(&self, signal: &SignalId) -> Result<Position, BackendError>;

    // ----- Per-lane state -----

    /// Vehicles on `lane`, ordered so the one nearest the stop line is last.
    fn lane_vehicles(&self, lane: &LaneId) -> Result<Vec<VehicleId>, BackendError>;

    fn lane_vehicle_count(&self, lane: &LaneId) -> Result<usize, BackendError>;

    /// Vehicles on `lane` currently halted.
    fn lane_halting_count(&self, lane: &LaneId) -> Result<usize, BackendError>;

    // ----- Per-vehicle state -----

    fn vehicle_position(&self, vehicle: &VehicleId) -> Result<Position, BackendError>;

    fn vehicle_lane(&self, vehicle: &VehicleId) -> Result<LaneId, BackendError>;

    /// Cumulative waiting time over the whole trip so far.
    fn vehicle_accumulated_waiting(&self, vehicle: &VehicleId) -> Result<f64, BackendError>;

    fn vehicle_speed(&self, vehicle: &VehicleId) -> Result<f64, BackendError>;

    fn vehicle_allowed_speed(&self, vehicle: &VehicleId) -> Result<f64, BackendError>;

    // ----- Global state -----

    fn current_time(&self) -> SimTime;

    fn emergency_stopping_vehicles(&self) -> Vec<VehicleId>;

    fn colliding_vehicles(&self) -> Vec<VehicleId>;

    // ----- Commands -----

    fn set_vehicle_decel(&self, vehicle: &VehicleId, decel: f64) -> Result<(), BackendError>;

    fn set_vehicle_speed(&self, vehicle: &VehicleId, speed: f64) -> Result<(), BackendError>;
}

macro_rules! forward_backend {
    ($($ty:ty),*) => {
        $(
            impl<T: SimulationBackend + ?Sized> SimulationBackend for $ty {
                fn signal_ids(&self) -> Vec<SignalId> {
                    (**self).signal_ids()
                }
                fn controlled_lanes(&self, signal: &SignalId) -> Result<Vec<LaneId>, BackendError> {
                    (**self).controlled_lanes(signal)
                }
                fn outgoing_lanes(&self, signal: &SignalId) -> Result<Vec<LaneId>, BackendError> {
                    (**self).outgoing_lanes(signal)
                }
                fn lane_length(&self, lane: &LaneId) -> Result<f64, BackendError> {
                    (**self).lane_length(lane)
                }
                fn lane_edge(&self, lane: &LaneId) -> Result<EdgeId, BackendError> {
                    (**self).lane_edge(lane)
                }
                fn junction_position(&self, signal: &SignalId) -> Result<Position, BackendError> {
                    (**self).junction_position(signal)
                }
                fn lane_vehicles(&self, lane: &LaneId) -> Result<Vec<VehicleId>, BackendError> {
                    (**self).lane_vehicles(lane)
                }
                fn lane_vehicle_count(&self, lane: &LaneId) -> Result<usize, BackendError> {
                    (**self).lane_vehicle_count(lane)
                }
                fn lane_halting_count(&self, lane: &LaneId) -> Result<usize, BackendError> {
                    (**self).lane_halting_count(lane)
                }
                fn vehicle_position(&self, vehicle: &VehicleId) -> Result<Position, BackendError> {
                    (**self).vehicle_position(vehicle)
                }
                fn vehicle_lane(&self, vehicle: &VehicleId) -> Result<LaneId, BackendError> {
                    (**self).vehicle_lane(vehicle)
                }
                fn vehicle_accumulated_waiting(&self, vehicle: &VehicleId) -> Result<f64, BackendError> {
                    (**self).vehicle_accumulated_waiting(vehicle)
                }
                fn vehicle_speed(&self, vehicle: &VehicleId) -> Result<f64, BackendError> {
                    (**self).vehicle_speed(vehicle)
                }
                fn vehicle_allowed_speed(&self, vehicle: &VehicleId) -> Result<f64, BackendError> {
                    (**self).vehicle_allowed_speed(vehicle)
                }
                fn current_time(&self) -> SimTime {
                    (**self).current_time()
                }
                fn emergency_stopping_vehicles(&self) -> Vec<VehicleId> {
                    (**self).emergency_stopping_vehicles()
                }
                fn colliding_vehicles(&self) -> Vec<VehicleId> {
                    (**self).colliding_vehicles()
                }
                fn set_vehicle_decel(&self, vehicle: &VehicleId, decel: f64) -> Result<(), BackendError> {
                    (**self).set_vehicle_decel(vehicle, decel)
                }
                fn set_vehicle_speed(&self, vehicle: &VehicleId, speed: f64) -> Result<(), BackendError> {
                    (**self).set_vehicle_speed(vehicle, speed)
                }
            }
        )*
    };
}

forward_backend!(&T, Arc<T>, Box<T>);

/// Outcome of a command once stale-reference failures are absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// Target vehicle had already left the network; nothing was done.
    VehicleGone,
}

/// Run a vehicle command, downgrading a departed-vehicle failure to a no-op.
///
/// Any other backend failure is returned to the caller.
pub fn command_tolerant<F>(vehicle: &VehicleId, command: F) -> Result<CommandOutcome, BackendError>
where
    F: FnOnce() -> Result<(), BackendError>,
{
    match command() {
        Ok(()) => Ok(CommandOutcome::Applied),
        Err(err) if err.is_stale_vehicle() => {
            tracing::debug!(vehicle = %vehicle, "command target left the network; ignoring");
            Ok(CommandOutcome::VehicleGone)
        }
        Err(err) => Err(err),
    }
}
