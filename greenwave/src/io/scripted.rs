// src/io/scripted.rs
//
// Scripted simulation backend.
//
// Implements SimulationBackend over an in-memory world:
// - Network topology (signals, lanes) is fixed at construction
// - Vehicles, time and incident lists are scripted by the caller, either
//   directly or one Frame at a time from a Scenario
// - Every command is recorded; commands on absent vehicles fail with
//   VehicleNotFound exactly like a live simulator would

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;
use crate::error::BackendError;
use crate::io::SimulationBackend;
use crate::types::{EdgeId, LaneId, Position, SignalId, SimTime, VehicleId};

/// Vehicles slower than this are counted as halting.
pub const HALTING_SPEED: f64 = 0.1;

/// Static description of one lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSpec {
    pub id: LaneId,
    pub length: f64,
    pub edge: EdgeId,
}

/// Static description of one signalised junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub id: SignalId,
    pub position: Position,
    pub controlled_lanes: Vec<LaneId>,
    #[serde(default)]
    pub outgoing_lanes: Vec<LaneId>,
}

/// Static network topology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub signals: Vec<SignalSpec>,
    pub lanes: Vec<LaneSpec>,
}

/// Point-in-time state of one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub id: VehicleId,
    pub lane: LaneId,
    pub position: Position,
    #[serde(default)]
    pub accumulated_waiting: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default = "default_allowed_speed")]
    pub allowed_speed: f64,
}

fn default_allowed_speed() -> f64 {
    13.89
}

impl VehicleState {
    pub fn new(id: &str, lane: &str, position: Position) -> Self {
        Self {
            id: VehicleId::new(id),
            lane: LaneId::new(lane),
            position,
            accumulated_waiting: 0.0,
            speed: 0.0,
            allowed_speed: default_allowed_speed(),
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_waiting(mut self, waiting: f64) -> Self {
        self.accumulated_waiting = waiting;
        self
    }
}

/// Simulator state at one step.
///
/// Vehicles on the same lane are listed farthest first; the last one listed
/// on a lane is its lead vehicle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub time: SimTime,
    #[serde(default)]
    pub vehicles: Vec<VehicleState>,
    #[serde(default)]
    pub emergency_stops: Vec<VehicleId>,
    #[serde(default)]
    pub collisions: Vec<VehicleId>,
}

/// A network plus a recorded sequence of frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub network: NetworkSpec,
    /// Controller configuration shared by every signal (defaults if absent).
    #[serde(default)]
    pub config: Option<ControllerConfig>,
    #[serde(default)]
    pub frames: Vec<Frame>,
}

impl Scenario {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Command issued to the backend, as recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    SetDecel { vehicle: VehicleId, decel: f64 },
    SetSpeed { vehicle: VehicleId, speed: f64 },
}

impl Command {
    pub fn vehicle(&self) -> &VehicleId {
        match self {
            Command::SetDecel { vehicle, .. } | Command::SetSpeed { vehicle, .. } => vehicle,
        }
    }
}

#[derive(Debug, Default)]
struct World {
    time: SimTime,
    vehicles: Vec<VehicleState>,
    emergency_stops: Vec<VehicleId>,
    collisions: Vec<VehicleId>,
    commands: Vec<Command>,
}

impl World {
    fn vehicle(&self, id: &VehicleId) -> Result<&VehicleState, BackendError> {
        self.vehicles
            .iter()
            .find(|v| &v.id == id)
            .ok_or_else(|| BackendError::VehicleNotFound(id.clone()))
    }
}

/// In-memory SimulationBackend driven by scripted state.
#[derive(Debug)]
pub struct ScriptedBackend {
    signal_order: Vec<SignalId>,
    signals: HashMap<SignalId, SignalSpec>,
    lanes: HashMap<LaneId, LaneSpec>,
    world: Mutex<World>,
}

impl ScriptedBackend {
    /// Create a backend over `network` with no vehicles at time 0.
    pub fn new(network: NetworkSpec) -> Self {
        let signal_order = network.signals.iter().map(|s| s.id.clone()).collect();
        let signals = network
            .signals
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let lanes = network
            .lanes
            .into_iter()
            .map(|l| (l.id.clone(), l))
            .collect();
        Self {
            signal_order,
            signals,
            lanes,
            world: Mutex::new(World::default()),
        }
    }

    /// Replace the dynamic state with `frame`. Recorded commands are kept.
    pub fn load_frame(&self, frame: &Frame) {
        let mut world = self.world.lock();
        world.time = frame.time;
        world.vehicles = frame.vehicles.clone();
        world.emergency_stops = frame.emergency_stops.clone();
        world.collisions = frame.collisions.clone();
    }

    pub fn set_time(&self, time: SimTime) {
        self.world.lock().time = time;
    }

    pub fn advance(&self, steps: SimTime) {
        self.world.lock().time += steps;
    }

    /// Add a vehicle; it becomes the lead vehicle of its lane.
    pub fn place_vehicle(&self, vehicle: VehicleState) {
        let mut world = self.world.lock();
        world.vehicles.retain(|v| v.id != vehicle.id);
        world.vehicles.push(vehicle);
    }

    /// Remove a vehicle, as if it had left the network.
    pub fn remove_vehicle(&self, id: &VehicleId) {
        self.world.lock().vehicles.retain(|v| &v.id != id);
    }

    /// Mutate a vehicle in place. Returns false if it is not present.
    pub fn update_vehicle<F>(&self, id: &VehicleId, update: F) -> bool
    where
        F: FnOnce(&mut VehicleState),
    {
        let mut world = self.world.lock();
        match world.vehicles.iter_mut().find(|v| &v.id == id) {
            Some(v) => {
                update(v);
                true
            }
            None => false,
        }
    }

    pub fn set_emergency_stops(&self, vehicles: Vec<VehicleId>) {
        self.world.lock().emergency_stops = vehicles;
    }

    pub fn set_collisions(&self, vehicles: Vec<VehicleId>) {
        self.world.lock().collisions = vehicles;
    }

    /// All commands recorded so far.
    pub fn commands(&self) -> Vec<Command> {
        self.world.lock().commands.clone()
    }

    /// Drain the recorded commands.
    pub fn take_commands(&self) -> Vec<Command> {
        std::mem::take(&mut self.world.lock().commands)
    }

    fn lane(&self, lane: &LaneId) -> Result<&LaneSpec, BackendError> {
        self.lanes
            .get(lane)
            .ok_or_else(|| BackendError::LaneNotFound(lane.clone()))
    }

    fn signal(&self, signal: &SignalId) -> Result<&SignalSpec, BackendError> {
        self.signals
            .get(signal)
            .ok_or_else(|| BackendError::SignalNotFound(signal.clone()))
    }

    fn record(&self, vehicle: &VehicleId, command: Command) -> Result<(), BackendError> {
        let mut world = self.world.lock();
        world.vehicle(vehicle)?;
        world.commands.push(command);
        Ok(())
    }
}

impl SimulationBackend for ScriptedBackend {
    fn signal_ids(&self) -> Vec<SignalId> {
        self.signal_order.clone()
    }

    fn controlled_lanes(&self, signal: &SignalId) -> Result<Vec<LaneId>, BackendError> {
        Ok(self.signal(signal)?.controlled_lanes.clone())
    }

    fn outgoing_lanes(&self, signal: &SignalId) -> Result<Vec<LaneId>, BackendError> {
        Ok(self.signal(signal)?.outgoing_lanes.clone())
    }

    fn lane_length(&self, lane: &LaneId) -> Result<f64, BackendError> {
        Ok(self.lane(lane)?.length)
    }

    fn lane_edge(&self, lane: &LaneId) -> Result<EdgeId, BackendError> {
        Ok(self.lane(lane)?.edge.clone())
    }

    fn junction_position(&self, signal: &SignalId) -> Result<Position, BackendError> {
        Ok(self.signal(signal)?.position)
    }

    fn lane_vehicles(&self, lane: &LaneId) -> Result<Vec<VehicleId>, BackendError> {
        self.lane(lane)?;
        let world = self.world.lock();
        Ok(world
            .vehicles
            .iter()
            .filter(|v| &v.lane == lane)
            .map(|v| v.id.clone())
            .collect())
    }

    fn lane_vehicle_count(&self, lane: &LaneId) -> Result<usize, BackendError> {
        self.lane(lane)?;
        let world = self.world.lock();
        Ok(world.vehicles.iter().filter(|v| &v.lane == lane).count())
    }

    fn lane_halting_count(&self, lane: &LaneId) -> Result<usize, BackendError> {
        self.lane(lane)?;
        let world = self.world.lock();
        Ok(world
            .vehicles
            .iter()
            .filter(|v| &v.lane == lane && v.speed < HALTING_SPEED)
            .count())
    }

    fn vehicle_position(&self, vehicle: &VehicleId) -> Result<Position, BackendError> {
        Ok(self.world.lock().vehicle(vehicle)?.position)
    }

    fn vehicle_lane(&self, vehicle: &VehicleId) -> Result<LaneId, BackendError> {
        Ok(self.world.lock().vehicle(vehicle)?.lane.clone())
    }

    fn vehicle_accumulated_waiting(&self, vehicle: &VehicleId) -> Result<f64, BackendError> {
        Ok(self.world.lock().vehicle(vehicle)?.accumulated_waiting)
    }

    fn vehicle_speed(&self, vehicle: &VehicleId) -> Result<f64, BackendError> {
        Ok(self.world.lock().vehicle(vehicle)?.speed)
    }

    fn vehicle_allowed_speed(&self, vehicle: &VehicleId) -> Result<f64, BackendError> {
        Ok(self.world.lock().vehicle(vehicle)?.allowed_speed)
    }

    fn current_time(&self) -> SimTime {
        self.world.lock().time
    }

    fn emergency_stopping_vehicles(&self) -> Vec<VehicleId> {
        self.world.lock().emergency_stops.clone()
    }

    fn colliding_vehicles(&self) -> Vec<VehicleId> {
        self.world.lock().collisions.clone()
    }

    fn set_vehicle_decel(&self, vehicle: &VehicleId, decel: f64) -> Result<(), BackendError> {
        self.record(
            vehicle,
            Command::SetDecel {
                vehicle: vehicle.clone(),
                decel,
            },
        )
    }

    fn set_vehicle_speed(&self, vehicle: &VehicleId, speed: f64) -> Result<(), BackendError> {
        self.record(
            vehicle,
            Command::SetSpeed {
                vehicle: vehicle.clone(),
                speed,
            },
        )
    }
}

/// Four-way, eight-lane junction used by tests and demos.
///
/// Signal `J` sits at the origin. Approach lanes `n_0, e_0, s_0, w_0,
/// n_1, e_1, s_1, w_1` are 100 units long; outgoing lanes are `o_n, o_e,
/// o_s, o_w`.
pub fn four_way_network() -> NetworkSpec {
    let approaches = ["n_0", "e_0", "s_0", "w_0", "n_1", "e_1", "s_1", "w_1"];
    let outgoing = ["o_n", "o_e", "o_s", "o_w"];

    let mut lanes: Vec<LaneSpec> = approaches
        .iter()
        .map(|id| LaneSpec {
            id: LaneId::new(*id),
            length: 100.0,
            edge: EdgeId::new(format!("{}_in", &id[..1])),
        })
        .collect();
    lanes.extend(outgoing.iter().map(|id| LaneSpec {
        id: LaneId::new(*id),
        length: 100.0,
        edge: EdgeId::new(format!("{}_out", &id[2..])),
    }));

    NetworkSpec {
        signals: vec![SignalSpec {
            id: SignalId::new("J"),
            position: Position::new(0.0, 0.0),
            controlled_lanes: approaches.iter().map(|id| LaneId::new(*id)).collect(),
            outgoing_lanes: outgoing.iter().map(|id| LaneId::new(*id)).collect(),
        }],
        lanes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_placed_vehicle_leads_its_lane() {
        let backend = ScriptedBackend::new(four_way_network());
        backend.place_vehicle(VehicleState::new("a", "n_0", Position::new(0.0, 40.0)));
        backend.place_vehicle(VehicleState::new("b", "n_0", Position::new(0.0, 15.0)));
        backend.place_vehicle(VehicleState::new("c", "e_0", Position::new(30.0, 0.0)));

        let ids = backend.lane_vehicles(&LaneId::new("n_0")).unwrap();
        assert_eq!(ids, vec![VehicleId::new("a"), VehicleId::new("b")]);
        assert_eq!(backend.lane_vehicle_count(&LaneId::new("e_0")).unwrap(), 1);
    }

    #[test]
    fn halting_counts_slow_vehicles_only() {
        let backend = ScriptedBackend::new(four_way_network());
        backend.place_vehicle(VehicleState::new("a", "s_0", Position::new(0.0, -40.0)).with_speed(0.0));
        backend.place_vehicle(VehicleState::new("b", "s_0", Position::new(0.0, -20.0)).with_speed(8.0));
        assert_eq!(backend.lane_halting_count(&LaneId::new("s_0")).unwrap(), 1);
    }

    #[test]
    fn commands_on_absent_vehicle_fail_stale() {
        let backend = ScriptedBackend::new(four_way_network());
        let err = backend
            .set_vehicle_speed(&VehicleId::new("ghost"), 0.0)
            .unwrap_err();
        assert!(err.is_stale_vehicle());
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn unknown_lane_is_reported() {
        let backend = ScriptedBackend::new(four_way_network());
        assert_eq!(
            backend.lane_length(&LaneId::new("nowhere")),
            Err(BackendError::LaneNotFound(LaneId::new("nowhere")))
        );
    }

    #[test]
    fn load_frame_replaces_dynamic_state() {
        let backend = ScriptedBackend::new(four_way_network());
        backend.place_vehicle(VehicleState::new("old", "n_0", Position::new(0.0, 50.0)));
        backend.load_frame(&Frame {
            time: 42,
            vehicles: vec![VehicleState::new("new", "w_1", Position::new(-30.0, 0.0))],
            emergency_stops: vec![VehicleId::new("new")],
            collisions: vec![],
        });
        assert_eq!(backend.current_time(), 42);
        assert!(backend.vehicle_lane(&VehicleId::new("old")).is_err());
        assert_eq!(
            backend.vehicle_lane(&VehicleId::new("new")).unwrap(),
            LaneId::new("w_1")
        );
        assert_eq!(backend.emergency_stopping_vehicles().len(), 1);
    }

    #[test]
    fn scenario_parses_with_defaults() {
        let raw = r#"{
            "network": {
                "signals": [{"id": "J", "position": {"x": 0.0, "y": 0.0}, "controlled_lanes": ["a"]}],
                "lanes": [{"id": "a", "length": 50.0, "edge": "A"}]
            },
            "frames": [{"time": 0, "vehicles": [{"id": "v", "lane": "a", "position": {"x": 0.0, "y": 12.0}}]}]
        }"#;
        let scenario = Scenario::from_json(raw).unwrap();
        assert!(scenario.config.is_none());
        assert_eq!(scenario.frames[0].vehicles[0].allowed_speed, 13.89);
        assert!(scenario.network.signals[0].outgoing_lanes.is_empty());
    }
}
