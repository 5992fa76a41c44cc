// tests/reward_tests.rs
//
// Reward shaping through the controller, including waiting-time attribution
// shared between the controllers of a two-signal corridor.

use std::sync::Arc;

use greenwave::io::scripted::{LaneSpec, NetworkSpec, SignalSpec};
use greenwave::{
    ControllerConfig, EdgeId, LaneId, Position, QueueMeasure, RewardMode, RewardWeights,
    ScriptedBackend, SignalController, SignalId, VehicleId, VehicleState, WaitingLedger,
};

const EPS: f64 = 1e-9;

fn approach_lanes(prefix: &str) -> Vec<String> {
    (0..8).map(|i| format!("{prefix}{i}")).collect()
}

/// Two junctions, `A` at the origin and `B` 200 units east, eight approaches each.
fn corridor() -> NetworkSpec {
    let mut lanes = Vec::new();
    let mut signals = Vec::new();
    for (id, prefix, x) in [("A", "a", 0.0), ("B", "b", 200.0)] {
        let ids = approach_lanes(prefix);
        lanes.extend(ids.iter().map(|l| LaneSpec {
            id: LaneId::new(l.as_str()),
            length: 75.0,
            edge: EdgeId::new(format!("{prefix}_in")),
        }));
        signals.push(SignalSpec {
            id: SignalId::new(id),
            position: Position::new(x, 0.0),
            controlled_lanes: ids.iter().map(|l| LaneId::new(l.as_str())).collect(),
            outgoing_lanes: vec![],
        });
    }
    NetworkSpec { signals, lanes }
}

type Ctl = SignalController<Arc<ScriptedBackend>>;

fn controllers(backend: &Arc<ScriptedBackend>, cfg: ControllerConfig) -> (Ctl, Ctl, WaitingLedger) {
    let ledger = WaitingLedger::new();
    let build = |signal: &str| {
        SignalController::builder(SignalId::new(signal))
            .config(cfg.clone())
            .backend(Arc::clone(backend))
            .ledger(ledger.clone())
            .build()
            .unwrap()
    };
    let a = build("A");
    let b = build("B");
    (a, b, ledger)
}

#[test]
fn vehicle_waiting_is_attributed_per_lane_across_signals() {
    let backend = Arc::new(ScriptedBackend::new(corridor()));
    let (mut a, mut b, ledger) = controllers(&backend, ControllerConfig::default());
    let v = VehicleId::new("v");

    backend.place_vehicle(VehicleState::new("v", "a0", Position::new(0.0, 30.0)).with_waiting(5.0));
    let first = a.compute_reward_components(RewardMode::Shaped).unwrap();
    assert!((first.local_waiting - 0.05).abs() < EPS);
    assert_eq!(ledger.get(&v, &LaneId::new("a0")), Some(5.0));

    // The vehicle moves on to B having waited 12 in total.
    backend.update_vehicle(&v, |s| {
        s.lane = LaneId::new("b0");
        s.position = Position::new(200.0, 40.0);
        s.accumulated_waiting = 12.0;
    });
    let second = b.compute_reward_components(RewardMode::Shaped).unwrap();
    assert!((second.local_waiting - 0.07).abs() < EPS);
    assert_eq!(ledger.get(&v, &LaneId::new("b0")), Some(7.0));
    assert_eq!(ledger.get(&v, &LaneId::new("a0")), Some(5.0));
}

#[test]
fn second_reward_call_without_change_has_zero_local_delta() {
    let backend = Arc::new(ScriptedBackend::new(corridor()));
    let (mut a, _b, _ledger) = controllers(&backend, ControllerConfig::default());
    backend.place_vehicle(VehicleState::new("v", "a3", Position::new(-30.0, 0.0)).with_waiting(40.0));

    a.compute_reward(RewardMode::Shaped).unwrap();
    let second = a.compute_reward_components(RewardMode::Shaped).unwrap();
    assert_eq!(second.local_waiting_delta, 0.0);
    assert_eq!(second.network_waiting_delta, 0.0);
    // Only the queue penalty is left: one halted vehicle.
    assert!((second.reward - 0.15 * -1.0).abs() < EPS);
}

#[test]
fn network_term_sees_the_other_junction() {
    let backend = Arc::new(ScriptedBackend::new(corridor()));
    let (mut a, _b, _ledger) = controllers(&backend, ControllerConfig::default());
    backend.place_vehicle(
        VehicleState::new("far", "b5", Position::new(230.0, 0.0))
            .with_waiting(300.0)
            .with_speed(2.0),
    );

    let c = a.compute_reward_components(RewardMode::Shaped).unwrap();
    assert_eq!(c.local_waiting, 0.0);
    assert!((c.network_waiting - 3.0).abs() < EPS);
    assert_eq!(c.queue_penalty, 0.0);
    // Rising network waiting is a negative delta, subtracted with weight 0.05.
    assert!((c.reward - 0.05 * 3.0).abs() < EPS);
}

#[test]
fn alternate_flag_selects_queue_only_reward() {
    let backend = Arc::new(ScriptedBackend::new(corridor()));
    let (mut a, _b, ledger) = controllers(&backend, ControllerConfig::default());
    for (i, lane) in ["a0", "a0", "a4"].iter().enumerate() {
        backend.place_vehicle(
            VehicleState::new(&format!("q{i}"), lane, Position::new(0.0, 10.0 + i as f64))
                .with_waiting(10.0),
        );
    }

    let r = a.compute_reward(RewardMode::from_flag(true)).unwrap();
    assert_eq!(r, -9.0);
    assert_eq!(a.last_reward(), Some(-9.0));
    assert_eq!(a.snapshot().waiting_baseline_local, 0.0);
    assert_eq!(ledger.vehicle_count(), 0);
}

#[test]
fn weights_come_from_config() {
    let backend = Arc::new(ScriptedBackend::new(corridor()));
    let cfg = ControllerConfig {
        reward: RewardWeights {
            local_waiting: 1.0,
            queue: 0.0,
            network_waiting: 0.0,
            waiting_scale: 1.0,
            queue_measure: QueueMeasure::HaltingCount,
        },
        ..ControllerConfig::default()
    };
    let (mut a, _b, _ledger) = controllers(&backend, cfg);
    backend.place_vehicle(VehicleState::new("v", "a1", Position::new(30.0, 0.0)).with_waiting(20.0));
    a.compute_reward(RewardMode::Shaped).unwrap();

    backend.update_vehicle(&VehicleId::new("v"), |s| s.accumulated_waiting = 26.0);
    let r = a.compute_reward(RewardMode::Shaped).unwrap();
    assert!((r + 6.0).abs() < EPS);
}

#[test]
fn incidents_accumulate_per_recorded_step() {
    let backend = Arc::new(ScriptedBackend::new(corridor()));
    let (mut a, mut b, _ledger) = controllers(&backend, ControllerConfig::default());
    backend.place_vehicle(VehicleState::new("x", "a2", Position::new(0.0, -25.0)));
    backend.set_emergency_stops(vec![VehicleId::new("x")]);

    assert_eq!(a.record_incidents().unwrap(), 1);
    assert_eq!(b.record_incidents().unwrap(), 0);
    backend.advance(1);
    assert_eq!(a.record_incidents().unwrap(), 1);
    backend.advance(1);
    backend.set_emergency_stops(vec![]);
    assert_eq!(a.record_incidents().unwrap(), 0);
    assert_eq!(a.total_emergency_brakes(), 2);

    // Reading metrics reports the current step without adding to the total.
    backend.set_emergency_stops(vec![VehicleId::new("x")]);
    let m = a.traffic_metrics().unwrap();
    assert_eq!(m.emergency_brakes, 1);
    assert_eq!(m.total_emergency_brakes, 2);
    assert_eq!(m.total_halting, 1);
    assert_eq!(a.traffic_metrics().unwrap().total_emergency_brakes, 2);
    assert_eq!(b.traffic_metrics().unwrap().emergency_brakes, 0);
}
