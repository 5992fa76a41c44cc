// src/reward.rs
//
// Reward shaping for one signal.
//
// Shaped reward:
//   r = w_local * (prev_local - local)
//     + w_queue * queue_penalty
//     - w_network * (prev_network - network)
// where local/network are attributed waiting time summed over this signal's
// approaches / every controlled lane in the network, divided by the waiting
// scale, and queue_penalty = -(sum of halted vehicles on the approaches)^2.
// Both waiting baselines absorb the new reading after each computation.

use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::geometry::ApproachGeometry;
use crate::io::SimulationBackend;
use crate::ledger::WaitingLedger;
use crate::metrics;
use crate::observation::Observation;
use crate::types::LaneId;

/// How queues enter the queue penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMeasure {
    /// Raw count of halted vehicles per approach.
    #[default]
    HaltingCount,
    /// Halted vehicles relative to lane capacity, as in the observation.
    QueueRatio,
}

/// Configurable weights for reward computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    /// Weight on the local waiting-time improvement.
    pub local_waiting: f64,
    /// Weight on the (negative) queue penalty.
    pub queue: f64,
    /// Weight on the network waiting-time improvement (subtracted).
    pub network_waiting: f64,
    /// Waiting sums are divided by this before differencing.
    pub waiting_scale: f64,
    pub queue_measure: QueueMeasure,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            local_waiting: 80.0,
            queue: 0.15,
            network_waiting: 0.05,
            waiting_scale: 100.0,
            queue_measure: QueueMeasure::HaltingCount,
        }
    }
}

/// Which reward the driver asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardMode {
    /// Waiting-time deltas plus queue penalty.
    #[default]
    Shaped,
    /// Queue penalty alone (evaluation mode).
    QueueOnly,
    /// Negative junction pressure.
    Pressure,
    /// Mean speed ratio on the approaches.
    AverageSpeed,
}

impl RewardMode {
    /// Map the driver's evaluation flag: false → Shaped, true → QueueOnly.
    pub fn from_flag(alternate: bool) -> Self {
        if alternate {
            RewardMode::QueueOnly
        } else {
            RewardMode::Shaped
        }
    }
}

/// Reward components for per-decision logging and reward reconstruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardComponents {
    pub mode: RewardMode,
    /// Scaled attributed waiting on this signal's approaches.
    pub local_waiting: f64,
    /// Scaled attributed waiting on every controlled lane of the network.
    pub network_waiting: f64,
    pub local_waiting_delta: f64,
    pub network_waiting_delta: f64,
    pub queue_penalty: f64,
    pub pressure: f64,
    pub average_speed_ratio: f64,
    /// Scalar reward handed to the driver.
    pub reward: f64,
}

/// Running state of the reward shaper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardShaper {
    weights: RewardWeights,
    baseline_local: f64,
    baseline_network: f64,
    last_reward: Option<f64>,
}

impl RewardShaper {
    pub fn new(weights: RewardWeights) -> Self {
        Self {
            weights,
            baseline_local: 0.0,
            baseline_network: 0.0,
            last_reward: None,
        }
    }

    pub fn weights(&self) -> &RewardWeights {
        &self.weights
    }

    pub fn baseline_local(&self) -> f64 {
        self.baseline_local
    }

    pub fn baseline_network(&self) -> f64 {
        self.baseline_network
    }

    pub fn last_reward(&self) -> Option<f64> {
        self.last_reward
    }

    /// Compute the reward for `mode`, updating baselines where the mode uses them.
    pub fn compute<B>(
        &mut self,
        mode: RewardMode,
        backend: &B,
        geometry: &ApproachGeometry,
        ledger: &WaitingLedger,
        footprint: f64,
    ) -> Result<RewardComponents, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        let mut c = RewardComponents {
            mode,
            ..RewardComponents::default()
        };

        match mode {
            RewardMode::Shaped => {
                let local_lanes = geometry.approaches().iter().map(|a| &a.lane);
                c.local_waiting =
                    attributed_waiting(backend, ledger, local_lanes)? / self.weights.waiting_scale;
                c.local_waiting_delta = self.baseline_local - c.local_waiting;
                self.baseline_local = c.local_waiting;

                c.queue_penalty = self.queue_penalty(backend, geometry, footprint)?;

                c.network_waiting = attributed_waiting(backend, ledger, geometry.network_lanes().iter())?
                    / self.weights.waiting_scale;
                c.network_waiting_delta = self.baseline_network - c.network_waiting;
                self.baseline_network = c.network_waiting;

                c.reward = self.weights.local_waiting * c.local_waiting_delta
                    + self.weights.queue * c.queue_penalty
                    - self.weights.network_waiting * c.network_waiting_delta;
            }
            RewardMode::QueueOnly => {
                c.queue_penalty = self.queue_penalty(backend, geometry, footprint)?;
                c.reward = c.queue_penalty;
            }
            RewardMode::Pressure => {
                c.pressure = metrics::pressure(backend, geometry)?;
                c.reward = -c.pressure;
            }
            RewardMode::AverageSpeed => {
                c.average_speed_ratio = metrics::average_speed_ratio(backend, geometry)?;
                c.reward = c.average_speed_ratio;
            }
        }

        self.last_reward = Some(c.reward);
        Ok(c)
    }

    /// -(sum of queues over the approaches)^2.
    fn queue_penalty<B>(
        &self,
        backend: &B,
        geometry: &ApproachGeometry,
        footprint: f64,
    ) -> Result<f64, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        let total = match self.weights.queue_measure {
            QueueMeasure::HaltingCount => metrics::total_halting(backend, geometry)? as f64,
            QueueMeasure::QueueRatio => {
                Observation::from_backend(backend, geometry, footprint)?.total_queue_ratio()
            }
        };
        Ok(-(total * total))
    }
}

/// Sum of ledger-attributed waiting for every vehicle on `lanes`.
///
/// Each vehicle is attributed on the lane it reports being on; vehicles that
/// disappear between the lane listing and the vehicle query are skipped.
pub fn attributed_waiting<'a, B, I>(
    backend: &B,
    ledger: &WaitingLedger,
    lanes: I,
) -> Result<f64, BackendError>
where
    B: SimulationBackend + ?Sized,
    I: IntoIterator<Item = &'a LaneId>,
{
    let mut total = 0.0;
    for lane in lanes {
        for vehicle in backend.lane_vehicles(lane)? {
            let reading = backend
                .vehicle_lane(&vehicle)
                .and_then(|l| Ok((l, backend.vehicle_accumulated_waiting(&vehicle)?)));
            match reading {
                Ok((current_lane, cumulative)) => {
                    total += ledger.attribute(&vehicle, &current_lane, cumulative);
                }
                Err(err) if err.is_stale_vehicle() => continue,
                Err(err) => return Err(err),
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::scripted::{four_way_network, ScriptedBackend, VehicleState};
    use crate::types::{Position, SignalId, VehicleId};

    fn setup() -> (ScriptedBackend, ApproachGeometry, WaitingLedger, RewardShaper) {
        let backend = ScriptedBackend::new(four_way_network());
        let geo = ApproachGeometry::load(&backend, &SignalId::new("J")).unwrap();
        (backend, geo, WaitingLedger::new(), RewardShaper::new(RewardWeights::default()))
    }

    #[test]
    fn mode_flag_mapping() {
        assert_eq!(RewardMode::from_flag(false), RewardMode::Shaped);
        assert_eq!(RewardMode::from_flag(true), RewardMode::QueueOnly);
    }

    #[test]
    fn shaped_reward_combines_terms() {
        let (backend, geo, ledger, mut shaper) = setup();
        backend.place_vehicle(VehicleState::new("a", "n_0", Position::new(0.0, 30.0)).with_waiting(50.0));
        backend.place_vehicle(VehicleState::new("b", "s_0", Position::new(0.0, -30.0)).with_waiting(150.0));

        let c = shaper
            .compute(RewardMode::Shaped, &backend, &geo, &ledger, 7.5)
            .unwrap();

        // Both vehicles are halted and waiting 200 in total.
        assert!((c.local_waiting - 2.0).abs() < 1e-12);
        assert!((c.local_waiting_delta + 2.0).abs() < 1e-12);
        assert!((c.network_waiting_delta + 2.0).abs() < 1e-12);
        assert_eq!(c.queue_penalty, -4.0);
        let expected = 80.0 * -2.0 + 0.15 * -4.0 - 0.05 * -2.0;
        assert!((c.reward - expected).abs() < 1e-9);
        assert_eq!(shaper.last_reward(), Some(c.reward));
    }

    #[test]
    fn second_call_without_change_has_zero_local_delta() {
        let (backend, geo, ledger, mut shaper) = setup();
        backend.place_vehicle(VehicleState::new("a", "n_0", Position::new(0.0, 30.0)).with_waiting(12.0));

        shaper.compute(RewardMode::Shaped, &backend, &geo, &ledger, 7.5).unwrap();
        let second = shaper
            .compute(RewardMode::Shaped, &backend, &geo, &ledger, 7.5)
            .unwrap();

        assert_eq!(second.local_waiting_delta, 0.0);
        assert_eq!(second.network_waiting_delta, 0.0);
    }

    #[test]
    fn waiting_decrease_is_rewarded() {
        let (backend, geo, ledger, mut shaper) = setup();
        backend.place_vehicle(VehicleState::new("a", "n_0", Position::new(0.0, 30.0)).with_waiting(100.0));
        shaper.compute(RewardMode::Shaped, &backend, &geo, &ledger, 7.5).unwrap();

        backend.remove_vehicle(&VehicleId::new("a"));
        let c = shaper.compute(RewardMode::Shaped, &backend, &geo, &ledger, 7.5).unwrap();
        assert!((c.local_waiting_delta - 1.0).abs() < 1e-12);
        assert!(c.reward > 0.0);
    }

    #[test]
    fn attribution_uses_vehicle_lane_and_ledger() {
        let (backend, _geo, ledger, _) = setup();
        ledger.insert(VehicleId::new("v"), LaneId::new("n_0"), 5.0);
        backend.place_vehicle(VehicleState::new("v", "n_1", Position::new(0.0, 30.0)).with_waiting(12.0));

        let lanes = [LaneId::new("n_1")];
        let total = attributed_waiting(&backend, &ledger, lanes.iter()).unwrap();
        assert!((total - 7.0).abs() < 1e-12);
        assert_eq!(ledger.get(&VehicleId::new("v"), &LaneId::new("n_1")), Some(7.0));
    }

    #[test]
    fn queue_only_mode_leaves_baselines() {
        let (backend, geo, ledger, mut shaper) = setup();
        backend.place_vehicle(VehicleState::new("a", "n_0", Position::new(0.0, 30.0)).with_waiting(40.0));
        backend.place_vehicle(VehicleState::new("b", "e_0", Position::new(30.0, 0.0)));
        backend.place_vehicle(VehicleState::new("c", "e_0", Position::new(20.0, 0.0)));

        let c = shaper
            .compute(RewardMode::QueueOnly, &backend, &geo, &ledger, 7.5)
            .unwrap();
        assert_eq!(c.reward, -9.0);
        assert_eq!(shaper.baseline_local(), 0.0);
        assert_eq!(ledger.vehicle_count(), 0);
    }

    #[test]
    fn queue_ratio_measure() {
        let (backend, geo, ledger, _) = setup();
        let mut shaper = RewardShaper::new(RewardWeights {
            queue_measure: QueueMeasure::QueueRatio,
            ..RewardWeights::default()
        });
        backend.place_vehicle(VehicleState::new("a", "n_0", Position::new(0.0, 30.0)));
        let c = shaper
            .compute(RewardMode::QueueOnly, &backend, &geo, &ledger, 7.5)
            .unwrap();
        let ratio = 7.5 / 100.0;
        assert!((c.reward + ratio * ratio).abs() < 1e-12);
    }

    #[test]
    fn pressure_and_speed_modes() {
        let (backend, geo, ledger, mut shaper) = setup();
        backend.place_vehicle(VehicleState::new("a", "n_0", Position::new(0.0, 30.0)).with_speed(13.89));
        let p = shaper.compute(RewardMode::Pressure, &backend, &geo, &ledger, 7.5).unwrap();
        assert_eq!(p.reward, -1.0);
        let s = shaper
            .compute(RewardMode::AverageSpeed, &backend, &geo, &ledger, 7.5)
            .unwrap();
        assert!((s.reward - 1.0).abs() < 1e-12);
    }
}
