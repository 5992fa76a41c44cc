// src/controller.rs
//
// SignalController: the driver-facing controller of one signalised junction.
//
// Per decision cycle:
//   1. driver asks `time_to_act()`
//   2. `apply_action(i)` runs the hold manager against action i, decays the
//      exemption list on its period, then commits i to the phase machine
//   3. `tick()` once per simulation step
// Observation and reward are requested separately and never mutate the
// phase or hold state.

use serde::{Deserialize, Serialize};

use crate::actions::ActionCatalog;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::geometry::ApproachGeometry;
use crate::hold::{HoldManager, HoldReport};
use crate::io::SimulationBackend;
use crate::ledger::WaitingLedger;
use crate::metrics::{self, IncidentCounter, TrafficMetrics};
use crate::observation::Observation;
use crate::phase::{Commit, PhaseMachine, PhaseState};
use crate::reward::{RewardComponents, RewardMode, RewardShaper};
use crate::types::{EdgeId, SignalId, SimTime, VehicleId};

/// Result of one applied action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub time: SimTime,
    pub action: usize,
    pub commit: Commit,
    pub holds: HoldReport,
    /// Exemptions dropped by the periodic decay at this decision.
    pub exemptions_dropped: usize,
}

/// Serializable view of the controller's mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub signal: SignalId,
    /// Edge of each controlled approach, slot order.
    pub approach_edges: Vec<EdgeId>,
    pub committed_action: Option<usize>,
    pub in_yellow_transition: bool,
    pub ticks_since_phase_change: u64,
    pub next_decision_time: SimTime,
    /// Sorted for stable output.
    pub held_vehicles: Vec<VehicleId>,
    /// Oldest release first.
    pub recently_released: Vec<VehicleId>,
    pub waiting_baseline_local: f64,
    pub waiting_baseline_network: f64,
    pub last_reward: Option<f64>,
}

/// Builder for [`SignalController`].
///
/// Backend and ledger are required; config and catalog default to the
/// reference values.
#[derive(Debug)]
pub struct SignalControllerBuilder<B> {
    signal: SignalId,
    config: ControllerConfig,
    catalog: ActionCatalog,
    backend: Option<B>,
    ledger: Option<WaitingLedger>,
}

impl<B> SignalControllerBuilder<B>
where
    B: SimulationBackend,
{
    pub fn new(signal: SignalId) -> Self {
        Self {
            signal,
            config: ControllerConfig::default(),
            catalog: ActionCatalog::reference(),
            backend: None,
            ledger: None,
        }
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(mut self, catalog: ActionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn backend(mut self, backend: B) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Waiting ledger shared with the other controllers of the network.
    pub fn ledger(mut self, ledger: WaitingLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Validate everything and read the junction geometry.
    pub fn build(self) -> Result<SignalController<B>, ControllerError> {
        let backend = self
            .backend
            .ok_or(ControllerError::MissingCollaborator("simulation backend"))?;
        let ledger = self
            .ledger
            .ok_or(ControllerError::MissingCollaborator("waiting ledger"))?;
        self.config.validate()?;

        let geometry = ApproachGeometry::load(&backend, &self.signal)?;
        if geometry.len() != self.catalog.width() {
            return Err(ControllerError::ApproachCountMismatch {
                signal: self.signal,
                actions: self.catalog.width(),
                approaches: geometry.len(),
            });
        }

        let cfg = &self.config;
        let phase = PhaseMachine::new(
            cfg.begin_time,
            cfg.decision_interval,
            cfg.yellow_duration,
            cfg.min_green,
            cfg.max_green,
        );
        let holds = HoldManager::new(cfg.hold.clone());
        let reward = RewardShaper::new(cfg.reward.clone());

        tracing::info!(
            signal = %self.signal,
            approaches = geometry.len(),
            actions = self.catalog.len(),
            begin_time = cfg.begin_time,
            "signal controller ready"
        );

        Ok(SignalController {
            signal: self.signal,
            config: self.config,
            catalog: self.catalog,
            geometry,
            backend,
            ledger,
            phase,
            holds,
            reward,
            incidents: IncidentCounter::new(),
        })
    }
}

/// Controller of one signalised junction.
#[derive(Debug)]
pub struct SignalController<B> {
    signal: SignalId,
    config: ControllerConfig,
    catalog: ActionCatalog,
    geometry: ApproachGeometry,
    backend: B,
    ledger: WaitingLedger,
    phase: PhaseMachine,
    holds: HoldManager,
    reward: RewardShaper,
    incidents: IncidentCounter,
}

impl<B> SignalController<B>
where
    B: SimulationBackend,
{
    pub fn builder(signal: SignalId) -> SignalControllerBuilder<B> {
        SignalControllerBuilder::new(signal)
    }

    /// True when the current simulation time is the scheduled decision time.
    pub fn time_to_act(&self) -> bool {
        self.phase.is_decision_due(self.backend.current_time())
    }

    /// Apply action `index` at the current simulation time.
    ///
    /// Holds and releases are issued against the requested action before it
    /// is committed.
    pub fn apply_action(&mut self, index: usize) -> Result<Decision, ControllerError> {
        let now = self.backend.current_time();
        if !self.phase.is_decision_due(now) {
            return Err(ControllerError::DecisionNotDue {
                now,
                next: self.phase.next_decision_time(),
            });
        }
        let mask = self
            .catalog
            .get(index)
            .ok_or(ControllerError::UnknownAction {
                index,
                len: self.catalog.len(),
            })?;

        let holds = self.holds.evaluate(&self.backend, &self.geometry, mask)?;
        let exemptions_dropped = self.holds.decay_exemptions(now);
        let commit = self.phase.commit(index, now);

        match commit {
            Commit::Changed { from, to } => tracing::debug!(
                signal = %self.signal,
                now,
                ?from,
                to,
                held = holds.held().count(),
                released = holds.released().count(),
                "phase change"
            ),
            Commit::Kept(action) => tracing::trace!(signal = %self.signal, now, action, "phase kept"),
        }

        Ok(Decision {
            time: now,
            action: index,
            commit,
            holds,
            exemptions_dropped,
        })
    }

    /// Advance the phase machine by one simulation step.
    pub fn tick(&mut self) {
        self.phase.tick();
    }

    pub fn compute_observation(&self) -> Result<Observation, ControllerError> {
        Ok(Observation::from_backend(
            &self.backend,
            &self.geometry,
            self.config.vehicle_footprint,
        )?)
    }

    /// Length of the flat observation vector.
    pub fn observation_size(&self) -> usize {
        2 * self.geometry.len()
    }

    pub fn action_count(&self) -> usize {
        self.catalog.len()
    }

    pub fn compute_reward(&mut self, mode: RewardMode) -> Result<f64, ControllerError> {
        Ok(self.compute_reward_components(mode)?.reward)
    }

    /// Reward with its breakdown. Shaped mode moves the waiting baselines.
    pub fn compute_reward_components(
        &mut self,
        mode: RewardMode,
    ) -> Result<RewardComponents, ControllerError> {
        Ok(self.reward.compute(
            mode,
            &self.backend,
            &self.geometry,
            &self.ledger,
            self.config.vehicle_footprint,
        )?)
    }

    pub fn last_reward(&self) -> Option<f64> {
        self.reward.last_reward()
    }

    /// Count this step's emergency brakes on the approaches into the running
    /// total. Call once per simulation step, decision or not.
    pub fn record_incidents(&mut self) -> Result<u64, ControllerError> {
        Ok(self
            .incidents
            .record_emergency_brakes(&self.backend, &self.geometry)?)
    }

    pub fn total_emergency_brakes(&self) -> u64 {
        self.incidents.total_emergency_brakes()
    }

    /// Junction metrics at the current step. Read-only; the emergency-brake
    /// total covers the steps passed to `record_incidents`.
    pub fn traffic_metrics(&self) -> Result<TrafficMetrics, ControllerError> {
        let backend = &self.backend;
        let geo = &self.geometry;
        Ok(TrafficMetrics {
            pressure: metrics::pressure(backend, geo)?,
            average_speed_ratio: metrics::average_speed_ratio(backend, geo)?,
            total_halting: metrics::total_halting(backend, geo)?,
            outgoing_density: metrics::outgoing_density(backend, geo, self.config.vehicle_footprint)?,
            emergency_brakes: metrics::emergency_brakes(backend, geo)?,
            total_emergency_brakes: self.incidents.total_emergency_brakes(),
            nearby_collisions: metrics::nearby_collisions(backend, geo)?,
        })
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let mut held: Vec<VehicleId> = self.holds.held_vehicles().iter().cloned().collect();
        held.sort();
        ControllerSnapshot {
            signal: self.signal.clone(),
            approach_edges: self.geometry.edges(),
            committed_action: self.phase.committed_action(),
            in_yellow_transition: self.phase.is_yellow(),
            ticks_since_phase_change: self.phase.ticks_since_phase_change(),
            next_decision_time: self.phase.next_decision_time(),
            held_vehicles: held,
            recently_released: self.holds.recently_released().cloned().collect(),
            waiting_baseline_local: self.reward.baseline_local(),
            waiting_baseline_network: self.reward.baseline_network(),
            last_reward: self.reward.last_reward(),
        }
    }

    pub fn signal(&self) -> &SignalId {
        &self.signal
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn geometry(&self) -> &ApproachGeometry {
        &self.geometry
    }

    pub fn phase(&self) -> &PhaseMachine {
        &self.phase
    }

    pub fn phase_state(&self) -> PhaseState {
        self.phase.state()
    }

    pub fn holds(&self) -> &HoldManager {
        &self.holds
    }

    pub fn ledger(&self) -> &WaitingLedger {
        &self.ledger
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
