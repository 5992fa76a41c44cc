//! Greenwave: per-intersection traffic signal controller.
//!
//! One [`SignalController`] drives one signalised junction of a simulated road
//! network on behalf of an external decision-maker (typically an RL agent).
//!
//! # Architecture
//!
//! - **Phase machine** (`phase`): committed action, yellow transition and
//!   decision timing.
//! - **Hold manager** (`hold`): on every applied action, holds the lead
//!   vehicle of each approach losing right-of-way when it is inside the
//!   actionable band, and releases held vehicles whose approach turns green.
//! - **Observation** (`observation`): versioned density + queue snapshot.
//! - **Reward** (`reward`): waiting-time deltas, queue penalty and a
//!   network-wide correction, attributed per lane through the shared
//!   waiting ledger (`ledger`).
//!
//! The simulator sits behind the [`SimulationBackend`] trait (`io`); the
//! in-process [`ScriptedBackend`] replays recorded scenarios and backs the
//! tests.

pub mod actions;
pub mod config;
pub mod controller;
pub mod error;
pub mod geometry;
pub mod hold;
pub mod io;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod observation;
pub mod phase;
pub mod reward;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use actions::{ActionCatalog, ApproachMask, ApproachSlot, APPROACH_SLOTS};
pub use config::{ControllerConfig, HoldConfig};
pub use controller::{ControllerSnapshot, Decision, SignalController, SignalControllerBuilder};
pub use error::{BackendError, ConfigError, ControllerError};
pub use geometry::{Approach, ApproachGeometry};
pub use hold::{HoldManager, HoldReport, SkipReason, SlotOutcome};
pub use io::{
    command_tolerant,
    scripted::{Frame, NetworkSpec, Scenario, ScriptedBackend, VehicleState},
    CommandOutcome, SimulationBackend,
};
pub use ledger::WaitingLedger;
pub use logging::{DecisionRecord, DecisionSink, JsonlSink, NoopSink};
pub use metrics::TrafficMetrics;
pub use observation::{Observation, OBS_VERSION};
pub use phase::{Commit, PhaseMachine, PhaseState};
pub use reward::{QueueMeasure, RewardComponents, RewardMode, RewardShaper, RewardWeights};
pub use types::{EdgeId, LaneId, Position, SignalId, SimTime, VehicleId};
