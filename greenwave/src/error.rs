// src/error.rs
//
// Error taxonomy for the signal controller.
//
// - BackendError:    failures reported by the simulation collaborator
// - ConfigError:     invalid controller configuration
// - ControllerError: everything a controller operation can surface

use thiserror::Error;

use crate::types::{LaneId, SignalId, SimTime, VehicleId};

/// Failure reported by a simulation backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// The vehicle left the network between the query and the command.
    #[error("vehicle '{0}' is not known to the simulation")]
    VehicleNotFound(VehicleId),
    #[error("lane '{0}' is not known to the simulation")]
    LaneNotFound(LaneId),
    #[error("signal '{0}' is not known to the simulation")]
    SignalNotFound(SignalId),
    /// Transport or protocol failure talking to the simulator.
    #[error("simulation backend failure: {0}")]
    Connection(String),
}

impl BackendError {
    /// True when the error only means a referenced vehicle has departed.
    pub fn is_stale_vehicle(&self) -> bool {
        matches!(self, BackendError::VehicleNotFound(_))
    }
}

/// Invalid controller configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("decision interval must be positive")]
    ZeroDecisionInterval,
    #[error("min green ({min_green}) exceeds max green ({max_green})")]
    GreenBoundsInverted { min_green: u64, max_green: u64 },
    #[error("hold band ({lower}, {upper}] is empty")]
    EmptyHoldBand { lower: f64, upper: f64 },
    #[error("exemption decay period must be positive")]
    ZeroDecayPeriod,
    #[error("vehicle footprint must be positive and finite, got {0}")]
    InvalidFootprint(f64),
    #[error("waiting-time scale must be positive and finite, got {0}")]
    InvalidWaitingScale(f64),
}

/// Error surfaced by a `SignalController` operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    /// A required collaborator was not supplied at construction.
    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("signal '{0}' controls no lanes")]
    NoControlledLanes(SignalId),
    /// Action catalog width does not line up with the approach geometry.
    #[error("action catalog covers {actions} approaches but signal '{signal}' has {approaches}")]
    ApproachCountMismatch {
        signal: SignalId,
        actions: usize,
        approaches: usize,
    },
    #[error("action index {index} out of range (catalog has {len} actions)")]
    UnknownAction { index: usize, len: usize },
    #[error("decision not due at t={now} (next decision at t={next})")]
    DecisionNotDue { now: SimTime, next: SimTime },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_vehicle_is_recognised() {
        let err = BackendError::VehicleNotFound(VehicleId::new("v1"));
        assert!(err.is_stale_vehicle());
        assert!(!BackendError::Connection("eof".into()).is_stale_vehicle());
    }

    #[test]
    fn backend_error_converts_into_controller_error() {
        let err: ControllerError = BackendError::LaneNotFound(LaneId::new("n_0")).into();
        assert_eq!(
            err.to_string(),
            "lane 'n_0' is not known to the simulation"
        );
    }
}
