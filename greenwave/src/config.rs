// src/config.rs
//
// Per-signal controller configuration.
//
// Everything here is fixed when a controller is built and never mutated
// afterwards. Defaults reproduce the reference deployment: 5-step decision
// interval, 2-step yellow, 5/50 min/max green, hold band (10, 20] and an
// exemption decay every 200 steps.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reward::RewardWeights;
use crate::types::SimTime;

/// Timing and tuning parameters for one signal controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Steps between two consecutive decisions.
    pub decision_interval: u64,
    /// Length of the yellow clearance interval, in steps.
    pub yellow_duration: u64,
    /// Minimum green duration. Exposed to driver policies, not enforced here.
    pub min_green: u64,
    /// Maximum green duration. Exposed to driver policies, not enforced here.
    pub max_green: u64,
    /// Simulation time of the first decision.
    pub begin_time: SimTime,
    /// Vehicle length plus minimum gap, used to turn lane length into capacity.
    pub vehicle_footprint: f64,
    /// Vehicle hold manager parameters.
    pub hold: HoldConfig,
    /// Reward shaping weights.
    pub reward: RewardWeights,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            decision_interval: 5,
            yellow_duration: 2,
            min_green: 5,
            max_green: 50,
            begin_time: 0,
            vehicle_footprint: 7.5,
            hold: HoldConfig::default(),
            reward: RewardWeights::default(),
        }
    }
}

/// Parameters of the vehicle hold manager.
///
/// The band bounds and the decay period have no documented derivation; they
/// are kept configurable with the reference values as defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldConfig {
    /// Vehicles at or closer than this distance are committed to crossing.
    pub band_lower: f64,
    /// Vehicles farther than this distance are not considered yet.
    pub band_upper: f64,
    /// Deceleration capability forced on a held vehicle.
    pub hold_decel: f64,
    /// Deceleration capability restored on release.
    pub nominal_decel: f64,
    /// Commanded speed restored on release.
    pub release_speed: f64,
    /// Every `decay_period` steps the exemption set is cut to its newest half.
    pub decay_period: u64,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            band_lower: 10.0,
            band_upper: 20.0,
            hold_decel: 100.0,
            nominal_decel: 4.5,
            release_speed: 13.0,
            decay_period: 200,
        }
    }
}

impl HoldConfig {
    /// True when `distance` lies in the actionable band `(lower, upper]`.
    pub fn in_band(&self, distance: f64) -> bool {
        distance > self.band_lower && distance <= self.band_upper
    }
}

impl ControllerConfig {
    /// Check internal consistency. Called by the controller builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decision_interval == 0 {
            return Err(ConfigError::ZeroDecisionInterval);
        }
        if self.min_green > self.max_green {
            return Err(ConfigError::GreenBoundsInverted {
                min_green: self.min_green,
                max_green: self.max_green,
            });
        }
        if !(self.hold.band_lower < self.hold.band_upper) {
            return Err(ConfigError::EmptyHoldBand {
                lower: self.hold.band_lower,
                upper: self.hold.band_upper,
            });
        }
        if self.hold.decay_period == 0 {
            return Err(ConfigError::ZeroDecayPeriod);
        }
        let footprint = self.vehicle_footprint;
        if !(footprint.is_finite() && footprint > 0.0) {
            return Err(ConfigError::InvalidFootprint(footprint));
        }
        let scale = self.reward.waiting_scale;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ConfigError::InvalidWaitingScale(scale));
        }
        Ok(())
    }

    /// Build a config from defaults, then apply environment overrides.
    ///
    ///   - GREENWAVE_DELTA_TIME        (u64, steps)
    ///   - GREENWAVE_YELLOW_TIME       (u64, steps)
    ///   - GREENWAVE_MIN_GREEN         (u64, steps)
    ///   - GREENWAVE_MAX_GREEN         (u64, steps)
    ///   - GREENWAVE_BEGIN_TIME        (u64, sim time)
    ///   - GREENWAVE_HOLD_BAND_LOWER   (f64, distance)
    ///   - GREENWAVE_HOLD_BAND_UPPER   (f64, distance)
    ///   - GREENWAVE_DECAY_PERIOD      (u64, sim time)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        apply_override(&lookup, "GREENWAVE_DELTA_TIME", &mut cfg.decision_interval);
        apply_override(&lookup, "GREENWAVE_YELLOW_TIME", &mut cfg.yellow_duration);
        apply_override(&lookup, "GREENWAVE_MIN_GREEN", &mut cfg.min_green);
        apply_override(&lookup, "GREENWAVE_MAX_GREEN", &mut cfg.max_green);
        apply_override(&lookup, "GREENWAVE_BEGIN_TIME", &mut cfg.begin_time);
        apply_override(&lookup, "GREENWAVE_HOLD_BAND_LOWER", &mut cfg.hold.band_lower);
        apply_override(&lookup, "GREENWAVE_HOLD_BAND_UPPER", &mut cfg.hold.band_upper);
        apply_override(&lookup, "GREENWAVE_DECAY_PERIOD", &mut cfg.hold.decay_period);

        cfg
    }
}

fn apply_override<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => {
            tracing::info!(key, value = %v, "config override applied");
            *slot = v;
        }
        Err(_) => {
            tracing::warn!(key, raw = %raw, default = %slot, "could not parse config override; keeping default");
        }
    }
}
