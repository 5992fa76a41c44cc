// src/hold.rs
//
// Vehicle hold manager.
//
// On every applied action the lead vehicle of each approach slot is checked:
// - Hold:    slot loses right-of-way, vehicle sits in the band (lower, upper]
//            from the junction, is not held and not recently released.
//            The vehicle gets a very high deceleration and speed 0.
// - Release: vehicle is held and its slot gains right-of-way.
//            Nominal deceleration and cruising speed are restored and the
//            vehicle becomes exempt from being held again.
//
// Vehicles closer than the band are already committed to crossing; vehicles
// beyond it are left alone until they get closer.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::actions::{ApproachMask, ApproachSlot};
use crate::config::HoldConfig;
use crate::error::BackendError;
use crate::geometry::ApproachGeometry;
use crate::io::{command_tolerant, CommandOutcome, SimulationBackend};
use crate::types::{SimTime, VehicleId};

/// What happened on one approach slot during an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SlotOutcome {
    /// No vehicle on the approach.
    Empty,
    Held { vehicle: VehicleId, distance: f64 },
    Released { vehicle: VehicleId },
    /// Lead vehicle left untouched.
    Untouched { vehicle: VehicleId, reason: SkipReason },
    /// Lead vehicle vanished while it was being inspected or commanded.
    VehicleGone { vehicle: VehicleId },
}

/// Why a lead vehicle was not held or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Slot keeps right-of-way and the vehicle is not held.
    HasRightOfWay,
    /// Already held and its slot is still denied.
    AlreadyHeld,
    /// Too close to stop safely.
    Committed,
    /// Too far away to matter yet.
    OutOfRange,
    /// Released recently; exempt from another hold.
    Exempt,
}

/// Per-slot outcomes of one evaluation, slot order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldReport {
    pub slots: Vec<SlotOutcome>,
}

impl HoldReport {
    pub fn held(&self) -> impl Iterator<Item = &VehicleId> {
        self.slots.iter().filter_map(|s| match s {
            SlotOutcome::Held { vehicle, .. } => Some(vehicle),
            _ => None,
        })
    }

    pub fn released(&self) -> impl Iterator<Item = &VehicleId> {
        self.slots.iter().filter_map(|s| match s {
            SlotOutcome::Released { vehicle } => Some(vehicle),
            _ => None,
        })
    }
}

/// Hold/release memory carried across decision cycles.
///
/// Invariant: `held` and `recently_released` never share a vehicle.
#[derive(Debug, Clone)]
pub struct HoldManager {
    config: HoldConfig,
    held: HashSet<VehicleId>,
    /// Oldest first.
    recently_released: VecDeque<VehicleId>,
}

impl HoldManager {
    pub fn new(config: HoldConfig) -> Self {
        Self {
            config,
            held: HashSet::new(),
            recently_released: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &HoldConfig {
        &self.config
    }

    pub fn is_held(&self, vehicle: &VehicleId) -> bool {
        self.held.contains(vehicle)
    }

    pub fn is_exempt(&self, vehicle: &VehicleId) -> bool {
        self.recently_released.contains(vehicle)
    }

    pub fn held_vehicles(&self) -> &HashSet<VehicleId> {
        &self.held
    }

    /// Exempt vehicles, oldest release first.
    pub fn recently_released(&self) -> impl Iterator<Item = &VehicleId> {
        self.recently_released.iter()
    }

    /// Evaluate every approach slot against the upcoming `mask`.
    ///
    /// Departed vehicles are tolerated: a failed query or a stale command
    /// only affects that slot. Any other backend failure aborts the
    /// evaluation.
    pub fn evaluate<B>(
        &mut self,
        backend: &B,
        geometry: &ApproachGeometry,
        mask: &ApproachMask,
    ) -> Result<HoldReport, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        let mut report = HoldReport::default();
        for slot in ApproachSlot::all() {
            let outcome = match geometry.lead_vehicle(backend, slot)? {
                None => SlotOutcome::Empty,
                Some(vehicle) => self.evaluate_lead(backend, geometry, slot, mask.is_green(slot), vehicle)?,
            };
            report.slots.push(outcome);
        }
        debug_assert!(self.held.iter().all(|v| !self.recently_released.contains(v)));
        Ok(report)
    }

    fn evaluate_lead<B>(
        &mut self,
        backend: &B,
        geometry: &ApproachGeometry,
        slot: ApproachSlot,
        green: bool,
        vehicle: VehicleId,
    ) -> Result<SlotOutcome, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        if self.held.contains(&vehicle) {
            if !green {
                return Ok(SlotOutcome::Untouched {
                    vehicle,
                    reason: SkipReason::AlreadyHeld,
                });
            }
            self.release(backend, &vehicle)?;
            tracing::debug!(%slot, vehicle = %vehicle, "released held vehicle");
            return Ok(SlotOutcome::Released { vehicle });
        }

        if green {
            return Ok(SlotOutcome::Untouched {
                vehicle,
                reason: SkipReason::HasRightOfWay,
            });
        }

        let distance = match geometry.distance_to_junction(backend, &vehicle) {
            Ok(d) => d,
            Err(err) if err.is_stale_vehicle() => return Ok(SlotOutcome::VehicleGone { vehicle }),
            Err(err) => return Err(err),
        };

        if distance <= self.config.band_lower {
            return Ok(SlotOutcome::Untouched {
                vehicle,
                reason: SkipReason::Committed,
            });
        }
        if !self.config.in_band(distance) {
            return Ok(SlotOutcome::Untouched {
                vehicle,
                reason: SkipReason::OutOfRange,
            });
        }
        if self.is_exempt(&vehicle) {
            return Ok(SlotOutcome::Untouched {
                vehicle,
                reason: SkipReason::Exempt,
            });
        }

        match self.hold(backend, &vehicle)? {
            CommandOutcome::Applied => {
                tracing::debug!(%slot, vehicle = %vehicle, distance, "holding lead vehicle");
                Ok(SlotOutcome::Held { vehicle, distance })
            }
            CommandOutcome::VehicleGone => Ok(SlotOutcome::VehicleGone { vehicle }),
        }
    }

    fn hold<B>(&mut self, backend: &B, vehicle: &VehicleId) -> Result<CommandOutcome, BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        let decel = command_tolerant(vehicle, || {
            backend.set_vehicle_decel(vehicle, self.config.hold_decel)
        })?;
        if decel == CommandOutcome::VehicleGone {
            return Ok(decel);
        }
        let speed = command_tolerant(vehicle, || backend.set_vehicle_speed(vehicle, 0.0))?;
        if speed == CommandOutcome::Applied {
            self.held.insert(vehicle.clone());
        }
        Ok(speed)
    }

    /// Bookkeeping happens even if the vehicle already left the network.
    fn release<B>(&mut self, backend: &B, vehicle: &VehicleId) -> Result<(), BackendError>
    where
        B: SimulationBackend + ?Sized,
    {
        command_tolerant(vehicle, || {
            backend.set_vehicle_speed(vehicle, self.config.release_speed)
        })?;
        command_tolerant(vehicle, || {
            backend.set_vehicle_decel(vehicle, self.config.nominal_decel)
        })?;
        self.held.remove(vehicle);
        if !self.recently_released.contains(vehicle) {
            self.recently_released.push_back(vehicle.clone());
        }
        Ok(())
    }

    /// Cut the exemption set to its newest half on every decay period.
    ///
    /// This is a memory bound heuristic rather than an eviction policy: it
    /// fires when `now` is a non-zero multiple of the decay period and drops
    /// the oldest `len / 2` exemptions. Returns the number dropped.
    pub fn decay_exemptions(&mut self, now: SimTime) -> usize {
        if now == 0 || now % self.config.decay_period != 0 {
            return 0;
        }
        let dropped = self.recently_released.len() / 2;
        self.recently_released.drain(..dropped);
        if dropped > 0 {
            tracing::debug!(now, dropped, remaining = self.recently_released.len(), "decayed release exemptions");
        }
        dropped
    }
}
