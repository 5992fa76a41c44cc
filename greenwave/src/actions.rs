// src/actions.rs
//
// Discrete action catalog.
//
// An action says which approach slots receive right-of-way. Each action is an
// ApproachMask: one flag per slot, addressed only through ApproachSlot so a
// bit can never be read against the wrong approach.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of approach slots covered by every action.
pub const APPROACH_SLOTS: usize = 8;

/// Index of an approach slot, guaranteed to be `< APPROACH_SLOTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApproachSlot(usize);

impl ApproachSlot {
    pub fn new(index: usize) -> Option<Self> {
        (index < APPROACH_SLOTS).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// All slots in order.
    pub fn all() -> impl Iterator<Item = ApproachSlot> {
        (0..APPROACH_SLOTS).map(ApproachSlot)
    }
}

impl fmt::Display for ApproachSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

/// Right-of-way flags for every approach slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ApproachMask {
    green: [bool; APPROACH_SLOTS],
}

impl ApproachMask {
    /// Mask granting right-of-way to exactly `slots`.
    pub fn with_green(slots: &[ApproachSlot]) -> Self {
        let mut mask = Self::default();
        for slot in slots {
            mask.green[slot.0] = true;
        }
        mask
    }

    /// Build from a 0/1 pattern, slot order. Any non-zero value is green.
    pub fn from_bits(bits: [u8; APPROACH_SLOTS]) -> Self {
        Self {
            green: bits.map(|b| b != 0),
        }
    }

    pub fn is_green(&self, slot: ApproachSlot) -> bool {
        self.green[slot.0]
    }

    pub fn green_slots(&self) -> impl Iterator<Item = ApproachSlot> + '_ {
        ApproachSlot::all().filter(|s| self.is_green(*s))
    }

    pub fn bits(&self) -> [u8; APPROACH_SLOTS] {
        self.green.map(u8::from)
    }
}

/// Ordered, immutable set of discrete actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCatalog {
    actions: Vec<ApproachMask>,
}

impl ActionCatalog {
    /// Build a catalog. Returns None for an empty action list.
    pub fn new(actions: Vec<ApproachMask>) -> Option<Self> {
        (!actions.is_empty()).then_some(Self { actions })
    }

    /// Reference four-action catalog: slots (0,4), (1,5), (2,6), (3,7).
    pub fn reference() -> Self {
        Self {
            actions: vec![
                ApproachMask::from_bits([1, 0, 0, 0, 1, 0, 0, 0]),
                ApproachMask::from_bits([0, 1, 0, 0, 0, 1, 0, 0]),
                ApproachMask::from_bits([0, 0, 1, 0, 0, 0, 1, 0]),
                ApproachMask::from_bits([0, 0, 0, 1, 0, 0, 0, 1]),
            ],
        }
    }

    pub fn get(&self, index: usize) -> Option<&ApproachMask> {
        self.actions.get(index)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of approaches every action covers.
    pub fn width(&self) -> usize {
        APPROACH_SLOTS
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApproachMask> {
        self.actions.iter()
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::reference()
    }
}
