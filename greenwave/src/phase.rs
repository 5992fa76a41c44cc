// src/phase.rs
//
// Phase/action state machine.
//
//   Steady(action) --apply(different)--> YellowTransition { from, to }
//   YellowTransition --tick x yellow_duration--> Steady(to)
//   any --apply(same)--> unchanged, next decision rescheduled
//
// Min/max green are recorded for driver policies; the machine itself only
// counts ticks since the last committed change.

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Current phase of the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseState {
    /// Showing the green of `action` (None before the first decision).
    Steady(Option<usize>),
    YellowTransition { from: Option<usize>, to: usize },
}

/// Result of committing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Commit {
    /// Action differs from the committed one; yellow clearance started.
    Changed { from: Option<usize>, to: usize },
    /// Same action again; only the next decision time moved.
    Kept(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseMachine {
    state: PhaseState,
    ticks_since_phase_change: u64,
    next_decision_time: SimTime,
    decision_interval: u64,
    yellow_duration: u64,
    min_green: u64,
    max_green: u64,
}

impl PhaseMachine {
    pub fn new(
        begin_time: SimTime,
        decision_interval: u64,
        yellow_duration: u64,
        min_green: u64,
        max_green: u64,
    ) -> Self {
        Self {
            state: PhaseState::Steady(None),
            ticks_since_phase_change: 0,
            next_decision_time: begin_time,
            decision_interval,
            yellow_duration,
            min_green,
            max_green,
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    pub fn committed_action(&self) -> Option<usize> {
        match self.state {
            PhaseState::Steady(action) => action,
            PhaseState::YellowTransition { to, .. } => Some(to),
        }
    }

    pub fn is_yellow(&self) -> bool {
        matches!(self.state, PhaseState::YellowTransition { .. })
    }

    pub fn ticks_since_phase_change(&self) -> u64 {
        self.ticks_since_phase_change
    }

    pub fn next_decision_time(&self) -> SimTime {
        self.next_decision_time
    }

    pub fn is_decision_due(&self, now: SimTime) -> bool {
        now == self.next_decision_time
    }

    /// Commit `action` at `now` and schedule the next decision.
    pub fn commit(&mut self, action: usize, now: SimTime) -> Commit {
        self.next_decision_time = now + self.decision_interval;
        let from = self.committed_action();
        if from == Some(action) {
            return Commit::Kept(action);
        }
        self.state = PhaseState::YellowTransition { from, to: action };
        self.ticks_since_phase_change = 0;
        Commit::Changed { from, to: action }
    }

    /// Advance one simulation step; settles a finished yellow into steady green.
    pub fn tick(&mut self) {
        self.ticks_since_phase_change += 1;
        if let PhaseState::YellowTransition { to, .. } = self.state {
            if self.ticks_since_phase_change >= self.yellow_duration {
                self.state = PhaseState::Steady(Some(to));
            }
        }
    }

    /// Green has lasted at least `min_green` after the yellow clearance.
    pub fn min_green_elapsed(&self) -> bool {
        self.ticks_since_phase_change >= self.min_green.saturating_add(self.yellow_duration)
    }

    /// Green has reached `max_green` after the yellow clearance.
    pub fn max_green_exceeded(&self) -> bool {
        self.ticks_since_phase_change >= self.max_green.saturating_add(self.yellow_duration)
    }
}
