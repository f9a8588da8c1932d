//! Operating mode and the palms-together toggle
//!
//! Holding both wrists close together for longer than the hold duration
//! cycles the operating mode OFF -> FULL -> MOVE_ONLY -> OFF. After each toggle
//! a debounce guard blocks further toggles until the cool-down has elapsed,
//! either on the frame clock or when the owner releases it.

use crate::landmarks::{LandmarkFrame, PoseJoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace};

#[derive(Error, Debug)]
pub enum ToggleConfigError {
    #[error("palms_close_threshold must be positive and finite, got {0}")]
    InvalidThreshold(f32),

    #[error("{0} must be greater than 0")]
    ZeroDuration(&'static str),
}

/// Operating mode gating which gestures produce commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Off,
    Full,
    MoveOnly,
}

impl OperatingMode {
    /// Next mode in the toggle cycle
    pub fn next(self) -> Self {
        match self {
            OperatingMode::Off => OperatingMode::Full,
            OperatingMode::Full => OperatingMode::MoveOnly,
            OperatingMode::MoveOnly => OperatingMode::Off,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatingMode::Off => "OFF",
            OperatingMode::Full => "FULL",
            OperatingMode::MoveOnly => "MOVE_ONLY",
        };
        f.write_str(name)
    }
}

/// Toggle timing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    /// Horizontal wrist distance (scaled units) below which palms count as together
    pub palms_close_threshold: f32,

    /// How long the pose must be held before the mode advances
    pub hold_duration_ms: u64,

    /// Debounce window after each toggle
    pub cooldown_ms: u64,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            palms_close_threshold: 40.0,
            hold_duration_ms: 1000,
            cooldown_ms: 1000,
        }
    }
}

impl ToggleConfig {
    pub fn validate(&self) -> Result<(), ToggleConfigError> {
        if !self.palms_close_threshold.is_finite() || self.palms_close_threshold <= 0.0 {
            return Err(ToggleConfigError::InvalidThreshold(self.palms_close_threshold));
        }

        if self.hold_duration_ms == 0 {
            return Err(ToggleConfigError::ZeroDuration("hold_duration_ms"));
        }

        if self.cooldown_ms == 0 {
            return Err(ToggleConfigError::ZeroDuration("cooldown_ms"));
        }

        Ok(())
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::from_millis(self.hold_duration_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Progress of the current palms-together hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    /// Palms apart
    Idle,

    /// Palms together since the given instant, toggle not yet fired
    Holding { since: Instant },

    /// This hold already toggled (or began during cool-down); waits for release.
    ///
    /// Holding on past the end of the cool-down does not toggle: the operator
    /// has to separate their palms and start a fresh hold.
    Spent,
}

/// Transient toggle bookkeeping owned by [`ModeController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleState {
    pub hold: HoldState,
    pub guard_armed: bool,

    /// Frame time at which an armed guard lapses on its own
    pub guard_until: Option<Instant>,
}

impl Default for ToggleState {
    fn default() -> Self {
        Self {
            hold: HoldState::Idle,
            guard_armed: false,
            guard_until: None,
        }
    }
}

/// Emitted whenever a hold advances the mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub from: OperatingMode,
    pub to: OperatingMode,
    pub at: Instant,

    /// Delay after which the owner must call [`ModeController::release_guard`]
    pub release_after: Duration,
}

/// Owns the operating mode and its toggle state machine.
///
/// Not synchronized: a single owner drives both [`update`](Self::update) and
/// [`release_guard`](Self::release_guard).
#[derive(Debug)]
pub struct ModeController {
    config: ToggleConfig,
    mode: OperatingMode,
    toggle: ToggleState,
}

impl ModeController {
    pub fn new() -> Self {
        Self::with_config(ToggleConfig::default())
    }

    pub fn with_config(config: ToggleConfig) -> Self {
        debug!("Initializing mode controller with config: {:?}", config);

        Self {
            config,
            mode: OperatingMode::Off,
            toggle: ToggleState::default(),
        }
    }

    /// Feed one frame observed at `now`; returns the change if this frame toggled.
    pub fn update(&mut self, frame: &LandmarkFrame, now: Instant) -> Option<ModeChange> {
        // Frames may arrive faster than real time (recordings, bursts)
        if self.toggle.guard_until.is_some_and(|until| now >= until) {
            trace!("Cool-down elapsed on the frame clock");
            self.release_guard();
        }

        let palms_close = match self.wrist_distance(frame) {
            Some(distance) => {
                trace!("Wrist distance: {:.1}", distance);
                distance < self.config.palms_close_threshold
            }
            None => false,
        };

        if !palms_close {
            if self.toggle.hold != HoldState::Idle {
                trace!("Palms apart, hold reset");
            }
            self.toggle.hold = HoldState::Idle;
            return None;
        }

        match self.toggle.hold {
            HoldState::Idle => {
                if self.toggle.guard_armed {
                    debug!("Palms together during cool-down, hold ignored");
                    self.toggle.hold = HoldState::Spent;
                } else {
                    debug!("Palms together, hold started");
                    self.toggle.hold = HoldState::Holding { since: now };
                }
                None
            }

            HoldState::Holding { since } => {
                let held = now.saturating_duration_since(since);
                if held > self.config.hold_duration() && !self.toggle.guard_armed {
                    Some(self.advance(now))
                } else {
                    None
                }
            }

            HoldState::Spent => None,
        }
    }

    fn advance(&mut self, now: Instant) -> ModeChange {
        let from = self.mode;
        self.mode = from.next();
        self.toggle.guard_armed = true;
        self.toggle.guard_until = Some(now + self.config.cooldown());
        self.toggle.hold = HoldState::Spent;

        info!("Mode changed: {} -> {}", from, self.mode);

        ModeChange {
            from,
            to: self.mode,
            at: now,
            release_after: self.config.cooldown(),
        }
    }

    /// Clear the debounce guard once the cool-down has elapsed
    pub fn release_guard(&mut self) {
        if self.toggle.guard_armed {
            debug!("Debounce guard released");
        }
        self.toggle.guard_armed = false;
        self.toggle.guard_until = None;
    }

    /// Horizontal distance between the wrists in scaled units
    fn wrist_distance(&self, frame: &LandmarkFrame) -> Option<f32> {
        let left = frame.get(PoseJoint::LeftWrist)?;
        let right = frame.get(PoseJoint::RightWrist)?;
        Some((left.scaled_x() - right.scaled_x()).abs())
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn toggle_state(&self) -> ToggleState {
        self.toggle
    }

    pub fn config(&self) -> &ToggleConfig {
        &self.config
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}
