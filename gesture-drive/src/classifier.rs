//! Gesture classification
//!
//! Maps a landmark frame plus the current operating mode onto a drive
//! command. Two signals are read from the body:
//!
//! - **move**: the right toe is raised above the right heel
//! - **turn**: one wrist is held clearly higher than the other
//!
//! | mode      | move signal | turn signal                     |
//! |-----------|-------------|---------------------------------|
//! | OFF       | ignored     | ignored                         |
//! | FULL      | `move1`     | `left1` / `right1`              |
//! | MOVE_ONLY | `move2`     | `left2` / `right2`, only if moving |
//!
//! Both present combine as `"move1, right1"`; neither gives `"0"`.

use crate::landmarks::{LandmarkFrame, PoseJoint};
use crate::mode::OperatingMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::trace;

/// Token sent when no motion is requested
pub const NO_OP_TOKEN: &str = "0";

/// Separator between the move and turn tokens of a combined command
pub const COMBINED_SEPARATOR: &str = ", ";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("move_margin must be positive and finite")]
    InvalidMoveMargin,

    #[error("Unrecognized command token: {0:?}")]
    UnknownToken(String),
}

/// Wrist offset needed to register a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl TurnSensitivity {
    /// Vertical wrist offset (scaled units) that must be exceeded
    pub fn threshold(self) -> f32 {
        match self {
            TurnSensitivity::Low => 250.0,
            TurnSensitivity::Medium => 150.0,
            TurnSensitivity::High => 100.0,
        }
    }
}

impl FromStr for TurnSensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(TurnSensitivity::Low),
            "medium" => Ok(TurnSensitivity::Medium),
            "high" => Ok(TurnSensitivity::High),
            other => Err(format!("unknown turn sensitivity: {}", other)),
        }
    }
}

/// Classifier thresholds in scaled units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Heel-to-toe rise required for the move signal
    pub move_margin: f32,

    pub turn_sensitivity: TurnSensitivity,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            move_margin: 30.0,
            turn_sensitivity: TurnSensitivity::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if !self.move_margin.is_finite() || self.move_margin <= 0.0 {
            return Err(ClassifierError::InvalidMoveMargin);
        }
        Ok(())
    }
}

/// Which mode a token was produced under ("1" = FULL, "2" = MOVE_ONLY)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveTag {
    Full,
    MoveOnly,
}

impl DriveTag {
    fn suffix(self) -> char {
        match self {
            DriveTag::Full => '1',
            DriveTag::MoveOnly => '2',
        }
    }

    fn from_suffix(c: &str) -> Option<Self> {
        match c {
            "1" => Some(DriveTag::Full),
            "2" => Some(DriveTag::MoveOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// A drive instruction for the vehicle. `Display` yields the wire token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Stop,
    Move(DriveTag),
    Turn(DriveTag, Side),
    MoveTurn(DriveTag, Side),
}

impl Command {
    pub fn is_stop(&self) -> bool {
        matches!(self, Command::Stop)
    }

    pub fn to_token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::Stop => f.write_str(NO_OP_TOKEN),
            Command::Move(tag) => write!(f, "move{}", tag.suffix()),
            Command::Turn(tag, side) => write!(f, "{}{}", side.as_str(), tag.suffix()),
            Command::MoveTurn(tag, side) => write!(
                f,
                "move{}{}{}{}",
                tag.suffix(),
                COMBINED_SEPARATOR,
                side.as_str(),
                tag.suffix()
            ),
        }
    }
}

impl FromStr for Command {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ClassifierError::UnknownToken(s.to_string());

        if s == NO_OP_TOKEN {
            return Ok(Command::Stop);
        }

        let parse_turn = |token: &str| -> Option<(DriveTag, Side)> {
            if let Some(rest) = token.strip_prefix("left") {
                DriveTag::from_suffix(rest).map(|t| (t, Side::Left))
            } else if let Some(rest) = token.strip_prefix("right") {
                DriveTag::from_suffix(rest).map(|t| (t, Side::Right))
            } else {
                None
            }
        };
        let parse_move =
            |token: &str| token.strip_prefix("move").and_then(DriveTag::from_suffix);

        match s.split_once(',') {
            Some((mv, turn)) => {
                let tag = parse_move(mv.trim()).ok_or_else(unknown)?;
                let (turn_tag, side) = parse_turn(turn.trim()).ok_or_else(unknown)?;
                if tag != turn_tag {
                    return Err(unknown());
                }
                Ok(Command::MoveTurn(tag, side))
            }
            None => {
                if let Some(tag) = parse_move(s) {
                    Ok(Command::Move(tag))
                } else {
                    parse_turn(s)
                        .map(|(tag, side)| Command::Turn(tag, side))
                        .ok_or_else(unknown)
                }
            }
        }
    }
}

/// Pure mapping from (frame, mode) to [`Command`]
#[derive(Debug, Clone, Default)]
pub struct GestureClassifier {
    config: ClassifierConfig,
}

impl GestureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify a frame under `mode`.
    ///
    /// Returns `None` for an empty frame: no person was detected and nothing
    /// should be sent.
    pub fn classify(&self, frame: &LandmarkFrame, mode: OperatingMode) -> Option<Command> {
        if frame.is_empty() {
            return None;
        }

        let tag = match mode {
            OperatingMode::Off => return Some(Command::Stop),
            OperatingMode::Full => DriveTag::Full,
            OperatingMode::MoveOnly => DriveTag::MoveOnly,
        };

        let moving = self.move_signal(frame);
        let turn = match mode {
            OperatingMode::MoveOnly if !moving => None,
            _ => self.turn_signal(frame),
        };

        let command = match (moving, turn) {
            (true, Some(side)) => Command::MoveTurn(tag, side),
            (true, None) => Command::Move(tag),
            (false, Some(side)) => Command::Turn(tag, side),
            (false, None) => Command::Stop,
        };

        Some(command)
    }

    /// Toe raised above heel by more than the move margin
    pub fn move_signal(&self, frame: &LandmarkFrame) -> bool {
        let (Some(heel), Some(toe)) = (
            frame.get(PoseJoint::RightHeel),
            frame.get(PoseJoint::RightFootIndex),
        ) else {
            return false;
        };

        // Image y grows downwards, so a raised toe has the smaller y
        let rise = heel.scaled_y() - toe.scaled_y();
        trace!("Foot rise: {:.1}", rise);
        rise > self.config.move_margin
    }

    /// Side of the wrist held higher, if the offset exceeds the sensitivity band
    pub fn turn_signal(&self, frame: &LandmarkFrame) -> Option<Side> {
        let left = frame.get(PoseJoint::LeftWrist)?;
        let right = frame.get(PoseJoint::RightWrist)?;

        let offset = left.scaled_y() - right.scaled_y();
        trace!("Wrist offset: {:.1}", offset);

        let threshold = self.config.turn_sensitivity.threshold();
        if offset > threshold {
            Some(Side::Right)
        } else if -offset > threshold {
            Some(Side::Left)
        } else {
            None
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}
