//! Parsed G-code commands
//!
//! A [`Command`] is the result of interpreting one line against the modal
//! state in force before it. Commands are plain values and are never
//! changed after creation.

use gcodelink_core::{PartialPosition, Position};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Motion mode - modal group 1 (G0, G1, G2, G3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionMode {
    /// G0
    #[default]
    Rapid,
    /// G1
    Linear,
    /// G2
    ArcCw,
    /// G3
    ArcCcw,
}

impl MotionMode {
    pub fn is_arc(&self) -> bool {
        matches!(self, MotionMode::ArcCw | MotionMode::ArcCcw)
    }
}

impl fmt::Display for MotionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionMode::Rapid => write!(f, "G0"),
            MotionMode::Linear => write!(f, "G1"),
            MotionMode::ArcCw => write!(f, "G2"),
            MotionMode::ArcCcw => write!(f, "G3"),
        }
    }
}

/// Distance mode - modal group 3 (G90, G91)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMode {
    #[default]
    Absolute,
    Relative,
}

/// Spindle direction (M3, M4, M5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpindleState {
    #[default]
    Off,
    Clockwise,
    CounterClockwise,
}

/// Straight probe variants (G38.2 - G38.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeMode {
    /// G38.2: toward workpiece, error if no contact
    Toward,
    /// G38.3: toward workpiece, no error
    TowardNoError,
    /// G38.4: away from workpiece, error if contact not lost
    Away,
    /// G38.5: away from workpiece, no error
    AwayNoError,
}

/// Which offset a coordinate-system set command writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetTarget {
    /// `G10 L20 Pn`; `P0` means the active system
    WorkCoordinate(u8),
    /// `G92`
    Temporary,
}

/// Arc center offsets (I, J, K) or radius (R), in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArcParams {
    pub i: f64,
    pub j: f64,
    pub k: f64,
    pub radius: Option<f64>,
}

/// A resolved move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionCommand {
    pub mode: MotionMode,
    /// Absolute target in work coordinates, millimetres
    pub target: Position,
    /// Active feed rate; `None` for rapids or when none was ever set
    pub feed_rate: Option<f64>,
    pub arc: Option<ArcParams>,
    /// The line carried G53; its axis words were machine coordinates
    #[serde(default)]
    pub machine_coords: bool,
}

/// One interpreted line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Motion(MotionCommand),
    Spindle {
        state: SpindleState,
        speed: Option<f64>,
    },
    /// G4 dwell
    Dwell {
        seconds: f64,
    },
    /// `$H`
    Home,
    /// `$X`
    Unlock,
    Probe {
        mode: ProbeMode,
        target: Position,
        feed_rate: Option<f64>,
    },
    /// `G10 L20 Pn` or `G92`: declare the current position's coordinates
    SetCoordinateSystem {
        target: OffsetTarget,
        values: PartialPosition,
    },
    /// G54 - G59, numbered 1 - 6
    SelectCoordinateSystem(u8),
    /// `$J=` jog, resolved against the jog's own distance mode
    Jog(MotionCommand),
    /// Controller line the interpreter does not model, e.g. `$$`
    Passthrough(String),
    NoOp,
}

impl Command {
    /// Whether executing this command moves the machine
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Command::Motion(_) | Command::Jog(_) | Command::Probe { .. } | Command::Home
        )
    }

    /// Final position of a motion, if any
    pub fn target(&self) -> Option<Position> {
        match self {
            Command::Motion(m) | Command::Jog(m) => Some(m.target),
            Command::Probe { target, .. } => Some(*target),
            _ => None,
        }
    }
}
