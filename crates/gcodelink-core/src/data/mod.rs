//! Data models for positions, machine status and stream results
//!
//! This module provides:
//! - Position tracking for the three linear axes (X, Y, Z)
//! - Partial position updates for selective axis changes
//! - The controller state machine states
//! - Status reports as decoded from the controller
//! - The machine status snapshot observers read
//! - Stream outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine coordinate units (millimeters or inches)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Units {
    /// Millimeters (metric)
    #[default]
    MM,
    /// Inches (imperial)
    INCH,
}

impl Units {
    /// Millimetres per inch.
    pub const MM_PER_INCH: f64 = 25.4;

    /// Convert a value from one unit to another
    pub fn convert(value: f64, from: Units, to: Units) -> f64 {
        match (from, to) {
            (Units::MM, Units::INCH) => value / Self::MM_PER_INCH,
            (Units::INCH, Units::MM) => value * Self::MM_PER_INCH,
            _ => value,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::MM => write!(f, "mm"),
            Units::INCH => write!(f, "in"),
        }
    }
}

/// A linear machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in X, Y, Z order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// The G-code word letter for this axis
    pub fn letter(&self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }

    /// Parse an axis from its word letter (case-insensitive)
    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A point in millimetres
///
/// Positions are immutable values: every operation returns a new point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Origin.
    pub const ZERO: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a new position
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component-wise sum
    pub fn add(&self, other: &Position) -> Position {
        Position::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Component-wise difference
    pub fn sub(&self, other: &Position) -> Position {
        Position::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Read one axis
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Return a copy with one axis replaced
    pub fn with_axis(mut self, axis: Axis, value: f64) -> Position {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
        self
    }

    /// Distance to another point in the XY plane
    pub fn distance_xy(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// Partial position update (only specified axes are updated)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartialPosition {
    /// X-axis position (optional)
    pub x: Option<f64>,
    /// Y-axis position (optional)
    pub y: Option<f64>,
    /// Z-axis position (optional)
    pub z: Option<f64>,
}

impl PartialPosition {
    /// Set one axis
    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = Some(value),
            Axis::Y => self.y = Some(value),
            Axis::Z => self.z = Some(value),
        }
    }

    /// Read one axis
    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Axes that carry a value, in X, Y, Z order
    pub fn axes(&self) -> Vec<(Axis, f64)> {
        Axis::ALL
            .iter()
            .filter_map(|a| self.get(*a).map(|v| (*a, v)))
            .collect()
    }

    /// Apply this partial update to a full position
    pub fn apply_to(&self, pos: &Position) -> Position {
        Position {
            x: self.x.unwrap_or(pos.x),
            y: self.y.unwrap_or(pos.y),
            z: self.z.unwrap_or(pos.z),
        }
    }

    /// Check if no axes are set
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }
}

/// Machine/Controller state machine states
///
/// `Disconnected -> Connecting -> Idle <-> Run <-> Hold`, any connected
/// state may fall into `Alarm`, and `Alarm` only leaves through an unlock
/// (to `Idle`) or a disconnect. Controllers may also report `Jog`, `Home`,
/// `Check`, `Door` and `Sleep`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControllerState {
    /// Not connected to any controller
    #[default]
    Disconnected,
    /// In the process of connecting to controller
    Connecting,
    /// Connected and idle, ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold, awaiting resume
    Hold,
    /// Jog motion in progress
    Jog,
    /// Machine alarm state (requires unlock)
    Alarm,
    /// Check mode (dry-run without machine movement)
    Check,
    /// Safety door interlock triggered
    Door,
    /// Homing cycle in progress
    Home,
    /// Low-power sleep state
    Sleep,
}

impl ControllerState {
    /// Check if this state indicates the controller is connected
    pub fn is_connected(&self) -> bool {
        !matches!(
            self,
            ControllerState::Disconnected | ControllerState::Connecting
        )
    }

    /// Check if this state indicates the controller is ready for commands
    pub fn is_ready(&self) -> bool {
        matches!(self, ControllerState::Idle | ControllerState::Sleep)
    }

    /// Check if this state indicates an error condition
    pub fn is_alarm(&self) -> bool {
        matches!(self, ControllerState::Alarm)
    }

    /// Check if this state indicates active motion
    pub fn is_moving(&self) -> bool {
        matches!(
            self,
            ControllerState::Run | ControllerState::Jog | ControllerState::Home
        )
    }

    /// Check if a locally initiated transition from this state to `target` is valid.
    ///
    /// Status reports are authoritative and bypass this table, except that a
    /// latched alarm is only cleared by an unlock.
    pub fn can_transition_to(&self, target: ControllerState) -> bool {
        use ControllerState::*;
        if *self == target {
            return true;
        }
        match (self, target) {
            (_, Disconnected) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Idle) => true,
            (Disconnected | Connecting, _) => false,
            (Alarm, Idle) => true,
            (Alarm, _) => false,
            (_, Alarm) => true,
            (Idle, Run | Hold | Jog | Home | Check | Sleep) => true,
            (Run, Idle | Hold | Door) => true,
            (Hold, Run | Idle) => true,
            (Jog | Home | Check | Sleep, Idle) => true,
            (Door, Hold | Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Jog => write!(f, "Jog"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Check => write!(f, "Check"),
            Self::Door => write!(f, "Door"),
            Self::Home => write!(f, "Home"),
            Self::Sleep => write!(f, "Sleep"),
        }
    }
}

/// Feed, rapid and spindle overrides in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    pub feed: u32,
    pub rapid: u32,
    pub spindle: u32,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            feed: 100,
            rapid: 100,
            spindle: 100,
        }
    }
}

/// Planner and serial receive buffer availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferState {
    /// Free planner blocks
    pub planner: u32,
    /// Free bytes in the receive buffer
    pub rx: u32,
}

/// A decoded controller status report
///
/// Every field except `state` is optional because controllers only send
/// what changed or what their report mask enables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: ControllerState,
    /// Sub-state code, e.g. `Hold:1`
    pub substate: Option<u8>,
    pub mpos: Option<Position>,
    pub wpos: Option<Position>,
    /// Work coordinate offset
    pub wco: Option<Position>,
    pub feed_rate: Option<f64>,
    pub spindle_speed: Option<f64>,
    pub overrides: Option<Overrides>,
    /// Active input pins, e.g. `XYZP`
    pub pins: Option<String>,
    /// Accessory state flags, e.g. `SFM`
    pub accessory: Option<String>,
    /// Line number currently executing
    pub line: Option<u32>,
    pub buffer: Option<BufferState>,
}

impl StatusReport {
    /// Create a report that only declares a state
    pub fn new(state: ControllerState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    /// Set the machine position
    pub fn with_mpos(mut self, mpos: Position) -> Self {
        self.mpos = Some(mpos);
        self
    }

    /// Set the work position
    pub fn with_wpos(mut self, wpos: Position) -> Self {
        self.wpos = Some(wpos);
        self
    }

    /// Set the work coordinate offset
    pub fn with_wco(mut self, wco: Position) -> Self {
        self.wco = Some(wco);
        self
    }

    /// Set feed rate and spindle speed
    pub fn with_feed_spindle(mut self, feed_rate: f64, spindle_speed: f64) -> Self {
        self.feed_rate = Some(feed_rate);
        self.spindle_speed = Some(spindle_speed);
        self
    }

    /// Set the overrides
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

/// Snapshot of the machine as last known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    pub state: ControllerState,
    /// Machine position
    pub mpos: Position,
    /// Work position
    pub wpos: Position,
    /// Work coordinate offset (`mpos - wpos`)
    pub work_offset: Position,
    pub feed_rate: f64,
    pub spindle_speed: f64,
    pub overrides: Overrides,
    pub pins: Option<String>,
    pub accessory: Option<String>,
    pub line: Option<u32>,
    pub buffer: Option<BufferState>,
}

impl Default for MachineStatus {
    fn default() -> Self {
        Self {
            state: ControllerState::Disconnected,
            mpos: Position::ZERO,
            wpos: Position::ZERO,
            work_offset: Position::ZERO,
            feed_rate: 0.0,
            spindle_speed: 0.0,
            overrides: Overrides::default(),
            pins: None,
            accessory: None,
            line: None,
            buffer: None,
        }
    }
}

impl MachineStatus {
    /// Check whether the controller is connected
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

/// How a program stream ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamOutcome {
    /// Every line was acknowledged
    Completed,
    /// Stopped by `cancel()` after `completed` lines
    Cancelled { completed: usize },
    /// The controller rejected a line, timed out on it, or was in alarm
    Failed {
        /// 1-based program line number
        line_number: usize,
        line: String,
        message: String,
    },
    /// The transport went away mid-stream
    Aborted { reason: String },
}

impl StreamOutcome {
    /// Check whether the program ran to the end
    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed)
    }
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled { completed } => write!(f, "cancelled after {} lines", completed),
            Self::Failed {
                line_number,
                line,
                message,
            } => write!(f, "failed at line {} ({}): {}", line_number, line, message),
            Self::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}
