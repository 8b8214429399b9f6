//! GRBL command builders, realtime bytes and stock macros

use gcodelink_core::Axis;
use serde::{Deserialize, Serialize};

/// Single-byte commands GRBL acts on immediately, outside the line protocol
pub mod realtime {
    pub const STATUS_QUERY: u8 = b'?';
    pub const FEED_HOLD: u8 = b'!';
    pub const CYCLE_START: u8 = b'~';
    pub const SOFT_RESET: u8 = 0x18;
    pub const JOG_CANCEL: u8 = 0x85;
}

pub const HOME: &str = "$H";
pub const UNLOCK: &str = "$X";

/// Jog step sizes offered to operators, in millimetres.
pub const JOG_STEP_SIZES: [f64; 5] = [0.1, 1.0, 10.0, 50.0, 100.0];

/// Jog feed rate in millimetres per minute.
pub const DEFAULT_JOG_FEED: f64 = 1000.0;

/// Recognise text that should go out as a single realtime byte
pub fn realtime_byte(text: &str) -> Option<u8> {
    let trimmed = text.trim_matches(|c| c == '\r' || c == '\n');
    let mut chars = trimmed.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    match c {
        '?' => Some(realtime::STATUS_QUERY),
        '!' => Some(realtime::FEED_HOLD),
        '~' => Some(realtime::CYCLE_START),
        '\u{18}' => Some(realtime::SOFT_RESET),
        _ => None,
    }
}

/// Printable name of a realtime byte for the console log
pub fn realtime_name(byte: u8) -> &'static str {
    match byte {
        realtime::STATUS_QUERY => "?",
        realtime::FEED_HOLD => "!",
        realtime::CYCLE_START => "~",
        realtime::SOFT_RESET => "<soft reset>",
        realtime::JOG_CANCEL => "<jog cancel>",
        _ => "<realtime>",
    }
}

/// Relative jog of one axis: `$J=G91 X10.000 F1000`
pub fn jog_command(axis: Axis, distance: f64, feed_rate: f64) -> String {
    format!("$J=G91 {}{:.3} F{:.0}", axis, distance, feed_rate)
}

/// Zero the given axes in G54: `G10 L20 P1 X0 Y0`
///
/// An empty axis list zeroes all three axes.
pub fn zero_axes_command(axes: &[Axis]) -> String {
    let axes: &[Axis] = if axes.is_empty() { &Axis::ALL } else { axes };
    let words: Vec<String> = axes.iter().map(|a| format!("{}0", a)).collect();
    format!("G10 L20 P1 {}", words.join(" "))
}

/// A named block of one or more command lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macro {
    pub name: String,
    /// Newline-separated lines
    pub commands: String,
}

impl Macro {
    pub fn new(name: impl Into<String>, commands: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: commands.into(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.commands.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// The stock macro set
pub fn default_macros() -> Vec<Macro> {
    vec![
        Macro::new("PROBE", "G38.2 Z-20 F100"),
        Macro::new("ZERO XY", "G10 L20 P1 X0 Y0"),
        Macro::new("ZERO Z", "G10 L20 P1 Z0"),
        Macro::new("GO ZERO", "G0 X0 Y0 Z5"),
        Macro::new("PARK", "G0 G53 Z-5\nG0 G53 X0 Y0"),
        Macro::new("LASER ON", "M3 S1000"),
        Macro::new("LASER OFF", "M5"),
    ]
}
