//! Modal G-code interpreter
//!
//! [`parse_line`] reduces the token stream of one line against the modal
//! state in force before it and returns the resulting command together
//! with the updated modal state. It is a pure function; the
//! [`GCodeInterpreter`] wrapper threads the modal state between calls.
//!
//! When a line carries several actions the returned command is picked in
//! this order: system (`$`) lines, coordinate-system sets (G10 L20 / G92),
//! probes, moves with axis words, spindle changes, dwells, work coordinate
//! selection. Everything else on the line still updates modal state.

use gcodelink_core::{Axis, PartialPosition, Position, Units};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::command::{
    ArcParams, Command, DistanceMode, MotionCommand, MotionMode, OffsetTarget, ProbeMode,
    SpindleState,
};
use super::tokenizer::{strip_comments, tokenize, Token};

/// Modal state carried from line to line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModalState {
    pub motion: MotionMode,
    pub distance: DistanceMode,
    pub units: Units,
    /// Last resolved position in millimetres
    pub position: Position,
    /// Active feed rate in millimetres per minute
    pub feed_rate: Option<f64>,
    pub spindle: SpindleState,
    pub spindle_speed: f64,
    /// Active work coordinate system, 1 (G54) to 6 (G59)
    pub coordinate_system: u8,
    /// Machine position minus work position, as far as it is known
    #[serde(default)]
    pub work_offset: Position,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            motion: MotionMode::Rapid,
            distance: DistanceMode::Absolute,
            units: Units::MM,
            position: Position::ZERO,
            feed_rate: None,
            spindle: SpindleState::Off,
            spindle_speed: 0.0,
            coordinate_system: 1,
            work_offset: Position::ZERO,
        }
    }
}

impl ModalState {
    /// Default modal state starting from a known position
    pub fn at(position: Position) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    fn scale(&self) -> f64 {
        Units::convert(1.0, self.units, Units::MM)
    }
}

/// G/M numbers are compared at one decimal of precision: G38.2 -> 382, G1 -> 10
fn code(value: f64) -> i32 {
    (value * 10.0).round() as i32
}

/// Words of one line, gathered before reduction
#[derive(Default)]
struct LineWords {
    g: Vec<i32>,
    m: Vec<i32>,
    axes: PartialPosition,
    f: Option<f64>,
    s: Option<f64>,
    p: Option<f64>,
    l: Option<f64>,
    i: Option<f64>,
    j: Option<f64>,
    k: Option<f64>,
    r: Option<f64>,
}

impl LineWords {
    fn collect(tokens: &[Token]) -> Self {
        let mut words = LineWords::default();
        for token in tokens {
            match token {
                Token::Word { letter, value } => match letter {
                    'G' => words.g.push(code(*value)),
                    'M' => words.m.push(code(*value)),
                    'X' | 'Y' | 'Z' => {
                        if let Some(axis) = Axis::from_letter(*letter) {
                            words.axes.set(axis, *value);
                        }
                    }
                    'F' => words.f = Some(*value),
                    'S' => words.s = Some(*value),
                    'P' => words.p = Some(*value),
                    'L' => words.l = Some(*value),
                    'I' => words.i = Some(*value),
                    'J' => words.j = Some(*value),
                    'K' => words.k = Some(*value),
                    'R' => words.r = Some(*value),
                    _ => trace!("Ignoring word {}{}", letter, value),
                },
                Token::Malformed { letter, text } => {
                    trace!("Skipping malformed word {}{}", letter, text)
                }
                Token::Unknown(c) => trace!("Skipping unknown character {:?}", c),
            }
        }
        words
    }

    fn has_arc_words(&self) -> bool {
        self.i.is_some() || self.j.is_some() || self.k.is_some() || self.r.is_some()
    }
}

/// What a line asks for besides modal changes
#[derive(Default)]
struct LineActions {
    motion_word: bool,
    machine_coords: bool,
    dwell: bool,
    set_wcs: bool,
    set_temporary: bool,
    probe: Option<ProbeMode>,
    select_wcs: Option<u8>,
}

/// Interpret one raw line against `modal`
///
/// Never fails: unrecognised or malformed words are skipped.
pub fn parse_line(raw: &str, modal: &ModalState) -> (Command, ModalState) {
    let cleaned = strip_comments(raw);
    let line = cleaned.trim();
    if line.is_empty() {
        return (Command::NoOp, *modal);
    }
    if line.starts_with('$') {
        return (parse_system_line(line, modal), *modal);
    }

    let words = LineWords::collect(&tokenize(line));
    reduce(&words, modal)
}

fn parse_system_line(line: &str, modal: &ModalState) -> Command {
    let upper = line.to_ascii_uppercase();
    match upper.as_str() {
        "$H" => Command::Home,
        "$X" => Command::Unlock,
        _ => match upper.strip_prefix("$J=") {
            Some(body) => parse_jog(body, modal),
            None => Command::Passthrough(line.to_string()),
        },
    }
}

/// Jog lines are resolved against a scratch copy of the modal state
fn parse_jog(body: &str, modal: &ModalState) -> Command {
    let words = LineWords::collect(&tokenize(body));
    let mut scratch = *modal;
    let actions = apply_modal_words(&words, &mut scratch);
    let scale = scratch.scale();
    let feed_rate = words.f.map(|f| f * scale).or(modal.feed_rate);
    let target = resolve_target(&words.axes, &scratch, actions.machine_coords);
    Command::Jog(MotionCommand {
        mode: MotionMode::Linear,
        target,
        feed_rate,
        arc: None,
        machine_coords: actions.machine_coords,
    })
}

fn apply_modal_words(words: &LineWords, modal: &mut ModalState) -> LineActions {
    let mut actions = LineActions::default();
    for g in &words.g {
        match *g {
            0 => {
                modal.motion = MotionMode::Rapid;
                actions.motion_word = true;
            }
            10 => {
                modal.motion = MotionMode::Linear;
                actions.motion_word = true;
            }
            20 => {
                modal.motion = MotionMode::ArcCw;
                actions.motion_word = true;
            }
            30 => {
                modal.motion = MotionMode::ArcCcw;
                actions.motion_word = true;
            }
            40 => actions.dwell = true,
            100 => actions.set_wcs = words.l.map(code) == Some(200),
            200 => modal.units = Units::INCH,
            210 => modal.units = Units::MM,
            382 => actions.probe = Some(ProbeMode::Toward),
            383 => actions.probe = Some(ProbeMode::TowardNoError),
            384 => actions.probe = Some(ProbeMode::Away),
            385 => actions.probe = Some(ProbeMode::AwayNoError),
            530 => actions.machine_coords = true,
            540 | 550 | 560 | 570 | 580 | 590 => {
                let system = ((*g - 530) / 10) as u8;
                modal.coordinate_system = system;
                actions.select_wcs = Some(system);
            }
            900 => modal.distance = DistanceMode::Absolute,
            910 => modal.distance = DistanceMode::Relative,
            920 => actions.set_temporary = true,
            other => trace!("Ignoring G{}", other as f64 / 10.0),
        }
    }
    actions
}

/// Absolute mode replaces an axis; relative mode adds to it
///
/// G53 axis words are machine coordinates and are moved into work
/// coordinates through the tracked work offset.
fn resolve_target(axes: &PartialPosition, modal: &ModalState, machine_coords: bool) -> Position {
    let scale = modal.scale();
    axes.axes()
        .into_iter()
        .fold(modal.position, |pos, (axis, value)| {
            let value = value * scale;
            let resolved = if machine_coords {
                value - modal.work_offset.axis(axis)
            } else if modal.distance == DistanceMode::Absolute {
                value
            } else {
                pos.axis(axis) + value
            };
            pos.with_axis(axis, resolved)
        })
}

/// New work coordinates for the current position; the offset absorbs the change
fn rebase(modal: &mut ModalState, values: &PartialPosition) {
    let wpos = values.apply_to(&modal.position);
    modal.work_offset = modal.work_offset.add(&modal.position.sub(&wpos));
    modal.position = wpos;
}

fn reduce(words: &LineWords, before: &ModalState) -> (Command, ModalState) {
    let mut modal = *before;
    let actions = apply_modal_words(words, &mut modal);
    let scale = modal.scale();

    if let Some(f) = words.f {
        modal.feed_rate = Some(f * scale);
    }
    if let Some(s) = words.s {
        modal.spindle_speed = s;
    }
    let mut spindle_change = None;
    for m in &words.m {
        match *m {
            30 => spindle_change = Some(SpindleState::Clockwise),
            40 => spindle_change = Some(SpindleState::CounterClockwise),
            50 => spindle_change = Some(SpindleState::Off),
            other => trace!("Ignoring M{}", other as f64 / 10.0),
        }
    }
    if let Some(state) = spindle_change {
        modal.spindle = state;
    }

    if actions.set_wcs || actions.set_temporary {
        let mut values = PartialPosition::default();
        for (axis, value) in words.axes.axes() {
            values.set(axis, value * scale);
        }
        let target = if actions.set_wcs {
            let p = words.p.map(|p| p.round().max(0.0) as u8).unwrap_or(0);
            if p == 0 || p == modal.coordinate_system {
                rebase(&mut modal, &values);
            }
            OffsetTarget::WorkCoordinate(p)
        } else {
            rebase(&mut modal, &values);
            OffsetTarget::Temporary
        };
        return (Command::SetCoordinateSystem { target, values }, modal);
    }

    if let Some(mode) = actions.probe {
        let target = resolve_target(&words.axes, &modal, actions.machine_coords);
        return (
            Command::Probe {
                mode,
                target,
                feed_rate: modal.feed_rate,
            },
            modal,
        );
    }

    if !words.axes.is_empty() && !actions.dwell {
        let target = resolve_target(&words.axes, &modal, actions.machine_coords);
        let arc = (modal.motion.is_arc() && words.has_arc_words()).then(|| ArcParams {
            i: words.i.unwrap_or(0.0) * scale,
            j: words.j.unwrap_or(0.0) * scale,
            k: words.k.unwrap_or(0.0) * scale,
            radius: words.r.map(|r| r * scale),
        });
        let feed_rate = match modal.motion {
            MotionMode::Rapid => None,
            _ => modal.feed_rate,
        };
        modal.position = target;
        return (
            Command::Motion(MotionCommand {
                mode: modal.motion,
                target,
                feed_rate,
                arc,
                machine_coords: actions.machine_coords,
            }),
            modal,
        );
    }

    if let Some(state) = spindle_change {
        return (
            Command::Spindle {
                state,
                speed: words.s,
            },
            modal,
        );
    }

    if actions.dwell {
        return (
            Command::Dwell {
                seconds: words.p.unwrap_or(0.0),
            },
            modal,
        );
    }

    if let Some(system) = actions.select_wcs {
        return (Command::SelectCoordinateSystem(system), modal);
    }

    (Command::NoOp, modal)
}

/// Stateful interpreter holding modal state across lines
#[derive(Debug, Clone, Default)]
pub struct GCodeInterpreter {
    modal: ModalState,
}

impl GCodeInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known position instead of the origin
    pub fn with_position(position: Position) -> Self {
        Self {
            modal: ModalState::at(position),
        }
    }

    /// Interpret the next line and advance the modal state
    pub fn interpret(&mut self, line: &str) -> Command {
        let (command, modal) = parse_line(line, &self.modal);
        self.modal = modal;
        command
    }

    pub fn modal(&self) -> &ModalState {
        &self.modal
    }

    pub fn position(&self) -> Position {
        self.modal.position
    }

    /// Replace the tracked position, e.g. after a jog
    pub fn sync_position(&mut self, position: Position) {
        self.modal.position = position;
    }

    /// Replace the tracked work offset with one reported by the controller
    pub fn sync_work_offset(&mut self, offset: Position) {
        self.modal.work_offset = offset;
    }

    /// Adopt a modal state computed with [`parse_line`]
    pub fn sync_modal(&mut self, modal: ModalState) {
        self.modal = modal;
    }

    /// Back to the default modal state
    pub fn reset(&mut self) {
        self.modal = ModalState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion(cmd: &Command) -> &MotionCommand {
        match cmd {
            Command::Motion(m) => m,
            other => panic!("expected motion, got {:?}", other),
        }
    }

    #[test]
    fn test_modal_motion_persists() {
        let mut interp = GCodeInterpreter::new();
        interp.interpret("G1 X10 F500");
        let cmd = interp.interpret("Y5");
        let m = motion(&cmd);
        assert_eq!(m.mode, MotionMode::Linear);
        assert_eq!(m.target, Position::new(10.0, 5.0, 0.0));
        assert_eq!(m.feed_rate, Some(500.0));
    }

    #[test]
    fn test_motion_word_without_axes_is_noop() {
        let (cmd, modal) = parse_line("G1 F300", &ModalState::default());
        assert_eq!(cmd, Command::NoOp);
        assert_eq!(modal.motion, MotionMode::Linear);
        assert_eq!(modal.feed_rate, Some(300.0));
    }

    #[test]
    fn test_relative_and_inch() {
        let mut interp = GCodeInterpreter::new();
        interp.interpret("G0 X1 Y1");
        let cmd = interp.interpret("G91 G20 X1");
        assert_eq!(motion(&cmd).target, Position::new(26.4, 1.0, 0.0));
        interp.interpret("G90 G21");
        let cmd = interp.interpret("X0");
        assert_eq!(motion(&cmd).target, Position::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_g53_is_absolute_for_one_line() {
        let mut interp = GCodeInterpreter::new();
        interp.interpret("G91");
        let cmd = interp.interpret("G53 G0 Z-5");
        assert_eq!(motion(&cmd).target.z, -5.0);
        let cmd = interp.interpret("Z1");
        assert_eq!(motion(&cmd).target.z, -4.0);
    }

    #[test]
    fn test_g53_targets_follow_work_offset() {
        let mut interp = GCodeInterpreter::new();
        interp.interpret("G0 X50 Y50");
        let cmd = interp.interpret("G10 L20 P1 X0 Y0");
        assert!(matches!(cmd, Command::SetCoordinateSystem { .. }));
        assert_eq!(interp.modal().work_offset, Position::new(50.0, 50.0, 0.0));
        assert_eq!(interp.position(), Position::ZERO);

        let cmd = interp.interpret("G0 G53 X0 Y0");
        let m = motion(&cmd);
        assert!(m.machine_coords);
        assert_eq!(m.target, Position::new(-50.0, -50.0, 0.0));
        assert_eq!(interp.position(), Position::new(-50.0, -50.0, 0.0));

        interp.sync_work_offset(Position::new(0.0, 0.0, -10.0));
        let cmd = interp.interpret("G53 G0 Z-5");
        assert_eq!(motion(&cmd).target, Position::new(-50.0, -50.0, 5.0));
    }

    #[test]
    fn test_arc_params() {
        let (cmd, _) = parse_line("G2 X10 Y0 I5 J0 F200", &ModalState::default());
        let m = motion(&cmd);
        assert_eq!(m.mode, MotionMode::ArcCw);
        assert_eq!(
            m.arc,
            Some(ArcParams {
                i: 5.0,
                j: 0.0,
                k: 0.0,
                radius: None
            })
        );
    }

    #[test]
    fn test_system_lines() {
        let modal = ModalState::default();
        assert_eq!(parse_line("$H", &modal).0, Command::Home);
        assert_eq!(parse_line("$x", &modal).0, Command::Unlock);
        assert_eq!(
            parse_line("$$", &modal).0,
            Command::Passthrough("$$".to_string())
        );
    }

    #[test]
    fn test_jog_does_not_touch_modal() {
        let modal = ModalState::at(Position::new(5.0, 5.0, 0.0));
        let (cmd, after) = parse_line("$J=G91 X-1 F1000", &modal);
        match cmd {
            Command::Jog(m) => {
                assert_eq!(m.target, Position::new(4.0, 5.0, 0.0));
                assert_eq!(m.feed_rate, Some(1000.0));
            }
            other => panic!("expected jog, got {:?}", other),
        }
        assert_eq!(after, modal);
    }

    #[test]
    fn test_set_coordinate_system() {
        let modal = ModalState::at(Position::new(12.0, 7.0, 3.0));
        let (cmd, after) = parse_line("G10 L20 P1 X0 Y0", &modal);
        assert!(matches!(
            cmd,
            Command::SetCoordinateSystem {
                target: OffsetTarget::WorkCoordinate(1),
                ..
            }
        ));
        assert_eq!(after.position, Position::new(0.0, 0.0, 3.0));

        let (cmd, after) = parse_line("G92 Z0", &modal);
        assert!(matches!(
            cmd,
            Command::SetCoordinateSystem {
                target: OffsetTarget::Temporary,
                ..
            }
        ));
        assert_eq!(after.position.z, 0.0);

        let (_, after) = parse_line("G10 L20 P2 X0", &modal);
        assert_eq!(after.position, modal.position);
    }

    #[test]
    fn test_precedence_and_non_motion() {
        let modal = ModalState::default();
        assert!(matches!(
            parse_line("G38.2 Z-20 F100", &modal).0,
            Command::Probe {
                mode: ProbeMode::Toward,
                ..
            }
        ));
        assert_eq!(
            parse_line("M3 S1000", &modal).0,
            Command::Spindle {
                state: SpindleState::Clockwise,
                speed: Some(1000.0)
            }
        );
        assert_eq!(
            parse_line("G4 P0.5", &modal).0,
            Command::Dwell { seconds: 0.5 }
        );
        let (cmd, after) = parse_line("G55", &modal);
        assert_eq!(cmd, Command::SelectCoordinateSystem(2));
        assert_eq!(after.coordinate_system, 2);
        assert_eq!(parse_line("(comment only)", &modal).0, Command::NoOp);
    }

    #[test]
    fn test_malformed_word_dropped() {
        let (cmd, _) = parse_line("G1 X1.2.3 Y4", &ModalState::default());
        assert_eq!(motion(&cmd).target, Position::new(0.0, 4.0, 0.0));
    }
}
