//! # GCodeLink Visualizer
//!
//! G-code interpretation and toolpath extraction for GCodeLink.
//! Includes the tokenizer, the modal interpreter, the path builder and
//! viewport helpers for drawing a toolpath.

pub mod gcode;
pub mod visualizer;

pub use gcode::{
    parse_line, tokenize, ArcParams, Command, DistanceMode, GCodeInterpreter, ModalState,
    MotionCommand, MotionMode, OffsetTarget, ProbeMode, SpindleState, Token,
};

pub use visualizer::{Bounds, PathBounds, PathBuilder, ScreenMapping, Toolpath, Waypoint};
