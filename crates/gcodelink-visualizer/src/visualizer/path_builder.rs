//! Toolpath extraction
//!
//! Folds the interpreter over a whole program and keeps one waypoint per
//! motion command, in program order, plus the XY bounds to draw them in.

use gcodelink_core::Position;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::viewport::{Bounds, PathBounds, BOUNDS_PADDING};
use crate::gcode::{parse_line, Command, ModalState, MotionMode};

/// Distance within which the live position counts as having reached a waypoint.
pub const DEFAULT_CUT_TOLERANCE: f64 = 1.0;

/// End point of one move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Position,
    pub mode: MotionMode,
    /// 0-based index of the source line
    pub line_index: usize,
}

/// Waypoints of a program and the bounds to draw them in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toolpath {
    pub waypoints: Vec<Waypoint>,
    pub bounds: PathBounds,
}

impl Toolpath {
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Number of waypoints already cut
    ///
    /// Walks the path until the first waypoint within `tolerance` of
    /// `current` (XY distance) and returns how many waypoints that covers.
    /// Returns 0 when no waypoint is close enough.
    pub fn cut_progress(&self, current: &Position, tolerance: f64) -> usize {
        self.waypoints
            .iter()
            .position(|w| w.position.distance_xy(current) <= tolerance)
            .map_or(0, |i| i + 1)
    }
}

/// Builds toolpaths from G-code programs
pub struct PathBuilder;

impl PathBuilder {
    /// Interpret `lines` from a fresh modal state and collect the moves
    ///
    /// The bounds always contain `current`. Pure: the same input always
    /// gives the same toolpath.
    pub fn build<S: AsRef<str>>(lines: &[S], current: Position) -> Toolpath {
        let mut modal = ModalState::default();
        let mut waypoints = Vec::new();

        for (line_index, line) in lines.iter().enumerate() {
            let (command, next) = parse_line(line.as_ref(), &modal);
            modal = next;
            if let Command::Motion(motion) = command {
                waypoints.push(Waypoint {
                    position: motion.target,
                    mode: motion.mode,
                    line_index,
                });
            }
        }

        let bounds = if waypoints.is_empty() {
            PathBounds::default().including(&current)
        } else {
            let mut acc = Bounds::new();
            for w in &waypoints {
                acc.update(w.position.x, w.position.y);
            }
            acc.update(current.x, current.y);
            acc.finalize_with_padding(BOUNDS_PADDING)
        };

        debug!(
            "Built toolpath: {} waypoints from {} lines",
            waypoints.len(),
            lines.len()
        );
        Toolpath { waypoints, bounds }
    }
}
