//! Toolpath extraction and viewport helpers

pub mod path_builder;
pub mod viewport;

pub use path_builder::{PathBuilder, Toolpath, Waypoint, DEFAULT_CUT_TOLERANCE};
pub use viewport::{Bounds, PathBounds, ScreenMapping};
