use gcodelink_core::Position;
use gcodelink_visualizer::{MotionMode, PathBounds, PathBuilder};

#[test]
fn test_square_program_waypoints() {
    let lines = ["G1 X10 Y10 F1000", "G1 X50", "G1 Y50"];
    let path = PathBuilder::build(&lines, Position::ZERO);

    let points: Vec<(f64, f64)> = path
        .waypoints
        .iter()
        .map(|w| (w.position.x, w.position.y))
        .collect();
    assert_eq!(points, vec![(10.0, 10.0), (50.0, 10.0), (50.0, 50.0)]);
    assert!(path.waypoints.iter().all(|w| w.mode == MotionMode::Linear));
    let indices: Vec<usize> = path.waypoints.iter().map(|w| w.line_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn test_bounds_contain_far_current_position() {
    let lines = ["G0 X0 Y0", "G1 X50 Y0 F500", "G1 X50 Y50", "G1 X0 Y50"];
    let current = Position::new(200.0, 200.0, 0.0);
    let path = PathBuilder::build(&lines, current);

    assert!(path.bounds.contains(&current));
    assert!(path.bounds.contains(&Position::new(0.0, 0.0, 0.0)));
    assert_eq!(path.bounds.min_x, -20.0);
    assert_eq!(path.bounds.max_x, 220.0);
}

#[test]
fn test_empty_program_bounds() {
    let empty: [&str; 0] = [];
    let path = PathBuilder::build(&empty, Position::ZERO);
    assert_eq!(path.bounds, PathBounds::default());

    let path = PathBuilder::build(&["(nothing here)", ""], Position::new(-20.0, 150.0, 0.0));
    assert_eq!(path.bounds.min_x, -20.0);
    assert_eq!(path.bounds.max_y, 150.0);
    assert_eq!(path.bounds.max_x, 100.0);
}

#[test]
fn test_build_is_deterministic() {
    let lines = vec![
        "G21 G90".to_string(),
        "G0 Z5".to_string(),
        "G1 X12.5 Y-3 F800".to_string(),
        "G2 X20 Y0 I5 J0".to_string(),
        "G91 X-2".to_string(),
    ];
    let a = PathBuilder::build(&lines, Position::new(1.0, 1.0, 0.0));
    let b = PathBuilder::build(&lines, Position::new(1.0, 1.0, 0.0));
    assert_eq!(a, b);
    assert_eq!(a.waypoints.last().map(|w| w.position.x), Some(18.0));
}

#[test]
fn test_single_point_uses_fallback_span() {
    let path = PathBuilder::build(&["G0 X5 Y5"], Position::new(5.0, 5.0, 0.0));
    assert_eq!(path.bounds.min_x, 4.0);
    assert_eq!(path.bounds.max_x, 6.0);
}

#[test]
fn test_toolpath_serializes() {
    let path = PathBuilder::build(&["G1 X1 F10"], Position::ZERO);
    let json = serde_json::to_string(&path).unwrap();
    assert!(json.contains("\"waypoints\""));
    assert!(json.contains("\"Linear\""));
}
