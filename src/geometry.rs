//! Landmark geometry
//!
//! Pure functions over eye and iris landmark points: eye aspect ratio,
//! iris center, and gaze ratio within the eye bounding box. These are the
//! numeric primitives the blink detector and gaze tracker build on.

use serde::{Deserialize, Serialize};

/// A 2D landmark point in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Compute the Eye Aspect Ratio from the canonical 6-point eye contour.
///
/// Point ordering: p1 and p4 are the horizontal corners; p2/p6 and p3/p5 are
/// the upper/lower lid pairs.
///
/// EAR = (‖p2−p6‖ + ‖p3−p5‖) / (2·‖p1−p4‖)
///
/// Returns 0.0 when the point count is not 6 or the horizontal distance is
/// zero (degenerate detection).
pub fn eye_aspect_ratio(points: &[Point]) -> f64 {
    if points.len() != 6 {
        return 0.0;
    }

    let vertical_1 = points[1].distance(&points[5]);
    let vertical_2 = points[2].distance(&points[4]);
    let horizontal = points[0].distance(&points[3]);

    if horizontal == 0.0 {
        return 0.0;
    }

    (vertical_1 + vertical_2) / (2.0 * horizontal)
}

/// Arithmetic mean of the supplied landmark points, or `None` when empty.
pub fn iris_center(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.x).sum();
    let sum_y: f64 = points.iter().map(|p| p.y).sum();

    Some(Point::new(sum_x / n, sum_y / n))
}

/// Position of the iris within the eye's axis-aligned bounding box.
///
/// Returns `(horizontal, vertical)` ratios, each linearly mapped to [0,1]
/// and clamped: horizontal 0 = looking left, 0.5 = center, 1 = looking
/// right; vertical 0 = up, 1 = down. Falls back to the centered default
/// `(0.5, 0.5)` when fewer than 6 eye points are given or the box has zero
/// width/height.
pub fn gaze_ratio(iris: Point, eye_points: &[Point]) -> (f64, f64) {
    if eye_points.len() < 6 {
        return (0.5, 0.5);
    }

    let x_min = eye_points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let x_max = eye_points
        .iter()
        .map(|p| p.x)
        .fold(f64::NEG_INFINITY, f64::max);
    let y_min = eye_points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let y_max = eye_points
        .iter()
        .map(|p| p.y)
        .fold(f64::NEG_INFINITY, f64::max);

    let width = x_max - x_min;
    let height = y_max - y_min;

    let horizontal = if width > 0.0 {
        ((iris.x - x_min) / width).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let vertical = if height > 0.0 {
        ((iris.y - y_min) / height).clamp(0.0, 1.0)
    } else {
        0.5
    };

    (horizontal, vertical)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_eye() -> Vec<Point> {
        // Horizontal corners at x=100 and x=140, lids 10px apart
        vec![
            Point::new(100.0, 105.0),
            Point::new(110.0, 100.0),
            Point::new(130.0, 100.0),
            Point::new(140.0, 105.0),
            Point::new(130.0, 110.0),
            Point::new(110.0, 110.0),
        ]
    }

    #[test]
    fn test_ear_open_eye() {
        let ear = eye_aspect_ratio(&open_eye());
        // Both lid distances are 10, horizontal span is 40: (10+10)/(2*40)
        assert!((ear - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_ear_closed_eye_is_lower() {
        let mut points = open_eye();
        // Collapse the lids toward the horizontal axis
        points[1].y = 104.0;
        points[2].y = 104.0;
        points[4].y = 106.0;
        points[5].y = 106.0;
        let ear = eye_aspect_ratio(&points);
        assert!(ear < 0.1, "closed eye EAR should be small, got {ear}");
    }

    #[test]
    fn test_ear_wrong_point_count() {
        assert_eq!(eye_aspect_ratio(&[]), 0.0);
        assert_eq!(eye_aspect_ratio(&open_eye()[..5]), 0.0);
    }

    #[test]
    fn test_ear_zero_horizontal_distance() {
        let p = Point::new(50.0, 50.0);
        let points = vec![p, p, p, p, p, p];
        assert_eq!(eye_aspect_ratio(&points), 0.0);
    }

    #[test]
    fn test_iris_center_mean() {
        let points = vec![Point::new(0.0, 0.0), Point::new(4.0, 2.0)];
        let center = iris_center(&points).unwrap();
        assert!((center.x - 2.0).abs() < 1e-9);
        assert!((center.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_iris_center_empty() {
        assert!(iris_center(&[]).is_none());
    }

    #[test]
    fn test_gaze_ratio_centered() {
        let eye = open_eye();
        let (h, v) = gaze_ratio(Point::new(120.0, 105.0), &eye);
        assert!((h - 0.5).abs() < 1e-9);
        assert!((v - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_gaze_ratio_looking_left_and_clamped() {
        let eye = open_eye();
        let (h, _) = gaze_ratio(Point::new(105.0, 105.0), &eye);
        assert!(h < 0.2);

        // Iris outside the box clamps rather than going negative
        let (h, v) = gaze_ratio(Point::new(90.0, 90.0), &eye);
        assert_eq!(h, 0.0);
        assert_eq!(v, 0.0);
    }

    #[test]
    fn test_gaze_ratio_degenerate_box() {
        let p = Point::new(10.0, 10.0);
        let degenerate = vec![p, p, p, p, p, p];
        assert_eq!(gaze_ratio(Point::new(10.0, 10.0), &degenerate), (0.5, 0.5));
        assert_eq!(gaze_ratio(p, &degenerate[..4]), (0.5, 0.5));
    }
}
