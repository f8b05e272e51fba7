//! Plane geometry for the network canvas.
//!
//! Pure functions only. Screen coordinates: x grows right, y grows down.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Linear interpolation: `t = 0` is `self`, `t = 1` is `to`.
    pub fn lerp(&self, to: &Point, t: f64) -> Point {
        Point::new(self.x + (to.x - self.x) * t, self.y + (to.y - self.y) * t)
    }
}

/// Axis-aligned rectangle, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    /// Square box of side `size` centred on `center`.
    pub fn centered(center: Point, size: f64) -> Self {
        let half = size / 2.0;
        Self {
            min: Point::new(center.x - half, center.y - half),
            max: Point::new(center.x + half, center.y + half),
        }
    }
}

/// Sum of the segment lengths along a polyline.
pub fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

/// Scalar projection of `p` onto the line `start → end`, clamped to the
/// segment's extent. Returns a distance from `start`.
pub fn clamped_projection(start: &Point, end: &Point, p: &Point) -> f64 {
    let dir = end.sub(*start);
    let len = dir.length();
    if len == 0.0 {
        return 0.0;
    }
    let rel = p.sub(*start);
    let along = (rel.x * dir.x + rel.y * dir.y) / len;
    along.clamp(0.0, len)
}

/// Liang–Barsky clip of the segment `a → b` against `rect`. Touching the
/// boundary counts as an overlap.
pub fn segment_intersects_rect(a: &Point, b: &Point, rect: &Rect) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    let edges = [
        (-dx, a.x - rect.min.x),
        (dx, rect.max.x - a.x),
        (-dy, a.y - rect.min.y),
        (dy, rect.max.y - a.y),
    ];

    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return false;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return false;
            }
            t1 = t1.min(r);
        }
    }
    t0 <= t1
}

/// True if any segment of the polyline touches `rect`.
pub fn polyline_intersects_rect(points: &[Point], rect: &Rect) -> bool {
    points
        .windows(2)
        .any(|w| segment_intersects_rect(&w[0], &w[1], rect))
}

/// Keep `proposed` within `radius` of `anchor`. A proposal outside the
/// circle is projected onto its rim along the same bearing.
pub fn clamp_to_radius(anchor: &Point, proposed: &Point, radius: f64) -> Point {
    if anchor.distance(proposed) <= radius {
        return *proposed;
    }
    let angle = (proposed.y - anchor.y).atan2(proposed.x - anchor.x);
    Point::new(anchor.x + radius * angle.cos(), anchor.y + radius * angle.sin())
}

/// Point at fraction `t` along segment `index` of a polyline. Out-of-range
/// segments clamp to the nearest endpoint.
pub fn point_on_polyline(points: &[Point], index: usize, t: f64) -> Point {
    match points.len() {
        0 => Point::ORIGIN,
        1 => points[0],
        n if index + 1 >= n => points[n - 1],
        _ => points[index].lerp(&points[index + 1], t.clamp(0.0, 1.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_through_box_is_detected() {
        let rect = Rect::centered(Point::new(100.0, 100.0), 50.0);
        assert!(segment_intersects_rect(
            &Point::new(0.0, 100.0),
            &Point::new(200.0, 100.0),
            &rect
        ));
    }

    #[test]
    fn segment_beside_box_is_clear() {
        let rect = Rect::centered(Point::new(100.0, 100.0), 50.0);
        assert!(!segment_intersects_rect(
            &Point::new(0.0, 130.0),
            &Point::new(200.0, 130.0),
            &rect
        ));
    }

    #[test]
    fn diagonal_segment_missing_corner_is_clear() {
        let rect = Rect::centered(Point::new(100.0, 100.0), 50.0);
        // Passes just outside the top-right corner (125, 75).
        assert!(!segment_intersects_rect(
            &Point::new(110.0, 50.0),
            &Point::new(150.0, 90.0),
            &rect
        ));
    }

    #[test]
    fn segment_ending_inside_box_overlaps() {
        let rect = Rect::centered(Point::new(100.0, 100.0), 50.0);
        assert!(segment_intersects_rect(
            &Point::new(0.0, 0.0),
            &Point::new(100.0, 100.0),
            &rect
        ));
    }

    #[test]
    fn clamp_keeps_points_inside_radius() {
        let anchor = Point::new(10.0, 10.0);
        let inside = Point::new(20.0, 10.0);
        assert_eq!(clamp_to_radius(&anchor, &inside, 50.0), inside);
    }

    #[test]
    fn clamp_projects_far_points_onto_rim() {
        let anchor = Point::new(0.0, 0.0);
        let clamped = clamp_to_radius(&anchor, &Point::new(300.0, 400.0), 50.0);
        assert!((clamped.x - 30.0).abs() < 1e-9);
        assert!((clamped.y - 40.0).abs() < 1e-9);
        assert!((anchor.distance(&clamped) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn projection_is_clamped_to_segment() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(100.0, 0.0);
        assert_eq!(clamped_projection(&a, &b, &Point::new(-40.0, 5.0)), 0.0);
        assert_eq!(clamped_projection(&a, &b, &Point::new(40.0, 5.0)), 40.0);
        assert_eq!(clamped_projection(&a, &b, &Point::new(140.0, 5.0)), 100.0);
    }

    #[test]
    fn polyline_point_interpolates_within_segment() {
        let path = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)];
        assert_eq!(point_on_polyline(&path, 1, 0.5), Point::new(10.0, 5.0));
        assert_eq!(point_on_polyline(&path, 5, 0.5), Point::new(10.0, 10.0));
        assert_eq!(polyline_length(&path), 20.0);
    }
}
