//! 3D positions and the simulation bounding box.

use serde::{Deserialize, Serialize};

/// A position (or displacement) in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Point3 { x, y, z }
    }

    /// Euclidean distance to another point in meters.
    pub fn distance_to(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Moves at most `max_step` meters toward `target`.
    ///
    /// Returns the new position and whether the target was reached.
    pub fn step_toward(&self, target: &Point3, max_step: f64) -> (Point3, bool) {
        let dist = self.distance_to(target);
        if dist <= max_step || dist == 0.0 {
            return (*target, true);
        }
        let f = max_step / dist;
        (
            Point3::new(
                self.x + (target.x - self.x) * f,
                self.y + (target.y - self.y) * f,
                self.z + (target.z - self.z) * f,
            ),
            false,
        )
    }

    pub fn offset(&self, d: &Point3) -> Point3 {
        Point3::new(self.x + d.x, self.y + d.y, self.z + d.z)
    }
}

/// Axis-aligned simulation volume anchored at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub const fn new(length: f64, width: f64, height: f64) -> Self {
        BoundingBox {
            length,
            width,
            height,
        }
    }

    /// Clips a point to the box.
    pub fn clamp(&self, p: Point3) -> Point3 {
        Point3::new(
            p.x.clamp(0.0, self.length),
            p.y.clamp(0.0, self.width),
            p.z.clamp(0.0, self.height),
        )
    }

    pub fn contains(&self, p: &Point3) -> bool {
        (0.0..=self.length).contains(&p.x)
            && (0.0..=self.width).contains(&p.y)
            && (0.0..=self.height).contains(&p.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(3.0, 4.0, 0.0);
        assert_eq!(a.distance_to(&b), 5.0);
    }

    #[test]
    fn test_step_toward_bounded() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(10.0, 0.0, 0.0);
        let (p, arrived) = a.step_toward(&b, 4.0);
        assert!(!arrived);
        assert!((p.x - 4.0).abs() < 1e-9);

        let (p, arrived) = a.step_toward(&b, 20.0);
        assert!(arrived);
        assert_eq!(p, b);
    }

    #[test]
    fn test_step_toward_zero_distance() {
        let a = Point3::new(1.0, 2.0, 3.0);
        let (p, arrived) = a.step_toward(&a, 5.0);
        assert!(arrived);
        assert_eq!(p, a);
    }

    #[test]
    fn test_clamp_to_box() {
        let bbox = BoundingBox::new(100.0, 100.0, 50.0);
        let p = bbox.clamp(Point3::new(-5.0, 120.0, 25.0));
        assert_eq!(p, Point3::new(0.0, 100.0, 25.0));
        assert!(bbox.contains(&p));
    }
}
