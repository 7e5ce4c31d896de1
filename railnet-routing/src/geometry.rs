//! Track geometry: 3D points and cubic Bézier arc length
//!
//! Track curves arrive as chains of Bézier control points. Segment lengths are
//! approximated by sampling the cubic at [`BEZIER_SAMPLES`] uniform steps and
//! summing the chord lengths of the resulting polyline.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Number of polyline steps used to approximate one cubic span
pub const BEZIER_SAMPLES: usize = 16;

/// Point in world space. `y` is the vertical axis; `x`/`z` span the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance between two points
    pub fn distance(self, other: Vec3) -> f64 {
        (self - other).length()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<Vec3> for f64 {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self * rhs.x, self * rhs.y, self * rhs.z)
    }
}

/// Evaluate the cubic Bézier `(p0, p1, p2, p3)` at parameter `t`.
///
/// B(t) = (1-t)^3 p0 + 3(1-t)^2 t p1 + 3(1-t) t^2 p2 + t^3 p3
#[inline]
pub fn evaluate_cubic(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f64) -> Vec3 {
    let u = 1.0 - t;
    let uu = u * u;
    let tt = t * t;

    (uu * u) * p0 + (3.0 * uu * t) * p1 + (3.0 * u * tt) * p2 + (tt * t) * p3
}

/// Approximate arc length of a cubic Bézier span.
///
/// `p0` is the span's start point, `p1` its outgoing handle, `p2` the incoming
/// handle of the next point and `p3` the next point.
pub fn approximate_length(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3) -> f64 {
    let mut length = 0.0;
    let mut prev = p0;

    for i in 1..=BEZIER_SAMPLES {
        let t = i as f64 / BEZIER_SAMPLES as f64;
        let curr = evaluate_cubic(p0, p1, p2, p3, t);
        length += prev.distance(curr);
        prev = curr;
    }

    length
}
