// THEORY:
// The `geometry` module is the lowest layer of the sentinel. It holds the two pure
// measurements every posture decision is built from: the distance between two
// landmarks and the inclination of the segment joining them.
//
// The inclination is not a generic "angle between two points". It measures the
// segment p1 -> p2 against the vertical axis running up through p1, using the
// image-space convention that y grows downwards. It is asymmetric:
// `inclination_angle(a, b)` and `inclination_angle(b, a)` differ, and the posture
// thresholds downstream are calibrated against exactly this formula.
//
// The raw formula divides by `p1.y` and by the segment length, and feeds `acos` a
// ratio that floating-point drift can push just outside [-1, 1]. Those cases are
// reported as `PoseError::DegenerateGeometry` values so the caller can skip the
// frame; nothing here can panic or return NaN for finite input.

pub mod geometry {
    use crate::error::PoseError;
    use serde::{Deserialize, Serialize};

    pub type Pixels = f64;
    pub type Degrees = f64;

    /// A landmark position in image space, in pixels. `y` grows downwards.
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Point2D {
        pub x: Pixels,
        pub y: Pixels,
    }

    impl Point2D {
        pub const fn new(x: Pixels, y: Pixels) -> Self {
            Self { x, y }
        }

        fn is_finite(&self) -> bool {
            self.x.is_finite() && self.y.is_finite()
        }
    }

    /// Euclidean distance between two points.
    pub fn distance(p1: Point2D, p2: Point2D) -> Pixels {
        ((p2.x - p1.x).powi(2) + (p2.y - p1.y).powi(2)).sqrt()
    }

    /// Angle in degrees between the segment `p1 -> p2` and the vertical through `p1`.
    ///
    /// `acos((p2.y - p1.y) * (-p1.y) / (distance(p1, p2) * p1.y))`, with the `acos`
    /// argument clamped to [-1, 1]. Fails when `p1.y == 0`, when the points coincide,
    /// or when any coordinate is not finite.
    pub fn inclination_angle(p1: Point2D, p2: Point2D) -> Result<Degrees, PoseError> {
        if !p1.is_finite() || !p2.is_finite() {
            return Err(PoseError::DegenerateGeometry("non-finite landmark coordinate"));
        }
        if p1.y == 0.0 {
            return Err(PoseError::DegenerateGeometry("reference landmark lies on y = 0"));
        }

        let length = distance(p1, p2);
        if length <= f64::EPSILON {
            return Err(PoseError::DegenerateGeometry("landmarks coincide"));
        }

        let cosine = (p2.y - p1.y) * (-p1.y) / (length * p1.y);
        Ok(cosine.clamp(-1.0, 1.0).acos().to_degrees())
    }
}
