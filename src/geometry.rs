// src/geometry.rs
use nalgebra::{Point2, Vector2};

/// Normalized image coordinates, both axes in [0, 1] with y pointing down.
pub type Point2D = Point2<f64>;

/// Unsigned angle at vertex `b` between the rays `b->a` and `b->c`, in degrees [0, 180].
pub fn angle_at(a: &Point2D, b: &Point2D, c: &Point2D) -> f64 {
    let to_c = bearing(&(c - b));
    let to_a = bearing(&(a - b));

    let angle = (to_c - to_a).to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

/// Signed deviation of the line `a->b` from horizontal, in degrees [-90, 90].
///
/// Lines pointing "backwards" (|angle| > 90) are folded across the vertical
/// axis so the result is always the smaller deviation; the sign keeps the
/// direction of the tilt.
pub fn tilt_angle(a: &Point2D, b: &Point2D) -> f64 {
    let angle = bearing(&(b - a)).to_degrees();

    if angle > 90.0 {
        180.0 - angle
    } else if angle < -90.0 {
        -180.0 - angle
    } else {
        angle
    }
}

pub fn midpoint(a: &Point2D, b: &Point2D) -> Point2D {
    nalgebra::center(a, b)
}

fn bearing(v: &Vector2<f64>) -> f64 {
    v.y.atan2(v.x)
}
