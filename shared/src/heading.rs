//! Conversion between radians and the server's 250-unit heading circle.

use std::f64::consts::PI;

/// Number of heading units in a full turn.
pub const HEADING_UNITS_PER_TURN: f64 = 250.0;

/// Multiply radians by this to get heading units.
pub const RADIANS_TO_HEADING: f64 = HEADING_UNITS_PER_TURN / (2.0 * PI);

/// Heading that points from the origin along `(dx, dy)`.
///
/// The raw `atan2` angle is shifted into the positive range and rounded to the
/// nearest whole unit. A value that rounds up to a full turn wraps to zero, so
/// the result always lies in `[0, 250)`.
pub fn heading_toward(dx: f64, dy: f64) -> f64 {
    let mut heading = dy.atan2(dx) * RADIANS_TO_HEADING;
    if heading < 0.0 {
        heading += HEADING_UNITS_PER_TURN;
    }

    let heading = heading.round();
    if heading >= HEADING_UNITS_PER_TURN {
        heading - HEADING_UNITS_PER_TURN
    } else {
        heading
    }
}

pub fn heading_to_radians(heading: f64) -> f64 {
    heading / RADIANS_TO_HEADING
}

/// Integer displacement after travelling `distance` units along `heading`.
///
/// Each axis is truncated toward zero independently.
pub fn displacement(heading: f64, distance: i64) -> (i32, i32) {
    let radians = heading_to_radians(heading);
    let distance = distance as f64;
    (
        (radians.cos() * distance) as i32,
        (radians.sin() * distance) as i32,
    )
}
