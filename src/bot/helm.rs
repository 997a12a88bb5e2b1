//! Heading and sail choices

use crate::game::decision::TurnDirection;
use crate::game::physics::{PhysicsSystem, ShipStats};

use super::perception::PerceivedShip;
use super::search::ternary_search_max;

/// Sail strength precision
const SAIL_PRECISION: f64 = 1e-3;

/// Heading toward a point upwind of where `target` will be in `lead_seconds`
pub fn desired_heading(
    me: &PerceivedShip,
    target: &PerceivedShip,
    wind_direction: f64,
    lead_seconds: f64,
    upwind_distance: f64,
) -> f64 {
    let (px, py) = target.predicted_position(lead_seconds);
    let goal_x = px - wind_direction.cos() * upwind_distance;
    let goal_y = py - wind_direction.sin() * upwind_distance;
    (goal_y - me.y).atan2(goal_x - me.x)
}

pub fn turn_toward(orientation: f64, desired: f64, deadband: f64) -> TurnDirection {
    let diff = PhysicsSystem::angle_difference(orientation, desired);
    if diff.abs() <= deadband {
        TurnDirection::Hold
    } else if diff > 0.0 {
        TurnDirection::Starboard
    } else {
        TurnDirection::Port
    }
}

/// Sail strength in `[0, 1]` that best accelerates the hull along `desired_heading`.
///
/// The score is concave while the bow points within 90° of the desired heading;
/// past that it turns convex and peaks on an end of the range, so both ends
/// are checked against the search result.
pub fn best_sail(
    stats: &ShipStats,
    orientation: f64,
    desired_heading: f64,
    wind_xa: f64,
    wind_ya: f64,
    sail_exponent: f64,
) -> f64 {
    let (ux, uy) = (desired_heading.cos(), desired_heading.sin());
    let score = |sail: f64| {
        let (ax, ay) = PhysicsSystem::acceleration(stats, sail, orientation, wind_xa, wind_ya, sail_exponent);
        ax * ux + ay * uy
    };

    let searched = ternary_search_max(score, 0.0, 1.0, SAIL_PRECISION);
    [searched, 0.0, 1.0]
        .into_iter()
        .fold((0.0, f64::NEG_INFINITY), |best, sail| {
            let value = score(sail);
            if value > best.1 {
                (sail, value)
            } else {
                best
            }
        })
        .0
}
