//! Firing solutions
//!
//! A ball aimed at a point lands there in still air after `distance / speed`
//! seconds; wind then pushes it by a drift that grows with the square of the
//! flight time. For each candidate flight time `t` we aim at where the target
//! will be after `t`, pre-compensated for the drift, and measure how far the
//! ball's natural flight time misses `t`. The best `t` comes from a ternary
//! search; the acceptable window around it from threshold narrowing.

use crate::config::GameProperties;
use crate::game::combat::{Cannon, CombatSystem};
use crate::game::decision::Aim;
use crate::game::ids::EntityId;

use super::perception::PerceivedShip;
use super::search::{narrow_to_threshold, ternary_search_min};

/// Flight-time precision in milliseconds
pub const TIME_PRECISION_MS: f64 = 1.0;

/// Best flight time against one target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intercept {
    pub flight_ms: f64,
    pub miss: f64,
    /// Earliest and latest flight times whose miss is still acceptable
    pub window: (f64, f64),
}

/// Chosen shot: aim offset relative to the firing ship
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiringSolution {
    pub aim: Aim,
    pub fire: bool,
    pub target: Option<EntityId>,
}

impl FiringSolution {
    pub fn hold_fire() -> Self {
        Self {
            aim: Aim::NotAiming,
            fire: false,
            target: None,
        }
    }
}

/// Shared inputs for one fire-control pass
#[derive(Debug, Clone, Copy)]
pub struct Ballistics<'a> {
    pub props: &'a GameProperties,
    /// Wind acceleration on the ball (already scaled by the wind effect)
    pub ball_accel: (f64, f64),
    /// Age of the perceived target data, added to every prediction
    pub lead_ms: f64,
}

impl<'a> Ballistics<'a> {
    pub fn new(props: &'a GameProperties, wind_magnitude: f64, wind_direction: f64, lead_ms: f64) -> Self {
        let effect = props.cannon_ball.wind_effect;
        Self {
            props,
            ball_accel: (
                wind_magnitude * wind_direction.cos() * effect,
                wind_magnitude * wind_direction.sin() * effect,
            ),
            lead_ms,
        }
    }

    /// Wind drift after `flight_ms`, matching the per-tick ball integration
    pub fn drift(&self, flight_ms: f64) -> (f64, f64) {
        let dt = self.props.tick_seconds();
        let n = flight_ms / self.props.tick_gap_ms();
        let factor = dt * dt * n * (n + 1.0) / 2.0;
        (self.ball_accel.0 * factor, self.ball_accel.1 * factor)
    }

    /// Where to aim so a ball in flight for `flight_ms` meets the target
    pub fn aim_point(&self, target: &PerceivedShip, flight_ms: f64) -> (f64, f64) {
        let (px, py) = target.predicted_position((flight_ms + self.lead_ms) / 1000.0);
        let (dx, dy) = self.drift(flight_ms);
        (px - dx, py - dy)
    }

    /// How far off a ball fired from `origin` with flight time `flight_ms` lands
    pub fn miss(&self, origin: (f64, f64), target: &PerceivedShip, flight_ms: f64) -> f64 {
        let (ax, ay) = self.aim_point(target, flight_ms);
        let distance = (ax - origin.0).hypot(ay - origin.1);
        let travel = (self.props.cannon_ball.speed * flight_ms / 1000.0).min(self.props.still_air_range());
        (distance - travel).abs()
    }

    /// Farthest a ball can land from its muzzle, wind included
    pub fn max_reach(&self) -> f64 {
        let (dx, dy) = self.drift(self.props.cannon_ball.max_flight_ms);
        self.props.still_air_range() + dx.hypot(dy)
    }
}

/// Minimise the miss over the flight-time window; `None` when even the best
/// time misses by more than `acceptable_radius`.
pub fn solve_intercept(
    ballistics: &Ballistics<'_>,
    origin: (f64, f64),
    target: &PerceivedShip,
    acceptable_radius: f64,
) -> Option<Intercept> {
    let earliest = ballistics.props.tick_gap_ms();
    let latest = ballistics.props.cannon_ball.max_flight_ms;
    let miss = |t: f64| ballistics.miss(origin, target, t);

    let flight_ms = ternary_search_min(miss, earliest, latest, TIME_PRECISION_MS);
    let best = miss(flight_ms);
    if best > acceptable_radius {
        return None;
    }

    let accept = |t: f64| miss(t) <= acceptable_radius;
    let low = narrow_to_threshold(accept, flight_ms, earliest, TIME_PRECISION_MS);
    let high = narrow_to_threshold(accept, flight_ms, latest, TIME_PRECISION_MS);
    Some(Intercept {
        flight_ms,
        miss: best,
        window: (low, high),
    })
}

/// Pick a target and aim point from our perceived hull `me`, carrying
/// `cannons` (our own battery, whose reload state we always know).
///
/// Enemies within reach are tried closest first. For each, candidate flight
/// times start at the intercept optimum and fan outward a tick at a time
/// across the acceptable window; the first aim point some loaded cannon can
/// bear on wins.
pub fn plan_fire(
    me: &PerceivedShip,
    cannons: &[Cannon],
    enemies: &[PerceivedShip],
    ballistics: &Ballistics<'_>,
    acceptable_fraction: f64,
) -> FiringSolution {
    let origin = (me.x, me.y);
    let pose = (me.x, me.y, me.orientation);
    let reach = ballistics.max_reach();

    let mut in_range: Vec<(f64, &PerceivedShip)> = enemies
        .iter()
        .map(|enemy| ((enemy.x - origin.0).hypot(enemy.y - origin.1), enemy))
        .filter(|(distance, enemy)| *distance <= reach + enemy.kind.stats().hitbox_radius)
        .collect();
    in_range.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));

    let step = ballistics.props.tick_gap_ms();
    for (_, enemy) in in_range {
        let radius = enemy.kind.stats().hitbox_radius * acceptable_fraction;
        let Some(intercept) = solve_intercept(ballistics, origin, enemy, radius) else {
            continue;
        };

        for flight_ms in fan_out(intercept.flight_ms, intercept.window, step) {
            let (ax, ay) = ballistics.aim_point(enemy, flight_ms);
            if !CombatSystem::cannons_bearing_from(cannons, pose, ax, ay).is_empty() {
                return FiringSolution {
                    aim: Aim::Aiming {
                        x: ax - origin.0,
                        y: ay - origin.1,
                    },
                    fire: true,
                    target: Some(enemy.id),
                };
            }
        }
    }
    FiringSolution::hold_fire()
}

/// `center`, then alternately later and earlier by `step`, staying in `window`
fn fan_out(center: f64, (low, high): (f64, f64), step: f64) -> Vec<f64> {
    let mut times = vec![center];
    for k in 1.. {
        let later = center + k as f64 * step;
        let earlier = center - k as f64 * step;
        if later > high && earlier < low {
            break;
        }
        if later <= high {
            times.push(later);
        }
        if earlier >= low {
            times.push(earlier);
        }
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catch_up::TickMotion;
    use crate::game::combat::CannonBall;
    use crate::game::physics::{Ship, ShipKind};
    use crate::game::wind::WindSample;

    fn target(x: f64, y: f64, vel_x: f64, vel_y: f64) -> PerceivedShip {
        PerceivedShip {
            id: EntityId(1),
            kind: ShipKind::Brig,
            x,
            y,
            vel_x,
            vel_y,
            orientation: 0.0,
            health: 5.0,
        }
    }

    fn hull(ship: &Ship) -> PerceivedShip {
        PerceivedShip {
            id: ship.id,
            kind: ship.kind,
            x: ship.x,
            y: ship.y,
            vel_x: ship.vel_x,
            vel_y: ship.vel_y,
            orientation: ship.orientation,
            health: ship.health,
        }
    }

    #[test]
    fn stationary_target_in_still_air() {
        let props = GameProperties::default();
        let ballistics = Ballistics::new(&props, 0.0, 0.0, 0.0);
        let enemy = target(300.0, 0.0, 0.0, 0.0);

        let intercept = solve_intercept(&ballistics, (0.0, 0.0), &enemy, 12.0).expect("in range");
        assert!((intercept.flight_ms - 1000.0).abs() <= 2.0);
        assert!(intercept.miss < 1.0);
        assert!(intercept.window.0 < 1000.0 && intercept.window.1 > 1000.0);

        let (ax, ay) = ballistics.aim_point(&enemy, intercept.flight_ms);
        let mut ball = CannonBall::aimed(EntityId(9), EntityId(0), (0.0, 0.0), (ax, ay), 0, &props);
        for tick in ball.launch_tick..ball.death_tick {
            ball.tick_motion(&WindSample::calm(tick), &props);
        }
        assert!((ball.x - 300.0).abs() < 12.0 && ball.y.abs() < 12.0);
    }

    #[test]
    fn wind_drift_is_compensated() {
        let props = GameProperties::default();
        let wind = WindSample {
            tick: 0,
            magnitude: 40.0,
            direction: std::f64::consts::FRAC_PI_2,
        };
        let ballistics = Ballistics::new(&props, wind.magnitude, wind.direction, 0.0);
        let enemy = target(400.0, 0.0, 0.0, 0.0);

        let intercept = solve_intercept(&ballistics, (0.0, 0.0), &enemy, 12.0).expect("in range");
        let (ax, ay) = ballistics.aim_point(&enemy, intercept.flight_ms);
        assert!(ay < 0.0, "aim should lead into the wind");

        let mut ball = CannonBall::aimed(EntityId(9), EntityId(0), (0.0, 0.0), (ax, ay), 0, &props);
        for _ in ball.launch_tick..ball.death_tick {
            ball.tick_motion(&wind, &props);
        }
        let hitbox = ShipKind::Brig.stats().hitbox_radius;
        assert!((ball.x - 400.0).hypot(ball.y) < hitbox);
    }

    #[test]
    fn moving_target_is_led() {
        let props = GameProperties::default();
        let ballistics = Ballistics::new(&props, 0.0, 0.0, 0.0);
        let enemy = target(0.0, 300.0, 60.0, 0.0);

        let intercept = solve_intercept(&ballistics, (0.0, 0.0), &enemy, 12.0).expect("in range");
        let (ax, _) = ballistics.aim_point(&enemy, intercept.flight_ms);
        assert!(ax > 40.0);
    }

    #[test]
    fn target_beyond_reach_has_no_solution() {
        let props = GameProperties::default();
        let ballistics = Ballistics::new(&props, 0.0, 0.0, 0.0);
        let enemy = target(2000.0, 0.0, 0.0, 0.0);
        assert_eq!(solve_intercept(&ballistics, (0.0, 0.0), &enemy, 12.0), None);
    }

    #[test]
    fn plan_fires_from_the_bearing_broadside() {
        let props = GameProperties::default();
        let ballistics = Ballistics::new(&props, 0.0, 0.0, 0.0);
        let ship = Ship::new(EntityId(0), ShipKind::Brig, 0.0, 0.0, 0.0, &props);

        let abeam = [target(0.0, 250.0, 0.0, 0.0)];
        let solution = plan_fire(&hull(&ship), &ship.cannons, &abeam, &ballistics, 0.5);
        assert!(solution.fire);
        assert_eq!(solution.target, Some(EntityId(1)));
        let (_, y) = solution.aim.offset().expect("aiming");
        assert!((y - 250.0).abs() < 12.0);
    }

    #[test]
    fn nothing_to_shoot_is_not_an_error() {
        let props = GameProperties::default();
        let ballistics = Ballistics::new(&props, 0.0, 0.0, 0.0);
        let ship = Ship::new(EntityId(0), ShipKind::Brig, 0.0, 0.0, 0.0, &props);

        // Dead ahead: in range but no broadside bears
        let ahead = [target(250.0, 0.0, 0.0, 0.0)];
        let me = hull(&ship);
        assert_eq!(plan_fire(&me, &ship.cannons, &ahead, &ballistics, 0.5), FiringSolution::hold_fire());
        assert_eq!(plan_fire(&me, &ship.cannons, &[], &ballistics, 0.5), FiringSolution::hold_fire());
    }

    #[test]
    fn aims_from_where_we_think_we_are() {
        let props = GameProperties::default();
        let ballistics = Ballistics::new(&props, 0.0, 0.0, 0.0);
        let ship = Ship::new(EntityId(0), ShipKind::Brig, 0.0, 0.0, 0.0, &props);
        let abeam = [target(0.0, 250.0, 0.0, 0.0)];

        // Our own fix is 40 units off to port of the true hull
        let mut me = hull(&ship);
        me.x = 40.0;
        let solution = plan_fire(&me, &ship.cannons, &abeam, &ballistics, 0.5);
        let (x, _) = solution.aim.offset().expect("aiming");
        assert!((x + 40.0).abs() < 12.0, "aim offset follows the perceived origin");
    }

    #[test]
    fn fan_out_alternates_within_window() {
        assert_eq!(fan_out(100.0, (40.0, 170.0), 50.0), vec![100.0, 150.0, 50.0]);
        assert_eq!(fan_out(100.0, (100.0, 100.0), 50.0), vec![100.0]);
    }
}
