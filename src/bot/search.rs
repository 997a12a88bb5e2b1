//! One-dimensional searches used by the helm and fire control

/// Arg-max of a unimodal `f` on `[lo, hi]`, to within `precision`
pub fn ternary_search_max<F>(mut f: F, mut lo: f64, mut hi: f64, precision: f64) -> f64
where
    F: FnMut(f64) -> f64,
{
    while hi - lo > precision {
        let third = (hi - lo) / 3.0;
        let left = lo + third;
        let right = hi - third;
        if f(left) < f(right) {
            lo = left;
        } else {
            hi = right;
        }
    }
    (lo + hi) / 2.0
}

/// Arg-min of a unimodal `f` on `[lo, hi]`, to within `precision`
pub fn ternary_search_min<F>(mut f: F, lo: f64, hi: f64, precision: f64) -> f64
where
    F: FnMut(f64) -> f64,
{
    ternary_search_max(|x| -f(x), lo, hi, precision)
}

/// Walk from `inside` (where `accept` holds) toward `outside` and return the
/// farthest point still accepted, to within `precision`. Assumes a single
/// crossing between the two.
pub fn narrow_to_threshold<F>(mut accept: F, mut inside: f64, mut outside: f64, precision: f64) -> f64
where
    F: FnMut(f64) -> bool,
{
    if accept(outside) {
        return outside;
    }
    while (outside - inside).abs() > precision {
        let mid = (inside + outside) / 2.0;
        if accept(mid) {
            inside = mid;
        } else {
            outside = mid;
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_parabola_peak() {
        let x = ternary_search_max(|x| -(x - 0.3) * (x - 0.3), 0.0, 1.0, 1e-6);
        assert!((x - 0.3).abs() < 1e-5);
    }

    #[test]
    fn peak_on_boundary() {
        let x = ternary_search_max(|x| x, 0.0, 1.0, 1e-6);
        assert!((x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn finds_valley() {
        let t = ternary_search_min(|t| (t - 740.0).abs(), 50.0, 2000.0, 1.0);
        assert!((t - 740.0).abs() <= 1.0);
    }

    #[test]
    fn two_valleys_settle_on_the_local_one() {
        // Not unimodal: the deeper valley at 1 is cut away on the first step.
        // Fire control inherits this approximation.
        let f = |t: f64| ((t - 6.0).abs() * 0.5).min(5.0 * (t - 1.0).abs() - 1.0);
        let t = ternary_search_min(f, 0.0, 9.0, 1e-3);
        assert!((t - 6.0).abs() < 1e-2);
        assert!(f(t) > f(1.0));
    }

    #[test]
    fn threshold_narrowing_in_both_directions() {
        let accept = |t: f64| (t - 500.0).abs() <= 120.0;
        let high = narrow_to_threshold(accept, 500.0, 2000.0, 1.0);
        let low = narrow_to_threshold(accept, 500.0, 0.0, 1.0);
        assert!((high - 620.0).abs() <= 1.0 && high <= 620.0);
        assert!((low - 380.0).abs() <= 1.0 && low >= 380.0);
    }

    #[test]
    fn accepted_outside_point_is_returned_directly() {
        assert_eq!(narrow_to_threshold(|_| true, 0.0, 10.0, 0.1), 10.0);
    }
}
