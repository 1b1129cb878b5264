use serde::{Deserialize, Serialize};

use crate::Breakpoint;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterpolationOptions {
    /// When false, vehicles snap to the start of their current segment instead of gliding along
    /// it.
    pub enabled: bool,
    /// How long past the last breakpoint a vehicle stays parked at its final position before it
    /// counts as expired.
    pub expiry_grace_ms: f64,
}

impl Default for InterpolationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry_grace_ms: 5_000.0,
        }
    }
}

/// Where a vehicle is along its geometry at one moment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interpolation {
    /// Fraction along the whole geometry, in [0, 1].
    pub fraction: f64,
    pub rotation: Option<f64>,
    /// The coordinate indices bounding the current segment, when both breakpoints carry one.
    /// Equal indices mean the vehicle is parked on that coordinate.
    pub coord_range: Option<(usize, usize)>,
    /// Progress through the current segment's time span, used when resolving a position inside
    /// `coord_range`.
    pub segment_fraction: f64,
}

/// None if the vehicle's known window has elapsed. Queries before the first breakpoint clamp to
/// it; there's no extrapolation in either direction.
pub fn interpolate(
    breakpoints: &[Breakpoint],
    time_ms: f64,
    opts: &InterpolationOptions,
) -> Option<Interpolation> {
    let first = breakpoints.first()?;
    let last = breakpoints.last()?;
    if !time_ms.is_finite() {
        return None;
    }

    if time_ms <= first.time_ms {
        return Some(at_breakpoint(first));
    }
    if time_ms >= last.time_ms {
        if time_ms - last.time_ms > opts.expiry_grace_ms {
            return None;
        }
        return Some(at_breakpoint(last));
    }

    // Breakpoints are non-decreasing by time, so the first one strictly after the query bounds
    // the segment. Both clamps above guarantee 0 < idx < len.
    let idx = breakpoints.partition_point(|bp| bp.time_ms <= time_ms);
    let start = &breakpoints[idx - 1];
    let end = &breakpoints[idx];

    let duration = end.time_ms - start.time_ms;
    let mut time_frac = if duration > 0.0 {
        ((time_ms - start.time_ms) / duration).clamp(0.0, 1.0)
    } else {
        1.0
    };
    if !opts.enabled {
        time_frac = 0.0;
    }

    let fraction = start.fraction + time_frac * (end.fraction - start.fraction);
    let coord_range = match (start.coord_index, end.coord_index) {
        (Some(a), Some(b)) if a <= b => Some((a, b)),
        _ => None,
    };

    Some(Interpolation {
        fraction: fraction.clamp(0.0, 1.0),
        rotation: start.rotation.or(end.rotation),
        coord_range,
        segment_fraction: time_frac,
    })
}

fn at_breakpoint(bp: &Breakpoint) -> Interpolation {
    Interpolation {
        fraction: bp.fraction.clamp(0.0, 1.0),
        rotation: bp.rotation,
        coord_range: bp.coord_index.map(|idx| (idx, idx)),
        segment_fraction: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn bp(time_ms: f64, fraction: f64) -> Breakpoint {
        Breakpoint::new(time_ms, fraction)
    }

    fn fraction_at(breakpoints: &[Breakpoint], time_ms: f64, opts: &InterpolationOptions) -> f64 {
        interpolate(breakpoints, time_ms, opts).unwrap().fraction
    }

    #[test]
    fn halfway_through_a_segment() {
        let bps = vec![bp(0.0, 0.0), bp(1000.0, 1.0)];
        let opts = InterpolationOptions::default();
        assert!((fraction_at(&bps, 500.0, &opts) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn disabled_interpolation_snaps_to_segment_start() {
        let bps = vec![bp(0.0, 0.0), bp(1000.0, 1.0)];
        let opts = InterpolationOptions {
            enabled: false,
            ..Default::default()
        };
        for t in [0.0, 1.0, 250.0, 500.0, 999.0] {
            assert_eq!(fraction_at(&bps, t, &opts), 0.0);
        }
    }

    #[test]
    fn dwelling_then_moving() {
        let bps = vec![bp(0.0, 0.2), bp(500.0, 0.2), bp(1000.0, 0.6)];
        let opts = InterpolationOptions::default();
        assert!((fraction_at(&bps, 250.0, &opts) - 0.2).abs() < 1e-9);
        assert!((fraction_at(&bps, 750.0, &opts) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn zero_length_segment_lands_on_the_later_breakpoint() {
        let bps = vec![bp(0.0, 0.0), bp(500.0, 0.2), bp(500.0, 0.4), bp(1000.0, 1.0)];
        let opts = InterpolationOptions::default();
        assert!((fraction_at(&bps, 500.0, &opts) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn expires_after_the_grace_window() {
        let bps = vec![bp(0.0, 0.0), bp(1000.0, 1.0)];
        let opts = InterpolationOptions {
            enabled: true,
            expiry_grace_ms: 100.0,
        };
        assert_eq!(fraction_at(&bps, 1050.0, &opts), 1.0);
        assert!(interpolate(&bps, 1101.0, &opts).is_none());
    }

    #[test]
    fn empty_breakpoints_never_interpolate() {
        assert!(interpolate(&[], 0.0, &InterpolationOptions::default()).is_none());
    }

    #[test]
    fn coordinate_ranges() {
        let mut a = bp(0.0, 0.0);
        a.coord_index = Some(2);
        let mut b = bp(1000.0, 0.5);
        b.coord_index = Some(5);
        let opts = InterpolationOptions::default();

        let mid = interpolate(&[a, b], 250.0, &opts).unwrap();
        assert_eq!(mid.coord_range, Some((2, 5)));
        assert!((mid.segment_fraction - 0.25).abs() < 1e-9);

        let before = interpolate(&[a, b], -10.0, &opts).unwrap();
        assert_eq!(before.coord_range, Some((2, 2)));
    }

    fn increasing_breakpoints() -> impl Strategy<Value = Vec<Breakpoint>> {
        prop::collection::vec((1.0f64..1000.0, 0.0f64..0.1), 2..20).prop_map(|steps| {
            let mut time_ms = 0.0;
            let mut fraction = 0.0;
            let mut result = Vec::new();
            for (dt, df) in steps {
                result.push(bp(time_ms, fraction));
                time_ms += dt;
                fraction = (fraction + df).min(1.0);
            }
            result
        })
    }

    proptest! {
        #[test]
        fn fraction_never_decreases(bps in increasing_breakpoints(), a in 0.0f64..1.0, b in 0.0f64..1.0) {
            let opts = InterpolationOptions::default();
            let span = bps.last().unwrap().time_ms;
            let (t1, t2) = if a <= b { (a * span, b * span) } else { (b * span, a * span) };
            prop_assert!(fraction_at(&bps, t1, &opts) <= fraction_at(&bps, t2, &opts) + 1e-9);
        }

        #[test]
        fn clamps_outside_the_window(bps in increasing_breakpoints(), before in 1.0f64..1e6, after in 0.0f64..1e6) {
            let opts = InterpolationOptions {
                enabled: true,
                expiry_grace_ms: f64::INFINITY,
            };
            let first = bps[0];
            let last = *bps.last().unwrap();
            prop_assert_eq!(fraction_at(&bps, first.time_ms - before, &opts), first.fraction);
            prop_assert_eq!(fraction_at(&bps, last.time_ms + after, &opts), last.fraction);
        }
    }
}
