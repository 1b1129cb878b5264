use std::cmp::Ordering;

use crate::{Sort, Trajectory};

/// The most delayed vehicles are drawn last, on top of everything else. Vehicles without any
/// delay information go first.
pub fn by_delay() -> Sort {
    Box::new(compare_delay)
}

fn compare_delay(a: &Trajectory, b: &Trajectory) -> Ordering {
    match (a.delay_ms, b.delay_ms) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.total_cmp(&y),
    }
}
