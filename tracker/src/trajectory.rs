use std::fmt;

use geom::{Angle, PolyLine, Pt2D};
use serde::{Deserialize, Serialize};

use crate::style::{Color, VehicleType};
use crate::{interpolate, InterpolationOptions};

/// Unique among the trajectories currently loaded, but backends recycle them once a vehicle
/// leaves.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrajectoryId(pub String);

impl fmt::Display for TrajectoryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `(time, fraction)` sample anchoring interpolation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub time_ms: f64,
    /// Fraction along the trajectory's whole geometry
    pub fraction: f64,
    /// In degrees, when the backend knows the heading
    pub rotation: Option<f64>,
    /// The geometry coordinate this sample sits on
    pub coord_index: Option<usize>,
}

impl Breakpoint {
    pub fn new(time_ms: f64, fraction: f64) -> Self {
        Self {
            time_ms,
            fraction,
            rotation: None,
            coord_index: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Trajectory {
    pub id: TrajectoryId,
    pub vehicle_type: Option<VehicleType>,
    /// Short label, usually the line number
    pub name: String,
    pub color: Option<Color>,
    pub text_color: Option<Color>,
    pub geometry: Vec<Pt2D>,
    pub time_intervals: Vec<Breakpoint>,
    /// Local time minus server time. Subtracted from query times before interpolating.
    pub time_offset_ms: f64,
    pub delay_ms: Option<f64>,
    pub cancelled: bool,
    pub operator: Option<String>,
    pub route_identifier: Option<String>,

    /// Where this vehicle was placed by the last render pass
    pub coordinate: Option<Pt2D>,
    pub rotation: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub pt: Pt2D,
    pub rotation: Option<f64>,
    pub fraction: f64,
}

impl Trajectory {
    pub fn new(id: TrajectoryId, geometry: Vec<Pt2D>, time_intervals: Vec<Breakpoint>) -> Self {
        Self {
            id,
            vehicle_type: None,
            name: String::new(),
            color: None,
            text_color: None,
            geometry,
            time_intervals,
            time_offset_ms: 0.0,
            delay_ms: None,
            cancelled: false,
            operator: None,
            route_identifier: None,
            coordinate: None,
            rotation: None,
        }
    }

    /// Breakpoints have to be ordered by time; everything else about a backend's record is
    /// tolerated.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.geometry.is_empty() {
            bail!("Trajectory {} has no geometry", self.id);
        }
        for pair in self.time_intervals.windows(2) {
            if pair[0].time_ms > pair[1].time_ms {
                bail!(
                    "Trajectory {} has out-of-order breakpoints: {} then {}",
                    self.id,
                    pair[0].time_ms,
                    pair[1].time_ms
                );
            }
        }
        Ok(())
    }

    /// None if the vehicle's known window has elapsed at this local time.
    ///
    /// There are three ways to place a vehicle:
    /// - stationary, when there are no breakpoints at all, the geometry is a single point, or the
    ///   current segment starts and ends on the same coordinate
    /// - moving within a sub-range, when both ends of the segment name a coordinate; the
    ///   position is found along just that slice of the geometry
    /// - moving along the whole geometry by fraction otherwise
    pub fn position_at(&self, time_ms: f64, opts: &InterpolationOptions) -> Option<Position> {
        let first = *self.geometry.first()?;

        if self.time_intervals.is_empty() {
            return Some(Position {
                pt: first,
                rotation: None,
                fraction: 0.0,
            });
        }

        let interp = interpolate(&self.time_intervals, time_ms - self.time_offset_ms, opts)?;
        if self.geometry.len() == 1 {
            return Some(Position {
                pt: first,
                rotation: interp.rotation,
                fraction: interp.fraction,
            });
        }

        let along = match interp.coord_range {
            Some((a, b)) if a == b && a < self.geometry.len() => {
                return Some(Position {
                    pt: self.geometry[a],
                    rotation: interp.rotation,
                    fraction: interp.fraction,
                });
            }
            Some((a, b)) if b < self.geometry.len() && self.geometry.len() > 2 => {
                point_along(&self.geometry[a..=b], interp.segment_fraction)
            }
            _ => point_along(&self.geometry, interp.fraction),
        };

        Some(match along {
            Some((pt, angle)) => Position {
                pt,
                rotation: interp.rotation.or(Some(angle.normalized_degrees())),
                fraction: interp.fraction,
            },
            // Every coordinate is the same point
            None => Position {
                pt: first,
                rotation: interp.rotation,
                fraction: interp.fraction,
            },
        })
    }
}

fn point_along(pts: &[Pt2D], fraction: f64) -> Option<(Pt2D, Angle)> {
    let pl = PolyLine::deduping_new(pts.to_vec()).ok()?;
    pl.dist_along(pl.length() * fraction.clamp(0.0, 1.0)).ok()
}
