use std::cell::Cell;
use std::rc::Rc;

use geom::Pt2D;

use crate::style::Glyph;
use crate::{Breakpoint, Surface, Trajectory, TrajectoryId, Viewport, WallClock};

/// A vehicle moving from (0, 0) to (1000, 0) during the first second.
pub fn trajectory(id: &str) -> Trajectory {
    let mut traj = Trajectory::new(
        TrajectoryId(id.to_string()),
        vec![Pt2D::new(0.0, 0.0), Pt2D::new(1000.0, 0.0)],
        vec![Breakpoint::new(0.0, 0.0), Breakpoint::new(1000.0, 1.0)],
    );
    traj.name = id.to_string();
    traj
}

/// Records every blit, in order.
#[derive(Default)]
pub struct RecordingSurface {
    pub width: f64,
    pub height: f64,
    pub clears: usize,
    pub blits: Vec<(f64, Pt2D)>,
}

impl Surface for RecordingSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    fn clear(&mut self) {
        self.clears += 1;
        self.blits.clear();
    }

    fn blit(&mut self, glyph: &Glyph, center: Pt2D) {
        self.blits.push((glyph.size, center));
    }
}

/// Map units equal pixels; anything with negative x is "off-screen".
pub struct TestViewport {
    pub zoom: f64,
    pub resolution: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for TestViewport {
    fn default() -> Self {
        Self {
            zoom: 14.0,
            resolution: 1.0,
            width: 800.0,
            height: 600.0,
        }
    }
}

impl Viewport for TestViewport {
    fn pixel_from_coordinate(&self, pt: Pt2D) -> Option<Pt2D> {
        if pt.x() < 0.0 {
            None
        } else {
            Some(pt)
        }
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn size_px(&self) -> (f64, f64) {
        (self.width, self.height)
    }
}

#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<f64>>);

impl ManualClock {
    pub fn advance(&self, dt_ms: f64) {
        self.0.set(self.0.get() + dt_ms);
    }
}

impl WallClock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.0.get()
    }
}
