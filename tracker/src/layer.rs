use anyhow::Result;
use geom::Pt2D;

use crate::style::{self, Styler, VehicleStyle};
use crate::{
    FetchCycle, FetchOutcome, FetchTicket, Filter, Playback, RenderStats, Sort, Surface, Tick,
    Tracker, TrackerConfig, Trajectory, TrajectoryId, Viewport,
};

pub type ClickCallback = Box<dyn FnMut(&Trajectory)>;

/// Everything a host map needs to show live vehicles: the tracker, the clock driving it, and the
/// fetch cycle feeding it. Backend specifics live in the `Styler` and in whatever produces
/// trajectories.
pub struct TrackerLayer<S = VehicleStyle> {
    tracker: Tracker<S>,
    playback: Playback,
    fetch: FetchCycle,
    click_callbacks: Vec<ClickCallback>,
}

impl TrackerLayer<VehicleStyle> {
    pub fn new(config: &TrackerConfig, start_time_ms: f64) -> Self {
        Self::with_styler(
            config,
            VehicleStyle::new(config.style.clone()),
            start_time_ms,
        )
    }
}

impl<S: Styler> TrackerLayer<S> {
    pub fn with_styler(config: &TrackerConfig, styler: S, start_time_ms: f64) -> Self {
        Self {
            tracker: Tracker::new(styler, config.interpolation(), config.hit_tolerance_px),
            playback: Playback::new(config.playback.clone(), start_time_ms),
            fetch: FetchCycle::new(config.refresh_interval_ms),
            click_callbacks: Vec::new(),
        }
    }

    pub fn start(&mut self, now_ms: f64) {
        info!("Starting tracker at {}", self.playback.current_time_ms());
        self.playback.start(now_ms);
    }

    /// Cancels the pending tick and any fetch in flight. The current time is kept.
    pub fn stop(&mut self) {
        self.playback.stop();
        self.fetch.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.playback.is_running()
    }

    /// Renders if a tick is due.
    pub fn tick<F: Surface, V: Viewport>(
        &mut self,
        now_ms: f64,
        surface: &mut F,
        viewport: &V,
    ) -> Option<RenderStats> {
        match self.playback.poll(now_ms) {
            Tick::Render(time_ms) => Some(self.tracker.render_at(surface, viewport, time_ms)),
            Tick::Idle | Tick::Suspended => None,
        }
    }

    /// Redraws at the current time, without advancing the clock.
    pub fn render_now<F: Surface, V: Viewport>(
        &mut self,
        surface: &mut F,
        viewport: &V,
    ) -> RenderStats {
        self.tracker
            .render_at(surface, viewport, self.playback.current_time_ms())
    }

    pub fn get_curr_time(&self) -> f64 {
        self.playback.current_time_ms()
    }

    pub fn set_curr_time(&mut self, time_ms: f64, now_ms: f64) {
        self.playback.set_current_time(time_ms, now_ms);
    }

    pub fn get_speed(&self) -> f64 {
        self.playback.speed()
    }

    pub fn set_speed(&mut self, speed: f64, now_ms: f64) -> Result<()> {
        self.playback.set_speed(speed, now_ms)
    }

    pub fn gesture_start(&mut self) {
        self.playback.gesture_start();
    }

    /// Catches up right away, so the map isn't left stale after a pan or zoom.
    pub fn gesture_end<F: Surface, V: Viewport>(
        &mut self,
        now_ms: f64,
        surface: &mut F,
        viewport: &V,
    ) -> RenderStats {
        let time_ms = self.playback.gesture_end(now_ms);
        self.tracker.render_at(surface, viewport, time_ms)
    }

    /// Call when the viewport's zoom changes. Crossing into a new zoom level drops the glyphs
    /// drawn for the old one and retunes the tick cadence.
    pub fn on_view_change(&mut self, zoom: f64, now_ms: f64) {
        let level = style::zoom_level(zoom);
        let old = self.playback.zoom();
        if level == old {
            return;
        }
        let dropped = self.tracker.invalidate_zoom_level(old);
        debug!("Zoom level {old} -> {level}, dropped {dropped} glyphs");
        self.playback.set_zoom(level, now_ms);
    }

    /// Updates the hovered vehicle. Returns true if the pointer is over one. While dragging the
    /// map, hover is left alone.
    pub fn pointer_move(&mut self, coordinate: Pt2D, resolution: f64, dragging: bool) -> bool {
        if dragging {
            return false;
        }
        let hit = self
            .tracker
            .find_vehicles_near(coordinate, resolution)
            .first()
            .map(|traj| traj.id.clone());
        let hovering = hit.is_some();
        if self.tracker.hover_id() != hit.as_ref() {
            self.tracker.set_hover_id(hit);
        }
        hovering
    }

    /// Selects the vehicle under the pointer and tells every click callback about it. Clicking
    /// empty space clears the selection.
    pub fn click(&mut self, coordinate: Pt2D, resolution: f64) -> Option<TrajectoryId> {
        let hit = self
            .tracker
            .find_vehicles_near(coordinate, resolution)
            .first()
            .map(|traj| (*traj).clone());
        match hit {
            Some(traj) => {
                self.tracker.set_selected_id(Some(traj.id.clone()));
                for cb in &mut self.click_callbacks {
                    cb(&traj);
                }
                Some(traj.id)
            }
            None => {
                self.tracker.set_selected_id(None);
                None
            }
        }
    }

    pub fn on_vehicle_click(&mut self, cb: ClickCallback) {
        self.click_callbacks.push(cb);
    }

    pub fn set_filter(&mut self, filter: Option<Filter>) {
        self.tracker.set_filter(filter);
    }

    pub fn set_sort(&mut self, sort: Option<Sort>) {
        self.tracker.set_sort(sort);
    }

    pub fn set_visible<F: Surface>(&mut self, visible: bool, surface: &mut F) {
        self.tracker.set_visible(visible, surface);
    }

    pub fn set_trajectories(&mut self, trajectories: Vec<Trajectory>) {
        self.tracker.set_trajectories(trajectories);
    }

    pub fn fetch_due(&self, now_ms: f64) -> bool {
        self.fetch.due(now_ms)
    }

    /// Starts a snapshot fetch, cancelling the previous one.
    pub fn begin_fetch(&mut self, now_ms: f64) -> FetchTicket {
        self.fetch.begin(now_ms)
    }

    pub fn settle_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Trajectory>>,
    ) -> FetchOutcome {
        let tracker = &mut self.tracker;
        self.fetch
            .settle(ticket, result, |list| tracker.set_trajectories(list))
    }

    pub fn tracker(&self) -> &Tracker<S> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker<S> {
        &mut self.tracker
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::testing::{trajectory, ManualClock, RecordingSurface, TestViewport};
    use crate::WallClock;

    struct Harness {
        layer: TrackerLayer,
        clock: ManualClock,
        surface: RecordingSurface,
        viewport: TestViewport,
    }

    impl Harness {
        fn new() -> Self {
            let clock = ManualClock::default();
            let mut layer = TrackerLayer::new(&TrackerConfig::default(), 0.0);
            layer.on_view_change(14.0, clock.now_ms());
            layer.start(clock.now_ms());
            Self {
                layer,
                clock,
                surface: RecordingSurface::default(),
                viewport: TestViewport::default(),
            }
        }

        fn tick(&mut self) -> Option<RenderStats> {
            self.layer
                .tick(self.clock.now_ms(), &mut self.surface, &self.viewport)
        }
    }

    #[test]
    fn pausing_freezes_vehicles() {
        let mut h = Harness::new();
        let mut slow = trajectory("a");
        slow.geometry[1] = Pt2D::new(100_000.0, 0.0);
        slow.time_intervals[1].time_ms = 100_000.0;
        h.layer.set_trajectories(vec![slow]);

        h.layer.set_speed(10.0, h.clock.now_ms()).unwrap();
        h.tick();
        h.clock.advance(1000.0);
        h.tick();
        assert_eq!(h.layer.get_curr_time(), 10_000.0);
        assert_eq!(h.surface.blits[0].1, Pt2D::new(10_000.0, 0.0));

        h.layer.set_speed(0.0, h.clock.now_ms()).unwrap();
        h.clock.advance(60_000.0);
        assert!(h.tick().is_some());
        assert_eq!(h.layer.get_curr_time(), 10_000.0);
        assert_eq!(h.surface.blits[0].1, Pt2D::new(10_000.0, 0.0));

        h.layer.set_speed(1.0, h.clock.now_ms()).unwrap();
        h.clock.advance(1000.0);
        h.tick();
        assert_eq!(h.layer.get_curr_time(), 11_000.0);
    }

    #[test]
    fn gestures_suspend_rendering() {
        let mut h = Harness::new();
        h.layer.set_trajectories(vec![trajectory("a")]);
        assert!(h.tick().is_some());

        h.layer.gesture_start();
        h.clock.advance(500.0);
        assert!(h.tick().is_none());
        let clears = h.surface.clears;

        let stats = h
            .layer
            .gesture_end(h.clock.now_ms(), &mut h.surface, &h.viewport);
        assert_eq!(stats.drawn, 1);
        assert_eq!(h.surface.clears, clears + 1);
        assert_eq!(h.surface.blits[0].1, Pt2D::new(500.0, 0.0));
    }

    #[test]
    fn stop_and_restart() {
        let mut h = Harness::new();
        h.tick();
        h.clock.advance(2000.0);
        h.tick();
        h.layer.stop();
        assert!(!h.layer.is_running());

        h.clock.advance(10_000.0);
        assert!(h.tick().is_none());
        h.layer.start(h.clock.now_ms());
        h.clock.advance(1000.0);
        h.tick();
        assert_eq!(h.layer.get_curr_time(), 3000.0);
    }

    #[test]
    fn hover_and_click() {
        let mut h = Harness::new();
        let mut other = trajectory("b");
        other.time_offset_ms = 200.0;
        h.layer.set_trajectories(vec![trajectory("a"), other]);
        h.layer.set_curr_time(500.0, h.clock.now_ms());
        h.layer.render_now(&mut h.surface, &h.viewport);

        let clicked = Rc::new(RefCell::new(Vec::new()));
        let sink = clicked.clone();
        h.layer.on_vehicle_click(Box::new(move |traj: &Trajectory| {
            sink.borrow_mut().push(traj.id.clone())
        }));

        // a is at x=500, b at x=300
        assert!(h.layer.pointer_move(Pt2D::new(302.0, 0.0), 1.0, false));
        assert_eq!(h.layer.tracker().hover_id().map(|id| id.0.as_str()), Some("b"));
        assert!(!h.layer.pointer_move(Pt2D::new(400.0, 0.0), 1.0, true));
        assert_eq!(h.layer.tracker().hover_id().map(|id| id.0.as_str()), Some("b"));
        assert!(!h.layer.pointer_move(Pt2D::new(400.0, 0.0), 1.0, false));
        assert!(h.layer.tracker().hover_id().is_none());

        let id = h.layer.click(Pt2D::new(498.0, 3.0), 1.0);
        assert_eq!(id.as_ref().map(|id| id.0.as_str()), Some("a"));
        assert_eq!(h.layer.tracker().selected_id(), id.as_ref());
        assert_eq!(clicked.borrow().len(), 1);

        assert!(h.layer.click(Pt2D::new(400.0, 0.0), 1.0).is_none());
        assert!(h.layer.tracker().selected_id().is_none());
        assert_eq!(clicked.borrow().len(), 1);
    }

    #[test]
    fn zoom_changes_drop_old_glyphs() {
        let mut h = Harness::new();
        h.layer.set_trajectories(vec![trajectory("a")]);
        h.tick();
        assert_eq!(h.layer.tracker().glyphs().len(), 1);

        // Same level
        h.layer.on_view_change(14.6, h.clock.now_ms());
        assert_eq!(h.layer.tracker().glyphs().len(), 1);

        h.layer.on_view_change(12.0, h.clock.now_ms());
        assert!(h.layer.tracker().glyphs().is_empty());
        assert_eq!(h.layer.playback().zoom(), 12);
    }

    #[test]
    fn fetches_feed_the_tracker() {
        let mut h = Harness::new();
        assert!(h.layer.fetch_due(h.clock.now_ms()));
        let stale = h.layer.begin_fetch(h.clock.now_ms());
        let fresh = h.layer.begin_fetch(h.clock.now_ms());

        assert_eq!(
            h.layer.settle_fetch(fresh, Ok(vec![trajectory("a")])),
            FetchOutcome::Applied(1)
        );
        assert_eq!(
            h.layer
                .settle_fetch(stale, Ok(vec![trajectory("b"), trajectory("c")])),
            FetchOutcome::Discarded
        );
        assert_eq!(h.layer.tracker().store().len(), 1);
        assert!(!h.layer.fetch_due(h.clock.now_ms()));

        h.clock.advance(3000.0);
        let ticket = h.layer.begin_fetch(h.clock.now_ms());
        assert_eq!(
            h.layer.settle_fetch(ticket, Err(anyhow!("timeout"))),
            FetchOutcome::Failed
        );
        assert_eq!(h.layer.tracker().store().len(), 1);
    }
}
