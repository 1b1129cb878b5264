mod feed;
mod surface;
mod vehicle_info;

use std::cell::RefCell;
use std::rc::Rc;

use widgetry::{Drawable, EventCtx, GfxCtx, State, UpdateType};

use tracker::{
    FetchOutcome, RenderStats, SystemClock, TrackerLayer, Trajectory, Viewport, WallClock,
};

use self::feed::{JourneyLoader, SnapshotLoader};
use self::surface::{BatchSurface, CameraWatch, CanvasViewport, Frame, ViewChange};
use self::vehicle_info::VehicleInfo;
use crate::components::TimeControls;
use crate::{App, Transition};

/// Plays back vehicles from a snapshot file over an empty canvas.
pub struct Replay {
    layer: TrackerLayer,
    surface: BatchSurface,
    draw: Drawable,
    time_controls: TimeControls,
    info: Option<VehicleInfo>,
    loader: Option<SnapshotLoader>,
    journeys: Option<JourneyLoader>,

    // Set from the first snapshot
    frame: Option<Frame>,
    dragging: bool,
    camera: CameraWatch,
    clock: SystemClock,
    // Filled in by the layer's click callback
    clicked: Rc<RefCell<Option<Trajectory>>>,
}

impl Replay {
    pub fn new_state(ctx: &mut EventCtx, app: &App) -> Box<dyn State<App>> {
        let clock = SystemClock;
        let now_ms = clock.now_ms();

        let mut layer = TrackerLayer::new(&app.config, app.time_ms.unwrap_or(now_ms));
        if let Err(err) = layer.set_speed(app.speed, now_ms) {
            warn!("Ignoring saved speed: {err}");
        }

        let clicked = Rc::new(RefCell::new(None));
        let sink = clicked.clone();
        layer.on_vehicle_click(Box::new(move |traj: &Trajectory| {
            *sink.borrow_mut() = Some(traj.clone());
        }));
        layer.start(now_ms);

        let loader = match app.snapshot_path {
            Some(ref path) => Some(SnapshotLoader::new(path.clone(), app.time_ms.is_none())),
            None => {
                warn!("No --snapshot given, so there are no vehicles to show");
                None
            }
        };

        Box::new(Self {
            time_controls: TimeControls::new(ctx, &layer),
            layer,
            surface: BatchSurface::new(),
            draw: Drawable::empty(ctx),
            info: None,
            loader,
            journeys: app.stations_dir.clone().map(JourneyLoader::new),

            frame: None,
            dragging: false,
            camera: CameraWatch::default(),
            clock,
            clicked,
        })
    }

    fn on_snapshot(&mut self, ctx: &mut EventCtx, outcome: FetchOutcome) -> bool {
        let count = match outcome {
            FetchOutcome::Applied(count) => count,
            FetchOutcome::Discarded | FetchOutcome::Failed => return false,
        };
        if self.frame.is_none() {
            let frame = Frame::around(
                self.layer
                    .tracker()
                    .store()
                    .all()
                    .iter()
                    .flat_map(|traj| traj.geometry.iter()),
            );
            if let Some(frame) = frame {
                info!("Framing the first snapshot, with {count} trajectories");
                ctx.canvas.map_dims = frame.map_dims();
                ctx.canvas.center_on_map_pt(frame.center());
                self.frame = Some(frame);
            }
        }
        // The selected vehicle may have new details
        if let Some(info) = self.info.take() {
            match self.layer.tracker().store().get(&info.id) {
                Some(traj) => {
                    self.info = Some(info.refresh(ctx, traj));
                }
                None => {
                    self.deselect();
                }
            }
        }
        true
    }

    fn on_journey(&mut self, ctx: &mut EventCtx) -> bool {
        let details = match self.journeys.as_mut().and_then(|journeys| journeys.poll()) {
            Some(details) => details,
            None => return false,
        };
        let info = match self.info.take() {
            Some(info) => info,
            None => return false,
        };
        match self.layer.tracker().store().get(&info.id) {
            Some(traj) if traj.id == details.id => {
                let following = info.following();
                self.info = Some(VehicleInfo::new(ctx, traj, Some(details), following));
                true
            }
            _ => {
                self.info = Some(info);
                false
            }
        }
    }

    fn deselect(&mut self) {
        self.info = None;
        self.layer.tracker_mut().set_selected_id(None);
        if let Some(ref mut journeys) = self.journeys {
            journeys.cancel();
        }
    }

    // Keeps a followed vehicle in the middle of the screen
    fn follow(&self, ctx: &mut EventCtx, frame: Frame) {
        let info = match self.info {
            Some(ref info) if info.following() => info,
            _ => return,
        };
        if let Some(pt) = self
            .layer
            .tracker()
            .store()
            .get(&info.id)
            .and_then(|traj| traj.coordinate)
        {
            ctx.canvas.center_on_map_pt(frame.to_map(pt));
        }
    }

    fn on_pointer(&mut self, ctx: &mut EventCtx, frame: Frame) -> bool {
        let pt = match ctx.canvas.get_cursor_in_map_space() {
            Some(pt) => frame.from_map(pt),
            None => return false,
        };
        let resolution = CanvasViewport::new(&ctx.canvas, frame).resolution();

        let old_hover = self.layer.tracker().hover_id().cloned();
        if self.layer.pointer_move(pt, resolution, self.dragging) {
            ctx.cursor_clickable();
        }
        let mut changed = self.layer.tracker().hover_id() != old_hover.as_ref();

        if ctx.normal_left_click() {
            changed = true;
            if self.layer.click(pt, resolution).is_none() {
                self.deselect();
            }
            if let Some(traj) = self.clicked.borrow_mut().take() {
                if let Some(ref mut journeys) = self.journeys {
                    journeys.request(traj.id.clone());
                }
                self.info = Some(VehicleInfo::new(ctx, &traj, None, false));
            }
        }
        changed
    }
}

impl State<App> for Replay {
    fn event(&mut self, ctx: &mut EventCtx, app: &mut App) -> Transition {
        let now_ms = self.clock.now_ms();
        ctx.canvas_movement();

        let mut redraw = false;

        let dragging = ctx.canvas.is_dragging();
        let gesture_ended = self.dragging && !dragging;
        if dragging && !self.dragging {
            self.layer.gesture_start();
        }
        self.dragging = dragging;

        let outcome = match self.loader {
            Some(ref mut loader) => {
                loader.maybe_begin(&mut self.layer, now_ms);
                loader.poll(&mut self.layer, now_ms)
            }
            None => None,
        };
        if let Some(outcome) = outcome {
            redraw |= self.on_snapshot(ctx, outcome);
        }

        if self.time_controls.event(ctx, &mut self.layer, now_ms) {
            redraw = true;
        }

        let close = match self.info {
            Some(ref mut info) => info.event(ctx),
            None => false,
        };
        if close {
            self.deselect();
            redraw = true;
        }
        redraw |= self.on_journey(ctx);

        if let Some(frame) = self.frame {
            if !self.dragging {
                self.follow(ctx, frame);
            }
            match self.camera.update(&ctx.canvas) {
                ViewChange::Unchanged => {}
                ViewChange::Moved => {
                    redraw = true;
                }
                ViewChange::Zoomed => {
                    let zoom = CanvasViewport::new(&ctx.canvas, frame).zoom();
                    self.layer.on_view_change(zoom, now_ms);
                    redraw = true;
                }
            }

            redraw |= self.on_pointer(ctx, frame);

            let stats: Option<RenderStats> = {
                let viewport = CanvasViewport::new(&ctx.canvas, frame);
                if gesture_ended {
                    Some(
                        self.layer
                            .gesture_end(now_ms, &mut self.surface, &viewport),
                    )
                } else if redraw && !self.dragging {
                    Some(self.layer.render_now(&mut self.surface, &viewport))
                } else {
                    self.layer.tick(now_ms, &mut self.surface, &viewport)
                }
            };
            if stats.is_some() {
                self.draw = self.surface.upload(ctx);
            }
        }

        app.time_ms = Some(self.layer.get_curr_time());
        app.speed = self.layer.get_speed();

        ctx.request_update(UpdateType::Game);
        Transition::Keep
    }

    fn draw(&self, g: &mut GfxCtx, _: &App) {
        g.fork_screenspace();
        g.redraw(&self.draw);
        g.unfork();

        self.time_controls.draw(g);
        if let Some(ref info) = self.info {
            info.draw(g);
        }
    }
}
