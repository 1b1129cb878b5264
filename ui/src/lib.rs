#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod components;
mod replay;

use abstutil::Timer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use widgetry::{Canvas, Color, EventCtx, GfxCtx, Settings, SharedAppState};

use tracker::TrackerConfig;

#[derive(StructOpt)]
struct Args {
    /// The path to a Trajserv snapshot, re-read every refresh interval
    #[structopt(long)]
    snapshot: Option<String>,
    /// The path to a JSON file overriding any tracker settings
    #[structopt(long)]
    config: Option<String>,
    /// A directory of journey details, one `<vehicle id>.json` per vehicle, shown once a vehicle
    /// is clicked
    #[structopt(long)]
    stations: Option<String>,
}

impl Args {
    fn load_config(&self) -> Result<TrackerConfig> {
        match self.config {
            Some(ref path) => TrackerConfig::load(path),
            None => Ok(TrackerConfig::default()),
        }
    }
}

fn run(settings: Settings) {
    abstutil::logger::setup();

    let args = Args::from_iter(abstutil::cli_args());
    let config = match args.load_config() {
        Ok(config) => config,
        Err(err) => {
            error!("Falling back to the default config: {err}");
            TrackerConfig::default()
        }
    };

    widgetry::run(settings, move |ctx| {
        let mut app = App::new(config, args.snapshot, args.stations);
        app.restore_savestate(ctx);
        let states = vec![replay::Replay::new_state(ctx, &app)];
        (app, states)
    });
}

pub fn main() {
    let settings = Settings::new("Tracker");
    run(settings);
}

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_wasm() {
    run(Settings::new("Tracker").root_dom_element_id("loading".to_string()));
}

pub struct App {
    config: TrackerConfig,
    snapshot_path: Option<String>,
    stations_dir: Option<String>,

    // Sticky playback state, saved across runs
    time_ms: Option<f64>,
    speed: f64,
}

impl SharedAppState for App {
    fn draw_default(&self, g: &mut GfxCtx) {
        if cfg!(not(target_arch = "wasm32")) {
            g.clear(Color::BLACK);
        }
    }

    fn before_quit(&self, canvas: &Canvas) {
        let ss = Savestate {
            cam_x: canvas.cam_x,
            cam_y: canvas.cam_y,
            cam_zoom: canvas.cam_zoom,
            time_ms: self.time_ms,
            speed: self.speed,
        };
        abstio::write_json("data/save.json".to_string(), &ss);
    }
}

pub type Transition = widgetry::Transition<App>;

impl App {
    pub fn new(
        config: TrackerConfig,
        snapshot_path: Option<String>,
        stations_dir: Option<String>,
    ) -> Self {
        Self {
            config,
            snapshot_path,
            stations_dir,
            time_ms: None,
            speed: 1.0,
        }
    }

    // before_quit is never called on web, so this only does anything on native.
    pub fn restore_savestate(&mut self, ctx: &mut EventCtx) {
        if let Ok(savestate) =
            abstio::maybe_read_json::<Savestate>("data/save.json".to_string(), &mut Timer::throwaway())
        {
            ctx.canvas.cam_x = savestate.cam_x;
            ctx.canvas.cam_y = savestate.cam_y;
            ctx.canvas.cam_zoom = savestate.cam_zoom;
            self.time_ms = savestate.time_ms;
            self.speed = savestate.speed;
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Savestate {
    cam_x: f64,
    cam_y: f64,
    cam_zoom: f64,
    time_ms: Option<f64>,
    speed: f64,
}
