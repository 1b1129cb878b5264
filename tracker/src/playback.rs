use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Where "now" comes from. Hosts use `SystemClock`; tests drive time by hand.
pub trait WallClock {
    fn now_ms(&self) -> f64;
}

pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> f64 {
        Utc::now().timestamp_millis() as f64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// How much time passes between useful redraws at real-time speed, indexed by zoom level.
    /// Zoomed out, vehicles barely move on screen between breakpoints.
    pub time_steps_ms: Vec<f64>,
    /// Caps the frame rate at high speeds
    pub min_tick_ms: f64,
    /// A paused clock still ticks this often
    pub max_tick_ms: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            time_steps_ms: vec![
                100000., 50000., 40000., 30000., 20000., 15000., 10000., 5000., 2000., 1000., 400.,
                300., 250., 180., 90., 60., 50., 40., 30., 20., 20.,
            ],
            min_tick_ms: 1000.0 / 60.0,
            max_tick_ms: 20000.0,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !positive(self.min_tick_ms) || !positive(self.max_tick_ms) {
            bail!("min_tick_ms and max_tick_ms must be positive");
        }
        if self.min_tick_ms > self.max_tick_ms {
            bail!(
                "min_tick_ms {} is more than max_tick_ms {}",
                self.min_tick_ms,
                self.max_tick_ms
            );
        }
        if let Some(step) = self.time_steps_ms.iter().find(|step| !positive(**step)) {
            bail!("time_steps_ms can't contain {step}");
        }
        Ok(())
    }

    pub fn tick_interval_ms(&self, zoom: u8, speed: f64) -> f64 {
        if speed <= 0.0 || !speed.is_finite() {
            return self.max_tick_ms.round();
        }
        let step = self
            .time_steps_ms
            .get(zoom as usize)
            .or_else(|| self.time_steps_ms.last())
            .copied()
            .unwrap_or(self.min_tick_ms);
        // f64::clamp panics if the bounds are swapped
        (step / speed)
            .max(self.min_tick_ms)
            .min(self.max_tick_ms)
            .round()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tick {
    /// Not running, or the next tick isn't due yet
    Idle,
    /// Draw everything at this local time
    Render(f64),
    /// Due, but the map is moving under a gesture
    Suspended,
}

/// The local time vehicles are drawn at, advancing with the wall clock at some speed.
///
/// There's only ever one pending tick. Hosts call `poll` whenever they get control; a tick that
/// fires reschedules the next one from the moment it ran, so ticks never pile up under load.
pub struct Playback {
    config: PlaybackConfig,
    current_time_ms: f64,
    speed: f64,
    /// None while stopped
    last_update_ms: Option<f64>,
    next_tick_ms: Option<f64>,
    zoom: u8,
    gesture: bool,
}

impl Playback {
    pub fn new(config: PlaybackConfig, start_time_ms: f64) -> Self {
        Self {
            config,
            current_time_ms: start_time_ms,
            speed: 1.0,
            last_update_ms: None,
            next_tick_ms: None,
            zoom: 0,
            gesture: false,
        }
    }

    pub fn current_time_ms(&self) -> f64 {
        self.current_time_ms
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn is_running(&self) -> bool {
        self.last_update_ms.is_some()
    }

    pub fn in_gesture(&self) -> bool {
        self.gesture
    }

    pub fn next_tick_ms(&self) -> Option<f64> {
        self.next_tick_ms
    }

    pub fn tick_interval_ms(&self) -> f64 {
        self.config.tick_interval_ms(self.zoom, self.speed)
    }

    /// The first tick is due immediately. Starting twice is harmless.
    pub fn start(&mut self, now_ms: f64) {
        if self.is_running() {
            return;
        }
        self.last_update_ms = Some(now_ms);
        self.next_tick_ms = Some(now_ms);
    }

    /// Cancels the pending tick. The current time stays put, so starting again resumes there.
    pub fn stop(&mut self) {
        self.last_update_ms = None;
        self.next_tick_ms = None;
        self.gesture = false;
    }

    pub fn poll(&mut self, now_ms: f64) -> Tick {
        let due = match self.next_tick_ms {
            Some(due) => due,
            None => return Tick::Idle,
        };
        if now_ms < due {
            return Tick::Idle;
        }
        if self.gesture {
            return Tick::Suspended;
        }
        self.advance(now_ms);
        self.next_tick_ms = Some(now_ms + self.tick_interval_ms());
        Tick::Render(self.current_time_ms)
    }

    /// Changing speed never makes the current time jump.
    pub fn set_speed(&mut self, speed: f64, now_ms: f64) -> anyhow::Result<()> {
        if !speed.is_finite() || speed < 0.0 {
            bail!("Invalid playback speed {speed}");
        }
        self.advance(now_ms);
        self.speed = speed;
        self.retune(now_ms);
        Ok(())
    }

    /// Jumps to an explicit time, then keeps advancing from there.
    pub fn set_current_time(&mut self, time_ms: f64, now_ms: f64) {
        self.current_time_ms = time_ms;
        if self.is_running() {
            self.last_update_ms = Some(now_ms);
        }
    }

    pub fn set_zoom(&mut self, zoom: u8, now_ms: f64) {
        if zoom != self.zoom {
            self.zoom = zoom;
            self.retune(now_ms);
        }
    }

    pub fn gesture_start(&mut self) {
        self.gesture = true;
    }

    /// Ends a gesture and returns the time to render at right away, without waiting for the next
    /// tick.
    pub fn gesture_end(&mut self, now_ms: f64) -> f64 {
        self.gesture = false;
        if self.is_running() {
            self.advance(now_ms);
            self.next_tick_ms = Some(now_ms + self.tick_interval_ms());
        }
        self.current_time_ms
    }

    fn advance(&mut self, now_ms: f64) {
        if let Some(last) = self.last_update_ms {
            // A wall clock stepping backwards never rewinds playback
            self.current_time_ms += (now_ms - last).max(0.0) * self.speed;
            self.last_update_ms = Some(now_ms);
        }
    }

    // A shorter cadence shouldn't wait out the old, longer one
    fn retune(&mut self, now_ms: f64) {
        if let Some(due) = self.next_tick_ms {
            self.next_tick_ms = Some(due.min(now_ms + self.tick_interval_ms()));
        }
    }
}

/// The next speed up: tenths below 1x, whole steps below 10x, then by 5 up to 30x.
pub fn faster(speed: f64) -> f64 {
    let next = if speed < 1.0 {
        speed + 0.1
    } else if speed < 10.0 {
        speed + 1.0
    } else {
        speed + 5.0
    };
    round_tenths(next.min(30.0))
}

/// Mirrors `faster`, never going below 0.1x. Pausing is speed 0, not a step.
pub fn slower(speed: f64) -> f64 {
    let next = if speed <= 1.0 {
        speed - 0.1
    } else if speed <= 10.0 {
        speed - 1.0
    } else {
        speed - 5.0
    };
    round_tenths(next.max(0.1))
}

pub(crate) fn positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

fn round_tenths(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
