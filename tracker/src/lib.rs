#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod config;
pub mod feed;
mod fetch;
pub mod filters;
mod layer;
mod playback;
pub mod sorts;
mod store;
pub mod style;
mod time_intervals;
mod tracker;
mod trajectory;

#[cfg(test)]
mod testing;

pub use self::config::TrackerConfig;
pub use self::fetch::{CancelToken, FetchCycle, FetchOutcome, FetchTicket};
pub use self::layer::{ClickCallback, TrackerLayer};
pub use self::playback::{faster, slower, Playback, PlaybackConfig, SystemClock, Tick, WallClock};
pub use self::store::{Filter, Sort, TrajectoryStore};
pub use self::time_intervals::{interpolate, Interpolation, InterpolationOptions};
pub use self::tracker::{RenderStats, Surface, Tracker, Viewport};
pub use self::trajectory::{Breakpoint, Position, Trajectory, TrajectoryId};
