//! Decoders turning backend payloads into trajectories. Nothing here does IO; hosts fetch bytes
//! however they like and hand them over.

pub mod trajserv;
pub mod tralis;

use geom::Pt2D;
use serde_json::Value;

use crate::style::{Color, VehicleType};
use crate::TrajectoryId;

pub use self::trajserv::{
    parse_stations, parse_trajectories, JourneyDetails, Snapshot, Station, TrajservRequest,
};
pub use self::tralis::TralisFeed;

/// Maps backend coordinates into the map's working space. None drops that point.
pub type Projection = Box<dyn Fn(f64, f64) -> Option<Pt2D>>;

/// For backends already speaking the map's projection
pub fn identity(x: f64, y: f64) -> Option<Pt2D> {
    if x.is_finite() && y.is_finite() {
        Some(Pt2D::new(x, y))
    } else {
        None
    }
}

/// Backends send IDs as strings or numbers.
fn id_from_json(value: &Value) -> Option<TrajectoryId> {
    match value {
        Value::String(x) if !x.is_empty() => Some(TrajectoryId(x.clone())),
        Value::Number(x) => Some(TrajectoryId(x.to_string())),
        _ => None,
    }
}

/// Either an index into `VehicleType::ALL` or a name
fn vehicle_type_from_json(value: &Value) -> Option<VehicleType> {
    match value {
        Value::Number(x) => x
            .as_u64()
            .and_then(|idx| VehicleType::from_index(idx as usize)),
        Value::String(x) => VehicleType::parse(x),
        _ => None,
    }
}

/// A bad color isn't worth dropping a vehicle over; it'll just use the default.
fn color_from_hex(raw: Option<&str>) -> Option<Color> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match Color::hex(raw) {
        Ok(color) => Some(color),
        Err(err) => {
            debug!("Ignoring color: {err}");
            None
        }
    }
}

/// Flags come as booleans or 0/1.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(x) => *x,
        Value::Number(x) => x.as_f64().map(|x| x != 0.0).unwrap_or(false),
        _ => false,
    }
}
