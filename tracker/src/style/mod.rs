//! Vehicle glyphs and the cache in front of them.
//!
//! A glyph only depends on its `StyleKey`. Hover and selection are part of the key, never read
//! from ambient state, so a cached glyph is always the one that would be drawn again.

mod cache;
mod color;
mod vehicle;

use geom::Polygon;
use serde::{Deserialize, Serialize};

use crate::Trajectory;

pub use self::cache::StyleCache;
pub use self::color::Color;
pub use self::vehicle::{delay_text, label_text, DelayThresholds, StyleConfig, VehicleStyle};

/// Zoom levels past this one draw exactly like it.
pub const MAX_ZOOM_LEVEL: u8 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    Tram,
    Subway,
    Train,
    Bus,
    Ferry,
    CableCar,
    Gondola,
    Funicular,
    LongDistanceBus,
    Rail,
}

impl VehicleType {
    /// In the order backends number them
    pub const ALL: [VehicleType; 10] = [
        VehicleType::Tram,
        VehicleType::Subway,
        VehicleType::Train,
        VehicleType::Bus,
        VehicleType::Ferry,
        VehicleType::CableCar,
        VehicleType::Gondola,
        VehicleType::Funicular,
        VehicleType::LongDistanceBus,
        VehicleType::Rail,
    ];

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Understands the display names, a few lowercase API spellings, and numeric indices.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(idx) = raw.parse::<usize>() {
            return Self::from_index(idx);
        }
        let lower = raw.to_lowercase();
        for vehicle_type in Self::ALL {
            if vehicle_type.describe().to_lowercase() == lower {
                return Some(vehicle_type);
            }
        }
        match lower.as_ref() {
            "subway" | "metro" | "s-bahn" => Some(VehicleType::Subway),
            "cablecar" | "cable_car" => Some(VehicleType::CableCar),
            "coach" | "long_distance_bus" => Some(VehicleType::LongDistanceBus),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            VehicleType::Tram => "Tram",
            VehicleType::Subway => "Subway / Metro / S-Bahn",
            VehicleType::Train => "Train",
            VehicleType::Bus => "Bus",
            VehicleType::Ferry => "Ferry",
            VehicleType::CableCar => "Cable Car",
            VehicleType::Gondola => "Gondola",
            VehicleType::Funicular => "Funicular",
            VehicleType::LongDistanceBus => "Long distance bus",
            VehicleType::Rail => "Rail",
        }
    }

    pub fn is_rail(self) -> bool {
        matches!(self, VehicleType::Train | VehicleType::Rail)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DelayBucket {
    OnTime,
    Late,
    VeryLate,
    ExtremelyLate,
    Cancelled,
}

/// Everything a glyph depends on.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StyleKey {
    pub zoom: u8,
    pub vehicle_type: Option<VehicleType>,
    pub name: String,
    pub color: Option<Color>,
    pub text_color: Option<Color>,
    pub delay: Option<DelayBucket>,
    pub hover: bool,
    pub selected: bool,
}

/// A pre-rendered vehicle, in pixels, centered on the origin.
#[derive(Clone, Debug)]
pub struct Glyph {
    pub radius: f64,
    /// Width and height of the square the glyph fits in
    pub size: f64,
    /// Drawn in order
    pub shapes: Vec<(Color, Polygon)>,
    pub label: Option<Label>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub text: String,
    pub color: Color,
    pub font_size: f64,
}

/// How a layer turns trajectories into glyphs. `draw` only gets the key, which keeps glyphs
/// cacheable.
pub trait Styler {
    fn key(&self, trajectory: &Trajectory, zoom: u8, hover: bool, selected: bool) -> StyleKey;
    fn draw(&self, key: &StyleKey) -> Glyph;
}

/// Rounds a fractional viewport zoom down to the level glyphs are drawn for.
pub fn zoom_level(zoom: f64) -> u8 {
    if !zoom.is_finite() {
        return 1;
    }
    zoom.floor().clamp(0.0, MAX_ZOOM_LEVEL as f64) as u8
}
