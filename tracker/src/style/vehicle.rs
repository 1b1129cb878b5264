use geom::{Circle, Distance, Pt2D};
use serde::{Deserialize, Serialize};

use super::{Color, DelayBucket, Glyph, Label, StyleKey, Styler, VehicleType};
use crate::Trajectory;

/// Radius in pixels per vehicle type (rows, indexed like `VehicleType::ALL`) and zoom level
/// (columns).
const RADIUS_PER_TYPE_AND_ZOOM: [[f64; 17]; 10] = [
    [1., 1., 1., 1., 1., 1., 1., 1., 1., 2., 3., 4., 6., 6., 7., 9., 11.],
    [1., 1., 1., 1., 1., 1., 1., 1., 2., 3., 4., 5., 6., 7., 8., 11., 11.],
    [1., 1., 1., 1., 1., 2., 3., 4., 4., 5., 5., 5., 7., 8., 11., 12., 12.],
    [1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 2., 3., 3., 4., 6., 7., 8.],
    [1., 1., 1., 1., 1., 1., 2., 3., 4., 5., 5., 5., 7., 8., 10., 11., 11.],
    [1., 1., 1., 1., 1., 1., 1., 1., 1., 2., 3., 4., 5., 6., 7., 9., 11.],
    [1., 1., 1., 1., 1., 1., 1., 1., 1., 2., 3., 4., 5., 6., 7., 9., 11.],
    [1., 1., 1., 1., 1., 1., 1., 1., 1., 2., 3., 4., 5., 6., 7., 9., 11.],
    [1., 1., 1., 1., 1., 2., 3., 3., 3., 4., 4., 5., 6., 7., 10., 11., 11.],
    [1., 1., 1., 1., 1., 2., 3., 4., 4., 5., 5., 5., 7., 8., 11., 12., 12.],
];

const BACKGROUND_COLORS: [&str; 10] = [
    "#ffb400", "#ff5400", "#ff8080", "#ea0000", "#3000ff", "#ffb400", "#41a27b", "#00d237",
    "#b5b5b5", "#ff8080",
];

const TEXT_COLORS: [&str; 10] = [
    "#000000", "#ffffff", "#000000", "#ffffff", "#ffffff", "#000000", "#ffffff", "#000000",
    "#000000", "#000000",
];

/// Delays in milliseconds at which a vehicle moves into the next bucket
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelayThresholds {
    pub late_ms: f64,
    pub very_late_ms: f64,
    pub extremely_late_ms: f64,
}

impl Default for DelayThresholds {
    fn default() -> Self {
        Self {
            late_ms: 180_000.0,
            very_late_ms: 300_000.0,
            extremely_late_ms: 500_000.0,
        }
    }
}

impl DelayThresholds {
    pub fn bucket(&self, delay_ms: f64) -> DelayBucket {
        if delay_ms >= self.extremely_late_ms {
            DelayBucket::ExtremelyLate
        } else if delay_ms >= self.very_late_ms {
            DelayBucket::VeryLate
        } else if delay_ms >= self.late_ms {
            DelayBucket::Late
        } else {
            DelayBucket::OnTime
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Rows per vehicle type, columns per zoom level
    pub radius: Vec<Vec<f64>>,
    pub background_colors: Vec<Color>,
    pub text_colors: Vec<Color>,
    /// Used for vehicles of unknown type, or when the tables above don't cover a case
    pub default_radius: f64,
    pub default_background: Color,
    pub default_text: Color,
    pub outline: Color,
    /// Hovered and selected vehicles grow by this much
    pub highlight_px: f64,
    /// Below this radius, halos and labels are illegible and skipped
    pub min_detail_radius: f64,
    pub halo_px: f64,
    pub min_font_px: f64,
    /// Average glyph advance as a fraction of the font size, for deciding if a label fits
    pub char_width_ratio: f64,
    pub delay_thresholds: DelayThresholds,
    pub on_time: Color,
    pub late: Color,
    pub very_late: Color,
    pub extremely_late: Color,
    pub cancelled: Color,
}

impl Default for StyleConfig {
    fn default() -> Self {
        let colors = |list: &[&str]| -> Vec<Color> {
            list.iter()
                .filter_map(|raw| Color::hex(raw).ok())
                .collect()
        };
        Self {
            radius: RADIUS_PER_TYPE_AND_ZOOM
                .iter()
                .map(|row| row.to_vec())
                .collect(),
            background_colors: colors(&BACKGROUND_COLORS),
            text_colors: colors(&TEXT_COLORS),
            default_radius: 1.0,
            default_background: Color::rgb(181, 181, 181),
            default_text: Color::BLACK,
            outline: Color::rgb(0, 51, 0),
            highlight_px: 5.0,
            min_detail_radius: 6.0,
            halo_px: 3.0,
            min_font_px: 10.0,
            char_width_ratio: 0.55,
            delay_thresholds: DelayThresholds::default(),
            on_time: Color::rgb(0, 160, 12),
            late: Color::rgb(255, 74, 0),
            very_late: Color::rgb(232, 0, 0),
            extremely_late: Color::rgb(160, 0, 0),
            cancelled: Color::rgb(220, 42, 42),
        }
    }
}

impl StyleConfig {
    pub fn radius(&self, vehicle_type: Option<VehicleType>, zoom: u8) -> f64 {
        vehicle_type
            .and_then(|t| self.radius.get(t.index()))
            .and_then(|row| row.get(zoom as usize))
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(self.default_radius)
    }

    pub fn background(&self, vehicle_type: Option<VehicleType>) -> Color {
        vehicle_type
            .and_then(|t| self.background_colors.get(t.index()))
            .copied()
            .unwrap_or(self.default_background)
    }

    pub fn text(&self, vehicle_type: Option<VehicleType>) -> Color {
        vehicle_type
            .and_then(|t| self.text_colors.get(t.index()))
            .copied()
            .unwrap_or(self.default_text)
    }

    pub fn delay_color(&self, bucket: DelayBucket) -> Color {
        match bucket {
            DelayBucket::OnTime => self.on_time,
            DelayBucket::Late => self.late,
            DelayBucket::VeryLate => self.very_late,
            DelayBucket::ExtremelyLate => self.extremely_late,
            DelayBucket::Cancelled => self.cancelled,
        }
    }
}

/// A colored disc per vehicle, with an optional delay halo and line label.
#[derive(Clone, Debug, Default)]
pub struct VehicleStyle {
    pub config: StyleConfig,
}

impl VehicleStyle {
    pub fn new(config: StyleConfig) -> Self {
        Self { config }
    }
}

impl Styler for VehicleStyle {
    fn key(&self, trajectory: &Trajectory, zoom: u8, hover: bool, selected: bool) -> StyleKey {
        let delay = if trajectory.cancelled {
            Some(DelayBucket::Cancelled)
        } else {
            trajectory
                .delay_ms
                .filter(|d| d.is_finite())
                .map(|d| self.config.delay_thresholds.bucket(d))
        };
        StyleKey {
            zoom,
            vehicle_type: trajectory.vehicle_type,
            name: trajectory.name.clone(),
            color: trajectory.color,
            text_color: trajectory.text_color,
            delay,
            hover,
            selected,
        }
    }

    fn draw(&self, key: &StyleKey) -> Glyph {
        let cfg = &self.config;
        let mut radius = cfg.radius(key.vehicle_type, key.zoom);
        if key.hover || key.selected {
            radius += cfg.highlight_px;
        }
        let detailed = radius >= cfg.min_detail_radius;

        let halo = match key.delay {
            Some(bucket) if detailed => Some((cfg.delay_color(bucket), radius + cfg.halo_px)),
            _ => None,
        };
        let outer = halo.map(|(_, r)| r).unwrap_or(radius);
        // Leave room for the outline
        let size = outer * 2.0 + 4.0;

        let mut shapes = Vec::new();
        if let Some((color, halo_radius)) = halo {
            shapes.push((
                color,
                Circle::new(Pt2D::zero(), Distance::meters(halo_radius)).to_polygon(),
            ));
        }
        let disc = Circle::new(Pt2D::zero(), Distance::meters(radius));
        shapes.push((
            key.color.unwrap_or_else(|| cfg.background(key.vehicle_type)),
            disc.to_polygon(),
        ));
        if let Ok(outline) = disc.to_outline(Distance::meters(1.0)) {
            shapes.push((cfg.outline, outline));
        }

        let mut label = None;
        if detailed {
            let text = label_text(&key.name, key.vehicle_type);
            let font_size = radius.max(cfg.min_font_px);
            let width = text.chars().count() as f64 * font_size * cfg.char_width_ratio;
            if !text.is_empty() && width < size - 6.0 && font_size < size - 6.0 {
                label = Some(Label {
                    text,
                    color: key
                        .text_color
                        .unwrap_or_else(|| cfg.text(key.vehicle_type)),
                    font_size,
                });
            }
        }

        Glyph {
            radius,
            size,
            shapes,
            label,
        }
    }
}

/// Rail lines have long names like "IC 61"; only their first two characters fit on a glyph.
pub fn label_text(name: &str, vehicle_type: Option<VehicleType>) -> String {
    let name = name.trim();
    if vehicle_type.map(|t| t.is_rail()).unwrap_or(false) && name.chars().count() > 3 {
        return name.chars().take(2).collect();
    }
    name.to_string()
}

/// A short description of a delay, like "+3m", or nothing for vehicles on time.
pub fn delay_text(delay_ms: f64) -> String {
    if delay_ms > 3_600_000.0 {
        return format!("+{}h", (delay_ms / 3_600_000.0).round());
    }
    if delay_ms > 59_000.0 {
        return format!("+{}m", (delay_ms / 60_000.0).round());
    }
    if delay_ms > 0.0 {
        return format!("+{}s", (delay_ms / 1000.0).round());
    }
    String::new()
}
