use std::collections::BTreeSet;
use std::rc::Rc;

use geom::{Bounds, Pt2D};

use crate::style::{self, Glyph, StyleCache, StyleKey, Styler, VehicleStyle};
use crate::{Filter, InterpolationOptions, Sort, Trajectory, TrajectoryId, TrajectoryStore};

/// The host map. Tracker never pans or projects anything itself.
pub trait Viewport {
    /// None for coordinates that can't be placed on screen right now
    fn pixel_from_coordinate(&self, pt: Pt2D) -> Option<Pt2D>;
    /// Map units per pixel
    fn resolution(&self) -> f64;
    fn zoom(&self) -> f64;
    fn size_px(&self) -> (f64, f64);
}

/// Something glyphs can be stamped onto, sized like the viewport.
pub trait Surface {
    fn size(&self) -> (f64, f64);
    fn resize(&mut self, width: f64, height: f64);
    fn clear(&mut self);
    fn blit(&mut self, glyph: &Glyph, center: Pt2D);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub drawn: usize,
    pub filtered: usize,
    pub expired: usize,
    /// Positioned, but not on screen this time
    pub offscreen: usize,
}

/// Draws every trajectory at one moment in time.
pub struct Tracker<S = VehicleStyle> {
    store: TrajectoryStore,
    styler: S,
    glyphs: StyleCache<StyleKey, Glyph>,
    interpolation: InterpolationOptions,
    hit_tolerance_px: f64,
    hover_id: Option<TrajectoryId>,
    selected_id: Option<TrajectoryId>,
    visible: bool,
}

impl<S: Styler> Tracker<S> {
    pub fn new(styler: S, interpolation: InterpolationOptions, hit_tolerance_px: f64) -> Self {
        Self {
            store: TrajectoryStore::new(),
            styler,
            glyphs: StyleCache::new(),
            interpolation,
            hit_tolerance_px,
            hover_id: None,
            selected_id: None,
            visible: true,
        }
    }

    pub fn set_trajectories(&mut self, trajectories: Vec<Trajectory>) {
        self.store.set_trajectories(trajectories);
    }

    pub fn set_filter(&mut self, filter: Option<Filter>) {
        self.store.set_filter(filter);
    }

    pub fn set_sort(&mut self, sort: Option<Sort>) {
        self.store.set_sort(sort);
    }

    pub fn set_hover_id(&mut self, id: Option<TrajectoryId>) {
        self.hover_id = id;
    }

    pub fn hover_id(&self) -> Option<&TrajectoryId> {
        self.hover_id.as_ref()
    }

    pub fn set_selected_id(&mut self, id: Option<TrajectoryId>) {
        self.selected_id = id;
    }

    pub fn selected_id(&self) -> Option<&TrajectoryId> {
        self.selected_id.as_ref()
    }

    /// Hiding clears the surface immediately; nothing is drawn until it's shown again.
    pub fn set_visible<F: Surface>(&mut self, visible: bool, surface: &mut F) {
        self.visible = visible;
        if !visible {
            surface.clear();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_interpolation(&mut self, interpolation: InterpolationOptions) {
        self.interpolation = interpolation;
    }

    pub fn store(&self) -> &TrajectoryStore {
        &self.store
    }

    pub fn styler(&self) -> &S {
        &self.styler
    }

    pub fn glyphs(&self) -> &StyleCache<StyleKey, Glyph> {
        &self.glyphs
    }

    /// Forgets glyphs drawn for one zoom level, returning how many were dropped.
    pub fn invalidate_zoom_level(&mut self, zoom: u8) -> usize {
        self.glyphs.retain(|key| key.zoom != zoom)
    }

    pub fn invalidate_glyphs(&mut self) {
        self.glyphs.clear();
    }

    #[cfg(test)]
    fn glyph(&mut self, trajectory: &Trajectory, zoom: u8) -> Rc<Glyph> {
        let hover = self.hover_id.as_ref() == Some(&trajectory.id);
        let selected = self.selected_id.as_ref() == Some(&trajectory.id);
        lookup_glyph(&self.styler, &mut self.glyphs, trajectory, zoom, hover, selected)
    }

    /// Clears the surface and draws every trajectory passing the filter at `time_ms`. The
    /// hovered vehicle is drawn last, so neighbors never cover it. Expired trajectories are
    /// dropped from the store.
    pub fn render_at<F: Surface, V: Viewport>(
        &mut self,
        surface: &mut F,
        viewport: &V,
        time_ms: f64,
    ) -> RenderStats {
        let mut stats = RenderStats::default();
        if !self.visible {
            return stats;
        }

        let (width, height) = viewport.size_px();
        if surface.size() != (width, height) {
            debug!("Resizing tracker surface to {width}x{height}");
            surface.resize(width, height);
        }
        surface.clear();

        let zoom = style::zoom_level(viewport.zoom());
        let mut expired = BTreeSet::new();
        let mut on_top: Option<(Rc<Glyph>, Pt2D)> = None;

        let Self {
            store,
            styler,
            glyphs,
            interpolation,
            hover_id,
            selected_id,
            ..
        } = self;
        let (trajectories, filter) = store.parts_mut();

        for traj in trajectories.iter_mut() {
            if let Some(filter) = filter {
                if !filter(&*traj) {
                    stats.filtered += 1;
                    continue;
                }
            }

            let pos = match traj.position_at(time_ms, interpolation) {
                Some(pos) => pos,
                None => {
                    traj.coordinate = None;
                    traj.rotation = None;
                    expired.insert(traj.id.clone());
                    continue;
                }
            };
            traj.coordinate = Some(pos.pt);
            traj.rotation = pos.rotation;

            let px = match viewport.pixel_from_coordinate(pos.pt) {
                Some(px) if px.x().is_finite() && px.y().is_finite() => px,
                _ => {
                    stats.offscreen += 1;
                    continue;
                }
            };

            let hover = hover_id.as_ref() == Some(&traj.id);
            let selected = selected_id.as_ref() == Some(&traj.id);
            let glyph = lookup_glyph(styler, glyphs, traj, zoom, hover, selected);

            if hover {
                on_top = Some((glyph, px));
            } else {
                surface.blit(&glyph, px);
            }
            stats.drawn += 1;
        }

        if let Some((glyph, px)) = on_top {
            surface.blit(&glyph, px);
        }

        stats.expired = expired.len();
        if !expired.is_empty() {
            debug!("Dropping {} expired trajectories", expired.len());
            store.drop_expired(&expired);
        }
        stats
    }

    /// Every drawn trajectory whose last position is within a few pixels of `pt`, nearest
    /// first. Filtered vehicles never match.
    pub fn find_vehicles_near(&self, pt: Pt2D, resolution: f64) -> Vec<&Trajectory> {
        if !self.visible {
            return Vec::new();
        }
        let buffer = self.hit_tolerance_px * resolution;
        let bounds = Bounds {
            min_x: pt.x() - buffer,
            min_y: pt.y() - buffer,
            max_x: pt.x() + buffer,
            max_y: pt.y() + buffer,
        };

        let mut hits: Vec<(f64, &Trajectory)> = self
            .store
            .visible()
            .filter_map(|traj| {
                let coordinate = traj.coordinate?;
                if bounds.contains(coordinate) {
                    Some((coordinate.dist_to(pt).inner_meters(), traj))
                } else {
                    None
                }
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, traj)| traj).collect()
    }
}

fn lookup_glyph<S: Styler>(
    styler: &S,
    glyphs: &mut StyleCache<StyleKey, Glyph>,
    trajectory: &Trajectory,
    zoom: u8,
    hover: bool,
    selected: bool,
) -> Rc<Glyph> {
    let key = styler.key(trajectory, zoom, hover, selected);
    glyphs.get_or_insert_with(key, |key| styler.draw(key))
}
