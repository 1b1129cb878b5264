use std::collections::BTreeMap;

use geom::{Bounds, Pt2D};
use widgetry::{Canvas, Color, Drawable, EventCtx, GeomBatch, Line, Text};

use tracker::style::{self, Glyph, Label};
use tracker::{Surface, Viewport};

/// Map space for the canvas: backend coordinates are flipped so y points down, then shifted so
/// the first snapshot's bounds start at the origin.
#[derive(Clone, Copy)]
pub struct Frame {
    min_x: f64,
    max_y: f64,
    width: f64,
    height: f64,
}

impl Frame {
    /// None if there's nothing to frame
    pub fn around<'a, I: Iterator<Item = &'a Pt2D>>(pts: I) -> Option<Frame> {
        let mut bounds = Bounds::new();
        let mut any = false;
        for pt in pts {
            bounds.update(*pt);
            any = true;
        }
        if !any {
            return None;
        }
        Some(Frame {
            min_x: bounds.min_x,
            max_y: bounds.max_y,
            width: (bounds.max_x - bounds.min_x).max(1.0),
            height: (bounds.max_y - bounds.min_y).max(1.0),
        })
    }

    pub fn to_map(&self, pt: Pt2D) -> Pt2D {
        Pt2D::new(pt.x() - self.min_x, self.max_y - pt.y())
    }

    pub fn from_map(&self, pt: Pt2D) -> Pt2D {
        Pt2D::new(pt.x() + self.min_x, self.max_y - pt.y())
    }

    pub fn map_dims(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn center(&self) -> Pt2D {
        Pt2D::new(self.width / 2.0, self.height / 2.0)
    }
}

/// The widgetry canvas, as the tracker sees it.
pub struct CanvasViewport<'a> {
    canvas: &'a Canvas,
    frame: Frame,
}

impl<'a> CanvasViewport<'a> {
    pub fn new(canvas: &'a Canvas, frame: Frame) -> Self {
        Self { canvas, frame }
    }
}

impl<'a> Viewport for CanvasViewport<'a> {
    fn pixel_from_coordinate(&self, pt: Pt2D) -> Option<Pt2D> {
        let screen = self.canvas.map_to_screen(self.frame.to_map(pt));
        if !screen.x.is_finite() || !screen.y.is_finite() {
            return None;
        }
        // Let glyphs partly off the edge still draw
        let margin = 50.0;
        if screen.x < -margin
            || screen.y < -margin
            || screen.x > self.canvas.window_width + margin
            || screen.y > self.canvas.window_height + margin
        {
            return None;
        }
        Some(Pt2D::new(screen.x, screen.y))
    }

    fn resolution(&self) -> f64 {
        1.0 / self.canvas.cam_zoom
    }

    fn zoom(&self) -> f64 {
        // Web maps show about a meter per pixel at zoom 17
        17.0 + self.canvas.cam_zoom.log2()
    }

    fn size_px(&self) -> (f64, f64) {
        (self.canvas.window_width, self.canvas.window_height)
    }
}

/// What's changed about the camera since the last event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ViewChange {
    Unchanged,
    /// Panned or resized
    Moved,
    Zoomed,
}

/// Remembers where the camera was, so any camera move or window resize gets a fresh render
/// instead of waiting for the next tick.
#[derive(Default)]
pub struct CameraWatch {
    // cam_x, cam_y, cam_zoom, window_width, window_height
    last: Option<[f64; 5]>,
}

impl CameraWatch {
    pub fn update(&mut self, canvas: &Canvas) -> ViewChange {
        self.observe([
            canvas.cam_x,
            canvas.cam_y,
            canvas.cam_zoom,
            canvas.window_width,
            canvas.window_height,
        ])
    }

    fn observe(&mut self, now: [f64; 5]) -> ViewChange {
        let change = match self.last {
            Some(last) if last == now => ViewChange::Unchanged,
            Some(last) if last[2] != now[2] => ViewChange::Zoomed,
            _ => ViewChange::Moved,
        };
        self.last = Some(now);
        change
    }
}

enum Stamp {
    Shapes(GeomBatch),
    Label(Label, Pt2D),
}

/// Collects glyphs in screen-space, in the order they're blitted. Labels need text rendering,
/// which can only happen once `upload` gets an `EventCtx`.
pub struct BatchSurface {
    width: f64,
    height: f64,
    stamps: Vec<Stamp>,
    // Keyed by text, color, and font size
    labels: BTreeMap<(String, style::Color, usize), GeomBatch>,
}

impl BatchSurface {
    pub fn new() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            stamps: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn upload(&mut self, ctx: &mut EventCtx) -> Drawable {
        let mut batch = GeomBatch::new();
        for stamp in &self.stamps {
            match stamp {
                Stamp::Shapes(shapes) => {
                    batch.append(shapes.clone());
                }
                Stamp::Label(label, center) => {
                    let font_size = label.font_size.round() as usize;
                    let rendered = self
                        .labels
                        .entry((label.text.clone(), label.color, font_size))
                        .or_insert_with(|| {
                            Text::from(
                                Line(&label.text)
                                    .fg(to_color(label.color))
                                    .size(font_size),
                            )
                            .render_autocropped(ctx)
                        });
                    batch.append(rendered.clone().centered_on(*center));
                }
            }
        }
        ctx.upload(batch)
    }
}

impl Surface for BatchSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    fn clear(&mut self) {
        self.stamps.clear();
    }

    fn blit(&mut self, glyph: &Glyph, center: Pt2D) {
        let mut batch = GeomBatch::new();
        for (color, polygon) in &glyph.shapes {
            batch.push(to_color(*color), polygon.translate(center.x(), center.y()));
        }
        self.stamps.push(Stamp::Shapes(batch));
        if let Some(ref label) = glyph.label {
            self.stamps.push(Stamp::Label(label.clone(), center));
        }
    }
}

pub fn to_color(color: style::Color) -> Color {
    let [r, g, b, a] = color.to_rgba_f();
    Color::rgba_f(r, g, b, a)
}
