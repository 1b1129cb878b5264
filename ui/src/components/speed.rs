use chrono::{TimeZone, Utc};
use geom::Duration;
use widgetry::{
    Choice, EventCtx, GfxCtx, HorizontalAlignment, Key, Line, Outcome, Panel, PersistentSplit,
    Text, TextExt, VerticalAlignment, Widget,
};

use tracker::{faster, slower, TrackerLayer};

const PRESETS: [(f64, &str); 4] = [(1.0, "1x"), (5.0, "5x"), (10.0, "10x"), (30.0, "30x")];

pub struct TimeControls {
    pub panel: Panel,
    time_ms: f64,
    speed: f64,
    // What "play" goes back to
    resume_speed: f64,
    step: Duration,
}

impl TimeControls {
    pub fn new(ctx: &mut EventCtx, layer: &TrackerLayer) -> Self {
        let speed = layer.get_speed();
        let mut controls = Self {
            panel: Panel::new_builder(Widget::col(vec![
                Widget::placeholder(ctx, "clock"),
                Widget::placeholder(ctx, "controls"),
            ]))
            .aligned(HorizontalAlignment::Left, VerticalAlignment::Bottom)
            .build(ctx),
            time_ms: layer.get_curr_time(),
            speed,
            resume_speed: if speed > 0.0 { speed } else { 1.0 },
            step: Duration::minutes(1),
        };
        controls.update_controls(ctx);
        controls
    }

    fn update_controls(&mut self, ctx: &mut EventCtx) {
        self.on_time_change(ctx);

        let mut row = Vec::new();
        let paused = self.speed == 0.0;
        row.push(
            ctx.style()
                .btn_outline
                .text(if paused { "play" } else { "pause" })
                .hotkey(Key::Space)
                .build_def(ctx)
                .margin_right(16),
        );
        row.push(
            Widget::custom_row(
                PRESETS
                    .iter()
                    .map(|(speed, label)| {
                        ctx.style()
                            .btn_plain
                            .text(*label)
                            .disabled(*speed == self.speed)
                            .build_def(ctx)
                    })
                    .collect(),
            )
            .margin_right(16),
        );
        row.push(
            PersistentSplit::widget(
                ctx,
                "step forwards",
                self.step,
                Key::M,
                vec![
                    Choice::new("+10m", Duration::minutes(10)),
                    Choice::new("+1m", Duration::minutes(1)),
                    Choice::new("+10s", Duration::seconds(10.0)),
                ],
            )
            .margin_right(16),
        );
        row.push(
            ctx.style()
                .btn_plain
                .text("reset to now")
                .hotkey(Key::X)
                .build_def(ctx),
        );

        self.panel.replace(ctx, "controls", Widget::custom_row(row));
    }

    fn on_time_change(&mut self, ctx: &mut EventCtx) {
        let time = match Utc.timestamp_millis_opt(self.time_ms as i64).single() {
            Some(time) => time.format("%H:%M:%S").to_string(),
            None => "--:--:--".to_string(),
        };
        let clock = Widget::row(vec![
            Text::from(Line(time).big_monospaced()).into_widget(ctx),
            format!("{}x", self.speed).text_widget(ctx).centered_vert(),
        ]);
        self.panel.replace(ctx, "clock", clock);
    }

    /// Applies any button or key presses to the layer. Returns true if the current time jumped,
    /// so the caller should redraw right away.
    pub fn event(&mut self, ctx: &mut EventCtx, layer: &mut TrackerLayer, now_ms: f64) -> bool {
        let mut jumped = false;
        let mut new_speed = None;

        match self.panel.event(ctx) {
            Outcome::Clicked(x) => match x.as_ref() {
                "play" => {
                    new_speed = Some(self.resume_speed);
                }
                "pause" => {
                    new_speed = Some(0.0);
                }
                "step forwards" => {
                    let time_ms = layer.get_curr_time() + self.step.inner_seconds() * 1000.0;
                    layer.set_curr_time(time_ms, now_ms);
                    jumped = true;
                }
                "reset to now" => {
                    layer.set_curr_time(now_ms, now_ms);
                    jumped = true;
                }
                label => {
                    new_speed = PRESETS
                        .iter()
                        .find(|(_, name)| *name == label)
                        .map(|(speed, _)| *speed);
                }
            },
            Outcome::Changed(x) => {
                if x == "step forwards" {
                    self.step = self.panel.persistent_split_value("step forwards");
                }
            }
            _ => {}
        }

        if ctx.input.pressed(Key::LeftArrow) && self.speed > 0.0 {
            new_speed = Some(slower(self.speed));
        }
        if ctx.input.pressed(Key::RightArrow) {
            new_speed = Some(if self.speed == 0.0 {
                self.resume_speed
            } else {
                faster(self.speed)
            });
        }

        if let Some(speed) = new_speed {
            if let Err(err) = layer.set_speed(speed, now_ms) {
                warn!("Couldn't change speed: {err}");
            }
        }

        if layer.get_speed() != self.speed {
            self.speed = layer.get_speed();
            if self.speed > 0.0 {
                self.resume_speed = self.speed;
            }
            self.time_ms = layer.get_curr_time();
            self.update_controls(ctx);
        } else if (layer.get_curr_time() - self.time_ms).abs() >= 1000.0 || jumped {
            // The clock only shows whole seconds
            self.time_ms = layer.get_curr_time();
            self.on_time_change(ctx);
        }

        jumped
    }

    pub fn draw(&self, g: &mut GfxCtx) {
        self.panel.draw(g);
    }
}
