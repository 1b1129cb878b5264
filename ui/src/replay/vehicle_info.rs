use chrono::{TimeZone, Utc};
use widgetry::{
    EventCtx, GfxCtx, HorizontalAlignment, Key, Line, Outcome, Panel, Text, Toggle,
    VerticalAlignment, Widget,
};

use tracker::feed::{JourneyDetails, Station};
use tracker::style::delay_text;
use tracker::{Trajectory, TrajectoryId};

/// Describes the selected vehicle, and its stops once journey details arrive.
pub struct VehicleInfo {
    pub id: TrajectoryId,
    panel: Panel,
    journey: Option<JourneyDetails>,
}

impl VehicleInfo {
    pub fn new(
        ctx: &mut EventCtx,
        traj: &Trajectory,
        journey: Option<JourneyDetails>,
        following: bool,
    ) -> Self {
        let mut txt = Text::new();
        if let Some(vehicle_type) = traj.vehicle_type {
            txt.add_line(Line(vehicle_type.describe()));
        }
        if let Some(destination) = journey.as_ref().and_then(|j| j.destination.as_ref()) {
            txt.add_line(Line(format!("Towards {destination}")));
        }
        if traj.cancelled {
            txt.add_line(Line("Cancelled").fg(widgetry::Color::RED));
        } else {
            match traj.delay_ms {
                Some(delay_ms) if delay_ms > 0.0 => {
                    txt.add_line(Line(format!("Delayed {}", delay_text(delay_ms))));
                }
                Some(_) => {
                    txt.add_line(Line("On time"));
                }
                None => {
                    txt.add_line(Line("No realtime data").secondary());
                }
            }
        }
        let operator = traj
            .operator
            .as_ref()
            .or_else(|| journey.as_ref().and_then(|j| j.operator.as_ref()));
        if let Some(operator) = operator {
            txt.add_line(Line(format!("Operated by {operator}")));
        }
        if let Some(ref route) = traj.route_identifier {
            txt.add_line(Line(format!("Route {route}")).secondary());
        }
        txt.add_line(Line(format!("ID {}", traj.id.0)).secondary());

        let title = if traj.name.is_empty() {
            "Vehicle".to_string()
        } else {
            traj.name.clone()
        };
        let mut col = vec![
            Widget::row(vec![
                Line(title).small_heading().into_widget(ctx),
                ctx.style().btn_close_widget(ctx),
            ]),
            txt.into_widget(ctx),
            Toggle::checkbox(ctx, "Follow", Key::F, following),
        ];
        if let Some(ref journey) = journey {
            let mut stops = Text::new();
            for station in &journey.stations {
                stops.add_line(stop_line(station));
            }
            col.push(stops.into_widget(ctx));
        }

        let panel = Panel::new_builder(Widget::col(col))
            .aligned(HorizontalAlignment::Right, VerticalAlignment::Top)
            .build(ctx);

        Self {
            id: traj.id.clone(),
            panel,
            journey,
        }
    }

    /// Rebuilds the panel with fresh vehicle details, keeping the stops and follow setting.
    pub fn refresh(self, ctx: &mut EventCtx, traj: &Trajectory) -> Self {
        let following = self.following();
        Self::new(ctx, traj, self.journey, following)
    }

    pub fn following(&self) -> bool {
        self.panel.is_checked("Follow")
    }

    /// True if the panel should close
    pub fn event(&mut self, ctx: &mut EventCtx) -> bool {
        if let Outcome::Clicked(x) = self.panel.event(ctx) {
            return x == "close";
        }
        false
    }

    pub fn draw(&self, g: &mut GfxCtx) {
        self.panel.draw(g);
    }
}

fn stop_line(station: &Station) -> widgetry::TextSpan {
    let (time_ms, delay_ms) = match station.arrival_time_ms {
        Some(time_ms) => (Some(time_ms), station.arrival_delay_ms),
        None => (station.departure_time_ms, station.departure_delay_ms),
    };
    let mut line = match time_ms.and_then(|t| Utc.timestamp_millis_opt(t as i64).single()) {
        Some(time) => format!("{}  {}", time.format("%H:%M"), station.name),
        None => station.name.clone(),
    };
    if let Some(delay_ms) = delay_ms.filter(|d| *d > 0.0) {
        line.push_str(&format!(" ({})", delay_text(delay_ms)));
    }
    if station.skipped {
        Line(line).secondary()
    } else {
        Line(line)
    }
}
