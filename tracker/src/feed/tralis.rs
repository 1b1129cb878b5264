//! The Tralis websocket feed pushes one vehicle at a time, and separately announces vehicles that
//! are gone. This keeps the merged working list the tracker gets replaced with.

use anyhow::Result;
use geojson::Feature;
use serde::Deserialize;
use serde_json::Value;

use super::{color_from_hex, id_from_json, vehicle_type_from_json, Projection};
use crate::{Breakpoint, Trajectory, TrajectoryId};

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    timestamp: f64,
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize)]
struct Properties {
    train_id: Value,
    line: Option<Line>,
    #[serde(rename = "type", default)]
    vehicle_type: Value,
    /// `[time_ms, fraction, rotation in radians]`, the rotation often null
    #[serde(default)]
    time_intervals: Vec<Vec<Option<f64>>>,
    delay: Option<f64>,
    #[serde(default)]
    cancelled: bool,
    operator: Option<String>,
    route_identifier: Option<String>,
    time_since_update: Option<f64>,
}

#[derive(Deserialize)]
struct Line {
    name: Option<String>,
    color: Option<String>,
    text_color: Option<String>,
}

pub struct TralisFeed {
    project: Projection,
    trajectories: Vec<Trajectory>,
}

impl TralisFeed {
    pub fn new(project: Projection) -> Self {
        Self {
            project,
            trajectories: Vec::new(),
        }
    }

    /// Merges one trajectory message. Returns true if the working list changed.
    pub fn on_message(&mut self, raw: &str, now_ms: f64) -> Result<bool> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        if envelope.content.is_null() {
            return Ok(false);
        }
        let feature = Feature::from_json_value(envelope.content)?;
        let props: Properties = match feature.properties {
            Some(ref props) => serde_json::from_value(Value::Object(props.clone()))?,
            None => bail!("Trajectory message without properties"),
        };

        // Old events arrive out of order sometimes
        if props.time_since_update.map(|t| t < 0.0).unwrap_or(false) {
            debug!("Ignoring an outdated trajectory message");
            return Ok(false);
        }

        let id = id_from_json(&props.train_id)
            .ok_or_else(|| anyhow!("Trajectory message without a train_id"))?;
        let geometry = self.geometry(&feature)?;
        let time_intervals = props
            .time_intervals
            .iter()
            .filter_map(|entry| {
                let time_ms = (*entry.first()?)?;
                let fraction = (*entry.get(1)?)?;
                let mut bp = Breakpoint::new(time_ms, fraction);
                bp.rotation = entry.get(2).copied().flatten().map(|r| r.to_degrees());
                Some(bp)
            })
            .collect();

        let mut traj = Trajectory::new(id.clone(), geometry, time_intervals);
        traj.vehicle_type = vehicle_type_from_json(&props.vehicle_type);
        traj.delay_ms = props.delay;
        traj.cancelled = props.cancelled;
        traj.operator = props.operator;
        traj.route_identifier = props.route_identifier;
        traj.time_offset_ms = now_ms - envelope.timestamp;
        let has_line = props.line.is_some();
        if let Some(line) = props.line {
            traj.name = line.name.unwrap_or_default();
            traj.color = color_from_hex(line.color.as_deref());
            traj.text_color = color_from_hex(line.text_color.as_deref());
        }
        traj.validate()?;

        self.remove(&id);
        // Vehicles without a line go first, so they're drawn underneath everything else
        if has_line {
            self.trajectories.push(traj);
        } else {
            self.trajectories.insert(0, traj);
        }
        Ok(true)
    }

    /// Handles a deleted vehicle message. Returns true if the working list changed.
    pub fn on_deleted(&mut self, raw: &str) -> Result<bool> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        match id_from_json(&envelope.content) {
            Some(id) => Ok(self.remove(&id)),
            None => Ok(false),
        }
    }

    pub fn remove(&mut self, id: &TrajectoryId) -> bool {
        let before = self.trajectories.len();
        self.trajectories.retain(|traj| &traj.id != id);
        before != self.trajectories.len()
    }

    /// The whole working list, for replacing the tracker's
    pub fn trajectories(&self) -> Vec<Trajectory> {
        self.trajectories.clone()
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    fn geometry(&self, feature: &Feature) -> Result<Vec<geom::Pt2D>> {
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| anyhow!("Trajectory message without geometry"))?;
        let positions = match geometry.value {
            geojson::Value::LineString(ref pts) => pts.clone(),
            geojson::Value::Point(ref pt) => vec![pt.clone()],
            _ => bail!("Trajectory geometry isn't a LineString"),
        };
        Ok(positions
            .into_iter()
            .filter_map(|pos| match pos.as_slice() {
                [x, y, ..] => (self.project)(*x, *y),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::feed::identity;
    use crate::style::{Color, VehicleType};

    fn message(train_id: &str, line: Option<&str>, time_since_update: f64) -> String {
        let line = line.map(|name| {
            json!({ "name": name, "color": "#ff0000", "text_color": "#ffffff" })
        });
        json!({
            "timestamp": 1000,
            "content": {
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [100.0, 0.0]] },
                "properties": {
                    "train_id": train_id,
                    "line": line,
                    "type": "rail",
                    "time_intervals": [[1000, 0.0, null], [2000, 1.0, 3.141592653589793]],
                    "delay": 120000,
                    "operator": "SBB",
                    "route_identifier": "01.000",
                    "time_since_update": time_since_update
                }
            }
        })
        .to_string()
    }

    fn ids(feed: &TralisFeed) -> Vec<String> {
        feed.trajectories().into_iter().map(|t| t.id.0).collect()
    }

    #[test]
    fn decodes_a_message() {
        let mut feed = TralisFeed::new(Box::new(identity));
        assert!(feed.on_message(&message("a", Some("S1"), 0.0), 1500.0).unwrap());

        let list = feed.trajectories();
        let traj = &list[0];
        assert_eq!(traj.name, "S1");
        assert_eq!(traj.vehicle_type, Some(VehicleType::Rail));
        assert_eq!(traj.color, Some(Color::rgb(255, 0, 0)));
        assert_eq!(traj.text_color, Some(Color::WHITE));
        assert_eq!(traj.time_offset_ms, 500.0);
        assert_eq!(traj.delay_ms, Some(120000.0));
        assert_eq!(traj.operator.as_deref(), Some("SBB"));
        assert_eq!(traj.geometry.len(), 2);
        assert_eq!(traj.time_intervals.len(), 2);
        assert_eq!(traj.time_intervals[0].rotation, None);
        let rotation = traj.time_intervals[1].rotation.unwrap();
        assert!((rotation - 180.0).abs() < 1e-9);
    }

    #[test]
    fn merging() {
        let mut feed = TralisFeed::new(Box::new(identity));
        feed.on_message(&message("a", Some("S1"), 0.0), 0.0).unwrap();
        feed.on_message(&message("b", Some("S2"), 0.0), 0.0).unwrap();
        // No line, so it goes underneath
        feed.on_message(&message("c", None, 0.0), 0.0).unwrap();
        assert_eq!(ids(&feed), vec!["c", "a", "b"]);

        // Updates replace, and move to the top
        feed.on_message(&message("a", Some("S1"), 0.0), 0.0).unwrap();
        assert_eq!(ids(&feed), vec!["c", "b", "a"]);

        // Stale updates are ignored
        assert!(!feed.on_message(&message("b", Some("S9"), -1.0), 0.0).unwrap());
        assert_eq!(feed.trajectories()[1].name, "S2");

        assert!(feed.on_deleted(r#"{"content": "c"}"#).unwrap());
        assert!(!feed.on_deleted(r#"{"content": "nope"}"#).unwrap());
        assert_eq!(ids(&feed), vec!["b", "a"]);
    }

    #[test]
    fn bad_messages() {
        let mut feed = TralisFeed::new(Box::new(identity));
        assert!(!feed.on_message(r#"{"timestamp": 1, "content": null}"#, 0.0).unwrap());
        assert!(feed.on_message("{", 0.0).is_err());
        let no_geometry = json!({
            "timestamp": 1,
            "content": { "type": "Feature", "geometry": null, "properties": { "train_id": "x" } }
        })
        .to_string();
        assert!(feed.on_message(&no_geometry, 0.0).is_err());
        assert!(feed.is_empty());
    }
}
