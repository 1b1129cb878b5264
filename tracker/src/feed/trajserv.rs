//! The polling Trajserv API: periodic snapshots of every vehicle in a bounding box, plus journey
//! details for one vehicle on request.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use geom::{Bounds, Pt2D};
use serde::Deserialize;
use serde_json::Value;

use super::{color_from_hex, id_from_json, truthy, vehicle_type_from_json};
use crate::style::{Color, VehicleType};
use crate::{Breakpoint, Trajectory, TrajectoryId};

/// How far past the current time each request asks for, at 1x speed
const WINDOW_MS: f64 = 20_000.0;
/// Start a new window once the clock gets this close to the end of the old one, at 1x speed
const WINDOW_SLACK_MS: f64 = 3_000.0;

pub struct Snapshot {
    pub server_time_ms: f64,
    pub time_offset_ms: f64,
    pub trajectories: Vec<Trajectory>,
}

#[derive(Deserialize)]
struct RawSnapshot {
    t: f64,
    o: Option<f64>,
    #[serde(default)]
    a: Vec<RawTrajectory>,
}

#[derive(Deserialize)]
struct RawTrajectory {
    i: Value,
    #[serde(default)]
    t: Value,
    n: Option<String>,
    c: Option<String>,
    tc: Option<String>,
    #[serde(default)]
    p: Vec<Vec<RawPoint>>,
}

#[derive(Deserialize)]
struct RawPoint {
    x: f64,
    y: f64,
    /// Seconds when the vehicle passes this point
    a: Option<f64>,
    /// Seconds the vehicle dwells here
    d: Option<f64>,
}

/// Decodes one snapshot. Vehicles that can't be placed are skipped, never fatal.
pub fn parse_trajectories<F: Fn(f64, f64) -> Option<Pt2D>>(
    bytes: &[u8],
    project: F,
) -> Result<Snapshot> {
    let raw: RawSnapshot = serde_json::from_slice(bytes)?;
    let time_offset_ms = raw.o.unwrap_or(0.0);

    let mut trajectories = Vec::new();
    for raw_traj in raw.a {
        let id = match id_from_json(&raw_traj.i) {
            Some(id) => id,
            None => {
                warn!("Skipping a trajectory with no ID");
                continue;
            }
        };
        if let Some(mut traj) = build_trajectory(id, &raw_traj, &project) {
            traj.time_offset_ms = time_offset_ms;
            trajectories.push(traj);
        }
    }

    Ok(Snapshot {
        server_time_ms: raw.t * 1000.0,
        time_offset_ms,
        trajectories,
    })
}

fn build_trajectory<F: Fn(f64, f64) -> Option<Pt2D>>(
    id: TrajectoryId,
    raw: &RawTrajectory,
    project: &F,
) -> Option<Trajectory> {
    // Paths are drawn as one line
    let mut geometry = Vec::new();
    // (coordinate index, seconds, dwell seconds)
    let mut samples = Vec::new();
    for pt in raw.p.iter().flatten() {
        let projected = match project(pt.x, pt.y) {
            Some(projected) => projected,
            None => continue,
        };
        geometry.push(projected);
        if let Some(secs) = pt.a {
            samples.push((geometry.len() - 1, secs, pt.d));
        }
    }
    if geometry.is_empty() {
        debug!("Trajectory {id} has no coordinates");
        return None;
    }

    let fractions = distance_fractions(&geometry);
    let mut time_intervals = Vec::new();
    for (idx, secs, dwell) in samples {
        let mut bp = Breakpoint::new(secs * 1000.0, fractions[idx]);
        bp.coord_index = Some(idx);
        time_intervals.push(bp);
        if let Some(dwell) = dwell.filter(|d| *d > 0.0) {
            bp.time_ms = (secs + dwell) * 1000.0;
            time_intervals.push(bp);
        }
    }

    let mut traj = Trajectory::new(id, geometry, time_intervals);
    traj.vehicle_type = vehicle_type_from_json(&raw.t);
    traj.name = raw.n.clone().unwrap_or_default();
    traj.color = color_from_hex(raw.c.as_deref());
    traj.text_color = color_from_hex(raw.tc.as_deref());
    if let Err(err) = traj.validate() {
        warn!("Skipping trajectory: {err}");
        return None;
    }
    Some(traj)
}

/// How far along the whole line each coordinate sits, from 0 to 1
fn distance_fractions(pts: &[Pt2D]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(pts.len());
    let mut total = 0.0;
    for (idx, pt) in pts.iter().enumerate() {
        if idx > 0 {
            total += pts[idx - 1].dist_to(*pt).inner_meters();
        }
        cumulative.push(total);
    }
    if total == 0.0 {
        return vec![0.0; pts.len()];
    }
    cumulative.into_iter().map(|x| x / total).collect()
}

/// Builds snapshot query parameters. Remembers the end of the requested time window, so that
/// consecutive requests ask for the same window until playback approaches its end.
#[derive(Default)]
pub struct TrajservRequest {
    window_end_ms: Option<f64>,
}

impl TrajservRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(
        &mut self,
        extent: &Bounds,
        zoom: f64,
        time_ms: f64,
        speed: f64,
    ) -> Result<Vec<(&'static str, String)>> {
        let end_ms = match self.window_end_ms {
            Some(end) if time_ms <= end - WINDOW_SLACK_MS * speed => end,
            _ => time_ms + WINDOW_MS * speed,
        };
        self.window_end_ms = Some(end_ms);

        let buffer = (extent.max_x - extent.min_x) / 10.0;
        let bbox = [
            extent.min_x - buffer,
            extent.min_y - buffer,
            extent.max_x + buffer,
            extent.max_y + buffer,
        ]
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(",");

        let begin = utc(time_ms)?;
        let end = utc(end_ms)?;
        let simplify = if zoom < 10.0 { "1" } else { "0" };
        Ok(vec![
            ("bbox", bbox),
            ("btime", begin.format("%H:%M:%S%.3f").to_string()),
            ("etime", end.format("%H:%M:%S%.3f").to_string()),
            ("date", begin.format("%Y%m%d").to_string()),
            ("rid", "1".to_string()),
            ("a", "1".to_string()),
            ("cd", "1".to_string()),
            ("nm", "1".to_string()),
            ("fl", "1".to_string()),
            ("s", simplify.to_string()),
            ("z", zoom.to_string()),
        ])
    }

    /// Forget the window, after a jump in time.
    pub fn reset(&mut self) {
        self.window_end_ms = None;
    }
}

fn utc(time_ms: f64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(time_ms as i64)
        .single()
        .ok_or_else(|| anyhow!("{time_ms} isn't a valid time"))
}

/// Everything about one journey, shown once a vehicle is clicked.
#[derive(Clone, Debug, PartialEq)]
pub struct JourneyDetails {
    pub id: TrajectoryId,
    pub destination: Option<String>,
    pub vehicle_type: Option<VehicleType>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub color: Option<Color>,
    pub text_color: Option<Color>,
    pub wheelchair_accessible: bool,
    pub bicycles_allowed: bool,
    pub real_time: bool,
    pub stations: Vec<Station>,
    pub operator: Option<String>,
    pub operator_url: Option<String>,
    pub operator_timezone: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Station {
    pub id: Option<String>,
    pub name: String,
    pub coordinate: Option<Pt2D>,
    pub arrival_time_ms: Option<f64>,
    pub departure_time_ms: Option<f64>,
    pub arrival_delay_ms: Option<f64>,
    pub departure_delay_ms: Option<f64>,
    /// The vehicle doesn't stop here after all
    pub skipped: bool,
}

#[derive(Deserialize)]
struct RawJourney {
    id: Value,
    hs: Option<String>,
    #[serde(default)]
    t: Value,
    ln: Option<String>,
    sn: Option<String>,
    c: Option<String>,
    tc: Option<String>,
    #[serde(default)]
    wa: Value,
    #[serde(default)]
    ba: Value,
    #[serde(default)]
    rt: Value,
    #[serde(default)]
    sts: Vec<RawStation>,
    a: Option<RawOperator>,
}

#[derive(Deserialize)]
struct RawStation {
    #[serde(default)]
    sid: Value,
    #[serde(default)]
    n: String,
    p: Option<Vec<f64>>,
    at: Option<f64>,
    dt: Option<f64>,
    ad: Option<f64>,
    dd: Option<f64>,
    #[serde(default)]
    c: Value,
}

#[derive(Deserialize)]
struct RawOperator {
    n: Option<String>,
    u: Option<String>,
    tz: Option<String>,
}

/// Decodes a journey details ("trajstations") response.
pub fn parse_stations<F: Fn(f64, f64) -> Option<Pt2D>>(
    bytes: &[u8],
    project: F,
) -> Result<JourneyDetails> {
    let raw: RawJourney = serde_json::from_slice(bytes)?;
    let id = id_from_json(&raw.id).ok_or_else(|| anyhow!("Journey details without an ID"))?;

    let stations = raw
        .sts
        .into_iter()
        .map(|st| Station {
            id: id_from_json(&st.sid).map(|id| id.0),
            name: st.n,
            coordinate: match st.p.as_deref() {
                Some([x, y]) => project(*x, *y),
                _ => None,
            },
            arrival_time_ms: st.at,
            departure_time_ms: st.dt,
            arrival_delay_ms: st.ad,
            departure_delay_ms: st.dd,
            skipped: truthy(&st.c),
        })
        .collect();

    let (operator, operator_url, operator_timezone) = match raw.a {
        Some(op) => (op.n, op.u, op.tz),
        None => (None, None, None),
    };

    Ok(JourneyDetails {
        id,
        destination: raw.hs,
        vehicle_type: vehicle_type_from_json(&raw.t),
        long_name: raw.ln,
        short_name: raw.sn,
        color: color_from_hex(raw.c.as_deref()),
        text_color: color_from_hex(raw.tc.as_deref()),
        wheelchair_accessible: truthy(&raw.wa),
        bicycles_allowed: truthy(&raw.ba),
        real_time: truthy(&raw.rt),
        stations,
        operator,
        operator_url,
        operator_timezone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::identity;
    use crate::InterpolationOptions;

    const SNAPSHOT: &str = r#"{
        "t": 1600000000,
        "o": 250,
        "a": [
            {
                "i": 17,
                "t": 3,
                "n": "5",
                "c": "ea0000",
                "p": [
                    [
                        { "x": 0, "y": 0, "a": 1600000000 },
                        { "x": 100, "y": 0 }
                    ],
                    [
                        { "x": 100, "y": 100, "a": 1600000010, "d": 5 },
                        { "x": 0, "y": 100, "a": 1600000020 }
                    ]
                ]
            },
            { "i": "empty", "t": "Bus", "p": [] },
            {
                "i": "backwards",
                "p": [[
                    { "x": 0, "y": 0, "a": 1600000010 },
                    { "x": 10, "y": 0, "a": 1600000000 }
                ]]
            }
        ]
    }"#;

    #[test]
    fn snapshot() {
        let snapshot = parse_trajectories(SNAPSHOT.as_bytes(), identity).unwrap();
        assert_eq!(snapshot.server_time_ms, 1_600_000_000_000.0);
        assert_eq!(snapshot.time_offset_ms, 250.0);
        assert_eq!(snapshot.trajectories.len(), 1);

        let traj = &snapshot.trajectories[0];
        assert_eq!(traj.id.0, "17");
        assert_eq!(traj.vehicle_type, Some(VehicleType::Bus));
        assert_eq!(traj.color, Some(Color::rgb(234, 0, 0)));
        assert_eq!(traj.time_offset_ms, 250.0);
        assert_eq!(traj.geometry.len(), 4);

        let times: Vec<f64> = traj.time_intervals.iter().map(|bp| bp.time_ms).collect();
        assert_eq!(
            times,
            vec![
                1_600_000_000_000.0,
                1_600_000_010_000.0,
                1_600_000_015_000.0,
                1_600_000_020_000.0
            ]
        );
        let fractions: Vec<f64> = traj.time_intervals.iter().map(|bp| bp.fraction).collect();
        assert_eq!(fractions, vec![0.0, 2.0 / 3.0, 2.0 / 3.0, 1.0]);
        let coords: Vec<Option<usize>> =
            traj.time_intervals.iter().map(|bp| bp.coord_index).collect();
        assert_eq!(coords, vec![Some(0), Some(2), Some(2), Some(3)]);
    }

    #[test]
    fn dwelling_at_a_station() {
        let snapshot = parse_trajectories(SNAPSHOT.as_bytes(), identity).unwrap();
        let traj = &snapshot.trajectories[0];
        let opts = InterpolationOptions::default();

        let offset = traj.time_offset_ms;
        let pos = traj
            .position_at(1_600_000_012_000.0 + offset, &opts)
            .unwrap();
        assert_eq!(pos.pt, Pt2D::new(100.0, 100.0));

        // Halfway through the first segment, which passes through the unsampled corner
        let pos = traj
            .position_at(1_600_000_005_000.0 + offset, &opts)
            .unwrap();
        assert_eq!(pos.pt, Pt2D::new(100.0, 0.0));
    }

    #[test]
    fn projection_can_drop_points() {
        let snapshot = parse_trajectories(SNAPSHOT.as_bytes(), |x, y| {
            if y > 0.0 {
                None
            } else {
                identity(x, y)
            }
        })
        .unwrap();
        assert_eq!(snapshot.trajectories[0].geometry.len(), 2);
        assert_eq!(snapshot.trajectories[0].time_intervals.len(), 1);
    }

    #[test]
    fn malformed() {
        assert!(parse_trajectories(b"{\"a\": []}", identity).is_err());
        assert!(parse_trajectories(b"not json", identity).is_err());
    }

    fn get(params: &[(&'static str, String)], key: &str) -> String {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .unwrap()
    }

    #[test]
    fn request_window() {
        let extent = Bounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 1000.0,
            max_y: 500.0,
        };
        let mut req = TrajservRequest::new();
        // 2020-09-13 12:26:40 UTC
        let t = 1_600_000_000_000.0;
        let params = req.params(&extent, 12.0, t, 1.0).unwrap();
        assert_eq!(get(&params, "bbox"), "-100,-100,1100,600");
        assert_eq!(get(&params, "btime"), "12:26:40.000");
        assert_eq!(get(&params, "etime"), "12:27:00.000");
        assert_eq!(get(&params, "date"), "20200913");
        assert_eq!(get(&params, "s"), "0");
        assert_eq!(get(&params, "z"), "12");

        // Same window until within 3s of its end
        let params = req.params(&extent, 9.0, t + 10_000.0, 1.0).unwrap();
        assert_eq!(get(&params, "etime"), "12:27:00.000");
        assert_eq!(get(&params, "s"), "1");
        let params = req.params(&extent, 9.0, t + 17_500.0, 1.0).unwrap();
        assert_eq!(get(&params, "etime"), "12:27:17.500");
    }

    #[test]
    fn journey_details() {
        let raw = r#"{
            "id": "sbb_1",
            "hs": "Bern",
            "t": "Train",
            "ln": "InterCity 61",
            "sn": "IC 61",
            "c": "ff0000",
            "tc": "ffffff",
            "wa": 1,
            "ba": 0,
            "rt": true,
            "sts": [
                { "sid": 8507000, "n": "Bern", "p": [10, 20], "at": 1000, "ad": 60000 },
                { "sid": "8503000", "n": "Zürich HB", "dt": 5000, "c": 1 }
            ],
            "a": { "n": "SBB", "u": "https://www.sbb.ch", "tz": "Europe/Zurich" }
        }"#;
        let details = parse_stations(raw.as_bytes(), identity).unwrap();
        assert_eq!(details.id.0, "sbb_1");
        assert_eq!(details.destination.as_deref(), Some("Bern"));
        assert_eq!(details.vehicle_type, Some(VehicleType::Train));
        assert_eq!(details.color, Some(Color::rgb(255, 0, 0)));
        assert!(details.wheelchair_accessible);
        assert!(!details.bicycles_allowed);
        assert!(details.real_time);
        assert_eq!(details.operator.as_deref(), Some("SBB"));
        assert_eq!(details.operator_timezone.as_deref(), Some("Europe/Zurich"));

        assert_eq!(details.stations.len(), 2);
        let bern = &details.stations[0];
        assert_eq!(bern.id.as_deref(), Some("8507000"));
        assert_eq!(bern.coordinate, Some(Pt2D::new(10.0, 20.0)));
        assert_eq!(bern.arrival_delay_ms, Some(60000.0));
        assert!(!bern.skipped);
        assert!(details.stations[1].skipped);
        assert_eq!(details.stations[1].coordinate, None);
    }
}
