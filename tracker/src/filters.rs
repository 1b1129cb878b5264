//! Filters built from the kind of criteria a permalink or filter button carries.

use crate::{Filter, Trajectory};

/// Each argument is optional. `lines` and `route_identifiers` are comma-separated lists; a
/// trajectory passes if its name is one of the lines, its route identifier (ignoring everything
/// after the first `.`) is one of the routes, or its operator contains `operator`. All
/// comparisons ignore case. None if no criteria are given.
pub fn create_filter(
    lines: Option<&str>,
    route_identifiers: Option<&str>,
    operator: Option<&str>,
) -> Option<Filter> {
    let lines = split_list(lines);
    let routes: Vec<String> = split_list(route_identifiers)
        .iter()
        .map(|route| route_prefix(route))
        .collect();
    let operator = operator
        .map(|op| op.trim().to_lowercase())
        .filter(|op| !op.is_empty());

    if lines.is_empty() && routes.is_empty() && operator.is_none() {
        return None;
    }

    Some(Box::new(move |traj: &Trajectory| {
        if !lines.is_empty() && lines.contains(&traj.name.trim().to_lowercase()) {
            return true;
        }
        if let Some(ref route) = traj.route_identifier {
            if routes.contains(&route_prefix(route)) {
                return true;
            }
        }
        if let (Some(wanted), Some(actual)) = (&operator, &traj.operator) {
            if actual.to_lowercase().contains(wanted.as_str()) {
                return true;
            }
        }
        false
    }))
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(|x| x.trim().to_lowercase())
            .filter(|x| !x.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn route_prefix(route: &str) -> String {
    route
        .split('.')
        .next()
        .unwrap_or(route)
        .trim()
        .to_lowercase()
}
