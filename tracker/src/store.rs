use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::{Trajectory, TrajectoryId};

/// Decides whether a trajectory is drawn. Filtered trajectories still live in the store.
pub type Filter = Box<dyn Fn(&Trajectory) -> bool>;
/// Draw order; later trajectories are drawn on top.
pub type Sort = Box<dyn Fn(&Trajectory, &Trajectory) -> Ordering>;

/// The working set of trajectories, replaced wholesale every time a snapshot arrives.
#[derive(Default)]
pub struct TrajectoryStore {
    trajectories: Vec<Trajectory>,
    filter: Option<Filter>,
    sort: Option<Sort>,
}

impl TrajectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_trajectories(&mut self, mut trajectories: Vec<Trajectory>) {
        if let Some(ref sort) = self.sort {
            // sort_by is stable, so backends' own ordering breaks ties
            trajectories.sort_by(|a, b| sort(a, b));
        }
        self.trajectories = trajectories;
    }

    pub fn set_filter(&mut self, filter: Option<Filter>) {
        self.filter = filter;
    }

    pub fn set_sort(&mut self, sort: Option<Sort>) {
        self.sort = sort;
        if let Some(ref sort) = self.sort {
            self.trajectories.sort_by(|a, b| sort(a, b));
        }
    }

    pub fn passes_filter(&self, trajectory: &Trajectory) -> bool {
        match self.filter {
            Some(ref filter) => filter(trajectory),
            None => true,
        }
    }

    /// Every trajectory in draw order, including filtered ones
    pub fn all(&self) -> &[Trajectory] {
        &self.trajectories
    }

    /// Trajectories passing the filter, in draw order
    pub fn visible(&self) -> impl Iterator<Item = &Trajectory> {
        self.trajectories
            .iter()
            .filter(move |traj| self.passes_filter(traj))
    }

    pub fn get(&self, id: &TrajectoryId) -> Option<&Trajectory> {
        self.trajectories.iter().find(|traj| &traj.id == id)
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    /// Render passes update each trajectory's last position while consulting the filter.
    pub(crate) fn parts_mut(&mut self) -> (&mut [Trajectory], Option<&Filter>) {
        (&mut self.trajectories, self.filter.as_ref())
    }

    pub(crate) fn drop_expired(&mut self, expired: &BTreeSet<TrajectoryId>) {
        if expired.is_empty() {
            return;
        }
        self.trajectories.retain(|traj| !expired.contains(&traj.id));
    }
}
