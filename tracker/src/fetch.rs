use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::Trajectory;

/// Shared between the fetch cycle and whoever is doing the fetching. Workers may check it to give
/// up early; either way, a cancelled fetch never gets applied.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug)]
pub struct FetchTicket {
    generation: usize,
    pub token: CancelToken,
}

impl FetchTicket {
    pub fn generation(&self) -> usize {
        self.generation
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The store was replaced with this many trajectories
    Applied(usize),
    /// Cancelled or superseded by a newer fetch
    Discarded,
    /// The previous trajectories were kept
    Failed,
}

/// Sequences periodic snapshot fetches so a slow, stale response never overwrites a newer one.
pub struct FetchCycle {
    refresh_interval_ms: f64,
    generation: usize,
    in_flight: Option<CancelToken>,
    last_begin_ms: Option<f64>,
}

impl FetchCycle {
    pub fn new(refresh_interval_ms: f64) -> Self {
        Self {
            refresh_interval_ms,
            generation: 0,
            in_flight: None,
            last_begin_ms: None,
        }
    }

    /// True when nothing has been fetched yet, or the refresh interval has passed since the last
    /// fetch started.
    pub fn due(&self, now_ms: f64) -> bool {
        match self.last_begin_ms {
            Some(last) => now_ms - last >= self.refresh_interval_ms,
            None => true,
        }
    }

    /// Starts a new fetch, cancelling whatever's still in flight.
    pub fn begin(&mut self, now_ms: f64) -> FetchTicket {
        self.cancel();
        self.generation += 1;
        self.last_begin_ms = Some(now_ms);
        let token = CancelToken::default();
        self.in_flight = Some(token.clone());
        FetchTicket {
            generation: self.generation,
            token,
        }
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }

    /// Forget when the last fetch happened, so the next `due` is true.
    pub fn reset(&mut self) {
        self.cancel();
        self.last_begin_ms = None;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Hands a successful result to `apply`, unless the ticket is stale.
    pub fn settle<F: FnOnce(Vec<Trajectory>)>(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Trajectory>>,
        apply: F,
    ) -> FetchOutcome {
        if ticket.token.is_cancelled() || ticket.generation != self.generation {
            debug!("Discarding stale fetch #{}", ticket.generation);
            return FetchOutcome::Discarded;
        }
        self.in_flight = None;

        match result {
            Ok(trajectories) => {
                let n = trajectories.len();
                apply(trajectories);
                FetchOutcome::Applied(n)
            }
            Err(err) => {
                warn!("Fetching trajectories failed, keeping the old ones: {err}");
                FetchOutcome::Failed
            }
        }
    }
}
