use anyhow::Result;
use futures_channel::oneshot;

use tracker::feed::{self, JourneyDetails, Snapshot};
use tracker::{FetchOutcome, FetchTicket, TrackerLayer, TrajectoryId};

/// Re-reads a Trajserv snapshot from disk off the main thread. Stands in for polling a live
/// backend.
pub struct SnapshotLoader {
    path: String,
    pending: Option<(FetchTicket, oneshot::Receiver<Result<Snapshot>>)>,
    // Until the first snapshot lands, the clock jumps to the server's time
    sync_clock: bool,
}

impl SnapshotLoader {
    pub fn new(path: String, sync_clock: bool) -> Self {
        Self {
            path,
            pending: None,
            sync_clock,
        }
    }

    /// Kicks off a read if the layer wants fresh data.
    pub fn maybe_begin(&mut self, layer: &mut TrackerLayer, now_ms: f64) {
        if !layer.fetch_due(now_ms) {
            return;
        }
        let ticket = layer.begin_fetch(now_ms);
        let token = ticket.token.clone();
        let rx = read_in_background(self.path.clone(), move |bytes| {
            if token.is_cancelled() {
                bail!("Cancelled");
            }
            feed::parse_trajectories(bytes, feed::identity)
        });
        self.pending = Some((ticket, rx));
    }

    /// Hands a finished read to the layer. None while the read is still going.
    pub fn poll(&mut self, layer: &mut TrackerLayer, now_ms: f64) -> Option<FetchOutcome> {
        let (ticket, mut rx) = self.pending.take()?;
        let mut server_time_ms = None;
        let result = match rx.try_recv() {
            Ok(Some(result)) => result.map(|snapshot| {
                server_time_ms = Some(snapshot.server_time_ms);
                snapshot.trajectories
            }),
            Ok(None) => {
                self.pending = Some((ticket, rx));
                return None;
            }
            Err(_) => Err(anyhow!("Snapshot worker for {} died", self.path)),
        };
        let outcome = layer.settle_fetch(ticket, result);

        if let (FetchOutcome::Applied(_), Some(time_ms)) = (outcome, server_time_ms) {
            if self.sync_clock {
                info!("Jumping to the snapshot's server time {time_ms}");
                layer.set_curr_time(time_ms, now_ms);
                self.sync_clock = false;
            }
        }
        Some(outcome)
    }
}

/// Reads journey details for one clicked vehicle from `<dir>/<id>.json`. Stands in for the
/// backend's journey details request.
pub struct JourneyLoader {
    dir: String,
    pending: Option<(TrajectoryId, oneshot::Receiver<Result<JourneyDetails>>)>,
}

impl JourneyLoader {
    pub fn new(dir: String) -> Self {
        Self { dir, pending: None }
    }

    /// Drops any request still in flight for another vehicle.
    pub fn request(&mut self, id: TrajectoryId) {
        let path = format!("{}/{}.json", self.dir, id.0);
        let rx = read_in_background(path, |bytes| feed::parse_stations(bytes, feed::identity));
        self.pending = Some((id, rx));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// The details, once they arrive. Failures are logged and forgotten.
    pub fn poll(&mut self) -> Option<JourneyDetails> {
        let (id, mut rx) = self.pending.take()?;
        match rx.try_recv() {
            Ok(Some(Ok(details))) => Some(details),
            Ok(Some(Err(err))) => {
                warn!("No journey details for {}: {err}", id.0);
                None
            }
            Ok(None) => {
                self.pending = Some((id, rx));
                None
            }
            Err(_) => None,
        }
    }
}

fn read_in_background<T, F>(path: String, parse: F) -> oneshot::Receiver<Result<T>>
where
    T: Send + 'static,
    F: FnOnce(&[u8]) -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    spawn(move || {
        let result = fs_err::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| parse(&bytes));
        // The receiver is gone if the viewer moved on
        let _ = tx.send(result);
    });
    rx
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn<F: FnOnce() + Send + 'static>(f: F) {
    std::thread::spawn(f);
}

// No threads on web
#[cfg(target_arch = "wasm32")]
fn spawn<F: FnOnce() + Send + 'static>(f: F) {
    f();
}
