//! Progress sessions over a set of concurrent downloads.
//!
//! Every call to [`TransferTracker::start`] creates an independent session. Each
//! resource runs on its own task; its fraction of completion is
//! `loaded / total` while in flight (0 when the total is unknown) and exactly
//! 1.0 once it completes. The aggregate is the mean of all fractions, so it
//! reaches 100% only when every resource has completed.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TransferError;
use crate::fetcher::{Fetcher, HttpFetcher, Payload};

/// Upper bound for a resource that has every byte but has not finished yet.
const IN_FLIGHT_CAP: f64 = 1.0 - 1e-6;

#[derive(Debug, Clone)]
pub enum TransferEvent {
    Progress { url: String, fraction: f64, percent: f64 },
    Completed { url: String, payload: Payload },
    Failed { url: String, error: TransferError },
    /// Emitted once, after every resource has settled.
    AllDone { percent: f64 },
}

/// Mean of per-resource fractions as a percentage; an empty set is complete.
pub fn aggregate_percent(fractions: &[f64]) -> f64 {
    if fractions.is_empty() {
        return 100.0;
    }
    fractions.iter().sum::<f64>() / fractions.len() as f64 * 100.0
}

fn in_flight_fraction(loaded: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => (loaded as f64 / total as f64).min(IN_FLIGHT_CAP),
        _ => 0.0,
    }
}

struct SessionState {
    fractions: Vec<f64>,
    settled: usize,
}

struct Session {
    urls: Vec<String>,
    state: Mutex<SessionState>,
    progress: watch::Sender<f64>,
    events: mpsc::UnboundedSender<TransferEvent>,
}

impl Session {
    // Events are sent while holding the state lock so the stream observes
    // aggregate values in the order they were computed.
    fn record(&self, index: usize, fraction: f64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.fractions[index] = fraction;
        let percent = aggregate_percent(&state.fractions);
        self.progress.send_replace(percent);
        let _ = self.events.send(TransferEvent::Progress { url: self.urls[index].clone(), fraction, percent });
    }

    fn settle(&self, index: usize, outcome: &Result<Payload, TransferError>) {
        let url = &self.urls[index];
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(payload) => {
                state.fractions[index] = 1.0;
                let percent = aggregate_percent(&state.fractions);
                self.progress.send_replace(percent);
                let _ = self.events.send(TransferEvent::Progress { url: url.clone(), fraction: 1.0, percent });
                let _ = self.events.send(TransferEvent::Completed { url: url.clone(), payload: Arc::clone(payload) });
                debug!(url = %url, bytes = payload.len(), "download completed");
            }
            Err(error) => {
                warn!(url = %url, status = error.status(), %error, "download failed");
                let _ = self.events.send(TransferEvent::Failed { url: url.clone(), error: error.clone() });
            }
        }
        state.settled += 1;
        if state.settled == state.fractions.len() {
            let percent = aggregate_percent(&state.fractions);
            let _ = self.events.send(TransferEvent::AllDone { percent });
        }
    }
}

/// Handed to a [`Fetcher`] to report byte progress for one resource.
#[derive(Clone)]
pub struct ProgressSink {
    session: Option<Arc<Session>>,
    index: usize,
}

impl ProgressSink {
    /// A sink that drops every update, for fetches outside a session.
    pub fn detached() -> Self {
        Self { session: None, index: 0 }
    }

    pub fn update(&self, loaded: u64, total: Option<u64>) {
        if let Some(session) = &self.session {
            session.record(self.index, in_flight_fraction(loaded, total));
        }
    }
}

pub struct ResourceHandle {
    url: String,
    task: JoinHandle<Result<Payload, TransferError>>,
}

impl ResourceHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn join(self) -> Result<Payload, TransferError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransferError::Aborted { url: self.url }),
        }
    }
}

pub struct TransferMonitor {
    progress: watch::Receiver<f64>,
    events: mpsc::UnboundedReceiver<TransferEvent>,
}

impl TransferMonitor {
    pub fn percent(&self) -> f64 {
        *self.progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    /// Next event in emission order; `None` once the session is gone and drained.
    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    /// Drains events until the terminal one and returns its aggregate percentage.
    pub async fn wait_all_done(&mut self) -> Option<f64> {
        while let Some(event) = self.events.recv().await {
            if let TransferEvent::AllDone { percent } = event {
                return Some(percent);
            }
        }
        None
    }
}

pub struct TransferSession {
    handles: Vec<ResourceHandle>,
    monitor: TransferMonitor,
}

impl TransferSession {
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(ResourceHandle::url)
    }

    pub fn monitor(&self) -> &TransferMonitor {
        &self.monitor
    }

    pub fn into_parts(self) -> (Vec<ResourceHandle>, TransferMonitor) {
        (self.handles, self.monitor)
    }

    /// Waits for every resource and returns each outcome in request order.
    pub async fn join_all(self) -> Vec<(String, Result<Payload, TransferError>)> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let url = handle.url.clone();
            outcomes.push((url, handle.join().await));
        }
        outcomes
    }

    /// Like [`TransferSession::join_all`] but fails with the first error in
    /// request order. Siblings are still awaited, never cancelled.
    pub async fn try_join_all(self) -> Result<Vec<(String, Payload)>, TransferError> {
        self.join_all()
            .await
            .into_iter()
            .map(|(url, outcome)| outcome.map(|payload| (url, payload)))
            .collect()
    }
}

#[derive(Clone)]
pub struct TransferTracker {
    fetcher: Arc<dyn Fetcher>,
}

impl TransferTracker {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub fn http() -> Result<Self, TransferError> {
        Ok(Self::new(Arc::new(HttpFetcher::new()?)))
    }

    /// Starts one task per URL. Must be called inside a tokio runtime.
    pub fn start<I, S>(&self, urls: I) -> TransferSession
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        let initial = if urls.is_empty() { 100.0 } else { 0.0 };
        let (progress_tx, progress_rx) = watch::channel(initial);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if urls.is_empty() {
            let _ = events_tx.send(TransferEvent::AllDone { percent: 100.0 });
        }

        let session = Arc::new(Session {
            urls: urls.clone(),
            state: Mutex::new(SessionState { fractions: vec![0.0; urls.len()], settled: 0 }),
            progress: progress_tx,
            events: events_tx,
        });

        let handles = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| {
                let fetcher = Arc::clone(&self.fetcher);
                let session = Arc::clone(&session);
                let task_url = url.clone();
                let task = tokio::spawn(async move {
                    let sink = ProgressSink { session: Some(Arc::clone(&session)), index };
                    let outcome = AssertUnwindSafe(fetcher.fetch(&task_url, &sink))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(TransferError::Aborted { url: task_url.clone() }))
                        .map(Payload::from);
                    session.settle(index, &outcome);
                    outcome
                });
                ResourceHandle { url, task }
            })
            .collect();

        TransferSession { handles, monitor: TransferMonitor { progress: progress_rx, events: events_rx } }
    }
}
