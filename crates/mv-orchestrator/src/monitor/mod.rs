//! Connectivity monitor
//!
//! Turns raw OS network callbacks into a debounced two-value
//! [`ConnectivitySignal`]. Each call to [`NetworkMonitor::observe`] registers
//! a fresh OS observer; dropping the returned stream unregisters it and
//! stops the worker task.

mod static_source;
mod tracker;

pub use static_source::StaticNetworkSource;
pub use tracker::InterfaceTracker;

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use mv_core::config::MonitorConfig;
use mv_core::traits::{NetworkEvent, NetworkEventSource, ObserverRegistration};
use mv_core::ConnectivitySignal;

/// Debounced connectivity observer
#[derive(Clone)]
pub struct NetworkMonitor {
    source: Arc<dyn NetworkEventSource>,
    debounce: Duration,
}

impl NetworkMonitor {
    pub fn new(source: Arc<dyn NetworkEventSource>, config: &MonitorConfig) -> Self {
        Self::with_debounce(source, config.debounce)
    }

    pub fn with_debounce(source: Arc<dyn NetworkEventSource>, debounce: Duration) -> Self {
        Self { source, debounce }
    }

    /// Start observing connectivity
    ///
    /// The first item reflects the state at subscription time and is
    /// available immediately. Must be called from within a tokio runtime.
    pub fn observe(&self) -> ConnectivityStream {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        // Register before the snapshot so no callback falls in between
        let registration = self.source.register(event_tx);
        let tracker = InterfaceTracker::from_snapshot(&self.source.snapshot());
        let initial = tracker.signal(self.source.default_route());
        let _ = out_tx.send(initial);
        tracing::debug!(signal = %initial, "Connectivity observer registered");

        let cancel = CancellationToken::new();
        let worker = MonitorWorker {
            source: self.source.clone(),
            tracker,
            debounce: self.debounce,
            last: initial,
            pending: None,
        };
        tokio::spawn(worker.run(event_rx, out_tx, cancel.clone()));

        ConnectivityStream {
            inner: UnboundedReceiverStream::new(out_rx),
            _registration: registration,
            _worker: cancel.drop_guard(),
        }
    }
}

/// Stream of connectivity changes; never yields the same value twice in a row
pub struct ConnectivityStream {
    inner: UnboundedReceiverStream<ConnectivitySignal>,
    _registration: ObserverRegistration,
    _worker: DropGuard,
}

impl Stream for ConnectivityStream {
    type Item = ConnectivitySignal;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

struct MonitorWorker {
    source: Arc<dyn NetworkEventSource>,
    tracker: InterfaceTracker,
    debounce: Duration,
    /// Last delivered value
    last: ConnectivitySignal,
    /// Candidate value and the instant it becomes deliverable
    pending: Option<(ConnectivitySignal, Instant)>,
}

impl MonitorWorker {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<NetworkEvent>,
        out: mpsc::UnboundedSender<ConnectivitySignal>,
        cancel: CancellationToken,
    ) {
        let mut source_open = true;

        loop {
            let deadline = self.pending.map(|(_, at)| at);
            let settle = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now));

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = settle, if deadline.is_some() => {
                    if let Some((value, _)) = self.pending.take() {
                        if !self.deliver(&out, value) {
                            break;
                        }
                    }
                }
                event = events.recv(), if source_open => {
                    let Some(event) = event else {
                        tracing::debug!("Network source closed its callback channel");
                        source_open = false;
                        continue;
                    };
                    if !self.handle(&out, event) {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Connectivity observer stopped");
    }

    /// Returns false once nobody is listening
    fn handle(
        &mut self,
        out: &mpsc::UnboundedSender<ConnectivitySignal>,
        event: NetworkEvent,
    ) -> bool {
        tracing::trace!(?event, "Network callback");
        let airplane_on = matches!(event, NetworkEvent::AirplaneMode(true));
        self.tracker.apply(&event);

        if airplane_on && self.tracker.airplane_forced() {
            self.pending = None;
            return self.deliver(out, ConnectivitySignal::Disconnected);
        }

        let candidate = self.tracker.signal(self.source.default_route());
        if candidate == self.last {
            // Flapped back inside the quiet window
            self.pending = None;
        } else if self.pending.map(|(value, _)| value) != Some(candidate) {
            self.pending = Some((candidate, Instant::now() + self.debounce));
        }
        true
    }

    fn deliver(
        &mut self,
        out: &mpsc::UnboundedSender<ConnectivitySignal>,
        value: ConnectivitySignal,
    ) -> bool {
        if value == self.last {
            return true;
        }
        self.last = value;
        tracing::info!(signal = %value, "Connectivity changed");
        out.send(value).is_ok()
    }
}
