//! Session orchestrator
//!
//! Owns the canonical tunnel state machine. The visible `tunnel_state` is
//! always the backend-confirmed state; what the user asked for is tracked
//! privately and only used to suppress duplicate commands and to restart an
//! always-on tunnel when connectivity returns.

mod compat;
mod reconciler;

pub use compat::is_network_compatible;

use futures::future;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use mv_core::config::ClientConfig;
use mv_core::traits::{Backend, TunnelEventStream};
use mv_core::types::{BackendInfo, ConnectivitySignal, ErrorCategory, TunnelCommand};
use mv_core::{BackendError, SessionError, SessionState, TunnelState};

use crate::retry::RetryPolicy;
use reconciler::{Reconciler, SessionInput, SessionUpdate};

/// Capacity of the reconciler input queue
const INPUT_CHANNEL_CAPACITY: usize = 256;

/// Handshake, subscribe, then read the state so no transition is missed
async fn resubscribe(
    backend: &dyn Backend,
    client_version: &str,
) -> Result<(TunnelState, bool, TunnelEventStream), BackendError> {
    let info = backend.handshake().await?;
    let events = backend.tunnel_events().await?;
    let state = backend.get_state().await?;
    Ok((state, is_network_compatible(client_version, &info), events))
}

/// Result of an accepted tunnel command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Sent to the backend
    Dispatched,
    /// Same command already in flight; nothing sent
    AlreadyPending,
}

/// Replay-latest-then-live stream of session snapshots
pub type SessionStateStream = WatchStream<SessionState>;

/// Handle to the session orchestrator
///
/// Cheap to clone. The reconciler task stops when [`shutdown`](Self::shutdown)
/// is called or the last handle is dropped.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    retry: RetryPolicy,
    client_version: String,
    state_rx: watch::Receiver<SessionState>,
    input_tx: mpsc::Sender<SessionInput>,
    events_attached: AtomicBool,
    cancel: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SessionOrchestrator {
    /// Create the orchestrator and start its reconciler task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        let retry = RetryPolicy::from_config(&config.backend);
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let reconciler = Reconciler::new(
            backend.clone(),
            retry.clone(),
            config.session.clone(),
            state_tx,
            input_tx.clone(),
        );
        tokio::spawn(reconciler.run(input_rx, cancel.clone()));

        Self {
            inner: Arc::new(Inner {
                backend,
                retry,
                client_version: config.user_agent.version.clone(),
                state_rx,
                input_tx,
                events_attached: AtomicBool::new(false),
                cancel,
            }),
        }
    }

    /// Handshake with the backend and start following its events
    ///
    /// Sets `is_initialized` on success. Safe to call again after a failure.
    #[instrument(skip_all)]
    pub async fn initialize(&self) -> Result<BackendInfo, SessionError> {
        let backend = &self.inner.backend;
        let info = self.inner.retry.run("handshake", || backend.handshake()).await?;
        tracing::info!(
            transport = %backend.transport(),
            daemon = %info.version,
            environment = %info.environment,
            "Backend handshake complete"
        );

        if !self.inner.events_attached.swap(true, Ordering::SeqCst) {
            match self.inner.retry.run("subscribe", || backend.tunnel_events()).await {
                Ok(events) => self.follow_backend(events),
                Err(e) => {
                    self.inner.events_attached.store(false, Ordering::SeqCst);
                    return Err(e.into());
                }
            }
        }

        let state = backend.get_state().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read tunnel state, assuming down: {}", e);
            TunnelState::Down
        });
        let compatible = is_network_compatible(&self.inner.client_version, &info);

        let (reply, done) = oneshot::channel();
        self.send(SessionInput::Initialize {
            state,
            compatible,
            reply,
        })
        .await?;
        done.await.map_err(|_| SessionError::Stopped)?;
        Ok(info)
    }

    /// Feed connectivity signals into the state machine
    pub fn attach_connectivity<S>(&self, signals: S)
    where
        S: Stream<Item = ConnectivitySignal> + Send + Unpin + 'static,
    {
        self.forward(signals.map(SessionInput::Connectivity));
    }

    fn forward<S>(&self, mut inputs: S)
    where
        S: Stream<Item = SessionInput> + Send + Unpin + 'static,
    {
        let tx = self.inner.input_tx.clone();
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = inputs.next() => match next {
                        Some(input) => {
                            if tx.send(input).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            tracing::debug!("Session input source ended");
                            break;
                        }
                    },
                }
            }
        });
    }

    /// Forward backend events, resubscribing whenever the stream ends
    ///
    /// While the backend is gone the session reports `backend-unreachable`;
    /// once a handshake succeeds again the confirmed state is re-read.
    fn follow_backend(&self, mut events: TunnelEventStream) {
        let backend = self.inner.backend.clone();
        let retry = self.inner.retry.clone();
        let client_version = self.inner.client_version.clone();
        let tx = self.inner.input_tx.clone();
        let cancel = self.inner.cancel.clone();

        tokio::spawn(async move {
            loop {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = events.next() => match next {
                            Some(event) => {
                                if tx.send(SessionInput::Backend(event)).await.is_err() {
                                    return;
                                }
                            }
                            None => break,
                        },
                    }
                }

                tracing::warn!("Backend event stream ended, resubscribing");
                if tx.send(SessionInput::BackendLost).await.is_err() {
                    return;
                }

                let mut backoff = retry.backoff();
                events = loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff.next_delay()) => {}
                    }
                    match resubscribe(backend.as_ref(), &client_version).await {
                        Ok((state, compatible, events)) => {
                            tracing::info!(state = %state, "Backend events restored");
                            let restored = SessionInput::BackendRestored { state, compatible };
                            if tx.send(restored).await.is_err() {
                                return;
                            }
                            break events;
                        }
                        Err(e) => tracing::debug!("Backend still unavailable: {}", e),
                    }
                };
            }
        });
    }

    async fn send(&self, input: SessionInput) -> Result<(), SessionError> {
        self.inner
            .input_tx
            .send(input)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    /// Request the tunnel to come up
    #[instrument(skip_all)]
    pub async fn start_tunnel(&self) -> Result<CommandOutcome, SessionError> {
        self.command(TunnelCommand::Start).await
    }

    /// Request the tunnel to go down
    #[instrument(skip_all)]
    pub async fn stop_tunnel(&self) -> Result<CommandOutcome, SessionError> {
        self.command(TunnelCommand::Stop).await
    }

    async fn command(&self, command: TunnelCommand) -> Result<CommandOutcome, SessionError> {
        if !self.state().is_initialized {
            return Err(SessionError::NotInitialized);
        }
        let (reply, result) = oneshot::channel();
        self.send(SessionInput::Command { command, reply }).await?;
        result.await.map_err(|_| SessionError::Stopped)?
    }

    pub(crate) async fn set_account_usable(&self, usable: bool) -> Result<(), SessionError> {
        self.update(SessionUpdate::AccountUsable(usable)).await
    }

    pub(crate) async fn set_last_error(
        &self,
        error: Option<ErrorCategory>,
    ) -> Result<(), SessionError> {
        self.update(SessionUpdate::LastError(error)).await
    }

    async fn update(&self, update: SessionUpdate) -> Result<(), SessionError> {
        let (reply, done) = oneshot::channel();
        self.send(SessionInput::Update { update, reply }).await?;
        done.await.map_err(|_| SessionError::Stopped)
    }

    /// Current snapshot
    pub fn state(&self) -> SessionState {
        self.inner.state_rx.borrow().clone()
    }

    /// Current snapshot followed by every change
    pub fn observe(&self) -> SessionStateStream {
        WatchStream::new(self.inner.state_rx.clone())
    }

    /// Tunnel state changes only, consecutive duplicates removed
    pub fn observe_tunnel_state(&self) -> BoxStream<'static, TunnelState> {
        let mut last = None;
        self.observe()
            .filter_map(move |state| {
                let tunnel_state = state.tunnel_state;
                let changed = last.replace(tunnel_state) != Some(tunnel_state);
                future::ready(changed.then_some(tunnel_state))
            })
            .boxed()
    }

    /// Raw watch receiver for `wait_for`-style consumers
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_rx.clone()
    }

    /// Stop the reconciler and all forwarding tasks
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}
