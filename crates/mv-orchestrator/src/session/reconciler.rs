//! Single owner of the session state
//!
//! Every mutation of [`SessionState`] happens here, one input at a time.
//! Backend RPCs run in spawned tasks and report back through the same
//! input queue, so the loop never blocks on the backend.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mv_core::config::SessionConfig;
use mv_core::time::current_time_secs;
use mv_core::traits::{Backend, TunnelEvent};
use mv_core::types::{ConnectionData, ConnectivitySignal, ErrorCategory, TunnelCommand};
use mv_core::{BackendError, SessionError, SessionState, TunnelState};

use super::CommandOutcome;
use crate::retry::RetryPolicy;

/// Inputs to the reconciler, from every producer
#[derive(Debug)]
pub(crate) enum SessionInput {
    /// Handshake finished
    Initialize {
        state: TunnelState,
        compatible: bool,
        reply: oneshot::Sender<()>,
    },
    /// Consumer command
    Command {
        command: TunnelCommand,
        reply: oneshot::Sender<Result<CommandOutcome, SessionError>>,
    },
    /// Backend RPC for a command returned
    Dispatched {
        command: TunnelCommand,
        generation: u64,
        result: Result<(), BackendError>,
    },
    /// Backend push notification
    Backend(TunnelEvent),
    /// Backend event stream ended
    BackendLost,
    /// Backend event stream re-established
    BackendRestored { state: TunnelState, compatible: bool },
    /// Connectivity monitor output
    Connectivity(ConnectivitySignal),
    /// Command watchdog fired
    WatchdogExpired { generation: u64 },
    /// Account gate update
    Update {
        update: SessionUpdate,
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionUpdate {
    AccountUsable(bool),
    LastError(Option<ErrorCategory>),
}

/// What the user last asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Up,
    Down,
}

/// A dispatched command awaiting a stable backend state
#[derive(Debug, Clone, Copy)]
struct InFlight {
    command: TunnelCommand,
    generation: u64,
    /// A transitional state was seen since dispatch
    progressed: bool,
}

impl InFlight {
    /// Whether a stable `state` settles this command
    fn settled_by(&self, state: TunnelState) -> bool {
        let target = match self.command {
            TunnelCommand::Start => matches!(state, TunnelState::Up | TunnelState::Offline),
            TunnelCommand::Stop => state == TunnelState::Down,
        };
        // Before any progress, the opposite stable state is just the old one echoed back
        target || self.progressed
    }
}

struct Watchdog {
    generation: u64,
    task: JoinHandle<()>,
}

pub(crate) struct Reconciler {
    backend: Arc<dyn Backend>,
    retry: RetryPolicy,
    config: SessionConfig,
    state_tx: watch::Sender<SessionState>,
    input_tx: mpsc::Sender<SessionInput>,
    intent: Intent,
    in_flight: Option<InFlight>,
    watchdog: Option<Watchdog>,
    generation: u64,
    connectivity: ConnectivitySignal,
}

impl Reconciler {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        retry: RetryPolicy,
        config: SessionConfig,
        state_tx: watch::Sender<SessionState>,
        input_tx: mpsc::Sender<SessionInput>,
    ) -> Self {
        Self {
            backend,
            retry,
            config,
            state_tx,
            input_tx,
            intent: Intent::Down,
            in_flight: None,
            watchdog: None,
            generation: 0,
            connectivity: ConnectivitySignal::Connected,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut inputs: mpsc::Receiver<SessionInput>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                input = inputs.recv() => match input {
                    Some(input) => self.handle(input),
                    None => break,
                },
            }
        }

        self.disarm_watchdog();
        tracing::debug!("Session reconciler stopped");
    }

    fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::Initialize {
                state,
                compatible,
                reply,
            } => {
                self.publish(|s| {
                    s.is_initialized = true;
                    s.is_network_compatible = compatible;
                    s.tunnel_state = state;
                });
                let _ = reply.send(());
            }
            SessionInput::Command { command, reply } => {
                let result = match command {
                    TunnelCommand::Start => self.on_start(),
                    TunnelCommand::Stop => self.on_stop(),
                };
                if let Err(ref e) = result {
                    tracing::debug!("Rejected {} command: {}", command, e);
                }
                let _ = reply.send(result);
            }
            SessionInput::Dispatched {
                command,
                generation,
                result,
            } => self.on_dispatched(command, generation, result),
            SessionInput::Backend(TunnelEvent::StateChanged { state, connection }) => {
                self.on_backend_state(state, connection)
            }
            SessionInput::Backend(TunnelEvent::Error { error }) => self.on_backend_error(error),
            SessionInput::BackendLost => {
                self.publish(|s| s.last_error = Some(ErrorCategory::BackendUnreachable))
            }
            SessionInput::BackendRestored { state, compatible } => {
                self.publish(|s| {
                    s.is_network_compatible = compatible;
                    if s.last_error == Some(ErrorCategory::BackendUnreachable) {
                        s.last_error = None;
                    }
                });
                self.on_backend_state(state, None);
            }
            SessionInput::Connectivity(signal) => self.on_connectivity(signal),
            SessionInput::WatchdogExpired { generation } => self.on_watchdog(generation),
            SessionInput::Update { update, reply } => {
                match update {
                    SessionUpdate::AccountUsable(usable) => {
                        self.publish(|s| s.is_account_usable = usable)
                    }
                    SessionUpdate::LastError(error) => self.publish(|s| s.last_error = error),
                }
                let _ = reply.send(());
            }
        }
    }

    fn current(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Apply a mutation and notify observers only if something changed
    fn publish(&self, mutate: impl FnOnce(&mut SessionState)) {
        self.state_tx.send_if_modified(|state| {
            let before = state.clone();
            mutate(state);
            if state.tunnel_state != TunnelState::Up {
                state.connection_data = None;
            }
            *state != before
        });
    }

    fn on_start(&mut self) -> Result<CommandOutcome, SessionError> {
        let state = self.current();
        if !state.is_initialized {
            return Err(SessionError::NotInitialized);
        }
        if let Some(pending) = self.in_flight {
            return if pending.command == TunnelCommand::Start {
                Ok(CommandOutcome::AlreadyPending)
            } else {
                Err(SessionError::Busy {
                    command: TunnelCommand::Start,
                    state: state.tunnel_state,
                })
            };
        }
        if state.tunnel_state != TunnelState::Down {
            return Err(SessionError::Busy {
                command: TunnelCommand::Start,
                state: state.tunnel_state,
            });
        }
        if !state.is_account_usable {
            return Err(SessionError::CredentialRequired);
        }

        self.intent = Intent::Up;
        self.publish(|s| s.last_error = None);
        self.dispatch(TunnelCommand::Start);
        Ok(CommandOutcome::Dispatched)
    }

    fn on_stop(&mut self) -> Result<CommandOutcome, SessionError> {
        let state = self.current();
        if !state.is_initialized {
            return Err(SessionError::NotInitialized);
        }
        if let Some(pending) = self.in_flight {
            return if pending.command == TunnelCommand::Stop {
                Ok(CommandOutcome::AlreadyPending)
            } else {
                Err(SessionError::Busy {
                    command: TunnelCommand::Stop,
                    state: state.tunnel_state,
                })
            };
        }
        if state.tunnel_state == TunnelState::Down {
            // Drop a lingering always-on intent
            self.intent = Intent::Down;
            return Err(SessionError::NotRunning);
        }

        self.intent = Intent::Down;
        self.dispatch(TunnelCommand::Stop);
        Ok(CommandOutcome::Dispatched)
    }

    fn dispatch(&mut self, command: TunnelCommand) {
        self.generation += 1;
        let generation = self.generation;
        self.in_flight = Some(InFlight {
            command,
            generation,
            progressed: false,
        });
        self.publish(|s| s.pending_command = Some(command));
        self.arm_watchdog(generation);
        tracing::info!(generation, "Dispatching {} to backend", command);

        let backend = self.backend.clone();
        let retry = self.retry.clone();
        let inputs = self.input_tx.clone();
        tokio::spawn(async move {
            let result = match command {
                TunnelCommand::Start => retry.run("start tunnel", || backend.start_tunnel()).await,
                TunnelCommand::Stop => retry.run("stop tunnel", || backend.stop_tunnel()).await,
            };
            let _ = inputs
                .send(SessionInput::Dispatched {
                    command,
                    generation,
                    result,
                })
                .await;
        });
    }

    fn on_dispatched(
        &mut self,
        command: TunnelCommand,
        generation: u64,
        result: Result<(), BackendError>,
    ) {
        if self.in_flight.map(|f| f.generation) != Some(generation) {
            match result {
                Ok(()) => tracing::debug!(generation, "Ignoring late {} completion", command),
                Err(e) => tracing::warn!(generation, "Late {} failure ignored: {}", command, e),
            }
            return;
        }

        // Accepted commands stay pending until the backend reports a stable state
        let e = match result {
            Ok(()) => {
                tracing::debug!(generation, "Backend accepted {}", command);
                return;
            }
            Err(e) => e,
        };

        let category = self.categorize(&e);
        tracing::warn!(generation, error = %category, "Backend rejected {}: {}", command, e);
        self.settle();
        if category != ErrorCategory::NetworkDown {
            self.intent = Intent::Down;
        }
        self.publish(|s| {
            s.last_error = Some(category);
            s.tunnel_state = TunnelState::Down;
        });
    }

    /// Resolve the in-flight command, if any
    fn settle(&mut self) {
        self.disarm_watchdog();
        if let Some(settled) = self.in_flight.take() {
            tracing::debug!(generation = settled.generation, "{} settled", settled.command);
        }
        self.publish(|s| s.pending_command = None);
    }

    fn on_backend_state(&mut self, state: TunnelState, connection: Option<ConnectionData>) {
        let previous = self.current().tunnel_state;
        if state != previous {
            tracing::info!("Tunnel state {} -> {}", previous, state);
        }

        if let Some(ref mut in_flight) = self.in_flight {
            in_flight.progressed |= state.is_transitional();
        }
        let settles = self.in_flight.map_or(true, |f| f.settled_by(state));
        if state.is_stable() && settles {
            self.settle();
            if state == TunnelState::Down && self.connectivity == ConnectivitySignal::Connected {
                self.intent = Intent::Down;
            }
        }

        // A repeated Up for the same hops keeps the original connect time
        let since = self
            .current()
            .connection_data
            .filter(|old| {
                connection.as_ref().is_some_and(|new| {
                    old.entry_gateway == new.entry_gateway && old.exit_gateway == new.exit_gateway
                })
            })
            .and_then(|old| old.connected_at);
        let connection = connection.map(|mut data| {
            data.connected_at = data
                .connected_at
                .or(since)
                .or_else(|| Some(current_time_secs()));
            data
        });
        self.publish(|s| {
            s.tunnel_state = state;
            if state == TunnelState::Up && connection.is_some() {
                s.connection_data = connection;
            }
        });
    }

    fn on_backend_error(&mut self, error: BackendError) {
        let category = self.categorize(&error);
        let was = self.current().tunnel_state;
        tracing::error!(error = %category, state = %was, "Backend error: {}", error);

        // A start RPC that never returns must not wedge the command surface;
        // its late completion is dropped by the generation check
        self.settle();
        if category != ErrorCategory::NetworkDown {
            self.intent = Intent::Down;
        }
        self.publish(|s| {
            s.last_error = Some(category);
            s.tunnel_state = TunnelState::Down;
        });
        if was != TunnelState::Down {
            self.stop_best_effort("backend error");
        }
    }

    fn on_connectivity(&mut self, signal: ConnectivitySignal) {
        let previous = std::mem::replace(&mut self.connectivity, signal);
        if previous == signal {
            return;
        }
        tracing::info!("Connectivity {} -> {}", previous, signal);

        if signal != ConnectivitySignal::Connected
            || !self.config.always_on
            || self.intent != Intent::Up
            || self.in_flight.is_some()
        {
            return;
        }

        let state = self.current();
        if matches!(state.tunnel_state, TunnelState::Down | TunnelState::Offline)
            && state.is_account_usable
        {
            tracing::info!("Connectivity restored, restarting tunnel");
            self.publish(|s| s.last_error = None);
            self.dispatch(TunnelCommand::Start);
        }
    }

    fn on_watchdog(&mut self, generation: u64) {
        match self.watchdog {
            Some(ref w) if w.generation == generation => {}
            _ => return,
        }
        self.watchdog = None;

        let was = self.current().tunnel_state;
        tracing::warn!(
            generation,
            state = %was,
            "No stable tunnel state within {:?}",
            self.config.watchdog_timeout
        );
        self.intent = Intent::Down;
        self.in_flight = None;
        self.publish(|s| {
            s.last_error = Some(ErrorCategory::Timeout);
            s.tunnel_state = TunnelState::Down;
            s.pending_command = None;
        });
        if was != TunnelState::Down {
            self.stop_best_effort("watchdog timeout");
        }
    }

    fn categorize(&self, error: &BackendError) -> ErrorCategory {
        let category = match error {
            BackendError::Unreachable(_)
                if self.connectivity == ConnectivitySignal::Disconnected =>
            {
                ErrorCategory::NetworkDown
            }
            other => other.category(),
        };
        if category == ErrorCategory::Unknown {
            tracing::warn!("Unclassified backend error: {:?}", error);
        }
        category
    }

    fn arm_watchdog(&mut self, generation: u64) {
        self.disarm_watchdog();
        let timeout: Duration = self.config.watchdog_timeout;
        let inputs = self.input_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = inputs.send(SessionInput::WatchdogExpired { generation }).await;
        });
        self.watchdog = Some(Watchdog { generation, task });
    }

    fn disarm_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.task.abort();
        }
    }

    fn stop_best_effort(&self, reason: &'static str) {
        let backend = self.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.stop_tunnel().await {
                tracing::warn!("Stop after {} failed: {}", reason, e);
            }
        });
    }
}
