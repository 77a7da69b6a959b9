//! Shared test doubles for the session layer

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::BroadcastStream;

use mv_core::config::{BackoffConfig, ClientConfig};
use mv_core::traits::{
    Backend, Capabilities, InterfaceId, NetworkEvent, NetworkEventSource, NetworkSnapshot,
    ObserverRegistration, TunnelEvent, TunnelEventStream,
};
use mv_core::types::{BackendInfo, ConnectionData, NetworkEnvironment, Transport, UserAgent};
use mv_core::{BackendError, GatewayRecord, GatewayType, SessionState, TunnelState};
use mv_orchestrator::{AppContext, MemorySettings};

pub const VALID_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Scriptable in-memory backend
pub struct ScriptedBackend {
    events: Mutex<broadcast::Sender<TunnelEvent>>,
    daemon_down: AtomicBool,
    info: Mutex<BackendInfo>,
    state: Mutex<TunnelState>,
    start_result: Mutex<Result<(), BackendError>>,
    stop_result: Mutex<Result<(), BackendError>>,
    store_result: Mutex<Result<(), BackendError>>,
    remove_result: Mutex<Result<(), BackendError>>,
    start_delay: Mutex<Option<Duration>>,
    gateways: Mutex<HashMap<GatewayType, Result<Vec<GatewayRecord>, BackendError>>>,
    credential_stored: AtomicBool,
    account_id: Mutex<Option<String>>,
    environment: Mutex<NetworkEnvironment>,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub store_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub gateway_calls: AtomicUsize,
    pub account_id_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events: Mutex::new(events),
            daemon_down: AtomicBool::new(false),
            info: Mutex::new(BackendInfo {
                version: "1.5.0".into(),
                min_client_version: None,
                environment: NetworkEnvironment::Mainnet,
            }),
            state: Mutex::new(TunnelState::Down),
            start_result: Mutex::new(Ok(())),
            stop_result: Mutex::new(Ok(())),
            store_result: Mutex::new(Ok(())),
            remove_result: Mutex::new(Ok(())),
            start_delay: Mutex::new(None),
            gateways: Mutex::new(HashMap::new()),
            credential_stored: AtomicBool::new(false),
            account_id: Mutex::new(Some("n1account".into())),
            environment: Mutex::new(NetworkEnvironment::Mainnet),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            store_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            gateway_calls: AtomicUsize::new(0),
            account_id_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
        })
    }

    /// Backend with a stored credential
    pub fn with_credential() -> Arc<Self> {
        let backend = Self::new();
        backend.credential_stored.store(true, Ordering::SeqCst);
        backend
    }

    pub fn emit_state(&self, state: TunnelState) {
        *self.state.lock().unwrap() = state;
        let connection = (state == TunnelState::Up).then(|| ConnectionData {
            entry_gateway: "gw-entry".into(),
            exit_gateway: "gw-exit".into(),
            ipv4: Some("10.1.0.2".parse().unwrap()),
            ipv6: None,
            connected_at: None,
        });
        let _ = self
            .events
            .lock()
            .unwrap()
            .send(TunnelEvent::StateChanged { state, connection });
    }

    pub fn emit_error(&self, error: BackendError) {
        let _ = self.events.lock().unwrap().send(TunnelEvent::Error { error });
    }

    /// End every open event subscription, as a daemon restart would
    pub fn close_events(&self) {
        let (events, _) = broadcast::channel(64);
        *self.events.lock().unwrap() = events;
    }

    /// Make handshakes fail as if the daemon were not running
    pub fn set_daemon_down(&self, down: bool) {
        self.daemon_down.store(down, Ordering::SeqCst);
    }

    pub fn set_min_client_version(&self, version: &str) {
        self.info.lock().unwrap().min_client_version = Some(version.into());
    }

    pub fn set_start_result(&self, result: Result<(), BackendError>) {
        *self.start_result.lock().unwrap() = result;
    }

    pub fn set_store_result(&self, result: Result<(), BackendError>) {
        *self.store_result.lock().unwrap() = result;
    }

    pub fn set_remove_result(&self, result: Result<(), BackendError>) {
        *self.remove_result.lock().unwrap() = result;
    }

    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_gateways(
        &self,
        kind: GatewayType,
        result: Result<Vec<GatewayRecord>, BackendError>,
    ) {
        self.gateways.lock().unwrap().insert(kind, result);
    }

    pub fn environment(&self) -> NetworkEnvironment {
        *self.environment.lock().unwrap()
    }

    pub fn credential_stored(&self) -> bool {
        self.credential_stored.load(Ordering::SeqCst)
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn transport(&self) -> Transport {
        Transport::InProcess
    }

    async fn handshake(&self) -> Result<BackendInfo, BackendError> {
        if self.daemon_down.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable("daemon not running".into()));
        }
        Ok(self.info.lock().unwrap().clone())
    }

    async fn start_tunnel(&self) -> Result<(), BackendError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.start_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.start_result.lock().unwrap().clone()
    }

    async fn stop_tunnel(&self) -> Result<(), BackendError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stop_result.lock().unwrap().clone()
    }

    async fn get_state(&self) -> Result<TunnelState, BackendError> {
        Ok(*self.state.lock().unwrap())
    }

    async fn tunnel_events(&self) -> Result<TunnelEventStream, BackendError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let receiver = self.events.lock().unwrap().subscribe();
        let events = BroadcastStream::new(receiver)
            .filter_map(|event| async move { event.ok() });
        Ok(events.boxed())
    }

    async fn get_gateway_list(
        &self,
        kind: GatewayType,
        _user_agent: &UserAgent,
    ) -> Result<Vec<GatewayRecord>, BackendError> {
        self.gateway_calls.fetch_add(1, Ordering::SeqCst);
        self.gateways
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn store_credential(&self, _secret: &str) -> Result<(), BackendError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.store_result.lock().unwrap().clone();
        if result.is_ok() {
            self.credential_stored.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn remove_credential(&self) -> Result<(), BackendError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.remove_result.lock().unwrap().clone();
        if result.is_ok() {
            self.credential_stored.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn is_credential_stored(&self) -> Result<bool, BackendError> {
        Ok(self.credential_stored.load(Ordering::SeqCst))
    }

    async fn account_id(&self) -> Result<Option<String>, BackendError> {
        self.account_id_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.account_id.lock().unwrap().clone())
    }

    async fn device_id(&self) -> Result<Option<String>, BackendError> {
        Ok(Some("device-1".into()))
    }

    async fn set_environment(&self, environment: NetworkEnvironment) -> Result<(), BackendError> {
        *self.environment.lock().unwrap() = environment;
        Ok(())
    }
}

/// OS network double driven by the test
#[derive(Default)]
pub struct FakeNetwork {
    sink: Mutex<Option<mpsc::UnboundedSender<NetworkEvent>>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, event: NetworkEvent) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send(event);
        }
    }

    pub fn lose_wifi(&self) {
        self.emit(NetworkEvent::Lost(wifi()));
    }

    pub fn restore_wifi(&self) {
        self.emit(NetworkEvent::Available(wifi(), Capabilities::ONLINE));
    }
}

impl NetworkEventSource for FakeNetwork {
    fn register(&self, sink: mpsc::UnboundedSender<NetworkEvent>) -> ObserverRegistration {
        *self.sink.lock().unwrap() = Some(sink);
        ObserverRegistration::noop()
    }

    fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            interfaces: vec![(wifi(), Capabilities::ONLINE)],
            airplane_mode: false,
        }
    }

    fn default_route(&self) -> Option<Capabilities> {
        None
    }
}

fn wifi() -> InterfaceId {
    InterfaceId::new("wlan0")
}

/// Config with fast, deterministic retries
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.backend.backoff = BackoffConfig {
        initial: Duration::from_millis(100),
        max: Duration::from_secs(1),
        multiplier: 2.0,
        jitter: 0.0,
    };
    config.session.watchdog_timeout = Duration::from_secs(30);
    config
}

/// Build and start a context over the given doubles
pub async fn started_context(
    backend: Arc<ScriptedBackend>,
    network: Arc<FakeNetwork>,
    config: ClientConfig,
) -> AppContext {
    let context = AppContext::new(config, backend, network, Arc::new(MemorySettings::new()));
    context.start().await.expect("context should start");
    context
}

/// Wait until the session state satisfies `predicate`
pub async fn wait_for_state(
    rx: &mut watch::Receiver<SessionState>,
    predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("session state channel closed")
        .clone()
}

/// Poll until `condition` holds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition never became true");
}

pub fn gateway(identity: &str, country: &str) -> GatewayRecord {
    GatewayRecord::new(identity, Some(country), format!("{} gateway", country))
}
