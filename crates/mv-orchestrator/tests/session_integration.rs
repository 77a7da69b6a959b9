//! Session orchestrator integration tests
//!
//! Drives the state machine through a scripted backend and a fake OS
//! network source. Time is paused so debounce, retry and watchdog timing is
//! deterministic.

mod common;

use futures::StreamExt;
use std::time::Duration;

use common::{
    eventually, started_context, test_config, wait_for_state, FakeNetwork, ScriptedBackend,
};
use mv_core::types::TunnelCommand;
use mv_core::{BackendError, ErrorCategory, SessionError, TunnelState};
use mv_orchestrator::{CommandOutcome, SessionOrchestrator};

#[tokio::test(start_paused = true)]
async fn test_commands_rejected_before_initialization() {
    let backend = ScriptedBackend::with_credential();
    let orchestrator = SessionOrchestrator::spawn(backend.clone(), &test_config());

    assert_eq!(
        orchestrator.start_tunnel().await,
        Err(SessionError::NotInitialized)
    );
    assert!(!orchestrator.state().is_initialized);
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn test_initialization_sets_flags_once() {
    let backend = ScriptedBackend::with_credential();
    let orchestrator = SessionOrchestrator::spawn(backend.clone(), &test_config());

    let info = orchestrator.initialize().await.unwrap();
    assert_eq!(info.version, "1.5.0");

    let state = orchestrator.state();
    assert!(state.is_initialized);
    assert!(state.is_network_compatible);

    // A second handshake never reverts the flag
    orchestrator.initialize().await.unwrap();
    assert!(orchestrator.state().is_initialized);
}

#[tokio::test(start_paused = true)]
async fn test_incompatible_network_version_reported() {
    let backend = ScriptedBackend::with_credential();
    backend.set_min_client_version("99.0.0");
    let orchestrator = SessionOrchestrator::spawn(backend.clone(), &test_config());

    orchestrator.initialize().await.unwrap();
    assert!(!orchestrator.state().is_network_compatible);
}

#[tokio::test(start_paused = true)]
async fn test_start_requires_credential() {
    let backend = ScriptedBackend::new();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;

    assert_eq!(
        context.start_tunnel().await,
        Err(SessionError::CredentialRequired)
    );
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn test_up_and_down_follow_backend_events() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    assert_eq!(context.start_tunnel().await, Ok(CommandOutcome::Dispatched));
    // Nothing confirmed yet
    assert_eq!(context.session().state().tunnel_state, TunnelState::Down);

    backend.emit_state(TunnelState::InitializingClient);
    backend.emit_state(TunnelState::EstablishingConnection);
    backend.emit_state(TunnelState::Up);

    let up = wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Up).await;
    let connection = up.connection_data.expect("connection data while up");
    assert_eq!(connection.entry_gateway, "gw-entry");
    assert!(connection.connected_at.is_some());
    assert_eq!(up.last_error, None);

    eventually(|| context.session().state().pending_command.is_none()).await;
    assert_eq!(context.stop_tunnel().await, Ok(CommandOutcome::Dispatched));
    backend.emit_state(TunnelState::Disconnecting);
    let disconnecting =
        wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Disconnecting).await;
    assert!(disconnecting.connection_data.is_none());

    backend.emit_state(TunnelState::Down);
    let down = wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Down).await;
    assert!(down.connection_data.is_none());
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 1);
    assert_eq!(ScriptedBackend::count(&backend.stop_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_establishing_is_still_pending() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::EstablishingConnection);
    let establishing =
        wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::EstablishingConnection).await;
    assert_eq!(establishing.pending_command, Some(TunnelCommand::Start));

    assert_eq!(
        context.start_tunnel().await,
        Ok(CommandOutcome::AlreadyPending)
    );
    assert!(matches!(
        context.stop_tunnel().await,
        Err(SessionError::Busy {
            state: TunnelState::EstablishingConnection,
            ..
        })
    ));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn test_accepted_start_stays_pending_until_confirmed() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    assert_eq!(context.start_tunnel().await, Ok(CommandOutcome::Dispatched));
    // The backend has acknowledged the call but reported no state yet
    tokio::time::sleep(Duration::from_secs(1)).await;
    let state = context.session().state();
    assert_eq!(state.tunnel_state, TunnelState::Down);
    assert_eq!(state.pending_command, Some(TunnelCommand::Start));

    assert_eq!(
        context.start_tunnel().await,
        Ok(CommandOutcome::AlreadyPending)
    );
    // Down echoed before any progress does not settle the start
    backend.emit_state(TunnelState::Down);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        context.start_tunnel().await,
        Ok(CommandOutcome::AlreadyPending)
    );
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 1);

    backend.emit_state(TunnelState::Up);
    let up = wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Up).await;
    assert_eq!(up.pending_command, None);
}

#[tokio::test(start_paused = true)]
async fn test_backend_error_releases_hung_start() {
    let backend = ScriptedBackend::with_credential();
    backend.set_start_delay(Duration::from_secs(100_000));
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::InitializingClient);
    wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::InitializingClient).await;

    backend.emit_error(BackendError::SameEntryExitGateway);
    let failed = wait_for_state(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(failed.tunnel_state, TunnelState::Down);
    assert_eq!(failed.pending_command, None);

    // The first call never returned, yet a new start goes out
    backend.set_start_delay(Duration::from_millis(10));
    assert_eq!(context.start_tunnel().await, Ok(CommandOutcome::Dispatched));
    eventually(|| ScriptedBackend::count(&backend.start_calls) == 2).await;
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_and_opposite_commands_while_in_flight() {
    let backend = ScriptedBackend::with_credential();
    backend.set_start_delay(Duration::from_secs(5));
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;

    assert_eq!(context.start_tunnel().await, Ok(CommandOutcome::Dispatched));
    assert_eq!(
        context.start_tunnel().await,
        Ok(CommandOutcome::AlreadyPending)
    );
    assert!(matches!(
        context.stop_tunnel().await,
        Err(SessionError::Busy { .. })
    ));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 1);
    assert_eq!(ScriptedBackend::count(&backend.stop_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_rejected_when_down() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;

    assert_eq!(context.stop_tunnel().await, Err(SessionError::NotRunning));
    assert_eq!(ScriptedBackend::count(&backend.stop_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn test_backend_error_forces_down_with_category() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::EstablishingConnection);
    wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::EstablishingConnection).await;

    backend.emit_error(BackendError::SameEntryExitGateway);
    let state = wait_for_state(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(state.tunnel_state, TunnelState::Down);
    assert_eq!(state.last_error, Some(ErrorCategory::SameEntryExitGateway));

    // Transitional state at error time triggers a best-effort stop
    eventually(|| ScriptedBackend::count(&backend.stop_calls) == 1).await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_start_maps_error_and_next_start_clears_it() {
    let backend = ScriptedBackend::with_credential();
    backend.set_start_result(Err(BackendError::InvalidExitCountry("zz".into())));
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    let failed = wait_for_state(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(failed.last_error, Some(ErrorCategory::InvalidExitCountry));
    assert_eq!(failed.tunnel_state, TunnelState::Down);
    assert_eq!(failed.pending_command, None);

    backend.set_start_result(Ok(()));
    context.start_tunnel().await.unwrap();
    assert_eq!(context.session().state().last_error, None);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_error_category() {
    let backend = ScriptedBackend::with_credential();
    backend.set_start_result(Err(BackendError::Internal("kernel said no".into())));
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    let failed = wait_for_state(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(failed.last_error, Some(ErrorCategory::Unknown));
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_forces_down_with_timeout() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::InitializingClient);
    wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::InitializingClient).await;

    let started = tokio::time::Instant::now();
    let state = tokio::time::timeout(
        Duration::from_secs(120),
        rx.wait_for(|s| s.last_error == Some(ErrorCategory::Timeout)),
    )
    .await
    .expect("watchdog should fire")
    .unwrap()
    .clone();

    assert!(started.elapsed() >= Duration::from_secs(29));
    assert_eq!(state.tunnel_state, TunnelState::Down);
    eventually(|| ScriptedBackend::count(&backend.stop_calls) == 1).await;
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_disarmed_by_stable_state() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::Up);
    wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Up).await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    let state = context.session().state();
    assert_eq!(state.tunnel_state, TunnelState::Up);
    assert_eq!(state.last_error, None);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_backend_state_not_republished() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::Up);
    wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Up && s.pending_command.is_none())
        .await;
    rx.borrow_and_update();

    backend.emit_state(TunnelState::Up);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_tunnel_state_stream_has_no_consecutive_duplicates() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut states = context.session().observe_tunnel_state();

    assert_eq!(states.next().await, Some(TunnelState::Down));
    context.start_tunnel().await.unwrap();

    for state in [
        TunnelState::InitializingClient,
        TunnelState::InitializingClient,
        TunnelState::EstablishingConnection,
        TunnelState::Up,
        TunnelState::Up,
        TunnelState::Offline,
        TunnelState::Offline,
        TunnelState::Up,
    ] {
        backend.emit_state(state);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut seen = vec![TunnelState::Down];
    while let Ok(Some(state)) = tokio::time::timeout(Duration::from_secs(1), states.next()).await {
        seen.push(state);
    }
    assert_eq!(seen.last(), Some(&TunnelState::Up));
    for pair in seen.windows(2) {
        assert_ne!(pair[0], pair[1], "duplicate in {:?}", seen);
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_stream_replays_latest() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::Up);
    wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Up).await;

    // Late subscriber sees the current snapshot first
    let mut late = context.observe_session_state();
    let first = late.next().await.unwrap();
    assert_eq!(first.tunnel_state, TunnelState::Up);
}

#[tokio::test(start_paused = true)]
async fn test_offline_does_not_auto_reconnect() {
    let backend = ScriptedBackend::with_credential();
    let network = FakeNetwork::new();
    let context = started_context(backend.clone(), network.clone(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::Up);
    wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Up).await;

    network.lose_wifi();
    tokio::time::sleep(Duration::from_secs(1)).await;
    backend.emit_state(TunnelState::Offline);
    let offline = wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Offline).await;
    assert_eq!(offline.last_error, None);
    assert!(offline.connection_data.is_none());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 1);

    // Without always-on, connectivity returning changes nothing either
    network.restore_wifi();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn test_always_on_restarts_when_connectivity_returns() {
    let backend = ScriptedBackend::with_credential();
    let network = FakeNetwork::new();
    let mut config = test_config();
    config.session.always_on = true;
    let context = started_context(backend.clone(), network.clone(), config).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::Up);
    wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Up).await;

    network.lose_wifi();
    tokio::time::sleep(Duration::from_secs(1)).await;
    backend.emit_state(TunnelState::Offline);
    wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Offline).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 1);

    network.restore_wifi();
    eventually(|| ScriptedBackend::count(&backend.start_calls) == 2).await;
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_while_disconnected_is_network_down() {
    let backend = ScriptedBackend::with_credential();
    let network = FakeNetwork::new();
    let context = started_context(backend.clone(), network.clone(), test_config()).await;
    let mut rx = context.session().subscribe();

    network.lose_wifi();
    tokio::time::sleep(Duration::from_secs(1)).await;

    backend.set_start_result(Err(BackendError::Unreachable("no route".into())));
    context.start_tunnel().await.unwrap();
    let failed = wait_for_state(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(failed.last_error, Some(ErrorCategory::NetworkDown));
    // Unreachable is retried before surfacing
    assert_eq!(ScriptedBackend::count(&backend.start_calls), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_while_connected_is_backend_unreachable() {
    let backend = ScriptedBackend::with_credential();
    backend.set_start_result(Err(BackendError::Unreachable("refused".into())));
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();

    context.start_tunnel().await.unwrap();
    let failed = wait_for_state(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(failed.last_error, Some(ErrorCategory::BackendUnreachable));
}

#[tokio::test(start_paused = true)]
async fn test_event_stream_end_resubscribes() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;
    let mut rx = context.session().subscribe();
    assert_eq!(ScriptedBackend::count(&backend.subscribe_calls), 1);

    backend.set_daemon_down(true);
    backend.close_events();
    let lost = wait_for_state(&mut rx, |s| {
        s.last_error == Some(ErrorCategory::BackendUnreachable)
    })
    .await;
    assert!(lost.is_initialized);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ScriptedBackend::count(&backend.subscribe_calls), 1);

    backend.set_daemon_down(false);
    wait_for_state(&mut rx, |s| s.last_error.is_none()).await;
    assert_eq!(ScriptedBackend::count(&backend.subscribe_calls), 2);

    // Events on the new subscription reach the session again
    context.start_tunnel().await.unwrap();
    backend.emit_state(TunnelState::Up);
    let up = wait_for_state(&mut rx, |s| s.tunnel_state == TunnelState::Up).await;
    assert_eq!(up.pending_command, None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_accepting_commands() {
    let backend = ScriptedBackend::with_credential();
    let context = started_context(backend.clone(), FakeNetwork::new(), test_config()).await;

    context.shutdown();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(context.start_tunnel().await, Err(SessionError::Stopped));
}
