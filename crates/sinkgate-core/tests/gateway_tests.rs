//! Integration tests for the gateway session lifecycle

use sinkgate_core::net::{InterfaceSpec, NetworkCollaborator};
use sinkgate_core::rules::RuleStore;
use sinkgate_core::{
    Error, GatewayConfig, GatewayController, GatewayEvent, ResolverEngine, TunnelState,
    UpstreamConfig,
};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Collaborator that records every call and fails on demand
#[derive(Default)]
struct RecordingNetwork {
    calls: parking_lot::Mutex<Vec<&'static str>>,
    fail_install: AtomicBool,
    fail_dns: AtomicBool,
    install_delay_ms: AtomicU32,
    install_attempts: AtomicU32,
}

impl RecordingNetwork {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

impl NetworkCollaborator for RecordingNetwork {
    fn install_routes(&self, _spec: &InterfaceSpec) -> sinkgate_core::Result<()> {
        self.install_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = self.install_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay.into()));
        }
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(Error::RouteInstall("simulated failure".to_string()));
        }
        self.calls.lock().push("install_routes");
        Ok(())
    }

    fn remove_routes(&self) -> sinkgate_core::Result<()> {
        self.calls.lock().push("remove_routes");
        Ok(())
    }

    fn set_dns_servers(&self, _servers: &[IpAddr]) -> sinkgate_core::Result<()> {
        if self.fail_dns.load(Ordering::SeqCst) {
            return Err(Error::RouteInstall("simulated dns failure".to_string()));
        }
        self.calls.lock().push("set_dns_servers");
        Ok(())
    }

    fn clear_dns_servers(&self) -> sinkgate_core::Result<()> {
        self.calls.lock().push("clear_dns_servers");
        Ok(())
    }
}

fn controller(
    network: Arc<RecordingNetwork>,
    config: GatewayConfig,
) -> (tempfile::TempDir, Arc<GatewayController>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RuleStore::open(dir.path().join("rules.json")).unwrap());
    let engine = Arc::new(ResolverEngine::new(UpstreamConfig {
        addr: "127.0.0.1:53".parse().unwrap(),
        timeout: Duration::from_secs(3),
    }));
    let gateway = Arc::new(GatewayController::new(store, engine, network, config));
    (dir, gateway)
}

fn fast_config() -> GatewayConfig {
    GatewayConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        start_timeout: Duration::from_secs(5),
        max_start_attempts: 3,
        retry_backoff: Duration::from_millis(10),
    }
}

// ============ Lifecycle ============

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let network = Arc::new(RecordingNetwork::default());
    let (_dir, gateway) = controller(network.clone(), fast_config());
    let mut events = gateway.subscribe();

    assert_eq!(gateway.status(), TunnelState::Idle);
    gateway.start().await.unwrap();
    assert_eq!(gateway.status(), TunnelState::Active);
    assert!(matches!(
        events.recv().await.unwrap(),
        GatewayEvent::Started { version: 0, .. }
    ));

    gateway.stop().await.unwrap();
    assert_eq!(gateway.status(), TunnelState::Idle);
    assert!(matches!(events.recv().await.unwrap(), GatewayEvent::Stopped));

    assert_eq!(
        network.calls(),
        vec![
            "install_routes",
            "set_dns_servers",
            "clear_dns_servers",
            "remove_routes",
        ]
    );
}

#[tokio::test]
async fn test_start_is_noop_when_active() {
    let network = Arc::new(RecordingNetwork::default());
    let (_dir, gateway) = controller(network.clone(), fast_config());

    gateway.start().await.unwrap();
    gateway.start().await.unwrap();
    assert_eq!(gateway.status(), TunnelState::Active);
    assert_eq!(network.install_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent_when_idle() {
    let network = Arc::new(RecordingNetwork::default());
    let (_dir, gateway) = controller(network, fast_config());

    gateway.stop().await.unwrap();
    gateway.stop().await.unwrap();
    assert_eq!(gateway.status(), TunnelState::Idle);
}

// ============ Retries and Failure ============

#[tokio::test]
async fn test_retry_exhaustion_parks_in_failed() {
    let network = Arc::new(RecordingNetwork::default());
    network.fail_install.store(true, Ordering::SeqCst);
    let (_dir, gateway) = controller(network.clone(), fast_config());
    let mut events = gateway.subscribe();

    let err = gateway.start().await.unwrap_err();
    assert!(matches!(err, Error::RouteInstall(_)));
    assert_eq!(gateway.status(), TunnelState::Failed);
    assert_eq!(network.install_attempts.load(Ordering::SeqCst), 3);
    assert!(matches!(
        events.recv().await.unwrap(),
        GatewayEvent::StartFailed { .. }
    ));
}

#[tokio::test]
async fn test_failed_session_accepts_new_start() {
    let network = Arc::new(RecordingNetwork::default());
    network.fail_install.store(true, Ordering::SeqCst);
    let (_dir, gateway) = controller(network.clone(), fast_config());

    assert!(gateway.start().await.is_err());
    assert_eq!(gateway.status(), TunnelState::Failed);

    network.fail_install.store(false, Ordering::SeqCst);
    gateway.start().await.unwrap();
    assert_eq!(gateway.status(), TunnelState::Active);
}

#[tokio::test]
async fn test_start_deadline_overrun_fails() {
    let network = Arc::new(RecordingNetwork::default());
    network.install_delay_ms.store(500, Ordering::SeqCst);
    let (_dir, gateway) = controller(
        network,
        GatewayConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            start_timeout: Duration::from_millis(50),
            max_start_attempts: 1,
            retry_backoff: Duration::from_millis(10),
        },
    );

    let err = gateway.start().await.unwrap_err();
    assert!(matches!(err, Error::StartTimeout { .. }));
    assert_eq!(gateway.status(), TunnelState::Failed);
}

#[tokio::test]
async fn test_timed_out_start_tears_down_late_installation() {
    let network = Arc::new(RecordingNetwork::default());
    network.install_delay_ms.store(300, Ordering::SeqCst);
    let (_dir, gateway) = controller(
        network.clone(),
        GatewayConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            start_timeout: Duration::from_millis(50),
            max_start_attempts: 1,
            retry_backoff: Duration::from_millis(10),
        },
    );

    let err = gateway.start().await.unwrap_err();
    assert!(matches!(err, Error::StartTimeout { .. }));
    assert_eq!(gateway.status(), TunnelState::Failed);

    // The attempt keeps running past its deadline and finishes installing;
    // everything it set up must be rolled back once it resolves
    tokio::time::sleep(Duration::from_millis(700)).await;
    let calls = network.calls();
    assert!(calls.contains(&"install_routes"));
    assert!(calls.contains(&"remove_routes"));
    assert!(calls.contains(&"clear_dns_servers"));
}

#[tokio::test]
async fn test_stop_after_failed_start_clears_network_state() {
    let network = Arc::new(RecordingNetwork::default());
    network.fail_install.store(true, Ordering::SeqCst);
    let (_dir, gateway) = controller(
        network.clone(),
        GatewayConfig {
            max_start_attempts: 1,
            ..fast_config()
        },
    );

    assert!(gateway.start().await.is_err());
    assert_eq!(gateway.status(), TunnelState::Failed);

    // Leaving Failed always clears collaborator state, session or not
    gateway.stop().await.unwrap();
    assert_eq!(gateway.status(), TunnelState::Idle);
    assert_eq!(network.calls(), vec!["clear_dns_servers", "remove_routes"]);
}

#[tokio::test]
async fn test_dns_failure_rolls_back_routes() {
    let network = Arc::new(RecordingNetwork::default());
    network.fail_dns.store(true, Ordering::SeqCst);
    let (_dir, gateway) = controller(
        network.clone(),
        GatewayConfig {
            max_start_attempts: 1,
            ..fast_config()
        },
    );

    assert!(gateway.start().await.is_err());
    assert_eq!(gateway.status(), TunnelState::Failed);
    assert_eq!(network.calls(), vec!["install_routes", "remove_routes"]);
}

// ============ Stop During Start ============

#[tokio::test]
async fn test_stop_during_start_abandons_retries() {
    let network = Arc::new(RecordingNetwork::default());
    network.fail_install.store(true, Ordering::SeqCst);
    let (_dir, gateway) = controller(
        network,
        GatewayConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            start_timeout: Duration::from_secs(5),
            max_start_attempts: 10,
            retry_backoff: Duration::from_millis(200),
        },
    );

    let starter = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.start().await })
    };

    // Let the first attempt fail, then request teardown mid-backoff
    tokio::time::sleep(Duration::from_millis(50)).await;
    gateway.stop().await.unwrap();

    let result = starter.await.unwrap();
    assert!(matches!(result, Err(Error::InvalidState { .. })));
    assert_eq!(gateway.status(), TunnelState::Idle);
}

// ============ Rule Updates ============

#[tokio::test]
async fn test_apply_rule_update_requires_session() {
    let network = Arc::new(RecordingNetwork::default());
    let (_dir, gateway) = controller(network, fast_config());

    let err = gateway.apply_rule_update(1).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn test_apply_rule_update_emits_event() {
    let network = Arc::new(RecordingNetwork::default());
    let (_dir, gateway) = controller(network, fast_config());

    gateway.start().await.unwrap();
    let mut events = gateway.subscribe();
    gateway.apply_rule_update(0).await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        GatewayEvent::RulesApplied { version: 0 }
    ));
    gateway.stop().await.unwrap();
}
