use super::*;
use crate::config::CounterConfig;
use crate::events::ScanEvent;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn write_orders(dir: &TempDir) -> String {
    let today = Utc::now().date_naive();
    let orders = serde_json::json!([
        {
            "id": "3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F",
            "short_code": "K7Q2XZ",
            "status": "pending",
            "consumption_date": today,
            "dish_ref": "feijoada",
            "holder_ref": "student-42"
        }
    ]);

    let path = dir.path().join("orders.json");
    std::fs::write(&path, orders.to_string()).unwrap();
    path.to_string_lossy().into_owned()
}

fn create_test_config(dir: &TempDir) -> CounterConfig {
    let mut config = CounterConfig::default();
    config.registry.orders_path = write_orders(dir);
    config.registry.persist = false;
    config.audit.enabled = true;
    config.audit.path = dir.path().join("audit.jsonl").to_string_lossy().into_owned();
    config.terminal.timezone = "UTC".to_string();
    config.terminal.manual_entry = false;
    config.terminal.bell = false;
    config.status.enabled = false;
    config.ocr.enabled = false;
    config
}

#[tokio::test]
async fn test_orchestrator_creation() {
    let dir = TempDir::new().unwrap();
    let orchestrator = CounterOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();

    assert_eq!(orchestrator.component_names(), vec!["scanner", "audit"]);
    assert!(orchestrator.get_all_component_states().await.is_empty());
    assert_eq!(orchestrator.registry().lookup_count(), 0);
}

#[tokio::test]
async fn test_missing_orders_file_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.registry.orders_path = dir.path().join("nope.json").to_string_lossy().into_owned();

    assert!(CounterOrchestrator::new(config).await.is_err());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.terminal.timezone = "Mars/Olympus_Mons".to_string();

    assert!(matches!(
        CounterOrchestrator::new(config).await,
        Err(crate::error::CounterError::Config(_))
    ));
}

#[tokio::test]
async fn test_keyboard_registration_follows_flag() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = CounterOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();

    orchestrator.set_keyboard_enabled(true);
    assert!(orchestrator.component_names().contains(&"keyboard"));

    orchestrator.set_keyboard_enabled(false);
    orchestrator.initialize().await.unwrap();
    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 2);
    assert!(!states.contains_key("keyboard"));
}

#[tokio::test]
async fn test_full_lifecycle_with_operator_quit() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let audit_path = config.audit.path.clone();

    let mut orchestrator = CounterOrchestrator::new(config).await.unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    assert_eq!(
        orchestrator.get_component_state("scanner").await,
        Some(ComponentState::Running)
    );
    assert_eq!(
        orchestrator.get_component_state("audit").await,
        Some(ComponentState::Running)
    );

    let record = orchestrator
        .scanner_handle()
        .submit_manual("k7q2xz")
        .await
        .unwrap();
    assert_eq!(record.outcome_label(), "success");

    // The audit follower writes asynchronously
    let mut audited = String::new();
    for _ in 0..50 {
        audited = tokio::fs::read_to_string(&audit_path).await.unwrap_or_default();
        if !audited.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(audited.contains("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F"));

    let event_bus = orchestrator.event_bus();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        event_bus
            .publish(ScanEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "test".to_string(),
            })
            .await
            .unwrap();
    });

    let exit_code = tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);

    let states = orchestrator.get_all_component_states().await;
    assert!(states.values().all(|s| *s == ComponentState::Stopped));

    let snapshot_after = orchestrator.scanner_handle().reset().await;
    assert!(snapshot_after.is_err());
}

#[tokio::test]
async fn test_stop_order_keeps_audit_after_scanner() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = CounterOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();
    orchestrator.set_keyboard_enabled(true);

    assert_eq!(orchestrator.stop_order(), vec!["keyboard", "scanner", "audit"]);
}

#[tokio::test]
async fn test_shutdown_writes_last_resolution() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let audit_path = config.audit.path.clone();

    let mut orchestrator = CounterOrchestrator::new(config).await.unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let record = orchestrator
        .scanner_handle()
        .submit_manual("000000")
        .await
        .unwrap();
    assert_eq!(record.outcome_label(), "not_found");

    // Shut down straight away, before the follower has written anything
    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);

    let audited = tokio::fs::read_to_string(&audit_path).await.unwrap();
    assert!(audited.contains(&record.attempt_id.to_string()));
    assert_eq!(
        orchestrator.get_component_state("audit").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_run_twice_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = CounterOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();
    orchestrator.shutdown_sender.take();

    assert!(orchestrator.run().await.is_err());
}

#[tokio::test]
async fn test_component_state_transitions() {
    let dir = TempDir::new().unwrap();
    let orchestrator = Arc::new(
        CounterOrchestrator::new(create_test_config(&dir))
            .await
            .unwrap(),
    );

    let component = "test_component";
    assert_eq!(orchestrator.get_component_state(component).await, None);

    for state in [
        ComponentState::Starting,
        ComponentState::Running,
        ComponentState::Stopping,
        ComponentState::Stopped,
    ] {
        orchestrator.set_component_state(component, state.clone()).await;
        assert_eq!(orchestrator.get_component_state(component).await, Some(state));
    }

    let mut handles = Vec::new();
    for i in 0..10 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            let name = format!("component_{}", i);
            orchestrator.set_component_state(&name, ComponentState::Running).await;
            orchestrator.get_component_state(&name).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Some(ComponentState::Running));
    }
    assert_eq!(orchestrator.get_all_component_states().await.len(), 11);
}

#[test]
fn test_shutdown_reason_debug_formatting() {
    let reasons = vec![
        ShutdownReason::Signal("SIGTERM".to_string()),
        ShutdownReason::Error("bus closed".to_string()),
        ShutdownReason::UserRequest,
    ];

    for reason in reasons {
        let debug_str = format!("{:?}", reason);
        match reason {
            ShutdownReason::Signal(ref sig) => assert!(debug_str.contains(sig)),
            ShutdownReason::Error(ref msg) => assert!(debug_str.contains(msg)),
            ShutdownReason::UserRequest => assert!(debug_str.contains("UserRequest")),
        }
    }
}
