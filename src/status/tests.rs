use super::*;
use crate::config::{ScannerConfig, StatusConfig, SuccessPolicy};
use crate::decoder::MockDecoder;
use crate::events::EventBus;
use crate::registry::{InMemoryRegistry, OrderRecord, OrderStatus};
use crate::scanner::ScanOrchestrator;
use crate::source::LatestFrameSlot;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use std::sync::Arc;
use tower::ServiceExt;

struct Fixture {
    orchestrator: ScanOrchestrator,
    state: ServerState,
    registry: Arc<InMemoryRegistry>,
}

async fn fixture() -> Fixture {
    let slot = Arc::new(LatestFrameSlot::new("status-test"));
    let registry = Arc::new(InMemoryRegistry::new(vec![OrderRecord {
        id: "3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F".to_string(),
        short_code: Some("K7Q2XZ".to_string()),
        status: OrderStatus::Pending,
        consumption_date: Utc::now().date_naive(),
        dish_ref: "feijoada".to_string(),
        holder_ref: "student-42".to_string(),
    }]));
    let event_bus = Arc::new(EventBus::new(64));

    let mut orchestrator = ScanOrchestrator::builder()
        .config(ScannerConfig {
            tick_interval_ms: 300,
            cooldown_ms: 2500,
            lookup_timeout_ms: 5000,
            success_policy: SuccessPolicy::AutoResume,
            ocr_min_decode_misses: 3,
        })
        .source(slot.clone())
        .decoder(Arc::new(MockDecoder::new()))
        .registry(registry.clone())
        .event_bus(event_bus.clone())
        .build()
        .unwrap();
    orchestrator.start().await.unwrap();

    let state = ServerState {
        scanner: orchestrator.handle(),
        event_bus,
        source: slot,
    };

    Fixture {
        orchestrator,
        state,
        registry,
    }
}

async fn call(state: &ServerState, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_and_state() {
    let mut fixture = fixture().await;

    let (status, health) = call(&fixture.state, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["frames_available"], false);
    assert_eq!(health["source"], "status-test");

    let (status, state) = call(&fixture.state, "GET", "/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["state"], "idle");

    fixture.orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_manual_command_flow() {
    let mut fixture = fixture().await;

    let (status, record) = call(
        &fixture.state,
        "POST",
        "/commands/manual",
        Some(r#"{"code":"k7q2xz"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["outcome"]["outcome"], "success");
    assert_eq!(record["order_id"], "3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F");

    let (status, _) = call(
        &fixture.state,
        "POST",
        "/commands/manual",
        Some(r#"{"code":"K7Q2XZ"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, served) = call(&fixture.state, "POST", "/commands/serve", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served["status"], "confirmed");

    let (status, _) = call(&fixture.state, "POST", "/commands/serve", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(fixture.registry.mutation_count(), 1);

    let (status, state) = call(&fixture.state, "POST", "/commands/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["state"], "idle");

    fixture.orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_command_rejections() {
    let mut fixture = fixture().await;

    let (status, body) = call(
        &fixture.state,
        "POST",
        "/commands/manual",
        Some(r#"{"code":"K7-Q2"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("invalid character"));
    assert_eq!(fixture.registry.lookup_count(), 0);

    let (status, _) = call(&fixture.state, "POST", "/commands/continue", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // No OCR service configured
    let (status, _) = call(&fixture.state, "POST", "/commands/ocr", None).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    fixture.orchestrator.stop().await.unwrap();

    let (status, _) = call(&fixture.state, "POST", "/commands/reset", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_builder_requires_components() {
    let fixture = fixture().await;

    let missing = StatusServer::builder()
        .config(StatusConfig {
            enabled: true,
            ip: "127.0.0.1".to_string(),
            port: 0,
        })
        .event_bus(fixture.state.event_bus.clone())
        .build();
    assert!(missing.is_err());

    let server = StatusServer::builder()
        .config(StatusConfig {
            enabled: true,
            ip: "127.0.0.1".to_string(),
            port: 8088,
        })
        .scanner(fixture.state.scanner.clone())
        .event_bus(fixture.state.event_bus.clone())
        .source(fixture.state.source.clone())
        .build()
        .unwrap();
    assert_eq!(server.address(), "127.0.0.1:8088");
}
