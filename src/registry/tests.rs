use super::*;
use crate::code::Code;
use crate::error::RegistryError;
use chrono::NaiveDate;
use std::time::Duration;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

fn record(id: &str, short: Option<&str>, status: OrderStatus, date: NaiveDate) -> OrderRecord {
    OrderRecord {
        id: id.to_string(),
        short_code: short.map(str::to_string),
        status,
        consumption_date: date,
        dish_ref: "dish-1".to_string(),
        holder_ref: "holder-1".to_string(),
    }
}

fn sample_registry() -> InMemoryRegistry {
    InMemoryRegistry::new(vec![
        record("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F", Some("K7Q2XZ"), OrderStatus::Pending, day(10)),
        record("AB12CD34-0000-4000-8000-000000000001", None, OrderStatus::Canceled, day(10)),
        record("AB12CD34-0000-4000-8000-000000000002", Some("ZZZ999"), OrderStatus::Confirmed, day(10)),
    ])
}

#[test]
fn test_eligibility() {
    let pending = record("a", Some("AAAAAA"), OrderStatus::Pending, day(10));
    assert_eq!(pending.eligibility(day(10)), Eligibility::Ready);
    assert_eq!(
        pending.eligibility(day(11)),
        Eligibility::WrongDay {
            consumption_date: day(10)
        }
    );

    let served = record("b", None, OrderStatus::Confirmed, day(10));
    assert_eq!(served.eligibility(day(10)), Eligibility::AlreadyServed);

    let canceled = record("c", None, OrderStatus::Canceled, day(10));
    assert_eq!(canceled.eligibility(day(10)), Eligibility::Canceled);
    assert!(!canceled.eligibility(day(10)).is_ready());
}

#[test]
fn test_record_matching() {
    let r = record("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F", Some("K7Q2XZ"), OrderStatus::Pending, day(10));

    assert!(r.matches(&Code::ShortCode("K7Q2XZ".into())));
    assert!(r.matches(&Code::LongIdentifier("3f2a9c1e-77b0-4d2a-9e11-0c5b8a1d2e3f".into())));
    assert!(!r.matches(&Code::ShortCode("000000".into())));
    // A short code is never compared against the long id and vice versa
    assert!(!r.matches(&Code::LongIdentifier("K7Q2XZ".into())));
}

#[tokio::test]
async fn test_lookup_by_short_code_and_identifier() {
    let registry = sample_registry();

    let found = registry
        .lookup(&Code::ShortCode("K7Q2XZ".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F");

    let canceled = registry
        .lookup(&Code::LongIdentifier("AB12CD34-0000-4000-8000-000000000001".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);

    let missing = registry.lookup(&Code::ShortCode("000000".into())).await.unwrap();
    assert!(missing.is_none());
    assert_eq!(registry.lookup_count(), 3);
    assert_eq!(registry.mutation_count(), 0);
}

#[tokio::test]
async fn test_lookup_never_mutates() {
    let registry = sample_registry();
    let before = registry.get("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F").unwrap();

    for _ in 0..5 {
        registry.lookup(&Code::ShortCode("K7Q2XZ".into())).await.unwrap();
    }

    assert_eq!(registry.get("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F").unwrap(), before);
}

#[tokio::test]
async fn test_outage_is_transient() {
    let registry = sample_registry();
    registry.set_outage(Some("connection refused"));

    let err = registry
        .lookup(&Code::ShortCode("K7Q2XZ".into()))
        .await
        .unwrap_err();
    assert!(err.is_transient());

    registry.set_outage(None);
    assert!(registry
        .lookup(&Code::ShortCode("K7Q2XZ".into()))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_latency_can_exceed_timeout() {
    let registry = sample_registry();
    registry.set_latency(Duration::from_secs(10));

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        registry.lookup(&Code::ShortCode("K7Q2XZ".into())),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_mark_served_rules() {
    let registry = sample_registry();

    let served = registry
        .mark_served("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F")
        .await
        .unwrap();
    assert_eq!(served.status, OrderStatus::Confirmed);
    assert_eq!(registry.mutation_count(), 1);

    let again = registry
        .mark_served("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F")
        .await
        .unwrap_err();
    assert!(matches!(again, RegistryError::ServeRefused { .. }));

    let canceled = registry
        .mark_served("AB12CD34-0000-4000-8000-000000000001")
        .await
        .unwrap_err();
    assert!(matches!(canceled, RegistryError::ServeRefused { .. }));

    let unknown = registry.mark_served("nope").await.unwrap_err();
    assert!(matches!(unknown, RegistryError::UnknownOrder { .. }));
    assert_eq!(registry.mutation_count(), 1);
}

#[tokio::test]
async fn test_json_file_round_trip_with_persist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.json");
    let json = r#"[
        {
            "id": "3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F",
            "short_code": "K7Q2XZ",
            "status": "pending",
            "consumption_date": "2024-05-10",
            "dish_ref": "feijoada",
            "holder_ref": "student-42"
        }
    ]"#;
    tokio::fs::write(&path, json).await.unwrap();

    let registry = InMemoryRegistry::from_json_file(&path, true).await.unwrap();
    registry
        .mark_served("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F")
        .await
        .unwrap();

    let reloaded = InMemoryRegistry::from_json_file(&path, false).await.unwrap();
    let record = reloaded.get("3F2A9C1E-77B0-4D2A-9E11-0C5B8A1D2E3F").unwrap();
    assert_eq!(record.status, OrderStatus::Confirmed);
    assert_eq!(record.dish_ref, "feijoada");
}

#[tokio::test]
async fn test_missing_json_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = InMemoryRegistry::from_json_file(dir.path().join("absent.json"), false).await;
    assert!(result.is_err());
}
