mod common;

use chrono::Utc;
use rust_decimal_macros::dec;
use std::time::Duration;

use common::{enrol_scope, Harness};
use paynl_bridge::database::TransactionStore;
use paynl_bridge::payments::scope;
use paynl_bridge::payments::types::{RemoteObservation, Scope, ScopeField};
use paynl_bridge::{CreatePaymentRequest, EngineConfig, PaymentError};

fn enrol_request() -> CreatePaymentRequest {
    CreatePaymentRequest {
        user_id: 7,
        component: "enrol_fee".to_string(),
        payment_area: "fee".to_string(),
        item_id: 42,
        description: "Course enrolment".to_string(),
        payment_method_id: None,
        bank_id: None,
    }
}

#[tokio::test]
async fn test_paid_transaction_is_recorded_and_delivered_once() {
    let h = Harness::new();

    let created = h.initiator.initiate(enrol_request()).await.unwrap();
    let record = h.record(&created.transaction_id).await;
    assert_eq!(record.status, "INIT");
    assert_eq!(record.status_code, 0);

    h.gateway.transition(&created.transaction_id, 100, "PAID");

    let observation = h.engine.reconcile(None, Some(record.clone())).await.unwrap();
    assert!(observation.is_paid());

    let stored = h.record(&created.transaction_id).await;
    assert_eq!(stored.status, "PAID");
    assert_eq!(stored.status_code, 100);
    assert_eq!(stored.payment_id, Some(1000));
    assert_eq!(stored.delivery_attempts, 1);

    let payments = h.host.payment_requests();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].scope, enrol_scope());
    assert_eq!(payments[0].amount, dec!(19.99));
    assert_eq!(payments[0].currency, "EUR");
    assert_eq!(payments[0].gateway, "paynl");
    assert_eq!(payments[0].reference, record.id);
    assert_eq!(h.host.deliveries(), vec![(enrol_scope(), 1000)]);

    // Reconciling the now-consistent record again changes nothing
    h.engine.reconcile(None, Some(stored.clone())).await.unwrap();
    assert_eq!(h.record(&created.transaction_id).await, stored);
    assert_eq!(h.host.payment_requests().len(), 1);
    assert_eq!(h.host.deliver_calls(), 1);
}

#[tokio::test]
async fn test_surcharge_applies_to_recorded_amount() {
    let h = Harness::with_config(EngineConfig {
        surcharge_percent: dec!(2.5),
        ..Default::default()
    });

    let created = h.initiator.initiate(enrol_request()).await.unwrap();
    assert_eq!(h.gateway.created()[0].amount, dec!(20.49));

    h.gateway.transition(&created.transaction_id, 100, "PAID");
    let record = h.record(&created.transaction_id).await;
    h.engine.reconcile(None, Some(record)).await.unwrap();

    assert_eq!(h.host.payment_requests()[0].amount, dec!(20.49));
}

#[tokio::test]
async fn test_unchanged_status_leaves_record_untouched() {
    let h = Harness::new();
    let record = h.seed(enrol_scope(), "EX-PENDING", 20, Utc::now()).await;
    h.gateway
        .set_status("EX-PENDING", 20, "PENDING", "enrol_fee|fee|42|7");

    h.engine.reconcile(None, Some(record.clone())).await.unwrap();

    assert_eq!(h.record("EX-PENDING").await, record);
    assert_eq!(h.host.deliver_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_status_is_stored_without_delivery() {
    let h = Harness::new();
    let record = h.seed(enrol_scope(), "EX-CANCEL", 20, Utc::now()).await;
    h.gateway
        .set_status("EX-CANCEL", -90, "CANCEL", "enrol_fee|fee|42|7");

    let observation = h.engine.reconcile(None, Some(record)).await.unwrap();
    assert!(observation.is_canceled());

    let stored = h.record("EX-CANCEL").await;
    assert_eq!(stored.status, "CANCEL");
    assert_eq!(stored.status_code, -90);
    assert_eq!(stored.payment_id, None);
    assert!(h.host.payment_requests().is_empty());
}

#[tokio::test]
async fn test_scope_mismatch_is_reported_per_field() {
    let cases = [
        ("enrol_other|fee|42|7", ScopeField::Component),
        ("enrol_fee|other|42|7", ScopeField::PaymentArea),
        ("enrol_fee|fee|43|7", ScopeField::ItemId),
        ("enrol_fee|fee|42|8", ScopeField::UserId),
    ];

    for (metadata, expected) in cases {
        let h = Harness::new();
        let record = h.seed(enrol_scope(), "EX-SCOPE", 0, Utc::now()).await;
        let observation = RemoteObservation {
            order_id: "EX-SCOPE".to_string(),
            status_code: 100,
            status_name: "PAID".to_string(),
            metadata: metadata.to_string(),
        };

        let err = h
            .engine
            .reconcile(Some(observation), Some(record.clone()))
            .await
            .unwrap_err();

        match err {
            PaymentError::ScopeMismatch { field } => assert_eq!(field, expected, "{}", metadata),
            other => panic!("expected scope mismatch for {}, got {:?}", metadata, other),
        }
        assert_eq!(h.record("EX-SCOPE").await, record);
        assert_eq!(h.host.deliver_calls(), 0);
    }
}

#[tokio::test]
async fn test_reconcile_requires_observation_or_record() {
    let h = Harness::new();
    let err = h.engine.reconcile(None, None).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_observation_without_local_record_is_not_found() {
    let h = Harness::new();
    let observation = RemoteObservation {
        order_id: "EX-UNKNOWN".to_string(),
        status_code: 100,
        status_name: "PAID".to_string(),
        metadata: "enrol_fee|fee|42|7".to_string(),
    };

    let err = h.engine.reconcile(Some(observation), None).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_failed_delivery_is_retried_with_same_reference() {
    let h = Harness::new();
    let record = h.seed(enrol_scope(), "EX-RETRY", 20, Utc::now()).await;
    h.gateway
        .set_status("EX-RETRY", 100, "PAID", "enrol_fee|fee|42|7");
    h.host.fail_deliveries(1);

    let err = h.engine.reconcile(None, Some(record.clone())).await.unwrap_err();
    assert!(matches!(err, PaymentError::DeliveryFailed { .. }));
    assert!(err.is_retryable());

    let stored = h.record("EX-RETRY").await;
    assert_eq!(stored.status_code, 100);
    assert_eq!(stored.payment_id, None);
    assert_eq!(stored.delivery_attempts, 1);

    h.engine.reconcile(None, Some(stored)).await.unwrap();

    let stored = h.record("EX-RETRY").await;
    assert!(stored.is_delivered());
    assert_eq!(stored.delivery_attempts, 2);
    assert_eq!(h.host.deliveries().len(), 1);

    let payments = h.host.payment_requests();
    assert_eq!(payments.len(), 2);
    assert!(payments.iter().all(|p| p.reference == record.id));
}

#[tokio::test]
async fn test_delivery_gives_up_after_max_attempts() {
    let h = Harness::with_config(EngineConfig {
        max_delivery_attempts: 2,
        ..Default::default()
    });
    h.seed(enrol_scope(), "EX-STUCK", 20, Utc::now()).await;
    h.gateway
        .set_status("EX-STUCK", 100, "PAID", "enrol_fee|fee|42|7");
    h.host.fail_deliveries(10);

    for _ in 0..2 {
        let record = h.record("EX-STUCK").await;
        assert!(h.engine.reconcile(None, Some(record)).await.is_err());
    }
    assert_eq!(h.host.deliver_calls(), 2);

    let record = h.record("EX-STUCK").await;
    let err = h.engine.reconcile(None, Some(record)).await.unwrap_err();
    assert!(err.to_string().contains("gave up after 2 attempts"));
    assert_eq!(h.host.deliver_calls(), 2);
    assert_eq!(h.record("EX-STUCK").await.delivery_attempts, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconciles_deliver_exactly_once() {
    let h = Harness::new();
    let record = h.seed(enrol_scope(), "EX-RACE", 20, Utc::now()).await;
    h.gateway
        .set_status("EX-RACE", 100, "PAID", "enrol_fee|fee|42|7");
    let observation = h.gateway.observation("EX-RACE");

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = h.engine.clone();
        let record = record.clone();
        let observation = observation.clone();
        handles.push(tokio::spawn(async move {
            match i % 3 {
                0 => engine.reconcile(Some(observation), None).await,
                1 => engine.reconcile(None, Some(record)).await,
                _ => engine.reconcile(Some(observation), Some(record)).await,
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.host.payment_requests().len(), 1);
    assert_eq!(h.host.deliveries().len(), 1);
    let stored = h.record("EX-RACE").await;
    assert_eq!(stored.payment_id, Some(1000));
    assert_eq!(stored.delivery_attempts, 1);
}

#[tokio::test]
async fn test_unreachable_processor_leaves_record_untouched() {
    let h = Harness::new();
    let record = h.seed(enrol_scope(), "EX-DOWN", 20, Utc::now()).await;
    h.gateway
        .set_status("EX-DOWN", 100, "PAID", "enrol_fee|fee|42|7");
    h.gateway.set_unavailable(true);

    let err = h.engine.reconcile(None, Some(record.clone())).await.unwrap_err();
    assert!(matches!(err, PaymentError::RemoteUnavailable { .. }));
    assert_eq!(h.record("EX-DOWN").await, record);
}

#[tokio::test]
async fn test_slow_processor_times_out() {
    let h = Harness::with_config(EngineConfig {
        remote_timeout: Duration::from_millis(50),
        ..Default::default()
    });
    let record = h.seed(enrol_scope(), "EX-SLOW", 20, Utc::now()).await;
    h.gateway
        .set_status("EX-SLOW", 100, "PAID", "enrol_fee|fee|42|7");
    h.gateway.set_delay(Duration::from_millis(500));

    let err = h.engine.reconcile(None, Some(record.clone())).await.unwrap_err();
    assert!(matches!(err, PaymentError::RemoteUnavailable { .. }));
    assert_eq!(h.record("EX-SLOW").await, record);
    assert_eq!(h.host.deliver_calls(), 0);
}

#[tokio::test]
async fn test_scope_metadata_round_trips_through_initiation() {
    let h = Harness::new();
    let created = h.initiator.initiate(enrol_request()).await.unwrap();

    let metadata = h.gateway.observation(&created.transaction_id).metadata;
    assert_eq!(metadata, "enrol_fee|fee|42|7");

    let record = h.record(&created.transaction_id).await;
    assert!(scope::verify(&metadata, &record).is_ok());
    assert_eq!(record.scope(), Scope::new("enrol_fee", "fee", 42, 7));
    assert_eq!(
        h.store.find_by_user(7).await.unwrap().len(),
        1,
        "record is listed under the paying user"
    );
}

#[tokio::test]
async fn test_observation_for_another_attempt_of_same_item_is_rejected() {
    let h = Harness::new();
    let first = h.seed(enrol_scope(), "EX-FIRST", 20, Utc::now()).await;
    h.seed(enrol_scope(), "EX-SECOND", 20, Utc::now()).await;
    h.gateway
        .set_status("EX-FIRST", -90, "CANCEL", "enrol_fee|fee|42|7");
    h.gateway
        .set_status("EX-SECOND", 100, "PAID", "enrol_fee|fee|42|7");

    let err = h
        .engine
        .reconcile(Some(h.gateway.observation("EX-SECOND")), Some(first.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidArgument { .. }));
    assert_eq!(h.record("EX-FIRST").await, first);

    let second = h.record("EX-SECOND").await;
    h.engine.reconcile(None, Some(second)).await.unwrap();

    assert!(h.record("EX-SECOND").await.is_delivered());
    assert_eq!(h.record("EX-FIRST").await.payment_id, None);
    assert_eq!(h.host.deliveries().len(), 1);
}

#[tokio::test]
async fn test_delivered_record_on_last_attempt_stays_delivered() {
    let h = Harness::with_config(EngineConfig {
        max_delivery_attempts: 1,
        ..Default::default()
    });
    h.seed(enrol_scope(), "EX-LAST", 20, Utc::now()).await;
    h.gateway
        .set_status("EX-LAST", 100, "PAID", "enrol_fee|fee|42|7");

    let record = h.record("EX-LAST").await;
    h.engine.reconcile(None, Some(record)).await.unwrap();
    assert_eq!(h.record("EX-LAST").await.delivery_attempts, 1);

    h.gateway.transition("EX-LAST", 85, "VERIFY");
    let record = h.record("EX-LAST").await;
    h.engine.reconcile(None, Some(record)).await.unwrap();
    assert_eq!(h.record("EX-LAST").await.status_code, 85);

    h.gateway.transition("EX-LAST", 100, "PAID");
    let record = h.record("EX-LAST").await;
    h.engine.reconcile(None, Some(record)).await.unwrap();

    let stored = h.record("EX-LAST").await;
    assert_eq!(stored.status_code, 100);
    assert!(stored.is_delivered());
    assert_eq!(h.host.deliver_calls(), 1);
}
