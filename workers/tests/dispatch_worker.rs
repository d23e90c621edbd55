//! Behavior tests for the claim-and-dispatch worker over in-memory adapters.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code uses unwrap for clear failures

use chrono::Utc;
use stayline_core::backoff::backoff_delay;
use stayline_core::queue::{ConsumerRole, NewQueueEntry, QueueEntryStatus};
use stayline_testing::{InMemoryBusPublisher, InMemoryPipeline};
use stayline_workers::{DispatchConfig, DispatchWorker};
use std::sync::Arc;

fn new_entry(aggregate_id: &str) -> NewQueueEntry {
    NewQueueEntry {
        aggregate_type: "booking".to_string(),
        aggregate_id: aggregate_id.to_string(),
        event_type: "booking.confirmed".to_string(),
        topic: "booking-events".to_string(),
        payload: serde_json::json!({"booking_id": aggregate_id}),
        headers: serde_json::json!({}),
        tenant_id: "acme".to_string(),
        entity_id: Some("prop-7".to_string()),
        schema_version: 1,
        correlation_id: None,
    }
}

fn worker_with(
    pipeline: &InMemoryPipeline,
    bus: &InMemoryBusPublisher,
    config: DispatchConfig,
) -> DispatchWorker {
    let (worker, _shutdown) = DispatchWorker::new(
        Arc::new(pipeline.clone()),
        Some(Arc::new(bus.clone())),
        config,
    );
    worker
}

// Scenario A: a pending entry is published and finalized.
#[tokio::test]
async fn successful_dispatch_publishes_and_finalizes() {
    let pipeline = InMemoryPipeline::new();
    let bus = InMemoryBusPublisher::new();
    let id = pipeline.insert_for(ConsumerRole::Dispatch, new_entry("42"));

    let worker = worker_with(&pipeline, &bus, DispatchConfig::default());
    assert_eq!(worker.run_once().await.unwrap(), 1);

    let entry = pipeline.entry(id).unwrap();
    assert_eq!(entry.status, QueueEntryStatus::Published);
    assert!(entry.published_at_utc.is_some());
    assert_eq!(entry.next_attempt_utc, None);
    assert_eq!(entry.attempt_count, 1);

    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].message_id, id);
    assert_eq!(published[0].topic, "booking-events");
    assert_eq!(published[0].session_id.as_deref(), Some("acme:prop-7"));
}

// Scenario B: the first failed publish reschedules with a 2-second backoff.
#[tokio::test]
async fn failed_publish_reschedules_with_backoff() {
    let pipeline = InMemoryPipeline::new();
    let bus = InMemoryBusPublisher::new();
    let id = pipeline.insert_for(ConsumerRole::Dispatch, new_entry("42"));
    bus.fail_next(1);

    let worker = worker_with(&pipeline, &bus, DispatchConfig::default());
    let before = Utc::now();
    worker.run_once().await.unwrap();
    let after = Utc::now();

    let entry = pipeline.entry(id).unwrap();
    assert_eq!(entry.status, QueueEntryStatus::Pending);
    assert_eq!(entry.attempt_count, 1);
    assert!(entry.last_error.is_some());

    let next = entry.next_attempt_utc.expect("rescheduled entry has a due time");
    assert!(next >= before + backoff_delay(1));
    assert!(next <= after + backoff_delay(1));
    assert_eq!(bus.published_count(), 0);
}

// P4: consecutive failures back off as 2^n seconds.
#[tokio::test]
async fn backoff_doubles_per_consecutive_failure() {
    let pipeline = InMemoryPipeline::new();
    let bus = InMemoryBusPublisher::new();
    let id = pipeline.insert_for(ConsumerRole::Dispatch, new_entry("42"));
    let worker = worker_with(&pipeline, &bus, DispatchConfig::default());

    for attempt in 1..=3 {
        bus.fail_next(1);
        let before = Utc::now();
        worker.run_once().await.unwrap();
        let after = Utc::now();

        let entry = pipeline.entry(id).unwrap();
        assert_eq!(entry.attempt_count, attempt);
        let next = entry.next_attempt_utc.unwrap();
        assert!(next >= before + backoff_delay(attempt));
        assert!(next <= after + backoff_delay(attempt));

        pipeline.make_due(id);
    }
}

// Scenario C / P5: the fifth failure under max_attempts=5 is terminal and the
// row disappears from subsequent polls.
#[tokio::test]
async fn exhausted_entry_fails_terminally_and_is_excluded() {
    let pipeline = InMemoryPipeline::new();
    let bus = InMemoryBusPublisher::new();
    let id = pipeline.insert_for(ConsumerRole::Dispatch, new_entry("42"));
    let worker = worker_with(&pipeline, &bus, DispatchConfig::default().with_max_attempts(5));

    bus.fail_next(5);
    for _ in 0..5 {
        worker.run_once().await.unwrap();
        pipeline.make_due(id);
    }

    let entry = pipeline.entry(id).unwrap();
    assert_eq!(entry.status, QueueEntryStatus::Failed);
    assert_eq!(entry.attempt_count, 5);
    assert_eq!(entry.next_attempt_utc, None);

    // A subsequent poll does not select the failed row.
    assert_eq!(worker.run_once().await.unwrap(), 0);
    assert_eq!(bus.published_count(), 0);
}

// P1: a cycle never processes more than batch_size rows.
#[tokio::test]
async fn batch_size_bounds_each_cycle() {
    let pipeline = InMemoryPipeline::new();
    let bus = InMemoryBusPublisher::new();
    for i in 0..10 {
        pipeline.insert_for(ConsumerRole::Dispatch, new_entry(&i.to_string()));
    }

    let worker = worker_with(&pipeline, &bus, DispatchConfig::default().with_batch_size(3));
    assert_eq!(worker.run_once().await.unwrap(), 3);
    assert_eq!(bus.published_count(), 3);

    // The rest drains over subsequent cycles.
    assert_eq!(worker.run_once().await.unwrap(), 3);
    assert_eq!(worker.run_once().await.unwrap(), 3);
    assert_eq!(worker.run_once().await.unwrap(), 1);
    assert_eq!(bus.published_count(), 10);
}

// An absent bus configuration disables the worker without touching the queue.
#[tokio::test]
async fn missing_bus_configuration_is_a_clean_noop() {
    let pipeline = InMemoryPipeline::new();
    let id = pipeline.insert_for(ConsumerRole::Dispatch, new_entry("42"));

    let (worker, _shutdown) =
        DispatchWorker::new(Arc::new(pipeline.clone()), None, DispatchConfig::default());
    assert_eq!(worker.run_once().await.unwrap(), 0);

    let entry = pipeline.entry(id).unwrap();
    assert_eq!(entry.status, QueueEntryStatus::Pending);
    assert_eq!(entry.attempt_count, 0);
}

// Retry after a transient failure eventually publishes exactly once.
#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let pipeline = InMemoryPipeline::new();
    let bus = InMemoryBusPublisher::new();
    let id = pipeline.insert_for(ConsumerRole::Dispatch, new_entry("42"));
    let worker = worker_with(&pipeline, &bus, DispatchConfig::default());

    bus.fail_next(1);
    worker.run_once().await.unwrap();
    pipeline.make_due(id);
    worker.run_once().await.unwrap();

    let entry = pipeline.entry(id).unwrap();
    assert_eq!(entry.status, QueueEntryStatus::Published);
    assert_eq!(entry.attempt_count, 2);
    // The failure that preceded success stays on record for audit.
    assert!(entry.last_error.is_some());
    assert_eq!(bus.published_count(), 1);
}
