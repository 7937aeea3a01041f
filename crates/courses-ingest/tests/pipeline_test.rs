//! End-to-end pipeline runs against in-memory collaborators

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courses_common::{CourseKey, Enrichment};
use courses_ingest::enrich::{AdmissionControl, EnrichmentProvider};
use courses_ingest::models::EnrichedEntity;
use courses_ingest::sink::{BulkIndexer, BulkTransport, IndexTarget, RowSink, Sinks};
use courses_ingest::{IngestError, ParseError, Pipeline, ProviderError, SinkError};
use serde_json::json;

/// Provider that counts calls per group and tracks peak concurrency.
#[derive(Default)]
struct CountingProvider {
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
    failing_department: Option<&'static str>,
}

impl CountingProvider {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn calls_for(&self, group: &str) -> usize {
        self.calls.lock().unwrap().get(group).copied().unwrap_or(0)
    }
}

#[async_trait]
impl EnrichmentProvider for CountingProvider {
    async fn lookup(&self, course: &CourseKey, _term: &str) -> Result<Option<String>, ProviderError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(course.group_key().to_string())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Some(course.department()) == self.failing_department {
            return Err(ProviderError::Other("503 from bulletin".into()));
        }
        if course.department() == "ACTU" {
            return Ok(None);
        }
        Ok(Some(format!("Description of {}", course.full_code())))
    }
}

#[derive(Default)]
struct RecordingRowSink {
    rows: Mutex<Vec<EnrichedEntity>>,
}

#[async_trait]
impl RowSink for RecordingRowSink {
    async fn write(&self, row: &EnrichedEntity) -> Result<(), SinkError> {
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTransport {
    bodies: Mutex<Vec<String>>,
}

#[async_trait]
impl BulkTransport for RecordingTransport {
    async fn send(&self, body: String, _documents: usize) -> Result<(), SinkError> {
        self.bodies.lock().unwrap().push(body);
        Ok(())
    }
}

fn section(code: &str) -> serde_json::Value {
    json!({
        "Course": code,
        "Term": "20143",
        "CourseTitle": "TOPICS IN COMPUTER SCIENCE",
        "CallNumber": "012345",
        "Meets1": "MW     10:10A-11:25A    MATH       417"
    })
}

fn input(codes: &[&str]) -> Vec<u8> {
    let records: Vec<_> = codes.iter().map(|code| section(code)).collect();
    serde_json::to_vec(&records).unwrap()
}

fn pipeline(provider: Arc<CountingProvider>, workers: usize, max_requests: usize) -> Pipeline {
    Pipeline::new(provider, AdmissionControl::new(max_requests))
        .with_workers(workers)
        .with_queue_capacity(4)
}

#[tokio::test]
async fn test_shared_group_triggers_one_call() {
    let provider = Arc::new(CountingProvider::with_delay(Duration::from_millis(20)));
    let rows = Arc::new(RecordingRowSink::default());

    let summary = pipeline(provider.clone(), 4, 2)
        .run(
            std::io::Cursor::new(input(&["COMS4995W001", "COMS4995W002", "COMS4995W003"])),
            Sinks::new().with_rows(rows.clone()),
        )
        .await
        .unwrap();

    assert_eq!(provider.total_calls(), 1);
    assert_eq!(summary.groups_computed, 1);
    assert_eq!(summary.rows_written, 3);

    let rows = rows.rows.lock().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows
        .iter()
        .all(|row| row.enrichment.text() == Some("Description of COMSW4995")));

    let mut instances: Vec<_> = rows
        .iter()
        .map(|row| row.entity.instance_key.to_string())
        .collect();
    instances.sort();
    assert_eq!(instances, vec!["COMS4995W001", "COMS4995W002", "COMS4995W003"]);
}

#[tokio::test]
async fn test_each_group_is_looked_up_at_most_once() {
    let provider = Arc::new(CountingProvider::with_delay(Duration::from_millis(5)));
    let rows = Arc::new(RecordingRowSink::default());

    let mut codes = Vec::new();
    for department in ["COMS", "MATH", "PHYS", "ACTU", "HIST"] {
        for section in 1..=6 {
            codes.push(format!("{department}1001W{section:03}"));
        }
    }
    let codes: Vec<&str> = codes.iter().map(String::as_str).collect();

    let summary = pipeline(provider.clone(), 8, 3)
        .run(std::io::Cursor::new(input(&codes)), Sinks::new().with_rows(rows.clone()))
        .await
        .unwrap();

    assert_eq!(summary.processed, 30);
    assert_eq!(summary.groups_computed, 5);
    for group in ["COMS1001", "MATH1001", "PHYS1001", "ACTU1001", "HIST1001"] {
        assert_eq!(provider.calls_for(group), 1, "group {group}");
    }
    assert!(provider.peak.load(Ordering::SeqCst) <= 3);

    let rows = rows.rows.lock().unwrap();
    assert!(rows
        .iter()
        .filter(|row| row.entity.key.department() == "ACTU")
        .all(|row| row.enrichment == Enrichment::NoDescription));
}

#[tokio::test]
async fn test_admission_ceiling_below_worker_count() {
    let provider = Arc::new(CountingProvider::with_delay(Duration::from_millis(20)));
    let codes: Vec<String> = (0..12).map(|i| format!("DEPT{:04}W001", 1000 + i)).collect();
    let codes: Vec<&str> = codes.iter().map(String::as_str).collect();

    let summary = pipeline(provider.clone(), 10, 2)
        .run(std::io::Cursor::new(input(&codes)), Sinks::new())
        .await
        .unwrap();

    assert_eq!(summary.groups_computed, 12);
    assert!(provider.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_empty_array_writes_nothing() {
    let provider = Arc::new(CountingProvider::default());
    let rows = Arc::new(RecordingRowSink::default());
    let transport = Arc::new(RecordingTransport::default());

    let summary = pipeline(provider.clone(), 2, 2)
        .run(
            &b" [ ] "[..],
            Sinks::new()
                .with_rows(rows.clone())
                .with_bulk(BulkIndexer::new(transport.clone(), IndexTarget::new("courses"), 2)),
        )
        .await
        .unwrap();

    assert_eq!(summary.decoded, 0);
    assert_eq!(summary.bulk_flushes, 0);
    assert!(rows.rows.lock().unwrap().is_empty());
    assert!(transport.bodies.lock().unwrap().is_empty());
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn test_malformed_code_is_skipped() {
    let provider = Arc::new(CountingProvider::default());
    let rows = Arc::new(RecordingRowSink::default());

    let summary = pipeline(provider, 2, 2)
        .run(
            std::io::Cursor::new(input(&["COMS4995W001", "COMS4995W", "ACTU4850K001"])),
            Sinks::new().with_rows(rows.clone()),
        )
        .await
        .unwrap();

    assert_eq!(summary.decoded, 3);
    assert_eq!(summary.skipped_malformed_key, 1);
    assert_eq!(summary.processed, 2);
    assert_eq!(rows.rows.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_bulk_batches_of_two() {
    let provider = Arc::new(CountingProvider::default());
    let transport = Arc::new(RecordingTransport::default());
    let codes = [
        "COMS4995W001",
        "COMS4995W002",
        "MATH1101V001",
        "MATH1101V002",
        "ACTU4850K001",
    ];

    let summary = pipeline(provider, 3, 2)
        .run(
            std::io::Cursor::new(input(&codes)),
            Sinks::new().with_bulk(BulkIndexer::new(transport.clone(), IndexTarget::new("courses"), 2)),
        )
        .await
        .unwrap();

    assert_eq!(summary.bulk_flushes, 3);
    assert_eq!(summary.bulk_documents, 5);

    let bodies = transport.bodies.lock().unwrap();
    let sizes: Vec<usize> = bodies.iter().map(|body| body.lines().count() / 2).collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    let mut ids = Vec::new();
    for body in bodies.iter() {
        let lines: Vec<&str> = body.lines().collect();
        for pair in lines.chunks(2) {
            let action: serde_json::Value = serde_json::from_str(pair[0]).unwrap();
            let document: serde_json::Value = serde_json::from_str(pair[1]).unwrap();
            assert_eq!(action["index"]["_id"], document["Course"]);
            ids.push(document["Course"].as_str().unwrap().to_string());
        }
    }
    ids.sort();
    let mut expected: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_unavailable_is_cached_for_the_run() {
    let provider = Arc::new(CountingProvider {
        failing_department: Some("MATH"),
        ..Default::default()
    });
    let rows = Arc::new(RecordingRowSink::default());

    let summary = pipeline(provider.clone(), 1, 1)
        .run(
            std::io::Cursor::new(input(&["MATH1101V001", "MATH1101V002", "COMS4995W001"])),
            Sinks::new().with_rows(rows.clone()),
        )
        .await
        .unwrap();

    assert_eq!(provider.calls_for("MATH1101"), 1);
    assert_eq!(summary.enrichment_unavailable, 2);
    assert_eq!(summary.processed, 3);

    let rows = rows.rows.lock().unwrap();
    let unavailable = rows
        .iter()
        .filter(|row| row.enrichment == Enrichment::Unavailable)
        .count();
    assert_eq!(unavailable, 2);
}

#[tokio::test]
async fn test_framing_error_drains_dispatched_entities() {
    let provider = Arc::new(CountingProvider::default());
    let rows = Arc::new(RecordingRowSink::default());
    let transport = Arc::new(RecordingTransport::default());

    let mut bytes = input(&["COMS4995W001", "COMS4995W002", "COMS4995W003"]);
    // Replace the closing bracket with a bad separator
    bytes.pop();
    bytes.extend_from_slice(b" ; {}]");

    let err = pipeline(provider, 2, 2)
        .run(
            std::io::Cursor::new(bytes),
            Sinks::new()
                .with_rows(rows.clone())
                .with_bulk(BulkIndexer::new(transport.clone(), IndexTarget::new("courses"), 2)),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Parse(ParseError::UnexpectedSeparator { found: ';', .. })
    ));
    assert_eq!(rows.rows.lock().unwrap().len(), 3);

    let bodies = transport.bodies.lock().unwrap();
    let documents: usize = bodies.iter().map(|body| body.lines().count() / 2).sum();
    assert_eq!(bodies.len(), 2);
    assert_eq!(documents, 3);
}

#[tokio::test]
async fn test_normalized_fields_reach_sink() {
    let provider = Arc::new(CountingProvider::default());
    let rows = Arc::new(RecordingRowSink::default());

    pipeline(provider, 1, 1)
        .run(
            std::io::Cursor::new(input(&["COMS4995W001"])),
            Sinks::new().with_rows(rows.clone()),
        )
        .await
        .unwrap();

    let rows = rows.rows.lock().unwrap();
    let entity = &rows[0].entity;
    assert_eq!(entity.group_key.as_str(), "COMS4995");
    assert_eq!(entity.section.call_number, "12345");
    assert_eq!(entity.section.schedule.days, "MW");
    assert_eq!(entity.section.schedule.start.format("%H:%M:%S").to_string(), "10:10:00");
    assert_eq!(entity.section.schedule.end.format("%H:%M:%S").to_string(), "11:25:00");
    assert_eq!(entity.section.schedule.building, "MATH");
    assert_eq!(entity.section.schedule.room, "417");
}
