use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use image::RgbImage;

use vision_relay::detect::{
    ClassVocabulary, DetectionPipeline, OutputLayer, PipelineConfig, ScorerOutput, StubScorer,
};
use vision_relay::ingest::{open_source, FileSnapshotSource, FrameSource};
use vision_relay::publish::{
    AlertPolicy, DetectionEvent, EventPublisher, PublishOutcome, PublisherTopics, RateGate,
};
use vision_relay::sensing::{CycleError, SensingNode, SensingSettings};
use vision_relay::transport::LoopbackBroker;

fn snapshot(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("shot.png");
    RgbImage::new(640, 480).save(&path).expect("write snapshot");
    path
}

fn output(rows: &[[f32; 7]]) -> ScorerOutput {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    ScorerOutput {
        layers: vec![OutputLayer::from_rows(&flat, 7)],
    }
}

fn node<F: FrameSource>(source: F, outputs: Vec<ScorerOutput>) -> SensingNode<F, StubScorer> {
    SensingNode::new(
        source,
        StubScorer::with_script(outputs),
        DetectionPipeline::new(PipelineConfig::default(), ClassVocabulary::coco()),
        EventPublisher::new(
            PublisherTopics {
                results: "camera/results".to_string(),
                summary: "esp32/detections".to_string(),
            },
            RateGate::new(Duration::from_secs(2), AlertPolicy::EveryInterval),
        ),
        SensingSettings {
            session_poll: Duration::ZERO,
            ..SensingSettings::default()
        },
    )
}

#[test]
fn file_snapshot_to_structured_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = snapshot(&dir);
    let broker = LoopbackBroker::new();
    let mut session = broker.open("object-detector-pc").unwrap();

    // person at the center, car in the corner; class ids 0 and 2.
    let scored = output(&[
        [0.5, 0.5, 0.2, 0.2, 1.0, 0.9, 0.0],
        [0.1, 0.1, 0.1, 0.1, 1.0, 0.0, 0.0],
    ]);
    let mut with_car = scored.clone();
    with_car.layers.push(OutputLayer::from_rows(
        &[0.9, 0.9, 0.1, 0.1, 1.0, 0.0, 0.0, 0.7],
        8,
    ));
    let mut n = node(FileSnapshotSource::new(&path), vec![with_car]);

    let wall = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let report = n.cycle(&mut session, Instant::now(), wall).unwrap();
    assert_eq!(report.outcome, PublishOutcome::Emitted { count: 2 });

    let raw = broker.published_on("camera/results");
    assert_eq!(raw.len(), 1);
    let event: DetectionEvent = serde_json::from_str(&raw[0]).expect("event json");
    assert_eq!(event.count, 2);
    assert_eq!(event.timestamp, 1_700_000_000.0);
    assert_eq!(event.detections[0].name, "person");
    assert_eq!(event.detections[0].bbox.x, 256);
    assert_eq!(event.detections[1].name, "car");
    assert_eq!(
        broker.published_on("esp32/detections"),
        vec!["Detected: person, car"]
    );
}

#[test]
fn rate_gate_spans_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let path = snapshot(&dir);
    let broker = LoopbackBroker::new();
    let mut session = broker.open("object-detector-pc").unwrap();

    let person = output(&[[0.5, 0.5, 0.2, 0.2, 1.0, 0.9, 0.0]]);
    let mut n = node(
        FileSnapshotSource::new(&path),
        vec![person.clone(), person.clone(), person],
    );

    let t0 = Instant::now();
    let outcomes: Vec<PublishOutcome> = [0u64, 1500, 2500]
        .iter()
        .map(|ms| {
            n.cycle(&mut session, t0 + Duration::from_millis(*ms), SystemTime::now())
                .unwrap()
                .outcome
        })
        .collect();
    assert_eq!(
        outcomes,
        vec![
            PublishOutcome::Emitted { count: 1 },
            PublishOutcome::RateLimited,
            PublishOutcome::Emitted { count: 1 },
        ]
    );
    assert_eq!(broker.published_on("esp32/detections").len(), 2);
}

#[test]
fn unreachable_camera_is_a_connection_error() {
    let broker = LoopbackBroker::new();
    let mut session = broker.open("object-detector-pc").unwrap();
    let source = open_source("http://127.0.0.1:9/shot.jpg", Duration::from_millis(200)).unwrap();
    let mut n = node(source, vec![]);

    let err = n
        .cycle(&mut session, Instant::now(), SystemTime::now())
        .unwrap_err();
    assert!(matches!(err, CycleError::Acquisition(_)));
    assert!(err.is_connection_error());
    assert_eq!(err.retry_delay(n.settings()), Duration::from_secs(2));
    assert!(broker.published().is_empty());
}

#[test]
fn corrupt_snapshot_is_retried_quickly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shot.jpg");
    std::fs::write(&path, b"not a jpeg").unwrap();
    let broker = LoopbackBroker::new();
    let mut session = broker.open("object-detector-pc").unwrap();
    let mut n = node(FileSnapshotSource::new(&path), vec![]);

    let err = n
        .cycle(&mut session, Instant::now(), SystemTime::now())
        .unwrap_err();
    assert!(!err.is_connection_error());
    assert_eq!(err.retry_delay(n.settings()), Duration::from_secs(1));
}
