//! Integration tests for the gesture drive pipeline
//!
//! Drives the spawned pipeline with synthetic pose frames and checks the
//! datagrams that reach a local stand-in for the vehicle controller.

use gesture_drive::{
    ClassifierConfig, Command, CommandDispatcher, CommandSink, DispatcherConfig, FrameBuilder,
    FrameSource, GestureClassifier, GesturePipeline, JsonLinesSource, LandmarkFrame,
    OperatingMode, PipelineHandle, PoseJoint, ToggleConfig,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::BufReader;
use tokio::net::UdpSocket;

/// Sink that records every token it is handed
#[derive(Clone, Default)]
struct RecordingSink {
    tokens: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

impl CommandSink for RecordingSink {
    fn send(&self, command: &Command) {
        self.tokens.lock().unwrap().push(command.to_token());
    }
}

/// Short timings so tests can wait out the cool-down in real time
fn fast_toggle() -> ToggleConfig {
    ToggleConfig {
        palms_close_threshold: 40.0,
        hold_duration_ms: 200,
        cooldown_ms: 100,
    }
}

fn palms_together() -> LandmarkFrame {
    FrameBuilder::new()
        .joint(PoseJoint::LeftWrist, 0.50, 0.45)
        .joint(PoseJoint::RightWrist, 0.52, 0.45)
        .build()
}

fn palms_apart() -> LandmarkFrame {
    FrameBuilder::new()
        .joint(PoseJoint::LeftWrist, 0.75, 0.45)
        .joint(PoseJoint::RightWrist, 0.25, 0.45)
        .build()
}

/// Right wrist raised 300 units, right toe raised 150 units above the heel
fn drive_right() -> LandmarkFrame {
    FrameBuilder::new()
        .joint(PoseJoint::LeftWrist, 0.70, 0.40)
        .joint(PoseJoint::RightWrist, 0.30, 0.10)
        .joint(PoseJoint::RightFootIndex, 0.45, 0.05)
        .joint(PoseJoint::RightHeel, 0.45, 0.20)
        .build()
}

/// Hold palms together from `start_ms` for `duration_ms`, one frame per 20ms
fn submit_hold(handle: &PipelineHandle, t0: Instant, start_ms: u64, duration_ms: u64) {
    for t in (start_ms..=start_ms + duration_ms).step_by(20) {
        handle
            .submit(palms_together(), t0 + Duration::from_millis(t))
            .unwrap();
    }
}

async fn wait_for_mode(handle: &PipelineHandle, expected: OperatingMode) {
    let mut rx = handle.subscribe_mode();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|mode| *mode == expected))
        .await
        .expect("mode change not observed")
        .unwrap();
}

#[tokio::test]
async fn test_toggle_progression_through_pipeline() {
    let sink = RecordingSink::default();
    let handle = PipelineHandle::spawn(GesturePipeline::new(
        fast_toggle(),
        ClassifierConfig::default(),
        sink.clone(),
    ));
    let t0 = Instant::now();

    submit_hold(&handle, t0, 0, 300);
    wait_for_mode(&handle, OperatingMode::Full).await;

    handle
        .submit(palms_apart(), t0 + Duration::from_millis(320))
        .unwrap();

    // Let the debounce release arrive before the second hold
    tokio::time::sleep(Duration::from_millis(250)).await;

    submit_hold(&handle, t0, 600, 300);
    wait_for_mode(&handle, OperatingMode::MoveOnly).await;

    let stats = handle.shutdown().await.unwrap();
    assert_eq!(stats.mode_changes, 2);
    assert_eq!(stats.mode, OperatingMode::MoveOnly);
    assert!(sink.tokens().iter().all(|t| t == "0"));
}

#[tokio::test]
async fn test_second_hold_inside_cooldown_is_debounced() {
    let handle = PipelineHandle::spawn(GesturePipeline::new(
        ToggleConfig {
            cooldown_ms: 1000,
            ..fast_toggle()
        },
        ClassifierConfig::default(),
        RecordingSink::default(),
    ));
    let t0 = Instant::now();

    submit_hold(&handle, t0, 0, 300);
    handle
        .submit(palms_apart(), t0 + Duration::from_millis(320))
        .unwrap();
    submit_hold(&handle, t0, 340, 600);

    let stats = handle.shutdown().await.unwrap();
    assert_eq!(stats.mode_changes, 1);
    assert_eq!(stats.mode, OperatingMode::Full);
}

#[tokio::test]
async fn test_recorded_burst_toggles_on_capture_time() {
    let handle = PipelineHandle::spawn(GesturePipeline::new(
        ToggleConfig::default(),
        ClassifierConfig::default(),
        RecordingSink::default(),
    ));
    let t0 = Instant::now();

    // A 4.5s recording delivered all at once, one frame per 33ms of capture time
    for t in (0..=4500u64).step_by(33) {
        let frame = if (1600..3000).contains(&t) {
            palms_apart()
        } else {
            palms_together()
        };
        handle.submit(frame, t0 + Duration::from_millis(t)).unwrap();
    }

    let stats = handle.shutdown().await.unwrap();
    assert_eq!(stats.mode_changes, 2);
    assert_eq!(stats.mode, OperatingMode::MoveOnly);
}

#[tokio::test]
async fn test_commands_reach_vehicle_over_udp() {
    let vehicle = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dispatcher = CommandDispatcher::new(DispatcherConfig {
        target: vehicle.local_addr().unwrap(),
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        max_in_flight: 64,
        ..Default::default()
    })
    .unwrap();

    let handle = PipelineHandle::spawn(GesturePipeline::new(
        fast_toggle(),
        ClassifierConfig::default(),
        dispatcher,
    ));
    let t0 = Instant::now();

    submit_hold(&handle, t0, 0, 240);
    wait_for_mode(&handle, OperatingMode::Full).await;
    handle
        .submit(drive_right(), t0 + Duration::from_millis(300))
        .unwrap();

    // 13 hold frames, then the drive frame; each datagram leaves from its own
    // socket so arrival order is not guaranteed
    let mut buf = [0u8; 64];
    let mut received = Vec::new();
    for _ in 0..14 {
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), vehicle.recv_from(&mut buf))
            .await
            .expect("vehicle received no datagram")
            .unwrap();
        received.push(String::from_utf8_lossy(&buf[..len]).into_owned());
    }

    assert_eq!(received.iter().filter(|t| *t == "0").count(), 13);
    assert!(received.iter().any(|t| t == "move1, right1"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dispatcher_does_not_block_on_unreachable_peer() {
    let dispatcher = CommandDispatcher::new(DispatcherConfig {
        target: SocketAddr::from(([203, 0, 113, 9], 4210)),
        send_timeout_ms: 5_000,
        ..Default::default()
    })
    .unwrap();

    let start = Instant::now();
    for _ in 0..100 {
        dispatcher.send(&Command::Stop);
    }

    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_recorded_stream_classification() {
    let landmarks = serde_json::to_string(drive_right().landmarks()).unwrap();
    let recording = format!(
        "{{\"timestamp_ms\": 0, \"landmarks\": []}}\n\
         {{\"timestamp_ms\": 33, \"landmarks\": {}}}\n\
         not a frame\n",
        landmarks
    );

    let mut source = JsonLinesSource::new(BufReader::new(recording.as_bytes()));
    let classifier = GestureClassifier::default();

    let mut tokens = Vec::new();
    while let Some(timed) = source.next_frame().await.unwrap() {
        tokens.push(classifier.classify(&timed.frame, OperatingMode::Full));
    }

    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0], None);
    assert_eq!(tokens[1].map(|c| c.to_token()).as_deref(), Some("move1, right1"));
}

#[test]
fn test_move_only_suppresses_turn_when_standing() {
    let standing_turn = FrameBuilder::new()
        .joint(PoseJoint::LeftWrist, 0.70, 0.40)
        .joint(PoseJoint::RightWrist, 0.30, 0.10)
        .joint(PoseJoint::RightFootIndex, 0.45, 0.20)
        .joint(PoseJoint::RightHeel, 0.45, 0.20)
        .build();

    let classifier = GestureClassifier::default();

    assert_eq!(
        classifier
            .classify(&standing_turn, OperatingMode::MoveOnly)
            .map(|c| c.to_token())
            .as_deref(),
        Some("0")
    );
    assert_eq!(
        classifier
            .classify(&standing_turn, OperatingMode::Full)
            .map(|c| c.to_token())
            .as_deref(),
        Some("right1")
    );
}

#[test]
fn test_frame_builder_matches_round_trip_geometry() {
    let frame = drive_right();
    let classifier = GestureClassifier::default();

    for mode in [OperatingMode::Off, OperatingMode::Full, OperatingMode::MoveOnly] {
        let token = classifier.classify(&frame, mode).unwrap().to_token();
        let expected = match mode {
            OperatingMode::Off => "0",
            OperatingMode::Full => "move1, right1",
            OperatingMode::MoveOnly => "move2, right2",
        };
        assert_eq!(token, expected);
    }
}
