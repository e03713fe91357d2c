//! End-to-end session lifecycle through the bridge with a simulated camera.

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use scanconf::ScanConfig;
use scanlens::{
    CaptureOp, Detection, Facing, LifecycleEvent, NoResultReason, Point, Rect, RecordingPublisher,
    ResultEnvelope, ScanBridge, ScanEvent, ScanRequest, ScanState, SimulatedCamera,
    StaticPermission, Symbology, SENTINEL,
};
use tokio_test::{assert_pending, assert_ready_eq, task};

struct Harness {
    camera: Arc<SimulatedCamera>,
    permission: Arc<StaticPermission>,
    events: Arc<RecordingPublisher>,
    bridge: ScanBridge,
}

fn harness(permission: StaticPermission) -> Harness {
    let camera = Arc::new(SimulatedCamera::new());
    let permission = Arc::new(permission);
    let events = Arc::new(RecordingPublisher::new());
    let bridge = ScanBridge::new(
        camera.clone(),
        permission.clone(),
        &ScanConfig::default(),
        events.clone(),
    )
    .unwrap();
    Harness {
        camera,
        permission,
        events,
        bridge,
    }
}

fn qr(value: &str) -> Detection {
    Detection::new(value, Symbology::QrCode, Rect::new(0.0, 0.0, 10.0, 10.0))
}

#[tokio::test]
async fn single_shot_emits_exactly_once() {
    let h = harness(StaticPermission::granted());
    let pending = h.bridge.request(ScanRequest::single_shot()).unwrap();

    for value in ["first", "second", "third"] {
        h.bridge.coordinator().on_detection_batch(vec![qr(value), qr("tail")]);
    }
    h.bridge.coordinator().cancel().unwrap();
    h.bridge
        .coordinator()
        .on_lifecycle_event(LifecycleEvent::Destroy)
        .unwrap();

    assert_eq!(pending.await, ResultEnvelope::decoded("first"));
    assert_eq!(h.events.terminations(), 1);
    assert_eq!(h.events.deliveries(), 1);
    assert_eq!(h.bridge.coordinator().state(), ScanState::Idle);
}

#[tokio::test]
async fn cancel_before_detection_yields_sentinel() {
    let h = harness(StaticPermission::granted());
    let pending = h.bridge.request(ScanRequest::single_shot()).unwrap();
    assert!(h.camera.is_held());

    h.bridge.coordinator().cancel().unwrap();

    assert_eq!(pending.await.into_wire(), SENTINEL);
    assert!(!h.camera.is_held());
    assert_eq!(h.camera.release_count(), 1);
}

#[tokio::test]
async fn pending_scan_waits_for_terminal_state() {
    let h = harness(StaticPermission::unknown());
    let mut pending = task::spawn(h.bridge.request(ScanRequest::single_shot()).unwrap());

    assert_pending!(pending.poll());
    h.bridge.coordinator().on_permission_result(true).unwrap();
    assert_pending!(pending.poll());

    h.bridge.coordinator().on_detection_batch(vec![qr("late")]);
    assert!(pending.is_woken());
    assert_ready_eq!(pending.poll(), ResultEnvelope::decoded("late"));
}

#[tokio::test]
async fn facing_toggle_releases_before_build() {
    let h = harness(StaticPermission::granted());
    let _pending = h.bridge.request(ScanRequest::single_shot()).unwrap();

    h.bridge.coordinator().toggle_facing().unwrap();
    h.bridge.coordinator().toggle_facing().unwrap();

    let acquisitions: Vec<_> = h
        .camera
        .operations()
        .into_iter()
        .filter(|op| matches!(op, CaptureOp::Acquired { .. } | CaptureOp::Released { .. }))
        .collect();
    assert_eq!(
        acquisitions,
        vec![
            CaptureOp::Acquired { handle: 1, facing: Facing::Back },
            CaptureOp::Released { handle: 1 },
            CaptureOp::Acquired { handle: 2, facing: Facing::Front },
            CaptureOp::Released { handle: 2 },
            CaptureOp::Acquired { handle: 3, facing: Facing::Back },
        ]
    );
    assert!(h.camera.release_before_acquire_held());
    assert_eq!(
        h.bridge.coordinator().state(),
        ScanState::Active(scanlens::ScanMode::SingleShot)
    );
}

#[test]
fn hit_test_prefers_containment_then_nearest_center() {
    let batch = vec![
        Detection::new("a", Symbology::QrCode, Rect::new(0.0, 0.0, 10.0, 10.0)),
        Detection::new("b", Symbology::QrCode, Rect::new(50.0, 50.0, 60.0, 60.0)),
    ];

    let hit = scanlens::hit_test(&batch, Point::new(5.0, 5.0)).unwrap();
    assert_eq!(hit.raw_value(), Some("a"));

    let hit = scanlens::hit_test(&batch, Point::new(48.0, 48.0)).unwrap();
    assert_eq!(hit.raw_value(), Some("b"));
}

#[tokio::test]
async fn tap_selects_detection_in_single_shot() {
    let h = harness(StaticPermission::granted());
    let pending = h.bridge.request(ScanRequest::single_shot()).unwrap();
    let regions = vec![
        Detection::new("first", Symbology::QrCode, Rect::new(0.0, 0.0, 10.0, 10.0)),
        Detection::new("second", Symbology::QrCode, Rect::new(50.0, 50.0, 60.0, 60.0)),
    ];

    assert_eq!(
        h.bridge.coordinator().on_tap(Point::new(55.0, 55.0)).unwrap(),
        None
    );
    h.bridge.coordinator().on_detection_batch(regions);

    assert_eq!(pending.await, ResultEnvelope::decoded("second"));
    assert!(!h.camera.is_held());
    assert_eq!(h.events.deliveries(), 1);
}

#[tokio::test]
async fn continuous_delivers_one_value_per_batch() {
    let h = harness(StaticPermission::granted());
    let (stream, pending) = h.bridge.open_stream(ScanRequest::continuous()).unwrap();

    let n = 25;
    for i in 0..n {
        h.bridge
            .coordinator()
            .on_detection_batch(vec![qr(&format!("value-{}", i)), qr("ignored")]);
    }
    assert!(h.camera.is_held());
    h.bridge.close_stream().unwrap();

    let values: Vec<String> = stream.collect().await;
    let expected: Vec<String> = (0..n).map(|i| format!("value-{}", i)).collect();
    assert_eq!(values, expected);
    assert!(pending.await.is_sentinel());
    assert!(!h.camera.is_held());
}

#[tokio::test]
async fn destroy_releases_and_delivers_once() {
    // While awaiting permission: nothing held, one sentinel.
    let h = harness(StaticPermission::unknown());
    let pending = h.bridge.request(ScanRequest::single_shot()).unwrap();
    h.bridge
        .coordinator()
        .on_lifecycle_event(LifecycleEvent::Destroy)
        .unwrap();
    assert_eq!(
        pending.await,
        ResultEnvelope::no_result(NoResultReason::Destroyed)
    );
    assert!(!h.camera.is_held());
    assert_eq!(h.events.deliveries(), 1);

    // While active: the held session is released.
    let h = harness(StaticPermission::granted());
    let pending = h.bridge.request(ScanRequest::single_shot()).unwrap();
    assert!(h.camera.is_held());
    h.bridge
        .coordinator()
        .on_lifecycle_event(LifecycleEvent::Destroy)
        .unwrap();
    h.bridge
        .coordinator()
        .on_lifecycle_event(LifecycleEvent::Destroy)
        .unwrap();
    assert!(pending.await.is_sentinel());
    assert!(!h.camera.is_held());
    assert_eq!(h.camera.release_count(), 1);
    assert_eq!(h.events.deliveries(), 1);
}

#[tokio::test]
async fn permission_denied_never_acquires() {
    let h = harness(StaticPermission::unknown());
    let pending = h.bridge.request(ScanRequest::single_shot()).unwrap();
    assert_eq!(h.permission.prompts(), 1);

    h.bridge.coordinator().on_permission_result(false).unwrap();

    assert_eq!(
        pending.await,
        ResultEnvelope::no_result(NoResultReason::PermissionDenied)
    );
    assert_eq!(h.camera.acquire_count(), 0);
    assert!(!h
        .events
        .events()
        .iter()
        .any(|e| matches!(e, ScanEvent::SessionAcquired { .. })));
}

#[tokio::test]
async fn new_request_after_termination() {
    let h = harness(StaticPermission::granted());

    let first = h.bridge.request(ScanRequest::single_shot()).unwrap();
    h.bridge.coordinator().on_detection_batch(vec![qr("one")]);
    assert_eq!(first.await.into_wire(), "one");

    let second = h.bridge.request(ScanRequest::single_shot()).unwrap();
    h.bridge.coordinator().on_detection_batch(vec![qr("two")]);
    assert_eq!(second.await.into_wire(), "two");

    assert_eq!(h.camera.acquire_count(), 2);
    assert!(h.camera.release_before_acquire_held());
}
