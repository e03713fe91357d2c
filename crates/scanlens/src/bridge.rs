//! Host-facing adapter: one request/response slot and one stream sink.
//!
//! The coordinator never touches host-visible state directly. Terminal
//! results go through a `oneshot` and continuous values through a bounded
//! `mpsc`, so the host observes both from its own async context.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use scanconf::{DefaultsConfig, ScanConfig};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::capture::{CaptureDevice, CaptureSettings};
use crate::coordinator::{ResultDelivery, ScanCoordinator};
use crate::error::ScanError;
use crate::events::{EventPublisher, ScanEvent};
use crate::permission::PermissionGate;
use crate::request::ScanRequest;
use crate::types::{NoResultReason, ResultEnvelope, ScanId, ScanMode};

struct Sink {
    generation: u64,
    tx: mpsc::Sender<String>,
}

#[derive(Default)]
struct Slots {
    pending: Option<oneshot::Sender<ResultEnvelope>>,
    sink: Option<Sink>,
    generation: u64,
}

/// The pending-result slot and the stream registration.
///
/// This is what the coordinator delivers into.
pub(crate) struct BridgeSlots {
    slots: Mutex<Slots>,
    stream_buffer: usize,
    publisher: Arc<dyn EventPublisher>,
}

impl BridgeSlots {
    fn new(stream_buffer: usize, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            stream_buffer: stream_buffer.max(1),
            publisher,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dropped(&self, reason: &str) {
        self.publisher.publish(ScanEvent::StreamValueDropped {
            reason: reason.to_string(),
        });
    }

    fn unsubscribe_generation(&self, generation: u64) {
        let mut slots = self.lock();
        if slots.sink.as_ref().is_some_and(|s| s.generation == generation) {
            slots.sink = None;
            debug!(generation, "stream sink removed");
        }
    }
}

impl ResultDelivery for BridgeSlots {
    fn complete(&self, scan_id: &ScanId, envelope: ResultEnvelope) {
        match self.lock().pending.take() {
            Some(tx) => {
                if tx.send(envelope).is_err() {
                    debug!(scan.id = %scan_id, "pending scan was dropped before its result");
                }
            }
            None => debug!(scan.id = %scan_id, "no pending slot for result"),
        }
    }

    fn stream_value(&self, scan_id: &ScanId, value: String) {
        let slots = self.lock();
        let Some(sink) = slots.sink.as_ref() else {
            debug!(scan.id = %scan_id, "no stream subscriber, value dropped");
            drop(slots);
            self.dropped("no subscriber");
            return;
        };
        if let Err(e) = sink.tx.try_send(value) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "stream buffer full",
                mpsc::error::TrySendError::Closed(_) => "stream closed",
            };
            warn!(scan.id = %scan_id, generation = sink.generation, "{}, value dropped", reason);
            drop(slots);
            self.dropped(reason);
        }
    }
}

/// Result of one request, resolved exactly once.
///
/// Resolves to the sentinel if the bridge goes away without answering.
#[derive(Debug)]
pub struct PendingScan {
    scan_id: ScanId,
    rx: oneshot::Receiver<ResultEnvelope>,
}

impl PendingScan {
    pub fn scan_id(&self) -> &ScanId {
        &self.scan_id
    }

    /// Wait at most `timeout`; `None` if the request is still running.
    pub async fn wait_timeout(self, timeout: Duration) -> Option<ResultEnvelope> {
        tokio::time::timeout(timeout, self).await.ok()
    }
}

impl Future for PendingScan {
    type Output = ResultEnvelope;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or_else(|_| ResultEnvelope::no_result(NoResultReason::Destroyed)))
    }
}

/// Continuous-mode values for one subscription.
///
/// Dropping it unsubscribes, unless a newer subscription has replaced it.
pub struct ScanStream {
    generation: u64,
    inner: ReceiverStream<String>,
    slots: Arc<BridgeSlots>,
}

impl std::fmt::Debug for ScanStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanStream")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl ScanStream {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Unsubscribe now; values already buffered are discarded.
    pub fn close(self) {}
}

impl Stream for ScanStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        self.slots.unsubscribe_generation(self.generation);
    }
}

/// Exposes the coordinator's request/response and streaming contracts
pub struct ScanBridge {
    coordinator: Arc<ScanCoordinator>,
    slots: Arc<BridgeSlots>,
    defaults: DefaultsConfig,
}

impl ScanBridge {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        permission: Arc<dyn PermissionGate>,
        config: &ScanConfig,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, ScanError> {
        let slots = Arc::new(BridgeSlots::new(
            config.delivery.stream_buffer,
            Arc::clone(&publisher),
        ));
        let settings = CaptureSettings::from_defaults(&config.defaults)?;
        let coordinator = ScanCoordinator::new(device, permission, slots.clone())
            .with_publisher(publisher)
            .with_capture_defaults(settings);

        Ok(Self {
            coordinator: Arc::new(coordinator),
            slots,
            defaults: config.defaults.clone(),
        })
    }

    /// The coordinator, for forwarding detection, permission and lifecycle callbacks
    pub fn coordinator(&self) -> &Arc<ScanCoordinator> {
        &self.coordinator
    }

    /// Start a request. A second request while one is pending is rejected
    /// and leaves the running one untouched.
    pub fn request(&self, request: ScanRequest) -> Result<PendingScan, ScanError> {
        let rx = {
            let mut slots = self.slots.lock();
            if slots.pending.is_some() {
                warn!("scan requested while another is pending");
                return Err(ScanError::DoubleRequestViolation);
            }
            let (tx, rx) = oneshot::channel();
            slots.pending = Some(tx);
            rx
        };

        match self.coordinator.start_scan(request) {
            Ok(scan_id) => Ok(PendingScan { scan_id, rx }),
            Err(e) => {
                self.slots.lock().pending = None;
                Err(e)
            }
        }
    }

    /// Parse the host's argument map, then [`request`](Self::request)
    pub fn scan_with_args(&self, args: &Value) -> Result<PendingScan, ScanError> {
        let request = ScanRequest::from_host_args(args, &self.defaults)?;
        self.request(request)
    }

    /// Install a stream sink, silently replacing any previous one.
    /// Values produced before this call are not replayed.
    pub fn subscribe(&self) -> ScanStream {
        let (tx, rx) = mpsc::channel(self.slots.stream_buffer);
        let generation = {
            let mut slots = self.slots.lock();
            slots.generation += 1;
            let generation = slots.generation;
            slots.sink = Some(Sink { generation, tx });
            generation
        };
        debug!(generation, "stream sink installed");

        ScanStream {
            generation,
            inner: ReceiverStream::new(rx),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Remove the stream sink. Idempotent.
    pub fn unsubscribe(&self) {
        if self.slots.lock().sink.take().is_some() {
            debug!("stream sink removed");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.slots.lock().sink.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.slots.lock().pending.is_some()
    }

    /// Subscribe and start a continuous request.
    pub fn open_stream(&self, request: ScanRequest) -> Result<(ScanStream, PendingScan), ScanError> {
        if request.mode() != ScanMode::Continuous {
            return Err(ScanError::InvalidRequestArgument(
                "open_stream needs a continuous request".to_string(),
            ));
        }
        let stream = self.subscribe();
        let pending = self.request(request)?;
        info!(scan.id = %pending.scan_id(), generation = stream.generation(), "stream opened");
        Ok((stream, pending))
    }

    /// Unsubscribe and end a live continuous session. Idempotent.
    pub fn close_stream(&self) -> Result<(), ScanError> {
        self.unsubscribe();
        if self.coordinator.cancel_continuous() {
            info!("stream closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NoOpPublisher, RecordingPublisher};
    use crate::permission::StaticPermission;
    use crate::sim::SimulatedCamera;
    use crate::types::{Detection, Rect, Symbology};
    use futures::StreamExt;
    use serde_json::json;

    fn bridge() -> (Arc<SimulatedCamera>, ScanBridge) {
        let camera = Arc::new(SimulatedCamera::new());
        let bridge = ScanBridge::new(
            camera.clone(),
            Arc::new(StaticPermission::granted()),
            &ScanConfig::default(),
            Arc::new(NoOpPublisher),
        )
        .unwrap();
        (camera, bridge)
    }

    fn batch(value: &str) -> Vec<Detection> {
        vec![Detection::new(
            value,
            Symbology::QrCode,
            Rect::new(0.0, 0.0, 10.0, 10.0),
        )]
    }

    #[tokio::test]
    async fn test_request_resolves_once() {
        let (_camera, bridge) = bridge();
        let pending = bridge.request(ScanRequest::single_shot()).unwrap();
        assert!(bridge.has_pending());

        bridge.coordinator().on_detection_batch(batch("hello"));
        bridge.coordinator().on_detection_batch(batch("again"));

        assert_eq!(pending.await, ResultEnvelope::decoded("hello"));
        assert!(!bridge.has_pending());
    }

    #[tokio::test]
    async fn test_double_request_rejected() {
        let (camera, bridge) = bridge();
        let first = bridge.request(ScanRequest::single_shot()).unwrap();

        let err = bridge.request(ScanRequest::single_shot()).unwrap_err();
        assert_eq!(err, ScanError::DoubleRequestViolation);
        assert_eq!(camera.acquire_count(), 1);

        bridge.coordinator().on_detection_batch(batch("kept"));
        assert_eq!(first.await.into_wire(), "kept");
    }

    #[tokio::test]
    async fn test_scan_with_args() {
        let (_camera, bridge) = bridge();
        let err = bridge.scan_with_args(&json!({ "scanMode": 0 })).unwrap_err();
        assert!(matches!(err, ScanError::InvalidRequestArgument(_)));
        assert!(!bridge.has_pending());

        let pending = bridge
            .scan_with_args(&json!({ "isContinuousScan": false, "scanMode": 0 }))
            .unwrap();
        bridge.coordinator().cancel().unwrap();
        assert_eq!(pending.await.into_wire(), "-1");
    }

    #[tokio::test]
    async fn test_stream_delivers_and_closes() {
        let (camera, bridge) = bridge();
        let (mut stream, pending) = bridge.open_stream(ScanRequest::continuous()).unwrap();

        bridge.coordinator().on_detection_batch(batch("a"));
        bridge.coordinator().on_detection_batch(batch("b"));
        assert_eq!(stream.next().await.as_deref(), Some("a"));
        assert_eq!(stream.next().await.as_deref(), Some("b"));

        bridge.close_stream().unwrap();
        bridge.close_stream().unwrap();
        assert!(!camera.is_held());
        assert!(pending.await.is_sentinel());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_close_stream_leaves_single_shot_request() {
        let (camera, bridge) = bridge();
        let pending = bridge.request(ScanRequest::single_shot()).unwrap();

        bridge.close_stream().unwrap();
        assert!(camera.is_held());
        assert!(bridge.has_pending());

        bridge.coordinator().on_detection_batch(batch("kept"));
        assert_eq!(pending.await.into_wire(), "kept");
    }

    #[tokio::test]
    async fn test_values_before_subscribe_are_dropped() {
        let camera = Arc::new(SimulatedCamera::new());
        let events = Arc::new(RecordingPublisher::new());
        let bridge = ScanBridge::new(
            camera,
            Arc::new(StaticPermission::granted()),
            &ScanConfig::default(),
            events.clone(),
        )
        .unwrap();

        let _pending = bridge.request(ScanRequest::continuous()).unwrap();
        bridge.coordinator().on_detection_batch(batch("early"));

        let mut stream = bridge.subscribe();
        bridge.coordinator().on_detection_batch(batch("late"));
        assert_eq!(stream.next().await.as_deref(), Some("late"));
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, ScanEvent::StreamValueDropped { .. })));
    }

    #[tokio::test]
    async fn test_old_stream_drop_keeps_new_subscription() {
        let (_camera, bridge) = bridge();
        let old = bridge.subscribe();
        let mut new = bridge.subscribe();
        assert!(new.generation() > old.generation());

        old.close();
        assert!(bridge.is_subscribed());

        let _pending = bridge.request(ScanRequest::continuous()).unwrap();
        bridge.coordinator().on_detection_batch(batch("x"));
        assert_eq!(new.next().await.as_deref(), Some("x"));

        bridge.unsubscribe();
        bridge.unsubscribe();
        assert!(!bridge.is_subscribed());
    }

    #[tokio::test]
    async fn test_open_stream_requires_continuous() {
        let (_camera, bridge) = bridge();
        let err = bridge.open_stream(ScanRequest::single_shot()).unwrap_err();
        assert!(matches!(err, ScanError::InvalidRequestArgument(_)));
        assert!(!bridge.is_subscribed());
    }

    #[tokio::test]
    async fn test_full_buffer_drops_values() {
        let camera = Arc::new(SimulatedCamera::new());
        let mut config = ScanConfig::default();
        config.delivery.stream_buffer = 1;
        let bridge = ScanBridge::new(
            camera,
            Arc::new(StaticPermission::granted()),
            &config,
            Arc::new(NoOpPublisher),
        )
        .unwrap();

        let (mut stream, _pending) = bridge.open_stream(ScanRequest::continuous()).unwrap();
        bridge.coordinator().on_detection_batch(batch("kept"));
        bridge.coordinator().on_detection_batch(batch("dropped"));
        bridge.coordinator().cancel().unwrap();
        bridge.unsubscribe();

        assert_eq!(stream.next().await.as_deref(), Some("kept"));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_pending_timeout() {
        let (_camera, bridge) = bridge();
        let pending = bridge.request(ScanRequest::single_shot()).unwrap();
        assert_eq!(pending.wait_timeout(Duration::from_millis(10)).await, None);
    }
}
