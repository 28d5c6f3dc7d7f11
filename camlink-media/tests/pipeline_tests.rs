//! Streaming pipeline tests
//!
//! The gate sequence is exercised directly through `StreamingLoop`; the async
//! driver runs against a mock link, a delayed mock encoder and the synthetic
//! camera under paused tokio time.

use async_trait::async_trait;
use bytes::Bytes;
use camlink_core::{CamlinkError, CamlinkResult, FrameLink};
use camlink_media::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const MIB: usize = 1024 * 1024;

#[derive(Default)]
struct MockLink {
    closed: AtomicBool,
    buffered: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl MockLink {
    fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn set_buffered(&self, bytes: usize) {
        self.buffered.store(bytes, Ordering::SeqCst);
    }
}

impl FrameLink for MockLink {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    fn send_text(&self, text: String) -> CamlinkResult<()> {
        if !self.is_open() {
            return Err(CamlinkError::LinkClosed);
        }
        self.sent.lock().push(text);
        Ok(())
    }
}

/// Encoder that takes a fixed time and tracks how many encodes overlap
struct DelayEncoder {
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl DelayEncoder {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FrameEncoder for DelayEncoder {
    fn name(&self) -> &str {
        "delay"
    }

    async fn encode(
        &self,
        raster: RasterBuffer,
        _quality: f32,
    ) -> (RasterBuffer, MediaResult<EncodedFrame>) {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        let size = raster.size();
        (
            raster,
            Ok(EncodedFrame {
                data: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
                size,
            }),
        )
    }
}

struct Harness {
    link: Arc<MockLink>,
    encoder: Arc<DelayEncoder>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<PipelineStats>,
    _session: CaptureSessionManager,
    _fps: watch::Sender<u32>,
}

async fn start(encode_delay: Duration, fps: u32) -> Harness {
    let backend = SyntheticBackend::new(SyntheticConfig {
        capability: HardwareCapability::new(640, 480, 60),
        ..SyntheticConfig::default()
    });
    let mut session = CaptureSessionManager::new(Arc::new(backend));
    let mut target = CaptureTarget {
        width: 640,
        height: 480,
        frame_rate: fps,
        ..CaptureTarget::default()
    };
    session.acquire(&mut target).await.unwrap();

    let link = Arc::new(MockLink::default());
    let encoder = Arc::new(DelayEncoder::new(encode_delay));
    let cancel = CancellationToken::new();
    let (fps_tx, fps_rx) = watch::channel(target.frame_rate);

    let pipeline = StreamingPipeline::new(
        link.clone(),
        session.slot(),
        encoder.clone(),
        fps_rx,
        StreamConfig::default(),
        cancel.clone(),
    );
    let task = pipeline.spawn(DisplayClock::default());

    Harness {
        link,
        encoder,
        cancel,
        task,
        _session: session,
        _fps: fps_tx,
    }
}

fn tick(now_ms: f64, buffered_amount: usize) -> TickInput {
    TickInput {
        now_ms,
        frame_rate: 30,
        link_open: true,
        buffered_amount,
        frame_available: true,
    }
}

#[test]
fn test_pacing_scenario() {
    let mut stream = StreamingLoop::new(BACKPRESSURE_THRESHOLD);
    let mut sends = 0;

    // Five ticks, each closer than one frame interval to the loop start
    for now in [6.0, 12.0, 18.0, 24.0, 30.0] {
        assert_eq!(stream.tick(tick(now, 0)), TickOutcome::Skip(SkipReason::Paced));
    }
    assert_eq!(sends, 0);

    assert_eq!(stream.tick(tick(33.4, 0)), TickOutcome::Capture);
    if stream.complete(40.0, true, true) == EncodeCompletion::Send {
        sends += 1;
    }
    assert_eq!(sends, 1);
    assert_eq!(stream.stats().skipped_paced, 5);
}

#[test]
fn test_backpressure_scenario() {
    let mut stream = StreamingLoop::new(BACKPRESSURE_THRESHOLD);

    assert_eq!(
        stream.tick(tick(100.0, 4 * MIB)),
        TickOutcome::Skip(SkipReason::Backpressure)
    );
    assert_eq!(stream.tick(tick(116.0, MIB)), TickOutcome::Capture);
    assert_eq!(stream.complete(120.0, true, true), EncodeCompletion::Send);
}

#[test]
fn test_slow_encode_blocks_intermediate_ticks() {
    let mut stream = StreamingLoop::new(BACKPRESSURE_THRESHOLD);
    assert_eq!(stream.tick(tick(40.0, 0)), TickOutcome::Capture);

    let mut now = 40.0;
    for _ in 0..20 {
        now += 16.7;
        assert_eq!(stream.tick(tick(now, 0)), TickOutcome::Skip(SkipReason::Busy));
    }
    assert_eq!(stream.complete(now, true, true), EncodeCompletion::Send);
    assert_eq!(stream.tick(tick(now + 16.7, 0)), TickOutcome::Skip(SkipReason::Paced));
    assert_eq!(stream.tick(tick(now + 33.4, 0)), TickOutcome::Capture);
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_streams_paced_frames() {
    let harness = start(Duration::from_millis(5), 30).await;

    tokio::time::sleep(Duration::from_millis(1000)).await;
    harness.cancel.cancel();
    let stats = harness.task.await.unwrap();

    let sent = harness.link.sent_count();
    assert!(sent > 5 && sent <= 30, "sent {} frames in one second", sent);
    assert_eq!(stats.frames_sent as usize, sent);
    assert!(harness.link.sent.lock()[0].starts_with(JPEG_DATA_URL_PREFIX));
    assert_eq!(harness.encoder.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_two_encodes_in_flight() {
    let harness = start(Duration::from_millis(250), 60).await;

    tokio::time::sleep(Duration::from_millis(2000)).await;
    harness.cancel.cancel();
    let stats = harness.task.await.unwrap();

    assert_eq!(harness.encoder.max_active.load(Ordering::SeqCst), 1);
    assert!(stats.skipped_busy > 0);
    // A 250 ms encode caps throughput at four frames per second
    assert!(harness.link.sent_count() <= 8);
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_pauses_and_resumes() {
    let harness = start(Duration::from_millis(5), 30).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    harness.link.set_buffered(4 * MIB);
    // Let any frame already encoding land
    tokio::time::sleep(Duration::from_millis(50)).await;
    let before = harness.link.sent_count();
    assert!(before > 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(harness.link.sent_count(), before);

    harness.link.set_buffered(MIB);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(harness.link.sent_count() > before);

    harness.cancel.cancel();
    let stats = harness.task.await.unwrap();
    assert!(stats.skipped_backpressure > 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_send_after_close() {
    let harness = start(Duration::from_millis(100), 30).await;

    tokio::time::sleep(Duration::from_millis(450)).await;
    harness.link.close();
    let at_close = harness.link.sent_count();

    // The loop ends on its own once it observes the closed link
    let stats = tokio::time::timeout(Duration::from_secs(1), harness.task)
        .await
        .expect("pipeline did not stop")
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(harness.link.sent_count(), at_close);
    assert_eq!(stats.frames_sent as usize, at_close);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_ticks() {
    let harness = start(Duration::from_millis(100), 30).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    harness.cancel.cancel();
    let stats = harness.task.await.unwrap();
    let calls = harness.encoder.calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(harness.encoder.calls.load(Ordering::SeqCst), calls);
    assert_eq!(stats.frames_sent as usize, harness.link.sent_count());
}
