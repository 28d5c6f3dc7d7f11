//! Paced, backpressure-aware frame streaming
//!
//! Every clock tick runs the same gate sequence:
//!
//! ```text
//! link closed ----------------> Stop
//! since last send < 1000/fps -> Skip(Paced)
//! queued bytes > threshold ---> Skip(Backpressure)
//! encode in flight -----------> Skip(Busy)
//! no frame available ---------> Skip(NoFrame)
//! otherwise ------------------> Capture (draw, encode, send on completion)
//! ```
//!
//! Frames that lose a gate are dropped, never queued. The completion time of
//! each encode becomes the next pacing reference, so a slow encoder or a slow
//! link lowers the achieved rate on its own.

use crate::clock::FrameClock;
use crate::codecs::{EncodedFrame, FrameEncoder};
use crate::error::MediaResult;
use crate::raster::RasterBuffer;
use crate::session::CaptureSlot;
use camlink_core::FrameLink;
use futures::future::{BoxFuture, OptionFuture};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Outbound queue size above which frames are dropped
pub const BACKPRESSURE_THRESHOLD: usize = 3 * 1024 * 1024;

/// JPEG quality factor used for every frame
pub const DEFAULT_JPEG_QUALITY: f32 = 0.5;

/// Streaming parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Outbound queue size (bytes) above which frames are dropped
    pub backpressure_threshold: usize,
    /// Encoder quality factor in (0, 1]
    pub jpeg_quality: f32,
    /// Poll interval while waiting for the first camera frame
    #[serde(with = "camlink_core::duration_ms")]
    pub stabilize_poll: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backpressure_threshold: BACKPRESSURE_THRESHOLD,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            stabilize_poll: Duration::from_millis(500),
        }
    }
}

/// Why a tick produced no frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Too soon after the previous frame
    Paced,
    /// The link's outbound queue is over the threshold
    Backpressure,
    /// The previous frame is still encoding
    Busy,
    /// No capture, or the capture has no frame yet
    NoFrame,
}

/// Decision for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The link is gone; the loop ends
    Stop,
    /// Nothing to do this tick
    Skip(SkipReason),
    /// Sample the capture and start an encode
    Capture,
}

/// What to do with a finished encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeCompletion {
    /// Transmit the frame
    Send,
    /// The link closed while encoding; drop the frame
    Discard,
    /// The encoder failed; nothing to send
    Failed,
}

/// Inputs observed at one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    /// Tick timestamp in milliseconds
    pub now_ms: f64,
    /// Current target frame rate
    pub frame_rate: u32,
    /// Whether the link accepts frames
    pub link_open: bool,
    /// Bytes queued on the link
    pub buffered_amount: usize,
    /// Whether the capture has a current frame
    pub frame_available: bool,
}

/// Mutable loop state; reset for every new connection
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamingLoopState {
    /// Completion time of the last encode, in milliseconds
    pub last_frame_timestamp: f64,
    /// Whether an encode is outstanding
    pub encode_in_flight: bool,
}

/// Counters for one streaming session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Ticks observed
    pub ticks: u64,
    /// Encodes started
    pub frames_captured: u64,
    /// Frames handed to the link
    pub frames_sent: u64,
    /// Text bytes handed to the link
    pub bytes_sent: u64,
    /// Encodes dropped because the link closed meanwhile
    pub frames_discarded: u64,
    /// Encoder failures
    pub encode_failures: u64,
    /// Ticks skipped by the pacing gate
    pub skipped_paced: u64,
    /// Ticks skipped by the backpressure gate
    pub skipped_backpressure: u64,
    /// Ticks skipped by the in-flight gate
    pub skipped_busy: u64,
    /// Ticks skipped for lack of a frame
    pub skipped_no_frame: u64,
}

impl PipelineStats {
    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Paced => self.skipped_paced += 1,
            SkipReason::Backpressure => self.skipped_backpressure += 1,
            SkipReason::Busy => self.skipped_busy += 1,
            SkipReason::NoFrame => self.skipped_no_frame += 1,
        }
    }
}

/// Gate sequence of the streaming loop, free of I/O
#[derive(Debug, Clone)]
pub struct StreamingLoop {
    state: StreamingLoopState,
    backpressure_threshold: usize,
    stats: PipelineStats,
}

impl StreamingLoop {
    /// Fresh loop; the pacing reference starts at time zero
    pub fn new(backpressure_threshold: usize) -> Self {
        Self {
            state: StreamingLoopState::default(),
            backpressure_threshold,
            stats: PipelineStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> StreamingLoopState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Run the gates for one tick. `Capture` marks an encode as in flight.
    pub fn tick(&mut self, input: TickInput) -> TickOutcome {
        if !input.link_open {
            return TickOutcome::Stop;
        }
        self.stats.ticks += 1;

        let frame_delay = 1000.0 / input.frame_rate.max(1) as f64;
        let reason = if input.now_ms - self.state.last_frame_timestamp < frame_delay {
            Some(SkipReason::Paced)
        } else if input.buffered_amount > self.backpressure_threshold {
            Some(SkipReason::Backpressure)
        } else if self.state.encode_in_flight {
            Some(SkipReason::Busy)
        } else if !input.frame_available {
            Some(SkipReason::NoFrame)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                self.stats.record_skip(reason);
                TickOutcome::Skip(reason)
            }
            None => {
                self.state.encode_in_flight = true;
                self.stats.frames_captured += 1;
                TickOutcome::Capture
            }
        }
    }

    /// Undo a `Capture` whose frame could not be sampled after all.
    pub fn abandon_capture(&mut self) {
        self.state.encode_in_flight = false;
        self.stats.frames_captured = self.stats.frames_captured.saturating_sub(1);
        self.stats.record_skip(SkipReason::NoFrame);
    }

    /// Finish the outstanding encode at `now_ms`.
    pub fn complete(&mut self, now_ms: f64, link_open: bool, encoded: bool) -> EncodeCompletion {
        self.state.encode_in_flight = false;
        if !link_open {
            self.stats.frames_discarded += 1;
            return EncodeCompletion::Discard;
        }
        self.state.last_frame_timestamp = now_ms;
        if encoded {
            EncodeCompletion::Send
        } else {
            self.stats.encode_failures += 1;
            EncodeCompletion::Failed
        }
    }

    /// Record a frame the link accepted.
    pub fn record_sent(&mut self, bytes: usize) {
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += bytes as u64;
    }

    /// Record a frame the link refused at send time.
    pub fn record_send_refused(&mut self) {
        self.stats.frames_discarded += 1;
    }
}

type EncodeFuture = BoxFuture<'static, (RasterBuffer, MediaResult<EncodedFrame>)>;

/// Async driver of [`StreamingLoop`] for one connection
pub struct StreamingPipeline {
    link: Arc<dyn FrameLink>,
    slot: CaptureSlot,
    encoder: Arc<dyn FrameEncoder>,
    frame_rate: watch::Receiver<u32>,
    config: StreamConfig,
    cancel: CancellationToken,
}

impl StreamingPipeline {
    /// Create a pipeline streaming the capture in `slot` over `link`
    pub fn new(
        link: Arc<dyn FrameLink>,
        slot: CaptureSlot,
        encoder: Arc<dyn FrameEncoder>,
        frame_rate: watch::Receiver<u32>,
        config: StreamConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            link,
            slot,
            encoder,
            frame_rate,
            config,
            cancel,
        }
    }

    /// Spawn the pipeline on the runtime.
    pub fn spawn<C>(self, clock: C) -> tokio::task::JoinHandle<PipelineStats>
    where
        C: FrameClock + 'static,
    {
        tokio::spawn(self.run(clock))
    }

    /// Run until the link closes or the token is cancelled.
    ///
    /// An encode still outstanding at that point is dropped without sending.
    pub async fn run<C: FrameClock>(self, mut clock: C) -> PipelineStats {
        let mut state = StreamingLoop::new(self.config.backpressure_threshold);
        let mut raster = Some(RasterBuffer::new());
        let mut in_flight: Option<EncodeFuture> = None;

        info!("Streaming started ({})", self.encoder.name());

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Streaming cancelled");
                    break;
                }

                Some((buffer, result)) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                    raster = Some(buffer);
                    self.finish_encode(&mut state, clock.now_ms(), result);
                }

                now_ms = clock.tick() => {
                    match self.on_tick(&mut state, now_ms, &mut raster) {
                        TickStep::Stop => {
                            debug!("Link closed, streaming stops");
                            break;
                        }
                        TickStep::Idle => {}
                        TickStep::Encode(buffer) => {
                            let encoder = self.encoder.clone();
                            let quality = self.config.jpeg_quality;
                            in_flight = Some(Box::pin(async move {
                                encoder.encode(buffer, quality).await
                            }));
                        }
                    }
                }
            }
        }

        if in_flight.take().is_some() {
            debug!("Dropped in-flight frame on shutdown");
        }
        let stats = state.stats().clone();
        info!(
            "Streaming stopped: {} sent, {} ticks",
            stats.frames_sent, stats.ticks
        );
        stats
    }

    fn on_tick(
        &self,
        state: &mut StreamingLoop,
        now_ms: f64,
        raster: &mut Option<RasterBuffer>,
    ) -> TickStep {
        let frame_rate = *self.frame_rate.borrow();
        let guard = self.slot.read();
        let handle = guard.as_ref();

        let input = TickInput {
            now_ms,
            frame_rate,
            link_open: self.link.is_open(),
            buffered_amount: self.link.buffered_amount(),
            frame_available: handle.and_then(|h| h.video_size()).is_some(),
        };

        match state.tick(input) {
            TickOutcome::Stop => TickStep::Stop,
            TickOutcome::Skip(reason) => {
                trace!("Tick at {:.1} ms skipped: {:?}", now_ms, reason);
                TickStep::Idle
            }
            TickOutcome::Capture => {
                let mut buffer = raster.take().unwrap_or_default();
                let drawn = match handle {
                    Some(h) => h.draw_into(&mut buffer),
                    None => Err(crate::error::MediaError::CaptureNotActive),
                };
                match drawn {
                    Ok(()) => TickStep::Encode(buffer),
                    Err(e) => {
                        debug!("Frame sample failed: {}", e);
                        *raster = Some(buffer);
                        state.abandon_capture();
                        TickStep::Idle
                    }
                }
            }
        }
    }

    fn finish_encode(
        &self,
        state: &mut StreamingLoop,
        now_ms: f64,
        result: MediaResult<EncodedFrame>,
    ) {
        if let Err(e) = &result {
            warn!("Frame encode failed: {}", e);
        }

        match state.complete(now_ms, self.link.is_open(), result.is_ok()) {
            EncodeCompletion::Send => {
                let Ok(frame) = result else { return };
                let text = frame.to_data_url();
                let size = text.len();
                match self.link.send_text(text) {
                    Ok(()) => {
                        state.record_sent(size);
                        trace!("Sent {} byte frame", size);
                    }
                    Err(e) => {
                        debug!("Frame dropped at send: {}", e);
                        state.record_send_refused();
                    }
                }
            }
            EncodeCompletion::Discard => debug!("Link closed during encode, frame discarded"),
            EncodeCompletion::Failed => {}
        }
    }
}

enum TickStep {
    Stop,
    Idle,
    Encode(RasterBuffer),
}

impl std::fmt::Debug for StreamingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingPipeline")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
