//! Presentation clock driving the streaming pipeline

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Display refresh rate the default clock follows
pub const DISPLAY_REFRESH_HZ: u32 = 60;

/// Source of pipeline ticks
///
/// Timestamps are milliseconds since the clock was created.
#[async_trait]
pub trait FrameClock: Send {
    /// Wait for the next tick and return its timestamp.
    async fn tick(&mut self) -> f64;

    /// Current timestamp
    fn now_ms(&self) -> f64;
}

/// Clock that ticks at the display refresh rate
#[derive(Debug)]
pub struct DisplayClock {
    origin: Instant,
    interval: Interval,
}

impl DisplayClock {
    /// Clock ticking at `refresh_hz`
    pub fn new(refresh_hz: u32) -> Self {
        let hz = u64::from(refresh_hz.max(1));
        let period = Duration::from_micros((1_000_000 + hz - 1) / hz);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            origin: Instant::now(),
            interval,
        }
    }

    fn elapsed_ms(&self, at: Instant) -> f64 {
        at.saturating_duration_since(self.origin).as_secs_f64() * 1000.0
    }
}

impl Default for DisplayClock {
    fn default() -> Self {
        Self::new(DISPLAY_REFRESH_HZ)
    }
}

#[async_trait]
impl FrameClock for DisplayClock {
    async fn tick(&mut self) -> f64 {
        // The interval yields its scheduled deadline; report when the tick was observed
        self.interval.tick().await;
        self.now_ms()
    }

    fn now_ms(&self) -> f64 {
        self.elapsed_ms(Instant::now())
    }
}
