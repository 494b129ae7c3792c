//! UI overlay hook.
//!
//! A raster pass flagged with `overlay` hands its encoder to an
//! [`OverlayRecorder`] after the scene draws and before the render pass ends,
//! so overlay commands land in the same render pass instance on top of the
//! scene.

use std::time::Duration;

use tracing::info;

use framekit_core::Timer;
use framekit_rhi::encoder::CommandEncoder;

use crate::error::RendererResult;
use crate::sequencer::FrameContext;

/// Records overlay commands inside the main render pass.
pub trait OverlayRecorder {
    fn record(&mut self, encoder: &dyn CommandEncoder, frame: &FrameContext) -> RendererResult<()>;
}

/// Records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl OverlayRecorder for NoOverlay {
    fn record(&mut self, _encoder: &dyn CommandEncoder, _frame: &FrameContext) -> RendererResult<()> {
        Ok(())
    }
}

/// Averages over one reporting window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStats {
    pub frames: u32,
    pub fps: f32,
    pub frame_ms: f32,
}

/// Counts frames and reports an average once per `interval`.
#[derive(Debug)]
pub struct FrameCounter {
    interval: Duration,
    window_start: Duration,
    frames: u32,
}

impl FrameCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: Duration::ZERO,
            frames: 0,
        }
    }

    /// Counts a frame finished at `now` (time since start). Returns the stats
    /// of the window when it closes.
    pub fn frame_at(&mut self, now: Duration) -> Option<FrameStats> {
        self.frames += 1;
        let window = now.saturating_sub(self.window_start);
        if window < self.interval {
            return None;
        }

        let secs = window.as_secs_f32();
        let stats = FrameStats {
            frames: self.frames,
            fps: self.frames as f32 / secs,
            frame_ms: secs * 1000.0 / self.frames as f32,
        };
        self.window_start = now;
        self.frames = 0;
        Some(stats)
    }
}

/// Overlay that logs frame statistics and the active mode once per second.
/// Widget drawing is left to a UI library; nothing is recorded.
#[derive(Debug)]
pub struct FrameStatsOverlay {
    timer: Timer,
    counter: FrameCounter,
    mode: &'static str,
}

impl FrameStatsOverlay {
    pub fn new(mode: &'static str) -> Self {
        Self {
            timer: Timer::new(),
            counter: FrameCounter::new(Duration::from_secs(1)),
            mode,
        }
    }

    pub fn set_mode(&mut self, mode: &'static str) {
        self.mode = mode;
    }
}

impl OverlayRecorder for FrameStatsOverlay {
    fn record(&mut self, _encoder: &dyn CommandEncoder, frame: &FrameContext) -> RendererResult<()> {
        if let Some(stats) = self.counter.frame_at(self.timer.elapsed()) {
            info!(
                "{:.1} fps ({:.2} ms), {}x{}, mode {}",
                stats.fps, stats.frame_ms, frame.extent.width, frame.extent.height, self.mode
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_counter_reports_once_per_interval() {
        let mut counter = FrameCounter::new(Duration::from_secs(1));
        for i in 1..60 {
            assert!(counter.frame_at(Duration::from_millis(i * 16)).is_none());
        }

        let stats = counter
            .frame_at(Duration::from_millis(1000))
            .expect("window closed");
        assert_eq!(stats.frames, 60);
        assert!((stats.fps - 60.0).abs() < 1e-3);

        assert!(counter.frame_at(Duration::from_millis(1016)).is_none());
    }
}
