//! Frame timing and throughput statistics.

use std::time::{Duration, Instant};

/// Smallest frame time fed into the averages, so a zero-length frame
/// cannot produce an infinite rate.
const MIN_FRAME_TIME: Duration = Duration::from_micros(1);

/// Rolling throughput measurement with an adaptive reporting interval.
///
/// Frames are timed in batches of `fps_limit`. When a batch completes the
/// average rate is recomputed and becomes the next batch size, so reports
/// arrive roughly once per second whatever the frame rate.
#[derive(Debug, Clone)]
pub struct FrameClock {
    rolling: Duration,
    fps_count: u32,
    fps_limit: u32,
    avg_fps: f32,
    frame_count: u64,
    iterations: u32,
    started: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            rolling: Duration::ZERO,
            fps_count: 0,
            fps_limit: 1,
            avg_fps: 0.0,
            frame_count: 0,
            iterations: 0,
            started: Instant::now(),
        }
    }

    /// Record one frame that took `elapsed` and brought the image to
    /// `iterations` samples per pixel.
    ///
    /// Returns the new average rate when a reporting interval completes.
    pub fn record_frame(&mut self, elapsed: Duration, iterations: u32) -> Option<f32> {
        self.rolling += elapsed.max(MIN_FRAME_TIME);
        self.fps_count += 1;
        self.frame_count += 1;
        self.iterations = iterations;

        if self.fps_count < self.fps_limit {
            return None;
        }

        self.avg_fps = self.fps_count as f32 / self.rolling.as_secs_f32();
        self.fps_limit = (self.avg_fps as u32).max(1);
        self.fps_count = 0;
        self.rolling = Duration::ZERO;
        Some(self.avg_fps)
    }

    /// Start timing from scratch, as after a camera move or resize.
    pub fn restart(&mut self) {
        self.rolling = Duration::ZERO;
        self.fps_count = 0;
        self.iterations = 0;
        self.started = Instant::now();
    }

    /// Wall time since the last restart.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn avg_fps(&self) -> f32 {
        self.avg_fps
    }

    /// Frames per reporting interval; never below 1.
    pub fn fps_limit(&self) -> u32 {
        self.fps_limit
    }

    /// Frames recorded since the clock was created.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Status text, e.g. `"59.9400 fps - Iteration 120 - Elapsed time 2.00 s"`.
    pub fn status_line(&self) -> String {
        format!(
            "{:.4} fps - Iteration {} - Elapsed time {:.2} s",
            self.avg_fps,
            self.iterations,
            self.elapsed().as_secs_f32()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_reports() {
        let mut clock = FrameClock::new();
        let fps = clock.record_frame(Duration::from_millis(10), 1).unwrap();
        assert!((fps - 100.0).abs() < 0.5);
        assert!((99..=100).contains(&clock.fps_limit()));
    }

    #[test]
    fn test_reports_about_once_per_second() {
        let mut clock = FrameClock::new();
        let frame = Duration::from_millis(20);
        let mut reports = Vec::new();

        for i in 1..=200 {
            if clock.record_frame(frame, i).is_some() {
                reports.push(i);
            }
        }

        // First frame reports, then every ~50 frames at 50 fps
        assert_eq!(reports[0], 1);
        assert!(reports.windows(2).skip(1).all(|w| (49..=51).contains(&(w[1] - w[0]))));
    }

    #[test]
    fn test_limit_never_below_one() {
        let mut clock = FrameClock::new();
        for i in 0..5 {
            clock.record_frame(Duration::from_secs(3), i);
            assert!(clock.fps_limit() >= 1);
        }

        clock.record_frame(Duration::ZERO, 6);
        assert!(clock.avg_fps().is_finite());
        assert!(clock.fps_limit() >= 1);
    }

    #[test]
    fn test_status_line_format() {
        let mut clock = FrameClock::new();
        clock.record_frame(Duration::from_millis(500), 7);
        let line = clock.status_line();
        assert!(line.starts_with("2.0000 fps - Iteration 7 - Elapsed time "));
        assert!(line.ends_with(" s"));
    }

    #[test]
    fn test_restart_clears_iterations() {
        let mut clock = FrameClock::new();
        clock.record_frame(Duration::from_millis(5), 42);
        clock.restart();
        assert_eq!(clock.iterations(), 0);
        assert_eq!(clock.frame_count(), 1);
        assert!(clock.elapsed() < Duration::from_secs(5));
    }
}
