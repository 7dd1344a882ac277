use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Frames included in the rolling average.
pub const AVERAGED_FRAMES: usize = 100;

/// Paces the frame loop at a fixed cap and tracks recent frame times.
///
/// Frames that run late are not shortened; the next deadline is simply
/// measured from the late frame's start.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    frame_budget: Duration,
    samples: VecDeque<Duration>,
    frame_start: Option<Instant>,
    frames: u64,
}

impl FrameTimer {
    pub fn new(frame_rate_cap: u32) -> Self {
        Self {
            frame_budget: Duration::from_secs(1) / frame_rate_cap.max(1),
            samples: VecDeque::with_capacity(AVERAGED_FRAMES),
            frame_start: None,
            frames: 0,
        }
    }

    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    /// Marks the start of a frame and returns seconds since the previous one.
    pub fn begin_frame(&mut self, now: Instant) -> f32 {
        let elapsed = self
            .frame_start
            .map(|previous| now.saturating_duration_since(previous))
            .unwrap_or(Duration::ZERO);
        self.frame_start = Some(now);
        elapsed.as_secs_f32()
    }

    /// Records the frame's work time and returns when the next frame may start.
    pub fn end_frame(&mut self, now: Instant) -> Instant {
        let start = self.frame_start.unwrap_or(now);
        let work = now.saturating_duration_since(start);
        if self.samples.len() == AVERAGED_FRAMES {
            self.samples.pop_front();
        }
        self.samples.push_back(work);
        self.frames += 1;
        start + self.frame_budget.max(work)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Mean frame time once a full window of samples exists.
    pub fn average_frame_time(&self) -> Option<Duration> {
        if self.samples.len() < AVERAGED_FRAMES {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / AVERAGED_FRAMES as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_has_zero_delta() {
        let mut timer = FrameTimer::new(105);
        assert_eq!(timer.begin_frame(Instant::now()), 0.0);
    }

    #[test]
    fn fast_frames_wait_for_the_budget() {
        let mut timer = FrameTimer::new(100);
        let start = Instant::now();
        timer.begin_frame(start);
        let deadline = timer.end_frame(start + Duration::from_millis(2));
        assert_eq!(deadline, start + Duration::from_millis(10));
    }

    #[test]
    fn late_frames_are_not_truncated() {
        let mut timer = FrameTimer::new(100);
        let start = Instant::now();
        timer.begin_frame(start);
        let finish = start + Duration::from_millis(25);
        assert_eq!(timer.end_frame(finish), finish);
    }

    #[test]
    fn average_needs_a_full_window() {
        let mut timer = FrameTimer::new(105);
        let mut now = Instant::now();
        for frame in 0..AVERAGED_FRAMES {
            assert!(timer.average_frame_time().is_none(), "frame {frame}");
            timer.begin_frame(now);
            now += Duration::from_millis(4);
            timer.end_frame(now);
            now += Duration::from_millis(6);
        }
        assert_eq!(timer.average_frame_time(), Some(Duration::from_millis(4)));
        assert_eq!(timer.frames(), AVERAGED_FRAMES as u64);
    }
}
