use std::time::{Duration, Instant};

use log::info;

use crate::camera::Camera;
use crate::timer::FrameTimer;

pub const FPS_INTERVAL: Duration = Duration::from_millis(500);
pub const CAMERA_INTERVAL: Duration = Duration::from_millis(100);

/// Fire-and-forget destination for key/value diagnostics.
pub trait TelemetrySink: Send {
    fn publish(&mut self, key: &str, value: &str);
}

/// Writes telemetry through the `log` facade under the `telemetry` target.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn publish(&mut self, key: &str, value: &str) {
        info!(target: "telemetry", "{key} = {value}");
    }
}

/// Rate-limits frame and camera telemetry.
pub struct TelemetryPublisher {
    sink: Box<dyn TelemetrySink>,
    last_fps: Option<Instant>,
    last_camera: Option<Instant>,
}

impl TelemetryPublisher {
    pub fn new(sink: Box<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            last_fps: None,
            last_camera: None,
        }
    }

    pub fn tick(&mut self, now: Instant, timer: &FrameTimer, camera: &Camera) {
        if due(&mut self.last_fps, now, FPS_INTERVAL) {
            if let Some(average) = timer.average_frame_time() {
                let seconds = average.as_secs_f64();
                if seconds > 0.0 {
                    self.sink.publish("timer_fps", &format!("{:.1}", 1.0 / seconds));
                }
            }
        }
        if due(&mut self.last_camera, now, CAMERA_INTERVAL) {
            let position = camera.position();
            let forward = camera.forward();
            self.sink.publish(
                "camera_position",
                &format!("{:.2}, {:.2}, {:.2}", position.x, position.y, position.z),
            );
            self.sink.publish(
                "camera_forward",
                &format!("{:.3}, {:.3}, {:.3}", forward.x, forward.y, forward.z),
            );
            self.sink.publish(
                "camera_angle",
                &format!("yaw {:.3}, pitch {:.3}", camera.yaw(), camera.pitch()),
            );
        }
    }
}

fn due(last: &mut Option<Instant>, now: Instant, interval: Duration) -> bool {
    match *last {
        Some(previous) if now.saturating_duration_since(previous) < interval => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraPose;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl TelemetrySink for Recorder {
        fn publish(&mut self, key: &str, _value: &str) {
            self.0.lock().push(key.to_string());
        }
    }

    #[test]
    fn camera_pose_is_rate_limited() {
        let recorder = Recorder::default();
        let mut publisher = TelemetryPublisher::new(Box::new(recorder.clone()));
        let timer = FrameTimer::new(105);
        let camera = Camera::new(CameraPose::default());
        let start = Instant::now();
        publisher.tick(start, &timer, &camera);
        publisher.tick(start + Duration::from_millis(50), &timer, &camera);
        publisher.tick(start + Duration::from_millis(120), &timer, &camera);
        let keys = recorder.0.lock();
        assert_eq!(keys.iter().filter(|k| *k == "camera_position").count(), 2);
        // No full window of frame samples yet.
        assert!(!keys.iter().any(|k| k == "timer_fps"));
    }

    #[test]
    fn fps_is_published_after_a_full_window() {
        let recorder = Recorder::default();
        let mut publisher = TelemetryPublisher::new(Box::new(recorder.clone()));
        let mut timer = FrameTimer::new(105);
        let mut now = Instant::now();
        for _ in 0..crate::timer::AVERAGED_FRAMES {
            timer.begin_frame(now);
            now += Duration::from_millis(5);
            timer.end_frame(now);
        }
        publisher.tick(now, &timer, &Camera::new(CameraPose::default()));
        assert!(recorder.0.lock().iter().any(|k| k == "timer_fps"));
    }
}
