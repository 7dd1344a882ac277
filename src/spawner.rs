use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use glam::Vec3;
use log::{debug, warn};

use crate::lights::{PointLight, PointLightRegistry};

const GOLDEN_ANGLE: f32 = 2.399_963;

const SPIRAL_COLORS: [Vec3; 3] = [
    Vec3::new(1.0, 0.4, 0.4),
    Vec3::new(0.4, 1.0, 0.4),
    Vec3::new(0.4, 0.4, 1.0),
];

/// Background thread adding lights to a shared registry at a fixed interval.
pub struct LightSpawner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<usize>>,
}

impl LightSpawner {
    /// Spawns lights on a spiral around `center`, one every `interval`.
    pub fn start(registry: Arc<PointLightRegistry>, center: Vec3, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("light-spawner".into())
            .spawn(move || {
                let mut spawned = 0;
                while !flag.load(Ordering::Relaxed) {
                    registry.add(spiral_light(center, spawned));
                    spawned += 1;
                    thread::sleep(interval);
                }
                debug!("light spawner stopped after {spawned} lights");
                spawned
            });
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("failed to start light spawner: {err}");
                None
            }
        };
        Self { stop, handle }
    }

    /// Stops the thread and returns how many lights it added.
    pub fn stop(mut self) -> usize {
        self.shutdown()
    }

    fn shutdown(&mut self) -> usize {
        self.stop.store(true, Ordering::Relaxed);
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for LightSpawner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The `n`th light of a golden-angle spiral on the ground around `center`.
pub fn spiral_light(center: Vec3, n: usize) -> PointLight {
    let angle = n as f32 * GOLDEN_ANGLE;
    let distance = 2.0 * (n as f32 + 1.0).sqrt();
    let position = center + Vec3::new(angle.cos() * distance, 1.0, angle.sin() * distance);
    let color = SPIRAL_COLORS[n % SPIRAL_COLORS.len()];
    PointLight::new(position, color, 1.0, 8.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawner_adds_lights_until_stopped() {
        let registry = Arc::new(PointLightRegistry::with_capacity(8));
        let spawner = LightSpawner::start(Arc::clone(&registry), Vec3::ZERO, Duration::from_millis(1));
        thread::sleep(Duration::from_millis(50));
        let spawned = spawner.stop();
        assert!(spawned >= 1);
        assert_eq!(registry.count(), spawned.min(8));
        thread::sleep(Duration::from_millis(10));
        assert_eq!(registry.count(), spawned.min(8));
    }

    #[test]
    fn spiral_moves_outward() {
        let near = spiral_light(Vec3::ZERO, 0).position();
        let far = spiral_light(Vec3::ZERO, 50).position();
        assert!(far.length() > near.length());
        assert_eq!(near.y, 1.0);
    }
}
