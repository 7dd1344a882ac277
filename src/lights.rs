use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec3};
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::config::MAX_POINT_LIGHTS;

/// A point light as laid out in the GPU light buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    pub color: [f32; 3],
    pub intensity: f32,
    pub position: [f32; 3],
    pub radius: f32,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            color: color.to_array(),
            intensity,
            position: position.to_array(),
            radius,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn color(&self) -> Vec3 {
        Vec3::from_array(self.color)
    }
}

/// Destination that receives the full light array after every change.
pub trait LightMirror: Send + Sync {
    fn upload(&self, lights: &[PointLight]);
}

struct RegistryState {
    slots: Vec<PointLight>,
    cursor: usize,
    count: usize,
    mirror: Option<Box<dyn LightMirror>>,
}

/// Fixed-capacity ring of point lights shared between threads.
///
/// Once full, each insertion overwrites the slot under the cursor, so slot
/// indices are not stable across insertions.
pub struct PointLightRegistry {
    capacity: usize,
    state: Mutex<RegistryState>,
}

impl PointLightRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(RegistryState {
                slots: vec![PointLight::zeroed(); capacity],
                cursor: 0,
                count: 0,
                mirror: None,
            }),
        }
    }

    pub fn add(&self, light: PointLight) {
        let mut state = self.state.lock();
        let slot = state.cursor;
        state.slots[slot] = light;
        state.cursor = (slot + 1) % self.capacity;
        state.count = (state.count + 1).min(self.capacity);
        if let Some(mirror) = state.mirror.as_ref() {
            mirror.upload(mirrored(&state.slots));
        }
        debug!("point light stored in slot {slot} ({} active)", state.count);
    }

    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Active lights in slot order.
    pub fn snapshot(&self) -> Vec<PointLight> {
        let state = self.state.lock();
        state.slots[..state.count].to_vec()
    }

    pub fn get(&self, slot: usize) -> Option<PointLight> {
        let state = self.state.lock();
        (slot < state.count).then(|| state.slots[slot])
    }

    /// Attaches a mirror and uploads the current contents to it.
    ///
    /// GPU buffers are sized for [`MAX_POINT_LIGHTS`]; a larger registry keeps
    /// working on the CPU but its tail is not mirrored.
    pub fn attach_mirror(&self, mirror: Box<dyn LightMirror>) {
        let mut state = self.state.lock();
        mirror.upload(mirrored(&state.slots));
        state.mirror = Some(mirror);
    }
}

fn mirrored(slots: &[PointLight]) -> &[PointLight] {
    &slots[..slots.len().min(MAX_POINT_LIGHTS)]
}

impl std::fmt::Debug for PointLightRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PointLightRegistry")
            .field("capacity", &self.capacity)
            .field("count", &state.count)
            .field("cursor", &state.cursor)
            .field("mirrored", &state.mirror.is_some())
            .finish()
    }
}

/// The scene's single sun-like light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub brightness: f32,
    /// Unit vector pointing from the light toward the scene.
    pub direction: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec3::new(1.0, 1.0, 0.8),
            brightness: 0.35,
            direction: Vec3::new(0.001, -1.0, 0.001).normalize(),
        }
    }
}

impl DirectionalLight {
    pub fn new(color: Vec3, brightness: f32, direction: Vec3) -> Self {
        Self {
            color,
            brightness,
            direction: direction.try_normalize().unwrap_or(Vec3::NEG_Y),
        }
    }

    /// Same light swung around the Z axis.
    pub fn rotated(self, angle: f32) -> Self {
        Self {
            direction: (Mat3::from_rotation_z(angle) * self.direction).normalize(),
            ..self
        }
    }

    /// Whether the light comes from above the horizon.
    pub fn is_above_horizon(&self) -> bool {
        self.direction.y < 0.0
    }
}

/// Holder for the directional light.
///
/// `update` reads the current value, applies the transform without holding
/// the lock and stores the result. Concurrent updates are not merged: the
/// last store wins.
#[derive(Debug, Default)]
pub struct DirectionalLightStore {
    light: RwLock<DirectionalLight>,
}

impl DirectionalLightStore {
    pub fn new(light: DirectionalLight) -> Self {
        Self {
            light: RwLock::new(light),
        }
    }

    pub fn get(&self) -> DirectionalLight {
        *self.light.read()
    }

    pub fn update(&self, transform: impl FnOnce(DirectionalLight) -> DirectionalLight) {
        let previous = self.get();
        let next = transform(previous);
        *self.light.write() = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn light(tag: f32) -> PointLight {
        PointLight::new(Vec3::splat(tag), Vec3::ONE, tag, 1.0)
    }

    struct RecordingMirror {
        uploads: Arc<Mutex<Vec<usize>>>,
    }

    impl LightMirror for RecordingMirror {
        fn upload(&self, lights: &[PointLight]) {
            self.uploads.lock().push(lights.len());
        }
    }

    #[test]
    fn gpu_layout_is_32_bytes() {
        assert_eq!(std::mem::size_of::<PointLight>(), 32);
    }

    #[test]
    fn ring_overwrites_oldest_slot() {
        let registry = PointLightRegistry::with_capacity(4);
        for tag in 1..=5 {
            registry.add(light(tag as f32));
        }
        assert_eq!(registry.count(), 4);
        let intensities: Vec<f32> = registry.snapshot().iter().map(|l| l.intensity).collect();
        assert_eq!(intensities, vec![5.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn count_saturates_and_latest_write_lands_in_wrapped_slot() {
        let capacity = 8;
        for extra in 0..20 {
            let total = capacity + extra;
            let registry = PointLightRegistry::with_capacity(capacity);
            for i in 0..total {
                registry.add(light(i as f32));
            }
            assert!(registry.count() <= capacity);
            let slot = (total - 1) % capacity;
            assert_eq!(registry.get(slot).unwrap().intensity, (total - 1) as f32);
        }
        let empty = PointLightRegistry::with_capacity(capacity);
        assert_eq!(empty.count(), 0);
        assert!(empty.get(0).is_none());
    }

    #[test]
    fn mirror_receives_full_array_on_attach_and_every_add() {
        let uploads = Arc::new(Mutex::new(Vec::new()));
        let registry = PointLightRegistry::with_capacity(16);
        registry.attach_mirror(Box::new(RecordingMirror {
            uploads: Arc::clone(&uploads),
        }));
        registry.add(light(1.0));
        registry.add(light(2.0));
        assert_eq!(*uploads.lock(), vec![16, 16, 16]);
    }

    #[test]
    fn concurrent_adds_never_exceed_capacity() {
        let registry = Arc::new(PointLightRegistry::with_capacity(64));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..100 {
                        registry.add(light((worker * 100 + i) as f32));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.count(), 64);
        assert_eq!(registry.snapshot().len(), 64);
    }

    #[test]
    fn store_update_replaces_whole_light() {
        let store = DirectionalLightStore::default();
        store.update(|light| DirectionalLight {
            brightness: 0.8,
            ..light
        });
        let light = store.get();
        assert_eq!(light.brightness, 0.8);
        assert_eq!(light.color, Vec3::new(1.0, 1.0, 0.8));
    }

    #[test]
    fn rotation_keeps_direction_unit_length() {
        let light = DirectionalLight::default().rotated(0.4).rotated(2.0);
        assert!((light.direction.length() - 1.0).abs() < 1e-5);
        assert!(DirectionalLight::default().is_above_horizon());
        assert!(!DirectionalLight::default().rotated(std::f32::consts::PI).is_above_horizon());
    }
}
