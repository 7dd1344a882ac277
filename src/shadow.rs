use glam::{Mat4, Vec3, Vec4};
use log::trace;

use crate::config::Projection;
use crate::error::ConfigError;

/// Upper bound on cascades; the shadow map array and frame uniforms are sized for it.
pub const MAX_CASCADES: usize = 4;

/// Smallest bounding radius a cascade may collapse to.
pub const MIN_CASCADE_RADIUS: f32 = 0.01;

/// Radii are rounded up to this step so the projection size does not jitter.
const RADIUS_STEP: f32 = 1.0 / 16.0;

/// Depth extent of the light frustum, in multiples of the cascade radius.
const DEPTH_EXTENT: f32 = 6.0;

/// Validated cascade boundaries, `count + 1` strictly increasing distances.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeSplits {
    boundaries: Vec<f32>,
}

impl CascadeSplits {
    pub fn new(
        mut boundaries: Vec<f32>,
        count: usize,
        near: f32,
        far: f32,
    ) -> Result<Self, ConfigError> {
        if count == 0 || count > MAX_CASCADES {
            return Err(ConfigError::CascadeCount {
                count,
                max: MAX_CASCADES,
            });
        }
        if boundaries.len() != count + 1 {
            return Err(ConfigError::SplitCountMismatch {
                expected: count + 1,
                actual: boundaries.len(),
            });
        }
        if let Some(index) = boundaries.iter().position(|value| !value.is_finite()) {
            return Err(ConfigError::NonFiniteSplit { index });
        }
        let first = boundaries[0];
        if (first - near).abs() > near.abs().max(1.0) * 1e-6 {
            return Err(ConfigError::NearMismatch { first, near });
        }
        boundaries[0] = near;
        for pair in boundaries.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::NonMonotonicSplits {
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
        let last = boundaries[count];
        if last > far {
            return Err(ConfigError::BeyondFarPlane { last, far });
        }
        Ok(Self { boundaries })
    }

    /// Practical split scheme: `lambda` blends uniform (0.0) and logarithmic (1.0) spacing.
    pub fn practical(count: usize, near: f32, far: f32, lambda: f32) -> Result<Self, ConfigError> {
        let mut boundaries = Vec::with_capacity(count + 1);
        boundaries.push(near);
        let lambda = lambda.clamp(0.0, 1.0);
        for i in 1..count {
            let t = i as f32 / count as f32;
            let uniform = near + (far - near) * t;
            let logarithmic = near * (far / near).powf(t);
            boundaries.push(lambda * logarithmic + (1.0 - lambda) * uniform);
        }
        boundaries.push(far);
        Self::new(boundaries, count, near, far)
    }

    pub fn cascade_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn boundaries(&self) -> &[f32] {
        &self.boundaries
    }

    pub fn range(&self, index: usize) -> (f32, f32) {
        (self.boundaries[index], self.boundaries[index + 1])
    }

    /// Far boundary of every cascade, padded with the last one.
    pub fn far_bounds(&self) -> [f32; MAX_CASCADES] {
        let last = self.boundaries[self.cascade_count()];
        let mut bounds = [last; MAX_CASCADES];
        for (slot, value) in bounds.iter_mut().zip(&self.boundaries[1..]) {
            *slot = *value;
        }
        bounds
    }
}

/// One fitted light frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cascade {
    pub index: usize,
    pub near: f32,
    pub far: f32,
    pub view_projection: Mat4,
    /// Texel-snapped centroid of the camera frustum slice.
    pub center: Vec3,
    pub radius: f32,
    pub texels_per_unit: f32,
}

/// Fits a stable orthographic light frustum around each camera frustum slice.
#[derive(Debug, Clone)]
pub struct ShadowCascadeCalculator {
    splits: CascadeSplits,
    resolution: u32,
    cascades: Vec<Cascade>,
}

impl ShadowCascadeCalculator {
    pub fn new(splits: CascadeSplits, resolution: u32) -> Self {
        let cascades = (0..splits.cascade_count())
            .map(|index| {
                let (near, far) = splits.range(index);
                Cascade {
                    index,
                    near,
                    far,
                    view_projection: Mat4::IDENTITY,
                    center: Vec3::ZERO,
                    radius: MIN_CASCADE_RADIUS,
                    texels_per_unit: resolution as f32 / (2.0 * MIN_CASCADE_RADIUS),
                }
            })
            .collect();
        Self {
            splits,
            resolution: resolution.max(1),
            cascades,
        }
    }

    pub fn splits(&self) -> &CascadeSplits {
        &self.splits
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    /// Recomputes every cascade for the given camera view and light direction.
    pub fn update(&mut self, view: Mat4, projection: &Projection, light_direction: Vec3) {
        let inverse_view = view.inverse();
        let direction = light_direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        let up = light_up(direction);
        let rotation = Mat4::look_at_rh(Vec3::ZERO, direction, up);
        let inverse_rotation = rotation.inverse();

        for cascade in &mut self.cascades {
            let corners = slice_corners(inverse_view, projection, cascade.near, cascade.far);
            let centroid = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
            let radius = bounding_radius(&corners, centroid);
            let texels_per_unit = self.resolution as f32 / (2.0 * radius);

            let mut light_space = rotation.transform_point3(centroid);
            light_space.x = (light_space.x * texels_per_unit).floor() / texels_per_unit;
            light_space.y = (light_space.y * texels_per_unit).floor() / texels_per_unit;
            let center = inverse_rotation.transform_point3(light_space);

            let eye = center - direction * (2.0 * radius);
            let light_view = Mat4::look_at_rh(eye, center, up);
            let depth = DEPTH_EXTENT * radius;
            let ortho = Mat4::orthographic_rh(-radius, radius, -radius, radius, -depth, depth);

            cascade.view_projection = ortho * light_view;
            cascade.center = center;
            cascade.radius = radius;
            cascade.texels_per_unit = texels_per_unit;
            trace!(
                "cascade {} [{:.2}, {:.2}] radius {:.3}",
                cascade.index,
                cascade.near,
                cascade.far,
                radius
            );
        }
    }
}

/// World-space corners of the camera frustum between two view distances.
///
/// Near corners come first, each plane ordered bottom-left, bottom-right,
/// top-right, top-left.
pub fn slice_corners(inverse_view: Mat4, projection: &Projection, near: f32, far: f32) -> [Vec3; 8] {
    let tan_half = (projection.fov_y * 0.5).tan();
    let mut corners = [Vec3::ZERO; 8];
    for (plane, distance) in [near, far].into_iter().enumerate() {
        let half_height = distance * tan_half;
        let half_width = half_height * projection.aspect;
        let offsets = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (i, (sx, sy)) in offsets.into_iter().enumerate() {
            let local = Vec4::new(sx * half_width, sy * half_height, -distance, 1.0);
            corners[plane * 4 + i] = (inverse_view * local).truncate();
        }
    }
    corners
}

fn bounding_radius(corners: &[Vec3], centroid: Vec3) -> f32 {
    let radius = corners
        .iter()
        .map(|corner| corner.distance(centroid))
        .fold(0.0f32, f32::max);
    ((radius / RADIUS_STEP).ceil() * RADIUS_STEP).max(MIN_CASCADE_RADIUS)
}

fn light_up(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, CameraPose};

    fn default_splits() -> CascadeSplits {
        CascadeSplits::new(vec![0.1, 15.0, 100.0, 500.0, 1000.0], 4, 0.1, 1000.0).unwrap()
    }

    fn projection() -> Projection {
        Projection::new(90f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0)
    }

    fn sun_direction() -> Vec3 {
        Vec3::new(0.3, -1.0, 0.2).normalize()
    }

    #[test]
    fn accepts_valid_table() {
        let splits = default_splits();
        assert_eq!(splits.cascade_count(), 4);
        assert_eq!(splits.boundaries()[0], 0.1);
        assert_eq!(splits.range(2), (100.0, 500.0));
        assert_eq!(splits.far_bounds(), [15.0, 100.0, 500.0, 1000.0]);
    }

    #[test]
    fn rejects_first_boundary_away_from_near() {
        let err = CascadeSplits::new(vec![1.0, 15.0, 100.0], 2, 0.1, 1000.0).unwrap_err();
        assert!(matches!(err, ConfigError::NearMismatch { .. }));
    }

    #[test]
    fn rejects_non_monotonic_table() {
        let err = CascadeSplits::new(vec![0.1, 50.0, 50.0, 100.0], 3, 0.1, 1000.0).unwrap_err();
        assert_eq!(
            err,
            ConfigError::NonMonotonicSplits {
                previous: 50.0,
                next: 50.0
            }
        );
    }

    #[test]
    fn rejects_boundary_past_far_plane() {
        let err = CascadeSplits::new(vec![0.1, 15.0, 2000.0], 2, 0.1, 1000.0).unwrap_err();
        assert!(matches!(err, ConfigError::BeyondFarPlane { .. }));
    }

    #[test]
    fn rejects_count_mismatch_and_non_finite() {
        assert!(matches!(
            CascadeSplits::new(vec![0.1, 15.0], 2, 0.1, 1000.0),
            Err(ConfigError::SplitCountMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(matches!(
            CascadeSplits::new(vec![0.1, f32::NAN, 100.0], 2, 0.1, 1000.0),
            Err(ConfigError::NonFiniteSplit { index: 1 })
        ));
        assert!(matches!(
            CascadeSplits::new(vec![0.1], 0, 0.1, 1000.0),
            Err(ConfigError::CascadeCount { count: 0, .. })
        ));
    }

    #[test]
    fn practical_splits_span_the_range() {
        let splits = CascadeSplits::practical(4, 0.1, 1000.0, 0.75).unwrap();
        let bounds = splits.boundaries();
        assert_eq!(bounds.len(), 5);
        assert_eq!(bounds[0], 0.1);
        assert_eq!(bounds[4], 1000.0);
        assert!(bounds.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn slice_corners_lie_on_the_clip_planes() {
        let camera = Camera::new(CameraPose::default());
        let corners = slice_corners(camera.view().inverse(), &projection(), 1.0, 10.0);
        for (i, corner) in corners.iter().enumerate() {
            let expected = if i < 4 { 1.0 } else { 10.0 };
            let distance = (*corner - camera.position()).dot(camera.forward());
            assert!((distance - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn repeated_updates_are_bit_identical() {
        let camera = Camera::new(CameraPose::default());
        let mut first = ShadowCascadeCalculator::new(default_splits(), 2048);
        let mut second = first.clone();
        first.update(camera.view(), &projection(), sun_direction());
        second.update(camera.view(), &projection(), sun_direction());
        second.update(camera.view(), &projection(), sun_direction());
        for (a, b) in first.cascades().iter().zip(second.cascades()) {
            assert_eq!(
                a.view_projection.to_cols_array().map(f32::to_bits),
                b.view_projection.to_cols_array().map(f32::to_bits)
            );
        }
    }

    #[test]
    fn snapped_centroid_sits_on_texel_grid() {
        let mut camera = Camera::new(CameraPose {
            position: Vec3::new(3.37, 9.1, -7.93),
            ..CameraPose::default()
        });
        camera.set_orientation(0.7, -0.2);
        let direction = sun_direction();
        let mut calculator = ShadowCascadeCalculator::new(default_splits(), 2048);
        calculator.update(camera.view(), &projection(), direction);
        let rotation = Mat4::look_at_rh(Vec3::ZERO, direction, light_up(direction));
        for cascade in calculator.cascades() {
            let light_space = rotation.transform_point3(cascade.center);
            for value in [light_space.x, light_space.y] {
                let texels = value * cascade.texels_per_unit;
                assert!((texels - texels.round()).abs() < 1e-2, "{texels}");
            }
        }
    }

    #[test]
    fn radius_is_quantized_and_floored() {
        let corners = [Vec3::ZERO; 8];
        assert_eq!(bounding_radius(&corners, Vec3::ZERO), MIN_CASCADE_RADIUS);
        let corners = [Vec3::new(0.3, 0.0, 0.0); 8];
        assert_eq!(bounding_radius(&corners, Vec3::ZERO), 0.3125);
    }

    #[test]
    fn cascade_volume_contains_its_slice() {
        let camera = Camera::new(CameraPose::default());
        let mut calculator = ShadowCascadeCalculator::new(default_splits(), 2048);
        calculator.update(camera.view(), &projection(), sun_direction());
        let inverse_view = camera.view().inverse();
        for cascade in calculator.cascades() {
            for corner in slice_corners(inverse_view, &projection(), cascade.near, cascade.far) {
                let clip = cascade.view_projection * corner.extend(1.0);
                let ndc = clip.truncate() / clip.w;
                assert!(ndc.x.abs() <= 1.001 && ndc.y.abs() <= 1.001);
                assert!((0.0..=1.0).contains(&ndc.z));
            }
        }
    }

    #[test]
    fn vertical_light_uses_alternate_up_axis() {
        let camera = Camera::new(CameraPose::default());
        let mut calculator = ShadowCascadeCalculator::new(default_splits(), 1024);
        calculator.update(camera.view(), &projection(), Vec3::NEG_Y);
        for cascade in calculator.cascades() {
            assert!(cascade.view_projection.is_finite());
        }
    }
}
