use thiserror::Error;

/// Configuration problems detected before the first frame is rendered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("cascade count must be between 1 and {max}, got {count}")]
    CascadeCount { count: usize, max: usize },
    #[error("cascade split table has {actual} boundaries, expected {expected}")]
    SplitCountMismatch { expected: usize, actual: usize },
    #[error("cascade split boundary {index} is not a finite number")]
    NonFiniteSplit { index: usize },
    #[error("first cascade boundary {first} does not match the camera near plane {near}")]
    NearMismatch { first: f32, near: f32 },
    #[error("cascade boundaries must increase strictly: {previous} followed by {next}")]
    NonMonotonicSplits { previous: f32, next: f32 },
    #[error("last cascade boundary {last} lies beyond the camera far plane {far}")]
    BeyondFarPlane { last: f32, far: f32 },
    #[error("invalid clip range: near {near}, far {far}")]
    ClipRange { near: f32, far: f32 },
    #[error("field of view must lie in (0, 180) degrees, got {0}")]
    FieldOfView(f32),
    #[error("point light capacity must be between 1 and {max}, got {capacity}")]
    LightCapacity { capacity: usize, max: usize },
    #[error("shadow map resolution must be a non-zero power of two, got {0}")]
    ShadowResolution(u32),
    #[error("frame rate cap must be positive")]
    FrameRateCap,
}

/// Failures raised while building the GPU pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("shader `{label}` failed validation: {message}")]
    Shader { label: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_error_names_the_module() {
        let err = PipelineError::Shader {
            label: "color-shader",
            message: "unknown identifier".into(),
        };
        assert_eq!(
            err.to_string(),
            "shader `color-shader` failed validation: unknown identifier"
        );
    }

    #[test]
    fn config_errors_describe_the_bad_value() {
        let err = ConfigError::NonMonotonicSplits {
            previous: 50.0,
            next: 20.0,
        };
        assert_eq!(
            err.to_string(),
            "cascade boundaries must increase strictly: 50 followed by 20"
        );
    }
}
