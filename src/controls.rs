use crate::input::{FrameInput, KeyCode, NamedKey};

/// Sun rotation applied per key press, in radians.
pub const SUN_STEP: f32 = 0.05;

/// How the color pass shades fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Shaded,
    /// Heatmap of the number of lights in each fragment's tile.
    LightCount,
    Normals,
    /// Shaded output tinted by the cascade each fragment samples.
    CascadeTint,
}

impl RenderMode {
    pub fn as_index(self) -> u32 {
        match self {
            RenderMode::Shaded => 0,
            RenderMode::LightCount => 1,
            RenderMode::Normals => 2,
            RenderMode::CascadeTint => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RenderMode::Shaded => "shaded",
            RenderMode::LightCount => "light-count",
            RenderMode::Normals => "normals",
            RenderMode::CascadeTint => "cascade-tint",
        }
    }
}

/// Discrete commands produced from one frame of input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    SetRenderMode(RenderMode),
    ToggleCamera,
    ToggleFrustum,
    SetDepthPreview(bool),
    CyclePreviewCascade,
    LogCamera,
    SpawnLight,
    RotateSun(f32),
    Quit,
}

/// Translates pressed keys into control events, in a fixed order.
pub fn control_events(input: &FrameInput) -> Vec<ControlEvent> {
    const BINDINGS: &[(KeyCode, ControlEvent)] = &[
        (KeyCode::Function(1), ControlEvent::SetRenderMode(RenderMode::Shaded)),
        (KeyCode::Function(2), ControlEvent::SetRenderMode(RenderMode::LightCount)),
        (KeyCode::Function(3), ControlEvent::SetRenderMode(RenderMode::Normals)),
        (KeyCode::Function(4), ControlEvent::SetRenderMode(RenderMode::CascadeTint)),
        (KeyCode::Character('C'), ControlEvent::ToggleCamera),
        (KeyCode::Character('F'), ControlEvent::ToggleFrustum),
        (KeyCode::Named(NamedKey::Home), ControlEvent::SetDepthPreview(true)),
        (KeyCode::Named(NamedKey::End), ControlEvent::SetDepthPreview(false)),
        (KeyCode::Named(NamedKey::Tab), ControlEvent::CyclePreviewCascade),
        (KeyCode::Character('P'), ControlEvent::LogCamera),
        (KeyCode::Character('L'), ControlEvent::SpawnLight),
        (KeyCode::Character('['), ControlEvent::RotateSun(-SUN_STEP)),
        (KeyCode::Character(']'), ControlEvent::RotateSun(SUN_STEP)),
        (KeyCode::Named(NamedKey::Escape), ControlEvent::Quit),
    ];
    BINDINGS
        .iter()
        .filter(|(key, _)| input.was_pressed(*key))
        .map(|(_, event)| *event)
        .collect()
}

/// Movement intent from held keys as (forward, right, up) axis values.
pub fn movement_axes(input: &FrameInput) -> (f32, f32, f32) {
    let axis = |positive: KeyCode, negative: KeyCode| {
        input.is_held(positive) as i32 as f32 - input.is_held(negative) as i32 as f32
    };
    (
        axis(KeyCode::Character('W'), KeyCode::Character('S')),
        axis(KeyCode::Character('D'), KeyCode::Character('A')),
        axis(
            KeyCode::Named(NamedKey::Space),
            KeyCode::Named(NamedKey::LeftShift),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(held: &[KeyCode], pressed: &[KeyCode]) -> FrameInput {
        FrameInput {
            held: held.iter().copied().collect(),
            pressed: pressed.iter().copied().collect(),
            ..FrameInput::default()
        }
    }

    #[test]
    fn function_keys_select_render_modes() {
        let input = frame(&[], &[KeyCode::Function(2)]);
        assert_eq!(
            control_events(&input),
            vec![ControlEvent::SetRenderMode(RenderMode::LightCount)]
        );
    }

    #[test]
    fn held_keys_alone_emit_no_events() {
        let input = frame(&[KeyCode::Character('C')], &[]);
        assert!(control_events(&input).is_empty());
    }

    #[test]
    fn events_follow_binding_order() {
        let input = frame(
            &[],
            &[KeyCode::Named(NamedKey::Escape), KeyCode::Character('C')],
        );
        assert_eq!(
            control_events(&input),
            vec![ControlEvent::ToggleCamera, ControlEvent::Quit]
        );
    }

    #[test]
    fn opposite_keys_cancel() {
        let input = frame(
            &[
                KeyCode::Character('W'),
                KeyCode::Character('S'),
                KeyCode::Character('D'),
            ],
            &[],
        );
        assert_eq!(movement_axes(&input), (0.0, 1.0, 0.0));
    }

    #[test]
    fn space_rises_and_shift_sinks() {
        let up = frame(&[KeyCode::Named(NamedKey::Space)], &[]);
        assert_eq!(movement_axes(&up), (0.0, 0.0, 1.0));
        let down = frame(&[KeyCode::Named(NamedKey::LeftShift)], &[]);
        assert_eq!(movement_axes(&down), (0.0, 0.0, -1.0));
    }

    #[test]
    fn render_mode_indices_are_distinct() {
        let modes = [
            RenderMode::Shaded,
            RenderMode::LightCount,
            RenderMode::Normals,
            RenderMode::CascadeTint,
        ];
        for (expected, mode) in modes.into_iter().enumerate() {
            assert_eq!(mode.as_index(), expected as u32);
        }
    }
}
