use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{icon::IconPoints, Appearance, Phase};

/// Render-ready snapshot consumed by the presentation layer after each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    pub phase: Phase,
    pub loading: bool,
    pub errored: bool,
    pub progress: f32,
    pub icon: IconPoints,
    pub ring: ProgressRing,
}

impl RenderState {
    pub fn new(phase: Phase, progress: f32, icon: IconPoints, appearance: &Appearance) -> Self {
        Self {
            phase,
            loading: phase == Phase::Loading,
            errored: phase == Phase::Errored,
            progress,
            icon,
            ring: ProgressRing::new(appearance, progress),
        }
    }
}

/// Stroke parameters for the progress circle. The arc is drawn as a dashed
/// circle whose dash offset shrinks as playback advances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressRing {
    pub center: f32,
    pub radius: f32,
    pub stroke_width: f32,
    pub circumference: f32,
    pub dash_offset: f32,
}

impl ProgressRing {
    pub fn new(appearance: &Appearance, progress: f32) -> Self {
        let stroke_width = appearance.progress_circle_width;
        let radius = ((appearance.size - stroke_width) * 0.5).max(0.0);
        let circumference = 2.0 * PI * radius;
        Self {
            center: appearance.size * 0.5,
            radius,
            stroke_width,
            circumference,
            dash_offset: circumference * (1.0 - progress.clamp(0.0, 1.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::icon::{IconGeometry, IconShape};

    #[test]
    fn ring_offset_tracks_progress() {
        let appearance = Appearance::default();
        let empty = ProgressRing::new(&appearance, 0.0);
        let half = ProgressRing::new(&appearance, 0.5);
        let full = ProgressRing::new(&appearance, 1.0);

        assert_relative_eq!(empty.radius, 28.0);
        assert_relative_eq!(empty.dash_offset, empty.circumference);
        assert_relative_eq!(half.dash_offset, half.circumference * 0.5);
        assert_relative_eq!(full.dash_offset, 0.0);
    }

    #[test]
    fn flags_follow_the_phase() {
        let appearance = Appearance::default();
        let icon = IconGeometry::from_appearance(&appearance).points(IconShape::Play);
        let state = RenderState::new(Phase::Loading, 0.0, icon, &appearance);
        assert!(state.loading && !state.errored);

        let state = RenderState::new(Phase::Errored, 0.0, icon, &appearance);
        assert!(!state.loading && state.errored);
    }
}
