//! Play/stop icon geometry and the eased morph between the two shapes.
//!
//! Both shapes are four-point polygons so that a morph is a per-coordinate
//! interpolation. The play triangle repeats its tip to fill the fourth slot.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Appearance;

/// Half height of the play triangle relative to the inner radius.
const PLAY_HALF_HEIGHT: f32 = 0.5;
/// Half side of the stop square relative to the inner radius.
const STOP_HALF_SIDE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The icon polygon handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IconPoints(pub [Point; 4]);

impl IconPoints {
    pub fn points(&self) -> &[Point; 4] {
        &self.0
    }

    /// Formats the polygon as an SVG `points` attribute.
    pub fn svg_points(&self) -> String {
        self.0
            .iter()
            .map(|point| format!("{},{}", point.x, point.y))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// True when every coordinate is within `tolerance` of `other`.
    pub fn approx_eq(&self, other: &IconPoints, tolerance: f32) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| {
            (a.x - b.x).abs() <= tolerance && (a.y - b.y).abs() <= tolerance
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconShape {
    Play,
    Stop,
}

/// Derives the canonical shapes from the button's size and stroke width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconGeometry {
    size: f32,
    stroke_width: f32,
}

impl IconGeometry {
    pub fn new(size: f32, stroke_width: f32) -> Self {
        Self { size, stroke_width }
    }

    pub fn from_appearance(appearance: &Appearance) -> Self {
        Self::new(appearance.size, appearance.progress_circle_width)
    }

    /// Radius of the area enclosed by the progress circle.
    pub fn inner_radius(&self) -> f32 {
        (self.size * 0.5 - self.stroke_width).max(0.0)
    }

    pub fn points(&self, shape: IconShape) -> IconPoints {
        match shape {
            IconShape::Play => self.play(),
            IconShape::Stop => self.stop(),
        }
    }

    fn play(&self) -> IconPoints {
        let center = self.size * 0.5;
        let half_height = self.inner_radius() * PLAY_HALF_HEIGHT;
        let width = half_height * 3f32.sqrt();
        // Centre on the centroid rather than the bounding box.
        let left = center - width / 3.0;
        let tip = Point::new(left + width, center);
        IconPoints([
            Point::new(left, center - half_height),
            tip,
            tip,
            Point::new(left, center + half_height),
        ])
    }

    fn stop(&self) -> IconPoints {
        let center = self.size * 0.5;
        let half = self.inner_radius() * STOP_HALF_SIDE;
        IconPoints([
            Point::new(center - half, center - half),
            Point::new(center + half, center - half),
            Point::new(center + half, center + half),
            Point::new(center - half, center + half),
        ])
    }
}

/// Cubic ease-out: starts at `b` for `t = 0`, reaches `b + c` at `t = d` and
/// decelerates to zero velocity. `t` is clamped to `[0, d]`.
pub fn ease_out_cubic(t: f32, b: f32, c: f32, d: f32) -> f32 {
    if d <= 0.0 {
        return b + c;
    }
    let n = (t / d).clamp(0.0, 1.0) - 1.0;
    c * (n * n * n + 1.0) + b
}

/// Output of a single morph tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MorphFrame {
    /// The run continues and wants another frame.
    InFlight(IconPoints),
    /// The run reached its duration; the points are exactly the target shape.
    Finished(IconPoints),
}

impl MorphFrame {
    pub fn points(&self) -> IconPoints {
        match self {
            MorphFrame::InFlight(points) | MorphFrame::Finished(points) => *points,
        }
    }
}

/// One morph from the points on screen towards a target shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphRun {
    started_at: Duration,
    duration: Duration,
    initial: IconPoints,
    target: IconPoints,
    shape: IconShape,
}

impl MorphRun {
    pub fn new(
        started_at: Duration,
        duration: Duration,
        initial: IconPoints,
        shape: IconShape,
        geometry: &IconGeometry,
    ) -> Self {
        Self {
            started_at,
            duration,
            initial,
            target: geometry.points(shape),
            shape,
        }
    }

    pub fn shape(&self) -> IconShape {
        self.shape
    }

    pub fn target(&self) -> IconPoints {
        self.target
    }

    pub fn sample(&self, now: Duration) -> MorphFrame {
        let elapsed = now.saturating_sub(self.started_at);
        if elapsed >= self.duration {
            return MorphFrame::Finished(self.target);
        }

        let t = elapsed.as_secs_f32();
        let d = self.duration.as_secs_f32();
        let mut points = self.initial;
        for (point, target) in points.0.iter_mut().zip(self.target.0.iter()) {
            point.x = ease_out_cubic(t, point.x, target.x - point.x, d);
            point.y = ease_out_cubic(t, point.y, target.y - point.y, d);
        }
        MorphFrame::InFlight(points)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn geometry() -> IconGeometry {
        IconGeometry::new(60.0, 4.0)
    }

    #[test]
    fn ease_out_hits_both_ends() {
        assert_relative_eq!(ease_out_cubic(0.0, 2.0, 8.0, 450.0), 2.0);
        assert_relative_eq!(ease_out_cubic(450.0, 2.0, 8.0, 450.0), 10.0);
        assert_relative_eq!(ease_out_cubic(900.0, 2.0, 8.0, 450.0), 10.0);
        assert_relative_eq!(ease_out_cubic(5.0, 2.0, 8.0, 0.0), 10.0);
    }

    #[test]
    fn ease_out_decelerates() {
        let samples: Vec<f32> = (0..=10)
            .map(|step| ease_out_cubic(step as f32, 0.0, 1.0, 10.0))
            .collect();
        let steps: Vec<f32> = samples.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(steps.iter().all(|step| *step >= 0.0));
        assert!(steps.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn play_shape_has_a_repeated_tip() {
        let play = geometry().points(IconShape::Play);
        assert_eq!(play.0[1], play.0[2]);
        assert_relative_eq!(play.0[0].x, play.0[3].x);
        assert_relative_eq!(play.0[1].y, 30.0);
    }

    #[test]
    fn stop_shape_is_a_centred_square() {
        let stop = geometry().points(IconShape::Stop);
        let side = stop.0[1].x - stop.0[0].x;
        assert_relative_eq!(side, stop.0[3].y - stop.0[0].y);
        assert_relative_eq!((stop.0[0].x + stop.0[2].x) * 0.5, 30.0);
        assert_relative_eq!(side, 26.0 * 0.8, epsilon = 1e-4);
    }

    #[test]
    fn shapes_scale_with_configuration() {
        let small = IconGeometry::new(40.0, 2.0).points(IconShape::Stop);
        let large = IconGeometry::new(80.0, 2.0).points(IconShape::Stop);
        assert!(large.0[1].x - large.0[0].x > small.0[1].x - small.0[0].x);
    }

    #[test]
    fn morph_starts_at_initial_and_finishes_on_target() {
        let geometry = geometry();
        let initial = geometry.points(IconShape::Play);
        let run = MorphRun::new(MS * 100, MS * 450, initial, IconShape::Stop, &geometry);

        assert_eq!(run.sample(MS * 100), MorphFrame::InFlight(initial));
        assert_eq!(
            run.sample(MS * 550),
            MorphFrame::Finished(geometry.points(IconShape::Stop))
        );
    }

    #[test]
    fn morph_never_overshoots() {
        let geometry = geometry();
        let initial = geometry.points(IconShape::Play);
        let target = geometry.points(IconShape::Stop);
        let run = MorphRun::new(Duration::ZERO, MS * 450, initial, IconShape::Stop, &geometry);

        for ms in (0..450).step_by(15) {
            let points = run.sample(MS * ms).points();
            for ((p, a), b) in points.0.iter().zip(initial.0.iter()).zip(target.0.iter()) {
                assert!(p.x >= a.x.min(b.x) - 1e-4 && p.x <= a.x.max(b.x) + 1e-4);
                assert!(p.y >= a.y.min(b.y) - 1e-4 && p.y <= a.y.max(b.y) + 1e-4);
            }
        }
    }

    #[test]
    fn zero_length_morph_finishes_immediately() {
        let geometry = geometry();
        let run = MorphRun::new(
            MS * 5,
            Duration::ZERO,
            geometry.points(IconShape::Stop),
            IconShape::Play,
            &geometry,
        );
        assert!(matches!(run.sample(MS * 5), MorphFrame::Finished(_)));
    }

    #[test]
    fn svg_points_lists_every_vertex() {
        let points = IconGeometry::new(10.0, 1.0).points(IconShape::Stop);
        assert_eq!(points.svg_points().split(' ').count(), 4);
    }
}
