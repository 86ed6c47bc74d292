//! Scene-to-canvas coordinate transform.
//!
//! Every renderer and the click picker go through the same `ViewTransform`
//! so drawings and hit tests agree pixel for pixel.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::normalize::MovementEvent;
use crate::zones::ZoneSet;

/// Axis-aligned bounding box in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Bounding box of a point set, `None` when empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f64; 2]>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<Bounds>, p| {
            Some(match acc {
                None => Bounds {
                    min_x: p[0],
                    min_y: p[1],
                    max_x: p[0],
                    max_y: p[1],
                },
                Some(b) => Bounds {
                    min_x: b.min_x.min(p[0]),
                    min_y: b.min_y.min(p[1]),
                    max_x: b.max_x.max(p[0]),
                    max_y: b.max_y.max(p[1]),
                },
            })
        })
    }

    /// Bounding box over zone polygons, gates and visible trajectories.
    ///
    /// Discarded events are not drawn and do not widen the box.
    pub fn from_scene(zones: &ZoneSet, events: &[MovementEvent]) -> Option<Self> {
        let zone_points = zones.zones().flat_map(|zone| {
            let polygon = zone.polygon.iter().flatten();
            let gate = zone.gate.iter().flatten();
            polygon.chain(gate)
        });
        let track_points = events
            .iter()
            .filter(|e| !e.discarded)
            .flat_map(|e| e.positions.iter());

        Self::from_points(zone_points.chain(track_points))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Uniform scale plus centering offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    scale: f64,
    offset: Vector2<f64>,
}

impl ViewTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: Vector2::zeros(),
        }
    }

    /// Fits `bounds` into the padded canvas, uniformly scaled and centered.
    ///
    /// `scale = min((W - 2·pad) / bw, (H - 2·pad) / bh)`. A zero-extent axis
    /// is ignored; a single point gets scale 1.
    pub fn fit(bounds: &Bounds, canvas: &CanvasConfig) -> Self {
        let available = Vector2::new(
            (canvas.width - 2.0 * canvas.padding).max(0.0),
            (canvas.height - 2.0 * canvas.padding).max(0.0),
        );
        let extent = Vector2::new(bounds.width(), bounds.height());

        let axis_scale = |avail: f64, size: f64| if size > 0.0 { avail / size } else { f64::INFINITY };
        let scale = axis_scale(available.x, extent.x).min(axis_scale(available.y, extent.y));
        let scale = if scale.is_finite() { scale } else { 1.0 };

        let min = Vector2::new(bounds.min_x, bounds.min_y);
        let centering = (available - extent * scale) / 2.0;
        let offset = Vector2::repeat(canvas.padding) + centering - min * scale;

        Self { scale, offset }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Scene → canvas.
    pub fn apply(&self, point: [f64; 2]) -> [f64; 2] {
        let p = Vector2::from(point) * self.scale + self.offset;
        [p.x, p.y]
    }

    /// Canvas → scene.
    pub fn invert(&self, point: [f64; 2]) -> [f64; 2] {
        let p = (Vector2::from(point) - self.offset) / self.scale;
        [p.x, p.y]
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Euclidean distance between two canvas points.
pub fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (Vector2::from(a) - Vector2::from(b)).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn canvas() -> CanvasConfig {
        CanvasConfig {
            width: 500.0,
            height: 300.0,
            padding: 50.0,
        }
    }

    #[test]
    fn test_fit_limited_by_height() {
        let bounds = Bounds { min_x: 0.0, min_y: 0.0, max_x: 100.0, max_y: 100.0 };
        let t = ViewTransform::fit(&bounds, &canvas());

        // min(400/100, 200/100)
        assert_relative_eq!(t.scale(), 2.0);

        // Centered horizontally: 50 + (400 - 200) / 2
        let top_left = t.apply([0.0, 0.0]);
        assert_relative_eq!(top_left[0], 150.0);
        assert_relative_eq!(top_left[1], 50.0);

        let bottom_right = t.apply([100.0, 100.0]);
        assert_relative_eq!(bottom_right[0], 350.0);
        assert_relative_eq!(bottom_right[1], 250.0);
    }

    #[test]
    fn test_fit_with_offset_bounds() {
        let bounds = Bounds { min_x: 1000.0, min_y: 500.0, max_x: 1400.0, max_y: 600.0 };
        let t = ViewTransform::fit(&bounds, &canvas());

        assert_relative_eq!(t.scale(), 1.0);
        let p = t.apply([1000.0, 500.0]);
        assert_relative_eq!(p[0], 50.0);
        assert_relative_eq!(p[1], 100.0);
    }

    #[test]
    fn test_invert_round_trips() {
        let bounds = Bounds { min_x: -20.0, min_y: 5.0, max_x: 80.0, max_y: 45.0 };
        let t = ViewTransform::fit(&bounds, &canvas());

        let scene = [33.3, 17.5];
        let back = t.invert(t.apply(scene));
        assert_relative_eq!(back[0], scene[0], epsilon = 1e-9);
        assert_relative_eq!(back[1], scene[1], epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_bounds() {
        let line = Bounds { min_x: 0.0, min_y: 10.0, max_x: 100.0, max_y: 10.0 };
        assert_relative_eq!(ViewTransform::fit(&line, &canvas()).scale(), 4.0);

        let point = Bounds { min_x: 3.0, min_y: 3.0, max_x: 3.0, max_y: 3.0 };
        let t = ViewTransform::fit(&point, &canvas());
        assert_relative_eq!(t.scale(), 1.0);
        // Lands in the canvas center
        let p = t.apply([3.0, 3.0]);
        assert_relative_eq!(p[0], 250.0);
        assert_relative_eq!(p[1], 150.0);
    }

    #[test]
    fn test_bounds_from_points() {
        assert!(Bounds::from_points(&[]).is_none());

        let b = Bounds::from_points(&[[1.0, 5.0], [-2.0, 7.0], [4.0, 6.0]]).unwrap();
        assert_eq!(b, Bounds { min_x: -2.0, min_y: 5.0, max_x: 4.0, max_y: 7.0 });
    }
}
