//! The turtle state machine: pose, pen, appearance, and the drawing
//! primitives that rasterize through a [`Viewport`].
//!
//! A turtle draws permanent strokes onto whatever canvas the caller hands
//! it; compositing visible turtles into the displayed frame is the frame
//! loop's job, via [`Turtle::stamp_to`] against the forward buffer.

use glam::DVec2;
use terrapin_raster::{Color, Raster};

use crate::space::Viewport;

/// The default contour: a small arrow pointing along +x.
const DEFAULT_SHAPE: [DVec2; 4] = [
    DVec2::new(0.02, 0.0),
    DVec2::new(-0.02, 0.02),
    DVec2::new(-0.01, 0.0),
    DVec2::new(-0.02, -0.02),
];

pub struct Turtle {
    id: u32,
    position: DVec2,
    /// Degrees, 0 along +x, counter-clockwise positive. Never normalized;
    /// turns accumulate and callers may rely on the raw total.
    heading: f64,
    width: f64,
    color: Color,
    shape: Vec<DVec2>,
    pub pen: bool,
    pub show: bool,
}

/// A sparse property patch: one optional slot per mutable attribute.
/// Omitted slots leave the attribute untouched. Explicit `x`/`y` win over
/// `position` when both are present in the same patch.
#[derive(Debug, Clone, Default)]
pub struct TurtleUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub position: Option<(f64, f64)>,
    pub heading: Option<f64>,
    pub width: Option<f64>,
    pub pen: Option<bool>,
    pub show: Option<bool>,
    pub color: Option<Color>,
    pub shape: Option<Vec<(f64, f64)>>,
}

impl Turtle {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            position: DVec2::ZERO,
            heading: 0.0,
            width: 0.01,
            color: Color::BLACK,
            shape: DEFAULT_SHAPE.to_vec(),
            pen: true,
            show: true,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn x(&self) -> f64 {
        self.position.x
    }

    pub fn y(&self) -> f64 {
        self.position.y
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn color(&self) -> Color {
        self.color
    }

    /// Move along the current heading, drawing a stroke when the pen is
    /// down. The position updates either way; a zero distance does nothing
    /// at all.
    pub fn forward(&mut self, distance: f64, viewport: &Viewport, canvas: &mut Raster) {
        if distance == 0.0 {
            return;
        }
        let next = self.position + distance * DVec2::from_angle(self.heading.to_radians());
        if self.pen {
            canvas.line(
                viewport.to_pixel(self.position),
                viewport.to_pixel(next),
                viewport.stroke_px(self.width),
                self.color,
            );
        }
        self.position = next;
    }

    pub fn left(&mut self, degrees: f64) {
        self.heading += degrees;
    }

    pub fn right(&mut self, degrees: f64) {
        self.heading -= degrees;
    }

    /// Draw an unfilled circle around the current position. The turtle does
    /// not move: this is a static figure centered on the pose, not an arc
    /// traced along a path. Pen up means nothing happens.
    pub fn circle(&self, radius: f64, viewport: &Viewport, canvas: &mut Raster) {
        if !self.pen {
            return;
        }
        canvas.circle_outline(
            viewport.to_pixel(self.position),
            viewport.radius_px(radius),
            viewport.stroke_px(self.width),
            self.color,
        );
    }

    /// Rasterize the oriented contour onto `target` as a filled polygon.
    /// Checks nothing: pen and show gate nothing here, visibility is the
    /// caller's concern.
    pub fn stamp_to(&self, viewport: &Viewport, target: &mut Raster) {
        let (sin, cos) = self.heading.to_radians().sin_cos();
        let points: Vec<(i64, i64)> = self
            .shape
            .iter()
            .map(|offset| {
                let rotated = DVec2::new(
                    offset.x * cos - offset.y * sin,
                    offset.y * cos + offset.x * sin,
                );
                viewport.to_pixel(self.position + rotated)
            })
            .collect();
        target.fill_polygon(&points, self.color);
    }

    pub fn apply(&mut self, update: TurtleUpdate) {
        if let Some((x, y)) = update.position {
            self.position = DVec2::new(x, y);
        }
        if let Some(x) = update.x {
            self.position.x = x;
        }
        if let Some(y) = update.y {
            self.position.y = y;
        }
        if let Some(heading) = update.heading {
            self.heading = heading;
        }
        if let Some(width) = update.width {
            self.width = width;
        }
        if let Some(pen) = update.pen {
            self.pen = pen;
        }
        if let Some(show) = update.show {
            self.show = show;
        }
        if let Some(color) = update.color {
            self.color = color;
        }
        if let Some(shape) = update.shape {
            self.shape = shape.into_iter().map(|(x, y)| DVec2::new(x, y)).collect();
        }
    }
}
