use glam::DVec2;

/// Maps turtle-space (floating point, origin at the canvas center, y up) to
/// pixel-space (integer, origin top-left, y down).
///
/// The scale factor is derived once from the canvas dimensions: half the
/// canvas diagonal, so a point at distance 1 from the origin lands within
/// the diagonal's reach in any direction. There is no inverse mapping; no
/// caller ever asks where a pixel lies in turtle-space.
pub struct Viewport {
    center_x: i64,
    center_y: i64,
    scale: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            center_x: (width / 2) as i64,
            center_y: (height / 2) as i64,
            scale: 0.5 * (width as f64).hypot(height as f64),
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn to_pixel(&self, point: DVec2) -> (i64, i64) {
        (
            self.center_x + (point.x * self.scale).round() as i64,
            self.center_y - (point.y * self.scale).round() as i64,
        )
    }

    /// Stroke thickness in pixels for a turtle-space width. Anything under
    /// one pixel clamps to one; a stroke is never dropped for being thin.
    pub fn stroke_px(&self, width: f64) -> u32 {
        ((width * self.scale).round() as i64).max(1) as u32
    }

    pub fn radius_px(&self, radius: f64) -> i64 {
        (radius * self.scale).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_canvas_center() {
        let viewport = Viewport::new(400, 300);
        assert_eq!(viewport.to_pixel(DVec2::ZERO), (200, 150));
    }

    #[test]
    fn scale_is_half_the_diagonal() {
        // hypot(400, 300) = 500.
        let viewport = Viewport::new(400, 300);
        assert_eq!(viewport.scale(), 250.0);
    }

    #[test]
    fn unit_x_maps_one_scale_right_of_center() {
        let viewport = Viewport::new(400, 300);
        assert_eq!(viewport.to_pixel(DVec2::new(1.0, 0.0)), (200 + 250, 150));
    }

    #[test]
    fn y_axis_flips() {
        let viewport = Viewport::new(400, 300);
        let (_, py) = viewport.to_pixel(DVec2::new(0.0, 0.1));
        assert!(py < 150, "positive turtle y must map above the center row");
    }

    #[test]
    fn odd_dimensions_use_integer_division_for_the_center() {
        let viewport = Viewport::new(401, 301);
        assert_eq!(viewport.to_pixel(DVec2::ZERO), (200, 150));
    }

    #[test]
    fn hairline_strokes_clamp_to_one_pixel() {
        let viewport = Viewport::new(400, 300);
        assert_eq!(viewport.stroke_px(0.0), 1);
        assert_eq!(viewport.stroke_px(0.0001), 1);
        // 0.01 * 250 = 2.5 rounds away from zero.
        assert_eq!(viewport.stroke_px(0.01), 3);
    }
}
