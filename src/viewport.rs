//! Zoom/pan state and the mapping between canvas pixels and image pixels.
//!
//! The viewport stores the image-space point shown at the canvas center and
//! the number of canvas pixels per image pixel.  Every mutation re-applies the
//! position constraint: along an axis where the scaled image is larger than
//! the canvas the image must cover the canvas completely, otherwise the image
//! is centered on that axis.

use std::ops::{Add, Mul, Sub};

/// Largest zoom (canvas pixels per image pixel) when no setting overrides it.
pub const DEFAULT_MAX_SCALE: f32 = 4.0;

/// A 2D point.  Whether it is in canvas or image space is decided by the
/// caller; conversions always go through [`Viewport`].
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(self, other: Point) -> f32 {
        self.distance_sq(other).sqrt()
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Point;
    fn mul(self, rhs: f32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Visible part of the image in image coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageWindow {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

#[derive(Clone, Debug)]
pub struct Viewport {
    center_x: f32,
    center_y: f32,
    scale: f32,
    min_scale: f32,
    max_scale: f32,
    image_width: f32,
    image_height: f32,
    canvas_width: f32,
    canvas_height: f32,
}

impl Viewport {
    /// Viewport showing the whole image, centered.
    pub fn new(image_width: u32, image_height: u32, canvas_width: u32, canvas_height: u32, max_scale: f32) -> Self {
        let iw = image_width.max(1) as f32;
        let ih = image_height.max(1) as f32;
        let cw = canvas_width.max(1) as f32;
        let ch = canvas_height.max(1) as f32;
        let min_scale = (cw / iw).min(ch / ih);
        let mut vp = Self {
            center_x: iw / 2.0,
            center_y: ih / 2.0,
            scale: min_scale,
            min_scale,
            // A tiny image must still be allowed to fit the canvas.
            max_scale: max_scale.max(min_scale),
            image_width: iw,
            image_height: ih,
            canvas_width: cw,
            canvas_height: ch,
        };
        vp.reset();
        vp
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn min_scale(&self) -> f32 {
        self.min_scale
    }

    pub fn max_scale(&self) -> f32 {
        self.max_scale
    }

    /// Image-space point displayed at the canvas center.
    pub fn center(&self) -> Point {
        Point::new(self.center_x, self.center_y)
    }

    pub fn canvas_size(&self) -> (f32, f32) {
        (self.canvas_width, self.canvas_height)
    }

    /// Back to the initial window: whole image visible and centered.
    pub fn reset(&mut self) {
        self.scale = self.min_scale;
        self.center_x = self.image_width / 2.0;
        self.center_y = self.image_height / 2.0;
    }

    /// Zoom by `factor` around the canvas point `pivot` (canvas center when
    /// `None`).  A negative factor jumps to 1:1 and brings the image point
    /// under the pivot to the middle of the canvas.
    pub fn zoom(&mut self, factor: f32, pivot: Option<Point>) {
        if factor.is_nan() {
            return;
        }
        let pivot = pivot.unwrap_or(Point::new(self.canvas_width / 2.0, self.canvas_height / 2.0));
        let anchor = self.to_image(pivot);

        if factor >= 0.0 {
            self.scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);
            self.center_x = anchor.x - (pivot.x - self.canvas_width / 2.0) / self.scale;
            self.center_y = anchor.y - (pivot.y - self.canvas_height / 2.0) / self.scale;
        } else {
            self.scale = 1.0_f32.clamp(self.min_scale, self.max_scale);
            self.center_x = anchor.x;
            self.center_y = anchor.y;
        }
        self.fix_position();
    }

    /// Scroll by a canvas-space delta.  Axes where the image fits are left
    /// untouched.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        if self.image_width * self.scale > self.canvas_width {
            self.center_x -= dx / self.scale;
        }
        if self.image_height * self.scale > self.canvas_height {
            self.center_y -= dy / self.scale;
        }
        self.fix_position();
    }

    pub fn to_image(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.canvas_width / 2.0) / self.scale + self.center_x,
            (p.y - self.canvas_height / 2.0) / self.scale + self.center_y,
        )
    }

    pub fn to_canvas(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.center_x) * self.scale + self.canvas_width / 2.0,
            (p.y - self.center_y) * self.scale + self.canvas_height / 2.0,
        )
    }

    /// Displayed image rectangle on the canvas as (top-left, bottom-right).
    pub fn image_rect_on_canvas(&self) -> (Point, Point) {
        (
            self.to_canvas(Point::new(0.0, 0.0)),
            self.to_canvas(Point::new(self.image_width, self.image_height)),
        )
    }

    /// Whether a canvas point falls on the displayed image.
    pub fn is_in_image(&self, p: Point) -> bool {
        let (tl, br) = self.image_rect_on_canvas();
        p.x >= tl.x && p.y >= tl.y && p.x < br.x && p.y < br.y
    }

    /// Part of the image currently visible on the canvas, in image space.
    pub fn image_window(&self) -> ImageWindow {
        let tl = self.to_image(Point::new(0.0, 0.0));
        let br = self.to_image(Point::new(self.canvas_width, self.canvas_height));
        ImageWindow {
            min_x: tl.x.max(0.0),
            max_x: br.x.min(self.image_width),
            min_y: tl.y.max(0.0),
            max_y: br.y.min(self.image_height),
        }
    }

    /// Project an image-space point onto the nearest edge of the visible
    /// image window.  Used when a contour leaves or re-enters the image.
    pub fn snap_to_boundary(&self, p: Point) -> Point {
        let w = self.image_window();
        let candidates = [
            ((w.min_x - p.x).abs(), Point::new(w.min_x, p.y)),
            ((w.max_x - p.x).abs(), Point::new(w.max_x, p.y)),
            ((w.min_y - p.y).abs(), Point::new(p.x, w.min_y)),
            ((w.max_y - p.y).abs(), Point::new(p.x, w.max_y)),
        ];
        let mut best = candidates[0];
        for c in &candidates[1..] {
            if c.0 < best.0 {
                best = *c;
            }
        }
        best.1
    }

    fn fix_position(&mut self) {
        self.center_x = clamp_axis(self.center_x, self.image_width, self.canvas_width, self.scale);
        self.center_y = clamp_axis(self.center_y, self.image_height, self.canvas_height, self.scale);
    }
}

fn clamp_axis(center: f32, image_len: f32, canvas_len: f32, scale: f32) -> f32 {
    if image_len * scale > canvas_len {
        let half = canvas_len / (2.0 * scale);
        center.clamp(half, image_len - half)
    } else {
        image_len / 2.0
    }
}
