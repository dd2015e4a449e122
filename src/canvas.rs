use image::{Rgba, RgbaImage};

/// Pixel value of an untagged segmentation pixel.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// PIXEL RECT – integer half-open rectangle [x0, x1) × [y0, y1)
// ============================================================================

/// Integer rectangle used for dirty tracking, undo regions and blits.
///
/// Coordinates are signed so that polygon bounds may extend past the image;
/// callers clip with [`PixelRect::intersect`] before touching pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl PixelRect {
    pub const EMPTY: PixelRect = PixelRect { x0: 0, y0: 0, x1: 0, y1: 0 };

    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rectangle covering a whole `width × height` raster.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Smallest integer rectangle containing the float bounds (floor/ceil).
    pub fn from_bounds(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self::new(
            min_x.floor() as i32,
            min_y.floor() as i32,
            max_x.ceil() as i32,
            max_y.ceil() as i32,
        )
    }

    pub fn width(&self) -> u32 {
        (self.x1 - self.x0).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y1 - self.y0).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Bounding union. Empty rectangles are the identity.
    pub fn union(self, other: PixelRect) -> PixelRect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        PixelRect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn intersect(self, other: PixelRect) -> PixelRect {
        let r = PixelRect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        if r.is_empty() { PixelRect::EMPTY } else { r }
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains_rect(&self, other: &PixelRect) -> bool {
        other.x0 >= self.x0 && other.y0 >= self.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }

    /// Grow outward so every edge is a multiple of `stride`.
    pub fn align_outward(self, stride: u32) -> PixelRect {
        if self.is_empty() || stride <= 1 {
            return self;
        }
        let s = stride as i32;
        PixelRect::new(
            self.x0.div_euclid(s) * s,
            self.y0.div_euclid(s) * s,
            (self.x1 + s - 1).div_euclid(s) * s,
            (self.y1 + s - 1).div_euclid(s) * s,
        )
    }
}

// ============================================================================
// RASTER REGION HELPERS
// ============================================================================

/// Copy `rect` (clipped to `src`) out of `src` as an independent raster.
pub fn extract_region(src: &RgbaImage, rect: PixelRect) -> RgbaImage {
    let clipped = rect.intersect(PixelRect::from_size(src.width(), src.height()));
    if clipped.is_empty() {
        return RgbaImage::new(0, 0);
    }
    image::imageops::crop_imm(
        src,
        clipped.x0 as u32,
        clipped.y0 as u32,
        clipped.width(),
        clipped.height(),
    )
    .to_image()
}

/// Overwrite `dst` with `src` placed at `(x, y)`. No blending; out-of-range
/// parts of `src` are dropped.
pub fn blit_region(dst: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    image::imageops::replace(dst, src, x as i64, y as i64);
}

/// True when every pixel is fully transparent.
pub fn is_blank(img: &RgbaImage) -> bool {
    img.pixels().all(|p| p.0[3] == 0)
}
