use image::{Rgba, RgbaImage};

use crate::canvas::{PixelRect, TRANSPARENT};
use crate::viewport::Point;

/// Consecutive points closer than this (squared) are merged before filling
/// or smoothing.
pub const DUPLICATE_DIST_SQ: f32 = 1e-4;

/// What a fill writes into the segmentation buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Paint {
    Color(Rgba<u8>),
    Erase,
}

impl Paint {
    fn pixel(self) -> Rgba<u8> {
        match self {
            Paint::Color(c) => c,
            Paint::Erase => TRANSPARENT,
        }
    }
}

/// Drop points that nearly coincide with their predecessor.
pub fn dedup_points(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        match out.last() {
            Some(&last) if last.distance_sq(p) < DUPLICATE_DIST_SQ => {}
            _ => out.push(p),
        }
    }
    out
}

/// Bounding rectangle of a point set, floor/ceil to integers.
pub fn polygon_bounds(points: &[Point]) -> Option<PixelRect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(PixelRect::from_bounds(min_x, min_y, max_x, max_y))
}

// ============================================================================
// SCANLINE FILL (even-odd)
// ============================================================================

/// Fill a closed polygon into `buffer` with the even-odd rule.
///
/// Scanline `y` collects one crossing per non-horizontal edge whose closed
/// y-interval contains `y`.  A vertex lying exactly on a scanline is shared
/// by two edges and is counted by both.  Crossings are paired after sorting
/// and `[x_i, x_{i+1})` is painted on that row.
///
/// Returns the unclipped integer bounds of the polygon, or `None` when there
/// are no points.
pub fn fill_polygon(buffer: &mut RgbaImage, polygon: &[Point], paint: Paint) -> Option<PixelRect> {
    let pts = dedup_points(polygon);
    let bounds = polygon_bounds(&pts)?;

    let w = buffer.width() as i32;
    let h = buffer.height() as i32;
    let pixel = paint.pixel();
    let n = pts.len();

    let y_start = bounds.y0.max(0);
    let y_end = bounds.y1.min(h);
    let mut nodes: Vec<f32> = Vec::with_capacity(8);

    for y in y_start..y_end {
        let yf = y as f32;
        nodes.clear();
        for i in 0..n {
            let vi = pts[i];
            let vj = pts[(i + 1) % n];
            if vi.y == vj.y {
                continue;
            }
            let (lo, hi) = if vi.y < vj.y { (vi.y, vj.y) } else { (vj.y, vi.y) };
            if yf >= lo && yf <= hi {
                nodes.push(vi.x + (yf - vi.y) * (vj.x - vi.x) / (vj.y - vi.y));
            }
        }
        nodes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut k = 0;
        while k + 1 < nodes.len() {
            let x_start = (nodes[k].ceil() as i32).clamp(0, w);
            let x_end = (nodes[k + 1].ceil() as i32).clamp(0, w);
            for x in x_start..x_end {
                buffer.put_pixel(x as u32, y as u32, pixel);
            }
            k += 2;
        }
    }

    Some(bounds)
}

// ============================================================================
// BRUSH CAPSULE
// ============================================================================

/// Stadium-shaped outline around the segment `p1 → p2` with the given
/// radius: a half circle behind `p1`, then a half circle ahead of `p2`.
/// The point count per half circle grows with the diameter.
pub fn stroke_capsule(p1: Point, p2: Point, radius: f32) -> Vec<Point> {
    let delta = p2 - p1;
    let len = delta.length();
    let d = if len > 0.0 { delta * (1.0 / len) } else { Point::new(1.0, 0.0) };
    let n = Point::new(d.y, -d.x);

    let nseg = ((2.0 * radius).floor() as usize).max(2);
    let step = std::f32::consts::PI / (nseg - 1) as f32;

    let mut outline = Vec::with_capacity(nseg * 2);
    for k in 0..nseg {
        let (s, c) = (k as f32 * step).sin_cos();
        outline.push(p1 + n * (radius * c) - d * (radius * s));
    }
    for k in 0..nseg {
        let (s, c) = (k as f32 * step + std::f32::consts::PI).sin_cos();
        outline.push(p2 + n * (radius * c) - d * (radius * s));
    }
    outline
}
