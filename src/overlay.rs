//! Display cache: the image composited with the segmentation buffer, kept as
//! a pyramid of power-of-two reductions.
//!
//! Edits mark rectangles dirty; the next [`OverlayCache::get`] recomposites
//! only the dirty area (aligned to the coarsest level's stride) and patches
//! every pyramid level in place.  When the dirty area covers the whole image
//! all levels are regenerated from the full-resolution composite.  Levels are
//! always produced directly from level 0 rather than from each other, so a
//! level never accumulates resampling error from the levels above it.

use std::time::{Duration, Instant};

use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::{PixelRect, blit_region};

/// Pyramid depth used when no setting overrides it.
pub const DEFAULT_LEVELS: usize = 4;

/// Tone curve applied to the base image before the mask is added.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum ToneMap {
    #[default]
    None,
    Invert,
    /// `out = 255 · (in / 255)^gamma`; gamma below 1 brightens.
    Brightness { gamma: f32 },
}

impl ToneMap {
    fn lut(self) -> [u8; 256] {
        let mut lut = [0u8; 256];
        for (i, v) in lut.iter_mut().enumerate() {
            *v = match self {
                ToneMap::None => i as u8,
                ToneMap::Invert => 255 - i as u8,
                ToneMap::Brightness { gamma } => {
                    let g = if gamma.is_finite() && gamma > 0.0 { gamma } else { 1.0 };
                    ((i as f32 / 255.0).powf(g) * 255.0).round().clamp(0.0, 255.0) as u8
                }
            };
        }
        lut
    }
}

/// A coalesced invalidation waiting for its deadline.
#[derive(Clone, Copy, Debug)]
struct PendingInvalidation {
    rect: PixelRect,
    deadline: Instant,
}

pub struct OverlayCache {
    width: u32,
    height: u32,
    levels: usize,
    valid: bool,
    /// Union of everything invalidated since the last rebuild.
    dirty: PixelRect,
    pyramid: Vec<RgbaImage>,
    pending: Option<PendingInvalidation>,
    tone_map: ToneMap,
    show_segmentation: bool,
    full_rebuilds: u64,
    partial_rebuilds: u64,
}

impl OverlayCache {
    pub fn new(width: u32, height: u32, levels: usize) -> Self {
        Self {
            width,
            height,
            levels: levels.clamp(1, 16),
            valid: false,
            dirty: PixelRect::from_size(width, height),
            pyramid: Vec::new(),
            pending: None,
            tone_map: ToneMap::None,
            show_segmentation: true,
            full_rebuilds: 0,
            partial_rebuilds: 0,
        }
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Pixel stride of the coarsest level; dirty areas are aligned to it.
    pub fn stride(&self) -> u32 {
        1 << (self.levels - 1)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Area that the next rebuild will recomposite, if any.
    pub fn dirty_rect(&self) -> Option<PixelRect> {
        if self.valid { None } else { Some(self.dirty) }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// (full, partial) rebuild counts since creation.
    pub fn rebuild_counts(&self) -> (u64, u64) {
        (self.full_rebuilds, self.partial_rebuilds)
    }

    pub fn tone_map(&self) -> ToneMap {
        self.tone_map
    }

    pub fn set_tone_map(&mut self, tone_map: ToneMap) {
        if self.tone_map != tone_map {
            self.tone_map = tone_map;
            self.invalidate(None);
        }
    }

    /// Like [`set_tone_map`](Self::set_tone_map) but the redraw is deferred,
    /// so a burst of changes (e.g. a slider drag) costs one rebuild.
    pub fn set_tone_map_after(&mut self, tone_map: ToneMap, delay: Duration, now: Instant) {
        if self.tone_map != tone_map {
            self.tone_map = tone_map;
            self.invalidate_after(None, delay, now);
        }
    }

    pub fn show_segmentation(&self) -> bool {
        self.show_segmentation
    }

    pub fn set_show_segmentation(&mut self, show: bool) {
        if self.show_segmentation != show {
            self.show_segmentation = show;
            self.invalidate(None);
        }
    }

    /// Pyramid level that best matches a display scale.
    pub fn level_for_scale(&self, scale: f32) -> usize {
        let max = (self.levels - 1) as f32;
        if scale.is_nan() || scale <= 0.0 {
            return self.levels - 1;
        }
        (-scale.log2()).floor().clamp(0.0, max) as usize
    }

    /// Level `k` as last built; may be stale while the cache is invalid.
    pub fn level(&self, k: usize) -> Option<&RgbaImage> {
        self.pyramid.get(k)
    }

    /// Up-to-date render for `scale`, rebuilding first when needed.
    pub fn get(&mut self, image: &RgbaImage, segmentation: &RgbaImage, scale: f32) -> Option<(usize, &RgbaImage)> {
        if !self.valid {
            self.rebuild(image, segmentation);
        }
        let level = self.level_for_scale(scale);
        self.pyramid.get(level).map(|img| (level, img))
    }

    /// Mark `rect` (or the whole image) stale.  A pending delayed
    /// invalidation is folded in and cancelled.
    pub fn invalidate(&mut self, rect: Option<PixelRect>) {
        let mut r = self.clip(rect);
        if let Some(pending) = self.pending.take() {
            r = r.union(pending.rect);
        }
        self.mark_dirty(r);
    }

    /// Schedule an invalidation for `now + delay`.  Repeated calls coalesce
    /// into one pending invalidation that fires at the earliest deadline.
    pub fn invalidate_after(&mut self, rect: Option<PixelRect>, delay: Duration, now: Instant) {
        let r = self.clip(rect);
        let deadline = now + delay;
        match self.pending.as_mut() {
            Some(pending) => {
                pending.rect = pending.rect.union(r);
                pending.deadline = pending.deadline.min(deadline);
            }
            None => self.pending = Some(PendingInvalidation { rect: r, deadline }),
        }
    }

    /// Apply a pending invalidation whose deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(pending) if pending.deadline <= now => {
                self.pending = None;
                self.mark_dirty(pending.rect);
                true
            }
            _ => false,
        }
    }

    /// Bring every level up to date with `segmentation`.
    pub fn rebuild(&mut self, image: &RgbaImage, segmentation: &RgbaImage) {
        if self.valid {
            return;
        }
        let dims = (self.width, self.height);
        if image.dimensions() != dims || segmentation.dimensions() != dims {
            crate::log_err!(
                "overlay rebuild skipped: cache {:?}, image {:?}, segmentation {:?}",
                dims,
                image.dimensions(),
                segmentation.dimensions()
            );
            return;
        }

        let bounds = PixelRect::from_size(self.width, self.height);
        let aligned = self.dirty.align_outward(self.stride());
        let lut = self.tone_map.lut();

        if self.pyramid.len() != self.levels || aligned.contains_rect(&bounds) {
            let composite = composite_region(image, segmentation, bounds, &lut, self.show_segmentation);
            self.pyramid = (0..self.levels)
                .into_par_iter()
                .map(|k| downsample(&composite, 1 << k))
                .collect();
            self.full_rebuilds += 1;
            crate::log_info!("overlay: full rebuild {}×{}, {} levels", self.width, self.height, self.levels);
        } else {
            let patch_rect = aligned.intersect(bounds);
            if !patch_rect.is_empty() {
                let patch = composite_region(image, segmentation, patch_rect, &lut, self.show_segmentation);
                let stack: Vec<RgbaImage> = (0..self.levels)
                    .into_par_iter()
                    .map(|k| downsample(&patch, 1 << k))
                    .collect();
                for (k, (level, local)) in self.pyramid.iter_mut().zip(&stack).enumerate() {
                    blit_region(level, local, patch_rect.x0 >> k, patch_rect.y0 >> k);
                }
            }
            self.partial_rebuilds += 1;
            crate::log_info!("overlay: partial rebuild {:?}", patch_rect);
        }

        self.valid = true;
        self.dirty = PixelRect::EMPTY;
    }

    fn clip(&self, rect: Option<PixelRect>) -> PixelRect {
        let bounds = PixelRect::from_size(self.width, self.height);
        rect.map_or(bounds, |r| r.intersect(bounds))
    }

    fn mark_dirty(&mut self, rect: PixelRect) {
        if rect.is_empty() {
            return;
        }
        if self.valid {
            self.dirty = rect;
            self.valid = false;
        } else {
            self.dirty = self.dirty.union(rect);
        }
    }
}

// ============================================================================
// COMPOSITING + DOWNSAMPLING
// ============================================================================

/// Tone-mapped image plus the segmentation colors (additive, weighted by
/// mask alpha) over `rect`.  Output is opaque.
fn composite_region(
    image: &RgbaImage,
    segmentation: &RgbaImage,
    rect: PixelRect,
    lut: &[u8; 256],
    show_segmentation: bool,
) -> RgbaImage {
    let (w, h) = (rect.width(), rect.height());
    let mut out = RgbaImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_exact_mut(w as usize * 4).enumerate().for_each(|(row, dst)| {
        let y = rect.y0 as u32 + row as u32;
        for col in 0..w {
            let x = rect.x0 as u32 + col;
            let base = image.get_pixel(x, y).0;
            let mut px = [lut[base[0] as usize], lut[base[1] as usize], lut[base[2] as usize], 255];
            if show_segmentation {
                let seg = segmentation.get_pixel(x, y).0;
                if seg[3] > 0 {
                    for c in 0..3 {
                        let add = (seg[c] as u16 * seg[3] as u16 + 127) / 255;
                        px[c] = px[c].saturating_add(add as u8);
                    }
                }
            }
            let i = col as usize * 4;
            dst[i..i + 4].copy_from_slice(&px);
        }
    });
    out
}

/// Size of a dimension after reduction by `factor`, rounded, at least 1.
fn level_dim(len: u32, factor: u32) -> u32 {
    ((len + factor / 2) / factor).max(1)
}

/// Box-filter reduction by an integer factor.  Blocks hanging over the
/// source edge average only the pixels that exist.
fn downsample(src: &RgbaImage, factor: u32) -> RgbaImage {
    if factor <= 1 {
        return src.clone();
    }
    let (sw, sh) = src.dimensions();
    let (dw, dh) = (level_dim(sw, factor), level_dim(sh, factor));
    let mut out = RgbaImage::new(dw, dh);
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_exact_mut(dw as usize * 4).enumerate().for_each(|(y, dst)| {
        let y0 = y as u32 * factor;
        let y1 = (y0 + factor).min(sh);
        for x in 0..dw {
            let x0 = x * factor;
            let x1 = (x0 + factor).min(sw);
            let mut acc = [0u32; 4];
            let mut n = 0u32;
            for sy in y0..y1 {
                for sx in x0..x1 {
                    let p = src.get_pixel(sx, sy).0;
                    for c in 0..4 {
                        acc[c] += p[c] as u32;
                    }
                    n += 1;
                }
            }
            if n > 0 {
                let i = x as usize * 4;
                for c in 0..4 {
                    dst[i + c] = ((acc[c] + n / 2) / n) as u8;
                }
            }
        }
    });
    out
}
