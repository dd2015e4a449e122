use std::path::Path;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use uuid::Uuid;

use crate::canvas::{PixelRect, blit_region, extract_region};
use crate::components::history::UndoLog;
use crate::io::{LoadError, SaveError, SavePayload, SaveSink, check_dimensions, load_image};
use crate::ops::labels::{LabelError, paint_label_map, rle, rle_decode, to_label_map};
use crate::ops::shapes::{Paint, fill_polygon, polygon_bounds, stroke_capsule};
use crate::ops::smoothing::smooth_contour;
use crate::overlay::{OverlayCache, ToneMap};
use crate::settings::SegmenterSettings;
use crate::tags::{TagError, TagList};
use crate::viewport::{Point, Viewport};
use crate::{log_err, log_info, log_warn};

/// Canvas color outside the image.
pub const BACKGROUND: Rgba<u8> = Rgba([224, 224, 224, 255]);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

/// Error type for restoring a previously exported payload
#[derive(Debug)]
pub enum ImportError {
    NotReady,
    SizeMismatch { expected: (u32, u32), found: (u32, u32) },
    Label(LabelError),
    Tag(TagError),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::NotReady => write!(f, "no image loaded"),
            ImportError::SizeMismatch { expected, found } => write!(
                f,
                "payload is {}×{}, image is {}×{}",
                found.0, found.1, expected.0, expected.1
            ),
            ImportError::Label(e) => write!(f, "label map: {}", e),
            ImportError::Tag(e) => write!(f, "tags: {}", e),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<LabelError> for ImportError {
    fn from(e: LabelError) -> Self {
        ImportError::Label(e)
    }
}

impl From<TagError> for ImportError {
    fn from(e: TagError) -> Self {
        ImportError::Tag(e)
    }
}

/// Everything that exists only once the image dimensions are known.
struct Document {
    image: RgbaImage,
    segmentation: RgbaImage,
    viewport: Viewport,
    overlay: OverlayCache,
    history: UndoLog,
}

/// Freehand polygon being authored, in image space.
struct ContourDraft {
    points: Vec<Point>,
    /// Last image-space position seen while the pointer was off the image.
    outside_at: Option<Point>,
}

/// Brush drag in progress.
struct StrokeDraft {
    /// Pre-stroke pixels of `covered`.
    before: RgbaImage,
    /// Aligned undo region reached so far.
    covered: PixelRect,
    last: Point,
    paint: Paint,
}

impl StrokeDraft {
    /// Grow the captured area to include `region`, copying the pixels it
    /// adds from `segmentation` before they are painted.
    fn cover(&mut self, segmentation: &RgbaImage, region: PixelRect) {
        if region.is_empty() || self.covered.contains_rect(&region) {
            return;
        }
        let grown = self.covered.union(region);
        let mut before = extract_region(segmentation, grown);
        if !self.covered.is_empty() {
            blit_region(
                &mut before,
                &self.before,
                self.covered.x0 - grown.x0,
                self.covered.y0 - grown.y0,
            );
        }
        self.before = before;
        self.covered = grown;
    }
}

/// One segmentation session: image, viewport, mask, display cache and
/// history, plus the contour or stroke currently being drawn.
pub struct Segmenter {
    id: Uuid,
    settings: SegmenterSettings,
    canvas_width: u32,
    canvas_height: u32,
    state: LoadState,
    doc: Option<Document>,
    tags: TagList,
    brush_size: f32,
    eraser: bool,
    contour: Option<ContourDraft>,
    stroke: Option<StrokeDraft>,
}

impl Segmenter {
    pub fn new(canvas_width: u32, canvas_height: u32, settings: SegmenterSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            brush_size: settings.brush_size,
            settings,
            canvas_width: canvas_width.max(1),
            canvas_height: canvas_height.max(1),
            state: LoadState::Loading,
            doc: None,
            tags: TagList::new(),
            eraser: false,
            contour: None,
            stroke: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &SegmenterSettings {
        &self.settings
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    pub fn load_state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready && self.doc.is_some()
    }

    pub fn has_error(&self) -> bool {
        matches!(self.state, LoadState::Failed(_))
    }

    /// Hand the decoded image to the session.  Only accepted while loading.
    pub fn image_loaded(&mut self, image: RgbaImage) -> Result<(), LoadError> {
        if self.state != LoadState::Loading {
            return Err(LoadError::SessionNotLoading);
        }
        let (w, h) = image.dimensions();
        if let Err(e) = check_dimensions(w, h) {
            self.image_failed(&e.to_string());
            return Err(e);
        }

        let levels = self.settings.pyramid_levels;
        let mut overlay = OverlayCache::new(w, h, levels);
        overlay.set_tone_map(self.settings.tone_map);
        overlay.set_show_segmentation(self.settings.show_segmentation);
        let history = UndoLog::new(
            self.settings.max_undo_entries,
            self.settings.max_undo_area,
            overlay.stride(),
        );

        self.doc = Some(Document {
            segmentation: RgbaImage::new(w, h),
            viewport: Viewport::new(w, h, self.canvas_width, self.canvas_height, self.settings.max_scale),
            image,
            overlay,
            history,
        });
        self.state = LoadState::Ready;
        log_info!("session {}: image loaded ({}×{})", self.id, w, h);
        Ok(())
    }

    /// Record a load failure; editing stays disabled until [`reset_session`](Self::reset_session).
    pub fn image_failed(&mut self, message: &str) {
        log_err!("session {}: image failed to load: {}", self.id, message);
        self.state = LoadState::Failed(message.to_string());
        self.doc = None;
        self.contour = None;
        self.stroke = None;
    }

    /// Decode `path` and load it, or enter the failed state.
    pub fn load_path(&mut self, path: &Path) -> Result<(), LoadError> {
        if self.state != LoadState::Loading {
            return Err(LoadError::SessionNotLoading);
        }
        match load_image(path) {
            Ok(image) => self.image_loaded(image),
            Err(e) => {
                self.image_failed(&e.to_string());
                Err(e)
            }
        }
    }

    /// Drop the image, mask and history and wait for a new image.
    /// Tags are kept.
    pub fn reset_session(&mut self) {
        self.state = LoadState::Loading;
        self.doc = None;
        self.contour = None;
        self.stroke = None;
        log_info!("session {}: reset", self.id);
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn image(&self) -> Option<&RgbaImage> {
        self.doc.as_ref().map(|d| &d.image)
    }

    pub fn segmentation(&self) -> Option<&RgbaImage> {
        self.doc.as_ref().map(|d| &d.segmentation)
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.doc.as_ref().map(|d| &d.viewport)
    }

    pub fn overlay(&self) -> Option<&OverlayCache> {
        self.doc.as_ref().map(|d| &d.overlay)
    }

    pub fn history(&self) -> Option<&UndoLog> {
        self.doc.as_ref().map(|d| &d.history)
    }

    pub fn tags(&self) -> &TagList {
        &self.tags
    }

    pub fn brush_size(&self) -> f32 {
        self.brush_size
    }

    pub fn eraser(&self) -> bool {
        self.eraser
    }

    /// Points of the contour being drawn, in image space.
    pub fn contour_points(&self) -> &[Point] {
        self.contour.as_ref().map_or(&[], |c| c.points.as_slice())
    }

    pub fn is_drawing_contour(&self) -> bool {
        self.contour.is_some()
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    // ========================================================================
    // VIEW
    // ========================================================================

    pub fn zoom(&mut self, factor: f32, pivot: Option<Point>) {
        if let Some(doc) = self.doc.as_mut() {
            doc.viewport.zoom(factor, pivot);
        }
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        if let Some(doc) = self.doc.as_mut() {
            doc.viewport.pan(dx, dy);
        }
    }

    pub fn reset_view(&mut self) {
        if let Some(doc) = self.doc.as_mut() {
            doc.viewport.reset();
        }
    }

    /// Change the base-image tone curve.  With a non-zero display delay the
    /// redraw is coalesced and happens on a later [`tick`](Self::tick).
    pub fn set_tone_map(&mut self, tone_map: ToneMap) {
        self.settings.tone_map = tone_map;
        let delay = self.settings.display_delay_ms;
        if let Some(doc) = self.doc.as_mut() {
            if delay == 0 {
                doc.overlay.set_tone_map(tone_map);
            } else {
                doc.overlay
                    .set_tone_map_after(tone_map, Duration::from_millis(delay), Instant::now());
            }
        }
    }

    pub fn set_show_segmentation(&mut self, show: bool) {
        self.settings.show_segmentation = show;
        if let Some(doc) = self.doc.as_mut() {
            doc.overlay.set_show_segmentation(show);
        }
    }

    /// Fire any delayed invalidation that is due.  Returns true when the
    /// display needs a redraw.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.doc.as_mut().is_some_and(|d| d.overlay.poll(now))
    }

    /// Render the canvas: the best-matching pyramid level sampled through the
    /// viewport, with [`BACKGROUND`] around the image.
    pub fn render_frame(&mut self) -> Option<RgbaImage> {
        let doc = self.doc.as_mut()?;
        let Document {
            image,
            segmentation,
            viewport,
            overlay,
            ..
        } = doc;
        let (_, level) = overlay.get(image, segmentation, viewport.scale())?;

        let (iw, ih) = (image.width() as f32, image.height() as f32);
        let (lw, lh) = level.dimensions();
        let (sx, sy) = (lw as f32 / iw, lh as f32 / ih);
        let cw = self.canvas_width;
        let vp: &Viewport = viewport;

        let mut frame = RgbaImage::from_pixel(cw, self.canvas_height, BACKGROUND);
        let raw: &mut [u8] = &mut frame;
        raw.par_chunks_exact_mut(cw as usize * 4).enumerate().for_each(|(cy, row)| {
            for cx in 0..cw {
                let p = vp.to_image(Point::new(cx as f32 + 0.5, cy as f32 + 0.5));
                if p.x < 0.0 || p.y < 0.0 || p.x >= iw || p.y >= ih {
                    continue;
                }
                let lx = ((p.x * sx) as u32).min(lw - 1);
                let ly = ((p.y * sy) as u32).min(lh - 1);
                let i = cx as usize * 4;
                row[i..i + 4].copy_from_slice(&level.get_pixel(lx, ly).0);
            }
        });
        Some(frame)
    }

    // ========================================================================
    // TAGS & TOOLS
    // ========================================================================

    pub fn add_tag(&mut self, name: &str) -> Result<u32, TagError> {
        self.tags.add(name)
    }

    pub fn rename_tag(&mut self, index: u32, name: &str) -> Result<(), TagError> {
        self.tags.rename(index, name)
    }

    pub fn select_tag(&mut self, index: u32) {
        self.tags.select(index);
    }

    /// Brush diameter in image pixels, clamped to the configured range.
    pub fn set_brush_size(&mut self, size: f32) {
        let (lo, hi) = (self.settings.min_brush_size, self.settings.max_brush_size);
        self.brush_size = if size.is_nan() { lo } else { size.clamp(lo, hi) };
    }

    pub fn set_eraser(&mut self, eraser: bool) {
        self.eraser = eraser;
    }

    fn current_paint(&self) -> Option<Paint> {
        if self.eraser {
            return Some(Paint::Erase);
        }
        self.tags.selected().map(|t| Paint::Color(t.color))
    }

    fn editable(&self, op: &str) -> bool {
        if self.is_ready() {
            true
        } else {
            log_warn!("session {}: {} refused in state {:?}", self.id, op, self.state);
            false
        }
    }

    // ========================================================================
    // CONTOURS
    // ========================================================================

    /// Start a contour at a canvas point.  Ignored outside the image.
    pub fn begin_contour(&mut self, p: Point) -> bool {
        if !self.editable("begin_contour") || self.stroke.is_some() {
            return false;
        }
        let Some(doc) = self.doc.as_ref() else { return false };
        if !doc.viewport.is_in_image(p) {
            return false;
        }
        self.contour = Some(ContourDraft {
            points: vec![doc.viewport.to_image(p)],
            outside_at: None,
        });
        true
    }

    /// Add a canvas point.  While the pointer is off the image no points are
    /// added, but each crossing of the image edge adds a point snapped to it.
    pub fn extend_contour(&mut self, p: Point) {
        let (Some(doc), Some(draft)) = (self.doc.as_ref(), self.contour.as_mut()) else {
            return;
        };
        let vp = &doc.viewport;
        let at = vp.to_image(p);
        if vp.is_in_image(p) {
            if let Some(outside) = draft.outside_at.take() {
                draft.points.push(vp.snap_to_boundary(outside));
            }
            draft.points.push(at);
        } else {
            if draft.outside_at.is_none() {
                draft.points.push(vp.snap_to_boundary(at));
            }
            draft.outside_at = Some(at);
        }
    }

    /// The pointer left the canvas at `p` while drawing.
    pub fn pointer_left(&mut self, p: Point) {
        let (Some(doc), Some(draft)) = (self.doc.as_ref(), self.contour.as_mut()) else {
            return;
        };
        let at = doc.viewport.to_image(p);
        if draft.outside_at.is_none() {
            draft.points.push(doc.viewport.snap_to_boundary(at));
        }
        draft.outside_at = Some(at);
    }

    /// The pointer came back onto the canvas at `p` while drawing.
    pub fn pointer_entered(&mut self, p: Point) {
        let (Some(doc), Some(draft)) = (self.doc.as_ref(), self.contour.as_mut()) else {
            return;
        };
        let vp = &doc.viewport;
        draft.points.push(vp.snap_to_boundary(vp.to_image(p)));
        draft.outside_at = None;
    }

    pub fn discard_contour(&mut self) {
        self.contour = None;
    }

    /// Close and fill the current contour with the selected tag (or erase).
    /// Contours with fewer than two points are dropped.  Returns the region
    /// recorded for undo.
    pub fn finish_contour(&mut self) -> Option<PixelRect> {
        let draft = self.contour.take()?;
        if draft.points.len() < 2 {
            return None;
        }
        let Some(paint) = self.current_paint() else {
            log_warn!("session {}: contour dropped, no tag selected", self.id);
            return None;
        };
        let smoothing = self.settings.smoothing;
        let samples = self.settings.samples_per_unit;
        let doc = self.doc.as_mut()?;

        let points = if smoothing {
            smooth_contour(&draft.points, 1.0 / doc.viewport.scale(), samples)
        } else {
            draft.points
        };
        let bounds = polygon_bounds(&points)?;

        let region = doc.history.record(&doc.segmentation, bounds, describe(paint, "Polygon"));
        fill_polygon(&mut doc.segmentation, &points, paint);
        if !doc.history.commit(&doc.segmentation) {
            return None;
        }
        doc.overlay.invalidate(Some(region));
        log_info!("session {}: polygon committed over {:?}", self.id, region);
        Some(region)
    }

    // ========================================================================
    // BRUSH STROKES
    // ========================================================================

    /// Start a brush drag at a canvas point, painting the first dab.
    pub fn begin_stroke(&mut self, p: Point) -> bool {
        if !self.editable("begin_stroke") || self.contour.is_some() {
            return false;
        }
        if self.stroke.is_some() {
            self.end_stroke();
        }
        let Some(paint) = self.current_paint() else {
            log_warn!("session {}: stroke ignored, no tag selected", self.id);
            return false;
        };
        let Some(doc) = self.doc.as_mut() else { return false };
        let at = doc.viewport.to_image(p);
        self.stroke = Some(StrokeDraft {
            before: RgbaImage::new(0, 0),
            covered: PixelRect::EMPTY,
            last: at,
            paint,
        });
        self.dab(at);
        true
    }

    /// Continue the drag to a canvas point: one capsule from the previous
    /// sample.
    pub fn extend_stroke(&mut self, p: Point) {
        let Some(doc) = self.doc.as_ref() else { return };
        let at = doc.viewport.to_image(p);
        self.dab(at);
    }

    fn dab(&mut self, to: Point) {
        let radius = self.brush_size / 2.0;
        let (Some(doc), Some(stroke)) = (self.doc.as_mut(), self.stroke.as_mut()) else {
            return;
        };
        let capsule = stroke_capsule(stroke.last, to, radius);
        stroke.last = to;
        let Some(bounds) = polygon_bounds(&capsule) else { return };
        let (w, h) = doc.segmentation.dimensions();
        stroke.cover(&doc.segmentation, doc.history.aligned_region(bounds, w, h));
        fill_polygon(&mut doc.segmentation, &capsule, stroke.paint);
        doc.overlay.invalidate(Some(bounds));
    }

    /// Finish the drag; the whole stroke becomes one undo entry.
    pub fn end_stroke(&mut self) -> Option<PixelRect> {
        let stroke = self.stroke.take()?;
        let doc = self.doc.as_mut()?;
        let region = stroke.covered;
        doc.history
            .record_snapshot(region, stroke.before, describe(stroke.paint, "Brush"));
        if !doc.history.commit(&doc.segmentation) {
            return None;
        }
        Some(region)
    }

    // ========================================================================
    // UNDO / REDO
    // ========================================================================

    pub fn undo(&mut self) -> Option<String> {
        self.settle_drafts();
        let doc = self.doc.as_mut()?;
        let desc = doc.history.undo(&mut doc.segmentation, &mut doc.overlay)?;
        log_info!("session {}: undo {}", self.id, desc);
        Some(desc)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.settle_drafts();
        let doc = self.doc.as_mut()?;
        let desc = doc.history.redo(&mut doc.segmentation, &mut doc.overlay)?;
        log_info!("session {}: redo {}", self.id, desc);
        Some(desc)
    }

    pub fn can_undo(&self) -> bool {
        self.history().is_some_and(|h| h.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.history().is_some_and(|h| h.can_redo())
    }

    /// History operations act on committed state only.
    fn settle_drafts(&mut self) {
        self.contour = None;
        if self.stroke.is_some() {
            self.end_stroke();
        }
    }

    // ========================================================================
    // EXPORT / IMPORT
    // ========================================================================

    /// Label map, RLE and tag table for the save collaborator.
    pub fn export_payload(&self) -> Option<SavePayload> {
        let doc = self.doc.as_ref()?;
        let labels = to_label_map(&doc.segmentation, &self.tags.palette());
        Some(SavePayload {
            width: doc.segmentation.width(),
            height: doc.segmentation.height(),
            label_rle: rle(&labels),
            tags: self
                .tags
                .tags()
                .iter()
                .map(|t| (t.name.clone(), t.color_hex()))
                .collect(),
        })
    }

    pub fn save(&mut self, sink: &mut dyn SaveSink) -> Result<(), SaveError> {
        self.settle_drafts();
        let payload = self
            .export_payload()
            .ok_or_else(|| SaveError::Rejected("no image loaded".to_string()))?;
        sink.save(&payload)?;
        log_info!(
            "session {}: saved {} runs, {} tags",
            self.id,
            payload.label_rle.len() / 2,
            payload.tags.len()
        );
        Ok(())
    }

    /// Replace the mask with a previously exported payload.  Missing tags are
    /// appended; the replacement is one undoable step.
    pub fn import_payload(&mut self, payload: &SavePayload) -> Result<(), ImportError> {
        self.settle_drafts();
        let expected = self.doc.as_ref().ok_or(ImportError::NotReady)?.segmentation.dimensions();
        let found = (payload.width, payload.height);
        if found != expected {
            return Err(ImportError::SizeMismatch { expected, found });
        }
        let labels = rle_decode(&payload.label_rle)?;
        let needed = payload.tags.len().saturating_sub(self.tags.len());
        if self.tags.len() + needed > crate::tags::PALETTE.len() {
            return Err(ImportError::Tag(TagError::PaletteExhausted));
        }

        let Some(doc) = self.doc.as_mut() else {
            return Err(ImportError::NotReady);
        };
        let mut palette = self.tags.palette();
        palette.extend(
            (self.tags.len()..payload.tags.len())
                .filter_map(|i| crate::tags::palette_color(i as u32 + 1)),
        );
        let mut restored = doc.segmentation.clone();
        paint_label_map(&mut restored, &labels, &palette)?;

        for (name, _) in payload.tags.iter().skip(self.tags.len()) {
            self.tags.add(name)?;
        }
        let full = PixelRect::from_size(expected.0, expected.1);
        doc.history.record(&doc.segmentation, full, "Import");
        doc.segmentation = restored;
        doc.history.commit(&doc.segmentation);
        doc.overlay.invalidate(None);
        log_info!("session {}: imported {} tags", self.id, payload.tags.len());
        Ok(())
    }
}

fn describe(paint: Paint, tool: &str) -> &str {
    match paint {
        Paint::Erase => "Erase",
        Paint::Color(_) => tool,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::palette_color;

    fn settings() -> SegmenterSettings {
        SegmenterSettings {
            smoothing: false,
            display_delay_ms: 0,
            ..Default::default()
        }
    }

    /// 100×100 image on a 100×100 canvas: canvas and image coordinates match.
    fn ready() -> Segmenter {
        let mut s = Segmenter::new(100, 100, settings());
        s.image_loaded(RgbaImage::from_pixel(100, 100, Rgba([50, 50, 50, 255])))
            .unwrap();
        s.add_tag("object").unwrap();
        s
    }

    fn draw_square(s: &mut Segmenter, x0: f32, y0: f32, x1: f32, y1: f32) -> Option<PixelRect> {
        assert!(s.begin_contour(Point::new(x0, y0)));
        s.extend_contour(Point::new(x1, y0));
        s.extend_contour(Point::new(x1, y1));
        s.extend_contour(Point::new(x0, y1));
        s.finish_contour()
    }

    #[test]
    fn editing_is_refused_until_loaded() {
        let mut s = Segmenter::new(100, 100, settings());
        s.add_tag("a").unwrap();
        assert!(!s.begin_contour(Point::new(5.0, 5.0)));
        assert!(!s.begin_stroke(Point::new(5.0, 5.0)));
        assert!(s.undo().is_none());
        assert!(s.export_payload().is_none());
    }

    #[test]
    fn failure_requires_reset() {
        let mut s = Segmenter::new(100, 100, settings());
        s.image_failed("404");
        assert!(s.has_error());
        assert!(matches!(
            s.image_loaded(RgbaImage::new(4, 4)),
            Err(LoadError::SessionNotLoading)
        ));
        s.reset_session();
        assert!(s.image_loaded(RgbaImage::new(4, 4)).is_ok());
        assert!(s.is_ready());
    }

    #[test]
    fn load_path_failure_sets_error() {
        let mut s = Segmenter::new(10, 10, settings());
        assert!(s.load_path(Path::new("/no/such/image.png")).is_err());
        assert!(s.has_error());
        assert!(!s.begin_contour(Point::new(1.0, 1.0)));
    }

    #[test]
    fn contour_fills_with_selected_tag() {
        let mut s = ready();
        let region = draw_square(&mut s, 10.0, 10.0, 30.0, 30.0).unwrap();
        assert_eq!(region, PixelRect::new(8, 8, 32, 32));
        let seg = s.segmentation().unwrap();
        let color = palette_color(1).unwrap();
        assert_eq!(*seg.get_pixel(20, 20), color);
        assert_eq!(*seg.get_pixel(10, 10), color);
        assert_eq!(seg.get_pixel(30, 30).0[3], 0);
        assert_eq!(s.history().unwrap().len(), 1);
        assert_eq!(s.overlay().unwrap().dirty_rect(), Some(PixelRect::new(0, 0, 100, 100)));
    }

    #[test]
    fn single_point_contour_is_discarded() {
        let mut s = ready();
        assert!(s.begin_contour(Point::new(10.0, 10.0)));
        assert!(s.finish_contour().is_none());
        assert!(!s.can_undo());
        assert!(!s.is_drawing_contour());
    }

    #[test]
    fn contour_outside_image_is_not_started() {
        let mut s = Segmenter::new(200, 100, settings());
        s.image_loaded(RgbaImage::new(100, 100)).unwrap();
        // Image is centered horizontally: canvas x in [50, 150).
        assert!(!s.begin_contour(Point::new(10.0, 50.0)));
        assert!(s.begin_contour(Point::new(60.0, 50.0)));
    }

    #[test]
    fn leaving_the_image_adds_edge_points() {
        let mut s = Segmenter::new(200, 100, settings());
        s.image_loaded(RgbaImage::new(100, 100)).unwrap();
        s.add_tag("a").unwrap();
        s.begin_contour(Point::new(60.0, 20.0));
        s.extend_contour(Point::new(70.0, 30.0));
        s.extend_contour(Point::new(20.0, 40.0)); // off the image, left side
        s.extend_contour(Point::new(10.0, 50.0)); // still off: ignored
        s.extend_contour(Point::new(80.0, 60.0)); // back on
        let pts = s.contour_points();
        assert_eq!(pts.len(), 5);
        assert_eq!(pts[2], Point::new(0.0, 40.0));
        assert_eq!(pts[3], Point::new(0.0, 50.0));
        assert_eq!(pts[4], Point::new(30.0, 60.0));
    }

    #[test]
    fn undo_redo_restores_pixels() {
        let mut s = ready();
        draw_square(&mut s, 10.0, 10.0, 30.0, 30.0);
        let after_first = s.segmentation().unwrap().clone();
        draw_square(&mut s, 20.0, 20.0, 60.0, 60.0);
        let after_second = s.segmentation().unwrap().clone();

        assert_eq!(s.undo().as_deref(), Some("Polygon"));
        assert_eq!(s.segmentation().unwrap(), &after_first);
        assert_eq!(s.redo().as_deref(), Some("Polygon"));
        assert_eq!(s.segmentation().unwrap(), &after_second);
        assert!(s.redo().is_none());
    }

    #[test]
    fn stroke_is_one_undo_step() {
        let mut s = ready();
        s.set_brush_size(10.0);
        assert!(s.begin_stroke(Point::new(40.0, 50.0)));
        s.extend_stroke(Point::new(50.0, 50.0));
        s.extend_stroke(Point::new(60.0, 50.0));
        let region = s.end_stroke().unwrap();
        assert!(region.contains_rect(&PixelRect::new(35, 45, 65, 55)));

        let color = palette_color(1).unwrap();
        for x in 38..62 {
            assert_eq!(*s.segmentation().unwrap().get_pixel(x, 50), color, "x={x}");
        }
        assert_eq!(s.history().unwrap().len(), 1);
        s.undo();
        assert!(crate::canvas::is_blank(s.segmentation().unwrap()));
    }

    #[test]
    fn stroke_snapshot_covers_only_the_stroke() {
        let mut s = ready();
        draw_square(&mut s, 10.0, 10.0, 30.0, 30.0);
        let before_stroke = s.segmentation().unwrap().clone();

        s.set_brush_size(6.0);
        s.begin_stroke(Point::new(20.0, 20.0));
        s.extend_stroke(Point::new(40.0, 20.0));
        s.extend_stroke(Point::new(40.0, 35.0));
        {
            let draft = s.stroke.as_ref().unwrap();
            assert_eq!(draft.before.dimensions(), (draft.covered.width(), draft.covered.height()));
            assert!(draft.covered.contains_rect(&PixelRect::new(17, 17, 43, 38)));
            assert!(draft.covered.area() < 100 * 100 / 4);
        }
        s.end_stroke();

        s.undo();
        assert_eq!(s.segmentation().unwrap(), &before_stroke);
    }

    #[test]
    fn eraser_stroke_clears_and_undoes() {
        let mut s = ready();
        draw_square(&mut s, 10.0, 10.0, 30.0, 30.0);
        let painted = s.segmentation().unwrap().clone();

        s.set_eraser(true);
        s.set_brush_size(6.0);
        assert!(s.begin_stroke(Point::new(5.0, 20.0)));
        s.extend_stroke(Point::new(35.0, 20.0));
        s.end_stroke();

        let seg = s.segmentation().unwrap();
        for x in 10..30 {
            assert_eq!(seg.get_pixel(x, 20).0[3], 0, "x={x}");
        }
        assert_eq!(seg.get_pixel(20, 12).0[3], 255);
        assert_eq!(s.history().unwrap().undo_description(), Some("Erase"));

        s.undo();
        assert_eq!(s.segmentation().unwrap(), &painted);
    }

    #[test]
    fn import_rejects_more_tags_than_palette() {
        let mut s = ready();
        let payload = SavePayload {
            width: 100,
            height: 100,
            label_rle: vec![100 * 100, 0],
            tags: (0..13).map(|i| (format!("t{i}"), "#000000".to_string())).collect(),
        };
        assert!(matches!(
            s.import_payload(&payload),
            Err(ImportError::Tag(TagError::PaletteExhausted))
        ));
        assert_eq!(s.tags().len(), 1);
        assert!(!s.can_undo());
    }

    fn square_outline(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Point> {
        let mut pts = Vec::new();
        let mut x = x0;
        while x < x1 {
            pts.push(Point::new(x, y0));
            x += 1.0;
        }
        let mut y = y0;
        while y < y1 {
            pts.push(Point::new(x1, y));
            y += 1.0;
        }
        while x > x0 {
            pts.push(Point::new(x, y1));
            x -= 1.0;
        }
        while y > y0 {
            pts.push(Point::new(x0, y));
            y -= 1.0;
        }
        pts
    }

    /// Commit `outline` (canvas space) after zooming; returns the session,
    /// the image-space draft and the undo region.
    fn commit_outline(smoothing: bool, zoom: f32, outline: &[Point]) -> (Segmenter, Vec<Point>, PixelRect) {
        let mut s = Segmenter::new(
            100,
            100,
            SegmenterSettings {
                smoothing,
                ..settings()
            },
        );
        s.image_loaded(RgbaImage::new(100, 100)).unwrap();
        s.add_tag("a").unwrap();
        s.zoom(zoom, None);
        assert!(s.begin_contour(outline[0]));
        for &p in &outline[1..] {
            s.extend_contour(p);
        }
        let draft = s.contour_points().to_vec();
        let region = s.finish_contour().unwrap();
        (s, draft, region)
    }

    /// Distance from `p` to the outline of the axis-aligned rectangle.
    fn distance_to_outline(p: Point, min: Point, max: Point) -> f32 {
        let inside = p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y;
        if inside {
            (p.x - min.x).min(max.x - p.x).min(p.y - min.y).min(max.y - p.y)
        } else {
            let dx = (min.x - p.x).max(0.0).max(p.x - max.x);
            let dy = (min.y - p.y).max(0.0).max(p.y - max.y);
            (dx * dx + dy * dy).sqrt()
        }
    }

    #[test]
    fn smoothed_contour_stays_within_window_at_any_zoom() {
        let outline = square_outline(20.0, 20.0, 80.0, 80.0);
        for zoom in [1.0, 4.0] {
            let (smooth, draft, region) = commit_outline(true, zoom, &outline);
            let (plain, _, _) = commit_outline(false, zoom, &outline);
            let vp = smooth.viewport().unwrap();
            let window = 2.0 / vp.scale();
            let (min, max) = (vp.to_image(outline[0]), vp.to_image(Point::new(80.0, 80.0)));

            let expected = smooth_contour(&draft, 1.0 / vp.scale(), smooth.settings().samples_per_unit);
            assert!(expected.len() > draft.len() / 4, "zoom {zoom}");
            let bounds = polygon_bounds(&expected).unwrap().intersect(PixelRect::from_size(100, 100));
            assert!(region.contains_rect(&bounds), "zoom {zoom}: {region:?} vs {bounds:?}");

            let (a, b) = (smooth.segmentation().unwrap(), plain.segmentation().unwrap());
            let center = vp.to_image(Point::new(50.0, 50.0));
            assert_eq!(a.get_pixel(center.x as u32, center.y as u32).0[3], 255);
            for (x, y, px) in a.enumerate_pixels() {
                if px != b.get_pixel(x, y) {
                    let d = distance_to_outline(Point::new(x as f32 + 0.5, y as f32 + 0.5), min, max);
                    assert!(d <= window + 1.0, "zoom {zoom}: ({x}, {y}) is {d} from the outline");
                }
            }
        }
    }

    #[test]
    fn eraser_clears_paint() {
        let mut s = ready();
        draw_square(&mut s, 10.0, 10.0, 30.0, 30.0);
        s.set_eraser(true);
        assert_eq!(draw_square(&mut s, 0.0, 0.0, 50.0, 50.0).map(|r| r.is_empty()), Some(false));
        assert!(crate::canvas::is_blank(s.segmentation().unwrap()));
        assert_eq!(s.history().unwrap().undo_description(), Some("Erase"));
    }

    #[test]
    fn brush_size_is_clamped() {
        let mut s = ready();
        s.set_brush_size(10_000.0);
        assert_eq!(s.brush_size(), s.settings().max_brush_size);
        s.set_brush_size(0.0);
        assert_eq!(s.brush_size(), s.settings().min_brush_size);
    }

    #[test]
    fn export_and_import_round_trip() {
        let mut s = ready();
        s.add_tag("second").unwrap();
        draw_square(&mut s, 10.0, 10.0, 30.0, 30.0);
        s.select_tag(2);
        draw_square(&mut s, 50.0, 50.0, 70.0, 90.0);
        let payload = s.export_payload().unwrap();
        assert_eq!(payload.tags[1], ("second".to_string(), "#008000".to_string()));
        assert_eq!(payload.label_rle.chunks(2).map(|p| p[0]).sum::<u32>(), 100 * 100);

        let mut other = Segmenter::new(100, 100, settings());
        other.image_loaded(RgbaImage::new(100, 100)).unwrap();
        other.import_payload(&payload).unwrap();
        assert_eq!(other.tags().len(), 2);
        assert_eq!(other.segmentation(), s.segmentation());
        assert!(other.undo().is_some());
        assert!(crate::canvas::is_blank(other.segmentation().unwrap()));
    }

    #[test]
    fn import_rejects_wrong_size() {
        let mut s = ready();
        let payload = SavePayload {
            width: 10,
            height: 10,
            label_rle: vec![100, 0],
            tags: vec![],
        };
        assert!(matches!(s.import_payload(&payload), Err(ImportError::SizeMismatch { .. })));
    }

    #[test]
    fn render_frame_draws_background_around_image() {
        let mut s = Segmenter::new(200, 100, settings());
        s.image_loaded(RgbaImage::from_pixel(100, 100, Rgba([10, 20, 30, 255])))
            .unwrap();
        let frame = s.render_frame().unwrap();
        assert_eq!(frame.dimensions(), (200, 100));
        assert_eq!(*frame.get_pixel(10, 50), BACKGROUND);
        assert_eq!(*frame.get_pixel(100, 50), Rgba([10, 20, 30, 255]));
        assert!(s.overlay().unwrap().is_valid());
    }

    #[test]
    fn render_shows_committed_mask() {
        let mut s = ready();
        draw_square(&mut s, 10.0, 10.0, 30.0, 30.0);
        let frame = s.render_frame().unwrap();
        // 50 + 128 on red, untouched elsewhere
        assert_eq!(*frame.get_pixel(20, 20), Rgba([178, 50, 50, 255]));
        assert_eq!(*frame.get_pixel(80, 80), Rgba([50, 50, 50, 255]));
    }

    #[test]
    fn deferred_tone_map_waits_for_tick() {
        let mut s = Segmenter::new(
            50,
            50,
            SegmenterSettings {
                display_delay_ms: 1000,
                ..settings()
            },
        );
        s.image_loaded(RgbaImage::new(50, 50)).unwrap();
        s.render_frame();
        s.set_tone_map(ToneMap::Invert);
        assert!(s.overlay().unwrap().is_valid());
        assert!(!s.tick(Instant::now()));
        assert!(s.tick(Instant::now() + Duration::from_secs(2)));
        assert!(!s.overlay().unwrap().is_valid());
        let frame = s.render_frame().unwrap();
        assert_eq!(*frame.get_pixel(25, 25), Rgba([255, 255, 255, 255]));
    }
}
