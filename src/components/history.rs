use image::RgbaImage;

use crate::canvas::{PixelRect, blit_region, extract_region};
use crate::overlay::OverlayCache;

/// Default number of retained undo steps.
pub const DEFAULT_MAX_ENTRIES: usize = 50;
/// Default pixel-area budget across all stored snapshots (before + after).
pub const DEFAULT_MAX_AREA: u64 = 64 * 1024 * 1024;

// ============================================================================
// UNDO ENTRY - region-scoped before/after snapshots
// ============================================================================

/// One undoable edit of the segmentation buffer.
///
/// `before` and `after` are independent copies of `region`; they never alias
/// the live buffer.
#[derive(Clone)]
pub struct UndoEntry {
    pub region: PixelRect,
    pub before: RgbaImage,
    pub after: Option<RgbaImage>,
    pub description: String,
}

impl UndoEntry {
    /// Pixel area held by this entry's snapshots.
    pub fn area(&self) -> u64 {
        let before = self.before.width() as u64 * self.before.height() as u64;
        let after = self
            .after
            .as_ref()
            .map_or(0, |a| a.width() as u64 * a.height() as u64);
        before + after
    }

    fn apply(snapshot: &RgbaImage, region: PixelRect, buffer: &mut RgbaImage, overlay: &mut OverlayCache) {
        blit_region(buffer, snapshot, region.x0, region.y0);
        overlay.invalidate(Some(region));
    }
}

/// An edit that has been started with [`UndoLog::record`] but not committed.
struct PendingEdit {
    region: PixelRect,
    before: RgbaImage,
    description: String,
}

// ============================================================================
// UNDO LOG - ordered entries + cursor, bounded by count and area
// ============================================================================

/// Linear undo history.
///
/// `cursor` counts the entries currently applied; entries at
/// `cursor..` are redo-able and are discarded by the next push.
pub struct UndoLog {
    entries: Vec<UndoEntry>,
    cursor: usize,
    max_entries: usize,
    max_area: u64,
    /// Running area total across all entries.
    total_area: u64,
    /// Regions are aligned outward to this stride.
    align: u32,
    pending: Option<PendingEdit>,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_AREA, 1)
    }
}

impl UndoLog {
    pub fn new(max_entries: usize, max_area: u64, align: u32) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            max_entries: max_entries.max(1),
            max_area,
            total_area: 0,
            align: align.max(1),
            pending: None,
        }
    }

    /// Region actually captured for an edit touching `rect` in a buffer of
    /// the given size.
    pub fn aligned_region(&self, rect: PixelRect, width: u32, height: u32) -> PixelRect {
        rect.align_outward(self.align)
            .intersect(PixelRect::from_size(width, height))
    }

    /// Start an edit: snapshot `rect` (aligned and clipped) from `source`.
    /// `source` is the live buffer for one-shot edits, or a copy taken before
    /// a multi-step edit began.  Returns the captured region.
    pub fn record(&mut self, source: &RgbaImage, rect: PixelRect, description: &str) -> PixelRect {
        let region = self.aligned_region(rect, source.width(), source.height());
        if self.pending.is_some() {
            crate::log_warn!("undo: record while an edit is pending; dropping the older one");
        }
        self.pending = Some(PendingEdit {
            region,
            before: extract_region(source, region),
            description: description.to_string(),
        });
        region
    }

    /// Start an edit whose `before` pixels were gathered by the caller, e.g.
    /// grown dab by dab during a brush drag.  `region` must come from
    /// [`aligned_region`](Self::aligned_region) (or a union of such regions)
    /// and match the snapshot size.
    pub fn record_snapshot(&mut self, region: PixelRect, before: RgbaImage, description: &str) {
        if self.pending.is_some() {
            crate::log_warn!("undo: record while an edit is pending; dropping the older one");
        }
        self.pending = Some(PendingEdit {
            region,
            before,
            description: description.to_string(),
        });
    }

    /// Finish the pending edit by capturing the same region from `buffer`.
    /// Returns false when nothing was recorded or the region was empty.
    pub fn commit(&mut self, buffer: &RgbaImage) -> bool {
        let Some(edit) = self.pending.take() else {
            return false;
        };
        if edit.region.is_empty() {
            return false;
        }
        let after = extract_region(buffer, edit.region);
        self.push(UndoEntry {
            region: edit.region,
            before: edit.before,
            after: Some(after),
            description: edit.description,
        });
        true
    }

    /// Forget a recorded edit without pushing it.
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Append an entry.  `entry.region` must be the exact placement of its
    /// snapshots, as produced by [`record`](Self::record) and
    /// [`aligned_region`](Self::aligned_region).
    pub fn push(&mut self, entry: UndoEntry) {
        // Clear redo entries when a new action is performed
        for dropped in self.entries.drain(self.cursor..) {
            self.total_area = self.total_area.saturating_sub(dropped.area());
        }

        self.total_area += entry.area();
        self.entries.push(entry);
        self.cursor = self.entries.len();

        self.prune();
    }

    /// Restore the most recent applied entry's `before` snapshot.
    pub fn undo(&mut self, buffer: &mut RgbaImage, overlay: &mut OverlayCache) -> Option<String> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        let entry = &self.entries[self.cursor];
        UndoEntry::apply(&entry.before, entry.region, buffer, overlay);
        Some(entry.description.clone())
    }

    /// Re-apply the next entry's `after` snapshot.
    pub fn redo(&mut self, buffer: &mut RgbaImage, overlay: &mut OverlayCache) -> Option<String> {
        let entry = self.entries.get(self.cursor)?;
        self.cursor += 1;
        match entry.after {
            Some(ref after) => UndoEntry::apply(after, entry.region, buffer, overlay),
            None => {
                crate::log_warn!("undo: entry '{}' has no after snapshot, redo skipped", entry.description);
            }
        }
        Some(entry.description.clone())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|e| e.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(|e| e.description.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of applied entries (the undo pointer plus one).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Current snapshot area across all entries (O(1) via cached total).
    pub fn area_usage(&self) -> u64 {
        self.total_area
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.total_area = 0;
        self.pending = None;
    }

    /// Drop oldest entries to stay within limits.  The newest entry is kept
    /// even when it alone exceeds the area budget.
    fn prune(&mut self) {
        let mut evicted = 0usize;
        while self.entries.len() > self.max_entries
            || (self.total_area > self.max_area && self.entries.len() > 1)
        {
            let removed = self.entries.remove(0);
            self.total_area = self.total_area.saturating_sub(removed.area());
            self.cursor = self.cursor.saturating_sub(1);
            evicted += 1;
        }
        if evicted > 0 {
            crate::log_info!(
                "undo: evicted {} old entr{} ({} kept, area {})",
                evicted,
                if evicted == 1 { "y" } else { "ies" },
                self.entries.len(),
                self.total_area
            );
        }
    }
}
