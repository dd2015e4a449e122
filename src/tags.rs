use image::Rgba;

/// Fixed ordered tag palette.  Position `i` belongs to tag index `i + 1`;
/// label value 0 is reserved for untagged pixels, so black never appears here.
pub const PALETTE: [[u8; 3]; 12] = [
    [128, 0, 0],
    [0, 128, 0],
    [0, 0, 128],
    [128, 128, 0],
    [128, 0, 128],
    [0, 128, 128],
    [192, 64, 0],
    [64, 192, 0],
    [0, 64, 192],
    [192, 0, 64],
    [64, 0, 192],
    [0, 192, 64],
];

/// Opaque segmentation color of the tag with the given index (1-based).
pub fn palette_color(index: u32) -> Option<Rgba<u8>> {
    let slot = index.checked_sub(1)? as usize;
    PALETTE.get(slot).map(|c| Rgba([c[0], c[1], c[2], 255]))
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    pub index: u32,
    pub name: String,
    pub color: Rgba<u8>,
}

impl Tag {
    /// `#rrggbb`
    pub fn color_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.color[0], self.color[1], self.color[2])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// Every palette color is already assigned.
    PaletteExhausted,
    UnknownTag(u32),
}

impl std::fmt::Display for TagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagError::PaletteExhausted => write!(f, "all {} palette colors are in use", PALETTE.len()),
            TagError::UnknownTag(i) => write!(f, "no tag with index {}", i),
        }
    }
}

impl std::error::Error for TagError {}

/// Ordered tag list plus the currently selected tag (0 = none).
#[derive(Clone, Debug, Default)]
pub struct TagList {
    tags: Vec<Tag>,
    selected: u32,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tag with the next palette color.  The first tag added becomes
    /// the selection.
    pub fn add(&mut self, name: &str) -> Result<u32, TagError> {
        let index = self.tags.len() as u32 + 1;
        let color = palette_color(index).ok_or(TagError::PaletteExhausted)?;
        self.tags.push(Tag {
            index,
            name: name.to_string(),
            color,
        });
        if self.selected == 0 {
            self.selected = index;
        }
        Ok(index)
    }

    pub fn rename(&mut self, index: u32, name: &str) -> Result<(), TagError> {
        let tag = self
            .tags
            .iter_mut()
            .find(|t| t.index == index)
            .ok_or(TagError::UnknownTag(index))?;
        tag.name = name.to_string();
        Ok(())
    }

    /// Select a tag; out-of-range indices are clamped to the list.
    pub fn select(&mut self, index: u32) {
        self.selected = if self.tags.is_empty() {
            0
        } else {
            index.clamp(1, self.tags.len() as u32)
        };
    }

    pub fn selected(&self) -> Option<&Tag> {
        self.get(self.selected)
    }

    pub fn get(&self, index: u32) -> Option<&Tag> {
        self.tags.get(index.checked_sub(1)? as usize)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Colors in tag order, as consumed by the label serializer.
    pub fn palette(&self) -> Vec<Rgba<u8>> {
        self.tags.iter().map(|t| t.color).collect()
    }
}
