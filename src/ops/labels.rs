use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::TRANSPARENT;

/// Error type for label-map decoding and restoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    /// RLE data must be a sequence of (count, value) pairs.
    OddLength(usize),
    LengthMismatch { expected: usize, actual: usize },
    UnknownLabel(u32),
}

impl std::fmt::Display for LabelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelError::OddLength(n) => write!(f, "RLE data has odd length {}", n),
            LabelError::LengthMismatch { expected, actual } => {
                write!(f, "label map has {} entries, expected {}", actual, expected)
            }
            LabelError::UnknownLabel(v) => write!(f, "label {} has no palette color", v),
        }
    }
}

impl std::error::Error for LabelError {}

/// Map every pixel to its tag index: palette position `i` → `i + 1`,
/// anything else → 0.  Only RGB is compared.
pub fn to_label_map(buffer: &RgbaImage, palette: &[Rgba<u8>]) -> Vec<u32> {
    let lookup: HashMap<[u8; 3], u32> = palette
        .iter()
        .enumerate()
        .rev()
        .map(|(i, c)| ([c[0], c[1], c[2]], i as u32 + 1))
        .collect();

    buffer
        .as_raw()
        .par_chunks_exact(4)
        .map(|px| lookup.get(&[px[0], px[1], px[2]]).copied().unwrap_or(0))
        .collect()
}

/// Run-length encode as flat `(count, value)` pairs.
pub fn rle(sequence: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let mut iter = sequence.iter();
    let Some(&first) = iter.next() else {
        return out;
    };
    let (mut value, mut count) = (first, 1u32);
    for &v in iter {
        if v == value {
            count += 1;
        } else {
            out.push(count);
            out.push(value);
            value = v;
            count = 1;
        }
    }
    out.push(count);
    out.push(value);
    out
}

/// Expand flat `(count, value)` pairs back into a label sequence.
pub fn rle_decode(pairs: &[u32]) -> Result<Vec<u32>, LabelError> {
    if pairs.len() % 2 != 0 {
        return Err(LabelError::OddLength(pairs.len()));
    }
    let total: usize = pairs.chunks_exact(2).map(|p| p[0] as usize).sum();
    let mut out = Vec::with_capacity(total);
    for pair in pairs.chunks_exact(2) {
        out.extend(std::iter::repeat_n(pair[1], pair[0] as usize));
    }
    Ok(out)
}

/// Overwrite `buffer` from a label map produced by [`to_label_map`].
/// The buffer is left untouched when the map does not fit.
pub fn paint_label_map(buffer: &mut RgbaImage, labels: &[u32], palette: &[Rgba<u8>]) -> Result<(), LabelError> {
    let expected = buffer.width() as usize * buffer.height() as usize;
    if labels.len() != expected {
        return Err(LabelError::LengthMismatch {
            expected,
            actual: labels.len(),
        });
    }
    if let Some(&bad) = labels.iter().find(|&&v| v as usize > palette.len()) {
        return Err(LabelError::UnknownLabel(bad));
    }

    let raw: &mut [u8] = buffer;
    raw.par_chunks_exact_mut(4).zip(labels.par_iter()).for_each(|(px, &label)| {
        let color = match label {
            0 => TRANSPARENT,
            v => palette[v as usize - 1],
        };
        px.copy_from_slice(&color.0);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Rgba<u8> = Rgba([128, 0, 0, 255]);
    const B: Rgba<u8> = Rgba([0, 128, 0, 255]);

    #[test]
    fn label_map_is_row_major() {
        let mut buf = RgbaImage::new(3, 2);
        buf.put_pixel(1, 0, A);
        buf.put_pixel(0, 1, B);
        buf.put_pixel(2, 1, A);
        assert_eq!(to_label_map(&buf, &[A, B]), vec![0, 1, 0, 2, 0, 1]);
    }

    #[test]
    fn alpha_is_ignored_and_unknown_colors_are_background() {
        let mut buf = RgbaImage::new(3, 1);
        buf.put_pixel(0, 0, Rgba([128, 0, 0, 10]));
        buf.put_pixel(1, 0, Rgba([1, 2, 3, 255]));
        assert_eq!(to_label_map(&buf, &[A]), vec![1, 0, 0]);
    }

    #[test]
    fn rle_emits_count_value_pairs() {
        assert_eq!(rle(&[0, 0, 0, 2, 2, 1]), vec![3, 0, 2, 2, 1, 1]);
        assert_eq!(rle(&[5]), vec![1, 5]);
        assert!(rle(&[]).is_empty());
    }

    #[test]
    fn rle_decode_rejects_odd_input() {
        assert_eq!(rle_decode(&[3, 0, 1]), Err(LabelError::OddLength(3)));
        assert_eq!(rle_decode(&[2, 7, 1, 0]), Ok(vec![7, 7, 0]));
    }

    #[test]
    fn uniform_buffers_compress_to_one_run() {
        let blank = RgbaImage::new(20, 10);
        assert_eq!(rle(&to_label_map(&blank, &[A])), vec![200, 0]);
        let full = RgbaImage::from_pixel(20, 10, B);
        assert_eq!(rle(&to_label_map(&full, &[A, B])), vec![200, 2]);
    }

    #[test]
    fn paint_label_map_restores_pixels() {
        let mut src = RgbaImage::new(4, 4);
        src.put_pixel(1, 1, A);
        src.put_pixel(2, 3, B);
        let labels = to_label_map(&src, &[A, B]);
        let mut dst = RgbaImage::from_pixel(4, 4, A);
        paint_label_map(&mut dst, &labels, &[A, B]).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn paint_label_map_validates_input() {
        let mut dst = RgbaImage::new(2, 2);
        assert_eq!(
            paint_label_map(&mut dst, &[0, 0, 0], &[A]),
            Err(LabelError::LengthMismatch { expected: 4, actual: 3 })
        );
        assert_eq!(paint_label_map(&mut dst, &[0, 2, 0, 0], &[A]), Err(LabelError::UnknownLabel(2)));
    }
}
