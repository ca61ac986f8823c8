use crate::{pixel::TRANSPARENT, reader::AseReader, AsepriteParseError, Result};
use image::Rgba;
use std::ops::Index;

const MAX_COLORS: usize = 256;

/// The color palette embedded in the file.
///
/// Built from the modern palette chunks, or from the legacy ones when the
/// file contains no modern palette chunk at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorPalette {
    colors: Vec<Rgba<u8>>,
    transparent_index: u8,
}

impl ColorPalette {
    pub(crate) fn new(transparent_index: u8) -> Self {
        ColorPalette {
            colors: Vec::new(),
            transparent_index,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_colors(transparent_index: u8, colors: Vec<Rgba<u8>>) -> Self {
        ColorPalette {
            colors,
            transparent_index,
        }
    }

    /// Total number of colors in the palette.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// `true` if no palette chunk provided any color.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// The index that always resolves to a fully transparent color.
    pub fn transparent_index(&self) -> u8 {
        self.transparent_index
    }

    /// The stored color at `index`, without the transparent index override.
    pub fn get(&self, index: usize) -> Option<&Rgba<u8>> {
        self.colors.get(index)
    }

    /// The color an index resolves to. The transparent index is always fully
    /// transparent, whatever is stored there.
    pub fn color(&self, index: usize) -> Option<Rgba<u8>> {
        if index == self.transparent_index as usize {
            Some(TRANSPARENT)
        } else {
            self.colors.get(index).copied()
        }
    }

    /// Iterate over the stored colors.
    pub fn iter(&self) -> std::slice::Iter<'_, Rgba<u8>> {
        self.colors.iter()
    }

    fn grow_to(&mut self, size: usize) {
        if self.colors.len() < size {
            self.colors.resize(size, TRANSPARENT);
        }
    }

    fn set(&mut self, index: usize, color: Rgba<u8>) -> Result<()> {
        if index >= MAX_COLORS {
            return Err(AsepriteParseError::InvalidInput(format!(
                "Palette index {} out of range (max: {})",
                index,
                MAX_COLORS - 1
            )));
        }
        self.grow_to(index + 1);
        self.colors[index] = color;
        Ok(())
    }

    /// Applies a palette chunk (0x2019).
    pub(crate) fn apply_chunk(&mut self, data: &[u8]) -> Result<()> {
        let mut reader = AseReader::new(data);
        let new_size = reader.dword()? as usize;
        let first = reader.dword()? as usize;
        let last = reader.dword()? as usize;
        reader.skip_reserved(8)?;

        if new_size > MAX_COLORS {
            return Err(AsepriteParseError::InvalidInput(format!(
                "Palette size {} exceeds {} colors",
                new_size, MAX_COLORS
            )));
        }
        if last < first {
            return Err(AsepriteParseError::InvalidInput(format!(
                "Bad palette color indices: first={} last={}",
                first, last,
            )));
        }
        self.grow_to(new_size);
        if last >= self.colors.len() {
            return Err(AsepriteParseError::InvalidInput(format!(
                "Palette entry {} outside of palette of size {}",
                last,
                self.colors.len()
            )));
        }

        for index in first..=last {
            let flags = reader.word()?;
            let red = reader.byte()?;
            let green = reader.byte()?;
            let blue = reader.byte()?;
            let alpha = reader.byte()?;
            if flags & 1 == 1 {
                let _name = reader.string()?;
            }
            self.colors[index] = Rgba([red, green, blue, alpha]);
        }
        Ok(())
    }

    /// Applies a legacy palette chunk (0x0004 or 0x0011).
    pub(crate) fn apply_legacy_chunk(&mut self, data: &[u8]) -> Result<()> {
        let mut reader = AseReader::new(data);
        let num_packets = reader.word()?;
        let mut index = 0_usize;
        for _ in 0..num_packets {
            index += reader.byte()? as usize;
            let count = match reader.byte()? {
                0 => 256,
                n => n as usize,
            };
            for _ in 0..count {
                let red = reader.byte()?;
                let green = reader.byte()?;
                let blue = reader.byte()?;
                self.set(index, Rgba([red, green, blue, 255]))?;
                index += 1;
            }
        }
        Ok(())
    }
}

impl Index<usize> for ColorPalette {
    type Output = Rgba<u8>;

    /// # Panics
    ///
    /// Panics if `index` is neither stored nor the transparent index.
    fn index(&self, index: usize) -> &Self::Output {
        if index == self.transparent_index as usize {
            &TRANSPARENT
        } else {
            &self.colors[index]
        }
    }
}

impl<'a> IntoIterator for &'a ColorPalette {
    type Item = &'a Rgba<u8>;
    type IntoIter = std::slice::Iter<'a, Rgba<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{legacy_palette_chunk, palette_chunk};

    #[test]
    fn modern_chunk_sets_range() {
        let mut palette = ColorPalette::new(0);
        let data = palette_chunk(4, 1, &[[10, 20, 30, 255], [40, 50, 60, 128]]);
        palette.apply_chunk(&data).unwrap();
        assert_eq!(palette.len(), 4);
        assert_eq!(palette.get(0), Some(&Rgba([0, 0, 0, 0])));
        assert_eq!(palette[1], Rgba([10, 20, 30, 255]));
        assert_eq!(palette[2], Rgba([40, 50, 60, 128]));
        assert_eq!(palette.get(3), Some(&Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn modern_chunk_skips_names() {
        let mut data = Vec::new();
        data.extend_from_slice(&2_u32.to_le_bytes());
        data.extend_from_slice(&0_u32.to_le_bytes());
        data.extend_from_slice(&1_u32.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(&[1, 0, 1, 2, 3, 4]);
        data.extend_from_slice(&[3, 0, b'r', b'e', b'd']);
        data.extend_from_slice(&[0, 0, 5, 6, 7, 8]);
        let mut palette = ColorPalette::new(9);
        palette.apply_chunk(&data).unwrap();
        assert_eq!(palette[0], Rgba([1, 2, 3, 4]));
        assert_eq!(palette[1], Rgba([5, 6, 7, 8]));
    }

    #[test]
    fn growing_preserves_entries() {
        let mut palette = ColorPalette::new(255);
        palette
            .apply_chunk(&palette_chunk(2, 0, &[[1, 1, 1, 255], [2, 2, 2, 255]]))
            .unwrap();
        palette
            .apply_chunk(&palette_chunk(4, 3, &[[4, 4, 4, 255]]))
            .unwrap();
        let colors: Vec<_> = palette.iter().copied().collect();
        assert_eq!(
            colors,
            vec![
                Rgba([1, 1, 1, 255]),
                Rgba([2, 2, 2, 255]),
                Rgba([0, 0, 0, 0]),
                Rgba([4, 4, 4, 255])
            ]
        );
    }

    #[test]
    fn modern_chunk_out_of_range() {
        let mut palette = ColorPalette::new(0);
        let data = palette_chunk(2, 1, &[[1, 1, 1, 255], [2, 2, 2, 255]]);
        assert!(palette.apply_chunk(&data).is_err());
        let data = palette_chunk(300, 0, &[[1, 1, 1, 255]]);
        assert!(palette.apply_chunk(&data).is_err());
    }

    #[test]
    fn legacy_packets_skip_and_fill() {
        let mut palette = ColorPalette::new(200);
        let data = legacy_palette_chunk(&[(1, vec![[9, 8, 7]]), (2, vec![[1, 2, 3], [4, 5, 6]])]);
        palette.apply_legacy_chunk(&data).unwrap();
        assert_eq!(palette.len(), 6);
        assert_eq!(palette[0], Rgba([0, 0, 0, 0]));
        assert_eq!(palette[1], Rgba([9, 8, 7, 255]));
        assert_eq!(palette[4], Rgba([1, 2, 3, 255]));
        assert_eq!(palette[5], Rgba([4, 5, 6, 255]));
    }

    #[test]
    fn legacy_zero_count_means_256() {
        let mut palette = ColorPalette::new(0);
        let colors = vec![[3, 3, 3]; 256];
        let data = legacy_palette_chunk(&[(0, colors)]);
        palette.apply_legacy_chunk(&data).unwrap();
        assert_eq!(palette.len(), 256);
        assert_eq!(palette.get(255), Some(&Rgba([3, 3, 3, 255])));
    }

    #[test]
    fn legacy_overflow_fails() {
        let mut palette = ColorPalette::new(0);
        let data = legacy_palette_chunk(&[(255, vec![[1, 1, 1], [2, 2, 2]])]);
        assert!(palette.apply_legacy_chunk(&data).is_err());
    }

    #[test]
    fn transparent_index_overrides_stored_color() {
        let palette = ColorPalette::with_colors(1, vec![Rgba([1, 1, 1, 255]), Rgba([2, 2, 2, 255])]);
        assert_eq!(palette.color(1), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(palette[1], Rgba([0, 0, 0, 0]));
        assert_eq!(palette.get(1), Some(&Rgba([2, 2, 2, 255])));
        assert_eq!(palette.color(5), None);
    }
}
