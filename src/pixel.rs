use crate::{blend, layer::BlendMode, reader::AseReader, ColorPalette, Result};
use image::Rgba;
use std::{fmt, io::Read, sync::Arc};

// From Aseprite file spec:
// PIXEL: One pixel, depending on the image pixel format:
// Grayscale: BYTE[2], each pixel have 2 bytes in the order Value, Alpha.
// Indexed: BYTE, Each pixel uses 1 byte (the index).
// RGBA: BYTE[4], each pixel have 4 bytes in this order Red, Green, Blue, Alpha.

/// A per-pixel blend function: `(backdrop, src, opacity) -> result`.
pub(crate) type BlendFn<P> = Box<dyn Fn(P, P, u8) -> P + Send + Sync>;

/// The operations every pixel representation provides. Chosen once from the
/// header's color depth; decoding and compositing are written against this.
pub(crate) trait Pixel: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Value of a freshly allocated canvas.
    const BLANK: Self;

    /// Encoded size of one pixel.
    const BYTES: usize;

    fn read<R: Read>(reader: &mut AseReader<R>) -> Result<Self>;

    /// Value a canvas is cleared to before cels are drawn.
    fn blank(_palette: &ColorPalette) -> Self {
        Self::BLANK
    }

    /// Displayable color of this value.
    fn colorize(self, palette: &ColorPalette) -> Rgba<u8>;

    fn blender(mode: BlendMode) -> BlendFn<Self>;

    fn wrap(grid: Arc<Grid<Self>>) -> CelImage;

    /// The grid inside `image`, if it holds this pixel kind.
    fn grid_of(image: &CelImage) -> Option<&Arc<Grid<Self>>>;
}

/// A grayscale pixel: value and alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gray {
    /// Brightness, replicated to red, green, and blue when displayed.
    pub value: u8,
    /// 0 = fully transparent, 255 = fully opaque.
    pub alpha: u8,
}

impl Gray {
    /// Create a gray pixel.
    pub fn new(value: u8, alpha: u8) -> Self {
        Gray { value, alpha }
    }
}

/// A palette index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Indexed(pub(crate) u8);

impl Pixel for Rgba<u8> {
    const BLANK: Self = Rgba([0, 0, 0, 0]);
    const BYTES: usize = 4;

    fn read<R: Read>(reader: &mut AseReader<R>) -> Result<Self> {
        let red = reader.byte()?;
        let green = reader.byte()?;
        let blue = reader.byte()?;
        let alpha = reader.byte()?;
        Ok(Rgba([red, green, blue, alpha]))
    }

    fn colorize(self, _palette: &ColorPalette) -> Rgba<u8> {
        self
    }

    fn blender(mode: BlendMode) -> BlendFn<Self> {
        blend::rgba_blender(mode)
    }

    fn wrap(grid: Arc<Grid<Self>>) -> CelImage {
        CelImage::Rgba(grid)
    }

    fn grid_of(image: &CelImage) -> Option<&Arc<Grid<Self>>> {
        match image {
            CelImage::Rgba(grid) => Some(grid),
            _ => None,
        }
    }
}

impl Pixel for Gray {
    const BLANK: Self = Gray { value: 0, alpha: 0 };
    const BYTES: usize = 2;

    fn read<R: Read>(reader: &mut AseReader<R>) -> Result<Self> {
        let value = reader.byte()?;
        let alpha = reader.byte()?;
        Ok(Gray { value, alpha })
    }

    fn colorize(self, _palette: &ColorPalette) -> Rgba<u8> {
        Rgba([self.value, self.value, self.value, self.alpha])
    }

    fn blender(mode: BlendMode) -> BlendFn<Self> {
        blend::gray_blender(mode)
    }

    fn wrap(grid: Arc<Grid<Self>>) -> CelImage {
        CelImage::Grayscale(grid)
    }

    fn grid_of(image: &CelImage) -> Option<&Arc<Grid<Self>>> {
        match image {
            CelImage::Grayscale(grid) => Some(grid),
            _ => None,
        }
    }
}

impl Pixel for Indexed {
    const BLANK: Self = Indexed(0);
    const BYTES: usize = 1;

    fn read<R: Read>(reader: &mut AseReader<R>) -> Result<Self> {
        reader.byte().map(Indexed)
    }

    fn blank(palette: &ColorPalette) -> Self {
        Indexed(palette.transparent_index())
    }

    fn colorize(self, palette: &ColorPalette) -> Rgba<u8> {
        palette.color(self.0 as usize).unwrap_or(TRANSPARENT)
    }

    fn blender(mode: BlendMode) -> BlendFn<Self> {
        blend::indexed_blender(mode)
    }

    fn wrap(grid: Arc<Grid<Self>>) -> CelImage {
        CelImage::Indexed(grid)
    }

    fn grid_of(image: &CelImage) -> Option<&Arc<Grid<Self>>> {
        match image {
            CelImage::Indexed(grid) => Some(grid),
            _ => None,
        }
    }
}

pub(crate) const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// A row-major 2-D array of pixels.
#[derive(Clone, PartialEq)]
pub(crate) struct Grid<P> {
    width: u16,
    height: u16,
    pixels: Vec<P>,
}

impl<P: Pixel> Grid<P> {
    #[cfg(test)]
    pub(crate) fn new(width: u16, height: u16) -> Self {
        Self::filled(width, height, P::BLANK)
    }

    pub(crate) fn filled(width: u16, height: u16, value: P) -> Self {
        Grid {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    pub(crate) fn from_pixels(width: u16, height: u16, pixels: Vec<P>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize);
        Grid {
            width,
            height,
            pixels,
        }
    }

    /// Reads `width * height` values, `y` outer and `x` inner.
    pub(crate) fn read<R: Read>(reader: &mut AseReader<R>, width: u16, height: u16) -> Result<Self> {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count);
        for _ in 0..count {
            pixels.push(P::read(reader)?);
        }
        Ok(Self::from_pixels(width, height, pixels))
    }

    pub(crate) fn width(&self) -> u16 {
        self.width
    }

    pub(crate) fn height(&self) -> u16 {
        self.height
    }

    pub(crate) fn pixels(&self) -> &[P] {
        &self.pixels
    }

    pub(crate) fn get(&self, x: u16, y: u16) -> Option<P> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Blends `src`, placed with its top-left corner at `(x0, y0)`, into
    /// this grid. Pixels outside of this grid are dropped.
    pub(crate) fn blend_from(
        &mut self,
        src: &Grid<P>,
        x0: i32,
        y0: i32,
        opacity: u8,
        blend_fn: &BlendFn<P>,
    ) {
        let x_start = x0.max(0);
        let y_start = y0.max(0);
        let x_end = (x0 + src.width as i32).min(self.width as i32);
        let y_end = (y0 + src.height as i32).min(self.height as i32);

        for y in y_start..y_end {
            let src_row = (y - y0) as usize * src.width as usize;
            let dst_row = y as usize * self.width as usize;
            for x in x_start..x_end {
                let src_px = src.pixels[src_row + (x - x0) as usize];
                let dst = &mut self.pixels[dst_row + x as usize];
                *dst = blend_fn(*dst, src_px, opacity);
            }
        }
    }

    /// Calls `f` with every position and its display color, row by row.
    pub(crate) fn visit<F>(&self, palette: &ColorPalette, mut f: F)
    where
        F: FnMut((u32, u32), Rgba<u8>),
    {
        let width = self.width as usize;
        if width == 0 {
            return;
        }
        for (idx, px) in self.pixels.iter().enumerate() {
            let x = (idx % width) as u32;
            let y = (idx / width) as u32;
            f((x, y), px.colorize(palette));
        }
    }
}

impl<P> fmt::Debug for Grid<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}x{} pixels>", self.width, self.height)
    }
}

/// The pixel payload of a cel. Linked cels hold a clone of the `Arc` of the
/// cel they link to.
#[derive(Debug, Clone)]
pub(crate) enum CelImage {
    Indexed(Arc<Grid<Indexed>>),
    Grayscale(Arc<Grid<Gray>>),
    Rgba(Arc<Grid<Rgba<u8>>>),
}

impl CelImage {
    pub(crate) fn size(&self) -> (u16, u16) {
        match self {
            CelImage::Indexed(g) => (g.width(), g.height()),
            CelImage::Grayscale(g) => (g.width(), g.height()),
            CelImage::Rgba(g) => (g.width(), g.height()),
        }
    }

    pub(crate) fn shares_pixels_with(&self, other: &CelImage) -> bool {
        match (self, other) {
            (CelImage::Indexed(a), CelImage::Indexed(b)) => Arc::ptr_eq(a, b),
            (CelImage::Grayscale(a), CelImage::Grayscale(b)) => Arc::ptr_eq(a, b),
            (CelImage::Rgba(a), CelImage::Rgba(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_grid(width: u16, height: u16, fill: [u8; 4]) -> Grid<Rgba<u8>> {
        Grid::from_pixels(
            width,
            height,
            vec![Rgba(fill); width as usize * height as usize],
        )
    }

    #[test]
    fn read_is_row_major() {
        let bytes = [1, 0xff, 2, 0xff, 3, 0xff, 4, 0xff, 5, 0xff, 6, 0xff];
        let mut reader = AseReader::new(&bytes);
        let grid: Grid<Gray> = Grid::read(&mut reader, 3, 2).unwrap();
        assert_eq!(grid.get(2, 0), Some(Gray::new(3, 0xff)));
        assert_eq!(grid.get(0, 1), Some(Gray::new(4, 0xff)));
        assert_eq!(grid.get(3, 0), None);
    }

    #[test]
    fn read_fails_on_short_input() {
        let bytes = [1, 2, 3];
        let mut reader = AseReader::new(&bytes);
        assert!(Grid::<Rgba<u8>>::read(&mut reader, 1, 1).is_err());
    }

    #[test]
    fn blend_from_clips_to_bounds() {
        let mut canvas: Grid<Rgba<u8>> = Grid::new(3, 3);
        let src = rgba_grid(2, 2, [9, 9, 9, 255]);
        let blend_fn = <Rgba<u8> as Pixel>::blender(BlendMode::Normal);
        canvas.blend_from(&src, -1, 2, 255, &blend_fn);
        assert_eq!(canvas.get(0, 2), Some(Rgba([9, 9, 9, 255])));
        assert_eq!(canvas.get(1, 2), Some(TRANSPARENT));
        assert_eq!(canvas.get(0, 1), Some(TRANSPARENT));

        // Entirely outside.
        let mut canvas: Grid<Rgba<u8>> = Grid::new(2, 2);
        canvas.blend_from(&src, 5, 5, 255, &blend_fn);
        canvas.blend_from(&src, -5, 0, 255, &blend_fn);
        assert!(canvas.pixels().iter().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn colorize_variants() {
        let palette = ColorPalette::with_colors(1, vec![Rgba([1, 2, 3, 255]), Rgba([4, 5, 6, 255])]);
        assert_eq!(Indexed(0).colorize(&palette), Rgba([1, 2, 3, 255]));
        assert_eq!(Indexed(1).colorize(&palette), TRANSPARENT);
        assert_eq!(Indexed(7).colorize(&palette), TRANSPARENT);
        assert_eq!(Gray::new(40, 200).colorize(&palette), Rgba([40, 40, 40, 200]));
        assert_eq!(Rgba([7, 8, 9, 10]).colorize(&palette), Rgba([7, 8, 9, 10]));
        assert_eq!(Indexed::blank(&palette), Indexed(1));
        assert_eq!(Gray::blank(&palette), Gray::new(0, 0));
    }

    #[test]
    fn visit_reports_positions() {
        let grid = rgba_grid(2, 2, [1, 1, 1, 1]);
        let palette = ColorPalette::new(0);
        let mut seen = Vec::new();
        grid.visit(&palette, |pos, _| seen.push(pos));
        assert_eq!(seen, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn linked_images_share_pixels() {
        let a = CelImage::Rgba(Arc::new(rgba_grid(1, 1, [0; 4])));
        let b = a.clone();
        let c = CelImage::Rgba(Arc::new(rgba_grid(1, 1, [0; 4])));
        assert!(a.shares_pixels_with(&b));
        assert!(!a.shares_pixels_with(&c));
        assert_eq!(a.size(), (1, 1));
    }

    #[test]
    fn grid_of_matches_pixel_kind() {
        let grid = Arc::new(rgba_grid(2, 1, [1, 2, 3, 4]));
        let image = <Rgba<u8> as Pixel>::wrap(Arc::clone(&grid));
        assert!(Arc::ptr_eq(<Rgba<u8> as Pixel>::grid_of(&image).unwrap(), &grid));
        assert!(Gray::grid_of(&image).is_none());
        assert!(Indexed::grid_of(&image).is_none());
        assert_eq!(<Rgba<u8> as Pixel>::BYTES, 4);
        assert_eq!(Gray::BYTES, 2);
        assert_eq!(Indexed::BYTES, 1);
    }
}
