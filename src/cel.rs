use crate::file::Frame;
use crate::layer::Layer;
use crate::pixel::{CelImage, Grid, Pixel};
use crate::reader::AseReader;
use crate::user_data::UserData;
use crate::{AsepriteFile, AsepriteParseError, Result};

use image::{Rgba, RgbaImage};
use std::io::{Cursor, Read};

/// A reference to a single Cel. A cel contains the image data at a specific
/// layer and frame. In the timeline view these are the dots.
///
/// You can get a `cel` by going either via frame then layer or vice versa.
///
/// [Official docs for cels](https://www.aseprite.org/docs/cel/).
#[derive(Debug, Clone, Copy)]
pub struct Cel<'a> {
    pub(crate) file: &'a AsepriteFile,
    pub(crate) frame: u32,
    pub(crate) index: usize,
}

impl<'a> Cel<'a> {
    fn data(&self) -> &'a CelData {
        &self.file.frames[self.frame as usize].cels[self.index]
    }

    /// The cel holding extra data and user data; the linked-to cel for
    /// linked cels.
    fn owner(&self) -> &'a CelData {
        let data = self.data();
        match data.owner {
            Some(id) => &self.file.frames[id.frame].cels[id.index],
            None => data,
        }
    }

    /// The layer this cel belongs to.
    pub fn layer(&self) -> Layer<'a> {
        self.file.layer(self.data().layer_index as u32)
    }

    /// The frame this cel belongs to.
    pub fn frame(&self) -> Frame<'a> {
        self.file.frame(self.frame)
    }

    /// Position of this cel within the frame's cel list, i.e. its drawing
    /// order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Offset of the top-left corner on the canvas. May be negative. Linked
    /// cels share the position of the cel they link to.
    pub fn position(&self) -> (i16, i16) {
        let data = self.data();
        (data.x, data.y)
    }

    #[allow(missing_docs)]
    pub fn x(&self) -> i16 {
        self.data().x
    }

    #[allow(missing_docs)]
    pub fn y(&self) -> i16 {
        self.data().y
    }

    /// Opacity of the cel. Linked cels report the opacity of the cel they
    /// link to.
    pub fn opacity(&self) -> u8 {
        self.data().opacity
    }

    /// Cel opacity scaled by its layer's opacity. This is the opacity used
    /// when the cel is composited.
    pub fn global_opacity(&self) -> u8 {
        self.file.cel_opacity(self.data())
    }

    /// Width of the cel's pixel grid.
    pub fn width(&self) -> u16 {
        self.data().image.size().0
    }

    /// Height of the cel's pixel grid.
    pub fn height(&self) -> u16 {
        self.data().image.size().1
    }

    /// For linked cels, the frame whose cel provides the pixels.
    pub fn linked_frame(&self) -> Option<u32> {
        self.data().linked_frame.map(|f| f as u32)
    }

    /// Raw payload of the cel extra chunk following this cel, if any.
    /// Shared between a linked cel and the cel it links to.
    pub fn extra_data(&self) -> Option<&'a [u8]> {
        self.owner().extra.as_deref()
    }

    /// Returns the cel's user data, if any is present. Shared between a
    /// linked cel and the cel it links to.
    pub fn user_data(&self) -> Option<&'a UserData> {
        self.owner().user_data.as_ref()
    }

    /// Display color of the pixel at `(x, y)`, relative to the cel's
    /// top-left corner. `None` outside of the cel.
    pub fn pixel(&self, x: u16, y: u16) -> Option<Rgba<u8>> {
        let palette = &self.file.palette;
        match &self.data().image {
            CelImage::Rgba(grid) => grid.get(x, y).map(|px| px.colorize(palette)),
            CelImage::Grayscale(grid) => grid.get(x, y).map(|px| px.colorize(palette)),
            CelImage::Indexed(grid) => grid.get(x, y).map(|px| px.colorize(palette)),
        }
    }

    /// This cel as an image. Result has the same dimensions as the [AsepriteFile].
    /// The cel is blended onto a transparent canvas with its layer's blend
    /// mode and its global opacity, ignoring layer visibility.
    pub fn image(&self) -> RgbaImage {
        self.file.cel_image(self.data())
    }

    /// `true` if both cels show the same pixel grid, as linked cels do.
    pub fn shares_pixels_with(&self, other: &Cel<'_>) -> bool {
        self.data().image.shares_pixels_with(&other.data().image)
    }
}

/// Location of a decoded cel: frame number and index in that frame's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CelId {
    pub(crate) frame: usize,
    pub(crate) index: usize,
}

/// A decoded cel, owned by its frame. A linked cel copies position, opacity
/// and the shared grid of its `owner`, which also holds its attachments.
#[derive(Debug, Clone)]
pub(crate) struct CelData {
    pub(crate) layer_index: u16,
    pub(crate) x: i16,
    pub(crate) y: i16,
    pub(crate) opacity: u8,
    pub(crate) image: CelImage,
    pub(crate) linked_frame: Option<u16>,
    pub(crate) owner: Option<CelId>,
    pub(crate) extra: Option<Vec<u8>>,
    pub(crate) user_data: Option<UserData>,
}

/// Fields shared by all cel types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CelHeader {
    pub(crate) layer_index: u16,
    pub(crate) x: i16,
    pub(crate) y: i16,
    pub(crate) opacity: u8,
}

impl CelHeader {
    fn parse<R: Read>(reader: &mut AseReader<R>) -> Result<Self> {
        let layer_index = reader.word()?;
        let x = reader.short()?;
        let y = reader.short()?;
        let opacity = reader.byte()?;
        Ok(Self {
            layer_index,
            x,
            y,
            opacity,
        })
    }
}

#[derive(Debug)]
pub(crate) enum CelContent<P> {
    Image(Grid<P>),
    Linked(u16),
}

#[derive(Debug)]
pub(crate) struct RawCel<P> {
    pub(crate) header: CelHeader,
    pub(crate) content: CelContent<P>,
}

/// Encoded size of a `width` x `height` grid of `P`.
fn grid_bytes<P: Pixel>(width: u16, height: u16) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|count| count.checked_mul(P::BYTES))
        .ok_or_else(|| {
            AsepriteParseError::InvalidInput(format!("Cel size {}x{} too large", width, height))
        })
}

fn parse_raw_cel<P: Pixel>(mut reader: AseReader<Cursor<&[u8]>>) -> Result<Grid<P>> {
    let width = reader.word()?;
    let height = reader.word()?;
    let expected = grid_bytes::<P>(width, height)?;
    if reader.remaining() < expected {
        return Err(AsepriteParseError::InvalidInput(format!(
            "Cel of size {}x{} needs {} bytes of pixel data, found {}",
            width,
            height,
            expected,
            reader.remaining()
        )));
    }
    Grid::read(&mut reader, width, height)
}

fn parse_compressed_cel<P: Pixel, R: Read>(mut reader: AseReader<R>) -> Result<Grid<P>> {
    let width = reader.word()?;
    let height = reader.word()?;
    let expected = grid_bytes::<P>(width, height)?;
    let inflated = reader.unzip(expected)?;
    Grid::read(&mut AseReader::new(&inflated), width, height)
}

pub(crate) fn parse_chunk<P: Pixel>(data: &[u8]) -> Result<RawCel<P>> {
    let mut reader = AseReader::new(data);
    let header = CelHeader::parse(&mut reader)?;
    let cel_type = reader.word()?;
    reader.skip_reserved(7)?;

    let content = match cel_type {
        0 => parse_raw_cel(reader).map(CelContent::Image)?,
        1 => reader.word().map(CelContent::Linked)?,
        2 => parse_compressed_cel(reader).map(CelContent::Image)?,
        _ => {
            return Err(AsepriteParseError::InvalidInput(format!(
                "Invalid/Unsupported Cel type: {}",
                cel_type
            )))
        }
    };
    Ok(RawCel { header, content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::{Gray, Indexed};
    use crate::tests::{cel_chunk, compressed_cel_chunk, linked_cel_chunk};

    #[test]
    fn raw_cel() {
        let pixels = [1, 2, 3, 4, 5, 6, 7, 8];
        let data = cel_chunk(3, -2, 5, 200, 2, 1, &pixels);
        let cel = parse_chunk::<Rgba<u8>>(&data).unwrap();
        assert_eq!(
            cel.header,
            CelHeader {
                layer_index: 3,
                x: -2,
                y: 5,
                opacity: 200
            }
        );
        match cel.content {
            CelContent::Image(grid) => {
                assert_eq!((grid.width(), grid.height()), (2, 1));
                assert_eq!(grid.get(1, 0), Some(Rgba([5, 6, 7, 8])));
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn compressed_cel() {
        let pixels = [10, 255, 20, 255, 30, 128, 40, 0];
        let data = compressed_cel_chunk(0, 0, 0, 255, 2, 2, &pixels);
        let cel = parse_chunk::<Gray>(&data).unwrap();
        match cel.content {
            CelContent::Image(grid) => {
                assert_eq!(grid.get(0, 1), Some(Gray::new(30, 128)));
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn compressed_cel_too_short() {
        let data = compressed_cel_chunk(0, 0, 0, 255, 2, 2, &[1, 2, 3]);
        assert!(parse_chunk::<Indexed>(&data).is_err());
    }

    #[test]
    fn huge_cel_without_pixels() {
        let raw = cel_chunk(0, 0, 0, 255, 0xFFFF, 0xFFFF, &[]);
        assert!(matches!(
            parse_chunk::<Rgba<u8>>(&raw),
            Err(AsepriteParseError::InvalidInput(_))
        ));
        let compressed = compressed_cel_chunk(0, 0, 0, 255, 0xFFFF, 0xFFFF, &[0; 16]);
        assert!(matches!(
            parse_chunk::<Rgba<u8>>(&compressed),
            Err(AsepriteParseError::InvalidInput(_))
        ));
    }

    #[test]
    fn raw_cel_with_missing_row() {
        let data = cel_chunk(0, 0, 0, 255, 2, 2, &[10, 255, 20, 255]);
        assert!(matches!(
            parse_chunk::<Gray>(&data),
            Err(AsepriteParseError::InvalidInput(_))
        ));
    }

    #[test]
    fn linked_cel() {
        let data = linked_cel_chunk(1, 4, 4, 255, 7);
        let cel = parse_chunk::<Indexed>(&data).unwrap();
        assert!(matches!(cel.content, CelContent::Linked(7)));
        assert_eq!(cel.header.x, 4);
    }

    #[test]
    fn unknown_cel_type() {
        let mut data = linked_cel_chunk(0, 0, 0, 255, 0);
        data[7] = 3;
        assert!(matches!(
            parse_chunk::<Rgba<u8>>(&data),
            Err(AsepriteParseError::InvalidInput(_))
        ));
    }
}
