use crate::{reader::AseReader, AsepriteParseError, Result};
use log::debug;
use std::io::Read;

pub(crate) const FILE_HEADER_SIZE: usize = 128;
pub(crate) const FRAME_HEADER_SIZE: usize = 16;
const FILE_MAGIC: u16 = 0xA5E0;
const FRAME_MAGIC: u16 = 0xF1FA;

/// Pixel format of the source Aseprite file, selected by the header's color
/// depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Red, green, blue, and alpha with 8 bits each.
    Rgba,
    /// 8 bit grayscale and 8 bit alpha,
    Grayscale,
    /// Indexed color. Color is determined by palette.
    /// The `transparent_color_index` is used to indicate a
    /// transparent pixel.
    #[allow(missing_docs)]
    Indexed { transparent_color_index: u8 },
}

impl PixelFormat {
    /// Number of bytes to store one pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Grayscale => 2,
            PixelFormat::Indexed { .. } => 1,
        }
    }

    /// When Indexed, returns the index of the transparent color.
    pub fn transparent_color_index(&self) -> Option<u8> {
        match self {
            PixelFormat::Indexed {
                transparent_color_index,
            } => Some(*transparent_color_index),
            _ => None,
        }
    }
}

/// The fixed 128 byte header at the start of every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub(crate) file_size: u32,
    pub(crate) num_frames: u16,
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) color_depth: u16,
    pub(crate) flags: u32,
    pub(crate) speed: u16,
    pub(crate) transparent_color_index: u8,
    pub(crate) num_colors: u16,
    pub(crate) pixel_width: u8,
    pub(crate) pixel_height: u8,
}

impl Header {
    pub(crate) fn read<R: Read>(reader: &mut AseReader<R>) -> Result<Self> {
        let offset = reader.position();
        let mut bytes = [0_u8; FILE_HEADER_SIZE];
        reader.read_exact(&mut bytes)?;
        let header = Self::parse(&bytes, offset)?;
        debug!(
            "Header: {}x{}, depth {}, {} frames",
            header.width, header.height, header.color_depth, header.num_frames
        );
        Ok(header)
    }

    /// Decodes a header from its raw bytes. `offset` is only used for error
    /// reporting.
    pub(crate) fn parse(bytes: &[u8; FILE_HEADER_SIZE], offset: u64) -> Result<Self> {
        let mut reader = AseReader::new(bytes);
        let file_size = reader.dword()?;
        let magic_number = reader.word()?;
        if magic_number != FILE_MAGIC {
            return Err(AsepriteParseError::Format {
                section: "file",
                expected: FILE_MAGIC,
                found: magic_number,
                offset,
            });
        }
        let num_frames = reader.word()?;
        let width = reader.word()?;
        let height = reader.word()?;
        let color_depth = reader.word()?;
        let flags = reader.dword()?;
        let speed = reader.word()?;
        let _zero1 = reader.dword()?;
        let _zero2 = reader.dword()?;
        let transparent_color_index = reader.byte()?;
        reader.skip_reserved(3)?;
        let num_colors = match reader.word()? {
            0 => 256,
            n => n,
        };
        let mut pixel_width = reader.byte()?;
        let mut pixel_height = reader.byte()?;
        if pixel_width == 0 || pixel_height == 0 {
            pixel_width = 1;
            pixel_height = 1;
        }
        // Grid position/size and reserved bytes follow; not used here.

        let header = Header {
            file_size,
            num_frames,
            width,
            height,
            color_depth,
            flags,
            speed,
            transparent_color_index,
            num_colors,
            pixel_width,
            pixel_height,
        };
        header.pixel_format()?;
        Ok(header)
    }

    /// The pixel format selected by the color depth.
    pub(crate) fn pixel_format(&self) -> Result<PixelFormat> {
        match self.color_depth {
            8 => Ok(PixelFormat::Indexed {
                transparent_color_index: self.transparent_color_index,
            }),
            16 => Ok(PixelFormat::Grayscale),
            32 => Ok(PixelFormat::Rgba),
            _ => Err(AsepriteParseError::UnsupportedFormat(format!(
                "Unknown pixel format. Color depth: {}",
                self.color_depth
            ))),
        }
    }

    /// File size in bytes as declared by the header.
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    /// Number of frames declared by the header.
    pub fn num_frames(&self) -> u16 {
        self.num_frames
    }

    /// Canvas width in pixels.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Canvas height in pixels.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Bits per pixel: 8, 16, or 32.
    pub fn color_depth(&self) -> u16 {
        self.color_depth
    }

    /// Raw header flags.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether the layer opacity values in this file are meaningful
    /// (header flag bit 0).
    pub fn layer_opacity_is_valid(&self) -> bool {
        self.flags & 1 == 1
    }

    /// Deprecated global animation speed in milliseconds.
    pub fn speed(&self) -> u16 {
        self.speed
    }

    /// Palette index that is always transparent.
    pub fn transparent_color_index(&self) -> u8 {
        self.transparent_color_index
    }

    /// Number of colors. A stored value of zero reads as 256.
    pub fn num_colors(&self) -> u16 {
        self.num_colors
    }

    /// Pixel width:height ratio. Zero components in the file read as 1:1.
    pub fn pixel_ratio(&self) -> (u8, u8) {
        (self.pixel_width, self.pixel_height)
    }
}

/// The 16 byte header in front of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub(crate) num_bytes: u32,
    pub(crate) num_chunks: u32,
    pub(crate) duration: u16,
}

impl FrameHeader {
    pub(crate) fn read<R: Read>(reader: &mut AseReader<R>) -> Result<Self> {
        let offset = reader.position();
        let num_bytes = reader.dword()?;
        let magic_number = reader.word()?;
        if magic_number != FRAME_MAGIC {
            return Err(AsepriteParseError::Format {
                section: "frame",
                expected: FRAME_MAGIC,
                found: magic_number,
                offset,
            });
        }
        let old_num_chunks = reader.word()?;
        let duration = reader.word()?;
        reader.skip_reserved(2)?;
        let new_num_chunks = reader.dword()?;

        let num_chunks = if new_num_chunks == 0 {
            old_num_chunks as u32
        } else {
            new_num_chunks
        };
        Ok(FrameHeader {
            num_bytes,
            num_chunks,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tests::header_bytes;

    #[test]
    fn header_fields() {
        let mut bytes = header_bytes(3, 40, 30, 32);
        bytes[14] = 1; // flags
        bytes[18] = 100; // speed
        bytes[28] = 7; // transparent index
        bytes[32] = 16; // colors
        bytes[34] = 2;
        bytes[35] = 3;
        let header = Header::parse(&bytes, 0).unwrap();
        assert_eq!(header.num_frames(), 3);
        assert_eq!((header.width(), header.height()), (40, 30));
        assert_eq!(header.color_depth(), 32);
        assert!(header.layer_opacity_is_valid());
        assert_eq!(header.speed(), 100);
        assert_eq!(header.transparent_color_index(), 7);
        assert_eq!(header.num_colors(), 16);
        assert_eq!(header.pixel_ratio(), (2, 3));
        assert_eq!(header.pixel_format().unwrap(), PixelFormat::Rgba);
    }

    #[test]
    fn header_defaults() {
        let mut bytes = header_bytes(1, 8, 8, 8);
        bytes[28] = 4;
        bytes[32] = 0;
        bytes[33] = 0;
        bytes[34] = 0;
        bytes[35] = 5;
        let header = Header::parse(&bytes, 0).unwrap();
        assert_eq!(header.num_colors(), 256);
        assert_eq!(header.pixel_ratio(), (1, 1));
        assert!(!header.layer_opacity_is_valid());
        assert_eq!(
            header.pixel_format().unwrap(),
            PixelFormat::Indexed {
                transparent_color_index: 4
            }
        );
    }

    #[test]
    fn unsupported_color_depth() {
        let bytes = header_bytes(1, 8, 8, 24);
        let err = Header::parse(&bytes, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn wrong_file_magic() {
        let mut bytes = header_bytes(1, 8, 8, 32);
        bytes[4] = 0xE1;
        let err = Header::parse(&bytes, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn frame_header_prefers_new_chunk_count() {
        let mut bytes = vec![0_u8; FRAME_HEADER_SIZE];
        bytes[0] = 16;
        bytes[4] = 0xFA;
        bytes[5] = 0xF1;
        bytes[6] = 0xFF;
        bytes[7] = 0xFF;
        bytes[8] = 100;
        bytes[12] = 0x00;
        bytes[13] = 0x00;
        bytes[14] = 0x01;
        let mut reader = AseReader::new(&bytes);
        let header = FrameHeader::read(&mut reader).unwrap();
        assert_eq!(header.num_chunks, 0x0001_0000);
        assert_eq!(header.duration, 100);

        bytes[14] = 0;
        let mut reader = AseReader::new(&bytes);
        assert_eq!(FrameHeader::read(&mut reader).unwrap().num_chunks, 0xFFFF);
    }

    #[test]
    fn wrong_frame_magic() {
        let bytes = [16, 0, 0, 0, 0xFA, 0xF2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut reader = AseReader::new(&bytes);
        match FrameHeader::read(&mut reader) {
            Err(AsepriteParseError::Format { section, found, .. }) => {
                assert_eq!(section, "frame");
                assert_eq!(found, 0xF2FA);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
