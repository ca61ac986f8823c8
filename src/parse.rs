use crate::cel::{self, CelContent, CelData, CelHeader, CelId, RawCel};
use crate::file::FrameData;
use crate::header::{FrameHeader, Header, FRAME_HEADER_SIZE};
use crate::layer::{self, LayerData, LayerHierarchy};
use crate::pixel::{Gray, Indexed, Pixel};
use crate::reader::AseReader;
use crate::slice::Slice;
use crate::user_data::{self, UserData};
use crate::{error::AsepriteParseError, tags, AsepriteFile, ColorPalette, PixelFormat, Tag};
use crate::Result;

use image::Rgba;
use log::{debug, warn};
use std::io::Read;
use std::sync::Arc;

/// Controls how strictly the chunk stream is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Skip chunks of unknown type instead of failing. Their envelope gives
    /// their length, so the rest of the stream stays readable. Mask and path
    /// chunks are rejected either way.
    pub skip_unknown_chunks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserDataTarget {
    Layer(usize),
    Cel(CelId),
}

/// The "most recent entity" cursors that extra data and user data chunks
/// attach to.
#[derive(Debug, Default, Clone, Copy)]
struct ChunkCursor {
    last_cel: Option<CelId>,
    user_data_target: Option<UserDataTarget>,
}

struct DecodeState {
    palette: ColorPalette,
    has_modern_palette: bool,
    layers: Vec<LayerData>,
    hierarchy: LayerHierarchy,
    frames: Vec<FrameData>,
    tags: Vec<Tag>,
    slices: Vec<Slice>,
    sprite_user_data: Option<UserData>,
    cursor: ChunkCursor,
}

impl DecodeState {
    fn new(header: &Header, durations: Vec<u16>, has_modern_palette: bool) -> Self {
        Self {
            palette: ColorPalette::new(header.transparent_color_index),
            has_modern_palette,
            layers: Vec::new(),
            hierarchy: LayerHierarchy::default(),
            frames: durations
                .into_iter()
                .map(|duration| FrameData {
                    duration,
                    cels: Vec::new(),
                })
                .collect(),
            tags: Vec::new(),
            slices: Vec::new(),
            sprite_user_data: None,
            cursor: ChunkCursor::default(),
        }
    }

    fn process<P: Pixel>(&mut self, chunk: Chunk, options: &ParseOptions) -> Result<()> {
        let Chunk {
            frame,
            offset,
            chunk_type,
            data,
        } = chunk;
        match chunk_type {
            ChunkType::Palette => self.palette.apply_chunk(&data),
            ChunkType::OldPalette04 | ChunkType::OldPalette11 => {
                if self.has_modern_palette {
                    debug!("Ignoring legacy palette chunk at offset {}", offset);
                    Ok(())
                } else {
                    self.palette.apply_legacy_chunk(&data)
                }
            }
            ChunkType::Layer => {
                let layer_data = layer::parse_chunk(&data)?;
                self.add_layer(layer_data)
            }
            ChunkType::Cel => {
                let raw_cel = cel::parse_chunk::<P>(&data)?;
                self.add_cel(frame, raw_cel)
            }
            ChunkType::CelExtra => self.attach_extra(data),
            ChunkType::UserData => {
                let user_data = user_data::parse_userdata_chunk(&data)?;
                self.attach_user_data(user_data);
                Ok(())
            }
            ChunkType::Tags => {
                let tags = tags::parse_tags_chunk(&data)?;
                self.tags.extend(tags);
                Ok(())
            }
            ChunkType::Slice => {
                self.slices.push(Slice {
                    frame: frame as u32,
                    data,
                });
                Ok(())
            }
            ChunkType::Mask => Err(malformed(
                chunk_type.code(),
                offset,
                "Deprecated mask chunk".into(),
            )),
            ChunkType::Path => Err(malformed(
                chunk_type.code(),
                offset,
                "Unsupported path chunk".into(),
            )),
            ChunkType::Unknown(code) => {
                if options.skip_unknown_chunks {
                    warn!(
                        "Skipping unknown chunk type {:#06x} at offset {} ({} bytes)",
                        code,
                        offset,
                        data.len()
                    );
                    Ok(())
                } else {
                    Err(malformed(
                        code,
                        offset,
                        "Invalid or unsupported chunk type".into(),
                    ))
                }
            }
        }
    }

    fn add_layer(&mut self, mut layer_data: LayerData) -> Result<()> {
        let id = self.layers.len();
        layer_data.parent = self
            .hierarchy
            .place(id as u32, layer_data.level, layer_data.is_group())?;
        debug!(
            "Layer {} '{}' at level {}, parent {:?}",
            id, layer_data.name, layer_data.level, layer_data.parent
        );
        self.layers.push(layer_data);
        self.cursor.user_data_target = Some(UserDataTarget::Layer(id));
        Ok(())
    }

    fn add_cel<P: Pixel>(&mut self, frame: usize, raw_cel: RawCel<P>) -> Result<()> {
        let RawCel { header, content } = raw_cel;
        let CelHeader {
            layer_index,
            x,
            y,
            opacity,
        } = header;
        match self.layers.get(layer_index as usize) {
            Some(layer) if !layer.is_group() => {}
            Some(_) => {
                return Err(AsepriteParseError::InvalidInput(format!(
                    "Cel in frame {} belongs to group layer {}",
                    frame, layer_index
                )))
            }
            None => {
                return Err(AsepriteParseError::InvalidInput(format!(
                    "Cel in frame {} references missing layer {}",
                    frame, layer_index
                )))
            }
        }

        let id = CelId {
            frame,
            index: self.frames[frame].cels.len(),
        };
        let cel = match content {
            CelContent::Image(grid) => CelData {
                layer_index,
                x,
                y,
                opacity,
                image: P::wrap(Arc::new(grid)),
                linked_frame: None,
                owner: None,
                extra: None,
                user_data: None,
            },
            CelContent::Linked(target) => {
                // Position and opacity come from the linked-to cel, not
                // from this header.
                let owner = self.link_target(target, layer_index)?;
                let source = &self.frames[owner.frame].cels[owner.index];
                debug!("Cel {:?} links to {:?}", id, owner);
                CelData {
                    layer_index,
                    x: source.x,
                    y: source.y,
                    opacity: source.opacity,
                    image: source.image.clone(),
                    linked_frame: Some(target),
                    owner: Some(owner),
                    extra: None,
                    user_data: None,
                }
            }
        };
        let attach_to = cel.owner.unwrap_or(id);
        self.frames[frame].cels.push(cel);
        self.cursor.last_cel = Some(attach_to);
        self.cursor.user_data_target = Some(UserDataTarget::Cel(attach_to));
        Ok(())
    }

    /// The cel owning the pixels of `layer_index` in `frame`. Links to a
    /// linked cel resolve to the cel that one links to.
    fn link_target(&self, frame: u16, layer_index: u16) -> Result<CelId> {
        self.frames
            .get(frame as usize)
            .and_then(|f| {
                f.cels
                    .iter()
                    .position(|c| c.layer_index == layer_index)
                    .map(|index| {
                        f.cels[index].owner.unwrap_or(CelId {
                            frame: frame as usize,
                            index,
                        })
                    })
            })
            .ok_or_else(|| {
                AsepriteParseError::InvalidInput(format!(
                    "Linked cel references frame {}, which has no cel for layer {}",
                    frame, layer_index
                ))
            })
    }

    fn cel_mut(&mut self, id: CelId) -> &mut CelData {
        &mut self.frames[id.frame].cels[id.index]
    }

    fn attach_extra(&mut self, data: Vec<u8>) -> Result<()> {
        let id = self.cursor.last_cel.ok_or_else(|| {
            AsepriteParseError::InvalidInput("Cel extra chunk without a preceding cel".into())
        })?;
        debug!("Cel extra data for {:?}", id);
        self.cel_mut(id).extra = Some(data);
        Ok(())
    }

    fn attach_user_data(&mut self, user_data: UserData) {
        debug!("User data for {:?}", self.cursor.user_data_target);
        match self.cursor.user_data_target {
            Some(UserDataTarget::Layer(index)) => self.layers[index].user_data = Some(user_data),
            Some(UserDataTarget::Cel(id)) => self.cel_mut(id).user_data = Some(user_data),
            None => self.sprite_user_data = Some(user_data),
        }
    }
}

fn malformed(chunk_type: u16, offset: u64, message: String) -> AsepriteParseError {
    AsepriteParseError::MalformedChunk {
        chunk_type,
        offset,
        message,
    }
}

/// Gives errors raised while decoding a chunk payload the chunk's context.
fn in_chunk(err: AsepriteParseError, chunk_type: u16, offset: u64) -> AsepriteParseError {
    match err {
        AsepriteParseError::InvalidInput(message) => malformed(chunk_type, offset, message),
        AsepriteParseError::Io(err) => malformed(
            chunk_type,
            offset,
            format!("Truncated chunk payload: {}", err),
        ),
        AsepriteParseError::UnsupportedFormat(message) => {
            AsepriteParseError::UnsupportedFormat(format!(
                "{} (chunk {:#06x} at offset {})",
                message, chunk_type, offset
            ))
        }
        other => other,
    }
}

// file format docs: https://github.com/aseprite/aseprite/blob/master/docs/ase-file-specs.md
pub(crate) fn read_aseprite<R: Read>(input: R, options: &ParseOptions) -> Result<AsepriteFile> {
    let mut reader = AseReader::with(input);
    let header = Header::read(&mut reader)?;
    let pixel_format = header.pixel_format()?;

    let (durations, chunks) = collect_chunks(&mut reader, header.num_frames)?;
    debug!("Collected {} chunks", chunks.len());

    let state = match pixel_format {
        PixelFormat::Rgba => decode_chunks::<Rgba<u8>>(&header, durations, chunks, options)?,
        PixelFormat::Grayscale => decode_chunks::<Gray>(&header, durations, chunks, options)?,
        PixelFormat::Indexed { .. } => {
            decode_chunks::<Indexed>(&header, durations, chunks, options)?
        }
    };

    let DecodeState {
        palette,
        layers,
        frames,
        tags,
        slices,
        sprite_user_data,
        ..
    } = state;

    Ok(AsepriteFile {
        header,
        pixel_format,
        palette,
        layers,
        frames,
        tags,
        slices,
        sprite_user_data,
    })
}

/// Processes all chunks once, in stream order.
fn decode_chunks<P: Pixel>(
    header: &Header,
    durations: Vec<u16>,
    chunks: Vec<Chunk>,
    options: &ParseOptions,
) -> Result<DecodeState> {
    // A modern palette anywhere in the file shadows every legacy palette.
    let has_modern_palette = chunks.iter().any(|c| c.chunk_type == ChunkType::Palette);
    let mut state = DecodeState::new(header, durations, has_modern_palette);
    for chunk in chunks {
        let code = chunk.chunk_type.code();
        let offset = chunk.offset;
        state
            .process::<P>(chunk, options)
            .map_err(|err| in_chunk(err, code, offset))?;
    }
    Ok(state)
}

/// Reads every frame header and chunk envelope without interpreting any
/// payload. Returns the frame durations and all chunks in stream order.
fn collect_chunks<R: Read>(
    reader: &mut AseReader<R>,
    num_frames: u16,
) -> Result<(Vec<u16>, Vec<Chunk>)> {
    let mut durations = Vec::with_capacity(num_frames as usize);
    let mut chunks = Vec::new();
    for frame_id in 0..num_frames {
        let frame_header = FrameHeader::read(reader)?;
        debug!(
            "Frame {}: {} bytes, {} chunks, {} ms",
            frame_id, frame_header.num_bytes, frame_header.num_chunks, frame_header.duration
        );
        durations.push(frame_header.duration);

        let mut bytes_available = frame_header.num_bytes as i64 - FRAME_HEADER_SIZE as i64;
        for _ in 0..frame_header.num_chunks {
            chunks.push(Chunk::read(frame_id as usize, &mut bytes_available, reader)?);
        }
        if bytes_available > 0 {
            debug!("Skipping {} trailing bytes in frame {}", bytes_available, frame_id);
            reader.skip_reserved(bytes_available as usize)?;
        }
    }
    Ok((durations, chunks))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkType {
    OldPalette04, // deprecated
    OldPalette11, // deprecated
    Palette,
    Layer,
    Cel,
    CelExtra,
    Mask, // deprecated
    Path,
    Tags,
    UserData,
    Slice,
    Unknown(u16),
}

impl ChunkType {
    fn from_code(code: u16) -> Self {
        match code {
            0x0004 => ChunkType::OldPalette04,
            0x0011 => ChunkType::OldPalette11,
            0x2004 => ChunkType::Layer,
            0x2005 => ChunkType::Cel,
            0x2006 => ChunkType::CelExtra,
            0x2016 => ChunkType::Mask,
            0x2017 => ChunkType::Path,
            0x2018 => ChunkType::Tags,
            0x2019 => ChunkType::Palette,
            0x2020 => ChunkType::UserData,
            0x2022 => ChunkType::Slice,
            _ => ChunkType::Unknown(code),
        }
    }

    fn code(&self) -> u16 {
        match self {
            ChunkType::OldPalette04 => 0x0004,
            ChunkType::OldPalette11 => 0x0011,
            ChunkType::Layer => 0x2004,
            ChunkType::Cel => 0x2005,
            ChunkType::CelExtra => 0x2006,
            ChunkType::Mask => 0x2016,
            ChunkType::Path => 0x2017,
            ChunkType::Tags => 0x2018,
            ChunkType::Palette => 0x2019,
            ChunkType::UserData => 0x2020,
            ChunkType::Slice => 0x2022,
            ChunkType::Unknown(code) => *code,
        }
    }
}

const CHUNK_HEADER_SIZE: usize = 6;

struct Chunk {
    frame: usize,
    /// Absolute position of the chunk envelope.
    offset: u64,
    chunk_type: ChunkType,
    data: Vec<u8>,
}

impl Chunk {
    fn read<R: Read>(
        frame: usize,
        bytes_available: &mut i64,
        reader: &mut AseReader<R>,
    ) -> Result<Self> {
        let offset = reader.position();
        let chunk_size = reader.dword()?;
        let code = reader.word()?;

        check_chunk_bytes(chunk_size, *bytes_available, offset)?;

        let data = reader.take_bytes(chunk_size as usize - CHUNK_HEADER_SIZE)?;
        *bytes_available -= chunk_size as i64;
        Ok(Chunk {
            frame,
            offset,
            chunk_type: ChunkType::from_code(code),
            data,
        })
    }
}

fn check_chunk_bytes(chunk_size: u32, bytes_available: i64, offset: u64) -> Result<()> {
    if (chunk_size as usize) < CHUNK_HEADER_SIZE {
        return Err(AsepriteParseError::InvalidInput(format!(
            "Chunk size is too small {}, minimum_size: {} (offset {})",
            chunk_size, CHUNK_HEADER_SIZE, offset
        )));
    }
    if chunk_size as i64 > bytes_available {
        return Err(AsepriteParseError::InvalidInput(format!(
            "Trying to read chunk of size {}, but there are only {} bytes available in the frame (offset {})",
            chunk_size, bytes_available, offset
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tests::chunk;

    #[test]
    fn chunk_envelope() {
        let bytes = chunk(0x2019, &[1, 2, 3]);
        let mut reader = AseReader::new(&bytes);
        let mut available = 20;
        let chunk = Chunk::read(2, &mut available, &mut reader).unwrap();
        assert_eq!(chunk.frame, 2);
        assert_eq!(chunk.offset, 0);
        assert_eq!(chunk.chunk_type, ChunkType::Palette);
        assert_eq!(chunk.data, vec![1, 2, 3]);
        assert_eq!(available, 11);
    }

    #[test]
    fn chunk_larger_than_frame() {
        let bytes = chunk(0x2004, &[0; 10]);
        let mut reader = AseReader::new(&bytes);
        let mut available = 12;
        let err = Chunk::read(0, &mut available, &mut reader).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn chunk_smaller_than_envelope() {
        let bytes = [4, 0, 0, 0, 0x04, 0x20];
        let mut reader = AseReader::new(&bytes);
        let mut available = 100;
        let err = Chunk::read(0, &mut available, &mut reader).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn unknown_codes_are_kept() {
        assert_eq!(ChunkType::from_code(0x2007), ChunkType::Unknown(0x2007));
        assert_eq!(ChunkType::Unknown(0x2007).code(), 0x2007);
        assert_eq!(ChunkType::from_code(0x0011).code(), 0x0011);
    }

    #[test]
    fn payload_errors_get_chunk_context() {
        let err = in_chunk(
            AsepriteParseError::InvalidInput("bad".into()),
            0x2005,
            300,
        );
        match err {
            AsepriteParseError::MalformedChunk {
                chunk_type,
                offset,
                message,
            } => {
                assert_eq!(chunk_type, 0x2005);
                assert_eq!(offset, 300);
                assert_eq!(message, "bad");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let hierarchy = AsepriteParseError::BrokenHierarchy {
            layer: 1,
            level: 3,
            previous_level: Some(1),
        };
        assert_eq!(in_chunk(hierarchy, 0x2004, 0).kind(), ErrorKind::BrokenHierarchy);
    }
}
