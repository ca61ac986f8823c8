use crate::{reader::AseReader, AsepriteParseError, Result};
use image::Rgba;

/// A tag is a grouping of one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub(crate) name: String,
    pub(crate) from_frame: u16,
    pub(crate) to_frame: u16,
    pub(crate) animation_direction: AnimationDirection,
    pub(crate) color: Rgba<u8>,
}

impl Tag {
    /// Tag name. May not be unique among all tags.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First frame included in the tag.
    pub fn from_frame(&self) -> u32 {
        self.from_frame as u32
    }

    /// Last frame included in the tag.
    pub fn to_frame(&self) -> u32 {
        self.to_frame as u32
    }

    /// See [AnimationDirection] for details.
    pub fn animation_direction(&self) -> AnimationDirection {
        self.animation_direction
    }

    /// Color of the tag in the editor's timeline. Always opaque.
    pub fn color(&self) -> Rgba<u8> {
        self.color
    }
}

/// Describes how the tag's frames should be animated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationDirection {
    /// Start at `from_frame` and count up to `to_frame`.
    Forward,
    /// Start at `to_frame` and count down to `from_frame`.
    Reverse,
    /// Start at `from_frame`, count up to `to_frame`, then back down to `from_frame`.
    PingPong,
}

pub(crate) fn parse_tags_chunk(data: &[u8]) -> Result<Vec<Tag>> {
    let mut reader = AseReader::new(data);

    let num_tags = reader.word()?;
    reader.skip_reserved(8)?;

    let mut result = Vec::with_capacity(num_tags as usize);

    for _tag in 0..num_tags {
        let from_frame = reader.word()?;
        let to_frame = reader.word()?;
        let anim_dir = reader.byte()?;
        reader.skip_reserved(8)?;
        let red = reader.byte()?;
        let green = reader.byte()?;
        let blue = reader.byte()?;
        reader.skip_reserved(1)?;
        let name = reader.string()?;
        let animation_direction = parse_animation_direction(anim_dir)?;
        result.push(Tag {
            name,
            from_frame,
            to_frame,
            animation_direction,
            color: Rgba([red, green, blue, 255]),
        });
    }

    Ok(result)
}

fn parse_animation_direction(id: u8) -> Result<AnimationDirection> {
    match id {
        0 => Ok(AnimationDirection::Forward),
        1 => Ok(AnimationDirection::Reverse),
        2 => Ok(AnimationDirection::PingPong),
        _ => Err(AsepriteParseError::InvalidInput(format!(
            "Unknown animation direction: {}",
            id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::tags_chunk;

    #[test]
    fn parses_tags() {
        let data = tags_chunk(&[(0, 3, 2, [255, 0, 0], "walk"), (4, 4, 1, [0, 0, 255], "idle")]);
        let tags = parse_tags_chunk(&data).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name(), "walk");
        assert_eq!((tags[0].from_frame(), tags[0].to_frame()), (0, 3));
        assert_eq!(tags[0].animation_direction(), AnimationDirection::PingPong);
        assert_eq!(tags[0].color(), Rgba([255, 0, 0, 255]));
        assert_eq!(tags[1].animation_direction(), AnimationDirection::Reverse);
        assert_eq!(tags[1].color(), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn unknown_direction_fails() {
        let data = tags_chunk(&[(0, 0, 3, [0, 0, 0], "bad")]);
        assert!(parse_tags_chunk(&data).is_err());
    }

    #[test]
    fn truncated_chunk_fails() {
        let mut data = tags_chunk(&[(0, 1, 0, [1, 2, 3], "cut")]);
        data.truncate(data.len() - 1);
        assert!(parse_tags_chunk(&data).is_err());
    }
}
