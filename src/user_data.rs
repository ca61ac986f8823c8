use crate::{reader::AseReader, AsepriteParseError, Result};
use image::Rgba;

/// UserData contains user-provided metadata which describes some other data in the sprite.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserData {
    /// User-provided string data.
    pub text: Option<String>,
    /// User-provided color.
    pub color: Option<Rgba<u8>>,
}

pub(crate) fn parse_userdata_chunk(data: &[u8]) -> Result<UserData> {
    let mut reader = AseReader::new(data);

    let flags = reader.dword()?;
    if flags > 3 {
        return Err(AsepriteParseError::InvalidInput(format!(
            "Unknown user data flags: {:#x}",
            flags
        )));
    }
    let text = if flags & 1 != 0 {
        Some(reader.string()?)
    } else {
        None
    };
    let color = if flags & 2 != 0 {
        let red = reader.byte()?;
        let green = reader.byte()?;
        let blue = reader.byte()?;
        let alpha = reader.byte()?;
        Some(Rgba([red, green, blue, alpha]))
    } else {
        None
    };

    Ok(UserData { text, color })
}
