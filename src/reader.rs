use crate::{AsepriteParseError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use std::io::{self, Cursor, Read};

// Upper bound for buffers sized from untrusted length fields. Larger reads
// grow as the data actually arrives.
const MAX_PREALLOC: usize = 1 << 20;

/// Little-endian reader for the primitive types of the file format. Keeps
/// track of the number of bytes consumed so errors can name an offset.
pub(crate) struct AseReader<T: Read> {
    input: T,
    position: u64,
}

impl AseReader<Cursor<&[u8]>> {
    pub(crate) fn new(data: &[u8]) -> AseReader<Cursor<&[u8]>> {
        AseReader::with(Cursor::new(data))
    }

    /// Bytes left in the underlying slice.
    pub(crate) fn remaining(&self) -> usize {
        let len = self.input.get_ref().len() as u64;
        len.saturating_sub(self.input.position()) as usize
    }
}

impl<T> AseReader<T>
where
    T: Read,
{
    pub(crate) fn with(input: T) -> Self {
        Self { input, position: 0 }
    }

    /// Number of bytes consumed so far.
    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn byte(&mut self) -> Result<u8> {
        let v = self.input.read_u8()?;
        self.position += 1;
        Ok(v)
    }

    pub(crate) fn word(&mut self) -> Result<u16> {
        let v = self.input.read_u16::<LittleEndian>()?;
        self.position += 2;
        Ok(v)
    }

    pub(crate) fn short(&mut self) -> Result<i16> {
        let v = self.input.read_i16::<LittleEndian>()?;
        self.position += 2;
        Ok(v)
    }

    pub(crate) fn dword(&mut self) -> Result<u32> {
        let v = self.input.read_u32::<LittleEndian>()?;
        self.position += 4;
        Ok(v)
    }

    pub(crate) fn string(&mut self) -> Result<String> {
        let str_len = self.word()?;
        let mut str_bytes = vec![0_u8; str_len as usize];
        self.read_exact(&mut str_bytes)?;
        let s = String::from_utf8(str_bytes)?;
        Ok(s)
    }

    pub(crate) fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.input.read_exact(buffer)?;
        self.position += buffer.len() as u64;
        Ok(())
    }

    pub(crate) fn skip_reserved(&mut self, count: usize) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.input).take(count as u64), &mut io::sink())?;
        self.position += skipped;
        if skipped != count as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Tried to skip {} bytes, only {} left", count, skipped),
            )
            .into());
        }
        Ok(())
    }

    pub(crate) fn take_bytes(&mut self, limit: usize) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(limit.min(MAX_PREALLOC));
        (&mut self.input).take(limit as u64).read_to_end(&mut output)?;
        self.position += output.len() as u64;
        if output.len() != limit {
            Err(AsepriteParseError::InvalidInput(format!(
                "Invalid data size. Expected: {}, Actual: {}",
                limit,
                output.len()
            )))
        } else {
            Ok(output)
        }
    }

    /// Inflates the rest of the input, which must produce exactly
    /// `expected_output_size` bytes.
    pub(crate) fn unzip(self, expected_output_size: usize) -> Result<Vec<u8>> {
        let decoder = ZlibDecoder::new(self.input);
        let mut buffer = Vec::with_capacity(expected_output_size.min(MAX_PREALLOC));
        decoder
            .take(expected_output_size as u64 + 1)
            .read_to_end(&mut buffer)?;
        if buffer.len() < expected_output_size {
            return Err(AsepriteParseError::InvalidInput(format!(
                "Compressed data too short. Expected: {}, Actual: {}",
                expected_output_size,
                buffer.len()
            )));
        }
        if buffer.len() > expected_output_size {
            return Err(AsepriteParseError::InvalidInput(format!(
                "Compressed data exceeds expected size of {} bytes",
                expected_output_size
            )));
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_and_tracks_position() {
        let data = [0x34, 0x12, 0xfe, 0xff, 0x78, 0x56, 0x34, 0x12, 0x02, 0x00, b'h', b'i'];
        let mut reader = AseReader::new(&data);
        assert_eq!(reader.word().unwrap(), 0x1234);
        assert_eq!(reader.short().unwrap(), -2);
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.dword().unwrap(), 0x1234_5678);
        assert_eq!(reader.string().unwrap(), "hi");
        assert_eq!(reader.position(), 12);
        assert!(reader.byte().is_err());
    }

    #[test]
    fn take_bytes_reports_short_input() {
        let data = [1, 2, 3];
        let mut reader = AseReader::new(&data);
        let err = reader.take_bytes(4).unwrap_err();
        assert!(matches!(err, AsepriteParseError::InvalidInput(_)));
    }

    #[test]
    fn skip_past_end_is_io_error() {
        let data = [1, 2, 3];
        let mut reader = AseReader::new(&data);
        reader.skip_reserved(2).unwrap();
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.remaining(), 1);
        let err = reader.skip_reserved(usize::MAX).unwrap_err();
        assert!(matches!(err, AsepriteParseError::Io(_)));
    }

    #[test]
    fn unzip_checks_inflated_size() {
        use flate2::{write::ZlibEncoder, Compression};
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[7; 8]).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(AseReader::new(&compressed).unzip(8).unwrap(), vec![7; 8]);
        assert!(matches!(
            AseReader::new(&compressed).unzip(4),
            Err(AsepriteParseError::InvalidInput(_))
        ));
        assert!(matches!(
            AseReader::new(&compressed).unzip(usize::MAX - 1),
            Err(AsepriteParseError::InvalidInput(_))
        ));
    }

    #[test]
    fn invalid_utf8_is_invalid_input() {
        let data = [0x02, 0x00, 0xff, 0xfe];
        let mut reader = AseReader::new(&data);
        assert!(matches!(
            reader.string(),
            Err(AsepriteParseError::InvalidInput(_))
        ));
    }
}
