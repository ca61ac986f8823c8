/// A named region of the sprite.
///
/// Slice geometry is not interpreted; the chunk payload is kept as written
/// so callers can decode the parts they care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub(crate) frame: u32,
    pub(crate) data: Vec<u8>,
}

impl Slice {
    /// The frame whose chunk list contained this slice.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Raw slice chunk payload, without the chunk envelope.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
