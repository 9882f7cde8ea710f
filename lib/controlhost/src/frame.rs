use bytes::BufMut;
use snafu::Snafu;

use crate::tag::{Tag, TAG_LEN};

/// Length of an encoded frame header, in bytes.
///
/// The header is laid out as the 8-byte tag, the payload size as a 4-byte big-endian signed integer, and 4 reserved
/// bytes which are written as zero and ignored when read.
pub const PREFIX_LEN: usize = 16;

const SIZE_OFFSET: usize = TAG_LEN;
const RESERVED_LEN: usize = PREFIX_LEN - TAG_LEN - 4;

/// Framing error.
#[derive(Debug, Snafu, Eq, PartialEq)]
#[snafu(context(suffix(false)))]
pub enum FramingError {
    /// The header declared a negative payload size.
    #[snafu(display("header for tag '{}' declares negative payload size {}", tag, size))]
    NegativeSize {
        /// Tag of the frame.
        tag: Tag,

        /// Declared size.
        size: i32,
    },

    /// The payload is too large to be described by a frame header.
    #[snafu(display("payload size {} exceeds the maximum frame size of {} bytes", size, i32::MAX))]
    Oversized {
        /// Payload size.
        size: usize,
    },

    /// The declared size does not match the number of payload bytes given.
    #[snafu(display("declared payload size {} does not match buffer length {}", declared, actual))]
    SizeMismatch {
        /// Declared payload size.
        declared: usize,

        /// Actual buffer length.
        actual: usize,
    },
}

/// A frame header.
///
/// Every frame on the wire is a header followed by exactly `size` bytes of payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    tag: Tag,
    size: usize,
}

impl FrameHeader {
    /// Creates a new `FrameHeader`.
    ///
    /// # Errors
    ///
    /// If `size` cannot be represented in a header, an error is returned.
    pub fn new(tag: Tag, size: usize) -> Result<Self, FramingError> {
        if i32::try_from(size).is_err() {
            return Err(FramingError::Oversized { size });
        }

        Ok(Self { tag, size })
    }

    /// Returns the tag of the frame.
    pub const fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Returns the payload size of the frame, in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Decodes a header from its wire representation.
    ///
    /// # Errors
    ///
    /// If the header declares a negative payload size, an error is returned.
    pub fn decode(raw: &[u8; PREFIX_LEN]) -> Result<Self, FramingError> {
        let mut tag = [0; TAG_LEN];
        tag.copy_from_slice(&raw[..TAG_LEN]);
        let tag = Tag::from_wire(tag);

        let mut size = [0; 4];
        size.copy_from_slice(&raw[SIZE_OFFSET..SIZE_OFFSET + 4]);
        let size = i32::from_be_bytes(size);

        match usize::try_from(size) {
            Ok(size) => Ok(Self { tag, size }),
            Err(_) => Err(FramingError::NegativeSize { tag, size }),
        }
    }

    /// Encodes this header into the given buffer.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(self.tag.as_wire());
        // `new` guarantees the size fits.
        buf.put_i32(self.size as i32);
        buf.put_bytes(0, RESERVED_LEN);
    }
}
