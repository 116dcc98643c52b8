//! Port I/O request structures and the width-based selection between them.
//!
//! The privileged service accepts two physically distinct request shapes: [`IoRequest32`] for
//! accesses of at most 4 bytes and [`IoRequest64`] for accesses of at most 8 bytes. In both
//! shapes, the transferred value occupies the first `width` bytes of `data`, starting at the
//! lowest address and in the host's native byte order.

use core::{error, fmt, mem::size_of};

use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// The width of a single port I/O access.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum IoWidth {
    /// A 1-byte access.
    Byte = 1,
    /// A 2-byte access.
    Word = 2,
    /// A 4-byte access.
    DoubleWord = 4,
    /// An 8-byte access.
    QuadWord = 8,
}

impl IoWidth {
    /// Returns the [`IoWidth`] that transfers `width` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WidthError`] if `width` is not 1, 2, 4, or 8.
    pub const fn new(width: usize) -> Result<Self, WidthError> {
        let width = match width {
            1 => Self::Byte,
            2 => Self::Word,
            4 => Self::DoubleWord,
            8 => Self::QuadWord,
            width => return Err(WidthError { width }),
        };

        Ok(width)
    }

    /// Returns the number of bytes transferred by an access of this [`IoWidth`].
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Returns `true` if accesses of this [`IoWidth`] use the [`IoRequest32`] shape.
    pub const fn is_narrow(self) -> bool {
        self.bytes() <= size_of::<u32>()
    }
}

/// An access width that the privileged service does not support.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct WidthError {
    /// The rejected width, in bytes.
    pub width: usize,
}

impl fmt::Display for WidthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported I/O access width of {} bytes", self.width)
    }
}

impl error::Error for WidthError {}

/// A value transferred by a single port I/O access.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct IoValue {
    /// The width of the access.
    width: IoWidth,
    /// The transferred bytes. Only the first `width` bytes are meaningful.
    bytes: [u8; 8],
}

impl IoValue {
    /// Returns the [`IoValue`] of `width` holding the low-order bits of `value`.
    #[expect(clippy::cast_possible_truncation)]
    pub const fn new(width: IoWidth, value: u64) -> Self {
        let mut bytes = [0; 8];
        match width {
            IoWidth::Byte => bytes[0] = value as u8,
            IoWidth::Word => {
                let value = (value as u16).to_ne_bytes();
                bytes[0] = value[0];
                bytes[1] = value[1];
            }
            IoWidth::DoubleWord => {
                let value = (value as u32).to_ne_bytes();
                bytes[0] = value[0];
                bytes[1] = value[1];
                bytes[2] = value[2];
                bytes[3] = value[3];
            }
            IoWidth::QuadWord => bytes = value.to_ne_bytes(),
        }

        Self { width, bytes }
    }

    /// Returns the [`IoValue`] holding exactly the bytes in `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`WidthError`] if the length of `bytes` is not a supported [`IoWidth`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WidthError> {
        let width = IoWidth::new(bytes.len())?;

        let mut value = Self {
            width,
            bytes: [0; 8],
        };
        value.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(value)
    }

    /// Returns the width of the access that transferred this [`IoValue`].
    pub const fn width(&self) -> IoWidth {
        self.width
    }

    /// Returns the transferred bytes in the host's native byte order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.width.bytes()]
    }

    /// Returns the transferred bytes interpreted as an integer of the access width.
    pub const fn to_u64(&self) -> u64 {
        let b = self.bytes;
        match self.width {
            IoWidth::Byte => b[0] as u64,
            IoWidth::Word => u16::from_ne_bytes([b[0], b[1]]) as u64,
            IoWidth::DoubleWord => u32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as u64,
            IoWidth::QuadWord => u64::from_ne_bytes(b),
        }
    }
}

/// The request and response shape for accesses of at most 4 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct IoRequest32 {
    /// The port address.
    pub offset: u32,
    /// The access width, in bytes.
    pub width: u32,
    /// The transferred value, in the first `width` bytes.
    pub data: u32,
}

/// The request and response shape for accesses of at most 8 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct IoRequest64 {
    /// The port address.
    pub offset: u64,
    /// The access width, in bytes.
    pub width: u64,
    /// The transferred value, in the first `width` bytes.
    pub data: u64,
}

const_assert_eq!(size_of::<IoRequest32>(), 12);
const_assert_eq!(size_of::<IoRequest64>(), 24);

/// A port I/O request in whichever shape its width requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoRequest {
    /// An access of at most 4 bytes.
    Narrow(IoRequest32),
    /// An access of at most 8 bytes.
    Wide(IoRequest64),
}

impl IoRequest {
    /// Returns the request reading `width` bytes from the port at `offset`.
    pub const fn read(offset: u32, width: IoWidth) -> Self {
        if width.is_narrow() {
            Self::Narrow(IoRequest32 {
                offset,
                width: width as u32,
                data: 0,
            })
        } else {
            Self::Wide(IoRequest64 {
                offset: offset as u64,
                width: width as u64,
                data: 0,
            })
        }
    }

    /// Returns the request writing `value` to the port at `offset`.
    pub fn write(offset: u32, value: &IoValue) -> Self {
        let mut request = Self::read(offset, value.width());
        match &mut request {
            Self::Narrow(request) => {
                let mut data = [0; 4];
                data[..value.width().bytes()].copy_from_slice(value.as_bytes());
                request.data = u32::from_ne_bytes(data);
            }
            Self::Wide(request) => {
                let mut data = [0; 8];
                data[..value.width().bytes()].copy_from_slice(value.as_bytes());
                request.data = u64::from_ne_bytes(data);
            }
        }

        request
    }

    /// Returns the number of bytes the `data` field of this shape can carry.
    pub const fn capacity(&self) -> usize {
        match self {
            Self::Narrow(_) => size_of::<u32>(),
            Self::Wide(_) => size_of::<u64>(),
        }
    }

    /// Extracts the `width` low-order bytes of the `data` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if this shape is not the one selected for `width`.
    pub fn value(&self, width: IoWidth) -> Result<IoValue, DecodeError> {
        let error = DecodeError {
            width: width.bytes(),
            capacity: self.capacity(),
        };

        match self {
            Self::Narrow(response) if width.is_narrow() => {
                IoValue::from_bytes(&response.data.to_ne_bytes()[..width.bytes()])
                    .map_err(|_| error)
            }
            Self::Wide(response) if width == IoWidth::QuadWord => {
                IoValue::from_bytes(&response.data.to_ne_bytes()).map_err(|_| error)
            }
            _ => Err(error),
        }
    }
}

/// A response whose shape cannot carry a value of the requested width.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct DecodeError {
    /// The requested width, in bytes.
    pub width: usize,
    /// The number of bytes the response shape carries.
    pub capacity: usize,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-byte response shape cannot carry a {}-byte value",
            self.capacity, self.width
        )
    }
}

impl error::Error for DecodeError {}
