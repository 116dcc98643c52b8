//! # The DirectHW Call Protocol
//!
//! This crate describes the request/response contract between userspace clients and the
//! privileged DirectHW service.
//!
//! ## General Notes
//!
//! Every operation is a single struct call: the client sends a fixed-size input structure tagged
//! with an [`Opcode`] and the privileged service fills an output structure of the same type. There
//! is no versioning or negotiation, so the layout of every structure in this crate must match the
//! layout the privileged service was compiled with. A mismatch is a silent protocol break.
//!
//! All multi-byte fields are in the host's native byte order.
#![no_std]

use core::{
    fmt,
    ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign},
};

pub mod command;
pub mod io;

pub use command::{CpuIdCommand, MapRequest, MsrCommand, ReadMemCommand};
pub use io::{DecodeError, IoRequest, IoRequest32, IoRequest64, IoValue, IoWidth, WidthError};

/// The name under which the privileged service registers itself.
pub const SERVICE_NAME: &str = "DirectHWService";

/// The high half of the value returned by legacy MSR reads that failed.
pub const INVALID_MSR_HI: u32 = 0x4469_7265;
/// The low half of the value returned by legacy MSR reads that failed.
pub const INVALID_MSR_LO: u32 = 0x6374_4857;

/// The selector identifying an operation of the privileged service.
///
/// The discriminants are part of the wire contract and must never be renumbered.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Opcode {
    /// Read from the I/O port address space.
    ReadIo = 0,
    /// Write to the I/O port address space.
    WriteIo = 1,
    /// Register a physical range to be mapped by the next memory mapping request.
    PrepareMap = 2,
    /// Read a model-specific register.
    ReadMsr = 3,
    /// Write a model-specific register.
    WriteMsr = 4,
    /// Execute CPUID.
    ReadCpuId = 5,
    /// Read a 32-bit word of physical memory.
    ReadMem = 6,
    /// Reserved by the privileged service. Never issued by clients.
    Read = 7,
    /// Reserved by the privileged service. Never issued by clients.
    Write = 8,
}

impl Opcode {
    /// The number of selectors the privileged service exposes.
    pub const COUNT: u32 = 9;

    /// Returns the raw selector value sent over the call interface.
    pub const fn selector(self) -> u32 {
        self as u32
    }

    /// Returns the [`Opcode`] associated with `selector`, if any.
    pub const fn from_selector(selector: u32) -> Option<Self> {
        let opcode = match selector {
            0 => Self::ReadIo,
            1 => Self::WriteIo,
            2 => Self::PrepareMap,
            3 => Self::ReadMsr,
            4 => Self::WriteMsr,
            5 => Self::ReadCpuId,
            6 => Self::ReadMem,
            7 => Self::Read,
            8 => Self::Write,
            _ => return None,
        };

        Some(opcode)
    }
}

/// A status code returned by the platform's call and mapping primitives.
#[repr(transparent)]
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub struct Status(pub i32);

impl Status {
    /// The operation was successful.
    pub const SUCCESS: Self = Self(0);

    /// General error.
    pub const ERROR: Self = Self::io_kit(0x2bc);
    /// The caller is not privileged.
    pub const NOT_PRIVILEGED: Self = Self::io_kit(0x2c1);
    /// An invalid argument was passed to the privileged service.
    pub const BAD_ARGUMENT: Self = Self::io_kit(0x2c2);
    /// The privileged service does not support the request.
    pub const UNSUPPORTED: Self = Self::io_kit(0x2c7);
    /// The device backing the connection is not open.
    pub const NOT_OPEN: Self = Self::io_kit(0x2cd);

    /// Mask of the bits holding the system component of a [`Status`].
    const SYSTEM_MASK: u32 = 0x3f;
    /// Mask of the bits holding the subsystem component of a [`Status`].
    const SUBSYSTEM_MASK: u32 = 0xfff;
    /// Mask of the bits holding the code component of a [`Status`].
    const CODE_MASK: u32 = 0x3fff;

    /// Constructs an IOKit family [`Status`] from its `code` component.
    #[expect(clippy::cast_possible_wrap)]
    const fn io_kit(code: u32) -> Self {
        Self(((0x38 << 26) | code) as i32)
    }

    /// Returns `true` if this [`Status`] reports success.
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    /// Returns the raw bits of this [`Status`].
    #[expect(clippy::cast_sign_loss)]
    pub const fn bits(self) -> u32 {
        self.0 as u32
    }

    /// Returns the system component of this [`Status`].
    pub const fn system(self) -> u32 {
        (self.bits() >> 26) & Self::SYSTEM_MASK
    }

    /// Returns the subsystem component of this [`Status`].
    pub const fn subsystem(self) -> u32 {
        (self.bits() >> 14) & Self::SUBSYSTEM_MASK
    }

    /// Returns the code component of this [`Status`].
    pub const fn code(self) -> u32 {
        self.bits() & Self::CODE_MASK
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SUCCESS => f.pad("SUCCESS"),

            Self::ERROR => f.pad("ERROR"),
            Self::NOT_PRIVILEGED => f.pad("NOT_PRIVILEGED"),
            Self::BAD_ARGUMENT => f.pad("BAD_ARGUMENT"),
            Self::UNSUPPORTED => f.pad("UNSUPPORTED"),
            Self::NOT_OPEN => f.pad("NOT_OPEN"),

            unknown => write!(f, "Status({:#010x})", unknown.bits()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "system {:#x} subsystem {:#x} code {:#x}",
            self.system(),
            self.subsystem(),
            self.code()
        )
    }
}

/// Various flags affecting the placement and caching of a physical memory mapping.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct MapOptions(pub u32);

impl MapOptions {
    /// The mapping may be placed at any virtual address.
    pub const ANYWHERE: Self = Self(0x0000_0001);
    /// The mapping bypasses the processor caches.
    pub const INHIBIT_CACHE: Self = Self(0x0000_0100);

    /// The options used for every physical memory mapping.
    pub const DEFAULT: Self = Self(Self::ANYWHERE.0 | Self::INHIBIT_CACHE.0);

    /// Returns `true` if the flags in `other` are set in `self`.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for MapOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BitOr for MapOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MapOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl BitAnd for MapOptions {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for MapOptions {
    fn bitand_assign(&mut self, rhs: Self) {
        *self = *self & rhs;
    }
}

#[cfg(test)]
mod test {
    use super::{Opcode, Status};

    #[test]
    fn opcode_ordering_is_stable() {
        let expected = [
            (Opcode::ReadIo, 0),
            (Opcode::WriteIo, 1),
            (Opcode::PrepareMap, 2),
            (Opcode::ReadMsr, 3),
            (Opcode::WriteMsr, 4),
            (Opcode::ReadCpuId, 5),
            (Opcode::ReadMem, 6),
            (Opcode::Read, 7),
            (Opcode::Write, 8),
        ];

        for (opcode, selector) in expected {
            assert_eq!(opcode.selector(), selector);
            assert_eq!(Opcode::from_selector(selector), Some(opcode));
        }
        assert_eq!(Opcode::from_selector(Opcode::COUNT), None);
    }

    #[test]
    fn status_decomposition() {
        assert_eq!(Status::BAD_ARGUMENT.bits(), 0xe000_02c2);
        assert_eq!(Status::BAD_ARGUMENT.system(), 0x38);
        assert_eq!(Status::BAD_ARGUMENT.subsystem(), 0);
        assert_eq!(Status::BAD_ARGUMENT.code(), 0x2c2);

        assert_eq!(Status::NOT_OPEN.bits(), 0xe000_02cd);
        assert_eq!(Status::NOT_OPEN.code(), 0x2cd);

        assert!(Status::SUCCESS.is_success());
        assert!(!Status::ERROR.is_success());
    }
}
