//! The classic port I/O and MSR interface, built on a [`Connection`].
//!
//! These functions follow the conventions of the C interface they replace: port reads return 0
//! and port writes do nothing on failure, MSR reads return [`Msr::INVALID`], and the remaining
//! functions return a non-zero status. Failures are logged but not otherwise reported. Use the
//! methods on [`Connection`] to receive typed errors instead.

use directhw_protocol::{INVALID_MSR_HI, INVALID_MSR_LO, IoValue, IoWidth, MsrCommand};
use log::warn;

use crate::{connection::Connection, platform::Platform};

/// A model-specific register value split into its 32-bit halves.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Msr {
    /// The upper 32 bits.
    pub hi: u32,
    /// The lower 32 bits.
    pub lo: u32,
}

impl Msr {
    /// The value returned by [`Legacy::rdmsr`] when the read failed.
    pub const INVALID: Self = Self {
        hi: INVALID_MSR_HI,
        lo: INVALID_MSR_LO,
    };

    /// Returns the [`Msr`] holding `value`.
    #[expect(clippy::cast_possible_truncation)]
    pub const fn from_u64(value: u64) -> Self {
        Self {
            hi: (value >> 32) as u32,
            lo: value as u32,
        }
    }

    /// Returns the 64-bit register value.
    pub const fn to_u64(self) -> u64 {
        MsrCommand::join(self.hi, self.lo)
    }

    /// Returns `true` if this is the [`Msr::INVALID`] sentinel.
    pub const fn is_invalid(&self) -> bool {
        self.hi == INVALID_MSR_HI && self.lo == INVALID_MSR_LO
    }
}

/// The sentinel-returning view of a [`Connection`].
#[derive(Debug)]
pub struct Legacy<'a, P: Platform> {
    /// The wrapped connection.
    connection: &'a mut Connection<P>,
}

impl<P: Platform> Connection<P> {
    /// Returns the sentinel-returning view of this [`Connection`].
    pub fn legacy(&mut self) -> Legacy<'_, P> {
        Legacy { connection: self }
    }
}

impl<P: Platform> Legacy<'_, P> {
    /// Reads `width` from `port`, returning zero on failure.
    fn read(&mut self, port: u16, width: IoWidth) -> u64 {
        match self.connection.read_io(u32::from(port), width.bytes()) {
            Ok(value) => value.to_u64(),
            Err(error) => {
                warn!("port read {port:#06x} failed: {error}");
                0
            }
        }
    }

    /// Writes the low `width` bytes of `value` to `port`, ignoring failure.
    fn write(&mut self, port: u16, width: IoWidth, value: u64) {
        let value = IoValue::new(width, value);
        if let Err(error) = self.connection.write_io(u32::from(port), value.as_bytes()) {
            warn!("port write {port:#06x} failed: {error}");
        }
    }

    /// Reads a byte from `port`.
    #[expect(clippy::cast_possible_truncation)]
    pub fn inb(&mut self, port: u16) -> u8 {
        self.read(port, IoWidth::Byte) as u8
    }

    /// Reads a word from `port`.
    #[expect(clippy::cast_possible_truncation)]
    pub fn inw(&mut self, port: u16) -> u16 {
        self.read(port, IoWidth::Word) as u16
    }

    /// Reads a doubleword from `port`.
    #[expect(clippy::cast_possible_truncation)]
    pub fn inl(&mut self, port: u16) -> u32 {
        self.read(port, IoWidth::DoubleWord) as u32
    }

    /// Reads a quadword from `port`.
    pub fn inq(&mut self, port: u16) -> u64 {
        self.read(port, IoWidth::QuadWord)
    }

    /// Writes the byte `value` to `port`.
    pub fn outb(&mut self, value: u8, port: u16) {
        self.write(port, IoWidth::Byte, u64::from(value));
    }

    /// Writes the word `value` to `port`.
    pub fn outw(&mut self, value: u16, port: u16) {
        self.write(port, IoWidth::Word, u64::from(value));
    }

    /// Writes the doubleword `value` to `port`.
    pub fn outl(&mut self, value: u32, port: u16) {
        self.write(port, IoWidth::DoubleWord, u64::from(value));
    }

    /// Writes the quadword `value` to `port`.
    pub fn outq(&mut self, value: u64, port: u16) {
        self.write(port, IoWidth::QuadWord, value);
    }

    /// Reads the MSR at `address`, returning [`Msr::INVALID`] on failure.
    pub fn rdmsr(&mut self, address: u32) -> Msr {
        match self.connection.read_msr(address) {
            Ok(value) => Msr::from_u64(value),
            Err(error) => {
                warn!("rdmsr {address:#x} failed: {error}");
                Msr::INVALID
            }
        }
    }

    /// Writes `msr` to the MSR at `address`. Returns 0 on success and 1 on failure.
    pub fn wrmsr(&mut self, address: u32, msr: Msr) -> i32 {
        match self.connection.write_msr(address, msr.to_u64()) {
            Ok(()) => 0,
            Err(error) => {
                warn!("wrmsr {address:#x} failed: {error}");
                1
            }
        }
    }

    /// Executes CPUID with `eax` and `ecx`, storing EAX, EBX, ECX, and EDX in `cpudata`.
    ///
    /// Returns 0 on success and -1 on failure, in which case `cpudata` is left untouched.
    pub fn rdcpuid(&mut self, eax: u32, ecx: u32, cpudata: &mut [u32; 4]) -> i32 {
        match self.connection.read_cpuid(eax, ecx) {
            Ok(cpuid) => {
                *cpudata = cpuid.to_array();
                0
            }
            Err(error) => {
                warn!("cpuid {eax:#x}:{ecx:#x} failed: {error}");
                -1
            }
        }
    }

    /// Reads the 32-bit word of physical memory at `address` into `data`.
    ///
    /// Returns 0 on success and -1 on failure, in which case `data` is left untouched.
    pub fn readmem32(&mut self, address: u64, data: &mut u32) -> i32 {
        match self.connection.read_mem32(address) {
            Ok(value) => {
                *data = value;
                0
            }
            Err(error) => {
                warn!("readmem32 {address:#x} failed: {error}");
                -1
            }
        }
    }

    /// Selects the logical CPU targeted by MSR, CPUID, and memory reads. Returns `cpu`.
    pub fn logical_cpu_select(&mut self, cpu: u32) -> u32 {
        self.connection.select_logical_cpu(cpu)
    }
}
