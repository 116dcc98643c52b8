//! Fixed-layout commands for memory mapping, MSR access, CPUID, and memory reads.

use core::mem::size_of;

use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Registers the physical range that the next memory mapping request maps.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct MapRequest {
    /// The physical address at the start of the range.
    pub addr: u64,
    /// The length of the range, in bytes.
    pub size: u64,
}

/// Reads or writes the model-specific register `index` on the logical processor `core`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct MsrCommand {
    /// The logical processor on which the access is performed.
    pub core: u32,
    /// The address of the model-specific register.
    pub index: u32,
    /// The 64-bit register value.
    pub value: u64,
}

impl MsrCommand {
    /// Returns the upper 32 bits of [`MsrCommand::value`].
    #[expect(clippy::cast_possible_truncation)]
    pub const fn hi(&self) -> u32 {
        (self.value >> 32) as u32
    }

    /// Returns the lower 32 bits of [`MsrCommand::value`].
    #[expect(clippy::cast_possible_truncation)]
    pub const fn lo(&self) -> u32 {
        self.value as u32
    }

    /// Combines `hi` and `lo` into a register value.
    pub const fn join(hi: u32, lo: u32) -> u64 {
        ((hi as u64) << 32) | (lo as u64)
    }
}

/// Executes CPUID with the given inputs on the logical processor `core`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct CpuIdCommand {
    /// The logical processor on which CPUID is executed.
    pub core: u32,
    /// The value of EAX (the leaf).
    pub eax: u32,
    /// The value of ECX (the subleaf).
    pub ecx: u32,
    /// The resulting EAX, EBX, ECX, and EDX, in that order.
    pub cpudata: [u32; 4],
}

/// Reads the 32-bit word of physical memory at `addr` from the logical processor `core`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct ReadMemCommand {
    /// The logical processor which performs the read.
    pub core: u32,
    /// Alignment padding inserted by the privileged service's layout.
    pub _reserved0: u32,
    /// The physical address to read.
    pub addr: u64,
    /// The word that was read.
    pub data: u32,
    /// Trailing padding inserted by the privileged service's layout.
    pub _reserved1: u32,
}

const_assert_eq!(size_of::<MapRequest>(), 16);
const_assert_eq!(size_of::<MsrCommand>(), 16);
const_assert_eq!(size_of::<CpuIdCommand>(), 28);
const_assert_eq!(size_of::<ReadMemCommand>(), 24);

#[cfg(test)]
mod test {
    use core::mem::offset_of;

    use super::{MsrCommand, ReadMemCommand};

    #[test]
    fn msr_halves() {
        let command = MsrCommand {
            core: 0,
            index: 0x1b,
            value: MsrCommand::join(0xdead_beef, 0x0bad_f00d),
        };

        assert_eq!(command.value, 0xdead_beef_0bad_f00d);
        assert_eq!(command.hi(), 0xdead_beef);
        assert_eq!(command.lo(), 0x0bad_f00d);
    }

    #[test]
    fn read_mem_layout_matches_c() {
        assert_eq!(offset_of!(ReadMemCommand, core), 0);
        assert_eq!(offset_of!(ReadMemCommand, addr), 8);
        assert_eq!(offset_of!(ReadMemCommand, data), 16);
    }
}
