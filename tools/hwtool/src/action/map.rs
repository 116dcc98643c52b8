//! Helper functions to map physical memory and dump its contents.

use std::{fmt::Write, ptr};

use anyhow::{Context, Result};
use directhw::{Connection, Platform};
use log::info;

use crate::cli::map::MapConfig;

/// The most bytes dumped from a mapping.
const DUMP_LIMIT: u64 = 64;

/// The number of bytes shown on each line of a dump.
const BYTES_PER_LINE: usize = 16;

/// Maps the range described by `config` and dumps its first bytes to standard output.
///
/// # Errors
///
/// Returns errors if the range could not be mapped.
pub fn map<P: Platform>(connection: &mut Connection<P>, config: MapConfig) -> Result<()> {
    let mapping = connection
        .map_physical(config.address, config.length)
        .with_context(|| {
            format!(
                "error mapping physical memory {:#x}[{:#x}]",
                config.address, config.length
            )
        })?;
    info!(
        "mapped physical {:#x} at {:#x}",
        mapping.physical_address(),
        mapping.virtual_address()
    );

    let base = mapping.as_mut_ptr();
    anyhow::ensure!(!base.is_null(), "mapping is not addressable");

    let count = dump_length(config.length, mapping.size())?;
    let mut bytes = Vec::with_capacity(count);
    for offset in 0..count {
        let byte = base.wrapping_add(offset);

        // SAFETY:
        // The privileged service mapped at least `mapping.size()` readable bytes at `base`, which
        // stay mapped until the process exits. Device memory requires volatile accesses.
        bytes.push(unsafe { ptr::read_volatile(byte) });
    }

    print!("{}", hexdump(config.address, &bytes));
    connection.unmap_physical(mapping);

    Ok(())
}

/// Returns the number of bytes to dump from a mapping of `size` bytes covering a requested
/// range of `length` bytes.
fn dump_length(length: u64, size: u64) -> Result<usize> {
    let count = length.min(size).min(DUMP_LIMIT);
    usize::try_from(count).context("dump length does not fit in usize")
}

/// Formats `bytes`, which were read starting at `address`, as a hexadecimal dump.
fn hexdump(address: u64, bytes: &[u8]) -> String {
    let mut output = String::new();
    for (index, line) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        let line_address = address.wrapping_add((index * BYTES_PER_LINE) as u64);
        let _ = write!(output, "{line_address:016x}:");
        for byte in line {
            let _ = write!(output, " {byte:02x}");
        }
        output.push('\n');
    }

    output
}
