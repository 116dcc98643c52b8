//! Implementations of the [`Action`]s.

use anyhow::{Context, Result};
use directhw::{
    Connection, Platform,
    protocol::{IoValue, IoWidth},
};
use log::info;

use crate::cli::{Action, port::WritePortConfig};

pub mod map;

/// Carries out `action` over `connection`, printing any result to standard output.
///
/// # Errors
///
/// Returns errors if the privileged service rejects the request.
pub fn run<P: Platform>(connection: &mut Connection<P>, action: Action) -> Result<()> {
    match action {
        Action::ReadPort(config) => {
            let value = connection
                .read_io(u32::from(config.port), config.width)
                .with_context(|| format!("error reading port {:#x}", config.port))?;
            println!("{}", format_value(&value));
        }
        Action::WritePort(config) => write_port(connection, config)?,
        Action::ReadMsr { index } => {
            let value = connection
                .read_msr(index)
                .with_context(|| format!("error reading MSR {index:#x}"))?;
            println!("{value:#018x}");
        }
        Action::WriteMsr { index, value } => {
            connection
                .write_msr(index, value)
                .with_context(|| format!("error writing MSR {index:#x}"))?;
            info!("wrote {value:#018x} to MSR {index:#x}");
        }
        Action::Cpuid { leaf, subleaf } => {
            let cpuid = connection
                .read_cpuid(leaf, subleaf)
                .with_context(|| format!("error executing CPUID {leaf:#x}.{subleaf:#x}"))?;
            println!(
                "eax={:#010x} ebx={:#010x} ecx={:#010x} edx={:#010x}",
                cpuid.eax, cpuid.ebx, cpuid.ecx, cpuid.edx
            );
        }
        Action::ReadMem { address } => {
            let value = connection
                .read_mem32(address)
                .with_context(|| format!("error reading physical memory at {address:#x}"))?;
            println!("{value:#010x}");
        }
        Action::Map(config) => map::map(connection, config)?,
    }

    Ok(())
}

/// Writes the low `config.width` bytes of `config.value` to `config.port`.
fn write_port<P: Platform>(connection: &mut Connection<P>, config: WritePortConfig) -> Result<()> {
    let width = IoWidth::new(config.width)?;
    let value = IoValue::new(width, config.value);

    connection
        .write_io(u32::from(config.port), value.as_bytes())
        .with_context(|| format!("error writing port {:#x}", config.port))?;
    info!("wrote {} to port {:#x}", format_value(&value), config.port);

    Ok(())
}

/// Formats `value` as hexadecimal, zero padded to its width.
fn format_value(value: &IoValue) -> String {
    let digits = value.width().bytes() * 2;
    format!("{:#0width$x}", value.to_u64(), width = digits + 2)
}

#[cfg(test)]
mod test {
    use directhw::protocol::{IoValue, IoWidth};

    use super::format_value;

    #[test]
    fn values_are_padded_to_their_width() {
        assert_eq!(format_value(&IoValue::new(IoWidth::Byte, 0x7)), "0x07");
        assert_eq!(format_value(&IoValue::new(IoWidth::Word, 0x1ff)), "0x01ff");
        assert_eq!(
            format_value(&IoValue::new(IoWidth::DoubleWord, 0x1234_5678_9abc)),
            "0x56789abc"
        );
        assert_eq!(
            format_value(&IoValue::new(IoWidth::QuadWord, 1)),
            "0x0000000000000001"
        );
    }
}
