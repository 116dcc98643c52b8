//! Command line parsing and [`Config`] construction.

use std::{num::ParseIntError, time::Duration};

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use directhw::{ConnectionConfig, protocol::SERVICE_NAME};

pub mod cpu;
pub mod map;
pub mod port;

/// Everything required to carry out a single invocation of `hwtool`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// How the connection to the privileged service is established.
    pub connection: ConnectionConfig,
    /// The logical CPU targeted by MSR, CPUID, and memory reads.
    pub cpu: u32,
    /// The number of times `-v` was passed.
    pub verbosity: u8,
    /// The action to carry out.
    pub action: Action,
}

/// The action to carry out.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Action {
    /// Read from an I/O port.
    ReadPort(port::ReadPortConfig),
    /// Write to an I/O port.
    WritePort(port::WritePortConfig),
    /// Read a model-specific register.
    ReadMsr {
        /// The register address.
        index: u32,
    },
    /// Write a model-specific register.
    WriteMsr {
        /// The register address.
        index: u32,
        /// The value to write.
        value: u64,
    },
    /// Execute CPUID.
    Cpuid {
        /// The value of EAX.
        leaf: u32,
        /// The value of ECX.
        subleaf: u32,
    },
    /// Read a 32-bit word of physical memory.
    ReadMem {
        /// The physical address to read.
        address: u64,
    },
    /// Map and dump physical memory.
    Map(map::MapConfig),
}

/// Parses `hwtool`'s arguments to construct a [`Config`].
pub fn get_config() -> Config {
    parse_config(&command_parser().get_matches())
}

/// Constructs a [`Config`] from parsed arguments.
fn parse_config(matches: &ArgMatches) -> Config {
    let service_name = matches
        .get_one::<String>("service")
        .cloned()
        .unwrap_or_else(|| unreachable!("`service` should have a default value"));

    let settle_us = matches
        .get_one::<u64>("settle-us")
        .copied()
        .unwrap_or_else(|| unreachable!("`settle-us` should have a default value"));

    let cpu = matches
        .get_one::<u32>("cpu")
        .copied()
        .unwrap_or_else(|| unreachable!("`cpu` should have a default value"));

    let verbosity = matches.get_count("verbose");

    let Some((subcommand_name, subcommand_matches)) = matches.subcommand() else {
        unreachable!("subcommand is required");
    };
    let action = match subcommand_name {
        "inb" | "inw" | "inl" | "inq" => {
            Action::ReadPort(port::parse_read(subcommand_name, subcommand_matches))
        }
        "outb" | "outw" | "outl" | "outq" => {
            Action::WritePort(port::parse_write(subcommand_name, subcommand_matches))
        }
        "rdmsr" => cpu::parse_rdmsr(subcommand_matches),
        "wrmsr" => cpu::parse_wrmsr(subcommand_matches),
        "cpuid" => cpu::parse_cpuid(subcommand_matches),
        "readmem" => cpu::parse_readmem(subcommand_matches),
        "map" => Action::Map(map::parse_arguments(subcommand_matches)),
        _ => unreachable!("unexpected subcommand: {subcommand_name:?}"),
    };

    Config {
        connection: ConnectionConfig {
            service_name,
            map_settle_delay: Duration::from_micros(settle_us),
            ..ConnectionConfig::default()
        },
        cpu,
        verbosity,
        action,
    }
}

/// Returns the command parser for all [`Action`]s.
fn command_parser() -> Command {
    let service = Arg::new("service")
        .long("service")
        .env("DIRECTHW_SERVICE")
        .default_value(SERVICE_NAME)
        .global(true);

    let settle_us = Arg::new("settle-us")
        .long("settle-us")
        .help("Microseconds to wait after mapping physical memory")
        .env("DIRECTHW_SETTLE_US")
        .value_parser(value_parser!(u64).range(1..))
        .default_value("1000")
        .global(true);

    let cpu = Arg::new("cpu")
        .long("cpu")
        .help("Logical CPU targeted by MSR, CPUID, and memory reads")
        .value_parser(number::<u32>)
        .default_value("0")
        .global(true);

    let verbose = Arg::new("verbose")
        .short('v')
        .action(ArgAction::Count)
        .global(true);

    let mut command = Command::new("hwtool")
        .about("Accesses hardware through the DirectHW privileged service")
        .arg(service)
        .arg(settle_us)
        .arg(cpu)
        .arg(verbose)
        .subcommand_required(true)
        .arg_required_else_help(true);

    for subcommand in port::subcommand_parsers()
        .into_iter()
        .chain(cpu::subcommand_parsers())
        .chain([map::subcommand_parser()])
    {
        command = command.subcommand(subcommand);
    }

    command
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn number<T: TryFrom<u64>>(value: &str) -> Result<T, String> {
    let parsed: Result<u64, ParseIntError> = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => value.replace('_', "").parse(),
    };

    let parsed = parsed.map_err(|error| format!("invalid number `{value}`: {error}"))?;
    T::try_from(parsed).map_err(|_| format!("`{value}` is out of range"))
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{Action, command_parser, number, parse_config, port::ReadPortConfig};

    fn parse(args: &[&str]) -> super::Config {
        let matches = command_parser()
            .try_get_matches_from(args)
            .expect("arguments should parse");
        parse_config(&matches)
    }

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(number::<u16>("0xcf8"), Ok(0xcf8));
        assert_eq!(number::<u32>("0X1B"), Ok(0x1b));
        assert_eq!(number::<u64>("0xffff_ffff_ffff_ffff"), Ok(u64::MAX));
        assert_eq!(number::<u8>("255"), Ok(255));
        assert!(number::<u8>("256").is_err());
        assert!(number::<u32>("0xg").is_err());
    }

    #[test]
    fn global_options() {
        let config = parse(&[
            "hwtool",
            "--cpu",
            "3",
            "--service",
            "TestService",
            "--settle-us",
            "2500",
            "-vv",
            "inb",
            "0x80",
        ]);

        assert_eq!(config.cpu, 3);
        assert_eq!(config.verbosity, 2);
        assert_eq!(config.connection.service_name, "TestService");
        assert_eq!(
            config.connection.map_settle_delay,
            Duration::from_micros(2500)
        );
        assert_eq!(
            config.action,
            Action::ReadPort(ReadPortConfig {
                port: 0x80,
                width: 1
            })
        );
    }

    #[test]
    fn zero_settle_delay_is_rejected() {
        assert!(
            command_parser()
                .try_get_matches_from(["hwtool", "--settle-us", "0", "inb", "0x80"])
                .is_err()
        );
    }

    #[test]
    fn cpu_subcommands() {
        assert_eq!(
            parse(&["hwtool", "wrmsr", "0x1a0", "0x850089"]).action,
            Action::WriteMsr {
                index: 0x1a0,
                value: 0x85_0089
            }
        );
        assert_eq!(
            parse(&["hwtool", "cpuid", "7"]).action,
            Action::Cpuid {
                leaf: 7,
                subleaf: 0
            }
        );
        assert_eq!(
            parse(&["hwtool", "readmem", "0xfed40000"]).action,
            Action::ReadMem {
                address: 0xfed4_0000
            }
        );
    }
}
