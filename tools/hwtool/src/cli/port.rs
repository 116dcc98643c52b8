//! Command line parsing for the port I/O [`Action`][a]s.
//!
//! [a]: crate::cli::Action

use clap::{Arg, ArgMatches, Command};

use crate::cli::number;

/// The port I/O subcommands and the width, in bytes, each accesses.
const WIDTHS: [(&str, &str, usize); 4] = [
    ("inb", "outb", 1),
    ("inw", "outw", 2),
    ("inl", "outl", 4),
    ("inq", "outq", 8),
];

/// Description of a single port read.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ReadPortConfig {
    /// The port to read.
    pub port: u16,
    /// The access width, in bytes.
    pub width: usize,
}

/// Description of a single port write.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct WritePortConfig {
    /// The port to write.
    pub port: u16,
    /// The access width, in bytes.
    pub width: usize,
    /// The value to write. Only the low `width` bytes are written.
    pub value: u64,
}

/// Returns the access width of the subcommand `name`.
fn width_of(name: &str) -> usize {
    WIDTHS
        .iter()
        .find(|(read, write, _)| *read == name || *write == name)
        .map(|(_, _, width)| *width)
        .unwrap_or_else(|| unreachable!("unexpected port subcommand: {name:?}"))
}

/// Parses the arguments of the read subcommand `name`.
pub fn parse_read(name: &str, matches: &ArgMatches) -> ReadPortConfig {
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .unwrap_or_else(|| unreachable!("`port` is a required argument"));

    ReadPortConfig {
        port,
        width: width_of(name),
    }
}

/// Parses the arguments of the write subcommand `name`.
pub fn parse_write(name: &str, matches: &ArgMatches) -> WritePortConfig {
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .unwrap_or_else(|| unreachable!("`port` is a required argument"));

    let value = matches
        .get_one::<u64>("value")
        .copied()
        .unwrap_or_else(|| unreachable!("`value` is a required argument"));

    WritePortConfig {
        port,
        width: width_of(name),
        value,
    }
}

/// Returns the command parsers for every port I/O subcommand.
pub fn subcommand_parsers() -> Vec<Command> {
    let port = Arg::new("port").value_parser(number::<u16>).required(true);
    let value = Arg::new("value").value_parser(number::<u64>).required(true);

    let mut commands = Vec::new();
    for (read, write, width) in WIDTHS {
        commands.push(
            Command::new(read)
                .about(format!("Reads {width} byte(s) from an I/O port"))
                .arg(port.clone()),
        );
        commands.push(
            Command::new(write)
                .about(format!("Writes {width} byte(s) to an I/O port"))
                .arg(port.clone())
                .arg(value.clone()),
        );
    }

    commands
}

#[cfg(test)]
mod test {
    use clap::Command;

    use super::{WritePortConfig, parse_write, subcommand_parsers};

    #[test]
    fn write_takes_port_then_value() {
        let command = Command::new("hwtool").subcommands(subcommand_parsers());
        let matches = command
            .try_get_matches_from(["hwtool", "outw", "0x1f0", "0xbeef"])
            .unwrap();
        let (name, matches) = matches.subcommand().unwrap();

        assert_eq!(
            parse_write(name, matches),
            WritePortConfig {
                port: 0x1f0,
                width: 2,
                value: 0xbeef
            }
        );
    }

    #[test]
    fn port_must_fit_in_sixteen_bits() {
        let command = Command::new("hwtool").subcommands(subcommand_parsers());
        assert!(
            command
                .try_get_matches_from(["hwtool", "inb", "0x10000"])
                .is_err()
        );
    }
}
