//! Command line parsing and [`Action::Map`][am] construction.
//!
//! [am]: crate::cli::Action::Map

use clap::{Arg, ArgMatches, Command};

use crate::cli::number;

/// Description of a physical memory range to map and dump.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct MapConfig {
    /// The physical address at the start of the range.
    pub address: u64,
    /// The length of the range, in bytes.
    pub length: u64,
}

/// Parses the arguments required to produce a valid [`MapConfig`].
pub fn parse_arguments(matches: &ArgMatches) -> MapConfig {
    let address = matches
        .get_one::<u64>("address")
        .copied()
        .unwrap_or_else(|| unreachable!("`address` is a required argument"));

    let length = matches
        .get_one::<u64>("length")
        .copied()
        .unwrap_or_else(|| unreachable!("`length` should have a default value"));

    MapConfig { address, length }
}

/// Returns the command parser for an [`Action::Map`][am].
///
/// [am]: crate::cli::Action::Map
pub fn subcommand_parser() -> Command {
    let address = Arg::new("address")
        .value_parser(number::<u64>)
        .required(true);

    let length = Arg::new("length")
        .value_parser(number::<u64>)
        .default_value("0x1000");

    Command::new("map")
        .about("Maps physical memory and dumps its first bytes")
        .arg(address)
        .arg(length)
}
