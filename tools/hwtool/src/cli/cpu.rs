//! Command line parsing for the MSR, CPUID, and memory read [`Action`]s.

use clap::{Arg, ArgMatches, Command};

use crate::cli::{Action, number};

/// Parses the arguments of `rdmsr`.
pub fn parse_rdmsr(matches: &ArgMatches) -> Action {
    let index = matches
        .get_one::<u32>("msr")
        .copied()
        .unwrap_or_else(|| unreachable!("`msr` is a required argument"));

    Action::ReadMsr { index }
}

/// Parses the arguments of `wrmsr`.
pub fn parse_wrmsr(matches: &ArgMatches) -> Action {
    let index = matches
        .get_one::<u32>("msr")
        .copied()
        .unwrap_or_else(|| unreachable!("`msr` is a required argument"));

    let value = matches
        .get_one::<u64>("value")
        .copied()
        .unwrap_or_else(|| unreachable!("`value` is a required argument"));

    Action::WriteMsr { index, value }
}

/// Parses the arguments of `cpuid`.
pub fn parse_cpuid(matches: &ArgMatches) -> Action {
    let leaf = matches
        .get_one::<u32>("eax")
        .copied()
        .unwrap_or_else(|| unreachable!("`eax` is a required argument"));

    let subleaf = matches
        .get_one::<u32>("ecx")
        .copied()
        .unwrap_or_else(|| unreachable!("`ecx` should have a default value"));

    Action::Cpuid { leaf, subleaf }
}

/// Parses the arguments of `readmem`.
pub fn parse_readmem(matches: &ArgMatches) -> Action {
    let address = matches
        .get_one::<u64>("address")
        .copied()
        .unwrap_or_else(|| unreachable!("`address` is a required argument"));

    Action::ReadMem { address }
}

/// Returns the command parsers for `rdmsr`, `wrmsr`, `cpuid`, and `readmem`.
pub fn subcommand_parsers() -> [Command; 4] {
    let msr = Arg::new("msr").value_parser(number::<u32>).required(true);

    let rdmsr = Command::new("rdmsr")
        .about("Reads a model-specific register")
        .arg(msr.clone());

    let wrmsr = Command::new("wrmsr")
        .about("Writes a model-specific register")
        .arg(msr)
        .arg(Arg::new("value").value_parser(number::<u64>).required(true));

    let cpuid = Command::new("cpuid")
        .about("Executes CPUID")
        .arg(Arg::new("eax").value_parser(number::<u32>).required(true))
        .arg(
            Arg::new("ecx")
                .value_parser(number::<u32>)
                .default_value("0"),
        );

    let readmem = Command::new("readmem")
        .about("Reads a 32-bit word of physical memory")
        .arg(
            Arg::new("address")
                .value_parser(number::<u64>)
                .required(true),
        );

    [rdmsr, wrmsr, cpuid, readmem]
}
