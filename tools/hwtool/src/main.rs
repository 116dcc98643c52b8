//! Command line access to port I/O, model-specific registers, CPUID, and physical memory through
//! the DirectHW privileged service.

use anyhow::Result;

use crate::cli::Config;

pub mod action;
pub mod cli;
pub mod logger;

fn main() -> Result<()> {
    let config = cli::get_config();
    logger::init(config.verbosity);

    execute(config)
}

/// Connects to the privileged service and carries out the requested [`Action`][a].
///
/// [a]: crate::cli::Action
#[cfg(target_os = "macos")]
fn execute(config: Config) -> Result<()> {
    use anyhow::Context;
    use directhw::{Connection, platform::iokit::IoKit};

    let mut connection = Connection::connect_with(IoKit::new(), config.connection)
        .context("error connecting to DirectHW")?;
    connection.select_logical_cpu(config.cpu);

    action::run(&mut connection, config.action)
}

/// Reports that no privileged service is reachable on this platform.
#[cfg(not(target_os = "macos"))]
fn execute(config: Config) -> Result<()> {
    let _ = config;

    anyhow::bail!("DirectHW has no privileged service backend on this platform")
}
