//! Userspace client for the DirectHW privileged hardware-access service.
//!
//! The privileged service performs port I/O, physical memory mapping, model-specific register
//! accesses, and CPUID on behalf of userspace. This crate frames requests for it, dispatches them
//! through a [`Platform`], and decodes the results.
//!
//! All state lives in a [`Connection`], which is established once and passed by reference to
//! every operation:
//!
//! ```no_run
//! # #[cfg(target_os = "macos")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use directhw::{Connection, platform::iokit::IoKit};
//!
//! let mut connection = Connection::connect(IoKit::new())?;
//! connection.select_logical_cpu(1);
//! let apic_base = connection.read_msr(0x1b)?;
//! # let _ = apic_base;
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "macos"))]
//! # fn main() {}
//! ```
//!
//! Every operation blocks until the privileged service replies. There are no retries, timeouts,
//! or internal locking; callers sharing a [`Connection`] between threads must serialize access
//! themselves.

pub mod compat;
pub mod connection;
pub mod cpu;
#[cfg(any(target_os = "macos", test))]
pub mod global;
pub mod map;
pub mod platform;
pub mod port_io;

pub use directhw_protocol as protocol;

pub use compat::{Legacy, Msr};
pub use connection::{
    ConnectError, Connection, ConnectionConfig, DEFAULT_MAP_SETTLE_DELAY, TransportError,
};
pub use cpu::Cpuid;
pub use map::{MapError, MapErrorKind, MapPhase, PhysicalMapping};
pub use platform::Platform;
pub use port_io::PortIoError;
