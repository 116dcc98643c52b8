//! Process-wide connection and free functions mirroring the classic C interface.
//!
//! [`iopl`] connects once per process and arranges for the connection to be closed when the
//! process exits. The remaining functions operate on that connection and behave like their
//! [`Legacy`] counterparts; before [`iopl`] succeeds, they fail in the same way a failed call
//! would.
//!
//! The logical CPU selector is process-wide state of its own. A CPU selected before [`iopl`]
//! is applied to the connection once it is established. Selecting a CPU and then issuing an
//! operation is not atomic, so callers on multiple threads must serialize such sequences.

use directhw_protocol::Status;
use log::warn;

use crate::{
    compat::Legacy,
    connection::{ConnectError, Connection},
    map::{MapError, MapPhase, PhysicalMapping},
    platform::Platform,
};

/// The state behind the process-wide interface.
#[derive(Debug)]
pub(crate) struct Global<P: Platform> {
    /// The connection established by [`Global::iopl`], if any.
    connection: Option<Connection<P>>,
    /// The selected logical CPU. Survives reconnection.
    logical_cpu: u32,
    /// Whether the process-exit hook has been registered.
    exit_hook_registered: bool,
}

impl<P: Platform> Global<P> {
    /// Returns a disconnected [`Global`] targeting logical CPU 0.
    pub(crate) const fn new() -> Self {
        Self {
            connection: None,
            logical_cpu: 0,
            exit_hook_registered: false,
        }
    }

    /// Connects using the platform returned by `platform` unless already connected.
    ///
    /// `register_exit_hook` is invoked after the first successful connection only.
    pub(crate) fn iopl(
        &mut self,
        platform: impl FnOnce() -> P,
        register_exit_hook: impl FnOnce(),
    ) -> Result<(), ConnectError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let mut connection = Connection::connect(platform())?;
        connection.select_logical_cpu(self.logical_cpu);
        self.connection = Some(connection);

        if !self.exit_hook_registered {
            self.exit_hook_registered = true;
            register_exit_hook();
        }

        Ok(())
    }

    /// Closes the connection, if any. The selected logical CPU is kept.
    pub(crate) fn disconnect(&mut self) {
        drop(self.connection.take());
    }

    /// Runs `f` on the [`Legacy`] view of the connection, or returns `default` if there is
    /// none.
    pub(crate) fn with_legacy<R>(
        &mut self,
        default: R,
        f: impl FnOnce(&mut Legacy<'_, P>) -> R,
    ) -> R {
        match self.connection.as_mut() {
            Some(connection) => f(&mut connection.legacy()),
            None => {
                warn!("DirectHW is not connected; call `iopl` first");
                default
            }
        }
    }

    /// Selects the logical CPU targeted by MSR, CPUID, and memory reads. Returns `cpu`.
    pub(crate) fn select_logical_cpu(&mut self, cpu: u32) -> u32 {
        self.logical_cpu = cpu;
        if let Some(connection) = self.connection.as_mut() {
            connection.select_logical_cpu(cpu);
        }

        cpu
    }

    /// Maps physical memory, failing as if the device were not open when disconnected.
    pub(crate) fn map_physical(
        &mut self,
        physical_address: u64,
        length: u64,
    ) -> Result<PhysicalMapping, MapError> {
        match self.connection.as_mut() {
            Some(connection) => connection.map_physical(physical_address, length),
            None => Err(MapError::new(MapPhase::Prepare, Some(Status::NOT_OPEN))),
        }
    }

    /// Releases `mapping`, which leaves it in place.
    pub(crate) fn unmap_physical(&mut self, mapping: PhysicalMapping) {
        if let Some(connection) = self.connection.as_mut() {
            connection.unmap_physical(mapping);
        }
    }
}

#[cfg(target_os = "macos")]
pub use self::process::*;

/// The process-wide [`Global`] reaching the privileged service through IOKit.
#[cfg(target_os = "macos")]
mod process {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use log::warn;

    use super::Global;
    use crate::{
        compat::Msr,
        connection::ConnectError,
        map::{MapError, PhysicalMapping},
        platform::iokit::IoKit,
    };

    /// The process-wide state.
    static GLOBAL: Mutex<Global<IoKit>> = Mutex::new(Global::new());

    /// Locks [`GLOBAL`], ignoring poisoning.
    fn lock() -> MutexGuard<'static, Global<IoKit>> {
        GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Closes the process-wide connection.
    extern "C" fn disconnect_at_exit() {
        lock().disconnect();
    }

    /// Registers [`disconnect_at_exit`] with the C runtime.
    fn register_exit_hook() {
        // SAFETY:
        //
        // `disconnect_at_exit` is a valid `extern "C"` function for the life of the process.
        let result = unsafe { libc::atexit(disconnect_at_exit) };
        if result != 0 {
            warn!("could not register DirectHW exit handler");
        }
    }

    /// Connects to the privileged service. `level` is ignored.
    ///
    /// Calling this while already connected does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] if the connection could not be established.
    pub fn iopl(level: i32) -> Result<(), ConnectError> {
        let _ = level;

        lock().iopl(IoKit::new, register_exit_hook)
    }

    /// Reads a byte from `port`.
    pub fn inb(port: u16) -> u8 {
        lock().with_legacy(0, |legacy| legacy.inb(port))
    }

    /// Reads a word from `port`.
    pub fn inw(port: u16) -> u16 {
        lock().with_legacy(0, |legacy| legacy.inw(port))
    }

    /// Reads a doubleword from `port`.
    pub fn inl(port: u16) -> u32 {
        lock().with_legacy(0, |legacy| legacy.inl(port))
    }

    /// Reads a quadword from `port`.
    pub fn inq(port: u16) -> u64 {
        lock().with_legacy(0, |legacy| legacy.inq(port))
    }

    /// Writes the byte `value` to `port`.
    pub fn outb(value: u8, port: u16) {
        lock().with_legacy((), |legacy| legacy.outb(value, port));
    }

    /// Writes the word `value` to `port`.
    pub fn outw(value: u16, port: u16) {
        lock().with_legacy((), |legacy| legacy.outw(value, port));
    }

    /// Writes the doubleword `value` to `port`.
    pub fn outl(value: u32, port: u16) {
        lock().with_legacy((), |legacy| legacy.outl(value, port));
    }

    /// Writes the quadword `value` to `port`.
    pub fn outq(value: u64, port: u16) {
        lock().with_legacy((), |legacy| legacy.outq(value, port));
    }

    /// Reads the MSR at `address`, returning [`Msr::INVALID`] on failure.
    pub fn rdmsr(address: u32) -> Msr {
        lock().with_legacy(Msr::INVALID, |legacy| legacy.rdmsr(address))
    }

    /// Writes `msr` to the MSR at `address`. Returns 0 on success and 1 on failure.
    pub fn wrmsr(address: u32, msr: Msr) -> i32 {
        lock().with_legacy(1, |legacy| legacy.wrmsr(address, msr))
    }

    /// Executes CPUID with `eax` and `ecx`. Returns 0 on success and -1 on failure.
    pub fn rdcpuid(eax: u32, ecx: u32, cpudata: &mut [u32; 4]) -> i32 {
        lock().with_legacy(-1, |legacy| legacy.rdcpuid(eax, ecx, cpudata))
    }

    /// Reads the 32-bit word of physical memory at `address`. Returns 0 on success and -1 on
    /// failure.
    pub fn readmem32(address: u64, data: &mut u32) -> i32 {
        lock().with_legacy(-1, |legacy| legacy.readmem32(address, data))
    }

    /// Selects the logical CPU targeted by MSR, CPUID, and memory reads. Returns `cpu`.
    ///
    /// The selection applies to connections established later by [`iopl`] as well.
    pub fn logical_cpu_select(cpu: u32) -> u32 {
        lock().select_logical_cpu(cpu)
    }

    /// Maps `length` bytes of physical memory starting at `physical_address`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError`] if the mapping failed or [`iopl`] has not succeeded.
    pub fn map_physical(
        physical_address: u64,
        length: u64,
    ) -> Result<PhysicalMapping, MapError> {
        lock().map_physical(physical_address, length)
    }

    /// Releases `mapping`. This does nothing; see
    /// [`Connection::unmap_physical`][crate::Connection::unmap_physical].
    pub fn unmap_physical(mapping: PhysicalMapping) {
        lock().unmap_physical(mapping);
    }
}
