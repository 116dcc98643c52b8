//! The seam between this crate and the operating system facilities that reach the privileged
//! service.

use std::time::Duration;

use directhw_protocol::{MapOptions, Status};

#[cfg(target_os = "macos")]
pub mod iokit;
#[cfg(test)]
pub(crate) mod mock;

/// Handle to a privileged service located by [`Platform::lookup_service`].
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ServiceId(pub u32);

/// Handle to an open connection to a privileged service.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ConnectionId(pub u32);

/// A virtual memory region produced by [`Platform::map_memory`].
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct MappedMemory {
    /// The virtual address at the start of the region.
    pub address: u64,
    /// The size of the region, in bytes.
    pub size: u64,
}

/// Operating system primitives required to talk to the privileged service.
pub trait Platform {
    /// Returns `true` if the calling process runs with superuser privileges.
    fn is_superuser(&self) -> bool;

    /// Locates the privileged service registered under `name`.
    fn lookup_service(&mut self, name: &str) -> Option<ServiceId>;

    /// Opens a connection to `service`. The [`ServiceId`] is consumed.
    ///
    /// # Errors
    ///
    /// Returns the platform [`Status`] if the connection could not be created.
    fn open_service(&mut self, service: ServiceId) -> Result<ConnectionId, Status>;

    /// Closes `connection`.
    fn close_service(&mut self, connection: ConnectionId);

    /// Sends `input` tagged with `selector` over `connection`, blocking until the privileged
    /// service has filled `output`.
    ///
    /// Returns the number of bytes the privileged service wrote to `output`.
    ///
    /// # Errors
    ///
    /// Returns the platform [`Status`] if the call mechanism reported failure.
    fn call_struct_method(
        &mut self,
        connection: ConnectionId,
        selector: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, Status>;

    /// Maps the memory of type `memory_type` exported by `connection` into the calling process.
    ///
    /// # Errors
    ///
    /// Returns the platform [`Status`] if the mapping could not be created.
    fn map_memory(
        &mut self,
        connection: ConnectionId,
        memory_type: u32,
        options: MapOptions,
    ) -> Result<MappedMemory, Status>;

    /// Blocks the calling thread for `duration`.
    fn settle(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
