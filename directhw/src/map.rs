//! Mapping physical memory into the calling process.
//!
//! Mapping is a two-phase protocol: [`Opcode::PrepareMap`] registers the physical range with the
//! privileged service, then the platform's memory mapping primitive maps the registered range
//! into this process.
//!
//! Mappings are never torn down. The privileged service offers no unmapping operation, so
//! [`Connection::unmap_physical`] leaves the mapping in place until the process exits.

use core::{error, fmt, ptr};

use directhw_protocol::{MapRequest, Opcode, Status};
use log::{debug, error, warn};

use crate::{
    connection::{Connection, DEFAULT_MAP_SETTLE_DELAY},
    platform::Platform,
};

/// A physical memory range mapped into the calling process.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct PhysicalMapping {
    /// The physical address that was requested.
    physical_address: u64,
    /// The length that was requested, in bytes.
    length: u64,
    /// The virtual address at which the range is mapped.
    virtual_address: u64,
    /// The size of the virtual region, in bytes.
    size: u64,
}

impl PhysicalMapping {
    /// Returns the physical address at the start of the mapped range.
    pub const fn physical_address(&self) -> u64 {
        self.physical_address
    }

    /// Returns the requested length of the mapped range, in bytes.
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// Returns the virtual address at which the range is mapped.
    pub const fn virtual_address(&self) -> u64 {
        self.virtual_address
    }

    /// Returns the size of the virtual region reported by the platform, in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns a pointer to the start of the mapping.
    ///
    /// Returns a null pointer if the virtual address does not fit in a pointer.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        usize::try_from(self.virtual_address)
            .map_or(ptr::null_mut(), ptr::with_exposed_provenance_mut)
    }
}

impl<P: Platform> Connection<P> {
    /// Maps `length` bytes of physical memory starting at `physical_address` into the calling
    /// process.
    ///
    /// The returned mapping is uncached and placed at an address of the platform's choosing.
    ///
    /// # Errors
    ///
    /// Returns [`MapError`] if either the registration of the physical range or the mapping
    /// itself failed. The platform's mapping primitive is not invoked if registration failed.
    pub fn map_physical(
        &mut self,
        physical_address: u64,
        length: u64,
    ) -> Result<PhysicalMapping, MapError> {
        debug!("map_physical: physical {physical_address:#018x}[{length:#x}]");

        let request = MapRequest {
            addr: physical_address,
            size: length,
        };
        if let Err(error) = self.call(Opcode::PrepareMap, &request) {
            let error = MapError::new(MapPhase::Prepare, error.status());
            log_map_error(&error, physical_address, length);
            return Err(error);
        }

        let memory = match self.platform.map_memory(
            self.id,
            self.config.map_memory_type,
            self.config.map_options,
        ) {
            Ok(memory) => memory,
            Err(status) => {
                let error = MapError::new(MapPhase::Map, Some(status));
                log_map_error(&error, physical_address, length);
                return Err(error);
            }
        };

        // The mapping is not usable as soon as the platform call returns.
        let mut delay = self.config.map_settle_delay;
        if delay.is_zero() {
            warn!("map settle delay must not be zero, using {DEFAULT_MAP_SETTLE_DELAY:?}");
            delay = DEFAULT_MAP_SETTLE_DELAY;
        }
        self.platform.settle(delay);

        debug!(
            "map_physical: virtual {:#018x}[{:#x}]",
            memory.address, memory.size
        );
        Ok(PhysicalMapping {
            physical_address,
            length,
            virtual_address: memory.address,
            size: memory.size,
        })
    }

    /// Releases `mapping`.
    ///
    /// This does nothing: the privileged service cannot tear mappings down, so the mapped
    /// region stays valid until the process exits.
    pub fn unmap_physical(&mut self, mapping: PhysicalMapping) {
        debug!(
            "unmap_physical: leaving {:#018x}[{:#x}] mapped",
            mapping.virtual_address, mapping.size
        );
    }
}

/// Reports `error` for the range described by `physical_address` and `length`.
fn log_map_error(error: &MapError, physical_address: u64, length: u64) {
    match error.status {
        Some(status) => error!(
            "{} failed: {status} physical {physical_address:#018x}[{length:#x}]",
            error.phase
        ),
        None => error!(
            "{} failed: physical {physical_address:#018x}[{length:#x}]",
            error.phase
        ),
    }
}

/// The phase of [`Connection::map_physical`] that failed.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum MapPhase {
    /// Registering the physical range with the privileged service.
    Prepare,
    /// Mapping the registered range into the calling process.
    Map,
}

impl fmt::Display for MapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare => f.pad("PrepareMap"),
            Self::Map => f.pad("memory mapping"),
        }
    }
}

/// The classification of a [`MapError`].
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum MapErrorKind {
    /// The privileged service rejected the physical range.
    InvalidArgument,
    /// The device backing the connection is not open.
    DeviceUnavailable,
    /// Any other failure.
    MapFailed,
}

impl MapErrorKind {
    /// Classifies `status` by its code component.
    pub const fn classify(status: Status) -> Self {
        let code = status.code();
        if code == Status::BAD_ARGUMENT.code() {
            Self::InvalidArgument
        } else if code == Status::NOT_OPEN.code() {
            Self::DeviceUnavailable
        } else {
            Self::MapFailed
        }
    }
}

/// Failure to map physical memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapError {
    /// The phase that failed.
    pub phase: MapPhase,
    /// The classification of the failure.
    pub kind: MapErrorKind,
    /// The [`Status`] reported by the platform, if any.
    pub status: Option<Status>,
}

impl MapError {
    /// Returns the [`MapError`] for a failure in `phase` that reported `status`.
    pub const fn new(phase: MapPhase, status: Option<Status>) -> Self {
        let kind = match status {
            Some(status) => MapErrorKind::classify(status),
            None => MapErrorKind::MapFailed,
        };

        Self {
            phase,
            kind,
            status,
        }
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.kind {
            MapErrorKind::InvalidArgument => "invalid argument",
            MapErrorKind::DeviceUnavailable => "device not open",
            MapErrorKind::MapFailed => "mapping failed",
        };

        match self.status {
            Some(status) => write!(f, "{} failed ({reason}): {status}", self.phase),
            None => write!(f, "{} failed ({reason})", self.phase),
        }
    }
}

impl error::Error for MapError {}
