//! The [`Connection`] to the privileged service and the struct call dispatcher.

use core::{error, fmt, mem::size_of};
use std::time::Duration;

use directhw_protocol::{MapOptions, Opcode, SERVICE_NAME, Status};
use log::{debug, error};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::platform::{ConnectionId, Platform};

/// The time [`Connection::map_physical`] waits for a new mapping to become usable unless
/// configured otherwise.
pub const DEFAULT_MAP_SETTLE_DELAY: Duration = Duration::from_millis(1);

/// Tunable parameters of a [`Connection`].
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// The name under which the privileged service is registered.
    pub service_name: String,
    /// The time to wait after a physical memory mapping was created before handing it out.
    ///
    /// The mapping call returns before the mapping is usable, and touching the mapping early
    /// crashes the caller. The root cause is unknown, so this value is not guaranteed to be
    /// sufficient on every platform. A zero delay is replaced with [`DEFAULT_MAP_SETTLE_DELAY`].
    pub map_settle_delay: Duration,
    /// The memory type requested from the privileged service when mapping.
    pub map_memory_type: u32,
    /// The placement and caching of physical memory mappings.
    pub map_options: MapOptions,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            service_name: String::from(SERVICE_NAME),
            map_settle_delay: DEFAULT_MAP_SETTLE_DELAY,
            map_memory_type: 0,
            map_options: MapOptions::DEFAULT,
        }
    }
}

/// An open connection to the privileged service.
///
/// A [`Connection`] owns the platform handle and the logical CPU selector. The connection is
/// closed exactly once, when the [`Connection`] is dropped or [`Connection::disconnect`] is
/// called.
#[derive(Debug)]
pub struct Connection<P: Platform> {
    /// The primitives used to reach the privileged service.
    pub(crate) platform: P,
    /// The open connection.
    pub(crate) id: ConnectionId,
    /// Parameters of this connection.
    pub(crate) config: ConnectionConfig,
    /// The logical CPU targeted by MSR, CPUID, and memory read operations.
    logical_cpu: u32,
}

impl<P: Platform> Connection<P> {
    /// Connects to the privileged service using the default [`ConnectionConfig`].
    ///
    /// # Errors
    ///
    /// - [`ConnectError::PermissionDenied`]: Returned if the process is not privileged. The
    ///   service is not contacted in this case.
    /// - [`ConnectError::ServiceUnavailable`]: Returned if the service could not be found or
    ///   opened.
    pub fn connect(platform: P) -> Result<Self, ConnectError> {
        Self::connect_with(platform, ConnectionConfig::default())
    }

    /// Connects to the privileged service as described by `config`.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::PermissionDenied`]: Returned if the process is not privileged. The
    ///   service is not contacted in this case.
    /// - [`ConnectError::ServiceUnavailable`]: Returned if the service could not be found or
    ///   opened.
    pub fn connect_with(mut platform: P, config: ConnectionConfig) -> Result<Self, ConnectError> {
        // The privileged service enforces its own access control. This check only produces a
        // clearer error.
        if !platform.is_superuser() {
            return Err(ConnectError::PermissionDenied);
        }

        let Some(service) = platform.lookup_service(&config.service_name) else {
            error!("privileged service `{}` is not loaded", config.service_name);
            return Err(ConnectError::ServiceUnavailable {
                service_name: config.service_name,
                status: None,
            });
        };

        let id = match platform.open_service(service) {
            Ok(id) => id,
            Err(status) => {
                error!(
                    "could not open privileged service `{}`: {status}",
                    config.service_name
                );
                return Err(ConnectError::ServiceUnavailable {
                    service_name: config.service_name,
                    status: Some(status),
                });
            }
        };

        debug!("connected to `{}` as {id:?}", config.service_name);
        Ok(Self {
            platform,
            id,
            config,
            logical_cpu: 0,
        })
    }

    /// Closes the connection.
    pub fn disconnect(self) {
        drop(self);
    }

    /// Returns the [`ConnectionConfig`] this [`Connection`] was created with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Selects the logical CPU targeted by subsequent MSR, CPUID, and memory read operations.
    ///
    /// Returns the newly selected logical CPU.
    pub fn select_logical_cpu(&mut self, cpu: u32) -> u32 {
        self.logical_cpu = cpu;
        self.logical_cpu
    }

    /// Returns the currently selected logical CPU.
    pub fn logical_cpu(&self) -> u32 {
        self.logical_cpu
    }

    /// Sends `input` to the privileged service as an `opcode` request and returns the response.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Failed`]: Returned if the call mechanism reported failure.
    /// - [`TransportError::ShortResponse`]: Returned if the privileged service wrote fewer bytes
    ///   than the response structure holds.
    pub fn call<T>(&mut self, opcode: Opcode, input: &T) -> Result<T, TransportError>
    where
        T: IntoBytes + FromBytes + Immutable + KnownLayout,
    {
        let mut output = T::new_zeroed();

        debug!("call {opcode:?} on logical cpu {}", self.logical_cpu);
        let written = self
            .platform
            .call_struct_method(
                self.id,
                opcode.selector(),
                input.as_bytes(),
                output.as_mut_bytes(),
            )
            .map_err(|status| TransportError::Failed { opcode, status })?;

        if written < size_of::<T>() {
            return Err(TransportError::ShortResponse {
                opcode,
                expected: size_of::<T>(),
                actual: written,
            });
        }

        Ok(output)
    }
}

impl<P: Platform> Drop for Connection<P> {
    fn drop(&mut self) {
        debug!("disconnecting {:?}", self.id);
        self.platform.close_service(self.id);
    }
}

/// Various errors that can occur while connecting to the privileged service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectError {
    /// The calling process is not running with superuser privileges.
    PermissionDenied,
    /// The privileged service is not present or could not be opened.
    ServiceUnavailable {
        /// The name of the privileged service.
        service_name: String,
        /// The [`Status`] returned when opening the service, if it was found.
        status: Option<Status>,
    },
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => f.pad("superuser privileges are required"),
            Self::ServiceUnavailable {
                service_name,
                status: None,
            } => write!(f, "privileged service `{service_name}` is not loaded"),
            Self::ServiceUnavailable {
                service_name,
                status: Some(status),
            } => write!(
                f,
                "could not open privileged service `{service_name}`: {status}"
            ),
        }
    }
}

impl error::Error for ConnectError {}

/// Various errors that can occur while dispatching a call to the privileged service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The call mechanism reported failure.
    Failed {
        /// The [`Opcode`] of the failed call.
        opcode: Opcode,
        /// The [`Status`] reported by the call mechanism.
        status: Status,
    },
    /// The privileged service returned fewer bytes than the response structure holds.
    ShortResponse {
        /// The [`Opcode`] of the call.
        opcode: Opcode,
        /// The size of the response structure, in bytes.
        expected: usize,
        /// The number of bytes the privileged service wrote.
        actual: usize,
    },
}

impl TransportError {
    /// Returns the [`Status`] reported by the call mechanism, if any.
    pub const fn status(&self) -> Option<Status> {
        match self {
            Self::Failed { status, .. } => Some(*status),
            Self::ShortResponse { .. } => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { opcode, status } => write!(f, "{opcode:?} call failed: {status}"),
            Self::ShortResponse {
                opcode,
                expected,
                actual,
            } => write!(
                f,
                "{opcode:?} response was {actual} bytes, expected {expected}"
            ),
        }
    }
}

impl error::Error for TransportError {}
