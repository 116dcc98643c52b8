//! [`Platform`] implementation reaching the privileged service through the IOKit framework.

use core::ffi::{c_char, c_void};
use std::ffi::CString;

use directhw_protocol::{MapOptions, Status};

use crate::platform::{ConnectionId, MappedMemory, Platform, ServiceId};

/// `kern_return_t`.
type KernReturn = i32;
/// `mach_port_t`.
type MachPort = u32;

/// `kIOMainPortDefault`.
const MAIN_PORT_DEFAULT: MachPort = 0;
/// The `type` passed to `IOServiceOpen`.
const CONNECTION_TYPE: u32 = 0;

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    fn IOServiceMatching(name: *const c_char) -> *mut c_void;
    fn IOServiceGetMatchingService(main_port: MachPort, matching: *mut c_void) -> MachPort;
    fn IOServiceOpen(
        service: MachPort,
        owning_task: MachPort,
        connection_type: u32,
        connection: *mut MachPort,
    ) -> KernReturn;
    fn IOServiceClose(connection: MachPort) -> KernReturn;
    fn IOObjectRelease(object: MachPort) -> KernReturn;
    fn IOConnectCallStructMethod(
        connection: MachPort,
        selector: u32,
        input: *const c_void,
        input_size: usize,
        output: *mut c_void,
        output_size: *mut usize,
    ) -> KernReturn;
    fn IOConnectMapMemory64(
        connection: MachPort,
        memory_type: u32,
        into_task: MachPort,
        at_address: *mut u64,
        of_size: *mut u64,
        options: u32,
    ) -> KernReturn;
}

unsafe extern "C" {
    static mach_task_self_: MachPort;
}

/// Returns the task port of the calling process.
fn task_self() -> MachPort {
    // SAFETY:
    //
    // `mach_task_self_` is initialized by the runtime before `main` and never modified.
    unsafe { mach_task_self_ }
}

/// Converts `result` into a [`Result`].
fn check(result: KernReturn) -> Result<(), Status> {
    let status = Status(result);
    if status.is_success() {
        Ok(())
    } else {
        Err(status)
    }
}

/// The IOKit [`Platform`].
#[derive(Debug, Default)]
pub struct IoKit {
    _private: (),
}

impl IoKit {
    /// Creates a new [`IoKit`] platform.
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Platform for IoKit {
    fn is_superuser(&self) -> bool {
        // SAFETY:
        //
        // `getuid` has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };

        uid == 0
    }

    fn lookup_service(&mut self, name: &str) -> Option<ServiceId> {
        let name = CString::new(name).ok()?;

        // SAFETY:
        //
        // `name` is a valid NUL-terminated string that outlives the call.
        let matching = unsafe { IOServiceMatching(name.as_ptr()) };
        if matching.is_null() {
            return None;
        }

        // SAFETY:
        //
        // `matching` is a valid matching dictionary, the reference to which is consumed by this
        // call.
        let service = unsafe { IOServiceGetMatchingService(MAIN_PORT_DEFAULT, matching) };
        if service == 0 {
            return None;
        }

        Some(ServiceId(service))
    }

    fn open_service(&mut self, service: ServiceId) -> Result<ConnectionId, Status> {
        let mut connection = 0;

        // SAFETY:
        //
        // `service` was returned by `IOServiceGetMatchingService` and `connection` is valid for
        // writes.
        let result =
            unsafe { IOServiceOpen(service.0, task_self(), CONNECTION_TYPE, &mut connection) };

        // SAFETY:
        //
        // The connection holds its own reference to the service.
        let _ = unsafe { IOObjectRelease(service.0) };

        check(result).map(|()| ConnectionId(connection))
    }

    fn close_service(&mut self, connection: ConnectionId) {
        // SAFETY:
        //
        // `connection` was returned by `IOServiceOpen` and is closed exactly once.
        let result = unsafe { IOServiceClose(connection.0) };
        if let Err(status) = check(result) {
            log::warn!("closing connection {connection:?} failed: {status}");
        }
    }

    fn call_struct_method(
        &mut self,
        connection: ConnectionId,
        selector: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, Status> {
        let mut output_size = output.len();

        // SAFETY:
        //
        // `input` and `output` are valid for their lengths, and `output_size` is valid for
        // writes.
        let result = unsafe {
            IOConnectCallStructMethod(
                connection.0,
                selector,
                input.as_ptr().cast(),
                input.len(),
                output.as_mut_ptr().cast(),
                &mut output_size,
            )
        };

        check(result).map(|()| output_size)
    }

    fn map_memory(
        &mut self,
        connection: ConnectionId,
        memory_type: u32,
        options: MapOptions,
    ) -> Result<MappedMemory, Status> {
        let mut address = 0;
        let mut size = 0;

        // SAFETY:
        //
        // `address` and `size` are valid for writes and `connection` is open.
        let result = unsafe {
            IOConnectMapMemory64(
                connection.0,
                memory_type,
                task_self(),
                &mut address,
                &mut size,
                options.0,
            )
        };

        check(result).map(|()| MappedMemory { address, size })
    }
}
