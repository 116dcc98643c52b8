//! Recording [`Platform`] that emulates the privileged service in memory.

use std::{
    cell::{Ref, RefCell, RefMut},
    collections::HashMap,
    rc::Rc,
    time::Duration,
};

use directhw_protocol::{
    CpuIdCommand, IoRequest32, IoRequest64, MapOptions, MapRequest, MsrCommand, Opcode,
    ReadMemCommand, Status,
};
use zerocopy::{FromBytes, IntoBytes};

use crate::platform::{ConnectionId, MappedMemory, Platform, ServiceId};

/// The virtual address at which every mapping is placed.
pub const MAPPED_ADDRESS: u64 = 0x7000_0000_0000;

/// An observable interaction with the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Lookup,
    Open,
    Close,
    Call(Opcode),
    Map { memory_type: u32, options: MapOptions },
    Settle(Duration),
}

/// A struct call received by the emulated service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub opcode: Opcode,
    pub input: Vec<u8>,
}

impl RecordedCall {
    /// Interprets the recorded input as `T`.
    pub fn input_as<T: FromBytes>(&self) -> T {
        T::read_from_bytes(&self.input).expect("recorded input has the wrong size")
    }
}

#[derive(Debug)]
pub struct MockState {
    pub superuser: bool,
    pub service_present: bool,
    pub open_status: Option<Status>,
    pub map_status: Option<Status>,
    pub failures: HashMap<Opcode, Status>,
    pub truncate_responses: bool,

    pub looked_up: Option<String>,
    pub events: Vec<Event>,
    pub calls: Vec<RecordedCall>,

    /// Last value written to each port, echoed back by reads.
    pub ports: HashMap<u64, [u8; 8]>,
    /// Last value written to each `(core, index)` register.
    pub msrs: HashMap<(u32, u32), u64>,
    /// The most recently prepared physical range.
    pub prepared: Option<MapRequest>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            superuser: true,
            service_present: true,
            open_status: None,
            map_status: None,
            failures: HashMap::new(),
            truncate_responses: false,
            looked_up: None,
            events: Vec::new(),
            calls: Vec::new(),
            ports: HashMap::new(),
            msrs: HashMap::new(),
            prepared: None,
        }
    }
}

/// A [`Platform`] whose state stays observable after it is moved into a connection.
#[derive(Clone, Debug, Default)]
pub struct MockPlatform {
    state: Rc<RefCell<MockState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, MockState> {
        self.state.borrow_mut()
    }

    /// Returns the number of recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.state().events.iter().filter(|event| predicate(event)).count()
    }

    /// Returns every recorded call with `opcode`.
    pub fn calls(&self, opcode: Opcode) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.opcode == opcode)
            .cloned()
            .collect()
    }
}

/// Produces the response the emulated service sends for `opcode`.
fn respond(state: &mut MockState, opcode: Opcode, input: &[u8]) -> Vec<u8> {
    match opcode {
        Opcode::ReadIo | Opcode::WriteIo => respond_io(state, opcode, input),
        Opcode::PrepareMap => {
            let request = MapRequest::read_from_bytes(input).expect("malformed map request");
            state.prepared = Some(request);
            request.as_bytes().to_vec()
        }
        Opcode::ReadMsr => {
            let mut command = MsrCommand::read_from_bytes(input).expect("malformed MSR command");
            command.value = state
                .msrs
                .get(&(command.core, command.index))
                .copied()
                .unwrap_or(MsrCommand::join(command.core, command.index));
            command.as_bytes().to_vec()
        }
        Opcode::WriteMsr => {
            let command = MsrCommand::read_from_bytes(input).expect("malformed MSR command");
            state
                .msrs
                .insert((command.core, command.index), command.value);
            command.as_bytes().to_vec()
        }
        Opcode::ReadCpuId => {
            let mut command =
                CpuIdCommand::read_from_bytes(input).expect("malformed CPUID command");
            command.cpudata = [command.eax, command.ecx, command.core, 0x6c65_746e];
            command.as_bytes().to_vec()
        }
        Opcode::ReadMem => {
            let mut command =
                ReadMemCommand::read_from_bytes(input).expect("malformed memory read command");
            command.data = u32::try_from(command.addr & 0xffff_ffff).unwrap() ^ command.core;
            command.as_bytes().to_vec()
        }
        Opcode::Read | Opcode::Write => panic!("reserved opcode {opcode:?} was issued"),
    }
}

/// Emulates port I/O for both request shapes, echoing writes back to reads.
fn respond_io(state: &mut MockState, opcode: Opcode, input: &[u8]) -> Vec<u8> {
    let (offset, width, data) = match input.len() {
        12 => {
            let request = IoRequest32::read_from_bytes(input).unwrap();
            let mut data = [0; 8];
            data[..4].copy_from_slice(request.data.as_bytes());
            (u64::from(request.offset), u64::from(request.width), data)
        }
        24 => {
            let request = IoRequest64::read_from_bytes(input).unwrap();
            (request.offset, request.width, request.data.to_ne_bytes())
        }
        length => panic!("malformed I/O request of {length} bytes"),
    };
    let width = usize::try_from(width).unwrap();

    let data = if opcode == Opcode::WriteIo {
        let mut stored = [0; 8];
        stored[..width].copy_from_slice(&data[..width]);
        state.ports.insert(offset, stored);
        data
    } else {
        let stored = state.ports.get(&offset).copied().unwrap_or_default();
        let mut data = [0; 8];
        data[..width].copy_from_slice(&stored[..width]);
        data
    };

    let mut response = input.to_vec();
    let data_offset = response.len() / 3 * 2;
    let data_len = response.len() - data_offset;
    response[data_offset..].copy_from_slice(&data[..data_len]);
    response
}

impl Platform for MockPlatform {
    fn is_superuser(&self) -> bool {
        self.state().superuser
    }

    fn lookup_service(&mut self, name: &str) -> Option<ServiceId> {
        let mut state = self.state_mut();
        state.events.push(Event::Lookup);
        state.looked_up = Some(String::from(name));

        state.service_present.then_some(ServiceId(0x1003))
    }

    fn open_service(&mut self, service: ServiceId) -> Result<ConnectionId, Status> {
        assert_eq!(service, ServiceId(0x1003));

        let mut state = self.state_mut();
        state.events.push(Event::Open);
        match state.open_status {
            Some(status) => Err(status),
            None => Ok(ConnectionId(0x2207)),
        }
    }

    fn close_service(&mut self, connection: ConnectionId) {
        assert_eq!(connection, ConnectionId(0x2207));

        self.state_mut().events.push(Event::Close);
    }

    fn call_struct_method(
        &mut self,
        connection: ConnectionId,
        selector: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, Status> {
        assert_eq!(connection, ConnectionId(0x2207));
        assert_eq!(input.len(), output.len());
        let opcode = Opcode::from_selector(selector).expect("unknown selector");

        let mut state = self.state_mut();
        state.events.push(Event::Call(opcode));
        state.calls.push(RecordedCall {
            opcode,
            input: input.to_vec(),
        });

        if let Some(status) = state.failures.get(&opcode) {
            return Err(*status);
        }

        let response = respond(&mut state, opcode, input);
        output.copy_from_slice(&response);

        if state.truncate_responses {
            Ok(output.len() / 2)
        } else {
            Ok(output.len())
        }
    }

    fn map_memory(
        &mut self,
        connection: ConnectionId,
        memory_type: u32,
        options: MapOptions,
    ) -> Result<MappedMemory, Status> {
        assert_eq!(connection, ConnectionId(0x2207));

        let mut state = self.state_mut();
        state.events.push(Event::Map {
            memory_type,
            options,
        });
        if let Some(status) = state.map_status {
            return Err(status);
        }

        let prepared = state.prepared.expect("mapping requested before PrepareMap");
        Ok(MappedMemory {
            address: MAPPED_ADDRESS + (prepared.addr & 0xfff),
            size: prepared.size,
        })
    }

    fn settle(&mut self, duration: Duration) {
        self.state_mut().events.push(Event::Settle(duration));
    }
}
