//! Model-specific register, CPUID, and physical memory word accesses.
//!
//! Every operation in this module targets the logical CPU selected by
//! [`Connection::select_logical_cpu`].

use directhw_protocol::{CpuIdCommand, MsrCommand, Opcode, ReadMemCommand};

use crate::{
    connection::{Connection, TransportError},
    platform::Platform,
};

/// Result of performing a CPUID instruction.
#[derive(Clone, Copy, Debug, Hash, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cpuid {
    /// Value stored in the EAX registers when executing CPUID.
    pub eax: u32,
    /// Value stored in the EBX registers when executing CPUID.
    pub ebx: u32,
    /// Value stored in the ECX registers when executing CPUID.
    pub ecx: u32,
    /// Value stored in the EDX registers when executing CPUID.
    pub edx: u32,
}

impl Cpuid {
    /// Returns the registers in EAX, EBX, ECX, EDX order.
    pub const fn to_array(self) -> [u32; 4] {
        [self.eax, self.ebx, self.ecx, self.edx]
    }
}

impl From<[u32; 4]> for Cpuid {
    fn from([eax, ebx, ecx, edx]: [u32; 4]) -> Self {
        Self { eax, ebx, ecx, edx }
    }
}

impl<P: Platform> Connection<P> {
    /// Returns the contents of the 64-bit MSR specified by `index`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the call failed.
    pub fn read_msr(&mut self, index: u32) -> Result<u64, TransportError> {
        let command = MsrCommand {
            core: self.logical_cpu(),
            index,
            value: 0,
        };

        self.call(Opcode::ReadMsr, &command)
            .map(|response| response.value)
    }

    /// Writes `value` to the 64-bit MSR specified by `index`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the call failed.
    pub fn write_msr(&mut self, index: u32, value: u64) -> Result<(), TransportError> {
        let command = MsrCommand {
            core: self.logical_cpu(),
            index,
            value,
        };

        self.call(Opcode::WriteMsr, &command).map(|_| ())
    }

    /// Returns the [`Cpuid`] result associated with `leaf` and `subleaf`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the call failed.
    pub fn read_cpuid(&mut self, leaf: u32, subleaf: u32) -> Result<Cpuid, TransportError> {
        let command = CpuIdCommand {
            core: self.logical_cpu(),
            eax: leaf,
            ecx: subleaf,
            cpudata: [0; 4],
        };

        self.call(Opcode::ReadCpuId, &command)
            .map(|response| Cpuid::from(response.cpudata))
    }

    /// Returns the 32-bit word of physical memory at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the call failed.
    pub fn read_mem32(&mut self, address: u64) -> Result<u32, TransportError> {
        let command = ReadMemCommand {
            core: self.logical_cpu(),
            addr: address,
            ..ReadMemCommand::default()
        };

        self.call(Opcode::ReadMem, &command)
            .map(|response| response.data)
    }
}

#[cfg(test)]
mod test {
    use directhw_protocol::{CpuIdCommand, MsrCommand, Opcode, ReadMemCommand, Status};

    use super::Cpuid;
    use crate::{Connection, TransportError, platform::mock::MockPlatform};

    #[test]
    fn selected_cpu_is_encoded_in_every_request() {
        let platform = MockPlatform::new();
        let mut connection = Connection::connect(platform.clone()).unwrap();

        connection.select_logical_cpu(5);
        let _ = connection.read_msr(0x1b).unwrap();
        let _ = connection.read_cpuid(0x8000_0001, 0).unwrap();
        let _ = connection.read_mem32(0xfed4_0000).unwrap();
        connection.write_msr(0x3a, 0x5).unwrap();

        let msr: MsrCommand = platform.calls(Opcode::ReadMsr)[0].input_as();
        assert_eq!((msr.core, msr.index), (5, 0x1b));

        let cpuid: CpuIdCommand = platform.calls(Opcode::ReadCpuId)[0].input_as();
        assert_eq!((cpuid.core, cpuid.eax, cpuid.ecx), (5, 0x8000_0001, 0));

        let read_mem: ReadMemCommand = platform.calls(Opcode::ReadMem)[0].input_as();
        assert_eq!((read_mem.core, read_mem.addr), (5, 0xfed4_0000));

        let write: MsrCommand = platform.calls(Opcode::WriteMsr)[0].input_as();
        assert_eq!((write.core, write.index, write.value), (5, 0x3a, 0x5));
    }

    #[test]
    fn msr_write_is_visible_to_read() {
        let mut connection = Connection::connect(MockPlatform::new()).unwrap();

        connection.write_msr(0x199, 0x0000_0001_0000_1d00).unwrap();

        assert_eq!(connection.read_msr(0x199), Ok(0x0000_0001_0000_1d00));
    }

    #[test]
    fn cpuid_registers_are_returned_unchanged() {
        let mut connection = Connection::connect(MockPlatform::new()).unwrap();
        connection.select_logical_cpu(2);

        let cpuid = connection.read_cpuid(7, 1).unwrap();

        assert_eq!(cpuid, Cpuid::from([7, 1, 2, 0x6c65_746e]));
        assert_eq!(cpuid.to_array(), [7, 1, 2, 0x6c65_746e]);
    }

    #[test]
    fn read_mem32_returns_data_word() {
        let mut connection = Connection::connect(MockPlatform::new()).unwrap();
        connection.select_logical_cpu(1);

        assert_eq!(connection.read_mem32(0x1000), Ok(0x1001));
    }

    #[test]
    fn failures_are_transport_errors() {
        let platform = MockPlatform::new();
        for opcode in [Opcode::ReadCpuId, Opcode::ReadMem, Opcode::WriteMsr] {
            platform.state_mut().failures.insert(opcode, Status::ERROR);
        }
        let mut connection = Connection::connect(platform).unwrap();

        assert!(matches!(
            connection.read_cpuid(0, 0),
            Err(TransportError::Failed {
                opcode: Opcode::ReadCpuId,
                ..
            })
        ));
        assert!(matches!(
            connection.read_mem32(0),
            Err(TransportError::Failed {
                opcode: Opcode::ReadMem,
                ..
            })
        ));
        assert!(matches!(
            connection.write_msr(0x10, 0),
            Err(TransportError::Failed {
                opcode: Opcode::WriteMsr,
                ..
            })
        ));
    }
}
