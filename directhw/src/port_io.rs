//! Port I/O through the privileged service.

use core::{error, fmt};

use directhw_protocol::{DecodeError, IoRequest, IoValue, IoWidth, Opcode, WidthError};

use crate::{
    connection::{Connection, TransportError},
    platform::Platform,
};

impl<P: Platform> Connection<P> {
    /// Reads `width` bytes from the I/O port at `position`.
    ///
    /// # Errors
    ///
    /// - [`PortIoError::UnsupportedWidth`]: Returned if `width` is not 1, 2, 4, or 8. Nothing is
    ///   sent to the privileged service in this case.
    /// - [`PortIoError::Transport`]: Returned if the call failed.
    /// - [`PortIoError::Decode`]: Returned if the response cannot carry a value of `width`.
    pub fn read_io(&mut self, position: u32, width: usize) -> Result<IoValue, PortIoError> {
        let width = IoWidth::new(width)?;

        let response = match IoRequest::read(position, width) {
            IoRequest::Narrow(request) => IoRequest::Narrow(self.call(Opcode::ReadIo, &request)?),
            IoRequest::Wide(request) => IoRequest::Wide(self.call(Opcode::ReadIo, &request)?),
        };

        response.value(width).map_err(PortIoError::Decode)
    }

    /// Writes `bytes` to the I/O port at `position`. The access width is the length of `bytes`.
    ///
    /// # Errors
    ///
    /// - [`PortIoError::UnsupportedWidth`]: Returned if `bytes` is not 1, 2, 4, or 8 bytes long.
    ///   Nothing is sent to the privileged service in this case.
    /// - [`PortIoError::Transport`]: Returned if the call failed.
    pub fn write_io(&mut self, position: u32, bytes: &[u8]) -> Result<(), PortIoError> {
        let value = IoValue::from_bytes(bytes)?;

        match IoRequest::write(position, &value) {
            IoRequest::Narrow(request) => {
                let _ = self.call(Opcode::WriteIo, &request)?;
            }
            IoRequest::Wide(request) => {
                let _ = self.call(Opcode::WriteIo, &request)?;
            }
        }

        Ok(())
    }
}

/// Various errors that can occur while performing port I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortIoError {
    /// The access width is not supported by the privileged service.
    UnsupportedWidth(WidthError),
    /// The call to the privileged service failed.
    Transport(TransportError),
    /// The response was inconsistent with the requested width.
    Decode(DecodeError),
}

impl From<WidthError> for PortIoError {
    fn from(value: WidthError) -> Self {
        Self::UnsupportedWidth(value)
    }
}

impl From<TransportError> for PortIoError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl fmt::Display for PortIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedWidth(error) => write!(f, "{error}"),
            Self::Transport(error) => write!(f, "port I/O failed: {error}"),
            Self::Decode(error) => write!(f, "malformed port I/O response: {error}"),
        }
    }
}

impl error::Error for PortIoError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::UnsupportedWidth(error) => Some(error),
            Self::Transport(error) => Some(error),
            Self::Decode(error) => Some(error),
        }
    }
}

#[cfg(test)]
mod test {
    use directhw_protocol::{IoRequest32, IoRequest64, Opcode, Status, WidthError};

    use super::PortIoError;
    use crate::{Connection, platform::mock::MockPlatform};

    #[test]
    fn write_then_read_echoes_every_width() {
        let platform = MockPlatform::new();
        let mut connection = Connection::connect(platform).unwrap();

        let values: [&[u8]; 4] = [
            &[0xa5],
            &0x1f2e_u16.to_ne_bytes(),
            &0x8000_f8a0_u32.to_ne_bytes(),
            &0x0123_4567_89ab_cdef_u64.to_ne_bytes(),
        ];
        for value in values {
            connection.write_io(0x70, value).unwrap();

            let read = connection.read_io(0x70, value.len()).unwrap();
            assert_eq!(read.as_bytes(), value);
        }
    }

    #[test]
    fn requests_use_width_selected_shape() {
        let platform = MockPlatform::new();
        let mut connection = Connection::connect(platform.clone()).unwrap();

        connection.write_io(0xcf8, &0x8000_0000_u32.to_ne_bytes()).unwrap();
        connection.write_io(0xcfc, &u64::MAX.to_ne_bytes()).unwrap();

        let calls = platform.calls(Opcode::WriteIo);
        let narrow: IoRequest32 = calls[0].input_as();
        assert_eq!((narrow.offset, narrow.width), (0xcf8, 4));
        assert_eq!(narrow.data, 0x8000_0000);

        let wide: IoRequest64 = calls[1].input_as();
        assert_eq!((wide.offset, wide.width), (0xcfc, 8));
        assert_eq!(wide.data, u64::MAX);
    }

    #[test]
    fn read_returns_only_requested_bytes() {
        let platform = MockPlatform::new();
        let mut connection = Connection::connect(platform).unwrap();

        connection
            .write_io(0x60, &0xdead_beef_u32.to_ne_bytes())
            .unwrap();

        let read = connection.read_io(0x60, 1).unwrap();
        assert_eq!(read.as_bytes().len(), 1);
        assert_eq!(read.as_bytes()[0], 0xdead_beef_u32.to_ne_bytes()[0]);
    }

    #[test]
    fn unsupported_widths_never_dispatch() {
        let platform = MockPlatform::new();
        let mut connection = Connection::connect(platform.clone()).unwrap();

        for width in (0..=64).filter(|width| ![1, 2, 4, 8].contains(width)) {
            assert_eq!(
                connection.read_io(0x80, width).unwrap_err(),
                PortIoError::UnsupportedWidth(WidthError { width })
            );

            let bytes = vec![0; width];
            assert_eq!(
                connection.write_io(0x80, &bytes).unwrap_err(),
                PortIoError::UnsupportedWidth(WidthError { width })
            );
        }

        assert!(platform.state().calls.is_empty());
    }

    #[test]
    fn transport_failure_is_reported() {
        let platform = MockPlatform::new();
        platform
            .state_mut()
            .failures
            .insert(Opcode::ReadIo, Status::ERROR);
        let mut connection = Connection::connect(platform).unwrap();

        let error = connection.read_io(0x80, 2).unwrap_err();

        let PortIoError::Transport(error) = error else {
            panic!("expected a transport error, got {error:?}");
        };
        assert_eq!(error.status(), Some(Status::ERROR));
    }
}
