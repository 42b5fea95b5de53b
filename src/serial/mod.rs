// Serial device seam
//
// The streaming worker and the calibration sampler talk to the sensor
// through the SensorPort trait; the engine obtains ports through a
// PortOpener. Production wires in the serialport crate, tests wire in the
// scripted implementations from crate::testing.

use std::io;
use std::io::Read;
use std::time::Duration;

use log::{info, warn};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};

use crate::error::AcquisitionError;

/// Minimal read-side interface over an open sensor connection.
///
/// Mirrors the polling shape of the streaming loop: check what is waiting,
/// then read at most that much.
pub trait SensorPort: Send {
    /// Number of bytes waiting in the input buffer.
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Read into `buf`, returning the number of bytes placed.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens sensor connections on demand.
pub trait PortOpener: Send + Sync {
    /// Open `port` at `baud_rate` with a bounded read timeout.
    ///
    /// 8 data bits, no parity, 1 stop bit; input/output buffers are
    /// flushed before the port is handed out.
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn SensorPort>, AcquisitionError>;
}

/// Production opener backed by the serialport crate.
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn SensorPort>, AcquisitionError> {
        let handle = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|err| classify_open_error(port, &err))?;

        // Stale bytes from before this session would otherwise decode as
        // the first frames of it.
        if let Err(err) = handle.clear(ClearBuffer::All) {
            warn!("[serial] Could not flush {}: {}", port, err);
        }

        info!("[serial] Connected to {} @ {} baud", port, baud_rate);
        Ok(Box::new(SerialSensorPort { inner: handle }))
    }
}

/// Map a serialport open failure onto the connection-error taxonomy.
///
/// Permission problems get their own variant because the remedy is
/// user-actionable (group membership), and a busy device is a different
/// operator situation than a missing one.
fn classify_open_error(port: &str, err: &serialport::Error) -> AcquisitionError {
    let port = port.to_string();
    match err.kind() {
        serialport::ErrorKind::NoDevice => AcquisitionError::DeviceNotFound { port },
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
            AcquisitionError::DeviceNotFound { port }
        }
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            AcquisitionError::PermissionDenied { port }
        }
        _ => {
            let details = err.to_string();
            if details.to_ascii_lowercase().contains("busy") {
                AcquisitionError::DeviceBusy { port }
            } else {
                AcquisitionError::OpenFailed { port, details }
            }
        }
    }
}

struct SerialSensorPort {
    inner: Box<dyn serialport::SerialPort>,
}

impl SensorPort for SerialSensorPort {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.inner
            .bytes_to_read()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}
