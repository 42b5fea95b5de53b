// Scripted in-memory sensor ports
//
// ScriptedPort serves pre-recorded byte chunks one per poll, mimicking a
// device that trickles lines out between idle polls. ScriptedOpener hands
// out one scripted port per open() call, so multi-open flows (device
// probing, per-step calibration captures) can each get their own script.

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::AcquisitionError;
use crate::serial::{PortOpener, SensorPort};

/// In-memory port that yields one scripted chunk per poll.
pub struct ScriptedPort {
    chunks: VecDeque<Vec<u8>>,
    idle_polls: u32,
    fail_after_script: bool,
}

impl ScriptedPort {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            idle_polls: 0,
            fail_after_script: false,
        }
    }

    /// Report an idle line for the first `polls` status checks before the
    /// script starts flowing. Lets tests subscribe to session channels
    /// before the first byte arrives.
    pub fn with_initial_idle_polls(mut self, polls: u32) -> Self {
        self.idle_polls = polls;
        self
    }

    /// After the script is exhausted, every poll fails with an I/O error
    /// instead of reporting an idle line. Used to exercise the worker's
    /// fault classification.
    pub fn failing_after_script(mut self) -> Self {
        self.fail_after_script = true;
        self
    }
}

impl SensorPort for ScriptedPort {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        if self.idle_polls > 0 {
            self.idle_polls -= 1;
            return Ok(0);
        }
        match self.chunks.front() {
            Some(chunk) => Ok(chunk.len() as u32),
            None if self.fail_after_script => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted connection dropped",
            )),
            None => Ok(0),
        }
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };

        if chunk.len() > buf.len() {
            // Partial read: hand back what fits, requeue the rest.
            let rest = chunk.split_off(buf.len());
            self.chunks.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

/// Opener that serves one scripted port per `open()` call.
pub struct ScriptedOpener {
    scripts: Mutex<VecDeque<Vec<Vec<u8>>>>,
    /// Served when the queued scripts run out; `None` makes further opens fail
    repeat_empty: bool,
    idle_polls: u32,
}

impl ScriptedOpener {
    /// Each inner vector is the chunk script of one successive open.
    pub fn new(scripts: Vec<Vec<Vec<u8>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            repeat_empty: false,
            idle_polls: 0,
        }
    }

    /// Single script reused conventions: first open gets the script, later
    /// opens get an idle port instead of an error.
    pub fn single(script: Vec<Vec<u8>>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::from([script])),
            repeat_empty: true,
            idle_polls: 0,
        }
    }

    /// Every opened port reports an idle line for its first `polls` status
    /// checks before the script starts flowing.
    pub fn with_initial_idle_polls(mut self, polls: u32) -> Self {
        self.idle_polls = polls;
        self
    }
}

impl PortOpener for ScriptedOpener {
    fn open(
        &self,
        port: &str,
        _baud_rate: u32,
        _timeout: Duration,
    ) -> Result<Box<dyn SensorPort>, AcquisitionError> {
        let mut scripts = self.scripts.lock().map_err(|_| {
            AcquisitionError::LockPoisoned {
                component: "scripted_opener".to_string(),
            }
        })?;
        match scripts.pop_front() {
            Some(script) => Ok(Box::new(
                ScriptedPort::new(script).with_initial_idle_polls(self.idle_polls),
            )),
            None if self.repeat_empty => Ok(Box::new(ScriptedPort::new(Vec::new()))),
            None => Err(AcquisitionError::DeviceNotFound {
                port: port.to_string(),
            }),
        }
    }
}

/// Opener that always fails with a fixed error.
pub struct FailingOpener {
    error: AcquisitionError,
}

impl FailingOpener {
    pub fn new(error: AcquisitionError) -> Self {
        Self { error }
    }
}

impl PortOpener for FailingOpener {
    fn open(
        &self,
        _port: &str,
        _baud_rate: u32,
        _timeout: Duration,
    ) -> Result<Box<dyn SensorPort>, AcquisitionError> {
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_port_serves_chunks_in_order() {
        let mut port = ScriptedPort::new(vec![b"abc".to_vec(), b"de".to_vec()]);
        let mut buf = [0u8; 16];

        assert_eq!(port.bytes_to_read().unwrap(), 3);
        assert_eq!(port.read_chunk(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");

        assert_eq!(port.bytes_to_read().unwrap(), 2);
        assert_eq!(port.read_chunk(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"de");

        assert_eq!(port.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn test_scripted_port_partial_read_requeues_rest() {
        let mut port = ScriptedPort::new(vec![b"abcdef".to_vec()]);
        let mut buf = [0u8; 4];

        assert_eq!(port.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(port.bytes_to_read().unwrap(), 2);
        assert_eq!(port.read_chunk(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_failing_port_errors_after_script() {
        let mut port = ScriptedPort::new(vec![b"x".to_vec()]).failing_after_script();
        let mut buf = [0u8; 4];
        port.read_chunk(&mut buf).unwrap();
        assert!(port.bytes_to_read().is_err());
    }

    #[test]
    fn test_opener_serves_scripts_per_open() {
        let opener = ScriptedOpener::new(vec![vec![b"one".to_vec()], vec![b"two".to_vec()]]);
        let timeout = Duration::from_millis(1);

        let mut first = opener.open("p", 115_200, timeout).unwrap();
        let mut second = opener.open("p", 115_200, timeout).unwrap();
        assert!(opener.open("p", 115_200, timeout).is_err());

        let mut buf = [0u8; 8];
        let n = first.read_chunk(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"one");
        let n = second.read_chunk(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"two");
    }

    #[test]
    fn test_single_opener_repeats_idle_ports() {
        let opener = ScriptedOpener::single(vec![b"data".to_vec()]);
        let timeout = Duration::from_millis(1);
        let _first = opener.open("p", 115_200, timeout).unwrap();
        let mut later = opener.open("p", 115_200, timeout).unwrap();
        assert_eq!(later.bytes_to_read().unwrap(), 0);
    }
}
