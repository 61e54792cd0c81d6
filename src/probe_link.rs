//! Serial transport shared between the acquisition loop and the controller.
//!
//! The device streams sample lines continuously while the host occasionally
//! writes short configuration commands. All access goes through one internal
//! mutex, so controller writes are serialized against the loop's reads. Reads
//! use a short timeout, which both paces the loop and bounds how long a
//! command write can be held off.
//!
//! Command sequences are selector bytes followed by ASCII-decimal value
//! bytes, each write followed by a fixed delay. Byte order and delays match
//! the firmware's parser and must not change.

use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Any duplex byte stream usable as a probe transport. Implemented by
/// `serialport` handles and by in-memory streams in tests.
pub trait ByteStream: Read + Write + Send {}

impl<T: Read + Write + Send> ByteStream for T {}

const READ_TIMEOUT: Duration = Duration::from_millis(10);
const SHORT_DELAY: Duration = Duration::from_millis(1);
const LONG_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport is closed")]
    Closed,
}

/// Cloneable handle to the shared transport.
#[derive(Clone)]
pub struct ProbeLink {
    stream: Arc<Mutex<Option<Box<dyn ByteStream>>>>,
}

impl std::fmt::Debug for ProbeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeLink")
            .field("open", &self.is_open())
            .finish()
    }
}

impl ProbeLink {
    /// Open a serial port to the device.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, LinkError> {
        log::debug!("Opening {port} at {baud_rate} baud");
        let serial: Box<dyn SerialPort> = serialport::new(port, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        Ok(Self::from_stream(Box::new(serial)))
    }

    /// Wrap an already-open stream. Reads are expected to time out with
    /// `TimedOut`/`WouldBlock` when no data is pending.
    pub fn from_stream(stream: Box<dyn ByteStream>) -> Self {
        Self {
            stream: Arc::new(Mutex::new(Some(stream))),
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Close the transport. Subsequent reads and writes fail with
    /// [`LinkError::Closed`].
    pub fn close(&self) {
        if self.lock().take().is_some() {
            log::debug!("Transport closed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Box<dyn ByteStream>>> {
        // A poisoned stream mutex only means a writer died mid-command; the
        // stream itself is still coherent for the survivor.
        self.stream.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Read whatever bytes are pending, returning 0 on timeout.
    pub(crate) fn read_chunk(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let mut guard = self.lock();
        let stream = guard.as_mut().ok_or(LinkError::Closed)?;
        match stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut guard = self.lock();
        let stream = guard.as_mut().ok_or(LinkError::Closed)?;
        stream.write_all(bytes)?;
        Ok(())
    }

    /// One command write followed by the firmware's settle delay. The lock is
    /// released before sleeping so the acquisition loop keeps draining.
    fn write_then_wait(&self, bytes: &[u8], delay: Duration) -> Result<(), LinkError> {
        self.write_bytes(bytes)?;
        thread::sleep(delay);
        Ok(())
    }

    /// Start capture: `'0'` three times.
    pub fn send_start(&self) -> Result<(), LinkError> {
        log::debug!("Sending start command");
        self.write_then_wait(b"0", SHORT_DELAY)?;
        self.write_then_wait(b"0", SHORT_DELAY)?;
        self.write_bytes(b"0")
    }

    /// Stop capture: `'1'` three times.
    pub fn send_stop(&self) -> Result<(), LinkError> {
        log::debug!("Sending stop command");
        self.write_then_wait(b"1", SHORT_DELAY)?;
        self.write_then_wait(b"1", SHORT_DELAY)?;
        self.write_bytes(b"1")
    }

    /// Trigger edge-select mask: `'2'`, `'0'`, mask.
    pub fn send_trigger_edge_mask(&self, mask: u8) -> Result<(), LinkError> {
        log::debug!("Sending trigger edge mask {mask:#010b}");
        self.write_then_wait(b"2", LONG_DELAY)?;
        self.write_then_wait(b"0", LONG_DELAY)?;
        self.write_then_wait(ascii_decimal(mask).as_bytes(), LONG_DELAY)
    }

    /// Trigger enable mask: `'3'`, `'0'`, mask.
    pub fn send_trigger_enable_mask(&self, mask: u8) -> Result<(), LinkError> {
        log::debug!("Sending trigger enable mask {mask:#010b}");
        self.write_then_wait(b"3", SHORT_DELAY)?;
        self.write_then_wait(b"0", SHORT_DELAY)?;
        self.write_bytes(ascii_decimal(mask).as_bytes())
    }

    /// Sample-timer period, four bytes split across the `'5'` and `'6'`
    /// selectors: high pair first, then low pair.
    pub fn send_sample_period(&self, period: u32) -> Result<(), LinkError> {
        log::debug!("Sending sample period {period}");
        self.write_then_wait(b"5", SHORT_DELAY)?;
        self.write_then_wait(ascii_decimal((period >> 24) as u8).as_bytes(), SHORT_DELAY)?;
        self.write_then_wait(ascii_decimal((period >> 16) as u8).as_bytes(), SHORT_DELAY)?;
        self.write_then_wait(b"6", SHORT_DELAY)?;
        self.write_then_wait(ascii_decimal((period >> 8) as u8).as_bytes(), SHORT_DELAY)?;
        self.write_then_wait(ascii_decimal(period as u8).as_bytes(), SHORT_DELAY)
    }

    /// Trigger-timer period (`'4'`) and prescaler (`'7'`), each big-endian.
    pub fn send_trigger_timer(&self, period16: u16, prescaler: u16) -> Result<(), LinkError> {
        log::debug!("Sending trigger timer period16={period16} prescaler={prescaler}");
        self.write_then_wait(b"4", LONG_DELAY)?;
        self.write_then_wait(ascii_decimal((period16 >> 8) as u8).as_bytes(), LONG_DELAY)?;
        self.write_then_wait(ascii_decimal(period16 as u8).as_bytes(), LONG_DELAY)?;
        self.write_then_wait(b"7", LONG_DELAY)?;
        self.write_then_wait(ascii_decimal((prescaler >> 8) as u8).as_bytes(), LONG_DELAY)?;
        self.write_then_wait(ascii_decimal(prescaler as u8).as_bytes(), LONG_DELAY)
    }
}

fn ascii_decimal(value: u8) -> String {
    value.to_string()
}
