//! Scripted serial device for tests.
//!
//! `MockSerialPort` answers each write through a responder closure, can be
//! told to fail writes or respond slowly, and keeps a transcript of every
//! device operation. Clones share the same device, so a test can keep one
//! handle for inspection after moving another into the arbiter.

use super::error::PortError;
use super::traits::SerialPortAdapter;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// One device operation as observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Write(Vec<u8>),
    WriteFailed(Vec<u8>),
    Read(Vec<u8>),
    ReadTimedOut,
}

struct MockDeviceState {
    /// Bytes the device will hand out on subsequent reads.
    read_queue: VecDeque<u8>,
    responder: Option<Responder>,
    transcript: Vec<Transaction>,
    /// Number of upcoming writes that fail.
    failing_writes: usize,
    /// Every write fails once the channel is closed.
    closed: bool,
    latency: Duration,
    timeout: Duration,
    /// A write has happened and its read has not finished yet.
    awaiting_read: bool,
    overlaps: usize,
    buffers_cleared: bool,
}

/// Mock serial device.
///
/// # Example
/// ```
/// use serial_tcp_bridge::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0").with_responder(|cmd| {
///     cmd.iter().map(|b| b.wrapping_add(1)).collect()
/// });
///
/// port.write_bytes(b"\x01\x02").unwrap();
/// let mut buffer = [0u8; 8];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"\x02\x03");
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockDeviceState>>,
}

impl MockSerialPort {
    /// Create a silent device: writes succeed, reads time out.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockDeviceState {
                read_queue: VecDeque::new(),
                responder: None,
                transcript: Vec::new(),
                failing_writes: 0,
                closed: false,
                latency: Duration::ZERO,
                timeout: Duration::from_millis(300),
                awaiting_read: false,
                overlaps: 0,
                buffers_cleared: false,
            })),
        }
    }

    /// A device that answers every command with the same bytes.
    pub fn echo(name: impl Into<String>) -> Self {
        Self::new(name).with_responder(|cmd| cmd.to_vec())
    }

    /// Install the closure that produces the device's answer to each write.
    /// An empty answer means the device stays silent.
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
        self
    }

    /// Delay every read by `latency`, like a slow device.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// Queue unsolicited bytes for the next reads.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Make the next `count` writes fail with a broken pipe.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    /// Simulate the channel being closed underneath the bridge.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Every device operation so far, in order.
    pub fn transcript(&self) -> Vec<Transaction> {
        self.state.lock().transcript.clone()
    }

    /// Payloads of the successful writes, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .transcript
            .iter()
            .filter_map(|t| match t {
                Transaction::Write(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of writes issued while an earlier round-trip was still waiting
    /// for its read.
    pub fn overlaps(&self) -> usize {
        self.state.lock().overlaps
    }

    pub fn was_cleared(&self) -> bool {
        self.state.lock().buffers_cleared
    }

    /// Read timeout last set through [`SerialPortAdapter::set_timeout`].
    pub fn read_timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.awaiting_read {
            state.overlaps += 1;
        }
        state.awaiting_read = true;

        if state.closed || state.failing_writes > 0 {
            state.failing_writes = state.failing_writes.saturating_sub(1);
            state.transcript.push(Transaction::WriteFailed(data.to_vec()));
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device channel closed",
            )));
        }

        state.transcript.push(Transaction::Write(data.to_vec()));
        if let Some(responder) = state.responder.as_mut() {
            let answer = responder(data);
            state.read_queue.extend(answer);
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            // Sleep unlocked so a misbehaving concurrent writer shows up as an overlap.
            std::thread::sleep(latency);
        }

        let mut state = self.state.lock();
        state.awaiting_read = false;

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            state.transcript.push(Transaction::ReadTimedOut);
            return Err(PortError::timeout(state.timeout));
        }

        state
            .transcript
            .push(Transaction::Read(buffer[..bytes_read].to_vec()));
        Ok(bytes_read)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.read_queue.clear();
        state.buffers_cleared = true;
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
