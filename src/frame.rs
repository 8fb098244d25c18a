//! Wire-level constants and frame classification.
//!
//! The TCP side has no length framing: every socket read yields at most
//! [`MAX_FRAME_SIZE`] bytes and that read is treated as one whole frame.
//! A frame that starts with [`PONG`] acknowledges a keepalive ping; anything
//! else is a command for the serial device.

use std::fmt;

/// Size of every transport read, serial read and reply frame.
///
/// Larger commands are split across several frames by the socket and each
/// piece is forwarded as its own command; there is no reassembly.
pub const MAX_FRAME_SIZE: usize = 128;

/// Keepalive ping written by the bridge.
pub const PING: &[u8] = b"ping";

/// Keepalive acknowledgment marker expected from clients.
pub const PONG: &[u8] = b"pong";

/// Classification of one inbound transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// Liveness acknowledgment; never forwarded to the device.
    Pong,
    /// Raw command bytes destined for the serial device.
    Command(&'a [u8]),
}

/// Classify the bytes received in a single read.
pub fn classify(frame: &[u8]) -> Inbound<'_> {
    if frame.starts_with(PONG) {
        Inbound::Pong
    } else {
        Inbound::Command(frame)
    }
}

/// A device reply: one fixed-size frame plus the count of bytes the device
/// actually produced.
///
/// On a read timeout the frame is all zeros and `len` is 0.
#[derive(Clone, PartialEq, Eq)]
pub struct Reply {
    data: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl Reply {
    /// An all-zero reply, used when the device produced nothing.
    pub fn empty() -> Self {
        Self {
            data: [0u8; MAX_FRAME_SIZE],
            len: 0,
        }
    }

    /// Build a reply from a filled buffer and the number of valid bytes.
    pub fn from_buffer(data: [u8; MAX_FRAME_SIZE], len: usize) -> Self {
        Self {
            data,
            len: len.min(MAX_FRAME_SIZE),
        }
    }

    /// The full zero-padded frame, exactly as it is written to clients.
    pub fn as_frame(&self) -> &[u8] {
        &self.data
    }

    /// Only the bytes the device actually sent.
    pub fn received(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Reply {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("len", &self.len)
            .field("received", &self.received())
            .finish()
    }
}
