//! Serial channel abstraction.
//!
//! The arbiter talks to the device only through [`SerialPortAdapter`], so a
//! real port and the scripted [`MockSerialPort`] are interchangeable.

pub mod discovery;
pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use discovery::{list_ports, PortInfo, UsbInfo};
pub use error::PortError;
pub use mock::{MockSerialPort, Transaction};
pub use sync_port::*;
pub use traits::*;
