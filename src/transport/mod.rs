//! Interface to the PassThru device a simulation is replayed on.

pub mod error;
mod mock;

use std::time::Duration;

use crate::passthru::{ConnectFlags, Filter, Message, ProtocolId};

pub use error::Error;
pub use mock::{MockTransport, OpenedChannel};

/// Blocking PassThru device interface. The player drives it from its own thread, one call at a time.
pub trait PassThruTransport: Send {
    fn open_device(&mut self, timeout: Duration) -> Result<(), Error>;
    fn close_device(&mut self) -> Result<(), Error>;

    /// Opens a channel and returns its handle.
    fn open_channel(&mut self, protocol: ProtocolId, flags: ConnectFlags, baud_rate: u32) -> Result<u32, Error>;
    fn close_channel(&mut self, handle: u32) -> Result<(), Error>;

    /// Starts a filter on an open channel and returns the filter handle.
    fn start_filter(&mut self, handle: u32, filter: &Filter) -> Result<u32, Error>;

    /// Reads up to `max_count` messages. Returns [`Error::Timeout`] if nothing arrived within `timeout`.
    fn read_messages(&mut self, handle: u32, max_count: usize, timeout: Duration) -> Result<Vec<Message>, Error>;

    /// Writes messages and returns how many were sent.
    fn write_messages(&mut self, handle: u32, messages: &[Message], timeout: Duration) -> Result<usize, Error>;
}
