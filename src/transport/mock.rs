//! In-memory transport for playback tests
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{Error, PassThruTransport};
use crate::passthru::{ConnectFlags, Filter, Message, ProtocolId};

/// Longest time an empty read blocks
const MAX_IDLE_READ: Duration = Duration::from_millis(5);

/// A channel opened on the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedChannel {
    pub handle: u32,
    pub protocol: ProtocolId,
    pub flags: ConnectFlags,
    pub baud_rate: u32,
    pub filters: Vec<Filter>,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct State {
    device_open: bool,
    device_opens: usize,
    next_handle: u32,
    channels: Vec<OpenedChannel>,
    inbound: VecDeque<Message>,
    written: Vec<(u32, Message)>,
    write_failures: usize,
    refused_connections: usize,
    disconnect_pending: bool,
}

impl State {
    fn channel_mut(&mut self, handle: u32) -> Result<&mut OpenedChannel, Error> {
        if !self.device_open {
            return Err(Error::NotOpen);
        }
        self.channels
            .iter_mut()
            .find(|c| c.handle == handle && !c.closed)
            .ok_or(Error::NotOpen)
    }
}

/// Scripted transport. Clones share the same state, so a test keeps one clone to inspect what the player did with
/// the other.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message to be read from the device
    pub fn push_inbound(&self, message: Message) {
        self.state.lock().inbound.push_back(message);
    }

    /// Fail the next `count` writes
    pub fn fail_writes(&self, count: usize) {
        self.state.lock().write_failures = count;
    }

    /// Report a disconnect on the next read
    pub fn disconnect(&self) {
        self.state.lock().disconnect_pending = true;
    }

    /// Refuse the next `count` device opens
    pub fn refuse_connections(&self, count: usize) {
        self.state.lock().refused_connections = count;
    }

    pub fn written(&self) -> Vec<(u32, Message)> {
        self.state.lock().written.clone()
    }

    /// Every channel opened so far, closed ones included
    pub fn opened_channels(&self) -> Vec<OpenedChannel> {
        self.state.lock().channels.clone()
    }

    pub fn open_channel_count(&self) -> usize {
        self.state.lock().channels.iter().filter(|c| !c.closed).count()
    }

    pub fn is_device_open(&self) -> bool {
        self.state.lock().device_open
    }

    pub fn device_opens(&self) -> usize {
        self.state.lock().device_opens
    }

    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }
}

impl PassThruTransport for MockTransport {
    fn open_device(&mut self, _timeout: Duration) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.refused_connections > 0 {
            state.refused_connections -= 1;
            return Err(Error::Disconnected);
        }
        state.device_open = true;
        state.device_opens += 1;
        Ok(())
    }

    fn close_device(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.channels.iter_mut().for_each(|c| c.closed = true);
        state.device_open = false;
        Ok(())
    }

    fn open_channel(&mut self, protocol: ProtocolId, flags: ConnectFlags, baud_rate: u32) -> Result<u32, Error> {
        let mut state = self.state.lock();
        if !state.device_open {
            return Err(Error::NotOpen);
        }

        state.next_handle += 1;
        let handle = state.next_handle;
        state.channels.push(OpenedChannel {
            handle,
            protocol,
            flags,
            baud_rate,
            filters: Vec::new(),
            closed: false,
        });
        debug!("Mock opened channel {} ({} at {})", handle, protocol, baud_rate);
        Ok(handle)
    }

    fn close_channel(&mut self, handle: u32) -> Result<(), Error> {
        self.state.lock().channel_mut(handle)?.closed = true;
        Ok(())
    }

    fn start_filter(&mut self, handle: u32, filter: &Filter) -> Result<u32, Error> {
        let mut state = self.state.lock();
        let channel = state.channel_mut(handle)?;
        channel.filters.push(filter.clone());
        Ok(channel.filters.len() as u32 - 1)
    }

    fn read_messages(&mut self, handle: u32, max_count: usize, timeout: Duration) -> Result<Vec<Message>, Error> {
        {
            let mut state = self.state.lock();
            if std::mem::take(&mut state.disconnect_pending) {
                state.device_open = false;
                state.channels.iter_mut().for_each(|c| c.closed = true);
                return Err(Error::Disconnected);
            }
            state.channel_mut(handle)?;

            let count = max_count.min(state.inbound.len());
            if count > 0 {
                return Ok(state.inbound.drain(..count).collect());
            }
        }

        std::thread::sleep(timeout.min(MAX_IDLE_READ));
        Err(Error::Timeout)
    }

    fn write_messages(&mut self, handle: u32, messages: &[Message], _timeout: Duration) -> Result<usize, Error> {
        let mut state = self.state.lock();
        state.channel_mut(handle)?;
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(Error::WriteFailed("injected failure".into()));
        }

        state.written.extend(messages.iter().cloned().map(|m| (handle, m)));
        Ok(messages.len())
    }
}
