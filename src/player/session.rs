//! The playback loop. Owns the transport for the lifetime of one playback.
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::types::{PlayerCommand, PlayerEvent, PlayerState, TimedEvent};
use crate::config::PlayerConfig;
use crate::passthru::{FilterType, Message};
use crate::simulation::{MessagePair, Simulation, SimulationChannel};
use crate::transport::{Error, PassThruTransport};

/// Filters of `channel` in the order they are started. Flow control filters whose flow control message appears in
/// `response` go first.
pub(crate) fn filter_order<'a>(
    channel: &'a SimulationChannel,
    response: Option<&Message>,
) -> Vec<&'a crate::passthru::Filter> {
    let Some(response) = response else {
        return channel.filters.iter().collect();
    };

    let (preferred, rest): (Vec<_>, Vec<_>) = channel.filters.iter().partition(|filter| {
        filter.filter_type == FilterType::FlowControl
            && filter
                .flow_control_bytes()
                .is_some_and(|flow| !flow.is_empty() && response.data.windows(flow.len()).any(|w| w == flow))
    });
    preferred.into_iter().chain(rest).collect()
}

pub(crate) struct Session<T: PassThruTransport> {
    transport: T,
    simulation: Arc<Simulation>,
    config: PlayerConfig,
    state: Arc<watch::Sender<PlayerState>>,
    events: broadcast::Sender<TimedEvent>,
    started: Instant,
    /// Live channel handle
    handle: Option<u32>,
    /// Simulation channel the live channel is configured for
    current: Option<u32>,
}

impl<T: PassThruTransport> Session<T> {
    pub(crate) fn new(
        transport: T,
        simulation: Arc<Simulation>,
        config: PlayerConfig,
        state: Arc<watch::Sender<PlayerState>>,
        events: broadcast::Sender<TimedEvent>,
    ) -> Self {
        Self {
            transport,
            simulation,
            config,
            state,
            events,
            started: Instant::now(),
            handle: None,
            current: None,
        }
    }

    fn emit(&self, event: PlayerEvent) {
        // Nobody listening is fine
        let _ = self.events.send(TimedEvent {
            elapsed: self.started.elapsed(),
            event,
        });
    }

    fn set_state(&self, state: PlayerState) {
        if self.state.send_replace(state) != state {
            debug!("Player state {}", state);
            self.emit(PlayerEvent::StateChanged(state));
        }
    }

    fn apply(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::SetResponsesEnabled(enabled) => {
                info!("Responses {}", if enabled { "enabled" } else { "disabled" });
                self.config.responses_enabled = enabled;
            }
        }
    }

    /// Runs until shutdown or an unrecoverable transport failure. Always releases the device.
    pub(crate) fn run(mut self, mut shutdown: oneshot::Receiver<()>, mut control: mpsc::Receiver<PlayerCommand>) {
        self.set_state(PlayerState::Connecting);

        let mut faulted = match self.connect() {
            Ok(()) => false,
            Err(e) => {
                error!("Playback could not connect: {}", e);
                true
            }
        };

        while !faulted && matches!(shutdown.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            while let Ok(command) = control.try_recv() {
                self.apply(command);
            }

            let result = self.read().and_then(|messages| {
                messages.into_iter().try_for_each(|message| self.handle_message(message))
            });

            match result {
                Ok(()) | Err(Error::Timeout) => {}
                Err(e) => {
                    warn!("Playback transport failure: {}", e);
                    if let Err(e) = self.reconnect() {
                        error!("Playback giving up: {}", e);
                        faulted = true;
                    }
                }
            }
        }

        self.close();
        self.set_state(match faulted {
            true => PlayerState::Faulted,
            false => PlayerState::Stopped,
        });
    }

    fn connect(&mut self) -> Result<(), Error> {
        let first = self.simulation.first_channel().map(|c| c.channel_id).ok_or(Error::NotOpen)?;
        self.transport.open_device(self.config.connect_timeout)?;
        self.open(first, None)
    }

    /// Opens a live channel configured like simulation channel `channel_id` and starts its filters.
    fn open(&mut self, channel_id: u32, response: Option<&Message>) -> Result<(), Error> {
        let simulation = self.simulation.clone();
        let channel = simulation.channel(channel_id).ok_or(Error::NotOpen)?;

        let handle = self
            .transport
            .open_channel(channel.protocol, channel.connect_flags, channel.baud_rate)?;
        self.handle = Some(handle);

        for filter in filter_order(channel, response) {
            match self.transport.start_filter(handle, filter) {
                Ok(id) => debug!("Started {} {} on channel {}", filter.filter_type, id, channel_id),
                Err(Error::Disconnected) => return Err(Error::Disconnected),
                Err(e) => warn!("Filter {:?} not started: {}", filter, e),
            }
        }

        let previous = self.current.replace(channel_id);
        if previous != Some(channel_id) {
            info!("Playing channel {} ({} at {})", channel_id, channel.protocol, channel.baud_rate);
            self.emit(PlayerEvent::ChannelChanged {
                from: previous,
                to: channel_id,
            });
        }
        self.set_state(PlayerState::ChannelOpen(channel_id));
        Ok(())
    }

    fn close_channel(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.transport.close_channel(handle) {
                debug!("Closing channel {} failed: {}", handle, e);
            }
        }
    }

    fn close(&mut self) {
        self.close_channel();
        if let Err(e) = self.transport.close_device() {
            debug!("Closing device failed: {}", e);
        }
    }

    fn read(&mut self) -> Result<Vec<Message>, Error> {
        let handle = self.handle.ok_or(Error::NotOpen)?;
        self.transport
            .read_messages(handle, self.config.read_count, self.config.read_timeout)
    }

    /// Pair matching `message`, looking at the current channel first, then the others in id order.
    fn find_match(&self, message: &Message) -> Option<(u32, MessagePair)> {
        let current = self.current.and_then(|id| self.simulation.channel(id));
        current
            .into_iter()
            .chain(self.simulation.channels().filter(|c| Some(c.channel_id) != self.current))
            .find_map(|channel| channel.find_pair(&message.data).map(|pair| (channel.channel_id, pair.clone())))
    }

    fn handle_message(&mut self, message: Message) -> Result<(), Error> {
        if message.transmitted() || message.start_of_message() {
            return Ok(());
        }
        debug!("RX {}", hex::encode(&message.data));

        let Some((channel_id, pair)) = self.find_match(&message) else {
            debug!("No recorded request matches {}", hex::encode(&message.data));
            self.emit(PlayerEvent::MessageUnmatched(message));
            return Ok(());
        };

        if pair.responses.is_empty() {
            self.emit(PlayerEvent::MessageProcessed {
                channel_id,
                message,
                responses: pair.responses,
                sent: false,
            });
            return Ok(());
        }

        if self.current != Some(channel_id) {
            self.switch(channel_id, &pair.responses[0])?;
        }
        let sent = match self.config.responses_enabled {
            true => self.respond(&pair.responses)?,
            false => false,
        };

        self.emit(PlayerEvent::MessageProcessed {
            channel_id,
            message,
            responses: pair.responses,
            sent,
        });
        Ok(())
    }

    fn switch(&mut self, channel_id: u32, response: &Message) -> Result<(), Error> {
        info!("Switching to channel {}", channel_id);
        self.close_channel();
        self.open(channel_id, Some(response))
    }

    /// Writes responses with bounded retries. Returns whether they went out. A disconnect ends the attempts.
    fn respond(&mut self, responses: &[Message]) -> Result<bool, Error> {
        let handle = self.handle.ok_or(Error::NotOpen)?;

        for attempt in 1..=self.config.response_attempts.max(1) {
            match self
                .transport
                .write_messages(handle, responses, self.config.response_timeout)
            {
                Ok(count) if count == responses.len() => {
                    for response in responses {
                        debug!("TX {}", hex::encode(&response.data));
                    }
                    return Ok(true);
                }
                Ok(count) => warn!("Attempt {}: wrote {} of {} responses", attempt, count, responses.len()),
                Err(Error::Disconnected) => return Err(Error::Disconnected),
                Err(e) => warn!("Attempt {}: writing responses failed: {}", attempt, e),
            }
        }

        error!("Responses not sent after {} attempts", self.config.response_attempts);
        Ok(false)
    }

    /// Reopens the device and the current channel, waiting the backoff before each cycle.
    fn reconnect(&mut self) -> Result<(), Error> {
        let channel_id = self.current.ok_or(Error::NotOpen)?;
        self.set_state(PlayerState::Connecting);

        for attempt in 1..=self.config.reconnect_attempts {
            std::thread::sleep(self.config.reconnect_backoff);
            self.close();

            let result = self
                .transport
                .open_device(self.config.connect_timeout)
                .and_then(|_| self.open(channel_id, None));
            match result {
                Ok(()) => {
                    info!("Reconnected after {} attempts", attempt);
                    return Ok(());
                }
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
            }
        }

        Err(Error::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passthru::{ConnectFlags, Filter, ProtocolId};

    fn filter(filter_type: FilterType, flow_control: &str) -> Filter {
        Filter {
            filter_type,
            protocol: ProtocolId::ISO15765,
            flags: 0x40,
            mask: "FF FF FF FF".into(),
            pattern: "00 00 07 DF".into(),
            flow_control: flow_control.into(),
        }
    }

    #[test]
    fn flow_control_for_response_first() {
        let mut channel = SimulationChannel::new(5, ProtocolId::ISO15765, 500000, ConnectFlags::NONE);
        channel.filters = vec![
            filter(FilterType::Pass, ""),
            filter(FilterType::FlowControl, "00 00 07 E0"),
            filter(FilterType::FlowControl, "00 00 07 E8"),
        ];
        let response = Message::new(ProtocolId::ISO15765, &[0x00, 0x00, 0x07, 0xe8, 0x02, 0x41, 0x00]);

        let ordered: Vec<&str> = filter_order(&channel, Some(&response))
            .iter()
            .map(|f| f.flow_control.as_str())
            .collect();
        assert_eq!(ordered, vec!["00 00 07 E8", "", "00 00 07 E0"]);

        assert_eq!(filter_order(&channel, None).len(), 3);
    }
}
