//! Replays a simulation against a live PassThru device.
//! ## Example
//! ```rust
//! use std::time::Duration;
//!
//! use passthru_sim::config::PlayerConfig;
//! use passthru_sim::player::{PlayerState, SimulationPlayer};
//! use passthru_sim::simulation::Simulation;
//! use passthru_sim::transport::MockTransport;
//! use passthru_sim::StreamExt;
//!
//! async fn playback(simulation: Simulation) -> passthru_sim::Result<()> {
//!     let mut player = SimulationPlayer::new(simulation, PlayerConfig::default());
//!     let mut events = player.events();
//!
//!     player.start(MockTransport::new())?;
//!     player.wait_for_state(|s| matches!(s, PlayerState::ChannelOpen(_)), Duration::from_secs(1)).await?;
//!
//!     if let Some(event) = events.next().await {
//!         println!("{:?}", event);
//!     }
//!     player.stop();
//!     Ok(())
//! }
//! ```

mod session;
mod types;

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::error;

use crate::config::PlayerConfig;
use crate::error::Error;
use crate::simulation::Simulation;
use crate::transport::PassThruTransport;
use crate::{Result, Stream};

use session::Session;
pub use types::{PlayerCommand, PlayerEvent, PlayerState, TimedEvent};

const EVENT_BUFFER_SIZE: usize = 1024;
const CONTROL_BUFFER_SIZE: usize = 16;

struct Running {
    handle: std::thread::JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
    control: mpsc::Sender<PlayerCommand>,
}

/// Runs playback on a background thread. State is observed through [`SimulationPlayer::state`] and the event
/// stream, control goes in through the methods below.
pub struct SimulationPlayer {
    simulation: Arc<Simulation>,
    config: PlayerConfig,
    state_sender: Arc<watch::Sender<PlayerState>>,
    state: watch::Receiver<PlayerState>,
    events: broadcast::Sender<TimedEvent>,
    running: Option<Running>,
}

impl SimulationPlayer {
    pub fn new(simulation: Simulation, config: PlayerConfig) -> Self {
        let (state_sender, state) = watch::channel(PlayerState::Idle);
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);

        Self {
            simulation: Arc::new(simulation),
            config,
            state_sender: Arc::new(state_sender),
            state,
            events,
            running: None,
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Starts playback on `transport`. The player owns the transport until playback ends. A player whose loop
    /// already ended on its own can be started again.
    pub fn start<T: PassThruTransport + 'static>(&mut self, transport: T) -> Result<()> {
        if let Some(running) = &self.running {
            if !running.handle.is_finished() && !self.state().is_finished() {
                return Err(Error::PlayerRunning);
            }
            self.stop();
        }

        let (shutdown, shutdown_receiver) = oneshot::channel();
        let (control, control_receiver) = mpsc::channel(CONTROL_BUFFER_SIZE);
        let session = Session::new(
            transport,
            self.simulation.clone(),
            self.config.clone(),
            self.state_sender.clone(),
            self.events.clone(),
        );

        let handle = std::thread::spawn(move || session.run(shutdown_receiver, control_receiver));
        self.running = Some(Running {
            handle,
            shutdown,
            control,
        });
        Ok(())
    }

    /// Stops playback at the next loop boundary and waits for the device to be released.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            // Already gone if the loop faulted
            let _ = running.shutdown.send(());
            if running.handle.join().is_err() {
                error!("Playback thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.handle.is_finished())
    }

    /// Enables or disables sending recorded responses. Applies at the next loop boundary.
    pub fn set_responses_enabled(&mut self, enabled: bool) {
        self.config.responses_enabled = enabled;
        if let Some(running) = &self.running {
            if running.control.try_send(PlayerCommand::SetResponsesEnabled(enabled)).is_err() {
                error!("Player control queue full, responses toggle dropped");
            }
        }
    }

    pub fn state(&self) -> PlayerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PlayerState> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate`, failing with [`Error::Timeout`].
    pub async fn wait_for_state(
        &self,
        predicate: impl FnMut(&PlayerState) -> bool,
        timeout: Duration,
    ) -> Result<PlayerState> {
        let mut state = self.state.clone();
        let result = tokio::time::timeout(timeout, state.wait_for(predicate)).await?;
        result.map(|s| *s).map_err(|_| Error::NotFound)
    }

    pub async fn wait_until_finished(&self, timeout: Duration) -> Result<PlayerState> {
        self.wait_for_state(|s| s.is_finished(), timeout).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.events.subscribe()
    }

    /// Events from now on. Events missed by a slow reader are skipped.
    pub fn events(&self) -> impl Stream<Item = TimedEvent> + Unpin {
        let mut rx = self.events.subscribe();

        Box::pin(stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Drop for SimulationPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
