//! # PassThru Simulations
//! Builds replayable simulations out of J2534 PassThru logs, and plays them back against a live PassThru device so
//! diagnostic software can be tested without a vehicle attached.
//!
//! ## Generation Example
//!
//! A log is split into command blocks, parsed into typed expressions, grouped by channel and turned into request and
//! response pairs. The resulting simulation is saved as JSON.
//!
//! ```rust
//! use passthru_sim::config::GeneratorConfig;
//! use passthru_sim::simulation::SimulationGenerator;
//!
//! fn generate(log: &str) -> passthru_sim::Result<()> {
//!     let mut generator = SimulationGenerator::from_log(log, GeneratorConfig::default());
//!     let simulation = generator.generate()?;
//!
//!     for channel in simulation.channels() {
//!         println!("[{}]\t{}\t{} pairs", channel.channel_id, channel.protocol, channel.message_pairs.len());
//!     }
//!     generator.save(".", "session")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Playback Example
//!
//! The player opens the first channel of the simulation and answers every recorded request it sees with the
//! responses logged for it. Any type implementing [`transport::PassThruTransport`] can carry the traffic.
//!
//! ```rust
//! use passthru_sim::config::PlayerConfig;
//! use passthru_sim::player::{PlayerEvent, SimulationPlayer};
//! use passthru_sim::simulation::Simulation;
//! use passthru_sim::transport::MockTransport;
//! use passthru_sim::StreamExt;
//!
//! async fn playback_example() -> passthru_sim::Result<()> {
//!     let simulation = Simulation::load("session.ptsim")?;
//!     let mut player = SimulationPlayer::new(simulation, PlayerConfig::default());
//!     let mut events = player.events();
//!     player.start(MockTransport::new())?;
//!
//!     while let Some(event) = events.next().await {
//!         if let PlayerEvent::MessageProcessed { channel_id, responses, .. } = event.event {
//!             println!("[{}]\tanswered with {} messages", channel_id, responses.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
mod error;
pub mod expression;
pub mod grouping;
pub mod pairing;
pub mod passthru;
pub mod player;
pub mod reconstruct;
pub mod simulation;
pub mod transport;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use tokio_stream::{Stream, StreamExt};
