//! Simulations: recorded channels with their request and response pairs, and their persisted JSON form.
//! ## Example
//! ```rust
//! use passthru_sim::config::GeneratorConfig;
//! use passthru_sim::simulation::SimulationGenerator;
//!
//! fn generate(log: &str) -> passthru_sim::Result<std::path::PathBuf> {
//!     let mut generator = SimulationGenerator::from_log(log, GeneratorConfig::default());
//!     let simulation = generator.generate()?;
//!     println!("{} channels", simulation.len());
//!
//!     generator.save(std::env::temp_dir(), "session")
//! }
//! ```

mod channel;
mod generator;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Error;
use crate::Result;

pub use channel::{distinct_messages, MessagePair, SimulationChannel};
pub use generator::{assemble_channel, generate_simulation, GenerationProgress, SimulationGenerator};

/// Channels of a simulation, ordered and unique by channel id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SimulationChannel>", into = "Vec<SimulationChannel>")]
pub struct Simulation {
    channels: BTreeMap<u32, SimulationChannel>,
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel. A channel id may only be used once.
    pub fn add_channel(&mut self, channel: SimulationChannel) -> Result<()> {
        if self.channels.contains_key(&channel.channel_id) {
            return Err(Error::DuplicateChannel(channel.channel_id));
        }
        self.channels.insert(channel.channel_id, channel);
        Ok(())
    }

    pub fn remove_channel(&mut self, channel_id: u32) -> Option<SimulationChannel> {
        self.channels.remove(&channel_id)
    }

    pub fn channel(&self, channel_id: u32) -> Option<&SimulationChannel> {
        self.channels.get(&channel_id)
    }

    /// Channels in id order
    pub fn channels(&self) -> impl Iterator<Item = &SimulationChannel> {
        self.channels.values()
    }

    pub fn first_channel(&self) -> Option<&SimulationChannel> {
        self.channels.values().next()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Simulation> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!("Saved simulation with {} channels to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Simulation> {
        let path = path.as_ref();
        let simulation = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!("Loaded simulation with {} channels from {}", simulation.len(), path.display());
        Ok(simulation)
    }
}

impl TryFrom<Vec<SimulationChannel>> for Simulation {
    type Error = Error;

    fn try_from(channels: Vec<SimulationChannel>) -> Result<Self> {
        let mut simulation = Simulation::new();
        for channel in channels {
            simulation.add_channel(channel)?;
        }
        Ok(simulation)
    }
}

impl From<Simulation> for Vec<SimulationChannel> {
    fn from(simulation: Simulation) -> Self {
        simulation.channels.into_values().collect()
    }
}
