use std::time::Duration;

use passthru_sim::config::PlayerConfig;
use passthru_sim::player::{PlayerEvent, SimulationPlayer};
use passthru_sim::simulation::Simulation;
use passthru_sim::transport::MockTransport;
use passthru_sim::StreamExt;

/// Replays every recorded request of a saved simulation through a mock device and prints what the player answers.
#[tokio::main]
async fn main() -> passthru_sim::Result<()> {
    tracing_subscriber::fmt::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: playback <simulation file>");
        std::process::exit(1);
    };
    let simulation = Simulation::load(path)?;

    let mock = MockTransport::new();
    let mut requests = 0;
    for channel in simulation.channels() {
        for pair in &channel.message_pairs {
            mock.push_inbound(pair.request.clone());
            requests += 1;
        }
    }

    let mut player = SimulationPlayer::new(simulation, PlayerConfig::default());
    let mut events = player.events();
    player.start(mock.clone())?;

    let mut processed = 0;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), events.next()).await {
        match event.event {
            PlayerEvent::MessageProcessed { channel_id, message, responses, sent } => {
                processed += 1;
                println!(
                    "{:>8.3}s [{}] {} -> {} responses (sent: {})",
                    event.elapsed.as_secs_f64(),
                    channel_id,
                    hex::encode(&message.data),
                    responses.len(),
                    sent
                );
            }
            other => println!("{:>8.3}s {:?}", event.elapsed.as_secs_f64(), other),
        }
        if processed == requests {
            break;
        }
    }

    player.stop();
    println!("{} responses written", mock.written().len());
    Ok(())
}
