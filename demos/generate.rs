use passthru_sim::config::GeneratorConfig;
use passthru_sim::simulation::SimulationGenerator;

fn main() -> passthru_sim::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(log_path), out_dir) = (args.next(), args.next()) else {
        eprintln!("usage: generate <log file> [output dir]");
        std::process::exit(1);
    };

    let log = std::fs::read_to_string(&log_path)?;
    let name = std::path::Path::new(&log_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "simulation".into());

    let mut generator = SimulationGenerator::from_log(log, GeneratorConfig::default());
    let simulation = generator.generate()?;
    for channel in simulation.channels() {
        println!(
            "[{}]\t{}\t{}\t{} filters\t{} pairs",
            channel.channel_id,
            channel.protocol,
            channel.baud_rate,
            channel.filters.len(),
            channel.message_pairs.len()
        );
    }

    let path = generator.save(out_dir.unwrap_or_else(|| ".".into()), &name)?;
    println!("Saved {}", path.display());
    Ok(())
}
