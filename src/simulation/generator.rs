//! Builds a simulation from parsed expressions.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::config::GeneratorConfig;
use crate::expression::{
    load_expressions, parse_log, save_expressions, Command, CommandKind, ConnectCommand, Expression, ParseProgress,
    PatternTable,
};
use crate::grouping::{group_by_channel, ChannelBucket};
use crate::pairing::build_pairs;
use crate::passthru::{parse_symbol, parse_u32, ConnectFlags, ProtocolId};
use crate::reconstruct::convert_filter_expression;
use crate::simulation::{distinct_messages, Simulation, SimulationChannel};
use crate::Result;

const PROGRESS_CAPACITY: usize = 64;

/// Generation steps after parsing
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GenerationProgress {
    Grouped { channels: usize },
    Assembled { channel_id: u32, done: usize, total: usize },
    Skipped { channel_id: u32 },
    Finished { channels: usize },
}

struct ChannelSettings {
    protocol: ProtocolId,
    baud_rate: u32,
    connect_flags: ConnectFlags,
}

fn channel_settings(command: &ConnectCommand) -> Option<ChannelSettings> {
    Some(ChannelSettings {
        protocol: parse_symbol(&command.protocol_id, ProtocolId::from_repr)?,
        baud_rate: parse_u32(&command.baud_rate)?,
        connect_flags: parse_u32(&command.connect_flags)?.into(),
    })
}

/// Builds the simulation channel of one bucket. Buckets without a usable connect, or without both written and read
/// traffic, carry nothing to replay and are skipped.
pub fn assemble_channel(mut bucket: ChannelBucket, config: &GeneratorConfig) -> Option<SimulationChannel> {
    let channel_id = bucket.channel_id;
    let has_kind = |kind: CommandKind| bucket.expressions.iter().any(|e| e.kind() == kind);

    if !has_kind(CommandKind::WriteMessages) || !has_kind(CommandKind::ReadMessages) {
        error!("Channel {} needs both written and read messages, skipping", channel_id);
        return None;
    }

    crate::pairing::sort_by_execution_time(&mut bucket.expressions);
    let settings = bucket.expressions.iter().find_map(|e| match &e.command {
        Command::Connect(command) => Some(channel_settings(command)),
        _ => None,
    });
    let settings = match settings {
        Some(Some(settings)) => settings,
        Some(None) => {
            error!("Channel {} has an unreadable connect, skipping", channel_id);
            return None;
        }
        None => {
            error!("Channel {} has no connect, skipping", channel_id);
            return None;
        }
    };

    let mut channel = SimulationChannel::new(channel_id, settings.protocol, settings.baud_rate, settings.connect_flags);
    channel.filters = bucket
        .expressions
        .iter()
        .filter(|e| e.kind() == CommandKind::StartFilter)
        .filter_map(|e| convert_filter_expression(e, config.invert_filters))
        .collect();

    let traffic = build_pairs(&mut bucket.expressions);
    channel.message_pairs = traffic.pairs;
    channel.messages_sent = distinct_messages(traffic.sent);
    channel.messages_read = distinct_messages(traffic.read);

    info!(
        "Assembled channel {} ({}, {} filters, {} pairs)",
        channel_id,
        channel.protocol,
        channel.filters.len(),
        channel.message_pairs.len()
    );
    Some(channel)
}

/// Groups expressions by channel and assembles the channels on up to `worker_threads` threads.
pub fn generate_simulation(
    expressions: Vec<Expression>,
    config: &GeneratorConfig,
    progress: Option<&broadcast::Sender<GenerationProgress>>,
) -> Result<Simulation> {
    let notify = |p: GenerationProgress| {
        if let Some(progress) = progress {
            let _ = progress.send(p);
        }
    };

    let buckets = group_by_channel(expressions, config.worker_threads)?;
    let total = buckets.len();
    notify(GenerationProgress::Grouped { channels: total });

    let workers = config.worker_threads.max(1);
    let mut partitions: Vec<Vec<ChannelBucket>> = (0..workers).map(|_| Vec::new()).collect();
    for (idx, bucket) in buckets.into_iter().enumerate() {
        partitions[idx % workers].push(bucket);
    }

    let simulation = Mutex::new(Simulation::new());
    let done = AtomicUsize::new(0);

    let results: Vec<Result<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = partitions
            .into_iter()
            .map(|partition| {
                let simulation = &simulation;
                let done = &done;
                let notify = &notify;
                scope.spawn(move || -> Result<()> {
                    for bucket in partition {
                        let channel_id = bucket.channel_id;
                        let Some(channel) = assemble_channel(bucket, config) else {
                            notify(GenerationProgress::Skipped { channel_id });
                            continue;
                        };

                        simulation.lock().add_channel(channel)?;

                        notify(GenerationProgress::Assembled {
                            channel_id,
                            done: done.fetch_add(1, Ordering::Relaxed) + 1,
                            total,
                        });
                    }
                    Ok(())
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    });
    results.into_iter().collect::<Result<Vec<()>>>()?;

    let simulation = simulation.into_inner();
    notify(GenerationProgress::Finished {
        channels: simulation.len(),
    });
    info!("Generated simulation with {} of {} channels", simulation.len(), total);
    Ok(simulation)
}

enum Source {
    Log { text: String, table: Option<PatternTable> },
    Expressions(Vec<Expression>),
}

fn output_path(dir: &Path, name: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, extension))
}

/// Turns a log, or already parsed expressions, into a simulation and saves it.
pub struct SimulationGenerator {
    source: Source,
    config: GeneratorConfig,
    simulation: Option<Simulation>,
    parse_progress: broadcast::Sender<ParseProgress>,
    progress: broadcast::Sender<GenerationProgress>,
}

impl SimulationGenerator {
    fn with_source(source: Source, config: GeneratorConfig) -> Self {
        let (parse_progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            source,
            config,
            simulation: None,
            parse_progress,
            progress,
        }
    }

    pub fn new(expressions: Vec<Expression>, config: GeneratorConfig) -> Self {
        Self::with_source(Source::Expressions(expressions), config)
    }

    /// Generator for a whole log parsed with the built-in pattern table
    pub fn from_log(log: impl Into<String>, config: GeneratorConfig) -> Self {
        Self::with_source(
            Source::Log {
                text: log.into(),
                table: None,
            },
            config,
        )
    }

    /// Generator for an expressions file written by [`SimulationGenerator::save_expressions`]
    pub fn from_expressions_file(path: impl AsRef<Path>, config: GeneratorConfig) -> Result<Self> {
        Ok(Self::new(load_expressions(path)?, config))
    }

    /// Parse the log with `table` instead of the built-in patterns
    pub fn with_table(mut self, table: PatternTable) -> Self {
        if let Source::Log { table: current, .. } = &mut self.source {
            *current = Some(table);
        }
        self
    }

    pub fn subscribe_parsing(&self) -> broadcast::Receiver<ParseProgress> {
        self.parse_progress.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GenerationProgress> {
        self.progress.subscribe()
    }

    pub fn simulation(&self) -> Option<&Simulation> {
        self.simulation.as_ref()
    }

    /// The parsed expressions. A log source is parsed on first call and kept in parsed form.
    pub fn expressions(&mut self) -> &[Expression] {
        if let Source::Log { text, table } = &self.source {
            let table = table.as_ref().unwrap_or(PatternTable::builtin());
            let expressions = parse_log(table, text, self.config.worker_threads, Some(&self.parse_progress));
            self.source = Source::Expressions(expressions);
        }

        match &self.source {
            Source::Expressions(expressions) => expressions,
            Source::Log { .. } => &[],
        }
    }

    /// Generates the simulation on first call. Later calls return the same simulation. A failed generation
    /// leaves the expressions in place, so it can be retried.
    pub fn generate(&mut self) -> Result<Simulation> {
        if let Some(simulation) = &self.simulation {
            return Ok(simulation.clone());
        }

        let expressions = self.expressions().to_vec();
        debug!("Generating from {} expressions", expressions.len());

        let simulation = generate_simulation(expressions, &self.config, Some(&self.progress))?;
        self.simulation = Some(simulation.clone());
        Ok(simulation)
    }

    /// Writes the simulation to `<dir>/<name>.<extension>`, generating it first if needed.
    pub fn save(&mut self, dir: impl AsRef<Path>, name: &str) -> Result<PathBuf> {
        let simulation = self.generate()?;
        let path = output_path(dir.as_ref(), name, &self.config.extension);
        simulation.save(&path)?;
        Ok(path)
    }

    /// Writes the parsed expressions to `<dir>/<name>.<expressions_extension>`, parsing the log first if needed.
    pub fn save_expressions(&mut self, dir: impl AsRef<Path>, name: &str) -> Result<PathBuf> {
        let path = output_path(dir.as_ref(), name, &self.config.expressions_extension);
        save_expressions(&path, self.expressions())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::expression::parse_expression;

    fn parse(text: &str) -> Expression {
        parse_expression(PatternTable::builtin(), text)
    }

    fn connect(channel_id: u32) -> Expression {
        parse(&format!(
            "1.000s ++ PTConnect(1, 6:ISO15765, 0x00000800, 500000, 0x0019FC18)\n  returning ChannelID: {channel_id}\n"
        ))
    }

    fn write(channel_id: u32, time: &str) -> Expression {
        parse(&format!(
            "{time} ++ PTWriteMsgs({channel_id}, 0x0019FB40, 0x0019FB3C, 100)\n  \
             Msg[0] 0.000000s. 6:ISO15765. 7 bytes. TxF=0x00000040 = ISO15765_FRAME_PAD\n  \
             \\__ 00 00 07 DF 02 01 00\n  \
             sent 1 of 1 messages\n"
        ))
    }

    fn read(channel_id: u32, time: &str) -> Expression {
        parse(&format!(
            "{time} ++ PTReadMsgs({channel_id}, 0x0019FB40, 0x0019FB3C, 100)\n  \
             Msg[0] {time}. 6:ISO15765. 7 bytes. RxS=0x00000000\n  \
             \\__ 00 00 07 E8 02 41 00\n  \
             read 1 of 1 messages\n"
        ))
    }

    fn bucket(channel_id: u32, expressions: Vec<Expression>) -> ChannelBucket {
        ChannelBucket {
            channel_id,
            expressions,
        }
    }

    #[test]
    fn channel_from_connect() {
        let channel = assemble_channel(
            bucket(5, vec![read(5, "3.000s"), write(5, "2.000s"), connect(5)]),
            &GeneratorConfig::default(),
        )
        .unwrap();

        assert_eq!(channel.protocol, ProtocolId::ISO15765);
        assert_eq!(channel.baud_rate, 500000);
        assert_eq!(channel.connect_flags, ConnectFlags::CAN_ID_BOTH);
        assert_eq!(channel.message_pairs.len(), 1);
        assert_eq!(channel.messages_sent.len(), 1);
        assert_eq!(channel.messages_read.len(), 1);
    }

    #[test]
    fn channel_admission() {
        let config = GeneratorConfig::default();
        assert!(assemble_channel(bucket(5, vec![connect(5), write(5, "2.000s")]), &config).is_none());
        assert!(assemble_channel(bucket(5, vec![write(5, "2.000s"), read(5, "3.000s")]), &config).is_none());
    }

    #[test]
    fn skipped_channels_reported() {
        let (sender, mut receiver) = broadcast::channel(16);
        let expressions = vec![
            connect(5),
            write(5, "2.000s"),
            read(5, "3.000s"),
            connect(7),
            write(7, "4.000s"),
        ];
        let simulation = generate_simulation(expressions, &GeneratorConfig::default(), Some(&sender)).unwrap();
        assert_eq!(simulation.len(), 1);
        assert!(simulation.channel(5).is_some());

        let mut seen = Vec::new();
        while let Ok(progress) = receiver.try_recv() {
            seen.push(progress);
        }
        assert_eq!(seen.first(), Some(&GenerationProgress::Grouped { channels: 2 }));
        assert!(seen.contains(&GenerationProgress::Skipped { channel_id: 7 }));
        assert_eq!(seen.last(), Some(&GenerationProgress::Finished { channels: 1 }));
    }

    #[test]
    fn generate_is_cached() {
        let expressions = vec![connect(5), write(5, "2.000s"), read(5, "3.000s")];
        let mut generator = SimulationGenerator::new(expressions, GeneratorConfig::default());
        let first = generator.generate().unwrap();
        assert_eq!(generator.generate().unwrap(), first);
        assert_eq!(generator.simulation(), Some(&first));
    }

    #[test]
    fn dotted_names_keep_their_dots() {
        let dir = Path::new("out");
        assert_eq!(output_path(dir, "run.v2", "ptsim"), dir.join("run.v2.ptsim"));
        assert_eq!(output_path(dir, "session", "ptexp"), dir.join("session.ptexp"));
    }

    #[test]
    fn failed_save_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let expressions = vec![connect(5), write(5, "2.000s"), read(5, "3.000s")];
        let mut generator = SimulationGenerator::new(expressions.clone(), GeneratorConfig::default());

        assert!(matches!(generator.save_expressions(&missing, "run"), Err(Error::Persistence(_))));
        assert!(matches!(generator.save(&missing, "run"), Err(Error::Persistence(_))));
        assert_eq!(generator.expressions(), expressions.as_slice());

        let path = generator.save(dir.path(), "run.v2").unwrap();
        assert_eq!(path, dir.path().join("run.v2.ptsim"));
        assert!(path.exists());
    }
}
