use passthru_sim::config::GeneratorConfig;
use passthru_sim::expression::{load_expressions, parse_log, CommandKind, PatternTable};
use passthru_sim::grouping::group_by_channel;
use passthru_sim::passthru::{tx_flags, ConnectFlags, FilterType, ProtocolId};
use passthru_sim::reconstruct::frame::unframe;
use passthru_sim::simulation::{GenerationProgress, Simulation, SimulationGenerator};
use pretty_assertions::assert_eq;

static SCENARIO_LOG: &str = "\
PassThru session log
20.000s ++ PTOpen(CarDAQ-Plus, 0x0019FC20)
  returning DeviceID: 1
20.001s   0:STATUS_NOERROR
20.742s ++ PTConnect(1, 6:ISO15765, 0x00000000, 500000, 0x0019FC18)
  returning ChannelID: 5
20.743s   0:STATUS_NOERROR
21.000s ++ PTWriteMsgs(5, 0x0019FB40, 0x0019FB3C, 100)
  Msg[0] 0.000000s. 6:ISO15765. 7 bytes. TxF=0x00000040 = ISO15765_FRAME_PAD
  \\__ 00 00 07 DF 02 01 00
  sent 1 of 1 messages
21.001s   0:STATUS_NOERROR
21.100s ++ PTReadMsgs(5, 0x0019FBF8, 0x0019FBF4, 100)
  Msg[0] 21.098s. 6:ISO15765. 7 bytes. RxS=0x00000000
  \\__ 00 00 07 E8 02 41 00
  read 1 of 1 messages
21.101s   0:STATUS_NOERROR
22.000s ++ PTDisconnect(5)
22.001s   0:STATUS_NOERROR
22.100s ++ PTClose(1)
22.101s   0:STATUS_NOERROR
";

static TWO_CHANNEL_LOG: &str = "\
10.000s ++ PTConnect(1, 6:ISO15765, 0x00000000, 500000, 0x0019FC18)
  returning ChannelID: 5
10.001s   0:STATUS_NOERROR
10.100s ++ PTStartMsgFilter(5, 3:FLOW_CONTROL_FILTER, 0x0019FC00, 0x0019FC10, 0x0019FC20, 0x0019FC30)
  Mask[0] 6:ISO15765. 4 bytes. TxF=0x00000040
  \\__ ff ff ff ff
  Pattern[0] 6:ISO15765. 4 bytes. TxF=0x00000040
  \\__ 00 00 07 e8
  FlowControl[0] 6:ISO15765. 4 bytes. TxF=0x00000040
  \\__ 00 00 07 e0
  returning FilterID: 0
10.101s   0:STATUS_NOERROR
10.200s ++ PTConnect(1, 5:CAN, 0x00000800, 250000, 0x0019FC18)
  returning ChannelID: 7
10.201s   0:STATUS_NOERROR
11.000s ++ PTWriteMsgs(5, 0x0019FB40, 0x0019FB3C, 100)
  Msg[0] 0.000000s. 6:ISO15765. 7 bytes. TxF=0x00000040 = ISO15765_FRAME_PAD
  \\__ 00 00 07 E0 02 10 03
  sent 1 of 1 messages
11.001s   0:STATUS_NOERROR
11.100s ++ PTReadMsgs(5, 0x0019FBF8, 0x0019FBF4, 100)
  Msg[0] 11.050s. 6:ISO15765. 4 bytes. RxS=0x00000009
  \\__ 00 00 07 E0
  Msg[1] 11.098s. 6:ISO15765. 7 bytes. RxS=0x00000000
  \\__ 00 00 07 E8 02 50 03
  read 2 of 10 messages
11.101s   0:STATUS_NOERROR
11.200s ++ PTReadMsgs(5, 0x0019FBF8, 0x0019FBF4, 100)
  Zero messages received
11.201s   0:STATUS_NOERROR
11.300s ++ PTReadMsgs(5, 0x0019FBF8, 0x0019FBF4, 100)
  Msg[0] 11.298s. 6:ISO15765. 7 bytes. RxS=0x00000000
  \\__ 00 00 07 E8 02 50 03
  read 1 of 10 messages
11.301s   0:STATUS_NOERROR
12.000s ++ PTWriteMsgs(7, 0x0019FB40, 0x0019FB3C, 100)
  Msg[0] 0.000000s. 5:CAN. 12 bytes. TxF=0x00000000
  \\__ 00 00 07 DF 02 3E 00 00 00 00 00 00
  sent 1 of 1 messages
12.001s   0:STATUS_NOERROR
12.100s ++ PTReadMsgs(7, 0x0019FBF8, 0x0019FBF4, 100)
  Msg[0] 12.098s. 5:CAN. 12 bytes. RxS=0x00000000
  \\__ 00 00 07 E8 02 7E 00 00 00 00 00 00
  read 1 of 10 messages
12.101s   0:STATUS_NOERROR
12.500s ++ PTWriteMsgs(5, 0x0019FB40, 0x0019FB3C, 100)
  Msg[0] 0.000000s. 6:ISO15765. 6 bytes. TxF=0x00000040 = ISO15765_FRAME_PAD
  \\__ 00 00 07 E0 3E 00
  sent 1 of 1 messages
12.501s   0:STATUS_NOERROR
13.000s ++ PTDisconnect(5)
13.001s   0:STATUS_NOERROR
13.100s ++ PTDisconnect(7)
13.101s   0:STATUS_NOERROR
";

fn generate(log: &str) -> Simulation {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    SimulationGenerator::from_log(log, GeneratorConfig::default()).generate().unwrap()
}

#[test]
fn end_to_end_scenario() {
    let simulation = generate(SCENARIO_LOG);
    assert_eq!(simulation.len(), 1);

    let channel = simulation.channel(5).unwrap();
    assert_eq!(channel.protocol, ProtocolId::ISO15765);
    assert_eq!(channel.baud_rate, 500000);
    assert_eq!(channel.connect_flags, ConnectFlags::NONE);
    assert!(channel.filters.is_empty());
    assert_eq!(channel.message_pairs.len(), 1);

    let pair = &channel.message_pairs[0];
    assert_eq!(pair.request.tx_flags, tx_flags::ISO15765_FRAME_PAD);
    assert_eq!(pair.request.data.len(), 12);
    assert_eq!(unframe(&pair.request.data), vec![0x00, 0x00, 0x07, 0xdf, 0x02, 0x01, 0x00]);
    assert_eq!(pair.responses.len(), 1);
    assert_eq!(unframe(&pair.responses[0].data), vec![0x00, 0x00, 0x07, 0xe8, 0x02, 0x41, 0x00]);
}

#[test]
fn grouping_completeness() {
    let expressions = parse_log(PatternTable::builtin(), TWO_CHANNEL_LOG, 3, None);
    let with_channel = expressions
        .iter()
        .filter(|e| e.channel_id().is_some_and(|id| id != 0))
        .count();

    let buckets = group_by_channel(expressions, 3).unwrap();
    assert_eq!(buckets.iter().map(|b| b.expressions.len()).sum::<usize>(), with_channel);
    assert!(buckets.iter().all(|b| b.channel_id != 0));
    assert_eq!(buckets.iter().map(|b| b.channel_id).collect::<Vec<_>>(), vec![5, 7]);
}

#[test]
fn pairing_invariant() {
    let simulation = generate(TWO_CHANNEL_LOG);
    let channel = simulation.channel(5).unwrap();

    assert_eq!(channel.message_pairs.len(), 2);
    assert_eq!(channel.message_pairs[0].responses.len(), 2);
    assert!(channel.message_pairs[1].responses.is_empty());

    let requests: Vec<&[u8]> = channel.message_pairs.iter().map(|p| p.request.data.as_slice()).collect();
    for pair in &channel.message_pairs {
        assert!(pair.responses.iter().all(|r| !requests.contains(&r.data.as_slice())));
        assert!(pair.responses.iter().all(|r| !r.transmitted()));
    }
}

#[test]
fn deduplicated_traffic() {
    let simulation = generate(TWO_CHANNEL_LOG);
    for channel in simulation.channels() {
        for messages in [&channel.messages_sent, &channel.messages_read] {
            for (i, a) in messages.iter().enumerate() {
                assert!(messages[i + 1..].iter().all(|b| b.data != a.data));
            }
        }
    }
    assert_eq!(simulation.channel(5).unwrap().messages_read.len(), 1);
    assert_eq!(simulation.channel(5).unwrap().messages_sent.len(), 2);
}

#[test]
fn filters_inverted_by_default() {
    let inverted = generate(TWO_CHANNEL_LOG);
    let filter = &inverted.channel(5).unwrap().filters[0];
    assert_eq!(filter.filter_type, FilterType::FlowControl);
    assert_eq!(filter.pattern, "00 00 07 E0");
    assert_eq!(filter.flow_control, "00 00 07 E8");

    let config = GeneratorConfig {
        invert_filters: false,
        ..GeneratorConfig::default()
    };
    let recorded = SimulationGenerator::from_log(TWO_CHANNEL_LOG, config).generate().unwrap();
    let filter = &recorded.channel(5).unwrap().filters[0];
    assert_eq!(filter.pattern, "00 00 07 E8");
    assert_eq!(filter.flow_control, "00 00 07 E0");
    assert_eq!(filter.inverted().inverted(), *filter);
}

#[test]
fn channel_settings_from_connect() {
    let simulation = generate(TWO_CHANNEL_LOG);
    let channel = simulation.channel(7).unwrap();
    assert_eq!(channel.protocol, ProtocolId::CAN);
    assert_eq!(channel.baud_rate, 250000);
    assert_eq!(channel.connect_flags, ConnectFlags::CAN_ID_BOTH);

    let logged = [0x00, 0x00, 0x07, 0xdf, 0x02, 0x3e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    let pair = &channel.message_pairs[0];
    assert_eq!(pair.request.data, logged.to_vec());
    assert_eq!(
        pair.responses[0].data,
        vec![0x00, 0x00, 0x07, 0xe8, 0x02, 0x7e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
    assert_eq!(channel.find_pair(&logged), Some(pair));
}

#[test]
fn round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut generator = SimulationGenerator::from_log(TWO_CHANNEL_LOG, GeneratorConfig::default());
    let path = generator.save(dir.path(), "two_channels").unwrap();

    assert_eq!(path, dir.path().join("two_channels.ptsim"));
    assert!(path.exists());

    let loaded = Simulation::load(&path).unwrap();
    assert_eq!(&loaded, generator.simulation().unwrap());
}

#[test]
fn regenerate_from_expressions_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut parsed = SimulationGenerator::from_log(TWO_CHANNEL_LOG, GeneratorConfig::default());
    let path = parsed.save_expressions(dir.path(), "two_channels").unwrap();
    assert_eq!(path, dir.path().join("two_channels.ptexp"));

    let loaded = load_expressions(&path).unwrap();
    assert_eq!(loaded.as_slice(), parsed.expressions());
    assert_eq!(loaded.len(), 12);

    let mut reloaded = SimulationGenerator::from_expressions_file(&path, GeneratorConfig::default()).unwrap();
    assert_eq!(reloaded.generate().unwrap(), parsed.generate().unwrap());
}

#[test]
fn artifact_accepts_numbers_and_names() {
    let simulation = generate(SCENARIO_LOG);
    let mut json: serde_json::Value = serde_json::from_str(&simulation.to_json().unwrap()).unwrap();
    json[0]["protocol"] = 6.into();
    json[0]["baud_rate"] = "ISO15765_500000".into();
    json[0]["connect_flags"] = "NONE".into();
    json[0]["message_pairs"][0]["request"]["protocol"] = "ISO15765".into();

    let reloaded = Simulation::from_json(&json.to_string()).unwrap();
    assert_eq!(reloaded, simulation);
}

#[test]
fn generation_progress() {
    let mut generator = SimulationGenerator::from_log(TWO_CHANNEL_LOG, GeneratorConfig::default());
    let mut parsing = generator.subscribe_parsing();
    let mut progress = generator.subscribe();
    generator.generate().unwrap();

    let mut parsed = 0;
    while let Ok(p) = parsing.try_recv() {
        parsed = parsed.max(p.parsed);
    }
    assert_eq!(parsed, 12);

    let mut seen = Vec::new();
    while let Ok(p) = progress.try_recv() {
        seen.push(p);
    }
    assert_eq!(seen.first(), Some(&GenerationProgress::Grouped { channels: 2 }));
    assert_eq!(seen.last(), Some(&GenerationProgress::Finished { channels: 2 }));
}

#[test]
fn unknown_commands_pruned() {
    let log = format!("{}23.000s ++ PTGetLastError(0x0019FC00)\n23.001s   0:STATUS_NOERROR\n", SCENARIO_LOG);
    let expressions = parse_log(PatternTable::builtin(), &log, 2, None);
    assert!(expressions.iter().all(|e| e.kind() != CommandKind::Unknown));
    assert_eq!(expressions.len(), 6);
}
