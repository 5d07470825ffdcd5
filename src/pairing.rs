//! Pairs every written message of a channel with the reads that followed it.
use tracing::{debug, warn};

use crate::expression::{CommandKind, Expression};
use crate::passthru::Message;
use crate::reconstruct::{convert_read_expression, convert_write_expression};
use crate::simulation::MessagePair;

/// A write expression and the read expressions logged after it, up to the next write.
#[derive(Debug, Clone)]
pub struct ExpressionPair<'a> {
    pub write: &'a Expression,
    pub reads: Vec<&'a Expression>,
}

/// Result of positional pairing over one channel's expressions.
#[derive(Debug, Clone, Default)]
pub struct Pairing<'a> {
    pub pairs: Vec<ExpressionPair<'a>>,
    /// Reads logged before the first write
    pub unpaired: Vec<&'a Expression>,
}

/// Messages of one channel after reconstruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelTraffic {
    pub pairs: Vec<MessagePair>,
    /// Every reconstructed written message, paired or not
    pub sent: Vec<Message>,
    /// Every reconstructed response, paired or not
    pub read: Vec<Message>,
}

/// Stable sort, expressions logged at the same time keep their order.
pub fn sort_by_execution_time(expressions: &mut [Expression]) {
    expressions.sort_by_key(|e| e.execution_time);
}

/// Groups already sorted expressions into pairs. Kinds other than reads and writes are skipped without ending the
/// current pair.
pub fn pair_expressions(expressions: &[Expression]) -> Pairing<'_> {
    let mut pairing = Pairing::default();

    for expression in expressions {
        match expression.kind() {
            CommandKind::WriteMessages => pairing.pairs.push(ExpressionPair {
                write: expression,
                reads: Vec::new(),
            }),
            CommandKind::ReadMessages => match pairing.pairs.last_mut() {
                Some(pair) => pair.reads.push(expression),
                None => pairing.unpaired.push(expression),
            },
            _ => {}
        }
    }

    if !pairing.unpaired.is_empty() {
        debug!("{} reads logged before the first write", pairing.unpaired.len());
    }
    pairing
}

/// Sorts the expressions of a channel, pairs them and rebuilds their messages.
///
/// The request of a pair is the first message of its write expression. Further messages of the same write only
/// count as sent traffic. A write whose messages cannot be rebuilt yields no pair.
pub fn build_pairs(expressions: &mut [Expression]) -> ChannelTraffic {
    sort_by_execution_time(expressions);
    let pairing = pair_expressions(expressions);

    let mut traffic = ChannelTraffic::default();
    for expression in pairing.unpaired {
        traffic.read.extend(convert_read_expression(expression));
    }

    for pair in pairing.pairs {
        let written = convert_write_expression(pair.write);
        let responses: Vec<Message> = pair.reads.into_iter().flat_map(convert_read_expression).collect();

        traffic.read.extend(responses.iter().cloned());
        let Some(request) = written.first().cloned() else {
            warn!("Write at {:?} has no usable message, skipping pair", pair.write.execution_time);
            continue;
        };
        traffic.sent.extend(written);

        debug!(
            "Paired request {} with {} responses",
            hex::encode(&request.data),
            responses.len()
        );
        traffic.pairs.push(MessagePair::new(request, responses));
    }

    traffic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{parse_expression, PatternTable};

    fn parse(text: &str) -> Expression {
        parse_expression(PatternTable::builtin(), text)
    }

    fn write(time: &str, data: &str) -> Expression {
        let size = data.split_whitespace().count();
        parse(&format!(
            "{time} ++ PTWriteMsgs(5, 0x0019FB40, 0x0019FB3C, 100)\n  \
             Msg[0] 0.000000s. 6:ISO15765. {size} bytes. TxF=0x00000040 = ISO15765_FRAME_PAD\n  \
             \\__ {data}\n  \
             sent 1 of 1 messages\n"
        ))
    }

    fn read(time: &str, data: &str) -> Expression {
        let size = data.split_whitespace().count();
        parse(&format!(
            "{time} ++ PTReadMsgs(5, 0x0019FB40, 0x0019FB3C, 100)\n  \
             Msg[0] {time}. 6:ISO15765. {size} bytes. RxS=0x00000000\n  \
             \\__ {data}\n  \
             read 1 of 1 messages\n"
        ))
    }

    fn disconnect(time: &str) -> Expression {
        parse(&format!("{time} ++ PTDisconnect(5)\n"))
    }

    #[test]
    fn reads_follow_their_write() {
        let mut expressions = vec![
            read("3.000s", "00 00 07 E8 02 41 00"),
            write("2.000s", "00 00 07 DF 02 01 00"),
            read("1.000s", "00 00 07 E8 01 00"),
            disconnect("3.500s"),
            read("3.600s", "00 00 07 E8 02 41 01"),
            write("4.000s", "00 00 07 DF 02 01 0C"),
            write("5.000s", "00 00 07 DF 02 01 0D"),
        ];
        sort_by_execution_time(&mut expressions);
        let pairing = pair_expressions(&expressions);

        assert_eq!(pairing.unpaired.len(), 1);
        let counts: Vec<usize> = pairing.pairs.iter().map(|p| p.reads.len()).collect();
        assert_eq!(counts, vec![2, 0, 0]);
        for pair in &pairing.pairs {
            assert_eq!(pair.write.kind(), CommandKind::WriteMessages);
            assert!(pair.reads.iter().all(|r| r.kind() == CommandKind::ReadMessages));
        }
    }

    #[test]
    fn stable_for_equal_times() {
        let mut expressions = vec![
            write("1.000s", "00 00 07 DF 02 01 00"),
            read("1.000s", "00 00 07 E8 02 41 00"),
            write("1.000s", "00 00 07 DF 02 01 0C"),
        ];
        let traffic = build_pairs(&mut expressions);
        assert_eq!(traffic.pairs.len(), 2);
        assert_eq!(traffic.pairs[0].responses.len(), 1);
        assert!(traffic.pairs[1].responses.is_empty());
    }

    #[test]
    fn traffic_includes_unpaired_reads() {
        let mut expressions = vec![
            read("1.000s", "00 00 07 E8 01 00"),
            write("2.000s", "00 00 07 DF 02 01 00"),
            read("3.000s", "00 00 07 E8 02 41 00"),
        ];
        let traffic = build_pairs(&mut expressions);

        assert_eq!(traffic.pairs.len(), 1);
        assert_eq!(traffic.sent.len(), 1);
        assert_eq!(traffic.read.len(), 2);
        assert_eq!(traffic.pairs[0].request.data.len(), 12);
        assert_eq!(traffic.pairs[0].responses[0].data, vec![0x00, 0x00, 0x07, 0xe8, 0x02, 0x41, 0x00]);
    }

    #[test]
    fn write_without_messages_is_skipped() {
        let mut expressions = vec![
            parse("1.000s ++ PTWriteMsgs(5, 0x0019FB40, 0x0019FB3C, 100)\n  sent 0 of 1 messages\n"),
            read("2.000s", "00 00 07 E8 02 41 00"),
        ];
        let traffic = build_pairs(&mut expressions);
        assert!(traffic.pairs.is_empty());
        assert_eq!(traffic.read.len(), 1);
    }
}
