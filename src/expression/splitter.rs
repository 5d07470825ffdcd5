//! Splits a whole PassThru log into command blocks and parses them in parallel.
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::expression::patterns::{CommandKind, PatternTable};
use crate::expression::{parse_expression, Expression};

/// Blocks containing these carry no usable traffic. Dropping them here takes precedence over the parser's empty
/// read fallback.
const SKIPPED_MARKERS: &[&str] = &["BUFFER_EMPTY", "PTReadMsgs() complete"];

/// Progress of [`parse_log`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ParseProgress {
    pub parsed: usize,
    pub total: usize,
}

/// Splits log text at each command header. Text ahead of the first header is discarded.
pub fn split_log<'a>(table: &PatternTable, log: &'a str) -> Vec<&'a str> {
    let starts: Vec<usize> = table.support.header.find_iter(log).map(|m| m.start()).collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let end = starts.get(i + 1).copied().unwrap_or(log.len());
            &log[*start..end]
        })
        .collect()
}

fn is_useful(block: &str) -> bool {
    !block.trim().is_empty() && !SKIPPED_MARKERS.iter().any(|marker| block.contains(marker))
}

/// Parses every useful block of `log` on up to `workers` threads. Expressions come back in log order with unknown
/// commands removed. Progress is published on `progress` when given; nobody needs to be listening.
pub fn parse_log(
    table: &PatternTable,
    log: &str,
    workers: usize,
    progress: Option<&broadcast::Sender<ParseProgress>>,
) -> Vec<Expression> {
    let blocks: Vec<&str> = split_log(table, log).into_iter().filter(|b| is_useful(b)).collect();
    let total = blocks.len();
    if total == 0 {
        return Vec::new();
    }

    let chunk_size = total.div_ceil(workers.max(1));
    let parsed = AtomicUsize::new(0);

    let chunks: Vec<Vec<Expression>> = std::thread::scope(|scope| {
        let handles: Vec<_> = blocks
            .chunks(chunk_size)
            .map(|chunk| {
                let parsed = &parsed;
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|block| {
                            let expression = parse_expression(table, block);
                            let done = parsed.fetch_add(1, Ordering::Relaxed) + 1;
                            if let Some(progress) = progress {
                                let _ = progress.send(ParseProgress { parsed: done, total });
                            }
                            expression
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    });

    let expressions: Vec<Expression> = chunks
        .into_iter()
        .flatten()
        .filter(|e| e.kind() != CommandKind::Unknown)
        .collect();

    let failures = expressions.iter().filter(|e| !e.is_parsed_cleanly()).count();
    debug!("Split log into {} blocks", total);
    info!("Parsed {} expressions, {} with pattern mismatches", expressions.len(), failures);

    expressions
}
