//! Groups parsed expressions by the channel they ran on.
use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::Error;
use crate::expression::{CommandKind, Expression};

/// Channel id of commands not bound to a channel yet
pub const UNASSIGNED_CHANNEL: u32 = 0;

/// Expressions of one channel. Order is not meaningful until the pair builder sorts them.
#[derive(Debug, Clone)]
pub struct ChannelBucket {
    pub channel_id: u32,
    pub expressions: Vec<Expression>,
}

/// Partitions expressions by their `ChannelID` field on up to `workers` threads. Expressions without that field
/// and unknown commands are dropped first. The unassigned bucket is removed, buckets come back ordered by id.
pub fn group_by_channel(expressions: Vec<Expression>, workers: usize) -> Result<Vec<ChannelBucket>, Error> {
    let workers = workers.max(1);
    let mut partitions: Vec<Vec<(u32, Expression)>> = (0..workers).map(|_| Vec::new()).collect();

    let mut excluded = 0;
    for (idx, expression) in expressions.into_iter().enumerate() {
        match expression.channel_id() {
            Some(channel_id) if expression.kind() != CommandKind::Unknown => {
                partitions[idx % workers].push((channel_id, expression))
            }
            _ => excluded += 1,
        }
    }
    debug!("Excluded {} expressions without a channel", excluded);

    let buckets: Mutex<HashMap<u32, Vec<Expression>>> = Mutex::new(HashMap::new());
    std::thread::scope(|scope| {
        for partition in partitions {
            let buckets = &buckets;
            scope.spawn(move || {
                for (channel_id, expression) in partition {
                    buckets.lock().entry(channel_id).or_default().push(expression);
                }
            });
        }
    });

    let mut buckets = buckets.into_inner();
    if let Some(unassigned) = buckets.remove(&UNASSIGNED_CHANNEL) {
        debug!("Dropped {} unassigned expressions", unassigned.len());
    }
    if buckets.contains_key(&UNASSIGNED_CHANNEL) {
        return Err(Error::UnassignedBucket);
    }

    let mut buckets: Vec<ChannelBucket> = buckets
        .into_iter()
        .map(|(channel_id, expressions)| ChannelBucket {
            channel_id,
            expressions,
        })
        .collect();
    buckets.sort_by_key(|b| b.channel_id);

    info!("Grouped expressions into {} channels", buckets.len());
    Ok(buckets)
}
