//! Configuration value objects and the read-only projection gathered from
//! `queue_db` + `subscriber_db` on every `Queue::open`.

use std::collections::BTreeSet;

use crate::codec;
use crate::error::{Error, Result};
use crate::schema;
use crate::store::{self, Env, RoTxn};

pub const DEFAULT_MESSAGE_TIMEOUT_SECS: u64 = 500;
pub const DEFAULT_MAX_MESSAGES: u64 = 1024 * 64;
pub const DEFAULT_HWM_DB_SIZE_BYTES: u64 = 30 * 1024 * 1024 * 1024;

/// Retention limits that trigger `prune_half_of_messages` when breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighWaterMark {
    pub message_timeout_secs: u64,
    pub max_messages: u64,
    pub hwm_db_size_bytes: u64,
}

impl Default for HighWaterMark {
    fn default() -> Self {
        HighWaterMark {
            message_timeout_secs: DEFAULT_MESSAGE_TIMEOUT_SECS,
            max_messages: DEFAULT_MAX_MESSAGES,
            hwm_db_size_bytes: DEFAULT_HWM_DB_SIZE_BYTES,
        }
    }
}

/// Which half of `meta_db` a hard-pruning pass removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Drop the lexicographically smallest (oldest-ish) ids.
    PruneFirst,
    /// Drop the lexicographically largest (newest-ish) ids.
    PruneLast,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::PruneFirst
    }
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::PruneFirst => schema::PRUNE_FIRST_NAME,
            Strategy::PruneLast => schema::PRUNE_LAST_NAME,
        }
    }

    pub fn parse(value: &str) -> Result<Strategy> {
        match value {
            schema::PRUNE_FIRST_NAME => Ok(Strategy::PruneFirst),
            schema::PRUNE_LAST_NAME => Ok(Strategy::PruneLast),
            other => Err(Error::Encoding(format!("unrecognized strategy {other:?}"))),
        }
    }
}

/// The read-only projection of queue configuration: the high-water mark,
/// pruning strategy, and the authoritative subscriber set.
#[derive(Debug, Clone)]
pub struct QueueData {
    pub hwm: HighWaterMark,
    pub strategy: Strategy,
    pub subscriber_ids: BTreeSet<String>,
}

/// Reads the four reserved `queue_db` keys and the `subscriber_db` key set
/// within one read transaction. Fails with `NotInitialized` if `queue_db`
/// or any reserved key is absent.
pub fn retrieve_queue_data(env: &Env, rtxn: &RoTxn<'_>, path: &std::path::Path) -> Result<QueueData> {
    let not_initialized = || Error::NotInitialized { path: path.to_path_buf() };

    let queue_db = store::open_db(env, rtxn, schema::QUEUE_DB)?.ok_or_else(not_initialized)?;

    let message_timeout = store::get(queue_db, rtxn, schema::MESSAGE_TIMEOUT_KEY)?
        .ok_or_else(not_initialized)?;
    let max_messages =
        store::get(queue_db, rtxn, schema::MAX_MESSAGES_KEY)?.ok_or_else(not_initialized)?;
    let hwm_db_size =
        store::get(queue_db, rtxn, schema::HWM_DB_SIZE_KEY)?.ok_or_else(not_initialized)?;
    let strategy_bytes =
        store::get(queue_db, rtxn, schema::STRATEGY_KEY)?.ok_or_else(not_initialized)?;

    let hwm = HighWaterMark {
        message_timeout_secs: codec::bytes_to_int(message_timeout)?,
        max_messages: codec::bytes_to_int(max_messages)?,
        hwm_db_size_bytes: codec::bytes_to_int(hwm_db_size)?,
    };
    let strategy = Strategy::parse(codec::bytes_to_str(strategy_bytes)?)?;

    let subscriber_ids = match store::open_db(env, rtxn, schema::SUBSCRIBER_DB)? {
        Some(sub_db) => store::keys_forward(sub_db, rtxn)?
            .into_iter()
            .map(|key| codec::bytes_to_str(&key).map(|s| s.to_owned()))
            .collect::<Result<BTreeSet<_>>>()?,
        None => BTreeSet::new(),
    };

    Ok(QueueData { hwm, strategy, subscriber_ids })
}
