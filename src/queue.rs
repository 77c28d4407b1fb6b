//! The put / peek / pop protocol, fan-out bookkeeping, and retention
//! pruning. This is the core of the crate; see SPEC_FULL.md §4.5.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::codec;
use crate::error::{Error, Result};
use crate::liveness::LiveFlag;
use crate::queue_data::{self, HighWaterMark, Strategy};
use crate::schema;
use crate::store::{self, ByteDb, Env};

/// Generates a message id as `utc_timestamp_with_fraction ‖ uuid_v4`,
/// UTF-8 encoded. The fractional part is zero-padded to a fixed width so
/// that ids minted within the same second still sort by arrival order of
/// the (unpadded, variable-width) timestamp prefix used by the source;
/// uniqueness is carried entirely by the UUID suffix regardless.
fn new_message_id() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:09}{}", now.as_secs(), now.subsec_nanos(), Uuid::new_v4())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Owns the persistent message flow for one queue directory: put / front /
/// pop, fan-out bookkeeping, and the soft/hard retention passes.
pub struct Queue {
    env: Env,
    path: PathBuf,
    data_db: ByteDb,
    meta_db: ByteDb,
    pending_db: ByteDb,
    hwm: HighWaterMark,
    strategy: Strategy,
    subscriber_ids: BTreeSet<String>,
    live: LiveFlag,
}

impl Queue {
    /// Opens (or re-derives from disk) a queue at `path` backed by `env`.
    /// Creates the five reserved sub-databases if missing, then loads the
    /// configuration and subscriber set via a single read transaction. A
    /// snapshot of the subscriber set is cached here and is not refreshed
    /// until the next `open` (§9 Design Notes). `live` is the flag shared
    /// with the owning `Environment`; every operation below checks it first
    /// so a closed environment invalidates this `Queue` immediately.
    pub(crate) fn open(path: &Path, env: Env, live: LiveFlag) -> Result<Queue> {
        {
            let mut wtxn = env.write_txn().map_err(Error::from)?;
            store::create_db(&env, &mut wtxn, schema::DATA_DB)?;
            store::create_db(&env, &mut wtxn, schema::META_DB)?;
            store::create_db(&env, &mut wtxn, schema::PENDING_DB)?;
            store::create_db(&env, &mut wtxn, schema::QUEUE_DB)?;
            store::create_db(&env, &mut wtxn, schema::SUBSCRIBER_DB)?;
            wtxn.commit().map_err(Error::from)?;
        }

        let rtxn = env.read_txn().map_err(Error::from)?;
        let data = queue_data::retrieve_queue_data(&env, &rtxn, path)?;
        let data_db = store::open_db(&env, &rtxn, schema::DATA_DB)?
            .expect("data_db created above");
        let meta_db = store::open_db(&env, &rtxn, schema::META_DB)?
            .expect("meta_db created above");
        let pending_db = store::open_db(&env, &rtxn, schema::PENDING_DB)?
            .expect("pending_db created above");
        rtxn.commit().map_err(Error::from)?;

        log::debug!(
            "queue opened at {:?}: {} subscribers, strategy {:?}",
            path,
            data.subscriber_ids.len(),
            data.strategy
        );

        Ok(Queue {
            env,
            path: path.to_path_buf(),
            data_db,
            meta_db,
            pending_db,
            hwm: data.hwm,
            strategy: data.strategy,
            subscriber_ids: data.subscriber_ids,
            live,
        })
    }

    pub fn subscriber_ids(&self) -> &BTreeSet<String> {
        &self.subscriber_ids
    }

    fn check_live(&self) -> Result<()> {
        self.live.check()
    }

    fn subscriber_db(&self, rtxn: &store::RoTxn<'_>, sub_id: &str) -> Result<Option<ByteDb>> {
        store::open_db(&self.env, rtxn, sub_id)
    }

    fn required_subscriber_db(&self, rtxn: &store::RoTxn<'_>, sub_id: &str) -> Result<ByteDb> {
        self.subscriber_db(rtxn, sub_id)?.ok_or_else(|| {
            Error::PreconditionViolated(format!("subscriber {sub_id:?} is not registered"))
        })
    }

    /// Publishes one message after running `cleanup`. All bookkeeping
    /// writes for this message happen in a single transaction.
    pub fn put(&self, msg: &[u8]) -> Result<String> {
        self.check_live()?;
        self.cleanup()?;

        let msg_id = new_message_id();
        let mut wtxn = self.env.write_txn().map_err(Error::from)?;
        self.put_one(&mut wtxn, &msg_id, msg)?;
        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;
        Ok(msg_id)
    }

    /// Publishes several messages in one transaction, after a single
    /// `cleanup` pass. Each message still gets its own fresh id.
    pub fn put_many_flush_once(&self, msgs: &[Vec<u8>]) -> Result<Vec<String>> {
        self.check_live()?;
        self.cleanup()?;

        let mut wtxn = self.env.write_txn().map_err(Error::from)?;
        let mut ids = Vec::with_capacity(msgs.len());
        for msg in msgs {
            let msg_id = new_message_id();
            self.put_one(&mut wtxn, &msg_id, msg)?;
            ids.push(msg_id);
        }
        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;
        Ok(ids)
    }

    fn put_one(&self, wtxn: &mut store::RwTxn<'_>, msg_id: &str, msg: &[u8]) -> Result<()> {
        let key = msg_id.as_bytes();
        store::put(
            self.pending_db,
            wtxn,
            key,
            &codec::int_to_bytes(self.subscriber_ids.len() as u64),
        )?;
        store::put(self.meta_db, wtxn, key, &codec::int_to_bytes(now_secs()))?;
        store::put(self.data_db, wtxn, key, msg)?;
        for sub_id in &self.subscriber_ids {
            let sub_db = self
                .subscriber_db(&*wtxn, sub_id)?
                .ok_or_else(|| Error::PreconditionViolated(format!(
                    "subscriber {sub_id:?} has no sub-database"
                )))?;
            store::put(sub_db, wtxn, key, b"")?;
        }
        Ok(())
    }

    /// Non-destructive peek at a subscriber's oldest pending message.
    pub fn front(&self, sub_id: &str) -> Result<(Option<String>, Option<Vec<u8>>)> {
        self.check_live()?;
        let rtxn = self.env.read_txn().map_err(Error::from)?;
        let sub_db = self.required_subscriber_db(&rtxn, sub_id)?;
        match store::first(sub_db, &rtxn)? {
            Some((key, _)) => {
                let msg = store::get(self.data_db, &rtxn, &key)?.map(|v| v.to_vec());
                let msg_id = codec::bytes_to_str(&key)?.to_owned();
                Ok((Some(msg_id), msg))
            }
            None => Ok((None, None)),
        }
    }

    /// Acknowledges and removes a message from a subscriber's inbox. If
    /// `msg_id` is omitted, the current head is popped. Fails with
    /// `ErrorKind::Empty` if the subscriber's inbox is empty.
    pub fn pop(&self, sub_id: &str, msg_id: Option<&str>) -> Result<String> {
        self.check_live()?;
        let mut wtxn = self.env.write_txn().map_err(Error::from)?;
        let sub_db = self.required_subscriber_db(&wtxn, sub_id)?;

        let head = store::first(sub_db, &wtxn)?;
        if head.is_none() {
            return Err(Error::Empty { sub_id: sub_id.to_owned() });
        }
        let key = match msg_id {
            Some(id) => id.as_bytes().to_vec(),
            None => head.unwrap().0,
        };

        let removed = store::delete(sub_db, &mut wtxn, &key)?;
        if removed {
            if let Some(pending_bytes) = store::get(self.pending_db, &wtxn, &key)? {
                let pending = codec::bytes_to_int(pending_bytes)?;
                let decremented = pending.checked_sub(1).ok_or_else(|| {
                    Error::PreconditionViolated(format!(
                        "pending count for message {key:?} would go negative"
                    ))
                })?;
                store::put(self.pending_db, &mut wtxn, &key, &codec::int_to_bytes(decremented))?;
            }
        }

        let popped_id = codec::bytes_to_str(&key)?.to_owned();
        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;
        Ok(popped_id)
    }

    /// Number of messages still waiting in a subscriber's own inbox.
    pub(crate) fn inbox_len(&self, sub_id: &str) -> Result<u64> {
        self.check_live()?;
        let rtxn = self.env.read_txn().map_err(Error::from)?;
        let sub_db = self.required_subscriber_db(&rtxn, sub_id)?;
        Ok(store::stat(sub_db, &rtxn)?.entries as u64)
    }

    /// `count_msgs` — cheap, approximate, read-only entry count of `meta_db`.
    pub fn count_msgs(&self) -> Result<u64> {
        self.check_live()?;
        let rtxn = self.env.read_txn().map_err(Error::from)?;
        let stat = store::stat(self.meta_db, &rtxn)?;
        Ok(stat.entries as u64)
    }

    /// `approx_data_size` — page-based estimate of `data_db`'s on-disk size.
    pub fn approx_data_size(&self) -> Result<u64> {
        self.check_live()?;
        let rtxn = self.env.read_txn().map_err(Error::from)?;
        let stat = store::stat(self.data_db, &rtxn)?;
        let pages = stat.branch_pages + stat.leaf_pages + stat.overflow_pages;
        Ok(stat.page_size as u64 * pages as u64)
    }

    /// Runs the soft pruning pass followed by (independently) the two hard
    /// pruning checks. Both hard-prune checks run even if the first one
    /// already pruned — a `put` can trigger `prune_half_of_messages` twice
    /// in the same `cleanup` call when both thresholds are breached.
    pub fn cleanup(&self) -> Result<()> {
        self.check_live()?;
        self.prune_dangling_messages()?;
        if self.count_msgs()? >= self.hwm.max_messages {
            self.prune_half_of_messages()?;
        }
        if self.approx_data_size()? >= self.hwm.hwm_db_size_bytes {
            self.prune_half_of_messages()?;
        }
        Ok(())
    }

    /// Soft cleanup: removes messages that are either fully consumed
    /// (`pending == 0`) or have aged past `message_timeout_secs`. The
    /// timed-out subset is also stripped from every subscriber's inbox;
    /// zero-pending ids are not (invariant 2 guarantees no inbox still
    /// references them).
    pub fn prune_dangling_messages(&self) -> Result<()> {
        self.check_live()?;
        let rtxn = self.env.read_txn().map_err(Error::from)?;

        let mut zero_pending = Vec::new();
        for (key, value) in store::entries(self.pending_db, &rtxn)? {
            if codec::bytes_to_int(&value)? == 0 {
                zero_pending.push(key);
            }
        }

        let now = now_secs();
        let timeout = self.hwm.message_timeout_secs;
        let mut timed_out = Vec::new();
        for (key, value) in store::entries(self.meta_db, &rtxn)? {
            let created_at = codec::bytes_to_int(&value)?;
            if now.saturating_sub(created_at) > timeout {
                timed_out.push(key);
            }
        }
        rtxn.commit().map_err(Error::from)?;

        if zero_pending.is_empty() && timed_out.is_empty() {
            return Ok(());
        }

        let mut to_delete: BTreeSet<Vec<u8>> = zero_pending.into_iter().collect();
        to_delete.extend(timed_out.iter().cloned());

        let mut wtxn = self.env.write_txn().map_err(Error::from)?;
        for key in &to_delete {
            store::delete(self.pending_db, &mut wtxn, key)?;
            store::delete(self.meta_db, &mut wtxn, key)?;
            store::delete(self.data_db, &mut wtxn, key)?;
        }
        for key in &timed_out {
            for sub_id in &self.subscriber_ids {
                if let Some(sub_db) = self.subscriber_db(&wtxn, sub_id)? {
                    store::delete(sub_db, &mut wtxn, key)?;
                }
            }
        }
        let pruned = to_delete.len();
        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;

        log::debug!("prune_dangling_messages removed {pruned} message(s) at {:?}", self.path);
        Ok(())
    }

    /// Hard cleanup: drops the lexicographically first (or last, under
    /// `PRUNE_LAST`) `⌊entries/2⌋ + 1` ids from every sub-db unconditionally,
    /// including subscriber inboxes that had not yet consumed them.
    pub fn prune_half_of_messages(&self) -> Result<()> {
        self.check_live()?;
        let rtxn = self.env.read_txn().map_err(Error::from)?;
        let entries = store::stat(self.meta_db, &rtxn)?.entries as u64;
        if entries == 0 {
            return Ok(());
        }
        let take = (entries / 2 + 1) as usize;
        let ordered_keys = match self.strategy {
            Strategy::PruneFirst => store::keys_forward(self.meta_db, &rtxn)?,
            Strategy::PruneLast => store::keys_reverse(self.meta_db, &rtxn)?,
        };
        rtxn.commit().map_err(Error::from)?;

        let to_delete: Vec<Vec<u8>> = ordered_keys.into_iter().take(take).collect();

        let mut wtxn = self.env.write_txn().map_err(Error::from)?;
        for key in &to_delete {
            store::delete(self.pending_db, &mut wtxn, key)?;
            store::delete(self.meta_db, &mut wtxn, key)?;
            store::delete(self.data_db, &mut wtxn, key)?;
            for sub_id in &self.subscriber_ids {
                if let Some(sub_db) = self.subscriber_db(&wtxn, sub_id)? {
                    store::delete(sub_db, &mut wtxn, key)?;
                }
            }
        }
        let pruned = to_delete.len();
        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;

        log::info!(
            "prune_half_of_messages dropped {pruned} message(s) under {:?} at {:?}",
            self.strategy,
            self.path
        );
        Ok(())
    }
}
