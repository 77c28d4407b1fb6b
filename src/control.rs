//! Administrative surface: initialize or re-open a queue, register and
//! remove subscribers, clear subscribers, force-prune, and write the
//! high-water mark / strategy configuration. One `Control` per environment.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::codec;
use crate::error::{Error, Result};
use crate::liveness::LiveFlag;
use crate::queue::Queue;
use crate::queue_data::{self, HighWaterMark, Strategy};
use crate::schema;
use crate::store::{self, Env};

pub struct Control {
    env: Env,
    path: PathBuf,
    subscriber_ids: BTreeSet<String>,
    queue: Option<Queue>,
    closed: bool,
    live: LiveFlag,
}

impl Control {
    pub(crate) fn new(path: PathBuf, env: Env, live: LiveFlag) -> Control {
        Control { env, path, subscriber_ids: BTreeSet::new(), queue: None, closed: false, live }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    fn check_open(&self) -> Result<()> {
        self.live.check()?;
        if self.closed {
            return Err(Error::PreconditionViolated("control is closed".into()));
        }
        Ok(())
    }

    pub fn subscriber_ids(&self) -> &BTreeSet<String> {
        &self.subscriber_ids
    }

    /// True iff `queue_db` exists and carries all four reserved config keys.
    pub fn is_initialized(&self) -> Result<bool> {
        self.check_open()?;
        let rtxn = self.env.read_txn().map_err(Error::from)?;
        match queue_data::retrieve_queue_data(&self.env, &rtxn, &self.path) {
            Ok(_) => Ok(true),
            Err(Error::NotInitialized { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// If already initialized, re-derives cached state from what's on disk
    /// (the `subscribers`/`hwm`/`strategy` arguments are then ignored).
    /// Otherwise writes the given configuration, registers each subscriber,
    /// and opens the queue for the first time.
    pub fn init(
        &mut self,
        subscriber_ids: Option<BTreeSet<String>>,
        hwm: HighWaterMark,
        strategy: Strategy,
    ) -> Result<()> {
        self.check_open()?;
        if self.is_initialized()? {
            let queue = Queue::open(&self.path, self.env.clone(), self.live.clone())?;
            self.subscriber_ids = queue.subscriber_ids().clone();
            self.queue = Some(queue);
            return Ok(());
        }

        let subs = subscriber_ids.unwrap_or_default();
        self.set_hwm(hwm)?;
        self.set_strategy(strategy)?;
        for sub_id in &subs {
            self.add_sub(sub_id)?;
        }
        self.queue = Some(Queue::open(&self.path, self.env.clone(), self.live.clone())?);
        log::info!("queue initialized at {:?} with {} subscriber(s)", self.path, subs.len());
        Ok(())
    }

    /// Creates a subscriber's sub-database and registers its id in
    /// `subscriber_db`. Pre-condition: the id must not contain spaces.
    pub fn add_sub(&mut self, sub_id: &str) -> Result<()> {
        self.check_open()?;
        if !schema::is_valid_subscriber_id(sub_id) {
            return Err(Error::PreconditionViolated(format!(
                "subscriber id {sub_id:?} must be non-empty and contain no spaces"
            )));
        }

        let mut wtxn = self.env.write_txn().map_err(Error::from)?;
        store::create_db(&self.env, &mut wtxn, sub_id)?;
        let subscriber_db = store::create_db(&self.env, &mut wtxn, schema::SUBSCRIBER_DB)?;
        store::put(subscriber_db, &mut wtxn, sub_id.as_bytes(), b"")?;
        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;

        self.subscriber_ids.insert(sub_id.to_owned());
        log::info!("subscriber {sub_id:?} added at {:?}", self.path);
        Ok(())
    }

    /// Drops a subscriber's sub-database and decrements `pending_db` for
    /// every message it still referenced. Idempotent: a missing subscriber
    /// is not an error.
    pub fn remove_sub(&mut self, sub_id: &str) -> Result<()> {
        self.check_open()?;
        let mut wtxn = self.env.write_txn().map_err(Error::from)?;

        let mut msg_ids = Vec::new();
        if let Some(sub_db) = store::open_db(&self.env, &wtxn, sub_id)? {
            msg_ids = store::keys_forward(sub_db, &wtxn)?;
            // SAFETY: no other handle to this sub-db is held across this call.
            unsafe { store::clear_and_delete(sub_db, &mut wtxn)? };
        }

        if let Some(pending_db) = store::open_db(&self.env, &wtxn, schema::PENDING_DB)? {
            decrement_pending(pending_db, &mut wtxn, &msg_ids)?;
        }

        if let Some(subscriber_db) = store::open_db(&self.env, &wtxn, schema::SUBSCRIBER_DB)? {
            store::delete(subscriber_db, &mut wtxn, sub_id.as_bytes())?;
        }

        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;
        self.subscriber_ids.remove(sub_id);
        log::info!("subscriber {sub_id:?} removed at {:?}", self.path);
        Ok(())
    }

    /// For each known subscriber, drops its sub-database; drops (without
    /// deleting) `pending_db`, `meta_db`, and `data_db`.
    pub fn clear_all_subscribers(&self) -> Result<()> {
        self.check_open()?;
        let mut wtxn = self.env.write_txn().map_err(Error::from)?;

        for sub_id in &self.subscriber_ids {
            if let Some(sub_db) = store::open_db(&self.env, &wtxn, sub_id)? {
                unsafe { store::clear_and_delete(sub_db, &mut wtxn)? };
            }
        }
        for name in [schema::PENDING_DB, schema::META_DB, schema::DATA_DB] {
            if let Some(db) = store::open_db(&self.env, &wtxn, name)? {
                store::clear(db, &mut wtxn)?;
            }
        }

        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;
        log::info!("all subscribers cleared at {:?}", self.path);
        Ok(())
    }

    /// Delegates to the queue's soft pruning pass.
    pub fn prune_dangling_messages(&self) -> Result<()> {
        self.check_open()?;
        self.queue
            .as_ref()
            .ok_or_else(|| Error::NotInitialized { path: self.path.clone() })?
            .prune_dangling_messages()
    }

    /// Drops the contents (not the DBI) of one subscriber's inbox and
    /// decrements `pending_db` for every message it held.
    pub fn prune_all_messages_for(&self, sub_id: &str) -> Result<()> {
        self.check_open()?;
        let mut wtxn = self.env.write_txn().map_err(Error::from)?;

        let mut msg_ids = Vec::new();
        if let Some(sub_db) = store::open_db(&self.env, &wtxn, sub_id)? {
            msg_ids = store::keys_forward(sub_db, &wtxn)?;
            store::clear(sub_db, &mut wtxn)?;
        }
        if let Some(pending_db) = store::open_db(&self.env, &wtxn, schema::PENDING_DB)? {
            decrement_pending(pending_db, &mut wtxn, &msg_ids)?;
        }

        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;
        Ok(())
    }

    /// Writes `hwm` into `queue_db`. Takes effect only on the next `open`.
    pub fn set_hwm(&self, hwm: HighWaterMark) -> Result<()> {
        self.check_open()?;
        let mut wtxn = self.env.write_txn().map_err(Error::from)?;
        let queue_db = store::create_db(&self.env, &mut wtxn, schema::QUEUE_DB)?;
        store::put(
            queue_db,
            &mut wtxn,
            schema::HWM_DB_SIZE_KEY,
            &codec::int_to_bytes(hwm.hwm_db_size_bytes),
        )?;
        store::put(
            queue_db,
            &mut wtxn,
            schema::MAX_MESSAGES_KEY,
            &codec::int_to_bytes(hwm.max_messages),
        )?;
        store::put(
            queue_db,
            &mut wtxn,
            schema::MESSAGE_TIMEOUT_KEY,
            &codec::int_to_bytes(hwm.message_timeout_secs),
        )?;
        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;
        Ok(())
    }

    /// Writes `strategy` into `queue_db`. Takes effect only on the next `open`.
    pub fn set_strategy(&self, strategy: Strategy) -> Result<()> {
        self.check_open()?;
        let mut wtxn = self.env.write_txn().map_err(Error::from)?;
        let queue_db = store::create_db(&self.env, &mut wtxn, schema::QUEUE_DB)?;
        store::put(
            queue_db,
            &mut wtxn,
            schema::STRATEGY_KEY,
            strategy.as_str().as_bytes(),
        )?;
        wtxn.commit().map_err(|err| Error::from_storage(&self.path, err))?;
        Ok(())
    }
}

fn decrement_pending(
    pending_db: store::ByteDb,
    wtxn: &mut store::RwTxn<'_>,
    msg_ids: &[Vec<u8>],
) -> Result<()> {
    for key in msg_ids {
        if let Some(value) = store::get(pending_db, &*wtxn, key)? {
            let pending = codec::bytes_to_int(value)?;
            let decremented = pending.checked_sub(1).ok_or_else(|| {
                Error::PreconditionViolated("pending count for message would go negative".into())
            })?;
            store::put(pending_db, wtxn, key, &codec::int_to_bytes(decremented))?;
        }
    }
    Ok(())
}
