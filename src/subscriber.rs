//! Thin facade over `Queue` exposing `receive`/`receive_to_top` as a
//! scoped-acquisition API: the returned guard acks the message on drop,
//! including on an early return or unwind out of the caller's scope — the
//! source's observed behaviour, preserved per SPEC_FULL.md §9.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::liveness::LiveFlag;
use crate::queue::Queue;
use crate::store::Env;

pub struct Subscriber {
    queue: Queue,
}

impl Subscriber {
    pub(crate) fn new(path: &Path, env: Env, live: LiveFlag) -> Result<Subscriber> {
        Ok(Subscriber { queue: Queue::open(path, env, live)? })
    }

    /// Escape hatch onto the underlying `Queue` for callers that need
    /// `front`/`pop`/`count_msgs` directly instead of the scoped-acquisition API.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Polls `front(sub_id)` up to `retries` times spaced `timeout/retries`
    /// apart. The returned guard's payload is `None` if the deadline
    /// elapsed with nothing to deliver; otherwise the guard acks the
    /// message (via `Queue::pop(sub_id, msg_id)`) when it is dropped.
    pub fn receive(&self, sub_id: &str, timeout_secs: u64, retries: u32) -> Result<Received<'_>> {
        precondition(timeout_secs, retries)?;

        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let interval = Duration::from_secs_f64(timeout_secs as f64 / retries as f64);

        loop {
            let (msg_id, payload) = self.queue.front(sub_id)?;
            if msg_id.is_some() {
                return Ok(Received {
                    queue: &self.queue,
                    sub_id: sub_id.to_owned(),
                    msg_id,
                    payload,
                });
            }
            if Instant::now() >= deadline {
                return Ok(Received {
                    queue: &self.queue,
                    sub_id: sub_id.to_owned(),
                    msg_id: None,
                    payload: None,
                });
            }
            thread::sleep(interval);
        }
    }

    /// First discards all but the last entry currently in the subscriber's
    /// inbox (each discard goes through the ordinary `pop` path and
    /// decrements `pending_db` exactly like any other pop), then performs a
    /// normal `receive` on the remaining head.
    pub fn receive_to_top(&self, sub_id: &str, timeout_secs: u64, retries: u32) -> Result<Received<'_>> {
        precondition(timeout_secs, retries)?;

        let entries = self.queue.inbox_len(sub_id)?;
        if entries > 0 {
            for _ in 0..entries - 1 {
                match self.queue.pop(sub_id, None) {
                    Ok(_) => {}
                    Err(Error::Empty { .. }) => break,
                    Err(err) => return Err(err),
                }
            }
        }

        self.receive(sub_id, timeout_secs, retries)
    }
}

fn precondition(timeout_secs: u64, retries: u32) -> Result<()> {
    if timeout_secs == 0 {
        return Err(Error::PreconditionViolated("timeout must be > 0".into()));
    }
    if retries == 0 {
        return Err(Error::PreconditionViolated("retries must be > 0".into()));
    }
    Ok(())
}

/// A scoped, at-most-once delivery: dropping it acknowledges the captured
/// message, if any, regardless of whether the drop happens on a normal
/// return path or during an unwind.
pub struct Received<'a> {
    queue: &'a Queue,
    sub_id: String,
    msg_id: Option<String>,
    payload: Option<Vec<u8>>,
}

impl Received<'_> {
    pub fn message(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.msg_id.as_deref()
    }
}

impl Drop for Received<'_> {
    fn drop(&mut self) {
        if let Some(msg_id) = self.msg_id.take() {
            if let Err(err) = self.queue.pop(&self.sub_id, Some(&msg_id)) {
                log::warn!(
                    "failed to acknowledge message {msg_id:?} for subscriber {:?}: {err}",
                    self.sub_id
                );
            }
        }
    }
}
