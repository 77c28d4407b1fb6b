//! Thin facade over `Queue` exposing `send`/`send_many`.

use std::path::Path;

use crate::error::Result;
use crate::liveness::LiveFlag;
use crate::queue::Queue;
use crate::store::Env;

pub struct Publisher {
    queue: Queue,
    autosync: bool,
}

impl Publisher {
    pub(crate) fn new(path: &Path, env: Env, autosync: bool, live: LiveFlag) -> Result<Publisher> {
        Ok(Publisher { queue: Queue::open(path, env, live)?, autosync })
    }

    /// Publishes a single message; delegates to `Queue::put`.
    pub fn send(&self, msg: &[u8]) -> Result<String> {
        self.queue.put(msg)
    }

    /// Publishes several messages. With `autosync` the messages are put one
    /// at a time (each running its own `cleanup` and commit); otherwise
    /// they share one transaction via `Queue::put_many_flush_once`.
    pub fn send_many(&self, msgs: &[Vec<u8>]) -> Result<Vec<String>> {
        if self.autosync {
            let mut ids = Vec::with_capacity(msgs.len());
            for msg in msgs {
                ids.push(self.queue.put(msg)?);
            }
            Ok(ids)
        } else {
            self.queue.put_many_flush_once(msgs)
        }
    }
}
