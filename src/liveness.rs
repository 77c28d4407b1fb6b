//! A shared flag marking whether the `Environment` backing a `Control` /
//! `Publisher` / `Subscriber` / `Queue` is still open. `Environment::close`
//! flips it for every handle derived from it at once, so a call made through
//! any of them after close fails instead of quietly operating on a released
//! store handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Clone)]
pub(crate) struct LiveFlag(Arc<AtomicBool>);

impl LiveFlag {
    pub(crate) fn new() -> LiveFlag {
        LiveFlag(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn mark_dead(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::PreconditionViolated(
                "operation attempted after the owning environment was closed".into(),
            ))
        }
    }
}
