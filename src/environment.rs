//! Owns exactly one open store handle per `(process, queue directory)` pair
//! and factories `Control`/`Publisher`/`Subscriber` instances over it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::control::Control;
use crate::error::{Error, Result};
use crate::liveness::LiveFlag;
use crate::publisher::Publisher;
use crate::store::{self, Env};
use crate::subscriber::Subscriber;

fn open_directories() -> &'static Mutex<HashSet<PathBuf>> {
    static REGISTRY: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

/// A live handle on one queue directory's storage environment. Forking this
/// across OS processes, or opening the same directory twice within one
/// process, is forbidden — the latter is detected and rejected here, the
/// former relies on the store's own file lock (§5).
pub struct Environment {
    env: Env,
    path: PathBuf,
    closed: bool,
    live: LiveFlag,
}

impl Environment {
    /// Opens or creates the environment at `path` with the process-wide
    /// defaults: 1024 max readers, 1024 max named sub-databases, 32 GiB
    /// map size.
    pub fn new(path: impl AsRef<Path>) -> Result<Environment> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let canonical = path.canonicalize().map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        {
            let mut registry = open_directories().lock().expect("registry mutex poisoned");
            if !registry.insert(canonical.clone()) {
                return Err(Error::PreconditionViolated(format!(
                    "an environment for {canonical:?} is already open in this process"
                )));
            }
        }

        let env = store::open_environment(&canonical).map_err(|err| {
            open_directories().lock().expect("registry mutex poisoned").remove(&canonical);
            err
        })?;

        log::info!("environment opened at {canonical:?}");
        Ok(Environment { env, path: canonical, closed: false, live: LiveFlag::new() })
    }

    /// Releases the underlying handle. Idempotent: repeat closes are a
    /// no-op. Every `Control`/`Publisher`/`Subscriber`/`Queue` created from
    /// this environment shares this environment's liveness flag, so each of
    /// them starts failing its operations with `PreconditionViolated` the
    /// moment this call flips it, regardless of which handle is used next.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.live.mark_dead();
        open_directories().lock().expect("registry mutex poisoned").remove(&self.path);
        log::info!("environment closed at {:?}", self.path);
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::PreconditionViolated("environment is closed".into()));
        }
        Ok(())
    }

    pub fn new_control(&self) -> Result<Control> {
        self.check_open()?;
        Ok(Control::new(self.path.clone(), self.env.clone(), self.live.clone()))
    }

    pub fn new_publisher(&self, autosync: bool) -> Result<Publisher> {
        self.check_open()?;
        Publisher::new(&self.path, self.env.clone(), autosync, self.live.clone())
    }

    pub fn new_subscriber(&self) -> Result<Subscriber> {
        self.check_open()?;
        Subscriber::new(&self.path, self.env.clone(), self.live.clone())
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens (or creates) the environment at `path` — the module-level
/// convenience constructor mirroring `Environment::new`.
pub fn initialize(path: impl AsRef<Path>) -> Result<Environment> {
    Environment::new(path)
}
