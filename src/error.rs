use std::path::PathBuf;

/// Error taxonomy for the queue engine, named by kind rather than by the
/// underlying cause so callers can match on recovery strategy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("queue at {path:?} is not initialized; call Control::init first")]
    NotInitialized { path: PathBuf },

    #[error("no message pending for subscriber {sub_id:?}")]
    Empty { sub_id: String },

    #[error("store map size exhausted at {path:?}; re-open the environment with a larger map_size")]
    Capacity { path: PathBuf },

    #[error("storage error: {0}")]
    Storage(#[from] heed::Error),

    #[error("i/o error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("precondition violated: {0}")]
    PreconditionViolated(String),
}

impl Error {
    /// Reclassify a raw storage error as `Capacity` when it is LMDB's
    /// map-full condition, otherwise fold it into the generic `Storage` kind.
    pub(crate) fn from_storage(path: &std::path::Path, err: heed::Error) -> Self {
        let is_map_full = matches!(
            &err,
            heed::Error::Mdb(heed::MdbError::MapFull)
        );
        if is_map_full {
            Error::Capacity { path: path.to_path_buf() }
        } else {
            Error::Storage(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
