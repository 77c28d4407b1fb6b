//! Thin adapter over the embedded transactional KV store backing the
//! queue. Everything above this module talks to sub-databases as opaque
//! byte-string tables; this is the only file that names `heed` directly.

use std::path::Path;

use heed::types::Bytes;

use crate::error::{Error, Result};

pub type Env = heed::Env;
pub type RoTxn<'a> = heed::RoTxn<'a>;
pub type RwTxn<'a> = heed::RwTxn<'a>;
pub type ByteDb = heed::Database<Bytes, Bytes>;
pub type Stat = heed::DatabaseStat;

pub const DEFAULT_MAX_READERS: u32 = 1024;
pub const DEFAULT_MAX_DB_NUM: u32 = 1024;
pub const DEFAULT_MAP_SIZE: usize = 32 * 1024 * 1024 * 1024;

/// Opens (creating the directory if needed) an LMDB environment with the
/// process-wide caps from §4.7 of the design: 1024 readers, 1024 named
/// sub-databases, 32 GiB of address space.
pub fn open_environment(path: &Path) -> Result<Env> {
    open_environment_with(path, DEFAULT_MAP_SIZE, DEFAULT_MAX_READERS, DEFAULT_MAX_DB_NUM)
}

pub fn open_environment_with(
    path: &Path,
    map_size: usize,
    max_readers: u32,
    max_dbs: u32,
) -> Result<Env> {
    std::fs::create_dir_all(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut options = heed::EnvOpenOptions::new();
    options.map_size(map_size).max_readers(max_readers).max_dbs(max_dbs);

    // SAFETY: the directory is exclusively ours for the lifetime of the
    // returned environment; callers are responsible for the one-handle-
    // per-(process, directory) rule enforced in `environment.rs`.
    unsafe { options.open(path) }.map_err(|err| Error::from_storage(path, err))
}

/// Opens a sub-database by name, creating it if it does not yet exist.
pub fn create_db(env: &Env, wtxn: &mut RwTxn<'_>, name: &str) -> Result<ByteDb> {
    env.create_database(wtxn, Some(name)).map_err(Error::from)
}

/// Opens a sub-database by name. Returns `Ok(None)` if it does not exist,
/// which is how `Control::is_initialized` and friends tell "missing" apart
/// from a storage error.
pub fn open_db(env: &Env, rtxn: &RoTxn<'_>, name: &str) -> Result<Option<ByteDb>> {
    env.open_database(rtxn, Some(name)).map_err(Error::from)
}

pub fn get<'t>(db: ByteDb, rtxn: &'t RoTxn<'_>, key: &[u8]) -> Result<Option<&'t [u8]>> {
    db.get(rtxn, key).map_err(Error::from)
}

pub fn put(db: ByteDb, wtxn: &mut RwTxn<'_>, key: &[u8], value: &[u8]) -> Result<()> {
    db.put(wtxn, key, value).map_err(Error::from)
}

pub fn delete(db: ByteDb, wtxn: &mut RwTxn<'_>, key: &[u8]) -> Result<bool> {
    db.delete(wtxn, key).map_err(Error::from)
}

pub fn first(db: ByteDb, rtxn: &RoTxn<'_>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
    Ok(db
        .first(rtxn)
        .map_err(Error::from)?
        .map(|(k, v)| (k.to_vec(), v.to_vec())))
}

pub fn last(db: ByteDb, rtxn: &RoTxn<'_>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
    Ok(db
        .last(rtxn)
        .map_err(Error::from)?
        .map(|(k, v)| (k.to_vec(), v.to_vec())))
}

/// Collects every key in the sub-database, in forward (lexicographic) order.
pub fn keys_forward(db: ByteDb, rtxn: &RoTxn<'_>) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    for entry in db.iter(rtxn).map_err(Error::from)? {
        let (key, _) = entry.map_err(Error::from)?;
        out.push(key.to_vec());
    }
    Ok(out)
}

/// Collects every key in the sub-database, in reverse (lexicographic) order.
pub fn keys_reverse(db: ByteDb, rtxn: &RoTxn<'_>) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    for entry in db.rev_iter(rtxn).map_err(Error::from)? {
        let (key, _) = entry.map_err(Error::from)?;
        out.push(key.to_vec());
    }
    Ok(out)
}

/// Collects every `(key, value)` pair in the sub-database.
pub fn entries(db: ByteDb, rtxn: &RoTxn<'_>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut out = Vec::new();
    for entry in db.iter(rtxn).map_err(Error::from)? {
        let (key, value) = entry.map_err(Error::from)?;
        out.push((key.to_vec(), value.to_vec()));
    }
    Ok(out)
}

pub fn stat(db: ByteDb, rtxn: &RoTxn<'_>) -> Result<Stat> {
    db.stat(rtxn).map_err(Error::from)
}

/// Empties a sub-database without freeing its DBI slot (`drop(delete=false)`).
pub fn clear(db: ByteDb, wtxn: &mut RwTxn<'_>) -> Result<()> {
    db.clear(wtxn).map_err(Error::from)
}

/// Empties a sub-database and frees its DBI slot (`drop(delete=true)`).
///
/// # Safety
/// The caller must not hold any other handle to `db` across this call, per
/// `heed`'s own safety contract for dropping a database.
pub unsafe fn clear_and_delete(db: ByteDb, wtxn: &mut RwTxn<'_>) -> Result<()> {
    unsafe { db.delete(wtxn) }.map_err(Error::from)
}
