// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Durable storage of zone documents as flat JSON files.
//!
//! Each zone is kept in its own file, `<data dir>/<zone>.json`, which
//! holds a single JSON object mapping record keys to record values
//! (see [`record`](crate::record)). The [`Store`] provides four
//! operations on these documents: [`Store::ensure`], [`Store::read`],
//! [`Store::upsert`], and [`Store::remove`].
//!
//! ## Consistency
//!
//! Mutations are read-modify-write cycles over the whole document.
//! Two such cycles running concurrently on the same zone would lose
//! one of the updates, so every operation that writes a zone file
//! first takes that zone's mutex. Zones do not share locks.
//!
//! Files are never modified in place. A new document is written to a
//! temporary file in the data directory, flushed to disk, and then
//! renamed over the old file. Since the rename is atomic, readers
//! always see either the complete old document or the complete new
//! one, and so [`Store::read`] does not need to take the lock at all
//! (except to initialize a file; see below).
//!
//! ## Initialization and healing
//!
//! A zone file is created the first time its zone is accessed. A file
//! that is empty or does not contain a JSON object is treated the same
//! way as a missing one: it is (re)initialized to `{}`. Unparseable
//! files are reported in the log at the `warn` level.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::name::Name;
use crate::record::{Record, RecordKey};

mod error;
use error::ErrorKind;
pub use error::{Error, Result};

/// The contents of a zone file. The values are kept as raw JSON so
/// that entries the service did not write itself survive updates.
pub type Document = serde_json::Map<String, Value>;

/// A directory of zone files. See the
/// [module-level documentation](self) for details.
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    locks: Mutex<HashMap<Name, Arc<Mutex<()>>>>,
}

/// What [`Store::load`] found on disk.
enum Contents {
    Valid(Document),
    Missing,
    Empty,
    Corrupt(serde_json::Error),
}

impl Store {
    /// Opens the store kept in `dir`, creating the directory if it
    /// does not exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::new(ErrorKind::CreateDir, &dir, e))?;
        Ok(Self {
            dir,
            locks: Mutex::default(),
        })
    }

    /// Returns the directory the zone files are kept in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the file that holds `zone`.
    pub fn zone_path(&self, zone: &Name) -> PathBuf {
        self.dir.join(format!("{}.json", zone))
    }

    /// Makes sure that the file for `zone` exists and holds a JSON
    /// object, initializing it to `{}` otherwise.
    pub fn ensure(&self, zone: &Name) -> Result<()> {
        let path = self.zone_path(zone);
        if let Contents::Valid(_) = load(&path)? {
            return Ok(());
        }
        let lock = self.zone_lock(zone);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_locked(zone, &path).map(drop)
    }

    /// Returns the complete document of `zone`. The zone file is
    /// initialized first if necessary (see [`Store::ensure`]).
    pub fn read(&self, zone: &Name) -> Result<Document> {
        let path = self.zone_path(zone);
        if let Contents::Valid(document) = load(&path)? {
            return Ok(document);
        }
        let lock = self.zone_lock(zone);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_locked(zone, &path)
    }

    /// Stores `record` under `key` in `zone`, replacing any existing
    /// value.
    pub fn upsert(&self, zone: &Name, key: &RecordKey, record: &Record) -> Result<()> {
        let path = self.zone_path(zone);
        let value =
            serde_json::to_value(record).map_err(|e| Error::new(ErrorKind::Write, &path, e.into()))?;

        let lock = self.zone_lock(zone);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut document, _) = self.load_or_default(zone, &path)?;
        document.insert(key.to_string(), value);
        write(&self.dir, &path, &document)
    }

    /// Removes the record stored under `key` from `zone`. Returns
    /// whether there was such a record; removing an absent record is
    /// not an error.
    pub fn remove(&self, zone: &Name, key: &RecordKey) -> Result<bool> {
        let path = self.zone_path(zone);
        let lock = self.zone_lock(zone);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut document, stale) = self.load_or_default(zone, &path)?;
        let removed = document.remove(key.as_str()).is_some();
        if removed || stale {
            write(&self.dir, &path, &document)?;
        }
        Ok(removed)
    }

    /// Returns the mutex that serializes writes to `zone`.
    fn zone_lock(&self, zone: &Name) -> Arc<Mutex<()>> {
        // The map is only ever extended, so a poisoned lock is still
        // usable.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(zone.clone()).or_default().clone()
    }

    /// The implementation of [`Store::ensure`]. The zone's lock must be
    /// held.
    fn ensure_locked(&self, zone: &Name, path: &Path) -> Result<Document> {
        let (document, stale) = self.load_or_default(zone, path)?;
        if stale {
            write(&self.dir, path, &document)?;
        }
        Ok(document)
    }

    /// Loads the document of `zone`, falling back to an empty one if
    /// the file is missing, empty, or corrupt. The returned flag is set
    /// in the latter cases, when the file needs to be (re)written.
    fn load_or_default(&self, zone: &Name, path: &Path) -> Result<(Document, bool)> {
        match load(path)? {
            Contents::Valid(document) => return Ok((document, false)),
            Contents::Missing => debug!("Creating the zone file {} for {}.", path.display(), zone),
            Contents::Empty => debug!("Initializing the empty zone file {}.", path.display()),
            Contents::Corrupt(e) => warn!(
                "The zone file {} for {} does not hold a JSON object ({}); resetting it to an empty zone.",
                path.display(),
                zone,
                e,
            ),
        }
        Ok((Document::new(), true))
    }
}

/// Reads and parses the zone file at `path`.
fn load(path: &Path) -> Result<Contents> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Contents::Missing),
        Err(e) => return Err(Error::new(ErrorKind::Read, path, e)),
    };
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Contents::Empty);
    }
    match serde_json::from_slice(&raw) {
        Ok(document) => Ok(Contents::Valid(document)),
        Err(e) => Ok(Contents::Corrupt(e)),
    }
}

/// Serializes `document` and atomically replaces the file at `path`
/// with it.
fn write(dir: &Path, path: &Path, document: &Document) -> Result<()> {
    let raw = serde_json::to_vec(document).map_err(|e| Error::new(ErrorKind::Write, path, e.into()))?;
    replace_file(dir, path, &raw).map_err(|e| Error::new(ErrorKind::Write, path, e))
}

/// Writes `contents` to a temporary file in `dir`, syncs it, and then
/// renames it to `path`. The temporary file must be on the same file
/// system as `path` for the rename to be atomic, hence `dir`.
fn replace_file(dir: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn zone() -> Name {
        "d1.dev.local".parse().unwrap()
    }

    fn record(owner: &str, rr_type: &str, value: &str, ttl: i64) -> (RecordKey, Record) {
        Record::new(&owner.parse::<Name>().unwrap(), rr_type, value, ttl)
    }

    /// The `i`th record of the host owned by thread `t` in the
    /// concurrency tests.
    fn numbered_record(t: usize, i: usize) -> (RecordKey, Record) {
        let owner = format!("host{}.d1.dev.local", t);
        record(&owner, "A", &format!("10.0.{}.{}", t, i), 300)
    }

    fn open() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort_unstable();
        names
    }

    #[test]
    fn open_creates_the_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = Store::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(store.dir(), nested);
    }

    #[test]
    fn ensure_creates_an_empty_zone() {
        let (dir, store) = open();
        store.ensure(&zone()).unwrap();
        assert_eq!(file_names(dir.path()), ["d1.dev.local.json"]);
        assert_eq!(fs::read_to_string(store.zone_path(&zone())).unwrap(), "{}");
    }

    #[test]
    fn ensure_leaves_valid_zones_alone() {
        let (_dir, store) = open();
        let (key, rec) = record("host.d1.dev.local", "A", "10.0.0.1", 300);
        store.upsert(&zone(), &key, &rec).unwrap();
        store.ensure(&zone()).unwrap();
        assert_eq!(store.read(&zone()).unwrap().len(), 1);
    }

    #[test]
    fn read_of_fresh_zone_is_empty() {
        let (_dir, store) = open();
        assert!(store.read(&zone()).unwrap().is_empty());
        assert!(store.zone_path(&zone()).is_file());
    }

    #[test]
    fn read_heals_empty_and_corrupt_files() {
        let (_dir, store) = open();
        let path = store.zone_path(&zone());
        for contents in ["", "  \n", "not json", "[1, 2]", "{\"truncated\": "] {
            fs::write(&path, contents).unwrap();
            assert!(store.read(&zone()).unwrap().is_empty(), "{:?}", contents);
            assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        }
    }

    #[test]
    fn upsert_then_read() {
        let (_dir, store) = open();
        let (key, rec) = record("host.d1.dev.local", "A", "10.0.0.1", 300);
        store.upsert(&zone(), &key, &rec).unwrap();
        assert_eq!(
            Value::Object(store.read(&zone()).unwrap()),
            json!({"host.d1.dev.local./A/10.0.0.1": {"type": "A", "value": "10.0.0.1", "ttl": 300}}),
        );
    }

    #[test]
    fn upsert_overwrites() {
        let (_dir, store) = open();
        let (key, rec) = record("host.d1.dev.local", "A", "10.0.0.1", 300);
        store.upsert(&zone(), &key, &rec).unwrap();
        let (key, rec) = record("host.d1.dev.local", "A", "10.0.0.1", 60);
        store.upsert(&zone(), &key, &rec).unwrap();
        let document = store.read(&zone()).unwrap();
        assert_eq!(document.len(), 1);
        assert_eq!(document[key.as_str()]["ttl"], 60);
    }

    #[test]
    fn upsert_keeps_foreign_entries() {
        let (_dir, store) = open();
        let path = store.zone_path(&zone());
        fs::write(&path, r#"{"old.d1.dev.local": {"type": "A", "valeur": "10.0.0.9", "ttl": 5}}"#)
            .unwrap();
        let (key, rec) = record("host.d1.dev.local", "A", "10.0.0.1", 300);
        store.upsert(&zone(), &key, &rec).unwrap();
        let document = store.read(&zone()).unwrap();
        assert_eq!(document.len(), 2);
        assert_eq!(document["old.d1.dev.local"]["valeur"], "10.0.0.9");
    }

    #[test]
    fn remove_deletes_only_the_matching_record() {
        let (_dir, store) = open();
        let (a_key, a_rec) = record("host.d1.dev.local", "A", "10.0.0.1", 300);
        let (txt_key, txt_rec) = record("host.d1.dev.local", "TXT", "hello", 300);
        store.upsert(&zone(), &a_key, &a_rec).unwrap();
        store.upsert(&zone(), &txt_key, &txt_rec).unwrap();

        assert!(store.remove(&zone(), &a_key).unwrap());
        let document = store.read(&zone()).unwrap();
        assert!(!document.contains_key(a_key.as_str()));
        assert!(document.contains_key(txt_key.as_str()));
    }

    #[test]
    fn remove_of_absent_record_is_a_no_op() {
        let (_dir, store) = open();
        let (key, rec) = record("host.d1.dev.local", "A", "10.0.0.1", 300);
        store.upsert(&zone(), &key, &rec).unwrap();
        let path = store.zone_path(&zone());
        let before = fs::read(&path).unwrap();

        let (absent, _) = record("other.d1.dev.local", "A", "10.0.0.1", 300);
        assert!(!store.remove(&zone(), &absent).unwrap());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn remove_initializes_missing_zone() {
        let (_dir, store) = open();
        let (key, _) = record("host.d1.dev.local", "A", "10.0.0.1", 300);
        assert!(!store.remove(&zone(), &key).unwrap());
        assert_eq!(fs::read_to_string(store.zone_path(&zone())).unwrap(), "{}");
    }

    #[test]
    fn zones_are_independent() {
        let (dir, store) = open();
        let other: Name = "test.local".parse().unwrap();
        let (key, rec) = record("host.d1.dev.local", "A", "10.0.0.1", 300);
        store.upsert(&zone(), &key, &rec).unwrap();
        assert!(store.read(&other).unwrap().is_empty());
        assert_eq!(
            file_names(dir.path()),
            ["d1.dev.local.json", "test.local.json"],
        );
    }

    #[test]
    fn concurrent_upserts_are_not_lost() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let (dir, store) = open();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let (key, rec) = numbered_record(t, i);
                        store.upsert(&zone(), &key, &rec).unwrap();
                        // Interleave reads, which must never see a
                        // partially-written file.
                        store.read(&zone()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read(&zone()).unwrap().len(), THREADS * PER_THREAD);
        // No temporary files are left behind.
        assert_eq!(file_names(dir.path()), ["d1.dev.local.json"]);
    }

    #[test]
    fn concurrent_upserts_and_removes_are_serialized() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        // Odd threads remove the records seeded here while even threads
        // add new ones.
        let (dir, store) = open();
        for t in (1..THREADS).step_by(2) {
            for i in 0..PER_THREAD {
                let (key, rec) = numbered_record(t, i);
                store.upsert(&zone(), &key, &rec).unwrap();
            }
        }

        let store = Arc::new(store);
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let (key, rec) = numbered_record(t, i);
                        if t % 2 == 0 {
                            store.upsert(&zone(), &key, &rec).unwrap();
                        } else {
                            assert!(store.remove(&zone(), &key).unwrap());
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut expected: Vec<String> = (0..THREADS)
            .step_by(2)
            .flat_map(|t| (0..PER_THREAD).map(move |i| numbered_record(t, i).0.to_string()))
            .collect();
        expected.sort_unstable();
        let mut keys: Vec<String> = store.read(&zone()).unwrap().keys().cloned().collect();
        keys.sort_unstable();
        assert_eq!(keys, expected);
        assert_eq!(file_names(dir.path()), ["d1.dev.local.json"]);
    }
}
