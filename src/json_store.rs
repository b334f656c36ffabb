//! File-backed datastore used by the command-line tool.
//!
//! The whole [`StoreDocument`] lives in one pretty-printed JSON file. Writers
//! take an advisory `<file>.lock` created exclusively next to the store, so
//! two writers never rewrite the file at the same time, whatever their
//! events. A writer finding the lock taken retries with backoff up to the
//! store's lock timeout before giving up. Commits go through a temporary
//! file that is renamed over the original.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufReader, ErrorKind},
    path::{Path, PathBuf},
    sync::Mutex,
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::{
    error::{StoreError, StoreResult},
    resolve::CatalogCategory,
    store::{
        Datastore, ResultTransaction, Staging, StoreDocument, WriterSlots, find_by_name_contains,
        lock,
    },
    topn::ProcessedResult,
};

/// How long a writer waits for another writer's lock file by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

const LOCK_RETRY_START: Duration = Duration::from_millis(10);
const LOCK_RETRY_MAX: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<StoreDocument>,
    writers: WriterSlots,
    lock_timeout: Duration,
}

impl JsonFileStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let document = read_document(path)?;
        debug!(
            "Loaded store {:?}: {} event catalog(s), {} stored result(s)",
            path,
            document.categories.len(),
            document.results.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            document: Mutex::new(document),
            writers: WriterSlots::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// Writes `document` as a new store file, replacing any existing one.
    pub fn create(path: &Path, document: StoreDocument) -> StoreResult<Self> {
        write_document(path, &document)?;
        Ok(Self {
            path: path.to_path_buf(),
            document: Mutex::new(document),
            writers: WriterSlots::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Creates the lock file, waiting for a current holder to let go.
    fn acquire_file_lock(&self, lock_path: &Path) -> StoreResult<()> {
        let started = Instant::now();
        let mut backoff = LOCK_RETRY_START;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(lock_path)
            {
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    let waited = started.elapsed();
                    if waited >= self.lock_timeout {
                        return Err(StoreError::Locked(self.path.display().to_string()));
                    }
                    debug!("Store lock {lock_path:?} is held; retrying in {backoff:?}");
                    thread::sleep(backoff.min(self.lock_timeout - waited));
                    backoff = (backoff * 2).min(LOCK_RETRY_MAX);
                }
                Err(err) => return Err(StoreError::Io(err)),
            }
        }
    }
}

fn read_document(path: &Path) -> StoreResult<StoreDocument> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn write_document(path: &Path, document: &StoreDocument) -> StoreResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(temp.as_file_mut(), document)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

impl Datastore for JsonFileStore {
    fn categories_for_event(&self, event_id: &str) -> StoreResult<Vec<CatalogCategory>> {
        Ok(lock(&self.document)?.catalog(event_id))
    }

    fn find_person_by_name_contains(&self, fragment: &str) -> StoreResult<Option<String>> {
        Ok(find_by_name_contains(&lock(&self.document)?.people, fragment))
    }

    fn find_club_by_name_contains(&self, fragment: &str) -> StoreResult<Option<String>> {
        Ok(find_by_name_contains(&lock(&self.document)?.clubs, fragment))
    }

    fn top_results_for_event(&self, event_id: &str) -> StoreResult<Vec<ProcessedResult>> {
        Ok(lock(&self.document)?.results_for(event_id))
    }

    fn begin_results<'a>(
        &'a self,
        event_id: &str,
    ) -> StoreResult<Box<dyn ResultTransaction + 'a>> {
        self.writers.acquire(event_id)?;
        let lock_path = self.lock_path();
        if let Err(err) = self.acquire_file_lock(&lock_path) {
            self.writers.release(event_id);
            return Err(err);
        }
        // Another process may have committed since this store was opened.
        let refreshed = read_document(&self.path).and_then(|fresh| {
            *lock(&self.document)? = fresh;
            Ok(())
        });
        if let Err(err) = refreshed {
            let _ = fs::remove_file(&lock_path);
            self.writers.release(event_id);
            return Err(err);
        }
        Ok(Box::new(FileTransaction {
            store: self,
            lock_path,
            staging: Staging::new(event_id),
        }))
    }
}

struct FileTransaction<'a> {
    store: &'a JsonFileStore,
    lock_path: PathBuf,
    staging: Staging,
}

impl ResultTransaction for FileTransaction<'_> {
    fn event_id(&self) -> &str {
        self.staging.event_id()
    }

    fn delete_top_results(&mut self) -> StoreResult<usize> {
        let document = lock(&self.store.document)?;
        Ok(self.staging.delete(&document))
    }

    fn insert_top_result(&mut self, result: &ProcessedResult) -> StoreResult<()> {
        let document = lock(&self.store.document)?;
        self.staging.insert(&document, result)
    }

    fn commit(self: Box<Self>) -> StoreResult<usize> {
        let mut document = lock(&self.store.document)?;
        let mut updated = document.clone();
        let stored = self.staging.apply_to(&mut updated);
        write_document(&self.store.path, &updated)?;
        *document = updated;
        Ok(stored)
    }
}

impl Drop for FileTransaction<'_> {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.lock_path) {
            warn!("Could not remove store lock {:?}: {err}", self.lock_path);
        }
        self.store.writers.release(self.staging.event_id());
    }
}
