/*!
 # Print state

 Persists the id of the last automatically printed entry so a restart does
 not print the same microseason twice. Both read and write failures are soft:
 a bad read looks like "nothing printed yet", a bad write is reported to the
 caller and retried on the next tick.
*/

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::{Error, Result};

/// Key holding the last auto-printed entry id
pub const LAST_AUTO_KEY: &str = "current_season";

/// Byte-oriented key-value storage
pub trait KeyValueStore: Send {
    /// Value for `key`, or `None` when nothing has been written
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn write(&mut self, key: &str, value: &[u8]) -> Result<()>;
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.txt"))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StateStoreRead(format!("{}: {}", path.display(), e))),
        }
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let temp = self.dir.join(format!("{key}.txt.tmp"));

        let result = std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(&temp, value))
            .and_then(|_| std::fs::rename(&temp, &path));
        result.map_err(|e| Error::StateStoreWrite(format!("{}: {}", path.display(), e)))
    }
}

/// In-memory store with switchable failures.
///
/// Clones share the same contents, so a test can keep one handle to flip
/// failures on and off after handing another to a [`PrintStateStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: Mutex<HashMap<String, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `value` under `key`
    pub fn with_value(key: &str, value: &[u8]) -> Self {
        let store = Self::default();
        store
            .inner
            .values
            .lock()
            .insert(key.to_string(), value.to_vec());
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw value currently held for `key`
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.values.lock().get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StateStoreRead(format!("injected read failure for {key}")));
        }
        Ok(self.get(key))
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StateStoreWrite(format!("injected write failure for {key}")));
        }
        self.inner
            .values
            .lock()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Last auto-printed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrintState {
    /// Entry id, 0 when nothing has been printed
    pub last_auto_entry_id: u32,
    /// Whether the value came from the store
    pub initialized: bool,
}

/// Shared print-state access.
///
/// The backend sits behind a mutex so load and store are atomic with respect
/// to each other; the scheduler is the only writer.
pub struct PrintStateStore {
    backend: Mutex<Box<dyn KeyValueStore>>,
}

impl PrintStateStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Mutex::new(Box::new(backend)),
        }
    }

    /// Reads the state, treating any failure as uninitialised
    #[instrument(skip(self))]
    pub fn load(&self) -> PrintState {
        let raw = match self.backend.lock().read(LAST_AUTO_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No print state stored yet");
                return PrintState::default();
            }
            Err(e) => {
                warn!("Failed to read print state: {}", e);
                return PrintState::default();
            }
        };

        match std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
        {
            Some(id) => PrintState {
                last_auto_entry_id: id,
                initialized: true,
            },
            None => {
                warn!(
                    "Unparsable print state {:?}, treating as uninitialised",
                    String::from_utf8_lossy(&raw)
                );
                PrintState::default()
            }
        }
    }

    /// Persists `id` as the last auto-printed entry
    #[instrument(skip(self))]
    pub fn store(&self, id: u32) -> Result<()> {
        self.backend
            .lock()
            .write(LAST_AUTO_KEY, id.to_string().as_bytes())?;
        debug!("Stored last auto-printed entry {}", id);
        Ok(())
    }
}

impl std::fmt::Debug for PrintStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintStateStore").finish_non_exhaustive()
    }
}
