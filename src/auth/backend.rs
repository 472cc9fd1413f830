//! Layered credential persistence.
//!
//! Ordered preference: an environment-variable override, the system keyring,
//! and an opt-in plaintext file under the application data directory. The
//! backend selected at session construction is used for both reads and writes
//! for the session's whole lifetime; it is never switched silently.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Credential file name in the application data directory.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Storage key for one credential: the owning application plus the
/// normalized network location of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub application: String,
    pub host: String,
}

impl StorageKey {
    pub fn new(application: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            host: host.into(),
        }
    }
}

/// Uniform interface over the credential stores.
///
/// Values are codec-encoded credential strings; backends never interpret
/// them. `read` returns `None` when no record exists, which callers keep
/// distinct from a present-but-undecodable value. Deleting an absent record
/// is not an error.
pub trait SecretBackend: Send + Sync {
    /// Backend name for log lines.
    fn name(&self) -> &'static str;
    fn read(&self, key: &StorageKey) -> Result<Option<String>>;
    fn write(&self, key: &StorageKey, value: &str) -> Result<()>;
    fn delete(&self, key: &StorageKey) -> Result<()>;
}

/// Availability of the system keyring, probed once per session.
///
/// `Locked` means the keyring exists but cannot be opened right now; it is
/// surfaced to the caller and never downgraded to the file fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Locked,
    Unavailable,
}

/// Read-only backend fed from an environment variable.
///
/// Writes succeed without storing anything, so login flows need no special
/// casing; reads always return the overriding value.
pub struct EnvBackend {
    value: String,
}

impl EnvBackend {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl SecretBackend for EnvBackend {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn read(&self, _key: &StorageKey) -> Result<Option<String>> {
        Ok(Some(self.value.clone()))
    }

    fn write(&self, key: &StorageKey, _value: &str) -> Result<()> {
        debug!(
            host = %key.host,
            "discarding credential write for environment-provided session"
        );
        Ok(())
    }

    fn delete(&self, _key: &StorageKey) -> Result<()> {
        Ok(())
    }
}

/// Process-local backend for ephemeral sessions; nothing outlives the process.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &StorageKey) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &StorageKey, value: &str) -> Result<()> {
        self.entries.lock().insert(key.clone(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &StorageKey) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// System keyring backend. Service is the application name, account is the
/// store host, so one credential is active per (host, application) pair.
pub struct KeyringBackend;

impl KeyringBackend {
    fn entry(key: &StorageKey) -> Result<keyring::Entry> {
        keyring::Entry::new(&key.application, &key.host).map_err(map_keyring_error)
    }

    /// Probe whether the system keyring is usable, distinguishing a merely
    /// locked keyring from one that is absent.
    pub fn availability(key: &StorageKey) -> Availability {
        let entry = match keyring::Entry::new(&key.application, &key.host) {
            Ok(entry) => entry,
            Err(_) => return Availability::Unavailable,
        };
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Availability::Available,
            Err(keyring::Error::NoStorageAccess(_)) => Availability::Locked,
            Err(_) => Availability::Unavailable,
        }
    }
}

impl SecretBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn read(&self, key: &StorageKey) -> Result<Option<String>> {
        match Self::entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(map_keyring_error(err)),
        }
    }

    fn write(&self, key: &StorageKey, value: &str) -> Result<()> {
        Self::entry(key)?
            .set_password(value)
            .map_err(map_keyring_error)
    }

    fn delete(&self, key: &StorageKey) -> Result<()> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(map_keyring_error(err)),
        }
    }
}

fn map_keyring_error(err: keyring::Error) -> Error {
    match err {
        keyring::Error::NoStorageAccess(_) => Error::SecretStoreLocked,
        _ => Error::NoSecretStore,
    }
}

/// Writer locks per credential file. Mutations are read-modify-write over
/// the whole file, so concurrent backends for the same path must not
/// interleave them.
static FILE_LOCKS: Mutex<BTreeMap<PathBuf, Arc<Mutex<()>>>> = Mutex::new(BTreeMap::new());

fn file_lock(path: &Path) -> Arc<Mutex<()>> {
    FILE_LOCKS.lock().entry(path.to_path_buf()).or_default().clone()
}

/// Plaintext JSON fallback under the application data directory.
///
/// Layout is a two-level map, application name to host to encoded
/// credential, matching the keyring's (service, account) granularity.
/// In-process writers serialize on a shared per-path lock; readers in other
/// processes are protected by the rename in `write_all`.
pub struct FileBackend {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileBackend {
    pub fn new(application: &str) -> Result<Self> {
        let data_dir = dirs::data_dir().ok_or(Error::NoSecretStore)?;
        Ok(Self::with_path(
            data_dir.join(application).join(CREDENTIALS_FILE),
        ))
    }

    /// Build a backend over an explicit file path.
    pub fn with_path(path: PathBuf) -> Self {
        let lock = file_lock(&path);
        Self { path, lock }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn write_all(&self, entries: &HashMap<String, HashMap<String, String>>) -> Result<()> {
        let parent = self.path.parent().ok_or(Error::NoSecretStore)?;
        std::fs::create_dir_all(parent)?;

        let contents = serde_json::to_string(entries).map_err(std::io::Error::other)?;
        // Write-then-rename keeps concurrent readers off half-written files.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SecretBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn read(&self, key: &StorageKey) -> Result<Option<String>> {
        Ok(self
            .read_all()
            .get(&key.application)
            .and_then(|hosts| hosts.get(&key.host))
            .cloned())
    }

    fn write(&self, key: &StorageKey, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all();
        entries
            .entry(key.application.clone())
            .or_default()
            .insert(key.host.clone(), value.to_string());
        self.write_all(&entries)
    }

    fn delete(&self, key: &StorageKey) -> Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all();
        if let Some(hosts) = entries.get_mut(&key.application) {
            if hosts.remove(&key.host).is_some() {
                return self.write_all(&entries);
            }
        }
        Ok(())
    }
}

static FILE_FALLBACK_WARNING: Once = Once::new();

fn warn_file_fallback() {
    // One warning per process; the fallback file is unencrypted.
    FILE_FALLBACK_WARNING.call_once(|| {
        warn!("system keyring unavailable, falling back to plaintext file credential storage");
    });
}

/// Pick the system-level backend for a session from the keyring's probed
/// availability. A locked keyring is an error for the caller to resolve,
/// not a reason to write plaintext.
pub fn select_backend(
    availability: Availability,
    application: &str,
    file_fallback: bool,
) -> Result<Box<dyn SecretBackend>> {
    match availability {
        Availability::Available => Ok(Box::new(KeyringBackend)),
        Availability::Locked => Err(Error::SecretStoreLocked),
        Availability::Unavailable if file_fallback => {
            warn_file_fallback();
            Ok(Box::new(FileBackend::new(application)?))
        }
        Availability::Unavailable => Err(Error::NoSecretStore),
    }
}
