//! Locally persisted machine identity.
//!
//! A machine label (for example `default`) maps to the name of the remote
//! instance it owns. The identity is written as soon as the instance exists
//! and cleared whenever the instance is confirmed absent; a cleared identity
//! is the only signal that the machine must be provisioned again.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

const STATE_DIR: &str = ".drydock";
const PROVIDER_DIR: &str = "google";
const ID_FILE: &str = "id";

/// Errors raised while reading or writing a persisted identity.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IdentityError {
    /// Raised when file system access fails.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a machine label cannot be used as a directory name.
    #[error("invalid machine label '{0}'")]
    InvalidLabel(String),
}

/// Storage for machine identities.
pub trait IdentityStore: Send + Sync + fmt::Debug {
    /// Returns the persisted identity for `label`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the backing storage cannot be read.
    fn load(&self, label: &str) -> Result<Option<String>, IdentityError>;

    /// Persists `id` as the identity for `label`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the backing storage cannot be written.
    fn save(&self, label: &str, id: &str) -> Result<(), IdentityError>;

    /// Removes any persisted identity for `label`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the backing storage cannot be updated.
    fn clear(&self, label: &str) -> Result<(), IdentityError>;
}

/// Stores identities under `<root>/.drydock/machines/<label>/google/id`.
#[derive(Clone, Debug)]
pub struct FileIdentityStore {
    root: Utf8PathBuf,
}

impl FileIdentityStore {
    /// Creates a store rooted at a project directory.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn machine_dir(&self, label: &str) -> Result<Utf8PathBuf, IdentityError> {
        let valid = !label.is_empty()
            && label
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
            && label != "."
            && label != "..";
        if !valid {
            return Err(IdentityError::InvalidLabel(label.to_owned()));
        }
        Ok(self
            .root
            .join(STATE_DIR)
            .join("machines")
            .join(label)
            .join(PROVIDER_DIR))
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> IdentityError {
    IdentityError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self, label: &str) -> Result<Option<String>, IdentityError> {
        let dir_path = self.machine_dir(label)?;
        let dir = match Dir::open_ambient_dir(&dir_path, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&dir_path, &err)),
        };

        match dir.read_to_string(ID_FILE) {
            Ok(contents) => {
                let id = contents.trim();
                Ok((!id.is_empty()).then(|| id.to_owned()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&dir_path.join(ID_FILE), &err)),
        }
    }

    fn save(&self, label: &str, id: &str) -> Result<(), IdentityError> {
        let dir_path = self.machine_dir(label)?;
        Dir::create_ambient_dir_all(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        dir.write(ID_FILE, id)
            .map_err(|err| io_error(&dir_path.join(ID_FILE), &err))
    }

    fn clear(&self, label: &str) -> Result<(), IdentityError> {
        let dir_path = self.machine_dir(label)?;
        let dir = match Dir::open_ambient_dir(&dir_path, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(io_error(&dir_path, &err)),
        };
        match dir.remove_file(ID_FILE) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&dir_path.join(ID_FILE), &err)),
        }
    }
}

/// Keeps identities in memory; used by embedders and tests.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    ids: Mutex<BTreeMap<String, String>>,
}

impl MemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identity currently stored for `label`.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<String> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(label)
            .cloned()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self, label: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.get(label))
    }

    fn save(&self, label: &str, id: &str) -> Result<(), IdentityError> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(label.to_owned(), id.to_owned());
        Ok(())
    }

    fn clear(&self, label: &str) -> Result<(), IdentityError> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(label);
        Ok(())
    }
}

/// A logical machine and the remote instance it currently owns, if any.
#[derive(Clone, Debug)]
pub struct Machine {
    label: String,
    id: Option<String>,
    store: Arc<dyn IdentityStore>,
}

impl Machine {
    /// Loads the machine identity for `label` from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the store cannot be read.
    pub fn load(
        label: impl Into<String>,
        store: Arc<dyn IdentityStore>,
    ) -> Result<Self, IdentityError> {
        let label = label.into();
        let id = store.load(&label)?;
        Ok(Self { label, id, store })
    }

    /// Machine label used for local bookkeeping.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Remote instance name, when one is believed to exist.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Records and persists the remote instance name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when persisting fails; the in-memory identity
    /// is still updated so the caller can tear the instance down.
    pub fn set_id(&mut self, id: impl Into<String>) -> Result<(), IdentityError> {
        let id = id.into();
        self.id = Some(id.clone());
        self.store.save(&self.label, &id)
    }

    /// Forgets the remote instance, both in memory and in the store.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the store cannot be updated.
    pub fn clear_id(&mut self) -> Result<(), IdentityError> {
        self.id = None;
        self.store.clear(&self.label)
    }
}
