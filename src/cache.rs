//! Durable cache for the selected-pet id.
//!
//! The selection must survive restarts and full reloads, so every change
//! is mirrored here before the in-memory state is touched. The encoding is
//! deliberately trivial: the file holds the id as a bare decimal string,
//! and an absent file means "nothing selected".

use std::io::ErrorKind;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::Error;
use crate::types::PetId;

/// Storage seam for the durable selected-pet mirror.
///
/// Implement this to mirror the selection into the host shell's own storage
/// (browser `localStorage`, mobile preferences, a settings database). The
/// built-in [`FileCache`] and [`MemoryCache`] cover native and test use.
pub trait SelectedPetCache: Send + Sync {
    /// Read the cached selection. Absent means `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] if the backing storage cannot be read.
    fn load(&self) -> Result<Option<PetId>, Error>;

    /// Persist `pet` as the current selection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] if the backing storage cannot be written.
    fn store(&self, pet: PetId) -> Result<(), Error>;

    /// Remove the cached selection. Clearing an empty cache is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] if the backing storage cannot be written.
    fn clear(&self) -> Result<(), Error>;
}

/// File-backed cache: one bare decimal id per file.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SelectedPetCache for FileCache {
    fn load(&self) -> Result<Option<PetId>, Error> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Cache(format!("read {}: {e}", self.path.display()))),
        };
        match raw.trim().parse::<PetId>() {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                // Unreadable content is unusable; drop it so later loads
                // see a clean absence.
                warn!(path = %self.path.display(), "discarding unparsable selected-pet cache");
                let _ = std::fs::remove_file(&self.path);
                Ok(None)
            }
        }
    }

    fn store(&self, pet: PetId) -> Result<(), Error> {
        std::fs::write(&self.path, pet.to_string())
            .map_err(|e| Error::Cache(format!("write {}: {e}", self.path.display())))
    }

    fn clear(&self) -> Result<(), Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Cache(format!("remove {}: {e}", self.path.display()))),
        }
    }
}

/// In-memory cache for tests and cache-less deployments.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<Option<PetId>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectedPetCache for MemoryCache {
    fn load(&self) -> Result<Option<PetId>, Error> {
        Ok(*self.slot.lock())
    }

    fn store(&self, pet: PetId) -> Result<(), Error> {
        *self.slot.lock() = Some(pet);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        *self.slot.lock() = None;
        Ok(())
    }
}
