use std::{
    collections::HashMap,
    fs, io,
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::ServiceError;

/// An upload persisted under the media root.
#[derive(Debug, Clone, Serialize)]
pub struct StoredUpload {
    pub name: String,
    pub path: PathBuf,
    pub url: String,
}

/// Flat directory of uploads keyed by filename. Saving a name that already
/// exists deletes the old file first; there is no versioning.
pub struct MediaStorage {
    root: PathBuf,
    base_url: String,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name)
    }

    /// Writes `bytes` as `<root>/<sanitized name>`, replacing any previous
    /// file of that name. Writes to the same name are serialized.
    pub fn save(&self, client_name: &str, bytes: &[u8]) -> Result<StoredUpload, ServiceError> {
        self.save_with(client_name, bytes, |_| Ok(()))
            .map(|(stored, ())| stored)
    }

    /// Like [`MediaStorage::save`], then runs `read_back` on the stored file
    /// while still holding the name's lock, so no other upload of the same
    /// name can replace the file before `read_back` is done with it.
    pub fn save_with<T, F>(
        &self,
        client_name: &str,
        bytes: &[u8],
        read_back: F,
    ) -> Result<(StoredUpload, T), ServiceError>
    where
        F: FnOnce(&StoredUpload) -> Result<T, ServiceError>,
    {
        let name = sanitize_filename(client_name)
            .ok_or_else(|| ServiceError::InvalidFilename(client_name.to_string()))?;
        let stored = StoredUpload {
            url: self.url(&name),
            path: self.path(&name),
            name,
        };

        let lock = self.lock_for(&stored.name);
        let result = {
            let _guard = lock.lock();
            self.write_replacing(&stored, bytes)
                .and_then(|()| read_back(&stored))
        };
        drop(lock);
        self.release_lock(&stored.name);

        let value = result?;
        Ok((stored, value))
    }

    fn write_replacing(&self, stored: &StoredUpload, bytes: &[u8]) -> Result<(), ServiceError> {
        self.delete(&stored.name)?;
        fs::write(&stored.path, bytes)?;
        tracing::debug!(path = %stored.path.display(), size = bytes.len(), "stored upload");
        Ok(())
    }

    /// Removes `<root>/<name>` if present.
    pub fn delete(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn release_lock(&self, name: &str) {
        let mut locks = self.write_locks.lock();
        if locks.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(name);
        }
    }
}

/// Reduces a client-supplied filename to a single safe path component.
///
/// Directory parts (either separator) are dropped, spaces become underscores
/// and anything other than word characters, `-`, `_` and `.` is removed.
/// Returns `None` when nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned: String = base
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        None
    } else {
        Some(cleaned)
    }
}
