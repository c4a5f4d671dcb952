use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver};
use log::{debug, error};

use crate::error::StorageError;

/// Storage backend a path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Read-only game data shipped with the title.
    Title,
    /// Per-user writable storage.
    User,
}

/// Loads whole files for the player.
///
/// Path resolution and backend readiness are the provider's concern.
pub trait ByteProvider: Send + Sync {
    fn read_all(&self, path: &str, kind: StorageKind) -> Result<Bytes, StorageError>;
}

/// [`ByteProvider`] reading from two directories on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsByteProvider {
    title_root: PathBuf,
    user_root: Option<PathBuf>,
}

impl FsByteProvider {
    pub fn new(title_root: impl Into<PathBuf>) -> Self {
        Self {
            title_root: title_root.into(),
            user_root: None,
        }
    }

    /// Enables [`StorageKind::User`] reads from `root`.
    pub fn set_user_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.user_root = Some(root.into());
        self
    }

    fn root(&self, kind: StorageKind) -> Result<&Path, StorageError> {
        match kind {
            StorageKind::Title => Ok(&self.title_root),
            StorageKind::User => self
                .user_root
                .as_deref()
                .ok_or(StorageError::NotReady(StorageKind::User)),
        }
    }
}

impl ByteProvider for FsByteProvider {
    fn read_all(&self, path: &str, kind: StorageKind) -> Result<Bytes, StorageError> {
        let full_path = self.root(kind)?.join(path);
        match std::fs::read(&full_path) {
            Ok(data) => {
                debug!("Read {} bytes from {}", data.len(), full_path.display());
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(path.to_string())),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// Reads `path` on a worker thread.
///
/// The returned receiver delivers exactly one result: the bytes, or the
/// error that prevented loading them.
pub fn load_in_background(
    provider: Arc<dyn ByteProvider>,
    path: impl Into<String>,
    kind: StorageKind,
) -> Receiver<Result<Bytes, StorageError>> {
    let path = path.into();
    let (sender, receiver) = bounded(1);
    let worker_sender = sender.clone();

    let spawned = std::thread::Builder::new()
        .name(format!("rc2d-load:{path}"))
        .spawn(move || {
            let result = provider.read_all(&path, kind);
            if let Err(e) = &result {
                error!("Background load of {path} failed: {e}");
            }
            // The receiver may have been dropped; nothing left to notify.
            let _ = worker_sender.send(result);
        });

    if let Err(e) = spawned {
        error!("Failed to spawn loader thread: {e}");
        let _ = sender.send(Err(StorageError::Io(e)));
    }
    receiver
}

/// Blocks until a [`load_in_background`] result arrives.
pub fn wait_for(receiver: &Receiver<Result<Bytes, StorageError>>) -> Result<Bytes, StorageError> {
    receiver.recv().map_err(|_| StorageError::Disconnected)?
}
