//! Filesystem-backed blob store.
//!
//! The workflow core treats storage locators as opaque strings; this module
//! is the collaborator that actually resolves them. Bytes are written through
//! a temporary file and moved into place, so a partially written object is
//! never visible under its final path.

use chrono::Utc;
use failure::Fail;
use std::{
    ffi::OsStr,
    fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::db::types::SubmissionStage;

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new<P>(root: P) -> Result<Storage, io::Error>
    where
        P: Into<PathBuf>,
    {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Storage { root })
    }

    /// Store `bytes` under `path`, failing if the path is already taken.
    pub fn put(&self, path: &str, bytes: &[u8]) -> Result<(), PutError> {
        let full = self.resolve(path)?;

        if full.exists() {
            return Err(PutError::Exists);
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.persist_noclobber(&full)?;

        Ok(())
    }

    /// Fetch the bytes stored under `path`.
    pub fn get(&self, path: &str) -> Result<Vec<u8>, GetError> {
        let full = self.resolve(path)?;

        fs::read(&full).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => GetError::NotFound,
            _ => GetError::System(err),
        })
    }

    /// Remove the bytes stored under `path`.
    ///
    /// Removing a path that holds no bytes is not an error.
    pub fn delete(&self, path: &str) -> Result<(), io::Error> {
        let full = match self.resolve(path) {
            Ok(full) => full,
            Err(BadPath) => return Ok(()),
        };

        match fs::remove_file(&full) {
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Map an opaque locator onto the filesystem, rejecting locators which
    /// would escape the storage root.
    fn resolve(&self, path: &str) -> Result<PathBuf, BadPath> {
        let relative = Path::new(path);

        let escapes = relative.components().any(|c| match c {
            Component::Normal(_) => false,
            _ => true,
        });

        if escapes || relative.components().next().is_none() {
            return Err(BadPath);
        }

        Ok(self.root.join(relative))
    }
}

/// Compute the locator under which a newly uploaded file is stored.
///
/// The timestamp prefix keeps repeated uploads of the same label from
/// colliding.
pub fn submission_path(
    submission: Uuid,
    stage: SubmissionStage,
    label: &str,
    file_name: &str,
) -> String {
    let extension = Path::new(file_name)
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or("dat");

    format!(
        "submissions/{}/{}/{}-{}.{}",
        submission,
        stage,
        Utc::now().timestamp_millis(),
        sanitize_label(label),
        extension,
    )
}

/// Replace everything outside `[a-zA-Z0-9.-]` with underscores.
fn sanitize_label(label: &str) -> String {
    label.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' => c,
            _ => '_',
        })
        .collect()
}

#[derive(Debug, Fail)]
pub enum PutError {
    /// There already is an object under this path.
    #[fail(display = "storage path is already taken")]
    Exists,
    /// System error.
    #[fail(display = "{}", _0)]
    System(#[cause] io::Error),
}

impl_from! { for PutError ;
    io::Error => |e| PutError::System(e),
    tempfile::PersistError => |e| PutError::System(e.error),
}

#[derive(Debug, Fail)]
pub enum GetError {
    /// No bytes are stored under this path.
    #[fail(display = "no object under this storage path")]
    NotFound,
    /// System error.
    #[fail(display = "{}", _0)]
    System(#[cause] io::Error),
}

#[derive(Debug, Fail)]
#[fail(display = "storage path escapes the storage root")]
pub struct BadPath;

impl_from! { for PutError ;
    BadPath => |_| PutError::System(
        io::Error::new(io::ErrorKind::InvalidInput, "bad storage path")),
}

impl_from! { for GetError ;
    BadPath => |_| GetError::NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn put_get_delete() {
        let (_dir, storage) = storage();

        storage.put("submissions/a/b.pdf", b"content").unwrap();
        assert_eq!(storage.get("submissions/a/b.pdf").unwrap(), b"content");

        storage.delete("submissions/a/b.pdf").unwrap();
        match storage.get("submissions/a/b.pdf") {
            Err(GetError::NotFound) => (),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }

        // Deleting again is a no-op.
        storage.delete("submissions/a/b.pdf").unwrap();
    }

    #[test]
    fn put_refuses_to_overwrite() {
        let (_dir, storage) = storage();

        storage.put("a.bin", b"one").unwrap();
        match storage.put("a.bin", b"two") {
            Err(PutError::Exists) => (),
            other => panic!("expected Exists, got {:?}", other),
        }
        assert_eq!(storage.get("a.bin").unwrap(), b"one");
    }

    #[test]
    fn traversal_is_rejected() {
        let (_dir, storage) = storage();

        match storage.put("../escape.bin", b"nope") {
            Err(PutError::System(_)) => (),
            other => panic!("expected System, got {:?}", other),
        }
    }

    #[test]
    fn upload_paths_are_namespaced_and_sanitized() {
        let id = Uuid::new_v4();
        let path = submission_path(
            id, SubmissionStage::Review, "Revised MS (final)", "draft.PDF");

        let prefix = format!("submissions/{}/review/", id);
        assert!(path.starts_with(&prefix), "bad prefix: {}", path);
        assert!(path.ends_with("-Revised_MS__final_.PDF"), "bad suffix: {}", path);
    }

    #[test]
    fn extension_defaults_when_missing() {
        let path = submission_path(
            Uuid::new_v4(), SubmissionStage::Production, "proofs", "galley");
        assert!(path.ends_with(".dat"));
    }
}
