//! Scratch artifacts: collision-free temp paths and guaranteed deletion.
//!
//! Every file the bot writes to disk, whether an upload or an engine output,
//! lives under one shared scratch directory. Names are UUID v4 strings, so
//! concurrent sessions never collide and no lock is needed around allocation.
//!
//! [`Scratch::release`] is best-effort: missing files are fine, and delete
//! failures are logged and swallowed. [`Artifacts`] tracks the outputs of one
//! pipeline run and releases whatever is still held when it is dropped, so an
//! early return or a failed delivery cannot leak a file.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// The shared scratch directory.
#[derive(Debug, Clone)]
pub struct Scratch {
    root: PathBuf,
}

impl Scratch {
    /// Open (and create if missing) the scratch root.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Produce a fresh, unique path ending in `.{extension}`.
    ///
    /// Nothing is created on disk; the caller (or engine) writes the file.
    pub fn allocate(&self, extension: &str) -> PathBuf {
        let extension = extension.trim_start_matches('.');
        let path = self.root.join(format!("{}.{}", Uuid::new_v4(), extension));
        debug!("Allocated scratch artifact {}", path.display());
        path
    }

    /// Delete a single artifact. Never fails.
    pub fn release_one(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Released {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete scratch artifact {}: {}", path.display(), e),
        }
    }

    /// Delete every given artifact. Never fails.
    pub fn release<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.release_one(path.as_ref());
        }
    }

    /// Start tracking the artifacts of one pipeline run.
    pub fn artifacts(&self) -> Artifacts<'_> {
        Artifacts {
            scratch: self,
            paths: Vec::new(),
        }
    }
}

/// Output artifacts allocated during one pipeline run.
///
/// Released exactly once: either explicitly via [`Artifacts::release`] or,
/// for whatever is still held, on drop.
#[derive(Debug)]
pub struct Artifacts<'a> {
    scratch: &'a Scratch,
    paths: Vec<PathBuf>,
}

impl Artifacts<'_> {
    /// Allocate a tracked path.
    pub fn allocate(&mut self, extension: &str) -> PathBuf {
        let path = self.scratch.allocate(extension);
        self.paths.push(path.clone());
        path
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Release every tracked path now.
    pub fn release(mut self) {
        self.release_held();
    }

    fn release_held(&mut self) {
        let paths = std::mem::take(&mut self.paths);
        self.scratch.release(paths);
    }
}

impl Drop for Artifacts<'_> {
    fn drop(&mut self) {
        self.release_held();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn allocate_is_unique_and_rooted() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::open(tmp.path()).unwrap();

        let paths: HashSet<PathBuf> = (0..500).map(|_| scratch.allocate(".pdf")).collect();
        assert_eq!(paths.len(), 500);
        for p in &paths {
            assert!(p.starts_with(tmp.path()));
            assert_eq!(p.extension().unwrap(), "pdf");
        }
    }

    #[test]
    fn open_creates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nested/scratch");
        let scratch = Scratch::open(&root).unwrap();
        assert!(scratch.root().is_dir());
    }

    #[test]
    fn release_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::open(tmp.path()).unwrap();
        let path = scratch.allocate("txt");
        std::fs::write(&path, b"x").unwrap();

        scratch.release([&path]);
        assert!(!path.exists());
        // Already gone, and never created: both are no-ops.
        scratch.release([&path]);
        scratch.release_one(&scratch.allocate("pdf"));
    }

    #[test]
    fn artifacts_release_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::open(tmp.path()).unwrap();
        {
            let mut artifacts = scratch.artifacts();
            for ext in ["pdf", "jpg", "txt"] {
                let p = artifacts.allocate(ext);
                std::fs::write(&p, b"data").unwrap();
            }
            assert_eq!(artifacts.len(), 3);
            assert_eq!(entries(tmp.path()), 3);
        }
        assert_eq!(entries(tmp.path()), 0);
    }

    #[test]
    fn explicit_release_empties_tracking() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::open(tmp.path()).unwrap();
        let mut artifacts = scratch.artifacts();
        let p = artifacts.allocate("pdf");
        std::fs::write(&p, b"%PDF-1.4").unwrap();
        artifacts.release();
        assert!(!p.exists());
    }
}
