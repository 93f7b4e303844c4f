//! Per-user session state: the uploaded batch and what the bot waits for.
//!
//! A [`Session`] is a plain value. [`SessionStore`] maps user ids to sessions,
//! each behind its own mutex, so handlers for different users never contend
//! and handlers for one user see each other's changes atomically. Locks are
//! never held across an `.await`; the pipeline marks a session
//! [`Phase::Processing`] and releases the lock before calling an engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Opaque identity of the remote user, as assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Files ────────────────────────────────────────────────────────────────

/// Accepted upload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Docx,
    Jpg,
    Jpeg,
    Png,
}

impl FileKind {
    /// Kind from a file name's extension (case-insensitive).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileKind::Pdf),
            "docx" => Some(FileKind::Docx),
            "jpg" => Some(FileKind::Jpg),
            "jpeg" => Some(FileKind::Jpeg),
            "png" => Some(FileKind::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Jpg => "jpg",
            FileKind::Jpeg => "jpeg",
            FileKind::Png => "png",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, FileKind::Jpg | FileKind::Jpeg | FileKind::Png)
    }

    /// Label used in user-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            FileKind::Pdf => "PDF",
            FileKind::Docx => "Word (DOCX)",
            FileKind::Jpg | FileKind::Jpeg | FileKind::Png => "image",
        }
    }
}

/// One uploaded artifact.
///
/// `path` points into the scratch directory and is deleted when the batch is
/// cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub original_name: String,
    pub kind: FileKind,
}

// ── State ────────────────────────────────────────────────────────────────

/// The free-text answer a session expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum WaitingFor {
    EncryptPassword,
    DecryptPassword,
    /// Page selection for the most recent file, which has `total_pages` pages.
    SplitPages { total_pages: usize },
    RenameInput,
}

impl WaitingFor {
    /// Stable identifier of the tag.
    pub fn tag(self) -> &'static str {
        match self {
            WaitingFor::EncryptPassword => "encrypt_password",
            WaitingFor::DecryptPassword => "decrypt_password",
            WaitingFor::SplitPages { .. } => "split_pages",
            WaitingFor::RenameInput => "rename_input",
        }
    }

    /// What the user is expected to send, for reminders.
    pub fn describe(self) -> &'static str {
        match self {
            WaitingFor::EncryptPassword => "a password to encrypt your PDF",
            WaitingFor::DecryptPassword => "the password to decrypt your PDF",
            WaitingFor::SplitPages { .. } => "the pages to extract",
            WaitingFor::RenameInput => "the new file name",
        }
    }
}

/// A button choice a session expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    CompressLevel,
    MergeConfirmation,
}

/// Where the session is in its conversation.
///
/// Exactly one variant at a time, so a session can never wait for two
/// answers at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing pending.
    #[default]
    Ready,
    AwaitingChoice(Choice),
    AwaitingInput(WaitingFor),
    /// A pipeline is running; new requests are turned away.
    Processing,
}

/// Observable state of a session, derived from its phase and files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    FileReady(FileKind),
    AwaitingChoice(Choice),
    AwaitingInput(WaitingFor),
    Processing,
}

// ── Session ──────────────────────────────────────────────────────────────

/// One user's uploads and conversation phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    files: Vec<FileRecord>,
    phase: Phase,
}

impl Session {
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Ready => match self.last_file() {
                Some(file) => SessionState::FileReady(file.kind),
                None => SessionState::Idle,
            },
            Phase::AwaitingChoice(choice) => SessionState::AwaitingChoice(choice),
            Phase::AwaitingInput(waiting) => SessionState::AwaitingInput(waiting),
            Phase::Processing => SessionState::Processing,
        }
    }

    /// The pending text tag, if any.
    pub fn waiting_for(&self) -> Option<WaitingFor> {
        match self.phase {
            Phase::AwaitingInput(waiting) => Some(waiting),
            _ => None,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.phase == Phase::Processing
    }

    /// No files and nothing pending: indistinguishable from a new session.
    pub fn is_blank(&self) -> bool {
        self.files.is_empty() && self.phase == Phase::Ready
    }

    pub fn append_file(&mut self, record: FileRecord) {
        self.files.push(record);
    }

    pub fn set_waiting(&mut self, waiting: WaitingFor) {
        self.phase = Phase::AwaitingInput(waiting);
    }

    /// Drop any pending text input or button choice. Idempotent; a running
    /// pipeline is left alone.
    pub fn clear_waiting(&mut self) {
        if self.phase != Phase::Processing {
            self.phase = Phase::Ready;
        }
    }

    /// Empty the batch, handing the records back so their artifacts can be
    /// released. Idempotent.
    pub fn clear_files(&mut self) -> Vec<FileRecord> {
        std::mem::take(&mut self.files)
    }

    pub fn last_file(&self) -> Option<&FileRecord> {
        self.files.last()
    }

    /// PDF records in upload order.
    pub fn pdf_batch(&self) -> Vec<FileRecord> {
        self.files
            .iter()
            .filter(|f| f.kind == FileKind::Pdf)
            .cloned()
            .collect()
    }

    /// Image records in upload order.
    pub fn image_batch(&self) -> Vec<FileRecord> {
        self.files
            .iter()
            .filter(|f| f.kind.is_image())
            .cloned()
            .collect()
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// In-memory map from user to session, synchronised per key.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Arc<Mutex<Session>>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, user: UserId) -> Arc<Mutex<Session>> {
        Arc::clone(lock(&self.sessions).entry(user).or_default())
    }

    /// Run `f` with exclusive access to `user`'s session.
    ///
    /// The map lock is released before `f` runs, so only this user's
    /// session is held. A session left blank is dropped from the map.
    pub fn with<R>(&self, user: UserId, f: impl FnOnce(&mut Session) -> R) -> R {
        let session = self.entry(user);
        let result = f(&mut lock(&session));
        self.evict_if_blank(user, session);
        result
    }

    fn evict_if_blank(&self, user: UserId, session: Arc<Mutex<Session>>) {
        let mut sessions = lock(&self.sessions);
        // Handles are only cloned under the map lock, so a count of two (the
        // map's and ours) means no other caller can reach this session.
        if Arc::strong_count(&session) == 2 && lock(&session).is_blank() {
            sessions.remove(&user);
        }
    }

    /// A copy of `user`'s session.
    pub fn snapshot(&self, user: UserId) -> Session {
        self.with(user, |s| s.clone())
    }

    pub fn append_file(&self, user: UserId, record: FileRecord) {
        self.with(user, |s| s.append_file(record));
    }

    pub fn set_waiting(&self, user: UserId, waiting: WaitingFor) {
        self.with(user, |s| s.set_waiting(waiting));
    }

    pub fn clear_waiting(&self, user: UserId) {
        self.with(user, Session::clear_waiting);
    }

    pub fn clear_files(&self, user: UserId) -> Vec<FileRecord> {
        self.with(user, Session::clear_files)
    }

    pub fn last_file(&self, user: UserId) -> Option<FileRecord> {
        self.with(user, |s| s.last_file().cloned())
    }

    pub fn pdf_batch(&self, user: UserId) -> Vec<FileRecord> {
        self.with(user, |s| s.pdf_batch())
    }

    /// Number of users with a session.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> FileRecord {
        FileRecord {
            path: PathBuf::from(format!("/scratch/{name}")),
            original_name: name.to_string(),
            kind: FileKind::from_file_name(name).unwrap(),
        }
    }

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(FileKind::from_file_name("Report.PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_file_name("a.b.jpeg"), Some(FileKind::Jpeg));
        assert_eq!(FileKind::from_file_name("notes.txt"), None);
        assert_eq!(FileKind::from_file_name("README"), None);
    }

    #[test]
    fn state_follows_files_and_phase() {
        let mut s = Session::default();
        assert_eq!(s.state(), SessionState::Idle);

        s.append_file(record("a.docx"));
        assert_eq!(s.state(), SessionState::FileReady(FileKind::Docx));

        s.set_waiting(WaitingFor::RenameInput);
        assert_eq!(s.state(), SessionState::AwaitingInput(WaitingFor::RenameInput));
        assert_eq!(s.waiting_for().map(WaitingFor::tag), Some("rename_input"));

        s.clear_waiting();
        s.clear_waiting();
        assert_eq!(s.state(), SessionState::FileReady(FileKind::Docx));
    }

    #[test]
    fn setting_a_new_tag_replaces_the_old_one() {
        let mut s = Session::default();
        s.set_waiting(WaitingFor::EncryptPassword);
        s.set_waiting(WaitingFor::SplitPages { total_pages: 4 });
        assert_eq!(s.waiting_for(), Some(WaitingFor::SplitPages { total_pages: 4 }));
    }

    #[test]
    fn clear_waiting_leaves_processing_alone() {
        let mut s = Session::default();
        s.set_phase(Phase::Processing);
        s.clear_waiting();
        assert!(s.is_processing());
    }

    #[test]
    fn batches_keep_upload_order() {
        let mut s = Session::default();
        for name in ["one.pdf", "pic.png", "two.pdf", "doc.docx", "three.pdf"] {
            s.append_file(record(name));
        }
        let names: Vec<_> = s.pdf_batch().into_iter().map(|f| f.original_name).collect();
        assert_eq!(names, ["one.pdf", "two.pdf", "three.pdf"]);
        assert_eq!(s.image_batch().len(), 1);
        assert_eq!(s.last_file().unwrap().original_name, "three.pdf");
    }

    #[test]
    fn clear_files_starts_a_new_batch() {
        let store = SessionStore::new();
        let user = UserId(7);
        store.append_file(user, record("a.pdf"));
        store.append_file(user, record("b.pdf"));

        assert_eq!(store.clear_files(user).len(), 2);
        assert!(store.clear_files(user).is_empty());
        assert!(store.last_file(user).is_none());

        store.append_file(user, record("c.pdf"));
        assert_eq!(store.pdf_batch(user).len(), 1);
    }

    #[test]
    fn sessions_are_disjoint_by_user() {
        let store = SessionStore::new();
        store.append_file(UserId(1), record("a.pdf"));
        store.set_waiting(UserId(2), WaitingFor::DecryptPassword);

        assert!(store.snapshot(UserId(1)).waiting_for().is_none());
        assert!(store.snapshot(UserId(2)).files().is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn blank_sessions_are_not_kept() {
        let store = SessionStore::new();
        let user = UserId(9);

        assert_eq!(store.snapshot(user).state(), SessionState::Idle);
        store.clear_waiting(user);
        assert!(store.is_empty());

        store.append_file(user, record("a.pdf"));
        assert_eq!(store.len(), 1);
        store.with(user, |s| s.set_phase(Phase::Processing));
        store.clear_files(user);
        assert_eq!(store.len(), 1, "a running pipeline keeps its session");

        store.with(user, |s| s.set_phase(Phase::Ready));
        assert!(store.is_empty());
    }
}
