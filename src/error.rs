//! Error types for the edgequake-pdfbot library.
//!
//! Three error types mirror the three boundaries a request crosses:
//!
//! * [`BotError`]: what the **user** is told. Every failure of an inbound
//!   signal ends up here and is rendered with [`BotError::user_message`].
//!   [`BotError::class`] sorts it into validation, precondition, engine or
//!   auth failures so callers (and tests) can tell them apart.
//!
//! * [`EngineError`]: what an external **document engine** reported
//!   (Ghostscript, qpdf, LibreOffice, pdfium). Wrapped into
//!   [`BotError::Engine`] by the pipeline, except a wrong decryption password
//!   which becomes [`BotError::WrongPassword`].
//!
//! * [`TransportError`]: the **messaging** side failed: a download from the
//!   upload source, or delivering a reply. Delivery failures are logged and
//!   never stop artifact cleanup.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`BotError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The user sent something unusable. Session state is unchanged.
    Validation,
    /// The request does not fit the session's current state.
    Precondition,
    /// An external engine failed; inputs are released and the session cleared.
    Engine,
    /// Wrong decryption password; the encrypted source is kept for a retry.
    Auth,
    /// Download or delivery failed.
    Transport,
    /// Misconfiguration or an unexpected internal failure.
    Internal,
}

/// All user-facing failures of the bot core.
#[derive(Debug, Error)]
pub enum BotError {
    // ── Validation ────────────────────────────────────────────────────────
    /// Upload extension is not one of pdf, docx, jpg, jpeg, png.
    #[error("Unsupported file format '{name}'. Please send PDF, DOCX, or image files.")]
    UnsupportedFormat { name: String },

    /// Declared upload size exceeds the configured maximum.
    #[error("File too large! Maximum size is {max_mb} MB.\nYour file: {size_mb:.2} MB")]
    FileTooLarge { size_mb: f64, max_mb: u64 },

    /// A `.pdf` upload whose content is not a PDF.
    #[error("'{name}' is not a valid PDF file.")]
    NotAPdf { name: String },

    /// Page selection text could not be parsed or selects nothing.
    #[error("Invalid page format '{input}'. Please try again (e.g. 1-5, 8, 10-15).")]
    InvalidPageRange { input: String },

    /// Rename target is empty after sanitising.
    #[error("Invalid filename. Please try again.")]
    EmptyFileName,

    /// Password text was empty.
    #[error("The password cannot be empty. Please try again.")]
    EmptyPassword,

    // ── Preconditions ─────────────────────────────────────────────────────
    /// No uploaded file in the session.
    #[error("No file found. Please upload a file first.")]
    NoFile,

    /// The most recent file is of the wrong kind for the operation.
    #[error("This operation needs a {expected} file, but your last upload is {found}.")]
    WrongFileKind {
        expected: &'static str,
        found: &'static str,
    },

    /// Merge requested with fewer than two PDFs in the batch.
    #[error(
        "You have uploaded {found} PDF(s).\n\nPlease upload at least 2 PDFs to merge.\n\
Send more PDF files, then select 'Merge PDFs' again."
    )]
    NotEnoughPdfs { found: usize },

    /// Images-to-PDF requested without any image in the batch.
    #[error("No images found. Please upload JPG or PNG images first.")]
    NoImages,

    /// Free text arrived while nothing is waiting for it.
    #[error("Please send me a PDF file to get started!\n\nUse /help to see all available features.")]
    NothingPending,

    /// An operation button was pressed while a text answer is expected.
    #[error("I'm still waiting for {expected}. Send it, or use /cancel to stop.")]
    AwaitingInput { expected: &'static str },

    /// A choice button from a menu that is no longer the pending one.
    #[error("That button belongs to an earlier menu. Please choose the operation again.")]
    ExpiredChoice,

    /// The button identifier is not a known operation.
    #[error("Unknown action '{tag}'.")]
    UnknownAction { tag: String },

    /// A pipeline is already running for this user.
    #[error("Still working on your previous request. Please wait for it to finish.")]
    Busy,

    // ── Engine ────────────────────────────────────────────────────────────
    /// An external engine failed.
    #[error("{operation} failed: {source}")]
    Engine {
        operation: &'static str,
        #[source]
        source: EngineError,
    },

    // ── Auth ──────────────────────────────────────────────────────────────
    /// Decryption password rejected; the encrypted file is kept.
    #[error("Incorrect password! Please try again.\n\nSend the correct password or upload a new file.")]
    WrongPassword,

    // ── Transport ─────────────────────────────────────────────────────────
    /// Fetching the uploaded bytes failed.
    #[error("Error downloading file: {0}")]
    Download(#[source] TransportError),

    // ── Config / internal ─────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Classify the error for reporting and state handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            BotError::UnsupportedFormat { .. }
            | BotError::FileTooLarge { .. }
            | BotError::NotAPdf { .. }
            | BotError::InvalidPageRange { .. }
            | BotError::EmptyFileName
            | BotError::EmptyPassword => ErrorClass::Validation,
            BotError::NoFile
            | BotError::WrongFileKind { .. }
            | BotError::NotEnoughPdfs { .. }
            | BotError::NoImages
            | BotError::NothingPending
            | BotError::AwaitingInput { .. }
            | BotError::ExpiredChoice
            | BotError::UnknownAction { .. }
            | BotError::Busy => ErrorClass::Precondition,
            BotError::Engine { .. } => ErrorClass::Engine,
            BotError::WrongPassword => ErrorClass::Auth,
            BotError::Download(_) => ErrorClass::Transport,
            BotError::InvalidConfig(_) | BotError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// The text sent to the user. Busy and pending-input notices are
    /// informational; everything else carries the failure mark.
    pub fn user_message(&self) -> String {
        match self {
            BotError::Busy => format!("⏳ {self}"),
            BotError::NothingPending => self.to_string(),
            _ => format!("❌ {self}"),
        }
    }
}

/// Failure reported by an external document engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine's executable is not installed or not on `PATH`.
    #[error("'{program}' is not installed or not on PATH")]
    MissingBinary { program: String },

    /// The engine ran and reported an error.
    #[error("{tool}: {message}")]
    Failed { tool: String, message: String },

    /// The document password was rejected.
    #[error("invalid password")]
    WrongPassword,

    /// The engine did not finish within the configured bound.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Text extraction found no text layer.
    #[error("No text found in PDF. The PDF might contain only images.")]
    NoText,

    /// The engine finished but the expected output file is missing.
    #[error("expected output '{path}' was not produced")]
    MissingOutput { path: PathBuf },

    /// Filesystem error around the engine call.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// In-process engine (pdfium, image) error.
    #[error("{0}")]
    Internal(String),
}

/// Failure of the messaging side: downloads and deliveries.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The upload could not be fetched.
    #[error("failed to fetch '{source_name}': {reason}")]
    FetchFailed { source_name: String, reason: String },

    /// The upload turned out larger than allowed while streaming.
    #[error("download exceeded the {max_bytes} byte limit")]
    TooLarge { max_bytes: u64 },

    /// The fetch did not finish in time.
    #[error("download timed out after {secs}s")]
    Timeout { secs: u64 },

    /// A reply could not be delivered.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Local filesystem error while fetching or delivering.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
