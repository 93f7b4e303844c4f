//! Operation dispatch: a pure decision over `(session, input)`.
//!
//! [`decide`] looks at a session snapshot and one inbound input and says what
//! should happen: reject, ask for something, or run a job on specific files.
//! It performs no I/O and mutates nothing. [`crate::bot::Bot`] applies the
//! decision's state change under the session lock and then carries out the
//! side effects.
//!
//! Buttons are parsed into [`Action`] and matched exhaustively. Free text is
//! routed only by the session's [`WaitingFor`] tag, never by what the text
//! says.

use crate::config::{BotConfig, CompressionLevel};
use crate::error::BotError;
use crate::messages;
use crate::naming::sanitize_file_name;
use crate::pages::parse_page_ranges;
use crate::session::{Choice, FileKind, FileRecord, Phase, Session, WaitingFor};
use std::fmt;
use std::str::FromStr;

/// A button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Compress,
    CompressLevel(CompressionLevel),
    Encrypt,
    Decrypt,
    Split,
    Merge,
    ConfirmMerge,
    CancelMerge,
    Rename,
    PdfToWord,
    WordToPdf,
    PdfToImages,
    ExtractText,
    ImagesToPdf,
}

impl Action {
    /// The identifier carried by the button.
    pub fn tag(self) -> &'static str {
        match self {
            Action::Compress => "compress",
            Action::CompressLevel(CompressionLevel::Low) => "compress_low",
            Action::CompressLevel(CompressionLevel::Medium) => "compress_medium",
            Action::CompressLevel(CompressionLevel::High) => "compress_high",
            Action::Encrypt => "encrypt",
            Action::Decrypt => "decrypt",
            Action::Split => "split",
            Action::Merge => "merge",
            Action::ConfirmMerge => "confirm_merge",
            Action::CancelMerge => "cancel_merge",
            Action::Rename => "rename",
            Action::PdfToWord => "pdf_to_word",
            Action::WordToPdf => "word_to_pdf",
            Action::PdfToImages => "pdf_to_images",
            Action::ExtractText => "extract_text",
            Action::ImagesToPdf => "images_to_pdf",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Action {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "compress" => Action::Compress,
            "compress_low" => Action::CompressLevel(CompressionLevel::Low),
            "compress_medium" => Action::CompressLevel(CompressionLevel::Medium),
            "compress_high" => Action::CompressLevel(CompressionLevel::High),
            "encrypt" => Action::Encrypt,
            "decrypt" => Action::Decrypt,
            "split" => Action::Split,
            "merge" => Action::Merge,
            "confirm_merge" => Action::ConfirmMerge,
            "cancel_merge" => Action::CancelMerge,
            "rename" => Action::Rename,
            "pdf_to_word" => Action::PdfToWord,
            "word_to_pdf" => Action::WordToPdf,
            "pdf_to_images" => Action::PdfToImages,
            "extract_text" => Action::ExtractText,
            "images_to_pdf" => Action::ImagesToPdf,
            other => {
                return Err(BotError::UnknownAction {
                    tag: other.to_string(),
                })
            }
        };
        Ok(action)
    }
}

/// Slash commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('/') {
            "start" => Ok(Command::Start),
            "help" => Ok(Command::Help),
            "cancel" => Ok(Command::Cancel),
            _ => Err(()),
        }
    }
}

/// The dispatch-relevant content of an inbound signal.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Upload { name: &'a str, declared_size: u64 },
    Button(&'a str),
    Text(&'a str),
    Command(Command),
}

/// A unit of engine work, with every parameter it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Compress { level: CompressionLevel },
    Encrypt { password: String },
    Decrypt { password: String },
    Split { pages: Vec<usize> },
    Merge,
    Rename { file_name: String },
    PdfToWord,
    WordToPdf,
    PdfToImages,
    ExtractText,
    ImagesToPdf,
}

impl Job {
    /// Name used in failure messages ("Compression failed: …").
    pub fn operation(&self) -> &'static str {
        match self {
            Job::Compress { .. } => "Compression",
            Job::Encrypt { .. } => "Encryption",
            Job::Decrypt { .. } => "Decryption",
            Job::Split { .. } => "Split",
            Job::Merge => "Merge",
            Job::Rename { .. } => "Rename",
            Job::PdfToWord | Job::WordToPdf | Job::PdfToImages | Job::ImagesToPdf => {
                "Conversion"
            }
            Job::ExtractText => "Extraction",
        }
    }

    /// Progress text shown before the engine runs.
    pub fn progress(&self) -> &'static str {
        match self {
            Job::Compress { .. } => "⏳ Compressing PDF...",
            Job::Encrypt { .. } => "⏳ Encrypting PDF...",
            Job::Decrypt { .. } => "⏳ Decrypting PDF...",
            Job::Split { .. } => "⏳ Splitting PDF...",
            Job::Merge => "⏳ Merging PDFs...",
            Job::Rename { .. } => "⏳ Renaming file...",
            Job::PdfToWord => "⏳ Converting PDF to Word...",
            Job::WordToPdf => "⏳ Converting Word to PDF...",
            Job::PdfToImages => "⏳ Converting PDF to images...",
            Job::ExtractText => "⏳ Extracting text...",
            Job::ImagesToPdf => "⏳ Creating PDF from images...",
        }
    }
}

/// What to show along with a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    /// Button rows; empty for a plain text prompt.
    pub buttons: Vec<Vec<Action>>,
}

impl Prompt {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }
}

/// Outcome of [`decide`].
#[derive(Debug)]
pub enum Decision {
    /// Informational reply; no state change.
    Reply(String),
    /// Rejected; no state change.
    Reject(BotError),
    /// The pending input's prerequisite vanished; reset to ready and report.
    Abandon(BotError),
    /// Upload passed validation; fetch it as `kind`.
    Accept(FileKind),
    /// User cancelled; `had_pending` says whether anything was cleared.
    Cancel { had_pending: bool },
    /// Move to `phase` and show `prompt`.
    Ask { phase: Phase, prompt: Prompt },
    /// Split needs the page count of `file` before it can ask for pages.
    CountPages(FileRecord),
    /// Enter processing and run `job` on `inputs`.
    Run { job: Job, inputs: Vec<FileRecord> },
}

impl Decision {
    /// The phase the session enters when this decision is applied, if it
    /// changes. An accepted upload changes nothing until its file is
    /// appended.
    pub fn next_phase(&self) -> Option<Phase> {
        match self {
            Decision::Ask { phase, .. } => Some(*phase),
            Decision::CountPages(_) | Decision::Run { .. } => Some(Phase::Processing),
            Decision::Abandon(_) | Decision::Cancel { .. } => Some(Phase::Ready),
            Decision::Reply(_) | Decision::Reject(_) | Decision::Accept(_) => None,
        }
    }
}

/// Decide what `input` means for `session`.
pub fn decide(session: &Session, input: Input<'_>, config: &BotConfig) -> Decision {
    match input {
        Input::Command(command) => decide_command(session, command, config),
        _ if session.is_processing() => Decision::Reject(BotError::Busy),
        Input::Upload {
            name,
            declared_size,
        } => match validate_upload(name, declared_size, config) {
            Ok(kind) => Decision::Accept(kind),
            Err(e) => Decision::Reject(e),
        },
        Input::Button(tag) => match tag.parse::<Action>() {
            Ok(action) => decide_action(session, action),
            Err(e) => Decision::Reject(e),
        },
        Input::Text(text) => decide_text(session, text),
    }
}

/// Extension and size checks, before anything is stored or allocated.
pub fn validate_upload(name: &str, declared_size: u64, config: &BotConfig) -> Result<FileKind, BotError> {
    let kind = FileKind::from_file_name(name).ok_or_else(|| BotError::UnsupportedFormat {
        name: name.to_string(),
    })?;
    if declared_size > config.max_upload_bytes() {
        return Err(BotError::FileTooLarge {
            size_mb: declared_size as f64 / (1024.0 * 1024.0),
            max_mb: config.max_upload_mb,
        });
    }
    Ok(kind)
}

fn decide_command(session: &Session, command: Command, config: &BotConfig) -> Decision {
    match command {
        Command::Start => Decision::Reply(messages::WELCOME.to_string()),
        Command::Help => Decision::Reply(messages::help(config.max_upload_mb)),
        Command::Cancel => match session.phase() {
            Phase::Processing => Decision::Reject(BotError::Busy),
            Phase::Ready => Decision::Cancel { had_pending: false },
            Phase::AwaitingChoice(_) | Phase::AwaitingInput(_) => {
                Decision::Cancel { had_pending: true }
            }
        },
    }
}

fn decide_action(session: &Session, action: Action) -> Decision {
    if let Some(waiting) = session.waiting_for() {
        return Decision::Reject(BotError::AwaitingInput {
            expected: waiting.describe(),
        });
    }

    match action {
        Action::Compress => with_last(session, FileKind::Pdf, |_| Decision::Ask {
            phase: Phase::AwaitingChoice(Choice::CompressLevel),
            prompt: Prompt {
                text: "Select compression level:".to_string(),
                buttons: messages::compression_menu(),
            },
        }),
        Action::CompressLevel(level) => {
            if session.phase() != Phase::AwaitingChoice(Choice::CompressLevel) {
                return Decision::Reject(BotError::ExpiredChoice);
            }
            run_on_last(session, FileKind::Pdf, Job::Compress { level })
        }
        Action::Encrypt => ask_for(session, WaitingFor::EncryptPassword, messages::ENCRYPT_PROMPT),
        Action::Decrypt => ask_for(session, WaitingFor::DecryptPassword, messages::DECRYPT_PROMPT),
        Action::Rename => ask_for(session, WaitingFor::RenameInput, messages::RENAME_PROMPT),
        Action::Split => with_last(session, FileKind::Pdf, |file| Decision::CountPages(file.clone())),
        Action::Merge => {
            let batch = session.pdf_batch();
            if batch.len() < 2 {
                return Decision::Reject(BotError::NotEnoughPdfs { found: batch.len() });
            }
            Decision::Ask {
                phase: Phase::AwaitingChoice(Choice::MergeConfirmation),
                prompt: Prompt {
                    text: messages::merge_listing(&batch),
                    buttons: vec![vec![Action::ConfirmMerge], vec![Action::CancelMerge]],
                },
            }
        }
        Action::ConfirmMerge => {
            // The batch may have changed since the listing was shown.
            if session.phase() != Phase::AwaitingChoice(Choice::MergeConfirmation) {
                return Decision::Reject(BotError::ExpiredChoice);
            }
            let batch = session.pdf_batch();
            if batch.len() < 2 {
                return Decision::Reject(BotError::NotEnoughPdfs { found: batch.len() });
            }
            Decision::Run {
                job: Job::Merge,
                inputs: batch,
            }
        }
        Action::CancelMerge => Decision::Cancel {
            had_pending: session.phase() == Phase::AwaitingChoice(Choice::MergeConfirmation),
        },
        Action::PdfToWord => run_on_last(session, FileKind::Pdf, Job::PdfToWord),
        Action::PdfToImages => run_on_last(session, FileKind::Pdf, Job::PdfToImages),
        Action::ExtractText => run_on_last(session, FileKind::Pdf, Job::ExtractText),
        Action::WordToPdf => run_on_last(session, FileKind::Docx, Job::WordToPdf),
        Action::ImagesToPdf => {
            let images = session.image_batch();
            if images.is_empty() {
                return Decision::Reject(BotError::NoImages);
            }
            Decision::Run {
                job: Job::ImagesToPdf,
                inputs: images,
            }
        }
    }
}

fn decide_text(session: &Session, text: &str) -> Decision {
    let Some(waiting) = session.waiting_for() else {
        return Decision::Reject(BotError::NothingPending);
    };

    let job = match waiting {
        WaitingFor::EncryptPassword | WaitingFor::DecryptPassword => {
            if text.trim().is_empty() {
                return Decision::Reject(BotError::EmptyPassword);
            }
            let password = text.to_string();
            if waiting == WaitingFor::EncryptPassword {
                Job::Encrypt { password }
            } else {
                Job::Decrypt { password }
            }
        }
        WaitingFor::SplitPages { total_pages } => {
            let pages = parse_page_ranges(text, total_pages);
            if pages.is_empty() {
                return Decision::Reject(BotError::InvalidPageRange {
                    input: text.trim().to_string(),
                });
            }
            Job::Split { pages }
        }
        WaitingFor::RenameInput => match sanitize_file_name(text) {
            Some(file_name) => Job::Rename { file_name },
            None => return Decision::Reject(BotError::EmptyFileName),
        },
    };

    match require_last(session, FileKind::Pdf) {
        Ok(file) => Decision::Run {
            job,
            inputs: vec![file.clone()],
        },
        Err(e) => Decision::Abandon(e),
    }
}

fn require_last(session: &Session, kind: FileKind) -> Result<&FileRecord, BotError> {
    let file = session.last_file().ok_or(BotError::NoFile)?;
    let matches = if kind.is_image() {
        file.kind.is_image()
    } else {
        file.kind == kind
    };
    if !matches {
        return Err(BotError::WrongFileKind {
            expected: kind.label(),
            found: file.kind.label(),
        });
    }
    Ok(file)
}

fn with_last(session: &Session, kind: FileKind, f: impl FnOnce(&FileRecord) -> Decision) -> Decision {
    match require_last(session, kind) {
        Ok(file) => f(file),
        Err(e) => Decision::Reject(e),
    }
}

fn run_on_last(session: &Session, kind: FileKind, job: Job) -> Decision {
    with_last(session, kind, |file| Decision::Run {
        job,
        inputs: vec![file.clone()],
    })
}

fn ask_for(session: &Session, waiting: WaitingFor, text: &str) -> Decision {
    with_last(session, FileKind::Pdf, |_| Decision::Ask {
        phase: Phase::AwaitingInput(waiting),
        prompt: Prompt::text(text),
    })
}
