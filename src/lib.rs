//! # edgequake-pdfbot
//!
//! The core of a conversational PDF toolbox: a user uploads files, picks an
//! operation from a button menu, answers a follow-up question if the
//! operation needs one (a password, a page range, a file name), and receives
//! the result.
//!
//! The crate owns everything between the chat transport and the document
//! engines:
//!
//! * per-user sessions holding the uploaded batch and the pending question;
//! * a pure dispatcher that turns `(session, signal)` into a decision;
//! * the pipeline that runs engines, delivers results and deletes every
//!   scratch file it created.
//!
//! ## Signal flow
//!
//! ```text
//! Signal (upload / button / text / command)
//!  │
//!  ├─ 1. Lock    session for this user
//!  ├─ 2. Decide  dispatch::decide → reject | ask | run
//!  ├─ 3. Apply   phase change (Processing blocks further requests)
//!  ├─ 4. Unlock
//!  ├─ 5. Run     engine call under a timeout (gs, qpdf, soffice, pdfium)
//!  ├─ 6. Deliver status text, documents, photos via Messenger
//!  └─ 7. Release outputs and the consumed batch
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfbot::{Bot, BotConfig, Engines, Signal, Upload, UserId};
//! # use std::sync::Arc;
//! # async fn demo(messenger: Arc<dyn edgequake_pdfbot::Messenger>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = BotConfig::from_env()?;
//! let bot = Bot::new(config.clone(), Engines::system(&config), messenger)?;
//!
//! let user = UserId(42);
//! let upload = Upload::from_location("report.pdf", config.download_timeout_secs).await?;
//! bot.handle(user, Signal::Upload(upload)).await;
//! bot.handle(user, Signal::Button("compress".into())).await;
//! bot.handle(user, Signal::Button("compress_medium".into())).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfbot` console binary (clap + anyhow + tracing-subscriber) |
//!
//! ## External tools
//!
//! | Operation | Needs |
//! |-----------|-------|
//! | Compress | Ghostscript (`gs`) |
//! | Encrypt, decrypt, split, merge | `qpdf` |
//! | PDF ↔ Word | LibreOffice (`soffice`) |
//! | PDF → images, text, images → PDF | pdfium shared library |
//!
//! A missing tool fails only the operations that need it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bot;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod messages;
pub mod naming;
pub mod pages;
pub mod scratch;
pub mod session;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bot::Bot;
pub use config::{BotConfig, BotConfigBuilder, CompressionLevel, CompressionPresets};
pub use dispatch::{Action, Command};
pub use engine::Engines;
pub use error::{BotError, EngineError, ErrorClass, TransportError};
pub use scratch::Scratch;
pub use session::{FileKind, FileRecord, SessionState, SessionStore, UserId};
pub use transport::{HttpUpload, LocalFile, MessageId, Messenger, Signal, Upload, UploadSource};
