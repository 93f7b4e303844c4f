//! The operation pipeline: one inbound signal in, replies and documents out.
//!
//! [`Bot::handle`] is the only entry point. For every signal it
//!
//! 1. locks the user's session, asks [`dispatch::decide`] what the signal
//!    means, applies the resulting phase change, and unlocks;
//! 2. carries out the side effects: status messages, engine calls,
//!    deliveries;
//! 3. on completion, releases every artifact it allocated and resets the
//!    session.
//!
//! A session in [`Phase::Processing`] turns away every further operation, so
//! a double-clicked button runs its job once. Locks are never held across an
//! `.await`.
//!
//! ## Artifact lifetimes
//!
//! Engine outputs are allocated through [`Artifacts`] and released when the
//! run ends, whether it succeeded, failed, or delivery broke halfway. Inputs
//! stay in the session until the run finishes; a successful or failed run
//! then clears the whole batch and releases it. The single exception is a
//! rejected decryption password: the encrypted input is kept so the user can
//! try again.

use crate::config::BotConfig;
use crate::dispatch::{self, Decision, Input, Job};
use crate::engine::{Engines, PermissionPolicy};
use crate::error::{BotError, EngineError, TransportError};
use crate::messages;
use crate::naming::{prefixed, with_extension};
use crate::scratch::{Artifacts, Scratch};
use crate::session::{FileKind, FileRecord, Phase, SessionStore, UserId, WaitingFor};
use crate::transport::{has_pdf_magic, MessageId, Messenger, Signal, Upload};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The bot core: sessions, scratch space, engines and the outbound channel.
pub struct Bot {
    config: BotConfig,
    scratch: Scratch,
    sessions: SessionStore,
    engines: Engines,
    messenger: Arc<dyn Messenger>,
}

/// What the user receives when a job succeeds.
#[derive(Debug)]
struct Delivery {
    status: String,
    items: Vec<Item>,
}

#[derive(Debug)]
enum Item {
    Document {
        path: PathBuf,
        file_name: String,
        caption: Option<String>,
    },
    Photo {
        path: PathBuf,
        caption: String,
    },
}

impl Delivery {
    fn document(status: impl Into<String>, path: PathBuf, file_name: String, caption: Option<String>) -> Self {
        Self {
            status: status.into(),
            items: vec![Item::Document {
                path,
                file_name,
                caption,
            }],
        }
    }
}

/// How a finished run leaves the session.
#[derive(Debug, Clone, Copy)]
enum Outcome {
    /// Clear the batch and release it.
    Finished,
    /// Keep the batch and wait for another answer.
    Retry(WaitingFor),
}

impl Bot {
    /// Create a bot, opening the scratch directory named in `config`.
    pub fn new(config: BotConfig, engines: Engines, messenger: Arc<dyn Messenger>) -> Result<Self, BotError> {
        let scratch = Scratch::open(&config.scratch_dir).map_err(|e| {
            BotError::InvalidConfig(format!(
                "cannot create scratch directory '{}': {}",
                config.scratch_dir.display(),
                e
            ))
        })?;
        info!("Scratch directory: {}", scratch.root().display());
        Ok(Self {
            config,
            scratch,
            sessions: SessionStore::new(),
            engines,
            messenger,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Process one inbound signal for `user` to completion.
    pub async fn handle(&self, user: UserId, signal: Signal) {
        match signal {
            Signal::Upload(upload) => self.on_upload(user, upload).await,
            Signal::Button(tag) => self.on_input(user, Input::Button(&tag)).await,
            Signal::Text(text) => self.on_input(user, Input::Text(&text)).await,
            Signal::Command(command) => self.on_input(user, Input::Command(command)).await,
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    /// Decide and apply the phase change under the session lock.
    fn decide(&self, user: UserId, input: Input<'_>) -> Decision {
        self.sessions.with(user, |session| {
            let decision = dispatch::decide(session, input, &self.config);
            if let Some(phase) = decision.next_phase() {
                session.set_phase(phase);
            }
            decision
        })
    }

    async fn on_input(&self, user: UserId, input: Input<'_>) {
        let decision = self.decide(user, input);

        match decision {
            Decision::Reply(text) => {
                self.say(user, &text).await;
            }
            Decision::Reject(e) | Decision::Abandon(e) => {
                info!(user = %user, error = %e, "Request rejected");
                self.say(user, &e.user_message()).await;
            }
            Decision::Cancel { had_pending } => {
                let text = if had_pending {
                    messages::CANCELLED
                } else {
                    messages::NOTHING_TO_CANCEL
                };
                self.say(user, text).await;
            }
            Decision::Ask { prompt, .. } => {
                if prompt.buttons.is_empty() {
                    self.say(user, &prompt.text).await;
                } else {
                    self.buttons(user, &prompt.text, &prompt.buttons).await;
                }
            }
            Decision::CountPages(file) => self.start_split(user, file).await,
            Decision::Run { job, inputs } => self.run(user, job, inputs).await,
            Decision::Accept(kind) => {
                warn!(user = %user, ?kind, "Upload decision outside an upload; ignored");
            }
        }
    }

    // ── Uploads ──────────────────────────────────────────────────────────

    async fn on_upload(&self, user: UserId, upload: Upload) {
        let input = Input::Upload {
            name: &upload.name,
            declared_size: upload.declared_size,
        };
        let kind = match self.decide(user, input) {
            Decision::Accept(kind) => kind,
            Decision::Reject(e) => {
                info!(user = %user, name = %upload.name, error = %e, "Upload rejected");
                self.say(user, &e.user_message()).await;
                return;
            }
            other => {
                warn!(user = %user, ?other, "Unexpected decision for an upload");
                return;
            }
        };

        let status = self
            .say(user, &messages::downloading(&upload.name, upload.declared_size))
            .await;

        let record = match self.fetch(&upload, kind).await {
            Ok(record) => record,
            Err(e) => {
                info!(user = %user, name = %upload.name, error = %e, "Upload failed");
                self.report(user, status, &e.user_message()).await;
                return;
            }
        };

        // Processing may have started while the download ran.
        let appended = self.sessions.with(user, |session| {
            if session.is_processing() {
                return Err(record);
            }
            session.append_file(record);
            session.clear_waiting();
            Ok(session.files().len())
        });
        match appended {
            Ok(batch) => {
                info!(user = %user, name = %upload.name, ?kind, batch, "Upload stored");
                self.report(user, status, messages::DOWNLOADED).await;
                self.buttons(user, messages::MENU_PROMPT, &messages::menu_for(kind))
                    .await;
            }
            Err(record) => {
                self.scratch.release_one(&record.path);
                self.report(user, status, &BotError::Busy.user_message()).await;
            }
        }
    }

    /// Fetch an accepted upload into a fresh scratch path. The path is
    /// released on any failure.
    async fn fetch(&self, upload: &Upload, kind: FileKind) -> Result<FileRecord, BotError> {
        let path = self.scratch.allocate(kind.extension());
        let secs = self.config.download_timeout_secs;
        let fetched = tokio::time::timeout(
            Duration::from_secs(secs),
            upload.source.fetch_to(&path, self.config.max_upload_bytes()),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout { secs }));

        if let Err(e) = fetched {
            self.scratch.release_one(&path);
            return Err(BotError::Download(e));
        }

        if kind == FileKind::Pdf && !has_pdf_magic(&path).await.unwrap_or(false) {
            self.scratch.release_one(&path);
            return Err(BotError::NotAPdf {
                name: upload.name.clone(),
            });
        }

        Ok(FileRecord {
            path,
            original_name: upload.name.clone(),
            kind,
        })
    }

    // ── Split preparation ────────────────────────────────────────────────

    async fn start_split(&self, user: UserId, file: FileRecord) {
        let counted = self.guarded(self.engines.pages.page_count(&file.path)).await;
        match counted {
            Ok(total_pages) if total_pages > 0 => {
                self.sessions.with(user, |session| {
                    session.set_phase(Phase::AwaitingInput(WaitingFor::SplitPages { total_pages }))
                });
                self.say(user, &messages::split_prompt(total_pages)).await;
            }
            other => {
                let source = match other {
                    Err(e) => e,
                    Ok(_) => EngineError::Failed {
                        tool: "qpdf".into(),
                        message: "the document has no pages".into(),
                    },
                };
                let e = BotError::Engine {
                    operation: "Split",
                    source,
                };
                warn!(user = %user, error = %e, "Page count failed");
                self.finish(user, Outcome::Finished);
                self.say(user, &e.user_message()).await;
            }
        }
    }

    // ── Jobs ─────────────────────────────────────────────────────────────

    async fn run(&self, user: UserId, job: Job, inputs: Vec<FileRecord>) {
        let operation = job.operation();
        info!(user = %user, operation, inputs = inputs.len(), "Running job");
        let status = self.say(user, job.progress()).await;

        let mut outputs = self.scratch.artifacts();
        let result = self.execute(&job, &inputs, &mut outputs).await;

        let (outcome, failure) = match result {
            Ok(delivery) => {
                self.deliver(user, status, delivery).await;
                info!(user = %user, operation, "Job complete");
                (Outcome::Finished, None)
            }
            Err(BotError::WrongPassword) => (
                Outcome::Retry(WaitingFor::DecryptPassword),
                Some(BotError::WrongPassword),
            ),
            Err(e) => {
                warn!(user = %user, operation, error = %e, "Job failed");
                (Outcome::Finished, Some(e))
            }
        };

        outputs.release();
        self.finish(user, outcome);

        if let Some(e) = failure {
            self.report(user, status, &e.user_message()).await;
        }
    }

    /// Leave processing. `Finished` clears and releases the whole batch.
    fn finish(&self, user: UserId, outcome: Outcome) {
        let released = self.sessions.with(user, |session| match outcome {
            Outcome::Finished => {
                session.set_phase(Phase::Ready);
                session.clear_files()
            }
            Outcome::Retry(waiting) => {
                session.set_phase(Phase::AwaitingInput(waiting));
                Vec::new()
            }
        });
        self.scratch.release(released.iter().map(|f| &f.path));
    }

    /// Run the engine work for `job`, allocating outputs from `outputs`.
    async fn execute(&self, job: &Job, inputs: &[FileRecord], outputs: &mut Artifacts<'_>) -> Result<Delivery, BotError> {
        let engine = |source: EngineError| match source {
            EngineError::WrongPassword => BotError::WrongPassword,
            source => BotError::Engine {
                operation: job.operation(),
                source,
            },
        };
        let first = inputs
            .first()
            .ok_or_else(|| BotError::Internal("job scheduled without input files".into()))?;
        let name = first.original_name.as_str();
        let engines = &self.engines;

        let delivery = match job {
            Job::Compress { level } => {
                let out = outputs.allocate("pdf");
                let preset = self.config.compression.preset(*level);
                self.guarded(engines.compressor.compress(&first.path, &out, preset))
                    .await
                    .map_err(engine)?;
                let report = messages::compression_report(file_size(&first.path).await, file_size(&out).await);
                Delivery::document(
                    report,
                    out,
                    prefixed("compressed", name),
                    Some("✅ Compression complete".into()),
                )
            }
            Job::Encrypt { password } => {
                let out = outputs.allocate("pdf");
                self.guarded(engines.crypter.encrypt(&first.path, &out, password, PermissionPolicy::RESTRICTED))
                    .await
                    .map_err(engine)?;
                Delivery::document(
                    "✅ PDF encrypted successfully!\n\n🔒 Your PDF is now password-protected with AES-256 encryption.",
                    out,
                    prefixed("encrypted", name),
                    None,
                )
            }
            Job::Decrypt { password } => {
                let out = outputs.allocate("pdf");
                self.guarded(engines.crypter.decrypt(&first.path, &out, password))
                    .await
                    .map_err(engine)?;
                Delivery::document(
                    "✅ PDF decrypted successfully!",
                    out,
                    prefixed("decrypted", name),
                    None,
                )
            }
            Job::Split { pages } => {
                let out = outputs.allocate("pdf");
                self.guarded(engines.pages.split(&first.path, &out, pages))
                    .await
                    .map_err(engine)?;
                Delivery::document(
                    format!("✅ PDF split successfully!\n\nExtracted {} pages.", pages.len()),
                    out,
                    prefixed("split", name),
                    None,
                )
            }
            Job::Merge => {
                let out = outputs.allocate("pdf");
                let paths: Vec<PathBuf> = inputs.iter().map(|f| f.path.clone()).collect();
                self.guarded(engines.pages.merge(&paths, &out))
                    .await
                    .map_err(engine)?;
                Delivery::document(
                    format!("✅ Successfully merged {} PDFs!", inputs.len()),
                    out,
                    "merged_document.pdf".into(),
                    None,
                )
            }
            Job::Rename { file_name } => Delivery::document(
                format!("✅ File renamed to: {file_name}"),
                first.path.clone(),
                file_name.clone(),
                Some(format!("✅ Renamed to: {file_name}")),
            ),
            Job::PdfToWord => {
                let out = outputs.allocate("docx");
                self.guarded(engines.office.pdf_to_docx(&first.path, &out))
                    .await
                    .map_err(engine)?;
                Delivery::document("✅ Conversion complete!", out, with_extension(name, "docx"), None)
            }
            Job::WordToPdf => {
                let out = outputs.allocate("pdf");
                self.guarded(engines.office.docx_to_pdf(&first.path, &out))
                    .await
                    .map_err(engine)?;
                Delivery::document("✅ Conversion complete!", out, with_extension(name, "pdf"), None)
            }
            Job::ExtractText => {
                let out = outputs.allocate("txt");
                self.guarded(engines.text.extract_text(&first.path, &out))
                    .await
                    .map_err(engine)?;
                Delivery::document(
                    "✅ Text extracted successfully!",
                    out,
                    with_extension(name, "txt"),
                    None,
                )
            }
            Job::PdfToImages => {
                let total = self
                    .guarded(engines.pages.page_count(&first.path))
                    .await
                    .map_err(engine)?;
                let pages: Vec<PathBuf> = (0..total).map(|_| outputs.allocate("jpg")).collect();
                let written = self
                    .guarded(engines.images.pdf_to_images(&first.path, &pages))
                    .await
                    .map_err(engine)?;
                let items = pages
                    .into_iter()
                    .take(written)
                    .enumerate()
                    .map(|(i, path)| Item::Photo {
                        path,
                        caption: format!("Page {}/{}", i + 1, written),
                    })
                    .collect();
                Delivery {
                    status: format!("✅ Converted {written} pages!"),
                    items,
                }
            }
            Job::ImagesToPdf => {
                let out = outputs.allocate("pdf");
                let paths: Vec<PathBuf> = inputs.iter().map(|f| f.path.clone()).collect();
                self.guarded(engines.images.images_to_pdf(&paths, &out))
                    .await
                    .map_err(engine)?;
                Delivery::document(
                    format!("✅ Created PDF from {} images!", inputs.len()),
                    out,
                    "images_to_pdf.pdf".into(),
                    None,
                )
            }
        };
        Ok(delivery)
    }

    /// Bound an engine call by the configured timeout. Dropping the call's
    /// future kills any child process it spawned.
    async fn guarded<T>(&self, call: impl Future<Output = Result<T, EngineError>>) -> Result<T, EngineError> {
        let secs = self.config.engine_timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), call)
            .await
            .unwrap_or(Err(EngineError::Timeout { secs }))
    }

    // ── Outbound ─────────────────────────────────────────────────────────

    async fn deliver(&self, user: UserId, status: Option<MessageId>, delivery: Delivery) {
        self.report(user, status, &delivery.status).await;
        for item in &delivery.items {
            let sent = match item {
                Item::Document {
                    path,
                    file_name,
                    caption,
                } => {
                    self.messenger
                        .send_document(user, path, file_name, caption.as_deref())
                        .await
                }
                Item::Photo { path, caption } => self.messenger.send_photo(user, path, Some(caption)).await,
            };
            if let Err(e) = sent {
                warn!(user = %user, error = %e, "Delivery failed; remaining items dropped");
                return;
            }
        }
    }

    /// Send text, logging instead of failing.
    async fn say(&self, user: UserId, text: &str) -> Option<MessageId> {
        match self.messenger.send_text(user, text).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(user = %user, error = %e, "Failed to send message");
                None
            }
        }
    }

    async fn buttons(&self, user: UserId, text: &str, rows: &[Vec<dispatch::Action>]) {
        if let Err(e) = self.messenger.show_buttons(user, text, rows).await {
            warn!(user = %user, error = %e, "Failed to show buttons");
        }
    }

    /// Replace the status message if there is one, otherwise send anew.
    async fn report(&self, user: UserId, status: Option<MessageId>, text: &str) {
        if let Some(id) = status {
            match self.messenger.edit_text(user, id, text).await {
                Ok(()) => return,
                Err(e) => debug!(user = %user, error = %e, "Status edit failed; sending instead"),
            }
        }
        self.say(user, text).await;
    }
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("config", &self.config)
            .field("scratch", &self.scratch)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
