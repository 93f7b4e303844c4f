//! Console binary for edgequake-pdfbot.
//!
//! Runs one user's conversation on the terminal: each stdin line is a
//! signal, each bot reply is printed, and delivered files are copied into
//! `--out-dir`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use edgequake_pdfbot::{
    Action, Bot, BotConfig, Command, Engines, MessageId, Messenger, Signal, TransportError, Upload,
    UserId,
};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"CONSOLE COMMANDS:
  /upload <path|url>   Send a file (pdf, docx, jpg, jpeg, png)
  /press <action>      Press a menu button, e.g. /press compress_high
  /start, /help        Bot introduction and usage guide
  /cancel              Abandon a pending question
  /quit                Leave (scratch files of the session are deleted)
  anything else        Sent as a text answer (password, pages, file name)

EXAMPLE SESSION:
  > /upload report.pdf
  > /press split
  > 2-4, 7
  delivered → pdfbot-out/split_report.pdf

EXTERNAL TOOLS:
  gs        Ghostscript, for compression
  qpdf      encryption, decryption, split, merge
  soffice   LibreOffice, for PDF <-> Word
  pdfium    shared library, for images and text (PDFIUM_LIB_PATH)
"#;

/// Conversational PDF toolbox on the console.
#[derive(Parser, Debug)]
#[command(
    name = "pdfbot",
    version,
    about = "Conversational PDF toolbox on the console",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory that receives delivered documents and photos.
    #[arg(short, long, env = "PDFBOT_OUT_DIR", default_value = "pdfbot-out")]
    out_dir: PathBuf,

    /// Scratch directory for uploads and intermediate files.
    #[arg(long, env = "PDFBOT_SCRATCH_DIR", default_value = "temp")]
    scratch_dir: PathBuf,

    /// Largest accepted upload in MB.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = 50)]
    max_file_size: u64,

    /// Upper bound on one engine call in seconds.
    #[arg(long, env = "PDFBOT_ENGINE_TIMEOUT", default_value_t = 300)]
    engine_timeout: u64,

    /// Upper bound on fetching one upload in seconds.
    #[arg(long, env = "PDFBOT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Rendering DPI for PDF → images (72–400).
    #[arg(long, env = "PDFBOT_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// JPEG quality for PDF → images (1–100).
    #[arg(long, env = "PDFBOT_JPEG_QUALITY", default_value_t = 95,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Ghostscript executable.
    #[arg(long, env = "PDFBOT_GS", default_value = "gs")]
    gs: String,

    /// qpdf executable.
    #[arg(long, env = "PDFBOT_QPDF", default_value = "qpdf")]
    qpdf: String,

    /// LibreOffice executable.
    #[arg(long, env = "PDFBOT_SOFFICE", default_value = "soffice")]
    soffice: String,

    /// Path to an existing libpdfium; the system library is used otherwise.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// User id the console session runs as.
    #[arg(long, default_value_t = 1)]
    user: i64,

    /// Print every outbound message as a JSON line instead of text.
    #[arg(long, env = "PDFBOT_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFBOT_VERBOSE")]
    verbose: bool,

    /// Suppress all logs except errors.
    #[arg(short, long, env = "PDFBOT_QUIET")]
    quiet: bool,
}

// ── Console messenger ────────────────────────────────────────────────────────

/// One outbound request, as printed with `--json`.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Outbound<'a> {
    Text {
        id: u64,
        text: &'a str,
    },
    Edit {
        id: u64,
        text: &'a str,
    },
    Document {
        file_name: &'a str,
        saved_to: &'a Path,
        caption: Option<&'a str>,
    },
    Photo {
        saved_to: &'a Path,
        caption: Option<&'a str>,
    },
    Buttons {
        id: u64,
        text: &'a str,
        buttons: Vec<Vec<&'static str>>,
    },
}

struct ConsoleMessenger {
    out_dir: PathBuf,
    json: bool,
    next_id: AtomicU64,
}

impl ConsoleMessenger {
    fn new(out_dir: PathBuf, json: bool) -> Self {
        Self {
            out_dir,
            json,
            next_id: AtomicU64::new(1),
        }
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn emit(&self, event: &Outbound<'_>, plain: impl FnOnce() -> String) -> Result<(), TransportError> {
        if self.json {
            let line = serde_json::to_string(event).map_err(|e| TransportError::Delivery(e.to_string()))?;
            println!("{line}");
        } else {
            println!("{}", plain());
        }
        Ok(())
    }

    /// Copy a delivered file into the output directory.
    async fn save(&self, path: &Path, file_name: &str) -> Result<PathBuf, TransportError> {
        tokio::fs::create_dir_all(&self.out_dir).await?;
        // Delivered names come from user input; keep them inside out_dir.
        let name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "delivery".into());
        let dest = self.out_dir.join(name);
        tokio::fs::copy(path, &dest).await?;
        Ok(dest)
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn send_text(&self, _user: UserId, text: &str) -> Result<MessageId, TransportError> {
        let id = self.id();
        self.emit(&Outbound::Text { id, text }, || format!("{} {text}", cyan("bot>")))?;
        Ok(MessageId(id))
    }

    async fn edit_text(&self, _user: UserId, message: MessageId, text: &str) -> Result<(), TransportError> {
        self.emit(&Outbound::Edit { id: message.0, text }, || {
            format!("{} {text}", dim(&format!("bot (#{} updated)>", message.0)))
        })
    }

    async fn send_document(
        &self,
        _user: UserId,
        path: &Path,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let saved = self.save(path, file_name).await?;
        self.emit(
            &Outbound::Document {
                file_name,
                saved_to: &saved,
                caption,
            },
            || {
                let caption = caption.map(|c| format!("  {}", dim(c))).unwrap_or_default();
                format!("{} {}{caption}", green("delivered →"), bold(&saved.display().to_string()))
            },
        )
    }

    async fn send_photo(&self, _user: UserId, path: &Path, caption: Option<&str>) -> Result<(), TransportError> {
        let name = format!("photo_{}.jpg", self.id());
        let saved = self.save(path, &name).await?;
        self.emit(
            &Outbound::Photo {
                saved_to: &saved,
                caption,
            },
            || {
                let caption = caption.map(|c| format!("  {}", dim(c))).unwrap_or_default();
                format!("{} {}{caption}", green("photo →"), bold(&saved.display().to_string()))
            },
        )
    }

    async fn show_buttons(
        &self,
        _user: UserId,
        text: &str,
        buttons: &[Vec<Action>],
    ) -> Result<MessageId, TransportError> {
        let id = self.id();
        let tags: Vec<Vec<&'static str>> = buttons
            .iter()
            .map(|row| row.iter().map(|a| a.tag()).collect())
            .collect();
        self.emit(
            &Outbound::Buttons {
                id,
                text,
                buttons: tags,
            },
            || {
                let rows: Vec<String> = buttons
                    .iter()
                    .map(|row| {
                        let cells: Vec<String> = row
                            .iter()
                            .map(|a| {
                                format!(
                                    "[{}] {}",
                                    a.tag(),
                                    edgequake_pdfbot::messages::button_label(*a)
                                )
                            })
                            .collect();
                        format!("    {}", cells.join("   "))
                    })
                    .collect();
                format!("{} {text}\n{}", cyan("bot>"), rows.join("\n"))
            },
        )?;
        Ok(MessageId(id))
    }
}

// ── Input parsing ────────────────────────────────────────────────────────────

enum Line<'a> {
    Quit,
    Upload(&'a str),
    Press(&'a str),
    Command(Command),
    Text(&'a str),
}

fn parse_line(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed == "/quit" {
        return Line::Quit;
    }
    if let Some(location) = trimmed.strip_prefix("/upload ") {
        return Line::Upload(location.trim());
    }
    if let Some(tag) = trimmed.strip_prefix("/press ") {
        return Line::Press(tag.trim());
    }
    if trimmed.starts_with('/') {
        if let Ok(command) = trimmed.parse::<Command>() {
            return Line::Command(command);
        }
    }
    // Passwords may legitimately carry surrounding spaces.
    Line::Text(line)
}

// ── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Build bot ────────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let engines = Engines::system(&config);
    let messenger = Arc::new(ConsoleMessenger::new(cli.out_dir.clone(), cli.json));
    let bot = Bot::new(config, engines, messenger).context("Failed to start bot")?;
    let user = UserId(cli.user);

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold("pdfbot console. Type /help for operations, /quit to leave.")
        );
    }

    // ── Conversation loop ────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let signal = match parse_line(&line) {
            Line::Quit => break,
            Line::Upload(location) => {
                match Upload::from_location(location, bot.config().download_timeout_secs).await {
                    Ok(upload) => Signal::Upload(upload),
                    Err(e) => {
                        eprintln!("cannot upload '{location}': {e}");
                        continue;
                    }
                }
            }
            Line::Press(tag) => Signal::Button(tag.to_string()),
            Line::Command(command) => Signal::Command(command),
            Line::Text(text) => Signal::Text(text.to_string()),
        };
        bot.handle(user, signal).await;
    }

    // Leave no uploads behind in the scratch directory.
    let leftovers = bot.sessions().clear_files(user);
    bot.scratch().release(leftovers.iter().map(|f| &f.path));
    Ok(())
}

/// Map CLI args to `BotConfig`.
fn build_config(cli: &Cli) -> Result<BotConfig> {
    let mut builder = BotConfig::builder()
        .max_upload_mb(cli.max_file_size)
        .scratch_dir(&cli.scratch_dir)
        .engine_timeout_secs(cli.engine_timeout)
        .download_timeout_secs(cli.download_timeout)
        .render_dpi(cli.dpi)
        .jpeg_quality(cli.jpeg_quality)
        .ghostscript_bin(&cli.gs)
        .qpdf_bin(&cli.qpdf)
        .office_bin(&cli.soffice);
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    builder.build().context("Invalid configuration")
}
