//! Configuration types for the bot core.
//!
//! Everything the core reads from its host lives in [`BotConfig`]: the upload
//! size limit, the scratch directory, the compression presets, and the engine
//! knobs. It is built via [`BotConfigBuilder`] (or [`BotConfig::from_env`])
//! and is read-only afterwards.

use crate::error::BotError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration for a bot instance.
///
/// # Example
/// ```rust
/// use edgequake_pdfbot::BotConfig;
///
/// let config = BotConfig::builder()
///     .max_upload_mb(20)
///     .scratch_dir("/tmp/pdfbot")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_upload_bytes(), 20 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Largest accepted upload in MiB. Default: 50.
    pub max_upload_mb: u64,

    /// Root of every scratch artifact. Shared by all sessions. Default: `temp`.
    pub scratch_dir: PathBuf,

    /// Compression tier → Ghostscript `PDFSETTINGS` token.
    pub compression: CompressionPresets,

    /// Upper bound on any single engine call in seconds. Default: 300.
    ///
    /// The child process is killed when the bound is hit.
    pub engine_timeout_secs: u64,

    /// Upper bound on fetching one upload in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// DPI used when rasterising PDF pages to images. Range: 72–400. Default: 200.
    pub render_dpi: u32,

    /// JPEG quality for rasterised pages. Range: 1–100. Default: 95.
    pub jpeg_quality: u8,

    /// Ghostscript executable. Default: `gs`.
    pub ghostscript_bin: String,

    /// qpdf executable. Default: `qpdf`.
    pub qpdf_bin: String,

    /// LibreOffice executable. Default: `soffice`.
    pub office_bin: String,

    /// Explicit pdfium shared library. `None` binds to the system library.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_upload_mb: 50,
            scratch_dir: PathBuf::from("temp"),
            compression: CompressionPresets::default(),
            engine_timeout_secs: 300,
            download_timeout_secs: 120,
            render_dpi: 200,
            jpeg_quality: 95,
            ghostscript_bin: "gs".to_string(),
            qpdf_bin: "qpdf".to_string(),
            office_bin: "soffice".to_string(),
            pdfium_lib_path: None,
        }
    }
}

impl BotConfig {
    /// Create a new builder for `BotConfig`.
    pub fn builder() -> BotConfigBuilder {
        BotConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the host-provided knobs from the environment, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `MAX_FILE_SIZE` | `max_upload_mb` |
    /// | `PDFBOT_SCRATCH_DIR` | `scratch_dir` |
    /// | `PDFBOT_ENGINE_TIMEOUT` | `engine_timeout_secs` |
    /// | `PDFIUM_LIB_PATH` | `pdfium_lib_path` |
    pub fn from_env() -> Result<Self, BotError> {
        let default = Self::default();
        let parsed = |key: &str| std::env::var(key).ok().and_then(|v| v.trim().parse().ok());

        let mut builder = Self::builder()
            .max_upload_mb(parsed("MAX_FILE_SIZE").unwrap_or(default.max_upload_mb))
            .engine_timeout_secs(
                parsed("PDFBOT_ENGINE_TIMEOUT").unwrap_or(default.engine_timeout_secs),
            );
        if let Ok(dir) = std::env::var("PDFBOT_SCRATCH_DIR") {
            builder = builder.scratch_dir(dir);
        }
        if let Ok(lib) = std::env::var("PDFIUM_LIB_PATH") {
            builder = builder.pdfium_lib_path(lib);
        }
        builder.build()
    }

    /// The upload limit in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

/// Builder for [`BotConfig`].
#[derive(Debug)]
pub struct BotConfigBuilder {
    config: BotConfig,
}

impl BotConfigBuilder {
    pub fn max_upload_mb(mut self, mb: u64) -> Self {
        self.config.max_upload_mb = mb;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn compression_preset(mut self, level: CompressionLevel, preset: impl Into<String>) -> Self {
        self.config.compression.set(level, preset.into());
        self
    }

    pub fn engine_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 400);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn ghostscript_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.ghostscript_bin = bin.into();
        self
    }

    pub fn qpdf_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.qpdf_bin = bin.into();
        self
    }

    pub fn office_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.office_bin = bin.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BotConfig, BotError> {
        let c = &self.config;
        if c.max_upload_mb == 0 {
            return Err(BotError::InvalidConfig(
                "Maximum upload size must be ≥ 1 MB".into(),
            ));
        }
        if c.scratch_dir.as_os_str().is_empty() {
            return Err(BotError::InvalidConfig("Scratch directory must be set".into()));
        }
        if c.engine_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(BotError::InvalidConfig("Timeouts must be ≥ 1 second".into()));
        }
        for level in CompressionLevel::ALL {
            if c.compression.preset(level).trim().is_empty() {
                return Err(BotError::InvalidConfig(format!(
                    "Compression preset for '{level}' is empty"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Compression ──────────────────────────────────────────────────────────

/// User-selectable compression tier.
///
/// | Tier | Default preset | Result |
/// |------|----------------|--------|
/// | Low | `/prepress` | best quality, least reduction |
/// | Medium | `/ebook` | balanced |
/// | High | `/screen` | smallest file |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    Medium,
    High,
}

impl CompressionLevel {
    pub const ALL: [CompressionLevel; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionLevel {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(CompressionLevel::Low),
            "medium" => Ok(CompressionLevel::Medium),
            "high" => Ok(CompressionLevel::High),
            other => Err(BotError::InvalidConfig(format!(
                "Unknown compression level '{other}'"
            ))),
        }
    }
}

/// Mapping of the three tiers to engine preset tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionPresets {
    pub low: String,
    pub medium: String,
    pub high: String,
}

impl Default for CompressionPresets {
    fn default() -> Self {
        Self {
            low: "/prepress".to_string(),
            medium: "/ebook".to_string(),
            high: "/screen".to_string(),
        }
    }
}

impl CompressionPresets {
    pub fn preset(&self, level: CompressionLevel) -> &str {
        match level {
            CompressionLevel::Low => &self.low,
            CompressionLevel::Medium => &self.medium,
            CompressionLevel::High => &self.high,
        }
    }

    fn set(&mut self, level: CompressionLevel, preset: String) {
        match level {
            CompressionLevel::Low => self.low = preset,
            CompressionLevel::Medium => self.medium = preset,
            CompressionLevel::High => self.high = preset,
        }
    }
}
