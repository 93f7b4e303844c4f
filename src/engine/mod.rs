//! Document engines behind narrow async traits.
//!
//! Each trait covers one capability the pipeline needs. The system
//! implementations shell out to Ghostscript, qpdf and LibreOffice, or call
//! pdfium in-process; tests substitute fakes. Every method reads its inputs
//! from and writes its outputs to paths the caller allocated, and never
//! deletes anything.
//!
//! ## Backends
//!
//! | Trait | System backend |
//! |---|---|
//! | [`Compressor`] | [`ghostscript::Ghostscript`] |
//! | [`Crypter`], [`PageEngine`] | [`qpdf::Qpdf`] |
//! | [`OfficeConverter`] | [`office::LibreOffice`] |
//! | [`ImageConverter`], [`TextExtractor`] | [`pdfium::PdfiumEngine`] |

pub mod blocking;
pub mod ghostscript;
pub mod office;
pub mod pdfium;
pub mod process;
pub mod qpdf;

use crate::config::BotConfig;
use crate::error::EngineError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lossy PDF compression.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Rewrite `input` to `output` using the engine preset token
    /// (e.g. `/ebook`).
    async fn compress(&self, input: &Path, output: &Path, preset: &str) -> Result<(), EngineError>;
}

/// What an encrypted document still allows its opener to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionPolicy {
    pub print: bool,
    pub modify: bool,
    pub extract: bool,
}

impl PermissionPolicy {
    /// Deny printing, modification and content extraction.
    pub const RESTRICTED: Self = Self {
        print: false,
        modify: false,
        extract: false,
    };
}

/// Password protection.
#[async_trait]
pub trait Crypter: Send + Sync {
    /// AES-256 encrypt with the same user and owner password.
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        password: &str,
        policy: PermissionPolicy,
    ) -> Result<(), EngineError>;

    /// Remove encryption. A rejected password is [`EngineError::WrongPassword`].
    async fn decrypt(&self, input: &Path, output: &Path, password: &str) -> Result<(), EngineError>;
}

/// Page-level document surgery.
#[async_trait]
pub trait PageEngine: Send + Sync {
    async fn page_count(&self, input: &Path) -> Result<usize, EngineError>;

    /// Copy the 1-based `pages` (sorted, unique, in range) into `output`.
    async fn split(&self, input: &Path, output: &Path, pages: &[usize]) -> Result<(), EngineError>;

    /// Concatenate `inputs` in order into `output`.
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EngineError>;
}

/// Office document conversion.
#[async_trait]
pub trait OfficeConverter: Send + Sync {
    async fn pdf_to_docx(&self, input: &Path, output: &Path) -> Result<(), EngineError>;
    async fn docx_to_pdf(&self, input: &Path, output: &Path) -> Result<(), EngineError>;
}

/// Raster conversions in both directions.
#[async_trait]
pub trait ImageConverter: Send + Sync {
    /// Render pages to JPEG, page `i` to `outputs[i]`. Stops at whichever
    /// runs out first and returns the number of pages written.
    async fn pdf_to_images(&self, input: &Path, outputs: &[PathBuf]) -> Result<usize, EngineError>;

    /// One page per image, in order.
    async fn images_to_pdf(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EngineError>;
}

/// Text-layer extraction.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Write the text of every page to `output` under `--- Page i ---`
    /// headers. A document without any text is [`EngineError::NoText`].
    async fn extract_text(&self, input: &Path, output: &Path) -> Result<(), EngineError>;
}

/// The full set of engines a [`crate::Bot`] runs against.
#[derive(Clone)]
pub struct Engines {
    pub compressor: Arc<dyn Compressor>,
    pub crypter: Arc<dyn Crypter>,
    pub pages: Arc<dyn PageEngine>,
    pub office: Arc<dyn OfficeConverter>,
    pub images: Arc<dyn ImageConverter>,
    pub text: Arc<dyn TextExtractor>,
}

impl Engines {
    /// Engines backed by the installed tools named in `config`.
    pub fn system(config: &BotConfig) -> Self {
        let qpdf = Arc::new(qpdf::Qpdf::new(&config.qpdf_bin));
        let pdfium = Arc::new(pdfium::PdfiumEngine::new(
            config.pdfium_lib_path.clone(),
            config.render_dpi,
            config.jpeg_quality,
        ));
        Self {
            compressor: Arc::new(ghostscript::Ghostscript::new(&config.ghostscript_bin)),
            crypter: qpdf.clone(),
            pages: qpdf,
            office: Arc::new(office::LibreOffice::new(&config.office_bin)),
            images: pdfium.clone(),
            text: pdfium,
        }
    }
}

impl std::fmt::Debug for Engines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engines").finish_non_exhaustive()
    }
}
