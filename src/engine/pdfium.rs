//! In-process engines on top of pdfium: rasterising, text extraction and
//! building PDFs from images.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to call from async contexts. Every call moves onto the blocking pool so the
//! Tokio workers keep serving other users while a large document renders.
//! Each call binds the library afresh inside its blocking task, and hands
//! [`offload`] the paths it writes so an abandoned call cleans up after itself.

use super::blocking::offload;
use super::{ImageConverter, TextExtractor};
use crate::error::EngineError;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Longest rendered edge in pixels, whatever the DPI. An A0 poster at
/// 200 DPI would otherwise be a 6,600 × 9,300 px bitmap per page.
const MAX_RENDERED_EDGE: i32 = 5000;

/// Points per image pixel when placing images on a page (72 DPI).
const POINTS_PER_PIXEL: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    library: Option<PathBuf>,
    dpi: u32,
    jpeg_quality: u8,
}

impl PdfiumEngine {
    /// `library` is an explicit pdfium shared library; `None` binds to the
    /// one installed on the system.
    pub fn new(library: Option<PathBuf>, dpi: u32, jpeg_quality: u8) -> Self {
        Self {
            library,
            dpi,
            jpeg_quality,
        }
    }
}

fn bind(library: Option<&Path>) -> Result<Pdfium, EngineError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| EngineError::Failed {
        tool: "pdfium".into(),
        message: format!("failed to load pdfium library: {e}"),
    })?;
    Ok(Pdfium::new(bindings))
}

fn pdfium_err(what: &'static str) -> impl Fn(PdfiumError) -> EngineError {
    move |e| EngineError::Failed {
        tool: "pdfium".into(),
        message: format!("{what}: {e:?}"),
    }
}

fn image_err(e: image::ImageError) -> EngineError {
    EngineError::Internal(format!("image error: {e}"))
}

// ── Blocking implementations ─────────────────────────────────────────────

fn render_to_jpegs(
    library: Option<&Path>,
    input: &Path,
    outputs: &[PathBuf],
    dpi: u32,
    quality: u8,
) -> Result<usize, EngineError> {
    let pdfium = bind(library)?;
    let document = pdfium
        .load_pdf_from_file(input, None)
        .map_err(pdfium_err("cannot open PDF"))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(MAX_RENDERED_EDGE)
        .set_maximum_height(MAX_RENDERED_EDGE);

    let mut written = 0;
    for (page, output) in document.pages().iter().zip(outputs) {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(pdfium_err("rasterisation failed"))?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", written + 1, image.width(), image.height());

        let mut writer = BufWriter::new(std::fs::File::create(output)?);
        let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
        DynamicImage::ImageRgb8(image.to_rgb8())
            .write_with_encoder(encoder)
            .map_err(image_err)?;
        writer.flush()?;
        written += 1;
    }

    info!("Rendered {} pages of {}", written, input.display());
    Ok(written)
}

fn extract_text_blocking(library: Option<&Path>, input: &Path, output: &Path) -> Result<(), EngineError> {
    let pdfium = bind(library)?;
    let document = pdfium
        .load_pdf_from_file(input, None)
        .map_err(pdfium_err("cannot open PDF"))?;

    let mut sections = Vec::new();
    for (i, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(pdfium_err("text extraction failed"))?.all();
        if !text.trim().is_empty() {
            sections.push(format!("--- Page {} ---\n{}\n", i + 1, text));
        }
    }

    let full_text = sections.join("\n");
    if full_text.trim().is_empty() {
        return Err(EngineError::NoText);
    }
    std::fs::write(output, full_text)?;
    Ok(())
}

fn images_to_pdf_blocking(library: Option<&Path>, inputs: &[PathBuf], output: &Path) -> Result<(), EngineError> {
    let pdfium = bind(library)?;
    let mut document = pdfium
        .create_new_pdf()
        .map_err(pdfium_err("cannot create PDF"))?;

    for input in inputs {
        // Flatten alpha; PDF pages have no transparent background.
        let image = DynamicImage::ImageRgb8(image::open(input).map_err(image_err)?.to_rgb8());
        let width = PdfPoints::new(image.width() as f32 * POINTS_PER_PIXEL);
        let height = PdfPoints::new(image.height() as f32 * POINTS_PER_PIXEL);

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(pdfium_err("cannot add page"))?;
        page.objects_mut()
            .create_image_object(PdfPoints::ZERO, PdfPoints::ZERO, &image, Some(width), Some(height))
            .map_err(pdfium_err("cannot place image"))?;
    }

    document
        .save_to_file(output)
        .map_err(pdfium_err("cannot save PDF"))?;
    info!("Built PDF from {} images", inputs.len());
    Ok(())
}

// ── Trait impls ──────────────────────────────────────────────────────────

#[async_trait]
impl ImageConverter for PdfiumEngine {
    async fn pdf_to_images(&self, input: &Path, outputs: &[PathBuf]) -> Result<usize, EngineError> {
        let library = self.library.clone();
        let input = input.to_path_buf();
        let outputs = outputs.to_vec();
        let (dpi, quality) = (self.dpi, self.jpeg_quality);
        offload(outputs.clone(), move || {
            render_to_jpegs(library.as_deref(), &input, &outputs, dpi, quality)
        })
        .await
    }

    async fn images_to_pdf(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        let library = self.library.clone();
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();
        offload(vec![output.clone()], move || {
            images_to_pdf_blocking(library.as_deref(), &inputs, &output)
        })
        .await
    }
}

#[async_trait]
impl TextExtractor for PdfiumEngine {
    async fn extract_text(&self, input: &Path, output: &Path) -> Result<(), EngineError> {
        let library = self.library.clone();
        let input = input.to_path_buf();
        let output = output.to_path_buf();
        offload(vec![output.clone()], move || {
            extract_text_blocking(library.as_deref(), &input, &output)
        })
        .await
    }
}
