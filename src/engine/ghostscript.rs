//! Ghostscript `pdfwrite` compression.

use super::process::{joined, os, require_output, require_success, run_tool};
use super::Compressor;
use crate::error::EngineError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Ghostscript {
    program: String,
}

impl Ghostscript {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

pub(crate) fn compress_args(input: &Path, output: &Path, preset: &str) -> Vec<OsString> {
    vec![
        os("-sDEVICE=pdfwrite"),
        os("-dCompatibilityLevel=1.4"),
        os(format!("-dPDFSETTINGS={preset}")),
        os("-dNOPAUSE"),
        os("-dQUIET"),
        os("-dBATCH"),
        joined("-sOutputFile=", output),
        os(input),
    ]
}

#[async_trait]
impl Compressor for Ghostscript {
    async fn compress(&self, input: &Path, output: &Path, preset: &str) -> Result<(), EngineError> {
        info!("Compressing {} with preset {}", input.display(), preset);
        let out = run_tool(&self.program, &compress_args(input, output, preset)).await?;
        require_success(&self.program, &out, &[0])?;
        require_output(output).await
    }
}
