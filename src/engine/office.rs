//! LibreOffice headless conversion between PDF and DOCX.
//!
//! `soffice --convert-to` cannot be told an output file name, only a
//! directory. It writes `<input stem>.<ext>` there, which is then moved onto
//! the path the caller allocated.
//!
//! Every call gets its own work directory next to the output, holding the
//! conversion directory and a private user profile. Without a private profile
//! a second concurrent `soffice` hands its job to the first instance and
//! exits without producing anything.

use super::process::{os, require_output, require_success, run_tool};
use super::OfficeConverter;
use crate::error::EngineError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long an abandoned conversion's worker may keep writing. Killing the
/// `soffice` launcher does not stop `soffice.bin`.
const STRAGGLER_GRACE: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct LibreOffice {
    program: String,
}

impl LibreOffice {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        target: &str,
        infilter: Option<&str>,
    ) -> Result<(), EngineError> {
        let mut work = WorkDir::create(work_dir_for(output))?;
        let out_dir = work.path().join("out");
        let profile = file_url(&work.path().join("profile"))?;
        let produced = produced_path(input, &out_dir, target);
        info!("Converting {} to {}", input.display(), target);

        let out = run_tool(&self.program, &convert_args(input, &out_dir, &profile, target, infilter)).await?;
        work.tool_exited = true;
        require_success(&self.program, &out, &[0])?;
        require_output(&produced).await?;
        tokio::fs::rename(&produced, output).await?;
        Ok(())
    }
}

// ── Work directory ───────────────────────────────────────────────────────

/// `<output>.lo`, unique because the output path is.
fn work_dir_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".lo");
    PathBuf::from(name)
}

/// Per-call directory, removed with everything in it on drop.
#[derive(Debug)]
struct WorkDir {
    path: PathBuf,
    tool_exited: bool,
}

impl WorkDir {
    fn create(path: PathBuf) -> Result<Self, EngineError> {
        std::fs::create_dir_all(path.join("out"))?;
        Ok(Self {
            path,
            tool_exited: false,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn remove_tree(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!("Removed work directory {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove work directory {}: {}", path.display(), e),
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        remove_tree(&self.path);
        if self.tool_exited {
            return;
        }
        // Abandoned mid-conversion: sweep again once a surviving worker is done.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let path = self.path.clone();
            runtime.spawn(async move {
                tokio::time::sleep(STRAGGLER_GRACE).await;
                remove_tree(&path);
            });
        }
    }
}

/// `file://` URL of `path`, as LibreOffice expects for `UserInstallation`.
fn file_url(path: &Path) -> Result<String, EngineError> {
    let absolute = std::path::absolute(path)?;
    let mut url = String::from("file://");
    for byte in absolute.to_string_lossy().bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                url.push(byte as char)
            }
            other => url.push_str(&format!("%{other:02X}")),
        }
    }
    Ok(url)
}

pub(crate) fn convert_args(
    input: &Path,
    out_dir: &Path,
    profile_url: &str,
    target: &str,
    infilter: Option<&str>,
) -> Vec<OsString> {
    let mut args = vec![os(format!("-env:UserInstallation={profile_url}")), os("--headless")];
    if let Some(filter) = infilter {
        args.push(os(format!("--infilter={filter}")));
    }
    args.extend([os("--convert-to"), os(target), os("--outdir"), os(out_dir), os(input)]);
    args
}

/// Where LibreOffice writes the converted file.
pub(crate) fn produced_path(input: &Path, out_dir: &Path, target: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or(input.as_os_str());
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(target);
    out_dir.join(name)
}

#[async_trait]
impl OfficeConverter for LibreOffice {
    async fn pdf_to_docx(&self, input: &Path, output: &Path) -> Result<(), EngineError> {
        self.convert(input, output, "docx", Some("writer_pdf_import")).await
    }

    async fn docx_to_pdf(&self, input: &Path, output: &Path) -> Result<(), EngineError> {
        self.convert(input, output, "pdf", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_and_filter_precede_conversion() {
        let args: Vec<_> = convert_args(
            Path::new("/s/a.pdf"),
            Path::new("/s/a.docx.lo/out"),
            "file:///s/a.docx.lo/profile",
            "docx",
            Some("writer_pdf_import"),
        )
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
        assert_eq!(
            args,
            [
                "-env:UserInstallation=file:///s/a.docx.lo/profile",
                "--headless",
                "--infilter=writer_pdf_import",
                "--convert-to",
                "docx",
                "--outdir",
                "/s/a.docx.lo/out",
                "/s/a.pdf"
            ]
        );
    }

    #[test]
    fn produced_path_swaps_extension() {
        assert_eq!(
            produced_path(Path::new("/s/1234.docx"), Path::new("/s/out"), "pdf"),
            PathBuf::from("/s/out/1234.pdf")
        );
    }

    #[cfg(unix)]
    #[test]
    fn file_url_escapes_unsafe_bytes() {
        assert_eq!(
            file_url(Path::new("/tmp/my scratch/p")).unwrap(),
            "file:///tmp/my%20scratch/p"
        );
    }

    /// Stand-in for `soffice` that writes `<stem>.<target>` into `--outdir`,
    /// or fails when the input name contains "broken".
    #[cfg(unix)]
    fn fake_soffice(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-soffice");
        std::fs::write(
            &script,
            r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) shift; out="$1" ;;
    --convert-to) shift; ext="$1" ;;
    *) last="$1" ;;
  esac
  shift
done
case "$last" in *broken*) echo "source file could not be loaded" >&2; exit 1 ;; esac
name=$(basename "$last")
echo converted > "$out/${name%.*}.$ext"
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn conversion_leaves_only_the_output() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let office = LibreOffice::new(fake_soffice(tools.path()).to_string_lossy());

        let input = scratch.path().join("in.pdf");
        let output = scratch.path().join("out.docx");
        std::fs::write(&input, b"%PDF-1.4").unwrap();
        office.pdf_to_docx(&input, &output).await.unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "converted\n");
        let mut left: Vec<_> = std::fs::read_dir(scratch.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, ["in.pdf", "out.docx"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_conversion_removes_work_directory() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let office = LibreOffice::new(fake_soffice(tools.path()).to_string_lossy());

        let input = scratch.path().join("broken.docx");
        let output = scratch.path().join("out.pdf");
        std::fs::write(&input, b"PK").unwrap();
        let err = office.docx_to_pdf(&input, &output).await.unwrap_err();

        assert!(matches!(err, EngineError::Failed { ref message, .. } if message.contains("could not be loaded")));
        assert!(!work_dir_for(&output).exists());
        assert!(!output.exists());
    }
}
