//! Running external tools.
//!
//! Children are spawned with `kill_on_drop`, so dropping the future (the
//! pipeline's timeout does exactly that) kills a hung tool instead of
//! orphaning it.
//!
//! Argument vectors are never logged: they can carry passwords. Secrets go
//! to the tool through an [`ArgFile`] instead of the command line, where any
//! local user could read them.

use crate::error::EngineError;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of one tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Last non-empty stderr line, or stdout's, for error messages.
    pub fn diagnostic(&self) -> String {
        [&self.stderr, &self.stdout]
            .iter()
            .find_map(|s| s.lines().rev().find(|l| !l.trim().is_empty()))
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| match self.code {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Run `program` with `args` to completion.
///
/// A missing executable is [`EngineError::MissingBinary`]; any exit status is
/// returned to the caller to interpret.
pub async fn run_tool(program: &str, args: &[OsString]) -> Result<ToolOutput, EngineError> {
    debug!(program, args = args.len(), "Running tool");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::MissingBinary {
                program: program.to_string(),
            },
            _ => EngineError::Io(e),
        })?;

    Ok(ToolOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Treat exit codes in `ok` as success, anything else as
/// [`EngineError::Failed`].
pub fn require_success(tool: &str, output: &ToolOutput, ok: &[i32]) -> Result<(), EngineError> {
    match output.code {
        Some(code) if ok.contains(&code) => Ok(()),
        _ => Err(EngineError::Failed {
            tool: tool.to_string(),
            message: output.diagnostic(),
        }),
    }
}

/// Fail with [`EngineError::MissingOutput`] unless `path` exists.
pub async fn require_output(path: &Path) -> Result<(), EngineError> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::MissingOutput {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(EngineError::Io(e)),
    }
}

/// `prefix` immediately followed by `path`, as one argument.
pub fn joined(prefix: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path.as_os_str());
    arg
}

pub fn os(s: impl AsRef<OsStr>) -> OsString {
    s.as_ref().to_os_string()
}

// ── Argument files ───────────────────────────────────────────────────────

/// Arguments handed to a tool as `@path`, one per line, in a file only the
/// owner can read. The file is deleted when the value is dropped, including
/// when the tool call is abandoned by a timeout.
#[derive(Debug)]
pub struct ArgFile {
    path: PathBuf,
}

impl ArgFile {
    /// Write `lines` to `path`. A line containing a line break cannot be
    /// represented and is rejected.
    pub fn create(path: PathBuf, lines: &[&str]) -> Result<Self, EngineError> {
        if lines.iter().any(|l| l.contains(['\n', '\r'])) {
            return Err(EngineError::Internal(
                "arguments cannot contain line breaks".into(),
            ));
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        let arg_file = Self { path };
        for line in lines {
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        Ok(arg_file)
    }

    /// The `@path` argument that makes the tool read this file.
    pub fn arg(&self) -> OsString {
        joined("@", &self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArgFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete argument file {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(code: Option<i32>, stdout: &str, stderr: &str) -> ToolOutput {
        ToolOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn diagnostic_prefers_last_stderr_line() {
        let o = out(Some(2), "ignored", "first\nqpdf: real problem\n\n");
        assert_eq!(o.diagnostic(), "qpdf: real problem");
        assert_eq!(out(Some(1), "", "").diagnostic(), "exited with status 1");
        assert_eq!(out(None, "", " ").diagnostic(), "terminated by signal");
    }

    #[test]
    fn success_codes_are_configurable() {
        assert!(require_success("qpdf", &out(Some(3), "", "warn"), &[0, 3]).is_ok());
        let err = require_success("gs", &out(Some(1), "", "boom"), &[0]).unwrap_err();
        assert!(matches!(err, EngineError::Failed { ref message, .. } if message == "boom"));
    }

    #[test]
    fn joined_builds_single_argument() {
        assert_eq!(joined("-sOutputFile=", Path::new("/t/o.pdf")), OsString::from("-sOutputFile=/t/o.pdf"));
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let err = run_tool("definitely-not-a-real-tool-9f2c", &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingBinary { .. }));
    }

    #[test]
    fn arg_file_is_private_and_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("call.args");
        let file = ArgFile::create(path.clone(), &["s3cret", "--flag"]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "s3cret\n--flag\n");
        assert_eq!(file.arg(), joined("@", &path));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0);
        }
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn arg_file_rejects_line_breaks() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("call.args");
        assert!(ArgFile::create(path.clone(), &["two\nlines"]).is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_output_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let err = require_output(&tmp.path().join("absent.pdf")).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingOutput { .. }));
    }
}
