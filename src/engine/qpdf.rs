//! qpdf: encryption, decryption, page counting, split and merge.
//!
//! qpdf exits 0 on success, 2 on error and 3 when it succeeded with
//! warnings. Exit 3 is success here.
//!
//! Passwords never appear on the command line. They are written to an
//! [`ArgFile`] next to the output and passed as `@file`, which qpdf expands
//! in place.

use super::process::{os, require_output, require_success, run_tool, ArgFile, ToolOutput};
use super::{Crypter, PageEngine, PermissionPolicy};
use crate::error::EngineError;
use crate::pages::to_range_spec;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

const OK_CODES: &[i32] = &[0, 3];

#[derive(Debug, Clone)]
pub struct Qpdf {
    program: String,
}

impl Qpdf {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[OsString]) -> Result<ToolOutput, EngineError> {
        let out = run_tool(&self.program, args).await?;
        require_success(&self.program, &out, OK_CODES)?;
        Ok(out)
    }
}

/// Argument file for one call, named after the output it belongs to.
fn password_file(output: &Path, lines: &[&str]) -> Result<ArgFile, EngineError> {
    let mut name = output.as_os_str().to_os_string();
    name.push(".args");
    ArgFile::create(PathBuf::from(name), lines)
}

/// `secrets` is the `@file` holding the user and owner password lines.
pub(crate) fn encrypt_args(input: &Path, output: &Path, secrets: OsString, policy: PermissionPolicy) -> Vec<OsString> {
    let allow = |yes: bool, on: &str, off: &str| os(if yes { on } else { off });
    vec![
        os("--encrypt"),
        secrets,
        os("256"),
        allow(policy.print, "--print=full", "--print=none"),
        allow(policy.modify, "--modify=all", "--modify=none"),
        allow(policy.extract, "--extract=y", "--extract=n"),
        os("--"),
        os(input),
        os(output),
    ]
}

/// `secrets` is the `@file` holding the `--password=` line.
pub(crate) fn decrypt_args(input: &Path, output: &Path, secrets: OsString) -> Vec<OsString> {
    vec![
        secrets,
        os("--decrypt"),
        os(input),
        os(output),
    ]
}

pub(crate) fn split_args(input: &Path, output: &Path, pages: &[usize]) -> Vec<OsString> {
    vec![
        os("--empty"),
        os("--pages"),
        os(input),
        os(to_range_spec(pages)),
        os("--"),
        os(output),
    ]
}

pub(crate) fn merge_args(inputs: &[PathBuf], output: &Path) -> Vec<OsString> {
    let mut args = vec![os("--empty"), os("--pages")];
    args.extend(inputs.iter().map(os));
    args.push(os("--"));
    args.push(os(output));
    args
}

fn is_password_rejection(out: &ToolOutput) -> bool {
    out.stderr.to_ascii_lowercase().contains("invalid password")
}

#[async_trait]
impl Crypter for Qpdf {
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        password: &str,
        policy: PermissionPolicy,
    ) -> Result<(), EngineError> {
        info!("Encrypting {}", input.display());
        let secrets = password_file(output, &[password, password])?;
        self.run(&encrypt_args(input, output, secrets.arg(), policy)).await?;
        drop(secrets);
        require_output(output).await
    }

    async fn decrypt(&self, input: &Path, output: &Path, password: &str) -> Result<(), EngineError> {
        info!("Decrypting {}", input.display());
        let secrets = password_file(output, &[&format!("--password={password}")])?;
        let out = run_tool(&self.program, &decrypt_args(input, output, secrets.arg())).await?;
        drop(secrets);
        if is_password_rejection(&out) {
            return Err(EngineError::WrongPassword);
        }
        require_success(&self.program, &out, OK_CODES)?;
        require_output(output).await
    }
}

#[async_trait]
impl PageEngine for Qpdf {
    async fn page_count(&self, input: &Path) -> Result<usize, EngineError> {
        let out = self.run(&[os("--show-npages"), os(input)]).await?;
        out.stdout.trim().parse().map_err(|_| EngineError::Failed {
            tool: self.program.clone(),
            message: format!("unexpected page count output '{}'", out.stdout.trim()),
        })
    }

    async fn split(&self, input: &Path, output: &Path, pages: &[usize]) -> Result<(), EngineError> {
        info!("Extracting {} pages from {}", pages.len(), input.display());
        self.run(&split_args(input, output, pages)).await?;
        require_output(output).await
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        info!("Merging {} PDFs", inputs.len());
        self.run(&merge_args(inputs, output)).await?;
        require_output(output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn strs(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn encrypt_denies_everything_when_restricted() {
        let args = strs(&encrypt_args(
            Path::new("in.pdf"),
            Path::new("out.pdf"),
            os("@out.pdf.args"),
            PermissionPolicy::RESTRICTED,
        ));
        assert_eq!(
            args,
            [
                "--encrypt",
                "@out.pdf.args",
                "256",
                "--print=none",
                "--modify=none",
                "--extract=n",
                "--",
                "in.pdf",
                "out.pdf"
            ]
        );
    }

    #[test]
    fn split_uses_compact_range() {
        let args = strs(&split_args(Path::new("a.pdf"), Path::new("b.pdf"), &[2, 3, 4, 7]));
        assert_eq!(args, ["--empty", "--pages", "a.pdf", "2-4,7", "--", "b.pdf"]);
    }

    #[test]
    fn merge_keeps_input_order() {
        let inputs = vec![PathBuf::from("2.pdf"), PathBuf::from("1.pdf")];
        let args = strs(&merge_args(&inputs, Path::new("m.pdf")));
        assert_eq!(args, ["--empty", "--pages", "2.pdf", "1.pdf", "--", "m.pdf"]);
    }

    #[test]
    fn decrypt_reads_password_from_file() {
        let args = strs(&decrypt_args(Path::new("e.pdf"), Path::new("d.pdf"), os("@d.pdf.args")));
        assert_eq!(args, ["@d.pdf.args", "--decrypt", "e.pdf", "d.pdf"]);
    }

    /// Log lines written while the test runs.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn passwords_stay_out_of_logs_and_argv() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();

        // `true` accepts any arguments and writes nothing.
        let qpdf = Qpdf::new("true");
        let encrypted = qpdf
            .encrypt(&input, &tmp.path().join("enc.pdf"), "S3cretPW", PermissionPolicy::RESTRICTED)
            .await;
        let decrypted = qpdf.decrypt(&input, &tmp.path().join("dec.pdf"), "OtherPW").await;
        assert!(matches!(encrypted, Err(EngineError::MissingOutput { .. })));
        assert!(matches!(decrypted, Err(EngineError::MissingOutput { .. })));

        let log = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("Running tool"), "{log}");
        assert!(!log.contains("S3cretPW"), "{log}");
        assert!(!log.contains("OtherPW"), "{log}");

        let left: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(left, [std::ffi::OsString::from("in.pdf")]);
    }

    #[test]
    fn password_rejection_is_detected_from_stderr() {
        let out = ToolOutput {
            code: Some(2),
            stdout: String::new(),
            stderr: "qpdf: e.pdf: invalid password\n".into(),
        };
        assert!(is_password_rejection(&out));
    }
}
