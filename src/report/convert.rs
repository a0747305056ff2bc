//! Office-to-PDF conversion through a headless LibreOffice process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("source document {0} does not exist")]
    SourceMissing(PathBuf),
    #[error("failed to start converter: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("converter did not finish within {0:?}")]
    Timeout(Duration),
    #[error("converter exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },
    #[error("converter produced no output at {0}")]
    MissingOutput(PathBuf),
}

/// Converts one office document into a PDF inside `out_dir`.
#[async_trait]
pub trait DocumentConverter {
    /// Returns the path of the produced PDF, named after the source's stem.
    async fn convert(&self, source: &Path, out_dir: &Path) -> Result<PathBuf, ConvertError>;
}

/// Expected output of converting `source` into `out_dir`.
pub fn pdf_output_path(source: &Path, out_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    out_dir.join(format!("{}.pdf", stem))
}

pub struct LibreOfficeConverter {
    binary: String,
    timeout: Duration,
}

impl LibreOfficeConverter {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DocumentConverter for LibreOfficeConverter {
    async fn convert(&self, source: &Path, out_dir: &Path) -> Result<PathBuf, ConvertError> {
        if !source.is_file() {
            return Err(ConvertError::SourceMissing(source.to_path_buf()));
        }

        let output = pdf_output_path(source, out_dir);
        // A stale file from an earlier run must not count as success.
        if output.exists() {
            let _ = tokio::fs::remove_file(&output).await;
        }

        // LibreOffice will not start while another instance holds the same profile.
        let profile = tempdir().map_err(ConvertError::Spawn)?;

        let child = Command::new(&self.binary)
            .arg(format!("-env:UserInstallation=file://{}", profile.path().display()))
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ConvertError::Spawn)?;

        let result = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(ConvertError::Spawn)?,
            Err(_) => {
                log::error!(
                    "Conversion of {} timed out after {:?}",
                    source.display(),
                    self.timeout
                );
                return Err(ConvertError::Timeout(self.timeout));
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            log::error!(
                "Conversion of {} failed ({}): {}",
                source.display(),
                result.status,
                stderr
            );
            return Err(ConvertError::ExitStatus {
                code: result.status.code(),
                stderr,
            });
        }

        if !output.is_file() {
            log::error!(
                "Converter exited cleanly but {} was not produced",
                output.display()
            );
            return Err(ConvertError::MissingOutput(output));
        }

        log::info!("Converted {} to {}", source.display(), output.display());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_uses_source_stem() {
        assert_eq!(
            pdf_output_path(Path::new("/data/p/modified/Client_A_intake.docx"), Path::new("/out")),
            PathBuf::from("/out/Client_A_intake.pdf")
        );
    }

    #[tokio::test]
    async fn test_missing_source_is_rejected() {
        let dir = tempdir().unwrap();
        let converter = LibreOfficeConverter::new("soffice", Duration::from_secs(1));
        let err = converter
            .convert(&dir.path().join("absent.docx"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::SourceMissing(_)));
    }

    #[tokio::test]
    async fn test_unknown_binary_fails_to_spawn() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.docx");
        std::fs::write(&source, b"x").unwrap();
        let converter = LibreOfficeConverter::new(
            "definitely-not-an-office-binary",
            Duration::from_secs(1),
        );
        let err = converter.convert(&source, dir.path()).await.unwrap_err();
        assert!(matches!(err, ConvertError::Spawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.docx");
        std::fs::write(&source, b"x").unwrap();
        let converter = LibreOfficeConverter::new("false", Duration::from_secs(5));
        let err = converter.convert(&source, dir.path()).await.unwrap_err();
        assert!(matches!(err, ConvertError::ExitStatus { code: Some(1), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_without_output_is_a_failure() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.docx");
        std::fs::write(&source, b"x").unwrap();
        let converter = LibreOfficeConverter::new("true", Duration::from_secs(5));
        let err = converter.convert(&source, dir.path()).await.unwrap_err();
        assert!(matches!(err, ConvertError::MissingOutput(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_converter_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let source = dir.path().join("a.docx");
        std::fs::write(&source, b"x").unwrap();
        let binary = dir.path().join("hung-soffice");
        std::fs::write(&binary, "#!/bin/sh\nexec sleep 10\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let converter = LibreOfficeConverter::new(
            binary.to_string_lossy(),
            Duration::from_millis(200),
        );
        let started = std::time::Instant::now();
        let err = converter.convert(&source, dir.path()).await.unwrap_err();

        assert!(matches!(err, ConvertError::Timeout(t) if t == Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
