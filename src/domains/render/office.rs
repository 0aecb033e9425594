//! Bridge to the external document-conversion process (LibreOffice).
//!
//! The process is an optional dependency: when no binary can be found at
//! startup the bridge reports itself unavailable and every conversion attempt
//! fails with `ConversionServiceUnavailable` instead of crashing anything.

use std::path::PathBuf;

use log::{info, warn};
use tokio::process::Command;

use crate::errors::{DomainError, DomainResult};

const CANDIDATE_BINARIES: [&str; 4] = [
    "/usr/lib/libreoffice/program/soffice",
    "/opt/libreoffice/program/soffice",
    "/usr/local/bin/soffice",
    "/usr/bin/soffice",
];

pub struct OfficeConverter {
    binary: Option<PathBuf>,
}

impl OfficeConverter {
    /// Probe well-known install locations and PATH for a LibreOffice binary.
    pub fn detect() -> Self {
        let binary = CANDIDATE_BINARIES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .or_else(|| find_in_path("soffice"));

        match &binary {
            Some(path) => info!("document conversion service: {}", path.display()),
            None => warn!("LibreOffice not found; pdf conversion will be unavailable"),
        }
        Self { binary }
    }

    /// A bridge pointing at an explicit binary (tests, containers).
    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(path.into()),
        }
    }

    pub fn unavailable() -> Self {
        Self { binary: None }
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    /// Convert `input` bytes from one extension to another by round-tripping
    /// through the external process in a scratch directory.
    pub async fn convert(
        &self,
        input: &[u8],
        from_ext: &str,
        to_ext: &str,
    ) -> DomainResult<Vec<u8>> {
        let binary = self
            .binary
            .as_ref()
            .ok_or(DomainError::ConversionServiceUnavailable)?;

        let dir = tempfile::tempdir()?;
        let input_path = dir.path().join(format!("input.{}", from_ext));
        tokio::fs::write(&input_path, input).await?;

        let status = Command::new(binary)
            .arg("--headless")
            .arg("--convert-to")
            .arg(to_ext)
            .arg("--outdir")
            .arg(dir.path())
            .arg(&input_path)
            .status()
            .await
            .map_err(|_| DomainError::ConversionServiceUnavailable)?;

        if !status.success() {
            return Err(DomainError::Internal(format!(
                "conversion process exited with {}",
                status
            )));
        }

        let output_path = dir.path().join(format!("input.{}", to_ext));
        Ok(tokio::fs::read(&output_path).await?)
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_bridge_fails_with_service_unavailable() {
        let office = OfficeConverter::unavailable();
        assert!(!office.is_available());
        let err = office.convert(b"%PDF-", "pdf", "docx").await.unwrap_err();
        assert!(matches!(err, DomainError::ConversionServiceUnavailable));
    }
}
