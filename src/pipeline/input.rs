//! Input resolution: turn a path, URL, or byte buffer into a local PDF file.
//!
//! pdfium opens files by path, so remote and in-memory inputs are spilled
//! into a temp location owned by [`ResolvedInput`]; dropping it removes the
//! copy even when processing fails halfway. The `%PDF` magic bytes are
//! checked up front so a wrong file fails as an input error, not as a
//! pdfium parse error several stages later.

use crate::error::Pdf2ChunksError;
use crate::output::SourceInfo;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF ready for pdfium, plus where it came from.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the temp directory lives as long as this value.
    Downloaded {
        url: String,
        path: PathBuf,
        _temp_dir: TempDir,
    },
    /// Input was an in-memory buffer spilled to a temp file.
    Spilled(NamedTempFile),
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
            ResolvedInput::Spilled(tmp) => tmp.path(),
        }
    }

    /// Provenance recorded in the output artifact.
    pub fn source(&self) -> SourceInfo {
        match self {
            ResolvedInput::Local(p) => SourceInfo::LocalFile {
                path: p.display().to_string(),
            },
            ResolvedInput::Downloaded { url, .. } => SourceInfo::Url { url: url.clone() },
            ResolvedInput::Spilled(_) => SourceInfo::Bytes,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP(S) URL to a readable PDF file.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
) -> Result<ResolvedInput, Pdf2ChunksError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Write `bytes` to a managed temp file after checking the magic bytes.
pub fn resolve_bytes(bytes: &[u8]) -> Result<ResolvedInput, Pdf2ChunksError> {
    let mut tmp = NamedTempFile::new()
        .map_err(|e| Pdf2ChunksError::Internal(format!("tempfile: {e}")))?;
    check_magic(bytes, tmp.path())?;
    tmp.write_all(bytes)
        .map_err(|e| Pdf2ChunksError::Internal(format!("tempfile write: {e}")))?;
    Ok(ResolvedInput::Spilled(tmp))
}

fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2ChunksError> {
    let path = path.to_path_buf();
    if !path.exists() {
        return Err(Pdf2ChunksError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut head = [0u8; 4];
            let read = f.read(&mut head).unwrap_or(0);
            check_magic(&head[..read], &path)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2ChunksError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2ChunksError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Reject anything that does not start with `%PDF`, including empty files.
fn check_magic(bytes: &[u8], path: &Path) -> Result<(), Pdf2ChunksError> {
    if bytes.len() >= 4 && &bytes[..4] == PDF_MAGIC {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(Pdf2ChunksError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2ChunksError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| Pdf2ChunksError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2ChunksError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let temp_dir = TempDir::new().map_err(|e| Pdf2ChunksError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(file_name_from_url(url));
    check_magic(&bytes, &path)?;

    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| Pdf2ChunksError::Internal(format!("Failed to write temp file: {e}")))?;
    info!("Downloaded {} bytes to {}", bytes.len(), path.display());

    Ok(ResolvedInput::Downloaded {
        url: url.to_string(),
        path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of `url` when it looks like a file name.
fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "book.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn file_name_falls_back_for_bare_paths() {
        assert_eq!(file_name_from_url("https://x.io/books/moby.pdf"), "moby.pdf");
        assert_eq!(file_name_from_url("https://x.io/download"), "book.pdf");
        assert_eq!(file_name_from_url("https://x.io/"), "book.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_an_input_error() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.err().unwrap();
        assert!(matches!(err, Pdf2ChunksError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_file_is_rejected() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world").unwrap();
        let err = resolve_input(tmp.path().to_str().unwrap(), 5).await.err().unwrap();
        match err {
            Pdf2ChunksError::NotAPdf { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_pdf_records_its_path() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n").unwrap();
        let resolved = resolve_input(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert!(matches!(resolved.source(), SourceInfo::LocalFile { .. }));
    }

    #[test]
    fn bytes_are_spilled_and_checked() {
        assert!(matches!(
            resolve_bytes(b"").err().unwrap(),
            Pdf2ChunksError::NotAPdf { .. }
        ));
        let resolved = resolve_bytes(b"%PDF-1.4 minimal").unwrap();
        assert!(resolved.path().exists());
        assert_eq!(resolved.source(), SourceInfo::Bytes);
    }
}
