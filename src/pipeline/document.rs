//! Source documents: self-describing `data:<mime>;base64,<payload>` values.
//!
//! A [`Document`] is what the extractor sends to the model. It can be built
//! from a data URI handed over by a web front end, from raw bytes, from a
//! local file, or from an HTTP(S) URL pointing at the file-storage service.
//! Whatever the origin, the payload is validated once here (valid base64,
//! not empty, under the size limit) so the extractor never ships a broken
//! attachment to a billed API call.

use crate::error::ContractFillError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// MIME type used when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// One uploaded source document, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    mime_type: String,
    /// Standard base64 of the raw bytes.
    data: String,
    /// Original file name, when known.
    name: Option<String>,
    size: usize,
}

impl Document {
    /// Wrap raw bytes.
    pub fn from_bytes(
        mime_type: impl Into<String>,
        bytes: &[u8],
        name: Option<String>,
    ) -> Result<Self, ContractFillError> {
        if bytes.is_empty() {
            return Err(ContractFillError::InvalidDataUri {
                reason: format!(
                    "document '{}' is empty",
                    name.as_deref().unwrap_or("<unnamed>")
                ),
            });
        }
        Ok(Self {
            mime_type: normalise_mime(&mime_type.into()),
            data: STANDARD.encode(bytes),
            name,
            size: bytes.len(),
        })
    }

    /// Parse a `data:<mime-type>;base64,<payload>` URI.
    pub fn from_data_uri(uri: &str) -> Result<Self, ContractFillError> {
        let invalid = |reason: &str| ContractFillError::InvalidDataUri {
            reason: reason.to_string(),
        };

        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| invalid("missing 'data:' prefix"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| invalid("missing ',' between header and payload"))?;

        let mut params = header.split(';');
        let mime = params.next().unwrap_or_default();
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(invalid("only base64-encoded data URIs are supported"));
        }

        let mime = if mime.is_empty() { OCTET_STREAM } else { mime };
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| invalid(&format!("payload is not valid base64: {e}")))?;

        Self::from_bytes(mime, &bytes, None)
    }

    /// Read a local file; the MIME type is inferred from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ContractFillError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => ContractFillError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => ContractFillError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        debug!("Loaded document {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(mime_from_path(path), &bytes, name)
    }

    /// Download a document over HTTP(S).
    pub async fn fetch(url: &str, timeout_secs: u64) -> Result<Self, ContractFillError> {
        info!("Downloading document from: {}", url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ContractFillError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ContractFillError::DownloadTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                ContractFillError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(ContractFillError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let name = filename_from_url(url);
        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|m| !m.is_empty() && m != OCTET_STREAM);
        let mime = header_mime.unwrap_or_else(|| {
            name.as_deref()
                .map(|n| mime_from_path(Path::new(n)).to_string())
                .unwrap_or_else(|| OCTET_STREAM.to_string())
        });

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ContractFillError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Self::from_bytes(mime, &bytes, name)
    }

    /// Resolve a CLI-style input: data URI, HTTP(S) URL or local path.
    pub async fn resolve(input: &str, timeout_secs: u64) -> Result<Self, ContractFillError> {
        if input.starts_with("data:") {
            Self::from_data_uri(input)
        } else if is_url(input) {
            Self::fetch(input, timeout_secs).await
        } else {
            Self::from_path(PathBuf::from(input)).await
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Base64 payload without the `data:` header.
    pub fn base64_data(&self) -> &str {
        &self.data
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Decoded size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Name for logs and error messages.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("<{}>", self.mime_type))
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Textual documents are sent to the model as inline text rather than
    /// as an attachment.
    pub fn is_textual(&self) -> bool {
        self.mime_type.starts_with("text/")
            || matches!(
                self.mime_type.as_str(),
                "application/json" | "application/xml" | "application/csv"
            )
    }

    /// UTF-8 contents of a textual document (lossy for stray bytes).
    pub fn text(&self) -> Option<String> {
        if !self.is_textual() {
            return None;
        }
        STANDARD
            .decode(&self.data)
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reject documents above `limit` decoded bytes.
    pub fn check_size(&self, limit: usize) -> Result<(), ContractFillError> {
        if self.size > limit {
            return Err(ContractFillError::DocumentTooLarge {
                name: self.display_name(),
                size: self.size,
                limit,
            });
        }
        Ok(())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Infer a MIME type from a file extension.
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "doc" => "application/msword",
        "xls" => "application/vnd.ms-excel",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => OCTET_STREAM,
    }
}

fn normalise_mime(mime: &str) -> String {
    let m = mime.trim().to_ascii_lowercase();
    if m.is_empty() {
        OCTET_STREAM.to_string()
    } else {
        m
    }
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://storage.example/edital.pdf"));
        assert!(is_url("http://storage.example/edital.pdf"));
        assert!(!is_url("/tmp/edital.pdf"));
        assert!(!is_url("data:text/plain;base64,SGk="));
    }

    #[test]
    fn parses_data_uri() {
        let doc = Document::from_data_uri("data:text/plain;base64,T2zDoSBtdW5kbw==").unwrap();
        assert_eq!(doc.mime_type(), "text/plain");
        assert_eq!(doc.text().as_deref(), Some("Olá mundo"));
        assert_eq!(doc.size(), "Olá mundo".len());
    }

    #[test]
    fn data_uri_round_trips() {
        let uri = "data:application/pdf;base64,JVBERi0xLjQ=";
        assert_eq!(Document::from_data_uri(uri).unwrap().to_data_uri(), uri);
    }

    #[test]
    fn data_uri_with_charset_parameter() {
        let doc = Document::from_data_uri("data:text/csv;charset=utf-8;base64,YSxi").unwrap();
        assert_eq!(doc.mime_type(), "text/csv");
        assert_eq!(doc.text().as_deref(), Some("a,b"));
    }

    #[test]
    fn rejects_malformed_data_uris() {
        for bad in [
            "text/plain;base64,SGk=",
            "data:text/plain;base64",
            "data:text/plain,Hi",
            "data:text/plain;base64,***",
            "data:text/plain;base64,",
        ] {
            assert!(
                matches!(
                    Document::from_data_uri(bad),
                    Err(ContractFillError::InvalidDataUri { .. })
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn binary_documents_have_no_text() {
        let doc = Document::from_bytes("application/pdf", b"%PDF-1.4", Some("a.pdf".into())).unwrap();
        assert!(!doc.is_textual());
        assert_eq!(doc.text(), None);
        assert_eq!(doc.display_name(), "a.pdf");
    }

    #[test]
    fn size_limit() {
        let doc = Document::from_bytes("text/plain", b"0123456789", None).unwrap();
        assert!(doc.check_size(10).is_ok());
        assert!(matches!(
            doc.check_size(9),
            Err(ContractFillError::DocumentTooLarge { size: 10, limit: 9, .. })
        ));
    }

    #[test]
    fn mime_inference() {
        assert_eq!(mime_from_path(Path::new("plano.PDF")), "application/pdf");
        assert_eq!(
            mime_from_path(Path::new("orcamento.xlsx")),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(mime_from_path(Path::new("notas.txt")), "text/plain");
        assert_eq!(mime_from_path(Path::new("sem_extensao")), OCTET_STREAM);
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            filename_from_url("https://storage.example/o/projetos/plano.docx?alt=media").as_deref(),
            Some("plano.docx")
        );
        assert_eq!(filename_from_url("https://storage.example/o/"), None);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = Document::from_path("/definitely/not/here.pdf").await.unwrap_err();
        assert!(matches!(err, ContractFillError::FileNotFound { .. }));
    }
}
