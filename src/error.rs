//! Error types for the edgequake-contract-fill library.
//!
//! The pipeline has two failure policies and only one of them is an error
//! type:
//!
//! * [`ContractFillError`] is **loud**: document loading and entity
//!   extraction cannot produce a usable result (unreadable file, provider not
//!   configured, the model returned nothing parseable). Returned as
//!   `Err(ContractFillError)` so the caller can offer "try again" or "check
//!   your files".
//!
//! * Placeholder matching is **quiet**: a failed model call is folded into
//!   [`crate::output::MatchResult::degraded`], the fallback message with no
//!   model suggestions. Exact-name matches, which need no model, are kept;
//!   the caller renders the remaining blanks as a manual-entry form.
//!
//! The enum is `Clone` because a failed extraction can be observed by several
//! callers that coalesced on the same in-flight request in
//! [`crate::cache::ResponseCache`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-contract-fill library.
#[derive(Debug, Clone, Error)]
pub enum ContractFillError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Extraction was requested with an empty document list.
    #[error("No documents supplied: at least one source document is required for extraction")]
    NoDocuments,

    /// The string is not a `data:<mime>;base64,<payload>` URI.
    #[error("Invalid document data URI: {reason}")]
    InvalidDataUri { reason: String },

    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The decoded document is larger than the configured limit.
    #[error("Document '{name}' is {size} bytes, above the {limit} byte limit")]
    DocumentTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The model answered, but nothing usable could be parsed from it.
    #[error("AI failed to generate entity extraction output: {detail}\nTry again or check your files.")]
    ExtractionFailed { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_failed_is_actionable() {
        let e = ContractFillError::ExtractionFailed {
            detail: "empty response".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("AI failed to generate"), "got: {msg}");
        assert!(msg.contains("empty response"));
    }

    #[test]
    fn too_large_display() {
        let e = ContractFillError::DocumentTooLarge {
            name: "edital.pdf".into(),
            size: 30,
            limit: 20,
        };
        let msg = e.to_string();
        assert!(msg.contains("edital.pdf"));
        assert!(msg.contains("20 byte limit"));
    }

    #[test]
    fn provider_not_configured_display() {
        let e = ContractFillError::ProviderNotConfigured {
            provider: "anthropic".into(),
            hint: "set ANTHROPIC_API_KEY".into(),
        };
        assert!(e.to_string().contains("anthropic"));
        assert!(e.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn errors_are_clone() {
        let e = ContractFillError::LlmApiError {
            message: "503".into(),
        };
        let copy = e.clone();
        assert_eq!(e.to_string(), copy.to_string());
    }
}
