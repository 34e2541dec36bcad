//! Error types for the webview library.

use std::path::PathBuf;

/// Errors surfaced by platform detection, native loading and the webview facade.
#[derive(Debug, thiserror::Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum WebViewError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("bundled resource not found: {0}")]
    ResourceMissing(String),

    #[error("file is in use by another process: {}", .0.display())]
    ResourceBusy(PathBuf),

    #[error("unable to extract native {resource} to {}: {source}", .target.display())]
    Extract {
        resource: String,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load native library {}: {source}", .path.display())]
    LoadFailure {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("missing native symbol {symbol}: {source}")]
    SymbolMissing {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("native webview could not be created")]
    CreateFailed,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("{0} contains an interior NUL byte")]
    InteriorNul(&'static str),

    #[error("a binding named {0:?} already exists")]
    DuplicateBinding(String),

    #[error("no binding named {0:?}")]
    BindingNotFound(String),

    #[error("native {operation} failed with error code {code}")]
    Native { operation: &'static str, code: i32 },

    #[error("webview not found: {0}")]
    WebViewNotFound(u64),

    #[error("webview {0} accessed from a thread other than its creator")]
    WrongThread(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WebViewError {
    pub(crate) fn terminated() -> Self {
        Self::InvalidState("webview has been terminated".to_string())
    }
}
