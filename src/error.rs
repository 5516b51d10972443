//! Error types for proxy construction and dispatch.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::schema::SchemaError;

/// Error type for building and calling proxies
#[derive(Debug, Error)]
pub enum ProxyError {
    /// An interface method has no bound native symbol
    #[error("method '{interface}::{method}' has no bound symbol name")]
    MissingBinding { interface: String, method: String },

    /// The native image could not be loaded
    #[error("failed to load library '{}': {source}", .path.display())]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The named export is absent from the loaded library
    #[error("symbol '{symbol}' not found in '{}': {reason}", .library.display())]
    SymbolNotFound {
        symbol: String,
        library: PathBuf,
        reason: String,
    },

    /// A parameter or return type has no native representation
    #[error("unsupported signature for '{method}': {reason}")]
    UnsupportedSignature { method: String, reason: String },

    /// No method with this name exists on the proxy
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// Several overloads accept the supplied arguments
    #[error("call to '{name}' is ambiguous between {candidates} overloads")]
    AmbiguousMethod { name: String, candidates: usize },

    /// Arguments do not fit the method's declared parameters
    #[error("argument mismatch calling '{method}': {reason}")]
    ArgumentMismatch { method: String, reason: String },

    /// Interface schema could not be parsed
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Configuration file could not be read
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Coarse classification of a [`ProxyError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingBinding,
    LibraryLoad,
    SymbolNotFound,
    UnsupportedSignature,
    Dispatch,
    Input,
}

impl ProxyError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::MissingBinding { .. } => ErrorKind::MissingBinding,
            ProxyError::LibraryLoad { .. } => ErrorKind::LibraryLoad,
            ProxyError::SymbolNotFound { .. } => ErrorKind::SymbolNotFound,
            ProxyError::UnsupportedSignature { .. } => ErrorKind::UnsupportedSignature,
            ProxyError::UnknownMethod(_)
            | ProxyError::AmbiguousMethod { .. }
            | ProxyError::ArgumentMismatch { .. } => ErrorKind::Dispatch,
            ProxyError::Schema(_) | ProxyError::Config(_) => ErrorKind::Input,
        }
    }

    /// Whether retrying with a different library path or version may succeed.
    ///
    /// Binding and signature errors are programming errors in the interface
    /// description and never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::LibraryLoad | ErrorKind::SymbolNotFound
        )
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
