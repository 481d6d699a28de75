//! Error types for native function binding.
//!
//! Resolution failures are memoised per binding, so the error type is
//! `Clone` and carries loader messages as strings.

use thiserror::Error;

use super::types::CallingConvention;

/// Errors raised while binding, resolving or invoking a native export.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeResolutionError {
    /// The export name passed to `bind` was empty.
    #[error("export name must not be empty")]
    EmptyExportName,

    /// The shared library could not be loaded.
    #[error("cannot load library {library}: {reason}")]
    LibraryNotFound {
        /// Library path as given to the binder.
        library: String,
        /// Loader message.
        reason: String,
    },

    /// The library loaded but does not export the requested symbol.
    #[error("export {export} not found in {library}: {reason}")]
    ExportNotFound {
        /// Library path as given to the binder.
        library: String,
        /// Requested export name.
        export: String,
        /// Loader message.
        reason: String,
    },

    /// Arguments do not match the declared signature, or the signature shape
    /// cannot be called.
    #[error("signature mismatch calling {export}: {reason}")]
    SignatureMismatch {
        /// Export being invoked.
        export: String,
        /// What did not match.
        reason: String,
    },

    /// A string argument could not be marshaled (interior NUL).
    #[error("argument {index} of {export} contains an interior NUL")]
    StringMarshal {
        /// Export being invoked.
        export: String,
        /// Zero-based argument position.
        index: usize,
    },

    /// The calling convention has no Rust ABI equivalent on this target.
    #[error("calling convention {convention:?} is not supported for {export}")]
    UnsupportedConvention {
        /// Export being invoked.
        export: String,
        /// Requested convention.
        convention: CallingConvention,
    },

    /// Invocation is only implemented for 64-bit targets.
    #[error("native invocation is not supported on this platform")]
    UnsupportedPlatform,
}

impl NativeResolutionError {
    /// Creates a library load error.
    pub fn library_not_found(library: impl Into<String>, reason: impl ToString) -> Self {
        Self::LibraryNotFound {
            library: library.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a missing export error.
    pub fn export_not_found(
        library: impl Into<String>,
        export: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::ExportNotFound {
            library: library.into(),
            export: export.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a signature mismatch error.
    pub fn signature_mismatch(export: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SignatureMismatch {
            export: export.into(),
            reason: reason.into(),
        }
    }

    /// True for failures to locate the library or export, as opposed to
    /// call-time signature problems.
    #[must_use]
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Self::LibraryNotFound { .. } | Self::ExportNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_not_found_display() {
        let error =
            NativeResolutionError::export_not_found("libm.so.6", "no_such_fn", "undefined symbol");
        let msg = error.to_string();
        assert!(msg.contains("no_such_fn"), "Expected export in: {msg}");
        assert!(msg.contains("libm.so.6"), "Expected library in: {msg}");
        assert!(error.is_resolution_failure());
    }

    #[test]
    fn test_signature_mismatch_is_not_resolution_failure() {
        let error = NativeResolutionError::signature_mismatch("abs", "expected 1 argument, got 2");
        assert!(error.to_string().contains("expected 1 argument"));
        assert!(!error.is_resolution_failure());
    }

    #[test]
    fn test_unsupported_convention_display() {
        let error = NativeResolutionError::UnsupportedConvention {
            export: "Method".to_string(),
            convention: CallingConvention::ThisCall,
        };
        assert!(error.to_string().contains("ThisCall"));
    }
}
