//! Error types for the http module.
//!
//! Every failure while sending a request or consuming its response is
//! translated into a [`TransportError`]. When the server answered with an
//! unsuccessful status, the error keeps the response metadata and the error
//! page body so callers can report what the server actually said.

use std::path::PathBuf;

use reqwest::header::HeaderMap;
use thiserror::Error;

/// Metadata of a received response, kept after the body has been consumed.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    /// HTTP status code.
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Response headers.
    pub headers: HeaderMap,
}

impl ResponseInfo {
    pub(crate) fn from_response(response: &reqwest::Response) -> Self {
        Self {
            status: response.status().as_u16(),
            url: response.url().to_string(),
            headers: response.headers().clone(),
        }
    }
}

/// Errors that can occur while sending a request or reading its response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The base URL (or the URL rebuilt from it) is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Network-level error (DNS, connection refused, reset mid-body, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL being requested.
        url: String,
        /// Status of the response if one had already been received.
        status: Option<u16>,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status (4xx, 5xx).
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned the error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Metadata of the error response.
        response: ResponseInfo,
        /// Error page body, when it could be read.
        body: Option<String>,
    },

    /// The request could not be assembled (invalid header name or value, etc.)
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What could not be assembled.
        reason: String,
    },

    /// Writing the response to its destination failed.
    #[error("IO error writing response{}: {source}", dest(path.as_ref()))]
    Io {
        /// Destination file, when writing to a file.
        path: Option<PathBuf>,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A file attachment could not be turned into a multipart part.
    #[error("invalid multipart attachment: {reason}")]
    Multipart {
        /// What was wrong with the attachment.
        reason: String,
    },

    /// The client configuration is invalid or the client could not be built.
    #[error("invalid HTTP client configuration: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },
}

impl TransportError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates a network error, promoting transport timeouts to [`Self::Timeout`]
    /// and request assembly failures to [`Self::InvalidRequest`].
    pub fn network(url: impl Into<String>, status: Option<u16>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        if source.is_builder() {
            return Self::invalid_request(source_chain(&source));
        }
        Self::Network {
            url: url.into(),
            status,
            source,
        }
    }

    /// Creates an HTTP status error from the response metadata and captured body.
    pub fn http_status(
        url: impl Into<String>,
        response: ResponseInfo,
        body: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status: response.status,
            response,
            body,
        }
    }

    /// Creates an IO error.
    pub fn io(path: Option<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path, source }
    }

    /// Creates a multipart attachment error.
    pub fn multipart(reason: impl Into<String>) -> Self {
        Self::Multipart {
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Status or error code of the failed exchange, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Network { status, .. } => *status,
            _ => None,
        }
    }

    /// Metadata of the received error response, if any.
    #[must_use]
    pub fn response(&self) -> Option<&ResponseInfo> {
        match self {
            Self::HttpStatus { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Best-effort captured body of the error response.
    #[must_use]
    pub fn error_body(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { body, .. } => body.as_deref(),
            _ => None,
        }
    }
}

fn dest(path: Option<&PathBuf>) -> String {
    path.map(|p| format!(" to {}", p.display()))
        .unwrap_or_default()
}

// reqwest's Display stops at "builder error"; the cause says which part was bad.
fn source_chain(error: &reqwest::Error) -> String {
    match std::error::Error::source(error) {
        Some(cause) => format!("{error}: {cause}"),
        None => error.to_string(),
    }
}

// No From<reqwest::Error> / From<std::io::Error>: every variant needs the URL or
// destination path as context, which the source errors don't carry.
