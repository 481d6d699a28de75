//! HTTP requests with streaming reads and progress reporting.
//!
//! This module builds GET/POST requests from a base URL plus query values,
//! form values, raw payloads and file attachments, and consumes the response
//! exactly once as a stream, text, bytes or a file.
//!
//! # Features
//!
//! - Query parameters are appended to any query already in the base URL
//! - Form, raw and multipart POST bodies
//! - Streaming in fixed 4096-byte slices with a throttled progress callback
//! - A `before_send` hook to adjust the transport request (headers, etc.)
//! - Uniform [`TransportError`] with status, response metadata and error body
//!
//! # Example
//!
//! ```no_run
//! use outcall::http::{HttpClient, HttpClientConfig, HttpRequest, TransferProgress};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::from_config(&HttpClientConfig::default())?;
//! let mut report = |p: TransferProgress| println!("{} bytes", p.total);
//! HttpRequest::get(&client, "https://example.com/paper.pdf")
//!     .read_to_file(Path::new("paper.pdf"), Some(&mut report))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
pub mod constants;
mod error;
mod progress;
mod request;

pub use config::{HttpClient, HttpClientConfig};
pub use error::{ResponseInfo, TransportError};
pub use progress::{ProgressFn, TransferProgress};
pub use request::{BeforeSendHook, FileAttachment, HttpRequest, default_file_name};
pub use reqwest::Method;
