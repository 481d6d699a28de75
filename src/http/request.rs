//! Request construction, sending and response consumption.
//!
//! An [`HttpRequest`] is assembled with builder calls, then consumed by exactly
//! one read operation. Reading sends the request; an instance cannot be sent
//! twice because every read operation takes it by value.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use tokio::fs::File;
use tokio::io::{AsyncWrite, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;
use url::form_urlencoded;

use super::config::HttpClient;
use super::constants::PROGRESS_INTERVAL;
use super::error::{ResponseInfo, TransportError};
use super::progress::{ProgressFn, ProgressThrottle, copy_stream};

/// Hook run on the outgoing transport request right before it is sent.
pub type BeforeSendHook = Box<dyn FnOnce(&mut reqwest::Request) + Send>;

/// Raw request body with its content type.
#[derive(Debug, Clone)]
struct PostData {
    bytes: Vec<u8>,
    content_type: String,
}

/// File attached to a multipart POST.
#[derive(Debug, Clone)]
pub struct FileAttachment {
    /// Form field name.
    pub field_name: String,
    /// File name reported to the server.
    pub file_name: String,
    /// File content.
    pub content: Vec<u8>,
    /// MIME type of the part; the transport default is used when absent.
    pub mime_type: Option<String>,
}

/// A single HTTP request, built up before it is sent.
///
/// # Example
///
/// ```no_run
/// use outcall::{HttpClient, HttpRequest};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let body = HttpRequest::get(&client, "https://example.com/search?lang=en")
///     .query("q", "rust")
///     .read_as_text()
///     .await?;
/// println!("{body}");
/// # Ok(())
/// # }
/// ```
pub struct HttpRequest {
    client: HttpClient,
    method: Method,
    base_url: String,
    query: Vec<(String, String)>,
    post_values: Vec<(String, String)>,
    post_data: Option<PostData>,
    files: Vec<FileAttachment>,
    headers: Vec<(String, String)>,
    before_send: Option<BeforeSendHook>,
    progress_interval: Duration,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let post_data_len = self.post_data.as_ref().map(|d| d.bytes.len());
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("base_url", &self.base_url)
            .field("query", &self.query)
            .field("post_values", &self.post_values)
            .field("post_data_len", &post_data_len)
            .field("files", &self.files.len())
            .field("headers", &self.headers.len())
            .field("before_send", &self.before_send.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpRequest {
    /// Creates a request with an explicit method.
    #[must_use]
    pub fn new(client: &HttpClient, method: Method, base_url: impl Into<String>) -> Self {
        Self {
            client: client.clone(),
            method,
            base_url: base_url.into(),
            query: Vec::new(),
            post_values: Vec::new(),
            post_data: None,
            files: Vec::new(),
            headers: Vec::new(),
            before_send: None,
            progress_interval: PROGRESS_INTERVAL,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(client: &HttpClient, base_url: impl Into<String>) -> Self {
        Self::new(client, Method::GET, base_url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(client: &HttpClient, base_url: impl Into<String>) -> Self {
        Self::new(client, Method::POST, base_url)
    }

    /// Appends a query parameter. Keys may repeat.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a form field to the POST body.
    #[must_use]
    pub fn post_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.post_values.push((key.into(), value.into()));
        self
    }

    /// Sets a raw POST payload.
    ///
    /// Ignored when post values or files are present; mixing them is left
    /// to the caller.
    #[must_use]
    pub fn post_data(mut self, bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        self.post_data = Some(PostData {
            bytes: bytes.into(),
            content_type: content_type.into(),
        });
        self
    }

    /// Attaches a file, turning the body into a multipart form.
    #[must_use]
    pub fn file(
        self,
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.attach(FileAttachment {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content: content.into(),
            mime_type: None,
        })
    }

    /// Attaches a file with an explicit MIME type.
    #[must_use]
    pub fn file_with_mime(
        self,
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
        mime_type: impl Into<String>,
    ) -> Self {
        self.attach(FileAttachment {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content: content.into(),
            mime_type: Some(mime_type.into()),
        })
    }

    /// Reads a file from disk and attaches it under its own file name.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the file cannot be read.
    pub fn file_from_path(
        self,
        field_name: impl Into<String>,
        path: &Path,
    ) -> Result<Self, TransportError> {
        let content =
            std::fs::read(path).map_err(|e| TransportError::io(Some(path.to_path_buf()), e))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(self.file(field_name, file_name, content))
    }

    fn attach(mut self, attachment: FileAttachment) -> Self {
        self.files.push(attachment);
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Registers a hook that may mutate the transport request before sending.
    #[must_use]
    pub fn before_send(
        mut self,
        hook: impl FnOnce(&mut reqwest::Request) + Send + 'static,
    ) -> Self {
        self.before_send = Some(Box::new(hook));
        self
    }

    /// Overrides the minimum time between two progress callbacks.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Builds the URL: accumulated query parameters are appended to the
    /// query already present in the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the base URL does not parse.
    pub fn build_url(&self) -> Result<Url, TransportError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|_| TransportError::invalid_url(&self.base_url))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs(&self.query));
        }
        Ok(url)
    }

    /// Builds the transport request: URL, method, headers and body.
    ///
    /// User agent, redirect, cookie and timeout policy come from the
    /// [`HttpClient`] the request was created with. The `before_send` hook is
    /// not run here.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] for an invalid URL,
    /// [`TransportError::InvalidRequest`] for an invalid header name or value,
    /// or [`TransportError::Multipart`] for an invalid attachment MIME type.
    pub fn build_transport_request(&self) -> Result<reqwest::Request, TransportError> {
        let url = self.build_url()?;
        let client = self.client.inner();
        let mut builder = client.request(self.method.clone(), url.clone());
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = self.apply_body(builder)?;
        builder
            .build()
            .map_err(|e| TransportError::network(url.as_str(), None, e))
    }

    fn apply_body(&self, builder: RequestBuilder) -> Result<RequestBuilder, TransportError> {
        if !self.files.is_empty() {
            let mut form = Form::new();
            for (key, value) in &self.post_values {
                form = form.text(key.clone(), value.clone());
            }
            for file in &self.files {
                let mut part = Part::bytes(file.content.clone()).file_name(file.file_name.clone());
                if let Some(mime) = &file.mime_type {
                    part = part.mime_str(mime).map_err(|e| {
                        TransportError::multipart(format!(
                            "field {}: invalid MIME type {mime}: {e}",
                            file.field_name
                        ))
                    })?;
                }
                form = form.part(file.field_name.clone(), part);
            }
            return Ok(builder.multipart(form));
        }

        if !self.post_values.is_empty() {
            let body = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs(&self.post_values))
                .finish();
            return Ok(builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body));
        }

        if let Some(data) = &self.post_data {
            return Ok(builder
                .header(CONTENT_TYPE, data.content_type.as_str())
                .body(data.bytes.clone()));
        }

        Ok(builder)
    }

    /// Sends the request; error statuses become [`TransportError::HttpStatus`]
    /// carrying the response metadata and the error page body.
    async fn send(mut self) -> Result<reqwest::Response, TransportError> {
        let mut request = self.build_transport_request()?;
        if let Some(hook) = self.before_send.take() {
            hook(&mut request);
        }

        let url = request.url().to_string();
        debug!(method = %request.method(), url = %url, "sending request");

        let response = self.client.inner().execute(request).await.map_err(|e| {
            let status = e.status().map(|s| s.as_u16());
            TransportError::network(url.as_str(), status, e)
        })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let info = ResponseInfo::from_response(&response);
            // A failure here must not mask the status error.
            let body = response.text().await.ok();
            warn!(status = status.as_u16(), url = %url, "request failed");
            return Err(TransportError::http_status(url, info, body));
        }

        debug!(status = status.as_u16(), "response received");
        Ok(response)
    }

    /// Sends the request and streams the body into `sink`.
    ///
    /// The body is written in 4096-byte slices. `progress` fires at most once
    /// per progress interval (100 ms by default), plus once at the end for any
    /// bytes not yet reported. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if sending, reading or writing fails.
    #[instrument(skip_all, fields(method = %self.method, url = %self.base_url))]
    pub async fn write_response_to<W>(
        self,
        sink: &mut W,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<u64, TransportError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let interval = self.progress_interval;
        let response = self.send().await?;
        stream_body(response, interval, sink, progress, None).await
    }

    /// Sends the request and returns the whole body as text.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if sending or reading fails.
    #[instrument(skip_all, fields(method = %self.method, url = %self.base_url))]
    pub async fn read_as_text(self) -> Result<String, TransportError> {
        let response = self.send().await?;
        let url = response.url().to_string();
        let status = response.status().as_u16();
        response
            .text()
            .await
            .map_err(|e| TransportError::network(url, Some(status), e))
    }

    /// Sends the request and returns the whole body as bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if sending or reading fails.
    pub async fn read_as_bytes(
        self,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buffer = Vec::new();
        self.write_response_to(&mut buffer, progress).await?;
        Ok(buffer)
    }

    /// Sends the request and streams the body into a file at `path`.
    ///
    /// The file is created (or truncated) once a successful response has
    /// arrived. A partially written file is removed if streaming fails.
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if sending or reading fails, or
    /// [`TransportError::Io`] if the file cannot be created or written.
    #[instrument(
        skip_all,
        fields(method = %self.method, url = %self.base_url, path = %path.display())
    )]
    pub async fn read_to_file(
        self,
        path: &Path,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<u64, TransportError> {
        let interval = self.progress_interval;
        let response = self.send().await?;

        let file = File::create(path)
            .await
            .map_err(|e| TransportError::io(Some(path.to_path_buf()), e))?;
        let mut writer = BufWriter::new(file);

        let result = stream_body(response, interval, &mut writer, progress, Some(path)).await;
        drop(writer);

        match result {
            Ok(bytes) => {
                info!(path = %path.display(), bytes, "response saved");
                Ok(bytes)
            }
            Err(error) => {
                debug!(path = %path.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(path).await;
                Err(error)
            }
        }
    }
}

fn pairs(values: &[(String, String)]) -> impl Iterator<Item = (&str, &str)> {
    values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
}

async fn stream_body<W>(
    response: reqwest::Response,
    interval: Duration,
    sink: &mut W,
    progress: Option<ProgressFn<'_>>,
    dest: Option<&Path>,
) -> Result<u64, TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let url = response.url().to_string();
    let status = response.status().as_u16();
    let mut throttle = ProgressThrottle::new(interval, response.content_length());

    let written = copy_stream(
        response.bytes_stream(),
        sink,
        &mut throttle,
        progress,
        |e| TransportError::network(url.as_str(), Some(status), e),
        dest,
    )
    .await?;

    debug!(bytes = written, "response body streamed");
    Ok(written)
}

/// Destination used when a request is saved under the URL's last path segment.
///
/// Falls back to `index.html` for URLs ending in `/`.
#[must_use]
pub fn default_file_name(url: &Url) -> PathBuf {
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("index.html");
    PathBuf::from(name)
}
