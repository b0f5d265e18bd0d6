//! HTTP transport to the render farm.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::trace;

use crate::util::{Error, Result};

/// Connect timeout for every request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for one request, uploads included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        })
    }
}

/// One multipart form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text { name: String, value: String },
    File { name: String, filename: String, bytes: Vec<u8> },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text { name: name.into(), value: value.into() }
    }

    pub fn file(name: impl Into<String>, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::File { name: name.into(), filename: filename.into(), bytes }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

/// Request relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path starting with `/`.
    pub path: String,
    /// Multipart body; empty means no body.
    pub form: Vec<FormPart>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::Get, path: path.into(), form: Vec::new() }
    }

    pub fn post(path: impl Into<String>, form: Vec<FormPart>) -> Self {
        Self { method: Method::Post, path: path.into(), form }
    }

    pub fn patch(path: impl Into<String>, form: Vec<FormPart>) -> Self {
        Self { method: Method::Patch, path: path.into(), form }
    }

    /// Text field value by name.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.form.iter().find_map(|p| match p {
            FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// File parts with the given field name.
    pub fn files<'a>(&'a self, name: &'a str) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        self.form.iter().filter_map(move |p| match p {
            FormPart::File { name: n, filename, bytes } if n == name => {
                Some((filename.as_str(), bytes.as_slice()))
            }
            _ => None,
        })
    }
}

/// Status and body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, body: body.into() }
    }

    /// Body as text, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends API requests. Implemented over HTTP by [`ReqwestTransport`].
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Blocking reqwest client with API key and user agent on every request.
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|e| Error::config(format!("API key is not a valid header value: {e}")))?;
        headers.insert("X-Api-Key", key);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("tracemap/", env!("CARGO_PKG_VERSION"))),
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        trace!(method = %request.method, %url, parts = request.form.len(), "api request");
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
        };
        if !request.form.is_empty() {
            let mut form = multipart::Form::new();
            for part in &request.form {
                form = match part {
                    FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
                    FormPart::File { name, filename, bytes } => form.part(
                        name.clone(),
                        multipart::Part::bytes(bytes.clone())
                            .file_name(filename.clone())
                            .mime_str("application/octet-stream")?,
                    ),
                };
            }
            builder = builder.multipart(form);
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        Ok(ApiResponse { status, body })
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").field("base_url", &self.base_url).finish()
    }
}
