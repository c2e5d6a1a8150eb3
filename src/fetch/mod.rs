//! HTTP fetch attempts against a single candidate URL
//!
//! A [`FetchRequest`] describes everything about a request except the URL:
//! method, headers, body, timeout, redirect and TLS policy. It is built once
//! from the command line and shared by reference with every attempt.

pub mod tls;
pub mod transport;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Version};
use thiserror::Error;
use url::Url;

pub use tls::{TlsError, TlsPolicy};
pub use transport::{HttpTransport, Transport};

/// Marker that turns a data value into a file reference
const FILE_MARKER: char = '@';

/// Errors from a single fetch attempt
///
/// Every variant except `Client` is transient: the scheduler moves on to the
/// next candidate URL.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or protocol failure
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The attempt did not complete within the per-request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered, but not with a JSON object
    #[error("Response is not a JSON object: {0}")]
    Decode(#[from] serde_json::Error),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

/// HTTP methods the tool can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    /// Parses a method name exactly as typed; only `GET` and `POST` are accepted
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a `Key: Value` header line is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// No `:` separator
    #[error("Malformatted header: '{0}' (expected \"Key: Value\")")]
    Malformed(String),

    /// The key is not a legal header name
    #[error("Invalid header name: '{0}'")]
    InvalidName(String),

    /// The value contains characters not allowed in a header
    #[error("Invalid value for header '{0}'")]
    InvalidValue(String),
}

/// Request headers with case-insensitive keys
///
/// Keys are stored lower-cased; inserting an existing key replaces its value.
/// A fresh set always carries `content-type: application/json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSet {
    entries: BTreeMap<String, String>,
}

impl Default for HeaderSet {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("content-type".to_string(), "application/json".to_string());
        Self { entries }
    }
}

impl HeaderSet {
    /// Parses a `Key: Value` line and merges it into the set.
    ///
    /// The key is trimmed and lower-cased; a single leading space is
    /// stripped from the value.
    pub fn insert_line(&mut self, line: &str) -> Result<(), HeaderError> {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| HeaderError::Malformed(line.to_string()))?;
        let key = key.trim().to_lowercase();
        let value = value.strip_prefix(' ').unwrap_or(value);
        self.insert(&key, value)
    }

    /// Inserts a header, replacing any value under the same key
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), HeaderError> {
        let key = key.to_lowercase();
        HeaderName::from_bytes(key.as_bytes()).map_err(|_| HeaderError::InvalidName(key.clone()))?;
        HeaderValue::from_str(value).map_err(|_| HeaderError::InvalidValue(key.clone()))?;
        self.entries.insert(key, value.to_string());
        Ok(())
    }

    /// Returns the value stored under a key, compared case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Where a POST body comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySource {
    /// The data value itself
    Literal(String),
    /// Full contents of a file, from a `@path` data value
    File(PathBuf),
}

impl BodySource {
    /// Interprets a data value, treating a leading `@` as a file reference
    pub fn parse(data: &str) -> Self {
        match data.strip_prefix(FILE_MARKER) {
            Some(path) => BodySource::File(PathBuf::from(path)),
            None => BodySource::Literal(data.to_string()),
        }
    }

    /// Reads the body bytes
    pub fn load(&self) -> io::Result<Vec<u8>> {
        match self {
            BodySource::Literal(text) => Ok(text.clone().into_bytes()),
            BodySource::File(path) => std::fs::read(path),
        }
    }
}

/// A candidate URL as given on the command line, with its parsed form
///
/// Requests go to the parsed URL; cache keys use the text exactly as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    text: String,
    url: Url,
}

impl Candidate {
    /// Parses a URL argument, keeping the original text.
    ///
    /// # Arguments
    /// * `text` - The URL as typed by the user
    ///
    /// # Returns
    /// The candidate, or the parse error for a malformed URL
    pub fn parse(text: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: Url::parse(text)?,
            text: text.to_string(),
        })
    }

    /// The URL text exactly as given
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The parsed URL used for the request
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Everything needed to issue one request, minus the target URL
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub headers: HeaderSet,
    /// Body sent with POST; ignored for GET
    pub body: Option<Vec<u8>>,
    /// Bound on a whole attempt, from connect to the last body byte
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub tls: TlsPolicy,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            method: Method::Get,
            headers: HeaderSet::default(),
            body: None,
            timeout: Duration::from_secs(15),
            follow_redirects: false,
            tls: TlsPolicy::default(),
        }
    }
}

/// A completed HTTP exchange
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub version: Version,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Status line such as `HTTP/1.1 200 OK`
    pub fn status_line(&self) -> String {
        format!("{:?} {}", self.version, self.status)
    }

    /// Writes the status line and headers, followed by a blank line
    pub fn write_head<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.status_line())?;
        for (key, value) in &self.headers {
            writeln!(out, "{}: {}", key, String::from_utf8_lossy(value.as_bytes()))?;
        }
        writeln!(out)
    }
}
