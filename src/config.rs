//! Run configuration derived from the command line
//!
//! Everything that can be wrong with the invocation is detected here, before
//! any cache or network I/O: malformed URLs and headers, unsupported methods,
//! unreadable body files and broken TLS material.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

use crate::cache::CachePolicy;
use crate::cli::Cli;
use crate::fetch::{
    BodySource, Candidate, FetchRequest, HeaderError, HeaderSet, Method, TlsError, TlsPolicy,
};
use crate::output::OutputFormat;
use crate::retry::RetryPolicy;

/// Preferred cache location: memory-backed and shared by all invocations
const SHM_DIR: &str = "/dev/shm";

/// Errors in the command-line configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Malformed URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("At least one URL is required")]
    NoUrls,

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("Unknown method '{0}' (expected GET or POST)")]
    UnsupportedMethod(String),

    #[error("--max-tries must be at least 1")]
    ZeroTries,

    #[error("Unable to open {path}: {source}")]
    BodyFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Immutable configuration for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// jq query text
    pub query: String,
    /// Candidate URLs in round-robin order
    pub urls: Vec<Candidate>,
    pub request: FetchRequest,
    pub retry: RetryPolicy,
    pub cache_dir: PathBuf,
    pub cache: CachePolicy,
    pub output_format: OutputFormat,
    /// Output file; stdout when `None`
    pub output_path: Option<PathBuf>,
    /// Echo response status and headers to stderr
    pub include_headers: bool,
}

impl RunConfig {
    /// Validates parsed arguments and builds the run configuration
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let urls = parse_urls(&cli.urls)?;

        let method = Method::parse(&cli.method)
            .ok_or_else(|| ConfigError::UnsupportedMethod(cli.method.clone()))?;

        if cli.max_tries == 0 {
            return Err(ConfigError::ZeroTries);
        }

        let mut headers = HeaderSet::default();
        for line in &cli.headers {
            headers.insert_line(line)?;
        }

        let body = match method {
            Method::Post => Some(load_body(cli.data.as_deref().unwrap_or_default())?),
            Method::Get => None,
        };

        let tls = TlsPolicy::load(
            cli.insecure,
            cli.cacert.as_deref(),
            cli.cert.as_deref(),
            cli.key.as_deref(),
        )?;

        Ok(Self {
            query: cli.query.clone(),
            urls,
            request: FetchRequest {
                method,
                headers,
                body,
                timeout: cli.max_time,
                follow_redirects: cli.location,
                tls,
            },
            retry: RetryPolicy {
                max_tries: cli.max_tries,
                delay: cli.retry_delay,
            },
            cache_dir: cli.cachedir.clone().unwrap_or_else(default_cache_dir),
            cache: CachePolicy {
                enabled: cli.cache,
                flush: cli.flush,
                max_age: cli.max_age,
            },
            output_format: OutputFormat::from_flags(cli.raw_output, cli.pretty),
            output_path: cli.output.clone(),
            include_headers: cli.include,
        })
    }
}

fn parse_urls(raw: &[String]) -> Result<Vec<Candidate>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::NoUrls);
    }
    raw.iter()
        .map(|url| {
            Candidate::parse(url).map_err(|source| ConfigError::InvalidUrl {
                url: url.clone(),
                source,
            })
        })
        .collect()
}

fn load_body(data: &str) -> Result<Vec<u8>, ConfigError> {
    let body = BodySource::parse(data);
    body.load().map_err(|source| ConfigError::BodyFile {
        path: match body {
            BodySource::File(path) => path,
            BodySource::Literal(_) => PathBuf::new(),
        },
        source,
    })
}

/// Default cache directory.
///
/// Uses `/dev/shm` where it exists, then the per-user cache directory, then
/// the system temp directory.
pub fn default_cache_dir() -> PathBuf {
    let shm = Path::new(SHM_DIR);
    if shm.is_dir() {
        return shm.to_path_buf();
    }
    ProjectDirs::from("", "", "jqurl")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
}

/// Parses a duration such as `500ms`, `7s`, `15m`, `4h` or `1h30m`.
///
/// A bare integer is taken as seconds.
///
/// # Returns
///
/// The duration, or a message suitable for a clap usage error
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("invalid duration '{}': expected a number", text));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|e| format!("invalid duration '{}': {}", text, e))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let (unit, tail) = rest.split_at(unit_len);
        rest = tail;

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(60 * 60)),
            "" => return Err(format!("invalid duration '{}': missing unit", text)),
            other => return Err(format!("invalid duration '{}': unknown unit '{}'", text, other)),
        };
        total = total.saturating_add(part);
    }
    Ok(total)
}
