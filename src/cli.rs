//! Command-line interface parsing for jqurl
//!
//! This module only describes the options; validation and conversion into a
//! runnable configuration happen in [`crate::config`].

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::parse_duration;

/// jqurl - URL and JSON parser tool
///
/// Fetches a JSON document from the first candidate URL that answers with
/// one, retrying round-robin across all of them, then prints the results of
/// a jq query over it.
#[derive(Parser, Debug)]
#[command(name = "jqurl")]
#[command(about = "Fetch JSON from one of several URLs with retries and caching, then query it")]
#[command(version)]
pub struct Cli {
    /// jq query applied to the fetched document
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Candidate URLs, tried in order and then round-robin
    #[arg(value_name = "URL", required = true)]
    pub urls: Vec<String>,

    /// Custom header to pass to server (content-type: application/json is preset)
    #[arg(long = "header", short = 'H', value_name = "Key: Value")]
    pub headers: Vec<String>,

    /// Pretty print JSON with indents
    #[arg(long, short = 'P')]
    pub pretty: bool,

    /// Follow redirects
    #[arg(long, short = 'L')]
    pub location: bool,

    /// Force redownload, when using cache
    #[arg(long)]
    pub flush: bool,

    /// Use local cache to speed up static queries
    #[arg(long, short = 'C')]
    pub cache: bool,

    /// Debug / verbose output
    #[arg(long)]
    pub debug: bool,

    /// Maximum number of tries
    #[arg(long, value_name = "TRIES", default_value_t = 30)]
    pub max_tries: u32,

    /// Raw output, no quotes for strings
    #[arg(long = "raw-output", short = 'r')]
    pub raw_output: bool,

    /// Include response status and headers in output (on stderr)
    #[arg(long, short = 'i')]
    pub include: bool,

    /// Ignore certificate validation checks
    #[arg(long, short = 'k')]
    pub insecure: bool,

    /// Method to use for HTTP request (GET or POST)
    #[arg(long = "request", short = 'X', value_name = "METHOD", default_value = "GET")]
    pub method: String,

    /// Data to use in POST (use @filename to read from file)
    #[arg(long, short = 'd', value_name = "STRING")]
    pub data: Option<String>,

    /// Use certificate authorities, PEM encoded
    #[arg(long, value_name = "FILE")]
    pub cacert: Option<PathBuf>,

    /// Use client cert in request, PEM encoded
    #[arg(long, short = 'E', value_name = "FILE")]
    pub cert: Option<PathBuf>,

    /// Key file for client cert, PEM encoded (defaults to the cert file)
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// Path for cache
    #[arg(long, value_name = "DIR")]
    pub cachedir: Option<PathBuf>,

    /// Write output to <FILE> instead of stdout
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Delay between retry passes (e.g. 500ms, 7s, 1m30s)
    #[arg(long, value_name = "DURATION", default_value = "7s", value_parser = parse_duration)]
    pub retry_delay: Duration,

    /// Timeout per request
    #[arg(
        long = "max-time",
        short = 'm',
        value_name = "DURATION",
        default_value = "15s",
        value_parser = parse_duration
    )]
    pub max_time: Duration,

    /// Max age for cache
    #[arg(long, value_name = "DURATION", default_value = "4h", value_parser = parse_duration)]
    pub max_age: Duration,
}
