//! Orchestration of one jqurl run
//!
//! Compile the query, try the cache, fall back to the retry scheduler, then
//! hand the document to the query and stream the results out.

use std::io::{self, Write};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::config::RunConfig;
use crate::document::Document;
use crate::error::Error;
use crate::fetch::{HttpTransport, Transport};
use crate::output::OutputWriter;
use crate::query::Query;
use crate::retry::{Outcome, Pause, Scheduler, TokioPause};

/// Where the document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A fresh cache entry for `urls[url_index]`
    Cache { url_index: usize, path: PathBuf },
    /// A live fetch from `urls[url_index]`
    Fetch { url_index: usize, attempts: u32 },
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub source: Source,
    /// Number of query results written
    pub emitted: usize,
}

/// Runs the whole pipeline against the real network and timer
pub async fn run(config: &RunConfig) -> Result<RunSummary, Error> {
    let query = Query::compile(&config.query)?;
    let cache = CacheStore::for_current_user(&config.cache_dir, config.cache.clone());
    let transport = HttpTransport::new(&config.request)?;

    let (document, source) = obtain_document(config, &cache, &transport, &TokioPause).await?;

    let mut writer = match &config.output_path {
        Some(path) => OutputWriter::create(path, config.output_format)?,
        None => OutputWriter::stdout(config.output_format),
    };
    let emitted = handoff(&query, document, &mut writer)?;

    Ok(RunSummary { source, emitted })
}

/// Produces the document, from the cache when possible, else by fetching
///
/// # Arguments
/// * `config` - The validated run configuration
/// * `cache` - Store consulted before the network and written after a fetch
/// * `transport` - Performs the HTTP attempts
/// * `pause` - Waits between retry passes
///
/// # Returns
/// The document and where it came from, or the fetch failure once every try is used
pub async fn obtain_document(
    config: &RunConfig,
    cache: &CacheStore,
    transport: &dyn Transport,
    pause: &dyn Pause,
) -> Result<(Document, Source), Error> {
    if cache.is_enabled() {
        if let Some(hit) = cache.scan(&config.urls) {
            info!(path = %hit.path.display(), "using cached document");
            if config.include_headers {
                let url = config.urls[hit.url_index].as_str();
                if let Err(err) = write_cache_notice(&mut io::stderr().lock(), url, &hit.path) {
                    debug!(error = %err, "cannot write cache notice");
                }
            }
            return Ok((
                hit.document,
                Source::Cache {
                    url_index: hit.url_index,
                    path: hit.path,
                },
            ));
        }
    }

    let mut scheduler =
        Scheduler::new(&config.urls, &config.request, config.retry, transport, pause)
            .echo_headers(config.include_headers);
    if cache.is_enabled() {
        scheduler = scheduler.with_cache(cache);
    }

    match scheduler.run().await {
        Outcome::Succeeded {
            document,
            url_index,
            attempts,
        } => {
            info!(url = %config.urls[url_index], attempts, "fetched document");
            Ok((document, Source::Fetch { url_index, attempts }))
        }
        Outcome::Exhausted { attempts } => Err(Error::Exhausted { attempts }),
    }
}

/// Evaluates the query once and writes each result as it is produced
pub fn handoff(
    query: &Query,
    document: Document,
    writer: &mut OutputWriter,
) -> Result<usize, Error> {
    let emitted = query.run(document, |value| {
        debug!(%value, "result");
        writer.write_value(&value).map_err(Error::from)
    })?;
    writer.flush()?;
    Ok(emitted)
}

/// Stands in for the response head when the document came from the cache
fn write_cache_notice<W: Write>(out: &mut W, url: &str, path: &std::path::Path) -> io::Result<()> {
    writeln!(out, "Header skipped as cache used")?;
    writeln!(out, "URL: {}", url)?;
    writeln!(out, "File: {}", path.display())
}
