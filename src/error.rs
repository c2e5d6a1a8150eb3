//! Top-level error type for a jqurl run

use thiserror::Error;

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::output::OutputError;
use crate::query::QueryError;

/// Anything that makes a run exit with a non-zero status
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be constructed
    #[error("Unable to set up HTTP client: {0}")]
    Client(#[from] FetchError),

    /// No candidate URL produced a JSON object within the attempt bound
    #[error("Unable to fetch a valid JSON document after {attempts} attempt(s)")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Output(#[from] OutputError),
}
