//! jq query evaluation over a decoded document
//!
//! The query is compiled once, before any network I/O, so syntax errors are
//! reported up front. Evaluation is lazy: each result is handed to the caller
//! as soon as it is produced, and the first evaluation error stops the run.

use jaq_core::compile::Undefined;
use jaq_core::load::{self, Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Filter, Native, RcIter};
use jaq_json::Val;
use serde_json::Value;
use thiserror::Error;

use crate::document::Document;

/// Errors from compiling or running a query
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query text does not parse
    #[error("Invalid query '{query}': {detail}")]
    Parse { query: String, detail: String },

    /// The query parses but refers to something undefined
    #[error("Invalid query '{query}': {detail}")]
    Compile { query: String, detail: String },

    /// Evaluation raised an error value
    #[error("Query evaluation failed: {0}")]
    Eval(String),
}

/// A compiled jq filter
pub struct Query {
    source: String,
    filter: Filter<Native<Val>>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("source", &self.source).finish()
    }
}

impl Query {
    /// Compiles a jq program with the standard library available
    pub fn compile(source: &str) -> Result<Self, QueryError> {
        let program = File {
            code: source,
            path: (),
        };
        let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
        let arena = Arena::default();

        let modules = loader.load(&arena, program).map_err(|errs| QueryError::Parse {
            query: source.to_string(),
            detail: errs.first().map_or_else(
                || "parse error".to_string(),
                |(file, err)| load_error_detail(file.code, err),
            ),
        })?;

        let filter = Compiler::default()
            .with_funs(jaq_std::funs().chain(jaq_json::funs()))
            .compile(modules)
            .map_err(|errs| QueryError::Compile {
                query: source.to_string(),
                detail: errs
                    .first()
                    .and_then(|(file, undefined)| {
                        let (name, kind) = undefined.first()?;
                        Some(undefined_detail(file.code, name, kind))
                    })
                    .unwrap_or_else(|| "compile error".to_string()),
            })?;

        Ok(Self {
            source: source.to_string(),
            filter,
        })
    }

    /// Runs the query once over the document, passing each result to `emit`.
    ///
    /// Stops at the first evaluation error or the first error from `emit`.
    /// Returns the number of values emitted.
    pub fn run<F, E>(&self, document: Document, mut emit: F) -> Result<usize, E>
    where
        F: FnMut(Value) -> Result<(), E>,
        E: From<QueryError>,
    {
        let inputs = RcIter::new(core::iter::empty());
        let input = Val::from(Value::Object(document));

        let mut emitted = 0;
        for result in self.filter.run((Ctx::new([], &inputs), input)) {
            let value = result.map_err(|err| QueryError::Eval(err.to_string()))?;
            emit(Value::from(value))?;
            emitted += 1;
        }
        Ok(emitted)
    }

    #[cfg(test)]
    fn collect(&self, document: Document) -> Result<Vec<Value>, QueryError> {
        let mut values = Vec::new();
        self.run(document, |value| {
            values.push(value);
            Ok::<_, QueryError>(())
        })?;
        Ok(values)
    }
}

/// Byte offset of `part` within `code`, both slices of the same text
fn offset_in(code: &str, part: &str) -> usize {
    (part.as_ptr() as usize)
        .saturating_sub(code.as_ptr() as usize)
        .min(code.len())
}

/// Describes the first lex or parse error of a module
fn load_error_detail(code: &str, err: &load::Error<&str>) -> String {
    let first = match err {
        load::Error::Io(errs) => {
            return errs.first().map_or_else(
                || "cannot load module".to_string(),
                |(path, msg)| format!("{}: {}", path, msg),
            );
        }
        load::Error::Lex(errs) => errs.first().map(|(expect, at)| (expect.as_str(), *at)),
        load::Error::Parse(errs) => errs.first().map(|(expect, at)| (expect.as_str(), *at)),
    };
    match first {
        Some((expected, at)) => format!("expected {} at offset {}", expected, offset_in(code, at)),
        None => "parse error".to_string(),
    }
}

fn undefined_detail(code: &str, name: &str, kind: &Undefined) -> String {
    format!("undefined {} '{}' at offset {}", kind.as_str(), name, offset_in(code, name))
}
