//! Formatting and writing of query results

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

/// Errors writing results
#[derive(Debug, Error)]
pub enum OutputError {
    /// The output file could not be created
    #[error("Error creating output file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to the destination failed
    #[error("Error writing output: {0}")]
    Write(#[from] io::Error),

    /// A value could not be rendered as JSON
    #[error("Error encoding result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// How each result value is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Strings without quotes, everything else as compact JSON
    Raw,
    /// Single-line JSON
    #[default]
    Compact,
    /// Indented JSON
    Pretty,
}

impl OutputFormat {
    /// Picks the format from the raw/pretty flags; raw takes precedence
    pub fn from_flags(raw: bool, pretty: bool) -> Self {
        if raw {
            OutputFormat::Raw
        } else if pretty {
            OutputFormat::Pretty
        } else {
            OutputFormat::Compact
        }
    }
}

/// Renders one value, without a trailing newline
pub fn render(value: &Value, format: OutputFormat) -> Result<String, serde_json::Error> {
    match (format, value) {
        (OutputFormat::Raw, Value::String(text)) => Ok(text.clone()),
        (OutputFormat::Pretty, _) => serde_json::to_string_pretty(value),
        _ => serde_json::to_string(value),
    }
}

/// Writes rendered values, one per line, to stdout or a file
pub struct OutputWriter {
    format: OutputFormat,
    sink: Box<dyn Write + Send>,
}

impl OutputWriter {
    /// Writes to standard output
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, Box::new(io::stdout()))
    }

    /// Creates (or truncates) the file and writes to it
    pub fn create(path: &Path, format: OutputFormat) -> Result<Self, OutputError> {
        let file = File::create(path).map_err(|source| OutputError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(format, Box::new(BufWriter::new(file))))
    }

    /// Writes to an arbitrary sink
    pub fn new(format: OutputFormat, sink: Box<dyn Write + Send>) -> Self {
        Self { format, sink }
    }

    /// Renders and writes one value followed by a newline
    pub fn write_value(&mut self, value: &Value) -> Result<(), OutputError> {
        let text = render(value, self.format)?;
        writeln!(self.sink, "{}", text)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Compact);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Pretty);
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Raw);
    }

    #[test]
    fn test_render_compact() {
        let value = json!({"a": [1, 2], "b": "x"});
        assert_eq!(render(&value, OutputFormat::Compact).unwrap(), r#"{"a":[1,2],"b":"x"}"#);
        assert_eq!(render(&json!("x"), OutputFormat::Compact).unwrap(), "\"x\"");
    }

    #[test]
    fn test_render_pretty_uses_two_space_indent() {
        let value = json!({"a": 1});
        assert_eq!(render(&value, OutputFormat::Pretty).unwrap(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_render_raw_unquotes_strings_only() {
        assert_eq!(render(&json!("plain text"), OutputFormat::Raw).unwrap(), "plain text");
        assert_eq!(render(&json!(42), OutputFormat::Raw).unwrap(), "42");
        assert_eq!(render(&json!(null), OutputFormat::Raw).unwrap(), "null");
        assert_eq!(render(&json!({"k": "v"}), OutputFormat::Raw).unwrap(), r#"{"k":"v"}"#);
    }

    #[test]
    fn test_writer_one_value_per_line() {
        let buf = SharedBuf::default();
        let mut writer = OutputWriter::new(OutputFormat::Raw, Box::new(buf.clone()));

        writer.write_value(&json!("first")).unwrap();
        writer.write_value(&json!(2)).unwrap();
        writer.flush().unwrap();

        assert_eq!(String::from_utf8(buf.0.lock().unwrap().clone()).unwrap(), "first\n2\n");
    }

    #[test]
    fn test_create_file_writer() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.json");

        let mut writer = OutputWriter::create(&path, OutputFormat::Compact).unwrap();
        writer.write_value(&json!({"ok": true})).unwrap();
        writer.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"ok\":true}\n");
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.json");
        assert!(matches!(
            OutputWriter::create(&path, OutputFormat::Compact),
            Err(OutputError::Create { .. })
        ));
    }
}
