//! Record sinks.
//!
//! A [`Sink`] consumes the records that survive the stage chain. The
//! pipeline opens every sink before the first record and closes it after
//! the last one, on success and on failure alike.

use std::cell::RefCell;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::record::Record;

/// A consumer of records.
pub trait Sink<D = String> {
    /// Acquire the underlying resource.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Consume one record. Writing the same record twice writes it twice.
    fn write(&mut self, record: &Record<D>) -> Result<()>;

    /// Flush and release the underlying resource.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Display name used in logs.
    fn name(&self) -> &str {
        "sink"
    }
}

fn not_open(name: &str) -> PipelineError {
    PipelineError::Config(format!("Sink '{name}' written before it was opened"))
}

// ---------------------------------------------------------------------------
// Stdout
// ---------------------------------------------------------------------------

/// Prints each payload on its own line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl<D: Display> Sink<D> for StdoutSink {
    fn write(&mut self, record: &Record<D>) -> Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", record.data()).map_err(|e| PipelineError::io(Path::new("<stdout>"), e))
    }

    fn close(&mut self) -> Result<()> {
        io::stdout()
            .flush()
            .map_err(|e| PipelineError::io(Path::new("<stdout>"), e))
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// How an output file is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace any existing content.
    #[default]
    Truncate,
    /// Add to the end of existing content.
    Append,
}

/// Writes each payload as a UTF-8 line of a file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    label: String,
    mode: WriteMode,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            label: path.display().to_string(),
            path,
            mode: WriteMode::Truncate,
            writer: None,
        }
    }

    pub fn mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `mode(WriteMode::Append)`.
    pub fn append(self) -> Self {
        self.mode(WriteMode::Append)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<D: Display> Sink<D> for FileSink {
    fn open(&mut self) -> Result<()> {
        debug!(path = %self.path.display(), mode = ?self.mode, "opening output file");
        let mut options = OpenOptions::new();
        match self.mode {
            WriteMode::Truncate => options.write(true).create(true).truncate(true),
            WriteMode::Append => options.append(true).create(true),
        };
        let file = options
            .open(&self.path)
            .map_err(|e| PipelineError::io(&self.path, e))?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn write(&mut self, record: &Record<D>) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| not_open(&self.label))?;
        writeln!(writer, "{}", record.data()).map_err(|e| PipelineError::io(&self.path, e))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| PipelineError::io(&self.path, e))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.label
    }
}

// ---------------------------------------------------------------------------
// String
// ---------------------------------------------------------------------------

/// Collects payloads into an in-memory string, one line per record.
///
/// Clones share the same buffer, so keep a clone to read the output after
/// handing the sink to a pipeline. The buffer is cleared every time the
/// sink is opened.
///
/// ```
/// use linepipes::{Pipeline, StringSink, StringSource};
///
/// let sink = StringSink::new();
/// let mut pipeline = Pipeline::new() | StringSource::new("a\nb") | sink.clone();
/// pipeline.run().unwrap();
/// assert_eq!(sink.contents(), "a\nb\n");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StringSink {
    buffer: Rc<RefCell<String>>,
}

impl StringSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written since the last open.
    pub fn contents(&self) -> String {
        self.buffer.borrow().clone()
    }
}

impl<D: Display> Sink<D> for StringSink {
    fn open(&mut self) -> Result<()> {
        self.buffer.borrow_mut().clear();
        Ok(())
    }

    fn write(&mut self, record: &Record<D>) -> Result<()> {
        let mut buffer = self.buffer.borrow_mut();
        buffer.push_str(&record.data().to_string());
        buffer.push('\n');
        Ok(())
    }

    fn name(&self) -> &str {
        "string"
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

const DEFAULT_DESCRIPTION: &str = "JSON Data";
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Accepts ISO-8601 dates, datetimes and RFC 3339 timestamps.
fn check_iso_date(date: &str) -> Result<()> {
    let valid = DateTime::parse_from_rfc3339(date).is_ok()
        || NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok();
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "Invalid run date '{date}': expected ISO-8601"
        )))
    }
}

#[derive(Serialize)]
struct Header<'a> {
    description: &'a str,
    date: &'a str,
    count: usize,
}

#[derive(Serialize)]
struct Document<'a> {
    header: Header<'a>,
    records: &'a [serde_json::Value],
}

/// Buffers records and writes them as one JSON document when closed.
///
/// The document has a `header` object (`description`, `date`, `count`)
/// and a `records` array of `{sequence_id, resource_name, data}` objects.
/// The output file is created on open, so an unwritable path fails before
/// any record flows.
#[derive(Debug)]
pub struct JsonSink {
    path: PathBuf,
    label: String,
    description: String,
    date: Option<String>,
    records: Vec<serde_json::Value>,
    file: Option<File>,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            label: path.display().to_string(),
            path,
            description: DEFAULT_DESCRIPTION.to_string(),
            date: None,
            records: Vec::new(),
            file: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Fix the header date; must be ISO-8601.
    pub fn date(mut self, date: &str) -> Result<Self> {
        check_iso_date(date)?;
        self.date = Some(date.to_string());
        Ok(self)
    }

    pub fn datetime(mut self, date: NaiveDateTime) -> Self {
        self.date = Some(date.format(ISO_FORMAT).to_string());
        self
    }
}

impl<D: Serialize> Sink<D> for JsonSink {
    fn open(&mut self) -> Result<()> {
        debug!(path = %self.path.display(), "opening json output");
        self.records.clear();
        self.file = Some(File::create(&self.path).map_err(|e| PipelineError::io(&self.path, e))?);
        Ok(())
    }

    fn write(&mut self, record: &Record<D>) -> Result<()> {
        if self.file.is_none() {
            return Err(not_open(&self.label));
        }
        self.records.push(serde_json::to_value(record)?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let date = self
            .date
            .clone()
            .unwrap_or_else(|| Local::now().naive_local().format(ISO_FORMAT).to_string());
        let document = Document {
            header: Header {
                description: &self.description,
                date: &date,
                count: self.records.len(),
            },
            records: &self.records,
        };
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &document)?;
        writer.flush().map_err(|e| PipelineError::io(&self.path, e))?;
        debug!(path = %self.path.display(), count = self.records.len(), "wrote json output");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rec(id: u64, data: &str) -> Record {
        Record::text(id, "in.txt", data).unwrap()
    }

    fn feed<S: Sink>(sink: &mut S, lines: &[&str]) {
        sink.open().unwrap();
        for (i, line) in lines.iter().enumerate() {
            sink.write(&rec(i as u64 + 1, line)).unwrap();
        }
        sink.close().unwrap();
    }

    #[test]
    fn test_string_sink_appends_newlines() {
        let mut sink = StringSink::new();
        feed(&mut sink, &["a", "b", ""]);
        assert_eq!(sink.contents(), "a\nb\n\n");
    }

    #[test]
    fn test_string_sink_clears_on_open() {
        let mut sink = StringSink::new();
        feed(&mut sink, &["first"]);
        feed(&mut sink, &["second"]);
        assert_eq!(sink.contents(), "second\n");
    }

    #[test]
    fn test_string_sink_clones_share_buffer() {
        let sink = StringSink::new();
        let mut writer = sink.clone();
        feed(&mut writer, &["x"]);
        assert_eq!(sink.contents(), "x\n");
    }

    #[test]
    fn test_string_sink_duplicates_repeated_writes() {
        let mut sink = StringSink::new();
        Sink::<String>::open(&mut sink).unwrap();
        let r = rec(1, "dup");
        sink.write(&r).unwrap();
        sink.write(&r).unwrap();
        assert_eq!(sink.contents(), "dup\ndup\n");
    }

    #[test]
    fn test_file_sink_truncates_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old\n").unwrap();

        let mut sink = FileSink::new(&path);
        feed(&mut sink, &["new"]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_file_sink_append_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old\n").unwrap();

        let mut sink = FileSink::new(&path).append();
        feed(&mut sink, &["new"]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }

    #[test]
    fn test_file_sink_write_before_open_fails() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new(dir.path().join("out.txt"));
        assert!(sink.write(&rec(1, "x")).is_err());
    }

    #[test]
    fn test_file_sink_missing_directory_fails_at_open() {
        let mut sink = FileSink::new("/no/such/dir/out.txt");
        assert!(Sink::<String>::open(&mut sink).is_err());
    }

    #[test]
    fn test_json_sink_document_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");

        let mut sink = JsonSink::new(&path)
            .description("errors")
            .date("2024-01-02T03:04:05")
            .unwrap();
        feed(&mut sink, &["a", "b"]);

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            doc,
            serde_json::json!({
                "header": {"description": "errors", "date": "2024-01-02T03:04:05", "count": 2},
                "records": [
                    {"sequence_id": 1, "resource_name": "in.txt", "data": "a"},
                    {"sequence_id": 2, "resource_name": "in.txt", "data": "b"},
                ]
            })
        );
    }

    #[test]
    fn test_json_sink_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");

        let mut sink = JsonSink::new(&path);
        feed(&mut sink, &[]);

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["header"]["description"], "JSON Data");
        assert_eq!(doc["header"]["count"], 0);
        let date = doc["header"]["date"].as_str().unwrap();
        assert!(check_iso_date(date).is_ok());
    }

    #[test]
    fn test_json_sink_rejects_bad_date() {
        assert!(matches!(
            JsonSink::new("out.json").date("yesterday"),
            Err(PipelineError::Config(_))
        ));
        assert!(JsonSink::new("out.json").date("2024-06-30").is_ok());
        assert!(JsonSink::new("out.json").date("2024-06-30T12:00:00+02:00").is_ok());
    }

    #[test]
    fn test_json_sink_restarts_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let mut sink = JsonSink::new(&path);
        feed(&mut sink, &["a", "b"]);
        feed(&mut sink, &["c"]);

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["header"]["count"], 1);
        assert_eq!(doc["records"][0]["data"], "c");
    }
}
