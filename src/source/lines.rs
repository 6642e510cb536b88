//! Default line-oriented file handler.
//!
//! Reads UTF-8 text one line at a time. `\n`, `\r\n` and a lone `\r` all
//! end a line, and the terminator is stripped from the emitted record.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{RecordStream, Source};
use crate::error::{PipelineError, Result};
use crate::record::Record;

/// Streams a text file as one record per line, numbered from 1.
#[derive(Debug)]
pub struct LineHandler {
    path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl LineHandler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_reader(&self) -> Result<BufReader<File>> {
        File::open(&self.path)
            .map(BufReader::new)
            .map_err(|e| PipelineError::io(&self.path, e))
    }
}

impl Source for LineHandler {
    fn open(&mut self) -> Result<()> {
        if self.reader.is_none() {
            debug!(path = %self.path.display(), "opening file");
            self.reader = Some(self.open_reader()?);
        }
        Ok(())
    }

    /// Consumes the handle acquired by `open`, or opens a new one.
    fn stream(&mut self) -> Result<RecordStream> {
        let reader = match self.reader.take() {
            Some(reader) => reader,
            None => self.open_reader()?,
        };
        Ok(Box::new(Lines::new(reader, &self.path)))
    }

    fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!(path = %self.path.display(), "closing file");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "lines"
    }
}

/// Iterator over the lines of a reader.
struct Lines<R> {
    reader: R,
    path: PathBuf,
    resource_name: String,
    next_id: u64,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> Lines<R> {
    fn new(reader: R, path: &Path) -> Self {
        Self {
            reader,
            path: path.to_path_buf(),
            resource_name: resource_name(path),
            next_id: 1,
            buf: Vec::new(),
            done: false,
        }
    }

    /// Read one line into `buf`, stopping at `\n`, `\r\n` or a lone `\r`.
    /// Returns false at end of input.
    fn read_line(&mut self) -> io::Result<bool> {
        self.buf.clear();
        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                return Ok(!self.buf.is_empty());
            }
            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(at) => {
                    let ending = available[at];
                    self.buf.extend_from_slice(&available[..at]);
                    self.reader.consume(at + 1);
                    if ending == b'\r' && self.reader.fill_buf()?.first() == Some(&b'\n') {
                        self.reader.consume(1);
                    }
                    return Ok(true);
                }
                None => {
                    let len = available.len();
                    self.buf.extend_from_slice(available);
                    self.reader.consume(len);
                }
            }
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if !self.read_line().map_err(|e| PipelineError::io(&self.path, e))? {
            return Ok(None);
        }
        let line = std::str::from_utf8(&self.buf).map_err(|e| {
            PipelineError::io(&self.path, io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        Ok(Some(line.to_string()))
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_line() {
            Ok(Some(line)) => {
                let id = self.next_id;
                self.next_id += 1;
                Some(Record::new(id, &self.resource_name, line))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// File name of `path`; paths like `logs/..` are resolved first, and the
/// full path is used when even that has no name.
fn resource_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            path.canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| path.display().to_string())
}
