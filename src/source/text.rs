//! In-memory string sources.
//!
//! Text is split with plain string semantics, so leading, trailing and
//! adjacent separators produce empty records:
//!
//! ```
//! use linepipes::{Source, StringSource};
//!
//! let mut source = StringSource::new(",a,,b").with_separator(",").unwrap();
//! let data: Vec<String> = source
//!     .collect_records()
//!     .unwrap()
//!     .into_iter()
//!     .map(|r| r.into_data())
//!     .collect();
//! assert_eq!(data, vec!["", "a", "", "b"]);
//! ```

use std::sync::Arc;

use super::{RecordStream, Source};
use crate::error::{PipelineError, Result};
use crate::record::Record;

const DEFAULT_NAME: &str = "text";
const DEFAULT_SEPARATOR: &str = "\n";

fn shared(text: impl Into<String>) -> Arc<str> {
    let text: String = text.into();
    Arc::from(text)
}

fn check_separator(separator: &str) -> Result<()> {
    if separator.is_empty() {
        return Err(PipelineError::Config("Separator must not be empty".to_string()));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PipelineError::Config(
            "Source name must be a non-empty string".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Streams one string, one record per chunk.
#[derive(Debug, Clone)]
pub struct StringSource {
    text: Arc<str>,
    separator: Arc<str>,
    name: String,
}

impl StringSource {
    /// Split `text` on newlines; records are named `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: shared(text),
            separator: Arc::from(DEFAULT_SEPARATOR),
            name: DEFAULT_NAME.to_string(),
        }
    }

    pub fn with_separator(mut self, separator: &str) -> Result<Self> {
        check_separator(separator)?;
        self.separator = Arc::from(separator);
        Ok(self)
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = check_name(name)?;
        Ok(self)
    }
}

impl Source for StringSource {
    fn stream(&mut self) -> Result<RecordStream> {
        Ok(Box::new(Chunks::new(
            self.text.clone(),
            self.separator.clone(),
            self.name.clone(),
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Streams several strings; the i-th (1-based) is named `name-i` and
/// numbered independently.
#[derive(Debug, Clone)]
pub struct StringsSource {
    texts: Vec<Arc<str>>,
    separator: Arc<str>,
    name: String,
}

impl StringsSource {
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: texts.into_iter().map(shared).collect(),
            separator: Arc::from(DEFAULT_SEPARATOR),
            name: DEFAULT_NAME.to_string(),
        }
    }

    pub fn with_separator(mut self, separator: &str) -> Result<Self> {
        check_separator(separator)?;
        self.separator = Arc::from(separator);
        Ok(self)
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = check_name(name)?;
        Ok(self)
    }
}

impl Source for StringsSource {
    fn stream(&mut self) -> Result<RecordStream> {
        let separator = self.separator.clone();
        let name = self.name.clone();
        let texts = self.texts.clone();
        Ok(Box::new(texts.into_iter().enumerate().flat_map(
            move |(i, text)| Chunks::new(text, separator.clone(), format!("{name}-{}", i + 1)),
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Owned split iterator producing numbered records.
struct Chunks {
    text: Arc<str>,
    separator: Arc<str>,
    name: String,
    pos: Option<usize>,
    next_id: u64,
}

impl Chunks {
    fn new(text: Arc<str>, separator: Arc<str>, name: String) -> Self {
        Self {
            text,
            separator,
            name,
            pos: Some(0),
            next_id: 1,
        }
    }
}

impl Iterator for Chunks {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos?;
        let rest = &self.text[start..];
        let chunk = match rest.find(&*self.separator) {
            Some(i) => {
                self.pos = Some(start + i + self.separator.len());
                &rest[..i]
            }
            None => {
                self.pos = None;
                rest
            }
        };
        let id = self.next_id;
        self.next_id += 1;
        Some(Record::new(id, &self.name, chunk.to_string()))
    }
}
