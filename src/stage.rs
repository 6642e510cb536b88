//! Pipeline stages.
//!
//! A [`Stage`] takes one record and returns zero (filter), one (map) or
//! more (fan-out) records. Stages may keep state between calls; that state
//! lives in the stage value and survives across pipeline runs unless the
//! caller builds a fresh stage.

use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::record::{Payload, Record};

/// A pipeline stage that processes records one at a time.
pub trait Stage<D = String> {
    /// Process a single input record, returning zero or more output records.
    fn transform(&mut self, record: Record<D>) -> Result<Vec<Record<D>>>;

    /// The display name of this stage.
    fn name(&self) -> &str {
        "stage"
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| PipelineError::Config(format!("Invalid regex '{pattern}': {e}")))
}

/// Whether `regex` matches at the very start of `text`.
///
/// Leftmost search reports a match at offset 0 whenever one exists.
fn matches_at_start(regex: &Regex, text: &str) -> bool {
    regex.find(text).is_some_and(|m| m.start() == 0)
}

// ---------------------------------------------------------------------------
// Generic stages
// ---------------------------------------------------------------------------

/// Passes records through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl<D> Stage<D> for PassThrough {
    fn transform(&mut self, record: Record<D>) -> Result<Vec<Record<D>>> {
        Ok(vec![record])
    }

    fn name(&self) -> &str {
        "PASS"
    }
}

/// Replaces each payload with the result of a closure.
pub struct Map<F> {
    f: F,
}

impl<F> Map<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<D, F> Stage<D> for Map<F>
where
    D: Payload,
    F: FnMut(&Record<D>) -> D,
{
    fn transform(&mut self, record: Record<D>) -> Result<Vec<Record<D>>> {
        let data = (self.f)(&record);
        Ok(vec![record.with_data(data)?])
    }

    fn name(&self) -> &str {
        "MAP"
    }
}

/// Keeps records for which a predicate holds.
pub struct Filter<F> {
    predicate: F,
}

impl<F> Filter<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<D, F> Stage<D> for Filter<F>
where
    F: FnMut(&Record<D>) -> bool,
{
    fn transform(&mut self, record: Record<D>) -> Result<Vec<Record<D>>> {
        if (self.predicate)(&record) {
            Ok(vec![record])
        } else {
            Ok(vec![])
        }
    }

    fn name(&self) -> &str {
        "FILTER"
    }
}

// ---------------------------------------------------------------------------
// Text stages
// ---------------------------------------------------------------------------

/// Converts records to uppercase.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpperCase;

impl Stage for UpperCase {
    fn transform(&mut self, record: Record) -> Result<Vec<Record>> {
        let upper = record.as_str().to_uppercase();
        Ok(vec![record.with_data(upper)?])
    }

    fn name(&self) -> &str {
        "UPPER"
    }
}

/// Converts records to lowercase.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerCase;

impl Stage for LowerCase {
    fn transform(&mut self, record: Record) -> Result<Vec<Record>> {
        let lower = record.as_str().to_lowercase();
        Ok(vec![record.with_data(lower)?])
    }

    fn name(&self) -> &str {
        "LOWER"
    }
}

/// Prefixes each record with `resource:sequence:`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddMetadata;

impl Stage for AddMetadata {
    fn transform(&mut self, record: Record) -> Result<Vec<Record>> {
        let tagged = format!(
            "{}:{}:{}",
            record.resource_name(),
            record.sequence_id(),
            record.as_str()
        );
        Ok(vec![record.with_data(tagged)?])
    }

    fn name(&self) -> &str {
        "META"
    }
}

/// Keeps records whose data matches a regex at its start.
#[derive(Debug, Clone)]
pub struct RegexKeep {
    regex: Regex,
}

impl RegexKeep {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            regex: compile(pattern)?,
        })
    }
}

impl Stage for RegexKeep {
    fn transform(&mut self, record: Record) -> Result<Vec<Record>> {
        if matches_at_start(&self.regex, record.as_str()) {
            Ok(vec![record])
        } else {
            Ok(vec![])
        }
    }

    fn name(&self) -> &str {
        "KEEP"
    }
}

/// Drops records whose data matches a regex at its start.
#[derive(Debug, Clone)]
pub struct RegexSkip {
    regex: Regex,
}

impl RegexSkip {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            regex: compile(pattern)?,
        })
    }
}

impl Stage for RegexSkip {
    fn transform(&mut self, record: Record) -> Result<Vec<Record>> {
        if matches_at_start(&self.regex, record.as_str()) {
            Ok(vec![])
        } else {
            Ok(vec![record])
        }
    }

    fn name(&self) -> &str {
        "SKIP"
    }
}

/// Replaces every match of a regex.
///
/// The replacement may reference groups as `$1` or `${name}`.
#[derive(Debug, Clone)]
pub struct RegexSubstitute {
    regex: Regex,
    replacement: String,
}

impl RegexSubstitute {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        Ok(Self {
            regex: compile(pattern)?,
            replacement: replacement.to_string(),
        })
    }
}

impl Stage for RegexSubstitute {
    fn transform(&mut self, record: Record) -> Result<Vec<Record>> {
        let replaced = self
            .regex
            .replace_all(record.as_str(), self.replacement.as_str())
            .into_owned();
        Ok(vec![record.with_data(replaced)?])
    }

    fn name(&self) -> &str {
        "CHANGE"
    }
}

/// Collapses runs of blank (whitespace-only) records to the first one.
#[derive(Debug, Clone, Default)]
pub struct SkipRepeatedBlankLines {
    last_was_blank: bool,
}

impl SkipRepeatedBlankLines {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for SkipRepeatedBlankLines {
    fn transform(&mut self, record: Record) -> Result<Vec<Record>> {
        let blank = record.as_str().trim().is_empty();
        if blank && self.last_was_blank {
            return Ok(vec![]);
        }
        self.last_was_blank = blank;
        Ok(vec![record])
    }

    fn name(&self) -> &str {
        "SQUEEZE"
    }
}
