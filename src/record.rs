//! The unit of data flowing through a pipeline.
//!
//! A [`Record`] carries a 1-based sequence number, the name of the resource
//! it came from (a file name, a string source label) and a typed payload.
//! Records are validated when they are built and never mutated afterwards;
//! stages produce replacements with [`Record::with_data`].

use std::path::Path;

use serde::Serialize;

use crate::error::{PipelineError, Result};

/// Payload carried by a [`Record`].
///
/// `validate` runs every time a record is built, so payload types with
/// extra rules (non-empty, bounded size, ...) reject bad data up front.
pub trait Payload {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Text payloads are always valid.
impl Payload for String {}

/// One record of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record<D = String> {
    sequence_id: u64,
    resource_name: String,
    data: D,
}

impl<D: Payload> Record<D> {
    /// Build a record, trimming the resource name.
    ///
    /// Fails if `sequence_id` is zero, the trimmed name is empty, or the
    /// payload rejects itself.
    pub fn new(sequence_id: u64, resource_name: &str, data: D) -> Result<Self> {
        if sequence_id == 0 {
            return Err(PipelineError::InvalidRecord(
                "sequence_id must be a positive integer".to_string(),
            ));
        }
        let resource_name = resource_name.trim();
        if resource_name.is_empty() {
            return Err(PipelineError::InvalidRecord(
                "resource_name must be a non-empty string".to_string(),
            ));
        }
        data.validate()?;
        Ok(Self {
            sequence_id,
            resource_name: resource_name.to_string(),
            data,
        })
    }

    /// Build a record named after the final component of `path`.
    pub fn from_path(sequence_id: u64, path: &Path, data: D) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        Self::new(sequence_id, &name, data)
    }

    /// Replace the payload, keeping sequence id and resource name.
    pub fn with_data(self, data: D) -> Result<Self> {
        data.validate()?;
        Ok(Self { data, ..self })
    }
}

impl<D> Record<D> {
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn into_data(self) -> D {
        self.data
    }
}

impl Record<String> {
    /// Shorthand for a text record.
    pub fn text(sequence_id: u64, resource_name: &str, data: impl Into<String>) -> Result<Self> {
        Self::new(sequence_id, resource_name, data.into())
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }
}
