//! Single-file source.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Handler, HandlerRegistry, RecordStream, Source};
use crate::error::Result;

/// Reads one file through a handler chosen by precedence:
///
/// 1. the handler passed explicitly,
/// 2. the registry entry for the file's lower-cased suffix,
/// 3. the default [`LineHandler`](super::LineHandler).
pub struct FileSource {
    path: PathBuf,
    label: String,
    handler: String,
    inner: Box<dyn Source>,
}

impl FileSource {
    /// Read `path` with the default line handler.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::resolve(path, None, None)
    }

    /// Read `path` with an explicit handler.
    pub fn with_handler(path: impl Into<PathBuf>, handler: &Handler) -> Self {
        Self::resolve(path, Some(handler), None)
    }

    /// Read `path` with whatever `registry` has for its suffix.
    pub fn with_registry(path: impl Into<PathBuf>, registry: &HandlerRegistry) -> Self {
        Self::resolve(path, None, Some(registry))
    }

    /// Apply the precedence rules and build the handler.
    pub fn resolve(
        path: impl Into<PathBuf>,
        handler: Option<&Handler>,
        registry: Option<&HandlerRegistry>,
    ) -> Self {
        let path = path.into();
        let handler = handler
            .or_else(|| registry.and_then(|r| r.for_path(&path)))
            .cloned()
            .unwrap_or_else(Handler::lines);
        debug!(path = %path.display(), handler = handler.name(), "resolved file handler");

        Self {
            label: path.display().to_string(),
            handler: handler.name().to_string(),
            inner: handler.build(&path),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the handler reading this file.
    pub fn handler_name(&self) -> &str {
        &self.handler
    }
}

impl Source for FileSource {
    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn stream(&mut self) -> Result<RecordStream> {
        self.inner.stream()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn name(&self) -> &str {
        &self.label
    }
}
