//! Record sources.
//!
//! A [`Source`] produces a finite, ordered, lazy stream of records. Sources
//! that hold an underlying resource acquire it in [`Source::open`] and
//! release it in [`Source::close`]; the pipeline calls both around a run.
//! Calling [`Source::stream`] on an unopened source acquires what it needs
//! on the spot, so sources are also usable on their own.

mod file;
mod folder;
mod lines;
mod patterns;
mod registry;
mod text;
mod walk;

pub use file::FileSource;
pub use folder::FolderSource;
pub use lines::LineHandler;
pub use patterns::FilePatterns;
pub use registry::{Handler, HandlerRegistry, normalize_extension};
pub use text::{StringSource, StringsSource};
pub use walk::GlobSource;

use crate::error::Result;
use crate::record::Record;

/// Lazy stream of records; items fail individually on read errors.
pub type RecordStream<D = String> = Box<dyn Iterator<Item = Result<Record<D>>>>;

/// A producer of records.
pub trait Source<D = String> {
    /// Acquire the underlying resource.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start a fresh stream from the beginning.
    ///
    /// Errors that prevent the stream from starting (a missing file, an
    /// unreadable folder) are returned here, not from the first `next()`.
    fn stream(&mut self) -> Result<RecordStream<D>>;

    /// Release the underlying resource.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Display name used in logs.
    fn name(&self) -> &str {
        "source"
    }

    /// Drain a fresh stream into a vector.
    fn collect_records(&mut self) -> Result<Vec<Record<D>>> {
        self.stream()?.collect()
    }
}
