//! Non-recursive folder source.

use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{FilePatterns, FileSource, Handler, HandlerRegistry, RecordStream, Source};
use crate::error::{PipelineError, Result};
use crate::record::Record;

/// How the files of a folder are picked and read.
#[derive(Debug, Clone, Default)]
pub(crate) struct Selection {
    pub(crate) patterns: FilePatterns,
    pub(crate) handler: Option<Handler>,
    pub(crate) registry: HandlerRegistry,
}

impl Selection {
    /// Install a filter; keep and ignore cannot both be active.
    pub(crate) fn set_patterns(&mut self, patterns: FilePatterns) -> Result<()> {
        match (&self.patterns, &patterns) {
            (FilePatterns::Keep(_), FilePatterns::Ignore(_))
            | (FilePatterns::Ignore(_), FilePatterns::Keep(_)) => Err(PipelineError::Config(
                "You can specify either keep patterns or ignore patterns, but not both."
                    .to_string(),
            )),
            _ => {
                self.patterns = patterns;
                Ok(())
            }
        }
    }

    pub(crate) fn accepts(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.patterns.matches(&name.to_string_lossy()))
    }

    /// Stream every path in turn through its resolved handler.
    pub(crate) fn chain<I>(&self, paths: I) -> RecordStream
    where
        I: Iterator<Item = Result<PathBuf>> + 'static,
    {
        Box::new(FileChain {
            paths: Box::new(paths),
            handler: self.handler.clone(),
            registry: self.registry.clone(),
            current: None,
        })
    }
}

/// Concatenation of per-file streams, opened one file at a time.
struct FileChain {
    paths: Box<dyn Iterator<Item = Result<PathBuf>>>,
    handler: Option<Handler>,
    registry: HandlerRegistry,
    current: Option<RecordStream>,
}

impl Iterator for FileChain {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(stream) = self.current.as_mut() {
                match stream.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            let path = match self.paths.next()? {
                Ok(path) => path,
                Err(e) => return Some(Err(e)),
            };
            let mut file = FileSource::resolve(&path, self.handler.as_ref(), Some(&self.registry));
            match file.stream() {
                Ok(stream) => self.current = Some(stream),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Streams every file directly inside a folder.
///
/// Subdirectories are skipped. Files are visited in directory order, which
/// is platform dependent; lines within one file keep their order.
#[derive(Debug)]
pub struct FolderSource {
    folder: PathBuf,
    label: String,
    selection: Selection,
    entries: Option<ReadDir>,
}

impl FolderSource {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        let folder = folder.into();
        Self {
            label: folder.display().to_string(),
            folder,
            selection: Selection::default(),
            entries: None,
        }
    }

    /// Build with keep and ignore lists; supplying both is an error.
    pub fn with_patterns<K, I>(folder: impl Into<PathBuf>, keep: &[K], ignore: &[I]) -> Result<Self>
    where
        K: AsRef<str>,
        I: AsRef<str>,
    {
        Self::new(folder).filter(FilePatterns::new(keep, ignore)?)
    }

    /// Only read files matching one of `patterns`.
    pub fn keep<S: AsRef<str>>(self, patterns: &[S]) -> Result<Self> {
        self.filter(FilePatterns::keep(patterns)?)
    }

    /// Skip files matching any of `patterns`.
    pub fn ignore<S: AsRef<str>>(self, patterns: &[S]) -> Result<Self> {
        self.filter(FilePatterns::ignore(patterns)?)
    }

    pub fn filter(mut self, patterns: FilePatterns) -> Result<Self> {
        self.selection.set_patterns(patterns)?;
        Ok(self)
    }

    /// Read every file with `handler`, bypassing the registry.
    pub fn handler(mut self, handler: Handler) -> Self {
        self.selection.handler = Some(handler);
        self
    }

    /// Resolve handlers from a snapshot of `registry`.
    pub fn registry(mut self, registry: &HandlerRegistry) -> Self {
        self.selection.registry = registry.clone();
        self
    }

    fn read_dir(&self) -> Result<ReadDir> {
        fs::read_dir(&self.folder).map_err(|e| PipelineError::io(&self.folder, e))
    }
}

impl Source for FolderSource {
    fn open(&mut self) -> Result<()> {
        debug!(folder = %self.folder.display(), "opening folder");
        self.entries = Some(self.read_dir()?);
        Ok(())
    }

    fn stream(&mut self) -> Result<RecordStream> {
        let entries = match self.entries.take() {
            Some(entries) => entries,
            None => self.read_dir()?,
        };
        let folder = self.folder.clone();
        let selection = self.selection.clone();
        let paths = entries.filter_map(move |entry| match entry {
            Ok(entry) => {
                let path = entry.path();
                (!path.is_dir() && selection.accepts(&path)).then_some(Ok(path))
            }
            Err(e) => Some(Err(PipelineError::io(&folder, e))),
        });
        Ok(self.selection.chain(paths))
    }

    fn close(&mut self) -> Result<()> {
        self.entries = None;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.label
    }
}
