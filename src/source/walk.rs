//! Recursive folder source.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;
use walkdir::WalkDir;

use super::folder::Selection;
use super::{FilePatterns, Handler, HandlerRegistry, RecordStream, Source};
use crate::error::{PipelineError, Result};

/// Walks a directory tree and streams every matching file.
///
/// Folders named in the prune list are skipped before they are entered,
/// so nothing below them is ever opened. Prune entries are compared with
/// the exact folder name, not as patterns.
#[derive(Debug)]
pub struct GlobSource {
    root: PathBuf,
    label: String,
    prune: HashSet<String>,
    selection: Selection,
}

impl GlobSource {
    /// Fails if `root` does not exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(PipelineError::NotFound(root));
        }
        Ok(Self {
            label: root.display().to_string(),
            root,
            prune: HashSet::new(),
            selection: Selection::default(),
        })
    }

    /// Never descend into folders with these names.
    pub fn prune<S: AsRef<str>>(mut self, folders: &[S]) -> Self {
        self.prune
            .extend(folders.iter().map(|f| f.as_ref().to_string()));
        self
    }

    pub fn keep<S: AsRef<str>>(self, patterns: &[S]) -> Result<Self> {
        self.filter(FilePatterns::keep(patterns)?)
    }

    pub fn ignore<S: AsRef<str>>(self, patterns: &[S]) -> Result<Self> {
        self.filter(FilePatterns::ignore(patterns)?)
    }

    pub fn filter(mut self, patterns: FilePatterns) -> Result<Self> {
        self.selection.set_patterns(patterns)?;
        Ok(self)
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.selection.handler = Some(handler);
        self
    }

    pub fn registry(mut self, registry: &HandlerRegistry) -> Self {
        self.selection.registry = registry.clone();
        self
    }

    /// The root must still exist and be a folder.
    fn check_root(&self) -> Result<()> {
        let meta = fs::metadata(&self.root).map_err(|e| PipelineError::io(&self.root, e))?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(PipelineError::io(
                &self.root,
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ))
        }
    }
}

impl Source for GlobSource {
    fn open(&mut self) -> Result<()> {
        debug!(root = %self.root.display(), "opening tree");
        self.check_root()
    }

    fn stream(&mut self) -> Result<RecordStream> {
        self.check_root()?;
        let root = self.root.clone();
        let prune = self.prune.clone();
        let selection = self.selection.clone();

        let paths = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(move |entry| {
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && prune.contains(&*entry.file_name().to_string_lossy()))
            })
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    let is_file = entry.file_type().is_file()
                        || (entry.path_is_symlink() && entry.path().is_file());
                    (is_file && selection.accepts(entry.path()))
                        .then(|| Ok(entry.into_path()))
                }
                Err(e) => {
                    let path = e.path().map(PathBuf::from).unwrap_or_else(|| root.clone());
                    Some(Err(PipelineError::io(&path, io::Error::from(e))))
                }
            });
        Ok(self.selection.chain(paths))
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StringSource;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("top.txt"), "t1\n").unwrap();
        fs::create_dir_all(root.join("src/deep")).unwrap();
        fs::write(root.join("src/mid.txt"), "m1\nm2\n").unwrap();
        fs::write(root.join("src/deep/low.csv"), "l1\n").unwrap();
        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::write(root.join("target/debug/out.txt"), "x\n").unwrap();
        dir
    }

    fn names(source: &mut GlobSource) -> Vec<String> {
        let mut names: Vec<String> = source
            .collect_records()
            .unwrap()
            .iter()
            .map(|r| format!("{}:{}", r.resource_name(), r.as_str()))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_walks_whole_tree() {
        let dir = tree();
        let mut source = GlobSource::new(dir.path()).unwrap();
        assert_eq!(
            names(&mut source),
            vec!["low.csv:l1", "mid.txt:m1", "mid.txt:m2", "out.txt:x", "top.txt:t1"]
        );
    }

    #[test]
    fn test_pruned_folders_are_skipped() {
        let dir = tree();
        let mut source = GlobSource::new(dir.path()).unwrap().prune(&["target", "deep"]);
        assert_eq!(
            names(&mut source),
            vec!["mid.txt:m1", "mid.txt:m2", "top.txt:t1"]
        );
    }

    #[test]
    fn test_keep_patterns_apply_at_every_depth() {
        let dir = tree();
        let mut source = GlobSource::new(dir.path())
            .unwrap()
            .prune(&["target"])
            .keep(&["*.txt"])
            .unwrap();
        assert_eq!(
            names(&mut source),
            vec!["mid.txt:m1", "mid.txt:m2", "top.txt:t1"]
        );
    }

    #[test]
    fn test_ignore_patterns() {
        let dir = tree();
        let mut source = GlobSource::new(dir.path()).unwrap().ignore(&["*.txt"]).unwrap();
        assert_eq!(names(&mut source), vec!["low.csv:l1"]);
    }

    #[test]
    fn test_keep_and_ignore_conflict() {
        let dir = tree();
        let err = GlobSource::new(dir.path())
            .unwrap()
            .ignore(&["*.csv"])
            .unwrap()
            .keep(&["*.txt"])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_missing_root_rejected() {
        assert!(matches!(
            GlobSource::new("/no/such/tree"),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_root_checked_at_open() {
        let dir = tree();
        let mut source = GlobSource::new(dir.path().join("src")).unwrap();
        source.open().unwrap();

        fs::remove_dir_all(dir.path().join("src")).unwrap();
        assert!(matches!(source.open(), Err(PipelineError::NotFound(_))));

        let mut file_root = GlobSource::new(dir.path().join("top.txt")).unwrap();
        assert!(matches!(file_root.open(), Err(PipelineError::Io { .. })));
    }

    #[test]
    fn test_explicit_handler_beats_registry() {
        let dir = tree();
        let registry = HandlerRegistry::new()
            .with(
                ".txt",
                Handler::new("registry", |_| Box::new(StringSource::new("from registry"))),
            )
            .unwrap();
        let mut source = GlobSource::new(dir.path())
            .unwrap()
            .keep(&["top.txt"])
            .unwrap()
            .registry(&registry)
            .handler(Handler::new("explicit", |_| Box::new(StringSource::new("explicit"))));
        assert_eq!(names(&mut source), vec!["text:explicit"]);
    }

    #[test]
    fn test_line_order_within_file_preserved() {
        let dir = tree();
        let mut source = GlobSource::new(dir.path()).unwrap().keep(&["mid.txt"]).unwrap();
        let records = source.collect_records().unwrap();
        let ids: Vec<u64> = records.iter().map(|r| r.sequence_id()).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
