//! Keep/ignore filename filtering for folder sources.
//!
//! Patterns use glob syntax and are matched against the file name only:
//!
//! - `*` matches any sequence of characters
//! - `?` matches any single character
//! - `[abc]` / `[!abc]` match one character in / not in the set
//!
//! Keep and ignore lists are mutually exclusive.

use glob::Pattern;

use crate::error::{PipelineError, Result};

/// Which files of a folder to read.
#[derive(Debug, Clone, Default)]
pub enum FilePatterns {
    /// Every file.
    #[default]
    All,
    /// Only files matching at least one pattern.
    Keep(Vec<Pattern>),
    /// Every file except those matching a pattern.
    Ignore(Vec<Pattern>),
}

impl FilePatterns {
    /// Build from keep and ignore lists; supplying both is an error.
    pub fn new<K, I>(keep: &[K], ignore: &[I]) -> Result<Self>
    where
        K: AsRef<str>,
        I: AsRef<str>,
    {
        match (keep.is_empty(), ignore.is_empty()) {
            (true, true) => Ok(FilePatterns::All),
            (false, true) => Ok(FilePatterns::Keep(compile(keep)?)),
            (true, false) => Ok(FilePatterns::Ignore(compile(ignore)?)),
            (false, false) => Err(PipelineError::Config(
                "You can specify either keep patterns or ignore patterns, but not both."
                    .to_string(),
            )),
        }
    }

    pub fn keep<K: AsRef<str>>(patterns: &[K]) -> Result<Self> {
        Self::new::<K, &str>(patterns, &[])
    }

    pub fn ignore<I: AsRef<str>>(patterns: &[I]) -> Result<Self> {
        Self::new::<&str, I>(&[], patterns)
    }

    /// Whether a file called `file_name` passes the filter.
    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            FilePatterns::All => true,
            FilePatterns::Keep(patterns) => patterns.iter().any(|p| p.matches(file_name)),
            FilePatterns::Ignore(patterns) => !patterns.iter().any(|p| p.matches(file_name)),
        }
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            let p = p.as_ref();
            Pattern::new(p)
                .map_err(|e| PipelineError::Config(format!("Invalid glob pattern '{p}': {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_patterns_matches_everything() {
        let filter = FilePatterns::new::<&str, &str>(&[], &[]).unwrap();
        assert!(filter.matches("anything.bin"));
    }

    #[test]
    fn test_keep_patterns() {
        let filter = FilePatterns::keep(&["*.txt", "*.csv"]).unwrap();
        assert!(filter.matches("a.txt"));
        assert!(filter.matches("b.csv"));
        assert!(!filter.matches("c.log"));
    }

    #[test]
    fn test_ignore_patterns() {
        let filter = FilePatterns::ignore(&["*.tmp", "file?.log"]).unwrap();
        assert!(!filter.matches("x.tmp"));
        assert!(!filter.matches("file1.log"));
        assert!(filter.matches("file10.log"));
        assert!(filter.matches("keep.txt"));
    }

    #[test]
    fn test_keep_and_ignore_are_exclusive() {
        for (keep, ignore) in [
            (vec!["*.txt"], vec!["*.log"]),
            (vec!["*"], vec!["*"]),
            (vec!["a", "b"], vec!["c"]),
        ] {
            let err = FilePatterns::new(&keep, &ignore).unwrap_err();
            assert!(matches!(err, PipelineError::Config(_)));
        }
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = FilePatterns::keep(&["[unclosed"]).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
