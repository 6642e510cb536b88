//! Extension-keyed registry of file handlers.
//!
//! New file formats are supported by registering a [`Handler`] for a dotted
//! extension; [`FileSource`](super::FileSource) consults the registry when
//! no explicit handler is given and falls back to [`LineHandler`](super::LineHandler).
//!
//! The registry is an ordinary value. Callers own it and pass it to the
//! sources that should see it, so separate tests never share state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::{LineHandler, Source};
use crate::error::{PipelineError, Result};

type HandlerFactory = dyn Fn(&Path) -> Box<dyn Source> + Send + Sync;

/// A named constructor for a file-reading source.
#[derive(Clone)]
pub struct Handler {
    name: String,
    factory: Arc<HandlerFactory>,
}

impl Handler {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Path) -> Box<dyn Source> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// The default handler: one record per text line.
    pub fn lines() -> Self {
        Self::new("lines", |path| Box::new(LineHandler::new(path)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a source reading `path`.
    pub fn build(&self, path: &Path) -> Box<dyn Source> {
        (self.factory)(path)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

/// Normalize a dotted extension (`".LOG"` -> `".log"`).
///
/// The extension must start with a dot and name something after it.
pub fn normalize_extension(extension: &str) -> Result<String> {
    let valid = extension.len() > 1
        && extension.starts_with('.')
        && !extension[1..].contains(['.', '/', '\\'])
        && !extension.chars().any(char::is_whitespace);
    if !valid {
        return Err(PipelineError::Config(format!(
            "Invalid extension pattern '{extension}'. Must start with '.' followed by a suffix."
        )));
    }
    Ok(extension.to_lowercase())
}

/// Mapping from lower-cased dotted extension to handler.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `extension`.
    ///
    /// An existing registration is only replaced when `force` is set.
    pub fn register(&mut self, extension: &str, handler: Handler, force: bool) -> Result<()> {
        let extension = normalize_extension(extension)?;
        if let Some(existing) = self.handlers.get(&extension) {
            if !force {
                return Err(PipelineError::HandlerConflict {
                    extension,
                    existing: existing.name().to_string(),
                });
            }
            warn!(
                %extension,
                old = existing.name(),
                new = handler.name(),
                "overwriting file handler"
            );
        }
        self.handlers.insert(extension, handler);
        Ok(())
    }

    /// Builder form of [`register`](Self::register) without override.
    pub fn with(mut self, extension: &str, handler: Handler) -> Result<Self> {
        self.register(extension, handler, false)?;
        Ok(self)
    }

    /// Look up a handler; the extension is matched case-insensitively.
    pub fn get(&self, extension: &str) -> Option<&Handler> {
        self.handlers.get(&extension.to_lowercase())
    }

    /// Handler registered for the suffix of `path`, if any.
    pub fn for_path(&self, path: &Path) -> Option<&Handler> {
        let ext = path.extension()?.to_string_lossy();
        self.get(&format!(".{ext}"))
    }

    pub fn get_all(&self) -> &BTreeMap<String, Handler> {
        &self.handlers
    }

    pub fn clear(&mut self) {
        info!(count = self.handlers.len(), "clearing file handlers");
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Handler {
        Handler::new(name, |path| Box::new(LineHandler::new(path)))
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".LOG").unwrap(), ".log");
        assert_eq!(normalize_extension(".tar").unwrap(), ".tar");
        assert!(normalize_extension("log").is_err());
        assert!(normalize_extension("*.log").is_err());
        assert!(normalize_extension(".").is_err());
        assert!(normalize_extension("").is_err());
        assert!(normalize_extension(".a/b").is_err());
        assert!(normalize_extension(". log").is_err());
    }

    #[test]
    fn test_register_and_get_is_case_insensitive() {
        let mut registry = HandlerRegistry::new();
        registry.register(".Log", named("log-lines"), false).unwrap();

        assert_eq!(registry.get(".log").unwrap().name(), "log-lines");
        assert_eq!(registry.get(".LOG").unwrap().name(), "log-lines");
        assert!(registry.get(".txt").is_none());
        assert_eq!(registry.get_all().keys().collect::<Vec<_>>(), vec![".log"]);
    }

    #[test]
    fn test_duplicate_registration_conflicts() {
        let mut registry = HandlerRegistry::new();
        registry.register(".log", named("first"), false).unwrap();

        let err = registry.register(".LOG", named("second"), false).unwrap_err();
        match err {
            PipelineError::HandlerConflict { extension, existing } => {
                assert_eq!(extension, ".log");
                assert_eq!(existing, "first");
            }
            other => panic!("Expected HandlerConflict, got {other:?}"),
        }
        assert_eq!(registry.get(".log").unwrap().name(), "first");
    }

    #[test]
    fn test_force_overwrites() {
        let mut registry = HandlerRegistry::new();
        registry.register(".log", named("first"), false).unwrap();
        registry.register(".log", named("second"), true).unwrap();
        assert_eq!(registry.get(".log").unwrap().name(), "second");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_malformed_extension_not_registered() {
        let mut registry = HandlerRegistry::new();
        let err = registry.register("log", named("x"), false).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_for_path_uses_lowercased_suffix() {
        let registry = HandlerRegistry::new().with(".csv", named("csv")).unwrap();
        assert_eq!(
            registry.for_path(Path::new("data/REPORT.CSV")).unwrap().name(),
            "csv"
        );
        assert!(registry.for_path(Path::new("data/README")).is_none());
    }

    #[test]
    fn test_clear_empties_registry() {
        let mut registry = HandlerRegistry::new()
            .with(".a", named("a"))
            .unwrap()
            .with(".b", named("b"))
            .unwrap();
        assert_eq!(registry.len(), 2);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registries_are_isolated() {
        let mut one = HandlerRegistry::new();
        let two = HandlerRegistry::new();
        one.register(".log", named("log"), false).unwrap();
        assert!(two.get(".log").is_none());
    }
}
