//! # linepipes
//!
//! Composable streaming pipelines for line-oriented records.
//!
//! A pipeline reads [`Record`]s from one or more sources, pushes each one
//! through a chain of stages and hands whatever survives to every sink.
//! Records are pulled one at a time, end to end, so a pipeline over a huge
//! file uses as little memory as a pipeline over a short string.
//!
//! ## Overview
//!
//! - **Sources**: files, folders, directory trees and in-memory strings
//! - **Stages**: case changes, regex filters and substitutions, blank-line squeezing
//! - **Sinks**: stdout, files, an in-memory string, a JSON document
//! - **Handler registry**: pick how files are read by their extension
//! - **DSL**: pipelines written as `.pipe` text files
//!
//! ## Example
//!
//! ```
//! use linepipes::{PassThrough, StringSink, StringSource};
//!
//! let sink = StringSink::new();
//! let mut pipeline = StringSource::new("a,b,c").with_separator(",").unwrap()
//!     | PassThrough
//!     | sink.clone();
//!
//! assert_eq!(pipeline.run().unwrap(), 3);
//! assert_eq!(sink.contents(), "a\nb\nc\n");
//! ```

pub mod dsl;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod source;
pub mod stage;

pub use dsl::{Command, build_pipeline, load_pipeline, parse_commands};
pub use error::{PipelineError, Result};
pub use executor::{Flow, flow};
pub use pipeline::{Element, Pipeline, PipelineState, Role, SourceExt};
pub use record::{Payload, Record};
pub use sink::{FileSink, JsonSink, Sink, StdoutSink, StringSink, WriteMode};
pub use source::{
    FilePatterns, FileSource, FolderSource, GlobSource, Handler, HandlerRegistry, LineHandler,
    RecordStream, Source, StringSource, StringsSource,
};
pub use stage::{
    AddMetadata, Filter, LowerCase, Map, PassThrough, RegexKeep, RegexSkip, RegexSubstitute,
    SkipRepeatedBlankLines, Stage, UpperCase,
};
