//! Pipeline composition and execution.
//!
//! A [`Pipeline`] holds sources, stages and sinks in declaration order.
//! Elements are routed to the right list by their [`Role`], either through
//! [`Pipeline::pipe`] or the `|` operator:
//!
//! ```
//! use linepipes::{RegexKeep, StringSink, StringSource};
//!
//! let sink = StringSink::new();
//! let mut pipeline = StringSource::new("ERROR: a\nok\nERROR: b")
//!     | RegexKeep::new(".*ERROR.*").unwrap()
//!     | sink.clone();
//! pipeline.run().unwrap();
//! assert_eq!(sink.contents(), "ERROR: a\nERROR: b\n");
//! ```

use std::fmt;
use std::fmt::Display;
use std::ops::{BitOr, BitOrAssign};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::{self, Flow};
use crate::record::{Payload, Record};
use crate::sink::{FileSink, JsonSink, Sink, StdoutSink, StringSink};
use crate::source::{
    FileSource, FolderSource, GlobSource, LineHandler, Source, StringSource, StringsSource,
};
use crate::stage::{
    AddMetadata, Filter, LowerCase, Map, PassThrough, RegexKeep, RegexSkip, RegexSubstitute,
    SkipRepeatedBlankLines, Stage, UpperCase,
};

/// The capability an element contributes to a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Stage,
    Sink,
    Pipeline,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Source => "source",
            Role::Stage => "stage",
            Role::Sink => "sink",
            Role::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

/// Anything that can be added to a pipeline, tagged with its role.
pub enum Element<D = String> {
    Source(Box<dyn Source<D>>),
    Stage(Box<dyn Stage<D>>),
    Sink(Box<dyn Sink<D>>),
    Pipeline(Pipeline<D>),
}

impl<D> Element<D> {
    pub fn source(source: impl Source<D> + 'static) -> Self {
        Element::Source(Box::new(source))
    }

    pub fn stage(stage: impl Stage<D> + 'static) -> Self {
        Element::Stage(Box::new(stage))
    }

    pub fn sink(sink: impl Sink<D> + 'static) -> Self {
        Element::Sink(Box::new(sink))
    }

    pub fn role(&self) -> Role {
        match self {
            Element::Source(_) => Role::Source,
            Element::Stage(_) => Role::Stage,
            Element::Sink(_) => Role::Sink,
            Element::Pipeline(_) => Role::Pipeline,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Element::Source(s) => s.name(),
            Element::Stage(s) => s.name(),
            Element::Sink(s) => s.name(),
            Element::Pipeline(_) => "pipeline",
        }
    }
}

impl<D> fmt::Debug for Element<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("role", &self.role())
            .field("name", &self.name())
            .finish()
    }
}

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Nothing added yet.
    #[default]
    Empty,
    /// At least one element added; ready to run.
    Configured,
    /// Inside [`Pipeline::run`].
    Running,
    /// A run completed, successfully or not. Running again starts over.
    Finished,
}

/// Sources, stages and sinks wired together.
pub struct Pipeline<D = String> {
    sources: Vec<Box<dyn Source<D>>>,
    stages: Vec<Box<dyn Stage<D>>>,
    sinks: Vec<Box<dyn Sink<D>>>,
    pipelines: Vec<Pipeline<D>>,
    state: PipelineState,
}

impl<D> Default for Pipeline<D> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            stages: Vec::new(),
            sinks: Vec::new(),
            pipelines: Vec::new(),
            state: PipelineState::Empty,
        }
    }
}

impl Pipeline {
    /// An empty text pipeline. Use `Pipeline::default()` for other payloads.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D> Pipeline<D> {
    fn configured(&mut self) -> &mut Self {
        if self.state == PipelineState::Empty {
            self.state = PipelineState::Configured;
        }
        self
    }

    pub fn add_source(&mut self, source: impl Source<D> + 'static) -> &mut Self {
        self.sources.push(Box::new(source));
        self.configured()
    }

    pub fn add_stage(&mut self, stage: impl Stage<D> + 'static) -> &mut Self {
        self.stages.push(Box::new(stage));
        self.configured()
    }

    pub fn add_sink(&mut self, sink: impl Sink<D> + 'static) -> &mut Self {
        self.sinks.push(Box::new(sink));
        self.configured()
    }

    /// Register a sub-pipeline. It is stored for the caller to manage and
    /// is never run by this pipeline.
    pub fn add_pipeline(&mut self, pipeline: Pipeline<D>) -> &mut Self {
        self.pipelines.push(pipeline);
        self.configured()
    }

    /// Route an element to the list matching its role.
    pub fn push(&mut self, element: impl Into<Element<D>>) -> &mut Self {
        let element = element.into();
        debug!(role = %element.role(), name = element.name(), "adding pipeline element");
        match element {
            Element::Source(s) => self.sources.push(s),
            Element::Stage(s) => self.stages.push(s),
            Element::Sink(s) => self.sinks.push(s),
            Element::Pipeline(p) => self.pipelines.push(p),
        }
        self.configured()
    }

    /// Builder form of [`Pipeline::push`].
    pub fn pipe(mut self, element: impl Into<Element<D>>) -> Self {
        self.push(element);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn pipelines(&self) -> &[Pipeline<D>] {
        &self.pipelines
    }

    pub fn pipelines_mut(&mut self) -> &mut [Pipeline<D>] {
        &mut self.pipelines
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// The lazy record stream leaving the last stage, without any sink.
    ///
    /// Sources are not opened first; each starts its own stream when
    /// reached.
    pub fn records(&mut self) -> Flow<'_, D> {
        executor::flow(&mut self.sources, &mut self.stages)
    }

    /// Run every record from every source through the stages into every
    /// sink, returning how many records reached the sinks.
    ///
    /// All sources and then all sinks are opened before the first record
    /// is read. Whatever was opened is closed again in reverse order, even
    /// when opening, reading, transforming or writing fails. The first
    /// error of the run is returned; close errors only surface when the
    /// run itself succeeded.
    pub fn run(&mut self) -> Result<usize> {
        info!(
            sources = self.sources.len(),
            stages = self.stages.len(),
            sinks = self.sinks.len(),
            "pipeline run starting"
        );
        self.state = PipelineState::Running;

        let outcome = self.acquire().and_then(|()| {
            let result = self.drive();
            let released = self.release(self.sources.len(), self.sinks.len());
            match (result, released) {
                (Ok(count), released) => released.map(|()| count),
                (Err(e), Err(close_err)) => {
                    warn!(error = %close_err, "release failed after pipeline error");
                    Err(e)
                }
                (Err(e), Ok(())) => Err(e),
            }
        });

        self.state = PipelineState::Finished;
        match &outcome {
            Ok(count) => info!(records = count, "pipeline run finished"),
            Err(e) => warn!(error = %e, "pipeline run failed"),
        }
        outcome
    }

    /// Open sources then sinks in declaration order. On failure, close
    /// what was already opened and return the open error.
    fn acquire(&mut self) -> Result<()> {
        for i in 0..self.sources.len() {
            debug!(source = self.sources[i].name(), "opening source");
            if let Err(e) = self.sources[i].open() {
                self.release_after_failure(i, 0);
                return Err(e);
            }
        }
        for i in 0..self.sinks.len() {
            debug!(sink = self.sinks[i].name(), "opening sink");
            if let Err(e) = self.sinks[i].open() {
                self.release_after_failure(self.sources.len(), i);
                return Err(e);
            }
        }
        Ok(())
    }

    fn release_after_failure(&mut self, sources: usize, sinks: usize) {
        if let Err(e) = self.release(sources, sinks) {
            warn!(error = %e, "release failed after open error");
        }
    }

    /// Close the first `sinks` sinks and the first `sources` sources, in
    /// reverse order of opening. Every close is attempted; the first
    /// failure is returned.
    fn release(&mut self, sources: usize, sinks: usize) -> Result<()> {
        let mut first = None;
        let sinks = self.sinks[..sinks]
            .iter_mut()
            .rev()
            .map(|s| (s.name().to_string(), s.close()));
        let sources = self.sources[..sources]
            .iter_mut()
            .rev()
            .map(|s| (s.name().to_string(), s.close()));
        for (name, closed) in sinks.chain(sources) {
            debug!(element = %name, "released");
            if let Err(e) = closed {
                if first.is_none() {
                    first = Some(e);
                } else {
                    warn!(element = %name, error = %e, "close failed");
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn drive(&mut self) -> Result<usize> {
        let Self {
            sources,
            stages,
            sinks,
            ..
        } = self;
        let mut count = 0;
        for record in executor::flow(sources, stages) {
            let record = record?;
            for sink in sinks.iter_mut() {
                sink.write(&record)?;
            }
            count += 1;
        }
        Ok(count)
    }
}

fn joined<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(" | ")
}

impl<D> fmt::Debug for Pipeline<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("sources", &joined(self.sources.iter().map(|s| s.name())))
            .field("stages", &joined(self.stages.iter().map(|s| s.name())))
            .field("sinks", &joined(self.sinks.iter().map(|s| s.name())))
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}

impl<D> From<Pipeline<D>> for Element<D> {
    fn from(pipeline: Pipeline<D>) -> Self {
        Element::Pipeline(pipeline)
    }
}

impl<D, T: Into<Element<D>>> BitOr<T> for Pipeline<D> {
    type Output = Pipeline<D>;

    fn bitor(self, rhs: T) -> Pipeline<D> {
        self.pipe(rhs)
    }
}

impl<D, T: Into<Element<D>>> BitOrAssign<T> for Pipeline<D> {
    fn bitor_assign(&mut self, rhs: T) {
        self.push(rhs);
    }
}

/// Start a pipeline from any source.
pub trait SourceExt<D>: Source<D> + Sized + 'static {
    /// Wrap this source in a new pipeline and add `next` to it.
    fn pipe(self, next: impl Into<Element<D>>) -> Pipeline<D> {
        Pipeline::default().pipe(Element::source(self)).pipe(next)
    }
}

impl<D, S: Source<D> + 'static> SourceExt<D> for S {}

// ---------------------------------------------------------------------------
// Element conversions for the built-in types
// ---------------------------------------------------------------------------

/// Text sources convert into elements and start a pipeline with `|`.
macro_rules! text_sources {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Element {
                fn from(source: $ty) -> Self {
                    Element::Source(Box::new(source))
                }
            }

            impl<T: Into<Element>> BitOr<T> for $ty {
                type Output = Pipeline;

                fn bitor(self, rhs: T) -> Pipeline {
                    Pipeline::new().pipe(self).pipe(rhs)
                }
            }
        )*
    };
}

text_sources!(
    FileSource,
    FolderSource,
    GlobSource,
    LineHandler,
    StringSource,
    StringsSource,
);

macro_rules! text_stages {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Element {
                fn from(stage: $ty) -> Self {
                    Element::Stage(Box::new(stage))
                }
            }
        )*
    };
}

text_stages!(
    UpperCase,
    LowerCase,
    AddMetadata,
    RegexKeep,
    RegexSkip,
    RegexSubstitute,
    SkipRepeatedBlankLines,
);

impl<D> From<PassThrough> for Element<D> {
    fn from(stage: PassThrough) -> Self {
        Element::Stage(Box::new(stage))
    }
}

impl<D, F> From<Map<F>> for Element<D>
where
    D: Payload,
    F: FnMut(&Record<D>) -> D + 'static,
{
    fn from(stage: Map<F>) -> Self {
        Element::Stage(Box::new(stage))
    }
}

impl<D, F> From<Filter<F>> for Element<D>
where
    F: FnMut(&Record<D>) -> bool + 'static,
{
    fn from(stage: Filter<F>) -> Self {
        Element::Stage(Box::new(stage))
    }
}

macro_rules! display_sinks {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<D: Display> From<$ty> for Element<D> {
                fn from(sink: $ty) -> Self {
                    Element::Sink(Box::new(sink))
                }
            }
        )*
    };
}

display_sinks!(StdoutSink, FileSink, StringSink);

impl<D: Serialize> From<JsonSink> for Element<D> {
    fn from(sink: JsonSink) -> Self {
        Element::Sink(Box::new(sink))
    }
}
