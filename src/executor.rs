//! Record-at-a-time pipeline executor.
//!
//! Pulls one record from the sources, pushes it through the entire stage
//! chain, hands the survivors to the caller and only then reads the next
//! record. Nothing is materialized beyond the fan-out of a single input
//! record, so memory use does not grow with the length of the stream.

use std::collections::VecDeque;
use std::slice::IterMut;

use crate::error::Result;
use crate::record::Record;
use crate::source::{RecordStream, Source};
use crate::stage::Stage;

/// Push records through a slice of stages, processing each record
/// through each stage in sequence.
fn push_through_stages<D>(
    records: Vec<Record<D>>,
    stages: &mut [Box<dyn Stage<D>>],
) -> Result<Vec<Record<D>>> {
    let mut current = records;
    for stage in stages.iter_mut() {
        let mut next = Vec::new();
        for r in current {
            next.extend(stage.transform(r)?);
        }
        current = next;
    }
    Ok(current)
}

/// Concatenation of source streams in declaration order.
///
/// A source's stream is only started once the previous one is exhausted.
struct SourceChain<'a, D> {
    sources: IterMut<'a, Box<dyn Source<D>>>,
    current: Option<RecordStream<D>>,
}

impl<D> Iterator for SourceChain<'_, D> {
    type Item = Result<Record<D>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(stream) = self.current.as_mut() {
                match stream.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            let source = self.sources.next()?;
            match source.stream() {
                Ok(stream) => self.current = Some(stream),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Lazy stream of records leaving the last stage.
///
/// The first error ends the stream.
pub struct Flow<'a, D = String> {
    input: SourceChain<'a, D>,
    stages: &'a mut [Box<dyn Stage<D>>],
    pending: VecDeque<Record<D>>,
    failed: bool,
}

impl<D> Iterator for Flow<'_, D> {
    type Item = Result<Record<D>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.failed {
                return None;
            }
            let pushed = self
                .input
                .next()?
                .and_then(|record| push_through_stages(vec![record], self.stages));
            match pushed {
                Ok(out) => self.pending.extend(out),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Compose sources and stages into one lazy stream.
pub fn flow<'a, D>(
    sources: &'a mut [Box<dyn Source<D>>],
    stages: &'a mut [Box<dyn Stage<D>>],
) -> Flow<'a, D> {
    Flow {
        input: SourceChain {
            sources: sources.iter_mut(),
            current: None,
        },
        stages,
        pending: VecDeque::new(),
        failed: false,
    }
}
