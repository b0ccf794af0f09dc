//! Pipeline driver: source buffer → stages → sink.
//!
//! Stages are given as factories that wrap the next consumer. With profiling
//! enabled the driver inserts an [`InstrumentedStage`] after the source and
//! after every stage and hands each of them the same [`SharedReport`].

use std::rc::Rc;

use log::debug;

use crate::buffer::EventBuffer;
use crate::filter::{FilterOptions, PassthroughFilter};
use crate::profile::{InstrumentedStage, ProfileReport, SharedReport};
use crate::sink::EventSink;
use crate::{Error, Result};

/// Boxed consumer as passed between stages.
pub type BoxedSink<'a> = Box<dyn EventSink + 'a>;

type StageFactory<'a> = Box<dyn FnOnce(BoxedSink<'a>) -> BoxedSink<'a> + 'a>;

/// Name der Position direkt hinter der Quelle im Report.
const SOURCE_NAME: &str = "source";

/// Builder for a linear event pipeline.
///
/// ```
/// use sarx::{EventBuffer, FilterOptions, ParseOptions, Pipeline, SaxEvent};
///
/// let source = EventBuffer::from_xml_str("<r><c/></r>", &ParseOptions::default()).unwrap();
/// let mut out: Vec<SaxEvent> = Vec::new();
/// let report = Pipeline::new()
///     .filter("strip-root", FilterOptions::default().with_suppress_root_element(true))
///     .profiled(true)
///     .run(&source, &mut out)
///     .unwrap()
///     .unwrap();
/// assert_eq!(out.len(), 2);
/// assert_eq!(report.stages().len(), 2);
/// ```
pub struct Pipeline<'a> {
    stages: Vec<(String, StageFactory<'a>)>,
    profiled: bool,
    capture_fragments: bool,
}

impl Default for Pipeline<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            profiled: false,
            capture_fragments: true,
        }
    }

    /// Haengt eine Stage an. `factory` bekommt den naechsten Consumer.
    pub fn stage<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce(BoxedSink<'a>) -> BoxedSink<'a> + 'a,
    {
        self.stages.push((name.into(), Box::new(factory)));
        self
    }

    /// Haengt einen [`PassthroughFilter`] an.
    pub fn filter(self, name: impl Into<String>, options: FilterOptions) -> Self {
        self.stage(name, move |next| Box::new(PassthroughFilter::new(next, options)))
    }

    /// Instrumentierung einschalten: `run` liefert dann einen Report.
    pub fn profiled(mut self, value: bool) -> Self {
        self.profiled = value;
        self
    }

    /// Gepufferte Events pro Stage im Report behalten.
    pub fn capture_fragments(mut self, value: bool) -> Self {
        self.capture_fragments = value;
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Replays `source` through all stages into `sink`.
    ///
    /// Returns the report when profiling is enabled. If a stage fails the
    /// error is returned; the partial report is logged at debug level.
    ///
    /// A profiled run over a source whose document never ends fails with
    /// [`Error::UnterminatedDocument`]: the instrumented stages would
    /// otherwise keep the buffered events to themselves.
    pub fn run<S: EventSink + 'a>(self, source: &EventBuffer, sink: S) -> Result<Option<ProfileReport>> {
        let report: Option<SharedReport> = self.profiled.then(|| {
            let names = std::iter::once(SOURCE_NAME.to_string())
                .chain(self.stages.iter().map(|(name, _)| name.clone()));
            ProfileReport::new(names)
                .with_capture_fragments(self.capture_fragments)
                .shared()
        });

        // Von hinten aufbauen: jede Factory bekommt den bereits fertigen Rest
        let mut head: BoxedSink<'a> = Box::new(sink);
        for (i, (name, factory)) in self.stages.into_iter().enumerate().rev() {
            if let Some(report) = &report {
                head = Box::new(InstrumentedStage::new(i + 1, Rc::clone(report), head));
            }
            debug!("pipeline stage {i}: {name}");
            head = factory(head);
        }
        if let Some(report) = &report {
            head = Box::new(InstrumentedStage::new(0, Rc::clone(report), head));
        }

        let result = source.to_sink(&mut head).and_then(|()| match &report {
            Some(shared) => match shared.borrow().unterminated() {
                Some(stage) => Err(Error::UnterminatedDocument {
                    stage: stage.name.clone(),
                }),
                None => Ok(()),
            },
            None => Ok(()),
        });
        drop(head);

        let report = report.map(|shared| match Rc::try_unwrap(shared) {
            Ok(cell) => cell.into_inner(),
            Err(shared) => shared.borrow().clone(),
        });
        match result {
            Ok(()) => Ok(report),
            Err(e) => {
                if let Some(report) = &report {
                    debug!("pipeline aborted: {e}\n{report}");
                }
                Err(e)
            }
        }
    }
}
