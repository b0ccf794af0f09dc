//! Per-stage timing for event pipelines.
//!
//! An [`InstrumentedStage`] sits between a producer and its consumer. It
//! buffers one document (StartDocument..EndDocument), records how long the
//! producer took, then replays the buffer downstream. Because the replay is
//! timed separately, the producer's time never includes the consumer's.
//!
//! Stages share one [`ProfileReport`] through a [`SharedReport`] handed to
//! them at construction.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use serde_json::{Map, Value};

use crate::buffer::EventBuffer;
use crate::event::SaxEvent;
use crate::sink::EventSink;
use crate::Result;

/// Timing and captured output of one instrumented position.
#[derive(Debug, Clone, PartialEq)]
pub struct StageProfile {
    pub name: String,
    /// Zeit vom StartDocument bis EndDocument (None = kein Dokument gesehen).
    pub processing_time: Option<Duration>,
    /// Events, die diese Position passiert haben.
    pub fragment: Option<EventBuffer>,
}

/// Collected timings of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileReport {
    stages: Vec<StageProfile>,
    sink_time: Option<Duration>,
    capture_fragments: bool,
    /// Positionen, die gerade ein Dokument puffern.
    open: Vec<bool>,
}

/// Explicit context shared by the stages of one pipeline.
pub type SharedReport = Rc<RefCell<ProfileReport>>;

impl ProfileReport {
    pub fn new<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let stages: Vec<StageProfile> = names
            .into_iter()
            .map(|name| StageProfile {
                name: name.into(),
                processing_time: None,
                fragment: None,
            })
            .collect();
        let open = vec![false; stages.len()];
        Self {
            stages,
            sink_time: None,
            capture_fragments: true,
            open,
        }
    }

    /// Gepufferte Events pro Stage aufbewahren (Default: ja).
    pub fn with_capture_fragments(mut self, value: bool) -> Self {
        self.capture_fragments = value;
        self
    }

    pub fn shared(self) -> SharedReport {
        Rc::new(RefCell::new(self))
    }

    pub fn stages(&self) -> &[StageProfile] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> Option<&StageProfile> {
        self.stages.get(index)
    }

    /// Zeit, die der Consumer nach der letzten Stage fuer das Replay brauchte.
    pub fn sink_time(&self) -> Option<Duration> {
        self.sink_time
    }

    pub fn total_time(&self) -> Duration {
        self.stages
            .iter()
            .filter_map(|s| s.processing_time)
            .chain(self.sink_time)
            .sum()
    }

    /// First stage that saw StartDocument but not yet its EndDocument.
    ///
    /// Such a stage still holds its buffered events; nothing after it has
    /// received them.
    pub fn unterminated(&self) -> Option<&StageProfile> {
        self.open
            .iter()
            .position(|&open| open)
            .and_then(|i| self.stages.get(i))
    }

    fn set_open(&mut self, index: usize, value: bool) {
        if let Some(open) = self.open.get_mut(index) {
            *open = value;
        }
    }

    fn is_last(&self, index: usize) -> bool {
        index + 1 == self.stages.len()
    }

    /// Machine-readable form: `{"stages":[{"name":..,"time_us":..,"events":..}],"sink_us":..,"total_us":..}`.
    pub fn to_json(&self) -> String {
        let stages: Vec<Value> = self
            .stages
            .iter()
            .map(|stage| {
                let mut obj = Map::new();
                obj.insert("name".into(), Value::from(stage.name.as_str()));
                obj.insert(
                    "time_us".into(),
                    stage.processing_time.map_or(Value::Null, |d| Value::from(micros(d))),
                );
                if let Some(fragment) = &stage.fragment {
                    obj.insert("events".into(), Value::from(fragment.len()));
                }
                Value::Object(obj)
            })
            .collect();

        let mut root = Map::new();
        root.insert("stages".into(), Value::Array(stages));
        root.insert(
            "sink_us".into(),
            self.sink_time.map_or(Value::Null, |d| Value::from(micros(d))),
        );
        root.insert("total_us".into(), Value::from(micros(self.total_time())));
        Value::Object(root).to_string()
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>3}  {:<24} {:>12}  {:>8}", "#", "stage", "time", "events")?;
        for (i, stage) in self.stages.iter().enumerate() {
            let time = stage
                .processing_time
                .map_or_else(|| "-".to_string(), |d| format!("{:.3} ms", d.as_secs_f64() * 1e3));
            let events = stage
                .fragment
                .as_ref()
                .map_or_else(|| "-".to_string(), |b| b.len().to_string());
            writeln!(f, "{i:>3}  {:<24} {time:>12}  {events:>8}", stage.name)?;
        }
        if let Some(d) = self.sink_time {
            writeln!(f, "{:>3}  {:<24} {:>12}", "", "(sink)", format!("{:.3} ms", d.as_secs_f64() * 1e3))?;
        }
        write!(
            f,
            "{:>3}  {:<24} {:>12}",
            "",
            "total",
            format!("{:.3} ms", self.total_time().as_secs_f64() * 1e3)
        )
    }
}

enum State {
    Idle,
    Recording {
        started: Instant,
        buffer: EventBuffer,
        /// Verschachtelte StartDocument-Events (z.B. eingebettete Dokumente).
        nesting: usize,
    },
}

/// Buffers one document, times its production, then replays it downstream.
pub struct InstrumentedStage<S> {
    index: usize,
    report: SharedReport,
    downstream: S,
    state: State,
}

impl<S: EventSink> InstrumentedStage<S> {
    /// `index` ist die Position dieser Stage im `report`.
    pub fn new(index: usize, report: SharedReport, downstream: S) -> Self {
        Self {
            index,
            report,
            downstream,
            state: State::Idle,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, State::Recording { .. })
    }

    pub fn into_inner(self) -> S {
        self.downstream
    }

    fn end_document(&mut self, started: Instant, buffer: EventBuffer) -> Result<()> {
        let processing = started.elapsed();
        // Zeit vor dem Replay sichern: bleibt bei Fehlern downstream erhalten
        {
            let mut report = self.report.borrow_mut();
            report.set_open(self.index, false);
            if let Some(stage) = report.stages.get_mut(self.index) {
                stage.processing_time = Some(processing);
            }
        }
        trace!(
            "stage {} produced {} events in {processing:?}",
            self.index,
            buffer.len()
        );

        let replay_start = Instant::now();
        let result = buffer.to_sink(&mut self.downstream);
        let replay = replay_start.elapsed();

        let mut report = self.report.borrow_mut();
        if report.is_last(self.index) {
            report.sink_time = Some(replay);
        }
        let capture = report.capture_fragments;
        if let Some(stage) = report.stages.get_mut(self.index) {
            stage.fragment = capture.then_some(buffer);
        }
        if let Err(e) = &result {
            debug!("replay after stage {} failed: {e}", self.index);
        }
        result
    }
}

impl<S: EventSink> EventSink for InstrumentedStage<S> {
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        match (&mut self.state, event) {
            (State::Idle, SaxEvent::StartDocument) => {
                let mut buffer = EventBuffer::new();
                buffer.push(event.clone());
                self.report.borrow_mut().set_open(self.index, true);
                self.state = State::Recording {
                    started: Instant::now(),
                    buffer,
                    nesting: 0,
                };
                Ok(())
            }
            (State::Recording { buffer, nesting, .. }, SaxEvent::StartDocument) => {
                *nesting += 1;
                buffer.push(event.clone());
                Ok(())
            }
            (State::Recording { buffer, nesting, .. }, SaxEvent::EndDocument) if *nesting > 0 => {
                *nesting -= 1;
                buffer.push(event.clone());
                Ok(())
            }
            (State::Recording { .. }, SaxEvent::EndDocument) => {
                let State::Recording { started, mut buffer, .. } =
                    std::mem::replace(&mut self.state, State::Idle)
                else {
                    return Ok(());
                };
                buffer.push(event.clone());
                self.end_document(started, buffer)
            }
            (State::Recording { buffer, .. }, _) => {
                buffer.push(event.clone());
                Ok(())
            }
            (State::Idle, _) => {
                if event.is_lexical() && !self.downstream.accepts_lexical() {
                    return Ok(());
                }
                self.downstream.process(event)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::qname::QName;

    fn doc() -> Vec<SaxEvent> {
        vec![
            SaxEvent::StartDocument,
            SaxEvent::start_element(QName::new("", "r")),
            SaxEvent::characters("x"),
            SaxEvent::end_element(QName::new("", "r")),
            SaxEvent::EndDocument,
        ]
    }

    /// Sink, der nach `limit` Events ablehnt und mitzaehlt, was er gesehen hat.
    struct Failing {
        seen: usize,
        limit: usize,
    }

    impl EventSink for Failing {
        fn process(&mut self, _event: &SaxEvent) -> Result<()> {
            if self.seen == self.limit {
                return Err(Error::sink_failed("limit"));
            }
            self.seen += 1;
            Ok(())
        }
    }

    /// Vor EndDocument erreicht nichts den Downstream.
    #[test]
    fn puffert_bis_end_document() {
        let report = ProfileReport::new(["source"]).shared();
        let mut stage = InstrumentedStage::new(0, Rc::clone(&report), Vec::new());
        let events = doc();
        for ev in &events[..4] {
            stage.process(ev).unwrap();
        }
        assert!(stage.is_recording());
        stage.process(&events[4]).unwrap();
        assert!(!stage.is_recording());
        assert_eq!(stage.into_inner(), events);

        let report = report.borrow();
        let profile = report.stage(0).unwrap();
        assert!(profile.processing_time.is_some());
        assert_eq!(profile.fragment.as_ref().map(EventBuffer::len), Some(5));
        // Einzige Stage ist auch die letzte: Sink-Zeit gemessen
        assert!(report.sink_time().is_some());
    }

    #[test]
    fn sink_zeit_nur_fuer_letzte_stage() {
        let report = ProfileReport::new(["a", "b"]).shared();
        let mut stage = InstrumentedStage::new(0, Rc::clone(&report), Vec::new());
        for ev in doc() {
            stage.process(&ev).unwrap();
        }
        assert!(report.borrow().sink_time().is_none());
        assert!(report.borrow().stage(1).unwrap().processing_time.is_none());
    }

    /// Fehler beim Replay: Zeiten und Fragment bleiben im Report.
    #[test]
    fn fehler_beim_replay_behaelt_messung() {
        let report = ProfileReport::new(["only"]).shared();
        let mut stage = InstrumentedStage::new(0, Rc::clone(&report), Failing { seen: 0, limit: 2 });
        let events = doc();
        for ev in &events[..4] {
            stage.process(ev).unwrap();
        }
        let err = stage.process(&events[4]).unwrap_err();
        assert!(matches!(err, Error::SinkFailed(_)));
        assert_eq!(stage.into_inner().seen, 2);

        let report = report.borrow();
        assert!(report.stage(0).unwrap().processing_time.is_some());
        assert!(report.stage(0).unwrap().fragment.is_some());
    }

    /// Langsamer Consumer: seine Zeit landet in `sink_time`, nicht bei der Stage.
    #[test]
    fn produktion_und_konsum_getrennt_gemessen() {
        struct Slow(Vec<SaxEvent>);
        impl EventSink for Slow {
            fn process(&mut self, event: &SaxEvent) -> Result<()> {
                if matches!(event, SaxEvent::EndDocument) {
                    std::thread::sleep(Duration::from_millis(20));
                }
                self.0.push(event.clone());
                Ok(())
            }
        }

        let report = ProfileReport::new(["source"]).shared();
        let mut stage = InstrumentedStage::new(0, Rc::clone(&report), Slow(Vec::new()));
        for ev in doc() {
            stage.process(&ev).unwrap();
        }
        assert_eq!(stage.into_inner().0, doc());

        let report = report.borrow();
        let sink = report.sink_time().unwrap();
        let produced = report.stage(0).unwrap().processing_time.unwrap();
        assert!(sink >= Duration::from_millis(20), "{sink:?}");
        assert!(produced < Duration::from_millis(20), "{produced:?}");
        assert!(report.total_time() >= sink + produced);
    }

    /// Ohne EndDocument bleibt die Stage offen und der Report meldet das.
    #[test]
    fn offenes_dokument_im_report() {
        let report = ProfileReport::new(["a", "b"]).shared();
        let mut stage = InstrumentedStage::new(1, Rc::clone(&report), Vec::new());
        let events = doc();
        for ev in &events[..4] {
            stage.process(ev).unwrap();
        }
        assert_eq!(report.borrow().unterminated().map(|s| s.name.as_str()), Some("b"));

        stage.process(&events[4]).unwrap();
        assert!(report.borrow().unterminated().is_none());
    }

    /// Events ausserhalb eines Dokuments werden direkt weitergereicht.
    #[test]
    fn idle_leitet_direkt_weiter() {
        let report = ProfileReport::new(["s"]).shared();
        let mut stage = InstrumentedStage::new(0, report, Vec::new());
        stage.process(&SaxEvent::characters("a")).unwrap();
        assert_eq!(stage.into_inner(), vec![SaxEvent::characters("a")]);
    }

    #[test]
    fn verschachtelte_dokumente() {
        let report = ProfileReport::new(["s"]).shared();
        let mut stage = InstrumentedStage::new(0, report, Vec::new());
        let events = [
            SaxEvent::StartDocument,
            SaxEvent::StartDocument,
            SaxEvent::EndDocument,
            SaxEvent::EndDocument,
        ];
        for ev in &events[..3] {
            stage.process(ev).unwrap();
        }
        assert!(stage.is_recording());
        stage.process(&events[3]).unwrap();
        assert_eq!(stage.into_inner(), events.to_vec());
    }

    #[test]
    fn fragmente_abschaltbar() {
        let report = ProfileReport::new(["s"]).with_capture_fragments(false).shared();
        let mut stage = InstrumentedStage::new(0, Rc::clone(&report), Vec::new());
        for ev in doc() {
            stage.process(&ev).unwrap();
        }
        assert!(report.borrow().stage(0).unwrap().fragment.is_none());
    }

    #[test]
    fn json_und_tabelle() {
        let mut report = ProfileReport::new(["source", "filter"]);
        report.stages[0].processing_time = Some(Duration::from_micros(1500));
        report.sink_time = Some(Duration::from_micros(500));

        let json: Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(json["stages"][0]["name"], "source");
        assert_eq!(json["stages"][0]["time_us"], 1500);
        assert!(json["stages"][1]["time_us"].is_null());
        assert_eq!(json["total_us"], 2000);

        let table = report.to_string();
        assert!(table.contains("source"), "{table}");
        assert!(table.contains("1.500 ms"), "{table}");
        assert!(table.contains("total"), "{table}");
    }
}
