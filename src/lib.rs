//! sarx – record, replay and rewrite XML event streams.
//!
//! The crate is built around a SAX-style event model ([`SaxEvent`]) and a
//! single consumer trait ([`EventSink`]). On top of that:
//!
//! - [`EventBuffer`] records a stream and replays it any number of times.
//! - [`ParameterizedEventBuffer`] additionally turns `{name}` placeholders in
//!   text into parameters resolved at replay time.
//! - [`PassthroughFilter`] splices one document into another by dropping
//!   document boundaries and (optionally) the root element.
//! - [`InstrumentedStage`] measures per-stage processing time in a pipeline.
//! - [`TokenSubstitutingSink`] rewrites `~~` tokens in a byte stream with
//!   externally supplied content.
//!
//! # Beispiel
//!
//! ```
//! use sarx::{ParameterizedEventBuffer, Parameters, SaxEvent, EventSink, TextCollector};
//!
//! let mut template = ParameterizedEventBuffer::new();
//! template.process(&SaxEvent::characters("Hello {name}!")).unwrap();
//!
//! let params = Parameters::new().with_text("name", "World");
//! assert_eq!(template.to_text(&params), "Hello World!");
//!
//! let mut text = TextCollector::new();
//! template.to_sink(&mut text, &params).unwrap();
//! assert_eq!(text.as_str(), "Hello World!");
//! ```

pub mod buffer;
pub mod error;
pub mod event;
pub mod filter;
pub mod include;
pub mod param;
pub mod pipeline;
pub mod profile;
pub mod qname;
pub mod sink;
pub mod token_sink;
pub mod xml;
pub mod xml_serializer;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent, für interne Datenstrukturen).
pub type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Events
pub use event::{Attribute, DtdContent, ElementStart, PiContent, PrefixMapping, SaxEvent};
pub use qname::QName;
pub use sink::{EventSink, TextCollector};

// Public API: Buffers
pub use buffer::EventBuffer;
pub use param::{ParamValue, ParameterizedEventBuffer, Parameters};

// Public API: Pipeline stages
pub use filter::{FilterOptions, PassthroughFilter};
pub use pipeline::{BoxedSink, Pipeline};
pub use profile::{InstrumentedStage, ProfileReport, SharedReport, StageProfile};

// Public API: Byte output
pub use include::{FnResolver, INCLUDE_NAMESPACE, IncludeResolver, IncludingSerializer};
pub use token_sink::{DEFAULT_TOKEN, ReplacementList, TokenSubstitutingSink};
pub use xml::{ParseOptions, WhitespaceMode, parse_xml_file, parse_xml_reader, parse_xml_str};
pub use xml_serializer::{XmlSerializer, events_to_xml};
