#![no_main]
use libfuzzer_sys::fuzz_target;
use sarx::{EventSink, ParameterizedEventBuffer, Parameters, SaxEvent};

// Erstes Byte = Split-Position; Ergebnis muss unabhaengig von der Aufteilung sein.
fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let Ok(text) = std::str::from_utf8(rest) else {
        return;
    };
    let mut at = usize::from(split) % (text.len() + 1);
    while !text.is_char_boundary(at) {
        at -= 1;
    }

    let params = Parameters::new().with_text("a", "A").with_text("", "E");

    let mut whole = ParameterizedEventBuffer::new();
    whole.process(&SaxEvent::characters(text)).unwrap();

    let mut split_buf = ParameterizedEventBuffer::new();
    split_buf.process(&SaxEvent::characters(&text[..at])).unwrap();
    split_buf.process(&SaxEvent::characters(&text[at..])).unwrap();

    assert_eq!(whole.to_text(&params), split_buf.to_text(&params));
});
