#![no_main]
use libfuzzer_sys::fuzz_target;
use sarx::{EventBuffer, ParseOptions, events_to_xml};

fuzz_target!(|data: &[u8]| {
    let Ok(xml) = std::str::from_utf8(data) else {
        return;
    };
    let opts = ParseOptions::default();
    let Ok(events) = EventBuffer::from_xml_str(xml, &opts) else {
        return;
    };
    let mut copy = EventBuffer::new();
    events.to_sink(&mut copy).unwrap();
    assert_eq!(events, copy);
    // Serialisierung darf fehlschlagen (z.B. `--` im Kommentar), aber nicht paniken
    let _ = events_to_xml(&events);
});
