#![no_main]
use std::io::Write;

use libfuzzer_sys::fuzz_target;
use sarx::{ReplacementList, TokenSubstitutingSink};

fn run(chunks: &[&[u8]], tokens: usize) -> Option<Vec<u8>> {
    let list: ReplacementList = (0..tokens).map(|i| format!("<{i}>")).collect();
    let mut sink = TokenSubstitutingSink::new(Vec::new(), list);
    for chunk in chunks {
        sink.write_all(chunk).ok()?;
    }
    sink.finish().ok()
}

// Jede Aufteilung des Stroms muss dieselbe Ausgabe liefern.
fuzz_target!(|data: &[u8]| {
    let Some((&split, bytes)) = data.split_first() else {
        return;
    };
    let at = usize::from(split) % (bytes.len() + 1);
    let tokens = bytes.windows(2).filter(|w| *w == b"~~").count();

    let whole = run(&[bytes], tokens).expect("genug Ersetzungen");
    let parts = run(&[&bytes[..at], &bytes[at..]], tokens).expect("genug Ersetzungen");
    let bytewise: Vec<&[u8]> = bytes.chunks(1).collect();
    let single = run(&bytewise, tokens).expect("genug Ersetzungen");

    assert_eq!(whole, parts);
    assert_eq!(whole, single);
});
