//! Fuzz target for envelope decoding.
//!
//! Arbitrary bytes must never panic the decoder, and anything it accepts
//! must re-encode to a frame that is stable under another round.

#![no_main]

use framelink_proto::Envelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(envelope) = Envelope::decode(data) else {
        return;
    };

    assert!(!envelope.kind.is_empty(), "decoded envelope with empty kind");

    // Payload values may hold NaN, so compare frames rather than envelopes
    let frame = envelope.encode().expect("decoded envelope must re-encode");
    let again = Envelope::decode(&frame).expect("re-encoded envelope must decode");
    assert_eq!(frame, again.encode().expect("stable envelope must re-encode"));
});
