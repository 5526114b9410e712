#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lovelink::{checksum, encode_request, TerminatorMode};

#[derive(Debug, Arbitrary)]
struct Input {
    address: u8,
    code: String,
    value: Option<f64>,
    decimal_points: u8,
}

// Any request that encodes must carry a valid checksum.
fuzz_target!(|input: Input| {
    let Ok(frame) = encode_request(
        input.address,
        &input.code,
        input.value,
        input.decimal_points % 4,
        TerminatorMode::SuppliedByTransport,
    ) else {
        return;
    };

    let bytes = frame.as_slice();
    let split = bytes.len() - 2;
    let expected = format!("{:02X}", checksum(&bytes[1..split]));
    assert_eq!(&bytes[split..], expected.as_bytes());
});
