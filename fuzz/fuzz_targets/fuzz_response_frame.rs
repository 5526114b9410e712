#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lovelink::{decode_reading, decode_response, AckMode, Command, ControllerModel};

#[derive(Debug, Arbitrary)]
struct Input {
    stripped: bool,
    model_16a: bool,
    command: u8,
    decimal_points: u8,
    frame: Vec<u8>,
}

// Arbitrary response bytes must never panic the decoder.
fuzz_target!(|input: Input| {
    let ack = if input.stripped {
        AckMode::Stripped
    } else {
        AckMode::Preserved
    };
    let model = if input.model_16a {
        ControllerModel::M16A
    } else {
        ControllerModel::M1600
    };
    let command = Command::ALL[input.command as usize % Command::ALL.len()];

    if let Ok(payload) = decode_response(&input.frame, ack) {
        let _ = decode_reading(model, command, payload, input.decimal_points % 4);
    }
});
