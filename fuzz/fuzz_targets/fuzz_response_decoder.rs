#![no_main]
use libfuzzer_sys::fuzz_target;

use feeder_hardware::modbus::decode_response;

fuzz_target!(|input: (u8, &[u8])| {
    let (count, frame) = input;
    // Arbitrary frames from the indicator must be rejected, never panic.
    if let Ok(regs) = decode_response(frame, u16::from(count)) {
        assert_eq!(regs.len(), usize::from(count));
    }
});
