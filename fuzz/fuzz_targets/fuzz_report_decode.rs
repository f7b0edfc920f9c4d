//! Fuzzes the input report decoder.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_report_decode
#![no_main]
use libfuzzer_sys::fuzz_target;
use strmctrl_protocol::{CONTROL_OFFSET, ProtocolError, STATE_OFFSET, decode_control, decode_report};

fuzz_target!(|data: &[u8]| {
    // Must never panic on arbitrary bytes.
    let result = decode_report(data);
    match (data.get(CONTROL_OFFSET), data.get(STATE_OFFSET)) {
        (Some(&code), Some(&state)) => assert_eq!(result, decode_control(code, state)),
        _ => assert!(matches!(
            result,
            Err(ProtocolError::InvalidReportSize { .. })
        )),
    }
});
