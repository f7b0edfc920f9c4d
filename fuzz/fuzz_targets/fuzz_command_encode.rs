//! Fuzzes CRT command framing with arbitrary names, arguments and packet sizes.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_command_encode
#![no_main]
use libfuzzer_sys::fuzz_target;
use strmctrl_protocol::CommandEncoder;

fuzz_target!(|data: &[u8]| {
    let Some((&size, rest)) = data.split_first() else {
        return;
    };
    let Some((&name_len, rest)) = rest.split_first() else {
        return;
    };
    let split = usize::from(name_len).min(rest.len());
    let (name, args) = rest.split_at(split);
    let Ok(name) = std::str::from_utf8(name) else {
        return;
    };

    let Ok(encoder) = CommandEncoder::new(usize::from(size)) else {
        return;
    };
    if let Ok(packet) = encoder.encode_raw(name, args) {
        assert_eq!(packet.len(), encoder.packet_size());
        assert!(packet.starts_with(b"CRT"));
    }
});
