//! Fuzz target: AT payload splitting and the reply parsers built on it.
//!
//! cargo fuzz run fuzz_at_fields

#![no_main]

use libfuzzer_sys::fuzz_target;
use waterpal::modem::BatteryInfo;
use waterpal::modem::at::fields;
use waterpal::modem::gnss::parse_cgnsinf;
use waterpal::modem::messages::parse_inbox;

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = core::str::from_utf8(data) else {
        return;
    };
    let f = fields(payload);
    assert!(f.len() <= payload.len() + 1);
    let _ = BatteryInfo::parse(payload);
    let _ = parse_cgnsinf(payload);
    let lines: Vec<String> = payload.lines().map(str::to_owned).collect();
    let _ = parse_inbox(&lines);
});
