//! Fuzz target: `ModemTimestamp::parse`
//!
//! Feeds arbitrary strings into the `AT+CCLK?` parser and asserts that it
//! never panics and that every accepted value converts to UTC within the
//! documented zone bound.
//!
//! cargo fuzz run fuzz_modem_timestamp

#![no_main]

use libfuzzer_sys::fuzz_target;
use waterpal::clock::ModemTimestamp;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(ts) = ModemTimestamp::parse(raw) {
        let tz = i64::from(ts.tz_quarter_hours());
        assert!(tz.abs() <= 56, "zone outside ±14 h accepted");
        assert_eq!(ts.utc_unix(), ts.local_unix() - tz * 15 * 60);
        let _ = ts.to_utc();
    }
});
