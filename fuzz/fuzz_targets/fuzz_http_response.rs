//! Fuzz target: `telemetry::http::parse_response`
//!
//! Drives arbitrary bytes through the HTTP response parser (status line,
//! headers, content-length and chunked bodies) and asserts that it never
//! panics and never yields a body longer than its declared length.
//!
//! cargo fuzz run fuzz_http_response

#![no_main]

use libfuzzer_sys::fuzz_target;
use waterpal::telemetry::http::parse_response;

fuzz_target!(|data: &[u8]| {
    if let Ok(response) = parse_response(data) {
        assert!((100..1000).contains(&response.status));
        if let Some(len) = response.content_length {
            if !response.chunked {
                assert_eq!(response.body.len(), len);
            }
        }
        assert!(response.body.len() <= data.len());
    }
});
