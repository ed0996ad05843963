//! Fuzz target for the request line parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_request_parse
//!
//! Every input must yield either a request or a rejection that renders as a
//! single JSON line.

#![no_main]

use hookgate_core::ipc::{ErrorResponse, Reply, parse_request};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    match parse_request(&line) {
        Ok(request) => {
            let _ = request.is_system();
        }
        Err(rejection) => {
            let reply = Reply::Error(ErrorResponse::from(rejection));
            assert!(!reply.to_line().contains('\n'));
        }
    }
});
