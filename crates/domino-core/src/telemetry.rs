// SPDX-License-Identifier: Apache-2.0

// Telemetry helpers for JSONL diagnostics when the `telemetry` feature is
// enabled. Manually formats JSON to keep serde out of the core; never
// touches sim state.

#[cfg(feature = "telemetry")]
fn ts_micros() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_micros()
}

#[cfg(feature = "telemetry")]
pub(crate) fn tick(tick_count: u32, ticks: u32) {
    use std::io::Write as _;
    let mut out = std::io::stdout().lock();
    let _ = write!(
        out,
        r#"{{"timestamp_micros":{},"event":"tick","tick_count":{},"ticks":{}}}"#,
        ts_micros(),
        tick_count,
        ticks
    );
    let _ = out.write_all(b"\n");
}

#[cfg(not(feature = "telemetry"))]
pub(crate) fn tick(_tick_count: u32, _ticks: u32) {}
