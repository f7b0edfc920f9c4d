//! Input report layout.
//!
//! Reports arrive on the inbound endpoint. Only two bytes carry meaning: the
//! raw control code at offset 9 and its state at offset 10. The leading bytes
//! are a fixed device header and are ignored.

use crate::table::decode_control;
use crate::types::Event;
use crate::{ProtocolError, ProtocolResult};

/// Byte offset of the raw control code.
pub const CONTROL_OFFSET: usize = 9;

/// Byte offset of the raw control state.
pub const STATE_OFFSET: usize = 10;

/// Shortest report that carries both control code and state.
pub const REPORT_MIN_LEN: usize = STATE_OFFSET + 1;

/// Decode a raw input report into an [`Event`].
///
/// # Errors
///
/// - [`ProtocolError::InvalidReportSize`] if `report` is shorter than [`REPORT_MIN_LEN`]
/// - [`ProtocolError::UnknownControl`] if the control code is not recognised
pub fn decode_report(report: &[u8]) -> ProtocolResult<Event> {
    let (Some(&code), Some(&state)) = (report.get(CONTROL_OFFSET), report.get(STATE_OFFSET))
    else {
        return Err(ProtocolError::InvalidReportSize {
            expected: REPORT_MIN_LEN,
            actual: report.len(),
        });
    };
    decode_control(code, state)
}
