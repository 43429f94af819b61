//! Mapping-string engine: binding values, logical elements, and the
//! parse/edit/serialize pipeline for the canonical `GUID,Name,key:value,...`
//! gamepad mapping format.
//!
//! # Architecture
//!
//! ```text
//! raw device events ──► calibration ──► [MappingParts editor] ──► canonical string
//!                                             ▲
//!                                       Binding encode/decode
//! ```
//!
//! The types here are synchronous and allocation-only; all I/O and event
//! plumbing lives in the `calibration`, `device`, and `store` modules.

pub mod binding;
pub mod element;
pub mod error;
pub mod parts;

pub use binding::Binding;
pub use element::Element;
pub use error::MappingError;
pub use parts::MappingParts;

/// Lowest standardized axis value reported by a device.
pub const AXIS_MIN: i32 = -32768;

/// Highest standardized axis value reported by a device.
pub const AXIS_MAX: i32 = 32767;

/// Snaps a raw axis value to one of the three standardized extremes.
///
/// Values beyond half range snap to the corresponding extreme, everything
/// else snaps to center.
pub fn standardize_axis_value(value: i32) -> i32 {
    if value > AXIS_MAX / 2 {
        AXIS_MAX
    } else if value < AXIS_MIN / 2 {
        AXIS_MIN
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardize_snaps_to_extremes() {
        assert_eq!(standardize_axis_value(20000), AXIS_MAX);
        assert_eq!(standardize_axis_value(-20000), AXIS_MIN);
        assert_eq!(standardize_axis_value(4000), 0);
        assert_eq!(standardize_axis_value(-4000), 0);
        assert_eq!(standardize_axis_value(AXIS_MAX / 2), 0);
        assert_eq!(standardize_axis_value(AXIS_MAX / 2 + 1), AXIS_MAX);
    }
}
