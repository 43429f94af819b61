//! Interactive calibration: derives a mapping from raw joystick input.
//!
//! The synchronous heart is [`session::CalibrationSession`], which walks
//! the fixed binding order, filters raw events into binding candidates and
//! edits the mapping parts as candidates commit. [`engine`] wraps one
//! session in a tokio task with a statum-checked lifecycle and exposes the
//! control surface to callers.

pub mod axis;
pub mod engine;
pub mod session;

pub use engine::{CalibrationCommand, CalibrationHandle, CalibrationUpdate};
pub use session::{CalibrationSession, FlowActions, SessionUpdate};

use serde::{Deserialize, Serialize};

use crate::mapping::AXIS_MAX;

/// Tunable calibration thresholds.
///
/// The defaults come from field experience with noisy pads; they are
/// persisted alongside the mapping store so problem devices can be
/// accommodated without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Quiet period after a candidate before it commits, in milliseconds.
    /// Catches gamepads that fire several controls for one input.
    pub debounce_ms: u64,

    /// Axis samples moving less than this since the last sample are noise.
    pub jitter_limit: i32,

    /// How far an axis must travel from its starting value before it can
    /// become a candidate.
    pub excursion_threshold: i32,

    /// How close to the starting value the axis must return for the
    /// excursion-and-release gesture to count as finished.
    pub release_threshold: i32,

    /// Touchpad binding is skipped unless explicitly requested.
    pub bind_touchpad: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 30,
            // Some pads need a surprisingly large allowance here.
            jitter_limit: AXIS_MAX / 80,
            excursion_threshold: 16000,
            release_threshold: 10000,
            bind_touchpad: false,
        }
    }
}
