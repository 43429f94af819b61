//! Raw device capability surface consumed by the calibration engine.
//!
//! The engine never talks to a joystick backend directly. It sees a stream
//! of [`DeviceEvent`]s plus a static [`DeviceProfile`] describing the
//! device's raw controls; anything able to produce those can drive a
//! calibration session. The gilrs-backed [`collector`] is the production
//! source, tests feed events by hand.

pub mod collector;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Identifies one physical device for the lifetime of its connection.
pub type DeviceId = usize;

/// Static description of a device's raw controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// 32-hex-character device identity, checksum field included.
    pub guid: String,
    pub name: String,
    pub num_axes: usize,
    pub num_buttons: usize,
    pub num_hats: usize,
    /// Idle value reported per axis, used to seed excursion tracking.
    pub initial_axis_values: Vec<i16>,
}

impl DeviceProfile {
    /// Idle value for one axis; axes without a report idle at center.
    pub fn axis_initial(&self, axis: usize) -> i16 {
        self.initial_axis_values.get(axis).copied().unwrap_or(0)
    }
}

/// One raw input notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    AxisMotion { axis: usize, value: i16 },
    ButtonDown { button: usize },
    ButtonUp { button: usize },
    HatMotion { hat: usize, mask: u8 },
    /// Device disconnected; ends any active session for it.
    Removed,
}

/// Raw event tagged with device identity and arrival time.
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub device: DeviceId,
    pub event: RawEvent,
    pub timestamp: DateTime<Local>,
}

impl DeviceEvent {
    pub fn now(device: DeviceId, event: RawEvent) -> Self {
        Self {
            device,
            event,
            timestamp: Local::now(),
        }
    }
}

/// Hat direction bits, one per cardinal direction.
pub mod hat {
    pub const UP: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const DOWN: u8 = 0x04;
    pub const LEFT: u8 = 0x08;
}
