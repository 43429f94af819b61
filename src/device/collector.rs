//! gilrs-backed raw event collector.
//!
//! Polls gilrs for input and converts everything from the selected gamepad
//! into [`DeviceEvent`]s on an mpsc channel. gilrs reports gamepad-level
//! controls, so the collector assigns them stable raw-style indices (sticks
//! and triggers as axes 0-5, the dpad as hat 0) for the calibration engine
//! to rediscover.

use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::device::{hat, DeviceEvent, DeviceProfile, RawEvent};

/// Number of raw axis slots the collector exposes.
const AXIS_SLOTS: usize = 6;

/// Number of raw button slots the collector exposes.
const BUTTON_SLOTS: usize = 15;

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("No gamepad connected")]
    NoGamepad,

    #[error("Failed to send event: {0}")]
    EventSendError(String),
}

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    // gilrs context
    gilrs: Gilrs,

    // Device the collector forwards events for
    active_gamepad: Option<GamepadId>,

    // Channel for sending events to the calibration engine
    event_sender: mpsc::Sender<DeviceEvent>,

    // Current hat 0 bitmask, rebuilt from dpad button events
    hat_state: u8,
}

impl EventCollector<Initializing> {
    pub fn create(event_sender: mpsc::Sender<DeviceEvent>) -> Result<Self, CollectorError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, None, event_sender, 0))
    }

    /// Selects the first connected gamepad and transitions to Collecting.
    pub fn initialize(mut self) -> Result<EventCollector<Collecting>, CollectorError> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected");
            return Err(CollectorError::NoGamepad);
        }

        info!("Found {} gamepads:", gamepads.len());
        for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
            info!(
                "  [{}] ID: {}, Name: {}, UUID: {:?}",
                idx,
                id,
                gamepad.name(),
                gamepad.uuid()
            );
        }

        let (id, gamepad) = &gamepads[0];
        info!("Selected gamepad: {} ({})", gamepad.name(), id);
        self.active_gamepad = Some(*id);

        Ok(self.transition())
    }
}

impl EventCollector<Collecting> {
    /// Profile of the selected gamepad for session construction.
    pub fn active_profile(&self) -> Option<DeviceProfile> {
        let id = self.active_gamepad?;
        let gamepad = self.gilrs.gamepad(id);
        Some(DeviceProfile {
            guid: hex_guid(&gamepad.uuid()),
            name: gamepad.name().to_string(),
            num_axes: AXIS_SLOTS,
            num_buttons: BUTTON_SLOTS,
            num_hats: 1,
            // gilrs normalizes rest positions to center.
            initial_axis_values: vec![0; AXIS_SLOTS],
        })
    }

    pub fn active_device(&self) -> Option<usize> {
        self.active_gamepad.map(usize::from)
    }

    /// Drains one gilrs event into the channel, if any is pending.
    pub fn collect_next_event(&mut self) -> Result<(), CollectorError> {
        let Some(Event { id, event, .. }) = self.gilrs.next_event() else {
            return Ok(());
        };

        if self.active_gamepad != Some(id) {
            debug!("Skipping event from non-active gamepad: {:?}", id);
            return Ok(());
        }

        debug!("Processing gilrs event: {:?}", event);
        let Some(raw_event) = self.convert_gilrs_event(event) else {
            return Ok(());
        };

        let device_event = DeviceEvent::now(usize::from(id), raw_event);
        match self.event_sender.try_send(device_event) {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to send event to calibration engine: {}", e);
                Err(CollectorError::EventSendError(e.to_string()))
            }
        }
    }

    /// Polls gilrs until the channel closes.
    pub fn run_collection_loop(&mut self) {
        info!("Starting event collector loop");
        loop {
            if self.event_sender.is_closed() {
                info!("Event channel closed, stopping collector");
                return;
            }
            if let Err(e) = self.collect_next_event() {
                warn!("Error collecting event: {}", e);
            }
            // Compromise between responsiveness and CPU usage.
            std::thread::sleep(std::time::Duration::from_micros(500));
        }
    }

    fn convert_gilrs_event(&mut self, event: EventType) -> Option<RawEvent> {
        match event {
            EventType::AxisChanged(axis, value, _) => {
                let index = axis_slot(axis)?;
                Some(RawEvent::AxisMotion {
                    axis: index,
                    value: (value.clamp(-1.0, 1.0) * 32767.0) as i16,
                })
            }
            EventType::ButtonPressed(button, _) => {
                if let Some(direction) = hat_bit(button) {
                    self.hat_state |= direction;
                    Some(RawEvent::HatMotion {
                        hat: 0,
                        mask: self.hat_state,
                    })
                } else {
                    Some(RawEvent::ButtonDown {
                        button: button_slot(button)?,
                    })
                }
            }
            EventType::ButtonReleased(button, _) => {
                if let Some(direction) = hat_bit(button) {
                    self.hat_state &= !direction;
                    Some(RawEvent::HatMotion {
                        hat: 0,
                        mask: self.hat_state,
                    })
                } else {
                    Some(RawEvent::ButtonUp {
                        button: button_slot(button)?,
                    })
                }
            }
            EventType::Disconnected => {
                warn!("Controller disconnected");
                Some(RawEvent::Removed)
            }
            _ => None,
        }
    }
}

/// Public interface for spawning and running the collector.
pub struct CollectorHandle {
    device: usize,
    profile: DeviceProfile,
}

impl CollectorHandle {
    /// Creates a collector, selects the first gamepad, and runs the polling
    /// loop on a blocking task. The loop ends when the receiver is dropped.
    pub fn spawn(
        event_sender: mpsc::Sender<DeviceEvent>,
    ) -> Result<Self, CollectorError> {
        let collector = EventCollector::create(event_sender)?;
        let mut collecting = collector.initialize()?;

        let profile = collecting.active_profile().ok_or(CollectorError::NoGamepad)?;
        let device = collecting.active_device().ok_or(CollectorError::NoGamepad)?;

        tokio::task::spawn_blocking(move || {
            collecting.run_collection_loop();
        });

        info!("Event collector started for {}", profile.name);
        Ok(Self { device, profile })
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }
}

fn hex_guid(uuid: &[u8; 16]) -> String {
    uuid.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn axis_slot(axis: Axis) -> Option<usize> {
    match axis {
        Axis::LeftStickX => Some(0),
        Axis::LeftStickY => Some(1),
        Axis::LeftZ => Some(2),
        Axis::RightStickX => Some(3),
        Axis::RightStickY => Some(4),
        Axis::RightZ => Some(5),
        _ => None,
    }
}

fn hat_bit(button: Button) -> Option<u8> {
    match button {
        Button::DPadUp => Some(hat::UP),
        Button::DPadRight => Some(hat::RIGHT),
        Button::DPadDown => Some(hat::DOWN),
        Button::DPadLeft => Some(hat::LEFT),
        _ => None,
    }
}

fn button_slot(button: Button) -> Option<usize> {
    match button {
        Button::South => Some(0),
        Button::East => Some(1),
        Button::West => Some(2),
        Button::North => Some(3),
        Button::Select => Some(4),
        Button::Mode => Some(5),
        Button::Start => Some(6),
        Button::LeftThumb => Some(7),
        Button::RightThumb => Some(8),
        Button::LeftTrigger => Some(9),
        Button::RightTrigger => Some(10),
        Button::LeftTrigger2 => Some(11),
        Button::RightTrigger2 => Some(12),
        Button::C => Some(13),
        Button::Z => Some(14),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_encoding_is_32_lowercase_hex_chars() {
        let uuid = [
            0x03, 0x00, 0xa1, 0xb2, 0xde, 0xad, 0xbe, 0xef, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        let guid = hex_guid(&uuid);
        assert_eq!(guid.len(), 32);
        assert_eq!(guid, "0300a1b2deadbeef0000000000000000");
    }

    #[test]
    fn dpad_buttons_fold_into_one_hat() {
        for button in [
            Button::DPadUp,
            Button::DPadRight,
            Button::DPadDown,
            Button::DPadLeft,
        ] {
            assert!(hat_bit(button).is_some());
            assert_eq!(button_slot(button), None);
        }
        assert_eq!(
            hat_bit(Button::DPadUp).unwrap() | hat_bit(Button::DPadLeft).unwrap(),
            hat::UP | hat::LEFT
        );
    }
}
