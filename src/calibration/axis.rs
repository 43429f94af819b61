//! Per-physical-axis excursion tracking.
//!
//! An axis becomes a binding candidate through the excursion-and-release
//! gesture: pushed far from its starting value, then returned near it.
//! This lets the user flick a stick instead of holding it at the extreme,
//! and keeps drifting or noisy axes from binding themselves.

use tracing::debug;

use crate::calibration::SessionSettings;

/// Tracking record for one physical axis during calibration.
#[derive(Debug, Clone)]
pub struct AxisState {
    moving: bool,
    last_value: i32,
    starting_value: i32,
    farthest_value: i32,
    initial_value: i32,
}

/// Raw candidate emitted once an axis has travelled far enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisCandidate {
    pub starting_value: i32,
    pub farthest_value: i32,
    /// True once the axis has returned near its starting value.
    pub committed: bool,
}

impl AxisState {
    /// `initial` is the device-reported idle value for this axis, which
    /// seeds the starting point once the axis first moves.
    pub fn new(initial: i16) -> Self {
        let initial = i32::from(initial);
        Self {
            moving: false,
            last_value: 0,
            starting_value: initial,
            farthest_value: initial,
            initial_value: initial,
        }
    }

    /// Forgets accumulated excursion when the calibration target changes.
    pub fn retarget(&mut self) {
        self.farthest_value = self.starting_value;
    }

    /// Feeds one motion sample. Returns a candidate while the excursion
    /// threshold is met; the candidate upgrades to committed when the
    /// release half of the gesture completes.
    pub fn track(&mut self, value: i32, settings: &SessionSettings) -> Option<AxisCandidate> {
        if !self.moving {
            self.moving = true;
            self.last_value = value;
            self.starting_value = self.initial_value;
            self.farthest_value = self.initial_value;
        } else if (value - self.last_value).abs() <= settings.jitter_limit {
            return None;
        } else {
            self.last_value = value;
        }

        let current_distance = (value - self.starting_value).abs();
        let mut farthest_distance = (self.farthest_value - self.starting_value).abs();
        if current_distance > farthest_distance {
            self.farthest_value = value;
            farthest_distance = current_distance;
        }

        debug!(
            value,
            current_distance, farthest_distance, "axis motion tracked"
        );

        if farthest_distance >= settings.excursion_threshold {
            Some(AxisCandidate {
                starting_value: self.starting_value,
                farthest_value: self.farthest_value,
                committed: current_distance <= settings.release_threshold,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SessionSettings {
        SessionSettings::default()
    }

    #[test]
    fn excursion_and_release_commits() {
        let mut state = AxisState::new(0);
        assert_eq!(state.track(0, &settings()), None);
        let out = state.track(20000, &settings()).unwrap();
        assert!(!out.committed);
        let back = state.track(4000, &settings()).unwrap();
        assert!(back.committed);
        assert_eq!(back.starting_value, 0);
        assert_eq!(back.farthest_value, 20000);
    }

    #[test]
    fn excursion_without_release_stays_uncommitted() {
        let mut state = AxisState::new(0);
        state.track(0, &settings());
        let out = state.track(20000, &settings()).unwrap();
        assert!(!out.committed);
    }

    #[test]
    fn small_movements_never_produce_candidates() {
        let mut state = AxisState::new(0);
        assert_eq!(state.track(0, &settings()), None);
        assert_eq!(state.track(12000, &settings()), None);
        assert_eq!(state.track(500, &settings()), None);
    }

    #[test]
    fn jitter_is_filtered_after_first_motion() {
        let mut state = AxisState::new(0);
        state.track(20000, &settings());
        // Within the jitter limit of the last sample: ignored entirely.
        assert_eq!(state.track(20000 + 100, &settings()), None);
    }

    #[test]
    fn retarget_forgets_excursion() {
        let mut state = AxisState::new(0);
        state.track(0, &settings());
        state.track(20000, &settings());
        state.retarget();
        // Without the reset this near-center sample would commit against
        // the stale excursion.
        assert_eq!(state.track(4000, &settings()), None);
    }

    #[test]
    fn starting_value_comes_from_the_initial_report() {
        // Triggers rest at the minimum, not center.
        let mut state = AxisState::new(-32768);
        state.track(-32768, &settings());
        let out = state.track(10000, &settings()).unwrap();
        assert_eq!(out.starting_value, -32768);
        assert!(!out.committed);
    }
}
