//! The calibration state machine.
//!
//! A session walks the fixed binding order for one device, turning raw
//! events into binding candidates and candidates into mapping entries.
//!
//! # State Machine
//!
//! ```text
//!          raw event survives filtering
//! AwaitingInput ────────────────────────► PendingCommit
//!       ▲   ▲                                │     │
//!       │   └── better candidate (resets) ───┘     │ debounce elapses
//!       │                                          ▼
//!       └───────── next target ◄────────────── committed
//!
//! advancing past the last element ──► Complete
//! cancel at any point ──► Cancelled (snapshot restored)
//! ```
//!
//! No raw event ever raises an error: malformed or contradictory input is
//! silently dropped or deterministically overridden.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::calibration::axis::AxisState;
use crate::calibration::SessionSettings;
use crate::device::{DeviceProfile, RawEvent};
use crate::mapping::element::{BINDABLE_COUNT, BINDABLE_ELEMENTS, BINDING_ORDER};
use crate::mapping::parts::{guid_crc, sanitize_name, strip_guid_crc};
use crate::mapping::{standardize_axis_value, Binding, Element, MappingError, MappingParts};

/// Elements with flow-control meaning while guided binding is active.
///
/// By convention these are the first entries of the order table, addressed
/// by position rather than label; label-swapped pads keep the same flow
/// controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowActions {
    /// Accept/skip-forward control.
    pub forward: Element,
    /// Go-back control.
    pub backward: Element,
    /// Clears the current element's binding; `None` disables.
    pub delete: Option<Element>,
}

impl Default for FlowActions {
    fn default() -> Self {
        Self {
            forward: Element::South,
            backward: Element::East,
            delete: Some(Element::North),
        }
    }
}

/// Observable session transitions, drained by the engine after each input.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    TargetChanged { element: Element },
    Committed { element: Element, binding: Binding },
    Cleared { element: Element },
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    AwaitingInput,
    PendingCommit { since: Instant },
    Complete,
    Cancelled,
}

/// Calibration state for one device.
///
/// Owns the working mapping parts, the per-element binding slots and the
/// per-axis excursion trackers. Constructed when binding mode begins and
/// dropped when it ends; nothing else may touch the mapping while a
/// session is alive.
pub struct CalibrationSession {
    profile: DeviceProfile,
    settings: SessionSettings,
    actions: FlowActions,
    flow_active: bool,
    bindings: Vec<Binding>,
    axis_states: Vec<AxisState>,
    cursor: usize,
    phase: Phase,
    parts: MappingParts,
    backup: String,
    updates: Vec<SessionUpdate>,
}

impl CalibrationSession {
    /// Starts guided binding over the whole order table.
    ///
    /// `existing` is the device's current mapping string, kept verbatim as
    /// the cancel snapshot.
    pub fn begin_flow(
        profile: DeviceProfile,
        existing: Option<&str>,
        settings: SessionSettings,
    ) -> CalibrationSession {
        let mut session = Self::prepare(profile, existing, settings, true);
        session.set_target(0);
        session
    }

    /// Starts free-form rebinding of a single element; the session
    /// completes as soon as that one binding commits.
    pub fn begin_single(
        profile: DeviceProfile,
        existing: Option<&str>,
        settings: SessionSettings,
        element: Element,
    ) -> Result<CalibrationSession, MappingError> {
        let Some(index) = BINDING_ORDER.iter().position(|entry| *entry == Some(element)) else {
            return Err(MappingError::InitializationError(format!(
                "{element} is not a bindable element"
            )));
        };
        let mut session = Self::prepare(profile, existing, settings, false);
        session.set_target(index as isize);
        Ok(session)
    }

    fn prepare(
        profile: DeviceProfile,
        existing: Option<&str>,
        settings: SessionSettings,
        flow_active: bool,
    ) -> CalibrationSession {
        let backup = existing.unwrap_or_default().to_string();
        let mut parts = if backup.is_empty() {
            MappingParts::default()
        } else {
            MappingParts::parse(&backup)
        };

        if parts.guid.is_empty() {
            let crc = guid_crc(&profile.guid);
            parts.guid = strip_guid_crc(&profile.guid);
            if crc != 0 {
                parts.set_value("crc", &format!("{crc:04x}"));
            }
        }
        if parts.name.is_empty() {
            parts.name = sanitize_name(&profile.name);
        }
        if parts.get_value("platform").is_none() {
            parts.set_value("platform", std::env::consts::OS);
        }

        let axis_states = (0..profile.num_axes)
            .map(|axis| AxisState::new(profile.axis_initial(axis)))
            .collect();

        info!(
            device = %profile.name,
            axes = profile.num_axes,
            flow = flow_active,
            "calibration session started"
        );

        CalibrationSession {
            profile,
            settings,
            actions: FlowActions::default(),
            flow_active,
            bindings: vec![Binding::None; BINDABLE_COUNT],
            axis_states,
            cursor: 0,
            phase: Phase::AwaitingInput,
            parts,
            backup,
            updates: Vec::new(),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.profile.name
    }

    /// The element currently being bound, if the session is still running.
    pub fn target(&self) -> Option<Element> {
        match self.phase {
            Phase::AwaitingInput | Phase::PendingCommit { .. } => BINDING_ORDER[self.cursor],
            Phase::Complete | Phase::Cancelled => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase == Phase::Cancelled
    }

    /// Takes the transitions recorded since the last drain.
    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        std::mem::take(&mut self.updates)
    }

    /// Feeds one raw device event through filtering and the flow rules.
    pub fn handle_event(&mut self, event: &RawEvent) {
        if !matches!(
            self.phase,
            Phase::AwaitingInput | Phase::PendingCommit { .. }
        ) {
            return;
        }
        match *event {
            RawEvent::AxisMotion { axis, value } => self.handle_axis(axis, value),
            // Buttons commit on release so one physical input that fires
            // several controls cannot bind them all.
            RawEvent::ButtonDown { .. } => {}
            RawEvent::ButtonUp { button } => self.configure(Binding::Button {
                index: button as u16,
            }),
            RawEvent::HatMotion { hat, mask } => {
                if mask != 0 {
                    self.configure(Binding::Hat {
                        index: hat as u16,
                        mask,
                    });
                }
            }
            RawEvent::Removed => {}
        }
    }

    /// Checks the debounce window; called once per loop iteration.
    pub fn poll(&mut self) {
        if let Phase::PendingCommit { since } = self.phase {
            if since.elapsed() >= Duration::from_millis(self.settings.debounce_ms) {
                self.commit_pending();
            }
        }
    }

    /// Skips to the next element.
    pub fn advance(&mut self) {
        if self.target().is_none() {
            return;
        }
        self.set_target(self.cursor as isize + 1);
    }

    /// Steps back to the previous element; stays put at the front.
    pub fn retreat(&mut self) {
        if self.target().is_none() {
            return;
        }
        self.set_target(self.cursor as isize - 1);
    }

    /// Drops the current element's binding, slot and mapping entry both.
    pub fn clear_current(&mut self) {
        let Some(element) = self.target() else {
            return;
        };
        if let Some(slot) = element.slot() {
            self.bindings[slot] = Binding::None;
        }
        self.parts.remove_value(element.key());
        self.phase = Phase::AwaitingInput;
        self.updates.push(SessionUpdate::Cleared { element });
    }

    /// Abandons the session. Returns the pre-entry mapping snapshot
    /// verbatim; nothing committed during the session survives.
    pub fn cancel(&mut self) -> String {
        info!(device = %self.profile.name, "calibration cancelled");
        self.phase = Phase::Cancelled;
        self.backup.clone()
    }

    /// Ends the session keeping everything committed so far and returns
    /// the canonical mapping string. Pending, uncommitted candidates are
    /// discarded. Also the disconnect path.
    pub fn finish(&mut self) -> String {
        self.phase = Phase::Complete;
        self.finished_mapping()
    }

    /// Canonical serialization of the working mapping.
    pub fn finished_mapping(&self) -> String {
        self.parts.serialize()
    }

    fn handle_axis(&mut self, axis: usize, value: i16) {
        let Some(state) = self.axis_states.get_mut(axis) else {
            return;
        };
        let Some(candidate) = state.track(i32::from(value), &self.settings) else {
            return;
        };
        self.configure(Binding::Axis {
            index: axis as u16,
            min: standardize_axis_value(candidate.starting_value),
            max: standardize_axis_value(candidate.farthest_value),
            committed: candidate.committed,
        });
    }

    /// Applies one surviving candidate to the current target, honoring the
    /// flow rules and the override ordering.
    fn configure(&mut self, candidate: Binding) {
        let Some(current) = self.target() else {
            return;
        };

        if self.flow_active {
            if let Some(owner) = self.existing_owner(&candidate) {
                if self.apply_flow_rule(current, owner) {
                    return;
                }
            }
        }

        let Some(slot) = current.slot() else {
            return;
        };
        let existing = self.bindings[slot];
        if existing.is_bound() && !should_replace(current, &existing, &candidate) {
            debug!(%current, ?candidate, "candidate discarded by override rules");
            return;
        }

        match candidate {
            Binding::Button { index } => {
                debug!(%current, button = index, "configuring button binding")
            }
            Binding::Axis {
                index,
                min,
                max,
                committed,
            } => debug!(
                %current,
                axis = index,
                min,
                max,
                committed,
                "configuring axis binding"
            ),
            Binding::Hat { index, mask } => {
                debug!(%current, hat = index, mask, "configuring hat binding")
            }
            Binding::None => {}
        }

        self.bindings[slot] = candidate;
        self.phase = if candidate.is_committed() {
            Phase::PendingCommit {
                since: Instant::now(),
            }
        } else {
            Phase::AwaitingInput
        };
    }

    /// First element whose existing binding already covers the candidate.
    /// Scanning in slot order makes the lowest logical index win ties.
    fn existing_owner(&self, candidate: &Binding) -> Option<Element> {
        BINDABLE_ELEMENTS.iter().copied().find(|element| {
            element
                .slot()
                .map(|slot| self.bindings[slot].contains(candidate))
                .unwrap_or(false)
        })
    }

    /// Guided-flow dispatch for an input already bound to `owner`.
    /// Returns true when the candidate was consumed as a flow command.
    fn apply_flow_rule(&mut self, current: Element, owner: Element) -> bool {
        let forward = self.actions.forward;
        let backward = self.actions.backward;

        if current == forward && owner == forward {
            // Rebinding the forward action itself; don't treat it as skip.
            return false;
        }
        if current == backward && owner == forward {
            // The forward control only skips this step once the backward
            // action has a binding; before that, losing it would strand
            // the flow.
            let backward_bound = backward
                .slot()
                .map(|slot| self.bindings[slot].is_bound())
                .unwrap_or(false);
            if backward_bound {
                self.advance();
            } else {
                self.retreat();
            }
            return true;
        }
        if owner == forward {
            self.advance();
            return true;
        }
        if owner == backward {
            self.retreat();
            return true;
        }
        if owner == current {
            // Same control again: accept what is pending and move on.
            self.commit_pending();
            return true;
        }
        if Some(owner) == self.actions.delete {
            self.clear_current();
            self.advance();
            return true;
        }
        false
    }

    /// Writes the pending binding into the mapping parts and advances.
    fn commit_pending(&mut self) {
        let Some(element) = self.target() else {
            return;
        };
        let Some(slot) = element.slot() else {
            return;
        };
        let binding = self.bindings[slot];
        if !binding.is_bound() {
            self.advance();
            return;
        }

        self.parts.set_value(element.key(), &binding.to_string());
        info!(%element, %binding, "binding committed");
        self.updates.push(SessionUpdate::Committed { element, binding });

        if self.flow_active {
            self.set_target(self.cursor as isize + 1);
        } else {
            // Free-form rebinding stops at its one element.
            self.phase = Phase::Complete;
            self.updates.push(SessionUpdate::Complete);
        }
    }

    /// Moves the cursor, skipping sentinels and the touchpad unless
    /// requested. Walking past the end completes the session; stepping
    /// before the start stays put.
    fn set_target(&mut self, index: isize) {
        if index < 0 {
            return;
        }
        let index = index as usize;
        if index >= BINDING_ORDER.len() {
            info!(device = %self.profile.name, "all elements bound");
            self.phase = Phase::Complete;
            self.updates.push(SessionUpdate::Complete);
            return;
        }
        let Some(element) = BINDING_ORDER[index] else {
            return self.set_target(index as isize + 1);
        };
        if self.flow_active && element == Element::Touchpad && !self.settings.bind_touchpad {
            return self.set_target(index as isize + 1);
        }

        self.cursor = index;
        if let Some(slot) = element.slot() {
            self.bindings[slot] = Binding::None;
        }
        for state in &mut self.axis_states {
            state.retarget();
        }
        self.phase = Phase::AwaitingInput;
        debug!(%element, "awaiting input for element");
        self.updates.push(SessionUpdate::TargetChanged { element });
    }
}

/// Override ordering for a candidate against the element's existing
/// binding: candidates matching the element's native kind are kept, lower
/// raw indices win for buttons and hats, wider ranges win for axes, and a
/// strictly worse candidate is discarded outright.
fn should_replace(element: Element, existing: &Binding, candidate: &Binding) -> bool {
    match (existing, candidate) {
        (
            Binding::Axis {
                index: old_index,
                min: old_min,
                max: old_max,
                committed: old_committed,
            },
            Binding::Axis {
                index: new_index,
                min: new_min,
                max: new_max,
                committed: new_committed,
            },
        ) => {
            // The first axis to move keeps the slot; a second physical
            // axis drifting during the gesture cannot steal it.
            if old_index != new_index {
                return false;
            }
            let old_width = (old_max - old_min).abs();
            let new_width = (new_max - new_min).abs();
            new_width > old_width || (new_width == old_width && (*new_committed || !*old_committed))
        }
        (Binding::Button { index: old }, Binding::Button { index: new }) => new < old,
        (Binding::Hat { index: old, .. }, Binding::Hat { index: new, .. }) => new < old,
        (existing, _) => {
            // Cross-kind: an existing binding of the element's native kind
            // is kept; anything else yields to the newcomer.
            let existing_is_axis = matches!(existing, Binding::Axis { .. });
            element.is_axis() != existing_is_axis
        }
    }
}
