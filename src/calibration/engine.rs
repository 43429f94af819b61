//! Calibration engine with statum state machine for session execution.
//!
//! Wraps one [`CalibrationSession`] in a tokio task with a 5-state
//! lifecycle and compile-time state safety.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Configured ──► Active ──► Deactivating ──► Deactivated
//! ```
//!
//! # Architecture
//!
//! ```text
//! DeviceEvent ──► [CalibrationSession] ──► CalibrationUpdate
//!      ▲                 ▲                       │
//!      │          CalibrationCommand             ▼
//!  Event Channel    (handle methods)       Update Channel
//! ```
//!
//! The debounce window is checked on a poll tick inside the same select
//! loop, so the session stays single-threaded and sees events in
//! device-emission order.

use statum::{machine, state};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::calibration::session::{CalibrationSession, SessionUpdate};
use crate::device::{DeviceEvent, RawEvent};
use crate::mapping::{Binding, Element, MappingError};

/// Control surface of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationCommand {
    /// Skip to the next element.
    Advance,
    /// Step back to the previous element.
    Retreat,
    /// Drop the current element's binding.
    ClearCurrent,
    /// Abandon the session and restore the pre-entry mapping.
    Cancel,
    /// End the session keeping everything committed so far.
    Commit,
}

/// Progress reports emitted while a session runs.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationUpdate {
    TargetChanged { element: Element },
    Committed { element: Element, binding: Binding },
    Cleared { element: Element },
    /// Session finished; `mapping` is the canonical result.
    Complete { mapping: String },
    /// Session cancelled; `mapping` is the restored snapshot.
    Cancelled { mapping: String },
    /// Device went away; `mapping` keeps the committed bindings.
    Disconnected { mapping: String },
}

/// States for the calibration engine lifecycle using statum.
#[state]
#[derive(Debug, Clone)]
pub enum EngineState {
    Initializing, // Setting up engine structure
    Configured,   // Session validated
    Active,       // Processing events in main loop
    Deactivating, // Shutting down gracefully
    Deactivated,  // Fully stopped, ready for cleanup
}

/// Calibration engine with compile-time state safety via statum.
#[machine]
pub struct CalibrationEngine<S: EngineState> {
    event_receiver: mpsc::Receiver<DeviceEvent>,
    command_receiver: mpsc::Receiver<CalibrationCommand>,
    update_sender: mpsc::Sender<CalibrationUpdate>,
    session: CalibrationSession,
    device_name: String,
}

impl CalibrationEngine<Initializing> {
    pub fn create(
        event_receiver: mpsc::Receiver<DeviceEvent>,
        command_receiver: mpsc::Receiver<CalibrationCommand>,
        update_sender: mpsc::Sender<CalibrationUpdate>,
        session: CalibrationSession,
    ) -> Self {
        let device_name = session.device_name().to_string();
        info!("Initializing calibration engine for: {}", device_name);

        Self::new(
            event_receiver,
            command_receiver,
            update_sender,
            session,
            device_name,
        )
    }

    /// Validates the session and transitions to Configured.
    pub fn configure(self) -> Result<CalibrationEngine<Configured>, MappingError> {
        if self.session.target().is_none() {
            error!("Session has no bindable target: {}", self.device_name);
            return Err(MappingError::InitializationError(format!(
                "session for {} has nothing to bind",
                self.device_name
            )));
        }
        info!("Engine configured for: {}", self.device_name);
        Ok(self.transition())
    }
}

impl CalibrationEngine<Configured> {
    pub fn activate(self) -> CalibrationEngine<Active> {
        info!("Activating calibration engine: {}", self.device_name);
        self.transition()
    }
}

impl CalibrationEngine<Active> {
    /// Main processing loop with graceful shutdown support.
    ///
    /// Runs until the session ends, the channels close, or the shutdown
    /// signal arrives. The poll tick drives the debounce window.
    pub async fn run_until_shutdown(
        mut self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<CalibrationEngine<Deactivating>, MappingError> {
        info!("Starting calibration loop for: {}", self.device_name);
        let mut poll_tick = tokio::time::interval(Duration::from_millis(5));

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received for: {}", self.device_name);
                    break;
                }

                command = self.command_receiver.recv() => {
                    let Some(command) = command else {
                        debug!("Command channel closed: {}", self.device_name);
                        break;
                    };
                    if self.handle_command(command).await? {
                        break;
                    }
                }

                event = self.event_receiver.recv() => {
                    let Some(event) = event else {
                        debug!("Event channel closed: {}", self.device_name);
                        break;
                    };
                    if self.handle_device_event(event).await? {
                        break;
                    }
                }

                _ = poll_tick.tick() => {
                    self.session.poll();
                    self.forward_updates().await?;
                    if self.session.is_complete() {
                        break;
                    }
                }
            }
        }

        info!("Transitioning to Deactivating state: {}", self.device_name);
        Ok(self.transition())
    }

    /// Returns true when the session is over and the loop should stop.
    async fn handle_command(&mut self, command: CalibrationCommand) -> Result<bool, MappingError> {
        debug!("Handling command {:?} for: {}", command, self.device_name);
        match command {
            CalibrationCommand::Advance => self.session.advance(),
            CalibrationCommand::Retreat => self.session.retreat(),
            CalibrationCommand::ClearCurrent => self.session.clear_current(),
            CalibrationCommand::Cancel => {
                let mapping = self.session.cancel();
                self.send_update(CalibrationUpdate::Cancelled { mapping })
                    .await?;
                return Ok(true);
            }
            CalibrationCommand::Commit => {
                let mapping = self.session.finish();
                self.send_update(CalibrationUpdate::Complete { mapping })
                    .await?;
                return Ok(true);
            }
        }
        self.forward_updates().await?;
        Ok(self.session.is_complete())
    }

    async fn handle_device_event(&mut self, event: DeviceEvent) -> Result<bool, MappingError> {
        debug!(
            "Raw event {:?} from device {} at {}",
            event.event,
            event.device,
            event.timestamp.format("%H:%M:%S%.3f")
        );
        if matches!(event.event, RawEvent::Removed) {
            warn!("Device removed during calibration: {}", self.device_name);
            let mapping = self.session.finish();
            self.send_update(CalibrationUpdate::Disconnected { mapping })
                .await?;
            return Ok(true);
        }

        self.session.handle_event(&event.event);
        self.forward_updates().await?;
        Ok(self.session.is_complete())
    }

    /// Drains session transitions into the update channel.
    async fn forward_updates(&mut self) -> Result<(), MappingError> {
        for update in self.session.drain_updates() {
            let update = match update {
                SessionUpdate::TargetChanged { element } => {
                    CalibrationUpdate::TargetChanged { element }
                }
                SessionUpdate::Committed { element, binding } => {
                    CalibrationUpdate::Committed { element, binding }
                }
                SessionUpdate::Cleared { element } => CalibrationUpdate::Cleared { element },
                SessionUpdate::Complete => CalibrationUpdate::Complete {
                    mapping: self.session.finished_mapping(),
                },
            };
            self.send_update(update).await?;
        }
        Ok(())
    }

    async fn send_update(&self, update: CalibrationUpdate) -> Result<(), MappingError> {
        self.update_sender.send(update).await.map_err(|e| {
            error!("Failed to send calibration update: {}", e);
            MappingError::ChannelError(format!("Failed to send calibration update: {}", e))
        })
    }
}

impl CalibrationEngine<Deactivating> {
    pub fn shutdown(self) -> CalibrationEngine<Deactivated> {
        info!("Calibration engine shut down: {}", self.device_name);
        self.transition()
    }
}

impl CalibrationEngine<Deactivated> {}

/// Handle for managing a calibration engine in a tokio task.
///
/// Construction spawns the engine; the command methods map onto the
/// control entry points of the session, and progress arrives on the
/// update receiver returned alongside the handle.
#[derive(Debug)]
pub struct CalibrationHandle {
    pub device_name: String,

    command_sender: mpsc::Sender<CalibrationCommand>,

    task_handle: Option<JoinHandle<Result<(), MappingError>>>,

    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl CalibrationHandle {
    /// Starts binding mode: spawns the engine over the given session and
    /// raw event stream.
    pub fn begin(
        session: CalibrationSession,
        event_receiver: mpsc::Receiver<DeviceEvent>,
    ) -> Result<(Self, mpsc::Receiver<CalibrationUpdate>), MappingError> {
        let (command_sender, command_receiver) = mpsc::channel(32);
        let (update_sender, update_receiver) = mpsc::channel(100);
        let device_name = session.device_name().to_string();

        let engine =
            CalibrationEngine::create(event_receiver, command_receiver, update_sender, session)
                .configure()?;
        let active = engine.activate();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task_name = device_name.clone();
        let task_handle = tokio::spawn(async move {
            info!("Spawning calibration engine: {}", task_name);
            match active.run_until_shutdown(shutdown_rx).await {
                Ok(deactivating) => {
                    let _ = deactivating.shutdown();
                    Ok(())
                }
                Err(e) => {
                    error!("Error running calibration engine: {} - {}", task_name, e);
                    Err(e)
                }
            }
        });

        info!("Calibration started: {}", device_name);
        Ok((
            Self {
                device_name,
                command_sender,
                task_handle: Some(task_handle),
                shutdown_tx: Some(shutdown_tx),
            },
            update_receiver,
        ))
    }

    pub async fn advance(&self) -> Result<(), MappingError> {
        self.send(CalibrationCommand::Advance).await
    }

    pub async fn retreat(&self) -> Result<(), MappingError> {
        self.send(CalibrationCommand::Retreat).await
    }

    pub async fn clear_current(&self) -> Result<(), MappingError> {
        self.send(CalibrationCommand::ClearCurrent).await
    }

    pub async fn cancel(&self) -> Result<(), MappingError> {
        self.send(CalibrationCommand::Cancel).await
    }

    pub async fn commit(&self) -> Result<(), MappingError> {
        self.send(CalibrationCommand::Commit).await
    }

    async fn send(&self, command: CalibrationCommand) -> Result<(), MappingError> {
        self.command_sender.send(command).await.map_err(|e| {
            MappingError::ChannelError(format!("Failed to send command: {}", e))
        })
    }

    /// Gracefully shuts down the engine and waits for task completion.
    pub async fn shutdown(&mut self) -> Result<(), MappingError> {
        debug!("Sending shutdown signal to engine: {}", self.device_name);

        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                warn!("Engine task already terminated: {}", self.device_name);
            }
        }

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => {
                    debug!("Engine task completed: {}", self.device_name);
                    result
                }
                Err(e) => {
                    error!("Engine task panicked: {} - {}", self.device_name, e);
                    Err(MappingError::TaskError(format!(
                        "Engine task panicked: {}",
                        e
                    )))
                }
            }
        } else {
            debug!("Engine already shut down: {}", self.device_name);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::SessionSettings;
    use crate::device::DeviceProfile;

    fn profile() -> DeviceProfile {
        DeviceProfile {
            guid: "03000000deadbeef0000000000000000".to_string(),
            name: "Engine Test Pad".to_string(),
            num_axes: 2,
            num_buttons: 8,
            num_hats: 1,
            initial_axis_values: vec![0; 2],
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            debounce_ms: 0,
            ..SessionSettings::default()
        }
    }

    async fn press(events: &mpsc::Sender<DeviceEvent>, button: usize) {
        events
            .send(DeviceEvent::now(0, RawEvent::ButtonDown { button }))
            .await
            .unwrap();
        events
            .send(DeviceEvent::now(0, RawEvent::ButtonUp { button }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn engine_commits_bindings_and_reports_progress() {
        let session = CalibrationSession::begin_flow(profile(), None, settings());
        let (events_tx, events_rx) = mpsc::channel(64);
        let (mut handle, mut updates) = CalibrationHandle::begin(session, events_rx).unwrap();

        press(&events_tx, 0).await;

        let mut committed = None;
        while let Some(update) = updates.recv().await {
            if let CalibrationUpdate::Committed { element, binding } = update {
                committed = Some((element, binding));
                break;
            }
        }
        assert_eq!(
            committed,
            Some((Element::South, Binding::Button { index: 0 }))
        );

        handle.cancel().await.unwrap();
        let mut cancelled = false;
        while let Some(update) = updates.recv().await {
            if let CalibrationUpdate::Cancelled { mapping } = update {
                assert!(mapping.is_empty());
                cancelled = true;
                break;
            }
        }
        assert!(cancelled);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn device_removal_ends_the_session_keeping_commits() {
        let session = CalibrationSession::begin_flow(profile(), None, settings());
        let (events_tx, events_rx) = mpsc::channel(64);
        let (mut handle, mut updates) = CalibrationHandle::begin(session, events_rx).unwrap();

        press(&events_tx, 2).await;
        // Let the commit land before unplugging.
        let mut saw_commit = false;
        while let Some(update) = updates.recv().await {
            if matches!(update, CalibrationUpdate::Committed { .. }) {
                saw_commit = true;
                break;
            }
        }
        assert!(saw_commit);

        events_tx
            .send(DeviceEvent::now(0, RawEvent::Removed))
            .await
            .unwrap();
        let mut disconnected_mapping = None;
        while let Some(update) = updates.recv().await {
            if let CalibrationUpdate::Disconnected { mapping } = update {
                disconnected_mapping = Some(mapping);
                break;
            }
        }
        let mapping = disconnected_mapping.unwrap();
        assert!(mapping.contains("a:b2,"));

        handle.shutdown().await.unwrap();
    }
}
