pub mod calibration;
pub mod device;
pub mod mapping;
pub mod store;

use crate::calibration::{CalibrationHandle, CalibrationSession, CalibrationUpdate};
use crate::device::collector::CollectorHandle;
use crate::mapping::Element;
use crate::store::MappingStore;
use color_eyre::{eyre::eyre, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let mut bind_touchpad = false;
    let mut rebind: Option<Element> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind-touchpad" => bind_touchpad = true,
            "--rebind" => {
                let key = args
                    .next()
                    .ok_or_else(|| eyre!("--rebind needs an element key"))?;
                rebind = Some(
                    Element::from_key(&key).ok_or_else(|| eyre!("Unknown element: {}", key))?,
                );
            }
            other => return Err(eyre!("Unknown argument: {}", other)),
        }
    }

    let settings_path = store::settings_path()?;
    let mut settings = store::Settings::load_or_default(&settings_path);
    settings.calibration.bind_touchpad |= bind_touchpad;

    let mappings_path = store::mappings_path()?;
    let mut mapping_store = MappingStore::load(&mappings_path)?;

    // Raw events flow from the collector straight into the engine.
    let (event_tx, event_rx) = mpsc::channel(1000);
    let collector =
        CollectorHandle::spawn(event_tx).map_err(|e| eyre!("Failed to start collector: {}", e))?;
    let profile = collector.profile().clone();
    let existing = mapping_store.lookup(&profile.guid).map(str::to_string);

    info!(
        "Calibrating {} ({} axes, {} buttons, {} hats)",
        profile.name, profile.num_axes, profile.num_buttons, profile.num_hats
    );
    info!("Press or move each control as it is announced.");
    info!("After the first two buttons are bound, the first skips a step and the second goes back.");
    info!("Commands: skip (or empty line), back, clear, cancel, done");

    let session = match rebind {
        Some(element) => CalibrationSession::begin_single(
            profile,
            existing.as_deref(),
            settings.calibration.clone(),
            element,
        )
        .map_err(|e| eyre!("Cannot rebind: {}", e))?,
        None => CalibrationSession::begin_flow(
            profile,
            existing.as_deref(),
            settings.calibration.clone(),
        ),
    };
    let (mut handle, mut updates) = CalibrationHandle::begin(session, event_rx)
        .map_err(|e| eyre!("Failed to start calibration: {}", e))?;

    let mut input_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else {
                    break;
                };
                match update {
                    CalibrationUpdate::TargetChanged { element } => {
                        info!("Now bind: {}", element);
                    }
                    CalibrationUpdate::Committed { element, binding } => {
                        info!("Bound {} to {}", element, binding);
                    }
                    CalibrationUpdate::Cleared { element } => {
                        info!("Cleared {}", element);
                    }
                    CalibrationUpdate::Complete { mapping } => {
                        info!("Calibration complete");
                        println!("{mapping}");
                        if let Err(e) = mapping_store.add(&mapping) {
                            warn!("Could not store mapping: {}", e);
                        } else {
                            mapping_store.save(&mappings_path)?;
                        }
                        break;
                    }
                    CalibrationUpdate::Cancelled { .. } => {
                        info!("Calibration cancelled, previous mapping restored");
                        break;
                    }
                    CalibrationUpdate::Disconnected { mapping } => {
                        warn!("Device disconnected, keeping committed bindings");
                        println!("{mapping}");
                        break;
                    }
                }
            }

            line = input_lines.next_line(), if stdin_open => {
                let Ok(Some(line)) = line else {
                    stdin_open = false;
                    continue;
                };
                match line.trim() {
                    "" | "skip" => handle.advance().await?,
                    "back" => handle.retreat().await?,
                    "clear" => handle.clear_current().await?,
                    "cancel" => handle.cancel().await?,
                    "done" => handle.commit().await?,
                    other => warn!("Unknown command: {}", other),
                }
            }
        }
    }

    handle
        .shutdown()
        .await
        .map_err(|e| eyre!("Engine shutdown failed: {}", e))?;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
