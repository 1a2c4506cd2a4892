use ble_led_remote::domain::models::{ControllerCommand, ControllerState};
use ble_led_remote::domain::session::SessionConfig;
use ble_led_remote::domain::settings::SettingsService;
use ble_led_remote::infrastructure::logging::init_logger;
use ble_led_remote::presentation::BleLedApp;
use eframe::egui;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, watch};
use tracing::info;

type Worker = (watch::Receiver<ControllerState>, JoinHandle<()>);

#[cfg(windows)]
fn start_bluetooth(
    config: SessionConfig,
    commands: mpsc::UnboundedReceiver<ControllerCommand>,
) -> anyhow::Result<Worker> {
    use ble_led_remote::domain::session::SessionController;
    use ble_led_remote::infrastructure::bluetooth::winrt::WinRtAdapter;
    use ble_led_remote::infrastructure::permissions::DesktopPermissionGate;
    use ble_led_remote::infrastructure::worker::spawn_session_worker;

    let controller = SessionController::new(WinRtAdapter::new(), DesktopPermissionGate, config);
    let state_rx = controller.subscribe();
    let worker = spawn_session_worker(controller, commands)?;
    Ok((state_rx, worker))
}

#[cfg(not(windows))]
fn start_bluetooth(
    _config: SessionConfig,
    _commands: mpsc::UnboundedReceiver<ControllerCommand>,
) -> anyhow::Result<Worker> {
    anyhow::bail!("No Bluetooth backend is available on this platform")
}

fn main() -> anyhow::Result<()> {
    let settings = SettingsService::new()?;

    let logging_guard = init_logger(&settings.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting BLE LED Remote");

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (state_rx, worker) = start_bluetooth(settings.get().session_config(), command_rx)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([520.0, 720.0])
            .with_title("BLE LED Remote"),
        ..Default::default()
    };

    eframe::run_native(
        "BLE LED Remote",
        options,
        Box::new(move |cc| {
            Ok(Box::new(BleLedApp::new(
                cc,
                settings,
                command_tx,
                state_rx,
                worker,
                logging_guard,
            )))
        }),
    )
    .map_err(|e| anyhow::anyhow!("UI error: {}", e))
}
