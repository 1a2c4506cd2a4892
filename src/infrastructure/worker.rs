//! Dedicated Bluetooth thread hosting the session controller.

use crate::domain::models::ControllerCommand;
use crate::domain::session::SessionController;
use crate::infrastructure::bluetooth::BluetoothAdapter;
use crate::infrastructure::permissions::PermissionGate;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Run `controller` on its own current-thread runtime until it receives
/// `Shutdown` or every command sender is dropped.
pub fn spawn_session_worker<A, P>(
    controller: SessionController<A, P>,
    commands: mpsc::UnboundedReceiver<ControllerCommand>,
) -> anyhow::Result<JoinHandle<()>>
where
    A: BluetoothAdapter,
    P: PermissionGate,
    SessionController<A, P>: Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name("bluetooth".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create tokio runtime for Bluetooth: {}", e);
                    return;
                }
            };

            rt.block_on(controller.run(commands));
            info!("Bluetooth worker stopped");
        })?;

    Ok(handle)
}
