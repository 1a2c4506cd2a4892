use crate::domain::models::{ControllerCommand, OutputCommand, SessionPhase};
use crate::presentation::app::BleLedApp;
use crate::presentation::components::Components;
use crate::presentation::theme;
use eframe::egui;

pub fn render(app: &mut BleLedApp, ui: &mut egui::Ui) {
    Components::heading(ui, "Control LED via Bluetooth");
    ui.add_space(16.0);

    ui_connection_panel(app, ui);
    ui.add_space(12.0);

    if app.state.is_connected() {
        ui_output_panel(app, ui);
        ui.add_space(12.0);
    }

    ui_devices_panel(app, ui);
}

fn ui_connection_panel(app: &mut BleLedApp, ui: &mut egui::Ui) {
    Components::brutalist_card(ui, "Connection", |ui| {
        let phase = app.state.phase;
        let (bg_color, text_color) = theme::phase_banner(phase, app.is_dark_mode);
        Components::status_banner(ui, phase.as_str(), bg_color, text_color);

        ui.add_space(8.0);

        match &app.state.session {
            Some(device) => {
                let name = device.display_name.as_deref().unwrap_or("Unknown Device");
                ui.horizontal(|ui| {
                    ui.label(format!("Connected to: {}", name));
                    if ui.button("Disconnect").clicked() {
                        app.send(ControllerCommand::Disconnect);
                    }
                });
            }
            None => {
                ui.horizontal(|ui| {
                    let busy = matches!(
                        phase,
                        SessionPhase::Connecting | SessionPhase::Disconnecting
                    );
                    if app.state.scanning {
                        if ui.button("Stop Scanning").clicked() {
                            app.send(ControllerCommand::StopScan);
                        }
                        ui.spinner();
                    } else if ui
                        .add_enabled(!busy, egui::Button::new("Scan for Devices"))
                        .clicked()
                    {
                        app.send(ControllerCommand::StartScan);
                    }
                });
            }
        }
    });
}

fn ui_output_panel(app: &mut BleLedApp, ui: &mut egui::Ui) {
    Components::brutalist_card(ui, "Board", |ui| {
        ui.horizontal(|ui| {
            if ui.button("Turn LED ON").clicked() {
                app.send(ControllerCommand::Send(OutputCommand::On));
            }
            if ui.button("Turn LED OFF").clicked() {
                app.send(ControllerCommand::Send(OutputCommand::Off));
            }
        });

        ui.separator();
        Components::sub_heading(ui, "Reported color");
        let color = &app.state.last_color;
        Components::color_swatch(ui, color, theme::swatch_color(color));
    });
}

fn ui_devices_panel(app: &mut BleLedApp, ui: &mut egui::Ui) {
    let selectable = matches!(app.state.phase, SessionPhase::Idle | SessionPhase::Scanning);

    Components::brutalist_card(ui, "Nearby Devices", |ui| {
        if app.state.devices.is_empty() {
            ui.label("No devices found");
            return;
        }

        egui::ScrollArea::vertical()
            .id_salt("scan_results")
            .max_height(180.0)
            .show(ui, |ui| {
                for device in &app.state.devices {
                    let button = egui::Button::new(format!("Connect to {}", device.label()));
                    if ui.add_enabled(selectable, button).clicked() {
                        app.send(ControllerCommand::SelectDevice(device.id.clone()));
                    }
                }
            });
    });
}
