use crate::domain::models::ControllerCommand;
use crate::presentation::app::BleLedApp;
use crate::presentation::components::Components;
use eframe::egui;
use tracing::{error, info};

pub fn render(app: &mut BleLedApp, ui: &mut egui::Ui) {
    Components::heading(ui, "Settings");
    ui.add_space(16.0);

    Components::brutalist_card(ui, "Scanning", |ui| {
        ui.horizontal(|ui| {
            ui.label("Device name filter:");
            ui.text_edit_singleline(&mut app.name_filter_input);
        });
        ui.label(
            egui::RichText::new("Leave empty to list every device, e.g. \"Arduino\" or \"HC-05\".")
                .small(),
        );

        let settings = app.settings.get_mut();
        ui.horizontal(|ui| {
            ui.label("Scan timeout (s):");
            ui.add(egui::Slider::new(&mut settings.scan_timeout_secs, 1..=60));
        });
    });

    ui.add_space(12.0);

    Components::brutalist_card(ui, "Event Log", |ui| {
        let settings = app.settings.get_mut();
        ui.horizontal(|ui| {
            ui.label("Keep last entries (0 = all):");
            ui.add(egui::Slider::new(&mut settings.log_retention, 0..=5000));
        });
    });

    ui.add_space(12.0);

    Components::brutalist_card(ui, "Channels", |ui| {
        let settings = app.settings.get();
        egui::Grid::new("channel_grid")
            .spacing([20.0, 6.0])
            .show(ui, |ui| {
                ui.label("Telemetry service:");
                ui.monospace(settings.telemetry_service_uuid.to_string());
                ui.end_row();
                ui.label("Telemetry channel:");
                ui.monospace(settings.telemetry_char_uuid.to_string());
                ui.end_row();
                ui.label("Control service:");
                ui.monospace(settings.control_service_uuid.to_string());
                ui.end_row();
                ui.label("Control channel:");
                ui.monospace(settings.control_char_uuid.to_string());
                ui.end_row();
            });
    });

    ui.add_space(12.0);

    if ui.button("Save & Apply").clicked() {
        apply(app);
    }
}

fn apply(app: &mut BleLedApp) {
    let filter = app.name_filter_input.trim();
    app.settings.get_mut().device_name_filter =
        (!filter.is_empty()).then(|| filter.to_string());

    if let Err(e) = app.settings.save() {
        error!("Failed to save settings to {}: {:#}", app.settings.path().display(), e);
    } else {
        info!("Settings saved");
    }

    let config = app.settings.get().session_config();
    app.send(ControllerCommand::UpdateConfig(config));
}
