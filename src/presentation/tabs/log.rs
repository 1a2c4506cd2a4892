use crate::domain::models::LogLevel;
use crate::presentation::app::BleLedApp;
use crate::presentation::components::Components;
use crate::presentation::theme;
use eframe::egui;

pub fn render(app: &mut BleLedApp, ui: &mut egui::Ui) {
    Components::heading(ui, "Event Log");
    ui.add_space(16.0);

    Components::brutalist_card(ui, "Events", |ui| {
        if app.state.log.is_empty() {
            ui.label("Nothing logged yet");
            return;
        }

        egui::ScrollArea::vertical()
            .id_salt("event_log")
            .max_height(420.0)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for entry in &app.state.log {
                    let prefix = match entry.level {
                        LogLevel::Info => "INFO ",
                        LogLevel::Error => "ERROR",
                    };
                    let text = egui::RichText::new(format!(
                        "#{:<5} {} {}",
                        entry.sequence, prefix, entry.message
                    ))
                    .monospace()
                    .color(theme::log_color(entry.level, app.is_dark_mode));

                    ui.label(if entry.level == LogLevel::Error {
                        text.strong()
                    } else {
                        text
                    });
                }
            });
    });
}
