use crate::domain::models::{ControllerCommand, ControllerState};
use crate::domain::settings::SettingsService;
use crate::infrastructure::logging::LoggingGuard;
use eframe::egui;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Control,
    Log,
    Settings,
}

/// The device screen. It only renders the controller's published state and
/// forwards user actions as commands.
pub struct BleLedApp {
    pub(crate) settings: SettingsService,
    pub(crate) commands: mpsc::UnboundedSender<ControllerCommand>,
    state_rx: watch::Receiver<ControllerState>,
    pub(crate) state: ControllerState,

    // UI State
    pub(crate) selected_tab: Tab,
    pub(crate) name_filter_input: String,
    pub(crate) is_dark_mode: bool,

    worker: Option<JoinHandle<()>>,
    _logging_guard: Option<LoggingGuard>,
}

impl BleLedApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        settings: SettingsService,
        commands: mpsc::UnboundedSender<ControllerCommand>,
        state_rx: watch::Receiver<ControllerState>,
        worker: JoinHandle<()>,
        logging_guard: Option<LoggingGuard>,
    ) -> Self {
        crate::presentation::theme::apply_theme(&cc.egui_ctx, false);

        let name_filter_input = settings
            .get()
            .device_name_filter
            .clone()
            .unwrap_or_default();
        let state = state_rx.borrow().clone();

        Self {
            settings,
            commands,
            state_rx,
            state,
            selected_tab: Tab::Control,
            name_filter_input,
            is_dark_mode: false,
            worker: Some(worker),
            _logging_guard: logging_guard,
        }
    }

    pub(crate) fn send(&self, command: ControllerCommand) {
        if self.commands.send(command).is_err() {
            error!("Bluetooth worker is gone, command dropped");
        }
    }

    fn refresh_state(&mut self) {
        if self.state_rx.has_changed().unwrap_or(false) {
            self.state = self.state_rx.borrow_and_update().clone();
        }
    }

    fn alert_window(&mut self, ctx: &egui::Context) {
        let Some(alert) = self.state.alert else {
            return;
        };

        egui::Window::new("Alert")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(egui::RichText::new(alert.message()).strong());
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    self.send(ControllerCommand::DismissAlert);
                }
            });
    }
}

impl eframe::App for BleLedApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.refresh_state();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.selectable_value(&mut self.selected_tab, Tab::Control, "Device");
                ui.selectable_value(&mut self.selected_tab, Tab::Log, "Log");
                ui.selectable_value(&mut self.selected_tab, Tab::Settings, "Settings");

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let switch_icon = if self.is_dark_mode {
                        "☀ Light"
                    } else {
                        "🌙 Dark"
                    };
                    if ui.button(switch_icon).clicked() {
                        self.is_dark_mode = !self.is_dark_mode;
                        crate::presentation::theme::apply_theme(ctx, self.is_dark_mode);
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.set_max_width(640.0);
                    ui.add_space(16.0);

                    use crate::presentation::tabs;
                    match self.selected_tab {
                        Tab::Control => tabs::control::render(self, ui),
                        Tab::Log => tabs::log::render(self, ui),
                        Tab::Settings => tabs::settings::render(self, ui),
                    }

                    ui.add_space(32.0);
                });
            });
        });

        self.alert_window(ctx);

        // Scan results and telemetry arrive without user input.
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

impl Drop for BleLedApp {
    fn drop(&mut self) {
        info!("Screen closed, releasing Bluetooth");
        let _ = self.commands.send(ControllerCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Bluetooth worker panicked");
            }
        }
    }
}
