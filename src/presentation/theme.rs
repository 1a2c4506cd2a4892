use crate::domain::models::{LogLevel, SessionPhase};
use eframe::egui;

pub struct BrutalistPalette {
    pub bg: egui::Color32,
    pub fg: egui::Color32,
    pub stroke: egui::Color32,
    pub accent_yellow: egui::Color32,
    pub accent_green: egui::Color32,
    pub accent_cyan: egui::Color32,
    pub accent_red: egui::Color32,
}

impl BrutalistPalette {
    pub fn new(is_dark: bool) -> Self {
        if is_dark {
            Self {
                bg: egui::Color32::from_rgb(25, 25, 25),
                fg: egui::Color32::WHITE,
                stroke: egui::Color32::WHITE,
                accent_yellow: egui::Color32::from_rgb(255, 200, 0),
                accent_green: egui::Color32::from_rgb(0, 255, 127),
                accent_cyan: egui::Color32::from_rgb(0, 255, 255),
                accent_red: egui::Color32::from_rgb(255, 80, 80),
            }
        } else {
            Self {
                bg: egui::Color32::from_rgb(245, 245, 245),
                fg: egui::Color32::BLACK,
                stroke: egui::Color32::BLACK,
                accent_yellow: egui::Color32::from_rgb(255, 220, 0),
                accent_green: egui::Color32::from_rgb(0, 255, 100),
                accent_cyan: egui::Color32::from_rgb(0, 200, 255),
                accent_red: egui::Color32::from_rgb(220, 30, 30),
            }
        }
    }
}

fn square(widget: &mut egui::style::WidgetVisuals, stroke: f32, color: egui::Color32) {
    widget.bg_stroke = egui::Stroke::new(stroke, color);
    widget.rounding = egui::Rounding::ZERO;
}

pub fn apply_theme(ctx: &egui::Context, is_dark: bool) {
    let mut style = (*ctx.style()).clone();
    let palette = BrutalistPalette::new(is_dark);

    for (text_style, font_id) in style.text_styles.iter_mut() {
        font_id.size = match text_style {
            egui::TextStyle::Heading => 26.0,
            egui::TextStyle::Body | egui::TextStyle::Button => 15.0,
            egui::TextStyle::Monospace => 13.0,
            _ => font_id.size,
        };
    }

    style.spacing.item_spacing = egui::vec2(10.0, 10.0);
    style.spacing.button_padding = egui::vec2(14.0, 8.0);

    let widgets = &mut style.visuals.widgets;
    square(&mut widgets.noninteractive, 2.0, palette.stroke);
    widgets.noninteractive.fg_stroke = egui::Stroke::new(1.0, palette.fg);
    widgets.noninteractive.bg_fill = palette.bg;

    square(&mut widgets.inactive, 2.0, palette.stroke);
    widgets.inactive.fg_stroke = egui::Stroke::new(1.0, palette.fg);
    widgets.inactive.bg_fill = if is_dark {
        egui::Color32::from_gray(30)
    } else {
        egui::Color32::WHITE
    };

    square(&mut widgets.hovered, 2.5, palette.stroke);
    widgets.hovered.bg_fill = palette.accent_yellow;
    widgets.hovered.fg_stroke = egui::Stroke::new(1.0, egui::Color32::BLACK);
    widgets.hovered.expansion = 2.0;

    square(&mut widgets.active, 3.0, palette.stroke);
    widgets.active.bg_fill = palette.accent_green;
    widgets.active.fg_stroke = egui::Stroke::new(1.0, egui::Color32::BLACK);

    style.visuals.selection.stroke = egui::Stroke::new(1.0, palette.stroke);
    style.visuals.selection.bg_fill = palette.accent_cyan;

    style.visuals.window_rounding = egui::Rounding::ZERO;
    style.visuals.window_stroke = egui::Stroke::new(2.0, palette.stroke);
    style.visuals.window_shadow = egui::Shadow {
        offset: egui::vec2(6.0, 6.0),
        blur: 0.0,
        spread: 0.0,
        color: palette.stroke,
    };
    style.visuals.window_fill = palette.bg;
    style.visuals.panel_fill = palette.bg;
    style.visuals.override_text_color = Some(palette.fg);

    ctx.set_style(style);
}

/// Banner background and text color for a session phase.
pub fn phase_banner(phase: SessionPhase, is_dark: bool) -> (egui::Color32, egui::Color32) {
    let palette = BrutalistPalette::new(is_dark);
    match phase {
        SessionPhase::Connected => (palette.accent_green, egui::Color32::BLACK),
        SessionPhase::Scanning => (palette.accent_cyan, egui::Color32::BLACK),
        SessionPhase::Connecting | SessionPhase::Disconnecting => {
            (palette.accent_yellow, egui::Color32::BLACK)
        }
        SessionPhase::Idle => (egui::Color32::from_gray(100), egui::Color32::WHITE),
    }
}

pub fn log_color(level: LogLevel, is_dark: bool) -> egui::Color32 {
    let palette = BrutalistPalette::new(is_dark);
    match level {
        LogLevel::Info => palette.fg,
        LogLevel::Error => palette.accent_red,
    }
}

/// Map a color name reported by the board to a swatch fill. Unknown names
/// render gray.
pub fn swatch_color(name: &str) -> egui::Color32 {
    match name.trim().to_lowercase().as_str() {
        "white" => egui::Color32::WHITE,
        "black" | "off" => egui::Color32::BLACK,
        "red" => egui::Color32::from_rgb(255, 0, 0),
        "green" => egui::Color32::from_rgb(0, 200, 0),
        "blue" => egui::Color32::from_rgb(0, 80, 255),
        "yellow" => egui::Color32::from_rgb(255, 220, 0),
        "cyan" => egui::Color32::from_rgb(0, 220, 255),
        "magenta" | "purple" => egui::Color32::from_rgb(200, 0, 200),
        "orange" => egui::Color32::from_rgb(255, 140, 0),
        _ => egui::Color32::from_gray(160),
    }
}
