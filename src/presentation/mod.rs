pub mod app;
pub mod components;
pub mod tabs;
pub mod theme;

pub use app::BleLedApp;
