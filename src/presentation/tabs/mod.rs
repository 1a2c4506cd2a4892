pub mod control;
pub mod log;
pub mod settings;
