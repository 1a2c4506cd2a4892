pub mod error;
pub mod log;
pub mod models;
pub mod session;
pub mod settings;
