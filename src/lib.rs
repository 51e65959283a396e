pub mod config;
pub mod console_display;
pub mod coordinator;
pub mod error;
pub mod pitch;
pub mod render;
pub mod replay;
pub mod simulator;
pub mod transcript;
pub mod types;
pub mod ws_server;
