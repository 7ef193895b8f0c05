pub mod app;
pub mod compositor;
pub mod config;
pub mod drive;
pub mod genai_client;
pub mod ui_theme;
pub mod workflow;
