pub mod commands;
pub mod monitoring_bot;
