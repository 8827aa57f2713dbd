pub mod notifier;
pub mod prometheus;
pub mod status;
