// Presentation layer - HTTP surface over the trial runner
pub mod app_state;
pub mod handlers;
