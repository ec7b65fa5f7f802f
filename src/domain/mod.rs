// Domain layer - Pure models and encodings, no I/O
pub mod clock;
pub mod encoding;
pub mod event_log;
pub mod export;
pub mod scale;
pub mod series;
pub mod trial;
