// Ports for persisting trial results and playing cue sounds
use crate::domain::export::ExportPayload;
use async_trait::async_trait;

#[async_trait]
pub trait ResultsRepository: Send + Sync {
    /// Store the export of one finished trial.
    async fn save_result(&self, payload: &ExportPayload) -> anyhow::Result<()>;

    /// Short name used in logs.
    fn describe(&self) -> String;
}

/// Plays the cue sound announced for a step.
pub trait CueSink: Send + Sync {
    fn play(&self, step: u32) -> anyhow::Result<()>;
}

/// Cue sink that only logs the cue.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCueSink;

impl CueSink for LoggingCueSink {
    fn play(&self, step: u32) -> anyhow::Result<()> {
        tracing::info!(step, "cue sound");
        Ok(())
    }
}
