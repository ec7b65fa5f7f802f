// Port for loading the per-chart data files
use crate::domain::series::{Series, SeriesError};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{file} has no {column:?} column")]
    MissingColumn { file: String, column: &'static str },
    #[error("{file} line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
    #[error("{file}: {source}")]
    Series {
        file: String,
        #[source]
        source: SeriesError,
    },
}

#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Loads every file or none: the first failure fails the whole batch.
    /// Output order follows `files`.
    async fn load_all(&self, files: &[String]) -> Result<Vec<Series>, LoadError>;
}
