// Results persistence - remote results service and local JSON exports
use crate::application::results_repository::ResultsRepository;
use crate::domain::export::ExportPayload;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

const COLLECTION: &str = "userResponses";

/// Export time taken from the payload, or now when it does not parse.
fn export_time(payload: &ExportPayload) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&payload.metadata.timestamp)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub struct HttpResultsRepository {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpResultsRepository {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// `<endpoint>/userResponses/<user>_<label>_<epoch millis>`
    fn document_url(&self, payload: &ExportPayload) -> String {
        let doc_id = format!(
            "{}_{}_{}",
            payload.metadata.user_id,
            payload.metadata.trial_label,
            export_time(payload).timestamp_millis()
        );
        format!(
            "{}/{}/{}",
            self.endpoint,
            COLLECTION,
            urlencoding::encode(&doc_id)
        )
    }
}

#[async_trait]
impl ResultsRepository for HttpResultsRepository {
    async fn save_result(&self, payload: &ExportPayload) -> anyhow::Result<()> {
        let url = self.document_url(payload);
        self.client
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("posting results to {url}"))?
            .error_for_status()
            .with_context(|| format!("results service rejected {url}"))?;
        tracing::info!(%url, "results saved");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("results service at {}", self.endpoint)
    }
}

/// Pretty JSON files named `<user>_<label>_<YYYYMMDD_HHMMSS>.json`.
pub struct FileResultsRepository {
    dir: PathBuf,
}

impl FileResultsRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, payload: &ExportPayload) -> PathBuf {
        let stamp = export_time(payload).format("%Y%m%d_%H%M%S").to_string();
        self.dir.join(format!("{}.json", payload.file_stem(&stamp)))
    }
}

#[async_trait]
impl ResultsRepository for FileResultsRepository {
    async fn save_result(&self, payload: &ExportPayload) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path_for(payload);
        let body = serde_json::to_vec_pretty(payload)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "results exported locally");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("local export in {}", self.dir.display())
    }
}
