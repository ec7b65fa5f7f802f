// Export payload handed to the persistence collaborator at trial end
use crate::domain::event_log::{ClickRecord, ResponseRecord};
use crate::domain::trial::TrialConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub user_id: String,
    pub trial_label: String,
    pub trial_index: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub metadata: ExportMetadata,
    pub configuration: TrialConfig,
    pub responses: BTreeMap<String, ResponseRecord>,
    pub click_log: Vec<ClickRecord>,
}

impl ExportPayload {
    /// File stem used for local exports: `<user>_<label>_<YYYYMMDD_HHMMSS>`.
    pub fn file_stem(&self, stamp: &str) -> String {
        let clean = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
                .collect()
        };
        format!(
            "{}_{}_{}",
            clean(&self.metadata.user_id),
            clean(&self.metadata.trial_label),
            stamp
        )
    }
}
