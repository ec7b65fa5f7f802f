// Interaction and response log kept for the duration of one trial
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickRecord {
    pub title: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub response: ResponseValue,
    pub response_time_millis: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    Click(ClickRecord),
    Response {
        question_id: String,
        record: ResponseRecord,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub event: LogEvent,
    pub timestamp: DateTime<Utc>,
}

/// Append-only, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_click(&mut self, title: &str, at: DateTime<Utc>) {
        let record = ClickRecord {
            title: title.to_string(),
            timestamp: at.timestamp_millis(),
            date: at.to_rfc2822(),
        };
        self.entries.push(LogEntry {
            event: LogEvent::Click(record),
            timestamp: at,
        });
    }

    pub fn record_response(
        &mut self,
        question_id: &str,
        response: ResponseValue,
        response_time_millis: u64,
        at: DateTime<Utc>,
    ) {
        let record = ResponseRecord {
            response,
            response_time_millis,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.entries.push(LogEntry {
            event: LogEvent::Response {
                question_id: question_id.to_string(),
                record,
            },
            timestamp: at,
        });
    }

    pub fn clicks(&self) -> Vec<ClickRecord> {
        self.entries
            .iter()
            .filter_map(|e| match &e.event {
                LogEvent::Click(click) => Some(click.clone()),
                _ => None,
            })
            .collect()
    }

    /// Latest response per question id.
    pub fn responses(&self) -> BTreeMap<String, ResponseRecord> {
        self.entries
            .iter()
            .filter_map(|e| match &e.event {
                LogEvent::Response {
                    question_id,
                    record,
                } => Some((question_id.clone(), record.clone())),
                _ => None,
            })
            .collect()
    }
}
