// Question overlay - shows scheduled questions and tracks their answers
use crate::domain::event_log::ResponseValue;
use crate::domain::trial::{Question, QuestionType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Selections required by a checkbox question laid out over the chart grid.
pub const GRID_SELECTION_COUNT: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum QuestionError {
    #[error("question {0} is not on screen")]
    NotActive(String),
    #[error("question {id} has no option {option:?}")]
    UnknownOption { id: String, option: String },
    #[error("option {option:?} of question {id} is disabled")]
    OptionDisabled { id: String, option: String },
    #[error("question {0} was already submitted")]
    AlreadySubmitted(String),
    #[error("question {0} is not complete")]
    Incomplete(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OptionLayout {
    Vertical,
    Grid { rows: usize, cols: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "count", rename_all = "camelCase")]
pub enum Completion {
    SingleChoice,
    AtLeastOne,
    Exactly(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionState {
    pub label: String,
    pub checked: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveQuestion {
    pub id: String,
    pub prompt: String,
    pub kind: QuestionType,
    pub layout: OptionLayout,
    pub completion: Completion,
    pub options: Vec<OptionState>,
    pub submit_enabled: bool,
    pub submitted: bool,
    #[serde(skip)]
    shown_at: DateTime<Utc>,
}

impl ActiveQuestion {
    fn checked(&self) -> impl Iterator<Item = &OptionState> {
        self.options.iter().filter(|o| o.checked)
    }

    fn refresh(&mut self) {
        let count = self.checked().count();
        match self.completion {
            Completion::SingleChoice | Completion::AtLeastOne => {
                self.submit_enabled = count >= 1;
            }
            Completion::Exactly(n) => {
                let full = count >= n;
                for option in &mut self.options {
                    option.disabled = full && !option.checked;
                }
                self.submit_enabled = count == n;
            }
        }
    }

    fn response(&self) -> ResponseValue {
        let mut labels = self.checked().map(|o| o.label.clone());
        match self.kind {
            QuestionType::Radio => ResponseValue::Single(labels.next().unwrap_or_default()),
            QuestionType::Checkbox => ResponseValue::Multiple(labels.collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub question_id: String,
    pub response: ResponseValue,
    pub response_time_millis: u64,
}

pub struct QuestionOverlay {
    schedule: Vec<Question>,
    active: Vec<ActiveQuestion>,
    chart_count: usize,
    rows: usize,
    cols: usize,
}

impl QuestionOverlay {
    /// Entries outside `[2, setup_length]`, without options, or with a
    /// repeated id are dropped; an empty schedule simply shows nothing.
    /// The first tick lands on step 2, so step 1 is never evaluated.
    pub fn new(
        questions: Vec<Question>,
        setup_length: u32,
        chart_count: usize,
        rows: usize,
        cols: usize,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut schedule: Vec<Question> = questions
            .into_iter()
            .filter(|q| {
                let keep = q.step >= 2
                    && q.step <= setup_length
                    && !q.options.is_empty()
                    && seen.insert(q.id.clone());
                if !keep {
                    tracing::warn!(id = %q.id, step = q.step, "dropping unusable question");
                }
                keep
            })
            .collect();
        schedule.sort_by_key(|q| q.step);

        Self {
            schedule,
            active: Vec::new(),
            chart_count,
            rows,
            cols,
        }
    }

    pub fn active(&self) -> &[ActiveQuestion] {
        &self.active
    }

    /// Replaces whatever is on screen with every entry scheduled at `step`.
    /// Steps without entries leave the screen alone. Returns how many
    /// questions were shown.
    pub fn on_step(&mut self, step: u32, now: DateTime<Utc>) -> usize {
        let due: Vec<ActiveQuestion> = self
            .schedule
            .iter()
            .filter(|q| q.step == step)
            .map(|q| self.activate(q, now))
            .collect();
        if due.is_empty() {
            return 0;
        }
        tracing::info!(step, count = due.len(), "showing questions");
        self.active = due;
        self.active.len()
    }

    fn activate(&self, question: &Question, now: DateTime<Utc>) -> ActiveQuestion {
        let use_grid = question.options.len() == self.chart_count && self.chart_count > 3;
        let layout = if use_grid {
            OptionLayout::Grid {
                rows: self.rows,
                cols: self.cols,
            }
        } else {
            OptionLayout::Vertical
        };
        let completion = match (question.kind, use_grid) {
            (QuestionType::Radio, _) => Completion::SingleChoice,
            (QuestionType::Checkbox, true) => Completion::Exactly(GRID_SELECTION_COUNT),
            (QuestionType::Checkbox, false) => Completion::AtLeastOne,
        };

        ActiveQuestion {
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            kind: question.kind,
            layout,
            completion,
            options: question
                .options
                .iter()
                .map(|label| OptionState {
                    label: label.clone(),
                    checked: false,
                    disabled: false,
                })
                .collect(),
            submit_enabled: false,
            submitted: false,
            shown_at: now,
        }
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut ActiveQuestion, QuestionError> {
        self.active
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| QuestionError::NotActive(id.to_string()))
    }

    pub fn select(&mut self, id: &str, option: &str, checked: bool) -> Result<(), QuestionError> {
        let question = self.find_mut(id)?;
        if question.submitted {
            return Err(QuestionError::AlreadySubmitted(id.to_string()));
        }
        let position = question
            .options
            .iter()
            .position(|o| o.label == option)
            .ok_or_else(|| QuestionError::UnknownOption {
                id: id.to_string(),
                option: option.to_string(),
            })?;
        if question.options[position].disabled && checked {
            return Err(QuestionError::OptionDisabled {
                id: id.to_string(),
                option: option.to_string(),
            });
        }

        match question.kind {
            QuestionType::Radio => {
                // A radio option cannot be unchecked directly.
                if checked {
                    for (i, o) in question.options.iter_mut().enumerate() {
                        o.checked = i == position;
                    }
                }
            }
            QuestionType::Checkbox => question.options[position].checked = checked,
        }
        question.refresh();
        Ok(())
    }

    /// Locks the question and returns its answer with the time since it was
    /// shown.
    pub fn submit(&mut self, id: &str, now: DateTime<Utc>) -> Result<Submission, QuestionError> {
        let question = self.find_mut(id)?;
        if question.submitted {
            return Err(QuestionError::AlreadySubmitted(id.to_string()));
        }
        if !question.submit_enabled {
            return Err(QuestionError::Incomplete(id.to_string()));
        }

        let elapsed = (now - question.shown_at).num_milliseconds().max(0) as u64;
        let response = question.response();
        question.submitted = true;
        question.submit_enabled = false;
        for option in &mut question.options {
            option.disabled = true;
        }

        Ok(Submission {
            question_id: id.to_string(),
            response,
            response_time_millis: elapsed,
        })
    }
}
