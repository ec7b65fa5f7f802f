// Trial session - one trial's grid, clock, questions and log, plus the trial sequence
use crate::application::chart_grid::{ChartGrid, GridConfig, GridError, GridFrame, PointerEvent};
use crate::application::chart_instance::UpdateOutcome;
use crate::application::question_overlay::{ActiveQuestion, QuestionError, QuestionOverlay, Submission};
use crate::application::results_repository::CueSink;
use crate::application::scene::TextMeasure;
use crate::application::step_clock::{ClockState, StepClock};
use crate::domain::clock::Clock;
use crate::domain::event_log::EventLog;
use crate::domain::export::{ExportMetadata, ExportPayload};
use crate::domain::series::Series;
use crate::domain::trial::{ConfigError, TrialConfig};
use chrono::SecondsFormat;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error("trial {0} has not finished")]
    NotFinished(usize),
}

/// Collaborators shared by every trial of a run.
#[derive(Clone)]
pub struct SessionContext {
    pub user_id: String,
    pub clock: Arc<dyn Clock>,
    pub measure: Arc<dyn TextMeasure>,
    pub cue: Arc<dyn CueSink>,
    pub container: (f64, f64),
    pub axis_padding: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub step: u32,
    pub outcome: UpdateOutcome,
    pub questions_shown: usize,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub index: usize,
    pub setup: String,
    pub step: u32,
    pub final_step: u32,
    pub state: ClockState,
    pub charts: usize,
    pub questions: Vec<ActiveQuestion>,
    pub proceed_enabled: bool,
    /// Window-size controls may only be edited while paused.
    pub controls_editable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_average: Option<String>,
}

pub struct TrialSession {
    index: usize,
    trial: TrialConfig,
    grid: ChartGrid,
    clock: StepClock,
    overlay: QuestionOverlay,
    log: EventLog,
    sound_steps: BTreeSet<u32>,
    user_id: String,
    wall: Arc<dyn Clock>,
    cue: Arc<dyn CueSink>,
}

impl TrialSession {
    pub fn new(
        index: usize,
        trial: TrialConfig,
        series: Vec<Series>,
        ctx: &SessionContext,
    ) -> Result<Self, SessionError> {
        trial.validate()?;
        // The clock walks the window up to sample L, so every series must reach it.
        if let Some(short) = series
            .iter()
            .find(|s| s.len() < trial.setup_length as usize)
        {
            return Err(ConfigError::DataTooShort {
                file: short.name().to_string(),
                len: short.len(),
                setup_length: trial.setup_length,
            }
            .into());
        }

        let mut grid_config = GridConfig::from_trial(&trial, ctx.container);
        grid_config.axis_padding = ctx.axis_padding;
        let grid = ChartGrid::new(series, &grid_config, ctx.clock.clone(), ctx.measure.clone())?;

        let clock = StepClock::new(trial.num_points as u32, trial.setup_length);
        let overlay = QuestionOverlay::new(
            trial.questions.clone(),
            trial.setup_length,
            grid.len(),
            trial.rows,
            trial.cols,
        );

        tracing::info!(
            index,
            setup = %trial.setup,
            charts = grid.len(),
            final_step = clock.final_step(),
            "trial ready"
        );

        Ok(Self {
            index,
            sound_steps: trial.sound.iter().copied().collect(),
            trial,
            grid,
            clock,
            overlay,
            log: EventLog::new(),
            user_id: ctx.user_id.clone(),
            wall: ctx.clock.clone(),
            cue: ctx.cue.clone(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn grid(&self) -> &ChartGrid {
        &self.grid
    }

    pub fn step(&self) -> u32 {
        self.clock.step()
    }

    pub fn state(&self) -> ClockState {
        self.clock.state()
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.trial.tick_interval_ms()
    }

    fn anim_duration_ms(&self) -> f64 {
        self.trial.anim_duration as f64
    }

    /// One timer tick: advance, move every chart, show due questions, play
    /// the cue. `None` when the clock is not running.
    pub fn tick(&mut self) -> Option<TickReport> {
        let step = self.clock.tick()?;
        let outcome = self.grid.update_all(step, self.anim_duration_ms());
        if outcome == UpdateOutcome::WindowExceeded {
            tracing::warn!(index = self.index, step, "window exceeded the data");
        }

        let questions_shown = self.overlay.on_step(step, self.wall.now());
        if self.sound_steps.contains(&step) {
            if let Err(e) = self.cue.play(step) {
                tracing::warn!(step, error = %e, "cue sound failed");
            }
        }

        let finished = self.clock.is_finished();
        if finished {
            tracing::info!(index = self.index, step, "trial finished");
        }
        Some(TickReport {
            step,
            outcome,
            questions_shown,
            finished,
        })
    }

    pub fn toggle_pause(&mut self) -> ClockState {
        let state = self.clock.toggle_pause();
        tracing::info!(index = self.index, step = self.clock.step(), ?state, "pause toggled");
        state
    }

    /// Back to step 1, re-rendering every chart before the clock resumes.
    pub fn restart(&mut self) -> Option<u32> {
        let step = self.clock.restart()?;
        self.grid.update_all(step, self.anim_duration_ms());
        tracing::info!(index = self.index, "trial restarted");
        Some(step)
    }

    pub fn observe_resize(&mut self, width: f64, height: f64) -> bool {
        self.grid.observe_resize(width, height)
    }

    pub fn pointer(&mut self, chart: usize, event: PointerEvent) -> Result<(), SessionError> {
        let now = self.wall.now();
        self.grid.pointer(chart, event, now, &mut self.log)?;
        Ok(())
    }

    pub fn select_option(
        &mut self,
        question_id: &str,
        option: &str,
        checked: bool,
    ) -> Result<(), SessionError> {
        self.overlay.select(question_id, option, checked)?;
        Ok(())
    }

    pub fn submit(&mut self, question_id: &str) -> Result<Submission, SessionError> {
        let now = self.wall.now();
        let submission = self.overlay.submit(question_id, now)?;
        self.log.record_response(
            &submission.question_id,
            submission.response.clone(),
            submission.response_time_millis,
            now,
        );
        tracing::info!(
            question = %submission.question_id,
            millis = submission.response_time_millis,
            "response recorded"
        );
        Ok(submission)
    }

    pub fn export(&self) -> Result<ExportPayload, SessionError> {
        if !self.clock.is_finished() {
            return Err(SessionError::NotFinished(self.index));
        }
        Ok(ExportPayload {
            metadata: ExportMetadata {
                user_id: self.user_id.clone(),
                trial_label: self.trial.setup.clone(),
                trial_index: self.index,
                timestamp: self.wall.now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
            configuration: self.trial.clone(),
            responses: self.log.responses(),
            click_log: self.log.clicks(),
        })
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            index: self.index,
            setup: self.trial.setup.clone(),
            step: self.clock.step(),
            final_step: self.clock.final_step(),
            state: self.clock.state(),
            charts: self.grid.len(),
            questions: self.overlay.active().to_vec(),
            proceed_enabled: self.clock.is_finished(),
            controls_editable: self.clock.state() == ClockState::Paused,
            rolling_average: self.trial.rolling_average_description(),
        }
    }

    pub fn frame_at(&self, now_ms: f64) -> GridFrame {
        self.grid.frame_at(now_ms)
    }

    /// The frame as it will look once the running transition settles.
    pub fn settled_frame(&self) -> GridFrame {
        self.grid.frame_at(self.wall.now_ms() + self.anim_duration_ms())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "camelCase")]
pub enum Advance {
    Next(usize),
    Completed,
}

/// Ordered trials with the index of the current one.
#[derive(Debug, Clone)]
pub struct TrialSequence {
    trials: Vec<TrialConfig>,
    index: usize,
}

impl TrialSequence {
    pub fn new(trials: Vec<TrialConfig>, start: usize) -> Result<Self, ConfigError> {
        if trials.is_empty() {
            return Err(ConfigError::NoTrials);
        }
        if start >= trials.len() {
            return Err(ConfigError::IndexOutOfRange {
                index: start,
                len: trials.len(),
            });
        }
        Ok(Self {
            trials,
            index: start,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn current(&self) -> Option<&TrialConfig> {
        self.trials.get(self.index)
    }

    pub fn advance(&mut self) -> Advance {
        if self.index < self.trials.len() {
            self.index += 1;
        }
        if self.index < self.trials.len() {
            Advance::Next(self.index)
        } else {
            Advance::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scene::ApproxTextMeasure;
    use crate::domain::clock::ManualClock;
    use crate::domain::event_log::ResponseValue;
    use chrono::DateTime;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCue {
        played: Mutex<Vec<u32>>,
        fail: bool,
    }

    impl CueSink for RecordingCue {
        fn play(&self, step: u32) -> anyhow::Result<()> {
            self.played.lock().unwrap().push(step);
            if self.fail {
                anyhow::bail!("no audio device");
            }
            Ok(())
        }
    }

    fn trial() -> TrialConfig {
        serde_json::from_value(serde_json::json!({
            "setup": "Setup A",
            "files": ["m1.csv", "m2.csv", "m3.csv", "m4.csv"],
            "setup-length": 15,
            "num-rows": 2,
            "num-columns": 2,
            "anim-duration": 500,
            "anim-delay": 100,
            "num-points": 10,
            "questions": [
                {"id": "q1", "prompt": "Which machine?", "type": "radio",
                 "options": ["A", "B", "C"], "step": 4}
            ],
            "sound": [4]
        }))
        .unwrap()
    }

    fn series(n: usize) -> Vec<Series> {
        (0..n)
            .map(|i| {
                let values: Vec<f64> = (0..20).map(|v| (v * 5 + i) as f64).collect();
                Series::from_values(format!("m{}.csv", i + 1), &values).unwrap()
            })
            .collect()
    }

    fn context(cue: Arc<RecordingCue>) -> (SessionContext, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        ));
        let ctx = SessionContext {
            user_id: "p01".to_string(),
            clock: clock.clone(),
            measure: Arc::new(ApproxTextMeasure),
            cue,
            container: (800.0, 600.0),
            axis_padding: None,
        };
        (ctx, clock)
    }

    #[test]
    fn test_runs_to_finish_and_exports() {
        let cue = Arc::new(RecordingCue::default());
        let (ctx, clock) = context(cue.clone());
        let mut session = TrialSession::new(0, trial(), series(4), &ctx).unwrap();

        let mut steps = Vec::new();
        while let Some(report) = session.tick() {
            assert_eq!(report.outcome, UpdateOutcome::Ok);
            steps.push(report.step);
            if report.step == 4 {
                assert_eq!(report.questions_shown, 1);
                clock.advance_ms(1_250);
                session.select_option("q1", "B", true).unwrap();
                session.submit("q1").unwrap();
            }
        }
        assert_eq!(steps, vec![2, 3, 4, 5, 6]);
        assert_eq!(session.state(), ClockState::Finished);
        assert_eq!(*cue.played.lock().unwrap(), vec![4]);

        let payload = session.export().unwrap();
        assert_eq!(payload.metadata.user_id, "p01");
        assert_eq!(payload.metadata.trial_label, "Setup A");
        let record = &payload.responses["q1"];
        assert_eq!(record.response, ResponseValue::Single("B".to_string()));
        assert_eq!(record.response_time_millis, 1_250);
    }

    #[test]
    fn test_export_requires_finished() {
        let (ctx, _) = context(Arc::new(RecordingCue::default()));
        let session = TrialSession::new(1, trial(), series(4), &ctx).unwrap();
        assert!(matches!(session.export(), Err(SessionError::NotFinished(1))));
        assert!(!session.status().proceed_enabled);
    }

    #[test]
    fn test_pause_and_restart() {
        let (ctx, _) = context(Arc::new(RecordingCue::default()));
        let mut session = TrialSession::new(0, trial(), series(4), &ctx).unwrap();
        session.tick();
        session.tick();
        assert_eq!(session.toggle_pause(), ClockState::Paused);
        assert!(session.tick().is_none());
        assert!(session.status().controls_editable);

        assert_eq!(session.restart(), Some(1));
        assert_eq!(session.state(), ClockState::Running);
        assert!(session.grid().charts().iter().all(|c| c.step() == 1));
        assert_eq!(session.tick().map(|r| r.step), Some(2));
    }

    #[test]
    fn test_cue_failure_does_not_stop_clock() {
        let cue = Arc::new(RecordingCue {
            fail: true,
            ..Default::default()
        });
        let (ctx, _) = context(cue.clone());
        let mut session = TrialSession::new(0, trial(), series(4), &ctx).unwrap();
        let reports: Vec<TickReport> = std::iter::from_fn(|| session.tick()).collect();
        assert_eq!(reports.len(), 5);
        assert_eq!(cue.played.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_clicks_are_exported() {
        let (ctx, _) = context(Arc::new(RecordingCue::default()));
        let mut session = TrialSession::new(0, trial(), series(4), &ctx).unwrap();
        session.pointer(3, PointerEvent::Click).unwrap();
        while session.tick().is_some() {}
        let payload = session.export().unwrap();
        assert_eq!(payload.click_log.len(), 1);
        assert_eq!(payload.click_log[0].title, "Machine 4");
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let (ctx, _) = context(Arc::new(RecordingCue::default()));
        let mut bad = trial();
        bad.setup_length = 3;
        assert!(matches!(
            TrialSession::new(0, bad, series(4), &ctx),
            Err(SessionError::Config(ConfigError::SetupTooShort { .. }))
        ));
    }

    #[test]
    fn test_questions_only_appear_on_ticks() {
        let (ctx, _) = context(Arc::new(RecordingCue::default()));
        let mut session = TrialSession::new(0, trial(), series(4), &ctx).unwrap();
        assert!(session.status().questions.is_empty());

        while session.step() < 4 {
            session.tick();
        }
        assert_eq!(session.status().questions.len(), 1);

        session.toggle_pause();
        assert_eq!(session.restart(), Some(1));
        assert_eq!(session.status().questions[0].id, "q1");
    }

    #[test]
    fn test_series_shorter_than_setup_is_rejected() {
        let (ctx, _) = context(Arc::new(RecordingCue::default()));
        let mut long = trial();
        long.setup_length = 40;
        assert_eq!(
            TrialSession::new(0, long, series(4), &ctx).err().map(|e| e.to_string()),
            Some("m1.csv has 20 samples but the setup length is 40".to_string())
        );

        let mut exact = trial();
        exact.setup_length = 20;
        let mut session = TrialSession::new(0, exact, series(4), &ctx).unwrap();
        while let Some(report) = session.tick() {
            assert_eq!(report.outcome, UpdateOutcome::Ok);
        }
        assert_eq!(session.step(), 11);
    }

    #[test]
    fn test_sequence_advances_to_completion() {
        let mut sequence = TrialSequence::new(vec![trial(), trial()], 0).unwrap();
        assert_eq!(sequence.advance(), Advance::Next(1));
        assert_eq!(sequence.advance(), Advance::Completed);
        assert!(sequence.current().is_none());
        assert_eq!(sequence.advance(), Advance::Completed);

        assert_eq!(
            TrialSequence::new(vec![trial()], 3).err(),
            Some(ConfigError::IndexOutOfRange { index: 3, len: 1 })
        );
        assert_eq!(TrialSequence::new(Vec::new(), 0).err(), Some(ConfigError::NoTrials));
    }
}
