// Trial runner - owns the current session and the timer task that drives it
use crate::application::chart_grid::{GridFrame, PointerEvent};
use crate::application::question_overlay::Submission;
use crate::application::results_repository::ResultsRepository;
use crate::application::series_source::{LoadError, SeriesSource};
use crate::application::step_clock::ClockState;
use crate::application::trial_session::{
    Advance, SessionContext, SessionError, SessionStatus, TrialSequence, TrialSession,
};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const FRAME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no trial is loaded")]
    NoSession,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", content = "message", rename_all = "camelCase")]
pub enum Phase {
    Loading,
    Running,
    Failed(String),
    Completed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FrameMessage {
    #[serde(rename_all = "camelCase")]
    Frame {
        index: usize,
        step: u32,
        state: ClockState,
        frame: GridFrame,
    },
    Finished { index: usize },
    Completed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerStatus {
    #[serde(flatten)]
    pub phase: Phase,
    pub trials: usize,
    pub trial_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStatus>,
}

struct RunnerState {
    sequence: TrialSequence,
    session: Option<TrialSession>,
    phase: Phase,
    timer: Option<JoinHandle<()>>,
}

impl RunnerState {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn session_mut(&mut self) -> Result<&mut TrialSession, RunnerError> {
        self.session.as_mut().ok_or(RunnerError::NoSession)
    }
}

pub struct TrialRunner {
    state: Mutex<RunnerState>,
    series: Arc<dyn SeriesSource>,
    results: Arc<dyn ResultsRepository>,
    fallback: Option<Arc<dyn ResultsRepository>>,
    ctx: SessionContext,
    frames: broadcast::Sender<FrameMessage>,
}

impl TrialRunner {
    pub fn new(
        sequence: TrialSequence,
        series: Arc<dyn SeriesSource>,
        results: Arc<dyn ResultsRepository>,
        fallback: Option<Arc<dyn ResultsRepository>>,
        ctx: SessionContext,
    ) -> Arc<Self> {
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Arc::new(Self {
            state: Mutex::new(RunnerState {
                sequence,
                session: None,
                phase: Phase::Loading,
                timer: None,
            }),
            series,
            results,
            fallback,
            ctx,
            frames,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FrameMessage> {
        self.frames.subscribe()
    }

    fn publish(&self, message: FrameMessage) {
        // Nobody listening is fine.
        let _ = self.frames.send(message);
    }

    fn publish_frame(&self, session: &TrialSession) {
        self.publish(FrameMessage::Frame {
            index: session.index(),
            step: session.step(),
            state: session.state(),
            frame: session.settled_frame(),
        });
    }

    /// Loads the current trial's data and starts its clock. Any failure
    /// leaves the runner in `Failed` with no partial grid.
    pub async fn start(self: &Arc<Self>) -> Result<(), RunnerError> {
        let (index, trial) = {
            let mut state = self.state.lock().await;
            state.stop_timer();
            state.session = None;
            state.phase = Phase::Loading;
            let index = state.sequence.index();
            match state.sequence.current() {
                Some(trial) => (index, trial.clone()),
                None => {
                    state.phase = Phase::Completed;
                    return Ok(());
                }
            }
        };

        let loaded = self.series.load_all(trial.charted_files()).await;
        let mut state = self.state.lock().await;
        let series = match loaded {
            Ok(series) => series,
            Err(e) => {
                tracing::error!(index, error = %e, "data load failed");
                state.phase = Phase::Failed(e.to_string());
                return Err(e.into());
            }
        };
        let session = match TrialSession::new(index, trial, series, &self.ctx) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(index, error = %e, "trial could not be initialised");
                state.phase = Phase::Failed(e.to_string());
                return Err(e.into());
            }
        };

        self.publish_frame(&session);
        let running = session.state() == ClockState::Running;
        let period = session.tick_interval_ms();
        state.session = Some(session);
        state.phase = Phase::Running;
        if running {
            self.start_timer(&mut state, index, period);
        }
        Ok(())
    }

    fn start_timer(self: &Arc<Self>, state: &mut RunnerState, index: usize, period_ms: u64) {
        state.stop_timer();
        let period = Duration::from_millis(period_ms.max(1));
        let runner = Arc::downgrade(self);
        state.timer = Some(tokio::spawn(drive(runner, index, period)));
        tracing::debug!(index, period_ms, "clock timer started");
    }

    /// Returns false once the timer should stop.
    async fn on_tick(&self, index: usize) -> bool {
        let mut state = self.state.lock().await;
        let Some(session) = state.session.as_mut().filter(|s| s.index() == index) else {
            return false;
        };
        let Some(report) = session.tick() else {
            return false;
        };
        self.publish_frame(session);
        if report.finished {
            self.publish(FrameMessage::Finished { index });
            state.timer = None;
            return false;
        }
        true
    }

    pub async fn toggle_pause(self: &Arc<Self>) -> Result<ClockState, RunnerError> {
        let mut state = self.state.lock().await;
        let session = state.session_mut()?;
        let clock_state = session.toggle_pause();
        let (index, period) = (session.index(), session.tick_interval_ms());
        match clock_state {
            ClockState::Paused => state.stop_timer(),
            ClockState::Running => self.start_timer(&mut state, index, period),
            ClockState::Finished => {}
        }
        Ok(clock_state)
    }

    pub async fn restart(self: &Arc<Self>) -> Result<Option<u32>, RunnerError> {
        let mut state = self.state.lock().await;
        let session = state.session_mut()?;
        let Some(step) = session.restart() else {
            return Ok(None);
        };
        self.publish_frame(session);
        let (index, period) = (session.index(), session.tick_interval_ms());
        self.start_timer(&mut state, index, period);
        Ok(Some(step))
    }

    pub async fn resize(&self, width: f64, height: f64) -> Result<bool, RunnerError> {
        let mut state = self.state.lock().await;
        let session = state.session_mut()?;
        let resized = session.observe_resize(width, height);
        if resized {
            self.publish_frame(session);
        }
        Ok(resized)
    }

    pub async fn pointer(&self, chart: usize, event: PointerEvent) -> Result<(), RunnerError> {
        let mut state = self.state.lock().await;
        state.session_mut()?.pointer(chart, event)?;
        Ok(())
    }

    pub async fn select_option(
        &self,
        question_id: &str,
        option: &str,
        checked: bool,
    ) -> Result<(), RunnerError> {
        let mut state = self.state.lock().await;
        state
            .session_mut()?
            .select_option(question_id, option, checked)?;
        Ok(())
    }

    pub async fn submit(&self, question_id: &str) -> Result<Submission, RunnerError> {
        let mut state = self.state.lock().await;
        Ok(state.session_mut()?.submit(question_id)?)
    }

    pub async fn status(&self) -> RunnerStatus {
        let state = self.state.lock().await;
        RunnerStatus {
            phase: state.phase.clone(),
            trials: state.sequence.len(),
            trial_index: state.sequence.index(),
            session: state.session.as_ref().map(TrialSession::status),
        }
    }

    pub async fn frame(&self) -> Option<GridFrame> {
        let state = self.state.lock().await;
        let now = self.ctx.clock.now_ms();
        state.session.as_ref().map(|s| s.frame_at(now))
    }

    /// Exports the finished trial, then moves on to the next one or
    /// completes the run.
    pub async fn next(self: &Arc<Self>) -> Result<Advance, RunnerError> {
        // The session leaves the runner with its export, so a second call
        // while results are being saved finds nothing to advance.
        let payload = {
            let mut state = self.state.lock().await;
            let payload = state.session_mut()?.export()?;
            state.stop_timer();
            state.session = None;
            state.phase = Phase::Loading;
            payload
        };
        self.persist(&payload).await;

        let advance = {
            let mut state = self.state.lock().await;
            let advance = state.sequence.advance();
            if advance == Advance::Completed {
                state.phase = Phase::Completed;
                tracing::info!("all trials completed");
            }
            advance
        };
        match advance {
            Advance::Next(_) => self.start().await?,
            Advance::Completed => self.publish(FrameMessage::Completed),
        }
        Ok(advance)
    }

    async fn persist(&self, payload: &crate::domain::export::ExportPayload) {
        let Err(e) = self.results.save_result(payload).await else {
            return;
        };
        tracing::warn!(
            target_store = %self.results.describe(),
            error = %e,
            "saving results failed"
        );
        let Some(fallback) = &self.fallback else {
            return;
        };
        if let Err(e) = fallback.save_result(payload).await {
            tracing::error!(
                target_store = %fallback.describe(),
                error = %e,
                "fallback export failed, results for this trial are lost"
            );
        }
    }
}

async fn drive(runner: Weak<TrialRunner>, index: usize, period: Duration) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(runner) = runner.upgrade() else {
            break;
        };
        if !runner.on_tick(index).await {
            break;
        }
    }
    tracing::debug!(index, "clock timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::results_repository::CueSink;
    use crate::application::scene::ApproxTextMeasure;
    use crate::domain::clock::ManualClock;
    use crate::domain::export::ExportPayload;
    use crate::domain::series::Series;
    use crate::domain::trial::TrialConfig;
    use async_trait::async_trait;
    use chrono::DateTime;

    struct GeneratedSeries {
        fail: bool,
    }

    #[async_trait]
    impl SeriesSource for GeneratedSeries {
        async fn load_all(&self, files: &[String]) -> Result<Vec<Series>, LoadError> {
            if self.fail {
                return Err(LoadError::Io {
                    file: files[0].clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            Ok(files
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let values: Vec<f64> = (0..40).map(|v| ((v * 7 + i * 13) % 100) as f64).collect();
                    Series::from_values(f.clone(), &values).unwrap()
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct MemoryResults {
        fail: bool,
        delay_ms: u64,
        saved: std::sync::Mutex<Vec<ExportPayload>>,
    }

    #[async_trait]
    impl ResultsRepository for MemoryResults {
        async fn save_result(&self, payload: &ExportPayload) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if self.fail {
                anyhow::bail!("results service unavailable");
            }
            self.saved.lock().unwrap().push(payload.clone());
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    struct SilentCue;

    impl CueSink for SilentCue {
        fn play(&self, _step: u32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn trial(setup: &str) -> TrialConfig {
        serde_json::from_value(serde_json::json!({
            "setup": setup,
            "files": ["m1.csv", "m2.csv"],
            "setup-length": 15,
            "num-rows": 1,
            "num-columns": 2,
            "anim-duration": 400,
            "anim-delay": 100,
            "num-points": 10
        }))
        .unwrap()
    }

    fn runner(
        fail_load: bool,
        results: Arc<MemoryResults>,
        fallback: Option<Arc<MemoryResults>>,
    ) -> Arc<TrialRunner> {
        let ctx = SessionContext {
            user_id: "p01".to_string(),
            clock: Arc::new(ManualClock::new(DateTime::from_timestamp_millis(0).unwrap())),
            measure: Arc::new(ApproxTextMeasure),
            cue: Arc::new(SilentCue),
            container: (800.0, 400.0),
            axis_padding: None,
        };
        let sequence = TrialSequence::new(vec![trial("A"), trial("B")], 0).unwrap();
        TrialRunner::new(
            sequence,
            Arc::new(GeneratedSeries { fail: fail_load }),
            results,
            fallback.map(|f| f as Arc<dyn ResultsRepository>),
            ctx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_drives_clock_to_finish() {
        let results = Arc::new(MemoryResults::default());
        let runner = runner(false, results.clone(), None);
        let mut frames = runner.subscribe();
        runner.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(5 * 500 + 50)).await;
        let status = runner.status().await;
        let session = status.session.unwrap();
        assert_eq!(session.step, 6);
        assert_eq!(session.state, ClockState::Finished);
        assert!(session.proceed_enabled);

        let mut steps = Vec::new();
        while let Ok(message) = frames.try_recv() {
            if let FrameMessage::Frame { step, .. } = message {
                steps.push(step);
            }
        }
        assert_eq!(steps, vec![1, 2, 3, 4, 5, 6]);

        assert_eq!(runner.next().await.unwrap(), Advance::Next(1));
        assert_eq!(results.saved.lock().unwrap().len(), 1);
        assert_eq!(runner.status().await.session.unwrap().setup, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_ticks() {
        let runner = runner(false, Arc::new(MemoryResults::default()), None);
        runner.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        assert_eq!(runner.toggle_pause().await.unwrap(), ClockState::Paused);

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(runner.status().await.session.unwrap().step, 3);

        assert_eq!(runner.toggle_pause().await.unwrap(), ClockState::Running);
        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(runner.status().await.session.unwrap().step, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_before_finish_is_rejected() {
        let runner = runner(false, Arc::new(MemoryResults::default()), None);
        runner.start().await.unwrap();
        assert!(matches!(
            runner.next().await,
            Err(RunnerError::Session(SessionError::NotFinished(0)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_uses_fallback_and_proceeds() {
        let failing = Arc::new(MemoryResults {
            fail: true,
            ..Default::default()
        });
        let fallback = Arc::new(MemoryResults::default());
        let runner = runner(false, failing, Some(fallback.clone()));
        runner.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_000)).await;

        assert_eq!(runner.next().await.unwrap(), Advance::Next(1));
        assert_eq!(fallback.saved.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(runner.next().await.unwrap(), Advance::Completed);
        assert_eq!(runner.status().await.phase, Phase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_next_advances_once() {
        let results = Arc::new(MemoryResults {
            delay_ms: 50,
            ..Default::default()
        });
        let runner = runner(false, results.clone(), None);
        runner.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_000)).await;

        let (first, second) = tokio::join!(runner.next(), runner.next());
        assert_eq!(first.unwrap(), Advance::Next(1));
        assert!(matches!(second, Err(RunnerError::NoSession)));

        let saved = results.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].metadata.trial_label, "A");
        drop(saved);
        let status = runner.status().await;
        assert_eq!(status.trial_index, 1);
        assert_eq!(status.session.unwrap().setup, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_leaves_no_grid() {
        let runner = runner(true, Arc::new(MemoryResults::default()), None);
        assert!(matches!(runner.start().await, Err(RunnerError::Load(_))));
        let status = runner.status().await;
        assert!(matches!(status.phase, Phase::Failed(_)));
        assert!(status.session.is_none());
        assert!(runner.frame().await.is_none());
    }
}
