// Step clock - the discrete tick counter that drives every chart
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClockState {
    Running,
    Paused,
    Finished,
}

/// Starts RUNNING at step 1. FINISHED once `step + view_range - 1` reaches
/// the setup length, and there is no way back out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepClock {
    step: u32,
    view_range: u32,
    setup_length: u32,
    state: ClockState,
}

impl StepClock {
    pub fn new(view_range: u32, setup_length: u32) -> Self {
        let mut clock = Self {
            step: 1,
            view_range,
            setup_length,
            state: ClockState::Running,
        };
        if clock.window_exhausted() {
            clock.state = ClockState::Finished;
        }
        clock
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == ClockState::Finished
    }

    /// Last step the clock will ever reach.
    pub fn final_step(&self) -> u32 {
        (self.setup_length + 1).saturating_sub(self.view_range).max(1)
    }

    fn window_exhausted(&self) -> bool {
        self.step + self.view_range.saturating_sub(1) >= self.setup_length
    }

    /// Advances one step while running. Returns the new step.
    pub fn tick(&mut self) -> Option<u32> {
        if self.state != ClockState::Running {
            return None;
        }
        self.step += 1;
        if self.window_exhausted() {
            self.state = ClockState::Finished;
        }
        Some(self.step)
    }

    pub fn pause(&mut self) -> bool {
        if self.state == ClockState::Running {
            self.state = ClockState::Paused;
            return true;
        }
        false
    }

    pub fn resume(&mut self) -> bool {
        if self.state == ClockState::Paused {
            self.state = ClockState::Running;
            return true;
        }
        false
    }

    pub fn toggle_pause(&mut self) -> ClockState {
        if !self.pause() {
            self.resume();
        }
        self.state
    }

    /// Back to step 1 and running. Ignored once finished.
    pub fn restart(&mut self) -> Option<u32> {
        if self.state == ClockState::Finished {
            return None;
        }
        self.step = 1;
        self.state = ClockState::Running;
        Some(self.step)
    }
}
