// Trial configuration produced by the external config generator
use crate::domain::encoding::{LabelPosition, LabelSizing};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("trial {setup:?} lists no data files")]
    NoFiles { setup: String },
    #[error("trial {setup:?} has an empty grid ({rows}x{cols})")]
    EmptyGrid {
        setup: String,
        rows: usize,
        cols: usize,
    },
    #[error("trial {setup:?} shows no points")]
    NoPoints { setup: String },
    #[error("trial {setup:?}: setup length {setup_length} is shorter than the view range {view_range}")]
    SetupTooShort {
        setup: String,
        setup_length: u32,
        view_range: usize,
    },
    #[error("{file} has {len} samples but the setup length is {setup_length}")]
    DataTooShort {
        file: String,
        len: usize,
        setup_length: u32,
    },
    #[error("trial {setup:?}: animation duration must be positive")]
    ZeroDuration { setup: String },
    #[error("trial index {index} is out of range ({len} trials configured)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no trials configured")]
    NoTrials,
}

fn enabled() -> bool {
    true
}

fn default_rolling_avg() -> usize {
    1
}

/// Display switches selected per trial. Enum-valued options are fixed for
/// the lifetime of every chart built from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayOptions {
    #[serde(rename = "vis-showXAxisTicks", default = "enabled")]
    pub show_x_axis_ticks: bool,
    #[serde(rename = "vis-useThresholdColors", default = "enabled")]
    pub use_threshold_colors: bool,
    #[serde(rename = "vis-easeInOut", default)]
    pub ease_in_out: bool,
    #[serde(rename = "vis-xAxisInverseStatic", default)]
    pub x_axis_inverse_static: bool,
    #[serde(rename = "vis-backgroundEncoding", default)]
    pub background_encoding: bool,
    #[serde(rename = "vis-useRollingAverage", default)]
    pub use_rolling_average: bool,
    #[serde(rename = "vis-gridBackgroundMove", default)]
    pub grid_background_move: bool,
    #[serde(rename = "vis-showThresholdBand", default)]
    pub show_threshold_band: bool,
    #[serde(rename = "vis-showVerticalBar", default)]
    pub show_vertical_bar: bool,
    #[serde(rename = "vis-dynamicLabelSize", default)]
    pub dynamic_label_size: LabelSizing,
    #[serde(rename = "vis-labelPosition", default)]
    pub label_position: LabelPosition,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_x_axis_ticks: true,
            use_threshold_colors: true,
            ease_in_out: false,
            x_axis_inverse_static: false,
            background_encoding: false,
            use_rolling_average: false,
            grid_background_move: false,
            show_threshold_band: false,
            show_vertical_bar: false,
            dynamic_label_size: LabelSizing::None,
            label_position: LabelPosition::Follow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Radio,
    Checkbox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    pub step: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

/// Steps where the generator must not place questions. Exported as
/// `{start, end}`; read back from either that or a `[start, end]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RangeRepr")]
pub struct NoQuestionRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Pair(u32, u32),
    Object { start: u32, end: u32 },
}

impl From<RangeRepr> for NoQuestionRange {
    fn from(repr: RangeRepr) -> Self {
        match repr {
            RangeRepr::Pair(start, end) | RangeRepr::Object { start, end } => Self { start, end },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfig {
    #[serde(default)]
    pub setup: String,
    pub files: Vec<String>,
    #[serde(rename = "setup-length")]
    pub setup_length: u32,
    #[serde(rename = "num-rows")]
    pub rows: usize,
    #[serde(rename = "num-columns")]
    pub cols: usize,
    #[serde(rename = "anim-duration")]
    pub anim_duration: u64,
    #[serde(rename = "anim-delay", default)]
    pub anim_delay: u64,
    #[serde(rename = "num-points")]
    pub num_points: usize,
    #[serde(rename = "rolling-avg", default = "default_rolling_avg")]
    pub rolling_avg: usize,
    #[serde(flatten)]
    pub display: DisplayOptions,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub sound: Vec<u32>,
    #[serde(rename = "no-questions", default)]
    pub no_questions: Vec<NoQuestionRange>,
    #[serde(rename = "min-spacing", default, skip_serializing_if = "Option::is_none")]
    pub min_spacing: Option<u32>,
}

impl TrialConfig {
    /// Structural checks. A bad question schedule is not an error here; the
    /// overlay drops entries it cannot show.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let setup = self.setup.clone();
        if self.files.is_empty() {
            return Err(ConfigError::NoFiles { setup });
        }
        if self.rows == 0 || self.cols == 0 {
            return Err(ConfigError::EmptyGrid {
                setup,
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.num_points == 0 {
            return Err(ConfigError::NoPoints { setup });
        }
        if (self.setup_length as usize) < self.num_points {
            return Err(ConfigError::SetupTooShort {
                setup,
                setup_length: self.setup_length,
                view_range: self.num_points,
            });
        }
        if self.anim_duration == 0 {
            return Err(ConfigError::ZeroDuration { setup });
        }
        Ok(())
    }

    /// Rolling-average window clamped to `[1, num_points]`.
    pub fn effective_rolling_avg(&self) -> usize {
        self.rolling_avg.clamp(1, self.num_points.max(1))
    }

    /// Files actually charted: excess files beyond the grid are dropped.
    pub fn charted_files(&self) -> &[String] {
        let capacity = self.rows * self.cols;
        &self.files[..self.files.len().min(capacity)]
    }

    /// Timer cadence: animation plus settling delay.
    pub fn tick_interval_ms(&self) -> u64 {
        self.anim_duration + self.anim_delay
    }

    pub fn rolling_average_description(&self) -> Option<String> {
        self.display.use_rolling_average.then(|| {
            format!(
                "The rolling average is considering the last {} points.",
                self.effective_rolling_avg()
            )
        })
    }
}

/// Locked overrides applied on top of every trial.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Preset {
    pub files: Option<Vec<String>>,
    pub num_points: Option<usize>,
    pub anim_duration: Option<u64>,
    pub anim_delay: Option<u64>,
    pub rolling_avg: Option<usize>,
    #[serde(rename = "vis-showXAxisTicks")]
    pub show_x_axis_ticks: Option<bool>,
    #[serde(rename = "vis-useThresholdColors")]
    pub use_threshold_colors: Option<bool>,
    #[serde(rename = "vis-easeInOut")]
    pub ease_in_out: Option<bool>,
    #[serde(rename = "vis-xAxisInverseStatic")]
    pub x_axis_inverse_static: Option<bool>,
    #[serde(rename = "vis-backgroundEncoding")]
    pub background_encoding: Option<bool>,
    #[serde(rename = "vis-useRollingAverage")]
    pub use_rolling_average: Option<bool>,
    #[serde(rename = "vis-gridBackgroundMove")]
    pub grid_background_move: Option<bool>,
    #[serde(rename = "vis-showThresholdBand")]
    pub show_threshold_band: Option<bool>,
    #[serde(rename = "vis-showVerticalBar")]
    pub show_vertical_bar: Option<bool>,
    #[serde(rename = "vis-dynamicLabelSize")]
    pub dynamic_label_size: Option<LabelSizing>,
    #[serde(rename = "vis-labelPosition")]
    pub label_position: Option<LabelPosition>,
}

impl Preset {
    pub fn apply(&self, trial: &mut TrialConfig) {
        if let Some(files) = &self.files {
            trial.files = files.clone();
        }
        set(&mut trial.num_points, self.num_points);
        set(&mut trial.anim_duration, self.anim_duration);
        set(&mut trial.anim_delay, self.anim_delay);
        set(&mut trial.rolling_avg, self.rolling_avg);

        let display = &mut trial.display;
        set(&mut display.show_x_axis_ticks, self.show_x_axis_ticks);
        set(&mut display.use_threshold_colors, self.use_threshold_colors);
        set(&mut display.ease_in_out, self.ease_in_out);
        set(&mut display.x_axis_inverse_static, self.x_axis_inverse_static);
        set(&mut display.background_encoding, self.background_encoding);
        set(&mut display.use_rolling_average, self.use_rolling_average);
        set(&mut display.grid_background_move, self.grid_background_move);
        set(&mut display.show_threshold_band, self.show_threshold_band);
        set(&mut display.show_vertical_bar, self.show_vertical_bar);
        set(&mut display.dynamic_label_size, self.dynamic_label_size);
        set(&mut display.label_position, self.label_position);
    }
}

fn set<T: Copy>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}
