// Chart grid - small multiples laid out in rows and columns, driven in lockstep
use crate::application::chart_instance::{ChartConfig, ChartError, ChartInstance, UpdateOutcome};
use crate::application::scene::{ChartFrame, TextMeasure};
use crate::domain::clock::Clock;
use crate::domain::event_log::EventLog;
use crate::domain::series::Series;
use crate::domain::trial::{DisplayOptions, TrialConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("grid has no cells")]
    EmptyGrid,
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error("no chart at cell {0}")]
    UnknownCell(usize),
}

/// Everything needed to build the grid, taken from the trial config.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    pub container: (f64, f64),
    pub view_range: usize,
    pub rolling_average: usize,
    pub display: DisplayOptions,
    /// Overrides for the horizontal domain padding, as `(offset, tail)`.
    pub axis_padding: Option<(f64, f64)>,
}

impl GridConfig {
    pub fn from_trial(trial: &TrialConfig, container: (f64, f64)) -> Self {
        Self {
            rows: trial.rows,
            cols: trial.cols,
            container,
            view_range: trial.num_points,
            rolling_average: trial.effective_rolling_avg(),
            display: trial.display,
            axis_padding: None,
        }
    }

    pub fn cell_size(&self) -> (f64, f64) {
        cell_size(self.container, self.rows, self.cols)
    }

    fn chart_config(&self) -> ChartConfig {
        let (width, height) = self.cell_size();
        let config = ChartConfig::new(self.view_range, width, height, self.display)
            .with_rolling_average(self.rolling_average);
        match self.axis_padding {
            Some((offset, tail)) => config.with_axis_padding(offset, tail),
            None => config,
        }
    }
}

fn cell_size(container: (f64, f64), rows: usize, cols: usize) -> (f64, f64) {
    (
        container.0 / cols.max(1) as f64,
        container.1 / rows.max(1) as f64,
    )
}

pub fn chart_title(index: usize) -> String {
    format!("Machine {}", index + 1)
}

/// One chart per series up to `rows * cols`; the rest are dropped.
pub fn build_grid(
    series: Vec<Series>,
    config: &GridConfig,
    clock: Arc<dyn Clock>,
    measure: Arc<dyn TextMeasure>,
) -> Result<Vec<ChartInstance>, GridError> {
    let capacity = config.rows * config.cols;
    if capacity == 0 {
        return Err(GridError::EmptyGrid);
    }
    if series.len() > capacity {
        tracing::info!(
            files = series.len(),
            capacity,
            "more series than grid cells, dropping the excess"
        );
    }

    let chart_config = config.chart_config();
    series
        .into_iter()
        .take(capacity)
        .enumerate()
        .map(|(i, s)| {
            ChartInstance::new(
                i,
                chart_title(i),
                s,
                chart_config.clone(),
                clock.clone(),
                measure.clone(),
            )
            .map_err(GridError::from)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerEvent {
    Click,
    Down,
    Up,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellFrame {
    pub row: usize,
    pub col: usize,
    pub pressed: bool,
    pub frame: ChartFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridFrame {
    pub rows: usize,
    pub cols: usize,
    pub cell_width: f64,
    pub cell_height: f64,
    pub cells: Vec<CellFrame>,
}

pub struct ChartGrid {
    rows: usize,
    cols: usize,
    container: (f64, f64),
    charts: Vec<ChartInstance>,
    pressed: Vec<bool>,
    skip_next_resize: bool,
}

impl ChartGrid {
    pub fn new(
        series: Vec<Series>,
        config: &GridConfig,
        clock: Arc<dyn Clock>,
        measure: Arc<dyn TextMeasure>,
    ) -> Result<Self, GridError> {
        let charts = build_grid(series, config, clock, measure)?;
        let pressed = vec![false; charts.len()];
        Ok(Self {
            rows: config.rows,
            cols: config.cols,
            container: config.container,
            charts,
            pressed,
            skip_next_resize: true,
        })
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn charts(&self) -> &[ChartInstance] {
        &self.charts
    }

    pub fn cell_size(&self) -> (f64, f64) {
        cell_size(self.container, self.rows, self.cols)
    }

    /// Issues the same step and duration to every chart, in cell order.
    pub fn update_all(&mut self, step: u32, anim_duration_ms: f64) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::Ok;
        for chart in &mut self.charts {
            if chart.update(step, anim_duration_ms) == UpdateOutcome::WindowExceeded {
                outcome = UpdateOutcome::WindowExceeded;
            }
        }
        outcome
    }

    /// Container size notification. The first one after layout is ignored;
    /// returns whether the charts were resized.
    pub fn observe_resize(&mut self, width: f64, height: f64) -> bool {
        if self.skip_next_resize {
            self.skip_next_resize = false;
            tracing::debug!(width, height, "ignoring initial resize notification");
            return false;
        }
        self.resize(width, height);
        true
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.container = (width, height);
        let (cell_width, cell_height) = self.cell_size();
        for chart in &mut self.charts {
            chart.resize(cell_width, cell_height);
        }
    }

    pub fn pointer(
        &mut self,
        index: usize,
        event: PointerEvent,
        at: DateTime<Utc>,
        log: &mut EventLog,
    ) -> Result<(), GridError> {
        let chart = self
            .charts
            .get(index)
            .ok_or(GridError::UnknownCell(index))?;
        match event {
            PointerEvent::Click => log.record_click(chart.title(), at),
            PointerEvent::Down => self.pressed[index] = true,
            PointerEvent::Up | PointerEvent::Leave => self.pressed[index] = false,
        }
        Ok(())
    }

    pub fn is_pressed(&self, index: usize) -> bool {
        self.pressed.get(index).copied().unwrap_or(false)
    }

    pub fn frame_at(&self, now_ms: f64) -> GridFrame {
        let (cell_width, cell_height) = self.cell_size();
        let cols = self.cols.max(1);
        GridFrame {
            rows: self.rows,
            cols: self.cols,
            cell_width,
            cell_height,
            cells: self
                .charts
                .iter()
                .enumerate()
                .map(|(i, chart)| CellFrame {
                    row: i / cols,
                    col: i % cols,
                    pressed: self.pressed[i],
                    frame: chart.frame_at(now_ms),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scene::ApproxTextMeasure;
    use crate::domain::clock::ManualClock;

    fn series(n: usize, len: usize) -> Vec<Series> {
        (0..n)
            .map(|i| {
                let values: Vec<f64> = (0..len).map(|v| ((v + i * 3) % 100) as f64).collect();
                Series::from_values(format!("Set1Machine{}.csv", i + 1), &values).unwrap()
            })
            .collect()
    }

    fn config(rows: usize, cols: usize) -> GridConfig {
        GridConfig {
            rows,
            cols,
            container: (900.0, 600.0),
            view_range: 10,
            rolling_average: 1,
            display: DisplayOptions::default(),
            axis_padding: None,
        }
    }

    fn grid(n: usize, rows: usize, cols: usize) -> ChartGrid {
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp_millis(0).unwrap()));
        ChartGrid::new(series(n, 30), &config(rows, cols), clock, Arc::new(ApproxTextMeasure))
            .unwrap()
    }

    #[test]
    fn test_excess_series_are_dropped() {
        let grid = grid(9, 2, 3);
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.charts()[5].title(), "Machine 6");
    }

    #[test]
    fn test_fewer_series_than_cells() {
        let grid = grid(2, 2, 2);
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.cell_size(), (450.0, 300.0));
        assert_eq!(grid.charts()[0].size(), (450.0, 300.0));
    }

    #[test]
    fn test_update_is_lockstep() {
        let mut grid = grid(4, 2, 2);
        assert_eq!(grid.update_all(7, 0.0), UpdateOutcome::Ok);
        assert!(grid.charts().iter().all(|c| c.step() == 7));
        assert_eq!(grid.update_all(22, 0.0), UpdateOutcome::WindowExceeded);
    }

    #[test]
    fn test_first_resize_is_ignored() {
        let mut grid = grid(4, 2, 2);
        assert!(!grid.observe_resize(1200.0, 800.0));
        assert_eq!(grid.charts()[0].size(), (450.0, 300.0));
        assert!(grid.observe_resize(1200.0, 800.0));
        assert!(grid.charts().iter().all(|c| c.size() == (600.0, 400.0)));
    }

    #[test]
    fn test_pointer_events() {
        let mut grid = grid(4, 2, 2);
        let mut log = EventLog::new();
        let at = DateTime::from_timestamp_millis(42).unwrap();

        grid.pointer(2, PointerEvent::Down, at, &mut log).unwrap();
        assert!(grid.is_pressed(2));
        grid.pointer(2, PointerEvent::Leave, at, &mut log).unwrap();
        assert!(!grid.is_pressed(2));
        grid.pointer(2, PointerEvent::Click, at, &mut log).unwrap();

        let clicks = log.clicks();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].title, "Machine 3");
        assert_eq!(clicks[0].timestamp, 42);
        assert_eq!(
            grid.pointer(9, PointerEvent::Click, at, &mut log),
            Err(GridError::UnknownCell(9))
        );
    }

    #[test]
    fn test_frame_positions_cells() {
        let grid = grid(5, 2, 3);
        let frame = grid.frame_at(0.0);
        assert_eq!(frame.cells.len(), 5);
        assert_eq!((frame.cells[4].row, frame.cells[4].col), (1, 1));
    }

    #[test]
    fn test_build_grid_rejects_short_series() {
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp_millis(0).unwrap()));
        let result = build_grid(series(2, 5), &config(1, 2), clock, Arc::new(ApproxTextMeasure));
        assert!(matches!(result, Err(GridError::Chart(ChartError::SeriesTooShort { .. }))));
    }

    #[test]
    fn test_axis_padding_override() {
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp_millis(0).unwrap()));
        let mut cfg = config(1, 1);
        cfg.axis_padding = Some((0.0, 0.0));
        let charts = build_grid(series(1, 30), &cfg, clock, Arc::new(ApproxTextMeasure)).unwrap();
        assert_eq!(charts[0].x_domain(), (1.0, 11.0));
    }
}
