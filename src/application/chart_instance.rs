// Chart instance - one scrolling line chart over a single series
use crate::application::scene::{
    Anchor, Baseline, ChartFrame, Node, Rect, TextMeasure, Tween,
};
use crate::domain::clock::Clock;
use crate::domain::encoding::{
    classify, DensityTiers, Easing, LabelPosition, ThresholdClass, AXIS_TEXT_COLOR,
    BACKGROUND_PALETTE, GRID_COLOR, HIGH_THRESHOLD, LINE_COLOR, LOW_THRESHOLD, POINT_PALETTE,
    SIDE_LABEL_FONT, SIDE_TEXT_PALETTE,
};
use crate::domain::scale::LinearScale;
use crate::domain::series::{Sample, Series};
use crate::domain::trial::DisplayOptions;
use std::sync::Arc;
use thiserror::Error;

pub const INFO_PANEL_WIDTH: f64 = 150.0;
const AXIS_TICK_SIZE: f64 = 4.0;
const TEXT_PADDING: (f64, f64) = (4.0, 3.0);
const TITLE_FONT_SIZE: f64 = 16.0;
const VALUE_DOMAIN: (f64, f64) = (0.0, 100.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margin {
    fn default() -> Self {
        Self {
            top: 35.0,
            right: 15.0,
            bottom: 30.0,
            left: 35.0,
        }
    }
}

/// Immutable per-chart configuration. Only the canvas size changes after
/// construction, through [`ChartInstance::resize`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChartConfig {
    pub view_range: usize,
    pub width: f64,
    pub height: f64,
    pub rolling_average: usize,
    pub display: DisplayOptions,
    /// Shift of the leftmost domain edge relative to the step.
    pub x_offset: f64,
    /// Extra domain past the last visible sample.
    pub x_tail: f64,
    pub margin: Margin,
    pub density: DensityTiers,
}

impl ChartConfig {
    pub fn new(view_range: usize, width: f64, height: f64, display: DisplayOptions) -> Self {
        let x_tail = match display.label_position {
            LabelPosition::Side => 0.4,
            _ => 0.6,
        };
        Self {
            view_range,
            width,
            height,
            rolling_average: 1,
            display,
            x_offset: -0.5,
            x_tail,
            margin: Margin::default(),
            density: DensityTiers::default(),
        }
    }

    pub fn with_rolling_average(mut self, k: usize) -> Self {
        self.rolling_average = k.clamp(1, self.view_range.max(1));
        self
    }

    pub fn with_axis_padding(mut self, offset: f64, tail: f64) -> Self {
        self.x_offset = offset;
        self.x_tail = tail;
        self
    }

    pub fn info_width(&self) -> f64 {
        match self.display.label_position {
            LabelPosition::Side => INFO_PANEL_WIDTH,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ChartError {
    #[error("view range must be at least one sample")]
    EmptyView,
    #[error("series {name} has {len} samples, fewer than the view range {view_range}")]
    SeriesTooShort {
        name: String,
        len: usize,
        view_range: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Ok,
    /// The requested window reads past the end of the series; nothing changed.
    WindowExceeded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub value: f64,
    pub text: String,
    pub font_size: f64,
    pub class: ThresholdClass,
    pub text_color: &'static str,
    /// Background chip relative to the label anchor, sized from the
    /// measured text. Absent in the side panel.
    pub chip: Option<Rect>,
    pub chip_color: &'static str,
}

impl Label {
    fn empty() -> Self {
        Self {
            value: 0.0,
            text: String::new(),
            font_size: 0.0,
            class: ThresholdClass::Neutral,
            text_color: "white",
            chip: None,
            chip_color: POINT_PALETTE.neutral,
        }
    }
}

pub struct ChartInstance {
    id: usize,
    title: String,
    series: Series,
    config: ChartConfig,
    width: f64,
    height: f64,
    x: LinearScale,
    y: LinearScale,
    step: u32,
    scroll: Tween,
    label: Label,
    label_x: Tween,
    label_y: Tween,
    background: &'static str,
    clip: Rect,
    point_radius: f64,
    axis_font_size: f64,
    clock: Arc<dyn Clock>,
    measure: Arc<dyn TextMeasure>,
}

impl ChartInstance {
    pub fn new(
        id: usize,
        title: impl Into<String>,
        series: Series,
        config: ChartConfig,
        clock: Arc<dyn Clock>,
        measure: Arc<dyn TextMeasure>,
    ) -> Result<Self, ChartError> {
        let view_range = config.view_range;
        if view_range == 0 {
            return Err(ChartError::EmptyView);
        }
        if series.len() < view_range {
            return Err(ChartError::SeriesTooShort {
                name: series.name().to_string(),
                len: series.len(),
                view_range,
            });
        }

        let tier = config.density.select(view_range);
        let domain = domain_for(1, &config);
        let mut chart = Self {
            id,
            title: title.into(),
            width: config.width.max(0.0),
            height: config.height.max(0.0),
            x: LinearScale::new(domain, (0.0, 0.0)),
            y: LinearScale::new(VALUE_DOMAIN, (0.0, 0.0)),
            step: 1,
            scroll: Tween::fixed(domain.0),
            label: Label::empty(),
            label_x: Tween::fixed(0.0),
            label_y: Tween::fixed(0.0),
            background: BACKGROUND_PALETTE.neutral,
            clip: Rect {
                x: 0.0,
                y: 0.0,
                width: 0.0,
                height: 0.0,
            },
            point_radius: tier.point_radius,
            axis_font_size: tier.axis_font_size,
            series,
            config,
            clock,
            measure,
        };
        chart.apply_ranges();
        if let Some(right) = chart.right_sample() {
            chart.render_window(1, right, 0.0);
        }
        Ok(chart)
    }

    /// Moves the visible window to `[step, step + view_range - 1]`,
    /// animating over `anim_duration_ms`.
    pub fn update(&mut self, step: u32, anim_duration_ms: f64) -> UpdateOutcome {
        let Some(right) = self
            .series
            .window(step, self.config.view_range)
            .and_then(|w| w.last().copied())
        else {
            tracing::debug!(
                chart = self.id,
                step,
                len = self.series.len(),
                "update past the end of the series ignored"
            );
            return UpdateOutcome::WindowExceeded;
        };
        self.render_window(step, right, anim_duration_ms);
        UpdateOutcome::Ok
    }

    /// Recomputes pixel ranges for a new canvas size. Keeps the step and
    /// starts no animation.
    /// A label tween in flight is carried over to the new pixel space so it
    /// stays on its point.
    pub fn resize(&mut self, width: f64, height: f64) {
        let (old_x, old_y) = (self.x, self.y);
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        self.apply_ranges();

        let (x, y) = (self.x, self.y);
        let rescale_x = |px: f64| x.map(old_x.invert(px));
        let rescale_y = |py: f64| y.map(old_y.invert(py));
        if let Some(right) = self.right_sample() {
            let (lx, ly) = self.label_anchor(&right);
            match self.config.display.label_position {
                LabelPosition::Follow => {
                    self.label_x.remap(rescale_x);
                    self.label_y.remap(rescale_y);
                }
                LabelPosition::Fixed => {
                    self.label_x.remap(rescale_x);
                    self.label_y.set(ly);
                }
                LabelPosition::Side => {
                    self.label_x.set(lx);
                    self.label_y.set(ly);
                }
            }
        }
        self.refresh_clip();
    }

    fn render_window(&mut self, step: u32, right: Sample, duration_ms: f64) {
        let now = self.clock.now_ms();
        let easing = Easing::from_flag(self.config.display.ease_in_out);

        self.step = step;
        let (d0, d1) = domain_for(step, &self.config);
        self.x.set_domain(d0, d1);
        self.scroll.retarget(d0, now, duration_ms, easing);

        // Text first, then measurement, then the chip sized from it.
        self.refresh_label(&right);

        let (lx, ly) = self.label_anchor(&right);
        match self.config.display.label_position {
            LabelPosition::Follow => {
                self.label_x.retarget(lx, now, duration_ms, easing);
                self.label_y.retarget(ly, now, duration_ms, easing);
            }
            LabelPosition::Fixed => {
                self.label_x.retarget(lx, now, duration_ms, easing);
                self.label_y.set(ly);
            }
            LabelPosition::Side => {
                self.label_x.set(lx);
                self.label_y.set(ly);
            }
        }

        self.background = BACKGROUND_PALETTE.color(classify(
            self.label.value,
            self.config.display.background_encoding,
        ));
        self.refresh_clip();
    }

    fn refresh_label(&mut self, right: &Sample) {
        let display = self.config.display;
        let value = if display.use_rolling_average {
            self.series
                .rolling_average(right.index, self.config.rolling_average)
                .unwrap_or(right.value)
        } else {
            right.value
        };
        let side = display.label_position == LabelPosition::Side;
        let text = format_value(value);
        let font_size = if side {
            SIDE_LABEL_FONT
        } else {
            display.dynamic_label_size.font_size(value)
        };
        let class = classify(value, display.use_threshold_colors);

        let chip = (!side).then(|| {
            let bbox = self.measure.measure(&text, font_size);
            Rect {
                x: -bbox.width / 2.0 - TEXT_PADDING.0,
                y: -bbox.height / 2.0 - TEXT_PADDING.1,
                width: bbox.width + 2.0 * TEXT_PADDING.0,
                height: bbox.height + 2.0 * TEXT_PADDING.1,
            }
        });

        self.label = Label {
            value,
            text,
            font_size,
            class,
            text_color: if side {
                SIDE_TEXT_PALETTE.color(class)
            } else {
                "white"
            },
            chip,
            chip_color: POINT_PALETTE.color(class),
        };
    }

    fn label_anchor(&self, right: &Sample) -> (f64, f64) {
        match self.config.display.label_position {
            LabelPosition::Follow => (self.x.map(right.index as f64), self.y.map(right.value)),
            LabelPosition::Fixed => (self.x.map(right.index as f64), self.y.range().1 - 10.0),
            LabelPosition::Side => (
                self.plot_width() + self.config.info_width() / 2.0,
                self.height / 1.9,
            ),
        }
    }

    fn apply_ranges(&mut self) {
        let margin = self.config.margin;
        self.x
            .set_range(margin.left, self.plot_width() - margin.right);
        self.y
            .set_range(self.height - margin.bottom, margin.top);
    }

    /// The clip spans exactly the visible samples plus one point radius on
    /// each side; it depends on the pixel spacing, so it follows every
    /// resize and update.
    fn refresh_clip(&mut self) {
        let gap = self.x.unit_width();
        let r = self.point_radius;
        let spanned = self.config.view_range.saturating_sub(1) as f64;
        self.clip = Rect {
            x: self.x.map(self.step as f64) - r,
            y: 0.0,
            width: gap * spanned + 2.0 * r,
            height: self.height,
        };
    }

    fn plot_width(&self) -> f64 {
        (self.width - self.config.info_width()).max(0.0)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn x_domain(&self) -> (f64, f64) {
        self.x.domain()
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn clip(&self) -> Rect {
        self.clip
    }

    pub fn point_radius(&self) -> f64 {
        self.point_radius
    }

    pub fn background(&self) -> &'static str {
        self.background
    }

    pub fn right_sample(&self) -> Option<Sample> {
        self.visible_samples().last().copied()
    }

    pub fn visible_samples(&self) -> &[Sample] {
        self.series
            .window(self.step, self.config.view_range)
            .unwrap_or(&[])
    }

    pub fn is_animating(&self, now_ms: f64) -> bool {
        self.scroll.is_running(now_ms)
            || self.label_x.is_running(now_ms)
            || self.label_y.is_running(now_ms)
    }

    pub fn frame(&self) -> ChartFrame {
        self.frame_at(self.clock.now_ms())
    }

    /// Samples every animated attribute at `now_ms`.
    pub fn frame_at(&self, now_ms: f64) -> ChartFrame {
        let display = self.config.display;
        let margin = self.config.margin;
        let plot_width = self.plot_width();
        let (left, right) = (margin.left, plot_width - margin.right);
        let (top, bottom) = (margin.top, self.height - margin.bottom);

        let (d0, d1) = self.x.domain();
        let scroll = self.scroll.value_at(now_ms);
        let mut xt = self.x;
        xt.set_domain(scroll, scroll + (d1 - d0));

        let mut nodes = vec![Node::Rect {
            rect: Rect {
                x: left,
                y: top,
                width: (right - left).max(0.0),
                height: (bottom - top).max(0.0),
            },
            fill: self.background.to_string(),
            radius: 0.0,
        }];

        if display.show_threshold_band {
            nodes.extend(self.threshold_band(left, right));
        }

        for tick in self.y.ticks(10) {
            let py = self.y.map(tick);
            nodes.push(Node::line(left, py, right, py, GRID_COLOR, 1.0));
        }
        if !display.grid_background_move {
            for slot in 0..self.config.view_range {
                let px = self.x.map((self.step as usize + slot) as f64);
                nodes.push(Node::line(px, top, px, bottom, GRID_COLOR, 1.0));
            }
        }

        nodes.push(Node::Text {
            x: plot_width / 2.0,
            y: 15.0,
            text: self.title.clone(),
            font_size: TITLE_FONT_SIZE,
            fill: "black".to_string(),
            anchor: Anchor::Middle,
            baseline: Baseline::Hanging,
        });

        nodes.extend(self.y_axis());
        nodes.extend(self.x_axis(&xt));

        let samples = self.rendered_samples(now_ms);
        let mut moving = Vec::with_capacity(samples.len() + 2);
        if display.grid_background_move {
            for sample in samples {
                let px = xt.map(sample.index as f64);
                moving.push(Node::line(px, top, px, bottom, GRID_COLOR, 1.0));
            }
        }
        moving.push(Node::Polyline {
            points: samples
                .iter()
                .map(|s| (xt.map(s.index as f64), self.y.map(s.value)))
                .collect(),
            stroke: LINE_COLOR.to_string(),
            width: 1.5,
        });
        for sample in samples {
            moving.push(Node::Circle {
                cx: xt.map(sample.index as f64),
                cy: self.y.map(sample.value),
                r: self.point_radius,
                fill: POINT_PALETTE
                    .color(classify(sample.value, display.use_threshold_colors))
                    .to_string(),
            });
        }
        nodes.push(Node::Group {
            clip: Some(self.clip),
            children: moving,
        });

        if display.show_vertical_bar {
            let edge = self.step as usize + self.config.view_range - 1;
            let px = self.x.map(edge as f64);
            nodes.push(Node::Line {
                x1: px,
                y1: top,
                x2: px,
                y2: bottom,
                stroke: "#555".to_string(),
                width: 2.0,
                dashed: true,
            });
        }

        nodes.push(self.label_group(now_ms, plot_width, top, bottom));

        ChartFrame {
            id: self.id,
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            nodes,
        }
    }

    /// The visible window, plus the neighbouring samples while a scroll is
    /// in flight so they can slide in and out under the clip.
    fn rendered_samples(&self, now_ms: f64) -> &[Sample] {
        let view_range = self.config.view_range;
        if !self.scroll.is_running(now_ms) {
            return self.visible_samples();
        }
        let all = self.series.samples();
        let start = (self.step as usize).saturating_sub(2);
        let end = (self.step as usize - 1 + view_range + 1).min(all.len());
        &all[start..end]
    }

    fn threshold_band(&self, left: f64, right: f64) -> Vec<Node> {
        let width = (right - left).max(0.0);
        let band = |from: f64, to: f64, fill: &str| {
            let (y0, y1) = (self.y.map(to), self.y.map(from));
            Node::Rect {
                rect: Rect {
                    x: left,
                    y: y0,
                    width,
                    height: (y1 - y0).max(0.0),
                },
                fill: fill.to_string(),
                radius: 0.0,
            }
        };
        let cutoff = |value: f64, stroke: &str| {
            let py = self.y.map(value);
            Node::Line {
                x1: left,
                y1: py,
                x2: right,
                y2: py,
                stroke: stroke.to_string(),
                width: 1.0,
                dashed: true,
            }
        };
        vec![
            band(HIGH_THRESHOLD, VALUE_DOMAIN.1, "#FFF1EB"),
            band(VALUE_DOMAIN.0, LOW_THRESHOLD, "#E8F7FD"),
            cutoff(HIGH_THRESHOLD, POINT_PALETTE.high),
            cutoff(LOW_THRESHOLD, POINT_PALETTE.low),
        ]
    }

    fn y_axis(&self) -> Vec<Node> {
        let x0 = self.config.margin.left;
        let mut nodes = vec![Node::line(
            x0,
            self.y.map(VALUE_DOMAIN.0),
            x0,
            self.y.map(VALUE_DOMAIN.1),
            "black",
            1.0,
        )];
        for tick in self.y.ticks(10) {
            let py = self.y.map(tick);
            nodes.push(Node::line(x0 - AXIS_TICK_SIZE, py, x0, py, "black", 1.0));
            nodes.push(Node::Text {
                x: x0 - AXIS_TICK_SIZE - 3.0,
                y: py,
                text: format_value(tick),
                font_size: self.axis_font_size,
                fill: AXIS_TEXT_COLOR.to_string(),
                anchor: Anchor::End,
                baseline: Baseline::Middle,
            });
        }
        nodes
    }

    /// Ticks sit under the visible samples. In inverse-static mode they stay
    /// put and count back from zero at the right edge.
    fn x_axis(&self, xt: &LinearScale) -> Vec<Node> {
        let margin = self.config.margin;
        let axis_y = self.height - margin.bottom;
        let mut nodes = vec![Node::line(
            margin.left,
            axis_y,
            self.plot_width() - margin.right,
            axis_y,
            "black",
            1.0,
        )];
        if !self.config.display.show_x_axis_ticks {
            return nodes;
        }

        let view_range = self.config.view_range as i64;
        for slot in 0..view_range {
            let index = self.step as i64 + slot;
            let (px, text) = if self.config.display.x_axis_inverse_static {
                (self.x.map(index as f64), (slot + 1 - view_range).to_string())
            } else {
                (xt.map(index as f64), index.to_string())
            };
            nodes.push(Node::line(px, axis_y, px, axis_y + AXIS_TICK_SIZE, "black", 1.0));
            nodes.push(Node::Text {
                x: px,
                y: axis_y + AXIS_TICK_SIZE + 3.0,
                text,
                font_size: self.axis_font_size,
                fill: AXIS_TEXT_COLOR.to_string(),
                anchor: Anchor::Middle,
                baseline: Baseline::Hanging,
            });
        }
        nodes
    }

    fn label_group(&self, now_ms: f64, plot_width: f64, top: f64, bottom: f64) -> Node {
        let (lx, ly) = (self.label_x.value_at(now_ms), self.label_y.value_at(now_ms));
        let mut children = Vec::new();

        if self.config.display.label_position == LabelPosition::Side {
            children.push(Node::line(plot_width, top, plot_width, bottom, GRID_COLOR, 1.0));
        }
        if let Some(chip) = self.label.chip {
            children.push(Node::Rect {
                rect: Rect {
                    x: lx + chip.x,
                    y: ly + chip.y,
                    width: chip.width,
                    height: chip.height,
                },
                fill: self.label.chip_color.to_string(),
                radius: 3.0,
            });
        }
        children.push(Node::text(
            lx,
            ly,
            self.label.text.clone(),
            self.label.font_size,
            self.label.text_color,
        ));

        Node::Group {
            clip: None,
            children,
        }
    }
}

fn domain_for(step: u32, config: &ChartConfig) -> (f64, f64) {
    let start = step as f64 + config.x_offset;
    (start, start + config.view_range as f64 + config.x_tail)
}

/// Numbers print without a trailing `.0`.
pub fn format_value(value: f64) -> String {
    format!("{value}")
}
