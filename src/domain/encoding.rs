// Visual encodings shared by every chart: threshold colours, label sizing,
// point density and animation easing
use serde::{Deserialize, Serialize};

pub const LOW_THRESHOLD: f64 = 30.0;
pub const HIGH_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdClass {
    Low,
    Neutral,
    High,
}

/// Two-cutoff classification. With `enabled == false` everything is neutral.
pub fn classify(value: f64, enabled: bool) -> ThresholdClass {
    if !enabled {
        ThresholdClass::Neutral
    } else if value > HIGH_THRESHOLD {
        ThresholdClass::High
    } else if value < LOW_THRESHOLD {
        ThresholdClass::Low
    } else {
        ThresholdClass::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPalette {
    pub low: &'static str,
    pub neutral: &'static str,
    pub high: &'static str,
}

impl ThresholdPalette {
    pub fn color(&self, class: ThresholdClass) -> &'static str {
        match class {
            ThresholdClass::Low => self.low,
            ThresholdClass::Neutral => self.neutral,
            ThresholdClass::High => self.high,
        }
    }
}

pub const POINT_PALETTE: ThresholdPalette = ThresholdPalette {
    low: "#00B2EE",
    neutral: "#8C8C8C",
    high: "#FF7F50",
};

pub const BACKGROUND_PALETTE: ThresholdPalette = ThresholdPalette {
    low: "#80D9F7",
    neutral: "white",
    high: "#FFBFA8",
};

pub const SIDE_TEXT_PALETTE: ThresholdPalette = ThresholdPalette {
    low: "#0091C2",
    neutral: "black",
    high: "#E0552A",
};

pub const LINE_COLOR: &str = "#8C8C8C";
pub const GRID_COLOR: &str = "#eee";
pub const AXIS_TEXT_COLOR: &str = "gray";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelPosition {
    #[default]
    #[serde(alias = "integrated")]
    Follow,
    #[serde(alias = "separated")]
    Fixed,
    Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSizing {
    #[default]
    None,
    Linear,
    #[serde(alias = "u-shaped")]
    Ushaped,
}

pub const LABEL_FONT_DEFAULT: f64 = 14.0;
pub const LABEL_FONT_RANGE: (f64, f64) = (8.0, 24.0);
pub const SIDE_LABEL_FONT: f64 = 54.0;

impl LabelSizing {
    /// Font size for a value on the 0-100 axis. Values outside extrapolate.
    pub fn font_size(&self, value: f64) -> f64 {
        let (small, large) = LABEL_FONT_RANGE;
        match self {
            LabelSizing::None => LABEL_FONT_DEFAULT,
            LabelSizing::Linear => small + value / 100.0 * (large - small),
            LabelSizing::Ushaped => {
                if value <= 50.0 {
                    large + value / 50.0 * (small - large)
                } else {
                    small + (value - 50.0) / 50.0 * (large - small)
                }
            }
        }
    }
}

/// Point radius and axis font size used up to `max_points` visible samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityTier {
    pub max_points: Option<usize>,
    pub point_radius: f64,
    pub axis_font_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityTiers(Vec<DensityTier>);

impl DensityTiers {
    /// Tiers are checked in order; the last one should be unbounded.
    pub fn select(&self, view_range: usize) -> DensityTier {
        self.0
            .iter()
            .find(|t| t.max_points.is_none_or(|max| view_range <= max))
            .or(self.0.last())
            .copied()
            .unwrap_or(DensityTier {
                max_points: None,
                point_radius: 4.0,
                axis_font_size: 10.0,
            })
    }
}

impl Default for DensityTiers {
    fn default() -> Self {
        Self(vec![
            DensityTier {
                max_points: Some(20),
                point_radius: 4.0,
                axis_font_size: 10.0,
            },
            DensityTier {
                max_points: Some(50),
                point_radius: 3.0,
                axis_font_size: 8.0,
            },
            DensityTier {
                max_points: None,
                point_radius: 2.5,
                axis_font_size: 7.0,
            },
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Easing {
    Linear,
    /// Symmetric polynomial ease-in-out.
    PolyInOut(f64),
}

impl Easing {
    pub fn from_flag(ease_in_out: bool) -> Self {
        if ease_in_out {
            Easing::PolyInOut(3.0)
        } else {
            Easing::Linear
        }
    }

    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::PolyInOut(e) => {
                let t = t * 2.0;
                if t <= 1.0 {
                    t.powf(e) / 2.0
                } else {
                    (2.0 - (2.0 - t).powf(e)) / 2.0
                }
            }
        }
    }
}
