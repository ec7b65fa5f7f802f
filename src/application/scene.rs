// Scene graph for one chart: animated attributes and the frame snapshot
// sampled from them
use crate::domain::encoding::Easing;
use serde::Serialize;

/// A scalar attribute moving from `from` to `to` over `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween {
    from: f64,
    to: f64,
    start_ms: f64,
    duration_ms: f64,
    easing: Easing,
}

impl Tween {
    pub fn fixed(value: f64) -> Self {
        Self {
            from: value,
            to: value,
            start_ms: 0.0,
            duration_ms: 0.0,
            easing: Easing::Linear,
        }
    }

    pub fn target(&self) -> f64 {
        self.to
    }

    pub fn value_at(&self, now_ms: f64) -> f64 {
        if self.duration_ms <= 0.0 || now_ms >= self.start_ms + self.duration_ms {
            return self.to;
        }
        if now_ms <= self.start_ms {
            return self.from;
        }
        let t = self.easing.apply((now_ms - self.start_ms) / self.duration_ms);
        self.from + (self.to - self.from) * t
    }

    pub fn is_running(&self, now_ms: f64) -> bool {
        self.duration_ms > 0.0 && now_ms < self.start_ms + self.duration_ms
    }

    /// Starts a new transition from wherever the attribute is right now.
    pub fn retarget(&mut self, to: f64, now_ms: f64, duration_ms: f64, easing: Easing) {
        let from = self.value_at(now_ms);
        *self = Self {
            from,
            to,
            start_ms: now_ms,
            duration_ms: duration_ms.max(0.0),
            easing,
        };
    }

    /// Moves both ends of the transition through `f`, keeping its timing.
    pub fn remap(&mut self, f: impl Fn(f64) -> f64) {
        self.from = f(self.from);
        self.to = f(self.to);
    }

    /// Jumps to `value`, dropping any transition in flight.
    pub fn set(&mut self, value: f64) {
        *self = Self::fixed(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn contains_x(&self, x: f64) -> bool {
        x >= self.x && x <= self.x + self.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Middle,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Baseline {
    Hanging,
    Middle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Rect {
        rect: Rect,
        fill: String,
        radius: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        stroke: String,
        width: f64,
        dashed: bool,
    },
    Circle {
        cx: f64,
        cy: f64,
        r: f64,
        fill: String,
    },
    Polyline {
        points: Vec<(f64, f64)>,
        stroke: String,
        width: f64,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        font_size: f64,
        fill: String,
        anchor: Anchor,
        baseline: Baseline,
    },
    Group {
        clip: Option<Rect>,
        children: Vec<Node>,
    },
}

impl Node {
    pub fn line(x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str, width: f64) -> Self {
        Node::Line {
            x1,
            y1,
            x2,
            y2,
            stroke: stroke.to_string(),
            width,
            dashed: false,
        }
    }

    pub fn text(x: f64, y: f64, text: impl Into<String>, font_size: f64, fill: &str) -> Self {
        Node::Text {
            x,
            y,
            text: text.into(),
            font_size,
            fill: fill.to_string(),
            anchor: Anchor::Middle,
            baseline: Baseline::Middle,
        }
    }

    /// Visits this node and every descendant, depth first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        visit(self);
        if let Node::Group { children, .. } = self {
            for child in children {
                child.walk(visit);
            }
        }
    }
}

/// One chart sampled at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFrame {
    pub id: usize,
    pub title: String,
    pub width: f64,
    pub height: f64,
    pub nodes: Vec<Node>,
}

impl ChartFrame {
    pub fn circles(&self) -> Vec<(f64, f64)> {
        let mut out = Vec::new();
        for node in &self.nodes {
            node.walk(&mut |n| {
                if let Node::Circle { cx, cy, .. } = n {
                    out.push((*cx, *cy));
                }
            });
        }
        out
    }

    pub fn texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        for node in &self.nodes {
            node.walk(&mut |n| {
                if let Node::Text { text, .. } = n {
                    out.push(text.clone());
                }
            });
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub width: f64,
    pub height: f64,
}

/// Text layout measurement used to size decorations after the text is set.
pub trait TextMeasure: Send + Sync {
    fn measure(&self, text: &str, font_size: f64) -> TextBox;
}

/// Average glyph metrics for a sans-serif face.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTextMeasure;

impl TextMeasure for ApproxTextMeasure {
    fn measure(&self, text: &str, font_size: f64) -> TextBox {
        let advance: f64 = text
            .chars()
            .map(|c| match c {
                '.' | ',' | ':' | '|' | 'i' | 'l' => 0.28,
                '-' => 0.33,
                ' ' => 0.28,
                'M' | 'W' | 'm' | 'w' => 0.83,
                _ => 0.56,
            })
            .sum();
        TextBox {
            width: advance * font_size,
            height: font_size * 1.15,
        }
    }
}
