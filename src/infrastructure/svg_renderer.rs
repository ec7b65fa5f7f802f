// SVG renderer - turns sampled chart frames into markup
use crate::application::chart_grid::GridFrame;
use crate::application::scene::{Anchor, Baseline, ChartFrame, Node};
use std::fmt::Write as _;

const FONT_FAMILY: &str = "Helvetica, Arial, sans-serif";
const PRESSED_OUTLINE: &str = "#444";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn anchor(anchor: Anchor) -> &'static str {
    match anchor {
        Anchor::Middle => "middle",
        Anchor::End => "end",
    }
}

fn baseline(baseline: Baseline) -> &'static str {
    match baseline {
        Baseline::Hanging => "hanging",
        Baseline::Middle => "middle",
    }
}

struct Writer {
    out: String,
    clip_prefix: String,
    clip_count: usize,
}

impl Writer {
    fn new(clip_prefix: String) -> Self {
        Self {
            out: String::new(),
            clip_prefix,
            clip_count: 0,
        }
    }

    fn node(&mut self, node: &Node) {
        // Writing into a String cannot fail.
        let _ = self.try_node(node);
    }

    fn try_node(&mut self, node: &Node) -> std::fmt::Result {
        match node {
            Node::Rect { rect, fill, radius } => writeln!(
                self.out,
                r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" rx="{:.2}" fill="{}"/>"#,
                rect.x,
                rect.y,
                rect.width.max(0.0),
                rect.height.max(0.0),
                radius,
                escape(fill)
            ),
            Node::Line {
                x1,
                y1,
                x2,
                y2,
                stroke,
                width,
                dashed,
            } => writeln!(
                self.out,
                r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}" stroke="{}" stroke-width="{width}"{}/>"#,
                escape(stroke),
                if *dashed { r#" stroke-dasharray="4 3""# } else { "" }
            ),
            Node::Circle { cx, cy, r, fill } => writeln!(
                self.out,
                r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{r}" fill="{}"/>"#,
                escape(fill)
            ),
            Node::Polyline {
                points,
                stroke,
                width,
            } => {
                let mut coords = String::new();
                for (x, y) in points {
                    write!(coords, "{x:.2},{y:.2} ")?;
                }
                writeln!(
                    self.out,
                    r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="{width}"/>"#,
                    coords.trim_end(),
                    escape(stroke)
                )
            }
            Node::Text {
                x,
                y,
                text,
                font_size,
                fill,
                anchor: a,
                baseline: b,
            } => writeln!(
                self.out,
                r#"<text x="{x:.2}" y="{y:.2}" font-size="{font_size}" fill="{}" text-anchor="{}" dominant-baseline="{}">{}</text>"#,
                escape(fill),
                anchor(*a),
                baseline(*b),
                escape(text)
            ),
            Node::Group { clip, children } => {
                match clip {
                    Some(rect) => {
                        let id = format!("{}-clip-{}", self.clip_prefix, self.clip_count);
                        self.clip_count += 1;
                        writeln!(
                            self.out,
                            r#"<clipPath id="{id}"><rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}"/></clipPath>"#,
                            rect.x,
                            rect.y,
                            rect.width.max(0.0),
                            rect.height.max(0.0)
                        )?;
                        writeln!(self.out, r#"<g clip-path="url(#{id})">"#)?;
                    }
                    None => writeln!(self.out, "<g>")?,
                }
                for child in children {
                    self.try_node(child)?;
                }
                writeln!(self.out, "</g>")
            }
        }
    }
}

fn chart_body(frame: &ChartFrame, clip_prefix: String) -> String {
    let mut writer = Writer::new(clip_prefix);
    for node in &frame.nodes {
        writer.node(node);
    }
    writer.out
}

/// A single chart as a standalone SVG document.
pub fn render_chart(frame: &ChartFrame) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" font-family="{FONT_FAMILY}">"#,
        frame.width, frame.height
    );
    svg.push_str(&chart_body(frame, format!("chart{}", frame.id)));
    svg.push_str("</svg>\n");
    svg
}

/// Every cell positioned in its row and column. Pressed cells get an outline.
pub fn render_grid(grid: &GridFrame) -> String {
    let width = grid.cell_width * grid.cols as f64;
    let height = grid.cell_height * grid.rows as f64;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.0}" height="{height:.0}" font-family="{FONT_FAMILY}">"#
    );
    for cell in &grid.cells {
        let x = cell.col as f64 * grid.cell_width;
        let y = cell.row as f64 * grid.cell_height;
        let _ = writeln!(
            svg,
            r#"<g class="chart" data-chart="{}" transform="translate({x:.2},{y:.2})">"#,
            cell.frame.id
        );
        svg.push_str(&chart_body(&cell.frame, format!("chart{}", cell.frame.id)));
        if cell.pressed {
            let _ = writeln!(
                svg,
                r#"<rect x="0" y="0" width="{:.2}" height="{:.2}" fill="none" stroke="{PRESSED_OUTLINE}" stroke-width="2"/>"#,
                cell.frame.width, cell.frame.height
            );
        }
        svg.push_str("</g>\n");
    }
    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::chart_grid::CellFrame;
    use crate::application::scene::Rect;

    fn frame(id: usize) -> ChartFrame {
        ChartFrame {
            id,
            title: format!("Machine {}", id + 1),
            width: 300.0,
            height: 200.0,
            nodes: vec![
                Node::text(150.0, 10.0, "Machine <1> & co", 12.0, "black"),
                Node::Group {
                    clip: Some(Rect {
                        x: 35.0,
                        y: 0.0,
                        width: 200.0,
                        height: 200.0,
                    }),
                    children: vec![
                        Node::Polyline {
                            points: vec![(40.0, 100.0), (60.0, 80.0)],
                            stroke: "steelblue".to_string(),
                            width: 1.5,
                        },
                        Node::Circle {
                            cx: 60.0,
                            cy: 80.0,
                            r: 4.0,
                            fill: "#FF7F50".to_string(),
                        },
                    ],
                },
            ],
        }
    }

    #[test]
    fn test_render_chart_escapes_and_clips() {
        let svg = render_chart(&frame(0));
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Machine &lt;1&gt; &amp; co"));
        assert!(svg.contains(r#"<clipPath id="chart0-clip-0">"#));
        assert!(svg.contains(r#"clip-path="url(#chart0-clip-0)""#));
        assert!(svg.contains(r#"points="40.00,100.00 60.00,80.00""#));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_render_grid_positions_cells() {
        let grid = GridFrame {
            rows: 1,
            cols: 2,
            cell_width: 300.0,
            cell_height: 200.0,
            cells: vec![
                CellFrame {
                    row: 0,
                    col: 0,
                    pressed: false,
                    frame: frame(0),
                },
                CellFrame {
                    row: 0,
                    col: 1,
                    pressed: true,
                    frame: frame(1),
                },
            ],
        };
        let svg = render_grid(&grid);
        assert!(svg.contains(r#"width="600" height="200""#));
        assert!(svg.contains(r#"transform="translate(300.00,0.00)""#));
        assert!(svg.contains(r#"id="chart1-clip-0""#));
        assert_eq!(svg.matches(PRESSED_OUTLINE).count(), 1);
    }
}
