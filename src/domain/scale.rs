// Linear scale mapping a numeric domain onto a pixel range

/// Affine map `value -> pixel` with its inverse. No clamping: values outside
/// the domain extrapolate past the range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn set_domain(&mut self, d0: f64, d1: f64) {
        self.domain = (d0, d1);
    }

    pub fn set_range(&mut self, r0: f64, r1: f64) {
        self.range = (r0, r1);
    }

    pub fn map(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if d1 == d0 {
            return (r0 + r1) / 2.0;
        }
        r0 + (value - d0) / (d1 - d0) * (r1 - r0)
    }

    pub fn invert(&self, pixel: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if r1 == r0 {
            return (d0 + d1) / 2.0;
        }
        d0 + (pixel - r0) / (r1 - r0) * (d1 - d0)
    }

    /// Pixels between two consecutive domain units.
    pub fn unit_width(&self) -> f64 {
        self.map(1.0) - self.map(0.0)
    }

    /// Evenly spaced "nice" ticks covering the domain, using a 1/2/5 step
    /// ladder for roughly `count` intervals.
    pub fn ticks(&self, count: usize) -> Vec<f64> {
        let (lo, hi) = if self.domain.0 <= self.domain.1 {
            self.domain
        } else {
            (self.domain.1, self.domain.0)
        };
        if count == 0 || hi == lo {
            return vec![lo];
        }

        let raw = (hi - lo) / count as f64;
        let magnitude = 10f64.powf(raw.log10().floor());
        let step = [1.0, 2.0, 5.0, 10.0]
            .iter()
            .map(|m| m * magnitude)
            .find(|s| *s >= raw)
            .unwrap_or(10.0 * magnitude);

        let first = (lo / step).ceil() as i64;
        let last = (hi / step).floor() as i64;
        (first..=last).map(|i| i as f64 * step).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_invert() {
        let y = LinearScale::new((0.0, 100.0), (370.0, 35.0));
        assert_eq!(y.map(0.0), 370.0);
        assert_eq!(y.map(100.0), 35.0);
        assert!((y.invert(y.map(42.0)) - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_domain_values_are_not_clamped() {
        let y = LinearScale::new((0.0, 100.0), (100.0, 0.0));
        assert_eq!(y.map(120.0), -20.0);
        assert_eq!(y.map(-10.0), 110.0);
    }

    #[test]
    fn test_value_axis_ticks() {
        let y = LinearScale::new((0.0, 100.0), (300.0, 0.0));
        let ticks = y.ticks(10);
        assert_eq!(ticks.len(), 11);
        assert_eq!(ticks.first(), Some(&0.0));
        assert_eq!(ticks.last(), Some(&100.0));
    }

    #[test]
    fn test_unit_width_follows_range() {
        let mut x = LinearScale::new((0.5, 10.5), (0.0, 100.0));
        assert!((x.unit_width() - 10.0).abs() < 1e-9);
        x.set_range(0.0, 200.0);
        assert!((x.unit_width() - 20.0).abs() < 1e-9);
    }
}
