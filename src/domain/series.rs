// Time series domain model
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub index: u32,
    pub value: f64,
}

impl Sample {
    pub fn new(index: u32, value: f64) -> Self {
        Self { index, value }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("series {name} is empty")]
    Empty { name: String },
    #[error("series {name}: expected index {expected}, found {found}")]
    NonContiguous {
        name: String,
        expected: u32,
        found: u32,
    },
    #[error("series {name}: value at index {index} is not finite")]
    NonFinite { name: String, index: u32 },
}

/// One data file's samples, 1-based and contiguous. Fixed length once built.
#[derive(Debug, Clone)]
pub struct Series {
    name: String,
    samples: Vec<Sample>,
}

impl Series {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Result<Self, SeriesError> {
        let name = name.into();
        if samples.is_empty() {
            return Err(SeriesError::Empty { name });
        }
        for (i, sample) in samples.iter().enumerate() {
            let expected = i as u32 + 1;
            if sample.index != expected {
                return Err(SeriesError::NonContiguous {
                    name,
                    expected,
                    found: sample.index,
                });
            }
            if !sample.value.is_finite() {
                return Err(SeriesError::NonFinite {
                    name,
                    index: sample.index,
                });
            }
        }
        Ok(Self { name, samples })
    }

    /// Builds a series from raw values, numbering them from 1.
    pub fn from_values(name: impl Into<String>, values: &[f64]) -> Result<Self, SeriesError> {
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(i as u32 + 1, *v))
            .collect();
        Self::new(name, samples)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Sample at a 1-based index.
    pub fn sample(&self, index: u32) -> Option<&Sample> {
        if index == 0 {
            return None;
        }
        self.samples.get(index as usize - 1)
    }

    /// Samples `[step, step + view_range - 1]`, or `None` when the window
    /// would read past the end.
    pub fn window(&self, step: u32, view_range: usize) -> Option<&[Sample]> {
        if step == 0 || view_range == 0 {
            return None;
        }
        let start = step as usize - 1;
        let end = start + view_range;
        if end > self.samples.len() {
            return None;
        }
        Some(&self.samples[start..end])
    }

    /// Rounded mean of the `k` samples ending at `end_index` inclusive.
    /// The window is truncated at the first sample. `k == 1` yields the raw
    /// value unrounded.
    pub fn rolling_average(&self, end_index: u32, k: usize) -> Option<f64> {
        let end = end_index as usize;
        if end == 0 || end > self.samples.len() || k == 0 {
            return None;
        }
        if k == 1 {
            return Some(self.samples[end - 1].value);
        }
        let start = end.saturating_sub(k);
        let slice = &self.samples[start..end];
        let mean = slice.iter().map(|s| s.value).sum::<f64>() / slice.len() as f64;
        Some(mean.round())
    }
}
