// CSV series loader - reads every chart's data file in parallel
use crate::application::series_source::{LoadError, SeriesSource};
use crate::domain::series::{Sample, Series};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::path::PathBuf;

const INDEX_COLUMN: &str = "index";
const VALUE_COLUMN: &str = "value";

/// A parsed CSV cell. Numeric cells become numbers, everything else stays text.
#[derive(Debug, Clone, PartialEq)]
enum Cell<'a> {
    Number(f64),
    Text(&'a str),
    Empty,
}

fn auto_type(raw: &str) -> Cell<'_> {
    let trimmed = raw.trim().trim_matches('"');
    if trimmed.is_empty() {
        return Cell::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(n) => Cell::Number(n),
        Err(_) => Cell::Text(trimmed),
    }
}

fn number(cell: Option<Cell<'_>>) -> Result<f64, String> {
    match cell {
        Some(Cell::Number(n)) => Ok(n),
        Some(Cell::Text(t)) => Err(format!("{t:?} is not a number")),
        Some(Cell::Empty) => Err("empty cell".to_string()),
        None => Err("missing cell".to_string()),
    }
}

fn split_row(line: &str) -> Vec<&str> {
    line.split(',').collect()
}

fn column(header: &[&str], name: &'static str, file: &str) -> Result<usize, LoadError> {
    header
        .iter()
        .position(|h| h.trim().trim_matches('"').eq_ignore_ascii_case(name))
        .ok_or_else(|| LoadError::MissingColumn {
            file: file.to_string(),
            column: name,
        })
}

/// Parses `index,value` rows (other columns are ignored) into a series.
pub fn parse_series(file: &str, text: &str) -> Result<Series, LoadError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let header = match lines.next() {
        Some((_, header)) => split_row(header.trim_start_matches('\u{feff}')),
        None => Vec::new(),
    };
    let index_col = column(&header, INDEX_COLUMN, file)?;
    let value_col = column(&header, VALUE_COLUMN, file)?;

    let parse_error = |line: usize, message: String| LoadError::Parse {
        file: file.to_string(),
        line: line + 1,
        message,
    };

    let mut samples = Vec::new();
    for (line, row) in lines {
        let cells = split_row(row);
        let index = number(cells.get(index_col).map(|c| auto_type(c)))
            .and_then(|n| {
                if n.fract() == 0.0 && n >= 0.0 {
                    Ok(n as u32)
                } else {
                    Err(format!("index {n} is not a whole number"))
                }
            })
            .map_err(|m| parse_error(line, m))?;
        let value = number(cells.get(value_col).map(|c| auto_type(c)))
            .map_err(|m| parse_error(line, m))?;
        samples.push(Sample::new(index, value));
    }

    Series::new(file, samples).map_err(|source| LoadError::Series {
        file: file.to_string(),
        source,
    })
}

pub struct CsvSeriesLoader {
    data_dir: PathBuf,
}

impl CsvSeriesLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    async fn load_one(&self, file: &str) -> Result<Series, LoadError> {
        let path = self.data_dir.join(file);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| LoadError::Io {
                file: file.to_string(),
                source,
            })?;
        let series = parse_series(file, &text)?;
        tracing::debug!(file, samples = series.len(), "series loaded");
        Ok(series)
    }
}

#[async_trait]
impl SeriesSource for CsvSeriesLoader {
    async fn load_all(&self, files: &[String]) -> Result<Vec<Series>, LoadError> {
        let series = try_join_all(files.iter().map(|f| self.load_one(f))).await?;
        tracing::info!(files = series.len(), dir = %self.data_dir.display(), "data files loaded");
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::SeriesError;

    #[test]
    fn test_parse_locates_columns_by_name() {
        let text = "value,index,note\n12.5,1,a\n80,2,b\n\n31,3,c\n";
        let series = parse_series("Set1Machine1.csv", text).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.sample(2).map(|s| s.value), Some(80.0));
        assert_eq!(series.name(), "Set1Machine1.csv");
    }

    #[test]
    fn test_parse_rejects_bad_rows() {
        assert!(matches!(
            parse_series("a.csv", "index,reading\n1,2\n"),
            Err(LoadError::MissingColumn { column: "value", .. })
        ));
        assert!(matches!(
            parse_series("a.csv", "index,value\n1,2\n2,high\n"),
            Err(LoadError::Parse { line: 3, .. })
        ));
        assert!(matches!(
            parse_series("a.csv", "index,value\n1,2\n3,4\n"),
            Err(LoadError::Series {
                source: SeriesError::NonContiguous { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_load_all_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), "index,value\n1,5\n2,6\n").unwrap();
        std::fs::write(dir.path().join("a.csv"), "index,value\n1,50\n2,60\n").unwrap();

        let loader = CsvSeriesLoader::new(dir.path());
        let series = loader
            .load_all(&["b.csv".to_string(), "a.csv".to_string()])
            .await
            .unwrap();
        assert_eq!(series[0].name(), "b.csv");
        assert_eq!(series[1].sample(1).map(|s| s.value), Some(50.0));
    }

    #[tokio::test]
    async fn test_one_missing_file_fails_all() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), "index,value\n1,50\n").unwrap();

        let loader = CsvSeriesLoader::new(dir.path());
        let result = loader
            .load_all(&["a.csv".to_string(), "missing.csv".to_string()])
            .await;
        assert!(matches!(result, Err(LoadError::Io { ref file, .. }) if file == "missing.csv"));
    }
}
