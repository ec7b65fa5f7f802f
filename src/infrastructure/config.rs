// Service settings, trial sequence and preset loading
use crate::domain::trial::{Preset, TrialConfig};
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_trials_path")]
    pub trials_path: PathBuf,
    pub preset_path: Option<PathBuf>,
    /// Base URL of the results service. Without it results go straight to
    /// `export_dir`.
    pub results_endpoint: Option<String>,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    #[serde(default = "default_participant")]
    pub participant: String,
    #[serde(default)]
    pub start_index: usize,
    #[serde(default = "default_width")]
    pub container_width: f64,
    #[serde(default = "default_height")]
    pub container_height: f64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_trials_path() -> PathBuf {
    PathBuf::from("config/trials.json")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_participant() -> String {
    "anonymous".to_string()
}

fn default_width() -> f64 {
    1200.0
}

fn default_height() -> f64 {
    800.0
}

/// `config/app.toml` (optional) overlaid with `TRIALS_*` environment variables.
pub fn load_settings() -> anyhow::Result<AppSettings> {
    load_settings_from(Path::new("config/app.toml"))
}

fn load_settings_from(path: &Path) -> anyhow::Result<AppSettings> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("TRIALS"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_preset(path: &Path) -> anyhow::Result<Preset> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading preset {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing preset {}", path.display()))
}

/// Reads the trial sequence and applies the preset, if any, to every trial.
pub fn load_trials(path: &Path, preset: Option<&Preset>) -> anyhow::Result<Vec<TrialConfig>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading trials {}", path.display()))?;
    let mut trials: Vec<TrialConfig> = serde_json::from_str(&text)
        .with_context(|| format!("parsing trials {}", path.display()))?;

    if let Some(preset) = preset {
        for trial in &mut trials {
            preset.apply(trial);
        }
        tracing::info!(trials = trials.len(), "preset locked onto every trial");
    }
    Ok(trials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TRIALS: &str = r#"[
        {
            "setup": "Setup A",
            "files": ["Set1Machine1.csv", "Set1Machine2.csv"],
            "setup-length": 30,
            "num-rows": 1,
            "num-columns": 2,
            "anim-duration": 500,
            "anim-delay": 250,
            "num-points": 10
        },
        {
            "setup": "Setup B",
            "files": ["Set2Machine1.csv"],
            "setup-length": 40,
            "num-rows": 1,
            "num-columns": 1,
            "anim-duration": 300,
            "num-points": 20,
            "vis-labelPosition": "side"
        }
    ]"#;

    #[test]
    fn test_load_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(
            &path,
            r#"
            listen_addr = "127.0.0.1:9000"
            participant = "p07"
            results_endpoint = "http://results.local"
            "#,
        )
        .unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.listen_addr, "127.0.0.1:9000");
        assert_eq!(settings.participant, "p07");
        assert_eq!(settings.results_endpoint.as_deref(), Some("http://results.local"));
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.container_width, 1200.0);
    }

    #[test]
    fn test_load_trials_with_preset() {
        let dir = tempfile::tempdir().unwrap();
        let trials_path = dir.path().join("trials.json");
        let preset_path = dir.path().join("preset.toml");
        fs::write(&trials_path, TRIALS).unwrap();
        fs::write(&preset_path, "anim-duration = 800\nvis-easeInOut = true\n").unwrap();

        let preset = load_preset(&preset_path).unwrap();
        let trials = load_trials(&trials_path, Some(&preset)).unwrap();
        assert_eq!(trials.len(), 2);
        assert!(trials.iter().all(|t| t.anim_duration == 800));
        assert!(trials.iter().all(|t| t.display.ease_in_out));
        assert_eq!(trials[1].num_points, 20);
    }

    #[test]
    fn test_malformed_trials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.json");
        fs::write(&path, r#"[{"setup": "broken"}]"#).unwrap();
        let err = load_trials(&path, None).unwrap_err();
        assert!(err.to_string().contains("parsing trials"));
    }
}
