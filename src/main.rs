// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;
mod runtime;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::results_repository::{LoggingCueSink, ResultsRepository};
use crate::application::scene::ApproxTextMeasure;
use crate::application::trial_session::{SessionContext, TrialSequence};
use crate::domain::clock::SystemClock;
use crate::infrastructure::config::{load_preset, load_settings, load_trials};
use crate::infrastructure::results_store::{FileResultsRepository, HttpResultsRepository};
use crate::infrastructure::series_loader::CsvSeriesLoader;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    chart_scene, health_check, next_trial, pointer, resize, restart, select_option, submit, toggle_pause,
    trial_frames, trial_scene, trial_status,
};
use crate::runtime::TrialRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configuration errors stop the service before anything is shown.
    let settings = load_settings()?;
    let preset = settings
        .preset_path
        .as_deref()
        .map(load_preset)
        .transpose()?;
    let trials = load_trials(&settings.trials_path, preset.as_ref())?;
    let sequence = TrialSequence::new(trials, settings.start_index)?;

    // Persistence: remote service with local fallback, or local only
    let local: Arc<dyn ResultsRepository> =
        Arc::new(FileResultsRepository::new(settings.export_dir.clone()));
    let (results, fallback) = match &settings.results_endpoint {
        Some(endpoint) => (
            Arc::new(HttpResultsRepository::new(endpoint.clone())) as Arc<dyn ResultsRepository>,
            Some(local),
        ),
        None => (local, None),
    };

    let ctx = SessionContext {
        user_id: settings.participant.clone(),
        clock: Arc::new(SystemClock),
        measure: Arc::new(ApproxTextMeasure),
        cue: Arc::new(LoggingCueSink),
        container: (settings.container_width, settings.container_height),
        axis_padding: None,
    };

    let runner = TrialRunner::new(
        sequence,
        Arc::new(CsvSeriesLoader::new(settings.data_dir.clone())),
        results,
        fallback,
        ctx,
    );
    // A failed first load is reported through /trial rather than ending the process.
    if let Err(e) = runner.start().await {
        tracing::error!(error = %e, "first trial failed to start");
    }

    let state = Arc::new(AppState { runner });

    // Bodies are compressed by the handlers that need it, so no CompressionLayer.
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/trial", get(trial_status))
        .route("/trial/scene", get(trial_scene))
        .route("/trial/frames", get(trial_frames))
        .route("/trial/pause", post(toggle_pause))
        .route("/trial/restart", post(restart))
        .route("/trial/resize", post(resize))
        .route("/trial/charts/:index/scene", get(chart_scene))
        .route("/trial/charts/:index/pointer", post(pointer))
        .route("/trial/questions/:id/select", post(select_option))
        .route("/trial/questions/:id/submit", post(submit))
        .route("/trial/next", post(next_trial))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = settings
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", settings.listen_addr))?;
    tracing::info!(%addr, participant = %settings.participant, "starting trial runner");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
