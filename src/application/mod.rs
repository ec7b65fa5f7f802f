// Application layer - chart engine, clock, questions and trial orchestration
pub mod chart_grid;
pub mod chart_instance;
pub mod question_overlay;
pub mod results_repository;
pub mod scene;
pub mod series_source;
pub mod step_clock;
pub mod trial_session;
