// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod frame_stream;
pub mod http_response;
pub mod results_store;
pub mod series_loader;
pub mod svg_renderer;
